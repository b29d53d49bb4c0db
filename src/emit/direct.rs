use super::*;
use crate::model::{EvalStmt, Store, Stream, YieldStmt};

struct Direct<'s> {
    lowering: Lowering<'s>,
    optimise: u8,
}

pub fn emit(system: &System, options: &EmitOptions) -> Program {
    let direct = Direct {
        lowering: Lowering::new(system, Scope::Global),
        optimise: options.optimise,
    };
    let mut builder = IRBuilder::new(Backend::Direct);
    declare_globals(system, &mut builder);

    for (block, body) in blocks(system) {
        let name = block_procedure(block);
        builder.begin_procedure(name.clone(), vec![]);
        block_body(&direct, &mut builder, block, body, options);
        builder.end_procedure();
        builder.bind_block(block, &name);
    }
    builder.finish(block_procedure(INIT_BLOCK_NAME))
}

impl<'s> Direct<'s> {
    fn staged() -> Value {
        Value::Local(GEN.to_string())
    }

    // Writes `source` into each destination in turn. Only the last
    // destination may be unsized.
    fn destinations(&self, builder: &mut IRBuilder, store: &Store, source: Value) {
        for item in &store.destinations.items {
            let GroupItem::Group(group) = item else {
                continue;
            };
            let target = self.lowering.target(group.id);
            match &group.limit {
                None => {
                    builder.add_instruction(Instruction::Assign {
                        target,
                        value: Value::helper(Helper::Group, vec![source]),
                    });
                    break;
                }
                Some(limit) => {
                    let part = Value::helper(
                        Helper::Part,
                        vec![source.clone(), self.lowering.expression(limit)],
                    );
                    builder.add_instruction(Instruction::Assign {
                        target,
                        value: Value::helper(Helper::Group, vec![part]),
                    });
                }
            }
        }
    }

    fn bottom(&self, stream: &Stream) -> (Value, bool) {
        match stream {
            Stream::Join(list) => (
                Value::helper(Helper::Join, self.lowering.sources(list)),
                true,
            ),
            Stream::Merge(list) => (
                Value::helper(Helper::Merge, self.lowering.sources(list)),
                false,
            ),
            Stream::Operator { source, .. } => self.bottom(source),
        }
    }

    fn staged_store(&self, builder: &mut IRBuilder, store: &Store) {
        let (bottom, calls) = store.source.unwind();
        let (source, joined) = self.bottom(bottom);
        let stage = Target::Local(GEN.to_string());
        builder.add_instruction(Instruction::Assign {
            target: stage.clone(),
            value: source,
        });
        if joined && calls.is_empty() {
            builder.add_instruction(Instruction::Assign {
                target: stage.clone(),
                value: Value::helper(Helper::Tuples, vec![Self::staged()]),
            });
        }
        for call in calls {
            builder.add_instruction(Instruction::Assign {
                target: stage.clone(),
                value: self.lowering.operator(call, Self::staged()),
            });
        }
        self.destinations(builder, store, Self::staged());
    }

    fn nested_store(&self, builder: &mut IRBuilder, store: &Store) {
        let (bottom, calls) = store.source.unwind();
        let (mut source, joined) = self.bottom(bottom);
        if joined && calls.is_empty() {
            source = Value::helper(Helper::Tuples, vec![source]);
        }
        for call in calls {
            source = self.lowering.operator(call, source);
        }

        if let [GroupItem::Group(_)] = store.destinations.items.as_slice() {
            self.destinations(builder, store, source);
        } else {
            builder.add_instruction(Instruction::Assign {
                target: Target::Local(GEN.to_string()),
                value: source,
            });
            self.destinations(builder, store, Self::staged());
        }
    }
}

impl<'s> Dialect<'s> for Direct<'s> {
    fn lowering(&self) -> &Lowering<'s> {
        &self.lowering
    }

    fn store(&self, builder: &mut IRBuilder, store: &Store) {
        if self.optimise > 0 {
            self.nested_store(builder, store);
        } else {
            self.staged_store(builder, store);
        }
    }

    fn eval(&self, builder: &mut IRBuilder, eval: &EvalStmt) {
        let evaluators = eval
            .evaluators
            .iter()
            .map(|e| self.lowering.expression(e))
            .collect();
        builder.add_instruction(Instruction::Assign {
            target: Target::Local(EVAL.to_string()),
            value: Value::helper(Helper::Evaluator, evaluators),
        });
        builder.add_instruction(Instruction::ForEach {
            var: INDIV.to_string(),
            items: Value::helper(Helper::Merge, self.lowering.sources(&eval.sources)),
            body: vec![Instruction::SetEvaluator {
                individual: INDIV.to_string(),
                evaluator: Value::Local(EVAL.to_string()),
            }],
        });
    }

    fn yield_groups(&self, builder: &mut IRBuilder, stmt: &YieldStmt) {
        for group in stmt.sources.groups() {
            let name = self.lowering.system.var(group.id).name.clone();
            builder.add_instruction(Instruction::Expr(Value::helper(
                Helper::Yield,
                vec![Value::Str(name), self.lowering.variable(group.id)],
            )));
        }
    }

    // Only `py ` pragmas are meant for this backend.
    fn pragma(&self, builder: &mut IRBuilder, text: &str) {
        if let Some(code) = text.strip_prefix("py ") {
            builder.add_instruction(Instruction::Pragma(code.to_string()));
        }
    }
}
