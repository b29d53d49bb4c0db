use super::*;
use crate::model::{EvalStmt, Store, Stream, YieldStmt};

struct Embedded<'s> {
    lowering: Lowering<'s>,
}

pub fn emit(system: &System, options: &EmitOptions) -> Program {
    let embedded = Embedded {
        lowering: Lowering::new(system, Scope::Local),
    };
    let mut builder = IRBuilder::new(Backend::Embedded);
    declare_globals(system, &mut builder);

    for (block, body) in blocks(system) {
        let usage = Usage::of(system, body);
        let mut params: Vec<String> = usage
            .reads
            .iter()
            .filter(|name| {
                system.variables.contains_key(*name) || system.externals.contains_key(*name)
            })
            .cloned()
            .collect();
        params.sort();
        let mut returned: Vec<String> = usage
            .writes
            .iter()
            .filter(|name| system.variables.contains_key(*name))
            .cloned()
            .collect();
        returned.sort();

        let inner = format!("_{}", block_procedure(block));
        builder.begin_procedure(inner.clone(), params.clone());
        block_body(&embedded, &mut builder, block, body, options);
        builder.add_instruction(Instruction::Return(
            returned.iter().map(|n| Value::Local(n.clone())).collect(),
        ));

        let wrapper = block_procedure(block);
        builder.begin_procedure(wrapper.clone(), vec![]);
        if !returned.is_empty() {
            builder.add_instruction(Instruction::Declare(returned.clone()));
        }
        // written globals go in by value so the caller only sees them
        // through the returned results
        let args = params
            .iter()
            .map(|p| {
                let global = Value::Global(p.clone());
                if returned.contains(p) {
                    Value::helper(Helper::Copy, vec![global])
                } else {
                    global
                }
            })
            .collect();
        builder.add_instruction(Instruction::Invoke {
            procedure: inner,
            args,
            results: returned.into_iter().map(Target::Global).collect(),
        });
        builder.end_procedure();
        builder.bind_block(block, &wrapper);
    }
    builder.finish(block_procedure(INIT_BLOCK_NAME))
}

impl<'s> Embedded<'s> {
    fn source(&self, stream: &Stream) -> Value {
        let (bottom, calls) = stream.unwind();
        let mut source = match bottom {
            Stream::Join(list) => {
                let joined = Value::helper(Helper::Join, self.lowering.sources(list));
                if calls.is_empty() {
                    Value::helper(Helper::Tuples, vec![joined])
                } else {
                    joined
                }
            }
            Stream::Merge(list) => Value::helper(Helper::Iter, self.lowering.sources(list)),
            Stream::Operator { .. } => Value::helper(Helper::Iter, vec![]),
        };
        for call in calls {
            source = self.lowering.operator(call, source);
        }
        Value::helper(Helper::BornIter, vec![source])
    }
}

impl<'s> Dialect<'s> for Embedded<'s> {
    fn lowering(&self) -> &Lowering<'s> {
        &self.lowering
    }

    fn store(&self, builder: &mut IRBuilder, store: &Store) {
        let mut source = self.source(&store.source);
        let items = &store.destinations.items;
        let first_sized = matches!(items.first(), Some(GroupItem::Group(g)) if g.limit.is_some());
        if items.len() > 1 || first_sized {
            builder.add_instruction(Instruction::Assign {
                target: Target::Local(GEN.to_string()),
                value: source,
            });
            source = Value::Local(GEN.to_string());
        }

        for item in items {
            let GroupItem::Group(group) = item else {
                continue;
            };
            let target = self.lowering.target(group.id);
            match &group.limit {
                Some(limit) => builder.add_instruction(Instruction::Assign {
                    target,
                    value: Value::helper(
                        Helper::Islice,
                        vec![source.clone(), self.lowering.expression(limit)],
                    ),
                }),
                None => {
                    builder.add_instruction(Instruction::Assign {
                        target,
                        value: Value::helper(Helper::Rest, vec![source]),
                    });
                    break;
                }
            }
        }
    }

    // A call's result is the evaluator. Anything else, attributes
    // included, goes through `_evaluator`.
    fn eval(&self, builder: &mut IRBuilder, eval: &EvalStmt) {
        let evaluator = match eval.evaluators.first() {
            Some(Expression::Function(f)) if matches!(**f, Function::Call(_)) => self.lowering.function(f),
            Some(other) => Value::helper(Helper::Evaluator, vec![self.lowering.expression(other)]),
            None => Value::Constant(Literal::Null),
        };
        builder.add_instruction(Instruction::Assign {
            target: Target::Local(EVAL.to_string()),
            value: evaluator,
        });
        builder.add_instruction(Instruction::ForEach {
            var: INDIV.to_string(),
            items: Value::helper(Helper::Iter, self.lowering.sources(&eval.sources)),
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
                Helper::OnYield,
                vec![Value::Str(name), self.lowering.variable(group.id)],
            )));
        }
    }

    fn pragma(&self, builder: &mut IRBuilder, text: &str) {
        builder.add_instruction(Instruction::Pragma(text.to_string()));
    }
}
