use indexmap::IndexSet;
use tracing::info;

use crate::ast::{INIT_BLOCK_NAME, Literal};
use crate::ir::{
    BLOCK_PREFIX, Backend, Helper, IRBuilder, Instruction, ProfileEvent, Program, Target, Value,
};
use crate::model::{
    Call, Expression, Function, GroupItem, GroupList, Statement, System, VarId, VariableKind,
};
use crate::runtime::ExecutionContext;

pub mod direct;
pub mod embedded;


pub const GEN: &str = "_gen";
pub const EVAL: &str = "_eval";
pub const INDIV: &str = "_indiv";

// Constant `REPEAT` counts up to this are unrolled at optimise level 2.
pub const UNROLL_LIMIT: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitOptions {
    pub backend: Backend,
    // 0 emits one assignment per stage. 1 nests single-destination
    // stores, 2 also unrolls small constant repeats, 3 also drops the
    // statement comments.
    pub optimise: u8,
    pub profile: bool,
}

pub fn emit(system: &System, options: &EmitOptions) -> (Program, ExecutionContext) {
    let program = match options.backend {
        Backend::Direct => direct::emit(system, options),
        Backend::Embedded => embedded::emit(system, options),
    };
    info!(
        backend = %options.backend,
        procedures = program.procedures.len(),
        "emitted program"
    );
    let context = ExecutionContext::for_program(&program);
    (program, context)
}

pub fn block_procedure(block: &str) -> String {
    format!("{BLOCK_PREFIX}{block}")
}

// Names are module globals in the direct backend and procedure locals in
// the embedded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
}

pub struct Lowering<'s> {
    pub system: &'s System,
    pub scope: Scope,
}

impl<'s> Lowering<'s> {
    pub fn new(system: &'s System, scope: Scope) -> Self {
        Lowering { system, scope }
    }

    pub fn variable(&self, id: VarId) -> Value {
        let var = self.system.var(id);
        match (&var.kind, self.scope) {
            (VariableKind::Constant(value), _) => Value::Constant(value.unwrap_or(Literal::Null)),
            (_, Scope::Global) => Value::Global(var.name.clone()),
            (_, Scope::Local) => Value::Local(var.name.clone()),
        }
    }

    pub fn target(&self, id: VarId) -> Target {
        let name = self.system.var(id).name.clone();
        match self.scope {
            Scope::Global => Target::Global(name),
            Scope::Local => Target::Local(name),
        }
    }

    pub fn expression(&self, expr: &Expression) -> Value {
        match expr {
            Expression::Variable(v) => self.variable(v.id),
            Expression::Unary { op, right, .. } => Value::Unary {
                op: *op,
                right: Box::new(self.expression(right)),
            },
            Expression::Binary {
                left, op, right, ..
            } => Value::Binary {
                left: Box::new(self.expression(left)),
                op: *op,
                right: Box::new(self.expression(right)),
            },
            Expression::Function(f) => self.function(f),
        }
    }

    // Assignments nested in an expression evaluate to their source.
    pub fn function(&self, function: &Function) -> Value {
        match function {
            Function::Call(call) => self.call(call),
            Function::GetAttrib { source, attrib, .. } => Value::Attrib {
                source: Box::new(self.expression(source)),
                attrib: attrib.clone(),
            },
            Function::GetIndex { source, index, .. } => Value::Index {
                source: Box::new(self.expression(source)),
                index: Box::new(
                    index
                        .as_ref()
                        .map_or(Value::Constant(Literal::Null), |i| self.expression(i)),
                ),
            },
            Function::Assign { source, .. } => self.expression(source),
        }
    }

    pub fn call(&self, call: &Call) -> Value {
        let args = call
            .parameters
            .iter()
            .map(|param| {
                let value = match &param.value {
                    Some(value) => self.expression(value),
                    None => self.implicit(&param.name),
                };
                (param.name.clone(), value)
            })
            .collect();
        Value::Call {
            function: Box::new(self.expression(&call.function)),
            args,
        }
    }

    // A parameter given by name alone passes the variable of that name,
    // or `True` when there is none.
    fn implicit(&self, name: &str) -> Value {
        let name = name.to_lowercase();
        match self
            .system
            .variables
            .get(&name)
            .or_else(|| self.system.externals.get(&name))
        {
            Some(id) => self.variable(*id),
            None => Value::Constant(Literal::Bool(true)),
        }
    }

    // `call` with the stream it transforms appended as `_source`.
    pub fn operator(&self, call: &Call, source: Value) -> Value {
        match self.call(call) {
            Value::Call { function, mut args } => {
                args.push(("_source".to_string(), source));
                Value::Call { function, args }
            }
            other => other,
        }
    }

    pub fn sources(&self, list: &GroupList) -> Vec<Value> {
        list.items
            .iter()
            .map(|item| match item {
                GroupItem::Group(group) => self.variable(group.id),
                GroupItem::Generator(f) => self.function(f),
            })
            .collect()
    }

    pub fn function_statement(&self, function: &Function) -> Instruction {
        match function {
            Function::Assign {
                destination: Expression::Variable(v),
                source,
                ..
            } if !self.system.var(v.id).is_constant() => Instruction::Assign {
                target: self.target(v.id),
                value: self.expression(source),
            },
            other => Instruction::Expr(self.function(other)),
        }
    }
}

pub trait Dialect<'s> {
    fn lowering(&self) -> &Lowering<'s>;
    fn store(&self, builder: &mut IRBuilder, store: &crate::model::Store);
    fn eval(&self, builder: &mut IRBuilder, eval: &crate::model::EvalStmt);
    fn yield_groups(&self, builder: &mut IRBuilder, stmt: &crate::model::YieldStmt);
    fn pragma(&self, builder: &mut IRBuilder, text: &str);
}

// Emits the statements of a block, with the comments, profiling and
// `REPEAT` handling both backends share.
pub fn statements<'s, D: Dialect<'s>>(
    dialect: &D,
    builder: &mut IRBuilder,
    statements: &[Statement],
    options: &EmitOptions,
) {
    for stmt in statements {
        let system = dialect.lowering().system;
        let text = system.statement_text(stmt);
        if options.profile {
            builder.add_instruction(Instruction::Profile {
                event: ProfileEvent::Start,
                label: text.clone(),
            });
        }
        if options.optimise < 3 {
            builder.add_instruction(Instruction::Comment(text.clone()));
        }
        match stmt {
            Statement::Function(f) => {
                builder.add_instruction(dialect.lowering().function_statement(f));
            }
            Statement::Expression(e) => {
                builder.add_instruction(Instruction::Expr(dialect.lowering().expression(e)));
            }
            Statement::Store(store) => dialect.store(builder, store),
            Statement::Eval(eval) => dialect.eval(builder, eval),
            Statement::Yield(stmt) => dialect.yield_groups(builder, stmt),
            Statement::Pragma { text, .. } => dialect.pragma(builder, text),
            Statement::Repeat(repeat) => match unrolled(system, &repeat.count, options) {
                Some(times) => {
                    for _ in 0..times {
                        self::statements(dialect, builder, &repeat.statements, options);
                    }
                }
                None => {
                    builder.begin_nested();
                    self::statements(dialect, builder, &repeat.statements, options);
                    let body = builder.end_nested();
                    builder.add_instruction(Instruction::Repeat {
                        count: dialect.lowering().expression(&repeat.count),
                        body,
                    });
                }
            },
        }
        if options.profile {
            builder.add_instruction(Instruction::Profile {
                event: ProfileEvent::End,
                label: text,
            });
        }
    }
}

// Times to duplicate a `REPEAT` body instead of looping, if unrolling
// applies.
fn unrolled(system: &System, count: &Expression, options: &EmitOptions) -> Option<usize> {
    if options.optimise < 2 {
        return None;
    }
    let id = count.variable()?;
    match system.var(id).kind {
        VariableKind::Constant(Some(Literal::Number(n))) if n <= UNROLL_LIMIT => {
            Some(n.max(0.0) as usize)
        }
        _ => None,
    }
}

pub fn block_body<'s, D: Dialect<'s>>(
    dialect: &D,
    builder: &mut IRBuilder,
    block: &str,
    body: &[Statement],
    options: &EmitOptions,
) {
    let label = format!("BLOCK {block}");
    if options.profile {
        builder.add_instruction(Instruction::Profile {
            event: ProfileEvent::Start,
            label: label.clone(),
        });
    }
    statements(dialect, builder, body, options);
    if options.profile {
        builder.add_instruction(Instruction::Profile {
            event: ProfileEvent::End,
            label,
        });
    }
}

// Blocks in emission order. The initialisation block is always present.
pub fn blocks(system: &System) -> Vec<(&str, &[Statement])> {
    let mut blocks: Vec<(&str, &[Statement])> = vec![(
        INIT_BLOCK_NAME,
        system
            .blocks
            .get(INIT_BLOCK_NAME)
            .map_or(&[][..], |b| b.as_slice()),
    )];
    for (name, body) in &system.blocks {
        if name != INIT_BLOCK_NAME {
            blocks.push((name, body));
        }
    }
    blocks
}

pub fn declare_globals(system: &System, builder: &mut IRBuilder) {
    for name in system.variables.keys().chain(system.externals.keys()) {
        builder.declare_global(name);
    }
}

// Names read and written by a block, including nested `REPEAT` bodies.
#[derive(Debug, Default)]
pub struct Usage {
    pub reads: IndexSet<String>,
    pub writes: IndexSet<String>,
}

impl Usage {
    pub fn of(system: &System, statements: &[Statement]) -> Self {
        let mut usage = Usage::default();
        usage.statements(system, statements);
        usage
    }

    fn statements(&mut self, system: &System, statements: &[Statement]) {
        for stmt in statements {
            match stmt {
                Statement::Function(f) => self.function(system, f),
                Statement::Expression(e) => self.expression(system, e),
                Statement::Store(store) => {
                    let (bottom, calls) = store.source.unwind();
                    if let crate::model::Stream::Merge(list) | crate::model::Stream::Join(list) =
                        bottom
                    {
                        self.sources(system, list);
                    }
                    for call in calls {
                        self.call(system, call);
                    }
                    for item in &store.destinations.items {
                        match item {
                            GroupItem::Group(group) => {
                                self.write(system, group.id);
                                if let Some(limit) = &group.limit {
                                    self.expression(system, limit);
                                }
                            }
                            GroupItem::Generator(f) => self.function(system, f),
                        }
                    }
                }
                Statement::Eval(eval) => {
                    self.sources(system, &eval.sources);
                    for evaluator in &eval.evaluators {
                        self.expression(system, evaluator);
                    }
                }
                Statement::Yield(stmt) => self.sources(system, &stmt.sources),
                Statement::Repeat(repeat) => {
                    self.expression(system, &repeat.count);
                    self.statements(system, &repeat.statements);
                }
                Statement::Pragma { .. } => {}
            }
        }
    }

    fn sources(&mut self, system: &System, list: &GroupList) {
        for item in &list.items {
            match item {
                GroupItem::Group(group) => {
                    self.read(system, group.id);
                    if let Some(limit) = &group.limit {
                        self.expression(system, limit);
                    }
                }
                GroupItem::Generator(f) => self.function(system, f),
            }
        }
    }

    fn read(&mut self, system: &System, id: VarId) {
        let var = system.var(id);
        if !var.is_constant() {
            self.reads.insert(var.name.clone());
        }
    }

    fn write(&mut self, system: &System, id: VarId) {
        let var = system.var(id);
        if !var.is_constant() {
            self.writes.insert(var.name.clone());
        }
    }

    fn expression(&mut self, system: &System, expr: &Expression) {
        match expr {
            Expression::Variable(v) => self.read(system, v.id),
            Expression::Unary { right, .. } => self.expression(system, right),
            Expression::Binary { left, right, .. } => {
                self.expression(system, left);
                self.expression(system, right);
            }
            Expression::Function(f) => self.function(system, f),
        }
    }

    fn function(&mut self, system: &System, function: &Function) {
        match function {
            Function::Call(call) => self.call(system, call),
            Function::GetAttrib { source, .. } => self.expression(system, source),
            Function::GetIndex { source, index, .. } => {
                self.expression(system, source);
                if let Some(index) = index {
                    self.expression(system, index);
                }
            }
            Function::Assign {
                destination,
                source,
                ..
            } => {
                match destination {
                    Expression::Variable(v) => self.write(system, v.id),
                    other => self.expression(system, other),
                }
                self.expression(system, source);
            }
        }
    }

    fn call(&mut self, system: &System, call: &Call) {
        self.expression(system, &call.function);
        for param in &call.parameters {
            match &param.value {
                Some(value) => self.expression(system, value),
                None => {
                    let name = param.name.to_lowercase();
                    if let Some(id) = system
                        .variables
                        .get(&name)
                        .or_else(|| system.externals.get(&name))
                    {
                        self.read(system, *id);
                    }
                }
            }
        }
    }
}
