use clap::ValueEnum;
use indexmap::{IndexMap, IndexSet};

use std::fmt::{self, Display, Formatter};

use crate::ast::{Literal, Operator};

pub mod builder;
pub mod irvalidator;

pub use builder::IRBuilder;
pub use irvalidator::IRValidator;

#[cfg(test)]
pub mod test;

// Block procedures are named `_block_<name>`.
pub const BLOCK_PREFIX: &str = "_block_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Backend {
    // One procedure per block, writing module-level globals.
    #[default]
    Direct,
    // An inner procedure per block plus a wrapper that copies globals in
    // and assigns the results back.
    Embedded,
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Direct => write!(f, "direct"),
            Backend::Embedded => write!(f, "embedded"),
        }
    }
}

// Runtime services the generated code calls by reserved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Helper {
    Iter,
    Group,
    Merge,
    Join,
    Tuples,
    Range,
    Part,
    Evaluator,
    Yield,
    OnYield,
    Copy,
    BornIter,
    Islice,
    Rest,
}

impl Helper {
    pub const ALL: [Helper; 14] = [
        Helper::Iter,
        Helper::Group,
        Helper::Merge,
        Helper::Join,
        Helper::Tuples,
        Helper::Range,
        Helper::Part,
        Helper::Evaluator,
        Helper::Yield,
        Helper::OnYield,
        Helper::Copy,
        Helper::BornIter,
        Helper::Islice,
        Helper::Rest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Helper::Iter => "_iter",
            Helper::Group => "_group",
            Helper::Merge => "_merge",
            Helper::Join => "_join",
            Helper::Tuples => "_tuples",
            Helper::Range => "_range",
            Helper::Part => "_part",
            Helper::Evaluator => "_evaluator",
            Helper::Yield => "_yield",
            Helper::OnYield => "_on_yield",
            Helper::Copy => "_copy",
            Helper::BornIter => "_born_iter",
            Helper::Islice => "_islice",
            Helper::Rest => "_rest",
        }
    }

    pub fn from_name(name: &str) -> Option<Helper> {
        Helper::ALL.into_iter().find(|h| h.name() == name)
    }
}

impl Display for Helper {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Constant(Literal),
    Str(String),
    Global(String),
    Local(String),
    Call {
        function: Box<Value>,
        args: Vec<(String, Value)>,
    },
    Helper {
        helper: Helper,
        args: Vec<Value>,
    },
    Attrib {
        source: Box<Value>,
        attrib: String,
    },
    Index {
        source: Box<Value>,
        index: Box<Value>,
    },
    Unary {
        op: Operator,
        right: Box<Value>,
    },
    Binary {
        left: Box<Value>,
        op: Operator,
        right: Box<Value>,
    },
}

impl Value {
    pub fn helper(helper: Helper, args: Vec<Value>) -> Value {
        Value::Helper { helper, args }
    }

    pub fn number(n: f64) -> Value {
        Value::Constant(Literal::Number(n))
    }

    pub fn helpers(&self, out: &mut IndexSet<Helper>) {
        match self {
            Value::Constant(_) | Value::Str(_) | Value::Global(_) | Value::Local(_) => {}
            Value::Call { function, args } => {
                function.helpers(out);
                for (_, arg) in args {
                    arg.helpers(out);
                }
            }
            Value::Helper { helper, args } => {
                out.insert(*helper);
                for arg in args {
                    arg.helpers(out);
                }
            }
            Value::Attrib { source, .. } => source.helpers(out),
            Value::Index { source, index } => {
                source.helpers(out);
                index.helpers(out);
            }
            Value::Unary { right, .. } => right.helpers(out),
            Value::Binary { left, right, .. } => {
                left.helpers(out);
                right.helpers(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Global(String),
    Local(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Global(name) | Target::Local(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileEvent {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Comment(String),
    Assign {
        target: Target,
        value: Value,
    },
    Expr(Value),
    // Runs `body` `count` times; `count` is evaluated once.
    Repeat {
        count: Value,
        body: Vec<Instruction>,
    },
    ForEach {
        var: String,
        items: Value,
        body: Vec<Instruction>,
    },
    // Binds an evaluator to an individual and drops its cached fitness.
    SetEvaluator {
        individual: String,
        evaluator: Value,
    },
    Invoke {
        procedure: String,
        args: Vec<Value>,
        results: Vec<Target>,
    },
    Declare(Vec<String>),
    Return(Vec<Value>),
    Pragma(String),
    Profile {
        event: ProfileEvent,
        label: String,
    },
}

impl Instruction {
    pub fn helpers(&self, out: &mut IndexSet<Helper>) {
        match self {
            Instruction::Assign { value, .. } | Instruction::Expr(value) => value.helpers(out),
            Instruction::SetEvaluator { evaluator, .. } => evaluator.helpers(out),
            Instruction::Repeat { count, body } => {
                out.insert(Helper::Range);
                count.helpers(out);
                for inst in body {
                    inst.helpers(out);
                }
            }
            Instruction::ForEach { items, body, .. } => {
                items.helpers(out);
                for inst in body {
                    inst.helpers(out);
                }
            }
            Instruction::Invoke { args, .. } | Instruction::Return(args) => {
                for arg in args {
                    arg.helpers(out);
                }
            }
            Instruction::Comment(_)
            | Instruction::Declare(_)
            | Instruction::Pragma(_)
            | Instruction::Profile { .. } => {}
        }
    }

    fn render(&self, f: &mut Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        match self {
            Instruction::Comment(text) => writeln!(f, "{pad}# {text}"),
            Instruction::Assign { target, value } => writeln!(f, "{pad}{target} = {value}"),
            Instruction::Expr(value) => writeln!(f, "{pad}{value}"),
            Instruction::Repeat { count, body } => {
                writeln!(f, "{pad}for _ in {}({count}):", Helper::Range)?;
                render_body(f, body, indent + 4)
            }
            Instruction::ForEach { var, items, body } => {
                writeln!(f, "{pad}for {var} in {items}:")?;
                render_body(f, body, indent + 4)
            }
            Instruction::SetEvaluator {
                individual,
                evaluator,
            } => {
                writeln!(f, "{pad}{individual}._eval = {evaluator}")?;
                writeln!(f, "{pad}{individual}.fitness = None")
            }
            Instruction::Invoke {
                procedure,
                args,
                results,
            } => {
                write!(f, "{pad}")?;
                if !results.is_empty() {
                    write!(f, "{} = ", join(results))?;
                }
                writeln!(f, "{procedure}({})", join(args))
            }
            Instruction::Declare(names) => writeln!(f, "{pad}global {}", names.join(", ")),
            Instruction::Return(values) if values.is_empty() => writeln!(f, "{pad}return"),
            Instruction::Return(values) => writeln!(f, "{pad}return {}", join(values)),
            Instruction::Pragma(text) => writeln!(f, "{pad}{text}"),
            Instruction::Profile { event, label } => {
                let event = match event {
                    ProfileEvent::Start => "start",
                    ProfileEvent::End => "end",
                };
                writeln!(f, "{pad}_profile.{event}({:?})", label)
            }
        }
    }
}

fn render_body(f: &mut Formatter<'_>, body: &[Instruction], indent: usize) -> fmt::Result {
    if body.is_empty() {
        return writeln!(f, "{}pass", " ".repeat(indent));
    }
    for inst in body {
        inst.render(f, indent)?;
    }
    Ok(())
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub backend: Backend,
    pub procedures: Vec<Procedure>,
    pub entry: String,
    pub blocks: IndexMap<String, String>,
    pub globals: Vec<String>,
}

impl Program {
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn helpers(&self) -> IndexSet<Helper> {
        let mut helpers = IndexSet::new();
        for procedure in &self.procedures {
            for inst in &procedure.body {
                inst.helpers(&mut helpers);
            }
        }
        helpers
    }
}

// Display implementations

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(Literal::Number(n)) => write!(f, "{:?}", n),
            Value::Constant(Literal::Bool(true)) => write!(f, "True"),
            Value::Constant(Literal::Bool(false)) => write!(f, "False"),
            Value::Constant(Literal::Null) => write!(f, "None"),
            Value::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            Value::Global(name) if is_keyword(name) => write!(f, "_global[\"{}\"]", name),
            Value::Global(name) => write!(f, "{}", name),
            Value::Local(name) if is_keyword(name) => write!(f, "{}_", name),
            Value::Local(name) => write!(f, "{}", name),
            Value::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, (name, value)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if is_keyword(name) {
                        write!(f, "{}_={}", name, value)?;
                    } else {
                        write!(f, "{}={}", name, value)?;
                    }
                }
                write!(f, ")")
            }
            Value::Helper { helper, args } => write!(f, "{}({})", helper, join(args)),
            Value::Attrib { source, attrib } => write!(f, "{}.{}", source, attrib),
            Value::Index { source, index } => write!(f, "{}[{}]", source, index),
            Value::Unary { op, right } => write!(f, "({}{})", op.symbol(), right),
            Value::Binary { left, op, right } => {
                let symbol = match op {
                    Operator::Pow => "**",
                    op => op.symbol(),
                };
                write!(f, "({} {} {})", left, symbol, right)
            }
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Target::Global(name) => write!(f, "{}", Value::Global(name.clone())),
            Target::Local(name) => write!(f, "{}", Value::Local(name.clone())),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl Display for Procedure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self
            .params
            .iter()
            .map(|p| Value::Local(p.clone()).to_string())
            .collect();
        writeln!(f, "def {}({}):", self.name, params.join(", "))?;
        render_body(f, &self.body, 4)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "# ESDL program ({} backend)", self.backend)?;
        writeln!(f)?;
        for procedure in &self.procedures {
            writeln!(f, "{}", procedure)?;
        }
        writeln!(f, "# entry: {}", self.entry)
    }
}
