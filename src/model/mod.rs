use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{INIT_BLOCK_NAME, Literal, Operator};
use crate::diagnostics::Location;
use crate::validation::groups::GroupRules;

pub mod builder;
pub mod fluent;
pub mod validator;

pub use builder::ModelBuilder;
pub use fluent::FluentSystem;
pub use validator::Validator;

#[cfg(test)]
pub mod test;

pub type VarId = usize;

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("a model builder can only read one syntax tree")]
    AlreadyBuilt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    Local,
    // Bound by the system configuration; never assigned by the system.
    External,
    // A literal. Named constants may be missing their value.
    Constant(Option<Literal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    pub location: Location,
}

impl Variable {
    pub fn is_external(&self) -> bool {
        self.kind == VariableKind::External
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, VariableKind::Constant(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub id: VarId,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable(VariableRef),
    Unary {
        op: Operator,
        right: Box<Expression>,
        location: Location,
    },
    Binary {
        left: Box<Expression>,
        op: Operator,
        right: Box<Expression>,
        location: Location,
    },
    Function(Box<Function>),
}

impl Expression {
    pub fn location(&self) -> &Location {
        match self {
            Expression::Variable(v) => &v.location,
            Expression::Unary { location, .. } | Expression::Binary { location, .. } => location,
            Expression::Function(f) => f.location(),
        }
    }

    pub fn variable(&self) -> Option<VarId> {
        match self {
            Expression::Variable(v) => Some(v.id),
            _ => None,
        }
    }
}

// `name` alone passes the variable of the same name (or `True`).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Option<Expression>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: Expression,
    pub parameters: Vec<Parameter>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Call(Call),
    GetAttrib {
        source: Expression,
        attrib: String,
        location: Location,
    },
    GetIndex {
        source: Expression,
        index: Option<Expression>,
        location: Location,
    },
    Assign {
        destination: Expression,
        source: Expression,
        location: Location,
    },
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Call(_) => "_call",
            Function::GetAttrib { .. } => "_getattrib",
            Function::GetIndex { .. } => "_getindex",
            Function::Assign { .. } => "_assign",
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Function::Call(call) => &call.location,
            Function::GetAttrib { location, .. }
            | Function::GetIndex { location, .. }
            | Function::Assign { location, .. } => location,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRef {
    pub id: VarId,
    pub limit: Option<Expression>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Group(GroupRef),
    Generator(Function),
}

impl GroupItem {
    pub fn location(&self) -> &Location {
        match self {
            GroupItem::Group(g) => &g.location,
            GroupItem::Generator(f) => f.location(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupList {
    pub items: Vec<GroupItem>,
    pub rules: GroupRules,
}

impl GroupList {
    pub fn new(items: Vec<GroupItem>, rules: GroupRules) -> Self {
        GroupList { items, rules }
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRef> {
        self.items.iter().filter_map(|i| match i {
            GroupItem::Group(g) => Some(g),
            GroupItem::Generator(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stream {
    Merge(GroupList),
    Join(GroupList),
    // Applies `call` to the output of `source`, passed as `_source`.
    Operator { source: Box<Stream>, call: Call },
}

impl Stream {
    // The merge or join at the bottom of the operator chain, and the
    // operators in application order.
    pub fn unwind(&self) -> (&Stream, Vec<&Call>) {
        let mut calls = vec![];
        let mut stream = self;
        while let Stream::Operator { source, call } = stream {
            calls.push(call);
            stream = source;
        }
        calls.reverse();
        (stream, calls)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub source: Stream,
    pub destinations: GroupList,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalStmt {
    pub sources: GroupList,
    pub evaluators: Vec<Expression>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldStmt {
    pub sources: GroupList,
    pub location: Location,
}

// Runs `statements` `count` times; the count is evaluated once on entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatBlock {
    pub statements: Vec<Statement>,
    pub count: Expression,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Function(Function),
    Expression(Expression),
    Store(Store),
    Eval(EvalStmt),
    Yield(YieldStmt),
    Repeat(RepeatBlock),
    Pragma { text: String, location: Location },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct System {
    vars: Vec<Variable>,
    pub variables: IndexMap<String, VarId>,
    pub externals: IndexMap<String, VarId>,
    pub constants: Vec<VarId>,
    // Statement lists in declaration order, the init block first.
    pub blocks: IndexMap<String, Vec<Statement>>,
}

impl System {
    pub fn new() -> Self {
        let mut system = System::default();
        system.blocks.insert(INIT_BLOCK_NAME.to_string(), vec![]);
        system
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id]
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars.iter().enumerate()
    }

    pub fn add_var(&mut self, var: Variable) -> VarId {
        self.vars.push(var);
        self.vars.len() - 1
    }

    pub fn declare_local(&mut self, name: &str, location: Location) -> VarId {
        if let Some(&id) = self.variables.get(name) {
            return id;
        }
        let id = self.add_var(Variable {
            name: name.to_string(),
            kind: VariableKind::Local,
            location,
        });
        self.variables.insert(name.to_string(), id);
        id
    }

    pub fn declare_external(&mut self, name: &str, location: Location) -> VarId {
        if let Some(&id) = self.externals.get(name) {
            return id;
        }
        let id = self.add_var(Variable {
            name: name.to_string(),
            kind: VariableKind::External,
            location,
        });
        self.externals.insert(name.to_string(), id);
        id
    }

    pub fn add_constant(&mut self, name: Option<&str>, value: Option<Literal>, location: Location) -> VarId {
        let name = match (name, value) {
            (Some(name), _) => name.to_string(),
            (None, Some(value)) => value.to_string(),
            (None, None) => Literal::Null.to_string(),
        };
        let id = self.add_var(Variable {
            name,
            kind: VariableKind::Constant(value),
            location,
        });
        self.constants.push(id);
        id
    }

    // Looks a name up as a local, then as an external.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.variables
            .get(name)
            .or_else(|| self.externals.get(name))
            .copied()
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn expression_text(&self, expr: &Expression) -> String {
        match expr {
            Expression::Variable(v) => self.var(v.id).name.clone(),
            Expression::Unary { op, right, .. } => {
                format!("({}{})", op.symbol(), self.expression_text(right))
            }
            Expression::Binary {
                left, op, right, ..
            } => format!(
                "({}{}{})",
                self.expression_text(left),
                op.symbol(),
                self.expression_text(right)
            ),
            Expression::Function(f) => self.function_text(f),
        }
    }

    pub fn call_text(&self, call: &Call) -> String {
        let args: Vec<_> = call
            .parameters
            .iter()
            .map(|p| match &p.value {
                Some(value) => format!("{}={}", p.name, self.expression_text(value)),
                None => p.name.clone(),
            })
            .collect();
        format!("{}({})", self.expression_text(&call.function), args.join(", "))
    }

    pub fn function_text(&self, function: &Function) -> String {
        match function {
            Function::Call(call) => self.call_text(call),
            Function::GetAttrib { source, attrib, .. } => {
                format!("{}.{}", self.expression_text(source), attrib)
            }
            Function::GetIndex { source, index, .. } => format!(
                "{}[{}]",
                self.expression_text(source),
                index
                    .as_ref()
                    .map(|i| self.expression_text(i))
                    .unwrap_or_default()
            ),
            Function::Assign {
                destination,
                source,
                ..
            } => format!(
                "{} = {}",
                self.expression_text(destination),
                self.expression_text(source)
            ),
        }
    }

    pub fn group_list_text(&self, list: &GroupList) -> String {
        let items: Vec<_> = list
            .items
            .iter()
            .map(|item| match item {
                GroupItem::Group(GroupRef {
                    id,
                    limit: Some(limit),
                    ..
                }) => format!("({}) {}", self.expression_text(limit), self.var(*id).name),
                GroupItem::Group(g) => self.var(g.id).name.clone(),
                GroupItem::Generator(f) => self.function_text(f),
            })
            .collect();
        items.join(", ")
    }

    // One line of ESDL for `stmt`. `REPEAT` renders its header only.
    pub fn statement_text(&self, stmt: &Statement) -> String {
        match stmt {
            Statement::Function(f) => self.function_text(f),
            Statement::Expression(e) => self.expression_text(e),
            Statement::Store(store) => {
                let (bottom, calls) = store.source.unwind();
                let (from, select, sources) = match bottom {
                    Stream::Join(list) => ("JOIN", "INTO", self.group_list_text(list)),
                    Stream::Merge(list) => ("FROM", "SELECT", self.group_list_text(list)),
                    Stream::Operator { .. } => ("FROM", "SELECT", String::new()),
                };
                let mut text = format!(
                    "{from} {sources} {select} {}",
                    self.group_list_text(&store.destinations)
                );
                if !calls.is_empty() {
                    let calls: Vec<_> = calls.iter().map(|c| self.call_text(c)).collect();
                    text.push_str(" USING ");
                    text.push_str(&calls.join(", "));
                }
                text
            }
            Statement::Eval(eval) => {
                let mut text = format!("EVAL {}", self.group_list_text(&eval.sources));
                if !eval.evaluators.is_empty() {
                    let evaluators: Vec<_> = eval
                        .evaluators
                        .iter()
                        .map(|e| self.expression_text(e))
                        .collect();
                    text.push_str(" USING ");
                    text.push_str(&evaluators.join(", "));
                }
                text
            }
            Statement::Yield(y) => format!("YIELD {}", self.group_list_text(&y.sources)),
            Statement::Repeat(repeat) => format!("REPEAT {}", self.expression_text(&repeat.count)),
            Statement::Pragma { text, .. } => format!("`{text}"),
        }
    }

    pub fn as_esdl(&self) -> String {
        self.as_esdl_lines().join("\n")
    }

    pub fn as_esdl_lines(&self) -> Vec<String> {
        let mut lines = vec![];
        if let Some(init) = self.blocks.get(INIT_BLOCK_NAME) {
            self.esdl_statements(init, "", &mut lines);
        }
        lines.push(String::new());
        for (name, statements) in &self.blocks {
            if name != INIT_BLOCK_NAME {
                lines.push(format!("BEGIN {name}"));
                self.esdl_statements(statements, "    ", &mut lines);
                lines.push(format!("END {name}"));
                lines.push(String::new());
            }
        }
        lines
    }

    fn esdl_statements(&self, statements: &[Statement], indent: &str, lines: &mut Vec<String>) {
        for stmt in statements {
            lines.push(format!("{indent}{}", self.statement_text(stmt)));
            if let Statement::Repeat(repeat) = stmt {
                self.esdl_statements(&repeat.statements, &format!("{indent}    "), lines);
                lines.push(format!("{indent}END REPEAT"));
            }
        }
    }
}
