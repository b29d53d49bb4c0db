use indexmap::IndexMap;

use crate::ast::{INIT_BLOCK_NAME, Literal, Operator};
use crate::diagnostics::Location;
use crate::model::*;
use crate::validation::groups::GroupRules;

pub struct FluentSystem {
    system: System,
    block: String,
    statements: Vec<Statement>,
    // Names referenced before being declared. They stay out of the
    // declaration maps so validation reports them.
    unresolved: IndexMap<String, VarId>,
}

impl Default for FluentSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FluentSystem {
    pub fn new() -> Self {
        FluentSystem {
            system: System::new(),
            block: INIT_BLOCK_NAME.to_string(),
            statements: vec![],
            unresolved: IndexMap::new(),
        }
    }

    pub fn external(&mut self, name: &str) {
        self.system.declare_external(name, Location::default());
    }

    // Declares a local variable or group.
    pub fn variable(&mut self, name: &str) {
        self.system.declare_local(name, Location::default());
    }

    pub fn constant(&mut self, value: Literal) -> Expression {
        let id = self.system.add_constant(None, Some(value), Location::default());
        variable_ref(id)
    }

    // A named constant. A missing value is reported during validation.
    pub fn named_constant(&mut self, name: &str, value: Option<Literal>) -> Expression {
        let id = self.system.add_constant(Some(name), value, Location::default());
        variable_ref(id)
    }

    fn resolve(&mut self, name: &str, kind: VariableKind) -> VarId {
        if let Some(id) = self.system.lookup(name) {
            return id;
        }
        if let Some(&id) = self.unresolved.get(name) {
            return id;
        }
        let id = self.system.add_var(Variable {
            name: name.to_string(),
            kind,
            location: Location::default(),
        });
        self.unresolved.insert(name.to_string(), id);
        id
    }

    pub fn var(&mut self, name: &str) -> Expression {
        let id = self.resolve(name, VariableKind::Local);
        variable_ref(id)
    }

    pub fn unary(&self, op: Operator, right: Expression) -> Expression {
        Expression::Unary {
            op,
            right: Box::new(right),
            location: Location::default(),
        }
    }

    pub fn binary(&self, left: Expression, op: Operator, right: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
            location: Location::default(),
        }
    }

    pub fn attrib(&self, source: Expression, attrib: &str) -> Expression {
        Expression::Function(Box::new(Function::GetAttrib {
            source,
            attrib: attrib.to_string(),
            location: Location::default(),
        }))
    }

    pub fn index(&self, source: Expression, index: Expression) -> Expression {
        Expression::Function(Box::new(Function::GetIndex {
            source,
            index: Some(index),
            location: Location::default(),
        }))
    }

    // A call to the external `name`.
    pub fn operator(&mut self, name: &str, parameters: Vec<(&str, Expression)>) -> Call {
        let function = self.resolve(name, VariableKind::External);
        Call {
            function: variable_ref(function),
            parameters: parameters
                .into_iter()
                .map(|(name, value)| Parameter {
                    name: name.to_string(),
                    value: Some(value),
                    location: Location::default(),
                })
                .collect(),
            location: Location::default(),
        }
    }

    pub fn call(&mut self, name: &str, parameters: Vec<(&str, Expression)>) -> Function {
        Function::Call(self.operator(name, parameters))
    }

    pub fn group(&mut self, name: &str) -> GroupItem {
        let id = self.resolve(name, VariableKind::Local);
        GroupItem::Group(GroupRef {
            id,
            limit: None,
            location: Location::default(),
        })
    }

    pub fn sized_group(&mut self, name: &str, limit: Expression) -> GroupItem {
        let id = self.resolve(name, VariableKind::Local);
        GroupItem::Group(GroupRef {
            id,
            limit: Some(limit),
            location: Location::default(),
        })
    }

    pub fn generator(&self, function: Function) -> GroupItem {
        GroupItem::Generator(function)
    }

    // Starts (or continues) the block `name`. Statements before the first
    // call go to the init block.
    pub fn block(&mut self, name: &str) {
        self.flush();
        self.block = name.to_lowercase();
        self.system.blocks.entry(self.block.clone()).or_default();
    }

    fn flush(&mut self) {
        let statements = std::mem::take(&mut self.statements);
        self.system
            .blocks
            .entry(self.block.clone())
            .or_default()
            .extend(statements);
    }

    pub fn assign(&mut self, destination: &str, source: Expression) {
        let destination = self.var(destination);
        self.statements.push(Statement::Function(Function::Assign {
            destination,
            source,
            location: Location::default(),
        }));
    }

    pub fn expression(&mut self, expression: Expression) {
        self.statements.push(Statement::Expression(expression));
    }

    pub fn from(&mut self, sources: Vec<GroupItem>) -> PartialStore<'_> {
        PartialStore {
            owner: self,
            source: Stream::Merge(GroupList::new(sources, GroupRules::SOURCES)),
        }
    }

    pub fn join(&mut self, sources: Vec<GroupItem>) -> PartialStore<'_> {
        PartialStore {
            owner: self,
            source: Stream::Join(GroupList::new(sources, GroupRules::SOURCES)),
        }
    }

    pub fn eval(&mut self, sources: Vec<GroupItem>, evaluators: Vec<Expression>) {
        self.statements.push(Statement::Eval(EvalStmt {
            sources: GroupList::new(sources, GroupRules::EVALUATED),
            evaluators,
            location: Location::default(),
        }));
    }

    pub fn yield_groups(&mut self, sources: Vec<GroupItem>) {
        self.statements.push(Statement::Yield(YieldStmt {
            sources: GroupList::new(sources, GroupRules::EVALUATED),
            location: Location::default(),
        }));
    }

    pub fn pragma(&mut self, text: &str) {
        self.statements.push(Statement::Pragma {
            text: text.to_string(),
            location: Location::default(),
        });
    }

    // Runs `body` to collect the statements of a `REPEAT` block.
    pub fn repeat(&mut self, count: Expression, body: impl FnOnce(&mut FluentSystem)) {
        let outer = std::mem::take(&mut self.statements);
        body(self);
        let statements = std::mem::replace(&mut self.statements, outer);
        self.statements.push(Statement::Repeat(RepeatBlock {
            statements,
            count,
            location: Location::default(),
        }));
    }

    pub fn finish(mut self) -> System {
        self.flush();
        self.system
    }
}

// `FROM` or `JOIN` waiting for its destinations.
pub struct PartialStore<'a> {
    owner: &'a mut FluentSystem,
    source: Stream,
}

impl<'a> PartialStore<'a> {
    pub fn select(self, destinations: Vec<GroupItem>) -> StoreHandle<'a> {
        let statements = &mut self.owner.statements;
        statements.push(Statement::Store(Store {
            source: self.source,
            destinations: GroupList::new(destinations, GroupRules::DESTINATIONS),
            location: Location::default(),
        }));
        StoreHandle {
            index: statements.len() - 1,
            owner: self.owner,
        }
    }

    pub fn into(self, destinations: Vec<GroupItem>) -> StoreHandle<'a> {
        self.select(destinations)
    }
}

// A committed store that may still take a `USING` list.
pub struct StoreHandle<'a> {
    owner: &'a mut FluentSystem,
    index: usize,
}

impl StoreHandle<'_> {
    pub fn using(self, operators: Vec<Call>) {
        if let Some(Statement::Store(store)) = self.owner.statements.get_mut(self.index) {
            let placeholder = Stream::Merge(GroupList::new(vec![], GroupRules::SOURCES));
            let mut source = std::mem::replace(&mut store.source, placeholder);
            for call in operators {
                source = Stream::Operator {
                    source: Box::new(source),
                    call,
                };
            }
            store.source = source;
        }
    }
}

fn variable_ref(id: VarId) -> Expression {
    Expression::Variable(VariableRef {
        id,
        location: Location::default(),
    })
}
