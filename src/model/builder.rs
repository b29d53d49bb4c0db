use tracing::{debug, warn};

use crate::ast::{Ast, Bracket, Category, GroupSpec, NodeData, NodeId, NodeTag};
use crate::diagnostics::Location;
use crate::lexer::Token;
use crate::model::*;
use crate::validation::groups::GroupRules;
use crate::validation::list_items;

// Lowers a validated syntax tree into a `System`. Each builder reads
// exactly one tree.
pub struct ModelBuilder {
    system: System,
    built: bool,
}

impl ModelBuilder {
    // `externals` are the names bound by the system configuration.
    pub fn new<I, S>(externals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut system = System::new();
        for name in externals {
            system.declare_external(&name.as_ref().to_lowercase(), Location::default());
        }
        ModelBuilder {
            system,
            built: false,
        }
    }

    pub fn build(&mut self, ast: &Ast) -> Result<System, BuildError> {
        if self.built {
            return Err(BuildError::AlreadyBuilt);
        }
        self.built = true;

        for (name, statements) in ast.blocks() {
            let mut lowered = vec![];
            for stmt in statements {
                if let Some(stmt) = self.statement(ast, stmt) {
                    lowered.push(stmt);
                }
            }
            self.system
                .blocks
                .entry(name)
                .or_default()
                .extend(lowered);
        }

        debug!(
            blocks = self.system.blocks.len(),
            variables = self.system.variables.len(),
            externals = self.system.externals.len(),
            "built semantic model"
        );
        Ok(std::mem::take(&mut self.system))
    }

    fn statement(&mut self, ast: &Ast, id: NodeId) -> Option<Statement> {
        let node = ast.node(id);
        match node.category() {
            Category::Op | Category::Name | Category::Dot | Category::Expr | Category::Constant => {
                self.expression(ast, id).map(Statement::Expression)
            }
            Category::Assign => self.assignment(ast, id).map(Statement::Function),
            Category::UsingStmt => match ast.left(id).map(|l| ast.category(l)) {
                Some(Category::SelectStmt) | Some(Category::IntoStmt) => {
                    self.store(ast, id).map(Statement::Store)
                }
                Some(Category::EvalStmt) => self.eval(ast, id).map(Statement::Eval),
                _ => None,
            },
            Category::SelectStmt | Category::IntoStmt => self.store(ast, id).map(Statement::Store),
            Category::EvalStmt => self.eval(ast, id).map(Statement::Eval),
            Category::YieldStmt => Some(Statement::Yield(YieldStmt {
                sources: self.groups(ast, id, GroupRules::EVALUATED)?,
                location: ast.location(id),
            })),
            Category::RepeatBlock => self.repeat(ast, id).map(Statement::Repeat),
            Category::Pragma => match &node.tag {
                NodeTag::Pragma(text) => Some(Statement::Pragma {
                    text: text.clone(),
                    location: ast.location(id),
                }),
                _ => None,
            },
            other => {
                warn!(category = ?other, "unhandled statement");
                None
            }
        }
    }

    fn repeat(&mut self, ast: &Ast, id: NodeId) -> Option<RepeatBlock> {
        let NodeData::Count(count) = ast.node(id).data else {
            return None;
        };
        let count = self.expression(ast, count)?;
        let mut statements = vec![];
        for &stmt in &ast.node(id).expr {
            statements.extend(self.statement(ast, stmt));
        }
        Some(RepeatBlock {
            statements,
            count,
            location: ast.location(id),
        })
    }

    fn assignment(&mut self, ast: &Ast, id: NodeId) -> Option<Function> {
        let destination = self.expression(ast, ast.left(id)?)?;
        let source = self.expression(ast, ast.right(id)?)?;
        Some(Function::Assign {
            destination,
            source,
            location: ast.location(id),
        })
    }

    pub(crate) fn expression(&mut self, ast: &Ast, id: NodeId) -> Option<Expression> {
        let node = ast.node(id);
        let location = ast.location(id);
        match &node.tag {
            NodeTag::Group(Bracket::Paren) => {
                let inner = *node.expr.first()?;
                self.expression(ast, inner)
            }
            NodeTag::Operator(op) => {
                let right = Box::new(self.expression(ast, node.right?)?);
                match node.left {
                    None => Some(Expression::Unary {
                        op: *op,
                        right,
                        location,
                    }),
                    Some(left) => Some(Expression::Binary {
                        left: Box::new(self.expression(ast, left)?),
                        op: *op,
                        right,
                        location,
                    }),
                }
            }
            NodeTag::Constant(value) => {
                let id = self.system.add_constant(None, Some(*value), location.clone());
                Some(Expression::Variable(VariableRef { id, location }))
            }
            NodeTag::Name(_) => match node.right.map(|r| &ast.node(r).tag) {
                None => {
                    let id = self.variable(ast, id);
                    Some(Expression::Variable(VariableRef { id, location }))
                }
                Some(NodeTag::Group(Bracket::Paren)) => self.call(ast, id).map(boxed),
                Some(NodeTag::Group(Bracket::Square)) => self.index(ast, id).map(boxed),
                Some(_) => None,
            },
            NodeTag::Dot => self.attribute(ast, id).map(boxed),
            _ => {
                warn!(node = %node.tag, "unhandled expression");
                None
            }
        }
    }

    // Local, then external, then a new local.
    fn variable(&mut self, ast: &Ast, id: NodeId) -> VarId {
        let name = match ast.node(id).name() {
            Some(name) => name.to_string(),
            None => ast.text(id),
        };
        match self.system.lookup(&name) {
            Some(var) => var,
            None => self.system.declare_local(&name, ast.location(id)),
        }
    }

    // `name(...)` or a bare `name` used as a callable.
    fn call(&mut self, ast: &Ast, id: NodeId) -> Option<Function> {
        let node = ast.node(id);
        let NodeTag::Name(name) = &node.tag else {
            return self.attribute(ast, id);
        };
        let var = match self.system.externals.get(name) {
            Some(&var) => var,
            None => self.system.declare_external(name, ast.location(id)),
        };
        let function = Expression::Variable(VariableRef {
            id: var,
            location: head_location(&node.tokens),
        });
        Some(Function::Call(self.call_with(ast, function, node.right, ast.location(id))))
    }

    fn call_with(
        &mut self,
        ast: &Ast,
        function: Expression,
        arguments: Option<NodeId>,
        location: Location,
    ) -> Call {
        let mut parameters = vec![];
        let inner = arguments
            .filter(|&a| ast.node(a).tag == NodeTag::Group(Bracket::Paren))
            .and_then(|a| ast.node(a).expr.first().copied());
        for item in list_items(ast, inner) {
            let node = ast.node(item);
            let location = ast.location(item);
            match &node.tag {
                NodeTag::Assign => {
                    let Some(name) = node.left.and_then(|l| ast.node(l).name()) else {
                        continue;
                    };
                    let value = node.right.and_then(|r| self.expression(ast, r));
                    parameters.push(Parameter {
                        name: name.to_string(),
                        value,
                        location,
                    });
                }
                NodeTag::Name(name) => parameters.push(Parameter {
                    name: name.clone(),
                    value: None,
                    location,
                }),
                _ => {}
            }
        }
        Call {
            function,
            parameters,
            location,
        }
    }

    fn index(&mut self, ast: &Ast, id: NodeId) -> Option<Function> {
        let var = self.variable(ast, id);
        let source = Expression::Variable(VariableRef {
            id: var,
            location: head_location(&ast.node(id).tokens),
        });
        Some(self.index_with(ast, source, ast.node(id).right?, ast.location(id)))
    }

    fn index_with(&mut self, ast: &Ast, source: Expression, group: NodeId, location: Location) -> Function {
        let index = ast
            .node(group)
            .expr
            .first()
            .and_then(|&i| self.expression(ast, i));
        Function::GetIndex {
            source,
            index,
            location,
        }
    }

    // `a.b`, `a.b(...)` and `a.b[...]`.
    fn attribute(&mut self, ast: &Ast, id: NodeId) -> Option<Function> {
        let node = ast.node(id);
        let source = self.expression(ast, node.left?)?;
        let right = ast.node(node.right?);
        let attrib = right.name()?.to_string();
        let location = ast.location(id);
        let getattrib = Function::GetAttrib {
            source,
            attrib,
            location: location.clone(),
        };
        match right.right {
            None => Some(getattrib),
            Some(trailer) => match ast.node(trailer).tag {
                NodeTag::Group(Bracket::Paren) => Some(Function::Call(self.call_with(
                    ast,
                    boxed(getattrib),
                    Some(trailer),
                    location,
                ))),
                NodeTag::Group(Bracket::Square) => {
                    Some(self.index_with(ast, boxed(getattrib), trailer, location))
                }
                _ => None,
            },
        }
    }

    // A USING entry. Bare names and attributes are called with no
    // arguments.
    fn operator(&mut self, ast: &Ast, id: NodeId) -> Option<Call> {
        match self.call(ast, id)? {
            Function::Call(call) => Some(call),
            other => {
                let location = other.location().clone();
                Some(Call {
                    function: boxed(other),
                    parameters: vec![],
                    location,
                })
            }
        }
    }

    fn groups(&mut self, ast: &Ast, id: NodeId, rules: GroupRules) -> Option<GroupList> {
        let NodeData::Groups(specs) = &ast.node(id).data else {
            return None;
        };
        let mut items = vec![];
        for &GroupSpec { size, name } in specs {
            items.extend(self.group(ast, name, size));
        }
        Some(GroupList::new(items, rules))
    }

    // Externals and calls become generators; anything else is a group.
    fn group(&mut self, ast: &Ast, name: NodeId, size: Option<NodeId>) -> Option<GroupItem> {
        let node = ast.node(name);
        let location = ast.location(name);
        if node.category() == Category::Dot {
            return self.operator(ast, name).map(|c| GroupItem::Generator(Function::Call(c)));
        }
        let called = is_called(ast, name);
        let external = node.name().is_some_and(|n| {
            !self.system.variables.contains_key(n) && self.system.externals.contains_key(n)
        });
        if called || external {
            return self.call(ast, name).map(GroupItem::Generator);
        }
        let var = self.variable(ast, name);
        let limit = match size {
            Some(size) => Some(self.expression(ast, size)?),
            None => None,
        };
        Some(GroupItem::Group(GroupRef {
            id: var,
            limit,
            location,
        }))
    }

    fn store(&mut self, ast: &Ast, id: NodeId) -> Option<Store> {
        let (mut node, calls) = match ast.category(id) {
            Category::UsingStmt => {
                let NodeData::Functions(functions) = &ast.node(id).data else {
                    return None;
                };
                let mut calls = vec![];
                for &f in functions {
                    calls.push(self.operator(ast, f)?);
                }
                (ast.left(id)?, calls)
            }
            _ => (id, vec![]),
        };
        let destinations = self.groups(ast, node, GroupRules::DESTINATIONS)?;
        let join = ast.category(node) == Category::IntoStmt;
        node = ast.left(node)?;
        let sources = self.groups(ast, node, GroupRules::SOURCES)?;

        let mut source = if join {
            Stream::Join(sources)
        } else {
            Stream::Merge(sources)
        };
        for call in calls {
            source = Stream::Operator {
                source: Box::new(source),
                call,
            };
        }
        Some(Store {
            source,
            destinations,
            location: ast.location(id),
        })
    }

    fn eval(&mut self, ast: &Ast, id: NodeId) -> Option<EvalStmt> {
        let mut evaluators = vec![];
        let mut node = id;
        if ast.category(id) == Category::UsingStmt {
            let NodeData::Functions(functions) = &ast.node(id).data else {
                return None;
            };
            for &f in functions {
                let evaluator = if is_called(ast, ast.rightmost(f)) {
                    self.call(ast, f).map(boxed)
                } else {
                    self.expression(ast, f)
                };
                evaluators.extend(evaluator);
            }
            node = ast.left(id)?;
        }
        Some(EvalStmt {
            sources: self.groups(ast, node, GroupRules::EVALUATED)?,
            evaluators,
            location: ast.location(id),
        })
    }
}

// Whether `id` is a name followed by an argument list, or the list itself.
fn is_called(ast: &Ast, id: NodeId) -> bool {
    let paren = |id: NodeId| ast.node(id).tag == NodeTag::Group(Bracket::Paren);
    paren(id) || ast.right(id).is_some_and(paren)
}

fn boxed(function: Function) -> Expression {
    Expression::Function(Box::new(function))
}

// Location of the node's own token, without its children.
fn head_location(tokens: &[Token]) -> Location {
    tokens.first().map(Token::location).unwrap_or_default()
}
