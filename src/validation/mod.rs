use tracing::debug;

use crate::ast::{Ast, Bracket, Category, Literal, NodeData, NodeId, NodeTag};
use crate::diagnostics::{Diagnostic, ErrorKind};

pub mod groups;

use groups::{GroupRules, update_functions, update_groups};


// Validates every statement in `ast`. Returns `false` when at least one
// hard error was recorded.
pub fn validate_ast(ast: &mut Ast) -> bool {
    let before = ast.errors.len();
    let mut result = true;
    for stmt in ast.statements.clone() {
        result &= validate(ast, stmt);
    }
    debug!(
        diagnostics = ast.errors.len() - before,
        ok = result,
        "validated syntax tree"
    );
    result
}

// Validates one statement, caching group and function lists in the
// statement nodes' `data`. A node is only checked once; later calls
// return the first outcome.
pub fn validate(ast: &mut Ast, id: NodeId) -> bool {
    if let Some(&result) = ast.validated.get(&id) {
        return result;
    }
    let result = check(ast, id);
    ast.validated.insert(id, result);
    result
}

fn check(ast: &mut Ast, id: NodeId) -> bool {
    let mut result = true;
    match ast.category(id) {
        Category::Block | Category::RepeatBlock => {
            if let NodeData::Count(count) = ast.node(id).data {
                result &= validate_op(ast, Some(count));
            }
            for stmt in ast.node(id).expr.clone() {
                result &= validate(ast, stmt);
            }
        }
        Category::FromStmt | Category::JoinStmt => {
            result &= validate_source(ast, id);
            result &= update_groups(ast, id, GroupRules::SOURCES);
        }
        Category::SelectStmt | Category::IntoStmt => {
            result &= validate_destination(ast, id);
            result &= update_groups(ast, id, GroupRules::DESTINATIONS);
        }
        Category::UsingStmt => {
            result &= validate_using(ast, id);
            result &= update_functions(ast, id);
        }
        Category::EvalStmt | Category::YieldStmt => {
            result &= validate_terminal(ast, id);
            result &= update_groups(ast, id, GroupRules::EVALUATED);
        }
        Category::Pragma => {
            if ast.parent(id).is_some() {
                result &= report(ast, ErrorKind::InvalidSyntax, id);
            }
        }
        Category::End | Category::Close => {}
        _ => result &= validate_op(ast, Some(id)),
    }
    result
}

// Records `kind` at `id` and returns whether it was only a warning.
pub(crate) fn report(ast: &mut Ast, kind: ErrorKind, id: NodeId) -> bool {
    let location = ast.location(id);
    ast.errors.push(Diagnostic::new(kind, location));
    kind.is_warning()
}

pub(crate) fn report_arg(ast: &mut Ast, kind: ErrorKind, id: NodeId, arg: &str) -> bool {
    let location = ast.location(id);
    ast.errors.push(Diagnostic::with_arg(kind, location, arg));
    kind.is_warning()
}

fn validate_source(ast: &mut Ast, id: NodeId) -> bool {
    let (expected, missing) = match ast.category(id) {
        Category::FromStmt => (Category::SelectStmt, ErrorKind::ExpectedSelect),
        _ => (Category::IntoStmt, ErrorKind::ExpectedInto),
    };
    match ast.parent(id) {
        None => return report(ast, missing, id),
        Some(parent) if ast.category(parent) != expected || ast.left(parent) != Some(id) => {
            return report(ast, missing, parent);
        }
        Some(_) => {}
    }
    if ast.left(id).is_some() {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    true
}

fn validate_destination(ast: &mut Ast, id: NodeId) -> bool {
    let source = match ast.category(id) {
        Category::SelectStmt => Category::FromStmt,
        _ => Category::JoinStmt,
    };
    if !is_statement_position(ast, id) {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    match ast.left(id) {
        Some(left) if ast.category(left) == source => validate(ast, left),
        Some(left) => report(ast, ErrorKind::InvalidSyntax, left),
        None => report(ast, ErrorKind::InvalidSyntax, id),
    }
}

fn validate_using(ast: &mut Ast, id: NodeId) -> bool {
    if ast.parent(id).is_some() {
        return report_arg(ast, ErrorKind::UnexpectedStatement, id, "USING");
    }
    match ast.left(id) {
        Some(left)
            if matches!(
                ast.category(left),
                Category::SelectStmt | Category::IntoStmt | Category::EvalStmt
            ) =>
        {
            validate(ast, left)
        }
        _ => report_arg(ast, ErrorKind::UnexpectedStatement, id, "USING"),
    }
}

// EVAL may be followed by USING; YIELD must stand alone.
fn validate_terminal(ast: &mut Ast, id: NodeId) -> bool {
    let allowed = match ast.category(id) {
        Category::EvalStmt => is_statement_position(ast, id),
        _ => ast.parent(id).is_none(),
    };
    if !allowed {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    if ast.left(id).is_some() {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    true
}

// A statement root, or the left child of a USING root.
fn is_statement_position(ast: &Ast, id: NodeId) -> bool {
    match ast.parent(id) {
        None => true,
        Some(parent) => {
            ast.category(parent) == Category::UsingStmt
                && ast.left(parent) == Some(id)
                && ast.parent(parent).is_none()
        }
    }
}

pub fn validate_op(ast: &mut Ast, id: Option<NodeId>) -> bool {
    let Some(id) = id else {
        return true;
    };
    match ast.node(id).tag.clone() {
        NodeTag::Assign => validate_assign(ast, id),
        NodeTag::Name(_) | NodeTag::Dot => validate_name(ast, id),
        NodeTag::Comma => validate_comma(ast, id),
        NodeTag::Operator(op) => {
            let left = ast.left(id);
            let right = ast.right(id);
            if !op.is_potential_unary() && left.is_none() {
                return report(ast, ErrorKind::InvalidSyntax, id);
            }
            if right.is_none() {
                return report(ast, ErrorKind::InvalidSyntax, id);
            }
            let l = validate_op(ast, left);
            let r = validate_op(ast, right);
            l && r
        }
        NodeTag::Constant(lit) => {
            if let Literal::Number(n) = lit {
                if !n.is_finite() {
                    let text = ast.text(id);
                    return report_arg(ast, ErrorKind::InvalidNumber, id, &text);
                }
            }
            match ast.right(id) {
                Some(right) => report(ast, ErrorKind::InvalidSyntax, right),
                None => true,
            }
        }
        NodeTag::Group(Bracket::Brace) => report(ast, ErrorKind::InvalidSyntax, id),
        NodeTag::Group(_) => {
            let inner = ast.node(id).expr.first().copied();
            let mut result = validate_op(ast, inner);
            if let Some(right) = ast.right(id) {
                result &= report(ast, ErrorKind::InvalidSyntax, right);
            }
            result
        }
        NodeTag::Pragma(_) => report(ast, ErrorKind::InvalidSyntax, id),
        _ => validate(ast, id),
    }
}

fn validate_assign(ast: &mut Ast, id: NodeId) -> bool {
    let (Some(left), Some(right)) = (ast.left(id), ast.right(id)) else {
        return report(ast, ErrorKind::InvalidSyntax, id);
    };
    let target_ok = match &ast.node(left).tag {
        NodeTag::Name(_) => ast.right(left).is_none(),
        NodeTag::Dot => {
            let last = ast.rightmost(left);
            ast.category(last) == Category::Name
        }
        _ => false,
    };
    if !target_ok {
        return report(ast, ErrorKind::InvalidAssignment, left);
    }
    let l = validate_name(ast, left);
    let r = validate_op(ast, Some(right));
    l && r
}

fn validate_comma(ast: &mut Ast, id: NodeId) -> bool {
    let Some(left) = ast.left(id) else {
        return report(ast, ErrorKind::InvalidSyntax, id);
    };
    let right = ast.right(id);
    if right.is_none()
        && ast
            .parent(id)
            .is_some_and(|p| ast.category(p) == Category::Comma)
    {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    let l = validate_op(ast, Some(left));
    let r = validate_op(ast, right);
    l && r
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

pub fn validate_name(ast: &mut Ast, id: NodeId) -> bool {
    match ast.node(id).tag.clone() {
        NodeTag::Dot => {
            let (Some(left), Some(right)) = (ast.left(id), ast.right(id)) else {
                return report(ast, ErrorKind::InvalidSyntax, id);
            };
            let l = validate_name(ast, left);
            let r = validate_name(ast, right);
            l && r
        }
        NodeTag::Name(name) => {
            let mut result = true;
            if name.starts_with('_') {
                result &= report_arg(ast, ErrorKind::InternalVariableName, id, &name);
            } else if !is_valid_identifier(&name) {
                result &= report_arg(ast, ErrorKind::InvalidVariable, id, &name);
            }
            let Some(right) = ast.right(id) else {
                return result;
            };
            result &= match ast.node(right).tag {
                NodeTag::Group(Bracket::Paren) => validate_arguments(ast, right),
                NodeTag::Group(Bracket::Square) => validate_index(ast, right),
                _ => report(ast, ErrorKind::InvalidSyntax, right),
            };
            result
        }
        _ => validate_op(ast, Some(id)),
    }
}

pub fn list_items(ast: &Ast, id: Option<NodeId>) -> Vec<NodeId> {
    let mut items = vec![];
    let mut stack = vec![];
    stack.extend(id);
    while let Some(id) = stack.pop() {
        if ast.category(id) == Category::Comma {
            stack.extend(ast.right(id));
            stack.extend(ast.left(id));
        } else {
            items.push(id);
        }
    }
    items
}

// Each argument is either `name` or `name = expr`.
fn validate_arguments(ast: &mut Ast, group: NodeId) -> bool {
    let Some(inner) = ast.node(group).expr.first().copied() else {
        return true;
    };
    let mut result = true;
    if ast.category(inner) == Category::Comma {
        result &= validate_comma_shape(ast, inner);
    }
    for item in list_items(ast, Some(inner)) {
        result &= match ast.node(item).tag.clone() {
            NodeTag::Name(_) if ast.right(item).is_none() => validate_name(ast, item),
            NodeTag::Name(_) => report(ast, ErrorKind::ExpectedParameterValue, item),
            NodeTag::Assign => {
                let left = ast.left(item);
                let is_name = left.is_some_and(|l| {
                    ast.category(l) == Category::Name && ast.right(l).is_none()
                });
                if !is_name {
                    report(ast, ErrorKind::InvalidParameterName, item)
                } else if ast.right(item).is_none() {
                    report(ast, ErrorKind::ExpectedParameterValue, item)
                } else {
                    let value = ast.right(item);
                    validate_op(ast, value)
                }
            }
            _ => report(ast, ErrorKind::InvalidParameterName, item),
        };
    }
    result
}

// Comma structure only; the items are checked by the caller.
fn validate_comma_shape(ast: &mut Ast, id: NodeId) -> bool {
    if ast.left(id).is_none() {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    if ast.right(id).is_none()
        && ast
            .parent(id)
            .is_some_and(|p| ast.category(p) == Category::Comma)
    {
        return report(ast, ErrorKind::InvalidSyntax, id);
    }
    let mut result = true;
    for child in [ast.left(id), ast.right(id)].into_iter().flatten() {
        if ast.category(child) == Category::Comma {
            result &= validate_comma_shape(ast, child);
        }
    }
    result
}

fn validate_index(ast: &mut Ast, group: NodeId) -> bool {
    match ast.node(group).expr.first().copied() {
        None => report(ast, ErrorKind::ExpectedIndex, group),
        Some(inner) => validate_op(ast, Some(inner)),
    }
}
