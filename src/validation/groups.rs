use crate::ast::{Ast, Bracket, Category, GroupSpec, Literal, NodeData, NodeId, NodeTag};
use crate::diagnostics::ErrorKind;
use crate::validation::{list_items, report, report_arg, validate_name, validate_op};

// What a statement accepts in its right-hand group list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRules {
    pub allow_sizes: bool,
    pub allow_functions: bool,
    // Reported when a group name appears twice.
    pub repeats: Option<ErrorKind>,
    // Reported for an entry that is not a name or call.
    pub invalid: ErrorKind,
}

impl GroupRules {
    pub const SOURCES: GroupRules = GroupRules {
        allow_sizes: false,
        allow_functions: true,
        repeats: None,
        invalid: ErrorKind::InvalidGroup,
    };
    pub const DESTINATIONS: GroupRules = GroupRules {
        allow_sizes: true,
        allow_functions: false,
        repeats: Some(ErrorKind::RepeatedDestinationGroup),
        invalid: ErrorKind::InvalidGroup,
    };
    pub const EVALUATED: GroupRules = GroupRules {
        allow_sizes: false,
        allow_functions: false,
        repeats: Some(ErrorKind::RepeatedGroup),
        invalid: ErrorKind::InvalidGroup,
    };
    pub const FUNCTIONS: GroupRules = GroupRules {
        allow_sizes: false,
        allow_functions: true,
        repeats: None,
        invalid: ErrorKind::InvalidFunctionCall,
    };
}

// Splits one list entry into `(size, name)`. The entry is deep-copied
// first so the statement tree is left intact.
pub fn split_entry(ast: &mut Ast, entry: NodeId) -> (Option<NodeId>, NodeId) {
    let size = ast.clone_detach(entry);
    let mut name = ast.rightmost(size);

    if ast.category(name) == Category::Expr {
        name = ast.parent(name).unwrap_or(size);
    }
    if ast.category(name) == Category::Name {
        while let Some(parent) = ast.parent(name) {
            if ast.category(parent) != Category::Dot {
                break;
            }
            name = parent;
        }
    }

    if name == size {
        (None, name)
    } else {
        ast.detach(name);
        (Some(size), name)
    }
}

// Reads the groups in `ast.right(id)` into `ast.node(id).data`.
pub fn update_groups(ast: &mut Ast, id: NodeId, rules: GroupRules) -> bool {
    let specs = read_groups(ast, id, rules);
    ast.node_mut(id).data = NodeData::Groups(specs.0);
    specs.1
}

// Reads the USING list into function name nodes.
pub fn update_functions(ast: &mut Ast, id: NodeId) -> bool {
    if ast.right(id).is_none() {
        let evaluating = ast
            .left(id)
            .is_some_and(|l| ast.category(l) == Category::EvalStmt);
        let kind = if evaluating {
            ErrorKind::ExpectedEvaluator
        } else {
            ErrorKind::ExpectedFilter
        };
        ast.node_mut(id).data = NodeData::Functions(vec![]);
        return report(ast, kind, id);
    }
    let (specs, result) = read_groups(ast, id, GroupRules::FUNCTIONS);
    ast.node_mut(id).data = NodeData::Functions(specs.into_iter().map(|s| s.name).collect());
    result
}

fn read_groups(ast: &mut Ast, id: NodeId, rules: GroupRules) -> (Vec<GroupSpec>, bool) {
    let mut specs: Vec<GroupSpec> = vec![];
    let mut names: Vec<String> = vec![];
    let mut result = true;
    let mut seen_any = false;
    let mut seen_unsized = false;

    let list = ast.right(id);
    for entry in list_items(ast, list) {
        let (size, name) = split_entry(ast, entry);
        let text = ast.text(name);
        let last = ast.rightmost(name);

        if let Some(size) = size.filter(|&s| !is_size(ast, s)) {
            result &= report_arg(ast, ErrorKind::InvalidGroupSize, size, &text);
            seen_any = true;
        } else if let Some(size) = size.filter(|_| !rules.allow_sizes) {
            result &= report_arg(ast, ErrorKind::UnexpectedGroupSize, size, &text);
            seen_any = true;
        } else if matches!(ast.node(last).tag, NodeTag::Group(Bracket::Paren))
            && !rules.allow_functions
        {
            let called = ast.parent(last).map(|p| ast.category(p));
            if called == Some(Category::Name) {
                result &= report(ast, ErrorKind::GeneratorAsDestination, name);
            } else {
                result &= report(ast, rules.invalid, last);
            }
            seen_any = true;
        } else if matches!(ast.node(last).tag, NodeTag::Group(Bracket::Square | Bracket::Brace))
            || !matches!(ast.category(name), Category::Name | Category::Dot)
        {
            result &= report(ast, rules.invalid, name);
            seen_any = true;
        } else {
            if let Some(kind) = rules.repeats {
                if names.contains(&text) {
                    result &= report_arg(ast, kind, name, &text);
                }
            }
            result &= validate_name(ast, name);
            result &= validate_op(ast, size);
            names.push(text.clone());
            specs.push(GroupSpec { size, name });
        }

        if seen_unsized {
            result &= report_arg(ast, ErrorKind::InaccessibleGroup, name, &text);
        }
        if rules.allow_sizes && size.is_none() {
            seen_unsized = true;
        }
    }

    if specs.is_empty() && !seen_any {
        result &= report(ast, ErrorKind::ExpectedGroup, list.unwrap_or(id));
    }
    (specs, result)
}

// A number, a name or a single parenthesised expression.
fn is_size(ast: &Ast, size: NodeId) -> bool {
    let node = ast.node(size);
    match &node.tag {
        NodeTag::Constant(Literal::Number(n)) => *n >= 0.0 || n.is_nan(),
        NodeTag::Name(_) | NodeTag::Dot => true,
        NodeTag::Group(Bracket::Paren) => match node.expr.as_slice() {
            [inner] => ast.category(*inner) != Category::Comma,
            _ => false,
        },
        _ => false,
    }
}
