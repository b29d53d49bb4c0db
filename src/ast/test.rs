use super::*;
use crate::parser::parse;

fn first_statement(source: &str) -> (Ast, NodeId) {
    let ast = parse(source);
    let stmt = ast.statements[0];
    (ast, stmt)
}

#[test]
fn test_categories() {
    assert_eq!(NodeTag::From.category(), Category::FromStmt);
    assert_eq!(NodeTag::Begin.category(), Category::Block);
    assert_eq!(NodeTag::Operator(Operator::Pow).category(), Category::Op);
    assert_eq!(NodeTag::Group(Bracket::Square).category(), Category::Expr);
    assert_eq!(NodeTag::Name("x".into()).category(), Category::Name);
}

#[test]
fn test_beats() {
    let (ast, root) = first_statement("a = 1 + 2");
    // `=` is the root, `+` its right child
    let plus = ast.right(root).unwrap();
    assert!(matches!(ast.node(plus).tag, NodeTag::Operator(Operator::Add)));
    assert!(ast.beats(root, plus));
    assert!(!ast.beats(plus, root));
}

#[test]
fn test_unary_defense() {
    let (ast, root) = first_statement("-a");
    assert_eq!(ast.defense(root), UNARY_DEFENSE);
    let (ast, root) = first_statement("b - a");
    assert_eq!(ast.defense(root), ADD.1);
}

#[test]
fn test_rightmost_and_parent_where() {
    let (ast, root) = first_statement("FROM a SELECT 10 b");
    let b = ast.rightmost(root);
    assert_eq!(ast.node(b).name(), Some("b"));
    let select = ast.parent_where(b, |n| n.category() == Category::SelectStmt);
    assert_eq!(select, Some(root));
    assert_eq!(ast.parent_where(b, |n| n.category() == Category::UsingStmt), None);
}

#[test]
fn test_clone_node_is_shallow() {
    let (mut ast, root) = first_statement("a + b");
    let copy = ast.clone_node(root);
    assert_eq!(ast.left(copy), ast.left(root));
    assert_eq!(ast.parent(copy), None);
    // children still belong to the original
    assert_eq!(ast.parent(ast.left(copy).unwrap()), Some(root));
}

#[test]
fn test_clone_detach_is_deep() {
    let (mut ast, root) = first_statement("a = f(x=1) + b");
    let copy = ast.clone_detach(root);
    assert_ne!(ast.left(copy), ast.left(root));
    assert_eq!(ast.format(copy), ast.format(root));

    let left = ast.left(copy).unwrap();
    assert_eq!(ast.parent(left), Some(copy));

    ast.detach(left);
    assert_eq!(ast.left(copy), None);
    assert_eq!(ast.parent(left), None);
    // the original is untouched
    assert_eq!(ast.format(root), "={a,+{f{,<{(}={x,1.0}{)}>},b}}");
}

#[test]
fn test_text_and_location() {
    let (ast, root) = first_statement("x = 1\n  y = cfg.size");
    let _ = root;
    let ast_second = ast.statements[1];
    let dot = ast.right(ast_second).unwrap();
    assert_eq!(ast.text(dot), "cfg.size");
    let loc = ast.location(dot);
    assert_eq!((loc.line, loc.col), (2, 7));
}

#[test]
fn test_literal_display() {
    assert_eq!(Literal::Number(10.0).to_string(), "10.0");
    assert_eq!(Literal::Number(0.25).to_string(), "0.25");
    assert_eq!(Literal::Bool(true).to_string(), "True");
    assert_eq!(Literal::Null.to_string(), "Null");
}

#[test]
fn test_blocks_order() {
    let ast = parse("BEGIN b\nEND\nBEGIN a\nEND");
    let names: Vec<_> = ast.blocks().keys().cloned().collect();
    assert_eq!(names, vec!["_init", "b", "a"]);
}
