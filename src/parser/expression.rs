use crate::ast::{Bracket, Literal, Node, NodeId, NodeTag, Operator};
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::lexer::{Tag, Token};
use crate::parser::{ParseResult, Parser};

use tracing::trace;

// Deepest bracket nesting accepted in one statement.
pub const MAX_NESTING: usize = 64;
// Deepest tree accepted for one statement. Later stages walk the tree
// recursively.
pub const MAX_DEPTH: usize = 256;

// Root and most recently inserted node of the tree being built.
#[derive(Debug, Default)]
struct Tree {
    root: Option<NodeId>,
    current: Option<NodeId>,
}

impl Parser<'_> {
    // Builds a tree from one line's worth of tokens. Returns `None` for an
    // empty slice.
    pub fn parse_expression(&mut self, tokens: &[Token]) -> ParseResult<Option<NodeId>> {
        let mut pos = 0;
        let (root, _) = self.parse_until(tokens, &mut pos, None, 0)?;
        if let (Some(root), Some(first)) = (root, tokens.first()) {
            if self.ast.depth(root) > MAX_DEPTH {
                return Err(Diagnostic::new(ErrorKind::InvalidSyntax, first.location()));
            }
        }
        Ok(root)
    }

    // Parses until the closing bracket matching `open`, or the end of the
    // slice when `open` is `None`. Returns the root and the close node.
    fn parse_until(
        &mut self,
        tokens: &[Token],
        pos: &mut usize,
        open: Option<(Bracket, &Token)>,
        nesting: usize,
    ) -> ParseResult<(Option<NodeId>, Option<NodeId>)> {
        let mut tree = Tree::default();

        while *pos < tokens.len() {
            let token = &tokens[*pos];
            *pos += 1;

            match token.tag {
                Tag::Error => {
                    return Err(Diagnostic::new(ErrorKind::InvalidSyntax, token.location()));
                }
                Tag::Begin | Tag::Repeat | Tag::End => {
                    return Err(Diagnostic::with_arg(
                        ErrorKind::UnexpectedStatement,
                        token.location(),
                        token.value.to_ascii_uppercase(),
                    ));
                }
                Tag::Comment | Tag::Eos => {}
                Tag::LParen | Tag::LBracket | Tag::LBrace => {
                    if nesting >= MAX_NESTING {
                        return Err(Diagnostic::new(ErrorKind::InvalidSyntax, token.location()));
                    }
                    let bracket = bracket_of(token.tag);
                    let group = self
                        .ast
                        .add(Node::new(NodeTag::Group(bracket), vec![token.clone()]));
                    self.insert(&mut tree, group);

                    let (inner, close) =
                        self.parse_until(tokens, pos, Some((bracket, token)), nesting + 1)?;
                    if let Some(inner) = inner {
                        self.ast.node_mut(inner).parent = Some(group);
                        self.ast.node_mut(group).expr.push(inner);
                    }
                    self.ast.node_mut(group).close = close;
                }
                Tag::RParen | Tag::RBracket | Tag::RBrace => {
                    let bracket = bracket_of(token.tag);
                    return match open {
                        Some((expected, _)) if expected == bracket => {
                            let close = self
                                .ast
                                .add(Node::new(NodeTag::Close(bracket), vec![token.clone()]));
                            Ok((tree.root, Some(close)))
                        }
                        Some((expected, open_token)) => Err(Diagnostic::with_arg(
                            ErrorKind::UnmatchedBracket,
                            open_token.location(),
                            expected.close(),
                        )),
                        None => Err(Diagnostic::with_arg(
                            ErrorKind::UnmatchedBracket,
                            token.location(),
                            bracket.open(),
                        )),
                    };
                }
                _ => {
                    let node = self.ast.add(Node::new(tag_of(token), vec![token.clone()]));
                    self.insert(&mut tree, node);
                }
            }
        }

        match open {
            Some((bracket, open_token)) => Err(Diagnostic::with_arg(
                ErrorKind::UnmatchedBracket,
                open_token.location(),
                bracket.close(),
            )),
            None => Ok((tree.root, None)),
        }
    }

    // Places `node` in the tree. Operands and prefix operators fill the
    // empty right slot of the current node; any other operator climbs from
    // the current node while it beats the parent and adopts what it passed
    // as its left child.
    fn insert(&mut self, tree: &mut Tree, node: NodeId) {
        let Some(current) = tree.current else {
            tree.root = Some(node);
            tree.current = Some(node);
            return;
        };

        let is_operand = self.ast.node(node).tag.is_operand();
        let after_operand = self.ast.node(current).tag.is_operand();

        if is_operand || !after_operand {
            self.ast.set_right(current, Some(node));
        } else {
            let mut x = current;
            while let Some(parent) = self.ast.parent(x) {
                if !self.ast.beats(node, parent) {
                    break;
                }
                x = parent;
            }
            let parent = self.ast.parent(x);
            self.ast.set_left(node, Some(x));
            match parent {
                Some(parent) => self.ast.set_right(parent, Some(node)),
                None => tree.root = Some(node),
            }
            trace!(node = %self.ast.node(node).tag, "promoted");
        }
        tree.current = Some(node);
    }
}

fn bracket_of(tag: Tag) -> Bracket {
    match tag {
        Tag::LBracket | Tag::RBracket => Bracket::Square,
        Tag::LBrace | Tag::RBrace => Bracket::Brace,
        _ => Bracket::Paren,
    }
}

fn tag_of(token: &Token) -> NodeTag {
    match token.tag {
        Tag::From => NodeTag::From,
        Tag::Select => NodeTag::Select,
        Tag::Join => NodeTag::Join,
        Tag::Into => NodeTag::Into,
        Tag::Using => NodeTag::Using,
        Tag::Eval => NodeTag::Eval,
        Tag::Yield => NodeTag::Yield,
        Tag::True => NodeTag::Constant(Literal::Bool(true)),
        Tag::False => NodeTag::Constant(Literal::Bool(false)),
        Tag::Null => NodeTag::Constant(Literal::Null),
        // non-finite values are reported by the validator
        Tag::Number => NodeTag::Constant(Literal::Number(
            token.value.parse().unwrap_or(f64::NAN),
        )),
        Tag::Plus => NodeTag::Operator(Operator::Add),
        Tag::Minus => NodeTag::Operator(Operator::Sub),
        Tag::Star => NodeTag::Operator(Operator::Mul),
        Tag::Slash => NodeTag::Operator(Operator::Div),
        Tag::Percent => NodeTag::Operator(Operator::Mod),
        Tag::Caret => NodeTag::Operator(Operator::Pow),
        Tag::Dot => NodeTag::Dot,
        Tag::Assign => NodeTag::Assign,
        Tag::Comma => NodeTag::Comma,
        Tag::Pragma => NodeTag::Pragma(token.value.clone()),
        _ => NodeTag::Name(token.value.clone()),
    }
}
