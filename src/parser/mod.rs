pub mod expression;

use tracing::debug;

use crate::ast::{Ast, Node, NodeData, NodeId, NodeTag};
use crate::diagnostics::{Diagnostic, ErrorKind, Location};
use crate::lexer::{Tag, Token, tokenize};


type ParseResult<T> = Result<T, Diagnostic>;

// An open `BEGIN` or `REPEAT`.
#[derive(Debug)]
struct Frame {
    node: NodeId,
    // Reported as misplaced; parsed but never attached.
    dropped: bool,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ast: Ast,
    frames: Vec<Frame>,
    seen_block: bool,
}

// Tokenizes and parses a whole definition.
pub fn parse(source: &str) -> Ast {
    let tokens = tokenize(source);
    Parser::new(&tokens).parse_definition()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            ast: Ast::new(),
            frames: vec![],
            seen_block: false,
        }
    }

    // Parses one logical line at a time. A failing statement is reported
    // and dropped; parsing resumes at the next line.
    pub fn parse_definition(mut self) -> Ast {
        while self.pos < self.tokens.len() {
            let end = self.tokens[self.pos..]
                .iter()
                .position(|t| t.tag == Tag::Eos)
                .map_or(self.tokens.len(), |i| self.pos + i);
            let line: Vec<Token> = self.tokens[self.pos..end]
                .iter()
                .filter(|t| t.tag != Tag::Comment)
                .cloned()
                .collect();
            self.pos = end + 1;

            if line.is_empty() {
                continue;
            }
            if let Err(error) = self.parse_line(&line) {
                self.ast.errors.push(error);
            }
        }
        self.finish();

        debug!(
            statements = self.ast.statements.len(),
            errors = self.ast.errors.len(),
            "parsed definition"
        );
        self.ast
    }

    fn parse_line(&mut self, line: &[Token]) -> ParseResult<()> {
        match line[0].tag {
            Tag::Begin => self.parse_begin(line),
            Tag::Repeat => self.parse_repeat(line),
            Tag::End => self.parse_end(line),
            _ => {
                let stmt = self.parse_statement(line)?;
                if self.frames.is_empty() && self.seen_block {
                    return Err(Diagnostic::new(
                        ErrorKind::UnexpectedCommand,
                        line[0].location(),
                    ));
                }
                self.attach(stmt);
                Ok(())
            }
        }
    }

    fn parse_statement(&mut self, line: &[Token]) -> ParseResult<NodeId> {
        self.parse_expression(line)?
            .ok_or_else(|| Diagnostic::new(ErrorKind::InvalidSyntax, line[0].location()))
    }

    fn parse_begin(&mut self, line: &[Token]) -> ParseResult<()> {
        let nested = !self.frames.is_empty();
        if nested {
            self.ast.errors.push(Diagnostic::new(
                ErrorKind::UnexpectedBlockNesting,
                line[0].location(),
            ));
        }

        let name = match line.get(1) {
            Some(token) if token.tag == Tag::Name => token.value.clone(),
            _ => {
                self.ast.errors.push(Diagnostic::new(
                    ErrorKind::ExpectedBlockName,
                    line[0].location(),
                ));
                String::new()
            }
        };
        if let Some(extra) = line.get(2) {
            self.ast
                .errors
                .push(Diagnostic::new(ErrorKind::InvalidSyntax, extra.location()));
        }

        let mut node = Node::new(NodeTag::Begin, line.to_vec());
        node.data = NodeData::BlockName(name);
        let node = self.ast.add(node);
        self.frames.push(Frame {
            node,
            dropped: nested,
        });
        if !nested {
            self.seen_block = true;
        }
        Ok(())
    }

    fn parse_repeat(&mut self, line: &[Token]) -> ParseResult<()> {
        let misplaced = self.frames.is_empty() && self.seen_block;
        if misplaced {
            self.ast.errors.push(Diagnostic::new(
                ErrorKind::UnexpectedCommand,
                line[0].location(),
            ));
        }

        let node = self.ast.add(Node::new(NodeTag::Repeat, vec![line[0].clone()]));
        match self.parse_expression(&line[1..]) {
            Ok(Some(count)) => {
                self.ast.node_mut(count).parent = Some(node);
                self.ast.node_mut(node).data = NodeData::Count(count);
            }
            Ok(None) => self.ast.errors.push(Diagnostic::new(
                ErrorKind::ExpectedRepeatCount,
                line[0].location(),
            )),
            Err(error) => self.ast.errors.push(error),
        }
        self.frames.push(Frame {
            node,
            dropped: misplaced,
        });
        Ok(())
    }

    fn parse_end(&mut self, line: &[Token]) -> ParseResult<()> {
        let Some(frame) = self.frames.pop() else {
            return Err(Diagnostic::new(ErrorKind::UnmatchedEnd, line[0].location()));
        };
        // `END`, `END name` or `END REPEAT`
        let trailing = match line.get(1) {
            Some(token) if matches!(token.tag, Tag::Name | Tag::Repeat) => line.get(2),
            other => other,
        };
        if let Some(extra) = trailing {
            self.ast
                .errors
                .push(Diagnostic::new(ErrorKind::InvalidSyntax, extra.location()));
        }
        let end = self.ast.add(Node::new(NodeTag::End, line.to_vec()));
        self.ast.node_mut(end).parent = Some(frame.node);
        self.ast.node_mut(frame.node).close = Some(end);
        if !frame.dropped {
            self.attach(frame.node);
        }
        Ok(())
    }

    // Closes whatever is still open at the end of the source.
    fn finish(&mut self) {
        while let Some(frame) = self.frames.pop() {
            let (line, at) = self
                .tokens
                .last()
                .map_or((1, 0), |t| (t.line, t.span.end));
            self.ast.errors.push(Diagnostic::new(
                ErrorKind::UnexpectedEndOfDefinition,
                Location::new(line, 0, at..at),
            ));
            if !frame.dropped {
                self.attach(frame.node);
            }
        }
    }

    fn attach(&mut self, stmt: NodeId) {
        match self.frames.last() {
            Some(frame) => {
                let block = frame.node;
                self.ast.node_mut(block).expr.push(stmt);
            }
            None => self.ast.statements.push(stmt),
        }
    }
}
