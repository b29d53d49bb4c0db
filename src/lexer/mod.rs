use logos::Logos;
use tracing::debug;

use std::fmt;
use std::ops::Range;

use crate::diagnostics::Location;

#[cfg(test)]
pub mod test;

// Raw lexical classes, matched one physical line at a time.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\f\r]+")]
enum Lexeme {
    #[regex(r"(#|;|//)[^\r\n]*")]
    Comment,

    #[regex(r"\\[ \t]*((#|;|//)[^\r\n]*)?")]
    Continuation,

    #[regex(r"`[^\r\n]*")]
    Pragma,

    #[token("from", ignore(ascii_case))]
    From,
    #[token("select", ignore(ascii_case))]
    Select,
    #[token("join", ignore(ascii_case))]
    Join,
    #[token("into", ignore(ascii_case))]
    Into,
    #[token("using", ignore(ascii_case))]
    Using,
    #[token("yield", ignore(ascii_case))]
    Yield,
    #[token("eval", ignore(ascii_case))]
    #[token("evaluate", ignore(ascii_case))]
    Eval,
    #[token("begin", ignore(ascii_case))]
    Begin,
    #[token("repeat", ignore(ascii_case))]
    Repeat,
    #[token("end", ignore(ascii_case))]
    End,

    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("null", ignore(ascii_case))]
    #[token("none", ignore(ascii_case))]
    Null,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name,

    #[regex(r"([0-9]+\.[0-9]*|[0-9]+|\.[0-9]+)([eE][-+]?[0-9]+)?")]
    Number,

    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("=")]
    Assign,
    #[token(",")]
    Comma,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    From,
    Select,
    Join,
    Into,
    Using,
    Yield,
    Eval,
    Begin,
    Repeat,
    End,
    True,
    False,
    Null,
    Name,
    Number,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Assign,
    Comma,
    Star,
    Slash,
    Percent,
    Caret,
    Pragma,
    Comment,
    // Synthetic end of a logical line.
    Eos,
    // One unrecognised character.
    Error,
}

impl Lexeme {
    // `None` for continuations, which never survive into the token stream
    // as themselves.
    fn tag(self) -> Option<Tag> {
        Some(match self {
            Lexeme::Comment => Tag::Comment,
            Lexeme::Continuation => return None,
            Lexeme::Pragma => Tag::Pragma,
            Lexeme::From => Tag::From,
            Lexeme::Select => Tag::Select,
            Lexeme::Join => Tag::Join,
            Lexeme::Into => Tag::Into,
            Lexeme::Using => Tag::Using,
            Lexeme::Yield => Tag::Yield,
            Lexeme::Eval => Tag::Eval,
            Lexeme::Begin => Tag::Begin,
            Lexeme::Repeat => Tag::Repeat,
            Lexeme::End => Tag::End,
            Lexeme::True => Tag::True,
            Lexeme::False => Tag::False,
            Lexeme::Null => Tag::Null,
            Lexeme::Name => Tag::Name,
            Lexeme::Number => Tag::Number,
            Lexeme::Dot => Tag::Dot,
            Lexeme::LParen => Tag::LParen,
            Lexeme::RParen => Tag::RParen,
            Lexeme::LBracket => Tag::LBracket,
            Lexeme::RBracket => Tag::RBracket,
            Lexeme::LBrace => Tag::LBrace,
            Lexeme::RBrace => Tag::RBrace,
            Lexeme::Plus => Tag::Plus,
            Lexeme::Minus => Tag::Minus,
            Lexeme::Assign => Tag::Assign,
            Lexeme::Comma => Tag::Comma,
            Lexeme::Star => Tag::Star,
            Lexeme::Slash => Tag::Slash,
            Lexeme::Percent => Tag::Percent,
            Lexeme::Caret => Tag::Caret,
        })
    }
}

impl Tag {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Tag::From
                | Tag::Select
                | Tag::Join
                | Tag::Into
                | Tag::Using
                | Tag::Yield
                | Tag::Eval
                | Tag::Begin
                | Tag::Repeat
                | Tag::End
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub tag: Tag,
    // Names and keywords are lowercased; pragmas hold the text after the
    // backtick.
    pub value: String,
    pub line: usize,
    pub col: usize,
    pub span: Range<usize>,
}

impl Token {
    pub fn location(&self) -> Location {
        Location::new(self.line, self.col, self.span.clone())
    }

    pub fn is(&self, tag: Tag) -> bool {
        self.tag == tag
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.line, self.col, self.tag, &self.value).cmp(&(
            other.line,
            other.col,
            other.tag,
            &other.value,
        ))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Tag::Eos => write!(f, "<eos>"),
            Tag::Pragma => write!(f, "`{}", self.value),
            _ => write!(f, "{}", self.value),
        }
    }
}

// Tokenizes `source`, dropping comments. Every logical line ends with an
// `Tag::Eos` token.
pub fn tokenize(source: &str) -> Vec<Token> {
    tokenize_all(source)
        .into_iter()
        .filter(|t| t.tag != Tag::Comment)
        .collect()
}

// Tokenizes `source`, keeping comment tokens.
pub fn tokenize_all(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    let mut lines = 0;
    let mut continued = false;

    for (index, raw) in source.split_inclusive('\n').enumerate() {
        let line = index + 1;
        let text = raw.trim_end_matches(['\n', '\r']);
        let mut continuation = None;
        lines += 1;

        let mut lex = Lexeme::lexer(text);
        while let Some(result) = lex.next() {
            let range = lex.span();
            let slice = lex.slice();
            let col = text[..range.start].chars().count() + 1;
            let span = offset + range.start..offset + range.end;
            match result {
                Ok(lexeme) => {
                    let (tag, value) = match lexeme.tag() {
                        // an error unless it turns out to be last on the line
                        None => {
                            continuation = Some(tokens.len());
                            (Tag::Error, "\\".to_string())
                        }
                        Some(Tag::Pragma) => (Tag::Pragma, slice[1..].to_string()),
                        Some(tag @ (Tag::Number | Tag::Comment)) => (tag, slice.to_string()),
                        Some(tag) => (tag, slice.to_ascii_lowercase()),
                    };
                    tokens.push(Token {
                        tag,
                        value,
                        line,
                        col,
                        span,
                    });
                }
                Err(()) => {
                    for (i, c) in slice.char_indices() {
                        let at = offset + range.start + i;
                        tokens.push(Token {
                            tag: Tag::Error,
                            value: c.to_string(),
                            line,
                            col: text[..range.start + i].chars().count() + 1,
                            span: at..at + c.len_utf8(),
                        });
                    }
                }
            }
        }

        continued = matches!(continuation, Some(at) if at + 1 == tokens.len());
        if continued {
            tokens.pop();
        }

        if !continued {
            let end = offset + text.len();
            tokens.push(Token {
                tag: Tag::Eos,
                value: String::new(),
                line,
                col: text.chars().count() + 1,
                span: end..end,
            });
        }
        offset += raw.len();
    }

    if continued || source.is_empty() {
        let line = lines.max(1);
        tokens.push(Token {
            tag: Tag::Eos,
            value: String::new(),
            line,
            col: 1,
            span: offset..offset,
        });
    }

    debug!(tokens = tokens.len(), lines, "tokenized definition");
    tokens
}
