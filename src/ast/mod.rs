use indexmap::IndexMap;

use std::fmt;

use crate::diagnostics::{Diagnostic, Location};
use crate::lexer::Token;

#[cfg(test)]
pub mod test;

pub type NodeId = usize;

// Name of the implicit block holding statements before the first `BEGIN`.
pub const INIT_BLOCK_NAME: &str = "_init";

// Binding powers. Lower numbers bind tighter: a new node climbs above a
// parent when `attack >= parent.defense`.
pub const OPERAND: (u8, u8) = (0, 0);
// Defense of an operand followed by a juxtaposed name, as in `10 group`.
pub const JUXTAPOSED_DEFENSE: u8 = 20;
pub const UNARY_DEFENSE: u8 = 35;
pub const DOT: (u8, u8) = (10, 10);
pub const POW: (u8, u8) = (30, 31);
pub const MUL: (u8, u8) = (40, 40);
pub const ADD: (u8, u8) = (50, 50);
pub const ASSIGN: (u8, u8) = (60, 60);
pub const COMMA: (u8, u8) = (70, 70);
pub const SOURCE: (u8, u8) = (80, 80);
pub const DESTINATION: (u8, u8) = (90, 90);
pub const USING: (u8, u8) = (100, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Paren,
    Square,
    Brace,
}

impl Bracket {
    pub fn open(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
            Bracket::Brace => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Brace => '}',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
        }
    }

    pub fn binding(self) -> (u8, u8) {
        match self {
            Operator::Add | Operator::Sub => ADD,
            Operator::Mul | Operator::Div | Operator::Mod => MUL,
            Operator::Pow => POW,
        }
    }

    pub fn is_potential_unary(self) -> bool {
        matches!(self, Operator::Add | Operator::Sub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{:?}", n),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Null => write!(f, "Null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTag {
    From,
    Select,
    Join,
    Into,
    Using,
    Eval,
    Yield,
    Begin,
    Repeat,
    End,
    Name(String),
    Constant(Literal),
    Operator(Operator),
    Dot,
    Assign,
    Comma,
    // Bracketed expression; the inner root is `expr[0]`.
    Group(Bracket),
    Close(Bracket),
    Pragma(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    FromStmt,
    SelectStmt,
    JoinStmt,
    IntoStmt,
    UsingStmt,
    EvalStmt,
    YieldStmt,
    Block,
    RepeatBlock,
    End,
    Name,
    Constant,
    Op,
    Dot,
    Assign,
    Comma,
    Expr,
    Close,
    Pragma,
}

impl NodeTag {
    pub fn category(&self) -> Category {
        match self {
            NodeTag::From => Category::FromStmt,
            NodeTag::Select => Category::SelectStmt,
            NodeTag::Join => Category::JoinStmt,
            NodeTag::Into => Category::IntoStmt,
            NodeTag::Using => Category::UsingStmt,
            NodeTag::Eval => Category::EvalStmt,
            NodeTag::Yield => Category::YieldStmt,
            NodeTag::Begin => Category::Block,
            NodeTag::Repeat => Category::RepeatBlock,
            NodeTag::End => Category::End,
            NodeTag::Name(_) => Category::Name,
            NodeTag::Constant(_) => Category::Constant,
            NodeTag::Operator(_) => Category::Op,
            NodeTag::Dot => Category::Dot,
            NodeTag::Assign => Category::Assign,
            NodeTag::Comma => Category::Comma,
            NodeTag::Group(_) => Category::Expr,
            NodeTag::Close(_) => Category::Close,
            NodeTag::Pragma(_) => Category::Pragma,
        }
    }

    // `(attack, defense)` before any unary adjustment.
    pub fn binding(&self) -> (u8, u8) {
        match self {
            NodeTag::From | NodeTag::Join | NodeTag::Eval | NodeTag::Yield => SOURCE,
            NodeTag::Select | NodeTag::Into => DESTINATION,
            NodeTag::Using => USING,
            NodeTag::Operator(op) => op.binding(),
            NodeTag::Dot => DOT,
            NodeTag::Assign => ASSIGN,
            NodeTag::Comma => COMMA,
            _ => OPERAND,
        }
    }

    // Operands take juxtaposed right children; everything else is an
    // operator that expects a right operand.
    pub fn is_operand(&self) -> bool {
        matches!(
            self,
            NodeTag::Name(_) | NodeTag::Constant(_) | NodeTag::Group(_) | NodeTag::Pragma(_)
        )
    }

    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            NodeTag::From => "FROM",
            NodeTag::Select => "SELECT",
            NodeTag::Join => "JOIN",
            NodeTag::Into => "INTO",
            NodeTag::Using => "USING",
            NodeTag::Eval => "EVAL",
            NodeTag::Yield => "YIELD",
            NodeTag::Begin => "BEGIN",
            NodeTag::Repeat => "REPEAT",
            NodeTag::End => "END",
            _ => return None,
        })
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword() {
            return write!(f, "{}", keyword);
        }
        match self {
            NodeTag::Name(name) => write!(f, "{}", name),
            NodeTag::Constant(lit) => write!(f, "{}", lit),
            NodeTag::Operator(op) => write!(f, "{}", op.symbol()),
            NodeTag::Dot => write!(f, "."),
            NodeTag::Assign => write!(f, "="),
            NodeTag::Comma => write!(f, ","),
            NodeTag::Group(b) => write!(f, "{}", b.open()),
            NodeTag::Close(b) => write!(f, "{}", b.close()),
            NodeTag::Pragma(text) => write!(f, "`{}", text),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub size: Option<NodeId>,
    pub name: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum NodeData {
    #[default]
    None,
    BlockName(String),
    Count(NodeId),
    Groups(Vec<GroupSpec>),
    Functions(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: NodeTag,
    pub attack: u8,
    defense: u8,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    // Non-owning back reference.
    pub parent: Option<NodeId>,
    pub tokens: Vec<Token>,
    pub expr: Vec<NodeId>,
    pub close: Option<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn new(tag: NodeTag, tokens: Vec<Token>) -> Self {
        let (attack, defense) = tag.binding();
        Node {
            tag,
            attack,
            defense,
            left: None,
            right: None,
            parent: None,
            tokens,
            expr: vec![],
            close: None,
            data: NodeData::None,
        }
    }

    pub fn category(&self) -> Category {
        self.tag.category()
    }

    pub fn is_potential_unary(&self) -> bool {
        matches!(self.tag, NodeTag::Operator(op) if op.is_potential_unary())
    }

    pub fn name(&self) -> Option<&str> {
        match &self.tag {
            NodeTag::Name(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub nodes: Vec<Node>,
    // Top-level statements in file order, including `BEGIN` blocks.
    pub statements: Vec<NodeId>,
    pub errors: Vec<Diagnostic>,
    // Outcome of each node already run through the validator.
    pub validated: IndexMap<NodeId, bool>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn category(&self, id: NodeId) -> Category {
        self.nodes[id].category()
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].left
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].right
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    // Effective defense. A potential unary without a left operand binds
    // only to its right, and an operand with a juxtaposed name keeps it.
    pub fn defense(&self, id: NodeId) -> u8 {
        let node = &self.nodes[id];
        if node.is_potential_unary() && node.left.is_none() {
            return UNARY_DEFENSE;
        }
        if node.tag.is_operand() {
            if let Some(right) = node.right {
                if !matches!(self.nodes[right].tag, NodeTag::Group(_)) {
                    return JUXTAPOSED_DEFENSE;
                }
            }
        }
        node.defense
    }

    // Whether `new` should be promoted above `parent`.
    pub fn beats(&self, new: NodeId, parent: NodeId) -> bool {
        let p = &self.nodes[parent];
        if self.nodes[new].is_potential_unary() && p.left.is_some() && p.right.is_none() {
            return false;
        }
        self.nodes[new].attack >= self.defense(parent)
    }

    pub fn set_left(&mut self, id: NodeId, child: Option<NodeId>) {
        self.nodes[id].left = child;
        if let Some(c) = child {
            self.nodes[c].parent = Some(id);
        }
    }

    pub fn set_right(&mut self, id: NodeId, child: Option<NodeId>) {
        self.nodes[id].right = child;
        if let Some(c) = child {
            self.nodes[c].parent = Some(id);
        }
    }

    // Shallow copy: same children, own child slots, no parent.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let mut node = self.nodes[id].clone();
        node.parent = None;
        self.add(node)
    }

    // Deep copy of the whole branch rooted at `id`.
    pub fn clone_detach(&mut self, id: NodeId) -> NodeId {
        let copy = self.clone_node(id);
        if let Some(left) = self.nodes[copy].left {
            let left = self.clone_detach(left);
            self.set_left(copy, Some(left));
        }
        if let Some(right) = self.nodes[copy].right {
            let right = self.clone_detach(right);
            self.set_right(copy, Some(right));
        }
        let expr = self.nodes[copy].expr.clone();
        let expr: Vec<_> = expr.into_iter().map(|e| self.clone_detach(e)).collect();
        for &e in &expr {
            self.nodes[e].parent = Some(copy);
        }
        self.nodes[copy].expr = expr;
        if let Some(close) = self.nodes[copy].close {
            let close = self.clone_node(close);
            self.nodes[close].parent = Some(copy);
            self.nodes[copy].close = Some(close);
        }
        copy
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            let p = &mut self.nodes[parent];
            if p.left == Some(id) {
                p.left = None;
            }
            if p.right == Some(id) {
                p.right = None;
            }
            p.expr.retain(|&e| e != id);
        }
    }

    pub fn parent_where(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut current = self.nodes[id].parent;
        while let Some(p) = current {
            if pred(&self.nodes[p]) {
                return Some(p);
            }
            current = self.nodes[p].parent;
        }
        None
    }

    pub fn rightmost(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(right) = self.nodes[current].right {
            current = right;
        }
        current
    }

    // Longest path from `id` down to a leaf, counting `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(id, 1)];
        while let Some((id, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            let node = &self.nodes[id];
            for child in [node.left, node.right].into_iter().flatten() {
                pending.push((child, depth + 1));
            }
            pending.extend(node.expr.iter().map(|&e| (e, depth + 1)));
        }
        deepest
    }

    pub fn full_tokens(&self, id: NodeId) -> Vec<Token> {
        let mut tokens = vec![];
        self.collect_tokens(id, &mut tokens);
        tokens.sort();
        tokens.dedup();
        tokens
    }

    fn collect_tokens(&self, id: NodeId, out: &mut Vec<Token>) {
        let node = &self.nodes[id];
        out.extend(node.tokens.iter().cloned());
        for child in [node.left, node.right, node.close].into_iter().flatten() {
            self.collect_tokens(child, out);
        }
        if !matches!(node.tag, NodeTag::Begin | NodeTag::Repeat) {
            for &e in &node.expr {
                self.collect_tokens(e, out);
            }
        }
    }

    // Source text of the branch with whitespace removed.
    pub fn text(&self, id: NodeId) -> String {
        self.full_tokens(id)
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    pub fn location(&self, id: NodeId) -> Location {
        self.full_tokens(id)
            .first()
            .map(Token::location)
            .unwrap_or_default()
    }

    pub fn blocks(&self) -> IndexMap<String, Vec<NodeId>> {
        let mut blocks = IndexMap::new();
        blocks.insert(INIT_BLOCK_NAME.to_string(), vec![]);
        for &stmt in &self.statements {
            let node = &self.nodes[stmt];
            match (&node.tag, &node.data) {
                (NodeTag::Begin, NodeData::BlockName(name)) => {
                    if !name.is_empty() {
                        blocks
                            .entry(name.clone())
                            .or_insert_with(Vec::new)
                            .extend(node.expr.iter().copied());
                    }
                }
                (NodeTag::Begin, _) => {}
                _ => blocks
                    .entry(INIT_BLOCK_NAME.to_string())
                    .or_insert_with(Vec::new)
                    .push(stmt),
            }
        }
        blocks
    }

    pub fn format(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.format_into(id, &mut out);
        out
    }

    fn format_into(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.tag {
            NodeTag::Begin | NodeTag::Repeat => {
                out.push_str("<{");
                out.push_str(node.tag.keyword().unwrap_or_default());
                out.push(':');
                match &node.data {
                    NodeData::BlockName(name) => out.push_str(name),
                    NodeData::Count(count) => self.format_into(*count, out),
                    _ => {}
                }
                out.push_str("};");
                for (i, &stmt) in node.expr.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    self.format_into(stmt, out);
                }
                out.push(';');
                self.format_close(node.close, out);
                out.push('>');
            }
            NodeTag::Group(_) => {
                out.push_str("<{");
                out.push_str(&node.tag.to_string());
                out.push('}');
                for &e in &node.expr {
                    self.format_into(e, out);
                }
                self.format_close(node.close, out);
                out.push('>');
                if let Some(right) = node.right {
                    out.push_str("{,");
                    self.format_into(right, out);
                    out.push('}');
                }
            }
            tag => {
                out.push_str(&tag.to_string());
                if node.left.is_some() || node.right.is_some() {
                    out.push('{');
                    if let Some(left) = node.left {
                        self.format_into(left, out);
                    }
                    out.push(',');
                    if let Some(right) = node.right {
                        self.format_into(right, out);
                    }
                    out.push('}');
                }
            }
        }
    }

    fn format_close(&self, close: Option<NodeId>, out: &mut String) {
        match close {
            Some(c) => {
                out.push('{');
                out.push_str(&self.nodes[c].tag.to_string());
                out.push('}');
            }
            None => out.push_str("{?}"),
        }
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let statements: Vec<_> = self.statements.iter().map(|&s| self.format(s)).collect();
        write!(f, "{}", statements.join(";"))
    }
}
