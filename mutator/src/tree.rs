//! Persistent syntax tree.
//!
//! Green nodes are immutable and shared: a rewrite rebuilds only the spine
//! from the rewritten node up to the root, every other subtree is reused by
//! pointer. [`SyntaxNode`] is a cursor over a green node that also knows
//! where it sits (parent and index), which is what the legality walk needs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Source location of a parsed node. Synthesized nodes carry no span.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line_start: usize,
    pub line_end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line_start: usize, line_end: usize) -> Self {
        Self { start, end, line_start, line_end }
    }

    /// Smallest span covering both.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line_start: self.line_start.min(other.line_start),
            line_end: self.line_end.max(other.line_end),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SyntaxKind {
    // Declarations
    Program,
    FnDecl,
    ExceptionDecl,
    ParamList,
    Name,

    // Statements
    Block,
    LetStmt,
    AssignStmt,
    ExprStmt,
    IfStmt,
    WhileStmt,
    ForEachStmt,
    UsingStmt,
    TryStmt,
    CatchClause,
    CatchDecl,
    FinallyClause,
    ThrowStmt,
    ReturnStmt,

    // Expressions
    IntLit,
    BoolLit,
    StrLit,
    NameRef,
    Binary,
    Unary,
    Call,
    Index,
    NewObject,
    StackAlloc,
    Lambda,
}

impl SyntaxKind {
    /// Nodes that delimit a function or type: ancestor walks stop here.
    pub fn is_declaration(self) -> bool {
        matches!(self, SyntaxKind::Program | SyntaxKind::FnDecl | SyntaxKind::ExceptionDecl)
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            SyntaxKind::Block
                | SyntaxKind::LetStmt
                | SyntaxKind::AssignStmt
                | SyntaxKind::ExprStmt
                | SyntaxKind::IfStmt
                | SyntaxKind::WhileStmt
                | SyntaxKind::ForEachStmt
                | SyntaxKind::UsingStmt
                | SyntaxKind::TryStmt
                | SyntaxKind::ThrowStmt
                | SyntaxKind::ReturnStmt
        )
    }
}

/// Payload of a green node.
///
/// Child layout by kind:
/// - `FnDecl` (text = name): `[ParamList, Block]`
/// - `ExceptionDecl` (text = name): `[Name]` when a base type is given
/// - `ParamList`: `[Name*]`
/// - `Block`: statements
/// - `LetStmt` (text = variable): `[expr]`
/// - `AssignStmt`: `[target, expr]`, target is `NameRef` or `Index`
/// - `IfStmt`: `[cond, Block, (Block | IfStmt)?]`
/// - `WhileStmt`: `[cond, Block]`
/// - `ForEachStmt` / `UsingStmt` (text = variable): `[expr, Block]`
/// - `TryStmt`: `[Block, CatchClause*, FinallyClause?]`
/// - `CatchClause`: `[CatchDecl?, Block]`
/// - `CatchDecl` (text = exception type): `[Name]` when bound
/// - `FinallyClause`: `[Block]`
/// - `ThrowStmt` / `ReturnStmt`: `[expr?]`
/// - `Binary` / `Unary` (text = operator): operands
/// - `Call`: `[callee, args*]`
/// - `Index`: `[base, index]`
/// - `NewObject` (text = exception type): `[]`
/// - `StackAlloc`: `[length]`
/// - `Lambda`: `[ParamList, Block]`
/// - literals, `Name`, `NameRef`: text only
#[derive(Debug)]
pub struct GreenData {
    kind: SyntaxKind,
    text: Option<Rc<str>>,
    children: Vec<GreenNode>,
    span: Option<Span>,
}

#[derive(Clone)]
pub struct GreenNode(Rc<GreenData>);

impl GreenNode {
    pub fn new(kind: SyntaxKind, text: Option<&str>, children: Vec<GreenNode>, span: Option<Span>) -> Self {
        GreenNode(Rc::new(GreenData {
            kind,
            text: text.map(Rc::from),
            children,
            span,
        }))
    }

    pub fn kind(&self) -> SyntaxKind {
        self.0.kind
    }

    pub fn text(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    pub fn children(&self) -> &[GreenNode] {
        &self.0.children
    }

    pub fn child(&self, i: usize) -> Option<&GreenNode> {
        self.0.children.get(i)
    }

    pub fn span(&self) -> Option<Span> {
        self.0.span
    }

    /// Identity, not structure.
    pub fn ptr_eq(a: &GreenNode, b: &GreenNode) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Same node with a new child list. Keeps kind, text and span.
    pub fn with_children(&self, children: Vec<GreenNode>) -> GreenNode {
        GreenNode(Rc::new(GreenData {
            kind: self.0.kind,
            text: self.0.text.clone(),
            children,
            span: self.0.span,
        }))
    }

    /// Pre-order walk of every node below this one (not including it).
    pub fn descendants(&self) -> impl Iterator<Item = GreenNode> {
        let mut stack: Vec<GreenNode> = self.0.children.iter().rev().cloned().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.0.children.iter().rev().cloned());
            Some(next)
        })
    }

    pub fn first_child_of(&self, kind: SyntaxKind) -> Option<&GreenNode> {
        self.0.children.iter().find(|c| c.kind() == kind)
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.descendants().count()
    }
}

/// Structural equality. Spans are ignored so a re-parsed tree compares equal
/// to the tree it was printed from.
impl PartialEq for GreenNode {
    fn eq(&self, other: &Self) -> bool {
        GreenNode::ptr_eq(self, other)
            || (self.0.kind == other.0.kind
                && self.0.text == other.0.text
                && self.0.children == other.0.children)
    }
}

impl Eq for GreenNode {}

impl fmt::Debug for GreenNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut t = f.debug_tuple(&format!("{:?}", self.0.kind));
        if let Some(text) = &self.0.text {
            t.field(text);
        }
        for c in &self.0.children {
            t.field(c);
        }
        t.finish()
    }
}

struct NodeData {
    green: GreenNode,
    parent: Option<SyntaxNode>,
    index: usize,
}

/// Positioned view of a green node.
#[derive(Clone)]
pub struct SyntaxNode(Rc<NodeData>);

impl SyntaxNode {
    pub fn new_root(green: GreenNode) -> Self {
        SyntaxNode(Rc::new(NodeData { green, parent: None, index: 0 }))
    }

    pub fn green(&self) -> &GreenNode {
        &self.0.green
    }

    pub fn kind(&self) -> SyntaxKind {
        self.0.green.kind()
    }

    pub fn text(&self) -> Option<&str> {
        self.0.green.text()
    }

    pub fn span(&self) -> Option<Span> {
        self.0.green.span()
    }

    pub fn parent(&self) -> Option<SyntaxNode> {
        self.0.parent.clone()
    }

    /// Position among the parent's children.
    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn ancestors(&self) -> impl Iterator<Item = SyntaxNode> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    pub fn children(&self) -> impl Iterator<Item = SyntaxNode> + '_ {
        self.0.green.children().iter().enumerate().map(move |(index, green)| {
            SyntaxNode(Rc::new(NodeData {
                green: green.clone(),
                parent: Some(self.clone()),
                index,
            }))
        })
    }

    pub fn child(&self, index: usize) -> Option<SyntaxNode> {
        self.children().nth(index)
    }

    pub fn descendants(&self) -> impl Iterator<Item = SyntaxNode> {
        let mut stack: Vec<SyntaxNode> = self.children().collect();
        stack.reverse();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            let mut kids: Vec<SyntaxNode> = next.children().collect();
            kids.reverse();
            stack.extend(kids);
            Some(next)
        })
    }

    /// A cursor for `green` standing where this node stands.
    pub fn replace_with(&self, green: GreenNode) -> SyntaxNode {
        SyntaxNode(Rc::new(NodeData {
            green,
            parent: self.0.parent.clone(),
            index: self.0.index,
        }))
    }
}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxNode({:?}@{})", self.kind(), self.index())
    }
}

/// A whole parsed (or rewritten) compilation unit.
#[derive(Clone, Debug)]
pub struct SyntaxTree {
    root: GreenNode,
    path: PathBuf,
}

impl SyntaxTree {
    pub fn new(root: GreenNode, path: impl Into<PathBuf>) -> Self {
        Self { root, path: path.into() }
    }

    pub fn root(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.root.clone())
    }

    pub fn green(&self) -> &GreenNode {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// New tree over `root`, same origin path.
    pub fn with_root(&self, root: GreenNode) -> SyntaxTree {
        SyntaxTree { root, path: self.path.clone() }
    }

    /// Every block in the tree, pre-order.
    pub fn blocks(&self) -> impl Iterator<Item = SyntaxNode> {
        self.root().descendants().filter(|n| n.kind() == SyntaxKind::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: SyntaxKind, text: &str) -> GreenNode {
        GreenNode::new(kind, Some(text), vec![], None)
    }

    #[test]
    fn structural_equality_ignores_spans() {
        let a = GreenNode::new(SyntaxKind::IntLit, Some("1"), vec![], Some(Span::new(0, 1, 1, 1)));
        let b = GreenNode::new(SyntaxKind::IntLit, Some("1"), vec![], None);
        assert_eq!(a, b);
        assert!(!GreenNode::ptr_eq(&a, &b));
    }

    #[test]
    fn cursor_navigation() {
        let ret = GreenNode::new(SyntaxKind::ReturnStmt, None, vec![leaf(SyntaxKind::IntLit, "100")], None);
        let block = GreenNode::new(SyntaxKind::Block, None, vec![ret], None);
        let root = SyntaxNode::new_root(block);

        let ret = root.child(0).unwrap();
        assert_eq!(ret.kind(), SyntaxKind::ReturnStmt);
        assert_eq!(ret.parent().unwrap().kind(), SyntaxKind::Block);

        let lit = ret.child(0).unwrap();
        let kinds: Vec<_> = lit.ancestors().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![SyntaxKind::ReturnStmt, SyntaxKind::Block]);

        let all: Vec<_> = root.descendants().map(|n| n.kind()).collect();
        assert_eq!(all, vec![SyntaxKind::ReturnStmt, SyntaxKind::IntLit]);
    }

    #[test]
    fn replace_with_keeps_position() {
        let inner = GreenNode::new(SyntaxKind::Block, None, vec![], None);
        let outer = GreenNode::new(SyntaxKind::Block, None, vec![leaf(SyntaxKind::IntLit, "0"), inner], None);
        let root = SyntaxNode::new_root(outer);
        let b = root.child(1).unwrap();

        let swapped = b.replace_with(leaf(SyntaxKind::BoolLit, "true"));
        assert_eq!(swapped.index(), 1);
        assert_eq!(swapped.kind(), SyntaxKind::BoolLit);
        assert_eq!(swapped.parent().unwrap().kind(), SyntaxKind::Block);
    }
}
