//! Constructors for synthesized nodes. Nothing built here has a span.

use crate::tree::{GreenNode, SyntaxKind};

/// Exception type owned by the mutators. User programs never declare,
/// throw or catch it, so injected handlers cannot intercept real exceptions.
pub const SENTINEL_EXCEPTION: &str = "MutationSentinel";

fn node(kind: SyntaxKind, text: Option<&str>, children: Vec<GreenNode>) -> GreenNode {
    GreenNode::new(kind, text, children, None)
}

pub fn block(statements: Vec<GreenNode>) -> GreenNode {
    node(SyntaxKind::Block, None, statements)
}

pub fn empty_block() -> GreenNode {
    block(vec![])
}

pub fn try_stmt(body: GreenNode, catches: Vec<GreenNode>, finally: Option<GreenNode>) -> GreenNode {
    let mut children = Vec::with_capacity(catches.len() + 2);
    children.push(body);
    children.extend(catches);
    children.extend(finally);
    node(SyntaxKind::TryStmt, None, children)
}

/// `catch (ty) { .. }`, or `catch { .. }` when `ty` is `None`.
pub fn catch_clause(ty: Option<&str>, body: GreenNode) -> GreenNode {
    let mut children = Vec::with_capacity(2);
    if let Some(ty) = ty {
        children.push(node(SyntaxKind::CatchDecl, Some(ty), vec![]));
    }
    children.push(body);
    node(SyntaxKind::CatchClause, None, children)
}

pub fn finally_clause(body: GreenNode) -> GreenNode {
    node(SyntaxKind::FinallyClause, None, vec![body])
}

/// `throw;`
pub fn rethrow() -> GreenNode {
    node(SyntaxKind::ThrowStmt, None, vec![])
}

/// `throw new ty();`
pub fn throw_new(ty: &str) -> GreenNode {
    node(SyntaxKind::ThrowStmt, None, vec![new_object(ty)])
}

pub fn new_object(ty: &str) -> GreenNode {
    node(SyntaxKind::NewObject, Some(ty), vec![])
}
