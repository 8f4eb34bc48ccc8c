//! Structural predicates that decide where an EH rewrite may go.
//!
//! All three are pure functions of a node and its surroundings.

use crate::tree::{SyntaxKind, SyntaxNode};

/// Is `node` already covered by a protected region of its own function?
///
/// Using and foreach statements may not lower to an actual handler, they
/// are treated as if they do. A catch clause of a try that also has a
/// finally clause is still protected by that finally.
pub fn enclosed_in_protected_region(node: &SyntaxNode) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            SyntaxKind::TryStmt | SyntaxKind::UsingStmt | SyntaxKind::ForEachStmt => return true,
            SyntaxKind::Lambda => return false,
            SyntaxKind::CatchClause | SyntaxKind::FinallyClause => {
                if n.kind() == SyntaxKind::CatchClause && owning_try_has_finally(&n) {
                    return true;
                }
                // Step over the clause and its try, which would otherwise
                // count as protecting the handler body.
                current = n.parent().and_then(|t| t.parent());
            }
            k if k.is_declaration() => return false,
            _ => current = n.parent(),
        }
    }
    false
}

fn owning_try_has_finally(clause: &SyntaxNode) -> bool {
    clause
        .parent()
        .map(|t| t.green().first_child_of(SyntaxKind::FinallyClause).is_some())
        .unwrap_or(false)
}

/// Would moving `node` into a finally clause change control flow?
pub fn contains_disallowed_for_finally(node: &SyntaxNode) -> bool {
    node.green()
        .descendants()
        .any(|d| matches!(d.kind(), SyntaxKind::ReturnStmt | SyntaxKind::ThrowStmt))
}

/// Would moving `node` into a catch clause break the runtime's allocation
/// rules?
pub fn contains_disallowed_for_catch(node: &SyntaxNode) -> bool {
    node.green().descendants().any(|d| d.kind() == SyntaxKind::StackAlloc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tree::SyntaxTree;

    /// The block that directly contains a call to `marker()`.
    fn block_marked(tree: &SyntaxTree) -> SyntaxNode {
        tree.blocks()
            .find(|b| {
                b.children().any(|s| {
                    s.kind() == SyntaxKind::ExprStmt
                        && s.green().descendants().any(|d| d.text() == Some("marker"))
                })
            })
            .expect("no marked block")
    }

    fn protected(body: &str) -> bool {
        let src = format!("fn marker() {{ }} fn main() {{ {} return 100; }}", body);
        let tree = parse(&src, "t.eh").unwrap();
        enclosed_in_protected_region(&block_marked(&tree))
    }

    #[test]
    fn function_body_is_not_protected() {
        assert!(!protected("{ marker(); }"));
    }

    #[test]
    fn try_block_is_protected() {
        assert!(protected("try { marker(); } catch { }"));
        assert!(protected("try { { marker(); } } finally { }"));
    }

    #[test]
    fn using_and_foreach_count_as_protected() {
        assert!(protected("using (r = 1) { marker(); }"));
        assert!(protected("foreach (x in range(0, 1)) { marker(); }"));
    }

    #[test]
    fn lambda_stops_the_walk() {
        assert!(!protected("try { let f = fn() { marker(); }; } catch { }"));
    }

    #[test]
    fn catch_without_finally_skips_its_own_try() {
        assert!(!protected("try { } catch { marker(); }"));
        assert!(protected("try { try { } catch { marker(); } } finally { }"));
    }

    #[test]
    fn catch_with_finally_is_protected() {
        assert!(protected("try { } catch { marker(); } finally { }"));
    }

    #[test]
    fn finally_skips_its_own_try() {
        assert!(!protected("try { } finally { marker(); }"));
        assert!(protected("using (r = 1) { try { } finally { marker(); } }"));
    }

    #[test]
    fn finally_guard() {
        let tree = parse("fn main() { { let x = 1; } { return 100; } }", "t.eh").unwrap();
        let inner: Vec<_> = tree.blocks().skip(1).collect();
        assert!(!contains_disallowed_for_finally(&inner[0]));
        assert!(contains_disallowed_for_finally(&inner[1]));

        let tree = parse("exception E; fn main() { { throw new E(); } }", "t.eh").unwrap();
        assert!(contains_disallowed_for_finally(&tree.blocks().nth(1).unwrap()));
    }

    #[test]
    fn catch_guard() {
        let tree = parse("fn main() { { let a = stackalloc[2]; } { let b = 2; } return 1; }", "t.eh").unwrap();
        let inner: Vec<_> = tree.blocks().skip(1).collect();
        assert!(contains_disallowed_for_catch(&inner[0]));
        assert!(!contains_disallowed_for_catch(&inner[1]));
    }
}
