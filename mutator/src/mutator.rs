//! The mutator abstraction and the four primitive rewrites.
//!
//! A mutator walks the whole tree once. Every block it reaches goes through
//! [`Mutator::rewrite_block`], which either returns a replacement (whose
//! contents are never visited again) or declines and descends into the
//! block's children itself.

use std::fmt;

use crate::factory::{self, SENTINEL_EXCEPTION};
use crate::legality::{contains_disallowed_for_catch, contains_disallowed_for_finally, enclosed_in_protected_region};
use crate::tree::{GreenNode, SyntaxKind, SyntaxNode, SyntaxTree};

/// Something that happened during one mutation pass.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationEvent {
    /// A primitive rewrote a block.
    Rewrite {
        mutator: String,
        /// The primitive's transform count after this rewrite.
        ordinal: usize,
        /// First and last source line of the block, if it came from source.
        lines: Option<(usize, usize)>,
        /// Whether the block already sat inside a protected region.
        protected: bool,
    },
    /// A random combinator drew a value.
    Draw {
        mutator: String,
        draw: f64,
        p: f64,
        taken: bool,
    },
}

impl fmt::Display for MutationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationEvent::Rewrite { mutator, ordinal, lines, protected } => {
                write!(f, "{} [{}]", mutator, ordinal)?;
                if let Some((start, end)) = lines {
                    write!(f, " @ lines {}-{}", start, end)?;
                }
                if *protected {
                    write!(f, " (protected)")?;
                }
                Ok(())
            }
            MutationEvent::Draw { mutator, draw, p, taken } => {
                if *taken {
                    write!(f, "{}: random choose x={:.2} < p={:.2}", mutator, draw, p)
                } else {
                    write!(f, "{}: random skip x={:.2} >= p={:.2}", mutator, draw, p)
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MutationLog {
    events: Vec<MutationEvent>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: MutationEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[MutationEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn rewrites(&self) -> impl Iterator<Item = &MutationEvent> {
        self.events.iter().filter(|e| matches!(e, MutationEvent::Rewrite { .. }))
    }
}

pub trait Mutator {
    fn name(&self) -> String;

    /// Blocks rewritten since the last [`Mutator::reset`].
    fn transform_count(&self) -> usize;

    fn reset(&mut self);

    /// Rewrite one block, or decline by descending into it.
    ///
    /// Returns the block's own green node (same identity) when nothing
    /// changed anywhere below it.
    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode;

    /// Full pass over `tree`. The input is never modified.
    fn mutate(&mut self, tree: &SyntaxTree, log: &mut MutationLog) -> SyntaxTree {
        self.reset();
        let root = visit(self, &tree.root(), log);
        tree.with_root(root)
    }
}

/// Route `node` to the mutator if it is a block, otherwise walk its children.
pub fn visit<M: Mutator + ?Sized>(m: &mut M, node: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
    if node.kind() == SyntaxKind::Block {
        m.rewrite_block(node, log)
    } else {
        descend(m, node, log)
    }
}

/// Visit every child of `node`. Rebuilds `node` only if some child changed.
pub fn descend<M: Mutator + ?Sized>(m: &mut M, node: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
    let mut changed = false;
    let mut children = Vec::with_capacity(node.green().children().len());
    for child in node.children() {
        let new = visit(m, &child, log);
        changed |= !GreenNode::ptr_eq(&new, child.green());
        children.push(new);
    }
    if changed {
        node.green().with_children(children)
    } else {
        node.green().clone()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Pattern {
    /// `{ B }` to `{ try { B } catch (Sentinel) { throw; } }`
    TryCatch,
    /// `{ B }` to `{ try { } finally { B } }`
    EmptyTryFinally,
    /// `{ B }` to `{ try { B } finally { } }`
    TryEmptyFinally,
    /// `{ B }` to `{ try { throw new Sentinel(); } catch (Sentinel) { B } }`
    IntoCatch,
    // TODO: IntoFilter, `{ try { throw new Sentinel(); } catch (Sentinel) when (true) { B } }`,
    // once the language has exception filters.
}

impl Pattern {
    pub fn name(self) -> &'static str {
        match self {
            Pattern::TryCatch => "TryCatch",
            Pattern::EmptyTryFinally => "EmptyTryFinally",
            Pattern::TryEmptyFinally => "TryEmptyFinally",
            Pattern::IntoCatch => "IntoCatch",
        }
    }

    /// Would this rewrite be unsafe for `block`?
    fn declines(self, block: &SyntaxNode) -> bool {
        match self {
            Pattern::EmptyTryFinally => contains_disallowed_for_finally(block),
            Pattern::IntoCatch => contains_disallowed_for_catch(block),
            Pattern::TryCatch | Pattern::TryEmptyFinally => false,
        }
    }

    fn apply(self, body: GreenNode) -> GreenNode {
        let stmt = match self {
            Pattern::TryCatch => factory::try_stmt(
                body,
                vec![factory::catch_clause(
                    Some(SENTINEL_EXCEPTION),
                    factory::block(vec![factory::rethrow()]),
                )],
                None,
            ),
            Pattern::EmptyTryFinally => {
                factory::try_stmt(factory::empty_block(), vec![], Some(factory::finally_clause(body)))
            }
            Pattern::TryEmptyFinally => {
                factory::try_stmt(body, vec![], Some(factory::finally_clause(factory::empty_block())))
            }
            Pattern::IntoCatch => factory::try_stmt(
                factory::block(vec![factory::throw_new(SENTINEL_EXCEPTION)]),
                vec![factory::catch_clause(Some(SENTINEL_EXCEPTION), body)],
                None,
            ),
        };
        factory::block(vec![stmt])
    }
}

/// One of the four fixed rewrites.
#[derive(Clone, Debug)]
pub struct Primitive {
    pattern: Pattern,
    transforms: usize,
}

impl Primitive {
    pub fn new(pattern: Pattern) -> Self {
        Self { pattern, transforms: 0 }
    }

    pub fn try_catch() -> Self {
        Self::new(Pattern::TryCatch)
    }

    pub fn empty_try_finally() -> Self {
        Self::new(Pattern::EmptyTryFinally)
    }

    pub fn try_empty_finally() -> Self {
        Self::new(Pattern::TryEmptyFinally)
    }

    pub fn into_catch() -> Self {
        Self::new(Pattern::IntoCatch)
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }
}

impl Mutator for Primitive {
    fn name(&self) -> String {
        self.pattern.name().to_string()
    }

    fn transform_count(&self) -> usize {
        self.transforms
    }

    fn reset(&mut self) {
        self.transforms = 0;
    }

    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
        if self.pattern.declines(block) {
            return descend(self, block, log);
        }
        self.transforms += 1;
        log.record(MutationEvent::Rewrite {
            mutator: self.name(),
            ordinal: self.transforms,
            lines: block.span().map(|s| (s.line_start, s.line_end)),
            protected: enclosed_in_protected_region(block),
        });
        self.pattern.apply(block.green().clone())
    }
}
