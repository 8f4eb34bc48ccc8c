use crate::mutator::{MutationLog, Mutator};
use crate::tree::{GreenNode, SyntaxTree};

/// Result of running one mutator over one tree.
#[derive(Clone, Debug)]
pub struct MutationOutcome {
    pub tree: SyntaxTree,
    pub transform_count: usize,
    pub log: MutationLog,
}

impl MutationOutcome {
    /// True when the mutator declined every block.
    pub fn is_identity(&self, original: &SyntaxTree) -> bool {
        GreenNode::ptr_eq(self.tree.green(), original.green())
    }
}

/// Reset `mutator`, run it once over all of `tree` and collect what it did.
pub fn mutate(mutator: &mut dyn Mutator, tree: &SyntaxTree) -> MutationOutcome {
    let mut log = MutationLog::new();
    let tree = mutator.mutate(tree, &mut log);
    MutationOutcome {
        tree,
        transform_count: mutator.transform_count(),
        log,
    }
}
