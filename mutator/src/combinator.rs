//! Mutators built from other mutators.
//!
//! Combinators own their sub-mutators and report the sum of their
//! sub-mutators' transform counts, so a combinator's count is always the
//! number of blocks actually rewritten underneath it.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::mutator::{descend, MutationEvent, MutationLog, Mutator};
use crate::tree::{GreenNode, SyntaxKind, SyntaxNode};

/// One generator per run, threaded through every random combinator so that
/// a fixed seed gives the same draws in the same order.
pub type SharedRng = Rc<RefCell<StdRng>>;

pub fn shared_rng(seed: u64) -> SharedRng {
    Rc::new(RefCell::new(StdRng::seed_from_u64(seed)))
}

fn draw(rng: &SharedRng) -> f64 {
    rng.borrow_mut().random::<f64>()
}

/// Apply `first` to a block, then `second` to whatever `first` produced.
pub struct Sequence {
    first: Box<dyn Mutator>,
    second: Box<dyn Mutator>,
}

impl Sequence {
    pub fn new(first: Box<dyn Mutator>, second: Box<dyn Mutator>) -> Self {
        Self { first, second }
    }
}

impl Mutator for Sequence {
    fn name(&self) -> String {
        format!("({})+({})", self.first.name(), self.second.name())
    }

    fn transform_count(&self) -> usize {
        self.first.transform_count() + self.second.transform_count()
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
    }

    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
        let result = self.first.rewrite_block(block, log);
        if result.kind() != SyntaxKind::Block {
            return result;
        }
        self.second.rewrite_block(&block.replace_with(result), log)
    }
}

/// Apply `inner` to the same block up to `times` times, feeding each result
/// back in.
pub struct Repeat {
    inner: Box<dyn Mutator>,
    times: usize,
}

impl Repeat {
    pub fn new(inner: Box<dyn Mutator>, times: usize) -> Self {
        Self { inner, times }
    }
}

impl Mutator for Repeat {
    fn name(&self) -> String {
        format!("({})x{}", self.inner.name(), self.times)
    }

    fn transform_count(&self) -> usize {
        self.inner.transform_count()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
        let mut current = block.clone();
        let mut result = block.green().clone();
        for _ in 0..self.times {
            result = self.inner.rewrite_block(&current, log);
            if result.kind() != SyntaxKind::Block {
                break;
            }
            current = current.replace_with(result.clone());
        }
        result
    }
}

/// Apply `inner` with probability `p`, otherwise keep looking further down.
pub struct RandomApply {
    inner: Box<dyn Mutator>,
    rng: SharedRng,
    p: f64,
}

impl RandomApply {
    pub fn new(inner: Box<dyn Mutator>, rng: SharedRng, p: f64) -> Self {
        Self { inner, rng, p }
    }
}

impl Mutator for RandomApply {
    fn name(&self) -> String {
        format!("({})|()@{:.2}", self.inner.name(), self.p)
    }

    fn transform_count(&self) -> usize {
        self.inner.transform_count()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
        let x = draw(&self.rng);
        let taken = x < self.p;
        log.record(MutationEvent::Draw { mutator: self.name(), draw: x, p: self.p, taken });
        if taken {
            self.inner.rewrite_block(block, log)
        } else {
            descend(self, block, log)
        }
    }
}

/// Apply `first` with probability `p`, `second` otherwise.
pub struct RandomChoice {
    first: Box<dyn Mutator>,
    second: Box<dyn Mutator>,
    rng: SharedRng,
    p: f64,
}

impl RandomChoice {
    pub fn new(first: Box<dyn Mutator>, second: Box<dyn Mutator>, rng: SharedRng, p: f64) -> Self {
        Self { first, second, rng, p }
    }
}

impl Mutator for RandomChoice {
    fn name(&self) -> String {
        format!("({})|({})@{:.2}", self.first.name(), self.second.name(), self.p)
    }

    fn transform_count(&self) -> usize {
        self.first.transform_count() + self.second.transform_count()
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
    }

    fn rewrite_block(&mut self, block: &SyntaxNode, log: &mut MutationLog) -> GreenNode {
        let x = draw(&self.rng);
        let taken = x < self.p;
        log.record(MutationEvent::Draw { mutator: self.name(), draw: x, p: self.p, taken });
        if taken {
            self.first.rewrite_block(block, log)
        } else {
            self.second.rewrite_block(block, log)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Emit;
    use crate::mutator::Primitive;
    use crate::parser::parse;
    use crate::tree::SyntaxTree;

    const PROGRAM: &str = "
fn helper(x) {
    if (x > 1) { print(x); } else { print(0); }
    return x;
}

fn main() {
    foreach (i in range(0, 3)) { helper(i); }
    { print(1); }
    return 100;
}
";

    fn tc() -> Box<dyn Mutator> {
        Box::new(Primitive::try_catch())
    }

    fn tef() -> Box<dyn Mutator> {
        Box::new(Primitive::try_empty_finally())
    }

    fn etf() -> Box<dyn Mutator> {
        Box::new(Primitive::empty_try_finally())
    }

    fn run(m: &mut dyn Mutator, src: &str) -> (SyntaxTree, MutationLog) {
        let tree = parse(src, "t.eh").unwrap();
        let mut log = MutationLog::new();
        let out = m.mutate(&tree, &mut log);
        (out, log)
    }

    #[test]
    fn names() {
        let rng = shared_rng(0);
        assert_eq!(Sequence::new(tc(), tef()).name(), "(TryCatch)+(TryEmptyFinally)");
        assert_eq!(Repeat::new(tc(), 2).name(), "(TryCatch)x2");
        assert_eq!(RandomApply::new(etf(), rng.clone(), 0.25).name(), "(EmptyTryFinally)|()@0.25");
        assert_eq!(
            RandomChoice::new(tc(), tef(), rng.clone(), 0.5).name(),
            "(TryCatch)|(TryEmptyFinally)@0.50"
        );
        let nested = Repeat::new(Box::new(Sequence::new(Box::new(Sequence::new(tc(), etf())), tef())), 3);
        assert_eq!(nested.name(), "(((TryCatch)+(EmptyTryFinally))+(TryEmptyFinally))x3");
    }

    #[test]
    fn sequence_feeds_first_result_to_second() {
        let mut m = Sequence::new(tc(), tef());
        let (out, _) = run(&mut m, "fn main() { return 100; }");
        assert_eq!(m.transform_count(), 2);
        assert_eq!(
            out.to_source(),
            "fn main() {
    try {
        try {
            return 100;
        }
        catch (MutationSentinel) {
            throw;
        }
    }
    finally { }
}
"
        );
    }

    #[test]
    fn sequence_counts_only_what_fired() {
        // The finally guard rejects the body, so only the second mutator counts.
        let mut m = Sequence::new(etf(), tc());
        let (_, log) = run(&mut m, "fn main() { return 100; }");
        assert_eq!(m.transform_count(), 1);
        assert_eq!(log.rewrites().count(), 1);
    }

    #[test]
    fn repeat_nests() {
        let mut m = Repeat::new(tc(), 2);
        let (out, _) = run(&mut m, "fn main() { return 100; }");
        assert_eq!(m.transform_count(), 2);
        assert_eq!(out.to_source().matches("catch (MutationSentinel)").count(), 2);
    }

    #[test]
    fn repeat_once_is_the_mutator_itself() {
        let mut single = Primitive::into_catch();
        let mut once = Repeat::new(Box::new(Primitive::into_catch()), 1);
        let (a, _) = run(&mut single, PROGRAM);
        let (b, _) = run(&mut once, PROGRAM);
        assert_eq!(a.green(), b.green());
        assert_eq!(single.transform_count(), once.transform_count());
    }

    #[test]
    fn repeat_count_is_bounded() {
        let mut single = Primitive::try_catch();
        run(&mut single, PROGRAM);
        let mut twice = Repeat::new(tc(), 2);
        run(&mut twice, PROGRAM);
        assert!(twice.transform_count() <= 2 * single.transform_count());
        assert!(twice.transform_count() > 0);
    }

    #[test]
    fn random_apply_boundaries() {
        let rng = shared_rng(7);
        let mut never = RandomApply::new(tc(), rng.clone(), 0.0);
        let tree = parse(PROGRAM, "t.eh").unwrap();
        let mut log = MutationLog::new();
        let out = never.mutate(&tree, &mut log);
        assert_eq!(never.transform_count(), 0);
        assert!(GreenNode::ptr_eq(out.green(), tree.green()));
        // Every block was offered and refused.
        assert_eq!(log.events().len(), tree.blocks().count());

        let mut always = RandomApply::new(tc(), rng, 1.0);
        run(&mut always, PROGRAM);
        // One rewrite per function body; nothing below a rewrite is revisited.
        assert_eq!(always.transform_count(), 2);
    }

    #[test]
    fn random_choice_picks_by_threshold() {
        let rng = shared_rng(3);
        let mut first = RandomChoice::new(tc(), tef(), rng.clone(), 1.0);
        let (out, _) = run(&mut first, "fn main() { return 100; }");
        assert!(out.to_source().contains("catch"));
        assert_eq!(first.transform_count(), 1);

        let mut second = RandomChoice::new(tc(), tef(), rng, 0.0);
        let (out, _) = run(&mut second, "fn main() { return 100; }");
        assert!(out.to_source().contains("finally"));
        assert!(!out.to_source().contains("catch"));
    }

    #[test]
    fn same_seed_same_mutation() {
        let build = |seed| {
            let rng = shared_rng(seed);
            Sequence::new(
                Box::new(RandomApply::new(tc(), rng.clone(), 0.5)),
                Box::new(RandomChoice::new(etf(), tef(), rng, 0.5)),
            )
        };
        let (a, log_a) = run(&mut build(11), PROGRAM);
        let (b, log_b) = run(&mut build(11), PROGRAM);
        assert_eq!(a.to_source(), b.to_source());
        assert_eq!(log_a.events(), log_b.events());
    }

    #[test]
    fn shared_generator_advances_across_runs() {
        let rng = shared_rng(5);
        let mut m = RandomApply::new(tc(), rng.clone(), 0.5);
        let (_, first) = run(&mut m, PROGRAM);
        let (_, second) = run(&mut m, PROGRAM);
        let draws = |log: &MutationLog| -> Vec<u64> {
            log.events()
                .iter()
                .filter_map(|e| match e {
                    MutationEvent::Draw { draw, .. } => Some(draw.to_bits()),
                    _ => None,
                })
                .collect()
        };
        assert_ne!(draws(&first), draws(&second));
    }
}
