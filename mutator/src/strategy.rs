//! The standard set of stress strategies.

use crate::combinator::{RandomApply, RandomChoice, Repeat, Sequence, SharedRng};
use crate::error::HarnessError;
use crate::mutator::{Mutator, Primitive};

fn try_catch() -> Box<dyn Mutator> {
    Box::new(Primitive::try_catch())
}

fn try_empty_finally() -> Box<dyn Mutator> {
    Box::new(Primitive::try_empty_finally())
}

fn empty_try_finally() -> Box<dyn Mutator> {
    Box::new(Primitive::empty_try_finally())
}

fn into_catch() -> Box<dyn Mutator> {
    Box::new(Primitive::into_catch())
}

fn seq(first: Box<dyn Mutator>, second: Box<dyn Mutator>) -> Box<dyn Mutator> {
    Box::new(Sequence::new(first, second))
}

fn twice(m: Box<dyn Mutator>) -> Box<dyn Mutator> {
    Box::new(Repeat::new(m, 2))
}

fn combo1() -> Box<dyn Mutator> {
    seq(try_empty_finally(), try_catch())
}

fn combo2() -> Box<dyn Mutator> {
    seq(empty_try_finally(), try_catch())
}

fn combo3() -> Box<dyn Mutator> {
    seq(empty_try_finally(), try_empty_finally())
}

fn combo4() -> Box<dyn Mutator> {
    seq(into_catch(), try_empty_finally())
}

fn combo12() -> Box<dyn Mutator> {
    seq(combo1(), combo2())
}

fn combo34() -> Box<dyn Mutator> {
    seq(combo3(), combo4())
}

fn combo1234() -> Box<dyn Mutator> {
    seq(combo12(), combo34())
}

fn combo3412() -> Box<dyn Mutator> {
    seq(combo34(), combo12())
}

fn complex1() -> Box<dyn Mutator> {
    seq(twice(combo1()), twice(combo4()))
}

/// Build the 29 standard strategies. Every random combinator draws from `rng`.
pub fn standard_strategies(rng: &SharedRng) -> Vec<Box<dyn Mutator>> {
    let random = |m: Box<dyn Mutator>| -> Box<dyn Mutator> { Box::new(RandomApply::new(m, rng.clone(), 0.25)) };
    let either = |a: Box<dyn Mutator>, b: Box<dyn Mutator>| -> Box<dyn Mutator> {
        Box::new(RandomChoice::new(a, b, rng.clone(), 0.5))
    };

    vec![
        try_catch(),
        twice(try_catch()),
        try_empty_finally(),
        twice(try_empty_finally()),
        empty_try_finally(),
        twice(empty_try_finally()),
        into_catch(),
        twice(into_catch()),
        random(try_catch()),
        random(try_empty_finally()),
        random(empty_try_finally()),
        random(into_catch()),
        either(try_catch(), try_empty_finally()),
        either(into_catch(), try_empty_finally()),
        combo1(),
        combo2(),
        combo3(),
        combo4(),
        combo12(),
        combo34(),
        combo1234(),
        combo3412(),
        twice(combo1()),
        twice(combo4()),
        twice(combo1234()),
        twice(combo3412()),
        complex1(),
        twice(complex1()),
        seq(twice(combo1234()), twice(combo3412())),
    ]
}

/// Keep only the strategies named in `only`, in catalogue order. An empty
/// filter keeps everything.
pub fn select(strategies: Vec<Box<dyn Mutator>>, only: &[String]) -> Result<Vec<Box<dyn Mutator>>, HarnessError> {
    if only.is_empty() {
        return Ok(strategies);
    }
    let known: Vec<String> = strategies.iter().map(|m| m.name()).collect();
    if let Some(unknown) = only.iter().find(|name| !known.contains(name)) {
        return Err(HarnessError::Config(format!("unknown strategy '{}'", unknown)));
    }
    Ok(strategies.into_iter().filter(|m| only.contains(&m.name())).collect())
}
