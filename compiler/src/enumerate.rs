// enumerate.rs — Rate combination enumeration
//
// Produces every legal assignment of one rate per parameter plus the
// resulting output rate. Parameters are expanded in code order (a, b, c) so
// the result, and therefore the emitted variant order, is deterministic.
//
// Preconditions: one rate set per parameter.
// Postconditions: no combination has a constant output; for a commutative
//                 two-parameter unit, no combination whose first rate code
//                 sorts after the second.
// Failure modes: none (an empty result is legal and reported by the caller).
// Side effects: none.

use serde::Serialize;

use crate::rate::{Category, Rate, RateSet};

/// One rate per parameter and the output rate they produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RateCombination {
    pub params: Vec<Rate>,
    pub output: Rate,
}

impl RateCombination {
    /// Lookup key: the parameter rate codes in order (`"ab"`).
    pub fn key(&self) -> String {
        self.params.iter().map(|r| r.code()).collect()
    }

    /// Class-name suffix: `"ab_a"`, or just the output code without params.
    pub fn suffix(&self) -> String {
        if self.params.is_empty() {
            self.output.code().to_string()
        } else {
            format!("{}_{}", self.key(), self.output.code())
        }
    }
}

pub fn rate_combinations(
    rate_sets: &[RateSet],
    category: Category,
    commutative: bool,
) -> Vec<RateCombination> {
    let mut assignments = Vec::new();
    expand(rate_sets, commutative, &mut Vec::new(), &mut assignments);

    assignments
        .into_iter()
        .filter_map(|params| {
            let fastest = params.iter().copied().max().unwrap_or(Rate::Constant);
            let output = match category {
                Category::Filter => fastest,
                Category::Generator(output) if fastest <= output => output,
                Category::Generator(_) => return None,
            };
            // Pure-constant units are compile-time values, not generators.
            if output == Rate::Constant {
                return None;
            }
            Some(RateCombination { params, output })
        })
        .collect()
}

fn expand(
    rate_sets: &[RateSet],
    commutative: bool,
    prefix: &mut Vec<Rate>,
    out: &mut Vec<Vec<Rate>>,
) {
    let depth = prefix.len();
    if depth == rate_sets.len() {
        out.push(prefix.clone());
        return;
    }
    for rate in rate_sets[depth].iter() {
        if commutative && depth == 1 && prefix[0].code() > rate.code() {
            continue;
        }
        prefix.push(rate);
        expand(rate_sets, commutative, prefix, out);
        prefix.pop();
    }
}
