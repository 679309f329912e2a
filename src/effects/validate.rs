//! Structural validation of effects before dispatch.
//!
//! Uses Stillwater's `Validation` so that every problem in a composite
//! effect is reported at once instead of stopping at the first one.

use super::effect::Effect;
use crate::channel::BufferPolicy;
use crate::core::ProtocolViolation;
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// One structural problem found in an effect.
pub type EffectProblem = String;

/// Validate an effect, accumulating ALL problems, including those of
/// nested ALL/RACE branches.
pub fn validate(effect: &Effect) -> Validation<(), NonEmptyVec<EffectProblem>> {
    let mut checks: Vec<Validation<(), NonEmptyVec<EffectProblem>>> = Vec::new();

    match effect {
        Effect::Race(branches) => {
            if branches.is_empty() {
                checks.push(Validation::fail(
                    "RACE needs at least one branch".to_string(),
                ));
            }

            let mut seen = HashSet::new();
            for (key, branch) in branches {
                let check = if key.is_empty() {
                    Validation::fail("RACE branch keys must not be empty".to_string())
                } else if !seen.insert(key.as_str()) {
                    Validation::fail(format!("RACE key '{key}' is used more than once"))
                } else {
                    Validation::success(())
                };
                checks.push(check);
                checks.push(validate(branch));
            }
        }
        Effect::All(effects) => {
            for effect in effects {
                checks.push(validate(effect));
            }
        }
        Effect::Channel(BufferPolicy::Fixed { capacity: 0, .. }) => {
            checks.push(Validation::fail(
                "fixed channel buffers need a capacity of at least 1".to_string(),
            ));
        }
        _ => {}
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Validate and convert failures into a `MalformedEffect` violation.
pub fn check(effect: &Effect) -> Result<(), ProtocolViolation> {
    match validate(effect) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(problems) => Err(ProtocolViolation::MalformedEffect {
            problems: problems.iter().cloned().collect(),
        }),
    }
}
