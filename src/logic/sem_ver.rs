//! `sem_ver(a, op, b)` custom operator (spec §4.1/§4.3).
//!
//! Grounded on the teacher's `targeting/semver.rs`, which parses with the
//! `semver` crate and handles `=`/`!=`/`<`/`<=`/`>`/`>=` by delegating to
//! `semver::Version`'s `Ord`. The teacher's `^`/`~` arms shortcut to
//! same-major / same-major-minor equality, which silently mismatches the
//! `0.x` caret case (`^0.2.0` must NOT match `0.3.0`, but major-equality
//! alone would accept it); this version expands both into the explicit
//! two-bound interval the spec describes instead.

use datalogic_rs::arena::{CustomOperator, DataArena};
use datalogic_rs::{logic::LogicError, DataValue};
use semver::Version;
use tracing::debug;

#[derive(Debug)]
pub struct SemVer;

/// Exclusive upper bound for a caret range starting at `v`.
fn caret_upper_bound(v: &Version) -> Version {
    if v.major > 0 {
        Version::new(v.major + 1, 0, 0)
    } else if v.minor > 0 {
        Version::new(0, v.minor + 1, 0)
    } else {
        Version::new(0, 0, v.patch + 1)
    }
}

/// Exclusive upper bound for a tilde range starting at `v`.
fn tilde_upper_bound(v: &Version) -> Version {
    Version::new(v.major, v.minor + 1, 0)
}

fn compare(value: &Version, op: &str, bound: &Version) -> Option<bool> {
    let result = match op {
        "=" => value == bound,
        "!=" => value != bound,
        "<" => value < bound,
        "<=" => value <= bound,
        ">" => value > bound,
        ">=" => value >= bound,
        "^" => *value >= *bound && *value < caret_upper_bound(bound),
        "~" => *value >= *bound && *value < tilde_upper_bound(bound),
        _ => {
            debug!("unknown sem_ver operator: {}", op);
            return None;
        }
    };
    Some(result)
}

impl CustomOperator for SemVer {
    fn evaluate<'a>(
        &self,
        args: &'a [DataValue<'a>],
        arena: &'a DataArena,
    ) -> Result<&'a DataValue<'a>, LogicError> {
        if args.len() != 3 {
            debug!("sem_ver requires exactly 3 arguments, got {}", args.len());
            return Ok(arena.false_value());
        }

        let parse_arg = |arg: &DataValue<'a>| -> Option<Version> {
            match arg {
                DataValue::String(s) => match Version::parse(s) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        debug!("failed to parse version {:?}: {}", s, e);
                        None
                    }
                },
                _ => {
                    debug!("sem_ver version operand must be a string: {:?}", arg);
                    None
                }
            }
        };

        let value = match parse_arg(&args[0]) {
            Some(v) => v,
            None => return Ok(arena.false_value()),
        };
        let op = match &args[1] {
            DataValue::String(s) => *s,
            other => {
                debug!("sem_ver operator must be a string: {:?}", other);
                return Ok(arena.false_value());
            }
        };
        let bound = match parse_arg(&args[2]) {
            Some(v) => v,
            None => return Ok(arena.false_value()),
        };

        match compare(&value, op, &bound) {
            Some(true) => Ok(arena.true_value()),
            Some(false) | None => Ok(arena.false_value()),
        }
    }
}
