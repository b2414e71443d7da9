//! `fractional(bucket_key?, [variant, weight]+) → string` (spec §4.1).
//!
//! Grounded on the teacher's `targeting/fractional.rs`: same shape-based
//! disambiguation of the optional leading bucket-key operand, same
//! `murmurhash3_x86_32` bucketer, same left-inclusive/right-exclusive
//! cumulative-weight walk. Two differences from the teacher's version:
//!
//! - the teacher computes `bucket` on a 0-100 scale and the cumulative
//!   weight as a percentage; this version works in `[0, 1)` directly
//!   against weights normalized to sum 1, per spec §4.1, which avoids
//!   the teacher's integer-weight truncation (`n.as_i64()` drops
//!   fractional weights) — weights are read as `f64` so a `[ "a", 0.5 ]`
//!   style weight works the same as `[ "a", 50 ]`;
//! - when there is no explicit bucket-key and `targetingKey` is absent
//!   empty, the bucketing key falls back to `flagKey + targetingKey`
//!   (both pulled from the enriched `$flagd`/`targetingKey` context
//!   entries) rather than bare `targetingKey`, so that two fractional
//!   rules in the same config evaluated for the same anonymous caller
//!   don't collide on an identical empty key (see DESIGN.md Open
//!   Questions).

use crate::bucketing::bucket_position;
use datalogic_rs::arena::{CustomOperator, DataArena};
use datalogic_rs::{logic::LogicError, DataValue};
use tracing::debug;

#[derive(Debug)]
pub struct Fractional;

fn object_str_field<'a>(obj: &'a DataValue<'a>, key: &str) -> Option<&'a str> {
    if let DataValue::Object(entries) = obj {
        for (k, v) in *entries {
            if *k == key {
                if let DataValue::String(s) = v {
                    return Some(s);
                }
            }
        }
    }
    None
}

fn parse_distribution<'a>(value: &DataValue<'a>) -> Option<(&'a str, f64)> {
    if let DataValue::Array(arr) = value {
        if arr.len() >= 2 {
            let variant = match &arr[0] {
                DataValue::String(s) => *s,
                _ => return None,
            };
            let weight = match &arr[1] {
                DataValue::Number(n) => n.as_f64(),
                _ => None,
            }?;
            if weight < 0.0 {
                debug!("negative fractional weight for variant {variant}: {weight}");
                return None;
            }
            return Some((variant, weight));
        }
    }
    None
}

impl CustomOperator for Fractional {
    fn evaluate<'a>(
        &self,
        args: &'a [DataValue<'a>],
        arena: &'a DataArena,
    ) -> Result<&'a DataValue<'a>, LogicError> {
        if args.is_empty() {
            debug!("fractional requires at least one argument");
            return Ok(arena.null_value());
        }

        // Only a bare string operand is an explicit bucket key. Anything else —
        // a `[variant, weight]` pair, or any other non-string shape such as a
        // single-element array — falls into the implicit-key branch and is
        // left in `distributions` as-is; `parse_distribution` will simply skip
        // it rather than nulling out the whole operator.
        let (bucket_by, distributions): (String, &[DataValue<'a>]) = if let DataValue::String(s) = &args[0] {
            (s.to_string(), &args[1..])
        } else {
            let data = arena.current_context(0).unwrap_or_else(|| arena.null_value());
            let targeting_key = object_str_field(data, "targetingKey").unwrap_or("");
            let computed = if targeting_key.is_empty() {
                let flag_key = if let DataValue::Object(entries) = data {
                    entries
                        .iter()
                        .find_map(|(k, v)| if *k == "$flagd" { object_str_field(v, "flagKey") } else { None })
                        .unwrap_or("")
                } else {
                    ""
                };
                format!("{flag_key}{targeting_key}")
            } else {
                targeting_key.to_string()
            };
            (computed, args)
        };

        if distributions.is_empty() {
            debug!("fractional has no bucket definitions");
            return Ok(arena.null_value());
        }

        let buckets: Vec<(&str, f64)> = distributions.iter().filter_map(parse_distribution).collect();
        let total_weight: f64 = buckets.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            debug!("fractional total weight is zero, no bucket can be selected");
            return Ok(arena.null_value());
        }

        let position = bucket_position(&bucket_by);
        let mut cumulative = 0.0;
        for (variant, weight) in &buckets {
            cumulative += weight / total_weight;
            if position < cumulative {
                let interned = arena.intern_str(variant);
                return Ok(arena.alloc(DataValue::String(interned)));
            }
        }

        debug!("fractional position {position} matched no bucket (rounding at the tail)");
        Ok(arena.null_value())
    }
}
