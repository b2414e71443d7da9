//! `starts_with`/`ends_with` custom operators.
//!
//! The teacher carries a `StringComp` helper (`targeting/string_comp.rs`)
//! built for this exact purpose but never wires it into the `Operator`'s
//! `DataLogic` instance — it's dead code in the teacher crate. Here the
//! same comparison is implemented directly against the interpreter's
//! `CustomOperator` trait so both operators are actually reachable from a
//! targeting rule, as spec §4.1 requires.

use datalogic_rs::arena::{CustomOperator, DataArena};
use datalogic_rs::{logic::LogicError, DataValue};
use tracing::debug;

#[derive(Debug)]
pub struct StartsWith;

#[derive(Debug)]
pub struct EndsWith;

fn two_strings<'a>(args: &'a [DataValue<'a>]) -> Option<(&'a str, &'a str)> {
    if args.len() != 2 {
        debug!("string operator requires exactly 2 arguments, got {}", args.len());
        return None;
    }
    match (&args[0], &args[1]) {
        (DataValue::String(a), DataValue::String(b)) => Some((a, b)),
        _ => {
            debug!("string operator requires two string operands, got {:?}", args);
            None
        }
    }
}

impl CustomOperator for StartsWith {
    fn evaluate<'a>(
        &self,
        args: &'a [DataValue<'a>],
        arena: &'a DataArena,
    ) -> Result<&'a DataValue<'a>, LogicError> {
        let result = match two_strings(args) {
            Some((s, prefix)) => s.starts_with(prefix),
            None => false,
        };
        Ok(if result { arena.true_value() } else { arena.false_value() })
    }
}

impl CustomOperator for EndsWith {
    fn evaluate<'a>(
        &self,
        args: &'a [DataValue<'a>],
        arena: &'a DataArena,
    ) -> Result<&'a DataValue<'a>, LogicError> {
        let result = match two_strings(args) {
            Some((s, suffix)) => s.ends_with(suffix),
            None => false,
        };
        Ok(if result { arena.true_value() } else { arena.false_value() })
    }
}
