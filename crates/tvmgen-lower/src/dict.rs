//! Dictionary iteration primitives used by for-each lowering. Each helper
//! wraps the asymmetric quasi-instruction in an opaque section with a
//! declared external effect, recovering the value inline for types that
//! fit a single cell.

use tvmgen_core::pusher::StackPusher;

use crate::abi::preload_value;
use crate::ast::SrcLoc;
use crate::error::{LowerError, Result};
use crate::types::Ty;

fn dict_prefix(key: &Ty, loc: &SrcLoc) -> Result<&'static str> {
    match key.dict_key_bits() {
        Some((_, true)) => Ok("DICTI"),
        Some((_, false)) => Ok("DICTU"),
        None => Err(LowerError::unsupported(loc, format!("{key} cannot index a mapping"))),
    }
}

pub fn key_length(key: &Ty) -> u16 {
    key.dict_key_bits().map(|(bits, _)| bits).unwrap_or(0)
}

/// Stack: `dict`. Leaves `privKey pubKey value`, all three NULL when the
/// dictionary is empty.
pub fn dict_min_max(
    p: &mut StackPusher,
    key: &Ty,
    value: &Ty,
    is_min: bool,
    loc: &SrcLoc,
) -> Result<()> {
    let prefix = dict_prefix(key, loc)?;
    let op = if is_min { "MIN" } else { "MAX" };

    p.push_int(key_length(key) as i64);
    p.start_opaque();
    p.push_asym(&format!("{prefix}{op}"));

    p.start_continuation();
    // stack: value key
    p.push_s(0);
    p.rot();
    preload_value(p, value);
    p.end_continuation();

    p.start_continuation();
    p.push_null();
    p.push_null();
    p.push_null();
    p.push(-3, "");
    p.end_continuation();

    p.if_else();
    p.end_opaque(2, 3, false);
    Ok(())
}

/// Stack: `key dict`. Steps to the next (or previous) entry, leaving
/// `privKey pubKey value` or three NULLs past the end.
pub fn dict_prev_next(
    p: &mut StackPusher,
    key: &Ty,
    value: &Ty,
    next: bool,
    loc: &SrcLoc,
) -> Result<()> {
    let prefix = dict_prefix(key, loc)?;
    let op = if next { "GETNEXT" } else { "GETPREV" };

    p.push_int(key_length(key) as i64);
    p.start_opaque();
    p.push_asym(&format!("{prefix}{op}"));

    p.start_continuation();
    // stack: value key
    p.push_s(0);
    p.rot();
    preload_value(p, value);
    p.end_continuation();

    p.start_continuation();
    p.push_null();
    p.push_null();
    p.push_null();
    p.push(-3, "");
    p.end_continuation();

    p.if_else();
    p.end_opaque(3, 3, false);
    Ok(())
}

/// Stack: `key dict`. Fetches the element, leaving the value or NULL.
pub fn dict_fetch(
    p: &mut StackPusher,
    key: &Ty,
    value: &Ty,
    loc: &SrcLoc,
) -> Result<()> {
    let prefix = dict_prefix(key, loc)?;
    p.push_int(key_length(key) as i64);

    p.start_opaque();
    p.push_asym(&format!("{prefix}GET"));
    p.push_asym("NULLSWAPIFNOT");

    p.start_continuation();
    preload_value(p, value);
    p.end_continuation();

    p.if_();
    p.end_opaque(3, 1, false);
    Ok(())
}
