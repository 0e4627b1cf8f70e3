//! Operation parameters and the parameter resolver.
//!
//! A `Params` value exists in two states: *caller-supplied* (partial, as
//! parsed from a command line) and *resolved* (complete, with defaults
//! materialized). Only resolver output is valid for recording and replay;
//! the interpreter never persists a caller-supplied set.

use serde::{Deserialize, Serialize};

use crate::{BitRange, OpRegistry, content_seed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Encode,
    Decode,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "encode" => Ok(Self::Encode),
            "decode" => Ok(Self::Decode),
            other => Err(format!("invalid direction {other:?} (expected encode|decode)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<BitRange>,
}

impl Params {
    pub fn with_mask(mask: &str) -> Self {
        Self {
            mask: Some(mask.to_string()),
            value: Some(mask.to_string()),
            ..Self::default()
        }
    }

    pub fn with_count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Fill in every required-but-missing parameter for `op_id` against `bits`,
/// returning the complete set that will actually be applied and persisted.
///
/// Defaults are deterministic functions of the operation and the buffer:
/// - masks get the operation's identity-preserving default sized to the
///   buffer (AND: all-ones, OR/XOR: all-zeros), so an omitted mask never
///   alters data;
/// - seeds derive from buffer content, so replaying the same content with
///   no explicit seed reproduces the same output;
/// - `default_seed` (a run-level override) wins over content derivation but
///   never over a caller-supplied seed;
/// - count defaults to 1, position to 0, for operations that consume them.
///
/// Unknown operation ids resolve to the caller set unchanged; the registry
/// lookup failure surfaces when the operation is applied.
pub fn resolve(
    ops: &OpRegistry,
    op_id: &str,
    bits: &str,
    caller: &Params,
    default_seed: Option<u64>,
) -> Params {
    let mut out = caller.clone();
    let Some(def) = ops.lookup(op_id) else {
        return out;
    };

    // Scoped operations see only their segment; defaults are sized and
    // derived against that view.
    let effective = match out.range {
        Some(r) if r.start <= r.end && r.end <= bits.len() => &bits[r.start..r.end],
        _ => bits,
    };

    if def.requires_mask && out.mask.is_none() {
        let fill = if def.mask_default_ones { "1" } else { "0" };
        out.mask = Some(fill.repeat(effective.len()));
    }
    if def.requires_seed && out.seed.is_none() {
        out.seed = Some(default_seed.unwrap_or_else(|| content_seed(effective)));
    }
    if def.uses_count && out.count.is_none() {
        out.count = Some(1);
    }
    if def.uses_position && out.position.is_none() {
        out.position = Some(0);
    }
    out
}
