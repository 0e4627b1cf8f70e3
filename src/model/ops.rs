//! Operation registry: the closed set of bit-transform primitives.
//!
//! Every operation is a pure function `(bits, resolved_params) -> bits`. No
//! wall clock, no ambient randomness: `shuffle`/`unshuffle`/`scramble` draw
//! exclusively from a ChaCha20 stream seeded by the resolved seed, so the
//! same resolved parameters always reproduce the same output.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Direction, Params};

pub type OpFn = fn(&str, &Params) -> Result<String, OpError>;

/// An operation implementation's own failure (bad mask length, missing
/// position, out-of-range offset). Aborts the current command, never the
/// process.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct OpError(pub String);

#[derive(Clone)]
pub enum OpImpl {
    Builtin(OpFn),
    Custom(Arc<dyn Fn(&str, &Params) -> Result<String, OpError> + Send + Sync>),
}

impl OpImpl {
    fn apply(&self, bits: &str, params: &Params) -> Result<String, OpError> {
        match self {
            OpImpl::Builtin(f) => f(bits, params),
            OpImpl::Custom(f) => f(bits, params),
        }
    }
}

impl std::fmt::Debug for OpImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpImpl::Builtin(_) => f.write_str("OpImpl::Builtin"),
            OpImpl::Custom(_) => f.write_str("OpImpl::Custom"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OpInfo {
    pub id: String,
    pub cost: u64,
    #[serde(rename = "requiresMask")]
    pub requires_mask: bool,
    #[serde(rename = "requiresSeed")]
    pub requires_seed: bool,
}

/// Registered definition: identity, cost, parameter classification, impl.
#[derive(Debug, Clone)]
pub struct OperationDef {
    pub id: String,
    pub cost: u64,
    pub requires_mask: bool,
    /// Identity-preserving mask default: all-ones (AND) vs all-zeros (OR/XOR).
    pub mask_default_ones: bool,
    pub requires_seed: bool,
    pub uses_count: bool,
    pub uses_position: bool,
    pub implementation: OpImpl,
}

#[derive(Debug, Clone)]
pub struct OpRegistry {
    ops: BTreeMap<String, OperationDef>,
}

impl OpRegistry {
    /// The builtin catalog. Infallible by construction; `validate` guards
    /// the same invariants for custom registrations.
    pub fn standard() -> Self {
        let mut r = Self {
            ops: BTreeMap::new(),
        };
        let defs = [
            ("not", 1, false, false, false, false, false, op_not as OpFn),
            ("and", 1, true, true, false, false, false, op_and),
            ("or", 1, true, false, false, false, false, op_or),
            ("xor", 1, true, false, false, false, false, op_xor),
            ("shl", 1, false, false, false, true, false, op_shl),
            ("shr", 1, false, false, false, true, false, op_shr),
            ("rol", 1, false, false, false, true, false, op_rol),
            ("ror", 1, false, false, false, true, false, op_ror),
            ("rev", 1, false, false, false, false, false, op_rev),
            ("flip", 1, false, false, false, false, true, op_flip),
            ("diff", 2, false, false, false, false, false, op_diff),
            ("dediff", 2, false, false, false, false, false, op_dediff),
            ("shuffle", 3, false, false, true, false, false, op_shuffle),
            ("unshuffle", 3, false, false, true, false, false, op_unshuffle),
            ("scramble", 3, false, false, true, false, false, op_scramble),
        ];
        for (id, cost, mask, ones, seed, count, position, f) in defs {
            r.ops.insert(
                id.to_string(),
                OperationDef {
                    id: id.to_string(),
                    cost,
                    requires_mask: mask,
                    mask_default_ones: ones,
                    requires_seed: seed,
                    uses_count: count,
                    uses_position: position,
                    implementation: OpImpl::Builtin(f),
                },
            );
        }
        r
    }

    pub fn lookup(&self, id: &str) -> Option<&OperationDef> {
        self.ops.get(&id.to_ascii_lowercase())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    /// Serializable catalog view for listings.
    pub fn catalog(&self) -> Vec<OpInfo> {
        self.ops
            .values()
            .map(|def| OpInfo {
                id: def.id.clone(),
                cost: def.cost,
                requires_mask: def.requires_mask,
                requires_seed: def.requires_seed,
            })
            .collect()
    }

    /// Register a caller-provided operation. The id becomes part of the
    /// closed set; classification and cost are validated up front so every
    /// registered id has a complete definition.
    pub fn register_custom(&mut self, def: OperationDef) -> Result<(), OpError> {
        Self::validate(&def)?;
        self.ops.insert(def.id.to_ascii_lowercase(), def);
        Ok(())
    }

    fn validate(def: &OperationDef) -> Result<(), OpError> {
        if def.id.is_empty() || !def.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OpError(format!(
                "invalid operation id {:?} (expected [a-z0-9_]+)",
                def.id
            )));
        }
        if def.cost == 0 {
            return Err(OpError(format!("operation {:?} must declare a cost >= 1", def.id)));
        }
        if def.requires_mask && def.requires_seed {
            return Err(OpError(format!(
                "operation {:?} cannot require both mask and seed",
                def.id
            )));
        }
        Ok(())
    }

    /// Apply `id` to `bits` with a *resolved* parameter set. Respects the
    /// `direction` parameter for invertible pairs and the `range` parameter
    /// for sub-segment scoping (scoped results must preserve segment length).
    pub fn apply(&self, id: &str, bits: &str, params: &Params) -> Result<String, OpError> {
        let canonical = canonical_op_id(id, params.direction);
        let def = self
            .lookup(canonical)
            .ok_or_else(|| OpError(format!("unknown operation {id:?}")))?;

        let Some(range) = params.range else {
            return def.implementation.apply(bits, params);
        };

        range.check(bits.len()).map_err(OpError)?;
        let segment = &bits[range.start..range.end];
        let replaced = def.implementation.apply(segment, params)?;
        if replaced.len() != segment.len() {
            return Err(OpError(format!(
                "operation {id:?} changed scoped segment length ({} -> {})",
                segment.len(),
                replaced.len()
            )));
        }
        Ok(crate::splice(bits, range, &replaced))
    }
}

/// `delta`/`permute` name an invertible pair; `direction` selects the side.
/// Callers resolving parameters must canonicalize first so seed defaults
/// attach to the concrete operation.
pub fn canonical_op_id(id: &str, direction: Option<Direction>) -> &str {
    match (id, direction) {
        ("delta", Some(Direction::Decode)) => "dediff",
        ("delta", _) => "diff",
        ("permute", Some(Direction::Decode)) => "unshuffle",
        ("permute", _) => "shuffle",
        _ => id,
    }
}

fn mask_of<'a>(bits: &str, params: &'a Params) -> Result<&'a str, OpError> {
    let mask = params
        .mask
        .as_deref()
        .ok_or_else(|| OpError("missing mask (unresolved parameters?)".to_string()))?;
    if mask.len() != bits.len() {
        return Err(OpError(format!(
            "mask length {} does not match buffer length {}",
            mask.len(),
            bits.len()
        )));
    }
    crate::validate(mask).map_err(OpError)?;
    Ok(mask)
}

fn gate(bits: &str, params: &Params, f: impl Fn(bool, bool) -> bool) -> Result<String, OpError> {
    let mask = mask_of(bits, params)?;
    Ok(bits
        .bytes()
        .zip(mask.bytes())
        .map(|(b, m)| if f(b == b'1', m == b'1') { '1' } else { '0' })
        .collect())
}

fn op_not(bits: &str, _params: &Params) -> Result<String, OpError> {
    Ok(bits
        .bytes()
        .map(|b| if b == b'1' { '0' } else { '1' })
        .collect())
}

fn op_and(bits: &str, params: &Params) -> Result<String, OpError> {
    gate(bits, params, |b, m| b && m)
}

fn op_or(bits: &str, params: &Params) -> Result<String, OpError> {
    gate(bits, params, |b, m| b || m)
}

fn op_xor(bits: &str, params: &Params) -> Result<String, OpError> {
    gate(bits, params, |b, m| b != m)
}

fn count_of(params: &Params) -> u64 {
    params.count.unwrap_or(1)
}

fn op_shl(bits: &str, params: &Params) -> Result<String, OpError> {
    let n = (count_of(params) as usize).min(bits.len());
    Ok(format!("{}{}", &bits[n..], "0".repeat(n)))
}

fn op_shr(bits: &str, params: &Params) -> Result<String, OpError> {
    let n = (count_of(params) as usize).min(bits.len());
    Ok(format!("{}{}", "0".repeat(n), &bits[..bits.len() - n]))
}

fn op_rol(bits: &str, params: &Params) -> Result<String, OpError> {
    if bits.is_empty() {
        return Ok(String::new());
    }
    let n = (count_of(params) as usize) % bits.len();
    Ok(format!("{}{}", &bits[n..], &bits[..n]))
}

fn op_ror(bits: &str, params: &Params) -> Result<String, OpError> {
    if bits.is_empty() {
        return Ok(String::new());
    }
    let n = (count_of(params) as usize) % bits.len();
    Ok(format!("{}{}", &bits[bits.len() - n..], &bits[..bits.len() - n]))
}

fn op_rev(bits: &str, _params: &Params) -> Result<String, OpError> {
    Ok(bits.chars().rev().collect())
}

fn op_flip(bits: &str, params: &Params) -> Result<String, OpError> {
    let pos = params
        .position
        .ok_or_else(|| OpError("missing position (unresolved parameters?)".to_string()))?;
    if pos >= bits.len() {
        return Err(OpError(format!(
            "flip position {pos} out of range for buffer length {}",
            bits.len()
        )));
    }
    let mut out: Vec<u8> = bits.as_bytes().to_vec();
    out[pos] = if out[pos] == b'1' { b'0' } else { b'1' };
    Ok(String::from_utf8(out).unwrap_or_default())
}

fn op_diff(bits: &str, _params: &Params) -> Result<String, OpError> {
    let mut prev = b'0';
    let mut out = String::with_capacity(bits.len());
    for (i, b) in bits.bytes().enumerate() {
        if i == 0 {
            out.push(b as char);
        } else {
            out.push(if b != prev { '1' } else { '0' });
        }
        prev = b;
    }
    Ok(out)
}

fn op_dediff(bits: &str, _params: &Params) -> Result<String, OpError> {
    let mut prev = b'0';
    let mut out = String::with_capacity(bits.len());
    for (i, b) in bits.bytes().enumerate() {
        let decoded = if i == 0 {
            b
        } else if b == b'1' {
            if prev == b'1' { b'0' } else { b'1' }
        } else {
            prev
        };
        out.push(decoded as char);
        prev = decoded;
    }
    Ok(out)
}

fn seed_of(params: &Params) -> Result<u64, OpError> {
    params
        .seed
        .ok_or_else(|| OpError("missing seed (unresolved parameters?)".to_string()))
}

/// The Fisher-Yates swap schedule for a buffer of `len`, fully determined
/// by the seed. Shared by shuffle and unshuffle so the two sides always
/// agree on the permutation.
fn permutation(len: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut perm: Vec<usize> = (0..len).collect();
    for i in (1..len).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        perm.swap(i, j);
    }
    perm
}

fn op_shuffle(bits: &str, params: &Params) -> Result<String, OpError> {
    let seed = seed_of(params)?;
    let perm = permutation(bits.len(), seed);
    let src = bits.as_bytes();
    // out[i] = src[perm[i]]
    Ok(perm.iter().map(|&p| src[p] as char).collect())
}

fn op_unshuffle(bits: &str, params: &Params) -> Result<String, OpError> {
    let seed = seed_of(params)?;
    let perm = permutation(bits.len(), seed);
    let src = bits.as_bytes();
    let mut out = vec![b'0'; bits.len()];
    for (i, &p) in perm.iter().enumerate() {
        out[p] = src[i];
    }
    Ok(String::from_utf8(out).unwrap_or_default())
}

/// XOR with a Galois-LFSR keystream. Self-inverse for a fixed seed.
fn op_scramble(bits: &str, params: &Params) -> Result<String, OpError> {
    let seed = seed_of(params)?;
    let mut state = seed | 1; // a zero state would lock the register
    let mut out = String::with_capacity(bits.len());
    for b in bits.bytes() {
        let k = (state & 1) as u8;
        state >>= 1;
        if k == 1 {
            state ^= 0xB400_0000_0000_0000;
        }
        let bit = (b - b'0') ^ k;
        out.push(if bit == 1 { '1' } else { '0' });
    }
    Ok(out)
}
