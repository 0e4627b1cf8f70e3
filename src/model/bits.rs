//! Bit-buffer helpers: validation, sub-range splicing, content hashing.
//!
//! Buffers are strings of `'0'`/`'1'`. Operations never mutate in place;
//! every transform returns a fresh string.

/// Half-open sub-range of a buffer, `0 <= start <= end <= len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BitRange {
    pub start: usize,
    pub end: usize,
}

impl BitRange {
    pub fn check(&self, len: usize) -> Result<(), String> {
        if self.start > self.end {
            return Err(format!(
                "invalid range [{}:{}] (start > end)",
                self.start, self.end
            ));
        }
        if self.end > len {
            return Err(format!(
                "range [{}:{}] exceeds buffer length {len}",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

pub fn is_bit_string(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b == b'0' || b == b'1')
}

pub fn validate(s: &str) -> Result<(), String> {
    match s.bytes().position(|b| b != b'0' && b != b'1') {
        None => Ok(()),
        Some(i) => Err(format!(
            "not a bit string: unexpected {:?} at position {i}",
            &s[i..i + 1]
        )),
    }
}

/// Replace `range` of `bits` with `segment`. The caller guarantees the range
/// is in bounds; a segment of different length changes the buffer length.
pub fn splice(bits: &str, range: BitRange, segment: &str) -> String {
    let mut out = String::with_capacity(bits.len() - (range.end - range.start) + segment.len());
    out.push_str(&bits[..range.start]);
    out.push_str(segment);
    out.push_str(&bits[range.end..]);
    out
}

/// Cheap rolling multiplicative hash for equality short-circuiting.
/// Not cryptographic; collisions fall back to a positional diff.
pub fn content_hash(bits: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bits.bytes() {
        h = h.wrapping_mul(0x0100_0000_01b3).wrapping_add(u64::from(b));
    }
    h
}

/// Deterministic content-derived seed: a checksum-like fold over the set
/// bit positions. Same content always yields the same seed.
pub fn content_seed(bits: &str) -> u64 {
    let mut h: u64 = 0x9e37_79b9_7f4a_7c15;
    for (i, b) in bits.bytes().enumerate() {
        if b == b'1' {
            h ^= (i as u64).wrapping_add(1).wrapping_mul(0x0100_0000_01b3);
        }
        h = h.rotate_left(5).wrapping_mul(0x2545_f491_4f6c_dd1d);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_bits_and_rejects_others() {
        assert!(validate("0101").is_ok());
        assert!(validate("").is_ok());
        let err = validate("01a1").unwrap_err();
        assert!(err.contains("position 2"));
    }

    #[test]
    fn splice_replaces_subrange() {
        let out = splice("11110000", BitRange { start: 2, end: 6 }, "0101");
        assert_eq!(out, "11010100");
    }

    #[test]
    fn content_hash_distinguishes_order() {
        assert_ne!(content_hash("01"), content_hash("10"));
        assert_eq!(content_hash("0110"), content_hash("0110"));
    }

    #[test]
    fn content_seed_is_stable_and_content_sensitive() {
        let a = content_seed("10101010");
        assert_eq!(a, content_seed("10101010"));
        assert_ne!(a, content_seed("10101011"));
        // Position-sensitive, not just popcount-sensitive.
        assert_ne!(content_seed("1100"), content_seed("0011"));
    }

    #[test]
    fn range_check_bounds() {
        assert!(BitRange { start: 0, end: 4 }.check(4).is_ok());
        assert!(BitRange { start: 3, end: 2 }.check(4).is_err());
        assert!(BitRange { start: 0, end: 5 }.check(4).is_err());
    }
}
