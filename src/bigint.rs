//! Arbitrary-precision signed integers with bounded magnitude.
//!
//! A [`BigInt`] stores its magnitude as little-endian 64-bit chunks (least-significant chunk
//! first) and a separate sign bit. The magnitude may never exceed 255 chunks (~2 kB), matching
//! the single byte the wire format reserves for the chunk count.

use std::fmt;

/// Maximum number of 64-bit chunks a magnitude may occupy, fixed by the one-byte chunk-count
/// field in the wire format.
pub const MAX_CHUNKS: usize = 255;

/// An arbitrary-precision signed integer.
///
/// Construction never mutates another `BigInt` or number in place (Open Question 3): every
/// conversion computes a fresh, local magnitude.
#[derive(Clone, Debug)]
pub struct BigInt {
    negative: bool,
    // Little-endian 64-bit chunks. Normalized: no trailing (most-significant) zero chunks,
    // except that zero itself is represented as an empty chunk vec with `negative = false`.
    chunks: Vec<u64>,
}

impl BigInt {
    /// Construct a `BigInt` directly from a sign and little-endian chunk vector. `negative` is
    /// ignored (forced to `false`) when the magnitude is zero, matching the fact that there is
    /// only one representation of zero.
    pub fn from_chunks(negative: bool, mut chunks: Vec<u64>) -> BigInt {
        while chunks.last() == Some(&0) {
            chunks.pop();
        }
        let negative = negative && !chunks.is_empty();
        BigInt { negative, chunks }
    }

    /// The number of 64-bit chunks in the normalized magnitude.
    pub fn chunk_len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the value is negative (zero is always non-negative).
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The little-endian 64-bit magnitude chunks, least-significant first.
    pub fn magnitude_chunks(&self) -> &[u64] {
        &self.chunks
    }

    /// Exact `i64`/`u64` conversions, when the value fits.
    pub fn as_i64(&self) -> Option<i64> {
        if self.chunks.len() > 1 {
            return None;
        }
        let mag = self.chunks.first().copied().unwrap_or(0);
        if self.negative {
            if mag <= (i64::MAX as u64) + 1 {
                Some(-(mag as i128) as i64)
            } else {
                None
            }
        } else if mag <= i64::MAX as u64 {
            Some(mag as i64)
        } else {
            None
        }
    }

    /// A best-effort lossy `f64` conversion (may lose precision for large magnitudes).
    pub fn as_f64(&self) -> f64 {
        let mut acc = 0f64;
        for &chunk in self.chunks.iter().rev() {
            acc = acc * (u64::MAX as f64 + 1.0) + chunk as f64;
        }
        if self.negative {
            -acc
        } else {
            acc
        }
    }
}

impl From<i64> for BigInt {
    fn from(v: i64) -> BigInt {
        if v == 0 {
            return BigInt { negative: false, chunks: Vec::new() };
        }
        let negative = v < 0;
        BigInt::from_chunks(negative, vec![v.unsigned_abs()])
    }
}

impl From<u64> for BigInt {
    fn from(v: u64) -> BigInt {
        BigInt::from_chunks(false, vec![v])
    }
}

impl PartialEq for BigInt {
    fn eq(&self, other: &Self) -> bool {
        self.negative == other.negative && self.chunks == other.chunks
    }
}
impl Eq for BigInt {}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.chunks.is_empty() {
            return f.write_str("0");
        }
        if self.negative {
            f.write_str("-")?;
        }
        // Decimal conversion via repeated divmod by 10, MSB-first chunk order for the divmod.
        let mut digits = Vec::new();
        let mut work: Vec<u64> = self.chunks.clone();
        while work.iter().any(|&c| c != 0) {
            let mut rem: u128 = 0;
            for chunk in work.iter_mut().rev() {
                let cur = (rem << 64) | (*chunk as u128);
                *chunk = (cur / 10) as u64;
                rem = cur % 10;
            }
            digits.push((rem as u8) + b'0');
            while work.last() == Some(&0) {
                work.pop();
            }
        }
        digits.reverse();
        f.write_str(std::str::from_utf8(&digits).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn zero_is_never_negative() {
        let z = BigInt::from_chunks(true, vec![0, 0, 0]);
        assert!(!z.is_negative());
        assert_eq!(z.chunk_len(), 0);
    }

    #[test]
    fn trailing_zero_chunks_are_trimmed() {
        let v = BigInt::from_chunks(false, vec![5, 0, 0]);
        assert_eq!(v.chunk_len(), 1);
        assert_eq!(v.magnitude_chunks(), &[5]);
    }

    #[test]
    fn i64_min_round_trips() {
        let v = BigInt::from(i64::MIN);
        assert!(v.is_negative());
        assert_eq!(v.magnitude_chunks(), &[i64::MIN.unsigned_abs()]);
        assert_eq!(v.as_i64(), Some(i64::MIN));
    }

    #[test]
    fn max_chunk_count_is_255() {
        let chunks: Vec<u64> = (1..=255u64).collect();
        let v = BigInt::from_chunks(false, chunks);
        assert_eq!(v.chunk_len(), 255);
    }

    #[test]
    fn display_matches_known_values() {
        assert_eq!(BigInt::from(0i64).to_string(), "0");
        assert_eq!(BigInt::from(12345i64).to_string(), "12345");
        assert_eq!(BigInt::from(-42i64).to_string(), "-42");
        let big = BigInt::from_chunks(false, vec![0, 1]); // 2^64
        assert_eq!(big.to_string(), "18446744073709551616");
    }

    #[test]
    fn random_u64_chunks_display_consistently_with_i64_for_small_values() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let v: i64 = rng.gen_range(-1_000_000..1_000_000);
            let big = BigInt::from(v);
            assert_eq!(big.to_string(), v.to_string());
        }
    }
}
