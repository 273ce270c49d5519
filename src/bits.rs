//! Multi-word bit-vector arithmetic.
//!
//! A hypercube position carries one bit per dimension, so above 64
//! dimensions positions no longer fit a machine word. Everything here
//! operates on slices of `u64` treated as one wide unsigned integer, most
//! significant word first: bit 0 is the least significant bit of the *last*
//! word, bit `64 * k` the least significant bit of the `k`-th word from the
//! end.

use smallvec::{smallvec, SmallVec};

/// A hypercube position. Two inline words cover up to 128 dimensions
/// without allocating.
pub type HcPos = SmallVec<[u64; 2]>;

/// Words needed to hold one bit per dimension.
#[inline]
pub fn num_pos_words(dims: usize) -> usize {
    (dims + 63) / 64
}

/// `v + 1 mod 2^(64 * v.len())`. The carry propagates from the last
/// (least significant) word towards the first.
pub fn inc(v: &mut [u64]) {
    for w in v.iter_mut().rev() {
        let (r, carry) = w.overflowing_add(1);
        *w = r;
        if !carry {
            return;
        }
    }
}

/// `v - 1 mod 2^(64 * v.len())`.
pub fn dec(v: &mut [u64]) {
    for w in v.iter_mut().rev() {
        let (r, borrow) = w.overflowing_sub(1);
        *w = r;
        if !borrow {
            return;
        }
    }
}

/// Advances one word to the next value whose bits stay per-bit between
/// `min` and `max`; wraps around to `min` past `max`.
#[inline]
fn inc_word_bounded(v: u64, min: u64, max: u64) -> u64 {
    let r = (v | !max).wrapping_add(1);
    (r & max) | min
}

/// Odometer step over an axis-aligned box of bit vectors.
///
/// Advances `val` to the next vector whose bits lie, bit for bit, between
/// the corresponding bits of `min` and `max`. Successive calls enumerate
/// every vector inside the box in strictly increasing order without ever
/// materializing the full position set. Returns `false` once the sequence
/// wraps past `max`, leaving `val == min`.
pub fn inc_bounded(val: &mut [u64], min: &[u64], max: &[u64]) -> bool {
    debug_assert_eq!(val.len(), min.len());
    debug_assert_eq!(val.len(), max.len());
    for i in (0..val.len()).rev() {
        let prev = val[i];
        val[i] = inc_word_bounded(prev, min[i], max[i]);
        if prev != max[i] {
            return true;
        }
        // This word wrapped around to its min; carry into the next word up.
    }
    false
}

/// Lexicographic unsigned `a < b`, most significant word first.
pub fn is_less(a: &[u64], b: &[u64]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    for (wa, wb) in a.iter().zip(b) {
        if wa != wb {
            return wa < wb;
        }
    }
    false
}

/// Lexicographic unsigned `a <= b`.
pub fn is_less_eq(a: &[u64], b: &[u64]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    for (wa, wb) in a.iter().zip(b) {
        if wa != wb {
            return wa < wb;
        }
    }
    true
}

/// Word-wise equality.
#[inline]
pub fn is_eq(a: &[u64], b: &[u64]) -> bool {
    a == b
}

/// Counts how many leading bits of `a` and `b` agree within the active
/// width. Bits at or above `width_bits` are masked to zero before
/// comparing; returns `width_bits` when the vectors agree throughout.
pub fn common_leading_bits(a: &[u64], b: &[u64], width_bits: u32) -> u32 {
    let w = a.len();
    debug_assert_eq!(w, b.len());
    debug_assert!(width_bits <= 64 * w as u32);
    let mut matched = 0u32;
    for i in 0..w {
        // Global bit index of this word's least significant bit.
        let lower = ((w - 1 - i) as u32) * 64;
        if lower >= width_bits {
            continue;
        }
        let active = (width_bits - lower).min(64);
        let mask = if active == 64 { !0 } else { (1u64 << active) - 1 };
        let x = (a[i] ^ b[i]) & mask;
        if x == 0 {
            matched += active;
        } else {
            return matched + (x.leading_zeros() - (64 - active));
        }
    }
    matched
}

/// Highest diverging bit index + 1 within the inclusive global bit range
/// `[from, to]`, or 0 when `a` and `b` agree throughout that range.
///
/// Narrowing the range never increases the result; it drops to 0 once the
/// differing bit falls outside.
pub fn max_conflicting_bits(a: &[u64], b: &[u64], from: u32, to: u32) -> u32 {
    let w = a.len();
    debug_assert_eq!(w, b.len());
    debug_assert!(from <= to);
    for i in 0..w {
        let lower = ((w - 1 - i) as u32) * 64;
        let upper = lower + 63;
        if lower > to {
            continue;
        }
        if upper < from {
            break;
        }
        let mut x = a[i] ^ b[i];
        if to < upper {
            x &= (1u64 << (to - lower + 1)) - 1;
        }
        if from > lower {
            x &= !((1u64 << (from - lower)) - 1);
        }
        if x != 0 {
            return lower + (63 - x.leading_zeros()) + 1;
        }
    }
    0
}

/// Binary search over a sorted slice of equal-width vectors. Returns
/// `Ok(index)` when `key` is present, `Err(insertion_point)` otherwise;
/// inserting at the reported point keeps the slice sorted.
pub fn binary_search<K: AsRef<[u64]>>(sorted: &[K], key: &[u64]) -> Result<usize, usize> {
    let mut lo = 0usize;
    let mut hi = sorted.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        let probe = sorted[mid].as_ref();
        if is_eq(probe, key) {
            return Ok(mid);
        }
        if is_less(probe, key) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Err(lo)
}

/// Writes the per-dimension bits of `pos` into bit `bit` of every word of
/// `key`. Dimension `d` maps to bit `dims - 1 - d` of the position vector.
pub fn apply_pos(pos: &[u64], bit: u16, key: &mut [u64]) {
    let dims = key.len();
    let nw = pos.len();
    debug_assert_eq!(nw, num_pos_words(dims));
    for d in 0..dims {
        let p = dims - 1 - d;
        let set = (pos[nw - 1 - p / 64] >> (p % 64)) & 1 != 0;
        if set {
            key[d] |= 1u64 << bit;
        } else {
            key[d] &= !(1u64 << bit);
        }
    }
}

/// Inverse of [`apply_pos`]: gathers bit `bit` of every dimension word of
/// `key` into `pos`.
pub fn extract_pos(key: &[u64], bit: u16, pos: &mut [u64]) {
    let dims = key.len();
    let nw = pos.len();
    debug_assert_eq!(nw, num_pos_words(dims));
    pos.fill(0);
    for d in 0..dims {
        if (key[d] >> bit) & 1 != 0 {
            let p = dims - 1 - d;
            pos[nw - 1 - p / 64] |= 1u64 << (p % 64);
        }
    }
}

/// The hypercube position of `key` at depth `bit`, freshly allocated.
pub fn pos_of(key: &[u64], bit: u16) -> HcPos {
    let mut pos: HcPos = smallvec![0; num_pos_words(key.len())];
    extract_pos(key, bit, &mut pos);
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: u64 = u64::MAX;

    #[test]
    fn test_inc() {
        let mut v = vec![0u64];
        inc(&mut v);
        assert_eq!(v, [1]);

        let mut v = vec![0, M];
        inc(&mut v);
        assert_eq!(v, [1, 0]);

        let mut v = vec![1, 0];
        inc(&mut v);
        assert_eq!(v, [1, 1]);

        let mut v = vec![M, M];
        inc(&mut v);
        assert_eq!(v, [0, 0]);
    }

    #[test]
    fn test_dec() {
        let mut v = vec![1u64];
        dec(&mut v);
        assert_eq!(v, [0]);

        let mut v = vec![1, 0];
        dec(&mut v);
        assert_eq!(v, [0, M]);

        let mut v = vec![1, 1];
        dec(&mut v);
        assert_eq!(v, [1, 0]);

        let mut v = vec![0, 0];
        dec(&mut v);
        assert_eq!(v, [M, M]);
    }

    fn walk_box(min: &[u64], max: &[u64]) -> usize {
        let mut val = min.to_vec();
        let mut prev = min.to_vec();
        let mut n = 0;
        while inc_bounded(&mut val, min, max) {
            n += 1;
            assert!(is_less(&prev, &val), "odometer must strictly increase");
            prev.copy_from_slice(&val);
        }
        assert!(is_eq(min, &val), "odometer must wrap back to min");
        n
    }

    #[test]
    fn test_inc_bounded_high_box() {
        let min = [0xFFFF_FFF0u64, 0x0FFF_FFFF_FFFF_FFFF];
        let max = [0xFFFF_FFFFu64, M];
        assert_eq!(walk_box(&min, &max), 255);
    }

    #[test]
    fn test_inc_bounded_low_box() {
        let min = [0u64, 0];
        let max = [0x0Fu64, 0xF000_0000_0000_0000];
        assert_eq!(walk_box(&min, &max), 255);
    }

    #[test]
    fn test_common_leading_bits() {
        assert_eq!(common_leading_bits(&[0], &[M], 64), 0);
        assert_eq!(common_leading_bits(&[M], &[M], 64), 64);
        assert_eq!(common_leading_bits(&[0], &[0], 64), 64);

        assert_eq!(common_leading_bits(&[0, 0], &[M, M], 96), 0);
        assert_eq!(common_leading_bits(&[0xFFFF_FFFF, M], &[M, M], 96), 96);
        assert_eq!(common_leading_bits(&[0, 0], &[0, 0], 96), 96);

        assert_eq!(common_leading_bits(&[0, 0], &[M, M], 128), 0);
        assert_eq!(common_leading_bits(&[M, M], &[M, M], 128), 128);
        assert_eq!(common_leading_bits(&[0, 0], &[0, 0], 128), 128);
    }

    #[test]
    fn test_less() {
        assert!(is_less(&[0, 1], &[1, 0]));
        assert!(is_less(&[0, M], &[1, 0]));
        assert!(is_less(&[0, 1], &[1, M]));
        assert!(!is_less(&[1, 1], &[1, 0]));
        assert!(!is_less(&[1, 1], &[1, 1]));
    }

    #[test]
    fn test_less_eq() {
        assert!(is_less_eq(&[0, 1], &[1, 0]));
        assert!(is_less_eq(&[0, M], &[1, 0]));
        assert!(is_less_eq(&[0, 1], &[1, M]));
        assert!(!is_less_eq(&[1, 1], &[1, 0]));
        assert!(is_less_eq(&[1, 1], &[1, 1]));
    }

    #[test]
    fn test_max_conflicting_bits() {
        let z = [0u64, 0, 0];
        assert_eq!(max_conflicting_bits(&z, &[0, 0, 0], 0, 191), 0);
        assert_eq!(max_conflicting_bits(&[1, 1, 1], &[1, 1, 1], 0, 191), 0);
        assert_eq!(max_conflicting_bits(&z, &[0, 0, 1], 0, 191), 1);
        assert_eq!(max_conflicting_bits(&z, &[0, 0, 2], 0, 191), 2);
        assert_eq!(max_conflicting_bits(&z, &[0, 0, M], 0, 191), 64);
        assert_eq!(max_conflicting_bits(&z, &[0, 0, M], 1, 191), 64);
        assert_eq!(max_conflicting_bits(&z, &[0, 0, M], 64, 191), 0);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, 0], 1, 191), 65);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, 0], 1, 64), 65);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, 0], 1, 63), 0);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, 1], 1, 63), 0);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, M], 1, 63), 64);
        assert_eq!(max_conflicting_bits(&z, &[0, 1, M], 1, 62), 63);
    }

    #[test]
    fn test_binary_search() {
        let ba: [[u64; 2]; 8] = [
            [0, 1],
            [0, 34],
            [0, 43],
            [10, 12],
            [100, 255],
            [100, 1000],
            [100, M],
            [101, 1],
        ];
        assert_eq!(binary_search(&ba, &[0, 0]), Err(0));
        assert_eq!(binary_search(&ba, &[0, 1]), Ok(0));
        assert_eq!(binary_search(&ba, &[0, 2]), Err(1));
        assert_eq!(binary_search(&ba, &[0, 34]), Ok(1));
        assert_eq!(binary_search(&ba, &[0, 40]), Err(2));
        assert_eq!(binary_search(&ba, &[0, 43]), Ok(2));
        assert_eq!(binary_search(&ba, &[0, 45]), Err(3));
        assert_eq!(binary_search(&ba, &[3, 45]), Err(3));
        assert_eq!(binary_search(&ba, &[10, 4]), Err(3));
        assert_eq!(binary_search(&ba, &[11, 45]), Err(4));
        assert_eq!(binary_search(&ba, &[1000, 45]), Err(8));
        assert_eq!(binary_search(&ba, &[10, 12]), Ok(3));
        assert_eq!(binary_search(&ba, &[100, 255]), Ok(4));
        assert_eq!(binary_search(&ba, &[100, 999]), Err(5));
        assert_eq!(binary_search(&ba, &[100, 1000]), Ok(5));
        assert_eq!(binary_search(&ba, &[100, 1001]), Err(6));
        assert_eq!(binary_search(&ba, &[100, M]), Ok(6));
        assert_eq!(binary_search(&ba, &[101, 0]), Err(7));
        assert_eq!(binary_search(&ba, &[101, 1]), Ok(7));
        assert_eq!(binary_search(&ba, &[101, 2]), Err(8));
        assert_eq!(binary_search(&ba, &[102, 0]), Err(8));
        assert_eq!(binary_search(&ba, &[M, 0]), Err(8));
    }

    fn check_pos_roundtrip(key_in: &[u64], pos: &[u64], key_out: &[u64]) {
        let mut key = key_in.to_vec();
        apply_pos(pos, 1, &mut key);
        assert_eq!(key, key_out);

        let mut read = vec![0u64; pos.len()];
        extract_pos(&key, 1, &mut read);
        assert_eq!(read, pos);
    }

    #[test]
    fn test_apply_extract_pos() {
        check_pos_roundtrip(&[0, 0], &[0b11], &[2, 2]);
        check_pos_roundtrip(&[7, 7], &[0b00], &[5, 5]);
        check_pos_roundtrip(&[7, 0], &[0b01], &[5, 2]);
        check_pos_roundtrip(&[0, 7], &[0b10], &[2, 5]);
    }

    #[test]
    fn test_pos_multiword() {
        // 70 dimensions: positions span two words.
        let mut key = vec![0u64; 70];
        key[0] = 1 << 5; // position bit 69, word 0
        key[69] = 1 << 5; // position bit 0, word 1
        let pos = pos_of(&key, 5);
        assert_eq!(pos.len(), 2);
        assert_eq!(pos[0], 1 << 5); // bit 69 = bit 5 of the high word
        assert_eq!(pos[1], 1);

        let mut rebuilt = vec![0u64; 70];
        apply_pos(&pos, 5, &mut rebuilt);
        assert_eq!(rebuilt, key);
    }
}
