//! Modular arithmetic on the 24-bit sequence and index spaces.
//!
//! Sequence numbers, reliable indices, order indices and sequence indices all
//! travel as u24 and wrap. The windows compared here are always far smaller
//! than half the number space, so "newer" is decided by the signed distance.

/// Number of distinct values in the u24 space.
pub const U24_SPACE: u32 = 1 << 24;

const U24_MASK: u32 = U24_SPACE - 1;
const HALF_SPACE: u32 = U24_SPACE / 2;

/// Next value after `v`, wrapping at 2^24.
#[inline]
pub fn next(v: u32) -> u32 {
    v.wrapping_add(1) & U24_MASK
}

/// Forward distance from `from` to `to`.
#[inline]
pub fn distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from) & U24_MASK
}

/// True when `a` comes strictly after `b`.
#[inline]
pub fn is_newer(a: u32, b: u32) -> bool {
    let d = distance(b, a);
    d != 0 && d < HALF_SPACE
}

/// True when `a` comes strictly before `b`.
#[inline]
pub fn is_older(a: u32, b: u32) -> bool {
    is_newer(b, a)
}
