//! Configuration constants for the scene graph store.

/// Default path-segment separator used by [`crate::path`] when the caller
/// doesn't supply a custom one.
///
/// # Grammar
/// `segment ( SEP segment )*` with `segment = name ( '[' index ']' )?`.
pub const DEFAULT_PATH_SEPARATOR: char = '.';

/// Size classes (in bytes) used by the [`crate::pool::BufferPool`].
///
/// Buffers are rented in one of these classes, rounded up to the next
/// class that fits `min_bytes`. Chosen as a power-of-two ladder, the same
/// shape BusTub-style page pools use for fixed-size frames, generalized
/// here to variable container sizes.
///
/// # Alignment
/// Every class is a multiple of 8, so any scalar field (max natural
/// alignment 8 per the type system) never straddles a class boundary.
pub const POOL_SIZE_CLASSES: &[usize] = &[
    32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];

/// Largest size class. Requests above this fall back to an exact-fit
/// one-off allocation that is never pooled (see [`crate::pool::BufferPool::rent`]).
pub const POOL_MAX_CLASS: usize = 65536;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes_sorted_and_aligned() {
        assert!(POOL_SIZE_CLASSES.windows(2).all(|w| w[0] < w[1]));
        assert!(POOL_SIZE_CLASSES.iter().all(|&c| c % 8 == 0));
        assert_eq!(*POOL_SIZE_CLASSES.last().unwrap(), POOL_MAX_CLASS);
    }
}
