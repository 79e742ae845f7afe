//! Cheap per-worker pseudo-random numbers for victim selection.
//!
//! xorshift64; not cryptographically secure. Only used to spread steal
//! attempts across siblings.

#[derive(Debug, Clone)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// A zero seed is replaced with 1 (zero is a fixed point).
    pub(crate) const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform-ish index in `[0, bound)`. `bound` must be non-zero.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "bound must be non-zero");
        (self.next_u64() % bound as u64) as usize
    }
}
