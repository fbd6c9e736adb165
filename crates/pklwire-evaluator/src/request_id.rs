//! Correlation id generation.

/// SplitMix64 generator producing non-negative 63-bit ids.
///
/// Each evaluator seeds its own generator with its evaluator id, so ids are
/// unique per session without any shared counter.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    state: u64,
}

impl RequestIdGenerator {
    pub fn new(seed: i64) -> Self {
        Self { state: seed as u64 }
    }

    pub fn next_id(&mut self) -> i64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        (z & (u64::MAX >> 1)) as i64
    }
}
