//! Byte/short quantized regret tables (spec.md §4.7: "When
//! `quantized_streets[st]` is true, regrets occupy one byte per (bucket,
//! succ) and are looked up through a 256-entry uncompress table; the
//! increment is applied in the expanded domain and re-compressed via
//! `CompressRegret` with a uniform-random dither.").
//!
//! Grounded on the teacher's table-driven abstraction style
//! (`examples/krukah-robopoker/src/clustering/histogram.rs` builds a fixed
//! lookup table once and indexes it repeatedly); the quantization curve
//! itself is a logarithmic ramp so that small regrets (which dominate,
//! fresh off the zero-regret action) get fine resolution and large ones
//! get coarse resolution, the way a u-law/A-law audio codec favors quiet
//! signal.

use rand::Rng;

pub const CHAR_LEVELS: u32 = 256;
pub const SHORT_LEVELS: u32 = 65536;

/// a monotonic, logarithmic `levels`-entry quantization table spanning
/// `0..=max_value`.
fn build_table(levels: u32, max_value: i64) -> Vec<i64> {
    let mut table = Vec::with_capacity(levels as usize);
    let scale = (max_value as f64).ln_1p();
    for i in 0..levels {
        let t = i as f64 / (levels - 1) as f64;
        let value = (t * scale).exp_m1();
        table.push(value.round() as i64);
    }
    table
}

pub struct QuantizeTable {
    levels: u32,
    uncompress: Vec<i64>,
}

impl QuantizeTable {
    pub fn char_table(max_value: i64) -> Self {
        Self { levels: CHAR_LEVELS, uncompress: build_table(CHAR_LEVELS, max_value) }
    }

    pub fn short_table(max_value: i64) -> Self {
        Self { levels: SHORT_LEVELS, uncompress: build_table(SHORT_LEVELS, max_value) }
    }

    pub fn uncompress(&self, code: u32) -> i64 {
        self.uncompress[(code.min(self.levels - 1)) as usize]
    }

    /// `CompressRegret`: maps an expanded-domain regret back onto the
    /// nearest quantization level, dithering uniformly between the two
    /// bracketing levels so repeated small increments don't get stuck
    /// rounding to the same code (spec.md §4.7's "uniform-random dither").
    pub fn compress(&self, value: i64, rng: &mut impl Rng) -> u32 {
        let idx = self.uncompress.partition_point(|&v| v < value);
        if idx == 0 {
            return 0;
        }
        if idx >= self.uncompress.len() {
            return self.levels - 1;
        }
        let lo = self.uncompress[idx - 1];
        let hi = self.uncompress[idx];
        let span = (hi - lo).max(1);
        let threshold = lo + rng.random_range(0..=span);
        if value >= threshold {
            idx as u32
        } else {
            (idx - 1) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn table_is_monotonic_and_covers_range() {
        let table = QuantizeTable::char_table(2_000_000_000);
        assert_eq!(table.uncompress(0), 0);
        for w in table.uncompress.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn compress_then_uncompress_stays_close_to_original() {
        let table = QuantizeTable::char_table(2_000_000_000);
        let mut rng = StdRng::seed_from_u64(7);
        for &value in &[0i64, 100, 10_000, 1_000_000, 1_999_999_999] {
            let code = table.compress(value, &mut rng);
            let back = table.uncompress(code);
            assert!((back - value).abs() <= value.max(1));
        }
    }
}
