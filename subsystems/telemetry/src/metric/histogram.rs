//! Logarithmic histogram.

/// Number of power-of-two buckets
pub const HISTOGRAM_BUCKETS: usize = 32;

static_assertions::const_assert_eq!(HISTOGRAM_BUCKETS, 32);

/// Histogram over unsigned samples with `floor(log2(v))` buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram {
    /// Sum of all samples (saturating)
    pub sum: u64,
    /// Number of samples
    pub count: u64,
    /// Smallest sample (`u64::MAX` when empty)
    pub min: u64,
    /// Largest sample
    pub max: u64,
    /// Per-bucket counts
    pub buckets: [u64; HISTOGRAM_BUCKETS],
}

impl Histogram {
    /// Empty histogram
    pub const fn new() -> Self {
        Self {
            sum: 0,
            count: 0,
            min: u64::MAX,
            max: 0,
            buckets: [0; HISTOGRAM_BUCKETS],
        }
    }

    /// Bucket for `value`: highest set bit, clamped to the last bucket
    #[inline]
    pub const fn bucket_index(value: u64) -> usize {
        if value == 0 {
            return 0;
        }
        let bit = (63 - value.leading_zeros()) as usize;
        if bit >= HISTOGRAM_BUCKETS {
            HISTOGRAM_BUCKETS - 1
        } else {
            bit
        }
    }

    /// Record a sample
    #[inline]
    pub fn record(&mut self, value: u64) {
        self.buckets[Self::bucket_index(value)] += 1;
        self.sum = self.sum.saturating_add(value);
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// Integer mean, 0 when empty
    pub const fn mean(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum / self.count
        }
    }

    /// Approximate value below which `p` percent of samples fall
    ///
    /// Returns the upper bound of the bucket holding the percentile.
    pub fn percentile(&self, p: u32) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = (self.count * p.min(100) as u64).div_ceil(100).max(1);
        let mut seen = 0;
        for (i, &n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= target {
                if i == HISTOGRAM_BUCKETS - 1 {
                    return self.max;
                }
                return ((1u64 << (i + 1)) - 1).min(self.max);
            }
        }
        self.max
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
