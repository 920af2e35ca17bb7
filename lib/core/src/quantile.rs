//! Streaming targeted quantiles (Cormode, Korn, Muthukrishnan, Srivastava)
//! and the score bucketing built on top of them.

use serde::{Deserialize, Serialize};

/// A quantile to track with its allowed rank error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub quantile: f64,
    pub error: f64,
}

impl Target {
    #[inline]
    pub const fn new(quantile: f64, error: f64) -> Self {
        Self { quantile, error }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    width: u64,
    delta: u64,
}

const BUFFER_CAPACITY: usize = 500;

/// Biased-quantile summary. Not thread safe; callers serialize access.
#[derive(Debug, Clone)]
pub struct Estimator {
    targets: Vec<Target>,
    samples: Vec<Sample>,
    buffer: Vec<f64>,
    count: u64,
}

impl Estimator {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            samples: Vec::new(),
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            count: 0,
        }
    }

    pub fn insert(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.buffer.push(value);
        if self.buffer.len() >= BUFFER_CAPACITY {
            self.flush();
        }
    }

    /// Number of values inserted so far
    #[inline]
    pub fn count(&self) -> u64 {
        self.count + self.buffer.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Approximate value at quantile `q`, `None` before any insert
    pub fn query(&mut self, q: f64) -> Option<f64> {
        self.flush();
        let first = self.samples.first()?;

        let n = self.count as f64;
        let mut t = (q * n).ceil();
        t += (self.allowable_error(t) / 2.0).ceil();

        let mut prev = *first;
        let mut rank = 0.0;
        for cur in &self.samples[1..] {
            rank += prev.width as f64;
            if rank + cur.width as f64 + cur.delta as f64 > t {
                return Some(prev.value);
            }
            prev = *cur;
        }
        Some(prev.value)
    }

    /// Invariant f(r, n): the smallest error any target allows at rank `r`
    fn allowable_error(&self, rank: f64) -> f64 {
        let n = self.count as f64;
        let mut min = n + 1.0;
        for t in &self.targets {
            let e = if rank <= t.quantile * n {
                2.0 * t.error * (n - rank) / (1.0 - t.quantile)
            } else {
                2.0 * t.error * rank / t.quantile
            };
            if e < min {
                min = e;
            }
        }
        min
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.sort_by(f64::total_cmp);

        let mut idx = 0;
        let mut rank = 0.0;
        for value in buffer.drain(..) {
            while idx < self.samples.len() && self.samples[idx].value <= value {
                rank += self.samples[idx].width as f64;
                idx += 1;
            }
            let delta = if idx == 0 || idx == self.samples.len() {
                0
            } else {
                (self.allowable_error(rank).floor() - 1.0).max(0.0) as u64
            };
            self.samples.insert(idx, Sample { value, width: 1, delta });
            self.count += 1;
            rank += 1.0;
            idx += 1;
        }

        self.buffer = buffer;
        self.compress();
    }

    fn compress(&mut self) {
        if self.samples.len() < 2 {
            return;
        }
        let samples = std::mem::take(&mut self.samples);
        let mut out = Vec::with_capacity(samples.len());
        let mut iter = samples.into_iter();
        let Some(mut prev) = iter.next() else {
            return;
        };
        let mut rank = 0.0;

        for mut cur in iter {
            let merged = (prev.width + cur.width + cur.delta) as f64;
            if merged <= self.allowable_error(rank).floor() {
                cur.width += prev.width;
            } else {
                rank += prev.width as f64;
                out.push(prev);
            }
            prev = cur;
        }
        out.push(prev);
        self.samples = out;
    }
}

/// Sampling knobs of [`BucketEstimator`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Probability of sampling a score once the buffer is full
    pub sample_rate: f32,
    /// Number of leading scores that are always sampled
    pub buffer_size: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.05,
            buffer_size: 4096,
        }
    }
}

/// Quantile cut points, best first. Bucket `i` holds the scores that reach
/// `BUCKET_QUANTILES[i]`; anything below the last one lands in bucket 4.
pub const BUCKET_QUANTILES: [f64; 4] = [0.99, 0.95, 0.90, 0.50];
pub const NUM_BUCKETS: u8 = 5;

/// Maps document scores to one of [`NUM_BUCKETS`] buckets, 0 being the best
#[derive(Debug, Clone)]
pub struct BucketEstimator {
    estimator: Estimator,
    config: BucketConfig,
    seen: usize,
}

impl BucketEstimator {
    pub fn new(config: BucketConfig) -> Self {
        let estimator = Estimator::new(vec![
            Target::new(0.50, 0.05),
            Target::new(0.90, 0.01),
            Target::new(0.95, 0.01),
            Target::new(0.99, 0.01),
        ]);
        Self {
            estimator,
            config,
            seen: 0,
        }
    }

    /// Feed one score
    pub fn sample(&mut self, score: f64) {
        self.seen += 1;
        if self.seen <= self.config.buffer_size || rand::random::<f32>() < self.config.sample_rate {
            self.estimator.insert(score);
        }
    }

    pub fn bucket(&mut self, score: f64) -> u8 {
        if self.estimator.is_empty() {
            return 0;
        }
        for (i, q) in BUCKET_QUANTILES.iter().enumerate() {
            match self.estimator.query(*q) {
                Some(cut) if score >= cut => return i as u8,
                _ => {}
            }
        }
        NUM_BUCKETS - 1
    }
}

impl Default for BucketEstimator {
    fn default() -> Self {
        Self::new(BucketConfig::default())
    }
}
