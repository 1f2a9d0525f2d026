//! Combinable statistical accumulators.
//!
//! Each accumulator is a partial state that can absorb single values and be
//! merged with another partial state, so per-shard results combine into the
//! same answer a single pass would give.

use crate::models::DescriptiveStats;

/// Running count, mean, sum of squared deviations, min and max of one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentAccumulator {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for MomentAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl MomentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Non-finite values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Combine with another partial state.
    pub fn merge(&mut self, other: &MomentAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;

        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sample variance (N-1 denominator); undefined below two values.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count as f64 - 1.0)).max(0.0))
    }

    pub fn finish(&self) -> DescriptiveStats {
        if self.count == 0 {
            return DescriptiveStats::default();
        }

        // Rounding in the running mean must not push it outside the observed range.
        let mean = self.mean.clamp(self.min, self.max);

        DescriptiveStats {
            count: self.count,
            mean: Some(mean),
            std: self.variance().map(f64::sqrt),
            min: Some(self.min),
            max: Some(self.max),
        }
    }
}

/// Running co-moments of two fields for Pearson correlation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoMomentAccumulator {
    count: usize,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
}

impl CoMomentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one paired observation. Pairs with a non-finite side are ignored.
    pub fn push(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }

        self.count += 1;
        let n = self.count as f64;
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / n;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
    }

    pub fn merge(&mut self, other: &CoMomentAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let dx = other.mean_x - self.mean_x;
        let dy = other.mean_y - self.mean_y;

        self.mean_x += dx * n_b / n;
        self.mean_y += dy * n_b / n;
        self.m2_x += other.m2_x + dx * dx * n_a * n_b / n;
        self.m2_y += other.m2_y + dy * dy * n_a * n_b / n;
        self.c_xy += other.c_xy + dx * dy * n_a * n_b / n;
        self.count += other.count;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Pearson coefficient, NaN when fewer than two pairs or either side is constant.
    pub fn pearson(&self) -> f64 {
        if self.count < 2 || self.m2_x <= 0.0 || self.m2_y <= 0.0 {
            return f64::NAN;
        }
        (self.c_xy / (self.m2_x * self.m2_y).sqrt()).clamp(-1.0, 1.0)
    }
}

/// Frequency table that remembers first-seen order for tie breaking.
#[derive(Debug, Clone)]
pub struct ModeCounter<T> {
    entries: Vec<(T, usize)>,
}

impl<T> Default for ModeCounter<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: PartialEq + Clone> ModeCounter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) {
        match self.entries.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((value, 1)),
        }
    }

    /// Most frequent value; ties go to the value seen first.
    pub fn mode(&self) -> Option<T> {
        let mut best: Option<&(T, usize)> = None;
        for entry in &self.entries {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(v, _)| v.clone())
    }

    /// Values with their counts, in first-seen order.
    pub fn counts(&self) -> &[(T, usize)] {
        &self.entries
    }
}
