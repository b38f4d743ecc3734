/// Comparison operators a selectivity estimate can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
}

/// A fixed-width histogram over an integer column, used to estimate the
/// fraction of rows a predicate selects.
///
/// Space and probe time are constant in the number of samples: only the
/// per-bucket counts are kept. The estimate deliberately omits the
/// fractional position of the probe value inside its bucket, which makes it
/// coarse but cheap.
#[derive(Debug, Clone)]
pub struct IntHistogram {
    counts: Vec<u64>,
    min: i32,
    max: i32,
    width: i64,
    total: u64,
}

impl IntHistogram {
    /// A histogram of `buckets` equal-width buckets spanning `[min, max]`.
    pub fn new(buckets: usize, min: i32, max: i32) -> Self {
        let width = ((max as i64 - min as i64) / buckets as i64).max(1);
        IntHistogram {
            counts: vec![0; buckets],
            min,
            max,
            width,
            total: 0,
        }
    }

    fn bucket_index(&self, v: i32) -> usize {
        let raw = (v as i64 - self.min as i64) / self.width;
        raw.clamp(0, self.counts.len() as i64 - 1) as usize
    }

    /// Records one sample. Values outside `[min, max]` are the caller's
    /// responsibility; they land in the nearest edge bucket.
    pub fn add_value(&mut self, v: i32) {
        let idx = self.bucket_index(v);
        self.counts[idx] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The estimated fraction of samples satisfying `column op v`,
    /// in `[0.0, 1.0]`.
    pub fn estimate_selectivity(&self, op: PredicateOp, v: i32) -> f64 {
        match op {
            PredicateOp::Equals => {
                if v < self.min || v > self.max || self.total == 0 {
                    0.0
                } else {
                    let height = self.counts[self.bucket_index(v)];
                    height as f64 / self.width as f64 / self.total as f64
                }
            }
            PredicateOp::LessThan => {
                if v < self.min {
                    0.0
                } else if v > self.max {
                    1.0
                } else if self.total == 0 {
                    0.0
                } else {
                    let below: u64 = self.counts[..self.bucket_index(v)].iter().sum();
                    below as f64 / self.total as f64
                }
            }
            PredicateOp::GreaterThan => {
                if v < self.min {
                    1.0
                } else if v > self.max {
                    0.0
                } else if self.total == 0 {
                    0.0
                } else {
                    let above: u64 = self.counts[self.bucket_index(v) + 1..].iter().sum();
                    above as f64 / self.total as f64
                }
            }
            PredicateOp::NotEquals => 1.0 - self.estimate_selectivity(PredicateOp::Equals, v),
            PredicateOp::LessThanOrEq => {
                self.estimate_selectivity(PredicateOp::LessThan, v)
                    + self.estimate_selectivity(PredicateOp::Equals, v)
            }
            PredicateOp::GreaterThanOrEq => {
                self.estimate_selectivity(PredicateOp::GreaterThan, v)
                    + self.estimate_selectivity(PredicateOp::Equals, v)
            }
        }
    }

    /// The average selectivity of this histogram. A placeholder the join
    /// optimizer may consult; a finer estimate has never been needed.
    pub fn avg_selectivity(&self) -> f64 {
        1.0
    }
}

impl std::fmt::Display for IntHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IntHistogram[{}, {}] width {} counts {:?}",
            self.min, self.max, self.width, self.counts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_1_to_100() -> IntHistogram {
        let mut h = IntHistogram::new(10, 1, 100);
        for v in 1..=100 {
            h.add_value(v);
        }
        h
    }

    #[test]
    fn uniform_data_yields_expected_estimates() {
        let h = uniform_1_to_100();
        assert!((h.estimate_selectivity(PredicateOp::LessThan, 51) - 0.5).abs() < 0.1);
        assert!((h.estimate_selectivity(PredicateOp::Equals, 50) - 0.01).abs() < 0.005);
        assert_eq!(h.estimate_selectivity(PredicateOp::GreaterThan, 100), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::LessThan, 0), 0.0);
    }

    #[test]
    fn out_of_range_probes_hit_the_boundaries() {
        let h = uniform_1_to_100();
        assert_eq!(h.estimate_selectivity(PredicateOp::Equals, -5), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::Equals, 200), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::GreaterThan, -5), 1.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::LessThan, 200), 1.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::NotEquals, 200), 1.0);
    }

    #[test]
    fn complements_sum_to_one_at_unit_width() {
        // Unit-width buckets make the equality term exact, so the three-way
        // split and the eq/neq pair must both add up to 1.
        let mut h = IntHistogram::new(100, 0, 99);
        for v in 0..100 {
            h.add_value(v);
            h.add_value(v);
        }
        for v in [0, 1, 42, 73, 99] {
            let eq = h.estimate_selectivity(PredicateOp::Equals, v);
            let neq = h.estimate_selectivity(PredicateOp::NotEquals, v);
            let lt = h.estimate_selectivity(PredicateOp::LessThan, v);
            let gt = h.estimate_selectivity(PredicateOp::GreaterThan, v);
            assert!((eq + neq - 1.0).abs() < 1e-9);
            assert!((lt + eq + gt - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ordered_comparisons_include_the_equality_term() {
        let h = uniform_1_to_100();
        let eq = h.estimate_selectivity(PredicateOp::Equals, 50);
        let lt = h.estimate_selectivity(PredicateOp::LessThan, 50);
        let gt = h.estimate_selectivity(PredicateOp::GreaterThan, 50);
        let lte = h.estimate_selectivity(PredicateOp::LessThanOrEq, 50);
        let gte = h.estimate_selectivity(PredicateOp::GreaterThanOrEq, 50);
        assert!((lte - (lt + eq)).abs() < 1e-9);
        assert!((gte - (gt + eq)).abs() < 1e-9);
    }

    #[test]
    fn values_outside_the_range_clamp_to_edge_buckets() {
        let mut h = IntHistogram::new(4, 0, 39);
        h.add_value(-100);
        h.add_value(500);
        assert_eq!(h.total(), 2);
        // Both landed somewhere; in-range mass is still consistent.
        let all: f64 = h.estimate_selectivity(PredicateOp::LessThan, 40);
        assert_eq!(all, 1.0);
    }

    #[test]
    fn degenerate_single_value_range_has_unit_width() {
        let mut h = IntHistogram::new(10, 7, 7);
        for _ in 0..5 {
            h.add_value(7);
        }
        assert!((h.estimate_selectivity(PredicateOp::Equals, 7) - 1.0).abs() < 1e-9);
        assert_eq!(h.estimate_selectivity(PredicateOp::LessThan, 7), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::GreaterThan, 7), 0.0);
    }

    #[test]
    fn empty_histogram_estimates_zero_in_range() {
        let h = IntHistogram::new(10, 0, 100);
        assert_eq!(h.estimate_selectivity(PredicateOp::Equals, 50), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::LessThan, 50), 0.0);
        assert_eq!(h.estimate_selectivity(PredicateOp::GreaterThan, 200), 0.0);
    }
}
