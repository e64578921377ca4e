//! Weighted random selection over a fixed candidate set.
//!
//! Candidates are sorted by weight and a running cumulative sum is built once;
//! each [`WeightedChooser::pick`] draws `r` uniformly from `[1, total]` and
//! binary-searches for the first cumulative entry `>= r`, so every candidate
//! is chosen with probability `weight / total`.
//!
//! Randomness is injected by the caller, which lets tests drive the chooser
//! with a fixed-seed generator.
//!
//! ```rust
//! use edgefetch::chooser::WeightedChooser;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let chooser = WeightedChooser::new(vec![("a", 1), ("b", 0), ("c", -5)]).unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! assert_eq!(*chooser.pick(&mut rng), "a");
//! ```

use crate::error::{FetchError, Result};
use rand::Rng;

/// Cumulative-distribution structure for repeated weighted picks.
#[derive(Debug, Clone)]
pub struct WeightedChooser<T> {
    items: Vec<T>,
    totals: Vec<i64>,
    max: i64,
}

impl<T> WeightedChooser<T> {
    /// Build a chooser from `(candidate, weight)` pairs.
    ///
    /// Negative weights are excluded entirely. Fails with
    /// [`FetchError::WeightOverflow`] if the total does not fit an `i64`, and
    /// with [`FetchError::NoValidChoices`] if the valid weights sum to zero.
    pub fn new<I>(choices: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, i64)>,
    {
        let mut choices: Vec<(T, i64)> = choices
            .into_iter()
            .filter(|(_, weight)| *weight >= 0)
            .collect();
        choices.sort_by_key(|(_, weight)| *weight);

        let mut items = Vec::with_capacity(choices.len());
        let mut totals = Vec::with_capacity(choices.len());
        let mut running_total: i64 = 0;

        for (item, weight) in choices {
            running_total = running_total
                .checked_add(weight)
                .ok_or(FetchError::WeightOverflow)?;
            items.push(item);
            totals.push(running_total);
        }

        if running_total < 1 {
            return Err(FetchError::NoValidChoices);
        }

        Ok(Self {
            items,
            totals,
            max: running_total,
        })
    }

    /// Pick one candidate, weighted by its share of the total.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let r = rng.gen_range(1..=self.max);
        let index = self.totals.partition_point(|&total| total < r);
        &self.items[index]
    }

    /// Number of selectable candidates (zero-weight entries included).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all valid weights.
    pub fn total(&self) -> i64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_weighted_distribution() {
        let chooser =
            WeightedChooser::new(vec![("first", 1), ("two", 2), ("three", 3), ("four", 4)]).unwrap();
        assert_eq!(chooser.total(), 10);

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let draws = 10_000;
        for _ in 0..draws {
            *counts.entry(*chooser.pick(&mut rng)).or_default() += 1;
        }

        for (name, weight) in [("first", 1.0), ("two", 2.0), ("three", 3.0), ("four", 4.0)] {
            let expected = draws as f64 * weight / 10.0;
            let observed = counts[name] as f64;
            assert!(
                (observed - expected).abs() <= expected * 0.15,
                "{}: observed {} expected {}",
                name,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_empty_set_has_no_valid_choices() {
        let err = WeightedChooser::<&str>::new(Vec::new()).unwrap_err();
        assert_eq!(err, FetchError::NoValidChoices);
    }

    #[test]
    fn test_zero_total_has_no_valid_choices() {
        let err = WeightedChooser::new(vec![("a", 0), ("b", 0), ("c", -3)]).unwrap_err();
        assert_eq!(err, FetchError::NoValidChoices);
    }

    #[test]
    fn test_overflow() {
        let err = WeightedChooser::new(vec![("a", i64::MAX), ("b", 1)]).unwrap_err();
        assert_eq!(err, FetchError::WeightOverflow);
    }

    #[test]
    fn test_negative_weights_never_picked() {
        let chooser = WeightedChooser::new(vec![("neg", -1), ("zero", 0), ("pos", 5)]).unwrap();
        assert_eq!(chooser.len(), 2);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert_eq!(*chooser.pick(&mut rng), "pos");
        }
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let chooser = WeightedChooser::new((0..20).map(|i| (i, i as i64 + 1))).unwrap();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        let picks_a: Vec<_> = (0..50).map(|_| *chooser.pick(&mut a)).collect();
        let picks_b: Vec<_> = (0..50).map(|_| *chooser.pick(&mut b)).collect();
        assert_eq!(picks_a, picks_b);
    }
}
