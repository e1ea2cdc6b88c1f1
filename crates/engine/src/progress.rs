use serde::{Deserialize, Serialize};

/// Live counters the estimator reads. Gathered by the engine, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressInputs {
    /// Non-removed items.
    pub active_total: usize,
    /// Items inside groups that are already in the ranked order.
    pub placed: usize,
    /// Comparison verdicts made so far.
    pub decisions: usize,
    /// Groups in the ranked order.
    pub groups: usize,
    /// Unranked items plus the active one, if any.
    pub remaining_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEstimate {
    pub percent: f64,
    pub placed: usize,
    pub total: usize,
    pub decisions: usize,
    /// Estimated comparisons still needed. Zero while `estimate_available`
    /// is false.
    pub remaining_estimate: u64,
    pub estimate_available: bool,
}

impl ProgressEstimate {
    /// Percent complete rounded to the nearest whole number, as shown in a
    /// progress bar.
    pub fn rounded_percent(&self) -> u32 {
        self.percent.round() as u32
    }
}

/// Heuristic remaining-work estimate. Below the thresholds the numbers are
/// noise, so no estimate is offered. Above them, the observed decisions per
/// placed item are compared against the ideal `log2(groups + 1)` and the ratio
/// scales the per-item cost.
pub fn estimate(inputs: ProgressInputs, min_decisions: usize, min_groups: usize) -> ProgressEstimate {
    let percent = if inputs.active_total == 0 {
        0.0
    } else {
        inputs.placed as f64 / inputs.active_total as f64 * 100.0
    };

    let estimate_available = inputs.decisions >= min_decisions && inputs.groups >= min_groups;
    let remaining_estimate = if estimate_available {
        let ideal = ((inputs.groups + 1) as f64).log2();
        let avg_per_placement = inputs.decisions as f64 / inputs.placed.max(1) as f64;
        let efficiency = ideal / avg_per_placement.max(1.0);
        let per_item = (ideal * efficiency).ceil().max(1.0) as u64;
        inputs.remaining_items as u64 * per_item
    } else {
        0
    };

    ProgressEstimate {
        percent,
        placed: inputs.placed,
        total: inputs.active_total,
        decisions: inputs.decisions,
        remaining_estimate,
        estimate_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(active_total: usize, placed: usize, decisions: usize, groups: usize, remaining: usize) -> ProgressInputs {
        ProgressInputs {
            active_total,
            placed,
            decisions,
            groups,
            remaining_items: remaining,
        }
    }

    #[test]
    fn empty_pool_is_zero_percent() {
        let est = estimate(inputs(0, 0, 0, 0, 0), 3, 3);
        assert_eq!(est.percent, 0.0);
        assert!(!est.estimate_available);
    }

    #[test]
    fn suppressed_below_thresholds() {
        // Enough groups but too few decisions
        let est = estimate(inputs(10, 3, 2, 3, 7), 3, 3);
        assert!(!est.estimate_available);
        assert_eq!(est.remaining_estimate, 0);
        assert_eq!(est.rounded_percent(), 30);

        // Enough decisions but too few groups
        let est = estimate(inputs(10, 5, 9, 2, 5), 3, 3);
        assert!(!est.estimate_available);
    }

    #[test]
    fn fast_sorting_inflates_per_item_cost() {
        // log2(4) = 2, avg = 0.75 -> clamped to 1, efficiency = 2, cost = ceil(4) = 4
        let est = estimate(inputs(10, 4, 3, 3, 6), 3, 3);
        assert!(est.estimate_available);
        assert_eq!(est.remaining_estimate, 24);
    }

    #[test]
    fn slow_sorting_uses_observed_ratio() {
        // log2(8) = 3, avg = 2.5, efficiency = 1.2, cost = ceil(3.6) = 4
        let est = estimate(inputs(12, 8, 20, 7, 4), 3, 3);
        assert_eq!(est.remaining_estimate, 16);
        assert_eq!(est.rounded_percent(), 67);
    }

    #[test]
    fn per_item_cost_never_below_one() {
        // log2(4) = 2, avg = 10, efficiency = 0.2, 2 * 0.2 = 0.4 -> 1
        let est = estimate(inputs(5, 3, 30, 3, 2), 3, 3);
        assert_eq!(est.remaining_estimate, 2);
    }
}
