use serde::Serialize;

use crate::config::CostSection;

/// Monthly storage savings from capping groups that previously kept data
/// forever.
///
/// `savings = groups * daily_volume * price * (baseline_days - target_days)`,
/// where `baseline_days` is the window an unlimited group is assumed to hold
/// today. Every input is clamped at zero, so the estimate is never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    daily_volume: f64,
    price_per_unit: f64,
    baseline_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub affected_groups: u64,
    pub target_days: u32,
    pub daily_volume: f64,
    pub price_per_unit: f64,
    pub baseline_days: u32,
    pub monthly_savings: f64,
}

impl CostEstimate {
    /// Two-decimal currency form, e.g. `$243.00`.
    pub fn formatted(&self) -> String {
        format!("${:.2}", self.monthly_savings)
    }
}

impl CostModel {
    pub fn new(daily_volume: f64, price_per_unit: f64, baseline_days: u32) -> Self {
        Self {
            daily_volume: non_negative(daily_volume),
            price_per_unit: non_negative(price_per_unit),
            baseline_days,
        }
    }

    pub fn from_config(config: &CostSection) -> Self {
        Self::new(
            config.daily_volume_gb,
            config.price_per_gb_month,
            config.baseline_days,
        )
    }

    pub fn estimate(&self, affected_count: i64, target_days: i64) -> CostEstimate {
        let affected_groups = affected_count.max(0) as u64;
        let target_days = target_days.clamp(0, u32::MAX as i64) as u32;
        let saved_days = self.baseline_days.saturating_sub(target_days);
        let monthly_savings = affected_groups as f64
            * self.daily_volume
            * self.price_per_unit
            * f64::from(saved_days);
        CostEstimate {
            affected_groups,
            target_days,
            daily_volume: self.daily_volume,
            price_per_unit: self.price_per_unit,
            baseline_days: self.baseline_days,
            monthly_savings: non_negative(monthly_savings),
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&CostSection::default())
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn three_groups_capped_at_three_days() {
        let estimate = CostModel::default().estimate(3, 3);
        assert!((estimate.monthly_savings - 243.0).abs() < 1e-9);
        assert_eq!(estimate.formatted(), "$243.00");
        assert_eq!(estimate.affected_groups, 3);
    }

    #[test]
    fn zero_groups_save_nothing() {
        let estimate = CostModel::default().estimate(0, 3);
        assert_eq!(estimate.monthly_savings, 0.0);
        assert_eq!(estimate.formatted(), "$0.00");
    }

    #[test]
    fn negative_inputs_clamp_to_zero() {
        let model = CostModel::default();
        assert_eq!(model.estimate(-5, 3).monthly_savings, 0.0);
        assert_eq!(model.estimate(-5, 3).affected_groups, 0);
        let wide = model.estimate(1, -10);
        assert_eq!(wide.target_days, 0);
        assert!((wide.monthly_savings - 90.0).abs() < 1e-9);
        let broken = CostModel::new(-1.0, f64::NAN, 30).estimate(4, 3);
        assert_eq!(broken.monthly_savings, 0.0);
    }

    #[test]
    fn target_beyond_baseline_saves_nothing() {
        assert_eq!(CostModel::default().estimate(10, 365).monthly_savings, 0.0);
    }

    proptest! {
        #[test]
        fn proptest_estimate_is_non_negative(count in 0i64..10_000, days in 0i64..4000) {
            prop_assert!(CostModel::default().estimate(count, days).monthly_savings >= 0.0);
        }

        #[test]
        fn proptest_more_enforcement_never_saves_less(
            total in 0i64..1_000,
            left_a in 0i64..1_000,
            left_b in 0i64..1_000,
            days in 1i64..60,
        ) {
            let (fewer_left, more_left) = if left_a <= left_b {
                (left_a, left_b)
            } else {
                (left_b, left_a)
            };
            let model = CostModel::default();
            let with_more_enforced = model.estimate((total - fewer_left).max(0), days);
            let with_less_enforced = model.estimate((total - more_left).max(0), days);
            prop_assert!(with_more_enforced.monthly_savings >= with_less_enforced.monthly_savings);
        }
    }
}
