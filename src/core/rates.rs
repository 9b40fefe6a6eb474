use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SatisfactionTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Share of a wave that returns for service each warranty year, and share that
/// buys again once the ownership period ends.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CsiRates {
    pub service_return: f64,
    pub repeat_purchase: f64,
}

impl SatisfactionTier {
    // Ordered comparison, ties go to the higher tier. Out-of-range scores are
    // not an error: they fall into the top or bottom band.
    pub fn from_score(score: i32) -> Self {
        if score >= 901 {
            SatisfactionTier::Excellent
        } else if score >= 801 {
            SatisfactionTier::Good
        } else if score >= 701 {
            SatisfactionTier::Fair
        } else {
            SatisfactionTier::Poor
        }
    }

    pub fn rates(self) -> CsiRates {
        let (service_return, repeat_purchase) = match self {
            SatisfactionTier::Excellent => (0.74, 0.35),
            SatisfactionTier::Good => (0.51, 0.24),
            SatisfactionTier::Fair => (0.32, 0.19),
            SatisfactionTier::Poor => (0.14, 0.16),
        };
        CsiRates {
            service_return,
            repeat_purchase,
        }
    }
}

pub fn csi_rates(score: i32) -> CsiRates {
    SatisfactionTier::from_score(score).rates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn pair(score: i32) -> (f64, f64) {
        let rates = csi_rates(score);
        (rates.service_return, rates.repeat_purchase)
    }

    #[test]
    fn tier_boundaries_go_to_the_higher_tier() {
        assert_eq!(pair(901), (0.74, 0.35));
        assert_eq!(pair(900), (0.51, 0.24));
        assert_eq!(pair(801), (0.51, 0.24));
        assert_eq!(pair(800), (0.32, 0.19));
        assert_eq!(pair(701), (0.32, 0.19));
        assert_eq!(pair(700), (0.14, 0.16));
    }

    #[test]
    fn out_of_range_scores_resolve_silently() {
        assert_eq!(SatisfactionTier::from_score(-50), SatisfactionTier::Poor);
        assert_eq!(SatisfactionTier::from_score(i32::MIN), SatisfactionTier::Poor);
        assert_eq!(SatisfactionTier::from_score(1_500), SatisfactionTier::Excellent);
        assert_eq!(pair(i32::MAX), (0.74, 0.35));
    }

    #[test]
    fn default_form_score_is_good_tier() {
        assert_eq!(SatisfactionTier::from_score(870), SatisfactionTier::Good);
        assert_eq!(pair(870), (0.51, 0.24));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_scores_at_or_above_901_are_excellent(score in 901i32..i32::MAX) {
            prop_assert_eq!(pair(score), (0.74, 0.35));
        }

        #[test]
        fn prop_rates_are_probabilities_and_monotone(score in any::<i32>()) {
            let rates = csi_rates(score);
            prop_assert!((0.0..=1.0).contains(&rates.service_return));
            prop_assert!((0.0..=1.0).contains(&rates.repeat_purchase));

            let higher = csi_rates(score.saturating_add(100));
            prop_assert!(higher.service_return >= rates.service_return);
            prop_assert!(higher.repeat_purchase >= rates.repeat_purchase);
        }
    }
}
