//! Threshold Policy
//!
//! Pure classification of a price observation against the four configured
//! levels. The immediate threshold bypasses the countdown entirely; the
//! countdown threshold only arms a timer. Stateless - the evaluators own
//! all record access.

use thiserror::Error;

/// Outcome of classifying a price on the buy side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyAction {
    /// Price crossed the immediate threshold: open a position now
    ImmediateBuy,
    /// Price entered the countdown band: arm a buy countdown
    StartCountdown,
    /// No action
    Hold,
}

/// Outcome of classifying a price on the sell side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellAction {
    /// Price crossed the immediate threshold: close the position now
    ImmediateSell,
    /// Price entered the countdown band: arm a sell countdown
    StartCountdown,
    /// No action
    Hold,
}

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("buy_immediate ({buy_immediate}) must be greater than buy_countdown ({buy_countdown})")]
    BuyOrdering {
        buy_immediate: f64,
        buy_countdown: f64,
    },
    #[error("sell_immediate ({sell_immediate}) must be less than sell_countdown ({sell_countdown})")]
    SellOrdering {
        sell_immediate: f64,
        sell_countdown: f64,
    },
}

/// The four price levels the evaluators compare against.
///
/// Ordering invariants: `buy_immediate > buy_countdown` and
/// `sell_immediate < sell_countdown`. A violating configuration is a
/// startup error, never a runtime one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub buy_immediate: f64,
    pub buy_countdown: f64,
    pub sell_immediate: f64,
    pub sell_countdown: f64,
}

impl ThresholdPolicy {
    /// Create a policy, enforcing the ordering invariants.
    pub fn new(
        buy_immediate: f64,
        buy_countdown: f64,
        sell_immediate: f64,
        sell_countdown: f64,
    ) -> Result<Self, ThresholdError> {
        let policy = Self {
            buy_immediate,
            buy_countdown,
            sell_immediate,
            sell_countdown,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the ordering invariants.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.buy_immediate <= self.buy_countdown {
            return Err(ThresholdError::BuyOrdering {
                buy_immediate: self.buy_immediate,
                buy_countdown: self.buy_countdown,
            });
        }
        if self.sell_immediate >= self.sell_countdown {
            return Err(ThresholdError::SellOrdering {
                sell_immediate: self.sell_immediate,
                sell_countdown: self.sell_countdown,
            });
        }
        Ok(())
    }

    /// Classify a price on the buy side.
    pub fn classify_buy(&self, price: f64) -> BuyAction {
        if price > self.buy_immediate {
            BuyAction::ImmediateBuy
        } else if price > self.buy_countdown {
            BuyAction::StartCountdown
        } else {
            BuyAction::Hold
        }
    }

    /// Classify a price on the sell side.
    pub fn classify_sell(&self, price: f64) -> SellAction {
        if price < self.sell_immediate {
            SellAction::ImmediateSell
        } else if price < self.sell_countdown {
            SellAction::StartCountdown
        } else {
            SellAction::Hold
        }
    }
}

// Config is validated at load time, so this conversion is infallible.
impl From<&crate::config::Config> for ThresholdPolicy {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            buy_immediate: config.thresholds.buy_immediate,
            buy_countdown: config.thresholds.buy_countdown,
            sell_immediate: config.thresholds.sell_immediate,
            sell_countdown: config.thresholds.sell_countdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::new(155.0, 150.0, 160.0, 165.0).unwrap()
    }

    #[test]
    fn test_buy_classification() {
        let p = policy();
        assert_eq!(p.classify_buy(156.0), BuyAction::ImmediateBuy);
        assert_eq!(p.classify_buy(152.0), BuyAction::StartCountdown);
        assert_eq!(p.classify_buy(150.0), BuyAction::Hold);
        assert_eq!(p.classify_buy(100.0), BuyAction::Hold);
    }

    #[test]
    fn test_buy_boundaries_are_strict() {
        let p = policy();
        // Exactly at a threshold is not "above" it
        assert_eq!(p.classify_buy(155.0), BuyAction::StartCountdown);
        assert_eq!(p.classify_buy(150.0), BuyAction::Hold);
    }

    #[test]
    fn test_sell_classification() {
        let p = policy();
        assert_eq!(p.classify_sell(159.0), SellAction::ImmediateSell);
        assert_eq!(p.classify_sell(162.0), SellAction::StartCountdown);
        assert_eq!(p.classify_sell(165.0), SellAction::Hold);
        assert_eq!(p.classify_sell(200.0), SellAction::Hold);
    }

    #[test]
    fn test_sell_boundaries_are_strict() {
        let p = policy();
        assert_eq!(p.classify_sell(160.0), SellAction::StartCountdown);
        assert_eq!(p.classify_sell(165.0), SellAction::Hold);
    }

    #[test]
    fn test_buy_ordering_enforced() {
        let err = ThresholdPolicy::new(150.0, 155.0, 160.0, 165.0).unwrap_err();
        assert!(matches!(err, ThresholdError::BuyOrdering { .. }));

        // Equal thresholds are invalid too
        let err = ThresholdPolicy::new(150.0, 150.0, 160.0, 165.0).unwrap_err();
        assert!(matches!(err, ThresholdError::BuyOrdering { .. }));
    }

    #[test]
    fn test_sell_ordering_enforced() {
        let err = ThresholdPolicy::new(155.0, 150.0, 165.0, 160.0).unwrap_err();
        assert!(matches!(err, ThresholdError::SellOrdering { .. }));
    }
}
