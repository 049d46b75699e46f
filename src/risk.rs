use serde::Serialize;

pub const DEFAULT_LOW_RISK: f64 = 0.7;
pub const DEFAULT_MEDIUM_RISK: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskTier {
    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn from_value(v: i64) -> Option<Self> {
        match v {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low risk",
            Self::Medium => "Medium risk",
            Self::High => "High risk",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Low => "risk-low",
            Self::Medium => "risk-medium",
            Self::High => "risk-high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_RISK,
            medium: DEFAULT_MEDIUM_RISK,
        }
    }
}

impl RiskThresholds {
    pub fn new(low: f64, medium: f64) -> Result<Self, String> {
        let t = Self { low, medium };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.low) {
            return Err("lowRisk must be in 0..=1".into());
        }
        if !(0.0..=1.0).contains(&self.medium) {
            return Err("mediumRisk must be in 0..=1".into());
        }
        if self.medium > self.low {
            return Err("mediumRisk must be <= lowRisk".into());
        }
        Ok(())
    }
}

pub fn classify(pass_prob: f64, thresholds: &RiskThresholds) -> RiskTier {
    if pass_prob >= thresholds.low {
        RiskTier::Low
    } else if pass_prob >= thresholds.medium {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

/// Bounds a backend-reported probability into [0, 1]. NaN is not a probability.
pub fn clamp_probability(p: f64) -> Option<f64> {
    if p.is_nan() {
        return None;
    }
    Some(p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_thresholds_put_055_in_medium() {
        let t = RiskThresholds::default();
        assert_eq!(classify(0.55, &t), RiskTier::Medium);
        assert_eq!(classify(0.7, &t), RiskTier::Low);
        assert_eq!(classify(0.4, &t), RiskTier::Medium);
        assert_eq!(classify(0.39, &t), RiskTier::High);
        assert_eq!(classify(0.0, &t), RiskTier::High);
        assert_eq!(classify(1.0, &t), RiskTier::Low);
    }

    #[test]
    fn labels_and_values() {
        assert_eq!(RiskTier::High.label(), "High risk");
        assert_eq!(RiskTier::Medium.value(), 2);
        assert_eq!(RiskTier::from_value(1), Some(RiskTier::Low));
        assert_eq!(RiskTier::from_value(4), None);
    }

    #[test]
    fn thresholds_reject_inverted_or_out_of_range() {
        assert!(RiskThresholds::new(0.3, 0.5).is_err());
        assert!(RiskThresholds::new(1.2, 0.5).is_err());
        assert!(RiskThresholds::new(0.5, -0.1).is_err());
        assert!(RiskThresholds::new(0.5, 0.5).is_ok());
    }

    #[test]
    fn clamp_rejects_nan() {
        assert_eq!(clamp_probability(f64::NAN), None);
        assert_eq!(clamp_probability(1.4), Some(1.0));
        assert_eq!(clamp_probability(-0.2), Some(0.0));
    }

    proptest! {
        #[test]
        fn tier_is_monotonic_in_pass_probability(
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
            low in 0.0f64..=1.0,
            frac in 0.0f64..=1.0,
        ) {
            let t = RiskThresholds { low, medium: low * frac };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            // Higher pass probability never yields a riskier tier.
            prop_assert!(classify(hi, &t) <= classify(lo, &t));
        }
    }
}
