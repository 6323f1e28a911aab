//! Maturity-level state machine.
//!
//! A ratchet over the combined score: evaluated on every recomputation,
//! it jumps directly to the highest level whose activation threshold the
//! score has reached, and never transitions downward.

use crate::domain::models::MaturityLevel;

/// Threshold-driven level machine.
#[derive(Debug, Clone)]
pub struct LevelMachine {
    thresholds: Vec<f64>,
}

impl LevelMachine {
    /// Build a machine from activation thresholds, index-aligned with
    /// [`MaturityLevel::ALL`]. Thresholds must be strictly ascending and
    /// there must be one per level.
    pub fn new(thresholds: Vec<f64>) -> Result<Self, String> {
        if thresholds.len() != MaturityLevel::ALL.len() {
            return Err(format!(
                "Expected {} thresholds, got {}",
                MaturityLevel::ALL.len(),
                thresholds.len()
            ));
        }
        for pair in thresholds.windows(2) {
            if pair[0] >= pair[1] {
                return Err(format!(
                    "Thresholds must be strictly ascending; {} >= {}",
                    pair[0], pair[1]
                ));
            }
        }
        Ok(Self { thresholds })
    }

    /// The highest level whose threshold is at or below the score.
    pub fn level_for(&self, score: f64) -> MaturityLevel {
        let mut level = MaturityLevel::Dormant;
        for (index, threshold) in self.thresholds.iter().enumerate() {
            if score >= *threshold {
                level = MaturityLevel::from_index(index);
            }
        }
        level
    }

    /// Ratchet evaluation: returns the new level only when it is strictly
    /// above the current one. A falling score never produces a transition.
    pub fn evaluate(&self, current: MaturityLevel, score: f64) -> Option<MaturityLevel> {
        let target = self.level_for(score);
        (target > current).then_some(target)
    }

    /// The configured thresholds.
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }
}

impl Default for LevelMachine {
    fn default() -> Self {
        Self {
            thresholds: MaturityLevel::DEFAULT_THRESHOLDS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_thresholds() {
        let machine = LevelMachine::default();
        assert_eq!(machine.level_for(0.0), MaturityLevel::Dormant);
        assert_eq!(machine.level_for(29.9), MaturityLevel::Dormant);
        assert_eq!(machine.level_for(30.0), MaturityLevel::Forming);
        assert_eq!(machine.level_for(60.0), MaturityLevel::Established);
        assert_eq!(machine.level_for(100.0), MaturityLevel::Autonomous);
    }

    #[test]
    fn test_ratchet_never_goes_down() {
        let machine = LevelMachine::default();
        assert_eq!(
            machine.evaluate(MaturityLevel::Dormant, 60.0),
            Some(MaturityLevel::Established)
        );
        // Score falls: no downward transition.
        assert_eq!(machine.evaluate(MaturityLevel::Established, 10.0), None);
        // Same level: no event.
        assert_eq!(machine.evaluate(MaturityLevel::Established, 60.0), None);
    }

    #[test]
    fn test_skips_intermediate_levels() {
        let machine = LevelMachine::default();
        assert_eq!(
            machine.evaluate(MaturityLevel::Dormant, 95.0),
            Some(MaturityLevel::Autonomous)
        );
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(LevelMachine::new(vec![0.0, 10.0]).is_err());
        assert!(LevelMachine::new(vec![0.0, 30.0, 30.0, 75.0, 90.0]).is_err());
        assert!(LevelMachine::new(vec![0.0, 30.0, 55.0, 75.0, 90.0]).is_ok());
    }
}
