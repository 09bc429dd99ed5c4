// Quality gates: calibrated and strict pass/fail verdicts over the features.
//
// Each sub-gate compares one measurement against a threshold, independently
// for the calibrated and the strict tier; `overall` is the conjunction of
// the four sub-gates. The policy invariant is that every strict threshold is
// at least its calibrated counterpart, so `strict.overall` implies
// `calibrated.overall`. `GatePolicy::validate` checks this once at startup;
// a policy that violates it is a configuration defect, never a per-request
// outcome.
//
// Thresholds are tunable data (see `GatePolicy::default`), in the same way
// scoring weights are kept out of the evaluation logic.

use crate::features::Features;
use serde::{Deserialize, Serialize};

/// The four sub-gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    MelodyArc,
    MelodyStepLeap,
    MelodyNarrative,
    RhythmDiversity,
}

impl GateName {
    pub const ALL: [GateName; 4] = [
        GateName::MelodyArc,
        GateName::MelodyStepLeap,
        GateName::MelodyNarrative,
        GateName::RhythmDiversity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GateName::MelodyArc => "melody_arc",
            GateName::MelodyStepLeap => "melody_step_leap",
            GateName::MelodyNarrative => "melody_narrative",
            GateName::RhythmDiversity => "rhythm_diversity",
        }
    }

    /// The feature this gate reads.
    pub fn measurement(self, features: &Features) -> f64 {
        match self {
            GateName::MelodyArc => features.arc,
            GateName::MelodyStepLeap => features.step_leap_ratio,
            GateName::MelodyNarrative => features.narrative_flow,
            GateName::RhythmDiversity => features.rhythm_diversity,
        }
    }
}

/// Defect in a gate policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatePolicyError {
    #[error("{tier} threshold for {gate:?} is {value}, expected a number in [0, 1]")]
    InvalidThreshold {
        tier: &'static str,
        gate: GateName,
        value: f64,
    },

    #[error("strict threshold {strict} for {gate:?} is below calibrated threshold {calibrated}")]
    StrictBelowCalibrated {
        gate: GateName,
        strict: f64,
        calibrated: f64,
    },
}

/// One tier of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub melody_arc: f64,
    pub melody_step_leap: f64,
    pub melody_narrative: f64,
    pub rhythm_diversity: f64,
}

impl GateThresholds {
    pub fn get(&self, gate: GateName) -> f64 {
        match gate {
            GateName::MelodyArc => self.melody_arc,
            GateName::MelodyStepLeap => self.melody_step_leap,
            GateName::MelodyNarrative => self.melody_narrative,
            GateName::RhythmDiversity => self.rhythm_diversity,
        }
    }
}

/// Both tiers plus a version tag reported in response artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub version: String,
    pub calibrated: GateThresholds,
    pub strict: GateThresholds,
}

impl Default for GatePolicy {
    fn default() -> Self {
        GatePolicy {
            version: "gates-2024.2".to_string(),
            calibrated: GateThresholds {
                melody_arc: 0.55,
                melody_step_leap: 0.45,
                melody_narrative: 0.50,
                rhythm_diversity: 0.25,
            },
            strict: GateThresholds {
                melody_arc: 0.70,
                melody_step_leap: 0.60,
                melody_narrative: 0.65,
                rhythm_diversity: 0.40,
            },
        }
    }
}

impl GatePolicy {
    /// Reject thresholds outside [0, 1] and any strict < calibrated pair.
    pub fn validate(&self) -> Result<(), GatePolicyError> {
        for gate in GateName::ALL {
            for (tier, value) in [
                ("calibrated", self.calibrated.get(gate)),
                ("strict", self.strict.get(gate)),
            ] {
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(GatePolicyError::InvalidThreshold { tier, gate, value });
                }
            }
            let (strict, calibrated) = (self.strict.get(gate), self.calibrated.get(gate));
            if strict < calibrated {
                return Err(GatePolicyError::StrictBelowCalibrated {
                    gate,
                    strict,
                    calibrated,
                });
            }
        }
        Ok(())
    }
}

/// Verdicts for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdicts {
    pub melody_arc: bool,
    pub melody_step_leap: bool,
    pub melody_narrative: bool,
    pub rhythm_diversity: bool,
    pub overall: bool,
}

impl GateVerdicts {
    fn evaluate(features: &Features, thresholds: &GateThresholds) -> Self {
        let pass = |gate: GateName| gate.measurement(features) >= thresholds.get(gate);
        let melody_arc = pass(GateName::MelodyArc);
        let melody_step_leap = pass(GateName::MelodyStepLeap);
        let melody_narrative = pass(GateName::MelodyNarrative);
        let rhythm_diversity = pass(GateName::RhythmDiversity);
        GateVerdicts {
            melody_arc,
            melody_step_leap,
            melody_narrative,
            rhythm_diversity,
            overall: melody_arc && melody_step_leap && melody_narrative && rhythm_diversity,
        }
    }

    pub fn passed(&self, gate: GateName) -> bool {
        match gate {
            GateName::MelodyArc => self.melody_arc,
            GateName::MelodyStepLeap => self.melody_step_leap,
            GateName::MelodyNarrative => self.melody_narrative,
            GateName::RhythmDiversity => self.rhythm_diversity,
        }
    }

    /// Failing sub-gates, in `GateName::ALL` order.
    pub fn failing(&self) -> Vec<GateName> {
        GateName::ALL
            .into_iter()
            .filter(|&g| !self.passed(g))
            .collect()
    }
}

/// Calibrated and strict verdicts for one piece. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    pub calibrated: GateVerdicts,
    pub strict: GateVerdicts,
}

/// Evaluate both tiers. `policy` must have passed `validate`.
pub fn evaluate(features: &Features, policy: &GatePolicy) -> GateReport {
    let report = GateReport {
        calibrated: GateVerdicts::evaluate(features, &policy.calibrated),
        strict: GateVerdicts::evaluate(features, &policy.strict),
    };
    debug_assert!(!report.strict.overall || report.calibrated.overall);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use starsong_prng::SeedRng;

    fn features(v: f64) -> Features {
        Features {
            step_leap_ratio: v,
            arc: v,
            narrative_flow: v,
            rhythm_diversity: v,
        }
    }

    #[test]
    fn test_default_policy_is_valid() {
        GatePolicy::default().validate().unwrap();
    }

    #[test]
    fn test_strict_below_calibrated_is_rejected() {
        let mut policy = GatePolicy::default();
        policy.strict.melody_step_leap = 0.30;
        let err = policy.validate().unwrap_err();
        assert_eq!(
            err,
            GatePolicyError::StrictBelowCalibrated {
                gate: GateName::MelodyStepLeap,
                strict: 0.30,
                calibrated: 0.45,
            }
        );
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let mut policy = GatePolicy::default();
        policy.calibrated.melody_arc = f64::NAN;
        assert!(matches!(
            policy.validate(),
            Err(GatePolicyError::InvalidThreshold { tier: "calibrated", .. })
        ));
    }

    #[test]
    fn test_all_high_passes_both_tiers() {
        let report = evaluate(&features(0.95), &GatePolicy::default());
        assert!(report.calibrated.overall);
        assert!(report.strict.overall);
        assert!(report.calibrated.failing().is_empty());
    }

    #[test]
    fn test_between_tiers_passes_calibrated_only() {
        let f = Features {
            step_leap_ratio: 0.5,
            arc: 0.6,
            narrative_flow: 0.55,
            rhythm_diversity: 0.3,
        };
        let report = evaluate(&f, &GatePolicy::default());
        assert!(report.calibrated.overall);
        assert!(!report.strict.overall);
        assert_eq!(report.strict.failing().len(), 4);
    }

    #[test]
    fn test_single_failure_named() {
        let f = Features {
            step_leap_ratio: 0.2,
            ..features(0.9)
        };
        let report = evaluate(&f, &GatePolicy::default());
        assert!(!report.calibrated.overall);
        assert_eq!(report.calibrated.failing(), vec![GateName::MelodyStepLeap]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = GatePolicy::default();
        let f = Features {
            step_leap_ratio: policy.calibrated.melody_step_leap,
            arc: policy.calibrated.melody_arc,
            narrative_flow: policy.calibrated.melody_narrative,
            rhythm_diversity: policy.calibrated.rhythm_diversity,
        };
        assert!(evaluate(&f, &policy).calibrated.overall);
    }

    #[test]
    fn test_strict_implies_calibrated_over_many_reports() {
        let policy = GatePolicy::default();
        let mut rng = SeedRng::from_seed_str("gate-sweep");
        for _ in 0..5_000 {
            let f = Features {
                step_leap_ratio: rng.next_f64(),
                arc: rng.next_f64(),
                narrative_flow: rng.next_f64(),
                rhythm_diversity: rng.next_f64(),
            };
            let report = evaluate(&f, &policy);
            assert!(!report.strict.overall || report.calibrated.overall);
            for gate in GateName::ALL {
                assert!(!report.strict.passed(gate) || report.calibrated.passed(gate));
            }
        }
    }

    #[test]
    fn test_report_serializes_with_gate_names() {
        let report = evaluate(&features(0.9), &GatePolicy::default());
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["calibrated"]["melody_step_leap"], true);
        assert_eq!(json["strict"]["overall"], true);
    }
}
