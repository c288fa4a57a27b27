//! Confidence calibration: combines rule, signal, history and correlation
//! inputs into the final [0,1] confidence.

use crate::constants::{ENRICHMENT_MAX_DELTA, UNKNOWN_CONFIDENCE_CAP};
use crate::models::ConfidenceBucket;

/// Inputs for one calibration.
#[derive(Debug, Clone, Default)]
pub struct CalibrationInput {
    /// Base confidence of the winning rule, when one fired.
    pub rule_confidence: Option<f64>,
    /// Confidences of the contributing signals.
    pub signal_confidences: Vec<f64>,
    /// Pattern frequency boost, already clamped to [0, 0.15].
    pub history_boost: f64,
    /// Application-log boost: 0.15 when correlation confirmed a product
    /// defect, 0 otherwise.
    pub app_log_boost: f64,
}

/// Deterministic confidence calibrator.
///
/// `c_base = max(c_rule, c_signal)` when a rule fired, else
/// `min(c_signal, 0.5)`. Boosts add on top with a hard clamp to [0,1];
/// the advisory AI delta is applied last and may never cross a bucket
/// boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceCalibrator;

impl ConfidenceCalibrator {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic confidence before any enrichment delta.
    pub fn calibrate(&self, input: &CalibrationInput) -> f64 {
        let c_signal = input
            .signal_confidences
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        let c_base = match input.rule_confidence {
            Some(c_rule) => c_rule.max(c_signal),
            None => c_signal.min(UNKNOWN_CONFIDENCE_CAP),
        };
        (c_base + input.history_boost + input.app_log_boost).clamp(0.0, 1.0)
    }

    /// Apply the advisory enrichment delta on top of a calibrated value.
    ///
    /// The delta is capped to ±0.1 and truncated at the confidence-bucket
    /// boundary of the deterministic value, so enrichment can nudge but
    /// never reclassify how confident the verdict reads.
    pub fn apply_ai_delta(&self, calibrated: f64, delta: f64) -> f64 {
        let delta = delta.clamp(-ENRICHMENT_MAX_DELTA, ENRICHMENT_MAX_DELTA);
        let adjusted = (calibrated + delta).clamp(0.0, 1.0);

        let bucket = ConfidenceBucket::from_confidence(calibrated);
        let (lower, upper) = bucket.bounds();
        if ConfidenceBucket::from_confidence(adjusted) == bucket {
            return adjusted;
        }
        if adjusted < lower {
            lower
        } else {
            // Truncate just under the next bucket's floor; buckets are
            // half-open on the upper side except HIGH which owns 1.0.
            if bucket == ConfidenceBucket::High {
                upper
            } else {
                f64::from_bits(upper.to_bits() - 1)
            }
        }
    }
}
