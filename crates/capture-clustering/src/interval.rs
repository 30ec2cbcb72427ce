//! Inter-photo interval computation and classification.
//!
//! A turntable capture session has three characteristic pauses between
//! consecutive shots: long ones while the operator re-angles the rig,
//! medium ones while the turntable advances a step, and short ones between
//! bracketed exposures at a fixed position. Classifying each gap into one
//! of those classes is what lets the flat session directory be rebuilt as
//! an angle/rotation hierarchy.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::exif::CapturedPhoto;
use crate::mixture::GaussianMixture;

/// Time elapsed between two chronologically consecutive photos.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalGap {
    /// Position between photo `index` and photo `index + 1`.
    pub index: usize,
    /// Directed difference, next capture time minus current.
    pub seconds: f64,
}

/// Classification of one inter-photo gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalLabel {
    /// The operator stopped to re-angle the rig.
    AngleBoundary,
    /// The turntable advanced one step under the same angle.
    RotationBoundary,
    /// Another bracketed exposure at the same position.
    BracketContinuation,
}

/// How gaps are split into the three classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Strategy {
    /// Fixed cutoffs for both levels.
    ///
    /// `angle_secs` is expected to be at least `rotation_secs`; this is not
    /// validated, and with the relationship inverted the angle branch fires
    /// first and [`IntervalLabel::RotationBoundary`] becomes unreachable.
    Thresholds { angle_secs: f64, rotation_secs: f64 },
    /// Fixed cutoff for angle changes only; rotation and bracket gaps are
    /// separated statistically, per run of gaps between angle boundaries.
    Mixture { angle_secs: f64 },
}

/// Compute the N-1 gaps for N chronologically sorted photos.
///
/// A negative gap means the input was not actually sorted or carries
/// corrupt timestamps; it is surfaced, never clamped.
pub fn compute_gaps(photos: &[CapturedPhoto]) -> Result<Vec<IntervalGap>> {
    let mut gaps = Vec::with_capacity(photos.len().saturating_sub(1));
    for (index, pair) in photos.windows(2).enumerate() {
        let millis = pair[1]
            .capture_time
            .signed_duration_since(pair[0].capture_time)
            .num_milliseconds();
        let seconds = millis as f64 / 1000.0;
        if seconds < 0.0 {
            return Err(SessionError::NegativeInterval {
                earlier: pair[0].path.clone(),
                later: pair[1].path.clone(),
                seconds,
            });
        }
        gaps.push(IntervalGap { index, seconds });
    }
    Ok(gaps)
}

/// Assign one label per gap, in gap order.
pub fn classify(gaps: &[IntervalGap], strategy: Strategy) -> Result<Vec<IntervalLabel>> {
    match strategy {
        Strategy::Thresholds {
            angle_secs,
            rotation_secs,
        } => Ok(classify_by_thresholds(gaps, angle_secs, rotation_secs)),
        Strategy::Mixture { angle_secs } => classify_by_mixture(gaps, angle_secs),
    }
}

fn classify_by_thresholds(
    gaps: &[IntervalGap],
    angle_secs: f64,
    rotation_secs: f64,
) -> Vec<IntervalLabel> {
    gaps.iter()
        .map(|gap| {
            if gap.seconds > angle_secs {
                IntervalLabel::AngleBoundary
            } else if gap.seconds > rotation_secs {
                IntervalLabel::RotationBoundary
            } else {
                IntervalLabel::BracketContinuation
            }
        })
        .collect()
}

/// Scan gaps in order, labelling everything above the angle cutoff as an
/// angle boundary and splitting each maximal run of sub-cutoff gaps into
/// rotation and bracket gaps with a per-run mixture fit.
fn classify_by_mixture(gaps: &[IntervalGap], angle_secs: f64) -> Result<Vec<IntervalLabel>> {
    let mut labels = Vec::with_capacity(gaps.len());
    let mut run: Vec<f64> = Vec::new();

    for gap in gaps {
        if gap.seconds > angle_secs {
            if !run.is_empty() {
                labels.extend(split_run(&run)?);
                run.clear();
            }
            labels.push(IntervalLabel::AngleBoundary);
        } else {
            run.push(gap.seconds);
        }
    }
    if !run.is_empty() {
        labels.extend(split_run(&run)?);
    }

    Ok(labels)
}

/// Split one run of sub-angle gaps into rotation and bracket gaps.
///
/// The fit does not promise which component ends up at which index, so the
/// label mapping is re-derived from the fitted means on every call: the
/// larger-mean component is the rotation class.
fn split_run(seconds: &[f64]) -> Result<Vec<IntervalLabel>> {
    let mut mixture = GaussianMixture::new();
    mixture.fit(seconds)?;

    let means = mixture.means();
    let rotation_component = usize::from(means[1] > means[0]);
    info!(
        "interval averages: {:.4}s, {:.4}s",
        means[rotation_component],
        means[1 - rotation_component]
    );

    Ok(seconds
        .iter()
        .map(|&s| {
            if mixture.predict(s) == rotation_component {
                IntervalLabel::RotationBoundary
            } else {
                IntervalLabel::BracketContinuation
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};
    use std::path::PathBuf;

    use IntervalLabel::{AngleBoundary as A, BracketContinuation as B, RotationBoundary as R};

    fn photo_at(offset_ms: i64) -> CapturedPhoto {
        let base = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2021, 7, 15, 2, 0, 0)
            .unwrap();
        CapturedPhoto::new(
            PathBuf::from(format!("photo_{offset_ms}.tif")),
            base + Duration::milliseconds(offset_ms),
        )
    }

    /// Photos whose consecutive gaps are exactly `gaps_secs`.
    fn photos_with_gaps(gaps_secs: &[f64]) -> Vec<CapturedPhoto> {
        let mut offset_ms = 0i64;
        let mut photos = vec![photo_at(0)];
        for gap in gaps_secs {
            offset_ms += (gap * 1000.0).round() as i64;
            photos.push(photo_at(offset_ms));
        }
        photos
    }

    fn gaps(seconds: &[f64]) -> Vec<IntervalGap> {
        seconds
            .iter()
            .enumerate()
            .map(|(index, &seconds)| IntervalGap { index, seconds })
            .collect()
    }

    #[test]
    fn test_gap_computation() {
        let photos = photos_with_gaps(&[0.2, 0.3, 20.0, 0.25]);
        let gaps = compute_gaps(&photos).unwrap();

        assert_eq!(gaps.len(), 4);
        assert_eq!(gaps[0].index, 0);
        assert_eq!(gaps[3].index, 3);
        assert!((gaps[0].seconds - 0.2).abs() < 1e-9);
        assert!((gaps[2].seconds - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_gap_is_integrity_fault() {
        let photos = vec![photo_at(1000), photo_at(0)];
        assert!(matches!(
            compute_gaps(&photos),
            Err(SessionError::NegativeInterval { .. })
        ));
    }

    #[test]
    fn test_threshold_classification_session() {
        // 5 photos: two brackets, an angle change, one more bracket
        let labels = classify(
            &gaps(&[0.2, 0.3, 20.0, 0.25]),
            Strategy::Thresholds {
                angle_secs: 15.0,
                rotation_secs: 1.0,
            },
        )
        .unwrap();
        assert_eq!(labels, vec![B, B, A, B]);
    }

    #[test]
    fn test_threshold_classification_rotation() {
        let labels = classify(
            &gaps(&[2.0]),
            Strategy::Thresholds {
                angle_secs: 15.0,
                rotation_secs: 1.0,
            },
        )
        .unwrap();
        assert_eq!(labels, vec![R]);
    }

    #[test]
    fn test_one_label_per_gap_in_order() {
        let input = gaps(&[0.1, 5.0, 0.2, 30.0, 0.3]);
        let labels = classify(
            &input,
            Strategy::Thresholds {
                angle_secs: 15.0,
                rotation_secs: 1.0,
            },
        )
        .unwrap();
        assert_eq!(labels.len(), input.len());
        assert_eq!(labels, vec![B, R, B, A, B]);
    }

    #[test]
    fn test_angle_branch_wins_regardless_of_rotation_threshold() {
        // Inverted thresholds: everything above the angle cutoff is still
        // an angle boundary, and the rotation class becomes unreachable.
        let labels = classify(
            &gaps(&[0.5, 2.0, 10.0]),
            Strategy::Thresholds {
                angle_secs: 1.0,
                rotation_secs: 15.0,
            },
        )
        .unwrap();
        assert_eq!(labels, vec![B, A, A]);
    }

    #[test]
    fn test_mixture_splits_rotation_from_bracket() {
        // Interleaved bracket/rotation gaps, no angle change
        let labels = classify(
            &gaps(&[0.1, 0.9, 0.12, 0.95, 0.11, 0.92]),
            Strategy::Mixture { angle_secs: 15.0 },
        )
        .unwrap();
        assert_eq!(labels, vec![B, R, B, R, B, R]);
    }

    #[test]
    fn test_mixture_flushes_runs_at_angle_boundaries() {
        let labels = classify(
            &gaps(&[0.1, 0.9, 30.0, 0.12, 0.95]),
            Strategy::Mixture { angle_secs: 15.0 },
        )
        .unwrap();
        assert_eq!(labels, vec![B, R, A, B, R]);
    }

    #[test]
    fn test_mixture_single_gap_run_is_config_fault() {
        // The run before the angle boundary holds a single gap, which
        // cannot support a two-component fit.
        let result = classify(&gaps(&[0.1, 30.0, 0.2, 0.9]), Strategy::Mixture { angle_secs: 15.0 });
        assert!(matches!(
            result,
            Err(SessionError::MixtureUnderflow { count: 1 })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_gaps(&[]).unwrap().is_empty());
        assert!(classify(
            &[],
            Strategy::Thresholds {
                angle_secs: 15.0,
                rotation_secs: 1.0
            }
        )
        .unwrap()
        .is_empty());
    }
}
