//! Face re-identification across photos.
//!
//! The tracker remembers one face the user selected and, when the preview
//! switches to another photo, scores every detected face of the new photo
//! against it. Six geometric and detector cues are combined in log space and
//! normalized with a softmax, so the result is a probability per candidate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::face::{FaceDetection, ImageDimensions};
use crate::core::geometry::{
    BoxFeatures, IOU_OFFSET, floored_ln, gaussian, iou, rank_ratio, softmax,
};

/// Share of the probability-ranked candidates considered by the fallback.
const FALLBACK_TOP_FRACTION: f64 = 0.5;

/// Tunable constants of the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceTrackerConfig {
    /// Sigma of the normalized center distance.
    pub position_sigma: f64,
    /// Sigma of the area and aspect log-ratios.
    pub scale_sigma: f64,
    pub score_sigma: f64,
    pub rank_sigma: f64,
    pub position_weight: f64,
    pub scale_weight: f64,
    pub aspect_weight: f64,
    pub iou_weight: f64,
    pub score_weight: f64,
    pub rank_weight: f64,
    /// Arg-max probability below which the fallback selection is used.
    pub min_confidence: f64,
}

impl Default for FaceTrackerConfig {
    fn default() -> Self {
        Self {
            position_sigma: 0.15,
            scale_sigma: 0.4,
            score_sigma: 0.1,
            rank_sigma: 0.5,
            position_weight: 1.5,
            scale_weight: 1.0,
            aspect_weight: 0.5,
            iou_weight: 1.5,
            score_weight: 0.6,
            rank_weight: 0.8,
            min_confidence: 0.2,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite number > 0, got {value}")]
    InvalidSigma { name: &'static str, value: f64 },

    #[error("{name} must be a finite number >= 0, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("min_confidence must be between 0.0 and 1.0, got {0}")]
    InvalidMinConfidence(f64),
}

impl FaceTrackerConfig {
    /// Check that every sigma is positive, every weight non-negative and the
    /// confidence threshold a probability.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sigmas = [
            ("position_sigma", self.position_sigma),
            ("scale_sigma", self.scale_sigma),
            ("score_sigma", self.score_sigma),
            ("rank_sigma", self.rank_sigma),
        ];
        for (name, value) in sigmas {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidSigma { name, value });
            }
        }

        let weights = [
            ("position_weight", self.position_weight),
            ("scale_weight", self.scale_weight),
            ("aspect_weight", self.aspect_weight),
            ("iou_weight", self.iou_weight),
            ("score_weight", self.score_weight),
            ("rank_weight", self.rank_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidMinConfidence(self.min_confidence));
        }
        Ok(())
    }
}

/// Partial configuration; every field left out keeps its default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaceTrackerConfigOverrides {
    pub position_sigma: Option<f64>,
    pub scale_sigma: Option<f64>,
    pub score_sigma: Option<f64>,
    pub rank_sigma: Option<f64>,
    pub position_weight: Option<f64>,
    pub scale_weight: Option<f64>,
    pub aspect_weight: Option<f64>,
    pub iou_weight: Option<f64>,
    pub score_weight: Option<f64>,
    pub rank_weight: Option<f64>,
    pub min_confidence: Option<f64>,
}

impl FaceTrackerConfigOverrides {
    /// Merge onto `base` and validate the result.
    pub fn apply(&self, base: FaceTrackerConfig) -> Result<FaceTrackerConfig, ConfigError> {
        let config = FaceTrackerConfig {
            position_sigma: self.position_sigma.unwrap_or(base.position_sigma),
            scale_sigma: self.scale_sigma.unwrap_or(base.scale_sigma),
            score_sigma: self.score_sigma.unwrap_or(base.score_sigma),
            rank_sigma: self.rank_sigma.unwrap_or(base.rank_sigma),
            position_weight: self.position_weight.unwrap_or(base.position_weight),
            scale_weight: self.scale_weight.unwrap_or(base.scale_weight),
            aspect_weight: self.aspect_weight.unwrap_or(base.aspect_weight),
            iou_weight: self.iou_weight.unwrap_or(base.iou_weight),
            score_weight: self.score_weight.unwrap_or(base.score_weight),
            rank_weight: self.rank_weight.unwrap_or(base.rank_weight),
            min_confidence: self.min_confidence.unwrap_or(base.min_confidence),
        };
        config.validate()?;
        Ok(config)
    }
}

/// The reference face together with the context it was selected in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedFace {
    pub face: FaceDetection,
    pub index: usize,
    pub image_size: ImageDimensions,
    pub total_faces: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched_index: Option<usize>,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    /// Whether the match came from the low-confidence fallback.
    pub used_fallback: bool,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            matched_index: None,
            confidence: 0.0,
            probabilities: Vec::new(),
            used_fallback: false,
        }
    }
}

/// Single-reference face matcher. Owned by one preview session.
#[derive(Debug, Clone, Default)]
pub struct FaceTracker {
    config: FaceTrackerConfig,
    tracked: Option<TrackedFace>,
}

impl FaceTracker {
    pub fn new(config: FaceTrackerConfig) -> Self {
        Self {
            config,
            tracked: None,
        }
    }

    pub fn with_overrides(overrides: &FaceTrackerConfigOverrides) -> Result<Self, ConfigError> {
        Ok(Self::new(overrides.apply(FaceTrackerConfig::default())?))
    }

    pub fn config(&self) -> &FaceTrackerConfig {
        &self.config
    }

    /// Remember `face` as the reference. A missing face or a negative index
    /// clears tracking instead.
    pub fn set_tracked_face(
        &mut self,
        face: Option<&FaceDetection>,
        index: isize,
        image_size: ImageDimensions,
        total_faces: usize,
    ) {
        match (face, usize::try_from(index)) {
            (Some(face), Ok(index)) => {
                self.tracked = Some(TrackedFace {
                    face: face.clone(),
                    index,
                    image_size,
                    total_faces,
                });
            }
            _ => self.clear_tracking(),
        }
    }

    pub fn clear_tracking(&mut self) {
        self.tracked = None;
    }

    pub fn has_tracking(&self) -> bool {
        self.tracked.is_some()
    }

    pub fn tracking_state(&self) -> Option<&TrackedFace> {
        self.tracked.as_ref()
    }

    /// Score `new_faces` against the reference face. Does not update the
    /// reference.
    pub fn find_match(
        &self,
        new_faces: &[FaceDetection],
        new_image_size: ImageDimensions,
    ) -> MatchResult {
        let Some(reference) = self.tracked.as_ref() else {
            return MatchResult::none();
        };
        if new_faces.is_empty() {
            return MatchResult::none();
        }

        let logits: Vec<f64> = new_faces
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                self.log_score(reference, candidate, i, new_faces.len(), new_image_size)
            })
            .collect();
        let probabilities = softmax(&logits);

        let (best, best_prob) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bp), (i, p)| {
                if p > bp { (i, p) } else { (bi, bp) }
            });

        if best_prob >= self.config.min_confidence {
            return MatchResult {
                matched_index: Some(best),
                confidence: best_prob,
                probabilities,
                used_fallback: false,
            };
        }

        let chosen = fallback_choice(&probabilities, new_faces);
        log::debug!(
            "arg-max probability {:.3} below {:.3}; fallback picked candidate {}",
            best_prob,
            self.config.min_confidence,
            chosen
        );

        MatchResult {
            matched_index: Some(chosen),
            confidence: probabilities[chosen],
            probabilities,
            used_fallback: true,
        }
    }

    fn log_score(
        &self,
        reference: &TrackedFace,
        candidate: &FaceDetection,
        candidate_index: usize,
        candidate_count: usize,
        new_image_size: ImageDimensions,
    ) -> f64 {
        let cfg = &self.config;
        let ref_bbox = reference.face.bbox.sanitized();
        let cand_bbox = candidate.bbox.sanitized();

        let ref_features = BoxFeatures::extract(&ref_bbox, reference.image_size);
        let cand_features = BoxFeatures::extract(&cand_bbox, new_image_size);

        let position = gaussian(cand_features.center_distance(&ref_features), cfg.position_sigma);
        let scale = gaussian(cand_features.area_log_ratio(&ref_features), cfg.scale_sigma);
        let aspect = gaussian(cand_features.aspect_log_ratio(&ref_features), cfg.scale_sigma);

        let projected = ref_bbox.rescaled(reference.image_size, new_image_size);
        let overlap = iou(&projected, &cand_bbox);

        let score_diff = (candidate.score_or_default() - reference.face.score_or_default()).abs();
        let score = gaussian(score_diff, cfg.score_sigma);

        let rank_diff = (rank_ratio(candidate_index, candidate_count)
            - rank_ratio(reference.index, reference.total_faces))
        .abs();
        let rank = gaussian(rank_diff, cfg.rank_sigma);

        floored_ln(position) * cfg.position_weight
            + floored_ln(scale) * cfg.scale_weight
            + floored_ln(aspect) * cfg.aspect_weight
            + floored_ln(overlap + IOU_OFFSET) * cfg.iou_weight
            + floored_ln(score) * cfg.score_weight
            + floored_ln(rank) * cfg.rank_weight
    }
}

/// Among the most probable half of the candidates, pick the one the detector
/// trusts most. Equal scores keep the more probable candidate, then the lower
/// index.
fn fallback_choice(probabilities: &[f64], faces: &[FaceDetection]) -> usize {
    let mut ranked: Vec<usize> = (0..probabilities.len()).collect();
    ranked.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

    let top = ((probabilities.len() as f64 * FALLBACK_TOP_FRACTION).ceil() as usize).max(1);

    ranked
        .into_iter()
        .take(top)
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if faces[i].score_or_default() <= faces[b].score_or_default() => Some(b),
            _ => Some(i),
        })
        .unwrap_or(0)
}
