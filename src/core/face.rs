use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Detector confidence assumed when a face carries no `score`.
pub const DEFAULT_FACE_SCORE: f64 = 0.9;

/// Eye openness assumed when a face carries no `eye_open` value.
pub const DEFAULT_EYE_OPEN: f64 = 1.0;

/// `eye_open` below this value counts as closed.
pub const EYE_THRESHOLD_CLOSED: f64 = 0.35;

/// `eye_open` at or below this value (and not closed) counts as suspicious.
pub const EYE_THRESHOLD_SUSPICIOUS: f64 = 0.6;

#[derive(Debug, Error)]
pub enum FaceDataError {
    #[error("Malformed face data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Axis-aligned face box `[x1, y1, x2, y2]` in pixels of its source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Replace non-finite coordinates with `0.0`.
    pub fn sanitized(&self) -> Self {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self::new(finite(self.x1), finite(self.y1), finite(self.x2), finite(self.y2))
    }

    /// Map this box from `from` image space into `to` image space, scaling each
    /// axis independently.
    pub fn rescaled(&self, from: ImageDimensions, to: ImageDimensions) -> Self {
        let sx = to.safe_width() / from.safe_width();
        let sy = to.safe_height() / from.safe_height();
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Smallest image side used as a divisor.
pub const MIN_IMAGE_DIMENSION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: f64,
    pub height: f64,
}

impl ImageDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width clamped to at least one pixel; non-finite widths become one pixel.
    pub fn safe_width(&self) -> f64 {
        clamp_dimension(self.width)
    }

    pub fn safe_height(&self) -> f64 {
        clamp_dimension(self.height)
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl From<(u32, u32)> for ImageDimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width as f64, height as f64)
    }
}

fn clamp_dimension(v: f64) -> f64 {
    if v.is_finite() {
        v.max(MIN_IMAGE_DIMENSION)
    } else {
        MIN_IMAGE_DIMENSION
    }
}

/// One face as reported by the detection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, alias = "eyeOpenness", skip_serializing_if = "Option::is_none")]
    pub eye_open: Option<f64>,
}

impl FaceDetection {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            score: None,
            eye_open: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_eye_open(mut self, eye_open: f64) -> Self {
        self.eye_open = Some(eye_open);
        self
    }

    /// Detector confidence, `DEFAULT_FACE_SCORE` when absent.
    pub fn score_or_default(&self) -> f64 {
        self.score.unwrap_or(DEFAULT_FACE_SCORE)
    }

    pub fn eye_state(&self) -> EyeState {
        EyeState::classify(self.eye_open)
    }
}

/// Per-photo face payload written by the detection backend: `{"faces": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    #[serde(default)]
    pub faces: Vec<FaceDetection>,
}

impl FaceData {
    /// Parse the stored JSON string. Blank input means no faces.
    pub fn parse(raw: &str) -> Result<Self, FaceDataError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeState {
    Open,
    Suspicious,
    Closed,
}

impl EyeState {
    pub fn classify(eye_open: Option<f64>) -> Self {
        let v = eye_open.unwrap_or(DEFAULT_EYE_OPEN);
        if v < EYE_THRESHOLD_CLOSED {
            EyeState::Closed
        } else if v <= EYE_THRESHOLD_SUSPICIOUS {
            EyeState::Suspicious
        } else {
            EyeState::Open
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeStats {
    pub closed: usize,
    pub suspicious: usize,
    pub open: usize,
}

impl EyeStats {
    pub fn count(faces: &[FaceDetection]) -> Self {
        faces.iter().fold(Self::default(), |mut stats, face| {
            match face.eye_state() {
                EyeState::Closed => stats.closed += 1,
                EyeState::Suspicious => stats.suspicious += 1,
                EyeState::Open => stats.open += 1,
            }
            stats
        })
    }

    pub fn total(&self) -> usize {
        self.closed + self.suspicious + self.open
    }
}
