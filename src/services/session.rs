use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::face::{EyeState, FaceData, FaceDataError, FaceDetection, ImageDimensions};
use crate::core::tracker::{FaceTracker, FaceTrackerConfig};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Invalid face data for {path}: {source}")]
    FaceData {
        path: String,
        #[source]
        source: FaceDataError,
    },

    #[error("Cannot read dimensions of {path}: {source}")]
    Dimensions {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Session has no frames")]
    Empty,

    #[error("Face {index} not found in {path} ({count} faces)")]
    InvalidSelection {
        path: String,
        index: usize,
        count: usize,
    },
}

/// Face data as stored on a photo record: either the raw JSON string or an
/// already decoded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FaceDataSource {
    Raw(String),
    Inline(FaceData),
}

impl Default for FaceDataSource {
    fn default() -> Self {
        FaceDataSource::Inline(FaceData::default())
    }
}

impl FaceDataSource {
    pub fn decode(&self) -> Result<FaceData, FaceDataError> {
        match self {
            FaceDataSource::Raw(raw) => FaceData::parse(raw),
            FaceDataSource::Inline(data) => Ok(data.clone()),
        }
    }
}

/// One photo of a tracking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub file_path: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub face_data: FaceDataSource,
}

impl Frame {
    /// Decode the faces and settle the image size, reading the image header
    /// when the record carries no dimensions.
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedFrame, SessionError> {
        let faces = self
            .face_data
            .decode()
            .map_err(|source| SessionError::FaceData {
                path: self.file_path.clone(),
                source,
            })?
            .faces;

        let dimensions = match (self.width, self.height) {
            (Some(w), Some(h)) => ImageDimensions::from((w, h)),
            _ => {
                let path = self.image_path(base_dir);
                let dims = image::image_dimensions(&path).map_err(|source| {
                    SessionError::Dimensions {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                ImageDimensions::from(dims)
            }
        };

        if !dimensions.is_valid() {
            log::warn!(
                "{} reports a degenerate size {}x{}",
                self.file_path,
                dimensions.width,
                dimensions.height
            );
        }

        Ok(ResolvedFrame {
            file_path: self.file_path.clone(),
            dimensions,
            faces,
        })
    }

    fn image_path(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// A frame ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFrame {
    pub file_path: String,
    pub dimensions: ImageDimensions,
    pub faces: Vec<FaceDetection>,
}

/// Ordered list of photos the user steps through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionManifest {
    pub frames: Vec<Frame>,
}

impl SessionManifest {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolve every frame in parallel, keeping manifest order.
    pub fn resolve(&self, base_dir: &Path) -> Result<Vec<ResolvedFrame>, SessionError> {
        self.frames
            .par_iter()
            .map(|frame| frame.resolve(base_dir))
            .collect()
    }
}

/// Outcome of matching one frame against the tracked face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMatch {
    pub file_path: String,
    pub matched_index: Option<usize>,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    pub used_fallback: bool,
    pub eye_state: Option<EyeState>,
}

/// Tracking mode of one preview: a face is selected once, then followed from
/// photo to photo. Every matched face becomes the new reference.
#[derive(Debug, Clone, Default)]
pub struct TrackingSession {
    tracker: FaceTracker,
}

impl TrackingSession {
    pub fn new(config: FaceTrackerConfig) -> Self {
        Self {
            tracker: FaceTracker::new(config),
        }
    }

    pub fn tracker(&self) -> &FaceTracker {
        &self.tracker
    }

    /// Select face `index` of `frame` as the face to follow.
    pub fn select(&mut self, frame: &ResolvedFrame, index: usize) -> Result<(), SessionError> {
        let face = frame
            .faces
            .get(index)
            .ok_or_else(|| SessionError::InvalidSelection {
                path: frame.file_path.clone(),
                index,
                count: frame.faces.len(),
            })?;

        self.tracker.set_tracked_face(
            Some(face),
            index as isize,
            frame.dimensions,
            frame.faces.len(),
        );
        log::info!("Tracking face {} of {}", index, frame.file_path);
        Ok(())
    }

    /// Match `frame` against the current reference. A frame without a match
    /// leaves the reference untouched.
    pub fn advance(&mut self, frame: &ResolvedFrame) -> FrameMatch {
        let result = self.tracker.find_match(&frame.faces, frame.dimensions);

        let eye_state = result.matched_index.map(|i| {
            let face = &frame.faces[i];
            self.tracker.set_tracked_face(
                Some(face),
                i as isize,
                frame.dimensions,
                frame.faces.len(),
            );
            face.eye_state()
        });

        match result.matched_index {
            Some(i) => log::debug!(
                "{}: face {} (p={:.3}{})",
                frame.file_path,
                i,
                result.confidence,
                if result.used_fallback { ", fallback" } else { "" }
            ),
            None => log::debug!("{}: no match", frame.file_path),
        }

        FrameMatch {
            file_path: frame.file_path.clone(),
            matched_index: result.matched_index,
            confidence: result.confidence,
            probabilities: result.probabilities,
            used_fallback: result.used_fallback,
            eye_state,
        }
    }

    /// Select `index` in the first frame and follow it through the rest.
    pub fn run(
        &mut self,
        frames: &[ResolvedFrame],
        index: usize,
    ) -> Result<Vec<FrameMatch>, SessionError> {
        let (first, rest) = frames.split_first().ok_or(SessionError::Empty)?;
        self.select(first, index)?;
        Ok(rest.iter().map(|frame| self.advance(frame)).collect())
    }
}
