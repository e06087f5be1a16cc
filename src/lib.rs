//! Re-identify a selected face across a sequence of photos.
//!
//! ```no_run
//! use facetrack::{BBox, FaceDetection, FaceTracker, ImageDimensions};
//!
//! let mut tracker = FaceTracker::default();
//! let face = FaceDetection::new(BBox::new(120.0, 80.0, 220.0, 200.0)).with_score(0.97);
//! tracker.set_tracked_face(Some(&face), 0, ImageDimensions::new(1024.0, 768.0), 1);
//!
//! let next = vec![FaceDetection::new(BBox::new(130.0, 82.0, 228.0, 204.0))];
//! let result = tracker.find_match(&next, ImageDimensions::new(1024.0, 768.0));
//! println!("{:?} ({:.2})", result.matched_index, result.confidence);
//! ```

pub mod core;
pub mod services;

pub use crate::core::face::{
    BBox, EyeState, EyeStats, FaceData, FaceDataError, FaceDetection, ImageDimensions,
};
pub use crate::core::tracker::{
    ConfigError, FaceTracker, FaceTrackerConfig, FaceTrackerConfigOverrides, MatchResult, TrackedFace,
};
