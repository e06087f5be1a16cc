pub mod eyes;
pub mod history;
pub mod session;

pub use eyes::{PhotoEyeStats, collect_eye_stats, find_sidecars};
pub use history::{TrackHistoryRecord, append_history, read_history};
pub use session::{Frame, FrameMatch, ResolvedFrame, SessionError, SessionManifest, TrackingSession};
