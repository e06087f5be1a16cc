use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::face::{EyeStats, FaceData};

/// Suffix of the face-data sidecar written next to each photo.
pub const SIDECAR_SUFFIX: &str = ".faces.json";

/// Eye-state counts for one photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoEyeStats {
    pub file_path: String,
    pub closed_eyes_count: usize,
    pub suspicious_count: usize,
    pub open_eyes_count: usize,
}

impl PhotoEyeStats {
    pub fn new(file_path: String, stats: EyeStats) -> Self {
        Self {
            file_path,
            closed_eyes_count: stats.closed,
            suspicious_count: stats.suspicious,
            open_eyes_count: stats.open,
        }
    }

    pub fn has_closed_eyes(&self) -> bool {
        self.closed_eyes_count > 0
    }
}

/// Recursively collect face-data sidecars under `dir`.
pub fn find_sidecars(dir: &Path) -> Vec<PathBuf> {
    let mut sidecars: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.to_lowercase().ends_with(SIDECAR_SUFFIX))
        })
        .map(|entry| entry.into_path())
        .collect();
    sidecars.sort();
    sidecars
}

/// The photo a sidecar belongs to: `IMG_1.jpg.faces.json` → `IMG_1.jpg`.
fn photo_path(sidecar: &Path) -> String {
    let full = sidecar.to_string_lossy();
    full.get(..full.len().saturating_sub(SIDECAR_SUFFIX.len()))
        .unwrap_or(full.as_ref())
        .to_string()
}

/// Parse the sidecars in parallel and count eye states per photo. Unreadable
/// or malformed sidecars are logged and skipped.
pub fn collect_eye_stats(sidecars: &[PathBuf]) -> Vec<PhotoEyeStats> {
    sidecars
        .par_iter()
        .filter_map(|path| {
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|raw| FaceData::parse(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(data) => Some(PhotoEyeStats::new(
                    photo_path(path),
                    EyeStats::count(&data.faces),
                )),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_sidecars_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("day2");
        fs::create_dir_all(&nested).unwrap();

        fs::write(temp_dir.path().join("a.jpg.faces.json"), "{}").unwrap();
        fs::write(nested.join("b.jpg.FACES.JSON"), "{}").unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"jpeg").unwrap();
        fs::write(temp_dir.path().join("notes.json"), "{}").unwrap();

        let sidecars = find_sidecars(temp_dir.path());
        assert_eq!(sidecars.len(), 2);
        assert!(sidecars[0].ends_with("a.jpg.faces.json"));
        assert!(sidecars[1].ends_with("day2/b.jpg.FACES.JSON"));
    }

    #[test]
    fn test_collect_eye_stats_skips_malformed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("a.jpg.faces.json"),
            r#"{"faces": [
                {"bbox": [0, 0, 10, 10], "eye_open": 0.1},
                {"bbox": [20, 0, 30, 10], "eye_open": 0.5},
                {"bbox": [40, 0, 50, 10]}
            ]}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("b.jpg.faces.json"), "{broken").unwrap();
        fs::write(temp_dir.path().join("c.jpg.faces.json"), "").unwrap();

        let stats = collect_eye_stats(&find_sidecars(temp_dir.path()));
        assert_eq!(stats.len(), 2);

        let a = &stats[0];
        assert!(a.file_path.ends_with("a.jpg"));
        assert_eq!(
            (a.closed_eyes_count, a.suspicious_count, a.open_eyes_count),
            (1, 1, 1)
        );
        assert!(a.has_closed_eyes());

        let c = &stats[1];
        assert!(c.file_path.ends_with("c.jpg"));
        assert_eq!(c.open_eyes_count, 0);
        assert!(!c.has_closed_eyes());
    }

    #[test]
    fn test_photo_path_strips_suffix() {
        assert_eq!(photo_path(Path::new("/x/IMG_1.jpg.faces.json")), "/x/IMG_1.jpg");
    }
}
