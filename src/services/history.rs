use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::services::session::FrameMatch;

/// File name of the tracking log kept next to a session manifest.
pub const HISTORY_FILE_NAME: &str = ".facetrack.jsonl";

/// One tracking run, stored as a single JSON line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackHistoryRecord {
    pub timestamp: String,
    pub manifest: String,
    pub selected_file: String,
    pub selected_index: usize,
    pub matches: Vec<FrameMatch>,
}

impl TrackHistoryRecord {
    pub fn new(
        manifest: &Path,
        selected_file: &str,
        selected_index: usize,
        matches: Vec<FrameMatch>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            manifest: manifest.to_string_lossy().into_owned(),
            selected_file: selected_file.to_string(),
            selected_index,
            matches,
        }
    }
}

pub fn history_path(dir: &Path) -> PathBuf {
    dir.join(HISTORY_FILE_NAME)
}

pub fn append_history(dir: &Path, record: &TrackHistoryRecord) -> io::Result<PathBuf> {
    let path = history_path(dir);
    let mut out = OpenOptions::new().create(true).append(true).open(&path)?;
    let line = serde_json::to_string(record).map_err(io::Error::other)?;
    writeln!(out, "{}", line)?;
    Ok(path)
}

/// Read every record of the log. Malformed lines are returned as errors in
/// place so callers can report them and keep going.
pub fn read_history(dir: &Path) -> io::Result<Vec<Result<TrackHistoryRecord, serde_json::Error>>> {
    let reader = BufReader::new(File::open(history_path(dir))?);

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str::<TrackHistoryRecord>(&line));
    }
    Ok(records)
}
