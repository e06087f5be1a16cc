use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetrack::services::{
    SessionManifest, TrackHistoryRecord, TrackingSession, append_history, collect_eye_stats,
    find_sidecars, read_history,
};
use facetrack::{FaceData, FaceTracker, FaceTrackerConfig, FaceTrackerConfigOverrides, ImageDimensions};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facetrack", version, about = "Follow a selected face across photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Select a face in the first photo of a session and follow it
    Track {
        /// Session manifest (JSON list of frames)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        /// Index of the face to follow in the first frame
        #[arg(short, long, value_name = "N")]
        select: usize,
        /// JSON file with tracker overrides
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Append the run to the history log next to the manifest
        #[arg(long)]
        history: bool,
        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match one face of a photo against the faces of another
    Match {
        /// Face data of the photo the face was selected in
        #[arg(long, value_name = "FILE")]
        reference: PathBuf,
        /// Size of the reference photo
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        ref_size: ImageDimensions,
        /// Index of the selected face in the reference photo
        #[arg(short, long, value_name = "N")]
        select: usize,
        /// Face data of the new photo
        #[arg(long, value_name = "FILE")]
        candidate: PathBuf,
        /// Size of the new photo
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        size: ImageDimensions,
        /// JSON file with tracker overrides
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Count closed and suspicious eyes from face-data sidecars
    Eyes {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Only list photos with closed eyes
        #[arg(long)]
        closed_only: bool,
    },

    /// List the tracking history log
    History {
        /// Directory containing the history log
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            manifest,
            select,
            config,
            history,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let loaded = SessionManifest::load(&manifest)
                .with_context(|| format!("Failed to load manifest {:?}", manifest))?;
            let base_dir = manifest_dir(&manifest);

            let frames = benchmark("resolving frames", || loaded.resolve(&base_dir))
                .with_context(|| format!("Failed to resolve frames of {:?}", manifest))?;
            let first = frames
                .first()
                .map(|f| f.file_path.clone())
                .unwrap_or_default();

            let mut session = TrackingSession::new(config);
            let matches = session.run(&frames, select)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                println!("▶ Tracking face {} of {}", select, first);
                for m in &matches {
                    match m.matched_index {
                        Some(i) => println!(
                            "   🎯 {} → face {} ({:.1}%{})",
                            m.file_path,
                            i,
                            m.confidence * 100.0,
                            if m.used_fallback { ", fallback" } else { "" }
                        ),
                        None => println!("   ∅ {} → no faces", m.file_path),
                    }
                }
            }

            if history {
                let record = TrackHistoryRecord::new(&manifest, &first, select, matches);
                let path = append_history(&base_dir, &record)
                    .with_context(|| format!("Failed to write history in {:?}", base_dir))?;
                println!("\n✅ Recorded tracking run in {}", path.display());
            }
        }

        Commands::Match {
            reference,
            ref_size,
            select,
            candidate,
            size,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let reference_faces = read_face_data(&reference)?.faces;
            let candidate_faces = read_face_data(&candidate)?.faces;

            let face = reference_faces.get(select).with_context(|| {
                format!(
                    "Face {} not found in {:?} ({} faces)",
                    select,
                    reference,
                    reference_faces.len()
                )
            })?;

            let mut tracker = FaceTracker::new(config);
            log::debug!("Tracker config: {:?}", tracker.config());
            tracker.set_tracked_face(Some(face), select as isize, ref_size, reference_faces.len());
            let result = tracker.find_match(&candidate_faces, size);

            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Eyes { path, closed_only } => {
            println!("▶ Scanning face data in: {}", path.display());
            let sidecars = scan_sidecars(&path)?;
            let stats = benchmark("counting eye states", || collect_eye_stats(&sidecars));

            let mut flagged = 0;
            for s in &stats {
                if s.has_closed_eyes() {
                    flagged += 1;
                } else if closed_only {
                    continue;
                }
                println!(
                    "   {} {}  closed: {}  suspicious: {}  open: {}",
                    if s.has_closed_eyes() { "😑" } else { "🙂" },
                    s.file_path,
                    s.closed_eyes_count,
                    s.suspicious_count,
                    s.open_eyes_count
                );
            }
            println!(
                "\n{} photo(s), {} with closed eyes",
                stats.len(),
                flagged
            );
        }

        Commands::History { path } => {
            let records = read_history(&path)
                .with_context(|| format!("Could not open history log in {:?}", path))?;

            println!("🗂️  Tracking History:");
            for (i, record) in records.into_iter().enumerate() {
                match record {
                    Ok(rec) => {
                        let matched = rec.matches.iter().filter(|m| m.matched_index.is_some()).count();
                        println!(
                            "[{}] {}\n     manifest: {}\n     selected: face {} of {}\n     matched: {}/{} frame(s)\n",
                            i,
                            rec.timestamp,
                            rec.manifest,
                            rec.selected_index,
                            rec.selected_file,
                            matched,
                            rec.matches.len()
                        );
                    }
                    Err(err) => eprintln!("⚠️  Skipping malformed entry {}: {}", i, err),
                }
            }
        }
    }

    Ok(())
}

/// Parse `WxH` into image dimensions.
fn parse_size(s: &str) -> Result<ImageDimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {:?}", s))?;
    let width: u32 = w.trim().parse().map_err(|e| format!("bad width {:?}: {}", w, e))?;
    let height: u32 = h.trim().parse().map_err(|e| format!("bad height {:?}: {}", h, e))?;
    if width == 0 || height == 0 {
        return Err("image dimensions must be > 0".to_string());
    }
    Ok(ImageDimensions::from((width, height)))
}

fn load_config(path: Option<&Path>) -> Result<FaceTrackerConfig> {
    let Some(path) = path else {
        return Ok(FaceTrackerConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config {:?}", path))?;
    let overrides: FaceTrackerConfigOverrides = serde_json::from_str(&content)
        .with_context(|| format!("Invalid tracker config {:?}", path))?;
    overrides
        .apply(FaceTrackerConfig::default())
        .with_context(|| format!("Invalid tracker config {:?}", path))
}

fn read_face_data(path: &Path) -> Result<FaceData> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Could not read face data {:?}", path))?;
    FaceData::parse(&raw).with_context(|| format!("Invalid face data in {:?}", path))
}

fn manifest_dir(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Walk `dir` for face-data sidecars behind a spinner.
fn scan_sidecars(dir: &Path) -> Result<Vec<PathBuf>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for face data…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let sidecars = find_sidecars(dir);

    spinner.finish_with_message(format!("Found {} face data file(s)", sidecars.len()));
    Ok(sidecars)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
