// Sample log resolution and timed replay.
// Invariants: an unparseable line is skipped, never fatal; replay pacing
// follows the gaps between source timestamps.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use telemetry_core::model::Sample;

use crate::constants::MAX_REPLAY_DELAY_MS;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read sample line: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed sample line: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn resolve_data_dir() -> PathBuf {
    if let Ok(value) = env::var("TELEMETRY_DATA_DIR") {
        return PathBuf::from(value);
    }
    let local = PathBuf::from("./data");
    if local.is_dir() {
        return local;
    }
    let parent = PathBuf::from("../data");
    if parent.is_dir() {
        return parent;
    }
    local
}

// Candidate logs, most specific first: the VIN-suffixed drive log, then the
// shared one.
pub fn resolve_source_path(data_dir: &Path, vin: &str) -> Option<PathBuf> {
    let candidates = [
        data_dir.join(format!("drive_log_{vin}.jsonl")),
        data_dir.join("drive_log.jsonl"),
    ];
    candidates.into_iter().find(|path| path.is_file())
}

pub struct SampleSource {
    lines: Lines<BufReader<File>>,
    last_timestamp: Option<i64>,
}

impl SampleSource {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            last_timestamp: None,
        })
    }

    /// Next line of the log as a parse result, or None at end of file.
    /// Empty lines are skipped silently.
    pub async fn next_sample(&mut self) -> Option<Result<Sample, SourceError>> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(&line).map_err(SourceError::from));
                }
                Ok(None) => return None,
                Err(err) => return Some(Err(SourceError::Io(err))),
            }
        }
    }

    /// Replay delay before delivering `sample`, derived from consecutive
    /// source timestamps and clamped so a log gap cannot stall the agent.
    pub fn pacing_delay(&mut self, sample: &Sample) -> Duration {
        let delay_ms = match self.last_timestamp {
            Some(last) => sample
                .timestamp
                .saturating_sub(last)
                .clamp(0, MAX_REPLAY_DELAY_MS),
            None => 0,
        };
        self.last_timestamp = Some(sample.timestamp);
        Duration::from_millis(delay_ms as u64)
    }
}
