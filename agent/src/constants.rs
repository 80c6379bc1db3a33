// Shared constants for agent timing, pacing, and endpoints.

pub const DEFAULT_INGEST_URL: &str = "http://127.0.0.1:8000";
pub const UPLOAD_TIMEOUT_SECS: u64 = 5;
pub const DRAIN_PAUSE_MS: u64 = 100;
pub const STATS_CHECKPOINT_SAMPLES: u64 = 50;
pub const MAX_REPLAY_DELAY_MS: i64 = 2_000;
pub const POISON_LIMIT: i64 = 3;
