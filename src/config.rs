//! Bounds, defaults, and tunables used across the link-layer core.

use std::time::Duration;

/// Chunk size used when draining a protocol-frame body in the framing reader.
pub const FRAME_BODY_CHUNK: usize = 1024;

/// Chunk size used when draining a bulk file-transfer payload.
pub const BULK_CHUNK: usize = 2048;

/// How often (in chunks) the bulk reader reports progress.
pub const BULK_PROGRESS_EVERY_N_CHUNKS: usize = 20;

/// Read timeout the framing reader uses between header-byte polls.
pub const FRAMING_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Read timeout installed on the link while a bulk transfer is in progress.
pub const BULK_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for `send_and_wait` when the caller does not specify one.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wall-clock budget for a bulk file download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed grace period added on top of a caller's timeout when waiting on the
/// completion channel, absorbing scheduling jitter between the sender worker
/// finishing and the channel delivering the result.
pub const COMPLETION_GRACE: Duration = Duration::from_millis(250);

/// Timeout used while auto-detect probes a candidate port with a heartbeat.
pub const AUTO_DETECT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Tokens used by auto-detect to recognize a candidate serial port, matched
/// case-insensitively against the port's manufacturer and product/description
/// strings. Overridable; see [`AutoDetectConfig::default`].
#[derive(Debug, Clone)]
pub struct AutoDetectConfig {
    pub manufacturers: Vec<String>,
    pub descriptions: Vec<String>,
    pub probe_timeout: Duration,
}

impl Default for AutoDetectConfig {
    fn default() -> Self {
        Self {
            manufacturers: vec!["Datek".to_string(), "Aidee".to_string()],
            descriptions: vec![
                "IsenseU".to_string(),
                "G3".to_string(),
                "EmBody".to_string(),
            ],
            probe_timeout: AUTO_DETECT_PROBE_TIMEOUT,
        }
    }
}

/// Options for a bulk file download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Wall-clock budget for the whole transfer.
    pub timeout: Duration,
    /// Optional pacing delay slept between chunks; a knob for devices that
    /// need a breather, not a correctness requirement.
    pub inter_chunk_delay: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            inter_chunk_delay: None,
        }
    }
}
