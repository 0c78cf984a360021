// crates/demux-core/src/error.rs

use thiserror::Error;

/// Fallible outcomes of cache operations. Transient producer conditions
/// (no progress, EOF) are not errors — they're state transitions handled
/// by the worker loop (§7) — this enum is for operations a caller can act
/// on directly.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("seek target {pts} is outside any in-cache range")]
    SeekOutOfRange { pts: f64 },

    #[error("source is not seekable")]
    NotSeekable,

    #[error("producer failed to open: {0}")]
    OpenFailed(String),

    #[error("no such stream index {0}")]
    NoSuchStream(usize),

    #[error("producer I/O error: {0}")]
    Io(String),
}

/// Snapshot of `§4.8 Reader-state query`. All timestamps are in the
/// consumer-visible (offset-applied) timebase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderState {
    pub eof: bool,
    pub idle: bool,
    pub underrun: bool,
    pub ts_reader: Option<f64>,
    pub ts_max: Option<f64>,
    pub ts_min: Option<f64>,
    pub ts_duration: f64,
    pub seek_range: Option<(f64, f64)>,
}
