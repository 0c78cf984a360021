// crates/demux-core/src/control.rs
//
// The control-code sum type (§6) and the wakeup-callback event it drives.
// Each cached control and each pass-through control is its own variant
// instead of an integer + untyped payload.

use bitflags::bitflags;

use crate::packet::StreamKind;

bitflags! {
    /// Which parts of the published snapshot changed on the last mirror swap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MirrorEvents: u32 {
        const INIT     = 1 << 0;
        const METADATA = 1 << 1;
        const STREAMS  = 1 << 2;
    }
}

/// A request the consumer issues through `Cache::control`. Variants that the
/// cache can answer from its own bookkeeping never reach the Producer;
/// everything else is dispatched through the worker as `ControlCmd::StreamCtrl`.
#[derive(Debug, Clone)]
pub enum ControlCmd {
    GetCacheInfo,
    GetSize,
    GetBaseFilename,
    GetDuration,
    GetSeekable,
    GetBitrateStats,
    GetReaderState,
    /// Opaque pass-through: the cache has no local handler, forward to the
    /// Producer's own `control`.
    StreamCtrl(String),
}

/// What came back from a `ControlCmd`. `Unhandled` is the explicit "no local
/// or producer handler for this" result — never an integer sentinel.
#[derive(Debug, Clone)]
pub enum ControlResult {
    CacheInfo { fw_bytes: u64, bw_bytes: u64, fw_seconds: f64 },
    Size(Option<u64>),
    BaseFilename(Option<String>),
    Duration(Option<f64>),
    Seekable(bool),
    BitrateStats(Vec<(StreamKind, i64)>),
    ReaderState(crate::error::ReaderState),
    Unhandled,
}

/// Events delivered through the registered wakeup callback (§5), always
/// invoked outside the cache lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    StreamAdded(usize),
    Eof,
    PacketAvailable(usize),
    QueueOverflow,
}
