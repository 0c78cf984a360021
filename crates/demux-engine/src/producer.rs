// crates/demux-engine/src/producer.rs
//
// The trait an embedder implements to drive a Cache: Producer supplies
// packets and answers I/O-bound requests (size, base filename, cache info)
// through the same `control` channel consumers use. Not implemented by this
// crate — demux-ffmpeg's FfmpegProducer is the reference adapter.

use demux_core::{CacheError, ControlCmd, ControlResult, Packet, SeekFlags, StreamKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckLevel {
    /// Just probe enough to report stream layout.
    Probe,
    /// Full open, ready to fill_buffer/seek.
    Full,
}

/// Callback a Producer uses to hand a freshly read packet to the cache.
/// Implemented as a plain `FnMut` so `fill_buffer` can push any number of
/// packets per call without the cache and producer sharing a channel.
pub type PacketSink<'a> = dyn FnMut(usize, Packet) + 'a;

/// The format-specific side of the cache. Everything here may block on real
/// I/O; the cache only ever calls these with its lock released (§5).
pub trait Producer: Send {
    /// Open the source and report the stream layout discovered during init.
    /// The cache registers one queue per returned `StreamKind`, in order —
    /// that ordering becomes each stream's permanent index, matching the
    /// packets this producer will later hand to `fill_buffer`'s sink.
    fn open(&mut self, check_level: CheckLevel) -> Result<Vec<StreamKind>, CacheError>;

    /// Pull as many packets as are immediately available and hand each to
    /// `sink`. Returns the number of packets supplied; `0` means EOF.
    fn fill_buffer(&mut self, sink: &mut PacketSink) -> usize;

    fn seek(&mut self, pts: f64, flags: SeekFlags) -> Result<(), CacheError>;

    /// Answer a control request this producer cares about; everything else
    /// returns `ControlResult::Unhandled` and the cache answers locally or
    /// gives up.
    fn control(&mut self, cmd: &ControlCmd) -> ControlResult {
        let _ = cmd;
        ControlResult::Unhandled
    }

    fn close(&mut self) {}

    /// Polled before a blocking I/O call; `true` aborts the call early.
    fn cancel_test(&self) -> bool {
        false
    }
}
