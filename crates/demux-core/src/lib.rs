// crates/demux-core/src/lib.rs
//
// Plain data shared between the cache engine and any producer implementation:
// packets, options, flags, control codes. No threading, no I/O, no ffmpeg.

pub mod control;
pub mod error;
pub mod options;
pub mod packet;
pub mod seek_flags;

pub use control::{CacheEvent, ControlCmd, ControlResult, MirrorEvents};
pub use error::{CacheError, ReaderState};
pub use options::CacheOptions;
pub use packet::{Packet, StreamKind, TimeRange};
pub use seek_flags::SeekFlags;
