// crates/demux-engine/src/lib.rs

mod command;
mod mirror;
mod pruner;
mod queue;
mod seek_planner;
mod worker;

pub mod cache;
pub mod producer;

pub use cache::Cache;
pub use mirror::{CacheSnapshot, InitInfo, Metadata};
pub use producer::{CheckLevel, PacketSink, Producer};

pub use demux_core::{
    CacheError, CacheEvent, CacheOptions, ControlCmd, ControlResult, MirrorEvents, Packet,
    ReaderState, SeekFlags, StreamKind, TimeRange,
};
