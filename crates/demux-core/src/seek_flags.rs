// crates/demux-core/src/seek_flags.rs

use bitflags::bitflags;

bitflags! {
    /// Flags passed to `Cache::seek` / `Producer::seek`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SeekFlags: u32 {
        /// Seek to the first valid position at or after the target instead
        /// of the nearest one before it.
        const FORWARD = 1 << 0;
        /// Require "hr-seek" accuracy: don't let the cache silently snap the
        /// requested pts to a keyframe boundary before planning the seek.
        const HR = 1 << 1;
        /// Seek relative to the current position instead of absolute.
        const FACTOR = 1 << 2;
    }
}

impl Default for SeekFlags {
    fn default() -> Self {
        SeekFlags::empty()
    }
}
