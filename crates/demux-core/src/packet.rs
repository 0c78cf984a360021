// crates/demux-core/src/packet.rs
//
// The Packet value type and the stream-kind tag. A Packet is immutable once
// queued; the cache delivers a clone to the consumer so the consumer can do
// whatever it wants with it.

/// Per-packet byte-range validity window. Timestamps outside `[start, end]`
/// are treated as absent (NOPTS) by the queue logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn contains(&self, ts: f64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// What kind of elementary stream a packet/queue belongs to. `Subtitle` also
/// covers the synthetic closed-caption sidecar streams (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Unknown,
}

/// One compressed access unit handed from a Producer to the Cache.
///
/// `pts`/`dts`/`pos` use `None` in place of the NOPTS sentinel. `total_size`
/// is what budgeting (`fw_bytes`/`bw_bytes`/`max_bytes`) actually counts —
/// it is `data.len()` plus a small fixed per-packet bookkeeping overhead, so
/// a stream of many tiny packets can't exceed a byte budget through
/// allocator/metadata overhead alone.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Vec<u8>,
    pub pts: Option<f64>,
    pub dts: Option<f64>,
    pub pos: Option<i64>,
    pub keyframe: bool,
    pub segmented: Option<TimeRange>,
}

/// Fixed per-packet overhead counted toward byte budgets, matching the
/// producer-adapter's own AVPacket-sized estimate.
const PACKET_OVERHEAD: usize = 64;

impl Packet {
    pub fn new(stream_index: usize, data: Vec<u8>) -> Self {
        Packet {
            stream_index,
            data,
            pts: None,
            dts: None,
            pos: None,
            keyframe: false,
            segmented: None,
        }
    }

    pub fn total_size(&self) -> usize {
        self.data.len() + PACKET_OVERHEAD
    }

    /// Timestamp used for ordering/range decisions: pts if present, else dts,
    /// clamped to the segmented validity window when one is set.
    pub fn range_ts(&self) -> Option<f64> {
        let ts = self.pts.or(self.dts)?;
        match self.segmented {
            Some(range) if !range.contains(ts) => None,
            _ => Some(ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_ts_falls_back_to_dts_without_pts() {
        let mut p = Packet::new(0, vec![]);
        p.dts = Some(1.5);
        assert_eq!(p.range_ts(), Some(1.5));
    }

    #[test]
    fn range_ts_is_none_outside_segmented_window() {
        let mut p = Packet::new(0, vec![]);
        p.pts = Some(5.0);
        p.segmented = Some(TimeRange { start: 0.0, end: 2.0 });
        assert_eq!(p.range_ts(), None);
    }

    #[test]
    fn total_size_includes_overhead() {
        let p = Packet::new(0, vec![0u8; 100]);
        assert_eq!(p.total_size(), 164);
    }
}
