// crates/demux-engine/src/queue.rs
//
// StreamQueue: one stream's packet FIFO split into back-buffer (already
// delivered or not yet reachable) and forward-buffer (queued ahead of the
// consumer's cursor). The cursor is `reader_head`, a logical index into an
// owned VecDeque rather than the intrusive list + raw pointer the cache this
// is modeled on uses — there's a single owner, so an index is enough.

use std::collections::VecDeque;

use demux_core::{Packet, StreamKind};

const TIMESTAMP_RESET_SECS: f64 = 10.0;
const BITRATE_WINDOW_SECS: f64 = 0.5;

pub struct StreamQueue {
    pub kind: StreamKind,
    pub selected: bool,
    pub active: bool,
    pub eof: bool,
    pub need_refresh: bool,
    pub refreshing: bool,
    pub correct_dts: bool,
    pub correct_pos: bool,
    pub last_dts: Option<f64>,
    pub last_pos: Option<i64>,

    packets: VecDeque<Packet>,
    /// Index of the first forward-buffer packet in `packets`. `None` means
    /// every queued packet is back-buffer (consumer has read through the
    /// whole queue, or nothing has been delivered from it yet).
    reader_head: Option<usize>,

    pub fw_packs: usize,
    pub fw_bytes: usize,
    pub bw_bytes: usize,

    pub last_ts: Option<f64>,
    pub base_ts: Option<f64>,
    pub back_pts: Option<f64>,

    last_br_ts: Option<f64>,
    last_br_bytes: usize,
    pub bitrate: i64,

    pub skip_to_keyframe: bool,

    attached_picture: Option<Packet>,
    attached_picture_delivered: bool,

    pub ignore_eof: bool,
    pub cc: Option<usize>,
    pub default_track: bool,
}

/// What happened to a packet handed to `StreamQueue::append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Queued { first_forward: bool },
    Dropped,
}

impl StreamQueue {
    pub fn new(kind: StreamKind) -> Self {
        StreamQueue {
            kind,
            selected: false,
            active: false,
            eof: false,
            need_refresh: false,
            refreshing: false,
            correct_dts: true,
            correct_pos: true,
            last_dts: None,
            last_pos: None,
            packets: VecDeque::new(),
            reader_head: None,
            fw_packs: 0,
            fw_bytes: 0,
            bw_bytes: 0,
            last_ts: None,
            base_ts: None,
            back_pts: None,
            last_br_ts: None,
            last_br_bytes: 0,
            bitrate: 0,
            skip_to_keyframe: false,
            attached_picture: None,
            attached_picture_delivered: false,
            ignore_eof: false,
            cc: None,
            default_track: false,
        }
    }

    pub fn set_attached_picture(&mut self, packet: Packet) {
        self.attached_picture = Some(packet);
        self.attached_picture_delivered = false;
    }

    pub fn has_reader_head(&self) -> bool {
        self.reader_head.is_some()
    }

    /// §4.1 step 9: update `last_ts` with the asymmetric reset window.
    /// Isolated behind this helper (per the Open Question decision recorded
    /// in DESIGN.md) so the 10s window can be retuned without touching
    /// call sites.
    fn update_last_ts(&mut self, ts: f64) {
        match self.last_ts {
            Some(prev) if ts + TIMESTAMP_RESET_SECS < prev => self.last_ts = Some(ts),
            Some(prev) if ts > prev => self.last_ts = Some(ts),
            None => self.last_ts = Some(ts),
            _ => {}
        }
    }

    /// §4.1: append a packet that survived the refresh/selection gate above
    /// this call (the cache-level `add_packet` is the caller and owns that
    /// gating plus the refresh-resume test).
    pub fn append(&mut self, mut packet: Packet) -> AppendOutcome {
        // step 3: monotonicity tracking
        match packet.pos {
            Some(pos) if self.last_pos.map_or(true, |lp| pos > lp) && pos >= 0 => {
                self.last_pos = Some(pos);
            }
            _ => self.correct_pos = false,
        }
        match packet.dts {
            Some(dts) if self.last_dts.map_or(true, |ld| dts > ld) => {
                self.last_dts = Some(dts);
            }
            _ => self.correct_dts = false,
        }

        // non-video streams with no pts borrow dts (step 8)
        if packet.pts.is_none() && self.kind != StreamKind::Video {
            packet.pts = packet.dts;
        }

        let size = packet.total_size();
        let is_keyframe = packet.keyframe;

        // step 4: decide the split
        let becomes_forward_head = self.reader_head.is_none()
            && (!self.skip_to_keyframe || is_keyframe);
        if becomes_forward_head {
            self.skip_to_keyframe = false;
        }

        self.packets.push_back(packet);
        let idx = self.packets.len() - 1;

        if becomes_forward_head {
            self.reader_head = Some(idx);
        }

        if self.reader_head.is_some() {
            self.fw_packs += 1;
            self.fw_bytes += size;
        } else {
            self.bw_bytes += size;
        }

        // step 6: seed back_pts from the first reachable keyframe range
        if self.back_pts.is_none() && is_keyframe {
            if let Some(target) = self.recompute_keyframe_target_pts(0) {
                self.back_pts = Some(target);
            }
        }

        // step 9 / 10
        if let Some(ts) = self.packets.back().and_then(Packet::range_ts) {
            self.update_last_ts(ts);
            if self.base_ts.is_none() {
                self.base_ts = self.last_ts;
            }
        }

        AppendOutcome::Queued { first_forward: becomes_forward_head }
    }

    /// §4.2: pop the next forward packet for the consumer. Does not remove
    /// it from the underlying deque — it becomes part of the back buffer,
    /// reachable again by a later in-cache seek.
    pub fn dequeue(&mut self) -> Option<Packet> {
        if let Some(pic) = &self.attached_picture {
            if !self.attached_picture_delivered {
                self.attached_picture_delivered = true;
                self.eof = true;
                return Some(pic.clone());
            }
            return None;
        }

        let head = self.reader_head?;
        let packet = self.packets[head].clone();
        let size = packet.total_size();

        self.reader_head = if head + 1 < self.packets.len() {
            Some(head + 1)
        } else {
            None
        };
        self.fw_packs -= 1;
        self.fw_bytes -= size;
        self.bw_bytes += size;

        self.base_ts = packet.range_ts().or(self.base_ts);

        if packet.keyframe {
            self.update_bitrate(packet.range_ts(), size);
        }

        Some(packet)
    }

    fn update_bitrate(&mut self, ts: Option<f64>, size: usize) {
        let Some(ts) = ts else { return };
        match self.last_br_ts {
            Some(prev) if ts > prev => {
                let dt = ts - prev;
                if dt >= BITRATE_WINDOW_SECS {
                    let bytes = self.last_br_bytes + size;
                    self.bitrate = (bytes as f64 * 8.0 / dt) as i64;
                    self.last_br_ts = Some(ts);
                    self.last_br_bytes = 0;
                } else {
                    self.last_br_bytes += size;
                }
            }
            _ => {
                self.last_br_ts = Some(ts);
                self.last_br_bytes = size;
            }
        }
    }

    /// §4.6: scan forward from `from_idx`, enter the first keyframe range
    /// reached, and return the minimum range timestamp within that range
    /// (exclusive of the next keyframe).
    pub fn recompute_keyframe_target_pts(&self, from_idx: usize) -> Option<f64> {
        let mut iter = self.packets.iter().skip(from_idx);
        // advance to the first keyframe
        let first_kf = loop {
            match iter.next() {
                Some(p) if p.keyframe => break p,
                Some(_) => continue,
                None => return None,
            }
        };
        let mut min_ts = first_kf.range_ts();
        for p in iter {
            if p.keyframe {
                break;
            }
            if let Some(ts) = p.range_ts() {
                min_ts = Some(min_ts.map_or(ts, |m: f64| m.min(ts)));
            }
        }
        min_ts
    }

    /// Index (into the internal deque) of the next keyframe strictly after
    /// `after_idx` whose range target is known. Used by the pruner.
    pub fn next_seek_target_index(&self, after_idx: usize) -> Option<usize> {
        for (i, p) in self.packets.iter().enumerate().skip(after_idx + 1) {
            if p.keyframe && self.recompute_keyframe_target_pts(i).is_some() {
                return Some(i);
            }
        }
        None
    }

    /// Drop the oldest back-buffer packet (index 0), shifting every
    /// remaining index down by one. Caller is responsible for stopping
    /// before crossing `reader_head` or a preserved seek target.
    pub fn evict_front(&mut self) -> Option<usize> {
        let packet = self.packets.pop_front()?;
        self.bw_bytes -= packet.total_size();
        self.reader_head = self.reader_head.map(|h| h - 1);
        Some(packet.total_size())
    }

    pub fn front_range_ts(&self) -> Option<f64> {
        self.packets.front().and_then(Packet::range_ts)
    }

    pub fn reader_head_index(&self) -> Option<usize> {
        self.reader_head
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Clear all queued packets and demux state. Used on seek and deselect —
    /// `back_pts`/`last_ts`/`base_ts` must drop too, or a seek to a new
    /// position would keep reporting the old one's range forever (`back_pts`
    /// only ever reseeds itself from `None`).
    pub fn clear(&mut self) {
        self.packets.clear();
        self.reader_head = None;
        self.fw_packs = 0;
        self.fw_bytes = 0;
        self.bw_bytes = 0;
        self.last_dts = None;
        self.last_pos = None;
        self.correct_dts = true;
        self.correct_pos = true;
        self.refreshing = false;
        self.need_refresh = false;
        self.skip_to_keyframe = false;
        self.eof = false;
        self.back_pts = None;
        self.last_ts = None;
        self.base_ts = None;
    }

    /// §4.5 in-cache seek: move the cursor to `target_idx` (or clear it for
    /// "no exact target, skip to next keyframe"), recomputing fw/bw byte
    /// counts by walking the full list once.
    pub fn seek_cursor_to(&mut self, target_idx: Option<usize>) {
        self.reader_head = target_idx;
        self.skip_to_keyframe = target_idx.is_none();
        self.fw_packs = 0;
        self.fw_bytes = 0;
        self.bw_bytes = 0;
        for (i, p) in self.packets.iter().enumerate() {
            let size = p.total_size();
            match target_idx {
                Some(h) if i >= h => {
                    self.fw_packs += 1;
                    self.fw_bytes += size;
                }
                _ => self.bw_bytes += size,
            }
        }
    }

    pub fn iter_keyframe_candidates(&self) -> impl Iterator<Item = (usize, &Packet)> {
        self.packets.iter().enumerate().filter(|(_, p)| p.keyframe)
    }

    pub fn range_ts_at(&self, idx: usize) -> Option<f64> {
        self.packets.get(idx).and_then(Packet::range_ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demux_core::Packet;

    fn pkt(stream: usize, pts: f64, keyframe: bool) -> Packet {
        let mut p = Packet::new(stream, vec![0u8; 10]);
        p.pts = Some(pts);
        p.dts = Some(pts);
        p.keyframe = keyframe;
        p
    }

    #[test]
    fn first_keyframe_becomes_reader_head() {
        let mut q = StreamQueue::new(StreamKind::Video);
        assert!(!q.has_reader_head());
        let outcome = q.append(pkt(0, 0.0, true));
        assert_eq!(outcome, AppendOutcome::Queued { first_forward: true });
        assert!(q.has_reader_head());
        assert_eq!(q.fw_packs, 1);
        assert_eq!(q.bw_bytes, 0);
    }

    #[test]
    fn dequeue_moves_packet_to_back_buffer_without_removing_it() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0, 0.0, true));
        q.append(pkt(0, 1.0, false));
        let first = q.dequeue().unwrap();
        assert_eq!(first.pts, Some(0.0));
        assert_eq!(q.fw_packs, 1);
        assert_eq!(q.len(), 2); // still both packets present
        assert!(q.bw_bytes > 0);
    }

    #[test]
    fn fw_bw_bytes_sum_matches_total_size_invariant() {
        let mut q = StreamQueue::new(StreamKind::Audio);
        for i in 0..5 {
            q.append(pkt(0, i as f64, true));
        }
        q.dequeue();
        q.dequeue();
        let total: usize = (0..5).map(|_| pkt(0, 0.0, true).total_size()).sum();
        assert_eq!(q.fw_bytes + q.bw_bytes, total);
    }

    #[test]
    fn keyframe_range_takes_minimum_ts_until_next_keyframe() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0, 2.0, true)); // idx 0: keyframe, but decode order reorders pts
        q.append(pkt(0, 0.5, false)); // idx 1: lower pts, same range
        q.append(pkt(0, 1.0, false)); // idx 2
        q.append(pkt(0, 5.0, true)); // idx 3: next keyframe, ends the range
        assert_eq!(q.recompute_keyframe_target_pts(0), Some(0.5));
    }

    #[test]
    fn evict_front_shifts_reader_head_down() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0, 0.0, true));
        q.append(pkt(0, 1.0, true));
        q.dequeue(); // reader_head now at idx 1
        assert_eq!(q.reader_head_index(), Some(1));
        q.evict_front(); // drops idx 0
        assert_eq!(q.reader_head_index(), Some(0));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn timestamp_reset_window_replaces_spurious_outlier() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0, 100.0, true));
        assert_eq!(q.last_ts, Some(100.0));
        // a packet whose ts is more than 10s behind resets rather than being ignored
        q.append(pkt(0, 5.0, false));
        assert_eq!(q.last_ts, Some(5.0));
    }
}
