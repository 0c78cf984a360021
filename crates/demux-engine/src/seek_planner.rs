// crates/demux-engine/src/seek_planner.rs
//
// §4.4/§4.5: choosing between in-cache seek and a real Producer.seek, and
// deciding whether a newly selected stream needs a refresh-seek to recover
// packets it missed while deselected.

use demux_core::{Packet, SeekFlags, StreamKind};

use crate::queue::StreamQueue;

/// §4.5 `find_seek_target`. Walks every keyframe range in `queue`, scoring
/// each by `range_pts - pts`, and returns the packet index to move the
/// cursor to. `None` means "no reachable keyframe range" — the caller falls
/// back to `skip_to_keyframe`.
///
/// Uses three running best-candidates instead of a single NOPTS-valued diff
/// so the first valid keyframe always wins regardless of its diff's sign
/// (see the Open Question decision in DESIGN.md).
pub fn find_seek_target(queue: &StreamQueue, pts: f64, flags: SeekFlags) -> Option<usize> {
    let mut best_nonneg: Option<(f64, usize)> = None; // smallest diff >= 0
    let mut best_le: Option<(f64, usize)> = None; // largest diff <= 0
    let mut best_gt: Option<(f64, usize)> = None; // smallest diff > 0

    for (idx, _) in queue.iter_keyframe_candidates() {
        let Some(range_pts) = queue.recompute_keyframe_target_pts(idx) else {
            continue;
        };
        let diff = range_pts - pts;

        if diff >= 0.0 && best_nonneg.map_or(true, |(d, _)| diff < d) {
            best_nonneg = Some((diff, idx));
        }
        if diff > 0.0 && best_gt.map_or(true, |(d, _)| diff < d) {
            best_gt = Some((diff, idx));
        }
        if diff <= 0.0 && best_le.map_or(true, |(d, _)| diff > d) {
            best_le = Some((diff, idx));
        }
    }

    if flags.contains(SeekFlags::FORWARD) {
        best_nonneg.map(|(_, idx)| idx)
    } else {
        best_le.or(best_gt).map(|(_, idx)| idx)
    }
}

/// §4.5 in-cache seek. `queues` are every registered stream; only selected
/// ones gate the attempt. `range` is the currently reported contiguous
/// in-cache seek range in the *internal* (no ts_offset) timebase.
///
/// On success every queue has had its cursor moved and byte counters
/// recomputed; on failure nothing is mutated.
pub fn try_seek_cache(
    queues: &mut [StreamQueue],
    range: Option<(f64, f64)>,
    pts: f64,
    flags: SeekFlags,
) -> bool {
    let Some((start, end)) = range else { return false };
    if pts < start || pts > end {
        return false;
    }

    // Unless hr-seek accuracy was requested, snap the requested pts onto the
    // primary video queue's actual keyframe choice so every stream agrees on
    // exactly which frame boundary the seek landed on.
    let mut effective_pts = pts;
    let mut effective_flags = flags;
    if !flags.contains(SeekFlags::HR) {
        if let Some(video) = queues.iter().find(|q| q.selected && q.kind == StreamKind::Video) {
            if let Some(idx) = find_seek_target(video, pts, flags) {
                if let Some(ts) = video.range_ts_at(idx) {
                    effective_pts = ts;
                    effective_flags.remove(SeekFlags::FORWARD);
                }
            }
        }
    }

    for queue in queues.iter_mut() {
        let target = find_seek_target(queue, effective_pts, effective_flags);
        queue.seek_cursor_to(target);
    }
    true
}

/// §4.4 `get_refresh_seek_pts`, run under the worker's lock. Returns the pts
/// to seek the producer to, or `None` if no refresh is needed or possible.
/// Marks `refreshing` on queues that can resume mid-stream via DTS/pos
/// monotonicity instead of restarting from scratch.
pub fn plan_refresh_seek(
    queues: &mut [StreamQueue],
    ref_pts: Option<f64>,
    seekable: bool,
) -> Option<f64> {
    let mut start_ts = ref_pts;
    let mut needed = false;
    let mut normal = true;
    let mut possible = true;
    let mut any_selected = false;

    for queue in queues.iter() {
        if !queue.selected {
            continue;
        }
        any_selected = true;
        if matches!(queue.kind, StreamKind::Video | StreamKind::Audio) {
            if let Some(base) = queue.base_ts {
                start_ts = Some(start_ts.map_or(base, |s: f64| s.min(base)));
            }
        }
        if queue.need_refresh {
            needed = true;
        } else {
            normal = false;
        }
        if !(queue.correct_dts || queue.correct_pos) {
            possible = false;
        }
    }

    for queue in queues.iter_mut() {
        queue.need_refresh = false;
    }

    if !any_selected || !needed || !seekable {
        return None;
    }
    let start_ts = start_ts?;

    if normal {
        return Some(start_ts);
    }
    if possible {
        for queue in queues.iter_mut() {
            if queue.selected && (queue.last_dts.is_some() || queue.last_pos.is_some()) {
                queue.refreshing = true;
            }
        }
        return Some(start_ts - 1.0);
    }

    eprintln!("[seek] can't issue refresh seek: no monotonic dts/pos on a selected stream");
    None
}

/// §4.1 step 1: whether a packet arriving while `refreshing` resumes
/// delivery or is still catching up to the previous position.
pub fn refresh_resume_test(queue: &StreamQueue, packet: &Packet) -> RefreshTest {
    if queue.correct_dts {
        match (packet.dts, queue.last_dts) {
            (Some(dts), Some(last)) if dts >= last => RefreshTest::Resume,
            (Some(_), Some(_)) => RefreshTest::StillCatchingUp,
            _ => RefreshTest::Abandon,
        }
    } else if queue.correct_pos {
        match (packet.pos, queue.last_pos) {
            (Some(pos), Some(last)) if pos >= last => RefreshTest::Resume,
            (Some(_), Some(_)) => RefreshTest::StillCatchingUp,
            _ => RefreshTest::Abandon,
        }
    } else {
        RefreshTest::Abandon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTest {
    Resume,
    StillCatchingUp,
    Abandon,
}

#[cfg(test)]
mod tests {
    use super::*;
    use demux_core::StreamKind;

    fn pkt(pts: f64, keyframe: bool) -> Packet {
        let mut p = Packet::new(0, vec![0u8; 4]);
        p.pts = Some(pts);
        p.dts = Some(pts);
        p.keyframe = keyframe;
        p
    }

    #[test]
    fn find_seek_target_prefers_largest_diff_le_zero() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0.0, true));
        q.append(pkt(2.0, true));
        q.append(pkt(4.0, true));
        // seeking to 3.0 backward should land on the 2.0 keyframe
        let idx = find_seek_target(&q, 3.0, SeekFlags::empty());
        assert_eq!(q.range_ts_at(idx.unwrap()), Some(2.0));
    }

    #[test]
    fn find_seek_target_forward_picks_smallest_diff_ge_zero() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0.0, true));
        q.append(pkt(2.0, true));
        q.append(pkt(4.0, true));
        let idx = find_seek_target(&q, 3.0, SeekFlags::FORWARD);
        assert_eq!(q.range_ts_at(idx.unwrap()), Some(4.0));
    }

    #[test]
    fn try_seek_cache_rejects_out_of_range_target() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0.0, true));
        q.append(pkt(5.0, true));
        let mut queues = [q];
        assert!(!try_seek_cache(&mut queues, Some((0.0, 5.0)), 20.0, SeekFlags::empty()));
    }
}
