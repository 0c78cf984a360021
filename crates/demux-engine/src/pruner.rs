// crates/demux-engine/src/pruner.rs
//
// §4.6: evicts oldest back-buffer packets once the global back-buffer byte
// budget is exceeded, never crossing a stream's reader cursor and
// preserving reachability of the nearest keyframe range so seek-range
// reporting stays correct.

use crate::queue::StreamQueue;

/// Run after every consumer dequeue. Mutates `queues` in place.
///
/// Panics if the total back-buffer byte count exceeds budget but no queue
/// can be pruned any further — per §7 this is a resource-invariant
/// violation (a programming error, not a recoverable condition), since a
/// positive `buffered` count means at least one queue must have evictable
/// packets at its head.
pub fn prune_back_buffer(queues: &mut [StreamQueue], max_bytes_bw: usize) {
    loop {
        let buffered: usize = queues.iter().map(|q| q.bw_bytes).sum();
        if buffered <= max_bytes_bw {
            return;
        }

        let victim = queues
            .iter()
            .enumerate()
            .filter(|(_, q)| q.bw_bytes > 0 && !q.is_empty())
            .min_by(|(_, a), (_, b)| {
                let ka = a.front_range_ts().unwrap_or(f64::NEG_INFINITY);
                let kb = b.front_range_ts().unwrap_or(f64::NEG_INFINITY);
                ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);

        let Some(i) = victim else {
            panic!("prune_back_buffer: back buffer over budget ({buffered} > {max_bytes_bw}) but no queue has an evictable packet");
        };

        let queue = &mut queues[i];
        let mut next_target = queue.next_seek_target_index(0);
        queue.back_pts = next_target.and_then(|idx| queue.recompute_keyframe_target_pts(idx));

        let mut evicted_any = false;
        while queue.reader_head_index() != Some(0) && next_target != Some(0) && !queue.is_empty() {
            queue.evict_front();
            next_target = next_target.map(|idx| idx.saturating_sub(1));
            evicted_any = true;
        }

        if !evicted_any {
            panic!("prune_back_buffer: selected victim queue {i} made no progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demux_core::{Packet, StreamKind};

    fn pkt(pts: f64, keyframe: bool, size: usize) -> Packet {
        let mut p = Packet::new(0, vec![0u8; size]);
        p.pts = Some(pts);
        p.dts = Some(pts);
        p.keyframe = keyframe;
        p
    }

    #[test]
    fn prunes_oldest_keyframe_range_first() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0.0, true, 36));
        q.append(pkt(1.0, true, 36));
        q.append(pkt(2.0, true, 36));
        q.dequeue();
        q.dequeue();
        let mut queues = [q];
        // each packet is 100 bytes (36 + PACKET_OVERHEAD); 150 only requires
        // evicting the single oldest one to get back under budget.
        prune_back_buffer(&mut queues, 150);
        assert_eq!(queues[0].bw_bytes, 100);
        assert_eq!(queues[0].back_pts, Some(1.0));
    }

    #[test]
    fn never_crosses_reader_head() {
        let mut q = StreamQueue::new(StreamKind::Video);
        q.append(pkt(0.0, true, 36));
        q.append(pkt(1.0, true, 36));
        // no dequeue: reader_head stays at 0, nothing is back-buffer
        let mut queues = [q];
        prune_back_buffer(&mut queues, 0);
        assert_eq!(queues[0].reader_head_index(), Some(0));
        assert_eq!(queues[0].len(), 2);
    }
}
