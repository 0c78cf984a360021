// crates/demux-engine/src/worker.rs
//
// ReadAheadWorker: the single thread that drives the Producer. §4.3's loop
// body lives in `step`; `run_loop` wraps it for the threaded case and
// `run_once` is the same body called inline by Cache's consumer-facing
// methods when the cache was built with `threaded: false` — both paths
// execute identical logic, so there is nothing threading-mode-specific to
// keep in sync.

use std::sync::Arc;
use std::time::Duration;

use demux_core::{CacheEvent, SeekFlags};

use crate::cache::{notify_shared, Cache, Shared};
use crate::seek_planner::plan_refresh_seek;

/// Spawn target for a threaded Cache.
pub(crate) fn run_loop(shared: Arc<Shared>) {
    loop {
        match step(&shared, true) {
            Action::Terminate => return,
            Action::Continue | Action::Waited => {}
        }
    }
}

/// Single inline iteration for an unthreaded Cache. Never blocks.
pub(crate) fn run_once(shared: &Arc<Shared>) {
    loop {
        match step(shared, false) {
            Action::Terminate | Action::Waited => return,
            Action::Continue => continue,
        }
    }
}

enum Action {
    Continue,
    Waited,
    Terminate,
}

fn step(shared: &Arc<Shared>, allow_block: bool) -> Action {
    let mut inner = shared.inner.lock().unwrap();

    if inner.thread_terminate {
        return Action::Terminate;
    }

    if let Some(cmd) = inner.pending_command.take() {
        cmd.run(&mut inner);
        drop(inner);
        shared.cv.notify_all();
        return Action::Continue;
    }

    if inner.tracks_switched {
        inner.tracks_switched = false;
        drop(inner);
        shared.cv.notify_all();
        return Action::Continue;
    }

    if inner.seeking {
        let pts = inner.seek_pts;
        let flags = inner.seek_flags;
        drop(inner);

        let result = shared.producer.lock().unwrap().seek(pts, flags);

        let mut inner = shared.inner.lock().unwrap();
        inner.seeking = false;
        inner.eof = false;
        inner.last_eof = false;
        if let Err(e) = result {
            eprintln!("[worker] real seek to {pts:.3}s failed: {e}");
        }
        drop(inner);
        shared.cv.notify_all();
        return Action::Continue;
    }

    if inner.force_cache_update {
        inner.force_cache_update = false;
        drop(inner);
        {
            let mut producer = shared.producer.lock().unwrap();
            let _ = producer.control(&demux_core::ControlCmd::GetCacheInfo);
            if let demux_core::ControlResult::Duration(Some(d)) =
                producer.control(&demux_core::ControlCmd::GetDuration)
            {
                shared.mirror.update_metadata(|m| m.duration = Some(d));
            }
        }
        shared.cv.notify_all();
        return Action::Continue;
    }

    if inner.eof {
        if allow_block {
            let _ = shared.cv.wait_timeout(inner, Duration::from_millis(500));
            return Action::Waited;
        }
        return Action::Waited;
    }

    let bytes: usize = inner.streams.iter().map(|q| q.fw_bytes).sum();
    if bytes >= inner.opts.max_bytes {
        let mut any_blocked = false;
        for q in inner.streams.iter_mut() {
            if !q.has_reader_head() {
                q.eof = true;
                any_blocked = true;
            }
        }
        if any_blocked && !inner.warned_queue_overflow {
            eprintln!(
                "[cache] forward buffer at capacity ({bytes} bytes) with an empty stream queue \
                 — raise demuxer-max-bytes or read faster"
            );
            inner.warned_queue_overflow = true;
        }
        drop(inner);
        shared.cv.notify_all();
        if any_blocked {
            notify_shared(shared, CacheEvent::QueueOverflow);
        }
        // Stop trying to read until a dequeue frees up forward-buffer room;
        // nothing about this condition changes on its own.
        if allow_block {
            let inner = shared.inner.lock().unwrap();
            let _ = shared.cv.wait_timeout(inner, Duration::from_millis(500));
        }
        return Action::Waited;
    }

    let readahead_target = inner.opts.readahead_secs + inner.opts.cache_secs;
    let active = inner.streams.iter().any(|q| q.active);
    let natural_read = active
        && inner.streams.iter().any(|q| {
            (q.active && !q.has_reader_head())
                || q.refreshing
                || matches!((q.last_ts, q.base_ts), (Some(l), Some(b)) if l - b < readahead_target)
        });

    let ref_pts = inner.ref_pts;
    let seekable_cache = inner.opts.seekable_cache;
    let refresh_pts = plan_refresh_seek(&mut inner.streams, ref_pts, seekable_cache);
    let read_more = natural_read || refresh_pts.is_some();

    if !read_more {
        if allow_block {
            let _ = shared.cv.wait_timeout(inner, Duration::from_millis(500));
            return Action::Waited;
        }
        return Action::Waited;
    }

    inner.idle = false;
    inner.initial_state = false;
    drop(inner);

    if let Some(pts) = refresh_pts {
        if let Err(e) = shared.producer.lock().unwrap().seek(pts, SeekFlags::empty()) {
            eprintln!("[worker] refresh seek to {pts:.3}s failed: {e}");
        }
    }

    let shared_for_sink = Arc::clone(shared);
    let n = {
        let mut producer = shared.producer.lock().unwrap();
        if producer.cancel_test() {
            drop(producer);
            if allow_block {
                let inner = shared.inner.lock().unwrap();
                let _ = shared.cv.wait_timeout(inner, Duration::from_millis(500));
            }
            return Action::Waited;
        }
        let mut sink = move |stream_index: usize, packet| {
            Cache::add_packet(&shared_for_sink, stream_index, packet);
        };
        producer.fill_buffer(&mut sink)
    };

    if n == 0 {
        let mut inner = shared.inner.lock().unwrap();
        let was_eof = inner.eof;
        let mut changed = false;
        for q in inner.streams.iter_mut() {
            if !q.ignore_eof && !q.eof {
                q.eof = true;
                changed = true;
            }
        }
        let all_eof = inner.streams.iter().all(|q| q.ignore_eof || q.eof);
        if all_eof {
            inner.eof = true;
            inner.last_eof = true;
        }
        drop(inner);
        if changed {
            shared.cv.notify_all();
        }
        if !was_eof && all_eof {
            notify_shared(shared, CacheEvent::Eof);
        }
    }

    Action::Continue
}
