// crates/demux-engine/src/cache.rs
//
// The Cache: a collection of StreamQueues plus the global seek/selection
// state, guarded by exactly one mutex, with one condvar for worker/consumer
// handoff (§5). This is the type an embedder constructs and calls into;
// ReadAheadWorker owns the thread that drives the Producer on the other
// side of the same lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use demux_core::{
    CacheError, CacheEvent, CacheOptions, ControlCmd, ControlResult, MirrorEvents, Packet,
    ReaderState, SeekFlags, StreamKind,
};

use crate::command::Command;
use crate::mirror::{InitInfo, StateMirror};
use crate::producer::Producer;
use crate::pruner::prune_back_buffer;
use crate::queue::StreamQueue;
use crate::seek_planner::{refresh_resume_test, try_seek_cache, RefreshTest};
use crate::worker::run_once;

pub(crate) struct Inner {
    pub streams: Vec<StreamQueue>,
    pub opts: CacheOptions,
    pub ts_offset: f64,

    pub seeking: bool,
    pub seek_pts: f64,
    pub seek_flags: SeekFlags,
    pub ref_pts: Option<f64>,
    pub tracks_switched: bool,
    pub force_cache_update: bool,

    pub eof: bool,
    pub last_eof: bool,
    pub idle: bool,
    pub initial_state: bool,
    pub warned_queue_overflow: bool,
    pub filepos: Option<i64>,

    pub thread_terminate: bool,
    pub pending_command: Option<Command>,
}

impl Inner {
    fn underrun(&self) -> bool {
        self.streams
            .iter()
            .any(|q| q.active && !q.has_reader_head() && !q.eof)
    }

    /// §4.8 reader-state query, internal timebase.
    fn reader_state_internal(&self) -> (bool, bool, Option<f64>, Option<f64>, Option<f64>) {
        let active: Vec<&StreamQueue> = self.streams.iter().filter(|q| q.active).collect();
        let ts_reader = active.iter().filter_map(|q| q.base_ts).fold(None, max_opt);
        let ts_max = self.streams.iter().filter_map(|q| q.last_ts).fold(None, max_opt);
        let ts_min = self.streams.iter().filter_map(|q| q.back_pts).fold(None, max_opt);
        (self.last_eof, self.underrun(), ts_reader, ts_max, ts_min)
    }

    pub(crate) fn seek_range(&self) -> Option<(f64, f64)> {
        if !self.opts.seekable_cache || self.seeking {
            return None;
        }
        let selected: Vec<&StreamQueue> = self.streams.iter().filter(|q| q.selected).collect();
        if selected.is_empty() {
            return None;
        }
        let mut min_ts = None;
        let mut max_ts = None;
        for q in &selected {
            let (Some(back), Some(last)) = (q.back_pts, q.last_ts) else {
                return None;
            };
            min_ts = Some(min_ts.map_or(back, |m: f64| m.max(back)));
            max_ts = Some(max_ts.map_or(last, |m: f64| m.max(last)));
        }
        Some((min_ts?, max_ts?))
    }

    pub(crate) fn reader_state(&self) -> ReaderState {
        let (eof, underrun, ts_reader, ts_max, ts_min) = self.reader_state_internal();
        let idle = (self.idle && !underrun) || eof;
        let ts_duration = match (ts_reader, ts_max) {
            (Some(r), Some(m)) if !self.seeking => (m - r).max(0.0),
            _ => 0.0,
        };
        ReaderState {
            eof,
            idle,
            underrun,
            ts_reader: ts_reader.map(|t| t + self.ts_offset),
            ts_max: ts_max.map(|t| t + self.ts_offset),
            ts_min: ts_min.map(|t| t + self.ts_offset),
            ts_duration,
            seek_range: self.seek_range().map(|(a, b)| (a + self.ts_offset, b + self.ts_offset)),
        }
    }
}

fn max_opt(acc: Option<f64>, x: f64) -> Option<f64> {
    Some(acc.map_or(x, |a: f64| a.max(x)))
}

/// Invoke the registered wakeup callback, if any. Callers must not hold
/// `shared.inner`'s lock (§5) — the callback may call back into `Cache`.
pub(crate) fn notify_shared(shared: &Shared, event: CacheEvent) {
    if let Some(cb) = shared.wakeup_cb.lock().unwrap().as_ref() {
        cb(event);
    }
}

type WakeupCb = Box<dyn Fn(CacheEvent) + Send + Sync>;

pub(crate) struct Shared {
    pub inner: Mutex<Inner>,
    pub cv: Condvar,
    pub producer: Mutex<Box<dyn Producer>>,
    pub wakeup_cb: Mutex<Option<WakeupCb>>,
    pub mirror: StateMirror,
    pub threaded: AtomicBool,
}

/// The public handle. Cheap to clone (it's an `Arc`); every clone shares the
/// same lock, queues, and worker thread.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
    worker_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Cache {
    /// Build a cache over `producer`, spawning the read-ahead worker thread
    /// unless `threaded` is false, in which case every consumer call runs
    /// one worker iteration inline (§4.3) and no thread is created.
    pub fn new(mut producer: Box<dyn Producer>, opts: CacheOptions, threaded: bool) -> Result<Self, CacheError> {
        use crate::producer::CheckLevel;
        let kinds = producer.open(CheckLevel::Full)?;

        let mut streams = Vec::with_capacity(kinds.len());
        let mut stream_kinds = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let mut queue = StreamQueue::new(kind);
            queue.selected = opts.autoselect;
            queue.active = queue.selected;
            stream_kinds.push(kind);
            streams.push(queue);
        }

        let base_filename = match producer.control(&ControlCmd::GetBaseFilename) {
            ControlResult::BaseFilename(name) => name,
            _ => None,
        };
        let size = match producer.control(&ControlCmd::GetSize) {
            ControlResult::Size(size) => size,
            _ => None,
        };
        let duration = match producer.control(&ControlCmd::GetDuration) {
            ControlResult::Duration(d) => d,
            _ => None,
        };
        let seekable = opts.force_seekable
            || matches!(producer.control(&ControlCmd::GetSeekable), ControlResult::Seekable(true));

        let inner = Inner {
            streams,
            opts,
            ts_offset: 0.0,
            seeking: false,
            seek_pts: 0.0,
            seek_flags: SeekFlags::empty(),
            ref_pts: None,
            tracks_switched: false,
            force_cache_update: false,
            eof: false,
            last_eof: false,
            idle: true,
            initial_state: true,
            warned_queue_overflow: false,
            filepos: None,
            thread_terminate: false,
            pending_command: None,
        };

        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            cv: Condvar::new(),
            producer: Mutex::new(producer),
            wakeup_cb: Mutex::new(None),
            mirror: StateMirror::new(InitInfo {
                stream_kinds,
                seekable,
                base_filename,
                size,
            }),
            threaded: AtomicBool::new(threaded),
        });

        if duration.is_some() {
            shared.mirror.update_metadata(|m| m.duration = duration);
        }

        let worker_handle = if threaded {
            let worker_shared = Arc::clone(&shared);
            Some(std::thread::spawn(move || crate::worker::run_loop(worker_shared)))
        } else {
            None
        };

        Ok(Cache {
            shared,
            worker_handle: Arc::new(Mutex::new(worker_handle)),
        })
    }

    pub fn set_wakeup_callback(&self, cb: impl Fn(CacheEvent) + Send + Sync + 'static) {
        *self.shared.wakeup_cb.lock().unwrap() = Some(Box::new(cb));
    }

    fn notify(&self, event: CacheEvent) {
        notify_shared(&self.shared, event);
    }

    fn run_inline_step_if_untreaded(&self) {
        if !self.shared.threaded.load(Ordering::Relaxed) {
            run_once(&self.shared);
        }
    }

    /// Register a new stream. Must happen during the producer's init phase —
    /// stream index/kind are immutable after the cache starts delivering
    /// packets.
    pub fn add_stream(&self, kind: StreamKind) -> usize {
        let mut inner = self.shared.inner.lock().unwrap();
        let mut queue = StreamQueue::new(kind);
        queue.selected = inner.opts.autoselect;
        queue.active = queue.selected;
        let create_cc = inner.opts.sub_create_cc_track && kind == StreamKind::Video;
        inner.streams.push(queue);
        let idx = inner.streams.len() - 1;

        if create_cc {
            let mut cc = StreamQueue::new(StreamKind::Subtitle);
            cc.ignore_eof = true;
            cc.default_track = true;
            cc.selected = inner.opts.autoselect;
            cc.active = cc.selected;
            inner.streams.push(cc);
            let cc_idx = inner.streams.len() - 1;
            inner.streams[idx].cc = Some(cc_idx);
        }

        let stream_kinds: Vec<StreamKind> = inner.streams.iter().map(|q| q.kind).collect();
        drop(inner);

        let mut snapshot = (*self.shared.mirror.current()).clone();
        snapshot.init.stream_kinds = stream_kinds;
        self.shared.mirror.publish(snapshot, MirrorEvents::STREAMS);

        self.notify(CacheEvent::StreamAdded(idx));
        idx
    }

    /// §4.7: feed a closed-caption packet extracted from `source_stream`,
    /// lazily allocating the sidecar subtitle queue on first use. The
    /// sidecar is marked `ignore_eof` so a caption-free tail of the source
    /// stream never holds back global EOF, and timestamps are rebased to
    /// the producer's internal timebase before appending (callers work in
    /// the offset-applied external timebase everywhere else).
    pub fn add_caption_packet(&self, source_stream: usize, mut packet: Packet) {
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(_) = inner.streams.get(source_stream) else { return };

        let cc_index = match inner.streams[source_stream].cc {
            Some(idx) => idx,
            None => {
                let mut queue = StreamQueue::new(StreamKind::Subtitle);
                queue.ignore_eof = true;
                queue.default_track = true;
                queue.selected = inner.opts.autoselect;
                queue.active = queue.selected;
                inner.streams.push(queue);
                let idx = inner.streams.len() - 1;
                inner.streams[source_stream].cc = Some(idx);
                idx
            }
        };

        let ts_offset = inner.ts_offset;
        packet.pts = packet.pts.map(|t| t - ts_offset);
        packet.dts = packet.dts.map(|t| t - ts_offset);
        inner.streams[cc_index].append(packet);
        drop(inner);
        self.shared.cv.notify_all();
    }

    /// Attach a single still-image packet (e.g. an embedded cover-art frame)
    /// to `stream`, delivered once as that stream's only packet regardless of
    /// how many times the consumer dequeues from it. Queued as a command so
    /// it runs on the worker's turn rather than racing a concurrent
    /// `fill_buffer` dispatch touching the same queue.
    pub fn set_attached_picture(&self, stream: usize, packet: Packet) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.pending_command = Some(Command::RunWithInner(Box::new(move |inner| {
            if let Some(queue) = inner.streams.get_mut(stream) {
                queue.set_attached_picture(packet);
            }
        })));
        drop(inner);
        self.shared.cv.notify_all();
        self.run_inline_step_if_untreaded();
    }

    /// §4.1 `add_packet`, called by the Producer (with the lock held, by
    /// construction — it's only ever invoked from inside `fill_buffer`,
    /// which the worker calls with the lock released around it, but the
    /// sink closure itself re-takes the lock for each packet so producers
    /// can call it from a plain loop).
    pub(crate) fn add_packet(shared: &Arc<Shared>, stream_index: usize, packet: Packet) {
        let mut inner = shared.inner.lock().unwrap();
        let seeking = inner.seeking;
        let Some(queue) = inner.streams.get_mut(stream_index) else { return };

        if queue.refreshing {
            match refresh_resume_test(queue, &packet) {
                RefreshTest::StillCatchingUp => return,
                RefreshTest::Abandon => queue.refreshing = false,
                RefreshTest::Resume => queue.refreshing = false,
            }
        }

        if !queue.selected || queue.need_refresh || seeking {
            return;
        }

        let clear_eof = !queue.ignore_eof;
        if clear_eof {
            queue.eof = false;
        }

        let was_empty = !queue.has_reader_head();
        let outcome = queue.append(packet);

        if clear_eof {
            inner.eof = false;
            inner.last_eof = false;
        }

        drop(inner);
        shared.cv.notify_all();

        if let crate::queue::AppendOutcome::Queued { first_forward: true } = outcome {
            if was_empty {
                notify_shared(shared, CacheEvent::PacketAvailable(stream_index));
            }
        }
    }

    pub fn select_track(
        &self,
        stream: usize,
        selected: bool,
        ref_pts: Option<f64>,
    ) -> Result<(), CacheError> {
        let mut inner = self.shared.inner.lock().unwrap();
        let was_initial = inner.initial_state;
        let Some(queue) = inner.streams.get_mut(stream) else {
            return Err(CacheError::NoSuchStream(stream));
        };
        if queue.selected == selected {
            return Ok(());
        }
        queue.clear();
        queue.selected = selected;
        queue.active = selected;
        queue.need_refresh = selected && !was_initial;
        inner.tracks_switched = true;
        inner.ref_pts = ref_pts;
        drop(inner);
        self.shared.cv.notify_all();
        self.run_inline_step_if_untreaded();
        Ok(())
    }

    /// §4.5: try an in-cache seek first, falling back to a real
    /// (asynchronous) producer seek on miss.
    pub fn seek(&self, pts: f64, flags: SeekFlags) {
        let mut inner = self.shared.inner.lock().unwrap();

        let cache_hit = !flags.contains(SeekFlags::FACTOR)
            && inner.opts.seekable_cache
            && !inner.seeking
            && {
                let range = inner.seek_range();
                try_seek_cache(&mut inner.streams, range, pts, flags)
            };

        if cache_hit {
            inner.idle = false;
            drop(inner);
            self.shared.cv.notify_all();
            return;
        }

        if !self.shared.mirror.current().init.seekable {
            drop(inner);
            eprintln!("[cache] seek to {pts:.3}s rejected: source is not seekable");
            return;
        }

        for queue in inner.streams.iter_mut() {
            queue.clear();
        }
        inner.seeking = true;
        inner.seek_pts = pts;
        inner.seek_flags = flags;
        inner.idle = false;
        drop(inner);
        self.shared.cv.notify_all();
        self.run_inline_step_if_untreaded();
    }

    pub fn dequeue_packet(&self, stream: usize) -> Option<Packet> {
        self.run_inline_step_if_untreaded();
        let mut inner = self.shared.inner.lock().unwrap();
        let queue = inner.streams.get_mut(stream)?;
        let packet = queue.dequeue();
        let max_bw = inner.opts.max_bytes_bw;
        prune_back_buffer(&mut inner.streams, max_bw);
        drop(inner);
        self.shared.cv.notify_all();
        packet
    }

    pub fn control(&self, cmd: ControlCmd) -> ControlResult {
        self.run_inline_step_if_untreaded();
        let inner = self.shared.inner.lock().unwrap();
        match cmd {
            ControlCmd::GetCacheInfo => {
                let fw_bytes: u64 = inner.streams.iter().map(|q| q.fw_bytes as u64).sum();
                let bw_bytes: u64 = inner.streams.iter().map(|q| q.bw_bytes as u64).sum();
                let fw_seconds = inner
                    .streams
                    .iter()
                    .filter(|q| q.selected)
                    .filter_map(|q| q.last_ts.zip(q.base_ts))
                    .fold(0.0_f64, |acc, (last, base)| acc.max(last - base));
                ControlResult::CacheInfo { fw_bytes, bw_bytes, fw_seconds }
            }
            ControlCmd::GetReaderState => ControlResult::ReaderState(inner.reader_state()),
            ControlCmd::GetBitrateStats => {
                let mut stats = Vec::new();
                for kind in [StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle] {
                    let total: i64 = inner
                        .streams
                        .iter()
                        .filter(|q| q.kind == kind && q.selected)
                        .map(|q| q.bitrate)
                        .sum();
                    stats.push((kind, if total == 0 { -1 } else { total }));
                }
                ControlResult::BitrateStats(stats)
            }
            ControlCmd::GetSize
            | ControlCmd::GetBaseFilename
            | ControlCmd::GetDuration
            | ControlCmd::GetSeekable
            | ControlCmd::StreamCtrl(_) => {
                drop(inner);
                self.shared.producer.lock().unwrap().control(&cmd)
            }
        }
    }

    /// Ask the worker to re-query the producer's cache info (size, bitrate)
    /// on its next pass, e.g. after a growing live source reports new bytes
    /// available. §4.3's `force_cache_update` branch does the actual work.
    pub fn request_cache_info_refresh(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.force_cache_update = true;
        drop(inner);
        self.shared.cv.notify_all();
        self.run_inline_step_if_untreaded();
    }

    pub fn snapshot(&self) -> Arc<crate::mirror::CacheSnapshot> {
        self.shared.mirror.current()
    }

    pub fn stream_count(&self) -> usize {
        self.shared.inner.lock().unwrap().streams.len()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        // Only the last live Cache handle should tear down the worker
        // thread. A threaded cache's worker holds its own Arc<Shared> clone
        // (see `Cache::new`), so the last handle's refcount is 2, not 1, for
        // as long as that thread is alive.
        let last_handle = if self.shared.threaded.load(Ordering::Relaxed) { 2 } else { 1 };
        if Arc::strong_count(&self.shared) != last_handle {
            return;
        }
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.thread_terminate = true;
        }
        self.shared.cv.notify_all();
        if let Some(handle) = self.worker_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.shared.producer.lock().unwrap().close();
    }
}
