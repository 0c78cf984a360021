// crates/demux-ffmpeg/src/bin/demux_play.rs
//
// Minimal command-line driver: open a media file through FfmpegProducer,
// select the first video and audio streams, drain packets until EOF, then
// demonstrate a cache seek back to the midpoint and drain again. Exists to
// exercise the cache end to end against a real file — not a player.

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use demux_core::{CacheOptions, SeekFlags, StreamKind};
use demux_engine::Cache;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("demux-play: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let path = env::args().nth(1).context("usage: demux-play <media file>")?;

    let opts = CacheOptions {
        readahead_secs: 2.0,
        seekable_cache: true,
        ..CacheOptions::default()
    };

    let producer = demux_ffmpeg::open(&path);
    let cache = Cache::new(producer, opts, true)?;

    cache.set_wakeup_callback(|event| {
        eprintln!("[demux-play] event: {event:?}");
    });

    let stream_count = cache.stream_count();
    if stream_count == 0 {
        bail!("no streams found in {path}");
    }

    let kinds = cache.snapshot().init.stream_kinds.clone();
    let video_stream = kinds.iter().position(|k| *k == StreamKind::Video);
    let audio_stream = kinds.iter().position(|k| *k == StreamKind::Audio);
    for stream in [video_stream, audio_stream].into_iter().flatten() {
        cache.select_track(stream, true, None)?;
    }

    let Some(video) = video_stream else { bail!("no video stream in {path}") };
    println!("selected video stream {video}, audio stream {audio_stream:?}");

    let mut count = 0u64;
    let mut last_pts = 0.0f64;
    while let Some(packet) = cache.dequeue_packet(video) {
        count += 1;
        if let Some(pts) = packet.pts {
            last_pts = pts;
        }
    }
    println!("drained {count} video packets, last pts {last_pts:.3}s");

    if last_pts > 0.0 {
        let midpoint = last_pts / 2.0;
        println!("seeking to midpoint {midpoint:.3}s");
        cache.seek(midpoint, SeekFlags::empty());
        let mut after_seek = 0u64;
        while let Some(_packet) = cache.dequeue_packet(video) {
            after_seek += 1;
            if after_seek >= 50 {
                break;
            }
        }
        println!("drained {after_seek} more packets after seek");
    }

    Ok(())
}
