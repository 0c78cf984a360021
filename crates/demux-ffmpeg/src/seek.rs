// crates/demux-ffmpeg/src/seek.rs
//
// Seek helper wrapping ffmpeg's avformat seek, generalized from a
// single-purpose encoder helper to respect the cache's SeekFlags.
//
// Backward seek (`..=seek_ts`) lands on the keyframe at or before the
// target; forward seek (`seek_ts..`) lands on the keyframe at or after it.
// The cache's own packet-level filtering (§4.5 `find_seek_target`) handles
// picking the exact in-range packet afterward, so this only needs to land
// the producer's read position in the right GOP.
//
// avformat_seek_file(max_ts=0) returns EPERM on Windows when called on a
// freshly-opened context — skip the seek entirely at t=0, which is already
// correct since a fresh Input starts there.

use demux_core::SeekFlags;
use ffmpeg_the_third as ffmpeg;

pub fn seek_to_secs(
    ictx: &mut ffmpeg::format::context::Input,
    target_secs: f64,
    flags: SeekFlags,
    label: &str,
) -> Result<(), String> {
    if target_secs <= 0.0 {
        return Ok(());
    }

    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    let result = if flags.contains(SeekFlags::FORWARD) {
        ictx.seek(seek_ts, seek_ts..)
    } else {
        ictx.seek(seek_ts, ..=seek_ts)
    };

    result.map_err(|e| {
        format!("{label}: seek to {target_secs:.3}s failed: {e} — decoding from current position")
    })
}
