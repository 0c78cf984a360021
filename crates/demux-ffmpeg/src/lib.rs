// crates/demux-ffmpeg/src/lib.rs
//
// FfmpegProducer: a Producer implementation backed by ffmpeg-the-third's
// format::context::Input. This is a format-specific demuxer implementation
// in the sense the cache core treats as an external collaborator — it has
// no cache logic of its own, it just turns container bytes into Packets.

mod seek;

use std::path::{Path, PathBuf};

use demux_core::{CacheError, ControlCmd, ControlResult, Packet, SeekFlags, StreamKind};
use demux_engine::{CheckLevel, PacketSink, Producer};
use ffmpeg_the_third as ffmpeg;

/// How many packets `fill_buffer` pulls per call before returning control to
/// the worker loop — keeps a single read-ahead iteration from blocking for
/// an unbounded amount of wall-clock time on a slow source.
const FILL_BATCH: usize = 32;

pub struct FfmpegProducer {
    path: PathBuf,
    ictx: Option<ffmpeg::format::context::Input>,
}

impl FfmpegProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FfmpegProducer { path: path.into(), ictx: None }
    }

    fn stream_kind(stream: &ffmpeg::format::stream::Stream) -> StreamKind {
        match stream.parameters().medium() {
            ffmpeg::media::Type::Video => StreamKind::Video,
            ffmpeg::media::Type::Audio => StreamKind::Audio,
            ffmpeg::media::Type::Subtitle => StreamKind::Subtitle,
            _ => StreamKind::Unknown,
        }
    }
}

impl Producer for FfmpegProducer {
    fn open(&mut self, _check_level: CheckLevel) -> Result<Vec<StreamKind>, CacheError> {
        let ictx = ffmpeg::format::input(&self.path)
            .map_err(|e| CacheError::OpenFailed(format!("{}: {e}", self.path.display())))?;

        let kinds: Vec<StreamKind> = ictx.streams().map(|s| Self::stream_kind(&s)).collect();
        self.ictx = Some(ictx);
        Ok(kinds)
    }

    fn fill_buffer(&mut self, sink: &mut PacketSink) -> usize {
        let Some(ictx) = &mut self.ictx else { return 0 };
        let mut n = 0;
        for _ in 0..FILL_BATCH {
            match ictx.packets().next() {
                Some(Ok((stream, av_packet))) => {
                    let time_base: f64 = stream.time_base().into();
                    let to_secs = |ts: Option<i64>| ts.map(|t| t as f64 * time_base);
                    let mut packet = Packet::new(
                        stream.index(),
                        av_packet.data().unwrap_or(&[]).to_vec(),
                    );
                    packet.pts = to_secs(av_packet.pts());
                    packet.dts = to_secs(av_packet.dts());
                    packet.pos = match av_packet.position() {
                        -1 => None,
                        pos => Some(pos),
                    };
                    packet.keyframe = av_packet.is_key();
                    sink(stream.index(), packet);
                    n += 1;
                }
                Some(Err(e)) => {
                    eprintln!("[demux-ffmpeg] packet read error: {e}");
                    break;
                }
                None => break,
            }
        }
        n
    }

    fn seek(&mut self, pts: f64, flags: SeekFlags) -> Result<(), CacheError> {
        const AV_TIME_BASE: f64 = 1_000_000.0;
        let ictx = self.ictx.as_mut().ok_or(CacheError::NotSeekable)?;

        if pts < 0.0 {
            return Err(CacheError::SeekOutOfRange { pts });
        }
        let duration = ictx.duration();
        if duration > 0 && pts > duration as f64 / AV_TIME_BASE {
            return Err(CacheError::SeekOutOfRange { pts });
        }

        seek::seek_to_secs(ictx, pts, flags, "demux-ffmpeg").map_err(CacheError::Io)
    }

    fn control(&mut self, cmd: &ControlCmd) -> ControlResult {
        match cmd {
            ControlCmd::GetSize => {
                ControlResult::Size(std::fs::metadata(&self.path).ok().map(|m| m.len()))
            }
            ControlCmd::GetBaseFilename => ControlResult::BaseFilename(
                self.path.file_name().map(|n| n.to_string_lossy().into_owned()),
            ),
            ControlCmd::GetSeekable => {
                // A heuristic stand-in for a real seekability probe: local
                // regular files are seekable, anything else (pipes, fifos)
                // isn't modeled by this adapter.
                let seekable = std::fs::metadata(&self.path).map(|m| m.is_file()).unwrap_or(false);
                ControlResult::Seekable(seekable)
            }
            ControlCmd::GetDuration => {
                const AV_TIME_BASE: f64 = 1_000_000.0;
                ControlResult::Duration(self.ictx.as_ref().and_then(|ictx| {
                    let d = ictx.duration();
                    (d > 0).then(|| d as f64 / AV_TIME_BASE)
                }))
            }
            _ => ControlResult::Unhandled,
        }
    }

    fn close(&mut self) {
        self.ictx = None;
    }
}

pub fn open(path: impl AsRef<Path>) -> Box<dyn Producer> {
    Box::new(FfmpegProducer::new(path.as_ref().to_path_buf()))
}
