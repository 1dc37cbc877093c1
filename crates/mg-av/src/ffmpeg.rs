//! ffmpeg invocations for video snapshot, compress, and transcode.
//!
//! Every function here only builds an argument vector around a
//! [`BoundedCommand`]; the caller supplies the ceiling and runs it. Input is
//! always a URL or path ffmpeg can open itself, output always goes to
//! `pipe:1`.

use std::path::Path;

use mg_core::{AudioCodec, ImageFormat, VideoCodec, VideoContainer};

use crate::command::BoundedCommand;

/// Single-frame extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSpec {
    /// Seek position in milliseconds.
    pub time_ms: u64,
    /// Output width; `0` keeps the aspect ratio from `height`.
    pub width: u32,
    /// Output height; `0` keeps the aspect ratio from `width`.
    pub height: u32,
    /// Jpeg or Png.
    pub format: ImageFormat,
    /// Seek on the nearest keyframe before decoding (input seeking).
    pub fast: bool,
}

/// Re-encode at a quality level, optionally capping the short side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressSpec {
    pub crf: u8,
    pub short_side: Option<u32>,
    pub container: VideoContainer,
}

/// Full container/codec conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSpec {
    pub container: VideoContainer,
    pub video: VideoCodec,
    pub audio: AudioCodec,
    pub bitrate_kbps: Option<u32>,
}

fn base(ffmpeg: &Path, ceiling: u64) -> BoundedCommand {
    BoundedCommand::new(ffmpeg, ceiling).args(["-hide_banner", "-loglevel", "error", "-nostdin"])
}

fn seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// ffmpeg's `-f` muxer name for a container.
pub fn muxer(container: VideoContainer) -> &'static str {
    match container {
        VideoContainer::Mp4 => "mp4",
        VideoContainer::Webm => "webm",
        VideoContainer::Mkv => "matroska",
        VideoContainer::Mov => "mov",
    }
}

fn video_encoder(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::H265 => "libx265",
        VideoCodec::Vp9 => "libvpx-vp9",
        VideoCodec::Copy => "copy",
    }
}

/// Non-seekable outputs need fragmented MP4/MOV.
fn stream_flags(container: VideoContainer) -> Option<[&'static str; 2]> {
    match container {
        VideoContainer::Mp4 | VideoContainer::Mov => {
            Some(["-movflags", "frag_keyframe+empty_moov"])
        }
        _ => None,
    }
}

/// Build the snapshot command for `source`.
pub fn snapshot_command(
    ffmpeg: &Path,
    source: &str,
    spec: &SnapshotSpec,
    ceiling: u64,
) -> BoundedCommand {
    let at = seconds(spec.time_ms);
    let mut cmd = base(ffmpeg, ceiling);

    if spec.fast {
        cmd = cmd.args(["-ss", at.as_str(), "-i", source]);
    } else {
        cmd = cmd.args(["-i", source, "-ss", at.as_str()]);
    }
    cmd = cmd.args(["-frames:v", "1"]);

    if spec.width > 0 || spec.height > 0 {
        let w = if spec.width > 0 { spec.width.to_string() } else { "-1".into() };
        let h = if spec.height > 0 { spec.height.to_string() } else { "-1".into() };
        cmd = cmd.args(["-vf".to_string(), format!("scale={w}:{h}")]);
    }

    let codec = match spec.format {
        ImageFormat::Png => "png",
        _ => "mjpeg",
    };
    cmd.args(["-f", "image2", "-c:v", codec, "pipe:1"])
}

/// Build the compress command for `source`.
pub fn compress_command(
    ffmpeg: &Path,
    source: &str,
    spec: &CompressSpec,
    ceiling: u64,
) -> BoundedCommand {
    let mut cmd = base(ffmpeg, ceiling).args(["-i", source]);

    if let Some(side) = spec.short_side {
        // Scale the shorter edge down to `side`, never up; -2 keeps it even.
        let filter = format!(
            "scale='if(gt(iw,ih),-2,min({side},iw))':'if(gt(iw,ih),min({side},ih),-2)'"
        );
        cmd = cmd.args(["-vf".to_string(), filter]);
    }

    let crf = spec.crf.to_string();
    cmd = match spec.container {
        VideoContainer::Webm => cmd.args([
            "-c:v", "libvpx-vp9", "-crf", crf.as_str(), "-b:v", "0", "-c:a", "libopus",
        ]),
        _ => cmd.args([
            "-c:v", "libx264", "-crf", crf.as_str(), "-preset", "veryfast", "-c:a", "aac",
        ]),
    };

    if let Some(flags) = stream_flags(spec.container) {
        cmd = cmd.args(flags);
    }
    cmd.args(["-f", muxer(spec.container), "pipe:1"])
}

/// Build the transcode command for `source`.
pub fn transcode_command(
    ffmpeg: &Path,
    source: &str,
    spec: &TranscodeSpec,
    ceiling: u64,
) -> BoundedCommand {
    let mut cmd = base(ffmpeg, ceiling).args(["-i", source]);

    cmd = cmd.args(["-c:v", video_encoder(spec.video)]);
    if spec.video != VideoCodec::Copy {
        if let Some(kbps) = spec.bitrate_kbps {
            cmd = cmd.args(["-b:v".to_string(), format!("{kbps}k")]);
        }
    }

    cmd = match spec.audio {
        AudioCodec::None => cmd.arg("-an"),
        AudioCodec::Aac => cmd.args(["-c:a", "aac"]),
        AudioCodec::Opus => cmd.args(["-c:a", "libopus"]),
        AudioCodec::Copy => cmd.args(["-c:a", "copy"]),
    };

    if let Some(flags) = stream_flags(spec.container) {
        cmd = cmd.args(flags);
    }
    cmd.args(["-f", muxer(spec.container), "pipe:1"])
}
