// src/media/clip.rs
use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Shape of the short clip posted to the social feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSpec {
    pub fps: u32,
    /// How long each frame stays on screen.
    pub frame_secs: u32,
}

/// Turns equally sized frames into an MP4. Called from the blocking pool.
pub trait ClipEncoder: Send + Sync {
    fn encode(&self, frames: &[RgbaImage], spec: ClipSpec) -> Result<Vec<u8>>;
}

/// Pipes raw RGB frames through an `ffmpeg` binary (H.264, yuv420p, fragmented MP4).
pub struct FfmpegClipEncoder {
    binary: PathBuf,
}

impl FfmpegClipEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(width: u32, height: u32, fps: u32) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "frag_keyframe+empty_moov",
            "-f",
            "mp4",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Raw rgb24 stream holding each frame for `frame_secs * fps` ticks.
pub fn raw_rgb_stream(frames: &[RgbaImage], spec: ClipSpec) -> Vec<u8> {
    let repeats = (spec.fps * spec.frame_secs).max(1) as usize;
    let mut out = Vec::new();
    for frame in frames {
        let rgb: Vec<u8> = frame
            .pixels()
            .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
            .collect();
        for _ in 0..repeats {
            out.extend_from_slice(&rgb);
        }
    }
    out
}

impl ClipEncoder for FfmpegClipEncoder {
    fn encode(&self, frames: &[RgbaImage], spec: ClipSpec) -> Result<Vec<u8>> {
        let Some(first) = frames.first() else {
            bail!("no frames to encode");
        };
        let (width, height) = first.dimensions();
        if frames.iter().any(|f| f.dimensions() != (width, height)) {
            bail!("frames differ in size");
        }
        let input = raw_rgb_stream(frames, spec);

        let mut child = Command::new(&self.binary)
            .args(Self::args(width, height, spec.fps))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.binary.display()))?;

        let mut stdin = child.stdin.take().context("ffmpeg stdin")?;
        let mut stdout = child.stdout.take().context("ffmpeg stdout")?;
        let mut stderr = child.stderr.take().context("ffmpeg stderr")?;

        // All three pipes must drain concurrently or ffmpeg stalls.
        let (written, video, diag) = std::thread::scope(|s| {
            let writer = s.spawn(move || {
                let res = stdin.write_all(&input);
                drop(stdin);
                res
            });
            let err_reader = s.spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            });
            let mut video = Vec::new();
            let read = stdout.read_to_end(&mut video).map(|_| video);
            let written = writer.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("ffmpeg writer thread panicked"))
            });
            let diag = err_reader.join().unwrap_or_default();
            (written, read, diag)
        });

        let status = child.wait().context("waiting for ffmpeg")?;
        if !status.success() {
            bail!("ffmpeg exited with {status}: {}", diag.trim());
        }
        written.context("feeding frames to ffmpeg")?;
        let video = video.context("reading ffmpeg output")?;
        if video.is_empty() {
            bail!("ffmpeg produced no output");
        }
        Ok(video)
    }
}
