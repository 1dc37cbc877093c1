//! # mg-av
//!
//! External tool execution for the mediagate pipeline.
//!
//! This crate provides:
//!
//! - **Bounded execution** ([`BoundedCommand`]) -- run a tool with a hard
//!   stdout ceiling, streamed stdin, optional timeout, and exactly-once
//!   settlement.
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe, and magick.
//! - **Call sites** ([`ffmpeg`], [`convert`]) -- argument vectors for video
//!   snapshot/compress/transcode and still-image fallback conversion.

pub mod command;
pub mod convert;
pub mod ffmpeg;
mod settle;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::BoundedCommand;
pub use ffmpeg::{CompressSpec, SnapshotSpec, TranscodeSpec};
pub use tools::{KnownTool, LocatedTool, ToolOrigin, ToolRegistry, ToolStatus};
