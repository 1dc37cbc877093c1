//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which holds a temporary content root, an
//! in-memory style store, and a [`Dispatcher`] built the same way the CLI
//! builds it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat as LibraryFormat, Rgba, RgbaImage};
use mediagate::stores::LocalContentStore;
use mg_av::ToolRegistry;
use mg_core::config::Config;
use mg_pipeline::store::MemoryStyleStore;
use mg_pipeline::{Dispatcher, PipelineRequest, ProcessOutcome, RequestActionParser};
use tempfile::TempDir;

pub struct TestHarness {
    pub root: TempDir,
    pub styles: Arc<MemoryStyleStore>,
    pub dispatcher: Dispatcher,
    pub parser: RequestActionParser,
}

impl TestHarness {
    /// Default configuration and no external tools.
    pub fn new() -> Self {
        Self::with(Config::default(), ToolRegistry::default())
    }

    pub fn with(config: Config, tools: ToolRegistry) -> Self {
        let root = tempfile::tempdir().expect("failed to create content root");
        let styles = Arc::new(MemoryStyleStore::new());
        let dispatcher = mediagate::build_dispatcher(
            &config,
            Arc::new(tools),
            Arc::new(LocalContentStore::new(root.path())),
            styles.clone(),
        );
        Self {
            root,
            styles,
            dispatcher,
            parser: RequestActionParser::from_config(&config.parser),
        }
    }

    /// Write `bytes` under the content root.
    pub fn put(&self, key: &str, bytes: &[u8]) -> PathBuf {
        let path = self.root.path().join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Parse `path_and_query` and dispatch it.
    pub async fn run(&self, path_and_query: &str) -> mg_core::Result<ProcessOutcome> {
        let request: PipelineRequest = self.parser.parse_url(path_and_query)?;
        self.dispatcher.dispatch(&request).await
    }
}

/// A solid-colour image encoded as `format`.
pub fn solid_image(width: u32, height: u32, format: LibraryFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([40, 120, 200, 255])));
    let img = match format {
        LibraryFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// Decode an outcome payload to check its dimensions.
pub fn dimensions(payload: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(payload).unwrap();
    (img.width(), img.height())
}

/// A shell script standing in for ffmpeg.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
