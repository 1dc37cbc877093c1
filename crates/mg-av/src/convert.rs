//! Still-image fallback conversion through ImageMagick.
//!
//! Used when the in-process imaging library cannot identify or decode a
//! source (HEIC, PSD, exotic TIFF variants, ...). The source is streamed on
//! stdin and the first frame comes back as PNG on stdout.

use std::path::Path;

use bytes::Bytes;

use crate::command::BoundedCommand;

/// Build the `magick` command converting stdin to PNG on stdout.
pub fn to_png_command(magick: &Path, ceiling: u64) -> BoundedCommand {
    // `-[0]` reads only the first frame/page of stdin.
    BoundedCommand::new(magick, ceiling).args(["-[0]", "png:-"])
}

/// Convert `source` to PNG bytes.
pub async fn to_png(
    magick: &Path,
    source: Bytes,
    ceiling: u64,
    timeout: Option<std::time::Duration>,
) -> mg_core::Result<Bytes> {
    tracing::info!(bytes = source.len(), "Fallback conversion to png");
    to_png_command(magick, ceiling)
        .timeout(timeout)
        .stdin(source)
        .execute()
        .await
}
