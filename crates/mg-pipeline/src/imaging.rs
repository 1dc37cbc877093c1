//! Adapter over the `image` crate.
//!
//! Everything the image actions do to pixels goes through [`Canvas`]. The
//! operations are synchronous; callers move the canvas onto a blocking
//! thread through [`JobCounter::run`].

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, Delay, DynamicImage, ImageReader, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use mg_core::{Error, ImageFormat, Result};

// ---------------------------------------------------------------------------
// Format mapping and probing
// ---------------------------------------------------------------------------

fn from_library(format: image::ImageFormat) -> Option<ImageFormat> {
    match format {
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        image::ImageFormat::Gif => Some(ImageFormat::Gif),
        image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
        image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
        _ => None,
    }
}

fn to_library(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Webp => image::ImageFormat::WebP,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Bmp => image::ImageFormat::Bmp,
        ImageFormat::Tiff => image::ImageFormat::Tiff,
    }
}

fn decode_error(e: impl fmt::Display) -> Error {
    Error::Decode(e.to_string())
}

fn encode_error(e: impl fmt::Display) -> Error {
    Error::Internal(format!("encode failed: {e}"))
}

/// Header-level facts about an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Identify the format and dimensions without decoding pixels.
pub fn probe(bytes: &[u8]) -> Result<Probe> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(decode_error)?;
    let format = reader
        .format()
        .and_then(from_library)
        .ok_or_else(|| Error::Decode("unrecognised image format".into()))?;
    let (width, height) = reader.into_dimensions().map_err(decode_error)?;
    Ok(Probe {
        format,
        width,
        height,
    })
}

/// Decode-time switches, fixed before any pixels are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Read every frame of an animated source instead of the first.
    pub animated: bool,
    /// Stop after this many frames.
    pub max_frames: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            animated: true,
            max_frames: u32::MAX,
        }
    }
}

/// Decode `bytes` into a canvas.
pub fn decode(bytes: &[u8], options: DecodeOptions) -> Result<Canvas> {
    let format = probe(bytes)?.format;

    if format == ImageFormat::Gif && options.animated {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
        let mut frames = Vec::new();
        for frame in decoder.into_frames().take(options.max_frames.max(1) as usize) {
            let frame = frame.map_err(decode_error)?;
            let delay = frame.delay();
            frames.push(Frame {
                image: DynamicImage::ImageRgba8(frame.into_buffer()),
                delay,
            });
        }
        if frames.is_empty() {
            return Err(Error::Decode("gif has no frames".into()));
        }
        return Ok(Canvas::with_frames(frames, format));
    }

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(decode_error)?
        .decode()
        .map_err(decode_error)?;
    Ok(Canvas::new(image, format))
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// One frame of a (possibly animated) image.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub delay: Delay,
}

/// Decoded image plus its pending output settings.
#[derive(Debug, Clone)]
pub struct Canvas {
    frames: Vec<Frame>,
    source_format: ImageFormat,
    format: ImageFormat,
    quality: Option<u8>,
    modified: bool,
}

impl Canvas {
    /// Single-frame canvas.
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self::with_frames(
            vec![Frame {
                image,
                delay: Delay::from_numer_denom_ms(0, 1),
            }],
            format,
        )
    }

    /// `frames` must not be empty.
    fn with_frames(frames: Vec<Frame>, format: ImageFormat) -> Self {
        Self {
            frames,
            source_format: format,
            format,
            quality: None,
            modified: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.frames[0].image.width()
    }

    pub fn height(&self) -> u32 {
        self.frames[0].image.height()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The first (or only) frame.
    pub fn first(&self) -> &DynamicImage {
        &self.frames[0].image
    }

    pub fn source_format(&self) -> ImageFormat {
        self.source_format
    }

    /// Output format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn set_format(&mut self, format: ImageFormat) {
        self.format = format;
        self.modified = true;
    }

    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    pub fn set_quality(&mut self, quality: u8) {
        self.quality = Some(quality);
        self.modified = true;
    }

    /// Whether the output differs from the source bytes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Force re-encoding even though no pixel operation ran.
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    fn map_frames<F>(&mut self, f: F)
    where
        F: Fn(&DynamicImage) -> DynamicImage,
    {
        for frame in &mut self.frames {
            frame.image = f(&frame.image);
        }
        self.modified = true;
    }

    // -- geometry ----------------------------------------------------------

    /// Scale every frame to exactly `width` x `height`.
    pub fn resize_exact(&mut self, width: u32, height: u32) {
        self.map_frames(|img| img.resize_exact(width, height, FilterType::Lanczos3));
    }

    /// Cut the `width` x `height` region at (`x`, `y`).
    pub fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.map_frames(|img| img.crop_imm(x, y, width, height));
    }

    /// Center every frame on a `width` x `height` background of `color`.
    pub fn pad(&mut self, width: u32, height: u32, color: Rgba<u8>) {
        self.map_frames(|img| {
            let mut background = RgbaImage::from_pixel(width, height, color);
            let x = (i64::from(width) - i64::from(img.width())) / 2;
            let y = (i64::from(height) - i64::from(img.height())) / 2;
            imageops::overlay(&mut background, &img.to_rgba8(), x, y);
            DynamicImage::ImageRgba8(background)
        });
    }

    /// Rotate clockwise by `degrees`. Angles off the right angles grow the
    /// canvas to the rotated bounding box and leave the corners transparent.
    pub fn rotate(&mut self, degrees: u32) {
        match degrees % 360 {
            0 => {}
            90 => self.map_frames(DynamicImage::rotate90),
            180 => self.map_frames(DynamicImage::rotate180),
            270 => self.map_frames(DynamicImage::rotate270),
            d => self.map_frames(|img| rotate_any(img, d)),
        }
    }

    // -- shape masks -------------------------------------------------------

    /// Keep the centered circle of `radius` and clear everything else.
    ///
    /// The radius is clamped to half the shorter side.
    pub fn circle(&mut self, radius: u32) {
        let r = radius.min(self.width().min(self.height()) / 2);
        if r == 0 {
            return;
        }
        let d = r * 2;
        let x = (self.width() - d) / 2;
        let y = (self.height() - d) / 2;
        let rf = r as f32;

        self.map_frames(|img| {
            let mut rgba = img.crop_imm(x, y, d, d).to_rgba8();
            clear_where(&mut rgba, |px, py| {
                let dx = px as f32 + 0.5 - rf;
                let dy = py as f32 + 0.5 - rf;
                dx * dx + dy * dy > rf * rf
            });
            DynamicImage::ImageRgba8(rgba)
        });
    }

    /// Round the four corners with `radius`, clamped to half the shorter
    /// side.
    pub fn round_corners(&mut self, radius: u32) {
        let (w, h) = (self.width(), self.height());
        let r = radius.min(w.min(h) / 2);
        if r == 0 {
            return;
        }
        let rf = r as f32;

        self.map_frames(|img| {
            let mut rgba = img.to_rgba8();
            clear_where(&mut rgba, |x, y| {
                let cx = if x < r {
                    rf
                } else if x >= w - r {
                    (w - r) as f32
                } else {
                    return false;
                };
                let cy = if y < r {
                    rf
                } else if y >= h - r {
                    (h - r) as f32
                } else {
                    return false;
                };
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                dx * dx + dy * dy > rf * rf
            });
            DynamicImage::ImageRgba8(rgba)
        });
    }

    // -- filters -----------------------------------------------------------

    pub fn blur(&mut self, sigma: f32) {
        self.map_frames(|img| img.blur(sigma));
    }

    /// `percent` in [-100, 100].
    pub fn brighten(&mut self, percent: i32) {
        let value = percent * 255 / 100;
        self.map_frames(|img| img.brighten(value));
    }

    /// `percent` in [-100, 100].
    pub fn contrast(&mut self, percent: f32) {
        self.map_frames(|img| img.adjust_contrast(percent));
    }

    pub fn sharpen(&mut self, sigma: f32, threshold: i32) {
        self.map_frames(|img| img.unsharpen(sigma, threshold));
    }

    /// Alpha-blend `mark` onto every frame with its top-left at (`x`, `y`).
    pub fn overlay(&mut self, mark: &RgbaImage, x: i64, y: i64) {
        self.map_frames(|img| {
            let mut base = img.to_rgba8();
            imageops::overlay(&mut base, mark, x, y);
            DynamicImage::ImageRgba8(base)
        });
    }

    // -- output ------------------------------------------------------------

    /// Encode in the output format. `default_quality` applies to lossy
    /// output when no quality was set.
    pub fn encode(&self, default_quality: u8) -> Result<Bytes> {
        let mut buf = Cursor::new(Vec::new());

        match self.format {
            ImageFormat::Jpeg => {
                let quality = self.quality.unwrap_or(default_quality).clamp(1, 100);
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                DynamicImage::ImageRgb8(flatten(self.first()))
                    .write_with_encoder(encoder)
                    .map_err(encode_error)?;
            }
            ImageFormat::Gif if self.frames.len() > 1 => {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder.set_repeat(Repeat::Infinite).map_err(encode_error)?;
                let frames = self
                    .frames
                    .iter()
                    .map(|f| image::Frame::from_parts(f.image.to_rgba8(), 0, 0, f.delay));
                encoder.encode_frames(frames).map_err(encode_error)?;
            }
            other => {
                DynamicImage::ImageRgba8(self.first().to_rgba8())
                    .write_to(&mut buf, to_library(other))
                    .map_err(encode_error)?;
            }
        }

        Ok(Bytes::from(buf.into_inner()))
    }
}

fn clear_where<F>(image: &mut RgbaImage, outside: F)
where
    F: Fn(u32, u32) -> bool,
{
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if outside(x, y) {
            pixel[3] = 0;
        }
    }
}

fn rotate_any(img: &DynamicImage, degrees: u32) -> DynamicImage {
    let theta = (degrees as f32).to_radians();
    let (w, h) = (img.width() as f32, img.height() as f32);
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let bw = (w * cos + h * sin).ceil() as u32;
    let bh = (w * sin + h * cos).ceil() as u32;

    let mut bounded = RgbaImage::new(bw, bh);
    let x = (i64::from(bw) - i64::from(img.width())) / 2;
    let y = (i64::from(bh) - i64::from(img.height())) / 2;
    imageops::overlay(&mut bounded, &img.to_rgba8(), x, y);

    DynamicImage::ImageRgba8(rotate_about_center(
        &bounded,
        theta,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
    ))
}

/// Composite onto white and drop alpha, for formats without transparency.
fn flatten(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, p) in rgba.enumerate_pixels() {
        let a = u32::from(p[3]);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(p[0]), blend(p[1]), blend(p[2])]));
    }
    out
}

/// Scale the alpha channel of `mark` to `opacity` percent.
pub fn fade(mark: &mut RgbaImage, opacity: u8) {
    let opacity = u32::from(opacity.min(100));
    for p in mark.pixels_mut() {
        p[3] = (u32::from(p[3]) * opacity / 100) as u8;
    }
}

// ---------------------------------------------------------------------------
// Blocking job counter
// ---------------------------------------------------------------------------

/// Runs imaging work on the blocking pool and counts jobs in flight.
///
/// The count drops when the work itself returns, not when the caller stops
/// waiting, so abandoned decodes still show up as load.
#[derive(Debug, Clone, Default)]
pub struct JobCounter {
    in_flight: Arc<AtomicUsize>,
}

struct JobGuard(Arc<AtomicUsize>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobCounter {
    /// Jobs submitted and not yet finished.
    pub fn depth(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `f` on a blocking thread.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = JobGuard(Arc::clone(&self.in_flight));
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            f()
        })
        .await
        .map_err(|e| Error::Internal(format!("imaging job failed: {e}")))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Solid-color RGBA image encoded as `format`.
    pub(crate) fn encoded(format: ImageFormat, width: u32, height: u32) -> Bytes {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        Canvas::new(DynamicImage::ImageRgba8(img), format)
            .encode(90)
            .unwrap()
    }

    /// Animated gif with `frames` frames.
    pub(crate) fn animated_gif(width: u32, height: u32, frames: u32) -> Bytes {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = (0..frames).map(|i| {
                let shade = (i * 40 % 255) as u8;
                let img = RgbaImage::from_pixel(width, height, Rgba([shade, 0, 0, 255]));
                image::Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
            });
            encoder.encode_frames(frames).unwrap();
        }
        Bytes::from(buf)
    }

    #[test]
    fn probe_reads_header() {
        let bytes = encoded(ImageFormat::Png, 40, 20);
        let p = probe(&bytes).unwrap();
        assert_eq!(p.format, ImageFormat::Png);
        assert_eq!((p.width, p.height), (40, 20));
    }

    #[test]
    fn probe_rejects_garbage() {
        assert!(matches!(probe(b"definitely not an image"), Err(Error::Decode(_))));
    }

    #[test]
    fn decode_and_resize() {
        let bytes = encoded(ImageFormat::Jpeg, 100, 50);
        let mut canvas = decode(&bytes, DecodeOptions::default()).unwrap();
        assert_eq!(canvas.source_format(), ImageFormat::Jpeg);
        assert!(!canvas.is_modified());
        canvas.resize_exact(10, 5);
        assert_eq!((canvas.width(), canvas.height()), (10, 5));
        assert!(canvas.is_modified());
    }

    #[test]
    fn animated_gif_respects_frame_cap() {
        let bytes = animated_gif(8, 8, 5);
        let all = decode(&bytes, DecodeOptions::default()).unwrap();
        assert_eq!(all.frame_count(), 5);

        let capped = decode(
            &bytes,
            DecodeOptions {
                animated: true,
                max_frames: 2,
            },
        )
        .unwrap();
        assert_eq!(capped.frame_count(), 2);

        let still = decode(
            &bytes,
            DecodeOptions {
                animated: false,
                max_frames: 100,
            },
        )
        .unwrap();
        assert_eq!(still.frame_count(), 1);
    }

    #[test]
    fn animated_gif_encodes_all_frames() {
        let bytes = animated_gif(8, 8, 3);
        let mut canvas = decode(&bytes, DecodeOptions::default()).unwrap();
        canvas.resize_exact(4, 4);
        let out = canvas.encode(85).unwrap();
        let again = decode(&out, DecodeOptions::default()).unwrap();
        assert_eq!(again.frame_count(), 3);
        assert_eq!(again.width(), 4);
    }

    #[test]
    fn right_angle_rotation_swaps_dimensions() {
        let mut canvas = decode(&encoded(ImageFormat::Png, 30, 10), DecodeOptions::default()).unwrap();
        canvas.rotate(90);
        assert_eq!((canvas.width(), canvas.height()), (10, 30));
        canvas.rotate(0);
        assert_eq!((canvas.width(), canvas.height()), (10, 30));
    }

    #[test]
    fn free_rotation_grows_to_bounding_box() {
        let mut canvas = decode(&encoded(ImageFormat::Png, 100, 100), DecodeOptions::default()).unwrap();
        canvas.rotate(45);
        // 100 * sqrt(2) rounded up.
        assert_eq!(canvas.width(), 142);
        assert_eq!(canvas.first().to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn circle_clears_corners() {
        let mut canvas = decode(&encoded(ImageFormat::Png, 50, 30), DecodeOptions::default()).unwrap();
        canvas.circle(100);
        assert_eq!((canvas.width(), canvas.height()), (30, 30));
        let rgba = canvas.first().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(15, 15)[3], 255);
    }

    #[test]
    fn rounded_corners_keep_size() {
        let mut canvas = decode(&encoded(ImageFormat::Png, 40, 40), DecodeOptions::default()).unwrap();
        canvas.round_corners(10);
        let rgba = canvas.first().to_rgba8();
        assert_eq!((rgba.width(), rgba.height()), (40, 40));
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(39, 39)[3], 0);
        assert_eq!(rgba.get_pixel(20, 0)[3], 255);
    }

    #[test]
    fn jpeg_output_flattens_alpha() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let mut canvas = Canvas::new(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        canvas.set_format(ImageFormat::Jpeg);
        let out = canvas.encode(90).unwrap();
        let back = decode(&out, DecodeOptions::default()).unwrap();
        assert_eq!(back.source_format(), ImageFormat::Jpeg);
        // Transparent black becomes white.
        assert!(back.first().to_rgb8().get_pixel(1, 1)[0] > 240);
    }

    #[test]
    fn fade_scales_alpha() {
        let mut mark = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 200]));
        fade(&mut mark, 50);
        assert_eq!(mark.get_pixel(0, 0)[3], 100);
    }

    #[tokio::test]
    async fn job_counter_tracks_running_work() {
        let jobs = JobCounter::default();
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let worker = jobs.clone();
        let handle = tokio::spawn(async move {
            worker
                .run(move || {
                    rx.recv().ok();
                    Ok(7)
                })
                .await
        });

        while jobs.depth() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(jobs.depth(), 1);
        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 7);
        assert_eq!(jobs.depth(), 0);
    }
}
