//! Image validation: trust the pixels, not the file name.

use std::path::Path;

use image::{ImageFormat, ImageReader};

use crate::ports::ValidatedFile;

/// Facts about a candidate image read from its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// MIME type, one of jpeg/png/gif/webp/bmp.
    pub content_type: &'static str,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Lowercase format name (e.g., `"jpeg"`).
    pub format: &'static str,
    /// Canonical extension with the dot (e.g., `".jpg"`).
    pub extension: &'static str,
}

impl ImageInfo {
    /// Combine with a display name into the descriptor channels consume.
    #[must_use]
    pub fn describe(&self, filename: impl Into<String>) -> ValidatedFile {
        ValidatedFile {
            filename: filename.into(),
            content_type: self.content_type.to_string(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Extensions accepted on client-supplied file names.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Whether `filename` carries one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
#[must_use]
pub fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
}

fn supported(format: ImageFormat) -> Option<(&'static str, &'static str, &'static str)> {
    match format {
        ImageFormat::Jpeg => Some(("image/jpeg", "jpeg", ".jpg")),
        ImageFormat::Png => Some(("image/png", "png", ".png")),
        ImageFormat::Gif => Some(("image/gif", "gif", ".gif")),
        ImageFormat::WebP => Some(("image/webp", "webp", ".webp")),
        ImageFormat::Bmp => Some(("image/bmp", "bmp", ".bmp")),
        _ => None,
    }
}

/// Inspect the file at `path`.
///
/// Returns `None` for anything that is not a decodable image in a supported
/// format; the reason is logged under `label`.
#[must_use]
pub fn inspect(path: &Path, label: &str) -> Option<ImageInfo> {
    let reader = match ImageReader::open(path).and_then(ImageReader::with_guessed_format) {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("cannot read image {label}: {e}");
            return None;
        }
    };

    let Some(format) = reader.format() else {
        log::warn!("unrecognized image: {label}");
        return None;
    };
    let Some((content_type, name, extension)) = supported(format) else {
        log::warn!("unsupported image format {format:?}: {label}");
        return None;
    };

    match reader.into_dimensions() {
        Ok((width, height)) => {
            log::info!("validated {label}: {name} {width}x{height}");
            Some(ImageInfo { content_type, width, height, format: name, extension })
        }
        Err(e) => {
            log::error!("cannot decode {label}: {e}");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Encode a blank RGB image of the given size.
    pub(crate) fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buf = std::io::Cursor::new(Vec::<u8>::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn write(name: &str, bytes: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join("imgrelay_validate_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn png_reports_true_dimensions() {
        let path = write("real.png", &encoded(8, 6, ImageFormat::Png));
        let info = inspect(&path, "real.png").unwrap();
        assert_eq!(info.content_type, "image/png");
        assert_eq!((info.width, info.height), (8, 6));
        assert_eq!(info.extension, ".png");
    }

    #[test]
    fn content_wins_over_misleading_extension() {
        let path = write("actually_jpeg.png", &encoded(4, 3, ImageFormat::Jpeg));
        let info = inspect(&path, "actually_jpeg.png").unwrap();
        assert_eq!(info.content_type, "image/jpeg");
        assert_eq!(info.format, "jpeg");
        assert_eq!(info.extension, ".jpg");
    }

    #[test]
    fn gif_and_bmp_are_supported() {
        let gif = write("anim.gif", &encoded(2, 2, ImageFormat::Gif));
        assert_eq!(inspect(&gif, "anim.gif").unwrap().content_type, "image/gif");
        let bmp = write("old.bmp", &encoded(2, 5, ImageFormat::Bmp));
        assert_eq!(inspect(&bmp, "old.bmp").unwrap().height, 5);
    }

    #[test]
    fn non_images_are_rejected() {
        let text = write("notes.png", b"definitely not an image");
        assert!(inspect(&text, "notes.png").is_none());
        let empty = write("empty.png", b"");
        assert!(inspect(&empty, "empty.png").is_none());
        assert!(inspect(Path::new("/nonexistent/x.png"), "x.png").is_none());
    }

    #[test]
    fn unsupported_formats_are_rejected() {
        let tiff = write("scan.tiff", &encoded(2, 2, ImageFormat::Tiff));
        assert!(inspect(&tiff, "scan.tiff").is_none());
    }

    #[test]
    fn extension_allow_list() {
        assert!(has_allowed_extension("cat.PNG"));
        assert!(has_allowed_extension("a.b.jpeg"));
        assert!(!has_allowed_extension("cat.tiff"));
        assert!(!has_allowed_extension("cat"));
    }

    #[test]
    fn describe_carries_detected_type() {
        let info = ImageInfo {
            content_type: "image/webp",
            width: 10,
            height: 20,
            format: "webp",
            extension: ".webp",
        };
        let file = info.describe("x.png");
        assert_eq!(file.filename, "x.png");
        assert_eq!(file.content_type, "image/webp");
        assert_eq!((file.width, file.height), (10, 20));
    }
}
