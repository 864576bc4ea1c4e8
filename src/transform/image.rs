//! Lossless image and font optimisation.
//!
//! | Input | Treatment |
//! |---|---|
//! | `.png` | decode + re-encode at best compression, kept only if smaller |
//! | `.svg` | whitespace between tags removed |
//! | anything else | copied verbatim |
//!
//! Pixels are never altered, so the optimised file is always a drop-in
//! replacement for the source.

use super::{OutputFile, SourceFile, Transform, TransformError};
use image::ImageFormat;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("static regex"));

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageTransform;

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Re-encode a PNG at maximum compression.
pub fn recompress_png(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    decoded.write_with_encoder(encoder)?;
    Ok(out)
}

/// Drop whitespace-only runs between SVG tags.
pub fn squeeze_svg(source: &str) -> String {
    BETWEEN_TAGS.replace_all(source.trim(), "><").into_owned()
}

fn optimize(file: &SourceFile) -> Result<Vec<u8>, TransformError> {
    match extension(&file.path).as_deref() {
        Some("png") => {
            let smaller = recompress_png(&file.contents)
                .map_err(|e| TransformError::invalid(&file.path, e.to_string()))?;
            if smaller.len() < file.contents.len() {
                Ok(smaller)
            } else {
                Ok(file.contents.clone())
            }
        }
        Some("svg") => Ok(squeeze_svg(file.text()?).into_bytes()),
        _ => Ok(file.contents.clone()),
    }
}

impl Transform for ImageTransform {
    fn name(&self) -> &str {
        "imagemin"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        files
            .iter()
            .map(|file| Ok(OutputFile::new(file.relative.clone(), optimize(file)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn file(relative: &str, contents: Vec<u8>) -> SourceFile {
        SourceFile {
            path: PathBuf::from("/src").join(relative),
            relative: relative.into(),
            contents,
        }
    }

    /// A flat-colour PNG written with the fastest, least compact settings.
    fn bloated_png() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(64, 64, Rgb([200, 30, 30]));
        let mut out = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            Cursor::new(&mut out),
            CompressionType::Fast,
            FilterType::NoFilter,
        );
        image::DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .unwrap();
        out
    }

    #[test]
    fn png_is_never_larger_and_keeps_pixels() {
        let original = bloated_png();
        let out = ImageTransform
            .apply(vec![file("assets/images/flat.png", original.clone())])
            .unwrap();
        let optimized = &out[0].contents;
        assert!(optimized.len() <= original.len());

        let a = image::load_from_memory(&original).unwrap().to_rgb8();
        let b = image::load_from_memory(optimized).unwrap().to_rgb8();
        assert_eq!(a, b);
    }

    #[test]
    fn corrupt_png_is_invalid() {
        let err = ImageTransform
            .apply(vec![file("broken.png", b"not a png".to_vec())])
            .unwrap_err();
        assert!(matches!(err, TransformError::Invalid { .. }));
    }

    #[test]
    fn svg_whitespace_between_tags_is_removed() {
        assert_eq!(
            squeeze_svg("<svg>\n  <path d=\"M0 0\"/>\n</svg>\n"),
            "<svg><path d=\"M0 0\"/></svg>"
        );
    }

    #[test]
    fn fonts_are_copied_verbatim() {
        let bytes = vec![0x00, 0x01, 0x00, 0x00, 0x42];
        let out = ImageTransform
            .apply(vec![file("assets/fonts/a.woff2", bytes.clone())])
            .unwrap();
        assert_eq!(out[0].contents, bytes);
        assert_eq!(out[0].relative, PathBuf::from("assets/fonts/a.woff2"));
    }

    #[test]
    fn optimisation_is_deterministic() {
        let original = bloated_png();
        assert_eq!(
            recompress_png(&original).unwrap(),
            recompress_png(&original).unwrap()
        );
    }
}
