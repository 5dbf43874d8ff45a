//! Image recompression.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder};
use rayon::prelude::*;
use regex::Regex;

use crate::fileset::{self, SourceFile};
use crate::paths::{Category, PathTable};
use crate::task::{ReloadKind, Task, TaskError, TaskName, TaskReport};

/// Default JPEG re-encode quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

static SVG_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid SVG comment regex"));

/// Recompresses PNG and JPEG files, strips SVG markup, and copies everything
/// else unchanged.
#[derive(Debug, Clone)]
pub struct ImageTask {
    paths: Arc<PathTable>,
    jpeg_quality: u8,
}

/// Per-file outcome.
enum Outcome {
    Written(PathBuf),
    Failed,
}

impl ImageTask {
    pub fn new(paths: Arc<PathTable>, jpeg_quality: u8) -> Self {
        Self {
            paths,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    fn process(&self, file: &SourceFile, dest: &Path) -> Result<Outcome, TaskError> {
        let original = fs::read(&file.path).map_err(|e| TaskError::io(&file.path, e))?;
        let target = dest.join(&file.relative);

        let ext = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let optimized = match ext.as_str() {
            "png" => Some(recompress_png(&original)),
            "jpg" | "jpeg" => Some(recompress_jpeg(&original, self.jpeg_quality)),
            "svg" => minify_svg(&original).map(Ok),
            _ => None,
        };

        let bytes = match optimized {
            None => original,
            Some(Ok(smaller)) if smaller.len() < original.len() => {
                tracing::debug!(
                    path = %file.relative.display(),
                    before = original.len(),
                    after = smaller.len(),
                    "Recompressed image"
                );
                smaller
            }
            Some(Ok(_)) => original,
            Some(Err(e)) => {
                tracing::warn!(path = %file.path.display(), "Skipping image: {}", e);
                return Ok(Outcome::Failed);
            }
        };

        fileset::write_file(&target, bytes)?;
        Ok(Outcome::Written(target))
    }
}

impl Task for ImageTask {
    fn name(&self) -> TaskName {
        TaskName::Images
    }

    fn reload(&self) -> ReloadKind {
        ReloadKind::Full
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mapping = self.paths.get(Category::Images);

        let files = fileset::collect(&mapping.source, Category::Images.input_glob())?;
        fileset::ensure_dir(&mapping.dest)?;

        let outcomes = files
            .par_iter()
            .map(|file| self.process(file, &mapping.dest))
            .collect::<Result<Vec<_>, TaskError>>()?;

        let mut report = TaskReport::new(TaskName::Images);
        for outcome in outcomes {
            match outcome {
                Outcome::Written(path) => report.outputs.push(path),
                Outcome::Failed => report.failed += 1,
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            task = "images",
            files = report.outputs.len(),
            failed = report.failed,
            "Optimized images in {}ms",
            report.duration_ms
        );

        Ok(report)
    }
}

/// Lossless PNG re-encode at the highest compression level.
fn recompress_png(bytes: &[u8]) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let mut out = Vec::new();

    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color())?;

    Ok(out)
}

/// JPEG re-encode at `quality`.
fn recompress_jpeg(bytes: &[u8], quality: u8) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    let mut out = Vec::new();

    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;

    Ok(out)
}

/// Drop comments, indentation and blank lines from an SVG document.
///
/// Documents that carry `xml:space` or CDATA sections are left alone.
fn minify_svg(bytes: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.contains("xml:space") || text.contains("<![CDATA[") {
        return None;
    }

    let stripped = SVG_COMMENT.replace_all(text, "");
    let lines: Vec<&str> = stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    Some(lines.join("\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<PathTable>) {
        let temp = tempdir().unwrap();
        let paths = Arc::new(PathTable::new(
            temp.path().join("src"),
            temp.path().join("dist"),
        ));
        fs::create_dir_all(paths.source(Category::Images)).unwrap();
        (temp, paths)
    }

    #[test]
    fn empty_directory_succeeds() {
        let (_temp, paths) = setup();

        let report = ImageTask::new(paths.clone(), DEFAULT_JPEG_QUALITY)
            .run()
            .unwrap();

        assert!(report.outputs.is_empty());
        let dest = paths.dest(Category::Images);
        assert!(dest.is_dir());
        assert_eq!(fs::read_dir(dest).unwrap().count(), 0);
    }

    #[test]
    fn recompressed_png_decodes_to_same_pixels() {
        let (_temp, paths) = setup();
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(16, 16, |x, y| Rgba([x as u8 * 16, y as u8 * 16, 0, 255]));
        let src = paths.source(Category::Images).join("icons/grid.png");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        img.save(&src).unwrap();

        ImageTask::new(paths.clone(), DEFAULT_JPEG_QUALITY)
            .run()
            .unwrap();

        let out = paths.dest(Category::Images).join("icons/grid.png");
        let decoded = image::open(out).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), img.as_raw());
    }

    #[test]
    fn malformed_image_fails_only_that_file() {
        let (_temp, paths) = setup();
        let src = paths.source(Category::Images);
        fs::write(src.join("broken.png"), b"not a png").unwrap();
        fs::write(src.join("logo.svg"), b"<svg/>").unwrap();

        let report = ImageTask::new(paths.clone(), DEFAULT_JPEG_QUALITY)
            .run()
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.outputs.len(), 1);
        let dest = paths.dest(Category::Images);
        assert_eq!(fs::read(dest.join("logo.svg")).unwrap(), b"<svg/>");
        assert!(!dest.join("broken.png").exists());
    }

    #[test]
    fn svg_loses_comments_and_indentation() {
        let (_temp, paths) = setup();
        let src = paths.source(Category::Images);
        fs::write(
            src.join("logo.svg"),
            "<!-- exported by editor -->\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n    <rect width=\"2\"\n          height=\"2\"/>\n\n</svg>\n",
        )
        .unwrap();
        fs::write(
            src.join("text.svg"),
            "<svg xml:space=\"preserve\">\n  <text>  a  </text>\n</svg>\n",
        )
        .unwrap();

        ImageTask::new(paths.clone(), DEFAULT_JPEG_QUALITY)
            .run()
            .unwrap();

        let dest = paths.dest(Category::Images);
        assert_eq!(
            fs::read_to_string(dest.join("logo.svg")).unwrap(),
            "<svg xmlns=\"http://www.w3.org/2000/svg\">\n<rect width=\"2\"\nheight=\"2\"/>\n</svg>"
        );
        assert_eq!(
            fs::read_to_string(dest.join("text.svg")).unwrap(),
            "<svg xml:space=\"preserve\">\n  <text>  a  </text>\n</svg>\n"
        );
    }
}
