//! Resizes a reference image so it matches the requested video resolution
//! exactly. Every failure here is soft: the original image is used instead.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail, eyre},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{MediaGenError, media};

/// An external image utility able to report and change pixel dimensions.
pub trait ImageTool {
    /// Returns `(width, height)` in pixels.
    fn probe(&self, path: &Path) -> Result<(u32, u32)>;
    /// Resizes the file in place to exactly `width` x `height`.
    fn resize(&self, path: &Path, width: u32, height: u32) -> Result<()>;
}

pub type ImageToolBox = Box<dyn ImageTool + Send + Sync>;

#[derive(
    Debug, Clone, Copy, Display, clap::ValueEnum, Serialize, Deserialize, PartialEq, Eq, Default,
)]
pub enum ImageToolKind {
    /// macOS `sips`
    #[default]
    #[strum(to_string = "sips")]
    Sips,
    /// ImageMagick 7 `magick`
    #[strum(to_string = "magick")]
    Magick,
}

impl ImageToolKind {
    pub fn make(&self) -> ImageToolBox {
        match self {
            ImageToolKind::Sips => Box::new(Sips),
            ImageToolKind::Magick => Box::new(ImageMagick),
        }
    }
}

pub struct Sips;

impl ImageTool for Sips {
    fn probe(&self, path: &Path) -> Result<(u32, u32)> {
        let out = run(Command::new("sips")
            .arg("-g")
            .arg("pixelWidth")
            .arg("-g")
            .arg("pixelHeight")
            .arg(path))?;
        parse_sips_dimensions(&out).ok_or_else(|| eyre!("unexpected sips output:\n{out}"))
    }

    fn resize(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        // sips takes height before width
        run(Command::new("sips")
            .arg("-z")
            .arg(height.to_string())
            .arg(width.to_string())
            .arg(path))?;
        Ok(())
    }
}

pub struct ImageMagick;

impl ImageTool for ImageMagick {
    fn probe(&self, path: &Path) -> Result<(u32, u32)> {
        let mut first_frame = path.as_os_str().to_owned();
        first_frame.push("[0]");
        let out = run(Command::new("magick")
            .arg("identify")
            .arg("-format")
            .arg("%w %h")
            .arg(first_frame))?;
        parse_magick_dimensions(&out).ok_or_else(|| eyre!("unexpected identify output:\n{out}"))
    }

    fn resize(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        run(Command::new("magick")
            .arg("mogrify")
            .arg("-resize")
            .arg(format!("{width}x{height}!"))
            .arg(path))?;
        Ok(())
    }
}

fn run(cmd: &mut Command) -> Result<String> {
    debug!("running {cmd:?}");
    let output = cmd
        .output()
        .wrap_err_with(|| format!("spawning {:?}", cmd.get_program()))?;
    if !output.status.success() {
        bail!(
            "{:?} exited with {}: {}",
            cmd.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn parse_sips_dimensions(output: &str) -> Option<(u32, u32)> {
    let field = |name: &str| {
        output.lines().find_map(|line| {
            let value = line.trim().strip_prefix(name)?.strip_prefix(':')?;
            value.trim().parse::<u32>().ok()
        })
    };
    Some((field("pixelWidth")?, field("pixelHeight")?))
}

pub fn parse_magick_dimensions(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Parses `<width>x<height>`, e.g. `1280x720`. Named sizes such as `720P` give `None`.
pub fn parse_size_spec(spec: &str) -> Option<(u32, u32)> {
    let (w, h) = spec.trim().split_once('x')?;
    let dim = |s: &str| {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>().ok().filter(|&v| v > 0)
    };
    Some((dim(w)?, dim(h)?))
}

/// The image to upload, plus the resized temporary copy it may live in.
///
/// The copy is removed by [`PreparedImage::cleanup`], or on drop if cleanup
/// was never reached.
#[derive(Debug)]
pub struct PreparedImage {
    path: PathBuf,
    temp: Option<PathBuf>,
}

impl PreparedImage {
    fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            temp: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_deref()
    }

    pub fn cleanup(mut self) {
        self.remove_temp();
    }

    fn remove_temp(&mut self) {
        if let Some(temp) = self.temp.take() {
            match fs::remove_file(&temp) {
                Ok(()) => debug!("removed temporary image {}", temp.display()),
                Err(e) => warn!("Could not remove temporary image {}: {e}", temp.display()),
            }
        }
    }
}

impl Drop for PreparedImage {
    fn drop(&mut self) {
        self.remove_temp();
    }
}

/// Makes sure the image uploaded for `size_spec` has exactly those dimensions.
///
/// Without a `WxH` spec, with matching dimensions, or when the tool fails, the
/// original file is used as is.
pub fn prepare_input_image(
    original: &Path,
    size_spec: &str,
    tool: &dyn ImageTool,
    temp_dir: &Path,
) -> PreparedImage {
    let Some((width, height)) = parse_size_spec(size_spec) else {
        debug!("size {size_spec:?} is not WxH, skipping resize");
        return PreparedImage::original(original);
    };

    let current = match tool.probe(original) {
        Ok(dims) => dims,
        Err(e) => {
            warn!(
                "{}",
                MediaGenError::ImageProbeFailed {
                    path: original.to_path_buf(),
                    reason: format!("{e:#}"),
                }
            );
            return PreparedImage::original(original);
        }
    };

    if current == (width, height) {
        debug!("input image already is {width}x{height}");
        return PreparedImage::original(original);
    }

    info!(
        "Resizing input image from {}x{} to {width}x{height}",
        current.0, current.1
    );
    let temp = temp_copy_path(original, temp_dir);
    if let Err(e) = fs::copy(original, &temp) {
        warn!(
            "{}",
            MediaGenError::ImageResizeFailed {
                path: original.to_path_buf(),
                width,
                height,
                reason: format!("copying to {}: {e}", temp.display()),
            }
        );
        return PreparedImage::original(original);
    }

    if let Err(e) = tool.resize(&temp, width, height) {
        let _ = fs::remove_file(&temp);
        warn!(
            "{}",
            MediaGenError::ImageResizeFailed {
                path: original.to_path_buf(),
                width,
                height,
                reason: format!("{e:#}"),
            }
        );
        return PreparedImage::original(original);
    }

    PreparedImage {
        path: temp.clone(),
        temp: Some(temp),
    }
}

fn temp_copy_path(original: &Path, temp_dir: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    let name = match original.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_resized_{}.{ext}", media::timestamp_millis()),
        None => format!("{stem}_resized_{}", media::timestamp_millis()),
    };
    temp_dir.join(name)
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct FakeTool {
        dims: Option<(u32, u32)>,
        fail_resize: bool,
        resized: Mutex<Vec<(PathBuf, u32, u32)>>,
    }

    impl ImageTool for FakeTool {
        fn probe(&self, _path: &Path) -> Result<(u32, u32)> {
            self.dims.ok_or_else(|| eyre!("probe failed"))
        }

        fn resize(&self, path: &Path, width: u32, height: u32) -> Result<()> {
            self.resized
                .lock()
                .unwrap()
                .push((path.to_path_buf(), width, height));
            if self.fail_resize {
                bail!("resize failed");
            }
            fs::write(path, format!("{width}x{height}"))?;
            Ok(())
        }
    }

    fn input_image(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("cat.png");
        fs::write(&path, b"original").unwrap();
        path
    }

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn size_spec_parsing() {
        assert_eq!(parse_size_spec("1280x720"), Some((1280, 720)));
        assert_eq!(parse_size_spec(" 720x1280 "), Some((720, 1280)));
        assert_eq!(parse_size_spec("720P"), None);
        assert_eq!(parse_size_spec("1280X720"), None);
        assert_eq!(parse_size_spec("x720"), None);
        assert_eq!(parse_size_spec("+1x2"), None);
        assert_eq!(parse_size_spec("0x720"), None);
        assert_eq!(parse_size_spec("1280x720x3"), None);
    }

    #[test]
    fn tool_output_parsing() {
        let sips = "/tmp/cat.png\n  pixelWidth: 1024\n  pixelHeight: 768\n";
        assert_eq!(parse_sips_dimensions(sips), Some((1024, 768)));
        assert_eq!(parse_sips_dimensions("/tmp/cat.png\n"), None);
        assert_eq!(parse_magick_dimensions("640 480"), Some((640, 480)));
        assert_eq!(parse_magick_dimensions("640"), None);
    }

    #[test]
    fn matching_dimensions_need_no_copy() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool {
            dims: Some((1280, 720)),
            ..Default::default()
        };

        let prepared = prepare_input_image(&original, "1280x720", &tool, temp_dir.path());

        assert_eq!(prepared.path(), original);
        assert!(prepared.temp_path().is_none());
        assert!(tool.resized.lock().unwrap().is_empty());
        assert_eq!(files_in(temp_dir.path()), 0);
    }

    #[test]
    fn mismatched_dimensions_resize_a_single_copy() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool {
            dims: Some((640, 480)),
            ..Default::default()
        };

        let prepared = prepare_input_image(&original, "1280x720", &tool, temp_dir.path());

        let temp = prepared.temp_path().unwrap().to_path_buf();
        assert_eq!(prepared.path(), temp);
        assert!(temp.starts_with(temp_dir.path()));
        assert_eq!(fs::read_to_string(&temp).unwrap(), "1280x720");
        assert_eq!(fs::read(&original).unwrap(), b"original");
        assert_eq!(*tool.resized.lock().unwrap(), vec![(temp.clone(), 1280, 720)]);
        assert_eq!(files_in(temp_dir.path()), 1);

        prepared.cleanup();
        assert!(!temp.exists());
        assert!(original.exists());
    }

    #[test]
    fn dropping_removes_the_copy() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool {
            dims: Some((640, 480)),
            ..Default::default()
        };

        {
            let _prepared = prepare_input_image(&original, "1280x720", &tool, temp_dir.path());
            assert_eq!(files_in(temp_dir.path()), 1);
        }
        assert_eq!(files_in(temp_dir.path()), 0);
    }

    #[test]
    fn probe_failure_falls_back_to_original() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool::default();

        let prepared = prepare_input_image(&original, "1280x720", &tool, temp_dir.path());

        assert_eq!(prepared.path(), original);
        assert!(tool.resized.lock().unwrap().is_empty());
        assert_eq!(files_in(temp_dir.path()), 0);
    }

    #[test]
    fn resize_failure_deletes_the_copy() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool {
            dims: Some((640, 480)),
            fail_resize: true,
            ..Default::default()
        };

        let prepared = prepare_input_image(&original, "1280x720", &tool, temp_dir.path());

        assert_eq!(prepared.path(), original);
        assert!(prepared.temp_path().is_none());
        assert_eq!(tool.resized.lock().unwrap().len(), 1);
        assert_eq!(files_in(temp_dir.path()), 0);
    }

    #[test]
    fn named_sizes_skip_the_tool() {
        let input_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original = input_image(&input_dir);
        let tool = FakeTool {
            dims: Some((640, 480)),
            ..Default::default()
        };

        let prepared = prepare_input_image(&original, "720P", &tool, temp_dir.path());
        assert_eq!(prepared.path(), original);
        assert!(tool.resized.lock().unwrap().is_empty());
    }
}
