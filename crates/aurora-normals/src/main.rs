//! `aurora-normals <input.png> <output.normals>`
//!
//! Writes `width * height * 2` little-endian f32 values, no header.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use aurora_engine::assets::decode_image_rgba;
use aurora_engine::logging::{LoggingConfig, init_logging};
use aurora_engine::normals;

fn main() -> ExitCode {
    init_logging(LoggingConfig::default());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args).and_then(|(input, output)| run(&input, &output)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aurora-normals: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn parse_args(args: &[String]) -> Result<(PathBuf, PathBuf)> {
    match args {
        [input, output] => Ok((PathBuf::from(input), PathBuf::from(output))),
        _ => bail!(
            "expected 2 arguments, got {}\nusage: aurora-normals <input.png> <output.normals>",
            args.len()
        ),
    }
}

fn run(input: &Path, output: &Path) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let image = decode_image_rgba(&bytes).with_context(|| format!("decode {}", input.display()))?;

    let converted = normals::convert(&image);
    std::fs::write(output, normals::to_le_bytes(&converted))
        .with_context(|| format!("write {}", output.display()))?;

    log::info!(
        "{} ({}x{}) -> {} ({} floats)",
        input.display(),
        image.width(),
        image.height(),
        output.display(),
        converted.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Directory under the system temp dir, removed on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            static NEXT: AtomicU32 = AtomicU32::new(0);
            let path = std::env::temp_dir().join(format!(
                "aurora-normals-test-{}-{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn write_png(path: &Path, img: DynamicImage) {
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn converts_png_to_headerless_floats() {
        let dir = ScratchDir::new();
        let input = dir.path().join("tile.png");
        let output = dir.path().join("tile.normals");
        let img = RgbaImage::from_raw(2, 1, vec![127, 127, 255, 255, 0, 254, 255, 255]).unwrap();
        write_png(&input, DynamicImage::ImageRgba8(img));

        run(&input, &output).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(bytes.len(), 16);
        assert_eq!(floats, vec![0.0, 0.0, -1.0, 1.0]);
    }

    #[test]
    fn missing_input_names_read_step() {
        let dir = ScratchDir::new();
        let err = run(&dir.path().join("absent.png"), &dir.path().join("o")).unwrap_err();
        assert!(format!("{err:#}").starts_with("read "));
    }

    #[test]
    fn rgb_input_names_decode_step() {
        let dir = ScratchDir::new();
        let input = dir.path().join("rgb.png");
        write_png(&input, DynamicImage::ImageRgb8(RgbImage::new(1, 1)));

        let err = run(&input, &dir.path().join("o")).unwrap_err();
        assert!(format!("{err:#}").starts_with("decode "));
    }

    #[test]
    fn unwritable_output_names_write_step() {
        let dir = ScratchDir::new();
        let input = dir.path().join("tile.png");
        write_png(&input, DynamicImage::ImageRgba8(RgbaImage::new(1, 1)));

        let err = run(&input, &dir.path().join("missing/dir/out")).unwrap_err();
        assert!(format!("{err:#}").starts_with("write "));
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        assert!(parse_args(&["only-one".to_string()]).is_err());
        let (i, o) = parse_args(&["a.png".to_string(), "b.normals".to_string()]).unwrap();
        assert_eq!((i, o), (PathBuf::from("a.png"), PathBuf::from("b.normals")));
    }
}
