use crate::cog;
use crate::error::{Result, StackError};
use crate::fetch::TileResult;
use crate::io;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// How the output stack is encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub compression: String,
    pub block_size: usize,
    pub cog: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            block_size: 512,
            cog: false,
        }
    }
}

const COMPRESSIONS: [&str; 4] = ["DEFLATE", "LZW", "ZSTD", "NONE"];

impl OutputOptions {
    /// Reject codecs GTiff is not asked to handle here and block sizes it cannot tile with
    pub fn validate(&self) -> Result<()> {
        if !COMPRESSIONS.contains(&self.compression.as_str()) {
            return Err(StackError::InvalidCompression(self.compression.clone()));
        }
        if self.block_size == 0 || self.block_size % 16 != 0 {
            return Err(StackError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }

    /// GTiff creation options for the stack
    pub fn creation_options(&self) -> Vec<String> {
        let block = self.block_size;
        let mut opts = vec!["TILED=YES".to_string(), "BIGTIFF=IF_SAFER".to_string()];
        opts.push(format!("COMPRESS={}", self.compression));
        opts.extend([format!("BLOCKXSIZE={}", block), format!("BLOCKYSIZE={}", block)]);
        opts
    }
}

/// What ended up on disk
#[derive(Debug, Clone, PartialEq)]
pub struct StackSummary {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub band_labels: Vec<String>,
}

fn create_progress_bar(len: u64, title: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{msg} ({pos}/{len}) [{bar:40.cyan/blue}] {percent}% • {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    ProgressBar::new(len).with_message(title.to_string()).with_style(style)
}

/// Write `tiles` as bands 1..N of one GeoTIFF at `path`.
///
/// The profile (size, transform, projection, nodata) comes from the first
/// tile. The stack is built in a temporary directory next to `path` and
/// renamed into place only once every band is written, so a failed write
/// leaves nothing behind. An empty input creates no file and returns
/// [`StackError::NoBandsToWrite`].
pub fn write_stack(path: &Path, tiles: &[TileResult], options: &OutputOptions) -> Result<StackSummary> {
    let first = tiles.first().ok_or(StackError::NoBandsToWrite)?;
    options.validate()?;

    let profile = first.meta.clone();
    info!(
        "Stacking {} bands of {}x{} pixels",
        tiles.len(),
        profile.width,
        profile.height
    );

    let out_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&out_dir)?;

    let staging = tempfile::Builder::new()
        .prefix(".chelsa_stack_")
        .tempdir_in(&out_dir)?;
    let stack_path = staging.path().join("stack.tif");

    {
        let mut dataset =
            io::create_output_dataset(&stack_path, &profile, tiles.len(), options.creation_options())?;

        let progress = create_progress_bar(tiles.len() as u64, "Writing bands to GeoTIFF");
        for (i, tile) in tiles.iter().enumerate() {
            io::write_band(&mut dataset, i + 1, &tile.data, &tile.band_label, profile.nodata)?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        cog::validate_tiled_structure(&dataset)?;
    }

    let finished = if options.cog {
        let cog_path = staging.path().join("stack_cog.tif");
        cog::convert_to_cog(&stack_path, &cog_path, &options.compression, options.block_size)?;
        cog_path
    } else {
        stack_path
    };

    if path.exists() {
        warn!("Replacing existing file {}", path.display());
    }
    fs::rename(&finished, path)?;
    info!("Saved {}", path.display());

    Ok(StackSummary {
        path: path.to_path_buf(),
        width: profile.width,
        height: profile.height,
        band_labels: tiles.iter().map(|t| t.band_label.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stack_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("empty.tif");

        let err = write_stack(&out, &[], &OutputOptions::default()).unwrap_err();
        assert!(matches!(err, StackError::NoBandsToWrite));
        assert!(!out.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_output_options_validation() {
        assert!(OutputOptions::default().validate().is_ok());

        let zstd = OutputOptions {
            compression: "ZSTD".to_string(),
            block_size: 256,
            cog: true,
        };
        assert!(zstd.validate().is_ok());

        for (compression, block_size) in [("deflate", 512), ("JPEG", 512), ("LZW", 0), ("LZW", 500)] {
            let options = OutputOptions {
                compression: compression.to_string(),
                block_size,
                cog: false,
            };
            assert!(options.validate().is_err(), "{} / {}", compression, block_size);
        }
    }

    #[test]
    fn test_creation_options_are_tiled() {
        let opts = OutputOptions::default().creation_options();
        assert_eq!(
            opts,
            vec![
                "TILED=YES",
                "BIGTIFF=IF_SAFER",
                "COMPRESS=DEFLATE",
                "BLOCKXSIZE=512",
                "BLOCKYSIZE=512",
            ]
        );
    }
}
