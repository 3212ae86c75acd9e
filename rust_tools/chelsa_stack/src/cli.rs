use crate::crs::TargetCrs;
use crate::error::Result;
use crate::fetch::SourceMode;
use crate::pipeline::{PipelineConfig, DEFAULT_CONCURRENCY};
use crate::select::{InclusiveRange, SelectionCriteria};
use crate::stack::OutputOptions;
use crate::window::BoundingBox;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chelsa-stack")]
#[command(about = "Crop and stack CHELSA TraCE21k tiles into a regional multi-band GeoTIFF")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Select tiles from a catalog, crop them to a bounding box and stack them
    Stack(StackArgs),
    /// Scrape the object store listing for a variable and write a catalog CSV
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct StackArgs {
    /// Catalog CSV with columns variable,month,timeID,url
    #[arg(short, long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// Variable to extract (e.g. pr, tasmax, bio12, dem)
    #[arg(long, value_name = "NAME")]
    pub variable: Option<String>,

    /// Inclusive month range for monthly variables (e.g. 6,8 or 1)
    #[arg(long, value_name = "LOW,HIGH", value_parser = parse_month_range)]
    pub months: Option<InclusiveRange<u8>>,

    /// Inclusive timeID range (e.g. -200,20)
    #[arg(long, value_name = "LOW,HIGH", value_parser = parse_time_range, allow_hyphen_values = true)]
    pub time_ids: Option<InclusiveRange<i32>>,

    /// Bounding box in degrees (default: Britain and Ireland)
    #[arg(
        long,
        value_name = "MIN_LON,MIN_LAT,MAX_LON,MAX_LAT",
        value_parser = parse_bbox,
        allow_hyphen_values = true
    )]
    pub bbox: Option<BoundingBox>,

    /// Output GeoTIFF path (default: timestamped name in the current directory)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of concurrent fetches
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
    pub threads: usize,

    /// Download each tile to a temporary file instead of reading it in place
    #[arg(long)]
    pub staged: bool,

    /// Output coordinate reference
    #[arg(long, value_name = "AUTHORITY:CODE", default_value = "EPSG:4326", value_parser = parse_crs)]
    pub target_crs: TargetCrs,

    /// PROJ data directory handed to the reprojection step
    #[arg(long, value_name = "DIR")]
    pub proj_data: Option<PathBuf>,

    /// Directory for staged downloads and reprojected tiles (default: system temp)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Compression: DEFLATE, LZW, ZSTD or NONE
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compression: String,

    /// Internal tile size in pixels (multiple of 16)
    #[arg(long, value_name = "PIXELS", default_value_t = 512)]
    pub block_size: usize,

    /// Write a Cloud-Optimized GeoTIFF (needs gdal_translate)
    #[arg(long)]
    pub cog: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Variable folder to list (e.g. pr, bio12)
    #[arg(long, value_name = "NAME")]
    pub variable: String,

    /// Stop after this many tiles
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Write the catalog here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

fn parse_month_range(s: &str) -> std::result::Result<InclusiveRange<u8>, String> {
    let range: InclusiveRange<u8> = s.parse().map_err(|e| format!("{}", e))?;
    if range.low < 1 || range.high > 12 {
        return Err(format!("months must be within 1-12, got {}", s));
    }
    Ok(range)
}

fn parse_time_range(s: &str) -> std::result::Result<InclusiveRange<i32>, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn parse_bbox(s: &str) -> std::result::Result<BoundingBox, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn parse_crs(s: &str) -> std::result::Result<TargetCrs, String> {
    s.parse().map_err(|e| format!("{}", e))
}

impl StackArgs {
    /// Validate the arguments and turn them into an explicit pipeline config
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let output = OutputOptions {
            compression: self.compression.clone(),
            block_size: self.block_size,
            cog: self.cog,
        };
        output.validate()?;
        if self.threads == 0 {
            return Err(crate::error::StackError::InvalidThreadCount(self.threads));
        }

        Ok(PipelineConfig {
            source_mode: if self.staged {
                SourceMode::StagedDownload
            } else {
                SourceMode::RemoteDirect
            },
            concurrency: self.threads,
            bbox: self.bbox.unwrap_or_else(BoundingBox::british_isles),
            criteria: SelectionCriteria {
                variable: self.variable.clone(),
                month_range: self.months,
                time_range: self.time_ids,
            },
            target_crs: self.target_crs.clone(),
            proj_data_dir: self.proj_data.clone(),
            staging_dir: self.staging_dir.clone(),
            output,
        })
    }

    /// Output path, or `CHELSA_TraCE21k_V1.0_{variable}_{timestamp}.tif`
    pub fn output_path(&self, now: chrono::NaiveDateTime) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => PathBuf::from(format!(
                "CHELSA_TraCE21k_V1.0_{}_{}.tif",
                self.variable.as_deref().unwrap_or("all"),
                now.format("%Y%m%dT%H%M%S")
            )),
        }
    }
}
