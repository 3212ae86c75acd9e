//! Catalog -> selection -> parallel fetch -> stack.

use crate::catalog::CatalogRow;
use crate::crs::TargetCrs;
use crate::error::{Result, StackError};
use crate::fetch::{self, FetchContext, SourceMode, TileResult};
use crate::select::{self, SelectedTile, SelectionCriteria};
use crate::stack::{self, OutputOptions, StackSummary};
use crate::window::BoundingBox;
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Every knob of one stacking run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_mode: SourceMode,
    pub concurrency: usize,
    pub bbox: BoundingBox,
    pub criteria: SelectionCriteria,
    pub target_crs: TargetCrs,
    pub proj_data_dir: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub output: OutputOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_mode: SourceMode::RemoteDirect,
            concurrency: DEFAULT_CONCURRENCY,
            bbox: BoundingBox::british_isles(),
            criteria: SelectionCriteria::default(),
            target_crs: TargetCrs::wgs84(),
            proj_data_dir: None,
            staging_dir: None,
            output: OutputOptions::default(),
        }
    }
}

/// Fetch every tile on a pool of `concurrency` workers.
///
/// Returns once all fetches have finished. Results keep the order of `tiles`;
/// failed tiles are logged and left out.
pub fn fetch_all(tiles: &[SelectedTile], ctx: &FetchContext, concurrency: usize) -> Result<Vec<TileResult>> {
    if concurrency == 0 {
        return Err(StackError::InvalidThreadCount(concurrency));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("fetch-{}", i))
        .build()?;

    let fetched: Vec<Option<TileResult>> = pool.install(|| {
        tiles
            .par_iter()
            .map(|tile| match fetch::fetch_tile(tile, ctx) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Skipping {}: {}", tile.url, e);
                    None
                }
            })
            .collect()
    });

    let results: Vec<TileResult> = fetched.into_iter().flatten().collect();
    info!("Fetched {} of {} tiles", results.len(), tiles.len());
    Ok(results)
}

/// Run the whole pipeline and write the stack to `output_path`
pub fn run(config: &PipelineConfig, catalog: &[CatalogRow], output_path: &Path) -> Result<StackSummary> {
    let selected = select::select_tiles(catalog, &config.criteria);
    info!("Processing {} GeoTIFF URLs after filtering", selected.len());

    if selected.is_empty() {
        return Err(StackError::NoBandsToWrite);
    }

    let ctx = FetchContext {
        source_mode: config.source_mode,
        bbox: config.bbox,
        target_crs: config.target_crs.clone(),
        proj_data_dir: config.proj_data_dir.clone(),
        staging_dir: config.staging_dir.clone(),
        client: fetch::http_client()?,
    };

    let results = fetch_all(&selected, &ctx, config.concurrency)?;
    stack::write_stack(output_path, &results, &config.output)
}
