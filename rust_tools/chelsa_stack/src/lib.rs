// Library exports for testing and reuse

pub mod catalog;
pub mod cli;
pub mod cog;
pub mod crs;
pub mod error;
pub mod fetch;
pub mod io;
pub mod pipeline;
pub mod select;
pub mod stack;
pub mod window;

// Re-export commonly used types
pub use catalog::{read_catalog, CatalogRow};
pub use error::{Result, StackError};
pub use fetch::{fetch_tile, FetchContext, SourceMode, TileResult};
pub use io::GeoMetadata;
pub use pipeline::{run, PipelineConfig};
pub use select::{select_tiles, SelectedTile, SelectionCriteria};
pub use stack::{write_stack, OutputOptions, StackSummary};
pub use window::BoundingBox;
