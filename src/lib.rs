//! floodmapper: Rapid Flood Mapping from Sentinel-1 and Sentinel-2 Imagery
//!
//! This library maps flood extents by change detection between pre- and
//! post-event satellite imagery: Otsu thresholding on SAR backscatter,
//! NDWI masking on optical scenes, terrain-aware refinement and area
//! statistics, over pluggable imagery and terrain backends.

pub mod core;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, FloodError, FloodExtent, FloodResult, FloodSource, GeoTransform, Histogram,
    HistogramBucket, OrbitPass, SarBand,
};

pub use pipeline::{FloodMapper, FloodMappingConfig, FloodReport};
pub use raster::{Raster, Region};
