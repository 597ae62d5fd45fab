//! Data access: imagery catalogs, terrain models, AOI files, export

pub mod aoi;
pub mod catalog;
pub mod export;
pub mod precipitation;
pub mod terrain;

// Re-export main types
pub use aoi::{load_aoi_from_geojson, load_aoi_or_default};
pub use catalog::{
    Dated, ImageryCatalog, OpticalQuery, OpticalScene, SarQuery, SarScene, StaticCatalog,
    MIN_SCENES,
};
pub use export::ExportOptions;
pub use precipitation::{
    precipitation_sum, PrecipitationProvider, PrecipitationQuery, PrecipitationScene,
    StaticPrecipitation, PRECIPITATION_BAND,
};
#[cfg(feature = "gdal")]
pub use export::write_geotiff;
pub use terrain::{slope_degrees, InMemoryDem, TerrainProvider, ELEVATION_BAND, SLOPE_BAND};
