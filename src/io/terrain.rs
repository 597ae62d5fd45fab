//! Terrain model access and slope derivation.

use ndarray::Array2;

use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodResult};

/// Band name of elevation rasters
pub const ELEVATION_BAND: &str = "elevation";
/// Band name of derived slope rasters
pub const SLOPE_BAND: &str = "slope";

/// External terrain model collaborator
pub trait TerrainProvider {
    /// Elevation raster clipped to `region`
    fn elevation(&self, region: &Region) -> FloodResult<Raster>;
}

/// Terrain provider serving a single in-memory DEM
#[derive(Debug, Clone)]
pub struct InMemoryDem {
    dem: Raster,
}

impl InMemoryDem {
    pub fn new(dem: Raster) -> FloodResult<Self> {
        let dem = dem.select(dem.single_band_name()?)?.rename(ELEVATION_BAND)?;
        Ok(Self { dem })
    }
}

impl TerrainProvider for InMemoryDem {
    fn elevation(&self, region: &Region) -> FloodResult<Raster> {
        let clipped = self.dem.clip(region);
        if clipped.mask().iter().all(|&m| !m) {
            return Err(FloodError::MissingInput(
                "terrain model does not cover the requested region".to_string(),
            ));
        }
        Ok(clipped)
    }
}

/// Terrain slope in degrees from an elevation raster.
///
/// Central differences over the ground pixel spacing, falling back to the
/// center value where a neighbor is missing or invalid; cells invalid in the
/// DEM stay invalid in the slope raster.
pub fn slope_degrees(dem: &Raster) -> FloodResult<Raster> {
    let data = dem.single_band_data()?;
    let mask = dem.mask();
    let (rows, cols) = dem.shape();
    let px = dem.transform().pixel_width.abs();
    let py = dem.transform().pixel_height.abs();
    if px <= 0.0 || py <= 0.0 {
        return Err(FloodError::Processing(
            "DEM has degenerate pixel spacing".to_string(),
        ));
    }

    let mut slope = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            if !mask[[r, c]] {
                continue;
            }
            let zc = data[[r, c]] as f64;
            let sample = |rr: usize, cc: usize| -> f64 {
                if mask[[rr, cc]] {
                    data[[rr, cc]] as f64
                } else {
                    zc
                }
            };

            let (z_w, span_w) = if c > 0 { (sample(r, c - 1), 1.0) } else { (zc, 0.0) };
            let (z_e, span_e) = if c + 1 < cols {
                (sample(r, c + 1), 1.0)
            } else {
                (zc, 0.0)
            };
            let (z_n, span_n) = if r > 0 { (sample(r - 1, c), 1.0) } else { (zc, 0.0) };
            let (z_s, span_s) = if r + 1 < rows {
                (sample(r + 1, c), 1.0)
            } else {
                (zc, 0.0)
            };

            let span_x = (span_w + span_e) * px;
            let span_y = (span_n + span_s) * py;
            let dzdx = if span_x > 0.0 { (z_e - z_w) / span_x } else { 0.0 };
            let dzdy = if span_y > 0.0 { (z_s - z_n) / span_y } else { 0.0 };
            slope[[r, c]] = (dzdx.hypot(dzdy)).atan().to_degrees() as f32;
        }
    }

    Raster::single_band(SLOPE_BAND, slope, mask.clone(), dem.transform().clone())
}

/// Load a DEM from a raster file into an [`ELEVATION_BAND`] raster.
/// No-data cells become invalid pixels.
#[cfg(feature = "gdal")]
pub fn load_dem<P: AsRef<std::path::Path>>(path: P) -> FloodResult<Raster> {
    use crate::types::GeoTransform;
    use gdal::Dataset;

    log::info!("loading DEM from {}", path.as_ref().display());
    let dataset = Dataset::open(path.as_ref())?;
    let geo = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value().unwrap_or(-32768.0) as f32;
    let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

    let data = Array2::from_shape_vec((height, width), band_data.data)
        .map_err(|e| FloodError::Processing(format!("failed to reshape DEM data: {}", e)))?;
    let mask = data.mapv(|v| v.is_finite() && v != nodata);

    Raster::single_band(
        ELEVATION_BAND,
        data,
        mask,
        GeoTransform {
            top_left_x: geo[0],
            pixel_width: geo[1],
            rotation_x: geo[2],
            top_left_y: geo[3],
            rotation_y: geo[4],
            pixel_height: geo[5],
        },
    )
}
