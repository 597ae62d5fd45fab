//! Flood extent export to GeoTIFF (requires the `gdal` feature).

use serde::{Deserialize, Serialize};

/// Export parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Task description, used for logging only
    pub description: String,
    /// Output resolution in meters (informational; data is written at the
    /// raster's native grid)
    pub scale_m: f64,
    /// EPSG code of the coordinate reference system to stamp on the file
    pub crs_epsg: u32,
    /// Refuse to export grids larger than this
    pub max_pixels: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            description: "flood_extent".to_string(),
            scale_m: 10.0,
            crs_epsg: 4326,
            max_pixels: 10_000_000_000,
        }
    }
}

#[cfg(feature = "gdal")]
pub use gdal_backed::write_geotiff;

#[cfg(feature = "gdal")]
mod gdal_backed {
    use super::ExportOptions;
    use crate::raster::Raster;
    use crate::types::{FloodError, FloodResult};
    use gdal::DriverManager;
    use std::path::Path;

    /// Write all bands of `raster` to a GeoTIFF; invalid pixels become NaN
    /// and the band no-data value is set accordingly.
    pub fn write_geotiff<P: AsRef<Path>>(
        raster: &Raster,
        path: P,
        options: &ExportOptions,
    ) -> FloodResult<()> {
        let (rows, cols) = raster.shape();
        if (rows as u64) * (cols as u64) > options.max_pixels {
            return Err(FloodError::Processing(format!(
                "grid of {} pixels exceeds export cap of {}",
                rows * cols,
                options.max_pixels
            )));
        }
        log::info!(
            "exporting '{}' ({} x {}) to {}",
            options.description,
            rows,
            cols,
            path.as_ref().display()
        );

        let band_names = raster.band_names();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            path.as_ref(),
            cols as isize,
            rows as isize,
            band_names.len() as isize,
        )?;

        let t = raster.transform();
        dataset.set_geo_transform(&[
            t.top_left_x,
            t.pixel_width,
            t.rotation_x,
            t.top_left_y,
            t.rotation_y,
            t.pixel_height,
        ])?;
        dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_epsg(options.crs_epsg)?)?;

        let mask = raster.mask();
        for (index, name) in band_names.iter().enumerate() {
            let data = raster
                .band(name)
                .expect("band listed by band_names must exist");
            let flat: Vec<f32> = data
                .iter()
                .zip(mask.iter())
                .map(|(&v, &m)| if m { v } else { f32::NAN })
                .collect();
            let buffer = gdal::raster::Buffer::new((cols, rows), flat);
            let mut rasterband = dataset.rasterband(index as isize + 1)?;
            rasterband.write((0, 0), (cols, rows), &buffer)?;
            rasterband.set_no_data_value(Some(f64::NAN))?;
        }

        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::types::GeoTransform;

        #[test]
        fn test_export_respects_pixel_cap() {
            let raster = Raster::constant(
                "flood_extent_sar",
                1.0,
                100,
                100,
                GeoTransform::north_up(0.0, 1000.0, 10.0),
            )
            .unwrap();
            let dir = tempfile::tempdir().unwrap();
            let options = ExportOptions {
                max_pixels: 100,
                ..ExportOptions::default()
            };
            let result = write_geotiff(&raster, dir.path().join("flood.tif"), &options);
            assert!(matches!(result, Err(FloodError::Processing(_))));
        }

        #[test]
        fn test_export_roundtrip_writes_file() {
            let raster = Raster::constant(
                "flood_extent_sar",
                1.0,
                8,
                8,
                GeoTransform::north_up(0.0, 80.0, 10.0),
            )
            .unwrap();
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("flood.tif");
            write_geotiff(&raster, &path, &ExportOptions::default()).unwrap();
            assert!(path.exists());
        }
    }
}
