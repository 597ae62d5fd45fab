//! End-to-end flood mapping pipeline.
//!
//! Wires the imagery catalog, terrain provider and detection stages into a
//! single run over an area of interest and an event date. The SAR and
//! optical branches are independent: a branch with insufficient imagery is
//! skipped with a warning, and the run fails only when neither branch can
//! produce a flood extent.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::area::calculate_area;
use crate::core::change::{detect_change, detect_change_optical};
use crate::core::otsu::OtsuParams;
use crate::core::preprocess::{median_composite, ndwi, select_pre_post, speckle_smoothing};
use crate::core::refine::{refine, RefineParams, SlopeUnit};
use crate::io::catalog::{ImageryCatalog, OpticalQuery, SarQuery};
use crate::io::precipitation::{precipitation_sum, PrecipitationProvider, PrecipitationQuery};
use crate::io::terrain::TerrainProvider;
use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodExtent, FloodResult, FloodSource, SarBand};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodMappingConfig {
    /// Days before/after the event to search for Sentinel-1 scenes
    pub search_window_days: i64,
    /// Days before/after the event to search for Sentinel-2 scenes
    pub optical_window_days: i64,
    /// Maximum allowed Sentinel-2 cloudy-pixel percentage
    pub cloud_pixel_percentage: f32,
    /// Speckle smoothing kernel radius in meters
    pub smoothing_radius_m: f64,
    /// Histogram buckets for threshold estimation
    pub otsu_bin_count: usize,
    /// Reduction scale for threshold estimation, meters
    pub otsu_scale_m: f64,
    /// Fallback threshold when no histogram can be built, dB
    pub default_threshold_db: f64,
    /// SAR band used for water thresholding
    pub sar_threshold_band: SarBand,
    /// Minimum connected component size kept during refinement
    pub min_connected_pixels: u32,
    /// Maximum terrain slope kept during refinement
    pub max_slope_threshold: f64,
    /// Unit of `max_slope_threshold`
    pub slope_unit: SlopeUnit,
    /// Reduction scale for area statistics, meters
    pub area_scale_m: f64,
    /// Days before/after the event to search for precipitation grids
    pub precipitation_window_days: i64,
    /// Reduction scale for the precipitation statistic, meters
    pub precipitation_scale_m: f64,
}

impl Default for FloodMappingConfig {
    fn default() -> Self {
        Self {
            search_window_days: 12,
            optical_window_days: 20,
            cloud_pixel_percentage: 30.0,
            smoothing_radius_m: 30.0,
            otsu_bin_count: 256,
            otsu_scale_m: 30.0,
            default_threshold_db: -20.0,
            sar_threshold_band: SarBand::VH,
            min_connected_pixels: 8,
            max_slope_threshold: 5.0,
            slope_unit: SlopeUnit::Degrees,
            area_scale_m: 10.0,
            precipitation_window_days: 2,
            precipitation_scale_m: 1000.0,
        }
    }
}

impl FloodMappingConfig {
    pub fn otsu_params(&self) -> OtsuParams {
        OtsuParams {
            bin_count: self.otsu_bin_count,
            scale_m: self.otsu_scale_m,
            default_threshold_db: self.default_threshold_db,
        }
    }

    pub fn refine_params(&self) -> RefineParams {
        RefineParams {
            min_connected_pixels: self.min_connected_pixels,
            max_slope: self.max_slope_threshold,
            slope_unit: self.slope_unit,
        }
    }

    pub fn sar_query(&self) -> SarQuery {
        SarQuery {
            window_days: self.search_window_days,
            ..SarQuery::default()
        }
    }

    pub fn optical_query(&self) -> OpticalQuery {
        OpticalQuery {
            window_days: self.optical_window_days,
            max_cloud_pct: self.cloud_pixel_percentage,
        }
    }

    pub fn precipitation_query(&self) -> PrecipitationQuery {
        PrecipitationQuery {
            window_days: self.precipitation_window_days,
            scale_m: self.precipitation_scale_m,
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct FloodReport {
    /// Refined SAR flood extent, if the SAR branch ran
    pub sar: Option<FloodExtent>,
    /// SAR flood area before refinement, km^2
    pub sar_initial_area_km2: Option<f64>,
    /// Optical (NDWI) flood extent, if the optical branch ran
    pub optical: Option<FloodExtent>,
    /// Pre-event open water area from NDWI, km^2
    pub optical_water_pre_km2: Option<f64>,
    /// Post-event open water area from NDWI, km^2
    pub optical_water_post_km2: Option<f64>,
    /// Summed forecast precipitation over the AOI, mm
    pub forecast_precipitation_sum: Option<f64>,
    /// Reasons for skipped branches
    pub warnings: Vec<String>,
}

/// Flood mapping pipeline over pluggable imagery and terrain backends
pub struct FloodMapper<'a> {
    catalog: &'a dyn ImageryCatalog,
    terrain: &'a dyn TerrainProvider,
    precipitation: Option<&'a dyn PrecipitationProvider>,
    config: FloodMappingConfig,
}

/// Imagery gaps skip a branch; anything else aborts the run.
fn is_skippable(error: &FloodError) -> bool {
    matches!(
        error,
        FloodError::InsufficientData { .. } | FloodError::MissingInput(_)
    )
}

impl<'a> FloodMapper<'a> {
    pub fn new(
        catalog: &'a dyn ImageryCatalog,
        terrain: &'a dyn TerrainProvider,
        config: FloodMappingConfig,
    ) -> Self {
        Self {
            catalog,
            terrain,
            precipitation: None,
            config,
        }
    }

    /// Attach a precipitation forecast source; its summed total over the AOI
    /// is added to the report.
    pub fn with_precipitation(mut self, provider: &'a dyn PrecipitationProvider) -> Self {
        self.precipitation = Some(provider);
        self
    }

    /// Map the flood around `event_date` inside `aoi`.
    pub fn run(&self, aoi: &Region, event_date: NaiveDate) -> FloodResult<FloodReport> {
        log::info!("flood mapping run for event date {}", event_date);
        let mut report = FloodReport {
            sar: None,
            sar_initial_area_km2: None,
            optical: None,
            optical_water_pre_km2: None,
            optical_water_post_km2: None,
            forecast_precipitation_sum: None,
            warnings: Vec::new(),
        };

        match self.run_sar(aoi, event_date) {
            Ok((extent, initial_area)) => {
                report.sar = Some(extent);
                report.sar_initial_area_km2 = Some(initial_area);
            }
            Err(e) if is_skippable(&e) => {
                log::warn!("SAR branch skipped: {}", e);
                report.warnings.push(format!("SAR branch skipped: {}", e));
            }
            Err(e) => return Err(e),
        }

        match self.run_optical(aoi, event_date) {
            Ok((extent, pre_km2, post_km2)) => {
                report.optical = Some(extent);
                report.optical_water_pre_km2 = Some(pre_km2);
                report.optical_water_post_km2 = Some(post_km2);
            }
            Err(e) if is_skippable(&e) => {
                log::warn!("optical branch skipped: {}", e);
                report
                    .warnings
                    .push(format!("optical branch skipped: {}", e));
            }
            Err(e) => return Err(e),
        }

        if let Some(provider) = self.precipitation {
            let query = self.config.precipitation_query();
            match provider.forecast(aoi, event_date, &query)? {
                Some(forecast) => {
                    let total = precipitation_sum(&forecast, aoi, query.scale_m)?;
                    log::info!("forecast precipitation over AOI: {:.1} mm summed", total);
                    report.forecast_precipitation_sum = Some(total);
                }
                None => {
                    report
                        .warnings
                        .push(format!("no precipitation forecast around {}", event_date));
                }
            }
        }

        if report.sar.is_none() && report.optical.is_none() {
            return Err(FloodError::Processing(format!(
                "no usable imagery for {}: {}",
                event_date,
                report.warnings.join("; ")
            )));
        }
        Ok(report)
    }

    fn run_sar(&self, aoi: &Region, event_date: NaiveDate) -> FloodResult<(FloodExtent, f64)> {
        let scenes = self
            .catalog
            .sentinel1_scenes(aoi, event_date, &self.config.sar_query())?;
        let (pre, post) = select_pre_post(&scenes, event_date, self.config.search_window_days)?;

        let pre = speckle_smoothing(&pre.raster, self.config.smoothing_radius_m)?;
        let post = speckle_smoothing(&post.raster, self.config.smoothing_radius_m)?;

        let flood = detect_change(
            &pre,
            &post,
            self.config.sar_threshold_band,
            aoi,
            aoi,
            &self.config.otsu_params(),
        )?;
        let initial_area = calculate_area(&flood, self.config.area_scale_m)?;
        log::info!("SAR flood extent before refinement: {:.4} km^2", initial_area);

        let dem = self.terrain.elevation(aoi)?;
        let refined = refine(&flood, aoi, &dem, &self.config.refine_params())?;
        let area_km2 = calculate_area(&refined, self.config.area_scale_m)?;
        log::info!("SAR flood extent after refinement: {:.4} km^2", area_km2);

        Ok((
            FloodExtent {
                mask: refined,
                source: FloodSource::Sar,
                area_km2,
            },
            initial_area,
        ))
    }

    fn run_optical(
        &self,
        aoi: &Region,
        event_date: NaiveDate,
    ) -> FloodResult<(FloodExtent, f64, f64)> {
        let scenes =
            self.catalog
                .sentinel2_scenes(aoi, event_date, &self.config.optical_query())?;

        // Median composite over each window suppresses transient reflectance
        // artifacts that a single scene would carry into the water masks
        let pre_rasters: Vec<&Raster> = scenes
            .iter()
            .filter(|s| s.acquired < event_date)
            .map(|s| &s.raster)
            .collect();
        let post_rasters: Vec<&Raster> = scenes
            .iter()
            .filter(|s| s.acquired >= event_date)
            .map(|s| &s.raster)
            .collect();
        if pre_rasters.is_empty() || post_rasters.is_empty() {
            let found = !pre_rasters.is_empty() as usize + !post_rasters.is_empty() as usize;
            log::warn!(
                "no Sentinel-2 scenes on one side of {}; cannot composite a \
                 pre/post pair",
                event_date
            );
            return Err(FloodError::InsufficientData { found, required: 2 });
        }
        log::info!(
            "compositing {} pre-event and {} post-event Sentinel-2 scenes",
            pre_rasters.len(),
            post_rasters.len()
        );
        let pre = median_composite(&pre_rasters)?;
        let post = median_composite(&post_rasters)?;

        // NDWI above zero marks open water
        let water_pre = ndwi(&pre)?.gt(0.0)?;
        let water_post = ndwi(&post)?.gt(0.0)?;

        let pre_km2 = calculate_area(&water_pre, self.config.area_scale_m)?;
        let post_km2 = calculate_area(&water_post, self.config.area_scale_m)?;
        log::info!(
            "NDWI open water: {:.4} km^2 pre-event, {:.4} km^2 post-event",
            pre_km2,
            post_km2
        );

        let flood =
            detect_change_optical(&water_pre, &water_post, aoi, self.config.otsu_scale_m)?;
        let area_km2 = calculate_area(&flood, self.config.area_scale_m)?;

        Ok((
            FloodExtent {
                mask: flood,
                source: FloodSource::OpticalIndex,
                area_km2,
            },
            pre_km2,
            post_km2,
        ))
    }
}
