//! Precipitation forecast access and statistics.
//!
//! The forecast source is an external collaborator like the imagery catalog:
//! the pipeline only needs one precipitation grid around the event date and
//! a summed total over the AOI. Forecast data being unavailable is an
//! expected condition and yields `Ok(None)`, never an error.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodResult};

/// Band name of precipitation rasters (daily accumulation, mm)
pub const PRECIPITATION_BAND: &str = "PRCP";

/// Forecast retrieval filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecipitationQuery {
    /// Days before/after the event date to search
    pub window_days: i64,
    /// Reduction scale in meters for the AOI statistic
    pub scale_m: f64,
}

impl Default for PrecipitationQuery {
    fn default() -> Self {
        Self {
            window_days: 2,
            scale_m: 1000.0,
        }
    }
}

/// One daily precipitation grid
#[derive(Debug, Clone)]
pub struct PrecipitationScene {
    pub acquired: NaiveDate,
    pub raster: Raster,
}

/// External precipitation forecast collaborator.
///
/// Implementations return the first grid of the window clipped to `region`,
/// or `Ok(None)` when fewer than two grids cover the window (a thin
/// collection is treated as no forecast rather than a hard failure).
pub trait PrecipitationProvider {
    fn forecast(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &PrecipitationQuery,
    ) -> FloodResult<Option<Raster>>;
}

/// In-memory forecast store
#[derive(Debug, Default)]
pub struct StaticPrecipitation {
    scenes: Vec<PrecipitationScene>,
}

impl StaticPrecipitation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, scene: PrecipitationScene) {
        self.scenes.push(scene);
    }
}

impl PrecipitationProvider for StaticPrecipitation {
    fn forecast(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &PrecipitationQuery,
    ) -> FloodResult<Option<Raster>> {
        let start = event_date - Duration::days(query.window_days);
        let end = event_date + Duration::days(query.window_days);
        let region_bb = region.bounding_box();
        let mut matching: Vec<&PrecipitationScene> = self
            .scenes
            .iter()
            .filter(|s| {
                s.acquired >= start
                    && s.acquired <= end
                    && s.raster.footprint().intersects(&region_bb)
            })
            .collect();
        matching.sort_by_key(|s| s.acquired);

        if matching.len() < 2 {
            log::warn!(
                "only {} precipitation grid(s) around {}; no forecast available",
                matching.len(),
                event_date
            );
            return Ok(None);
        }
        Ok(Some(matching[0].raster.clip(region)))
    }
}

/// Total precipitation over `region`: sum of valid [`PRECIPITATION_BAND`]
/// samples at `scale_m` with the best-effort stride.
pub fn precipitation_sum(raster: &Raster, region: &Region, scale_m: f64) -> FloodResult<f64> {
    let samples = raster.samples_in(PRECIPITATION_BAND, region, scale_m)?;
    if samples.is_empty() {
        return Err(FloodError::MissingInput(
            "no valid precipitation pixels in region".to_string(),
        ));
    }
    Ok(samples.iter().map(|&v| v as f64).sum())
}
