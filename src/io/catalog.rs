//! Imagery retrieval interface.
//!
//! The imagery backend is an external collaborator: the pipeline only needs
//! scene lists filtered by region, date window and quality attributes. The
//! [`ImageryCatalog`] trait is that seam; [`StaticCatalog`] is an in-memory
//! implementation backing tests and offline runs.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodResult, OrbitPass};

/// Minimum number of scenes required before a modality can proceed
pub const MIN_SCENES: usize = 2;

/// Sentinel-1 retrieval filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarQuery {
    /// Days before/after the event date to search
    pub window_days: i64,
    pub orbit_pass: OrbitPass,
    /// Required ground resolution in meters
    pub resolution_m: f64,
}

impl Default for SarQuery {
    fn default() -> Self {
        Self {
            window_days: 12,
            orbit_pass: OrbitPass::Ascending,
            resolution_m: 10.0,
        }
    }
}

/// Sentinel-2 retrieval filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpticalQuery {
    /// Days before/after the event date to search
    pub window_days: i64,
    /// Maximum allowed cloudy-pixel percentage (0-100)
    pub max_cloud_pct: f32,
}

impl Default for OpticalQuery {
    fn default() -> Self {
        Self {
            window_days: 20,
            max_cloud_pct: 30.0,
        }
    }
}

/// One Sentinel-1 acquisition
#[derive(Debug, Clone)]
pub struct SarScene {
    pub acquired: NaiveDate,
    pub orbit_pass: OrbitPass,
    pub resolution_m: f64,
    pub raster: Raster,
}

/// One Sentinel-2 acquisition
#[derive(Debug, Clone)]
pub struct OpticalScene {
    pub acquired: NaiveDate,
    pub cloud_cover_pct: f32,
    pub raster: Raster,
}

/// Anything carrying an acquisition date
pub trait Dated {
    fn acquired(&self) -> NaiveDate;
}

impl Dated for SarScene {
    fn acquired(&self) -> NaiveDate {
        self.acquired
    }
}

impl Dated for OpticalScene {
    fn acquired(&self) -> NaiveDate {
        self.acquired
    }
}

/// External imagery retrieval collaborator.
///
/// Implementations must return scenes sorted by acquisition date and fail
/// with [`FloodError::InsufficientData`] when fewer than [`MIN_SCENES`]
/// scenes match, so a modality is skipped before any detection work starts.
pub trait ImageryCatalog {
    fn sentinel1_scenes(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &SarQuery,
    ) -> FloodResult<Vec<SarScene>>;

    fn sentinel2_scenes(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &OpticalQuery,
    ) -> FloodResult<Vec<OpticalScene>>;
}

/// In-memory scene store
#[derive(Debug, Default)]
pub struct StaticCatalog {
    sar: Vec<SarScene>,
    optical: Vec<OpticalScene>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sar_scene(&mut self, scene: SarScene) {
        self.sar.push(scene);
    }

    pub fn add_optical_scene(&mut self, scene: OpticalScene) {
        self.optical.push(scene);
    }
}

fn in_window(acquired: NaiveDate, event_date: NaiveDate, window_days: i64) -> bool {
    let start = event_date - Duration::days(window_days);
    let end = event_date + Duration::days(window_days);
    acquired >= start && acquired <= end
}

fn require_min_scenes(found: usize, kind: &str) -> FloodResult<()> {
    if found < MIN_SCENES {
        log::warn!(
            "only {} {} scene(s) match the query; consider widening the \
             search window or adjusting the AOI",
            found,
            kind
        );
        return Err(FloodError::InsufficientData {
            found,
            required: MIN_SCENES,
        });
    }
    log::info!("{} {} scenes available", found, kind);
    Ok(())
}

impl ImageryCatalog for StaticCatalog {
    fn sentinel1_scenes(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &SarQuery,
    ) -> FloodResult<Vec<SarScene>> {
        let region_bb = region.bounding_box();
        let mut scenes: Vec<SarScene> = self
            .sar
            .iter()
            .filter(|s| {
                in_window(s.acquired, event_date, query.window_days)
                    && s.orbit_pass == query.orbit_pass
                    && (s.resolution_m - query.resolution_m).abs() < 1e-6
                    && s.raster.footprint().intersects(&region_bb)
            })
            .cloned()
            .collect();
        scenes.sort_by_key(|s| s.acquired);
        require_min_scenes(scenes.len(), "Sentinel-1")?;
        Ok(scenes)
    }

    fn sentinel2_scenes(
        &self,
        region: &Region,
        event_date: NaiveDate,
        query: &OpticalQuery,
    ) -> FloodResult<Vec<OpticalScene>> {
        let region_bb = region.bounding_box();
        let mut scenes: Vec<OpticalScene> = self
            .optical
            .iter()
            .filter(|s| {
                in_window(s.acquired, event_date, query.window_days)
                    && s.cloud_cover_pct < query.max_cloud_pct
                    && s.raster.footprint().intersects(&region_bb)
            })
            .cloned()
            .collect();
        scenes.sort_by_key(|s| s.acquired);
        require_min_scenes(scenes.len(), "Sentinel-2")?;
        Ok(scenes)
    }
}
