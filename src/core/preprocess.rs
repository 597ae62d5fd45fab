//! Scene preparation: speckle smoothing, pre/post selection, compositing
//! and water-index computation.

use chrono::{Duration, NaiveDate};
use ndarray::Array2;
use rayon::prelude::*;

use crate::io::catalog::Dated;
use crate::raster::Raster;
use crate::types::{FloodError, FloodResult};

/// Band name of the optical water index
pub const NDWI_BAND: &str = "NDWI";

/// Reduce speckle with a focal mean over a square kernel of `radius_m`.
///
/// Every valid pixel is replaced by the mean of the valid pixels in its
/// window; invalid pixels and the validity mask are left untouched, so the
/// mask footprint never changes.
pub fn speckle_smoothing(raster: &Raster, radius_m: f64) -> FloodResult<Raster> {
    if !(radius_m > 0.0) {
        return Err(FloodError::Processing(format!(
            "smoothing radius must be positive, got {}",
            radius_m
        )));
    }
    let px = raster.transform().pixel_width.abs();
    let half = ((radius_m / px).round() as usize).max(1);
    let (rows, cols) = raster.shape();
    let mask = raster.mask();
    log::debug!(
        "speckle smoothing with {}x{} pixel window",
        2 * half + 1,
        2 * half + 1
    );

    let mut bands = Vec::with_capacity(raster.band_names().len());
    for name in raster.band_names() {
        let data = raster.band(name).expect("listed band must exist");
        let smoothed: Vec<f32> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|r| {
                (0..cols).map(move |c| {
                    if !mask[[r, c]] {
                        return data[[r, c]];
                    }
                    let r0 = r.saturating_sub(half);
                    let r1 = (r + half + 1).min(rows);
                    let c0 = c.saturating_sub(half);
                    let c1 = (c + half + 1).min(cols);
                    let mut sum = 0.0f64;
                    let mut count = 0u32;
                    for wr in r0..r1 {
                        for wc in c0..c1 {
                            if mask[[wr, wc]] {
                                sum += data[[wr, wc]] as f64;
                                count += 1;
                            }
                        }
                    }
                    if count > 0 {
                        (sum / count as f64) as f32
                    } else {
                        data[[r, c]]
                    }
                })
            })
            .collect();
        let smoothed = Array2::from_shape_vec((rows, cols), smoothed)
            .map_err(|e| FloodError::Processing(format!("smoothing reshape failed: {}", e)))?;
        bands.push((name.to_string(), smoothed));
    }

    Raster::new(bands, mask.clone(), raster.transform().clone())
}

/// Normalized Difference Water Index from Sentinel-2 green (`B3`) and NIR
/// (`B8`) bands: `(green - nir) / (green + nir)`. Pixels with a zero
/// denominator become invalid.
pub fn ndwi(raster: &Raster) -> FloodResult<Raster> {
    let green = raster
        .band("B3")
        .ok_or_else(|| FloodError::MissingInput("band 'B3' not present".to_string()))?;
    let nir = raster
        .band("B8")
        .ok_or_else(|| FloodError::MissingInput("band 'B8' not present".to_string()))?;

    let (rows, cols) = raster.shape();
    let mut index = Array2::<f32>::zeros((rows, cols));
    let mut mask = raster.mask().clone();
    for r in 0..rows {
        for c in 0..cols {
            let g = green[[r, c]];
            let n = nir[[r, c]];
            let denom = g + n;
            if denom == 0.0 {
                mask[[r, c]] = false;
            } else {
                index[[r, c]] = (g - n) / denom;
            }
        }
    }

    Raster::single_band(NDWI_BAND, index, mask, raster.transform().clone())
}

/// Split scenes around the event date and pick the latest scene strictly
/// before it and the earliest scene on or after it, both within
/// `window_days`.
pub fn select_pre_post<T: Dated>(
    scenes: &[T],
    event_date: NaiveDate,
    window_days: i64,
) -> FloodResult<(&T, &T)> {
    let start = event_date - Duration::days(window_days);
    let end = event_date + Duration::days(window_days);

    let pre = scenes
        .iter()
        .filter(|s| s.acquired() >= start && s.acquired() < event_date)
        .max_by_key(|s| s.acquired());
    let post = scenes
        .iter()
        .filter(|s| s.acquired() >= event_date && s.acquired() <= end)
        .min_by_key(|s| s.acquired());

    match (pre, post) {
        (Some(pre), Some(post)) => {
            log::info!(
                "selected pre-event scene {} and post-event scene {}",
                pre.acquired(),
                post.acquired()
            );
            Ok((pre, post))
        }
        (pre, post) => {
            let found = pre.is_some() as usize + post.is_some() as usize;
            log::warn!(
                "no suitable pre/post pair within {} days of {} \
                 (scenes may be unavailable for the post-event date)",
                window_days,
                event_date
            );
            Err(FloodError::InsufficientData { found, required: 2 })
        }
    }
}

/// Per-pixel, per-band median composite of several co-registered rasters.
/// A pixel is valid in the composite when it is valid in any input.
pub fn median_composite(rasters: &[&Raster]) -> FloodResult<Raster> {
    let first = rasters
        .first()
        .ok_or_else(|| FloodError::MissingInput("no rasters to composite".to_string()))?;
    let (rows, cols) = first.shape();
    for raster in rasters {
        if raster.shape() != (rows, cols) {
            return Err(FloodError::Processing(format!(
                "composite grids differ: {:?} vs {:?}",
                raster.shape(),
                (rows, cols)
            )));
        }
    }

    let mut bands = Vec::new();
    for name in first.band_names() {
        let mut median = Array2::<f32>::zeros((rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let mut values: Vec<f32> = rasters
                    .iter()
                    .filter(|raster| raster.mask()[[r, c]])
                    .filter_map(|raster| raster.band(name).map(|b| b[[r, c]]))
                    .collect();
                if values.is_empty() {
                    continue;
                }
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                median[[r, c]] = if values.len() % 2 == 1 {
                    values[mid]
                } else {
                    (values[mid - 1] + values[mid]) / 2.0
                };
            }
        }
        bands.push((name.to_string(), median));
    }

    let mut mask = Array2::from_elem((rows, cols), false);
    for raster in rasters {
        mask = &mask | raster.mask();
    }

    Raster::new(bands, mask, first.transform().clone())
}
