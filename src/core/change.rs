//! Water-mask change detection between pre- and post-event imagery.

use crate::core::otsu::{compute_otsu_threshold_for, OtsuParams};
use crate::core::reconcile::reconcile;
use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodResult, SarBand};

/// Band name of the raw SAR flood extent product
pub const SAR_FLOOD_BAND: &str = "flood_extent_sar";
/// Band name of the optical (NDWI) flood extent product
pub const OPTICAL_FLOOD_BAND: &str = "flood_extent_ndwi";
/// Band name of the flood duration product
pub const DURATION_BAND: &str = "flood_duration";

/// Resolve the configured thresholding band on a SAR raster, deriving
/// `VV - VH` when requested.
fn threshold_band(raster: &Raster, band: SarBand) -> FloodResult<Raster> {
    match band {
        SarBand::VH | SarBand::VV => raster.select(band.band_name()),
        SarBand::VvMinusVh => {
            let vv = raster.select(SarBand::VV.band_name())?;
            let vh = raster.select(SarBand::VH.band_name())?;
            vv.subtract(&vh)?.rename(SarBand::VvMinusVh.band_name())
        }
    }
}

/// Detect newly flooded pixels from pre/post SAR backscatter.
///
/// Reconciles the two rasters to a common valid footprint, computes an
/// independent Otsu threshold per image over `otsu_region`, classifies water
/// as backscatter below the threshold and keeps pixels that are water after
/// the event but not before (`water_post AND NOT water_pre`). The result is
/// clipped to `aoi` and carries the [`SAR_FLOOD_BAND`] band.
pub fn detect_change(
    pre: &Raster,
    post: &Raster,
    band: SarBand,
    otsu_region: &Region,
    aoi: &Region,
    params: &OtsuParams,
) -> FloodResult<Raster> {
    let reconciled = reconcile(pre, post, aoi, params.scale_m)?;
    if !reconciled.consistent {
        log::warn!("SAR change detection proceeding on reduced common footprint");
    }

    let pre_band = threshold_band(&reconciled.pre, band)?;
    let post_band = threshold_band(&reconciled.post, band)?;

    let band_name = band.band_name();
    let threshold_pre = compute_otsu_threshold_for(&pre_band, band_name, otsu_region, params)?;
    let threshold_post = compute_otsu_threshold_for(&post_band, band_name, otsu_region, params)?;
    log::info!(
        "Otsu thresholds on {}: pre {:.2} dB, post {:.2} dB",
        band_name,
        threshold_pre,
        threshold_post
    );

    let water_pre = pre_band.lt(threshold_pre as f32)?;
    let water_post = post_band.lt(threshold_post as f32)?;

    water_post
        .and(&water_pre.not()?)?
        .rename(SAR_FLOOD_BAND)?
        .clip(aoi)
        .select(SAR_FLOOD_BAND)
}

/// Detect newly flooded pixels from two already-binary water masks (e.g.
/// NDWI-derived). Applies the same reconciliation and differencing as the
/// SAR path; the result carries the [`OPTICAL_FLOOD_BAND`] band.
pub fn detect_change_optical(
    pre_mask: &Raster,
    post_mask: &Raster,
    aoi: &Region,
    scale_m: f64,
) -> FloodResult<Raster> {
    let reconciled = reconcile(pre_mask, post_mask, aoi, scale_m)?;
    if !reconciled.consistent {
        log::warn!("optical change detection proceeding on reduced common footprint");
    }

    reconciled
        .post
        .and(&reconciled.pre.not()?)?
        .rename(OPTICAL_FLOOD_BAND)?
        .clip(aoi)
        .select(OPTICAL_FLOOD_BAND)
}

/// Per-pixel sum of a series of binary flood extents, yielding a flood
/// duration raster (days flooded when each extent represents one day).
/// Invalid pixels contribute nothing regardless of their stored value; the
/// output is valid wherever any input is.
pub fn flood_duration(extents: &[Raster]) -> FloodResult<Raster> {
    let first = extents
        .first()
        .ok_or_else(|| FloodError::MissingInput("no flood extents to sum".to_string()))?;

    let mut duration = ndarray::Array2::<f32>::zeros(first.shape());
    let mut valid = ndarray::Array2::from_elem(first.shape(), false);
    for extent in extents {
        if extent.shape() != first.shape() {
            return Err(FloodError::Processing(format!(
                "flood extent grids differ: {:?} vs {:?}",
                extent.shape(),
                first.shape()
            )));
        }
        let data = extent.single_band_data()?;
        ndarray::Zip::from(&mut duration)
            .and(data)
            .and(extent.mask())
            .for_each(|d, &v, &m| {
                if m {
                    *d += v;
                }
            });
        valid = &valid | extent.mask();
    }

    Raster::single_band(DURATION_BAND, duration, valid, first.transform().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    const ROWS: usize = 20;
    const COLS: usize = 20;

    fn transform() -> GeoTransform {
        GeoTransform::north_up(0.0, ROWS as f64 * 10.0, 10.0)
    }

    fn aoi() -> Region {
        Region::rectangle(-1.0, -1.0, COLS as f64 * 10.0 + 1.0, ROWS as f64 * 10.0 + 1.0).unwrap()
    }

    /// Backscatter grid: river in the left columns, optional flood patch.
    /// Values are quantized to 0.5 dB steps so per-image Otsu thresholds are
    /// reproducible across pre/post histograms.
    fn sar_scene(with_flood_patch: bool) -> Raster {
        let mut data = Array2::zeros((ROWS, COLS));
        for r in 0..ROWS {
            for c in 0..COLS {
                data[[r, c]] = if c < 4 {
                    // Permanent water, spread over a few buckets
                    match (r + c) % 3 {
                        0 => -22.0,
                        1 => -21.5,
                        _ => -21.0,
                    }
                } else {
                    match (r * 7 + c) % 3 {
                        0 => -6.0,
                        1 => -5.5,
                        _ => -5.0,
                    }
                };
            }
        }
        if with_flood_patch {
            for r in 8..12 {
                for c in 10..14 {
                    data[[r, c]] = if (r + c) % 2 == 0 { -24.0 } else { -23.5 };
                }
            }
        }
        Raster::single_band(
            "VH",
            data,
            Array2::from_elem((ROWS, COLS), true),
            transform(),
        )
        .unwrap()
    }

    #[test]
    fn test_detect_change_finds_new_water_patch() {
        let pre = sar_scene(false);
        let post = sar_scene(true);
        let flood = detect_change(
            &pre,
            &post,
            SarBand::VH,
            &aoi(),
            &aoi(),
            &OtsuParams::default(),
        )
        .unwrap();

        assert_eq!(flood.single_band_name().unwrap(), SAR_FLOOD_BAND);
        let data = flood.single_band_data().unwrap();
        let flooded: u32 = data.iter().map(|&v| v as u32).sum();
        assert_eq!(flooded, 16);
        assert_eq!(data[[9, 11]], 1.0);
        // Permanent water is not new water
        assert_eq!(data[[5, 1]], 0.0);
    }

    #[test]
    fn test_detect_change_identical_rasters_yields_empty_mask() {
        let scene = sar_scene(true);
        let flood = detect_change(
            &scene,
            &scene,
            SarBand::VH,
            &aoi(),
            &aoi(),
            &OtsuParams::default(),
        )
        .unwrap();
        assert!(flood.single_band_data().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_detect_change_missing_band_is_fatal_for_call() {
        let pre = sar_scene(false);
        let post = sar_scene(true);
        let result = detect_change(
            &pre,
            &post,
            SarBand::VV,
            &aoi(),
            &aoi(),
            &OtsuParams::default(),
        );
        assert!(matches!(result, Err(FloodError::MissingInput(_))));
    }

    #[test]
    fn test_detect_change_vv_minus_vh_band() {
        let base = sar_scene(false);
        let vh = base.single_band_data().unwrap().clone();
        let vv = vh.mapv(|v| v + 3.0);
        let mask = Array2::from_elem((ROWS, COLS), true);
        let scene = Raster::new(
            vec![("VH".to_string(), vh), ("VV".to_string(), vv)],
            mask,
            transform(),
        )
        .unwrap();
        let derived = threshold_band(&scene, SarBand::VvMinusVh).unwrap();
        assert_eq!(derived.single_band_name().unwrap(), "VV_minus_VH");
        assert_relative_eq!(derived.single_band_data().unwrap()[[0, 0]], 3.0);
    }

    #[test]
    fn test_detect_change_optical_differences_masks() {
        let gt = transform();
        let mask = Array2::from_elem((ROWS, COLS), true);
        let mut pre = Array2::zeros((ROWS, COLS));
        let mut post = Array2::zeros((ROWS, COLS));
        pre[[0, 0]] = 1.0;
        post[[0, 0]] = 1.0; // standing water, unchanged
        post[[3, 3]] = 1.0; // new water
        let pre = Raster::single_band("ndwi_water_pre", pre, mask.clone(), gt.clone()).unwrap();
        let post = Raster::single_band("ndwi_water_post", post, mask, gt).unwrap();

        let flood = detect_change_optical(&pre, &post, &aoi(), 10.0).unwrap();
        assert_eq!(flood.single_band_name().unwrap(), OPTICAL_FLOOD_BAND);
        let data = flood.single_band_data().unwrap();
        assert_eq!(data[[3, 3]], 1.0);
        assert_eq!(data[[0, 0]], 0.0);
        let total: u32 = data.iter().map(|&v| v as u32).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_flood_duration_sums_extents() {
        let gt = transform();
        let mask = Array2::from_elem((ROWS, COLS), true);
        let mut day = Array2::zeros((ROWS, COLS));
        day[[2, 2]] = 1.0;
        let extent = Raster::single_band(SAR_FLOOD_BAND, day, mask, gt).unwrap();
        let duration =
            flood_duration(&[extent.clone(), extent.clone(), extent.clone()]).unwrap();
        assert_eq!(duration.single_band_name().unwrap(), DURATION_BAND);
        assert_relative_eq!(duration.single_band_data().unwrap()[[2, 2]], 3.0);
        assert_relative_eq!(duration.single_band_data().unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_flood_duration_ignores_values_under_invalid_pixels() {
        // A pixel refined away in one extent keeps its stored 1.0 under an
        // invalid mask; it must not count as a flooded day
        let gt = transform();
        let mut day1 = Array2::zeros((ROWS, COLS));
        day1[[4, 4]] = 1.0;
        let mut mask1 = Array2::from_elem((ROWS, COLS), true);
        mask1[[4, 4]] = false;
        let extent1 = Raster::single_band(SAR_FLOOD_BAND, day1, mask1, gt.clone()).unwrap();

        let day2 = Array2::zeros((ROWS, COLS));
        let mask2 = Array2::from_elem((ROWS, COLS), true);
        let extent2 = Raster::single_band(SAR_FLOOD_BAND, day2, mask2, gt).unwrap();

        let duration = flood_duration(&[extent1, extent2]).unwrap();
        assert!(duration.mask()[[4, 4]]);
        assert_relative_eq!(duration.single_band_data().unwrap()[[4, 4]], 0.0);
    }

    #[test]
    fn test_flood_duration_requires_input() {
        assert!(matches!(
            flood_duration(&[]),
            Err(FloodError::MissingInput(_))
        ));
    }
}
