//! Area aggregation of binary masks.

use crate::raster::Raster;
use crate::types::FloodResult;

/// Area covered by a binary mask, in km².
///
/// Sums per-pixel ground area weighted by mask membership over the mask's
/// own footprint, sampling at `scale_m` with the best-effort stride on very
/// large grids (sampled pixels are weighted by the stride square). A fully
/// masked input yields exactly 0.0: "no flood detected" is a valid result,
/// not a failure.
pub fn calculate_area(mask: &Raster, scale_m: f64) -> FloodResult<f64> {
    let data = mask.single_band_data()?;
    let footprint = mask.footprint();
    let region = crate::raster::Region::rectangle(
        footprint.min_x - 1.0,
        footprint.min_y - 1.0,
        footprint.max_x + 1.0,
        footprint.max_y + 1.0,
    )?;
    let stride = mask.reduction_stride(&region, scale_m)?;

    let pixel_area = mask.transform().pixel_area_m2() * (stride * stride) as f64;
    let (rows, cols) = mask.shape();
    let valid = mask.mask();
    let mut total_m2 = 0.0;
    for r in (0..rows).step_by(stride) {
        for c in (0..cols).step_by(stride) {
            if valid[[r, c]] {
                total_m2 += data[[r, c]] as f64 * pixel_area;
            }
        }
    }

    Ok(total_m2 / 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_fully_masked_input_is_zero() {
        let mask = Raster::constant("flood", 1.0, 10, 10, GeoTransform::north_up(0.0, 100.0, 10.0))
            .unwrap()
            .with_mask(Array2::from_elem((10, 10), false))
            .unwrap();
        assert_eq!(calculate_area(&mask, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn test_all_zero_mask_is_zero() {
        let mask =
            Raster::constant("flood", 0.0, 10, 10, GeoTransform::north_up(0.0, 100.0, 10.0))
                .unwrap();
        assert_eq!(calculate_area(&mask, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn test_known_rectangle_area() {
        // 20 x 30 pixels of 10 m: 6000 px * 100 m² = 0.6 km²
        let mut data = Array2::zeros((40, 40));
        for r in 0..20 {
            for c in 0..30 {
                data[[r, c]] = 1.0;
            }
        }
        let mask = Raster::single_band(
            "flood",
            data,
            Array2::from_elem((40, 40), true),
            GeoTransform::north_up(0.0, 400.0, 10.0),
        )
        .unwrap();
        let area = calculate_area(&mask, 10.0).unwrap();
        assert_relative_eq!(area, 0.6, max_relative = 0.005);
    }

    #[test]
    fn test_area_respects_pixel_size() {
        let mask =
            Raster::constant("flood", 1.0, 10, 10, GeoTransform::north_up(0.0, 300.0, 30.0))
                .unwrap();
        // 100 pixels * 900 m² = 0.09 km²
        assert_relative_eq!(calculate_area(&mask, 30.0).unwrap(), 0.09);
    }

    #[test]
    fn test_area_rejects_invalid_scale() {
        let mask =
            Raster::constant("flood", 1.0, 4, 4, GeoTransform::north_up(0.0, 40.0, 10.0)).unwrap();
        assert!(calculate_area(&mask, 0.0).is_err());
    }
}
