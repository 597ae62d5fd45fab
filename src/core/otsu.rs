//! Otsu automatic threshold selection on backscatter histograms.

use crate::core::histogram::extract_histogram;
use crate::raster::{Raster, Region};
use crate::types::{FloodResult, Histogram};

/// Parameters for Otsu threshold computation
#[derive(Debug, Clone)]
pub struct OtsuParams {
    /// Number of histogram buckets
    pub bin_count: usize,
    /// Reduction scale in meters
    pub scale_m: f64,
    /// Sentinel threshold used when the reference histogram is absent
    /// (typical open-water backscatter boundary in dB)
    pub default_threshold_db: f64,
}

impl Default for OtsuParams {
    fn default() -> Self {
        Self {
            bin_count: 256,
            scale_m: 30.0,
            default_threshold_db: -20.0,
        }
    }
}

/// Threshold maximizing the between-class variance of a histogram.
///
/// With bucket probabilities `p_i`, cumulative weight `omega_k`, cumulative
/// mean `mu_k` and global mean `mu_T`, the score at split `k` is
/// `(mu_T * omega_k - mu_k)^2 / (omega_k * (1 - omega_k) + 1e-10)`.
/// Non-finite scores from near-degenerate histograms are replaced with 0 so
/// the argmax deterministically lands on a boundary bucket instead of
/// propagating NaN; ties resolve to the first maximum.
pub fn compute_otsu_threshold(histogram: &Histogram) -> f64 {
    let buckets = histogram.buckets();
    let total = histogram.total_count() as f64;
    if total <= 0.0 {
        return buckets[0].mean;
    }

    let mut omega = 0.0;
    let mut mu = 0.0;
    let cumulative: Vec<(f64, f64)> = buckets
        .iter()
        .map(|b| {
            let p = b.count as f64 / total;
            omega += p;
            mu += p * b.mean;
            (omega, mu)
        })
        .collect();
    let mu_t = cumulative.last().map(|&(_, m)| m).unwrap_or(0.0);

    let mut best_index = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (k, &(omega_k, mu_k)) in cumulative.iter().enumerate() {
        let numerator = (mu_t * omega_k - mu_k).powi(2);
        let mut score = numerator / (omega_k * (1.0 - omega_k) + 1e-10);
        if !score.is_finite() {
            score = 0.0;
        }
        if score > best_score {
            best_score = score;
            best_index = k;
        }
    }

    buckets[best_index].mean
}

/// Extract a histogram of `band` over `region` and run Otsu on it.
///
/// An absent histogram (fully masked reference region) falls back to the
/// documented sentinel threshold with a warning; a single bad reference
/// region must not abort detection.
pub fn compute_otsu_threshold_for(
    raster: &Raster,
    band: &str,
    region: &Region,
    params: &OtsuParams,
) -> FloodResult<f64> {
    match extract_histogram(raster, band, region, params.scale_m, params.bin_count)? {
        Some(histogram) => {
            let threshold = compute_otsu_threshold(&histogram);
            log::debug!(
                "Otsu threshold for band '{}': {:.2} ({} samples)",
                band,
                threshold,
                histogram.total_count()
            );
            Ok(threshold)
        }
        None => {
            log::warn!(
                "no reference statistics for band '{}' in Otsu region; \
                 falling back to default threshold {:.1} dB",
                band,
                params.default_threshold_db
            );
            Ok(params.default_threshold_db)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, HistogramBucket};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn histogram(pairs: &[(f64, u64)]) -> Histogram {
        Histogram::new(
            pairs
                .iter()
                .map(|&(mean, count)| HistogramBucket { mean, count })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_bucket_returns_its_value() {
        // All mass in one bucket must not propagate NaN
        let hist = histogram(&[(-14.5, 120)]);
        assert_relative_eq!(compute_otsu_threshold(&hist), -14.5);
    }

    #[test]
    fn test_bimodal_histogram_splits_between_dense_classes() {
        let hist = histogram(&[(-25.0, 5), (-20.0, 50), (-10.0, 50), (0.0, 5)]);
        let threshold = compute_otsu_threshold(&hist);
        // The split lands at the boundary between the two dense classes
        assert_relative_eq!(threshold, -20.0);
        assert!(threshold >= -20.0 && threshold < -10.0);
    }

    #[test]
    fn test_two_mode_threshold_lies_between_modes() {
        let hist = histogram(&[
            (-23.0, 10),
            (-22.0, 30),
            (-21.0, 10),
            (-7.0, 10),
            (-6.0, 30),
            (-5.0, 10),
        ]);
        let threshold = compute_otsu_threshold(&hist);
        assert!(threshold > -22.0 && threshold < -6.0);
    }

    #[test]
    fn test_degenerate_mass_at_boundary_bucket() {
        // Zero-count buckets around a single loaded bucket: every split
        // scores 0, so the first (boundary) bucket wins deterministically
        let hist = histogram(&[(-30.0, 0), (-20.0, 40), (-10.0, 0)]);
        let threshold = compute_otsu_threshold(&hist);
        assert!(threshold.is_finite());
        assert_relative_eq!(threshold, -30.0);
    }

    #[test]
    fn test_fallback_to_default_threshold_when_absent() {
        let raster = Raster::constant(
            "VH",
            -12.0,
            8,
            8,
            GeoTransform::north_up(0.0, 80.0, 10.0),
        )
        .unwrap();
        let masked = raster.with_mask(Array2::from_elem((8, 8), false)).unwrap();
        let region = Region::rectangle(0.0, 0.0, 80.0, 80.0).unwrap();
        let threshold =
            compute_otsu_threshold_for(&masked, "VH", &region, &OtsuParams::default()).unwrap();
        assert_relative_eq!(threshold, -20.0);
    }

    #[test]
    fn test_threshold_for_bimodal_raster_separates_classes() {
        let mut data = Array2::zeros((10, 10));
        for r in 0..10 {
            for c in 0..10 {
                data[[r, c]] = if c < 5 { -22.0 } else { -6.0 };
            }
        }
        let raster = Raster::single_band(
            "VH",
            data,
            Array2::from_elem((10, 10), true),
            GeoTransform::north_up(0.0, 100.0, 10.0),
        )
        .unwrap();
        let region = Region::rectangle(0.0, 0.0, 100.0, 100.0).unwrap();
        let threshold =
            compute_otsu_threshold_for(&raster, "VH", &region, &OtsuParams::default()).unwrap();
        assert!(threshold > -22.0 && threshold < -6.0);
    }
}
