//! Histogram statistics extraction over a region of a raster band.

use crate::raster::{Raster, Region};
use crate::types::{FloodError, FloodResult, Histogram, HistogramBucket};

/// Compute a discretized intensity histogram of `band` within `region`.
///
/// Values of unmasked pixels whose centers fall in `region` are binned into
/// `bin_count` equal-width buckets spanning the observed value range. The
/// reduction samples at `scale_m` with best-effort coarsening on very large
/// regions, mirroring the imagery backend's bounded reductions.
///
/// Returns `Ok(None)` when no unmasked pixel intersects the region. This is
/// the common case for scenes that are entirely cloud- or edge-masked inside
/// a small reference zone and is deliberately not an error.
pub fn extract_histogram(
    raster: &Raster,
    band: &str,
    region: &Region,
    scale_m: f64,
    bin_count: usize,
) -> FloodResult<Option<Histogram>> {
    if bin_count < 2 {
        return Err(FloodError::Processing(format!(
            "histogram needs at least 2 buckets, got {}",
            bin_count
        )));
    }

    let samples = raster.samples_in(band, region, scale_m)?;
    let samples: Vec<f64> = samples
        .into_iter()
        .filter(|v| v.is_finite())
        .map(f64::from)
        .collect();
    if samples.is_empty() {
        log::debug!(
            "no unmasked '{}' pixels in histogram region; reduction is absent",
            band
        );
        return Ok(None);
    }

    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // All samples identical: a single bucket carries the whole mass
    if max <= min {
        let hist = Histogram::new(vec![HistogramBucket {
            mean: min,
            count: samples.len() as u64,
        }])?;
        return Ok(Some(hist));
    }

    let width = (max - min) / bin_count as f64;
    let mut counts = vec![0u64; bin_count];
    let mut sums = vec![0f64; bin_count];
    for v in &samples {
        let idx = (((v - min) / width) as usize).min(bin_count - 1);
        counts[idx] += 1;
        sums[idx] += v;
    }

    // Empty buckets keep their center so the bucket-mean sequence stays
    // strictly increasing across gaps in the value range
    let buckets = counts
        .iter()
        .zip(&sums)
        .enumerate()
        .map(|(i, (&count, &sum))| HistogramBucket {
            mean: if count > 0 {
                sum / count as f64
            } else {
                min + (i as f64 + 0.5) * width
            },
            count,
        })
        .collect();

    Ok(Some(Histogram::new(buckets)?))
}
