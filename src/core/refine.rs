//! Morphological and topographic refinement of a detected flood extent.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::io::terrain::slope_degrees;
use crate::raster::{Raster, Region};
use crate::types::FloodResult;

/// Band name of the refined flood extent product
pub const EFFECTIVE_FLOOD_BAND: &str = "effective_flood_extent";

/// Unit in which the slope threshold is expressed.
///
/// The conversion is `percent = 100 * tan(degrees * PI / 180)`; a 5% slope
/// corresponds to about 2.86 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlopeUnit {
    Degrees,
    Percent,
}

impl SlopeUnit {
    /// Convert a threshold in this unit to degrees
    pub fn threshold_degrees(&self, value: f64) -> f64 {
        match self {
            SlopeUnit::Degrees => value,
            SlopeUnit::Percent => (value / 100.0).atan().to_degrees(),
        }
    }
}

/// Refinement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineParams {
    /// Minimum 8-connected component size for a flood patch to survive
    pub min_connected_pixels: u32,
    /// Maximum terrain slope for a pixel to remain flooded
    pub max_slope: f64,
    /// Unit of `max_slope`
    pub slope_unit: SlopeUnit,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            min_connected_pixels: 8,
            max_slope: 5.0,
            slope_unit: SlopeUnit::Degrees,
        }
    }
}

/// Size of the 8-connected component of each nonzero valid pixel.
/// Zero-valued or invalid pixels get size 0.
fn component_sizes(data: &Array2<f32>, mask: &Array2<bool>) -> Array2<u32> {
    let (rows, cols) = data.dim();
    let foreground = |r: usize, c: usize| mask[[r, c]] && data[[r, c]] != 0.0;

    // Two-pass labeling with union-find over provisional labels
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut parent: Vec<u32> = vec![0]; // parent[0] unused (background)

    fn find(parent: &mut Vec<u32>, mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }
    fn union(parent: &mut Vec<u32>, a: u32, b: u32) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[rb.max(ra) as usize] = rb.min(ra);
        }
    }

    for r in 0..rows {
        for c in 0..cols {
            if !foreground(r, c) {
                continue;
            }
            // Previously visited 8-neighbors: NW, N, NE, W
            let mut neighbor_labels = [0u32; 4];
            let mut n = 0;
            if r > 0 {
                if c > 0 && labels[[r - 1, c - 1]] != 0 {
                    neighbor_labels[n] = labels[[r - 1, c - 1]];
                    n += 1;
                }
                if labels[[r - 1, c]] != 0 {
                    neighbor_labels[n] = labels[[r - 1, c]];
                    n += 1;
                }
                if c + 1 < cols && labels[[r - 1, c + 1]] != 0 {
                    neighbor_labels[n] = labels[[r - 1, c + 1]];
                    n += 1;
                }
            }
            if c > 0 && labels[[r, c - 1]] != 0 {
                neighbor_labels[n] = labels[[r, c - 1]];
                n += 1;
            }

            if n == 0 {
                let label = parent.len() as u32;
                parent.push(label);
                labels[[r, c]] = label;
            } else {
                let mut min_label = neighbor_labels[0];
                for &l in &neighbor_labels[1..n] {
                    min_label = min_label.min(l);
                }
                labels[[r, c]] = min_label;
                for &l in &neighbor_labels[..n] {
                    union(&mut parent, min_label, l);
                }
            }
        }
    }

    // Resolve roots and accumulate component sizes
    let mut counts = vec![0u32; parent.len()];
    for label in labels.iter_mut() {
        if *label != 0 {
            *label = find(&mut parent, *label);
            counts[*label as usize] += 1;
        }
    }

    let mut sizes = Array2::<u32>::zeros((rows, cols));
    ndarray::Zip::from(&mut sizes)
        .and(&labels)
        .for_each(|s, &l| {
            if l != 0 {
                *s = counts[l as usize];
            }
        });
    sizes
}

/// Refine a flood extent by connected-component size and terrain slope.
///
/// Speckle-sized patches below `min_connected_pixels` are removed, then the
/// DEM clipped to `aoi` is converted to slope and pixels on terrain at or
/// above the slope threshold are masked out (steep terrain rarely floods;
/// this suppresses shadow and layover false positives). Pixels without a
/// slope sample are masked out as well. The result carries the
/// [`EFFECTIVE_FLOOD_BAND`] band.
pub fn refine(
    flood_mask: &Raster,
    aoi: &Region,
    dem: &Raster,
    params: &RefineParams,
) -> FloodResult<Raster> {
    let limit_deg = params.slope_unit.threshold_degrees(params.max_slope);
    log::info!(
        "refining flood extent: min_connected_pixels={}, max_slope={:.2} deg",
        params.min_connected_pixels,
        limit_deg
    );

    let data = flood_mask.single_band_data()?;
    let sizes = component_sizes(data, flood_mask.mask());

    let slope = slope_degrees(&dem.clip(aoi))?;

    let (rows, cols) = flood_mask.shape();
    let mut mask = flood_mask.mask().clone();
    let mut removed_small = 0u64;
    let mut removed_steep = 0u64;
    for r in 0..rows {
        for c in 0..cols {
            if !mask[[r, c]] {
                continue;
            }
            if data[[r, c]] != 0.0 && sizes[[r, c]] < params.min_connected_pixels {
                mask[[r, c]] = false;
                removed_small += 1;
                continue;
            }
            let (x, y) = flood_mask.transform().pixel_center(r, c);
            match slope.sample_at(x, y) {
                Some(s) if (s as f64) < limit_deg => {}
                _ => {
                    mask[[r, c]] = false;
                    if data[[r, c]] != 0.0 {
                        removed_steep += 1;
                    }
                }
            }
        }
    }
    log::debug!(
        "refinement removed {} speckle pixels and {} steep-terrain pixels",
        removed_small,
        removed_steep
    );

    flood_mask
        .with_mask(mask)?
        .rename(EFFECTIVE_FLOOD_BAND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::Array2;

    const N: usize = 16;

    fn transform() -> GeoTransform {
        GeoTransform::north_up(0.0, N as f64 * 10.0, 10.0)
    }

    fn aoi() -> Region {
        Region::rectangle(-1.0, -1.0, N as f64 * 10.0 + 1.0, N as f64 * 10.0 + 1.0).unwrap()
    }

    fn flat_dem() -> Raster {
        Raster::constant("elevation", 50.0, N, N, transform()).unwrap()
    }

    fn flood_mask(patches: &[(usize, usize)]) -> Raster {
        let mut data = Array2::zeros((N, N));
        for &(r, c) in patches {
            data[[r, c]] = 1.0;
        }
        Raster::single_band(
            "flood_extent_sar",
            data,
            Array2::from_elem((N, N), true),
            transform(),
        )
        .unwrap()
    }

    #[test]
    fn test_component_sizes_8_connectivity() {
        // A 2x2 block plus a diagonal neighbor forms one 5-pixel component
        let mask = flood_mask(&[(2, 2), (2, 3), (3, 2), (3, 3), (4, 4), (10, 10)]);
        let sizes = component_sizes(mask.single_band_data().unwrap(), mask.mask());
        assert_eq!(sizes[[2, 2]], 5);
        assert_eq!(sizes[[4, 4]], 5);
        assert_eq!(sizes[[10, 10]], 1);
        assert_eq!(sizes[[0, 0]], 0);
    }

    #[test]
    fn test_refine_removes_speckle_keeps_patch() {
        // One 2x2 patch, one isolated false positive
        let mask = flood_mask(&[(5, 5), (5, 6), (6, 5), (6, 6), (12, 3)]);
        let params = RefineParams {
            min_connected_pixels: 4,
            ..RefineParams::default()
        };
        let refined = refine(&mask, &aoi(), &flat_dem(), &params).unwrap();
        assert_eq!(refined.single_band_name().unwrap(), EFFECTIVE_FLOOD_BAND);

        let valid_flood = |r: usize, c: usize| {
            refined.mask()[[r, c]] && refined.single_band_data().unwrap()[[r, c]] != 0.0
        };
        assert!(valid_flood(5, 5));
        assert!(valid_flood(6, 6));
        assert!(!valid_flood(12, 3));
    }

    #[test]
    fn test_refine_masks_steep_terrain() {
        // Tilted-plane DEM: elevation rises 5 m per 10 m column step in the
        // right half, a ~26.6 degree slope
        let mut dem_data = Array2::zeros((N, N));
        for r in 0..N {
            for c in 0..N {
                dem_data[[r, c]] = if c >= 8 { (c - 8) as f32 * 5.0 } else { 0.0 };
            }
        }
        let dem = Raster::single_band(
            "elevation",
            dem_data,
            Array2::from_elem((N, N), true),
            transform(),
        )
        .unwrap();

        let mask = flood_mask(&[
            // Flat-ground patch
            (2, 2), (2, 3), (3, 2), (3, 3),
            // Steep-ground patch
            (2, 11), (2, 12), (3, 11), (3, 12),
        ]);
        let params = RefineParams {
            min_connected_pixels: 4,
            max_slope: 5.0,
            slope_unit: SlopeUnit::Degrees,
        };
        let refined = refine(&mask, &aoi(), &dem, &params).unwrap();
        assert!(refined.mask()[[2, 2]]);
        assert!(!refined.mask()[[2, 11]]);
        assert!(!refined.mask()[[3, 12]]);
    }

    #[test]
    fn test_refine_is_shrinking_under_reapplication() {
        let mask = flood_mask(&[
            (5, 5), (5, 6), (6, 5), (6, 6),
            (9, 9), (9, 10),
            (12, 3),
        ]);
        let params = RefineParams {
            min_connected_pixels: 2,
            ..RefineParams::default()
        };
        let once = refine(&mask, &aoi(), &flat_dem(), &params).unwrap();
        let twice = refine(&once, &aoi(), &flat_dem(), &params).unwrap();
        for (m2, m1) in twice.mask().iter().zip(once.mask().iter()) {
            assert!(!m2 | m1, "re-refinement must only shrink the mask");
        }
    }

    #[test]
    fn test_slope_unit_conversion() {
        use approx::assert_relative_eq;
        assert_relative_eq!(SlopeUnit::Degrees.threshold_degrees(5.0), 5.0);
        assert_relative_eq!(
            SlopeUnit::Percent.threshold_degrees(5.0),
            2.8624052261117474,
            epsilon = 1e-9
        );
    }
}
