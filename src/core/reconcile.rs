//! Pre/post raster validity reconciliation.
//!
//! Two rasters being differenced must cover the same effective pixel set.
//! A count mismatch is an expected, recoverable condition (differing cloud
//! or edge masks), so it is repaired by intersecting the validity masks and
//! surfaced as a warning, never as an error.

use crate::raster::{Raster, Region};
use crate::types::FloodResult;

/// Outcome of reconciling two rasters over a region
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Whether the input unmasked pixel counts already agreed
    pub consistent: bool,
    pub pre: Raster,
    pub post: Raster,
}

/// Compare unmasked pixel counts of `pre` and `post` over `region` at
/// `scale_m`; on mismatch restrict both rasters to the intersection of
/// their validity masks.
pub fn reconcile(
    pre: &Raster,
    post: &Raster,
    region: &Region,
    scale_m: f64,
) -> FloodResult<Reconciliation> {
    if pre.shape() != post.shape() {
        return Err(crate::types::FloodError::Processing(format!(
            "cannot reconcile rasters on different grids: {:?} vs {:?}",
            pre.shape(),
            post.shape()
        )));
    }
    let count_pre = pre.valid_pixel_count_in(region, scale_m)?;
    let count_post = post.valid_pixel_count_in(region, scale_m)?;

    if count_pre == count_post {
        log::debug!(
            "pre/post pixel counts agree ({} valid pixels in region)",
            count_pre
        );
        return Ok(Reconciliation {
            consistent: true,
            pre: pre.clone(),
            post: post.clone(),
        });
    }

    log::warn!(
        "pre/post pixel counts differ ({} vs {}); restricting both rasters \
         to their common valid footprint",
        count_pre,
        count_post
    );
    let common = pre.mask() & post.mask();
    Ok(Reconciliation {
        consistent: false,
        pre: pre.with_mask(common.clone())?,
        post: post.with_mask(common)?,
    })
}
