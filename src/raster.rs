//! Raster and region value types.
//!
//! A [`Raster`] is an immutable, spatially referenced grid of one or more
//! named bands sharing a validity mask. Every operation returns a new value;
//! nothing is mutated in place, so derivation chains form a DAG. Reductions
//! (`valid_pixel_count_in`, `samples_in`) are the materializing calls of the
//! pipeline and apply best-effort stride sampling above a pixel cap instead
//! of failing on very large regions.

use ndarray::Array2;

use crate::types::{BoundingBox, FloodError, FloodResult, GeoTransform};

/// Cap on the number of pixels visited by a single reduction. Above this,
/// reductions sample on a coarser stride (best-effort semantics).
pub const MAX_REDUCTION_PIXELS: u64 = 100_000_000;

/// A closed polygon in ground coordinates. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    vertices: Vec<(f64, f64)>,
}

impl Region {
    /// Build a polygon region from its exterior ring.
    ///
    /// A duplicated closing vertex is dropped; at least three distinct
    /// vertices must remain.
    pub fn polygon(mut vertices: Vec<(f64, f64)>) -> FloodResult<Self> {
        if vertices
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(FloodError::InvalidGeometry(
                "polygon vertices must be finite".to_string(),
            ));
        }
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(FloodError::InvalidGeometry(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                vertices.len()
            )));
        }
        Ok(Self { vertices })
    }

    /// Axis-aligned rectangle region
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> FloodResult<Self> {
        if !(min_x < max_x && min_y < max_y) {
            return Err(FloodError::InvalidGeometry(format!(
                "degenerate rectangle [{}, {}] x [{}, {}]",
                min_x, max_x, min_y, max_y
            )));
        }
        Self::polygon(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
        ])
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Even-odd ray-casting point-in-polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for &(x, y) in &self.vertices {
            bb.min_x = bb.min_x.min(x);
            bb.min_y = bb.min_y.min(y);
            bb.max_x = bb.max_x.max(x);
            bb.max_y = bb.max_y.max(y);
        }
        bb
    }
}

#[derive(Debug, Clone)]
struct RasterBand {
    name: String,
    data: Array2<f32>,
}

/// Spatially referenced grid of named bands with a shared validity mask
#[derive(Debug, Clone)]
pub struct Raster {
    bands: Vec<RasterBand>,
    mask: Array2<bool>,
    transform: GeoTransform,
}

impl Raster {
    /// Build a raster from named bands, a validity mask and a geotransform.
    /// All bands must have the mask's shape and distinct names.
    pub fn new(
        bands: Vec<(String, Array2<f32>)>,
        mask: Array2<bool>,
        transform: GeoTransform,
    ) -> FloodResult<Self> {
        if bands.is_empty() {
            return Err(FloodError::Processing(
                "raster needs at least one band".to_string(),
            ));
        }
        for (name, data) in &bands {
            if data.dim() != mask.dim() {
                return Err(FloodError::Processing(format!(
                    "band '{}' shape {:?} does not match mask shape {:?}",
                    name,
                    data.dim(),
                    mask.dim()
                )));
            }
        }
        for i in 1..bands.len() {
            if bands[..i].iter().any(|(n, _)| n == &bands[i].0) {
                return Err(FloodError::Processing(format!(
                    "duplicate band name '{}'",
                    bands[i].0
                )));
            }
        }
        Ok(Self {
            bands: bands
                .into_iter()
                .map(|(name, data)| RasterBand { name, data })
                .collect(),
            mask,
            transform,
        })
    }

    /// Single-band raster
    pub fn single_band(
        name: &str,
        data: Array2<f32>,
        mask: Array2<bool>,
        transform: GeoTransform,
    ) -> FloodResult<Self> {
        Self::new(vec![(name.to_string(), data)], mask, transform)
    }

    /// Fully valid constant-valued raster (useful for synthetic scenes)
    pub fn constant(
        name: &str,
        value: f32,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
    ) -> FloodResult<Self> {
        Self::single_band(
            name,
            Array2::from_elem((rows, cols), value),
            Array2::from_elem((rows, cols), true),
            transform,
        )
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Array2<f32>> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    fn single(&self) -> FloodResult<&RasterBand> {
        match self.bands.len() {
            1 => Ok(&self.bands[0]),
            n => Err(FloodError::Processing(format!(
                "expected a single-band raster, got {} bands",
                n
            ))),
        }
    }

    /// Name of the only band
    pub fn single_band_name(&self) -> FloodResult<&str> {
        Ok(&self.single()?.name)
    }

    /// Pixel data of the only band
    pub fn single_band_data(&self) -> FloodResult<&Array2<f32>> {
        Ok(&self.single()?.data)
    }

    fn same_grid(&self, other: &Raster) -> FloodResult<()> {
        if self.shape() != other.shape() {
            return Err(FloodError::Processing(format!(
                "raster grids differ: {:?} vs {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }

    /// Raster footprint in ground coordinates
    pub fn footprint(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        let t = &self.transform;
        let corner = |r: f64, c: f64| {
            (
                t.top_left_x + c * t.pixel_width + r * t.rotation_x,
                t.top_left_y + c * t.rotation_y + r * t.pixel_height,
            )
        };
        let corners = [
            corner(0.0, 0.0),
            corner(0.0, cols as f64),
            corner(rows as f64, 0.0),
            corner(rows as f64, cols as f64),
        ];
        let mut bb = BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            bb.min_x = bb.min_x.min(x);
            bb.min_y = bb.min_y.min(y);
            bb.max_x = bb.max_x.max(x);
            bb.max_y = bb.max_y.max(y);
        }
        bb
    }

    /// Extract one band as a new single-band raster
    pub fn select(&self, name: &str) -> FloodResult<Raster> {
        let band = self
            .bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| FloodError::MissingInput(format!("band '{}' not present", name)))?;
        Ok(Raster {
            bands: vec![band.clone()],
            mask: self.mask.clone(),
            transform: self.transform.clone(),
        })
    }

    /// Rename the only band
    pub fn rename(&self, name: &str) -> FloodResult<Raster> {
        let band = self.single()?;
        Ok(Raster {
            bands: vec![RasterBand {
                name: name.to_string(),
                data: band.data.clone(),
            }],
            mask: self.mask.clone(),
            transform: self.transform.clone(),
        })
    }

    fn map_single(&self, f: impl Fn(f32) -> f32) -> FloodResult<Raster> {
        let band = self.single()?;
        Ok(Raster {
            bands: vec![RasterBand {
                name: band.name.clone(),
                data: band.data.mapv(f),
            }],
            mask: self.mask.clone(),
            transform: self.transform.clone(),
        })
    }

    fn zip_single(&self, other: &Raster, f: impl Fn(f32, f32) -> f32) -> FloodResult<Raster> {
        self.same_grid(other)?;
        let a = self.single()?;
        let b = other.single()?;
        let mut data = Array2::zeros(self.shape());
        ndarray::Zip::from(&mut data)
            .and(&a.data)
            .and(&b.data)
            .for_each(|out, &x, &y| *out = f(x, y));
        Ok(Raster {
            bands: vec![RasterBand {
                name: a.name.clone(),
                data,
            }],
            mask: &self.mask & &other.mask,
            transform: self.transform.clone(),
        })
    }

    /// Binary mask: 1 where value < threshold
    pub fn lt(&self, threshold: f32) -> FloodResult<Raster> {
        self.map_single(|v| if v < threshold { 1.0 } else { 0.0 })
    }

    /// Binary mask: 1 where value > threshold
    pub fn gt(&self, threshold: f32) -> FloodResult<Raster> {
        self.map_single(|v| if v > threshold { 1.0 } else { 0.0 })
    }

    /// Logical NOT (nonzero treated as true)
    pub fn not(&self) -> FloodResult<Raster> {
        self.map_single(|v| if v != 0.0 { 0.0 } else { 1.0 })
    }

    /// Logical AND of two single-band rasters; validity masks intersect
    pub fn and(&self, other: &Raster) -> FloodResult<Raster> {
        self.zip_single(other, |a, b| {
            if a != 0.0 && b != 0.0 {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Pixel-wise subtraction; validity masks intersect
    pub fn subtract(&self, other: &Raster) -> FloodResult<Raster> {
        self.zip_single(other, |a, b| a - b)
    }

    /// Clamp values into `[lo, hi]`
    pub fn clamp(&self, lo: f32, hi: f32) -> FloodResult<Raster> {
        self.map_single(|v| v.clamp(lo, hi))
    }

    /// Remove zero-valued pixels from the validity mask
    pub fn self_mask(&self) -> FloodResult<Raster> {
        let band = self.single()?;
        let mut mask = self.mask.clone();
        ndarray::Zip::from(&mut mask)
            .and(&band.data)
            .for_each(|m, &v| *m = *m && v != 0.0);
        Ok(Raster {
            bands: vec![band.clone()],
            mask,
            transform: self.transform.clone(),
        })
    }

    /// Restrict validity to pixels where `other` is valid and nonzero
    pub fn update_mask(&self, other: &Raster) -> FloodResult<Raster> {
        self.same_grid(other)?;
        let ob = other.single()?;
        let mut mask = self.mask.clone();
        ndarray::Zip::from(&mut mask)
            .and(&other.mask)
            .and(&ob.data)
            .for_each(|m, &om, &ov| *m = *m && om && ov != 0.0);
        Ok(Raster {
            bands: self.bands.clone(),
            mask,
            transform: self.transform.clone(),
        })
    }

    /// Replace the validity mask (shape-checked)
    pub fn with_mask(&self, mask: Array2<bool>) -> FloodResult<Raster> {
        if mask.dim() != self.shape() {
            return Err(FloodError::Processing(format!(
                "mask shape {:?} does not match raster shape {:?}",
                mask.dim(),
                self.shape()
            )));
        }
        Ok(Raster {
            bands: self.bands.clone(),
            mask,
            transform: self.transform.clone(),
        })
    }

    /// Restrict validity to pixel centers inside `region`
    pub fn clip(&self, region: &Region) -> Raster {
        let (rows, cols) = self.shape();
        let mut mask = self.mask.clone();
        for r in 0..rows {
            for c in 0..cols {
                if mask[[r, c]] {
                    let (x, y) = self.transform.pixel_center(r, c);
                    mask[[r, c]] = region.contains(x, y);
                }
            }
        }
        Raster {
            bands: self.bands.clone(),
            mask,
            transform: self.transform.clone(),
        }
    }

    /// Value of the only band at ground coordinates, or `None` outside the
    /// grid or on an invalid pixel. Assumes an axis-aligned transform.
    pub fn sample_at(&self, x: f64, y: f64) -> Option<f32> {
        let band = self.bands.first()?;
        let t = &self.transform;
        let col = (x - t.top_left_x) / t.pixel_width;
        let row = (y - t.top_left_y) / t.pixel_height;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (rows, cols) = self.shape();
        let (row, col) = (row as usize, col as usize);
        if row >= rows || col >= cols || !self.mask[[row, col]] {
            return None;
        }
        Some(band.data[[row, col]])
    }

    /// Sampling stride for a reduction at `scale_m` over `region`, growing
    /// past the native-resolution stride until the visited pixel count fits
    /// under [`MAX_REDUCTION_PIXELS`].
    pub fn reduction_stride(&self, region: &Region, scale_m: f64) -> FloodResult<usize> {
        if !(scale_m > 0.0) {
            return Err(FloodError::Processing(format!(
                "reduction scale must be positive, got {}",
                scale_m
            )));
        }
        let px = self.transform.pixel_width.abs().max(f64::EPSILON);
        let py = self.transform.pixel_height.abs().max(f64::EPSILON);
        let mut stride = (scale_m / px).round().max(1.0) as usize;
        let bb = region.bounding_box();
        let native = (bb.width() / px).ceil().max(1.0) * (bb.height() / py).ceil().max(1.0);
        while native / (stride * stride) as f64 > MAX_REDUCTION_PIXELS as f64 {
            stride *= 2;
        }
        Ok(stride)
    }

    /// Count unmasked pixels whose centers fall inside `region`, sampled at
    /// `scale_m` (counts are of visited samples, so two rasters on the same
    /// grid are always counted comparably)
    pub fn valid_pixel_count_in(&self, region: &Region, scale_m: f64) -> FloodResult<u64> {
        let stride = self.reduction_stride(region, scale_m)?;
        let (rows, cols) = self.shape();
        let mut count = 0u64;
        for r in (0..rows).step_by(stride) {
            for c in (0..cols).step_by(stride) {
                if self.mask[[r, c]] {
                    let (x, y) = self.transform.pixel_center(r, c);
                    if region.contains(x, y) {
                        count += 1;
                    }
                }
            }
        }
        Ok(count)
    }

    /// Collect values of `band` at unmasked pixels inside `region`, sampled
    /// at `scale_m` with the best-effort stride
    pub fn samples_in(&self, band: &str, region: &Region, scale_m: f64) -> FloodResult<Vec<f32>> {
        let data = self
            .band(band)
            .ok_or_else(|| FloodError::MissingInput(format!("band '{}' not present", band)))?;
        let stride = self.reduction_stride(region, scale_m)?;
        let (rows, cols) = self.shape();
        let mut samples = Vec::new();
        for r in (0..rows).step_by(stride) {
            for c in (0..cols).step_by(stride) {
                if self.mask[[r, c]] {
                    let (x, y) = self.transform.pixel_center(r, c);
                    if region.contains(x, y) {
                        samples.push(data[[r, c]]);
                    }
                }
            }
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn test_raster(rows: usize, cols: usize, value: f32) -> Raster {
        Raster::constant("VH", value, rows, cols, GeoTransform::north_up(0.0, 1000.0, 10.0))
            .unwrap()
    }

    #[test]
    fn test_region_rectangle_contains() {
        let region = Region::rectangle(0.0, 0.0, 100.0, 50.0).unwrap();
        assert!(region.contains(50.0, 25.0));
        assert!(!region.contains(150.0, 25.0));
        assert!(!region.contains(50.0, -5.0));
    }

    #[test]
    fn test_region_rejects_degenerate_inputs() {
        assert!(Region::polygon(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
        assert!(Region::polygon(vec![(0.0, f64::NAN), (1.0, 1.0), (2.0, 0.0)]).is_err());
        assert!(Region::rectangle(10.0, 0.0, 0.0, 5.0).is_err());
    }

    #[test]
    fn test_region_drops_closing_vertex() {
        let region = Region::polygon(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(region.vertices().len(), 3);
    }

    #[test]
    fn test_lt_produces_binary_values() {
        let mut data = Array2::from_elem((4, 4), -10.0f32);
        data[[1, 1]] = -25.0;
        let raster = Raster::single_band(
            "VH",
            data,
            Array2::from_elem((4, 4), true),
            GeoTransform::north_up(0.0, 40.0, 10.0),
        )
        .unwrap();
        let water = raster.lt(-20.0).unwrap();
        let out = water.single_band_data().unwrap();
        assert_eq!(out[[1, 1]], 1.0);
        assert_eq!(out[[0, 0]], 0.0);
    }

    #[test]
    fn test_and_not_matches_subtract_clamp_for_binary_masks() {
        // The two differencing formulations must agree on {0,1} inputs
        let gt = GeoTransform::north_up(0.0, 40.0, 10.0);
        let mut pre = Array2::zeros((4, 4));
        let mut post = Array2::zeros((4, 4));
        pre[[0, 0]] = 1.0;
        pre[[1, 1]] = 1.0;
        post[[1, 1]] = 1.0;
        post[[2, 2]] = 1.0;
        let mask = Array2::from_elem((4, 4), true);
        let pre = Raster::single_band("w", pre, mask.clone(), gt.clone()).unwrap();
        let post = Raster::single_band("w", post, mask, gt).unwrap();

        let logical = post.and(&pre.not().unwrap()).unwrap();
        let arith = post.subtract(&pre).unwrap().clamp(0.0, 1.0).unwrap();
        assert_eq!(
            logical.single_band_data().unwrap(),
            arith.single_band_data().unwrap()
        );
    }

    #[test]
    fn test_update_mask_and_self_mask() {
        let raster = test_raster(3, 3, 1.0);
        let mut gate_data = Array2::from_elem((3, 3), 1.0f32);
        gate_data[[0, 0]] = 0.0;
        let gate = Raster::single_band(
            "gate",
            gate_data,
            Array2::from_elem((3, 3), true),
            raster.transform().clone(),
        )
        .unwrap();
        let gated = raster.update_mask(&gate).unwrap();
        assert!(!gated.mask()[[0, 0]]);
        assert!(gated.mask()[[1, 1]]);

        let mut data = Array2::from_elem((3, 3), 1.0f32);
        data[[2, 2]] = 0.0;
        let raster = Raster::single_band(
            "w",
            data,
            Array2::from_elem((3, 3), true),
            raster.transform().clone(),
        )
        .unwrap();
        let masked = raster.self_mask().unwrap();
        assert!(!masked.mask()[[2, 2]]);
        assert!(masked.mask()[[0, 0]]);
    }

    #[test]
    fn test_clip_restricts_mask_to_region() {
        let raster = test_raster(10, 10, 1.0);
        // Grid spans x in [0,100], y in [900,1000]
        let region = Region::rectangle(0.0, 950.0, 50.0, 1000.0).unwrap();
        let clipped = raster.clip(&region);
        assert!(clipped.mask()[[0, 0]]);
        assert!(!clipped.mask()[[9, 9]]);
        let n: u64 = clipped.mask().iter().map(|&m| m as u64).sum();
        assert_eq!(n, 25);
    }

    #[test]
    fn test_valid_pixel_count_in_region() {
        let raster = test_raster(10, 10, 1.0);
        let region = Region::rectangle(-10.0, 890.0, 110.0, 1010.0).unwrap();
        assert_eq!(raster.valid_pixel_count_in(&region, 10.0).unwrap(), 100);
    }

    #[test]
    fn test_reduction_stride_scales_with_request() {
        let raster = test_raster(10, 10, 1.0);
        let region = Region::rectangle(0.0, 900.0, 100.0, 1000.0).unwrap();
        assert_eq!(raster.reduction_stride(&region, 10.0).unwrap(), 1);
        assert_eq!(raster.reduction_stride(&region, 30.0).unwrap(), 3);
        assert!(raster.reduction_stride(&region, 0.0).is_err());
    }

    #[test]
    fn test_select_missing_band() {
        let raster = test_raster(3, 3, 1.0);
        assert!(matches!(
            raster.select("VV"),
            Err(crate::types::FloodError::MissingInput(_))
        ));
    }

    #[test]
    fn test_sample_at() {
        let mut data = Array2::from_elem((10, 10), 0.0f32);
        data[[2, 3]] = 7.0;
        let raster = Raster::single_band(
            "elev",
            data,
            Array2::from_elem((10, 10), true),
            GeoTransform::north_up(0.0, 100.0, 10.0),
        )
        .unwrap();
        // Pixel (row 2, col 3) spans x [30,40), y (70,80]
        assert_eq!(raster.sample_at(35.0, 75.0), Some(7.0));
        assert_eq!(raster.sample_at(-5.0, 75.0), None);
    }
}
