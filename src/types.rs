use serde::{Deserialize, Serialize};

/// SAR polarization bands usable for water thresholding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SarBand {
    VH,
    VV,
    /// Derived band: VV backscatter minus VH backscatter
    VvMinusVh,
}

impl SarBand {
    /// Band name as it appears on a raster
    pub fn band_name(&self) -> &'static str {
        match self {
            SarBand::VH => "VH",
            SarBand::VV => "VV",
            SarBand::VvMinusVh => "VV_minus_VH",
        }
    }
}

impl std::fmt::Display for SarBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.band_name())
    }
}

/// Ascending or descending orbit pass (Sentinel-1 scene attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitPass {
    Ascending,
    Descending,
}

/// Provenance of a flood extent product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloodSource {
    /// Change detection on SAR backscatter with Otsu thresholds
    Sar,
    /// Change detection on optical water-index masks (NDWI)
    OpticalIndex,
}

impl std::fmt::Display for FloodSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloodSource::Sar => write!(f, "SAR"),
            FloodSource::OpticalIndex => write!(f, "optical-index"),
        }
    }
}

/// Axis-aligned bounding box in ground coordinates (meters of the working CRS)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Affine georeferencing parameters for a raster grid.
///
/// Coordinates are in a projected CRS with pixel sizes in meters. By GDAL
/// convention `pixel_height` is negative for north-up grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels of `pixel_size_m`
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size_m: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size_m,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size_m,
        }
    }

    /// Ground coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (x, y)
    }

    /// Ground area of one pixel in m² (rotation terms ignored)
    pub fn pixel_area_m2(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }
}

/// One bucket of an intensity histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBucket {
    /// Mean value of the samples in the bucket (bucket center when empty)
    pub mean: f64,
    pub count: u64,
}

/// Discretized intensity histogram of one band within one region.
///
/// Bucket means are strictly increasing; counts may be zero for buckets
/// inside gaps of the observed value range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
}

impl Histogram {
    /// Build a histogram, validating the bucket-mean ordering invariant
    pub fn new(buckets: Vec<HistogramBucket>) -> FloodResult<Self> {
        if buckets.is_empty() {
            return Err(FloodError::Processing(
                "histogram must contain at least one bucket".to_string(),
            ));
        }
        for pair in buckets.windows(2) {
            if pair[1].mean <= pair[0].mean {
                return Err(FloodError::Processing(format!(
                    "histogram bucket means must be strictly increasing ({} then {})",
                    pair[0].mean, pair[1].mean
                )));
            }
        }
        Ok(Self { buckets })
    }

    pub fn buckets(&self) -> &[HistogramBucket] {
        &self.buckets
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

/// A detected flood extent: binary mask plus provenance and derived area
#[derive(Debug, Clone)]
pub struct FloodExtent {
    pub mask: crate::raster::Raster,
    pub source: FloodSource,
    pub area_km2: f64,
}

/// Error types for flood mapping
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("insufficient source imagery: found {found} scene(s), need {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for flood mapping operations
pub type FloodResult<T> = Result<T, FloodError>;
