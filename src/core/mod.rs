//! Core flood detection modules

pub mod area;
pub mod change;
pub mod histogram;
pub mod otsu;
pub mod preprocess;
pub mod reconcile;
pub mod refine;

// Re-export main types
pub use area::calculate_area;
pub use change::{
    detect_change, detect_change_optical, flood_duration, DURATION_BAND, OPTICAL_FLOOD_BAND,
    SAR_FLOOD_BAND,
};
pub use histogram::extract_histogram;
pub use otsu::{compute_otsu_threshold, compute_otsu_threshold_for, OtsuParams};
pub use preprocess::{
    median_composite, ndwi, select_pre_post, speckle_smoothing, NDWI_BAND,
};
pub use reconcile::{reconcile, Reconciliation};
pub use refine::{refine, RefineParams, SlopeUnit, EFFECTIVE_FLOOD_BAND};
