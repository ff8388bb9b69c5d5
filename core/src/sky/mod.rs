pub mod frame;
pub mod reproject;
pub mod wcs;

pub use frame::{optimal_frame, OutputGrid};
pub use wcs::{CelestialWcs, Projection};
