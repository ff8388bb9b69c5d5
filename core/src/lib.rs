//! Core of the Stokes V beam mosaicker.
//!
//! Each beam image is brought to a common resolution, corrected for its
//! primary-beam response and cropped to its valid footprint; the corrected
//! beams are then coadded with primary-beam weights onto one celestial grid.

pub mod fits;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod psf;
pub mod sky;
pub mod telemetry;

pub use pipeline::{MosaicPipeline, MosaicReport};
pub use prelude::{BeamPair, MosaicConfig, MosaicError, MosaicResult, ReferenceFrame};
