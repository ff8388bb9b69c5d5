use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sky::wcs::Projection;

/// Run configuration shared read-only by every stage of a mosaic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaicConfig {
    /// Fixed common FWHM in arcseconds; `None` resolves the common PSF from the beams.
    #[serde(default)]
    pub fixed_fwhm_arcsec: Option<f64>,
    /// Primary-beam response below this fraction of peak is masked.
    #[serde(default = "default_pb_clip")]
    pub pb_clip: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub reference: Option<ReferenceFrame>,
    #[serde(default)]
    pub projection: Projection,
    /// Relative tolerance used when deciding whether a pb map shares the image grid.
    #[serde(default = "default_wcs_tolerance")]
    pub wcs_tolerance: f64,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_intermediates: bool,
    #[serde(default)]
    pub write_footprint: bool,
}

fn default_pb_clip() -> f64 {
    0.1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_wcs_tolerance() -> f64 {
    1e-9
}

fn default_parallel() -> bool {
    true
}

impl MosaicConfig {
    pub fn new(pb_clip: f64, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixed_fwhm_arcsec: None,
            pb_clip,
            output_dir: output_dir.into(),
            reference: None,
            projection: Projection::default(),
            wcs_tolerance: default_wcs_tolerance(),
            parallel: default_parallel(),
            scratch_dir: None,
            keep_intermediates: false,
            write_footprint: false,
        }
    }

    pub fn validate(&self) -> MosaicResult<()> {
        if let Some(fwhm) = self.fixed_fwhm_arcsec {
            if !fwhm.is_finite() || fwhm < 0.0 {
                return Err(MosaicError::Config(format!(
                    "fixed common FWHM must be a non-negative number, got {}",
                    fwhm
                )));
            }
        }
        if !self.pb_clip.is_finite() || self.pb_clip < 0.0 {
            return Err(MosaicError::Config(format!(
                "primary-beam clip level must be a non-negative number, got {}",
                self.pb_clip
            )));
        }
        if !self.wcs_tolerance.is_finite() || self.wcs_tolerance < 0.0 {
            return Err(MosaicError::Config(format!(
                "WCS tolerance must be a non-negative number, got {}",
                self.wcs_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self::new(default_pb_clip(), default_output_dir())
    }
}

/// Externally supplied constraint on the output mosaic frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFrame {
    /// Use the WCS and shape found in this FITS header verbatim.
    Header(PathBuf),
    /// Solve the frame bounds around a fixed reference coordinate (degrees).
    Center { ra: f64, dec: f64 },
}

/// One positionally matched beam image and primary-beam map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeamPair {
    pub image: PathBuf,
    pub pbmap: PathBuf,
}

/// Failure kinds of a mosaic run.
#[derive(thiserror::Error, Debug)]
pub enum MosaicError {
    #[error("all beams are rejected, not continuing with Stokes V mosaicking")]
    NoBeams,
    #[error("only one beam was accepted, not continuing with Stokes V mosaicking")]
    SingleBeam,
    #[error("{images} beam images but {pbmaps} primary-beam maps")]
    UnpairedInputs { images: usize, pbmaps: usize },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("missing header keyword {key} in {context}")]
    MissingKeyword { key: String, context: String },
    #[error("invalid FITS: {0}")]
    InvalidFits(String),
    #[error("FITS access failed for {}: {source}", path.display())]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("cannot reconvolve: {0}")]
    Reconvolve(String),
    #[error("beam {beam} has no valid pixels above the primary-beam clip level")]
    EmptyFootprint { beam: usize },
    #[error("beam {beam} has no positive primary-beam weight to normalize by")]
    DegenerateWeights { beam: usize },
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type MosaicResult<T> = Result<T, MosaicError>;
