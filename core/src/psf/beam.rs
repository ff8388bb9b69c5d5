//! Elliptical Gaussian restoring beams.
//!
//! A beam is handled through its FWHM "covariance" in the (east, north)
//! plane, `xx = maj² sin²θ + min² cos²θ`, `yy = maj² cos²θ + min² sin²θ`,
//! `xy = (maj² - min²) sinθ cosθ`, where θ is the position angle east of
//! north. Convolution adds covariances and deconvolution subtracts them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fits::header::FitsHeader;
use crate::prelude::MosaicResult;

/// Restoring beam: FWHM axes and position angle, all in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Psf {
    pub major: f64,
    pub minor: f64,
    pub pa: f64,
}

impl Psf {
    pub fn new(major: f64, minor: f64, pa: f64) -> Self {
        let (major, minor, pa) = if minor > major {
            (minor, major, pa + 90.0)
        } else {
            (major, minor, pa)
        };
        Self {
            major,
            minor,
            pa: normalize_pa(pa),
        }
    }

    pub fn circular(fwhm: f64) -> Self {
        Self {
            major: fwhm,
            minor: fwhm,
            pa: 0.0,
        }
    }

    pub fn point() -> Self {
        Self::circular(0.0)
    }

    /// Reads `BMAJ`, `BMIN` and `BPA` (degrees); a missing `BPA` means zero.
    pub fn from_header(header: &FitsHeader, context: &str) -> MosaicResult<Self> {
        let major = header.require_f64("BMAJ", context)?;
        let minor = header.require_f64("BMIN", context)?;
        let pa = header.get_f64("BPA").unwrap_or(0.0);
        Ok(Self::new(major, minor, pa))
    }

    pub fn write_header(&self, header: &mut FitsHeader) {
        header.set_f64("BMAJ", self.major);
        header.set_f64("BMIN", self.minor);
        header.set_f64("BPA", self.pa);
    }

    /// Beam solid angle in square degrees.
    pub fn area(&self) -> f64 {
        std::f64::consts::PI / (4.0 * std::f64::consts::LN_2) * self.major * self.minor
    }

    pub fn is_point(&self) -> bool {
        self.major <= 0.0
    }

    pub(crate) fn covariance(&self) -> [f64; 3] {
        let (sin, cos) = self.pa.to_radians().sin_cos();
        let maj2 = self.major * self.major;
        let min2 = self.minor * self.minor;
        [
            maj2 * sin * sin + min2 * cos * cos,
            maj2 * cos * cos + min2 * sin * sin,
            (maj2 - min2) * sin * cos,
        ]
    }

    pub(crate) fn from_covariance([xx, yy, xy]: [f64; 3]) -> Self {
        let s = xx + yy;
        let t = ((yy - xx).powi(2) + 4.0 * xy * xy).sqrt();
        let major = (0.5 * (s + t)).max(0.0).sqrt();
        let minor = (0.5 * (s - t)).max(0.0).sqrt();
        let pa = if xy == 0.0 && yy == xx {
            0.0
        } else {
            0.5 * (2.0 * xy).atan2(yy - xx).to_degrees()
        };
        Self::new(major, minor, pa)
    }

    pub fn convolve(&self, other: &Psf) -> Psf {
        let a = self.covariance();
        let b = other.covariance();
        Psf::from_covariance([a[0] + b[0], a[1] + b[1], a[2] + b[2]])
    }

    /// The beam that convolved with `other` gives `self`. `None` when `other`
    /// is larger than `self` along some direction. Beams equal up to rounding
    /// deconvolve to a point.
    pub fn deconvolve(&self, other: &Psf) -> Option<Psf> {
        let a = self.covariance();
        let b = other.covariance();
        let [xx, yy, xy] = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];

        let smallest = [self.major, self.minor, other.major, other.minor]
            .into_iter()
            .filter(|axis| *axis > 0.0)
            .fold(f64::INFINITY, f64::min);
        let limit = if smallest.is_finite() {
            1e-6 * smallest * smallest
        } else {
            0.0
        };

        let s = xx + yy;
        let t = ((yy - xx).powi(2) + 4.0 * xy * xy).sqrt();
        if xx < 0.0 || yy < 0.0 || s < t {
            if 0.5 * (s - t) < limit && xx > -limit && yy > -limit && 0.5 * (s + t) < limit {
                return Some(Psf::point());
            }
            if 0.5 * (s - t) > -limit && xx > -limit && yy > -limit {
                // degenerate line kernel within tolerance
                return Some(Psf::from_covariance([xx.max(0.0), yy.max(0.0), xy]));
            }
            return None;
        }
        let kernel = Psf::from_covariance([xx, yy, xy]);
        if kernel.major * kernel.major < limit {
            return Some(Psf::point());
        }
        Some(kernel)
    }

    /// Whether `other` can be convolved up to this beam.
    pub fn contains(&self, other: &Psf) -> bool {
        self.deconvolve(other).is_some()
    }
}

fn normalize_pa(pa: f64) -> f64 {
    let wrapped = (pa + 90.0).rem_euclid(180.0) - 90.0;
    if wrapped == -90.0 {
        90.0
    } else {
        wrapped
    }
}

impl fmt::Display for Psf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}\" x {:.2}\" pa {:.1} deg",
            self.major * 3600.0,
            self.minor * 3600.0,
            self.pa
        )
    }
}
