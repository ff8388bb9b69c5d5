use std::path::Path;

use ndarray::{Array2, ArrayD, Axis, Ix2};

use super::header::FitsHeader;
use super::io::{read_fits, write_fits};
use crate::prelude::{MosaicError, MosaicResult};
use crate::processing::cutout::Cutout;
use crate::sky::wcs::CelestialWcs;

/// Primary HDU as stored on disk, possibly with degenerate spectral and
/// polarization axes.
#[derive(Debug, Clone)]
pub struct FitsImage {
    pub header: FitsHeader,
    pub data: ArrayD<f64>,
    pub label: String,
}

impl FitsImage {
    pub fn read(path: &Path) -> MosaicResult<Self> {
        let (header, data) = read_fits(path)?;
        Ok(Self {
            header,
            data,
            label: path.display().to_string(),
        })
    }

    /// Copies the celestial reference value of `source` into this header.
    /// Primary-beam models are written around a nominal pointing; this pins
    /// them to the pointing of their paired image.
    pub fn transfer_coordinates(&mut self, source: &FitsHeader) -> MosaicResult<()> {
        for key in ["CRVAL1", "CRVAL2"] {
            let value = source.require_f64(key, "coordinate source")?;
            self.header.set_f64(key, value);
        }
        Ok(())
    }

    /// Drops every axis beyond the two celestial ones. Those axes must have
    /// length one; their header keys are removed.
    pub fn squeeze(self) -> MosaicResult<SkyImage> {
        let ndim = self.data.ndim();
        if ndim < 2 {
            return Err(MosaicError::InvalidFits(format!(
                "{} has {} axes, a sky image needs two",
                self.label, ndim
            )));
        }
        let mut data = self.data;
        // array axes are FITS axes reversed, so the extra ones lead
        while data.ndim() > 2 {
            if data.len_of(Axis(0)) != 1 {
                return Err(MosaicError::InvalidFits(format!(
                    "{}: axis {} has length {} and cannot be squeezed",
                    self.label,
                    data.ndim(),
                    data.len_of(Axis(0))
                )));
            }
            data = data.index_axis_move(Axis(0), 0);
        }
        let data = data
            .into_dimensionality::<Ix2>()
            .map_err(|err| MosaicError::InvalidFits(format!("{}: {}", self.label, err)))?;

        let mut header = self.header;
        header.set_i64("NAXIS", 2);
        header.retain(|card| !is_extra_axis_key(&card.key));
        let wcs = CelestialWcs::from_header(&header, &self.label)?;

        Ok(SkyImage {
            header,
            wcs,
            data,
            label: self.label,
        })
    }
}

/// Header keys that describe an axis numbered 3 or higher.
fn is_extra_axis_key(key: &str) -> bool {
    const PREFIXES: &[&str] = &["NAXIS", "CTYPE", "CRVAL", "CDELT", "CRPIX", "CUNIT", "CROTA"];
    for prefix in PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            return rest.parse::<u32>().map(|axis| axis >= 3).unwrap_or(false);
        }
    }
    for prefix in ["PC", "CD"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            let indices: Vec<_> = if rest.contains('_') {
                rest.split('_').map(|part| part.parse::<u32>().ok()).collect()
            } else if rest.len() == 6 {
                vec![rest[..3].parse().ok(), rest[3..].parse().ok()]
            } else {
                continue;
            };
            return indices.len() == 2
                && indices.iter().all(Option::is_some)
                && indices.iter().flatten().any(|&axis| axis >= 3);
        }
    }
    false
}

/// A two-axis celestial image held in memory.
#[derive(Debug, Clone)]
pub struct SkyImage {
    pub header: FitsHeader,
    pub wcs: CelestialWcs,
    pub data: Array2<f64>,
    pub label: String,
}

impl SkyImage {
    pub fn new(header: FitsHeader, wcs: CelestialWcs, data: Array2<f64>, label: &str) -> Self {
        let mut header = header;
        wcs.apply_to(&mut header);
        Self {
            header,
            wcs,
            data,
            label: label.to_string(),
        }
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Same frame and header, different pixel values.
    pub fn with_data(&self, data: Array2<f64>) -> Self {
        Self {
            header: self.header.clone(),
            wcs: self.wcs.clone(),
            data,
            label: self.label.clone(),
        }
    }

    /// Extracts the cutout region; the WCS reference pixel follows the crop.
    pub fn crop(&self, cutout: &Cutout) -> MosaicResult<Self> {
        let data = cutout.extract(&self.data)?;
        let (row, col) = cutout.origin;
        Ok(SkyImage::new(
            self.header.clone(),
            self.wcs.shifted(row, col),
            data,
            &self.label,
        ))
    }

    pub fn write(&self, path: &Path) -> MosaicResult<()> {
        let data = self.data.mapv(|v| v as f32);
        write_fits(path, &self.header, data.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn cube_header() -> FitsHeader {
        let mut header = FitsHeader::new();
        header.set_i64("NAXIS", 4);
        for (axis, ctype, crval) in [
            (1, "RA---SIN", 150.0),
            (2, "DEC--SIN", 45.0),
            (3, "FREQ", 1.4e9),
            (4, "STOKES", 4.0),
        ] {
            header.set_str(&format!("CTYPE{}", axis), ctype);
            header.set_f64(&format!("CRVAL{}", axis), crval);
            header.set_f64(&format!("CRPIX{}", axis), 1.0);
            header.set_f64(&format!("CDELT{}", axis), if axis == 1 { -0.001 } else { 0.001 });
        }
        header.set_f64("PC3_3", 1.0);
        header
    }

    #[test]
    fn squeeze_drops_degenerate_axes_and_their_keys() {
        let data = Array::from_shape_fn(IxDyn(&[1, 1, 3, 4]), |idx| (idx[2] * 4 + idx[3]) as f64);
        let image = FitsImage {
            header: cube_header(),
            data,
            label: "cube".into(),
        };
        let sky = image.squeeze().unwrap();
        assert_eq!(sky.shape(), (3, 4));
        assert_eq!(sky.data[[2, 3]], 11.0);
        assert_eq!(sky.header.get_i64("NAXIS"), Some(2));
        assert!(!sky.header.contains("CTYPE3"));
        assert!(!sky.header.contains("CRVAL4"));
        assert!(!sky.header.contains("PC3_3"));
        assert!(sky.header.contains("CRVAL2"));
    }

    #[test]
    fn squeeze_refuses_real_spectral_axes() {
        let image = FitsImage {
            header: cube_header(),
            data: ArrayD::zeros(IxDyn(&[1, 2, 3, 4])),
            label: "cube".into(),
        };
        assert!(matches!(image.squeeze(), Err(MosaicError::InvalidFits(_))));
    }

    #[test]
    fn transferred_coordinates_replace_the_reference_value() {
        let mut pb = FitsImage {
            header: cube_header(),
            data: ArrayD::zeros(IxDyn(&[1, 1, 3, 4])),
            label: "pb".into(),
        };
        let mut source = FitsHeader::new();
        source.set_f64("CRVAL1", 151.5);
        source.set_f64("CRVAL2", 44.25);
        pb.transfer_coordinates(&source).unwrap();
        assert_eq!(pb.header.get_f64("CRVAL1"), Some(151.5));
        assert_eq!(pb.header.get_f64("CRVAL2"), Some(44.25));
    }

    #[test]
    fn crop_moves_the_reference_pixel() {
        let header = cube_header();
        let image = FitsImage {
            header,
            data: ArrayD::zeros(IxDyn(&[1, 1, 6, 6])),
            label: "cube".into(),
        }
        .squeeze()
        .unwrap();
        let cutout = Cutout::new((2, 1), (3, 4));
        let cropped = image.crop(&cutout).unwrap();
        assert_eq!(cropped.shape(), (3, 4));
        assert_eq!(cropped.header.get_f64("CRPIX1"), Some(0.0));
        assert_eq!(cropped.header.get_f64("CRPIX2"), Some(-1.0));
    }
}
