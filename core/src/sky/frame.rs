use log::debug;

use super::wcs::{unit_vector, CelestialWcs, Projection};
use crate::prelude::{MosaicError, MosaicResult};

/// An output grid: frame plus `(rows, cols)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGrid {
    pub wcs: CelestialWcs,
    pub shape: (usize, usize),
}

/// Unrotated frame with the finest input pixel scale spanning every input.
///
/// The reference coordinate is `center` when given, otherwise the mean unit
/// vector of all input pixel centres. Bounds come from the input pixel-edge
/// corners.
pub fn optimal_frame(
    inputs: &[(&CelestialWcs, (usize, usize))],
    projection: Projection,
    center: Option<(f64, f64)>,
) -> MosaicResult<OutputGrid> {
    if inputs.is_empty() {
        return Err(MosaicError::Geometry(
            "no inputs to derive a mosaic frame from".into(),
        ));
    }

    let mut corners = Vec::with_capacity(inputs.len() * 4);
    let mut sum = [0.0f64; 3];
    let mut resolution = f64::INFINITY;
    for (wcs, (rows, cols)) in inputs {
        let (rows, cols) = (*rows as f64, *cols as f64);
        for (x, y) in [
            (-0.5, -0.5),
            (cols - 0.5, -0.5),
            (cols - 0.5, rows - 0.5),
            (-0.5, rows - 0.5),
        ] {
            corners.push(world(wcs, x, y)?);
        }
        if center.is_none() {
            for row in 0..rows as usize {
                for col in 0..cols as usize {
                    let (lon, lat) = world(wcs, col as f64, row as f64)?;
                    let v = unit_vector(lon, lat);
                    sum.iter_mut().zip(v).for_each(|(s, c)| *s += c);
                }
            }
        }
        let scales = wcs.pixel_scales();
        resolution = resolution.min(scales[0].min(scales[1]));
    }

    let (lon, lat) = match center {
        Some(center) => center,
        None => {
            let norm = (sum[0] * sum[0] + sum[1] * sum[1] + sum[2] * sum[2]).sqrt();
            if norm == 0.0 {
                return Err(MosaicError::Geometry(
                    "input footprints average to no direction".into(),
                ));
            }
            let lon = sum[1].atan2(sum[0]).to_degrees().rem_euclid(360.0);
            let lat = (sum[2] / norm).asin().to_degrees();
            (lon, lat)
        }
    };

    let reference = inputs[0].0;
    let mut wcs = CelestialWcs::new(projection, [lon, lat], [0.0, 0.0], resolution);
    wcs.axes = reference.axes.clone();
    wcs.radesys = reference.radesys.clone();
    wcs.equinox = reference.equinox;

    // with CRPIX at 0 the 0-based pixel coordinate equals offset - 1
    let (mut xmin, mut xmax, mut ymin, mut ymax) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for (lon, lat) in corners {
        let (x, y) = wcs.world_to_pixel(lon, lat).ok_or_else(|| {
            MosaicError::Geometry(format!(
                "input corner ({:.5}, {:.5}) falls outside the {} projection",
                lon,
                lat,
                projection.code()
            ))
        })?;
        xmin = xmin.min(x + 1.0);
        xmax = xmax.max(x + 1.0);
        ymin = ymin.min(y + 1.0);
        ymax = ymax.max(y + 1.0);
    }

    let cols = (xmax - xmin).round().max(1.0) as usize;
    let rows = (ymax - ymin).round().max(1.0) as usize;
    // first pixel's lower edge sits on the lowest corner
    wcs.crpix = [0.5 - xmin, 0.5 - ymin];
    debug!(
        "Optimal frame centre ({:.6}, {:.6}) pixel {:.3e} deg shape {}x{}",
        lon, lat, resolution, rows, cols
    );
    Ok(OutputGrid {
        wcs,
        shape: (rows, cols),
    })
}

fn world(wcs: &CelestialWcs, x: f64, y: f64) -> MosaicResult<(f64, f64)> {
    wcs.pixel_to_world(x, y).ok_or_else(|| {
        MosaicError::Geometry(format!(
            "pixel ({}, {}) has no sky position in its frame",
            x, y
        ))
    })
}
