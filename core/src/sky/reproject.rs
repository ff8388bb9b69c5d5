use ndarray::{Array2, Zip};

use super::wcs::CelestialWcs;

/// Rounding noise below this fraction of a pixel is snapped to the grid.
const SNAP: f64 = 1e-6;

/// Bilinear sample of `data` at a 0-based `(x, y)` position.
///
/// Positions within half a pixel of the outer pixel centres are clamped onto
/// the edge; anything further out, or touching a NaN neighbour with non-zero
/// weight, is NaN.
pub fn sample_bilinear(data: &Array2<f64>, x: f64, y: f64) -> f64 {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 || !x.is_finite() || !y.is_finite() {
        return f64::NAN;
    }
    let inside = |v: f64, len: usize| v >= -0.5 && v <= len as f64 - 0.5;
    if !inside(x, cols) || !inside(y, rows) {
        return f64::NAN;
    }
    let x = snap(x.clamp(0.0, (cols - 1) as f64));
    let y = snap(y.clamp(0.0, (rows - 1) as f64));

    let (c0, r0) = (x.floor() as usize, y.floor() as usize);
    let (c1, r1) = ((c0 + 1).min(cols - 1), (r0 + 1).min(rows - 1));
    let (fx, fy) = (x - c0 as f64, y - r0 as f64);

    let taps = [
        ((1.0 - fx) * (1.0 - fy), data[[r0, c0]]),
        (fx * (1.0 - fy), data[[r0, c1]]),
        ((1.0 - fx) * fy, data[[r1, c0]]),
        (fx * fy, data[[r1, c1]]),
    ];
    let mut value = 0.0;
    for (weight, sample) in taps {
        if weight > 0.0 {
            if sample.is_nan() {
                return f64::NAN;
            }
            value += weight * sample;
        }
    }
    value
}

fn snap(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < SNAP {
        nearest
    } else {
        v
    }
}

/// Region of an output grid, `rows.0..rows.1` by `cols.0..cols.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub rows: (usize, usize),
    pub cols: (usize, usize),
}

impl PixelBox {
    pub fn full(shape: (usize, usize)) -> Self {
        Self {
            rows: (0, shape.0),
            cols: (0, shape.1),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.1 - self.rows.0, self.cols.1 - self.cols.0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.1 <= self.rows.0 || self.cols.1 <= self.cols.0
    }
}

/// Part of the `target` grid covered by an input of `shape` on `source`,
/// found by projecting the input's edges, grown by one pixel for interpolation.
pub fn overlap_box(
    source: &CelestialWcs,
    shape: (usize, usize),
    target: &CelestialWcs,
    target_shape: (usize, usize),
) -> PixelBox {
    let (rows, cols) = shape;
    let mut edge = Vec::new();
    let steps = 16;
    for k in 0..=steps {
        let t = k as f64 / steps as f64;
        let x = -0.5 + t * cols as f64;
        let y = -0.5 + t * rows as f64;
        edge.push((x, -0.5));
        edge.push((x, rows as f64 - 0.5));
        edge.push((-0.5, y));
        edge.push((cols as f64 - 0.5, y));
    }

    let (mut xmin, mut xmax, mut ymin, mut ymax) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for (x, y) in edge {
        let projected = source
            .pixel_to_world(x, y)
            .and_then(|(lon, lat)| target.world_to_pixel(lon, lat));
        match projected {
            Some((px, py)) => {
                xmin = xmin.min(px);
                xmax = xmax.max(px);
                ymin = ymin.min(py);
                ymax = ymax.max(py);
            }
            // an edge outside the target projection: fall back to everything
            None => return PixelBox::full(target_shape),
        }
    }

    let clamp = |lo: f64, hi: f64, len: usize| -> (usize, usize) {
        let start = (lo.floor() - 1.0).max(0.0).min(len as f64) as usize;
        let end = (hi.ceil() + 2.0).max(0.0).min(len as f64) as usize;
        (start, end.max(start))
    };
    PixelBox {
        rows: clamp(ymin, ymax, target_shape.0),
        cols: clamp(xmin, xmax, target_shape.1),
    }
}

/// Reprojects `data` (on `source`) onto `target` over `region`, returning an
/// array of the region's shape. Uncovered pixels are NaN.
pub fn reproject_region(
    data: &Array2<f64>,
    source: &CelestialWcs,
    target: &CelestialWcs,
    region: PixelBox,
) -> Array2<f64> {
    let mut out = Array2::from_elem(region.shape(), f64::NAN);
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        let x = (region.cols.0 + c) as f64;
        let y = (region.rows.0 + r) as f64;
        *value = target
            .pixel_to_world(x, y)
            .and_then(|(lon, lat)| source.world_to_pixel(lon, lat))
            .map(|(sx, sy)| sample_bilinear(data, sx, sy))
            .unwrap_or(f64::NAN);
    });
    out
}

/// Reprojects `data` onto the whole `target` grid of `shape`.
pub fn reproject(
    data: &Array2<f64>,
    source: &CelestialWcs,
    target: &CelestialWcs,
    shape: (usize, usize),
) -> Array2<f64> {
    reproject_region(data, source, target, PixelBox::full(shape))
}
