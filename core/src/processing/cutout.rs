use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::prelude::{MosaicError, MosaicResult};

/// Where a crop was taken from its parent frame. Applying the same cutout to
/// an image and its weight map keeps them aligned pixel for pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cutout {
    /// `(row, col)` of the first cropped pixel in the parent frame.
    pub origin: (usize, usize),
    /// `(rows, cols)`.
    pub shape: (usize, usize),
}

impl Cutout {
    pub fn new(origin: (usize, usize), shape: (usize, usize)) -> Self {
        Self { origin, shape }
    }

    /// Smallest box holding every finite pixel, or `None` if there is none.
    pub fn bounding_finite(data: &Array2<f64>) -> Option<Self> {
        let mut rows = (usize::MAX, 0usize);
        let mut cols = (usize::MAX, 0usize);
        for ((row, col), value) in data.indexed_iter() {
            if value.is_finite() {
                rows = (rows.0.min(row), rows.1.max(row));
                cols = (cols.0.min(col), cols.1.max(col));
            }
        }
        if rows.0 == usize::MAX {
            return None;
        }
        Some(Self::new(
            (rows.0, cols.0),
            (rows.1 - rows.0 + 1, cols.1 - cols.0 + 1),
        ))
    }

    /// Centre of the cutout in parent `(x, y)` pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.origin.1 as f64 + (self.shape.1 as f64 - 1.0) / 2.0,
            self.origin.0 as f64 + (self.shape.0 as f64 - 1.0) / 2.0,
        )
    }

    pub fn extract(&self, data: &Array2<f64>) -> MosaicResult<Array2<f64>> {
        let (rows, cols) = data.dim();
        let end_row = self.origin.0 + self.shape.0;
        let end_col = self.origin.1 + self.shape.1;
        if end_row > rows || end_col > cols {
            return Err(MosaicError::Geometry(format!(
                "cutout {:?}+{:?} exceeds a {}x{} frame",
                self.origin, self.shape, rows, cols
            )));
        }
        Ok(data
            .slice(s![self.origin.0..end_row, self.origin.1..end_col])
            .to_owned())
    }
}
