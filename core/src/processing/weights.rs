use ndarray::Array2;

use crate::prelude::{MosaicError, MosaicResult};
use crate::processing::cutout::Cutout;

/// Squared primary-beam response normalized to a peak of one, cropped to the
/// paired image's cutout. Masked (NaN) pixels weigh zero.
pub fn build_weights(
    beam: usize,
    clipped_pb: &Array2<f64>,
    cutout: &Cutout,
) -> MosaicResult<Array2<f64>> {
    let squared = clipped_pb.mapv(|v| if v.is_nan() { 0.0 } else { v * v });
    let peak = squared.iter().cloned().fold(0.0f64, f64::max);
    if peak <= 0.0 || !peak.is_finite() {
        return Err(MosaicError::DegenerateWeights { beam });
    }
    let weights = squared.mapv(|v| v / peak);
    cutout.extract(&weights)
}
