use ndarray::Array2;

use super::beam::Psf;
use crate::fits::image::SkyImage;
use crate::math::fft::FftHelper;
use crate::prelude::{MosaicError, MosaicResult};
use crate::sky::wcs::CelestialWcs;

const FWHM_TO_SIGMA2: f64 = 1.0 / (8.0 * std::f64::consts::LN_2);

/// Smooths `image` from its `native` beam to `target`, keeping Jy/beam
/// calibration, and records the new beam in the header.
pub fn reconvolve(image: &SkyImage, native: &Psf, target: &Psf) -> MosaicResult<SkyImage> {
    let kernel = target.deconvolve(native).ok_or_else(|| {
        MosaicError::Reconvolve(format!(
            "{}: common beam {} is sharper than the native beam {}",
            image.label, target, native
        ))
    })?;

    let data = if kernel.is_point() {
        image.data.clone()
    } else {
        let raster = rasterize(&kernel, &image.wcs, image.shape());
        let scale = target.area() / native.area();
        FftHelper::new()
            .convolve(&image.data, &raster)
            .mapv(|v| v * scale)
    };

    let mut out = image.with_data(data);
    target.write_header(&mut out.header);
    Ok(out)
}

/// Samples a beam on the pixel grid of `wcs`, normalized to unit sum. The
/// raster is odd-sized and never larger than the image it will smooth.
pub(crate) fn rasterize(beam: &Psf, wcs: &CelestialWcs, shape: (usize, usize)) -> Array2<f64> {
    let scale = wcs.pixel_scales();
    let [xx, yy, xy] = beam.covariance().map(|v| v * FWHM_TO_SIGMA2);
    // keep line-like kernels invertible
    let floor = (scale[0].min(scale[1]) * 1e-3).powi(2);
    let (xx, yy) = (xx + floor, yy + floor);
    let det = xx * yy - xy * xy;

    let reach = 4.0 * beam.major * FWHM_TO_SIGMA2.sqrt();
    let half = |axis_scale: f64, len: usize| -> usize {
        let wanted = (reach / axis_scale).ceil() as usize;
        wanted.min(len.saturating_sub(1) / 2).max(1)
    };
    let (hr, hc) = (half(scale[1], shape.0), half(scale[0], shape.1));

    let m = [
        [wcs.cdelt[0] * wcs.pc[0][0], wcs.cdelt[0] * wcs.pc[0][1]],
        [wcs.cdelt[1] * wcs.pc[1][0], wcs.cdelt[1] * wcs.pc[1][1]],
    ];
    let mut raster = Array2::from_shape_fn((2 * hr + 1, 2 * hc + 1), |(r, c)| {
        let dx = c as f64 - hc as f64;
        let dy = r as f64 - hr as f64;
        let east = m[0][0] * dx + m[0][1] * dy;
        let north = m[1][0] * dx + m[1][1] * dy;
        let q = (yy * east * east - 2.0 * xy * east * north + xx * north * north) / det;
        (-0.5 * q).exp()
    });
    let total = raster.sum();
    raster.mapv_inplace(|v| v / total);
    raster
}
