use log::{debug, info};
use nalgebra::{Matrix2, SymmetricEigen, Vector2};

use super::beam::Psf;
use crate::prelude::{MosaicError, MosaicResult};

const ARCSEC: f64 = 1.0 / 3600.0;
const SAMPLES_PER_BEAM: usize = 90;
const GROWTH: f64 = 1.0 + 1e-4;

/// Decides the single resolution every beam is convolved to.
///
/// With a fixed FWHM (arcseconds) the result is that circular beam regardless
/// of the native resolutions; otherwise it is the smallest beam every native
/// beam can be convolved up to.
pub fn resolve_common_psf(fixed_fwhm_arcsec: Option<f64>, natives: &[Psf]) -> MosaicResult<Psf> {
    match fixed_fwhm_arcsec {
        Some(fwhm) if !fwhm.is_finite() || fwhm < 0.0 => Err(MosaicError::Config(format!(
            "fixed common FWHM must be a non-negative number, got {}",
            fwhm
        ))),
        Some(fwhm) => {
            let psf = Psf::circular(fwhm * ARCSEC);
            info!("Using fixed common PSF {}", psf);
            Ok(psf)
        }
        None => {
            let psf = common_beam(natives)?;
            info!("Derived common PSF {} from {} beams", psf, natives.len());
            Ok(psf)
        }
    }
}

/// Smallest ellipse bounding every beam in `natives`.
pub fn common_beam(natives: &[Psf]) -> MosaicResult<Psf> {
    let largest = natives
        .iter()
        .copied()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
        .ok_or_else(|| MosaicError::Config("no beams to derive a common PSF from".into()))?;

    if natives.iter().all(|beam| largest.contains(beam)) {
        return Ok(largest);
    }

    let mut candidate = enclosing_ellipse(natives);
    debug!("Minimum enclosing ellipse {}", candidate);
    // sampled boundaries can leave the solution marginally short
    for _ in 0..2000 {
        if natives.iter().all(|beam| candidate.contains(beam)) {
            return Ok(candidate);
        }
        candidate = Psf::new(candidate.major * GROWTH, candidate.minor * GROWTH, candidate.pa);
    }
    Err(MosaicError::Reconvolve(format!(
        "no common beam found enclosing {} input beams",
        natives.len()
    )))
}

/// Khachiyan's minimum-volume enclosing ellipse of points sampled on the
/// half-maximum contours, centred on the origin.
fn enclosing_ellipse(natives: &[Psf]) -> Psf {
    let points: Vec<Vector2<f64>> = natives
        .iter()
        .flat_map(|beam| {
            let (sin, cos) = beam.pa.to_radians().sin_cos();
            let major = Vector2::new(sin, cos) * (beam.major / 2.0);
            let minor = Vector2::new(cos, -sin) * (beam.minor / 2.0);
            (0..SAMPLES_PER_BEAM).map(move |k| {
                let t = 2.0 * std::f64::consts::PI * k as f64 / SAMPLES_PER_BEAM as f64;
                major * t.cos() + minor * t.sin()
            })
        })
        .collect();

    let d = 2.0;
    let n = points.len();
    let mut u = vec![1.0 / n as f64; n];
    for _ in 0..10_000 {
        let x = points
            .iter()
            .zip(&u)
            .fold(Matrix2::<f64>::zeros(), |acc, (p, w)| acc + p * p.transpose() * *w);
        let inv = match x.try_inverse() {
            Some(inv) => inv,
            None => break,
        };
        let (j, m) = points
            .iter()
            .map(|p| (p.transpose() * inv * p)[(0, 0)])
            .enumerate()
            .fold((0, f64::MIN), |best, (idx, m)| if m > best.1 { (idx, m) } else { best });
        let step = (m - d) / (d * (m - 1.0));
        if step < 1e-10 {
            break;
        }
        u.iter_mut().for_each(|w| *w *= 1.0 - step);
        u[j] += step;
    }

    // shape matrix of the ellipse {p : p' (d X)^-1 p <= 1}
    let x = points
        .iter()
        .zip(&u)
        .fold(Matrix2::<f64>::zeros(), |acc, (p, w)| acc + p * p.transpose() * *w);
    let shape = x * d;
    let eigen = SymmetricEigen::new(shape);
    let (big, small) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let semi_major = eigen.eigenvalues[big].max(0.0).sqrt();
    let semi_minor = eigen.eigenvalues[small].max(0.0).sqrt();
    let axis = eigen.eigenvectors.column(big);
    let pa = axis[0].atan2(axis[1]).to_degrees();
    Psf::new(2.0 * semi_major, 2.0 * semi_minor, pa)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_ignores_native_beams() {
        let natives = [Psf::new(20.0 * ARCSEC, 10.0 * ARCSEC, 30.0)];
        let psf = resolve_common_psf(Some(15.0), &natives).unwrap();
        assert_eq!(psf, Psf::circular(15.0 * ARCSEC));
        assert_eq!(psf.pa, 0.0);
    }

    #[test]
    fn negative_fixed_fwhm_is_rejected() {
        assert!(matches!(
            resolve_common_psf(Some(-2.0), &[]),
            Err(MosaicError::Config(_))
        ));
    }

    #[test]
    fn nested_beams_resolve_to_the_largest() {
        let natives = [
            Psf::new(12.0 * ARCSEC, 8.0 * ARCSEC, 10.0),
            Psf::new(15.0 * ARCSEC, 11.0 * ARCSEC, 10.0),
            Psf::circular(7.0 * ARCSEC),
        ];
        assert_eq!(resolve_common_psf(None, &natives).unwrap(), natives[1]);
    }

    #[test]
    fn crossed_beams_resolve_to_an_enclosing_circle() {
        let natives = [
            Psf::new(10.0 * ARCSEC, 5.0 * ARCSEC, 0.0),
            Psf::new(10.0 * ARCSEC, 5.0 * ARCSEC, 90.0),
        ];
        let common = common_beam(&natives).unwrap();
        assert!(natives.iter().all(|beam| common.contains(beam)));
        assert!((common.major / ARCSEC - 10.0).abs() < 0.1, "{}", common);
        assert!((common.minor / ARCSEC - 10.0).abs() < 0.1, "{}", common);
    }

    #[test]
    fn no_beams_cannot_be_resolved() {
        assert!(matches!(common_beam(&[]), Err(MosaicError::Config(_))));
    }
}
