use ndarray::Array2;

use crate::fits::image::{FitsImage, SkyImage};
use crate::math::stats::StatsHelper;
use crate::prelude::{BeamPair, MosaicConfig, MosaicError, MosaicResult};
use crate::processing::cutout::Cutout;
use crate::processing::scratch::ScratchSpace;
use crate::processing::weights::build_weights;
use crate::psf::{reconvolve, Psf};
use crate::sky::reproject::reproject;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;

/// One beam after correction, ready for the compositor.
#[derive(Debug, Clone)]
pub struct CorrectedBeam {
    pub index: usize,
    pub target: String,
    pub frequency: f64,
    /// Primary-beam corrected image, cropped to its valid footprint.
    pub image: SkyImage,
    /// Coadd weights on the same pixels as `image`.
    pub weights: Array2<f64>,
    pub cutout: Cutout,
}

/// Brings single beams to the common resolution, corrects them for the
/// primary-beam response and derives their weights. Beams never see each
/// other, so any number of them can be corrected concurrently.
pub struct BeamCorrector<'a> {
    config: &'a MosaicConfig,
    common: Psf,
    scratch: &'a ScratchSpace,
    logger: LogManager,
    metrics: &'a MetricsRecorder,
}

impl<'a> BeamCorrector<'a> {
    pub fn new(
        config: &'a MosaicConfig,
        common: Psf,
        scratch: &'a ScratchSpace,
        logger: LogManager,
        metrics: &'a MetricsRecorder,
    ) -> Self {
        Self {
            config,
            common,
            scratch,
            logger,
            metrics,
        }
    }

    pub fn correct(&self, index: usize, pair: &BeamPair) -> MosaicResult<CorrectedBeam> {
        self.correct_beam(index, pair).map_err(|err| {
            self.metrics.record_error();
            err
        })
    }

    fn correct_beam(&self, index: usize, pair: &BeamPair) -> MosaicResult<CorrectedBeam> {
        let logger = self.logger.scoped(&format!("beam{:02}", index));

        let raw = FitsImage::read(&pair.image)?;
        // the spectral axis goes away with the squeeze
        let frequency = raw.header.spectral_reference(&raw.label)?;
        let target = raw.header.object(&raw.label)?;
        let native = Psf::from_header(&raw.header, &raw.label)?;
        let image = raw.squeeze()?;

        let image = reconvolve(&image, &native, &self.common)?;
        logger.detail(&format!("reconvolved {} -> {}", native, self.common));
        self.scratch.write(index, "reconv", &image)?;

        let mut pb = FitsImage::read(&pair.pbmap)?;
        pb.transfer_coordinates(&image.header)?;
        let pb = pb.squeeze()?;
        let pb = if pb.shape() == image.shape()
            && pb.wcs.same_grid(&image.wcs, self.config.wcs_tolerance)
        {
            pb
        } else {
            logger.record(&format!(
                "primary-beam grid {}x{} differs from the image, reprojecting",
                pb.shape().0,
                pb.shape().1
            ));
            self.metrics.record_reprojection();
            let data = reproject(&pb.data, &pb.wcs, &image.wcs, image.shape());
            let mut repr = image.with_data(data);
            repr.label = pb.label;
            self.scratch.write(index, "pb_repr", &repr)?;
            repr
        };

        let clip = self.config.pb_clip;
        let clipped = pb.data.mapv(|v| if v < clip { f64::NAN } else { v });
        let corrected = image.with_data(&image.data / &clipped);
        self.scratch.write(index, "pbcorr", &corrected)?;

        let cutout = Cutout::bounding_finite(&corrected.data)
            .ok_or(MosaicError::EmptyFootprint { beam: index })?;
        let cropped = corrected.crop(&cutout)?;
        self.scratch.write(index, "mos", &cropped)?;
        let weights = build_weights(index, &clipped, &cutout)?;

        let (x, y) = cutout.center();
        let (ra, dec) = corrected.wcs.pixel_to_world(x, y).ok_or_else(|| {
            MosaicError::Geometry(format!("beam {} cutout centre is off the sky", index))
        })?;
        logger.record(&format!(
            "{} at {:.6e} Hz: {} valid pixels in {}x{} around ({:.6}, {:.6}), rms {:.4e}",
            target,
            frequency,
            StatsHelper::finite_count(cropped.data.iter()),
            cutout.shape.0,
            cutout.shape.1,
            ra,
            dec,
            StatsHelper::rms(cropped.data.iter())
        ));
        self.metrics.record_corrected();

        Ok(CorrectedBeam {
            index,
            target,
            frequency,
            image: cropped,
            weights,
            cutout,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fits::header::FitsHeader;
    use crate::fits::io::write_fits;
    use crate::sky::wcs::{CelestialWcs, Projection};
    use std::path::{Path, PathBuf};

    pub(crate) const ARCSEC: f64 = 1.0 / 3600.0;

    /// Writes a four-axis beam cube the way imaging pipelines emit them.
    pub(crate) fn write_cube(
        path: &Path,
        wcs: &CelestialWcs,
        data: &Array2<f64>,
        frequency: f64,
        beam: &Psf,
        object: &str,
    ) {
        let mut header = FitsHeader::new();
        wcs.apply_to(&mut header);
        header.set_str("CTYPE3", "FREQ");
        header.set_f64("CRVAL3", frequency);
        header.set_f64("CRPIX3", 1.0);
        header.set_f64("CDELT3", 1.0e6);
        header.set_str("CTYPE4", "STOKES");
        header.set_f64("CRVAL4", 4.0);
        header.set_f64("CRPIX4", 1.0);
        header.set_f64("CDELT4", 1.0);
        header.set_str("OBJECT", object);
        beam.write_header(&mut header);
        let cube = data
            .mapv(|v| v as f32)
            .insert_axis(ndarray::Axis(0))
            .insert_axis(ndarray::Axis(0));
        write_fits(path, &header, cube.view()).unwrap();
    }

    pub(crate) fn beam_pair(
        dir: &Path,
        index: usize,
        wcs: &CelestialWcs,
        image: &Array2<f64>,
        pb: &Array2<f64>,
        frequency: f64,
        beam: &Psf,
    ) -> BeamPair {
        let image_path: PathBuf = dir.join(format!("image_{}.fits", index));
        let pb_path: PathBuf = dir.join(format!("pb_{}.fits", index));
        write_cube(&image_path, wcs, image, frequency, beam, "testfield");
        write_cube(&pb_path, wcs, pb, frequency, beam, "testfield");
        BeamPair {
            image: image_path,
            pbmap: pb_path,
        }
    }

    /// Flat unit image with a primary beam of 1 inside a centred
    /// `inner x inner` square and 0 outside.
    pub(crate) fn square_beam(
        rows: usize,
        cols: usize,
        inner: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let (top, left) = ((rows - inner) / 2, (cols - inner) / 2);
        let image = Array2::from_elem((rows, cols), 1.0);
        let pb = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let inside = (top..top + inner).contains(&r) && (left..left + inner).contains(&c);
            if inside {
                1.0
            } else {
                0.0
            }
        });
        (image, pb)
    }

    /// Flat unit image with a primary beam of 1 within `radius` pixels of the
    /// image centre and 0 outside.
    pub(crate) fn circular_beam(size: usize, radius: f64) -> (Array2<f64>, Array2<f64>) {
        let middle = (size as f64 - 1.0) / 2.0;
        let image = Array2::from_elem((size, size), 1.0);
        let pb = Array2::from_shape_fn((size, size), |(r, c)| {
            let distance = (r as f64 - middle).hypot(c as f64 - middle);
            if distance <= radius {
                1.0
            } else {
                0.0
            }
        });
        (image, pb)
    }

    #[test]
    fn correction_crops_to_the_clipped_footprint() {
        let dir = tempfile::tempdir().unwrap();
        let wcs = CelestialWcs::new(Projection::Sin, [150.0, -30.0], [5.5, 5.5], 2.0 * ARCSEC);
        let beam = Psf::circular(6.0 * ARCSEC);
        let (image, pb) = square_beam(10, 10, 6);
        let pair = beam_pair(dir.path(), 0, &wcs, &image, &pb, 1.4e9, &beam);

        let config = MosaicConfig::new(0.5, dir.path().join("out"));
        let scratch = ScratchSpace::create(Some(dir.path()), false).unwrap();
        let metrics = MetricsRecorder::new();
        let corrector = BeamCorrector::new(&config, beam, &scratch, LogManager::new(), &metrics);
        let corrected = corrector.correct(0, &pair).unwrap();

        assert_eq!(corrected.cutout, Cutout::new((2, 2), (6, 6)));
        assert_eq!(corrected.image.shape(), (6, 6));
        // the crop keeps the cutout centre on the same sky position
        let (x, y) = corrected.cutout.center();
        let parent = wcs.pixel_to_world(x, y).unwrap();
        let cropped = corrected.image.wcs.pixel_to_world(2.5, 2.5).unwrap();
        assert!((parent.0 - cropped.0).abs() < 1e-9);
        assert!((parent.1 - cropped.1).abs() < 1e-9);
        assert!(corrected.image.data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(corrected.weights.iter().all(|&w| w == 1.0));
        assert_eq!(corrected.frequency, 1.4e9);
        assert_eq!(corrected.target, "testfield");
        assert!(scratch.product_path(0, "mos").exists());
        assert!(!scratch.product_path(0, "pb_repr").exists());
        assert_eq!(metrics.snapshot().beams_corrected, 1);
    }

    #[test]
    fn offset_primary_beam_grid_is_reprojected() {
        let dir = tempfile::tempdir().unwrap();
        let wcs = CelestialWcs::new(Projection::Sin, [150.0, -30.0], [5.5, 5.5], 2.0 * ARCSEC);
        let beam = Psf::circular(6.0 * ARCSEC);
        let (image, _) = square_beam(10, 10, 6);
        let pb_wcs = CelestialWcs::new(Projection::Sin, [150.0, -30.0], [8.5, 8.5], 2.0 * ARCSEC);
        let pb = Array2::from_elem((16, 16), 0.8);
        let pair = beam_pair(dir.path(), 0, &wcs, &image, &image, 1.4e9, &beam);
        write_cube(&pair.pbmap, &pb_wcs, &pb, 1.4e9, &beam, "testfield");

        let config = MosaicConfig::new(0.1, dir.path().join("out"));
        let scratch = ScratchSpace::create(Some(dir.path()), false).unwrap();
        let metrics = MetricsRecorder::new();
        let corrector = BeamCorrector::new(&config, beam, &scratch, LogManager::new(), &metrics);
        let corrected = corrector.correct(2, &pair).unwrap();

        assert_eq!(corrected.image.shape(), (10, 10));
        assert!(corrected.image.data.iter().all(|&v| (v - 1.25).abs() < 1e-6));
        assert!(scratch.product_path(2, "pb_repr").exists());
        assert_eq!(metrics.snapshot().pb_reprojections, 1);
    }

    #[test]
    fn fully_clipped_beam_has_no_footprint() {
        let dir = tempfile::tempdir().unwrap();
        let wcs = CelestialWcs::new(Projection::Tan, [20.0, 10.0], [4.5, 4.5], 2.0 * ARCSEC);
        let beam = Psf::circular(6.0 * ARCSEC);
        let image = Array2::from_elem((8, 8), 1.0);
        let pb = Array2::from_elem((8, 8), 0.05);
        let pair = beam_pair(dir.path(), 1, &wcs, &image, &pb, 1.4e9, &beam);

        let config = MosaicConfig::new(0.1, dir.path().join("out"));
        let scratch = ScratchSpace::create(Some(dir.path()), false).unwrap();
        let metrics = MetricsRecorder::new();
        let corrector = BeamCorrector::new(&config, beam, &scratch, LogManager::new(), &metrics);
        assert!(matches!(
            corrector.correct(1, &pair),
            Err(MosaicError::EmptyFootprint { beam: 1 })
        ));
        assert_eq!(metrics.snapshot().errors, 1);
    }
}
