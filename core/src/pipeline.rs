//! One mosaic run: validate, resolve the common PSF, correct every beam
//! independently, then reduce the corrected beams into a single image.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::fits::io::read_header;
use crate::prelude::{BeamPair, MosaicConfig, MosaicResult};
use crate::processing::compose::Compositor;
use crate::processing::correct::{BeamCorrector, CorrectedBeam};
use crate::processing::scratch::ScratchSpace;
use crate::processing::validate::validate_beams;
use crate::processing::writer::write_mosaic;
use crate::psf::{resolve_common_psf, Psf};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct MosaicReport {
    pub output: PathBuf,
    pub target: String,
    pub beams: usize,
    pub psf: Psf,
    pub frequency: f64,
    pub shape: (usize, usize),
    pub metrics: MetricsSnapshot,
}

pub struct MosaicPipeline {
    config: MosaicConfig,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl MosaicPipeline {
    pub fn new(config: MosaicConfig) -> Self {
        Self {
            config,
            logger: LogManager::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// Runs the whole mosaic. Nothing is written to the output directory
    /// unless every beam was corrected; intermediates are removed on return
    /// whatever the outcome.
    pub fn run(&self, images: &[PathBuf], pbmaps: &[PathBuf]) -> MosaicResult<MosaicReport> {
        let pairs = validate_beams(images, pbmaps)?;
        self.config.validate()?;
        self.logger
            .record(&format!("Mosaicking {} Stokes V beams", pairs.len()));

        let scratch = ScratchSpace::create(
            self.config.scratch_dir.as_deref(),
            self.config.keep_intermediates,
        )?;
        self.logger.detail(&format!(
            "Intermediate products in {}",
            scratch.path().display()
        ));

        let natives = pairs
            .iter()
            .map(|pair| native_psf(&pair.image))
            .collect::<MosaicResult<Vec<_>>>()?;
        let psf = resolve_common_psf(self.config.fixed_fwhm_arcsec, &natives)?;

        let beams = self.correct_all(&pairs, psf, &scratch)?;
        let mosaic = Compositor::new(&self.config, self.logger.scoped("compose"))
            .compose(&beams, &psf)?;
        let output = write_mosaic(&mosaic, &self.config.output_dir, self.config.write_footprint)?;

        Ok(MosaicReport {
            output,
            target: mosaic.target.clone(),
            beams: beams.len(),
            psf,
            frequency: mosaic.frequency,
            shape: mosaic.shape(),
            metrics: self.metrics.snapshot(),
        })
    }

    fn correct_all(
        &self,
        pairs: &[BeamPair],
        psf: Psf,
        scratch: &ScratchSpace,
    ) -> MosaicResult<Vec<CorrectedBeam>> {
        let corrector =
            BeamCorrector::new(&self.config, psf, scratch, self.logger.clone(), &self.metrics);
        if self.config.parallel {
            pairs
                .par_iter()
                .enumerate()
                .map(|(index, pair)| corrector.correct(index, pair))
                .collect()
        } else {
            pairs
                .iter()
                .enumerate()
                .map(|(index, pair)| corrector.correct(index, pair))
                .collect()
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn native_psf(image: &Path) -> MosaicResult<Psf> {
    let header = read_header(image)?;
    Psf::from_header(&header, &image.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::io::read_fits;
    use crate::prelude::MosaicError;
    use crate::processing::correct::tests::{beam_pair, circular_beam, square_beam, ARCSEC};
    use crate::sky::wcs::{CelestialWcs, Projection};
    use ndarray::Ix2;

    const FREQUENCIES: [f64; 3] = [1.29e9, 1.367e9, 1.441e9];

    fn three_beams(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let wcs = CelestialWcs::new(Projection::Sin, [266.4, -28.9], [5.5, 5.5], 2.0 * ARCSEC);
        let beam = Psf::new(9.0 * ARCSEC, 7.0 * ARCSEC, 20.0);
        let (image, pb) = square_beam(10, 10, 6);
        FREQUENCIES
            .iter()
            .enumerate()
            .map(|(index, &frequency)| {
                let pair = beam_pair(dir, index, &wcs, &image, &pb, frequency, &beam);
                (pair.image, pair.pbmap)
            })
            .unzip()
    }

    fn config(dir: &Path) -> MosaicConfig {
        let mut config = MosaicConfig::new(0.5, dir.join("out"));
        config.scratch_dir = Some(dir.join("scratch"));
        config
    }

    fn output_files(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("out"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn no_beams_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = MosaicPipeline::new(config(dir.path()));
        assert!(matches!(pipeline.run(&[], &[]), Err(MosaicError::NoBeams)));
        assert_eq!(output_files(dir.path()), 0);
    }

    #[test]
    fn single_beam_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (images, pbmaps) = three_beams(dir.path());
        let pipeline = MosaicPipeline::new(config(dir.path()));
        assert!(matches!(
            pipeline.run(&images[..1], &pbmaps[..1]),
            Err(MosaicError::SingleBeam)
        ));
        assert_eq!(output_files(dir.path()), 0);
    }

    #[test]
    fn overlapping_beams_reproduce_the_flat_field() {
        let dir = tempfile::tempdir().unwrap();
        let (images, pbmaps) = three_beams(dir.path());
        let pipeline = MosaicPipeline::new(config(dir.path()));
        let report = pipeline.run(&images, &pbmaps).unwrap();

        assert_eq!(report.output, dir.path().join("out").join("TESTFIELD.fits"));
        assert_eq!(report.beams, 3);
        assert_eq!(report.shape, (6, 6));
        assert_eq!(report.metrics.beams_corrected, 3);
        assert_eq!(report.metrics.pb_reprojections, 0);

        let (header, data) = read_fits(&report.output).unwrap();
        let data = data.into_dimensionality::<Ix2>().unwrap();
        assert_eq!(data.dim(), (6, 6));
        assert!(data.iter().all(|&v| (v - 1.0).abs() < 1e-5));

        let mean = FREQUENCIES.iter().sum::<f64>() / 3.0;
        let freq = header.get_f64("FREQ").unwrap();
        assert!((freq - mean).abs() < 1e-3);
        let native = Psf::new(9.0 * ARCSEC, 7.0 * ARCSEC, 20.0);
        assert_eq!(header.get_f64("BMAJ"), Some(native.major));
        assert_eq!(header.get_f64("BMIN"), Some(native.minor));
        assert_eq!(header.get_f64("BPA"), Some(native.pa));
        assert_eq!(header.get_str("BUNIT"), Some("JY/BEAM"));
    }

    #[test]
    fn pixels_clipped_in_every_beam_stay_blank() {
        let dir = tempfile::tempdir().unwrap();
        let wcs = CelestialWcs::new(Projection::Sin, [266.4, -28.9], [6.5, 6.5], 2.0 * ARCSEC);
        let beam = Psf::new(9.0 * ARCSEC, 7.0 * ARCSEC, 20.0);
        let (image, pb) = circular_beam(12, 4.0);
        let (images, pbmaps): (Vec<_>, Vec<_>) = FREQUENCIES
            .iter()
            .enumerate()
            .map(|(index, &frequency)| {
                let pair = beam_pair(dir.path(), index, &wcs, &image, &pb, frequency, &beam);
                (pair.image, pair.pbmap)
            })
            .unzip();
        let report = MosaicPipeline::new(config(dir.path()))
            .run(&images, &pbmaps)
            .unwrap();

        // the disc spans rows and columns 2..=9, so the crop is 8x8
        assert_eq!(report.shape, (8, 8));
        let (_, data) = read_fits(&report.output).unwrap();
        let data = data.into_dimensionality::<Ix2>().unwrap();
        for corner in [[0, 0], [0, 7], [7, 0], [7, 7]] {
            assert!(data[corner].is_nan(), "corner {:?} = {}", corner, data[corner]);
        }
        for pixel in [[3, 3], [4, 4], [3, 4], [4, 3], [0, 3], [3, 0]] {
            assert!((data[pixel] - 1.0).abs() < 1e-4, "{:?} = {}", pixel, data[pixel]);
        }
    }

    #[test]
    fn fixed_resolution_is_circular() {
        let dir = tempfile::tempdir().unwrap();
        let (images, pbmaps) = three_beams(dir.path());
        let mut config = config(dir.path());
        config.fixed_fwhm_arcsec = Some(15.0);
        let report = MosaicPipeline::new(config).run(&images, &pbmaps).unwrap();

        let (header, _) = read_fits(&report.output).unwrap();
        assert_eq!(header.get_f64("BMAJ"), Some(15.0 / 3600.0));
        assert_eq!(header.get_f64("BMIN"), Some(15.0 / 3600.0));
        assert_eq!(header.get_f64("BPA"), Some(0.0));
    }

    #[test]
    fn beam_order_does_not_change_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let (images, pbmaps) = three_beams(dir.path());
        let forward = MosaicPipeline::new(config(dir.path()))
            .run(&images, &pbmaps)
            .unwrap();
        let first = std::fs::read(&forward.output).unwrap();

        let reversed: (Vec<_>, Vec<_>) = (
            images.iter().rev().cloned().collect(),
            pbmaps.iter().rev().cloned().collect(),
        );
        let backward = MosaicPipeline::new(config(dir.path()))
            .run(&reversed.0, &reversed.1)
            .unwrap();
        assert_eq!(forward.frequency.to_bits(), backward.frequency.to_bits());
        assert_eq!(first, std::fs::read(&backward.output).unwrap());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (images, pbmaps) = three_beams(dir.path());
        let mut sequential = config(dir.path());
        sequential.parallel = false;
        let a = MosaicPipeline::new(sequential).run(&images, &pbmaps).unwrap();
        let first = std::fs::read(&a.output).unwrap();
        let b = MosaicPipeline::new(config(dir.path()))
            .run(&images, &pbmaps)
            .unwrap();
        assert_eq!(first, std::fs::read(&b.output).unwrap());
    }

    #[test]
    fn failed_run_leaves_no_scratch_behind() {
        let dir = tempfile::tempdir().unwrap();
        let (images, mut pbmaps) = three_beams(dir.path());
        pbmaps[2] = dir.path().join("missing.fits");
        let pipeline = MosaicPipeline::new(config(dir.path()));
        assert!(matches!(
            pipeline.run(&images, &pbmaps),
            Err(MosaicError::Fits { .. })
        ));
        assert!(pipeline.metrics().errors >= 1);
        assert_eq!(output_files(dir.path()), 0);
        let leftovers = std::fs::read_dir(dir.path().join("scratch")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
