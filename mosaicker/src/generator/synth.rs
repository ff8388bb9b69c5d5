use anyhow::Context;
use ndarray::{Array2, Array4, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vmosaiccore::fits::{write_fits, FitsHeader};
use vmosaiccore::psf::Psf;
use vmosaiccore::sky::{CelestialWcs, Projection};

use crate::workflow::config::RunConfig;

const ARCSEC: f64 = 1.0 / 3600.0;
const FOUR_LN2: f64 = 4.0 * std::f64::consts::LN_2;

/// Configuration for generating a synthetic set of Stokes V beams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub beams: usize,
    /// Pixels along each image side.
    pub size: usize,
    pub pixel_arcsec: f64,
    /// Pointing separation between neighbouring beams.
    pub spacing_arcsec: f64,
    pub beam_fwhm_arcsec: f64,
    pub pb_fwhm_arcsec: f64,
    pub frequency: f64,
    /// Peak Stokes V flux of the source at the field centre, Jy.
    pub source_flux: f64,
    pub noise: f64,
    pub seed: u64,
    pub target: String,
    pub center: (f64, f64),
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            beams: 3,
            size: 48,
            pixel_arcsec: 2.0,
            spacing_arcsec: 30.0,
            beam_fwhm_arcsec: 8.0,
            pb_fwhm_arcsec: 120.0,
            frequency: 1.367e9,
            source_flux: 5e-3,
            noise: 1e-4,
            seed: 0,
            target: "synthfield".to_string(),
            center: (83.633, 22.014),
        }
    }
}

/// Writes `config.beams` beam cubes and primary-beam maps into `dir` together
/// with a `run.yaml` describing them, and returns that run.
pub fn synthesize(config: &SynthConfig, dir: &Path) -> anyhow::Result<RunConfig> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating synthetic beam directory {}", dir.display()))?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (ra0, dec0) = config.center;
    let size = config.size.max(2);

    let mut images = Vec::with_capacity(config.beams);
    let mut pbmaps = Vec::with_capacity(config.beams);
    for index in 0..config.beams {
        let offset = (index as f64 - (config.beams as f64 - 1.0) / 2.0) * config.spacing_arcsec;
        let pointing = (
            ra0 + offset * ARCSEC / dec0.to_radians().cos(),
            dec0 + rng.gen_range(-0.5..0.5) * config.pixel_arcsec * ARCSEC,
        );
        let wcs = CelestialWcs::new(
            Projection::Sin,
            [pointing.0, pointing.1],
            [(size as f64 + 1.0) / 2.0, (size as f64 + 1.0) / 2.0],
            config.pixel_arcsec * ARCSEC,
        );
        let native = Psf::new(
            config.beam_fwhm_arcsec * rng.gen_range(1.0..1.15) * ARCSEC,
            config.beam_fwhm_arcsec * rng.gen_range(0.8..1.0) * ARCSEC,
            rng.gen_range(-90.0..90.0),
        );
        let frequency = config.frequency + rng.gen_range(-4.0e6..4.0e6);

        let source = wcs
            .world_to_pixel(ra0, dec0)
            .context("field centre lies outside the beam projection")?;
        let centre = (size as f64 - 1.0) / 2.0;
        let pb = Array2::from_shape_fn((size, size), |(r, c)| {
            let radius = (c as f64 - centre).hypot(r as f64 - centre) * config.pixel_arcsec;
            (-FOUR_LN2 * (radius / config.pb_fwhm_arcsec).powi(2)).exp()
        });
        let source_gain = {
            let radius = (source.0 - centre).hypot(source.1 - centre) * config.pixel_arcsec;
            (-FOUR_LN2 * (radius / config.pb_fwhm_arcsec).powi(2)).exp()
        };
        let image = Array2::from_shape_fn((size, size), |(r, c)| {
            let east = -(c as f64 - source.0) * config.pixel_arcsec * ARCSEC;
            let north = (r as f64 - source.1) * config.pixel_arcsec * ARCSEC;
            let (sin, cos) = native.pa.to_radians().sin_cos();
            let along = east * sin + north * cos;
            let across = east * cos - north * sin;
            let shape = (-FOUR_LN2
                * ((along / native.major).powi(2) + (across / native.minor).powi(2)))
            .exp();
            let jitter = if config.noise > 0.0 {
                rng.gen_range(-config.noise..config.noise)
            } else {
                0.0
            };
            config.source_flux * source_gain * shape + jitter
        });

        let image_path = dir.join(format!("beam{:02}.image.fits", index));
        let pb_path = dir.join(format!("beam{:02}.pb.fits", index));
        let mut header = cube_header(&wcs, frequency, &config.target);
        native.write_header(&mut header);
        write_cube(&image_path, &header, &image)?;
        // primary-beam models carry the nominal phase centre
        let pb_header = cube_header(
            &CelestialWcs { crval: [ra0, dec0], ..wcs.clone() },
            frequency,
            &config.target,
        );
        write_cube(&pb_path, &pb_header, &pb)?;

        images.push(image_path);
        pbmaps.push(pb_path);
    }

    let mut run = RunConfig::from_args(images, pbmaps);
    run.mosaic.output_dir = dir.join("mosaic");
    run.save(dir.join("run.yaml"))?;
    Ok(run)
}

fn cube_header(wcs: &CelestialWcs, frequency: f64, target: &str) -> FitsHeader {
    let mut header = FitsHeader::new();
    wcs.apply_to(&mut header);
    header.set_str("CTYPE3", "FREQ");
    header.set_f64("CRVAL3", frequency);
    header.set_f64("CRPIX3", 1.0);
    header.set_f64("CDELT3", 2.0e6);
    header.set_str("CUNIT3", "Hz");
    header.set_str("CTYPE4", "STOKES");
    header.set_f64("CRVAL4", 4.0);
    header.set_f64("CRPIX4", 1.0);
    header.set_f64("CDELT4", 1.0);
    header.set_str("OBJECT", target);
    header.set_str("BUNIT", "Jy/beam");
    header
}

fn write_cube(path: &Path, header: &FitsHeader, plane: &Array2<f64>) -> anyhow::Result<()> {
    let cube: Array4<f32> = plane
        .mapv(|v| v as f32)
        .insert_axis(Axis(0))
        .insert_axis(Axis(0));
    write_fits(path, header, cube.view())
        .with_context(|| format!("writing synthetic beam {}", path.display()))
}
