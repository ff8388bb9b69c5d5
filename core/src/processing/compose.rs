use log::warn;
use ndarray::{s, Array2, Zip};

use crate::fits::header::{FitsHeader, FitsValue};
use crate::fits::io::read_header;
use crate::math::stats::StatsHelper;
use crate::prelude::{MosaicConfig, MosaicError, MosaicResult, ReferenceFrame};
use crate::processing::correct::CorrectedBeam;
use crate::psf::Psf;
use crate::sky::frame::{optimal_frame, OutputGrid};
use crate::sky::reproject::{overlap_box, reproject_region};
use crate::sky::wcs::CelestialWcs;
use crate::telemetry::log::LogManager;

/// Weighted coadd on the output grid, ready to be written.
#[derive(Debug, Clone)]
pub struct OutputMosaic {
    pub data: Array2<f32>,
    /// Summed weight per output pixel.
    pub footprint: Array2<f32>,
    pub wcs: CelestialWcs,
    pub header: FitsHeader,
    pub target: String,
    /// Mean spectral reference of the contributing beams, in Hz.
    pub frequency: f64,
}

impl OutputMosaic {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

pub struct Compositor<'a> {
    config: &'a MosaicConfig,
    logger: LogManager,
}

impl<'a> Compositor<'a> {
    pub fn new(config: &'a MosaicConfig, logger: LogManager) -> Self {
        Self { config, logger }
    }

    /// Reduces the corrected beams, in the order given, into one mosaic.
    pub fn compose(&self, beams: &[CorrectedBeam], psf: &Psf) -> MosaicResult<OutputMosaic> {
        let first = beams.first().ok_or(MosaicError::NoBeams)?;
        let grid = self.output_grid(beams)?;
        self.logger.record(&format!(
            "Output grid {}x{} centred on ({:.6}, {:.6})",
            grid.shape.0, grid.shape.1, grid.wcs.crval[0], grid.wcs.crval[1]
        ));

        let mut weighted = Array2::<f64>::zeros(grid.shape);
        let mut weight_sum = Array2::<f64>::zeros(grid.shape);
        for beam in beams {
            let region = overlap_box(&beam.image.wcs, beam.image.shape(), &grid.wcs, grid.shape);
            if region.is_empty() {
                warn!("Beam {} does not overlap the output grid", beam.index);
                continue;
            }
            let values = reproject_region(&beam.image.data, &beam.image.wcs, &grid.wcs, region);
            let weights = reproject_region(&beam.weights, &beam.image.wcs, &grid.wcs, region);
            let (rows, cols) = (region.rows.0..region.rows.1, region.cols.0..region.cols.1);
            Zip::from(weighted.slice_mut(s![rows.clone(), cols.clone()]))
                .and(weight_sum.slice_mut(s![rows, cols]))
                .and(&values)
                .and(&weights)
                .for_each(|acc, norm, &value, &weight| {
                    if value.is_finite() && weight.is_finite() && weight > 0.0 {
                        *acc += weight * value;
                        *norm += weight;
                    }
                });
            self.logger.detail(&format!(
                "beam {} cut at {:?}+{:?} coadded over {:?}",
                beam.index, beam.cutout.origin, beam.cutout.shape, region
            ));
        }

        let mut data = Array2::<f32>::zeros(grid.shape);
        Zip::from(&mut data)
            .and(&weighted)
            .and(&weight_sum)
            .for_each(|out, &acc, &norm| {
                *out = if norm > 0.0 { (acc / norm) as f32 } else { f32::NAN };
            });
        let footprint = weight_sum.mapv(|w| w as f32);

        let target = first.target.clone();
        for beam in &beams[1..] {
            if beam.target != target {
                warn!(
                    "Beam {} observed {} but the mosaic is named after {}",
                    beam.index, beam.target, target
                );
            }
        }

        let frequencies: Vec<f64> = beams.iter().map(|beam| beam.frequency).collect();
        let frequency = StatsHelper::ordered_mean(&frequencies).ok_or(MosaicError::NoBeams)?;
        let header = mosaic_header(&grid.wcs, frequency, psf, &target);

        Ok(OutputMosaic {
            data,
            footprint,
            wcs: grid.wcs,
            header,
            target,
            frequency,
        })
    }

    fn output_grid(&self, beams: &[CorrectedBeam]) -> MosaicResult<OutputGrid> {
        let inputs: Vec<_> = beams
            .iter()
            .map(|beam| (&beam.image.wcs, beam.image.shape()))
            .collect();
        match &self.config.reference {
            Some(ReferenceFrame::Header(path)) => {
                let label = path.display().to_string();
                let header = read_header(path)?;
                let cols = header.require_i64("NAXIS1", &label)?;
                let rows = header.require_i64("NAXIS2", &label)?;
                if cols <= 0 || rows <= 0 {
                    return Err(MosaicError::Geometry(format!(
                        "reference frame {} has an empty {}x{} grid",
                        label, rows, cols
                    )));
                }
                Ok(OutputGrid {
                    wcs: CelestialWcs::from_header(&header, &label)?,
                    shape: (rows as usize, cols as usize),
                })
            }
            Some(ReferenceFrame::Center { ra, dec }) => {
                optimal_frame(&inputs, self.config.projection, Some((*ra, *dec)))
            }
            None => optimal_frame(&inputs, self.config.projection, None),
        }
    }
}

/// Output WCS cards followed by the mosaic metadata, which goes in front of
/// `RADESYS`.
fn mosaic_header(wcs: &CelestialWcs, frequency: f64, psf: &Psf, target: &str) -> FitsHeader {
    let mut header = wcs.to_header();
    for (key, value) in [
        ("FREQ", FitsValue::Float(frequency)),
        ("BMAJ", FitsValue::Float(psf.major)),
        ("BMIN", FitsValue::Float(psf.minor)),
        ("BPA", FitsValue::Float(psf.pa)),
        ("BUNIT", FitsValue::String("JY/BEAM".to_string())),
    ] {
        header.insert_before("RADESYS", key, value);
    }
    header.set_str("OBJECT", target);
    header
}
