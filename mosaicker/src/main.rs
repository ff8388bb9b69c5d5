use anyhow::Context;
use clap::Parser;
use generator::synth::{synthesize, SynthConfig};
use std::path::PathBuf;
use vmosaiccore::prelude::ReferenceFrame;
use workflow::config::{Overrides, RunConfig};
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Primary-beam corrected Stokes V beam mosaicker")]
struct Args {
    /// Load a run config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Beam image; repeat and match positionally with --pbmap
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    /// Primary-beam map of the beam image at the same position
    #[arg(long = "pbmap")]
    pbmaps: Vec<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Mask pixels whose primary-beam response is below this level
    #[arg(long)]
    pb_clip: Option<f64>,
    /// Convolve every beam to a circular PSF of this FWHM (arcsec)
    #[arg(long)]
    fixed_fwhm: Option<f64>,
    /// FITS file whose header defines the output grid
    #[arg(long, conflicts_with = "center")]
    reference: Option<PathBuf>,
    /// Fix the output frame centre (degrees)
    #[arg(long, num_args = 2, value_names = ["RA", "DEC"], allow_negative_numbers = true)]
    center: Option<Vec<f64>>,
    #[arg(long, default_value_t = false)]
    sequential: bool,
    #[arg(long, default_value_t = false)]
    keep_intermediates: bool,
    #[arg(long, default_value_t = false)]
    write_footprint: bool,
    /// Write a synthetic beam set into this directory and mosaic it
    #[arg(long)]
    synthesize: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    synth_beams: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut run_config = if let Some(dir) = &args.synthesize {
        let synth = SynthConfig {
            beams: args.synth_beams,
            seed: args.seed,
            ..Default::default()
        };
        synthesize(&synth, dir).context("generating synthetic beams")?
    } else if let Some(path) = &args.config {
        RunConfig::load(path)?
    } else {
        RunConfig::from_args(Vec::new(), Vec::new())
    };

    let reference = match (args.reference, args.center.as_deref()) {
        (Some(path), _) => Some(ReferenceFrame::Header(path)),
        (None, Some([ra, dec])) => Some(ReferenceFrame::Center { ra: *ra, dec: *dec }),
        _ => None,
    };
    run_config.apply(Overrides {
        images: args.images,
        pbmaps: args.pbmaps,
        output_dir: args.output_dir,
        pb_clip: args.pb_clip,
        fixed_fwhm_arcsec: args.fixed_fwhm,
        reference,
        sequential: args.sequential,
        keep_intermediates: args.keep_intermediates,
        write_footprint: args.write_footprint,
    });

    let result = Runner::new(run_config).execute()?;
    let report = &result.report;
    println!(
        "Mosaic -> {} from {} beams, {}x{} pixels, FREQ {:.6e} Hz, PSF {}",
        report.output.display(),
        report.beams,
        report.shape.0,
        report.shape.1,
        report.frequency,
        report.psf
    );
    println!("Summary -> {}", result.summary.display());

    Ok(())
}
