use crate::workflow::config::RunConfig;
use anyhow::Context;
use log::info;
use std::fs;
use std::path::PathBuf;
use vmosaiccore::processing::writer::mosaic_stem;
use vmosaiccore::{MosaicPipeline, MosaicReport};

pub struct RunResult {
    pub report: MosaicReport,
    pub summary: PathBuf,
}

#[derive(Clone)]
pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Runs the mosaic and writes `<TARGET>_summary.json` beside it.
    pub fn execute(&self) -> anyhow::Result<RunResult> {
        let pipeline = MosaicPipeline::new(self.config.to_mosaic_config());
        let report = pipeline
            .run(&self.config.images, &self.config.pbmaps)
            .context("running Stokes V mosaic")?;

        let stem = mosaic_stem(&report.target)?;
        let summary = pipeline
            .config()
            .output_dir
            .join(format!("{}_summary.json", stem));
        let json = serde_json::to_string_pretty(&report).context("serializing run summary")?;
        fs::write(&summary, json)
            .with_context(|| format!("writing run summary {}", summary.display()))?;
        info!("Run summary written to {}", summary.display());

        Ok(RunResult { report, summary })
    }
}
