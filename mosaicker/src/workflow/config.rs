use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vmosaiccore::prelude::{MosaicConfig, ReferenceFrame};

/// A mosaic run as described in YAML: positionally matched beam images and
/// primary-beam maps plus the core settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub images: Vec<PathBuf>,
    #[serde(default)]
    pub pbmaps: Vec<PathBuf>,
    #[serde(flatten)]
    pub mosaic: MosaicConfig,
}

/// Command-line settings that take precedence over a loaded config.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub images: Vec<PathBuf>,
    pub pbmaps: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pb_clip: Option<f64>,
    pub fixed_fwhm_arcsec: Option<f64>,
    pub reference: Option<ReferenceFrame>,
    pub sequential: bool,
    pub keep_intermediates: bool,
    pub write_footprint: bool,
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading run config {}", path_ref.display()))?;
        let config: RunConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing run config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path_ref = path.as_ref();
        let contents = serde_yaml::to_string(self).context("serializing run config")?;
        fs::write(path_ref, contents)
            .with_context(|| format!("writing run config {}", path_ref.display()))
    }

    pub fn from_args(images: Vec<PathBuf>, pbmaps: Vec<PathBuf>) -> Self {
        Self {
            images,
            pbmaps,
            mosaic: MosaicConfig::default(),
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if !overrides.images.is_empty() || !overrides.pbmaps.is_empty() {
            self.images = overrides.images;
            self.pbmaps = overrides.pbmaps;
        }
        if let Some(dir) = overrides.output_dir {
            self.mosaic.output_dir = dir;
        }
        if let Some(clip) = overrides.pb_clip {
            self.mosaic.pb_clip = clip;
        }
        if overrides.fixed_fwhm_arcsec.is_some() {
            self.mosaic.fixed_fwhm_arcsec = overrides.fixed_fwhm_arcsec;
        }
        if overrides.reference.is_some() {
            self.mosaic.reference = overrides.reference;
        }
        self.mosaic.parallel &= !overrides.sequential;
        self.mosaic.keep_intermediates |= overrides.keep_intermediates;
        self.mosaic.write_footprint |= overrides.write_footprint;
    }

    pub fn to_mosaic_config(&self) -> MosaicConfig {
        self.mosaic.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use vmosaiccore::sky::Projection;

    #[test]
    fn config_from_args_uses_core_defaults() {
        let cfg = RunConfig::from_args(vec!["a.fits".into()], vec!["pa.fits".into()]);
        let mosaic = cfg.to_mosaic_config();
        assert_eq!(mosaic.pb_clip, 0.1);
        assert_eq!(mosaic.wcs_tolerance, 1e-9);
        assert!(mosaic.parallel);
        assert_eq!(mosaic.fixed_fwhm_arcsec, None);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"images: [b1.fits, b2.fits]\n\
              pbmaps: [p1.fits, p2.fits]\n\
              pb_clip: 0.2\n\
              output_dir: mosaics\n\
              fixed_fwhm_arcsec: 25.0\n\
              projection: SIN\n\
              reference:\n  center:\n    ra: 83.6\n    dec: 22.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = RunConfig::load(&path).unwrap();
        assert_eq!(cfg.images.len(), 2);
        assert_eq!(cfg.pbmaps[1], PathBuf::from("p2.fits"));
        assert_eq!(cfg.mosaic.pb_clip, 0.2);
        assert_eq!(cfg.mosaic.output_dir, PathBuf::from("mosaics"));
        assert_eq!(cfg.mosaic.fixed_fwhm_arcsec, Some(25.0));
        assert_eq!(cfg.mosaic.projection, Projection::Sin);
        assert_eq!(
            cfg.mosaic.reference,
            Some(ReferenceFrame::Center { ra: 83.6, dec: 22.0 })
        );
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = RunConfig::from_args(vec!["a.fits".into()], vec!["pa.fits".into()]);
        cfg.apply(Overrides {
            pb_clip: Some(0.3),
            output_dir: Some("elsewhere".into()),
            sequential: true,
            write_footprint: true,
            ..Default::default()
        });
        assert_eq!(cfg.images, vec![PathBuf::from("a.fits")]);
        assert_eq!(cfg.mosaic.pb_clip, 0.3);
        assert_eq!(cfg.mosaic.output_dir, PathBuf::from("elsewhere"));
        assert!(!cfg.mosaic.parallel);
        assert!(cfg.mosaic.write_footprint);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        let mut cfg = RunConfig::from_args(vec!["a.fits".into()], vec!["pa.fits".into()]);
        cfg.mosaic.keep_intermediates = true;
        cfg.save(&path).unwrap();
        let back = RunConfig::load(&path).unwrap();
        assert_eq!(back.images, cfg.images);
        assert!(back.mosaic.keep_intermediates);
    }
}
