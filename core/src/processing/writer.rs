use std::path::{Path, PathBuf};

use log::info;

use crate::fits::io::write_fits;
use crate::prelude::{MosaicError, MosaicResult};
use crate::processing::compose::OutputMosaic;

/// File stem of a mosaic: the target name in upper case.
pub fn mosaic_stem(target: &str) -> MosaicResult<String> {
    let stem = target.trim().to_uppercase();
    if stem.is_empty() || stem.contains(|c: char| c == '/' || c == '\\') {
        return Err(MosaicError::Config(format!(
            "target name {:?} cannot name an output file",
            target
        )));
    }
    Ok(stem)
}

/// Writes `<TARGET>.fits` into `output_dir`, replacing an existing file, and
/// optionally the summed-weight map next to it as `<TARGET>_footprint.fits`.
pub fn write_mosaic(
    mosaic: &OutputMosaic,
    output_dir: &Path,
    write_footprint: bool,
) -> MosaicResult<PathBuf> {
    let stem = mosaic_stem(&mosaic.target)?;
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join(format!("{}.fits", stem));
    write_fits(&path, &mosaic.header, mosaic.data.view())?;
    info!("Mosaic written to {}", path.display());

    if write_footprint {
        let mut header = mosaic.header.clone();
        header.set_str("BUNIT", "");
        let footprint = output_dir.join(format!("{}_footprint.fits", stem));
        write_fits(&footprint, &header, mosaic.footprint.view())?;
        info!("Coverage map written to {}", footprint.display());
    }
    Ok(path)
}
