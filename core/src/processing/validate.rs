use std::path::PathBuf;

use crate::prelude::{BeamPair, MosaicError, MosaicResult};

/// Pairs beam images with their primary-beam maps after checking that enough
/// beams were accepted to form a mosaic.
pub fn validate_beams(images: &[PathBuf], pbmaps: &[PathBuf]) -> MosaicResult<Vec<BeamPair>> {
    match images.len() {
        0 => return Err(MosaicError::NoBeams),
        1 => return Err(MosaicError::SingleBeam),
        _ => {}
    }
    if images.len() != pbmaps.len() {
        return Err(MosaicError::UnpairedInputs {
            images: images.len(),
            pbmaps: pbmaps.len(),
        });
    }
    Ok(images
        .iter()
        .zip(pbmaps)
        .map(|(image, pbmap)| BeamPair {
            image: image.clone(),
            pbmap: pbmap.clone(),
        })
        .collect())
}
