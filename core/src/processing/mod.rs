pub mod compose;
pub mod correct;
pub mod cutout;
pub mod scratch;
pub mod validate;
pub mod weights;
pub mod writer;

pub use compose::{Compositor, OutputMosaic};
pub use correct::{BeamCorrector, CorrectedBeam};
pub use cutout::Cutout;
pub use scratch::ScratchSpace;
pub use validate::validate_beams;
pub use weights::build_weights;
pub use writer::write_mosaic;
