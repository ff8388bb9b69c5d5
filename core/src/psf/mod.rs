pub mod beam;
pub mod common;
pub mod reconvolve;

pub use beam::Psf;
pub use common::resolve_common_psf;
pub use reconvolve::reconvolve;
