pub mod header;
pub mod image;
pub mod io;

pub use header::{Card, FitsHeader, FitsValue};
pub use image::{FitsImage, SkyImage};
pub use io::{read_fits, read_header, write_fits};
