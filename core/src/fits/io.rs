//! Primary-HDU FITS reading and writing on top of CFITSIO.
//!
//! Array axes are in C order, i.e. reversed with respect to the FITS axis
//! numbering (`[NAXISn, .., NAXIS2, NAXIS1]`), which is also the order in
//! which `fitsio` reports image shapes.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;
use std::ptr;

use fitsio::errors::check_status;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::sys;
use fitsio::FitsFile;
use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};

use super::header::{Card, FitsHeader, FitsValue};
use crate::prelude::{MosaicError, MosaicResult};

/// Keys CFITSIO writes itself when the primary HDU is created.
const STRUCTURAL: &[&str] = &["SIMPLE", "BITPIX", "NAXIS", "EXTEND", "BSCALE", "BZERO", "BLANK"];

/// Keyword records are at most 80 characters; this fits any field plus NUL.
const FIELD: usize = 81;

fn is_structural(key: &str) -> bool {
    STRUCTURAL.contains(&key)
        || key == "CONTINUE"
        || key == "LONGSTRN"
        || key
            .strip_prefix("NAXIS")
            .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

fn fits_err(path: &Path) -> impl Fn(fitsio::errors::Error) -> MosaicError + '_ {
    move |source| MosaicError::Fits {
        path: path.to_path_buf(),
        source,
    }
}

fn c_string(path: &Path, text: &str) -> MosaicResult<CString> {
    CString::new(text).map_err(|_| {
        MosaicError::InvalidFits(format!(
            "{}: header text {:?} contains a NUL byte",
            path.display(),
            text
        ))
    })
}

fn field_text(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

/// Reads only the header of the primary HDU.
pub fn read_header(path: &Path) -> MosaicResult<FitsHeader> {
    let mut fptr = FitsFile::open(path).map_err(fits_err(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_err(path))?;
    read_cards(&mut fptr, &hdu, path)
}

/// Reads the primary HDU. CFITSIO applies `BSCALE`/`BZERO` to integer data.
pub fn read_fits(path: &Path) -> MosaicResult<(FitsHeader, ArrayD<f64>)> {
    let mut fptr = FitsFile::open(path).map_err(fits_err(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_err(path))?;
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if !shape.is_empty() => shape.clone(),
        HduInfo::ImageInfo { .. } => {
            return Err(MosaicError::InvalidFits(format!(
                "{} has no data in its primary HDU",
                path.display()
            )))
        }
        _ => {
            return Err(MosaicError::InvalidFits(format!(
                "{}: primary HDU is not an image",
                path.display()
            )))
        }
    };
    let header = read_cards(&mut fptr, &hdu, path)?;
    let values: Vec<f64> = hdu.read_image(&mut fptr).map_err(fits_err(path))?;
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|err| MosaicError::InvalidFits(format!("{}: {}", path.display(), err)))?;
    Ok((header, data))
}

/// Collects every keyword of the current HDU in file order. String values
/// are read through the long-string convention so `CONTINUE` records are
/// folded back into their keyword.
fn read_cards(fptr: &mut FitsFile, hdu: &FitsHdu, path: &Path) -> MosaicResult<FitsHeader> {
    let raw = unsafe { fptr.as_raw() };
    let mut status: c_int = 0;
    let mut count: c_int = 0;
    let mut more: c_int = 0;
    unsafe { sys::ffghsp(raw, &mut count, &mut more, &mut status) };
    check_status(status).map_err(fits_err(path))?;

    let mut header = FitsHeader::new();
    for index in 1..=count {
        let mut name = [0 as c_char; FIELD];
        let mut value = [0 as c_char; FIELD];
        let mut comment = [0 as c_char; FIELD];
        unsafe {
            sys::ffgkyn(
                raw,
                index,
                name.as_mut_ptr(),
                value.as_mut_ptr(),
                comment.as_mut_ptr(),
                &mut status,
            )
        };
        check_status(status).map_err(fits_err(path))?;

        let key = field_text(&name);
        let comment = field_text(&comment);
        if key.is_empty() || key == "CONTINUE" {
            continue;
        }
        if value[0] == 0 {
            header.push(Card::new(&key, FitsValue::Text(comment)));
            continue;
        }

        let mut kind: c_char = 0;
        unsafe { sys::ffdtyp(value.as_ptr(), &mut kind, &mut status) };
        check_status(status).map_err(fits_err(path))?;
        let parsed = match kind as u8 {
            b'C' => FitsValue::String(read_long_string(raw, path, &key)?),
            b'L' => FitsValue::Logical(field_text(&value).trim_start() == "T"),
            b'I' => FitsValue::Integer(hdu.read_key(fptr, &key).map_err(fits_err(path))?),
            b'F' => FitsValue::Float(hdu.read_key(fptr, &key).map_err(fits_err(path))?),
            // complex values never describe an image plane
            _ => continue,
        };
        let card = Card::new(&key, parsed);
        header.push(if comment.is_empty() {
            card
        } else {
            card.with_comment(&comment)
        });
    }
    Ok(header)
}

fn read_long_string(raw: *mut sys::fitsfile, path: &Path, key: &str) -> MosaicResult<String> {
    let name = c_string(path, key)?;
    let mut status: c_int = 0;
    let mut value: *mut c_char = ptr::null_mut();
    unsafe { sys::ffgkls(raw, name.as_ptr(), &mut value, ptr::null_mut(), &mut status) };
    check_status(status).map_err(fits_err(path))?;
    if value.is_null() {
        return Ok(String::new());
    }
    let text = unsafe { CStr::from_ptr(value) }
        .to_string_lossy()
        .trim_end()
        .to_string();
    unsafe { sys::fffree(value as *mut c_void, &mut status) };
    check_status(status).map_err(fits_err(path))?;
    Ok(text)
}

/// Writes a single-precision primary HDU, replacing any existing file. Cards
/// of `header` follow the structural keys in their original order.
pub fn write_fits<D: Dimension>(
    path: &Path,
    header: &FitsHeader,
    data: ArrayView<f32, D>,
) -> MosaicResult<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: data.shape(),
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .map_err(fits_err(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_err(path))?;

    for card in header.cards().iter().filter(|card| !is_structural(&card.key)) {
        write_card(&mut fptr, &hdu, path, card)?;
    }

    let pixels: Vec<f32> = data.iter().copied().collect();
    hdu.write_image(&mut fptr, &pixels).map_err(fits_err(path))?;
    Ok(())
}

fn write_card(fptr: &mut FitsFile, hdu: &FitsHdu, path: &Path, card: &Card) -> MosaicResult<()> {
    let raw = unsafe { fptr.as_raw() };
    let key = c_string(path, &card.key)?;
    let comment = card
        .comment
        .as_deref()
        .map(|comment| c_string(path, comment))
        .transpose()?;
    let comment_ptr = comment.as_ref().map_or(ptr::null(), |c| c.as_ptr());
    let mut status: c_int = 0;
    match &card.value {
        FitsValue::Integer(value) => {
            return hdu.write_key(fptr, &card.key, *value).map_err(fits_err(path));
        }
        // full round-trip precision for doubles
        FitsValue::Float(value) => unsafe {
            sys::ffpkyd(raw, key.as_ptr(), *value, 16, comment_ptr, &mut status)
        },
        FitsValue::String(value) => {
            let value = c_string(path, value)?;
            unsafe { sys::ffpkls(raw, key.as_ptr(), value.as_ptr(), comment_ptr, &mut status) }
        }
        FitsValue::Logical(value) => unsafe {
            sys::ffpkyl(raw, key.as_ptr(), c_int::from(*value), comment_ptr, &mut status)
        },
        FitsValue::Text(text) => {
            let text = c_string(path, text)?;
            if card.key == "HISTORY" {
                unsafe { sys::ffphis(raw, text.as_ptr(), &mut status) }
            } else {
                unsafe { sys::ffpcom(raw, text.as_ptr(), &mut status) }
            }
        }
    };
    check_status(status).map_err(fits_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Ix2};
    use tempfile::tempdir;

    #[test]
    fn written_image_reads_back_with_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plane.fits");
        let mut header = FitsHeader::new();
        header.set_str("OBJECT", "S1234");
        header.set_f64("CRVAL1", 180.25);
        header.set_f64("CDELT1", -1.0 / 3600.0);
        // structural keys from the source header are regenerated
        header.set_i64("NAXIS", 4);

        let data = array![[1.0f32, 2.0, 3.0], [4.0, f32::NAN, 6.0]];
        write_fits(&path, &header, data.view()).unwrap();

        let (back, values) = read_fits(&path).unwrap();
        assert_eq!(back.get("SIMPLE"), Some(&FitsValue::Logical(true)));
        assert_eq!(back.get_i64("NAXIS"), Some(2));
        assert_eq!(back.get_i64("NAXIS1"), Some(3));
        assert_eq!(back.get_str("OBJECT"), Some("S1234"));
        assert_eq!(back.get_f64("CRVAL1"), Some(180.25));
        assert_eq!(back.get_f64("CDELT1"), Some(-1.0 / 3600.0));

        let values = values.into_dimensionality::<Ix2>().unwrap();
        assert_eq!(values.dim(), (2, 3));
        assert_eq!(values[[0, 2]], 3.0);
        assert_eq!(values[[1, 0]], 4.0);
        assert!(values[[1, 1]].is_nan());
    }

    #[test]
    fn long_target_names_survive_the_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.fits");
        let name = "X".repeat(70);
        let mut header = FitsHeader::new();
        header.set_str("OBJECT", &name);
        header.set_str("BUNIT", "JY/BEAM");
        write_fits(&path, &header, array![[0.0f32]].view()).unwrap();

        let back = read_header(&path).unwrap();
        assert_eq!(back.get_str("OBJECT"), Some(name.as_str()));
        assert_eq!(back.object("long").unwrap().len(), 70);
        assert_eq!(back.get_str("BUNIT"), Some("JY/BEAM"));
        assert!(!back.contains("CONTINUE"));
    }

    #[test]
    fn cube_axes_are_written_in_fits_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        let data =
            ndarray::Array4::<f32>::from_shape_fn((1, 1, 2, 3), |(_, _, r, c)| (r * 3 + c) as f32);
        write_fits(&path, &FitsHeader::new(), data.view()).unwrap();

        let (header, values) = read_fits(&path).unwrap();
        assert_eq!(header.get_i64("NAXIS"), Some(4));
        assert_eq!(header.get_i64("NAXIS1"), Some(3));
        assert_eq!(header.get_i64("NAXIS4"), Some(1));
        assert_eq!(values.shape(), &[1, 1, 2, 3]);
        assert_eq!(values[[0, 0, 1, 2]], 5.0);
    }

    #[test]
    fn existing_files_are_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("again.fits");
        write_fits(&path, &FitsHeader::new(), array![[1.0f32, 2.0]].view()).unwrap();
        write_fits(&path, &FitsHeader::new(), array![[7.0f32]].view()).unwrap();
        let (_, values) = read_fits(&path).unwrap();
        assert_eq!(values.shape(), &[1, 1]);
        assert_eq!(values[[0, 0]], 7.0);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.fits");
        std::fs::write(&path, b"SIMPLE  =                    T").unwrap();
        assert!(matches!(read_fits(&path), Err(MosaicError::Fits { .. })));
    }
}
