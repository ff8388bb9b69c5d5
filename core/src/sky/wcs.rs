//! Celestial world coordinate systems for zenithal projections.
//!
//! Pixel coordinates are 0-based throughout the crate; `crpix` keeps the
//! 1-based FITS convention so headers round-trip unchanged.

use serde::{Deserialize, Serialize};

use crate::fits::header::{FitsHeader, FitsValue};
use crate::prelude::{MosaicError, MosaicResult};

/// Zenithal projections understood by [`CelestialWcs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Projection {
    /// Gnomonic.
    #[default]
    Tan,
    /// Slant orthographic, the native projection of synthesis imaging.
    Sin,
    /// Zenithal equidistant.
    Arc,
}

impl Projection {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "TAN" => Some(Projection::Tan),
            "SIN" => Some(Projection::Sin),
            "ARC" => Some(Projection::Arc),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Projection::Tan => "TAN",
            Projection::Sin => "SIN",
            Projection::Arc => "ARC",
        }
    }

    /// Native latitude (deg) for a radius (deg) in the projection plane.
    fn theta_from_radius(&self, r: f64) -> Option<f64> {
        match self {
            Projection::Tan => Some(RAD_TO_DEG.atan2(r).to_degrees()),
            Projection::Sin => {
                let s = r.to_radians();
                (s <= 1.0).then(|| s.acos().to_degrees())
            }
            Projection::Arc => (r <= 180.0).then_some(90.0 - r),
        }
    }

    /// Radius (deg) in the projection plane for a native latitude (deg).
    fn radius_from_theta(&self, theta: f64) -> Option<f64> {
        let t = theta.to_radians();
        match self {
            Projection::Tan => (t.sin() > 1e-12).then(|| RAD_TO_DEG * t.cos() / t.sin()),
            Projection::Sin => (t.sin() >= 0.0).then(|| RAD_TO_DEG * t.cos()),
            Projection::Arc => Some(90.0 - theta),
        }
    }
}

const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Two-axis celestial WCS: `CRVAL`, `CRPIX`, `CDELT` and a `PC` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CelestialWcs {
    pub projection: Projection,
    /// Longitude/latitude axis names, e.g. `RA`/`DEC`.
    pub axes: [String; 2],
    pub crval: [f64; 2],
    pub crpix: [f64; 2],
    pub cdelt: [f64; 2],
    pub pc: [[f64; 2]; 2],
    pub radesys: Option<String>,
    pub equinox: Option<f64>,
}

impl CelestialWcs {
    /// Unrotated frame centred on `crval` with square pixels of `scale` degrees.
    pub fn new(projection: Projection, crval: [f64; 2], crpix: [f64; 2], scale: f64) -> Self {
        Self {
            projection,
            axes: ["RA".to_string(), "DEC".to_string()],
            crval,
            crpix,
            cdelt: [-scale, scale],
            pc: [[1.0, 0.0], [0.0, 1.0]],
            radesys: None,
            equinox: None,
        }
    }

    pub fn from_header(header: &FitsHeader, context: &str) -> MosaicResult<Self> {
        let mut axes = [String::new(), String::new()];
        let mut projection = None;
        for (idx, axis) in axes.iter_mut().enumerate() {
            let ctype = header.require_str(&format!("CTYPE{}", idx + 1), context)?;
            let ctype = ctype.trim().to_uppercase();
            *axis = ctype.split('-').next().unwrap_or_default().to_string();
            let code = ctype.get(5..).unwrap_or_default();
            let parsed = Projection::from_code(code).ok_or_else(|| {
                MosaicError::Geometry(format!(
                    "{}: unsupported celestial projection in CTYPE{} = '{}'",
                    context,
                    idx + 1,
                    ctype
                ))
            })?;
            if *projection.get_or_insert(parsed) != parsed {
                return Err(MosaicError::Geometry(format!(
                    "{}: celestial axes use different projections",
                    context
                )));
            }
        }

        let crval = [
            header.require_f64("CRVAL1", context)?,
            header.require_f64("CRVAL2", context)?,
        ];
        let crpix = [
            header.require_f64("CRPIX1", context)?,
            header.require_f64("CRPIX2", context)?,
        ];

        let (cdelt, pc) = if header.contains("CD1_1") {
            // fold a CD matrix into unit CDELT and PC
            let cd = |i: usize, j: usize| header.get_f64(&format!("CD{}_{}", i, j)).unwrap_or(0.0);
            ([1.0, 1.0], [[cd(1, 1), cd(1, 2)], [cd(2, 1), cd(2, 2)]])
        } else {
            let cdelt = [
                header.require_f64("CDELT1", context)?,
                header.require_f64("CDELT2", context)?,
            ];
            let pc = if header.contains("PC1_1") || header.contains("PC001001") {
                let pc = |i: usize, j: usize| {
                    header
                        .get_f64(&format!("PC{}_{}", i, j))
                        .or_else(|| header.get_f64(&format!("PC{:03}{:03}", i, j)))
                        .unwrap_or(if i == j { 1.0 } else { 0.0 })
                };
                [[pc(1, 1), pc(1, 2)], [pc(2, 1), pc(2, 2)]]
            } else if let Some(crota) = header.get_f64("CROTA2").filter(|r| *r != 0.0) {
                let (s, c) = crota.to_radians().sin_cos();
                let ratio = cdelt[1] / cdelt[0];
                [[c, -s * ratio], [s / ratio, c]]
            } else {
                [[1.0, 0.0], [0.0, 1.0]]
            };
            (cdelt, pc)
        };

        let wcs = Self {
            projection: projection.unwrap_or_default(),
            axes,
            crval,
            crpix,
            cdelt,
            pc,
            radesys: header.get_str("RADESYS").map(|s| s.trim().to_string()),
            equinox: header.get_f64("EQUINOX").or_else(|| header.get_f64("EPOCH")),
        };
        if wcs.inverse_matrix().is_none() {
            return Err(MosaicError::Geometry(format!(
                "{}: singular pixel-to-sky matrix",
                context
            )));
        }
        Ok(wcs)
    }

    /// Header cards describing this WCS, ending with `RADESYS`.
    pub fn to_header(&self) -> FitsHeader {
        let mut header = FitsHeader::new();
        let code = self.projection.code();
        header.set_str("CTYPE1", &ctype(&self.axes[0], code));
        header.set_str("CTYPE2", &ctype(&self.axes[1], code));
        header.set_f64("CRVAL1", self.crval[0]);
        header.set_f64("CRVAL2", self.crval[1]);
        header.set_f64("CRPIX1", self.crpix[0]);
        header.set_f64("CRPIX2", self.crpix[1]);
        header.set_f64("CDELT1", self.cdelt[0]);
        header.set_f64("CDELT2", self.cdelt[1]);
        if self.pc != [[1.0, 0.0], [0.0, 1.0]] {
            for i in 0..2 {
                for j in 0..2 {
                    header.set_f64(&format!("PC{}_{}", i + 1, j + 1), self.pc[i][j]);
                }
            }
        }
        header.set_str("CUNIT1", "deg");
        header.set_str("CUNIT2", "deg");
        if let Some(equinox) = self.equinox {
            header.set_f64("EQUINOX", equinox);
        }
        header.set(
            "RADESYS",
            FitsValue::String(self.radesys.clone().unwrap_or_else(|| "ICRS".to_string())),
        );
        header
    }

    /// Writes this WCS into an existing header, replacing stale celestial keys.
    pub fn apply_to(&self, header: &mut FitsHeader) {
        for key in [
            "CD1_1", "CD1_2", "CD2_1", "CD2_2", "PC1_1", "PC1_2", "PC2_1", "PC2_2", "CROTA2",
        ] {
            header.remove(key);
        }
        for card in self.to_header().cards() {
            header.set(&card.key, card.value.clone());
        }
    }

    fn matrix(&self) -> [[f64; 2]; 2] {
        [
            [self.cdelt[0] * self.pc[0][0], self.cdelt[0] * self.pc[0][1]],
            [self.cdelt[1] * self.pc[1][0], self.cdelt[1] * self.pc[1][1]],
        ]
    }

    fn inverse_matrix(&self) -> Option<[[f64; 2]; 2]> {
        let m = self.matrix();
        let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
        if det.abs() < 1e-300 || !det.is_finite() {
            return None;
        }
        Some([
            [m[1][1] / det, -m[0][1] / det],
            [-m[1][0] / det, m[0][0] / det],
        ])
    }

    /// Pixel size along each axis in degrees.
    pub fn pixel_scales(&self) -> [f64; 2] {
        let m = self.matrix();
        [m[0][0].hypot(m[1][0]), m[0][1].hypot(m[1][1])]
    }

    /// World coordinates (deg) of a 0-based pixel position.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = self.matrix();
        let px = x + 1.0 - self.crpix[0];
        let py = y + 1.0 - self.crpix[1];
        let ix = m[0][0] * px + m[0][1] * py;
        let iy = m[1][0] * px + m[1][1] * py;

        let r = ix.hypot(iy);
        let phi = ix.atan2(-iy);
        let theta = self.projection.theta_from_radius(r)?.to_radians();
        let (lon, lat) = native_to_celestial(phi, theta, self.crval);
        Some((lon, lat))
    }

    /// 0-based pixel position of world coordinates (deg); `None` when the
    /// point is not representable in the projection.
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (phi, theta) = celestial_to_native(lon, lat, self.crval);
        let r = self.projection.radius_from_theta(theta.to_degrees())?;
        let ix = r * phi.sin();
        let iy = -r * phi.cos();
        let inv = self.inverse_matrix()?;
        let px = inv[0][0] * ix + inv[0][1] * iy;
        let py = inv[1][0] * ix + inv[1][1] * iy;
        Some((px + self.crpix[0] - 1.0, py + self.crpix[1] - 1.0))
    }

    /// Same frame with the pixel origin moved to `(row, col)` of this one.
    pub fn shifted(&self, row: usize, col: usize) -> Self {
        let mut wcs = self.clone();
        wcs.crpix[0] -= col as f64;
        wcs.crpix[1] -= row as f64;
        wcs
    }

    /// Whether `other` describes the same pixel grid: reference values and
    /// increments within `tolerance` (relative), reference pixels within
    /// `tolerance` pixels.
    pub fn same_grid(&self, other: &CelestialWcs, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0);
        self.projection == other.projection
            && (0..2).all(|i| {
                close(self.crval[i], other.crval[i])
                    && close(self.cdelt[i], other.cdelt[i])
                    && (self.crpix[i] - other.crpix[i]).abs() <= tolerance.max(1e-12)
            })
            && (0..2).all(|i| (0..2).all(|j| (self.pc[i][j] - other.pc[i][j]).abs() <= tolerance))
    }
}

fn ctype(axis: &str, code: &str) -> String {
    let mut name = axis.to_string();
    while name.len() < 4 {
        name.push('-');
    }
    format!("{}-{}", name, code)
}

/// Native spherical (rad) to celestial (deg) for a zenithal projection whose
/// native pole sits at `crval`.
fn native_to_celestial(phi: f64, theta: f64, crval: [f64; 2]) -> (f64, f64) {
    let phi_p = std::f64::consts::PI;
    let alpha_p = crval[0].to_radians();
    let delta_p = crval[1].to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_dp, cos_dp) = delta_p.sin_cos();
    let dphi = phi - phi_p;

    let lat = (sin_t * sin_dp + cos_t * cos_dp * dphi.cos()).clamp(-1.0, 1.0).asin();
    let lon = alpha_p + (-cos_t * dphi.sin()).atan2(sin_t * cos_dp - cos_t * sin_dp * dphi.cos());
    (lon.to_degrees().rem_euclid(360.0), lat.to_degrees())
}

fn celestial_to_native(lon: f64, lat: f64, crval: [f64; 2]) -> (f64, f64) {
    let phi_p = std::f64::consts::PI;
    let alpha_p = crval[0].to_radians();
    let delta_p = crval[1].to_radians();
    let (sin_d, cos_d) = lat.to_radians().sin_cos();
    let (sin_dp, cos_dp) = delta_p.sin_cos();
    let da = lon.to_radians() - alpha_p;

    let phi = phi_p + (-cos_d * da.sin()).atan2(sin_d * cos_dp - cos_d * sin_dp * da.cos());
    let theta = (sin_d * sin_dp + cos_d * cos_dp * da.cos()).clamp(-1.0, 1.0).asin();
    (phi, theta)
}

/// Great-circle unit vector of a sky position (deg).
pub fn unit_vector(lon: f64, lat: f64) -> [f64; 3] {
    let (sin_l, cos_l) = lon.to_radians().sin_cos();
    let (sin_b, cos_b) = lat.to_radians().sin_cos();
    [cos_b * cos_l, cos_b * sin_l, sin_b]
}
