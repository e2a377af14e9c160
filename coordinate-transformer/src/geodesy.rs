//! WGS84 geodetic to ECEF conversion and the local ENU frame.
//!
//! Ellipsoid parameters are those of WGS 84 (EPSG:7030, NIMA TR8350.2):
//! semi-major axis 6 378 137 m, inverse flattening 298.257223563.

pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

pub fn wgs84_eccentricity_squared() -> f64 {
    2.0 * WGS84_FLATTENING - WGS84_FLATTENING * WGS84_FLATTENING
}

/// Geodetic (degrees, meters) to earth-centered earth-fixed meters.
pub fn geodetic_to_ecef(lon: f64, lat: f64, height: f64) -> [f64; 3] {
    let e2 = wgs84_eccentricity_squared();
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();

    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    [
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    ]
}

/// East-north-up unit vectors at a geodetic position, expressed in ECEF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnuBasis {
    pub east: [f64; 3],
    pub north: [f64; 3],
    pub up: [f64; 3],
}

impl EnuBasis {
    pub fn at(lon: f64, lat: f64) -> Self {
        let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
        let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
        Self {
            east: [-sin_lon, cos_lon, 0.0],
            north: [-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat],
            up: [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat],
        }
    }
}
