//! Approximate Korea-TM (central belt) to WGS84 conversion for display.
//!
//! This is a linear approximation around the projection origin, not a datum
//! transform. Errors grow with distance from the origin and reach hundreds of
//! meters at the edge of the grid; it is only used to report a viewer-facing
//! center, never to move geometry.

const CENTRAL_MERIDIAN: f64 = 127.0;
const LATITUDE_OF_ORIGIN: f64 = 38.0;
const FALSE_EASTING: f64 = 200_000.0;
const FALSE_NORTHING: f64 = 600_000.0;

const METERS_PER_DEGREE_LAT: f64 = 110_950.0;
const METERS_PER_DEGREE_LON_EQUATOR: f64 = 111_320.0;

/// Returns `(lon, lat)` in degrees.
pub fn to_wgs84_approx(easting: f64, northing: f64) -> (f64, f64) {
    let meters_per_degree_lon = METERS_PER_DEGREE_LON_EQUATOR * LATITUDE_OF_ORIGIN.to_radians().cos();
    let lon = CENTRAL_MERIDIAN + (easting - FALSE_EASTING) / meters_per_degree_lon;
    let lat = LATITUDE_OF_ORIGIN + (northing - FALSE_NORTHING) / METERS_PER_DEGREE_LAT;
    (lon, lat)
}
