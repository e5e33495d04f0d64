use geo::Point;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.01;

/// Great-circle distance in kilometers between two points given as (lon, lat) degrees
///
/// The spherical law of cosines is used. Its argument is clamped to `[-1, 1]` before the
/// inverse cosine, so identical or antipodal points never produce `NaN`.
///
pub fn great_circle(from: &Point<f64>, to: &Point<f64>) -> f64 {
    let (lat1, lat2) = (from.y().to_radians(), to.y().to_radians());
    let dlon = (to.x() - from.x()).abs().to_radians();
    let cos_angle = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos();
    cos_angle.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM
}
