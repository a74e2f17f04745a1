/// Equirectangular degrees-to-meters factor (equatorial, no latitude scaling).
pub const METERS_PER_DEGREE: f64 = 111_319.5;

/// Flat-earth distance in meters. Good enough over a scan area, not geodesic.
pub fn planar_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1) * METERS_PER_DEGREE;
    let dlon = (lon2 - lon1) * METERS_PER_DEGREE;
    (dlat * dlat + dlon * dlon).sqrt()
}
