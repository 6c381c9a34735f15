// [libs/core-geo/src/distance.rs]
/*!
 * Distancia de gran círculo (haversine) entre dos puntos WGS84.
 */

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distancia en metros entre `(lat1, lon1)` y `(lat2, lon2)`, en grados
/// decimales. Usada tanto por el pipeline de posiciones (acumulador de
/// distancia) como por el contenedor de geofences circulares.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert!(haversine_meters(10.0, 20.0, 10.0, 20.0) < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_roughly_111_km() {
        let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 500.0);
    }
}
