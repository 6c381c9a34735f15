// [libs/core-geo/src/containment.rs]
/*!
 * Predicados de contención por tipo de geometría (§4.5).
 */

use crate::distance::haversine_meters;
use sentinel_domain_models::GeofenceGeometry;

/// Despacha la prueba de contención adecuada según el tipo de geometría.
pub fn point_in_geofence(lat: f64, lon: f64, geometry: &GeofenceGeometry) -> bool {
    match geometry {
        GeofenceGeometry::Polygon { vertices } => point_in_polygon(lat, lon, vertices),
        GeofenceGeometry::Circle { center, radius_meters } => point_in_circle(lat, lon, *center, *radius_meters),
        GeofenceGeometry::Polyline { vertices, buffer_meters } => distance_to_polyline(lat, lon, vertices, *buffer_meters),
    }
}

/// Ray-casting sobre el anillo del polígono. Un punto exactamente sobre
/// una arista cuenta como "dentro" (boundary inclusive, per spec).
pub fn point_in_polygon(lat: f64, lon: f64, vertices: &[(f64, f64)]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    if on_any_edge(lat, lon, vertices) {
        return true;
    }

    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];

        let intersects = ((yi > lon) != (yj > lon))
            && (lat < (xj - xi) * (lon - yi) / (yj - yi) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_any_edge(lat: f64, lon: f64, vertices: &[(f64, f64)]) -> bool {
    let n = vertices.len();
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        if point_on_segment(lat, lon, a, b) {
            return true;
        }
    }
    false
}

fn point_on_segment(lat: f64, lon: f64, a: (f64, f64), b: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (lon - a.1) - (b.1 - a.1) * (lat - a.0);
    if cross.abs() > 1e-9 {
        return false;
    }
    let within_lat = lat >= a.0.min(b.0) - 1e-9 && lat <= a.0.max(b.0) + 1e-9;
    let within_lon = lon >= a.1.min(b.1) - 1e-9 && lon <= a.1.max(b.1) + 1e-9;
    within_lat && within_lon
}

/// Contención circular: distancia haversine desde el centro <= radio.
pub fn point_in_circle(lat: f64, lon: f64, center: (f64, f64), radius_meters: f64) -> bool {
    haversine_meters(lat, lon, center.0, center.1) <= radius_meters
}

/// Distancia de un punto a la polilínea más cercana (mínimo sobre todos
/// los segmentos consecutivos), comparada contra un buffer en metros.
pub fn distance_to_polyline(lat: f64, lon: f64, vertices: &[(f64, f64)], buffer_meters: f64) -> bool {
    if vertices.len() < 2 {
        return false;
    }

    let mut min_distance = f64::MAX;
    for pair in vertices.windows(2) {
        let d = distance_to_segment(lat, lon, pair[0], pair[1]);
        if d < min_distance {
            min_distance = d;
        }
    }
    min_distance <= buffer_meters
}

/// Distancia aproximada (metros) de un punto al segmento `a-b`,
/// proyectando en un plano equirectangular local — suficiente precisión
/// para buffers de decenas/cientos de metros alrededor de una ruta.
fn distance_to_segment(lat: f64, lon: f64, a: (f64, f64), b: (f64, f64)) -> f64 {
    let lat_scale = 111_320.0;
    let lon_scale = 111_320.0 * lat.to_radians().cos().max(1e-6);

    let px = (lon - a.1) * lon_scale;
    let py = (lat - a.0) * lat_scale;
    let dx = (b.1 - a.1) * lon_scale;
    let dy = (b.0 - a.0) * lat_scale;

    let segment_length_sq = dx * dx + dy * dy;
    let t = if segment_length_sq > 1e-9 {
        ((px * dx + py * dy) / segment_length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let proj_x = dx * t;
    let proj_y = dy * t;
    ((px - proj_x).powi(2) + (py - proj_y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_polygon_contains_center() {
        let square = vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];
        assert!(point_in_polygon(0.5, 0.5, &square));
        assert!(!point_in_polygon(2.0, 2.0, &square));
    }

    #[test]
    fn boundary_point_counts_as_inside() {
        let square = vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];
        assert!(point_in_polygon(0.0, 0.5, &square));
    }

    #[test]
    fn circle_containment_respects_radius() {
        assert!(point_in_circle(-23.55, -46.63, (-23.55, -46.63), 500.0));
        assert!(!point_in_circle(-23.60, -46.63, (-23.55, -46.63), 500.0));
    }

    #[test]
    fn polyline_buffer_catches_nearby_point() {
        let route = vec![(0.0, 0.0), (0.0, 1.0)];
        assert!(distance_to_polyline(0.0001, 0.5, &route, 50.0));
        assert!(!distance_to_polyline(1.0, 0.5, &route, 50.0));
    }
}
