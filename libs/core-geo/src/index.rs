// [libs/core-geo/src/index.rs]
/*!
 * APARATO: GEOFENCE INDEX (ESTRATO L1)
 * Mantiene una instantánea inmutable y versionada de los geofences
 * activos. Las lecturas toman una referencia (`Arc`) a la instantánea
 * vigente para la duración de la evaluación de un frame; el swap en
 * una reconstrucción es un intercambio de puntero — las instantáneas
 * antiguas se liberan cuando el último lector las suelta.
 */

use sentinel_domain_models::Geofence;
use std::sync::{Arc, RwLock};

/// Resultado de membresía para un geofence dado en un punto concreto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Inside,
    Outside,
}

/// Instantánea inmutable de geofences activos, apta para bounding-box
/// prefiltering barato antes de la prueba de contención exacta.
pub struct GeofenceSnapshot {
    pub version: u64,
    entries: Vec<IndexedGeofence>,
}

struct IndexedGeofence {
    geofence: Geofence,
    bounding_box: BoundingBox,
}

#[derive(Clone, Copy)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl BoundingBox {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    fn from_geofence(geofence: &Geofence) -> Self {
        use sentinel_domain_models::GeofenceGeometry::*;
        match &geofence.geometry {
            Polygon { vertices } | Polyline { vertices, .. } => {
                let (mut min_lat, mut max_lat) = (f64::MAX, f64::MIN);
                let (mut min_lon, mut max_lon) = (f64::MAX, f64::MIN);
                for (lat, lon) in vertices {
                    min_lat = min_lat.min(*lat);
                    max_lat = max_lat.max(*lat);
                    min_lon = min_lon.min(*lon);
                    max_lon = max_lon.max(*lon);
                }
                let pad = if matches!(geofence.geometry, Polyline { .. }) {
                    Self::meters_to_degrees(geofence.geometry_buffer_meters())
                } else {
                    0.0
                };
                Self { min_lat: min_lat - pad, max_lat: max_lat + pad, min_lon: min_lon - pad, max_lon: max_lon + pad }
            }
            Circle { center, radius_meters } => {
                let pad = Self::meters_to_degrees(*radius_meters);
                Self {
                    min_lat: center.0 - pad,
                    max_lat: center.0 + pad,
                    min_lon: center.1 - pad,
                    max_lon: center.1 + pad,
                }
            }
        }
    }

    fn meters_to_degrees(meters: f64) -> f64 {
        meters / 111_320.0
    }
}

trait GeometryBuffer {
    fn geometry_buffer_meters(&self) -> f64;
}

impl GeometryBuffer for Geofence {
    fn geometry_buffer_meters(&self) -> f64 {
        match &self.geometry {
            sentinel_domain_models::GeofenceGeometry::Polyline { buffer_meters, .. } => *buffer_meters,
            _ => 0.0,
        }
    }
}

impl GeofenceSnapshot {
    fn build(version: u64, geofences: Vec<Geofence>) -> Self {
        let entries = geofences
            .into_iter()
            .filter(|g| !g.disabled && g.geometry.is_well_formed())
            .map(|geofence| {
                let bounding_box = BoundingBox::from_geofence(&geofence);
                IndexedGeofence { geofence, bounding_box }
            })
            .collect();
        Self { version, entries }
    }

    /// Evalúa la membresía de un punto contra cada geofence de la
    /// instantánea, aplicando primero el prefiltro de bounding-box.
    pub fn membership_for(&self, lat: f64, lon: f64) -> Vec<(&str, Membership)> {
        self.entries
            .iter()
            .filter(|entry| entry.bounding_box.contains(lat, lon))
            .map(|entry| {
                let inside = crate::containment::point_in_geofence(lat, lon, &entry.geofence.geometry);
                (
                    entry.geofence.name.as_str(),
                    if inside { Membership::Inside } else { Membership::Outside },
                )
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Geofence> {
        self.entries.iter().map(|e| &e.geofence).find(|g| g.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Contenedor de la instantánea vigente, con reconstrucción atómica.
pub struct GeofenceIndex {
    current: RwLock<Arc<GeofenceSnapshot>>,
    next_version: std::sync::atomic::AtomicU64,
}

impl GeofenceIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(GeofenceSnapshot::build(0, Vec::new()))),
            next_version: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Toma una referencia a la instantánea vigente; O(1), sin copiar
    /// los geofences subyacentes.
    pub fn snapshot(&self) -> Arc<GeofenceSnapshot> {
        self.current.read().expect("geofence index lock poisoned").clone()
    }

    /// Reconstruye la instantánea a partir del conjunto de geofences
    /// leído de la fachada de persistencia. Intercambio de puntero:
    /// los lectores en vuelo retienen su `Arc` hasta soltarlo.
    pub fn rebuild(&self, geofences: Vec<Geofence>) {
        let version = self.next_version.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let snapshot = Arc::new(GeofenceSnapshot::build(version, geofences));
        *self.current.write().expect("geofence index lock poisoned") = snapshot;
    }
}

impl Default for GeofenceIndex {
    fn default() -> Self {
        Self::new()
    }
}
