// [libs/domain-models/src/geofence.rs]
/*!
 * APARATO: GEOFENCE CONTRACT (ESTRATO L2)
 * Región nombrada usada por el índice de geofences (core-geo) para
 * evaluar la pertenencia de una posición.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Geometría de un geofence. Invariantes: polígono >= 3 vértices,
/// círculo con radio > 0, polilínea >= 2 vértices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeofenceGeometry {
    Polygon { vertices: Vec<(f64, f64)> },
    Circle { center: (f64, f64), radius_meters: f64 },
    Polyline { vertices: Vec<(f64, f64)>, buffer_meters: f64 },
}

impl GeofenceGeometry {
    pub const DEFAULT_POLYLINE_BUFFER_METERS: f64 = 50.0;

    /// Valida los invariantes geométricos declarados en el modelo de datos.
    pub fn is_well_formed(&self) -> bool {
        match self {
            GeofenceGeometry::Polygon { vertices } => vertices.len() >= 3,
            GeofenceGeometry::Circle { radius_meters, .. } => *radius_meters > 0.0,
            GeofenceGeometry::Polyline { vertices, .. } => vertices.len() >= 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    /// Nombre único, usado también como identificador lógico.
    pub name: String,
    pub description: Option<String>,
    pub geometry: GeofenceGeometry,
    pub disabled: bool,
    pub calendar_id: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
    /// Contador de versión: cada mutación administrativa lo incrementa,
    /// invalidando las instantáneas del índice en memoria.
    pub version: u64,
}

impl Geofence {
    pub fn speed_limit_override_kmh(&self) -> Option<f64> {
        self.attributes
            .get("speedLimit")
            .and_then(|v| v.as_f64())
    }
}
