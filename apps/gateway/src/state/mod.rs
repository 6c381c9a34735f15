// [apps/gateway/src/state/mod.rs]
/*!
 * APARATO: SHARED APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSITION ROOT DEL GATEWAY
 *
 * Todo handler y servicio recibe una copia barata de `AppState`
 * (`Clone`, todos los campos tras `Arc`). No hay estado global fuera
 * de esta estructura.
 */

pub mod device_registry;

use crate::services::event_bus::EventBus;
use sentinel_core_geo::GeofenceIndex;
use sentinel_infra_db::{CommandRepository, DatabaseClient, DeviceRepository, EventRepository, GeofenceRepository, PositionRepository};
use sentinel_infra_transport::{CommandEncoder, ProtocolDecoder};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use device_registry::DeviceRegistry;

/// Modo de salud del sistema para el guardián perimetral de la API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMode {
    Operational,
    Maintenance(String),
}

/// Trama canónica más su contexto de ingesta, encolada hacia el
/// worker de posición responsable de su dispositivo (§4.5, P1).
#[derive(Debug, Clone)]
pub struct IngestedFrame {
    pub frame: sentinel_infra_transport::CanonicalFrame,
    pub protocol: &'static str,
    pub listener_port: u16,
}

#[derive(Clone)]
pub struct AppState {
    pub database_client: DatabaseClient,
    pub event_bus: Arc<EventBus>,
    pub geofence_index: Arc<GeofenceIndex>,
    pub device_registry: Arc<DeviceRegistry>,

    pub position_repository: Arc<PositionRepository>,
    pub event_repository: Arc<EventRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub geofence_repository: Arc<GeofenceRepository>,
    pub command_repository: Arc<CommandRepository>,

    pub protocol_decoders: Arc<HashMap<&'static str, Arc<dyn ProtocolDecoder>>>,
    pub protocol_encoders: Arc<HashMap<&'static str, Arc<dyn CommandEncoder>>>,

    /// Dispositivos con un comando actualmente en vuelo (SENT o
    /// DELIVERED); límite de uno por dispositivo (P7).
    pub commands_in_flight: Arc<Mutex<HashSet<String>>>,

    /// Canales hacia los workers de partición de posición
    /// (hash-partitioned single-consumer, §4.5).
    pub position_workers: Arc<Vec<mpsc::Sender<IngestedFrame>>>,

    /// Conexiones TCP vivas indexadas por `source_id`, usadas por el
    /// despachador de comandos (C8) para escribir la carga de cable
    /// directamente al socket del dispositivo. Un dispositivo sin
    /// entrada aquí es inalcanzable hasta su próxima trama entrante.
    pub live_connections: Arc<Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>>,

    /// Membresía de geofence conocida por dispositivo (nombre de
    /// geofence → dentro), usada por el motor de eventos para derivar
    /// entradas y salidas por transición en lugar de por estado puntual.
    /// Se reconstruye en memoria; perderla en un reinicio sólo cuesta
    /// un evento de entrada espurio en la próxima trama de cada unidad.
    pub geofence_memberships: Arc<Mutex<HashMap<String, HashSet<String>>>>,

    pub current_system_mode: Arc<RwLock<SystemMode>>,
}

impl AppState {
    pub fn new(
        database_client: DatabaseClient,
        protocol_decoders: HashMap<&'static str, Arc<dyn ProtocolDecoder>>,
        protocol_encoders: HashMap<&'static str, Arc<dyn CommandEncoder>>,
        position_workers: Vec<mpsc::Sender<IngestedFrame>>,
    ) -> Self {
        debug!("🧬 [APP_STATE]: composing shared application state");

        Self {
            position_repository: Arc::new(PositionRepository::new(database_client.clone())),
            event_repository: Arc::new(EventRepository::new(database_client.clone())),
            device_repository: Arc::new(DeviceRepository::new(database_client.clone())),
            geofence_repository: Arc::new(GeofenceRepository::new(database_client.clone())),
            command_repository: Arc::new(CommandRepository::new(database_client.clone())),
            database_client,
            event_bus: Arc::new(EventBus::new()),
            geofence_index: Arc::new(GeofenceIndex::new()),
            device_registry: Arc::new(DeviceRegistry::new()),
            protocol_decoders: Arc::new(protocol_decoders),
            protocol_encoders: Arc::new(protocol_encoders),
            commands_in_flight: Arc::new(Mutex::new(HashSet::new())),
            position_workers: Arc::new(position_workers),
            live_connections: Arc::new(Mutex::new(HashMap::new())),
            geofence_memberships: Arc::new(Mutex::new(HashMap::new())),
            current_system_mode: Arc::new(RwLock::new(SystemMode::Maintenance("booting".to_string()))),
        }
    }

    pub fn is_operational(&self) -> Result<(), String> {
        match &*self.current_system_mode.read().expect("system mode lock poisoned") {
            SystemMode::Operational => Ok(()),
            SystemMode::Maintenance(reason) => Err(reason.clone()),
        }
    }

    pub fn set_mode(&self, mode: SystemMode) {
        *self.current_system_mode.write().expect("system mode lock poisoned") = mode;
    }

    /// Enruta una trama ingerida hacia el worker responsable de su
    /// dispositivo por hash del identificador (garantiza orden
    /// estricto por dispositivo, nunca entre dispositivos, P1).
    pub fn worker_for(&self, source_id: &str) -> &mpsc::Sender<IngestedFrame> {
        let worker_count = self.position_workers.len().max(1);
        let index = simple_hash(source_id) % worker_count as u64;
        &self.position_workers[index as usize]
    }
}

fn simple_hash(value: &str) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for byte in value.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
