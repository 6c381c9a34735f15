// [apps/gateway/src/state/device_registry.rs]
/*!
 * APARATO: DEVICE REGISTRY (ESTRATO L1-APP)
 * RESPONSABILIDAD: CACHÉ EN MEMORIA DEL ÚLTIMO ESTADO CONOCIDO
 *
 * Espejo en RAM de la tabla `devices`, hidratado al arranque e
 * invalidado/actualizado por el pipeline de posición tras cada
 * escritura exitosa. Nunca es la fuente de verdad — esa es siempre
 * la fachada de persistencia — pero evita una consulta por trama
 * para decisiones de enrutamiento y resolución (C3).
 */

use sentinel_domain_models::{Device, UnknownDevice};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    unknown_devices: RwLock<HashMap<(String, String), UnknownDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            unknown_devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn hydrate(&self, devices: Vec<Device>) {
        let mut guard = self.devices.write().expect("device registry lock poisoned");
        guard.clear();
        for device in devices {
            guard.insert(device.unique_id.clone(), device);
        }
    }

    pub fn get(&self, unique_id: &str) -> Option<Device> {
        self.devices.read().expect("device registry lock poisoned").get(unique_id).cloned()
    }

    pub fn upsert(&self, device: Device) {
        self.devices.write().expect("device registry lock poisoned").insert(device.unique_id.clone(), device);
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.read().expect("device registry lock poisoned").values().cloned().collect()
    }

    pub fn touch_unknown(&self, unknown: UnknownDevice) {
        let key = (unknown.unique_id.clone(), unknown.protocol.clone());
        self.unknown_devices.write().expect("unknown device registry lock poisoned").insert(key, unknown);
    }

    pub fn unknown_snapshot(&self) -> Vec<UnknownDevice> {
        self.unknown_devices.read().expect("unknown device registry lock poisoned").values().cloned().collect()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
