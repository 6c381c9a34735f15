// [apps/gateway/src/services/event_engine.rs]
/*!
 * APARATO: EVENT DERIVATION ENGINE (ESTRATO L4)
 * RESPONSABILIDAD: C6 — REGLAS DE DERIVACIÓN SOBRE UNA POSICIÓN ACEPTADA
 *
 * Puramente reactivo: toma el dispositivo en su estado previo, la
 * posición recién persistida y la distancia recorrida desde la
 * anterior, y devuelve la lista de eventos a encolar más las señales
 * de estado que el pipeline debe grabar en `devices` (C4 paso 7).
 * El dedup de entrada/salida de geofence (P3) se resuelve aquí,
 * antes de que el evento llegue al repositorio.
 */

use crate::state::AppState;
use chrono::{Duration, Utc};
use sentinel_core_geo::Membership;
use sentinel_domain_models::{Device, Event, EventType, MotionState, Position};

/// Ventana de deduplicación para eventos de entrada/salida de geofence (P3).
const GEOFENCE_DEDUP_WINDOW_MINUTES: i64 = 5;

/// Umbral de velocidad bajo el cual el dispositivo se considera detenido.
const STOPPED_SPEED_THRESHOLD_KNOTS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct DerivedSignals {
    pub events: Vec<Event>,
    pub motion_state: MotionState,
    pub ignition_on: bool,
    pub overspeed: bool,
    pub distance_delta_meters: f64,
}

/// Evalúa todas las reglas de derivación para una posición aceptada.
pub async fn derive(state: &AppState, device: &Device, position: &Position, distance_delta_meters: f64) -> DerivedSignals {
    let mut events = Vec::new();

    if device.status != sentinel_domain_models::DeviceStatus::Online {
        events.push(Event::new(EventType::DeviceOnline, device.unique_id.clone()).with_position(position.id));
    }

    let motion_state = derive_motion(device, position, &mut events);
    let ignition_on = derive_ignition(device, position, &mut events);
    let overspeed = derive_overspeed(device, position, &mut events);
    derive_alarm(device, position, &mut events);
    derive_fuel(device, position, &mut events);
    derive_geofences(state, device, position, &mut events).await;

    DerivedSignals { events, motion_state, ignition_on, overspeed, distance_delta_meters }
}

fn derive_motion(device: &Device, position: &Position, events: &mut Vec<Event>) -> MotionState {
    let new_state = if position.speed_knots > STOPPED_SPEED_THRESHOLD_KNOTS {
        MotionState::Moving
    } else {
        MotionState::Stopped
    };

    if new_state != device.motion_state {
        let event_type = match new_state {
            MotionState::Moving => EventType::DeviceMoving,
            MotionState::Stopped => EventType::DeviceStopped,
        };
        events.push(Event::new(event_type, device.unique_id.clone()).with_position(position.id));
    }

    new_state
}

fn derive_ignition(device: &Device, position: &Position, events: &mut Vec<Event>) -> bool {
    let Some(ignition_on) = position.ignition() else {
        return device.ignition_on;
    };

    if ignition_on != device.ignition_on {
        let event_type = if ignition_on { EventType::IgnitionOn } else { EventType::IgnitionOff };
        events.push(Event::new(event_type, device.unique_id.clone()).with_position(position.id));
    }

    ignition_on
}

fn derive_overspeed(device: &Device, position: &Position, events: &mut Vec<Event>) -> bool {
    let limit_kmh = device.effective_speed_limit_kmh();
    let is_overspeed = position.speed_kmh() > limit_kmh;

    if is_overspeed && !device.overspeed {
        events.push(
            Event::new(EventType::DeviceOverspeed, device.unique_id.clone())
                .with_position(position.id)
                .with_attribute("speedKmh", position.speed_kmh().into())
                .with_attribute("limitKmh", limit_kmh.into()),
        );
    }

    is_overspeed
}

fn derive_alarm(device: &Device, position: &Position, events: &mut Vec<Event>) {
    if let Some(alarm_code) = position.alarm() {
        events.push(
            Event::new(EventType::Alarm, device.unique_id.clone())
                .with_position(position.id)
                .with_attribute("alarm", alarm_code.into()),
        );
    }
}

fn derive_fuel(device: &Device, position: &Position, events: &mut Vec<Event>) {
    let Some(current_fuel) = position.attributes.get("fuel").and_then(|v| v.as_f64()) else {
        return;
    };
    let Some(previous_fuel) = device.attributes.get("fuel").and_then(|v| v.as_f64()) else {
        return;
    };

    let delta = current_fuel - previous_fuel;
    if delta.abs() < f64::EPSILON {
        return;
    }

    let event_type = if delta < 0.0 { EventType::DeviceFuelDrop } else { EventType::DeviceFuelIncrease };
    events.push(
        Event::new(event_type, device.unique_id.clone())
            .with_position(position.id)
            .with_attribute("fuelDelta", delta.into()),
    );
}

/// Deriva entrada/salida de geofence por transición contra la última
/// membresía conocida del dispositivo, no contra el estado puntual de
/// la posición actual — de lo contrario nunca se observaría una salida
/// (§C6, P3). El dedup por ventana sigue actuando como red de
/// seguridad frente a reinicios que pierdan la caché en memoria.
async fn derive_geofences(state: &AppState, device: &Device, position: &Position, events: &mut Vec<Event>) {
    let snapshot = state.geofence_index.snapshot();
    if snapshot.is_empty() {
        return;
    }

    let memberships = snapshot.membership_for(position.latitude, position.longitude);
    let currently_inside: std::collections::HashSet<String> = memberships
        .iter()
        .filter(|(_, membership)| matches!(membership, Membership::Inside))
        .map(|(name, _)| name.to_string())
        .collect();

    let previously_inside = {
        let mut cache = state.geofence_memberships.lock().await;
        cache.entry(device.unique_id.clone()).or_default().clone()
    };

    // El dedup por ventana se aplica también al re-entrar: una posición
    // B seguida de una salida D y un reingreso E dentro de los 5
    // minutos de B no reemite `geofenceEnter` en E. Se adopta esta
    // lectura sobre la alternativa (tratar cada entrada como un evento
    // nuevo sin mirar el historial) porque el dedup está definido por
    // `(device, geofence, type)` y no por tramo de permanencia.
    let dedup_since = Utc::now() - Duration::minutes(GEOFENCE_DEDUP_WINDOW_MINUTES);

    for geofence_name in currently_inside.difference(&previously_inside) {
        emit_geofence_event(state, device, position, geofence_name, EventType::GeofenceEnter, dedup_since, events).await;
    }
    for geofence_name in previously_inside.difference(&currently_inside) {
        emit_geofence_event(state, device, position, geofence_name, EventType::GeofenceExit, dedup_since, events).await;
    }

    let mut cache = state.geofence_memberships.lock().await;
    cache.insert(device.unique_id.clone(), currently_inside);
}

async fn emit_geofence_event(
    state: &AppState,
    device: &Device,
    position: &Position,
    geofence_name: &str,
    event_type: EventType,
    dedup_since: chrono::DateTime<Utc>,
    events: &mut Vec<Event>,
) {
    let already_fired = state
        .event_repository
        .geofence_event_exists_since(&device.unique_id, geofence_name, event_type, dedup_since)
        .await
        .unwrap_or(false);

    if already_fired {
        return;
    }

    events.push(
        Event::new(event_type, device.unique_id.clone())
            .with_position(position.id)
            .with_geofence(geofence_name.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_domain_models::{DeviceStatus, Owner};
    use std::collections::HashMap;

    fn sample_device() -> Device {
        Device {
            unique_id: "123456789012345".to_string(),
            name: "Unit 1".to_string(),
            protocol: "suntech".to_string(),
            status: DeviceStatus::Online,
            last_seen: None,
            last_position_id: None,
            total_distance_meters: 0.0,
            motion_state: MotionState::Stopped,
            ignition_on: false,
            overspeed: false,
            speed_limit_kmh: 0.0,
            expires_at: None,
            group_id: None,
            owner_id: None,
            attributes: HashMap::new(),
        }
    }

    fn sample_position(speed_knots: f64) -> Position {
        Position {
            id: Some(1),
            owner: Owner::Device("123456789012345".to_string()),
            protocol: "suntech".to_string(),
            server_time: Utc::now(),
            device_time: Utc::now(),
            fix_time: Utc::now(),
            valid: true,
            latitude: 10.0,
            longitude: 20.0,
            altitude: 0.0,
            speed_knots,
            course: 0.0,
            accuracy: 0.0,
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn derives_moving_transition_from_stopped_device() {
        let device = sample_device();
        let position = sample_position(30.0);
        let mut events = Vec::new();
        let state = derive_motion(&device, &position, &mut events);
        assert_eq!(state, MotionState::Moving);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::DeviceMoving);
    }

    #[test]
    fn stays_silent_when_motion_state_unchanged() {
        let device = sample_device();
        let position = sample_position(0.0);
        let mut events = Vec::new();
        let state = derive_motion(&device, &position, &mut events);
        assert_eq!(state, MotionState::Stopped);
        assert!(events.is_empty());
    }

    #[test]
    fn flags_overspeed_against_effective_limit() {
        let mut device = sample_device();
        device.speed_limit_kmh = 40.0;
        let mut position = sample_position(30.0);
        position.speed_knots = 30.0;
        let mut events = Vec::new();
        let overspeed = derive_overspeed(&device, &position, &mut events);
        assert!(overspeed);
        assert_eq!(events[0].event_type, EventType::DeviceOverspeed);
    }
}
