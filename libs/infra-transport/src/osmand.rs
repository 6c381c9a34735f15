// [libs/infra-transport/src/osmand.rs]
/*!
 * APARATO: OSMAND PROTOCOL STRATUM (ESTRATO L1)
 * RESPONSABILIDAD: PETICIONES HTTP REQUEST/RESPONSE (5055)
 *
 * Cada petición trae como máximo una posición. El cuerpo puede venir
 * como query string / form-urlencoded o como JSON, y el JSON puede
 * anidar las coordenadas bajo `location.coords` (apps móviles que
 * hablan el dialecto OsmAnd sin ser el cliente oficial). Ausencia de
 * lat/lon no es un error: es un heartbeat sin posición.
 * =================================================================
 */

use crate::decoder::{CommandEncoder, ProtocolDecoder, TransportKind};
use crate::errors::{DecodeError, EncodeError};
use crate::frame::{CanonicalFrame, FrameKind};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Conversión de metros/segundo a nudos (knots), aplicada a toda velocidad OsmAnd.
pub const MPS_TO_KNOTS: f64 = 1.943_84;

pub struct OsmAndDecoder {
    pub listener_port: u16,
}

impl OsmAndDecoder {
    pub fn new(listener_port: u16) -> Self {
        Self { listener_port }
    }
}

/// Vista unificada de los parámetros de una petición OsmAnd, sea cual
/// sea su encoding original (query string, form body, o JSON).
struct OsmAndParams {
    values: HashMap<String, Value>,
}

impl OsmAndParams {
    fn get_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.values.get(*k))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
    }

    fn get_f64(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.values.get(*k)).and_then(|v| {
            v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
    }

    fn from_query_string(body: &str) -> Self {
        let mut values = HashMap::new();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            let decoded_key = percent_decode(key);
            let decoded_value = percent_decode(value);
            values.insert(decoded_key, Value::String(decoded_value));
        }
        Self { values }
    }

    fn from_json(root: &Value) -> Self {
        let mut values = HashMap::new();
        flatten_json(root, &mut values);
        // Variante anidada: `location.coords.{latitude,longitude,...}`.
        if let Some(coords) = root.pointer("/location/coords") {
            flatten_json(coords, &mut values);
        }
        if let Some(location) = root.pointer("/location") {
            flatten_json(location, &mut values);
        }
        Self { values }
    }
}

fn flatten_json(value: &Value, out: &mut HashMap<String, Value>) {
    if let Value::Object(map) = value {
        for (k, v) in map {
            if !matches!(v, Value::Object(_)) {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(seconds) = raw.parse::<f64>() {
        // OsmAnd manda epoch en segundos; algunos clientes mandan milisegundos.
        let (secs, nanos) = if seconds > 1e12 {
            ((seconds / 1000.0) as i64, (((seconds as i64) % 1000) * 1_000_000) as u32)
        } else {
            (seconds as i64, (((seconds.fract()) * 1e9).round()) as u32)
        };
        return Utc.timestamp_opt(secs, nanos).single();
    }
    None
}

impl ProtocolDecoder for OsmAndDecoder {
    fn protocol_name(&self) -> &'static str {
        "osmand"
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::RequestResponse
    }

    fn listener_port(&self) -> u16 {
        self.listener_port
    }

    fn decode(&self, bytes: &[u8], client_address: Option<SocketAddr>) -> Result<Vec<CanonicalFrame>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::Malformed("body is not valid utf-8".into()))?
            .trim();

        let params = if text.starts_with('{') {
            let root: Value = serde_json::from_str(text)
                .map_err(|e| DecodeError::Malformed(format!("invalid json body: {e}")))?;
            OsmAndParams::from_json(&root)
        } else {
            OsmAndParams::from_query_string(text)
        };

        let source_id = params
            .get_str(&["id", "deviceid", "device_id"])
            .ok_or_else(|| DecodeError::Malformed("missing device identifier".into()))?;

        let device_time = params
            .get_str(&["timestamp", "time"])
            .and_then(|raw| parse_timestamp(&raw))
            .unwrap_or_else(Utc::now);

        let latitude = params.get_f64(&["lat", "latitude"]);
        let longitude = params.get_f64(&["lon", "lng", "longitude"]);

        let mut fields = HashMap::new();
        if let Some(battery) = params.get_f64(&["battery", "batt"]) {
            fields.insert("power".to_string(), json!(battery));
        }
        if let Some(accuracy) = params.get_f64(&["accuracy", "acc"]) {
            fields.insert("accuracy".to_string(), json!(accuracy));
        }
        if let Some(altitude) = params.get_f64(&["altitude", "alt"]) {
            fields.insert("altitude".to_string(), json!(altitude));
        }
        if let Some(valid) = params.get_str(&["valid"]) {
            fields.insert("valid".to_string(), json!(valid != "false" && valid != "0"));
        }
        if let Some(motion) = params.get_str(&["motion", "is_moving"]) {
            fields.insert("motion".to_string(), json!(motion == "true" || motion == "1"));
        }
        if let Some(event) = params.get_str(&["event"]) {
            fields.insert("event".to_string(), json!(event));
        }

        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Ok(vec![CanonicalFrame {
                    source_id,
                    protocol: "osmand",
                    kind: FrameKind::Heartbeat,
                    device_time,
                    client_address,
                    fields,
                    raw: bytes.to_vec(),
                }]);
            }
        };

        let speed_mps = params.get_f64(&["speed"]).unwrap_or(0.0);
        let course = params.get_f64(&["bearing", "heading", "course"]).unwrap_or(0.0);

        fields.insert("lat".to_string(), json!(latitude));
        fields.insert("lon".to_string(), json!(longitude));
        fields.insert("speed_knots".to_string(), json!(speed_mps * MPS_TO_KNOTS));
        fields.insert("course".to_string(), json!(course));
        fields.entry("valid".to_string()).or_insert_with(|| json!(true));

        Ok(vec![CanonicalFrame {
            source_id,
            protocol: "osmand",
            kind: FrameKind::Position,
            device_time,
            client_address,
            fields,
            raw: bytes.to_vec(),
        }])
    }
}

impl CommandEncoder for OsmAndDecoder {
    fn protocol_name(&self) -> &'static str {
        "osmand"
    }

    fn encode_command(&self, command_type: &str, params: &HashMap<String, Value>) -> Result<String, EncodeError> {
        match command_type {
            "set_report_interval" => {
                let seconds = params
                    .get("seconds")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| EncodeError::MissingParameter("seconds".into()))?;
                Ok(format!("SET_INTERVAL:{seconds}"))
            }
            other => Err(EncodeError::UnsupportedCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_query_string_position() {
        let decoder = OsmAndDecoder::new(5055);
        let body = "id=device-42&lat=-3.84&lon=-38.61&speed=10&timestamp=1700000000";
        let frames = decoder.decode(body.as_bytes(), None).expect("decode ok");
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.kind, FrameKind::Position);
        assert!((frame.field_f64("speed_knots").unwrap() - 19.4384).abs() < 1e-3);
    }

    #[test]
    fn missing_coordinates_yields_heartbeat() {
        let decoder = OsmAndDecoder::new(5055);
        let body = "id=device-42&battery=87";
        let frames = decoder.decode(body.as_bytes(), None).expect("decode ok");
        assert_eq!(frames[0].kind, FrameKind::Heartbeat);
    }

    #[test]
    fn decodes_nested_json_body() {
        let decoder = OsmAndDecoder::new(5055);
        let body = r#"{"id":"device-7","location":{"coords":{"latitude":-3.84,"longitude":-38.61,"speed":5.0}}}"#;
        let frames = decoder.decode(body.as_bytes(), None).expect("decode ok");
        assert_eq!(frames[0].kind, FrameKind::Position);
        assert!((frames[0].field_f64("lat").unwrap() - (-3.84)).abs() < 1e-9);
    }
}
