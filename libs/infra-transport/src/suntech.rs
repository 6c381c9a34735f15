// [libs/infra-transport/src/suntech.rs]
/*!
 * APARATO: SUNTECH PROTOCOL STRATUM (ESTRATO L1)
 * RESPONSABILIDAD: TRAMAS ASCII SEMICOLON-DELIMITED (STREAM/TCP 5011)
 *
 * Dos variantes conviven en el mismo puerto: la forma "universal",
 * prefijada `ST<modelo>STT` con el identificador numérico en el campo 1,
 * y la forma legacy con el identificador en el campo 0. Ambas
 * comparten unidades y disposición de campos salvo por ese corrimiento.
 * =================================================================
 */

use crate::decoder::{CommandEncoder, ProtocolDecoder, TransportKind};
use crate::errors::{DecodeError, EncodeError};
use crate::frame::{CanonicalFrame, FrameKind};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Conversión de km/h a nudos (knots), aplicada a toda velocidad Suntech.
pub const KMH_TO_KNOTS: f64 = 0.539_957;

/// Tabla de alarmas Suntech: código numérico -> etiqueta canónica.
pub fn alarm_label(code: u32) -> Option<&'static str> {
    match code {
        1 => Some("sos"),
        2 => Some("overspeed"),
        3 => Some("geofence_enter"),
        4 => Some("geofence_exit"),
        5 => Some("low_battery"),
        6 => Some("power_cut"),
        7 => Some("vibration"),
        8 => Some("door"),
        9 => Some("jamming"),
        10 => Some("braking"),
        11 => Some("acceleration"),
        12 => Some("accident"),
        _ => None,
    }
}

pub struct SuntechDecoder {
    pub listener_port: u16,
}

impl SuntechDecoder {
    pub fn new(listener_port: u16) -> Self {
        Self { listener_port }
    }
}

struct ParsedLayout<'a> {
    source_id: &'a str,
    date: &'a str,
    time: &'a str,
    latitude: &'a str,
    longitude: &'a str,
    speed_kmh: &'a str,
    course: &'a str,
    satellites: &'a str,
    gps_fix: &'a str,
    odometer: &'a str,
    voltage: &'a str,
    io_bitmap: &'a str,
    alarm_code: Option<&'a str>,
}

impl ProtocolDecoder for SuntechDecoder {
    fn protocol_name(&self) -> &'static str {
        "suntech"
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn listener_port(&self) -> u16 {
        self.listener_port
    }

    fn find_frame_boundary(&self, buffer: &[u8]) -> Option<usize> {
        // Las tramas Suntech se concatenan en el flujo separadas por CR/LF.
        buffer.iter().position(|b| *b == b'\n' || *b == b'\r').map(|idx| idx + 1)
    }

    fn decode(&self, bytes: &[u8], client_address: Option<SocketAddr>) -> Result<Vec<CanonicalFrame>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        // Las tramas pueden llegar en ráfaga; cada línea es una trama propia.
        let text = strip_control_characters(bytes);
        let mut frames = Vec::new();
        for line in text.split(['\n', '\r']).map(str::trim).filter(|l| !l.is_empty()) {
            frames.push(self.decode_one(line, client_address)?);
        }

        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(frames)
    }
}

impl SuntechDecoder {
    fn decode_one(&self, line: &str, client_address: Option<SocketAddr>) -> Result<CanonicalFrame, DecodeError> {
        let fields: Vec<&str> = line.split(';').collect();

        let is_universal = fields
            .first()
            .map(|h| h.starts_with("ST") && h.ends_with("STT"))
            .unwrap_or(false);

        let layout = if is_universal {
            self.universal_layout(&fields)?
        } else {
            self.legacy_layout(&fields)?
        };

        let latitude: f64 = layout
            .latitude
            .parse()
            .map_err(|_| DecodeError::Malformed("invalid latitude field".into()))?;
        let longitude: f64 = layout
            .longitude
            .parse()
            .map_err(|_| DecodeError::Malformed("invalid longitude field".into()))?;
        let speed_kmh: f64 = layout.speed_kmh.parse().unwrap_or(0.0);
        let course: f64 = layout.course.parse().unwrap_or(0.0);
        let satellites: i64 = layout.satellites.parse().unwrap_or(0);
        let gps_fix_ok = layout.gps_fix.trim() == "1";
        let odometer: f64 = layout.odometer.parse().unwrap_or(0.0);
        let voltage: f64 = layout.voltage.parse().unwrap_or(0.0);
        let ignition = io_bitmap_ignition_bit(layout.io_bitmap);
        let alarm = layout
            .alarm_code
            .and_then(|code| code.trim().parse::<u32>().ok())
            .filter(|code| *code != 0)
            .and_then(alarm_label);

        let device_time = parse_suntech_timestamp(layout.date, layout.time)
            .ok_or_else(|| DecodeError::Malformed("invalid date/time field".into()))?;

        let mut fields_map = HashMap::new();
        fields_map.insert("satellites".to_string(), json!(satellites));
        fields_map.insert("ignition".to_string(), json!(ignition));
        fields_map.insert("power".to_string(), json!(voltage));
        fields_map.insert("odometer".to_string(), json!(odometer));
        fields_map.insert("valid".to_string(), json!(gps_fix_ok));
        fields_map.insert("lat".to_string(), json!(latitude));
        fields_map.insert("lon".to_string(), json!(longitude));
        fields_map.insert("speed_knots".to_string(), json!(speed_kmh * KMH_TO_KNOTS));
        fields_map.insert("course".to_string(), json!(course));
        if let Some(alarm_code) = alarm {
            fields_map.insert("alarm".to_string(), json!(alarm_code));
        }

        Ok(CanonicalFrame {
            source_id: layout.source_id.to_string(),
            protocol: "suntech",
            kind: FrameKind::Position,
            device_time,
            client_address,
            fields: fields_map,
            raw: line.as_bytes().to_vec(),
        })
    }

    fn universal_layout<'a>(&self, fields: &[&'a str]) -> Result<ParsedLayout<'a>, DecodeError> {
        if fields.len() < 16 {
            return Err(DecodeError::Malformed("universal frame too short".into()));
        }
        Ok(ParsedLayout {
            source_id: fields[1],
            date: fields[4],
            time: fields[5],
            latitude: fields[7],
            longitude: fields[8],
            speed_kmh: fields[9],
            course: fields[10],
            satellites: fields[11],
            gps_fix: fields[12],
            odometer: fields[13],
            voltage: fields[14],
            io_bitmap: fields[15],
            alarm_code: fields.get(20).copied(),
        })
    }

    fn legacy_layout<'a>(&self, fields: &[&'a str]) -> Result<ParsedLayout<'a>, DecodeError> {
        if fields.len() < 13 {
            return Err(DecodeError::Malformed("legacy frame too short".into()));
        }
        Ok(ParsedLayout {
            source_id: fields[0],
            date: fields[1],
            time: fields[2],
            latitude: fields[4],
            longitude: fields[5],
            speed_kmh: fields[6],
            course: fields[7],
            satellites: fields[8],
            gps_fix: fields[9],
            odometer: fields[10],
            voltage: fields[11],
            io_bitmap: fields[12],
            alarm_code: fields.get(17).copied(),
        })
    }
}

impl CommandEncoder for SuntechDecoder {
    fn protocol_name(&self) -> &'static str {
        "suntech"
    }

    fn encode_command(&self, command_type: &str, params: &HashMap<String, Value>) -> Result<String, EncodeError> {
        match command_type {
            "set_report_interval" => {
                let seconds = params
                    .get("seconds")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| EncodeError::MissingParameter("seconds".into()))?;
                Ok(format!("SETINTERVAL,{seconds}"))
            }
            "engine_cut" => Ok("SETDOUT,1,1".to_string()),
            "engine_resume" => Ok("SETDOUT,1,0".to_string()),
            "reboot" => Ok("REBOOT".to_string()),
            other => Err(EncodeError::UnsupportedCommand(other.to_string())),
        }
    }
}

fn strip_control_characters(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| **b == b'\n' || **b == b'\r' || (**b >= 0x20 && **b < 0x7f))
        .map(|b| *b as char)
        .collect()
}

fn io_bitmap_ignition_bit(bitmap: &str) -> bool {
    // bit 0 del mapa de I/O representa el encendido (ignition).
    u64::from_str_radix(bitmap.trim(), 2)
        .map(|value| value & 0x1 == 1)
        .unwrap_or(false)
}

fn parse_suntech_timestamp(date: &str, time: &str) -> Option<chrono::DateTime<Utc>> {
    let naive_date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let naive_time = NaiveTime::parse_from_str(time, "%H:%M:%S").ok()?;
    let naive_datetime = naive_date.and_time(naive_time);
    Utc.from_local_datetime(&naive_datetime).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_universal_onboarding_frame() {
        let decoder = SuntechDecoder::new(5011);
        let line = "ST300STT;907126119;04;1097B;20250908;12:44:33;33e530;-03.843813;-038.615475;000.013;000.00;11;1;26663840;14.07;000000;1;0019;295746;0.0;0;0;00000000000000;0";
        let frames = decoder.decode(line.as_bytes(), None).expect("decode ok");
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.source_id, "907126119");
        assert!((frame.field_f64("lat").unwrap() - (-3.843813)).abs() < 1e-6);
        assert!((frame.field_f64("lon").unwrap() - (-38.615475)).abs() < 1e-6);
        assert!((frame.field_f64("speed_knots").unwrap() - 0.00702).abs() < 1e-3);
        assert_eq!(frame.field_f64("satellites").unwrap() as i64, 11);
        assert_eq!(frame.field_bool("ignition"), Some(false));
        assert!((frame.field_f64("power").unwrap() - 14.07).abs() < 1e-6);
    }

    #[test]
    fn rejects_empty_input() {
        let decoder = SuntechDecoder::new(5011);
        assert_eq!(decoder.decode(b"", None), Err(DecodeError::Empty));
    }
}
