// [libs/infra-transport/src/decoder.rs]
/*!
 * Contrato común que implementan los decodificadores de protocolo.
 */

use crate::errors::{DecodeError, EncodeError};
use crate::frame::CanonicalFrame;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Flavor de transporte sobre el que corre un protocolo (§4.2). Informa
/// al listener genérico cómo delimitar tramas, no al decodificador en
/// sí — el decodificador sigue siendo puro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Orientado a conexión (TCP); requiere escaneo de delimitador.
    Stream,
    /// Sin conexión (UDP); un datagrama = una trama.
    Datagram,
    /// Petición/respuesta (HTTP); una petición = un intento de decode.
    RequestResponse,
}

pub trait ProtocolDecoder: Send + Sync {
    fn protocol_name(&self) -> &'static str;
    fn transport_kind(&self) -> TransportKind;

    /// Puerto convencional del listener para este protocolo, registrado
    /// en los Unknown Device y usado como metadato de diagnóstico. No
    /// gobierna el bind real — eso lo decide la composición en `kernel.rs`.
    fn listener_port(&self) -> u16 {
        0
    }

    /// Decodifica un buffer en una o más tramas canónicas, en orden.
    /// Para transportes de flujo, el llamador ya habrá partido el
    /// buffer en unidades delimitadas antes de invocar este método.
    fn decode(&self, bytes: &[u8], client_address: Option<SocketAddr>) -> Result<Vec<CanonicalFrame>, DecodeError>;

    /// Para transportes orientados a flujo: localiza el final de la
    /// próxima trama completa dentro de `buffer`, si existe. Devuelve
    /// el índice exclusivo del delimitador para que el listener pueda
    /// partir el buffer y alimentar `decode` con una unidad completa.
    fn find_frame_boundary(&self, _buffer: &[u8]) -> Option<usize> {
        None
    }
}

pub trait CommandEncoder: Send + Sync {
    fn protocol_name(&self) -> &'static str;

    /// Traduce un tipo de comando más un mapa de parámetros a la
    /// cadena que se escribe literalmente al enlace del dispositivo.
    fn encode_command(&self, command_type: &str, params: &HashMap<String, Value>) -> Result<String, EncodeError>;
}
