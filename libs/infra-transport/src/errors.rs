// [libs/infra-transport/src/errors.rs]
/*!
 * Catálogo de errores de decodificación/codificación. Un error de
 * decodificación nunca envenena la conexión: el listener lo registra
 * y descarta el frame (§7).
 */

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unsupported protocol variant: {0}")]
    UnsupportedVariant(String),
    #[error("empty input")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("command type '{0}' has no wire encoding for this protocol")]
    UnsupportedCommand(String),
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
}
