// [libs/infra-transport/src/lib.rs]
/*!
 * APARATO: PROTOCOL TRANSPORT ENGINE (ESTRATO L1)
 * RESPONSABILIDAD: DECODIFICACIÓN Y CODIFICACIÓN DE TRAMAS DE RASTREADORES
 *
 * Un decodificador es una función pura `(bytes, client_address) ->
 * Frame | DecodeError`. Sin red, sin disco, sin estado global — los
 * listeners (en el binario `gateway`) son quienes abren sockets y
 * alimentan estos decodificadores con bytes.
 * =================================================================
 */

pub mod frame;
pub mod errors;
pub mod decoder;
pub mod suntech;
pub mod osmand;

pub use decoder::{CommandEncoder, ProtocolDecoder, TransportKind};
pub use errors::{DecodeError, EncodeError};
pub use frame::{CanonicalFrame, FrameKind};
