// [apps/gateway/src/lib.rs]
/*!
 * APARATO: GATEWAY LIBRARY ROOT (ESTRATO L3)
 * RESPONSABILIDAD: ÁRBOL DE MÓDULOS DEL GATEWAY
 *
 * `main.rs` depende únicamente de `prelude` para la ignición; todo lo
 * demás vive detrás de estos módulos.
 */

/// Hidratación de cachés en memoria al arranque.
pub mod bootstrap;
/// Adaptadores de entrada: ingestión de protocolo, WS de suscripción, API de mando.
pub mod handlers;
/// Composition root — conecta estado, daemons y servidor HTTP.
pub mod kernel;
/// Guardianes perimetrales de salud y autenticación.
pub mod middleware;
/// Topología de rutas HTTP/WS.
pub mod routes;
/// Daemons de fondo: pipeline de posición, despacho de comandos, barrido de presencia, retención.
pub mod services;
/// Estado compartido de la aplicación y registro de dispositivos en memoria.
pub mod state;

/// Reexportación mínima para la ignición desde `main.rs`.
pub mod prelude {
    pub use crate::kernel::GatewayKernel;
    pub use crate::state::{AppState, SystemMode};
}
