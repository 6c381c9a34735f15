// [libs/shared-telemetry/src/lib.rs]
/*!
 * APARATO: OBSERVABILITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: TRAZADO ESTRUCTURADO Y BLINDAJE DE PÁNICOS
 *
 * Desarrollo: logs compactos y coloreados. Producción: JSON plano
 * listo para ingesta. Un pánico en cualquier hilo secundario (un
 * worker de posición, el despachador de comandos) queda registrado
 * antes de que el proceso muera en lugar de desaparecer en silencio.
 * =================================================================
 */

use std::panic;
use tracing::{error, info, instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

#[instrument(skip_all)]
pub fn init_tracing(service_name: &str) {
    let environmental_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={level},tower_http=warn,hyper=warn,libsql=error",
            service_name,
            level = if cfg!(debug_assertions) { "debug" } else { "info" }
        )
        .into()
    });

    let is_production = !cfg!(debug_assertions);

    if is_production {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    }

    let service_id_snapshot = service_name.to_string();
    panic::set_hook(Box::new(move |panic_metadata| {
        let panic_location = panic_metadata
            .location()
            .map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let panic_payload_message = panic_metadata
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_metadata.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("undefined panic payload");

        error!(
            target: "panic_monitor",
            service = %service_id_snapshot,
            location = %panic_location,
            "🔥 [PANIC]: thread terminated abruptly: {}",
            panic_payload_message
        );
    }));

    info!("👁️ [TELEMETRY]: tracing initialized for [{}]", service_name);
}
