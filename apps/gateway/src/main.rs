// [apps/gateway/src/main.rs]
/*!
 * APARATO: GATEWAY MAIN ENTRY POINT (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE ENTORNO E IGNICIÓN DEL KERNEL
 *
 * Orden: variables de entorno, luego tracing, luego el runtime de
 * Tokio con pila ampliada (el pipeline de posición recursa sobre el
 * índice de geofences), luego `GatewayKernel::ignite` seguido de
 * `launch_operations`, que nunca retorna en operación normal.
 */

use sentinel_gateway_lib::prelude::GatewayKernel;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    sentinel_shared_telemetry::init_tracing("sentinel_gateway");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(4 * 1024 * 1024)
        .build()?;

    runtime.block_on(async {
        info!("🛰️  [GATEWAY]: ignition sequence starting...");

        let database_connection_url =
            std::env::var("DATABASE_URL").expect("FATAL: DATABASE_URL not set in runtime environment");
        let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

        let http_port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let suntech_port: u16 = std::env::var("SUNTECH_PORT")
            .unwrap_or_else(|_| "5011".to_string())
            .parse()
            .unwrap_or(5011);

        let kernel = GatewayKernel::ignite(&database_connection_url, database_access_token, http_port, suntech_port).await;

        info!("🚀 [GATEWAY]: fleet command center online, http={} suntech={}", http_port, suntech_port);
        kernel.launch_operations().await;
    });

    Ok(())
}
