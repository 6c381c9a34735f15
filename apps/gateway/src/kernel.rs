// [apps/gateway/src/kernel.rs]
/*!
 * APARATO: GATEWAY KERNEL (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSITION ROOT — CONECTA TODOS LOS SERVICIOS
 *
 * Orden de ignición deliberado: la conexión a la base de datos y el
 * registro de protocolos antes que nada; los workers de posición antes
 * que los listeners que les alimentan; el servidor HTTP al final, una
 * vez que los daemons de fondo ya están corriendo.
 */

use crate::bootstrap::Bootstrap;
use crate::handlers::suntech_listener::spawn_suntech_listener;
use crate::routes::create_router;
use crate::services::{command_dispatcher, device_sweeper, position_pipeline, retention};
use crate::state::{AppState, IngestedFrame};
use sentinel_infra_db::DatabaseClient;
use sentinel_infra_transport::{osmand::OsmAndDecoder, suntech::SuntechDecoder, CommandEncoder, ProtocolDecoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

const POSITION_WORKER_CHANNEL_CAPACITY: usize = 1024;
/// Puerto nominal de OsmAnd (§6) — la ingestión real ocurre vía HTTP en
/// el router de axum, no en un listener propio; se usa solo para
/// etiquetar el decodificador con su puerto convencional.
const OSMAND_HTTP_PORT: u16 = 5055;

pub struct GatewayKernel {
    pub http_port: u16,
    pub application_state: AppState,
    pub suntech_port: u16,
    position_receivers: Vec<mpsc::Receiver<IngestedFrame>>,
}

impl GatewayKernel {
    #[instrument(skip(database_access_token))]
    pub async fn ignite(database_connection_url: &str, database_access_token: Option<String>, http_port: u16, suntech_port: u16) -> Self {
        let database_client = DatabaseClient::connect(database_connection_url, database_access_token)
            .await
            .expect("FATAL: database connection failed, aborting ignition");

        let mut decoders: HashMap<&'static str, Arc<dyn ProtocolDecoder>> = HashMap::new();
        let mut encoders: HashMap<&'static str, Arc<dyn CommandEncoder>> = HashMap::new();

        let suntech_decoder = Arc::new(SuntechDecoder::new(suntech_port));
        decoders.insert(suntech_decoder.protocol_name(), suntech_decoder.clone());
        encoders.insert(suntech_decoder.protocol_name(), suntech_decoder.clone());

        let osmand_decoder = Arc::new(OsmAndDecoder::new(OSMAND_HTTP_PORT));
        decoders.insert(osmand_decoder.protocol_name(), osmand_decoder.clone());
        encoders.insert(osmand_decoder.protocol_name(), osmand_decoder.clone());

        let worker_count = num_cpus::get().max(2);
        let mut position_senders = Vec::with_capacity(worker_count);
        let mut position_receivers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (sender, receiver) = mpsc::channel::<IngestedFrame>(POSITION_WORKER_CHANNEL_CAPACITY);
            position_senders.push(sender);
            position_receivers.push(receiver);
        }

        let application_state = AppState::new(database_client, decoders, encoders, position_senders);

        Self { http_port, application_state, suntech_port, position_receivers }
    }

    pub async fn launch_operations(self) {
        let Self { http_port, application_state: state, suntech_port, position_receivers } = self;

        Bootstrap::spawn_diagnostics(state.clone());

        position_pipeline::spawn_position_workers(state.clone(), position_receivers);

        tokio::spawn(command_dispatcher::spawn_dispatch_loop(state.clone()));
        tokio::spawn(command_dispatcher::spawn_timeout_sweep_loop(state.clone()));
        tokio::spawn(device_sweeper::spawn_presence_sweep_loop(state.clone()));
        tokio::spawn(retention::spawn_retention_loop(state.clone()));

        let suntech_decoder = state
            .protocol_decoders
            .get("suntech")
            .cloned()
            .expect("suntech decoder must be registered at ignition");
        if let Err(error) = spawn_suntech_listener(state.clone(), suntech_decoder, suntech_port).await {
            error!("💀 [KERNEL]: failed to bind suntech listener: {}", error);
            std::process::exit(1);
        }

        let router = create_router(state);
        let bind_address = SocketAddr::from(([0, 0, 0, 0], http_port));
        info!("🚀 [KERNEL]: gateway listening at {}", bind_address);

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("FATAL: failed to bind HTTP port");

        if let Err(error) = axum::serve(listener, router).await {
            error!("💀 [KERNEL]: server runtime failure: {}", error);
            std::process::exit(1);
        }
    }
}
