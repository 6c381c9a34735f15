// [apps/gateway/src/handlers/suntech_listener.rs]
/*!
 * APARATO: SUNTECH STREAM LISTENER (ESTRATO L4)
 * RESPONSABILIDAD: ACEPTACIÓN TCP Y DELIMITACIÓN DE TRAMAS (§4.3)
 *
 * Para cada conexión: un lector acumula bytes en un buffer, pide al
 * decodificador el límite de la próxima trama completa
 * (`find_frame_boundary`) y solo entonces decodifica y enruta. Un
 * error de decodificación descarta la línea, nunca la conexión (§7).
 * La conexión registra su remitente de escritura en `live_connections`
 * tan pronto conoce el `source_id` del dispositivo, para que el
 * despachador de comandos (C8) pueda alcanzarlo.
 */

use crate::state::{AppState, IngestedFrame};
use sentinel_infra_transport::ProtocolDecoder;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

const READ_BUFFER_CHUNK: usize = 2048;
const OUTBOUND_COMMAND_CAPACITY: usize = 8;

#[instrument(skip(state, decoder))]
pub async fn spawn_suntech_listener(state: AppState, decoder: Arc<dyn ProtocolDecoder>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("📡 [SUNTECH_LISTENER]: bound to port {}", port);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, client_address)) => {
                    let connection_state = state.clone();
                    let connection_decoder = decoder.clone();
                    tokio::spawn(async move {
                        handle_connection(connection_state, connection_decoder, socket, client_address.into(), port).await;
                    });
                }
                Err(error) => {
                    warn!("⚠️ [SUNTECH_LISTENER]: accept failed: {}", error);
                }
            }
        }
    });

    Ok(())
}

async fn handle_connection(
    state: AppState,
    decoder: Arc<dyn ProtocolDecoder>,
    mut socket: TcpStream,
    client_address: std::net::SocketAddr,
    listener_port: u16,
) {
    debug!("🔌 [SUNTECH_LISTENER]: accepted connection from {}", client_address);

    let (outbound_sender, mut outbound_receiver) = mpsc::channel::<Vec<u8>>(OUTBOUND_COMMAND_CAPACITY);
    let mut registered_source_id: Option<String> = None;
    let mut buffer = Vec::new();
    let mut read_chunk = vec![0u8; READ_BUFFER_CHUNK];

    loop {
        tokio::select! {
            outbound = outbound_receiver.recv() => {
                match outbound {
                    Some(payload) => {
                        if socket.write_all(&payload).await.is_err() {
                            warn!("⚠️ [SUNTECH_LISTENER]: write failed for {}", client_address);
                            break;
                        }
                    }
                    None => {}
                }
            }

            read_result = socket.read(&mut read_chunk) => {
                match read_result {
                    Ok(0) => {
                        debug!("🔌 [SUNTECH_LISTENER]: connection closed by {}", client_address);
                        break;
                    }
                    Ok(bytes_read) => {
                        buffer.extend_from_slice(&read_chunk[..bytes_read]);

                        while let Some(boundary) = decoder.find_frame_boundary(&buffer) {
                            let unit: Vec<u8> = buffer.drain(..boundary).collect();
                            match decoder.decode(&unit, Some(client_address)) {
                                Ok(frames) => {
                                    for frame in frames {
                                        if registered_source_id.as_deref() != Some(frame.source_id.as_str()) {
                                            let mut connections = state.live_connections.lock().await;
                                            connections.insert(frame.source_id.clone(), outbound_sender.clone());
                                            registered_source_id = Some(frame.source_id.clone());
                                        }

                                        let ingested = IngestedFrame { frame, protocol: decoder.protocol_name(), listener_port };
                                        let worker = state.worker_for(&ingested.frame.source_id);
                                        if worker.send(ingested).await.is_err() {
                                            warn!("⚠️ [SUNTECH_LISTENER]: position worker channel closed");
                                        }
                                    }
                                }
                                Err(error) => {
                                    warn!("⚠️ [SUNTECH_LISTENER]: decode failed for {}: {}", client_address, error);
                                }
                            }
                        }
                    }
                    Err(error) => {
                        warn!("⚠️ [SUNTECH_LISTENER]: read failed for {}: {}", client_address, error);
                        break;
                    }
                }
            }
        }
    }

    if let Some(source_id) = registered_source_id {
        state.live_connections.lock().await.remove(&source_id);
    }
}
