//! Background connection to the world server
//!
//! All socket I/O runs on a dedicated worker thread with its own
//! current-thread tokio runtime. The game loop stays synchronous: it pushes
//! requests into an unbounded channel and drains received envelopes from a
//! `std::sync::mpsc` queue once per tick.

use log::{debug, error, info, warn};
use shared::protocol::{read_frame, write_frame, Envelope, Packet, SERVER_SESSION};
use shared::PROTOCOL_VERSION;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};

/// Keeps the server's idle timer from firing while the player stands still
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Received(Envelope),
    /// The connection is gone; no further events follow
    Closed { reason: String },
}

pub struct NetworkClient {
    requests: Option<UnboundedSender<Packet>>,
    events: Receiver<NetworkEvent>,
    worker: Option<JoinHandle<()>>,
}

impl NetworkClient {
    /// Spawns the worker, which connects and sends the handshake
    pub fn connect(server_addr: &str, player_name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (request_tx, request_rx) = unbounded_channel::<Packet>();
        let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>();
        let server_addr = server_addr.to_string();
        let player_name = player_name.to_string();

        let worker = std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start network runtime: {}", e);
                        let _ = event_tx.send(NetworkEvent::Closed {
                            reason: e.to_string(),
                        });
                        return;
                    }
                };

                let reason = runtime.block_on(run_connection(
                    &server_addr,
                    player_name,
                    request_rx,
                    &event_tx,
                ));
                info!("Network worker stopped: {}", reason);
                let _ = event_tx.send(NetworkEvent::Closed { reason });
            })?;

        Ok(Self {
            requests: Some(request_tx),
            events: event_rx,
            worker: Some(worker),
        })
    }

    /// Queues a request; false once the connection is closed
    pub fn send(&self, packet: Packet) -> bool {
        match &self.requests {
            Some(requests) => requests.send(packet).is_ok(),
            None => false,
        }
    }

    /// Everything received since the previous call
    pub fn poll(&self) -> Vec<NetworkEvent> {
        self.events.try_iter().collect()
    }

    /// Blocks for the next event, up to `timeout`
    pub fn wait_event(&self, timeout: Duration) -> Option<NetworkEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Says goodbye and waits for the worker to finish
    pub fn disconnect(&mut self) {
        if let Some(requests) = self.requests.take() {
            let _ = requests.send(Packet::Disconnect);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Network worker panicked");
            }
        }
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connection loop; returns why it ended
async fn run_connection(
    server_addr: &str,
    player_name: String,
    mut requests: UnboundedReceiver<Packet>,
    events: &Sender<NetworkEvent>,
) -> String {
    let stream = match TcpStream::connect(server_addr).await {
        Ok(stream) => stream,
        Err(e) => return format!("Failed to connect to {}: {}", server_addr, e),
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle: {}", e);
    }
    info!("Connected to {}", server_addr);

    let (mut reader, mut writer) = stream.into_split();
    let mut session = SERVER_SESSION;

    let hello = Envelope::new(
        session,
        Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player_name,
        },
    );
    if let Err(e) = write_frame(&mut writer, &hello).await {
        return format!("Handshake failed: {}", e);
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(envelope)) => {
                    if let Packet::Connected { player_id, .. } = envelope.packet {
                        session = player_id;
                    }
                    let closing = matches!(envelope.packet, Packet::Disconnected { .. });
                    if events.send(NetworkEvent::Received(envelope)).is_err() {
                        return "Client dropped".to_string();
                    }
                    if closing {
                        return "Server closed the session".to_string();
                    }
                }
                Ok(None) => return "Server closed the connection".to_string(),
                Err(e) => return format!("Receive failed: {}", e),
            },

            request = requests.recv() => {
                let packet = request.unwrap_or(Packet::Disconnect);
                let leaving = packet == Packet::Disconnect;
                if let Err(e) = write_frame(&mut writer, &Envelope::new(session, packet)).await {
                    return format!("Send failed: {}", e);
                }
                if leaving {
                    return "Disconnected".to_string();
                }
            },

            _ = heartbeat.tick() => {
                if let Err(e) = write_frame(&mut writer, &Envelope::new(session, Packet::Heartbeat)).await {
                    warn!("Heartbeat failed: {}", e);
                    return format!("Send failed: {}", e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;

    #[test]
    fn test_unreachable_server_reports_closed() {
        // Bind then drop to find a port nobody listens on
        let port = StdListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = NetworkClient::connect(&format!("127.0.0.1:{}", port), "nobody").unwrap();

        match client.wait_event(Duration::from_secs(5)) {
            Some(NetworkEvent::Closed { reason }) => assert!(reason.contains("Failed to connect")),
            other => panic!("expected a closed event, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_is_first_frame() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = NetworkClient::connect(&addr.to_string(), "ada").unwrap();

        let first = runtime.block_on(async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_frame(&mut stream).await.unwrap().unwrap();
            write_frame(
                &mut stream,
                &Envelope::new(
                    SERVER_SESSION,
                    Packet::Connected {
                        player_id: 5,
                        world_seed: 1,
                    },
                ),
            )
            .await
            .unwrap();
            first
        });

        assert_eq!(
            first.packet,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                player_name: "ada".to_string(),
            }
        );
        match client.wait_event(Duration::from_secs(5)) {
            Some(NetworkEvent::Received(envelope)) => assert_eq!(
                envelope.packet,
                Packet::Connected {
                    player_id: 5,
                    world_seed: 1,
                }
            ),
            other => panic!("expected Connected, got {:?}", other),
        }
        client.disconnect();
        assert!(!client.send(Packet::Heartbeat));
    }
}
