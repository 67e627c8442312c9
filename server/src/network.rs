//! Server network layer: TCP accept loop, per-connection tasks and timers

use crate::config::ServerConfig;
use crate::game::GameServer;
use crate::persistence::{load_world, save_world, WorldSave};
use crate::world::WorldState;
use log::{debug, error, info, warn};
use shared::protocol::{read_frame, write_frame, Envelope};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

/// Accepts connections and drives the shared `GameServer`
pub struct Server {
    listener: TcpListener,
    game: Arc<Mutex<GameServer>>,
    config: ServerConfig,
}

impl Server {
    /// Loads or creates the world and binds the listening socket
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = config.world_settings();
        let world = match &config.save_path {
            Some(path) => match load_world(path)? {
                Some(save) => WorldState::from_save(save, settings),
                None => {
                    info!("No save at {}, creating a new world", path.display());
                    WorldState::new(settings)
                }
            },
            None => WorldState::new(settings),
        };

        let listener = TcpListener::bind(config.address()).await?;
        info!(
            "Server listening on {} (seed {})",
            listener.local_addr()?,
            world.seed()
        );

        Ok(Server {
            listener,
            game: Arc::new(Mutex::new(GameServer::new(&config, world))),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn game(&self) -> Arc<Mutex<GameServer>> {
        Arc::clone(&self.game)
    }

    /// Runs until Ctrl+C, then saves the world
    pub async fn run(self) {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await
    }

    /// Runs until `shutdown` completes, then saves the world
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let tick_task = spawn_ticker(Arc::clone(&self.game), self.config.tick_duration());
        let autosave_task = match (self.config.autosave_interval(), &self.config.save_path) {
            (Some(every), Some(path)) => Some(spawn_autosave(
                Arc::clone(&self.game),
                path.clone(),
                every,
            )),
            _ => None,
        };

        info!("Server started successfully");

        let idle_timeout = self.config.idle_timeout();
        tokio::select! {
            _ = accept_loop(&self.listener, Arc::clone(&self.game), idle_timeout) => {}
            _ = shutdown => {}
        }

        tick_task.abort();
        if let Some(task) = autosave_task {
            task.abort();
        }

        if let Some(path) = &self.config.save_path {
            let save = self.game.lock().await.world().to_save();
            write_save(path.clone(), save).await;
        }
    }
}

async fn accept_loop(listener: &TcpListener, game: Arc<Mutex<GameServer>>, idle_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let game = Arc::clone(&game);
                tokio::spawn(async move {
                    handle_connection(game, stream, addr, idle_timeout).await;
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Session flow for one connection: a writer task drains the ordered
/// outbound queue while this task reads and handles requests
async fn handle_connection(
    game: Arc<Mutex<GameServer>>,
    stream: TcpStream,
    addr: SocketAddr,
    idle_timeout: Duration,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let writer_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &envelope).await {
                warn!("Failed to send to {}: {}", addr, e);
                break;
            }
        }
    });

    let client_id = game.lock().await.accept(addr, tx);
    let Some(client_id) = client_id else {
        let _ = writer_task.await;
        return;
    };

    let mut reason = None;
    loop {
        match tokio::time::timeout(idle_timeout, read_frame(&mut reader)).await {
            Ok(Ok(Some(envelope))) => {
                let mut game = game.lock().await;
                game.handle_packet(client_id, envelope.packet);
                if !game.is_connected(client_id) {
                    break;
                }
            }
            Ok(Ok(None)) => {
                debug!("Connection {} closed by peer", client_id);
                break;
            }
            Ok(Err(e)) => {
                warn!("Dropping connection {}: {}", client_id, e);
                break;
            }
            Err(_) => {
                reason = Some("Idle timeout");
                break;
            }
        }
    }

    game.lock().await.disconnect(client_id, reason);
    if let Err(e) = writer_task.await {
        error!("Writer task for connection {} panicked: {}", client_id, e);
    }
}

fn spawn_ticker(game: Arc<Mutex<GameServer>>, tick_duration: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(tick_duration);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately
        ticks.tick().await;

        loop {
            ticks.tick().await;
            let mut game = game.lock().await;
            game.tick();
            if game.current_tick() % 600 == 0 {
                debug!(
                    "Tick {}: {} connections",
                    game.current_tick(),
                    game.clients().len()
                );
            }
        }
    })
}

fn spawn_autosave(
    game: Arc<Mutex<GameServer>>,
    path: PathBuf,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.tick().await;
        loop {
            timer.tick().await;
            let save = game.lock().await.world().to_save();
            write_save(path.clone(), save).await;
        }
    })
}

/// Writes off the async workers; the lock is not held while writing
async fn write_save(path: PathBuf, save: WorldSave) {
    match tokio::task::spawn_blocking(move || save_world(&path, &save)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Autosave failed: {}", e),
        Err(e) => error!("Autosave task panicked: {}", e),
    }
}
