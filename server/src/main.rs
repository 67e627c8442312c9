use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::parse();
    info!(
        "Starting world server on {} (ownership enforcement {})",
        config.address(),
        if config.enforce_ownership { "on" } else { "off" }
    );

    let server = Server::new(config).await?;
    server.run().await;

    info!("Server stopped");
    Ok(())
}
