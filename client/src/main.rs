use clap::Parser;
use client::game::GameClient;
use client::input::StdinInput;
use client::navigation::DEFAULT_STABILITY_TICKS;
use client::network::NetworkClient;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Homestead terminal client", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name; reconnecting with the same name restores the inventory
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Ticks fence building must stay active before it can be left
    #[arg(long, default_value_t = DEFAULT_STABILITY_TICKS)]
    stability_ticks: u32,

    /// Client updates per second
    #[arg(short = 't', long, default_value = "20")]
    tick_rate: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to {} as {}", args.server, args.name);
    info!("Controls: w/a/s/d move or steer the cursor, e confirms, q backs out");
    info!("i inventory, b fence building, f attack, g pick up, p plant");
    info!("In fence building: x remove, c clear enclosure, m switch material; /quit exits");

    let mut network = NetworkClient::connect(&args.server, &args.name)?;
    let mut input = StdinInput::spawn()?;
    let mut game = GameClient::new(args.stability_ticks);

    let tick = Duration::from_secs(1) / args.tick_rate.max(1);
    game.run(&mut network, &mut input, tick);

    info!("Client stopped");
    Ok(())
}
