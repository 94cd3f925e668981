use clap::Parser;
use log::{error, info};
use std::sync::{atomic::AtomicBool, Arc};

use ninjam_rust::common::box_error::BoxError;
use ninjam_rust::common::config::Config;
use ninjam_rust::ninjam::client::{self, ClientOptions};

#[derive(Parser)]
#[command(version, about = "headless NINJAM jam client")]
struct Cli {
    /// server hostname, overrides the config file
    #[arg(short, long)]
    server: Option<String>,
    /// server port
    #[arg(short, long)]
    port: Option<u16>,
    /// login username
    #[arg(short, long)]
    user: Option<String>,
    /// login password (anonymous servers take anything)
    #[arg(long, default_value = "")]
    password: String,
    /// name to announce for the transmit channel
    #[arg(short, long)]
    channel: Option<String>,
    /// settings file, plain json in the working directory
    #[arg(long, default_value = "settings.json")]
    config: String,
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let cli = Cli::parse();

    let defaults = json::object! {
        "server": "ninbot.com",
        "port": 2049,
        "username": "ninjam_rust",
        "channel_name": "default channel",
        "sample_rate": 44100,
        "block_size": 512
    };
    let config = Config::build(cli.config.clone(), defaults)?;

    let opts = ClientOptions {
        server: config.get_str_value("server", cli.server)?,
        port: config.get_u32_value("port", cli.port.map(u32::from))? as u16,
        username: config.get_str_value("username", cli.user)?,
        password: cli.password,
        channel_name: config.get_str_value("channel_name", cli.channel)?,
        sample_rate: config.get_u32_value("sample_rate", None)?,
        block_size: config.get_u32_value("block_size", None)? as usize,
    };

    info!("connecting to {}:{} as {}", opts.server, opts.port, opts.username);
    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = client::run(&opts, stop) {
        error!("session ended: {}", e);
        return Err(e);
    }
    Ok(())
}
