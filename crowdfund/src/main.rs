mod api;
mod commands;

use commands::Cli;
use log::error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_args();
    if let Err(e) = cli.run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
