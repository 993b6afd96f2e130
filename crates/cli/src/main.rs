// uplink CLI entry point.

use clap::Parser;

mod client;
mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "uplink", about = "Chunked file uploads with realtime progress")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run(cli.command)
}
