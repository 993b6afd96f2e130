// CLI subcommand dispatch.

use clap::Subcommand;

pub mod cancel;
pub mod cleanup;
pub mod sessions;
pub mod stats;
pub mod status;
pub mod upload;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Upload a file in chunks
    Upload(upload::UploadArgs),
    /// Show one upload session's progress and status
    Status(status::StatusArgs),
    /// List live upload sessions
    Sessions(sessions::SessionsArgs),
    /// Follow an upload's realtime events until it finishes
    Watch(watch::WatchArgs),
    /// Cancel an in-flight upload
    Cancel(cancel::CancelArgs),
    /// Remove an upload session and its stored data
    Cleanup(cleanup::CleanupArgs),
    /// Show server connection and session counters
    Stats(stats::StatsArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Upload(args) => upload::run(args),
        Command::Status(args) => status::run(args),
        Command::Sessions(args) => sessions::run(args),
        Command::Watch(args) => watch::run(args),
        Command::Cancel(args) => cancel::run(args),
        Command::Cleanup(args) => cleanup::run(args),
        Command::Stats(args) => stats::run(args),
    }
}
