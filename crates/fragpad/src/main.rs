mod cli;
mod commands;
mod controls;
mod paths;
mod run;
mod samples;
mod settings;
mod watch;
mod window;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Command::Synth(args)) => commands::synth(args, config_path),
        Some(Command::Remote(remote)) => commands::remote(remote, config_path),
        Some(Command::Snapshot(snapshot)) => commands::snapshot(snapshot),
        Some(Command::Config(config)) => commands::config(config.action, config_path),
        Some(Command::Where) => commands::where_(config_path),
        None => run::run(cli.run, config_path),
    }
}
