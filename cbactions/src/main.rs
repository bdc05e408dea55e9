mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    cbactions_core::observability::init_tracing();
    let cli = Cli::parse();

    // Business exit codes become the process status only here.
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Commands) -> anyhow::Result<i32> {
    match command {
        #[cfg(unix)]
        Commands::Entrypoint => commands::entrypoint::run(),
        #[cfg(unix)]
        Commands::Spawnclient { in_fd, out_fd } => commands::spawnclient::run(in_fd, out_fd),
        #[cfg(unix)]
        Commands::Launch {
            name,
            files_dir,
            listener_args,
        } => commands::launch::run(&name, files_dir, listener_args),
        Commands::Keygen { custodian } => commands::keygen::run(custodian),
        #[cfg(not(unix))]
        other => anyhow::bail!("{:?} requires a Unix host", other),
    }
}
