use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cbactions - run self-hosted CI agent jobs on remote build hosts
#[derive(Parser, Debug)]
#[command(name = "cbactions")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Job host entrypoint: open the crossing secrets and run the agent
    Entrypoint,

    /// Stand-in for the agent worker: read the job from IN_FD and run it remotely
    Spawnclient {
        /// Inherited fd carrying the framed job request
        #[arg(value_name = "IN_FD")]
        in_fd: i32,

        /// Inherited fd for agent-bound output
        #[arg(value_name = "OUT_FD")]
        out_fd: i32,
    },

    /// Start one listener instance with its own redirected credential files
    Launch {
        /// Instance name; the redirect root is /tmp/<NAME>
        #[arg(value_name = "NAME")]
        name: String,

        /// Directory holding this instance's .credentials, .credentials_rsaparams and .runner
        #[arg(value_name = "FILES_DIR")]
        files_dir: PathBuf,

        /// Arguments passed to the listener
        #[arg(last = true, value_name = "LISTENER_ARGS")]
        listener_args: Vec<String>,
    },

    /// Print a fresh identity file, or a local custodian master key
    Keygen {
        /// Print a base64 master key for CBA_LOCAL_CUSTODIAN_KEY_FILE instead
        #[arg(long, default_value = "false")]
        custodian: bool,
    },
}
