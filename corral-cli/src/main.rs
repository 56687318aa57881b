//! `corral` — a minimal, single-host OCI/Docker container runtime.
//!
//! Subcommand dispatch only; the actual image decoding, unpacking,
//! namespace spawning, and child-init sequence live in [`corral_oci`] and
//! [`corral`].

use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;
mod home;

#[derive(Debug, Parser)]
#[command(name = "corral", version, about = "A minimal, single-host OCI/Docker container runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pull (if missing), unpack, and run an image.
    Run {
        /// Image reference, `name[:tag]`.
        image: String,
        /// Overrides the image's entrypoint/cmd when non-empty.
        cmd: Vec<String>,
    },
    /// Populate the image store only; idempotent when already present.
    Pull {
        /// Image reference, `name[:tag]`.
        image: String,
    },
    /// Print container ids, or image names with `--images`.
    List {
        /// List image names (`name:tag`) instead of container ids.
        #[arg(long)]
        images: bool,
    },
    /// Remove one or more containers; continues on per-id errors.
    Rm {
        /// Container ids to remove.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Re-run a container from its persisted config.
    Start {
        /// Container id.
        id: String,
    },
    /// Internal re-exec entry point; not intended for human use.
    ChildInit {
        /// Container id.
        id: String,
    },
    /// Generate a shell completion script on stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CORRAL_LOG"))
        .init();

    let cli = Cli::parse();
    let home = home::resolve();

    let result = dispatch(&cli.command, &home);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("corral: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: &Command, home: &home::Home) -> anyhow::Result<()> {
    match command {
        Command::Run { image, cmd } => commands::run::run(home, image, cmd),
        Command::Pull { image } => commands::pull::run(home, image),
        Command::List { images } => commands::list::run(home, *images),
        Command::Rm { ids } => commands::rm::run(home, ids),
        Command::Start { id } => commands::start::run(home, id),
        Command::ChildInit { id } => commands::child_init::run(home, id),
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "corral", &mut io::stdout());
            Ok(())
        }
    }
}
