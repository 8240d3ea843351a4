use std::{io::Write, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kustomize_builtins::LoadRestrictor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resources produced by the kustomization in `dir`.
    Build {
        dir: PathBuf,
        #[clap(long, value_enum, default_value_t = Restrictor::RootOnly)]
        load_restrictor: Restrictor,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Restrictor {
    RootOnly,
    None,
}

impl From<Restrictor> for LoadRestrictor {
    fn from(restrictor: Restrictor) -> Self {
        match restrictor {
            Restrictor::RootOnly => LoadRestrictor::RootOnly,
            Restrictor::None => LoadRestrictor::None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kustomize_builtins=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Build {
            dir,
            load_restrictor,
        } => {
            let resources = kustomize_builtins::build(&dir, load_restrictor.into())?;
            let yaml = resources.to_yaml().context("serializing resources")?;
            std::io::stdout().lock().write_all(yaml.as_bytes())?;
        }
    }

    Ok(())
}
