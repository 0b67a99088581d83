use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sequential benchmark sweeps over external binaries")]
pub struct Cli {
    /// YAML config, the built-in defaults are used for everything it leaves out
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sweep the database binary over all thread counts for each contention tier
    Db {
        /// workload profile to run, defaults to `database.workload`
        #[arg(short, long)]
        workload: Option<String>,
        /// only run tiers whose name matches this glob
        #[arg(short, long)]
        tiers: Option<String>,
    },
    /// Run every STM microbenchmark binary with the shared sweep flags
    Stm {
        /// only run executables whose name matches this glob, e.g. `set-*-2plsf`
        #[arg(short, long)]
        only: Option<String>,
    },
    /// Compile and smoke test the database for every workload and algorithm
    Verify,
    /// Print the effective configuration as YAML
    Config,
}
