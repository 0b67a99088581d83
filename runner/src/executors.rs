pub mod stm;
pub mod verify;
pub mod workload;


use crate::{
    cli::Commands,
    config::{ConfigErrors, SweepConfig},
    launch::{LaunchError, Launcher},
};
use std::{io, path::PathBuf, thread, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to reset report {path:?}: {source}")]
    ResetReport { path: PathBuf, source: io::Error },
    #[error("Failed to append {output:?} to report {path:?}: {source}")]
    AppendReport {
        path: PathBuf,
        output: PathBuf,
        source: io::Error,
    },
    #[error("Failed to remove stale output {path:?}: {source}")]
    Discard { path: PathBuf, source: io::Error },
    #[error("Failed to prepare build header {path:?}: {source}")]
    Header { path: PathBuf, source: io::Error },
    #[error("Failed to compile job {job}")]
    Build { job: String },
    #[error("Failed to run job {job}: {source}")]
    Run { job: String, source: LaunchError },
    #[error("Job {job} did not report a pass")]
    NotPassed { job: String },
}

pub trait Executor {
    /// run every invocation of this executor in order, blocking on each one
    fn execute(&mut self) -> Result<(), ExecutorError>;
}

pub enum Executors<L: Launcher> {
    Workload(workload::WorkloadExecutor<L>),
    Stm(stm::StmExecutor<L>),
    Verify(verify::VerifyExecutor<L>),
}

impl<L: Launcher> Executors<L> {
    pub fn load(config: SweepConfig, command: &Commands, launcher: L) -> Result<Self, ConfigErrors> {
        match command {
            Commands::Db { workload, tiers } => {
                let workload = workload
                    .clone()
                    .unwrap_or_else(|| config.database.workload.clone());

                if config.database.preflight_checks(&workload) {
                    return Err(ConfigErrors::Preflight);
                }

                workload::WorkloadExecutor::load(
                    config.database,
                    &workload,
                    tiers.as_deref(),
                    launcher,
                )
                .map(Self::Workload)
            }
            Commands::Stm { only } => {
                if config.stm.preflight_checks() {
                    return Err(ConfigErrors::Preflight);
                }

                stm::StmExecutor::load(config.stm, only.as_deref(), launcher).map(Self::Stm)
            }
            Commands::Verify => {
                if config.verify.preflight_checks() {
                    return Err(ConfigErrors::Preflight);
                }

                verify::VerifyExecutor::load(config.verify, launcher).map(Self::Verify)
            }
            Commands::Config => Err(ConfigErrors::UnsupportedExecutor("config".to_string())),
        }
    }

    pub fn execute(&mut self) -> Result<(), ExecutorError> {
        match self {
            Self::Workload(executor) => executor.execute(),
            Self::Stm(executor) => executor.execute(),
            Self::Verify(executor) => executor.execute(),
        }
    }
}

/// give the machine time to calm down before the next measurement
pub(crate) fn settle(millis: u64) {
    if millis > 0 {
        debug!("Settling for {millis} ms");
        thread::sleep(Duration::from_millis(millis));
    }
}
