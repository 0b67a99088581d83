use super::{settle, Executor, ExecutorError};
use crate::{
    config::{compile_filter, normalize, ConfigErrors, Family, StmConfig},
    launch::{Invocation, Launcher, Sink},
    report::Report,
};
use globset::GlobMatcher;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// Runs every `<family>-<implementation>` binary, family-major and implementation-minor
pub struct StmExecutor<L: Launcher> {
    config: StmConfig,
    filter: Option<GlobMatcher>,
    launcher: L,
}

impl<L: Launcher> StmExecutor<L> {
    pub fn load(config: StmConfig, filter: Option<&str>, launcher: L) -> Result<Self, ConfigErrors> {
        Ok(Self {
            filter: compile_filter(filter)?,
            config,
            launcher,
        })
    }

    /// all invocations in execution order
    pub fn invocations(&self) -> Vec<(&Family, Invocation)> {
        let mut invocations = Vec::new();

        for family in self.config.families.iter() {
            for implementation in self.config.implementations.iter() {
                let exec = self.config.executable(family, implementation);
                let selected = match (&self.filter, exec.file_name()) {
                    (Some(filter), Some(name)) => filter.is_match(name),
                    _ => true,
                };

                if !selected {
                    debug!("Skipping {} due to the filter", exec.to_string_lossy());
                    continue;
                }

                let sink = family.log.clone().map_or(Sink::Inherit, Sink::Append);
                let invocation = Invocation::new(exec)
                    .args(self.config.flags(family))
                    .sink(sink)
                    .timeout(self.config.timeout());

                invocations.push((family, invocation));
            }
        }

        invocations
    }
}

impl<L: Launcher> Executor for StmExecutor<L> {
    #[instrument(skip(self), level = "info")]
    fn execute(&mut self) -> Result<(), ExecutorError> {
        let invocations = self
            .invocations()
            .into_iter()
            .map(|(family, invocation)| (family.clone(), invocation))
            .collect::<Vec<_>>();
        let total = invocations.len();
        let mut current_family: Option<&str> = None;
        // families sharing a log all append to it, it is only emptied once per sweep
        let mut reset_logs = BTreeSet::new();

        info!("Running {total} concurrent microbenchmarks");

        for (index, (family, invocation)) in invocations.iter().enumerate() {
            if current_family != Some(family.prefix.as_str()) {
                current_family = Some(family.prefix.as_str());
                info!("Starting family {}", family.prefix);

                let fresh_log = family
                    .log
                    .as_ref()
                    .filter(|log| reset_logs.insert(normalize(log)));

                if let Some(log) = fresh_log {
                    Report::reset(log).map_err(|source| ExecutorError::ResetReport {
                        path: log.clone(),
                        source,
                    })?;
                }
            }

            debug!("Running {}", invocation.command_line());

            match self.launcher.launch(invocation) {
                Ok(output) if output.success() => {
                    debug!(runtime = ?output.runtime, "Run finished")
                }
                Ok(output) => warn!(
                    status = ?output.status,
                    "{} exited unsuccessfully, continuing",
                    invocation.command_line()
                ),
                Err(error) => warn!("{error}, continuing"),
            }

            info!("Done with {}/{total}", index + 1);

            settle(self.config.settle_ms);
        }

        info!("Done with processing");

        Ok(())
    }
}
