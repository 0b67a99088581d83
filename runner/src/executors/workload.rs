use super::{settle, Executor, ExecutorError};
use crate::{
    config::{compile_filter, ConfigErrors, Tier, WorkloadConfig},
    launch::{Invocation, Launcher},
    report::{discard, Report},
};
use tracing::{debug, info, instrument, warn};

/// Sweeps the database binary over all thread counts, once per contention tier
pub struct WorkloadExecutor<L: Launcher> {
    config: WorkloadConfig,
    workload: String,
    notice: Option<String>,
    tiers: Vec<Tier>,
    launcher: L,
}

impl<L: Launcher> WorkloadExecutor<L> {
    /// select `workload` and the tiers matching `filter`
    pub fn load(
        config: WorkloadConfig,
        workload: &str,
        filter: Option<&str>,
        launcher: L,
    ) -> Result<Self, ConfigErrors> {
        let profile = config.profile(workload)?;
        let matcher = compile_filter(filter)?;
        let tiers: Vec<Tier> = profile
            .tiers
            .iter()
            .filter(|tier| matcher.as_ref().map_or(true, |m| m.is_match(&tier.name)))
            .cloned()
            .collect();

        if tiers.is_empty() {
            warn!("No tier of {workload} matches the selection, nothing to run");
        }

        Ok(Self {
            notice: profile.notice.clone(),
            workload: workload.to_string(),
            tiers,
            config,
            launcher,
        })
    }

    pub fn invocation(config: &WorkloadConfig, tier: &Tier, threads: u32) -> Invocation {
        Invocation::new(&config.exec)
            .args([
                "-o".to_string(),
                config.output.to_string_lossy().into_owned(),
                format!("-t{threads}"),
            ])
            .args(tier.flags())
            .timeout(config.timeout())
    }

    #[instrument(skip_all, fields(tier = %tier.name))]
    fn sweep_tier(
        config: &WorkloadConfig,
        tier: &Tier,
        launcher: &mut L,
    ) -> Result<(), ExecutorError> {
        let report = Report::reset(&tier.report).map_err(|source| ExecutorError::ResetReport {
            path: tier.report.clone(),
            source,
        })?;

        for (index, threads) in config.threads.iter().enumerate() {
            // a failed run must not leave the previous run's output behind for the append below
            discard(&config.output).map_err(|source| ExecutorError::Discard {
                path: config.output.clone(),
                source,
            })?;

            let invocation = Self::invocation(config, tier, *threads);
            debug!("Running {}", invocation.command_line());

            match launcher.launch(&invocation) {
                Ok(output) if output.success() => {
                    debug!(threads, runtime = ?output.runtime, "Run finished")
                }
                Ok(output) => warn!(
                    threads,
                    status = ?output.status,
                    "{} exited unsuccessfully, continuing",
                    invocation.command_line()
                ),
                Err(error) => warn!(threads, "{error}, continuing"),
            }

            match report.append_from(&config.output) {
                Ok(Some(bytes)) => debug!(bytes, "Appended run output to report"),
                Ok(None) => warn!(
                    threads,
                    "Run produced no {}, nothing appended to {}",
                    config.output.to_string_lossy(),
                    report.path().to_string_lossy()
                ),
                Err(source) => {
                    return Err(ExecutorError::AppendReport {
                        path: tier.report.clone(),
                        output: config.output.clone(),
                        source,
                    })
                }
            }

            info!(
                "Done with {}/{} of tier {}",
                index + 1,
                config.threads.len(),
                tier.name
            );

            settle(config.settle_ms);
        }

        Ok(())
    }
}

impl<L: Launcher> Executor for WorkloadExecutor<L> {
    #[instrument(skip(self), fields(workload = %self.workload), level = "info")]
    fn execute(&mut self) -> Result<(), ExecutorError> {
        if let Some(notice) = &self.notice {
            warn!("{notice}");
        }

        let Self {
            config,
            tiers,
            launcher,
            ..
        } = self;

        for tier in tiers.iter() {
            info!(
                "Sweeping tier {} into {}",
                tier.name,
                tier.report.to_string_lossy()
            );
            Self::sweep_tier(config, tier, launcher)?;
        }

        info!("Done with processing");

        Ok(())
    }
}
