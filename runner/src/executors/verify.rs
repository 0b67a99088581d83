use super::{Executor, ExecutorError};
use crate::{
    config::{ConfigErrors, VerifyConfig},
    launch::{Invocation, Launcher, Sink},
    report::discard,
};
use itertools::iproduct;
use std::{fs, path::Path};
use tracing::{error, info, instrument, warn};

/// one build of the database for a single workload and concurrency control algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub workload: String,
    pub algorithm: String,
}

impl Job {
    pub fn name(&self) -> String {
        format!("{}_{}", self.algorithm, self.workload)
    }

    pub fn defines(&self, core_count: u32) -> Vec<(&'static str, String)> {
        vec![
            ("WORKLOAD", self.workload.clone()),
            ("CORE_CNT", core_count.to_string()),
            ("CC_ALG", self.algorithm.clone()),
        ]
    }

    /// the `TEST` workload runs the built-in read/write check instead of a benchmark
    pub fn run_flags(&self) -> Vec<String> {
        if self.workload == "TEST" {
            vec!["-Ar".to_string(), "-t1".to_string()]
        } else {
            Vec::new()
        }
    }
}

/// Replace the value of every `#define NAME ...` line whose NAME is in `values`.
/// Returns the new source and the names that were not found.
pub fn rewrite_defines<'a>(
    source: &str,
    values: &'a [(&'a str, String)],
) -> (String, Vec<&'a str>) {
    let mut found = vec![false; values.len()];
    let mut rewritten = String::with_capacity(source.len());

    for line in source.split_inclusive('\n') {
        let mut tokens = line.split_whitespace();
        let name = match (tokens.next(), tokens.next()) {
            (Some("#define"), Some(name)) => name,
            _ => {
                rewritten.push_str(line);
                continue;
            }
        };

        match values.iter().position(|(key, _)| *key == name) {
            Some(index) => {
                found[index] = true;
                rewritten.push_str(&format!("#define {} {}", name, values[index].1));
                if line.ends_with('\n') {
                    rewritten.push('\n');
                }
            }
            None => rewritten.push_str(line),
        }
    }

    let missing = values
        .iter()
        .zip(found)
        .filter(|(_, found)| !found)
        .map(|((key, _), _)| *key)
        .collect();

    (rewritten, missing)
}

fn command(parts: &[String]) -> Result<Invocation, ConfigErrors> {
    match parts.split_first() {
        Some((exec, args)) => Ok(Invocation::new(exec).args(args.iter().cloned())),
        None => Err(ConfigErrors::Preflight),
    }
}

/// Compiles and runs the database once per job, stopping at the first failure
pub struct VerifyExecutor<L: Launcher> {
    config: VerifyConfig,
    build: Invocation,
    clean: Invocation,
    launcher: L,
}

impl<L: Launcher> VerifyExecutor<L> {
    pub fn load(config: VerifyConfig, launcher: L) -> Result<Self, ConfigErrors> {
        let sink = Sink::Log(config.build_log.clone());

        Ok(Self {
            build: command(&config.build)?.sink(sink.clone()),
            clean: command(&config.clean)?.sink(sink),
            config,
            launcher,
        })
    }

    pub fn jobs(&self) -> Vec<Job> {
        iproduct!(self.config.workloads.iter(), self.config.algorithms.iter())
            .map(|(workload, algorithm)| Job {
                workload: workload.clone(),
                algorithm: algorithm.clone(),
            })
            .collect()
    }

    fn restore_header(&self) -> Result<(), ExecutorError> {
        fs::copy(&self.config.template, &self.config.header)
            .map(|_| ())
            .map_err(|source| ExecutorError::Header {
                path: self.config.header.clone(),
                source,
            })
    }

    fn prepare_header(&self, job: &Job) -> Result<(), ExecutorError> {
        let header: &Path = &self.config.header;
        let header_error = |source| ExecutorError::Header {
            path: header.to_path_buf(),
            source,
        };

        self.restore_header()?;
        let source = fs::read_to_string(header).map_err(header_error)?;
        let defines = job.defines(self.config.core_count);
        let (rewritten, missing) = rewrite_defines(&source, &defines);

        for name in missing {
            warn!(
                "{} has no `#define {name}`, leaving it untouched",
                header.to_string_lossy()
            );
        }

        fs::write(header, rewritten).map_err(header_error)
    }

    fn clean(&mut self) {
        match self.launcher.launch(&self.clean) {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(status = ?output.status, "Clean exited unsuccessfully"),
            Err(error) => warn!("Failed to clean: {error}"),
        }
    }

    #[instrument(skip(self), fields(job = %job.name()))]
    fn compile(&mut self, job: &Job) -> Result<(), ExecutorError> {
        self.prepare_header(job)?;
        self.clean();

        match self.launcher.launch(&self.build) {
            Ok(output) if output.success() => {
                info!(
                    "PASS Compile\t\talg={},\tworkload={}",
                    job.algorithm, job.workload
                );

                Ok(())
            }
            Ok(output) => {
                error!(
                    status = ?output.status,
                    "Compilation failed, see {}",
                    self.config.build_log.to_string_lossy()
                );

                Err(ExecutorError::Build { job: job.name() })
            }
            Err(error) => {
                error!("Failed to start the build: {error}");

                Err(ExecutorError::Build { job: job.name() })
            }
        }
    }

    #[instrument(skip(self), fields(job = %job.name()))]
    fn run(&mut self, job: &Job) -> Result<(), ExecutorError> {
        let invocation = Invocation::new(&self.config.exec)
            .args(job.run_flags())
            .sink(Sink::Capture)
            .timeout(Some(self.config.timeout()));

        let output = self
            .launcher
            .launch(&invocation)
            .map_err(|source| ExecutorError::Run {
                job: job.name(),
                source,
            })?;

        if output.stdout.contains(&self.config.pass_marker) {
            info!(
                "PASS execution. \talg={},\tworkload={}",
                job.algorithm, job.workload
            );

            Ok(())
        } else {
            error!(
                stderr = %output.stderr,
                "FAILED execution. cmd = {}",
                invocation.command_line()
            );

            Err(ExecutorError::NotPassed { job: job.name() })
        }
    }
}

impl<L: Launcher> Executor for VerifyExecutor<L> {
    #[instrument(skip(self), level = "info")]
    fn execute(&mut self) -> Result<(), ExecutorError> {
        let jobs = self.jobs();

        for job in jobs.iter() {
            self.compile(job)?;
            self.run(job)?;
        }

        self.restore_header()?;
        self.clean();
        discard(&self.config.build_log).map_err(|source| ExecutorError::Discard {
            path: self.config.build_log.clone(),
            source,
        })?;

        info!("All {} jobs passed", jobs.len());

        Ok(())
    }
}
