#[cfg(test)]
mod config_test;

use globset::{Glob, GlobMatcher};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// absolute form of `path` without `.` components, so differently spelled paths to one file compare equal
pub fn normalize(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// compile an optional selection glob, `None` selects everything
pub fn compile_filter(pattern: Option<&str>) -> Result<Option<GlobMatcher>, ConfigErrors> {
    pattern
        .map(|pattern| -> Result<GlobMatcher, ConfigErrors> {
            Ok(Glob::new(pattern)?.compile_matcher())
        })
        .transpose()
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("Failed to read config at {path:?}")]
    Read { path: PathBuf, source: Error },
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("Executor not supported")]
    UnsupportedExecutor(String),
    #[error("Workload {0} is not defined")]
    UnknownWorkload(String),
    #[error("Config failed the preflight checks")]
    Preflight,
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    // thread sweeps over the database binary
    #[serde(default, alias = "db")]
    pub database: WorkloadConfig,
    // family x implementation sweeps over the STM microbenchmarks
    #[serde(default)]
    pub stm: StmConfig,
    // compile-and-run checks of the database build
    #[serde(default)]
    pub verify: VerifyConfig,
}

impl SweepConfig {
    /// load the config at `path`, or the built-in defaults if there is none
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

                Ok(serde_yaml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    #[serde(default = "default_database_exec")]
    pub exec: PathBuf,
    // the binary writes each run to this file, it is reused across runs
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_database_threads")]
    pub threads: Vec<u32>,
    #[serde(default = "default_database_settle")]
    pub settle_ms: u64,
    // seconds, no timeout if unset
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default = "default_workload")]
    pub workload: String,
    #[serde(default = "default_workloads")]
    pub workloads: BTreeMap<String, WorkloadProfile>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkloadProfile {
    // printed before the sweep, e.g. a reminder about the required build flags
    #[serde(default)]
    pub notice: Option<String>,
    pub tiers: Vec<Tier>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tier {
    pub name: String,
    pub report: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouses: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

impl Tier {
    /// fixed flags of this tier, in the order `-r -w -R -z -n` followed by `params`
    pub fn flags(&self) -> Vec<String> {
        [
            self.read_ratio.map(|value| format!("-r{value}")),
            self.write_ratio.map(|value| format!("-w{value}")),
            self.range.map(|value| format!("-R{value}")),
            self.skew.map(|value| format!("-z{value}")),
            self.warehouses.map(|value| format!("-n{value}")),
        ]
        .into_iter()
        .flatten()
        .chain(self.params.iter().cloned())
        .collect()
    }
}

impl WorkloadConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn profile(&self, workload: &str) -> Result<&WorkloadProfile, ConfigErrors> {
        self.workloads
            .get(workload)
            .ok_or_else(|| ConfigErrors::UnknownWorkload(workload.to_string()))
    }

    /// returns true if the config contains an error for the selected workload
    pub fn preflight_checks(&self, workload: &str) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.threads.is_empty() {
            error!("database.threads is empty, there is nothing to sweep over");
            contains_error = true;
        }

        if self.threads.contains(&0) {
            error!("database.threads contains 0, every run needs at least one thread");
            contains_error = true;
        }

        match self.workloads.get(workload) {
            None => {
                error!(
                    "Workload {workload} is not defined, known workloads: {}",
                    self.workloads.keys().join(", ")
                );
                contains_error = true;
            }
            Some(profile) => {
                if profile.tiers.is_empty() {
                    error!("database.workloads.{workload}.tiers is empty");
                    contains_error = true;
                }

                let mut names = BTreeSet::new();
                let mut reports = BTreeSet::new();
                let output = normalize(&self.output);

                for tier in profile.tiers.iter() {
                    if !names.insert(tier.name.as_str()) {
                        error!("Tier {} is defined twice in {workload}", tier.name);
                        contains_error = true;
                    }

                    // tiers sharing a report would mix their results
                    let report = normalize(&tier.report);

                    if !reports.insert(report.clone()) {
                        error!(
                            "Tier {} reuses report {}",
                            tier.name,
                            tier.report.to_string_lossy()
                        );
                        contains_error = true;
                    }

                    if report == output {
                        error!(
                            "Tier {} reports into the per-run output {}",
                            tier.name,
                            self.output.to_string_lossy()
                        );
                        contains_error = true;
                    }
                }
            }
        }

        match check_executable(&self.exec) {
            Ok(true) => {}
            Ok(false) => warn!(
                "{} is not executable, every run will fail",
                self.exec.to_string_lossy()
            ),
            Err(e) => warn!(
                "Failed to find database.exec ({}): {e}. Every run will fail",
                self.exec.to_string_lossy()
            ),
        }

        contains_error
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            exec: default_database_exec(),
            output: default_output(),
            threads: default_database_threads(),
            settle_ms: default_database_settle(),
            timeout: None,
            workload: default_workload(),
            workloads: default_workloads(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StmConfig {
    // directory that holds the `<family>-<implementation>` binaries
    #[serde(default = "default_bin")]
    pub bin: PathBuf,
    // seconds per run, passed on to the binaries
    #[serde(default = "default_duration")]
    pub duration: u64,
    // the binaries report the median over all runs
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default = "default_stm_threads")]
    pub threads: Vec<u32>,
    // write ratios in permils
    #[serde(default = "default_ratios")]
    pub ratios: Vec<u32>,
    #[serde(default = "default_implementations")]
    pub implementations: Vec<String>,
    #[serde(default = "default_families")]
    pub families: Vec<Family>,
    #[serde(default)]
    pub settle_ms: u64,
    // seconds, no timeout if unset
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Family {
    pub prefix: String,
    // no `--keys` flag if unset, the binary picks its own key count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<u64>,
    // replaces the shared thread list for this family only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<Vec<u32>>,
    // replaces the shared write ratios for this family only, an empty list omits `--ratios`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratios: Option<Vec<u32>>,
    #[serde(default = "default_true")]
    pub runs: bool,
    // stdout of every binary in this family is appended here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
}

/// executable name of `implementation` within `family`
pub fn executable_name(family: &str, implementation: &str) -> String {
    format!("{family}-{implementation}")
}

impl StmConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn executable(&self, family: &Family, implementation: &str) -> PathBuf {
        self.bin.join(executable_name(&family.prefix, implementation))
    }

    /// shared sweep flags combined with the settings of `family`
    pub fn flags(&self, family: &Family) -> Vec<String> {
        let threads = family.threads.as_ref().unwrap_or(&self.threads);
        let ratios = family.ratios.as_ref().unwrap_or(&self.ratios);
        let mut flags = vec![format!("--duration={}", self.duration)];

        if family.runs {
            flags.push(format!("--runs={}", self.runs));
        }

        flags.push(format!("--threads={}", threads.iter().join(",")));

        if !ratios.is_empty() {
            flags.push(format!("--ratios={}", ratios.iter().join(",")));
        }

        if let Some(keys) = family.keys {
            flags.push(format!("--keys={keys}"));
        }

        flags
    }

    /// returns true if the config contains an error
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.threads.is_empty() || self.threads.contains(&0) {
            error!("stm.threads must be a non-empty list of positive thread counts");
            contains_error = true;
        }

        if self.implementations.is_empty() {
            error!("stm.implementations is empty, unable to build a queue of runs");
            contains_error = true;
        }

        if self.families.is_empty() {
            error!("stm.families is empty, unable to build a queue of runs");
            contains_error = true;
        }

        for implementation in self.implementations.iter() {
            if implementation.is_empty() || implementation.contains('/') {
                error!("stm.implementations contains an invalid tag '{implementation}'");
                contains_error = true;
            }
        }

        let ratios = self
            .families
            .iter()
            .filter_map(|family| family.ratios.as_ref())
            .chain(std::iter::once(&self.ratios));

        for ratio in ratios.flatten() {
            if *ratio > 1000 {
                error!("Write ratio {ratio} is out of range, ratios are given in permils");
                contains_error = true;
            }
        }

        for family in self.families.iter() {
            if family.prefix.is_empty() {
                error!("stm.families contains a family without a prefix");
                contains_error = true;
            }

            if let Some(threads) = &family.threads {
                if threads.is_empty() || threads.contains(&0) {
                    error!(
                        "stm.families.{}.threads must be a non-empty list of positive thread counts",
                        family.prefix
                    );
                    contains_error = true;
                }
            }

            if family.keys == Some(0) {
                error!("stm.families.{}.keys cannot be 0", family.prefix);
                contains_error = true;
            }
        }

        if !self.bin.is_dir() {
            warn!(
                "stm.bin ({}) is not a directory, every run will fail",
                self.bin.to_string_lossy()
            );
        } else {
            let missing = self
                .families
                .iter()
                .cartesian_product(self.implementations.iter())
                .map(|(family, implementation)| self.executable(family, implementation))
                .filter(|exec| !matches!(check_executable(exec), Ok(true)))
                .collect_vec();

            for exec in missing {
                warn!("{} is missing or not executable", exec.to_string_lossy());
            }
        }

        contains_error
    }
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            duration: default_duration(),
            runs: default_runs(),
            threads: default_stm_threads(),
            ratios: default_ratios(),
            implementations: default_implementations(),
            families: default_families(),
            settle_ms: 0,
            timeout: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    // pristine header, copied over `header` before every job
    #[serde(default = "default_template")]
    pub template: PathBuf,
    #[serde(default = "default_header")]
    pub header: PathBuf,
    #[serde(default = "default_build")]
    pub build: Vec<String>,
    #[serde(default = "default_clean")]
    pub clean: Vec<String>,
    #[serde(default = "default_database_exec")]
    pub exec: PathBuf,
    #[serde(default = "default_core_count")]
    pub core_count: u32,
    // seconds per run
    #[serde(default = "default_verify_timeout")]
    pub timeout: u64,
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    #[serde(default = "default_verify_workloads")]
    pub workloads: Vec<String>,
    #[serde(default = "default_build_log")]
    pub build_log: PathBuf,
    // a run passes if its stdout contains this marker
    #[serde(default = "default_pass_marker")]
    pub pass_marker: String,
}

impl VerifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// returns true if the config contains an error
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.build.is_empty() || self.clean.is_empty() {
            error!("verify.build and verify.clean must name a command");
            contains_error = true;
        }

        if !self.template.is_file() {
            error!(
                "verify.template ({}) was not found",
                self.template.to_string_lossy()
            );
            contains_error = true;
        }

        if self.template == self.header {
            error!("verify.template and verify.header must be different files");
            contains_error = true;
        }

        if self.algorithms.is_empty() || self.workloads.is_empty() {
            error!("verify.algorithms and verify.workloads must not be empty");
            contains_error = true;
        }

        if self.timeout == 0 {
            error!("verify.timeout cannot be 0");
            contains_error = true;
        }

        contains_error
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            header: default_header(),
            build: default_build(),
            clean: default_clean(),
            exec: default_database_exec(),
            core_count: default_core_count(),
            timeout: default_verify_timeout(),
            algorithms: default_algorithms(),
            workloads: default_verify_workloads(),
            build_log: default_build_log(),
            pass_marker: default_pass_marker(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_database_exec() -> PathBuf {
    PathBuf::from("./rundb")
}

fn default_output() -> PathBuf {
    PathBuf::from("output.txt")
}

fn default_database_threads() -> Vec<u32> {
    vec![1, 4, 8, 16, 32, 48, 56, 64]
}

fn default_database_settle() -> u64 {
    1000
}

fn default_workload() -> String {
    "ycsb".to_string()
}

fn ycsb_tier(name: &str, read: f64, write: f64, range: u64, skew: f64) -> Tier {
    Tier {
        name: name.to_string(),
        report: PathBuf::from(format!("ycsb-{name}-results.txt")),
        read_ratio: Some(read),
        write_ratio: Some(write),
        range: Some(range),
        skew: Some(skew),
        warehouses: None,
        params: Vec::new(),
    }
}

fn default_workloads() -> BTreeMap<String, WorkloadProfile> {
    let ycsb = WorkloadProfile {
        notice: Some(
            "Make sure rundb was built with `#define WORKLOAD YCSB` and `ABORT_BUFFER_ENABLE false` in config.h"
                .to_string(),
        ),
        tiers: vec![
            ycsb_tier("high", 0.5, 0.5, 16, 0.9),
            ycsb_tier("med", 0.9, 0.1, 16, 0.8),
            ycsb_tier("low", 1.0, 0.0, 2, 0.0),
        ],
    };
    let tpcc = WorkloadProfile {
        notice: Some("Make sure rundb was built with `#define WORKLOAD TPCC` in config.h".to_string()),
        tiers: vec![Tier {
            name: "high".to_string(),
            report: PathBuf::from("tpcc-results.txt"),
            read_ratio: None,
            write_ratio: None,
            range: None,
            skew: None,
            warehouses: Some(4),
            params: Vec::new(),
        }],
    };

    BTreeMap::from([("ycsb".to_string(), ycsb), ("tpcc".to_string(), tpcc)])
}

fn default_bin() -> PathBuf {
    PathBuf::from("bin/")
}

fn default_duration() -> u64 {
    20
}

fn default_runs() -> u32 {
    1
}

fn default_stm_threads() -> Vec<u32> {
    vec![1, 4, 8, 12, 16, 24, 32, 40, 48, 56, 64]
}

fn default_ratios() -> Vec<u32> {
    vec![1000, 200, 0]
}

fn default_implementations() -> Vec<String> {
    strings(&[
        "2plsf",
        "tiny",
        "tl2orig",
        "tlrweager",
        "oreceager",
        "ofwf",
        "tl2",
        "oreclazy",
        "2plundo",
        "2plundodist",
    ])
}

fn set_family(prefix: &str, keys: u64) -> Family {
    Family {
        prefix: prefix.to_string(),
        keys: Some(keys),
        threads: None,
        ratios: None,
        runs: true,
        log: None,
    }
}

fn map_family(prefix: &str) -> Family {
    Family {
        prefix: prefix.to_string(),
        keys: Some(100_000),
        threads: None,
        ratios: Some(vec![1000]),
        runs: false,
        log: None,
    }
}

fn default_families() -> Vec<Family> {
    vec![
        set_family("set-ravl-1m", 1_000_000),
        set_family("set-skiplist-1m", 1_000_000),
        set_family("set-ziptree-1m", 1_000_000),
        set_family("set-hash-10k", 10_000),
        map_family("map-ravl"),
        map_family("map-skiplist"),
        map_family("map-ziptree"),
    ]
}

fn default_template() -> PathBuf {
    PathBuf::from("config-std.h")
}

fn default_header() -> PathBuf {
    PathBuf::from("config.h")
}

fn default_build() -> Vec<String> {
    strings(&["make", "-j8"])
}

fn default_clean() -> Vec<String> {
    strings(&["make", "clean"])
}

fn default_core_count() -> u32 {
    4
}

fn default_verify_timeout() -> u64 {
    10
}

fn default_algorithms() -> Vec<String> {
    strings(&["DL_DETECT", "NO_WAIT", "HEKATON", "SILO", "TICTOC"])
}

fn default_verify_workloads() -> Vec<String> {
    strings(&["YCSB", "TPCC"])
}

fn default_build_log() -> PathBuf {
    PathBuf::from("temp.out")
}

fn default_pass_marker() -> String {
    "PASS".to_string()
}
