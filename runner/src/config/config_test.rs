use super::{compile_filter, executable_name, normalize, Family, SweepConfig};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[test]
pub fn defaults_match_the_ycsb_tiers() {
    let config = SweepConfig::default();
    let profile = config.database.profile("ycsb").unwrap();
    let flags = profile
        .tiers
        .iter()
        .map(|tier| (tier.name.as_str(), tier.flags().join(" ")))
        .collect::<Vec<_>>();

    assert_eq!(
        flags,
        vec![
            ("high", "-r0.5 -w0.5 -R16 -z0.9".to_string()),
            ("med", "-r0.9 -w0.1 -R16 -z0.8".to_string()),
            ("low", "-r1 -w0 -R2 -z0".to_string()),
        ]
    );
    assert_eq!(
        profile.tiers[0].report,
        PathBuf::from("ycsb-high-results.txt")
    );
}

#[test]
pub fn tpcc_tier_only_sets_warehouses() {
    let config = SweepConfig::default();
    let profile = config.database.profile("tpcc").unwrap();

    assert_eq!(profile.tiers.len(), 1);
    assert_eq!(profile.tiers[0].flags(), vec!["-n4".to_string()]);
}

#[test]
pub fn unknown_workload_is_an_error() {
    let config = SweepConfig::default();

    assert!(config.database.profile("tatp").is_err());
    assert!(config.database.preflight_checks("tatp"));
}

#[test]
pub fn executable_name_is_a_plain_concatenation() {
    assert_eq!(executable_name("set-ravl-1m", "2plsf"), "set-ravl-1m-2plsf");
    assert_eq!(executable_name("map-ziptree", "tl2"), "map-ziptree-tl2");
}

#[test]
pub fn family_flags_do_not_leak() {
    let config = SweepConfig::default().stm;
    let set = &config.families[0];
    let hash = &config.families[3];
    let map = &config.families[4];

    assert_eq!(
        config.flags(set),
        vec![
            "--duration=20",
            "--runs=1",
            "--threads=1,4,8,12,16,24,32,40,48,56,64",
            "--ratios=1000,200,0",
            "--keys=1000000",
        ]
    );
    assert_eq!(config.flags(hash).last().unwrap(), "--keys=10000");

    let map_flags = config.flags(map);
    assert!(!map_flags.iter().any(|flag| flag.starts_with("--runs")));
    assert!(map_flags.contains(&"--ratios=1000".to_string()));
    assert!(map_flags.contains(&"--keys=100000".to_string()));

    // the map override must not change the shared ratios
    assert!(config
        .flags(set)
        .contains(&"--ratios=1000,200,0".to_string()));
}

#[test]
pub fn partial_yaml_keeps_defaults() {
    let yaml = r#"
db:
  threads: [1, 2]
  settle_ms: 0
stm:
  implementations: [tiny]
  families:
    - prefix: part-disjoint
      keys: 1000
      log: latency.log
"#;
    let config: SweepConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.database.threads, vec![1, 2]);
    assert_eq!(config.database.exec, PathBuf::from("./rundb"));
    assert_eq!(config.database.workloads.len(), 2);
    assert_eq!(config.stm.duration, 20);
    assert!(config.stm.families[0].runs);
    assert_eq!(
        config.stm.families[0].log,
        Some(PathBuf::from("latency.log"))
    );
    assert_eq!(config.verify.algorithms.len(), 5);
}

#[test]
pub fn unknown_fields_are_rejected() {
    let yaml = "db:\n  thread: [1]\n";

    assert!(serde_yaml::from_str::<SweepConfig>(yaml).is_err());
}

#[test]
pub fn load_reads_yaml_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.yaml");
    fs::write(&path, "stm:\n  duration: 5\n").unwrap();

    let config = SweepConfig::load(Some(path.as_path())).unwrap();

    assert_eq!(config.stm.duration, 5);
    assert!(SweepConfig::load(Some(dir.path().join("missing.yaml").as_path())).is_err());
}

#[test]
pub fn default_config_survives_a_yaml_roundtrip() {
    let config = SweepConfig::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: SweepConfig = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(parsed.database.workloads, config.database.workloads);
    assert_eq!(parsed.stm.families, config.stm.families);
}

#[test]
pub fn shared_reports_fail_preflight() {
    let mut config = SweepConfig::default().database;
    let profile = config.workloads.get_mut("ycsb").unwrap();
    profile.tiers[1].report = profile.tiers[0].report.clone();

    assert!(config.preflight_checks("ycsb"));
}

#[test]
pub fn defaults_pass_preflight_without_binaries() {
    // missing executables only produce warnings
    assert!(!SweepConfig::default().database.preflight_checks("ycsb"));
    assert!(!SweepConfig::default().stm.preflight_checks());
}

#[test]
pub fn out_of_range_ratio_fails_preflight() {
    let mut config = SweepConfig::default().stm;
    config.families[0].ratios = Some(vec![1001]);

    assert!(config.preflight_checks());
}

#[test]
pub fn filters_compile_and_match() {
    let matcher = compile_filter(Some("set-*-2pl*")).unwrap().unwrap();

    assert!(matcher.is_match("set-ravl-1m-2plsf"));
    assert!(!matcher.is_match("map-ravl-2plsf"));
    assert!(compile_filter(None).unwrap().is_none());
    assert!(compile_filter(Some("[")).is_err());
}

#[test]
pub fn example_config_parses() {
    let config: SweepConfig =
        serde_yaml::from_str(include_str!("../../../sweep.example.yaml")).unwrap();

    assert_eq!(config.database.workloads["ycsb"].tiers.len(), 3);
    assert_eq!(config.stm.families.len(), 7);
    assert_eq!(
        config.stm.flags(&config.stm.families[6]),
        SweepConfig::default().stm.flags(&SweepConfig::default().stm.families[6])
    );
}

#[test]
pub fn latency_family_from_the_example_config() {
    let example = include_str!("../../../sweep.example.yaml");
    let line = example
        .lines()
        .find(|line| line.contains("prefix: part-disjoint"))
        .unwrap()
        .trim_start()
        .trim_start_matches("# - ");
    let family: Family = serde_yaml::from_str(line).unwrap();
    let config = SweepConfig::default().stm;

    assert_eq!(family.keys, None);
    assert_eq!(family.log, Some(PathBuf::from("latency.log")));
    assert_eq!(
        config.flags(&family),
        vec!["--duration=20", "--threads=1,4,8,16,24,32"]
    );
}

#[test]
pub fn family_thread_overrides_are_checked() {
    let mut config = SweepConfig::default().stm;
    config.bin = PathBuf::from("/nonexistent/bin");
    assert!(!config.preflight_checks());

    config.families[0].threads = Some(vec![1, 0]);
    assert!(config.preflight_checks());

    config.families[0].threads = Some(Vec::new());
    assert!(config.preflight_checks());

    config.families[0].threads = None;
    config.families[0].keys = Some(0);
    assert!(config.preflight_checks());
}

#[test]
pub fn differently_spelled_paths_fail_preflight() {
    let mut config = SweepConfig::default().database;
    config.output = PathBuf::from("output.txt");
    config.workloads.get_mut("tpcc").unwrap().tiers[0].report = PathBuf::from("./output.txt");

    assert!(config.preflight_checks("tpcc"));

    let mut config = SweepConfig::default().database;
    let profile = config.workloads.get_mut("ycsb").unwrap();
    profile.tiers[0].report = PathBuf::from("a.txt");
    profile.tiers[1].report = PathBuf::from("./a.txt");

    assert!(config.preflight_checks("ycsb"));
}

#[test]
pub fn normalize_drops_current_dir_components() {
    assert_eq!(
        normalize(Path::new("./output.txt")),
        normalize(Path::new("output.txt"))
    );
    assert!(normalize(Path::new("output.txt")).is_absolute());
}
