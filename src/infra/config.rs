//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/default.toml

use crate::domain::track::EmbeddingSelection;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// How a frame is tested against zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneTest {
    /// Bounding box intersects the zone (edge touching counts)
    Bbox,
    /// Box center strictly inside the zone
    Center,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier echoed in the run report
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "site".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_trajectories_dir")]
    pub trajectories_dir: String,
    #[serde(default = "default_zones_file")]
    pub zones_file: String,
    #[serde(default = "default_camera_network_file")]
    pub camera_network_file: String,
    /// Raw events input (used when re-analysis is disabled)
    #[serde(default = "default_events_file")]
    pub events_file: String,
    /// Enriched, deduplicated events output
    #[serde(default = "default_output_events_file")]
    pub output_events_file: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            trajectories_dir: default_trajectories_dir(),
            zones_file: default_zones_file(),
            camera_network_file: default_camera_network_file(),
            events_file: default_events_file(),
            output_events_file: default_output_events_file(),
            report_file: default_report_file(),
        }
    }
}

fn default_trajectories_dir() -> String {
    "data/trajectories".to_string()
}

fn default_zones_file() -> String {
    "data/zones.json".to_string()
}

fn default_camera_network_file() -> String {
    "data/camera_network.json".to_string()
}

fn default_events_file() -> String {
    "outputs/events/events.jsonl".to_string()
}

fn default_output_events_file() -> String {
    "outputs/events/events_correlated.jsonl".to_string()
}

fn default_report_file() -> String {
    "outputs/reports/run_report.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Cosine distance below which an embedding joins an identity
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Ring buffer size per identity
    #[serde(default = "default_max_embeddings")]
    pub max_embeddings: usize,
    #[serde(default)]
    pub embedding: EmbeddingSelection,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_embeddings: default_max_embeddings(),
            embedding: EmbeddingSelection::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.3
}

fn default_max_embeddings() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntrusionConfig {
    /// Dwell time (seconds) before an intrusion is confirmed
    #[serde(default)]
    pub min_duration_s: f64,
    /// Only tracks of this class are scanned
    #[serde(default = "default_class_name")]
    pub class_name: String,
    #[serde(default = "default_zone_test")]
    pub zone_test: ZoneTest,
    /// Rebuild events from trajectories instead of reading `paths.events_file`
    #[serde(default = "default_reanalyze")]
    pub reanalyze: bool,
}

impl Default for IntrusionConfig {
    fn default() -> Self {
        Self {
            min_duration_s: 0.0,
            class_name: default_class_name(),
            zone_test: default_zone_test(),
            reanalyze: default_reanalyze(),
        }
    }
}

fn default_class_name() -> String {
    "person".to_string()
}

fn default_zone_test() -> ZoneTest {
    ZoneTest::Bbox
}

fn default_reanalyze() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_dedup_enabled")]
    pub dedup_enabled: bool,
    /// Max t_sync gap (seconds) between duplicate events
    #[serde(default = "default_dedup_window_s")]
    pub dedup_window_s: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { dedup_enabled: default_dedup_enabled(), dedup_window_s: default_dedup_window_s() }
    }
}

fn default_dedup_enabled() -> bool {
    true
}

fn default_dedup_window_s() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub intrusion: IntrusionConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    trajectories_dir: String,
    zones_file: String,
    camera_network_file: String,
    events_file: String,
    output_events_file: String,
    report_file: String,
    match_threshold: f64,
    max_embeddings: usize,
    embedding_selection: EmbeddingSelection,
    min_duration_s: f64,
    intrusion_class: String,
    zone_test: ZoneTest,
    reanalyze: bool,
    dedup_enabled: bool,
    dedup_window_s: f64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            trajectories_dir: toml_config.paths.trajectories_dir,
            zones_file: toml_config.paths.zones_file,
            camera_network_file: toml_config.paths.camera_network_file,
            events_file: toml_config.paths.events_file,
            output_events_file: toml_config.paths.output_events_file,
            report_file: toml_config.paths.report_file,
            match_threshold: toml_config.matching.threshold,
            // A zero-sized ring would drop every embedding on insert
            max_embeddings: toml_config.matching.max_embeddings.max(1),
            embedding_selection: toml_config.matching.embedding,
            min_duration_s: toml_config.intrusion.min_duration_s,
            intrusion_class: toml_config.intrusion.class_name,
            zone_test: toml_config.intrusion.zone_test,
            reanalyze: toml_config.intrusion.reanalyze,
            dedup_enabled: toml_config.correlation.dedup_enabled,
            dedup_window_s: toml_config.correlation.dedup_window_s,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/default.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - resolves the path from args/env first
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn trajectories_dir(&self) -> &str {
        &self.trajectories_dir
    }

    pub fn zones_file(&self) -> &str {
        &self.zones_file
    }

    pub fn camera_network_file(&self) -> &str {
        &self.camera_network_file
    }

    pub fn events_file(&self) -> &str {
        &self.events_file
    }

    pub fn output_events_file(&self) -> &str {
        &self.output_events_file
    }

    pub fn report_file(&self) -> &str {
        &self.report_file
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn max_embeddings(&self) -> usize {
        self.max_embeddings
    }

    pub fn embedding_selection(&self) -> EmbeddingSelection {
        self.embedding_selection
    }

    pub fn min_duration_s(&self) -> f64 {
        self.min_duration_s
    }

    pub fn intrusion_class(&self) -> &str {
        &self.intrusion_class
    }

    pub fn zone_test(&self) -> ZoneTest {
        self.zone_test
    }

    pub fn reanalyze(&self) -> bool {
        self.reanalyze
    }

    pub fn dedup_enabled(&self) -> bool {
        self.dedup_enabled
    }

    pub fn dedup_window_s(&self) -> f64 {
        self.dedup_window_s
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the match threshold (CLI flag, tests)
    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Builder method to override the confirmation dwell time
    pub fn with_min_duration_s(mut self, seconds: f64) -> Self {
        self.min_duration_s = seconds;
        self
    }

    /// Builder method to point every path below one data root (tests)
    pub fn with_root(mut self, root: &Path) -> Self {
        let join = |p: &str| root.join(p).display().to_string();
        self.trajectories_dir = join("trajectories");
        self.zones_file = join("zones.json");
        self.camera_network_file = join("camera_network.json");
        self.events_file = join("events.jsonl");
        self.output_events_file = join("events_correlated.jsonl");
        self.report_file = join("run_report.json");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "site");
        assert_eq!(config.match_threshold(), 0.3);
        assert_eq!(config.max_embeddings(), 10);
        assert_eq!(config.embedding_selection(), EmbeddingSelection::First);
        assert_eq!(config.min_duration_s(), 0.0);
        assert_eq!(config.intrusion_class(), "person");
        assert_eq!(config.zone_test(), ZoneTest::Bbox);
        assert!(config.reanalyze());
        assert!(config.dedup_enabled());
        assert_eq!(config.dedup_window_s(), 2.0);
        assert_eq!(config.trajectories_dir(), "data/trajectories");
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[matching]
threshold = 0.45
embedding = "mean"

[intrusion]
zone_test = "center"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.match_threshold(), 0.45);
        assert_eq!(config.embedding_selection(), EmbeddingSelection::Mean);
        assert_eq!(config.max_embeddings(), 10);
        assert_eq!(config.zone_test(), ZoneTest::Center);
        assert_eq!(config.dedup_window_s(), 2.0);
    }

    #[test]
    fn test_missing_site_table_keeps_default_id() {
        let toml_config: TomlConfig = toml::from_str("[matching]\nthreshold = 0.2\n").unwrap();
        assert_eq!(toml_config.site.id, "site");
        assert_eq!(SiteConfig::default().id, "site");
    }

    #[test]
    fn test_zero_ring_size_is_clamped() {
        let toml_config: TomlConfig = toml::from_str("[matching]\nmax_embeddings = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.max_embeddings(), 1);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "intrusion-correlator".to_string(),
            "--config".to_string(),
            "config/site_a.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/site_a.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["intrusion-correlator".to_string(), "--config=config/b.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/b.toml");
    }

    #[test]
    fn test_with_root() {
        let config = Config::default().with_root(Path::new("/tmp/run"));
        assert!(config.zones_file().ends_with("zones.json"));
        assert!(config.trajectories_dir().starts_with("/tmp/run"));
    }
}
