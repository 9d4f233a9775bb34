use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HarnessMode {
    SingleShot,
    Persistent,
}

fn default_harness_mode() -> HarnessMode {
    HarnessMode::SingleShot
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    #[serde(default = "default_harness_mode")]
    pub mode: HarnessMode,
    /// Seed file to replay; stdin when absent.
    pub input_file: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: default_harness_mode(),
            input_file: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LocalFuzzSettings {
    #[serde(default = "default_iterations")]
    pub max_iterations: u64,
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
    pub crash_dir: Option<PathBuf>,
}

pub fn default_iterations() -> u64 {
    50_000
}

pub fn default_rng_seed() -> u64 {
    0
}

impl Default for LocalFuzzSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_iterations(),
            rng_seed: default_rng_seed(),
            crash_dir: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Test selector (name or index); the first registered test when absent.
    pub test: Option<String>,
    pub run: Option<RunSettings>,
    pub fuzz: Option<LocalFuzzSettings>,
}

impl HarnessConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading harness config {path:?}"))?;
        toml::from_str(&raw).with_context(|| format!("harness config {path:?} is not valid TOML"))
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test: None,
            run: Some(RunSettings::default()),
            fuzz: Some(LocalFuzzSettings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_a_full_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gauntlet.toml");
        fs::write(
            &path,
            r#"
test = "sort-idempotent"

[run]
mode = "persistent"

[fuzz]
max-iterations = 1234
rng-seed = 9
crash-dir = "crashes"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load_from_file(&path).unwrap();
        assert_eq!(config.test.as_deref(), Some("sort-idempotent"));
        assert_eq!(config.run.unwrap().mode, HarnessMode::Persistent);
        let fuzz = config.fuzz.unwrap();
        assert_eq!(fuzz.max_iterations, 1234);
        assert_eq!(fuzz.rng_seed, 9);
        assert_eq!(fuzz.crash_dir, Some(PathBuf::from("crashes")));
        dir.close().unwrap();
    }

    #[test]
    fn omitted_fields_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("minimal.toml");
        fs::write(&path, "[fuzz]\n").unwrap();

        let config = HarnessConfig::load_from_file(&path).unwrap();
        assert!(config.test.is_none());
        let fuzz = config.fuzz.unwrap();
        assert_eq!(fuzz.max_iterations, default_iterations());
        assert_eq!(fuzz.rng_seed, default_rng_seed());
        dir.close().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("typo.toml");
        fs::write(&path, "[run]\nmoed = \"persistent\"\n").unwrap();
        assert!(HarnessConfig::load_from_file(&path).is_err());
        dir.close().unwrap();
    }

    #[test]
    fn missing_files_surface_a_readable_error() {
        let path = PathBuf::from("/definitely/not/here.toml");
        let error = HarnessConfig::load_from_file(&path).unwrap_err();
        assert!(error.to_string().contains("reading harness config"));
    }
}
