#![deny(warnings)]

//! YAML scenario files: discovery, parsing and validation.

use serde::Deserialize;
use sim_core::{validate_scenario, ConfigError, MasterData, ScenarioConfig};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid scenario file: {0}")]
    Parse(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ScenarioError {
    fn from(e: serde_yaml::Error) -> Self {
        ScenarioError::Parse(e.to_string())
    }
}

/// A parsed scenario together with its validated master data.
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub path: Option<PathBuf>,
    pub config: ScenarioConfig,
    pub master: MasterData,
}

/// Parse and validate scenario YAML.
pub fn parse_scenario(text: &str) -> Result<LoadedScenario, ScenarioError> {
    let config: ScenarioConfig = serde_yaml::from_str(text)?;
    let master = validate_scenario(&config)?;
    Ok(LoadedScenario {
        path: None,
        config,
        master,
    })
}

/// Read, parse and validate a scenario file.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<LoadedScenario, ScenarioError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut loaded = parse_scenario(&text)?;
    info!(
        path = %path.display(),
        lines = loaded.master.lines().len(),
        equipment = loaded.master.equipment().len(),
        products = loaded.master.products().len(),
        "loaded scenario"
    );
    loaded.path = Some(path.to_path_buf());
    Ok(loaded)
}

/// Header fields used when listing scenarios without fully validating them.
#[derive(Debug, Clone, Deserialize)]
struct ScenarioHeader {
    horizon: sim_core::Horizon,
}

/// Scenario file found in a directory.
#[derive(Debug, Clone)]
pub struct ScenarioEntry {
    pub path: PathBuf,
    pub horizon: sim_core::Horizon,
}

/// List `*.yaml` / `*.yml` scenarios in `dir`, sorted by file name. Files
/// without a readable horizon are skipped.
pub fn list_scenarios<P: AsRef<Path>>(dir: P) -> Result<Vec<ScenarioEntry>, ScenarioError> {
    let mut out = Vec::new();
    for ent in fs::read_dir(dir.as_ref())? {
        let ent = ent?;
        if !ent.file_type()?.is_file() {
            continue;
        }
        let path = ent.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if !is_yaml {
            continue;
        }
        let text = fs::read_to_string(&path)?;
        if let Ok(h) = serde_yaml::from_str::<ScenarioHeader>(&text) {
            out.push(ScenarioEntry {
                path,
                horizon: h.horizon,
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}
