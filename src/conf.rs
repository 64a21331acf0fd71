//! The configuration loader. Three layers, lowest
//! precedence first: built-in defaults, an optional YAML file, then
//! `REPEATER_`-prefixed process environment variables. `.env` is loaded
//! (via `dotenv`, in `main.rs`) before the environment layer is read, so a
//! `.env` file next to the binary behaves exactly like exported variables.
//!
//! This mirrors the original PXE tool's env-prefix-plus-YAML layering
//! (`ENV_VAR_PREFIX`, `from_yaml_config`) but is rebuilt as a single
//! `Conf` struct implementing `ConfigStore` directly, rather than a
//! separate env/yaml/merge trio: the bridge's configuration surface is a
//! handful of scalar fields, not the PXE server's per-interface tables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use yaml_rust2::YamlLoader;

use crate::traits::ConfigStore;

pub const ENV_VAR_PREFIX: &str = "REPEATER_";

const DEFAULT_AP_SSID: &str = "repeater";
const DEFAULT_AP_PASSWORD: &str = "repeater123";
const DEFAULT_TX_POWER_DBM: u8 = 20;
const DEFAULT_MAX_CLIENTS: u8 = 4;

#[derive(Debug, Clone)]
pub struct Conf {
    upstream_ssid: String,
    upstream_password: String,
    ap_ssid: String,
    ap_password: String,
    tx_power_dbm: u8,
    max_clients: u8,
}

impl Default for Conf {
    fn default() -> Self {
        Conf {
            upstream_ssid: String::new(),
            upstream_password: String::new(),
            ap_ssid: DEFAULT_AP_SSID.into(),
            ap_password: DEFAULT_AP_PASSWORD.into(),
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl Conf {
    /// The default YAML path: `<config dir>/repeater-bridge/config.yaml`,
    /// when `dirs::config_dir()` resolves on this platform.
    pub fn default_yaml_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("repeater-bridge").join("config.yaml"))
    }

    /// Layer 2: load a `default:` document out of a YAML file. Missing
    /// file or unparsable YAML is an error here; the caller falls back
    /// to defaults-plus-env rather than treating it as "no override".
    pub fn from_yaml_config(path: Option<&PathBuf>) -> Result<Conf> {
        let path = path.cloned().or_else(Self::default_yaml_path);
        let Some(path) = path else {
            bail!("no YAML configuration path available");
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let docs = YamlLoader::load_from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let doc = docs.first().ok_or_else(|| anyhow!("{} has no YAML document", path.display()))?;
        let section = &doc["default"];

        let mut conf = Conf::default();
        if let Some(v) = section["upstream_ssid"].as_str() {
            conf.upstream_ssid = v.to_string();
        }
        if let Some(v) = section["upstream_password"].as_str() {
            conf.upstream_password = v.to_string();
        }
        if let Some(v) = section["ap_ssid"].as_str() {
            conf.ap_ssid = v.to_string();
        }
        if let Some(v) = section["ap_password"].as_str() {
            conf.ap_password = v.to_string();
        }
        if let Some(v) = section["tx_power_dbm"].as_i64() {
            conf.tx_power_dbm = v.clamp(0, u8::MAX as i64) as u8;
        }
        if let Some(v) = section["max_clients"].as_i64() {
            conf.max_clients = v.clamp(0, u8::MAX as i64) as u8;
        }
        Ok(conf)
    }

    /// Layer 3: read `REPEATER_*` from the process environment, on top
    /// of whatever `base` already carries (defaults or a loaded YAML).
    pub fn merge_process_env(mut self) -> Conf {
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}UPSTREAM_SSID")) {
            self.upstream_ssid = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}UPSTREAM_PASSWORD")) {
            self.upstream_password = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}AP_SSID")) {
            self.ap_ssid = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}AP_PASSWORD")) {
            self.ap_password = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}TX_POWER_DBM")) {
            if let Ok(parsed) = v.parse() {
                self.tx_power_dbm = parsed;
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_VAR_PREFIX}MAX_CLIENTS")) {
            if let Ok(parsed) = v.parse() {
                self.max_clients = parsed;
            }
        }
        self
    }

    /// The full three-layer load: defaults, optional YAML (logged and
    /// skipped on failure rather than aborting startup), then env.
    pub fn load(yaml_path: Option<&PathBuf>) -> Conf {
        let base = Conf::from_yaml_config(yaml_path).unwrap_or_else(|e| {
            log::info!("not loading YAML configuration: {e}; falling back to defaults + environment");
            Conf::default()
        });
        base.merge_process_env()
    }

    /// Reject configurations the engine cannot run with. SSIDs may
    /// not be empty, tx power must fall within the 802.11 2.4 GHz legal
    /// range used by the radio driver, and at least one client must be
    /// permitted.
    pub fn validate(&self) -> Result<()> {
        if self.upstream_ssid.trim().is_empty() {
            bail!("no upstream SSID configured");
        }
        if self.ap_ssid.trim().is_empty() {
            bail!("no AP SSID configured");
        }
        if self.tx_power_dbm == 0 || self.tx_power_dbm > 20 {
            bail!("tx_power_dbm {} out of range (1..=20)", self.tx_power_dbm);
        }
        if self.max_clients == 0 {
            bail!("max_clients must be at least 1");
        }
        Ok(())
    }
}

impl ConfigStore for Conf {
    fn upstream_ssid(&self) -> &str {
        &self.upstream_ssid
    }

    fn upstream_password(&self) -> &str {
        &self.upstream_password
    }

    fn ap_ssid(&self) -> &str {
        &self.ap_ssid
    }

    fn ap_password(&self) -> &str {
        &self.ap_password
    }

    fn tx_power_dbm(&self) -> u8 {
        self.tx_power_dbm
    }

    fn max_clients(&self) -> u8 {
        self.max_clients
    }
}
