//! `app_config.json` loading, defaults and validation.
//!
//! The configuration is read once at startup and published through
//! [`get_config`]; nothing reloads it afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::general::queue::DEFAULT_CAPACITY;
use crate::midi::sysex::SysExLayout;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub app_options: AppOptions,
    #[serde(default)]
    pub midi_options: MidiOptions,
    #[serde(default)]
    pub osc_options: OscOptions,
    /// Directory of the config file, for resolving relative paths.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppOptions {
    pub application_name: String,
    pub log_level: String,
    pub templates_file: PathBuf,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            application_name: "ah-midi-osc".to_string(),
            log_level: "info".to_string(),
            templates_file: PathBuf::from("templates.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MidiOptions {
    /// Substring of the input port name.
    pub control_port_name: String,
    pub queue_size_limit: usize,
    pub nrpn_timeout_ms: u64,
    pub sysex_disable: bool,
    pub max_sysex_len: usize,
    pub sysex_layouts: Vec<SysExLayout>,
}

impl Default for MidiOptions {
    fn default() -> Self {
        Self {
            control_port_name: String::new(),
            queue_size_limit: DEFAULT_CAPACITY,
            nrpn_timeout_ms: 80,
            sysex_disable: false,
            max_sysex_len: 4096,
            sysex_layouts: SysExLayout::defaults(),
        }
    }
}

impl MidiOptions {
    pub fn nrpn_timeout(&self) -> Duration {
        Duration::from_millis(self.nrpn_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetOptions {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OscOptions {
    pub targets: BTreeMap<String, TargetOptions>,
    pub send_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub target_queue_capacity: usize,
    pub listen: Option<ListenOptions>,
}

impl Default for OscOptions {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            send_timeout_ms: 250,
            shutdown_grace_ms: 500,
            target_queue_capacity: 1024,
            listen: None,
        }
    }
}

impl OscOptions {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
    All,
}

/// mDNS advertisement of the bridge's own OSC endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenOptions {
    pub svc_name: String,
    pub svc_port: u16,
    #[serde(default = "default_svc_type")]
    pub svc_type: String,
    /// Host name to advertise; the machine's host name when unset.
    #[serde(default)]
    pub svc_addr: Option<String>,
    #[serde(default)]
    pub svc_props: HashMap<String, String>,
    #[serde(default = "default_ipver")]
    pub svc_ipver: IpVersion,
}

fn default_svc_type() -> String {
    "_osc._udp.local.".to_string()
}

fn default_ipver() -> IpVersion {
    IpVersion::All
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason: &str| {
            Err(ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        let midi = &self.midi_options;
        if midi.queue_size_limit == 0 {
            return invalid("midi_options.queue_size_limit", "must be greater than zero");
        }
        if midi.nrpn_timeout_ms == 0 {
            return invalid("midi_options.nrpn_timeout_ms", "must be greater than zero");
        }
        if midi.max_sysex_len < 2 {
            return invalid("midi_options.max_sysex_len", "must allow at least F0 and F7");
        }
        if midi.sysex_layouts.iter().any(|l| l.manufacturer.is_empty()) {
            return invalid("midi_options.sysex_layouts", "manufacturer id cannot be empty");
        }
        if midi.sysex_layouts.iter().any(|l| l.manufacturer.iter().any(|b| *b > 0x7F)) {
            return invalid("midi_options.sysex_layouts", "manufacturer id bytes are 7-bit");
        }

        let osc = &self.osc_options;
        if osc.targets.is_empty() {
            return invalid("osc_options.targets", "at least one target is required");
        }
        if let Some((name, _)) = osc.targets.iter().find(|(_, t)| t.address.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "osc_options.targets",
                reason: format!("target '{}' has no address", name),
            });
        }
        if let Some((name, _)) = osc.targets.iter().find(|(_, t)| t.port == 0) {
            return Err(ConfigError::Invalid {
                key: "osc_options.targets",
                reason: format!("target '{}' has port 0", name),
            });
        }
        if osc.target_queue_capacity == 0 {
            return invalid("osc_options.target_queue_capacity", "must be greater than zero");
        }
        if osc.send_timeout_ms == 0 {
            return invalid("osc_options.send_timeout_ms", "must be greater than zero");
        }
        if let Some(listen) = &osc.listen {
            if listen.svc_name.trim().is_empty() {
                return invalid("osc_options.listen.svc_name", "cannot be empty");
            }
            if listen.svc_port == 0 {
                return invalid("osc_options.listen.svc_port", "cannot be 0");
            }
            if !listen.svc_type.ends_with(".local.") {
                return invalid("osc_options.listen.svc_type", "must end with '.local.'");
            }
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        self.app_options
            .log_level
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "app_options.log_level",
                reason: format!("unknown level '{}'", self.app_options.log_level),
            })
    }

    pub fn templates_path(&self) -> PathBuf {
        self.base_dir.join(&self.app_options.templates_file)
    }
}

/// Publish the loaded configuration. Returns it back if one is already set.
pub fn init_config(config: AppConfig) -> Result<&'static AppConfig, AppConfig> {
    CONFIG.set(config)?;
    Ok(get_config())
}

/// The configuration published by [`init_config`], or the defaults if
/// nothing was published yet.
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(|| AppConfig {
        app_options: AppOptions::default(),
        midi_options: MidiOptions::default(),
        osc_options: OscOptions::default(),
        base_dir: PathBuf::new(),
    })
}
