// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::ManagerSettings;
use crate::exec::CommandTemplates;
use crate::routing::{Route, Routes};
use crate::staging::StageOptions;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [general]
/// home_store = "hq"
///
/// [store.hq]
/// path = ".convoy/hq.json"
/// prefix = "hq-"
///
/// [store.gastown]
/// path = ".convoy/gastown.json"
/// prefix = "gt-"
///
/// [[route]]
/// prefix = "gt-"
/// store = "gastown"
/// target = "gastown"
///
/// [targets]
/// paused = []
///
/// [feeder]
/// poll_interval = "5s"
///
/// [dispatch]
/// command = "gt sling {item} {target}"
/// ```
///
/// Every section except `[store.*]` is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub general: GeneralSection,

    #[serde(default)]
    pub store: BTreeMap<String, StoreSection>,

    #[serde(default)]
    pub route: Vec<RouteSection>,

    #[serde(default)]
    pub targets: TargetsSection,

    #[serde(default)]
    pub staging: StagingSection,

    #[serde(default)]
    pub feeder: FeederSection,

    #[serde(default)]
    pub scanner: ScannerSection,

    #[serde(default)]
    pub dispatch: DispatchSection,
}

impl Default for RawConfigFile {
    /// A single local store whose items dispatch to a `local` target.
    fn default() -> Self {
        let mut store = BTreeMap::new();
        store.insert(
            "local".to_string(),
            StoreSection {
                path: PathBuf::from(".convoy/local.json"),
                prefix: "lc-".to_string(),
            },
        );
        Self {
            general: GeneralSection {
                home_store: "local".to_string(),
            },
            store,
            route: vec![RouteSection {
                prefix: "lc-".to_string(),
                store: "local".to_string(),
                target: Some("local".to_string()),
            }],
            targets: TargetsSection::default(),
            staging: StagingSection::default(),
            feeder: FeederSection::default(),
            scanner: ScannerSection::default(),
            dispatch: DispatchSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSection {
    /// Store holding convoys and unrouted ids.
    #[serde(default = "default_home_store")]
    pub home_store: String,
}

fn default_home_store() -> String {
    "hq".to_string()
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            home_store: default_home_store(),
        }
    }
}

/// `[store.<name>]`: a JSON-file backed store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Relative paths resolve against the config file's directory.
    pub path: PathBuf,
    /// Prefix for ids this store generates.
    pub prefix: String,
}

/// `[[route]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSection {
    pub prefix: String,
    pub store: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsSection {
    #[serde(default)]
    pub paused: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingSection {
    /// `0` disables the oversized-wave warning.
    #[serde(default = "default_max_wave_size")]
    pub max_wave_size: usize,
}

fn default_max_wave_size() -> usize {
    10
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            max_wave_size: default_max_wave_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeederSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Per-call bound on store queries made by the feeders.
    #[serde(default = "default_store_timeout")]
    pub store_timeout: String,
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_store_timeout() -> String {
    "10s".to_string()
}

impl Default for FeederSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            store_timeout: default_store_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerSection {
    #[serde(default = "default_scan_interval")]
    pub scan_interval: String,
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval: String,
    #[serde(default = "default_startup_grace")]
    pub startup_grace: String,
}

fn default_scan_interval() -> String {
    "30s".to_string()
}

fn default_recovery_interval() -> String {
    "10s".to_string()
}

fn default_startup_grace() -> String {
    "60s".to_string()
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            recovery_interval: default_recovery_interval(),
            startup_grace: default_startup_grace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    /// `{item}` and `{target}` are substituted.
    #[serde(default = "default_dispatch_command")]
    pub command: String,
    /// Must print the stranded JSON list on stdout.
    #[serde(default = "default_stranded_command")]
    pub stranded_command: String,
    /// `{convoy}` is substituted.
    #[serde(default = "default_check_command")]
    pub check_command: String,
    #[serde(default = "default_dispatch_timeout")]
    pub timeout: String,
}

fn default_dispatch_command() -> String {
    "gt sling {item} {target}".to_string()
}

fn default_stranded_command() -> String {
    "convoy stranded --json".to_string()
}

fn default_check_command() -> String {
    "convoy check {convoy}".to_string()
}

fn default_dispatch_timeout() -> String {
    "2m".to_string()
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            command: default_dispatch_command(),
            stranded_command: default_stranded_command(),
            check_command: default_check_command(),
            timeout: default_dispatch_timeout(),
        }
    }
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub home_store: String,
    pub stores: BTreeMap<String, StoreSection>,
    pub routes: Vec<Route>,
    pub paused_targets: Vec<String>,
    pub max_wave_size: usize,
    pub manager: ManagerSettings,
    pub templates: CommandTemplates,
    pub dispatch_timeout: Duration,
}

impl ConfigFile {
    pub fn routing(&self) -> Routes {
        Routes::new(
            self.home_store.clone(),
            self.routes.clone(),
            self.paused_targets.iter().cloned(),
        )
    }

    pub fn stage_options(&self, title: Option<String>) -> StageOptions {
        StageOptions {
            max_wave_size: self.max_wave_size,
            title,
        }
    }
}
