// src/config/validate.rs

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::ManagerSettings;
use crate::errors::{ConvoyError, Result};
use crate::exec::CommandTemplates;
use crate::routing::Route;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConvoyError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_stores(&raw)?;
        validate_stores(&raw)?;
        validate_routes(&raw)?;
        validate_paused_targets(&raw)?;
        validate_dispatch(&raw)?;

        let manager = ManagerSettings {
            poll_interval: nonzero_duration("feeder.poll_interval", &raw.feeder.poll_interval)?,
            store_timeout: nonzero_duration("feeder.store_timeout", &raw.feeder.store_timeout)?,
            scan_interval: nonzero_duration("scanner.scan_interval", &raw.scanner.scan_interval)?,
            recovery_interval: nonzero_duration(
                "scanner.recovery_interval",
                &raw.scanner.recovery_interval,
            )?,
            startup_grace: duration("scanner.startup_grace", &raw.scanner.startup_grace)?,
        };
        if manager.recovery_interval > manager.scan_interval {
            return Err(ConvoyError::ConfigError(format!(
                "[scanner].recovery_interval ({:?}) must not exceed scan_interval ({:?})",
                manager.recovery_interval, manager.scan_interval
            )));
        }
        let dispatch_timeout = nonzero_duration("dispatch.timeout", &raw.dispatch.timeout)?;

        let routes = raw
            .route
            .into_iter()
            .map(|r| Route {
                prefix: r.prefix,
                store: r.store,
                target: r.target,
            })
            .collect();

        Ok(ConfigFile {
            home_store: raw.general.home_store,
            stores: raw.store,
            routes,
            paused_targets: raw.targets.paused,
            max_wave_size: raw.staging.max_wave_size,
            manager,
            templates: CommandTemplates {
                dispatch: raw.dispatch.command,
                stranded: raw.dispatch.stranded_command,
                check: raw.dispatch.check_command,
            },
            dispatch_timeout,
        })
    }
}

fn ensure_has_stores(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.is_empty() {
        return Err(ConvoyError::ConfigError(
            "config must contain at least one [store.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_stores(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.store.contains_key(&cfg.general.home_store) {
        return Err(ConvoyError::ConfigError(format!(
            "[general].home_store '{}' is not a configured store",
            cfg.general.home_store
        )));
    }
    let mut prefixes = BTreeSet::new();
    for (name, store) in &cfg.store {
        if store.prefix.trim().is_empty() {
            return Err(ConvoyError::ConfigError(format!(
                "store '{name}' must have a non-empty prefix"
            )));
        }
        if !prefixes.insert(store.prefix.as_str()) {
            return Err(ConvoyError::ConfigError(format!(
                "store '{name}' reuses id prefix '{}'",
                store.prefix
            )));
        }
    }
    Ok(())
}

fn validate_routes(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = BTreeSet::new();
    for route in &cfg.route {
        if route.prefix.trim().is_empty() {
            return Err(ConvoyError::ConfigError(
                "[[route]] entries must have a non-empty prefix".to_string(),
            ));
        }
        if !seen.insert(route.prefix.as_str()) {
            return Err(ConvoyError::ConfigError(format!(
                "prefix '{}' is routed more than once",
                route.prefix
            )));
        }
        if !cfg.store.contains_key(&route.store) {
            return Err(ConvoyError::ConfigError(format!(
                "route '{}' has unknown store '{}'",
                route.prefix, route.store
            )));
        }
        if route.target.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ConvoyError::ConfigError(format!(
                "route '{}' has an empty target",
                route.prefix
            )));
        }
    }
    Ok(())
}

fn validate_paused_targets(cfg: &RawConfigFile) -> Result<()> {
    let known: BTreeSet<&str> = cfg.route.iter().filter_map(|r| r.target.as_deref()).collect();
    for paused in &cfg.targets.paused {
        if !known.contains(paused.as_str()) {
            return Err(ConvoyError::ConfigError(format!(
                "[targets].paused names unknown target '{paused}'"
            )));
        }
    }
    Ok(())
}

fn validate_dispatch(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.dispatch.command.contains("{item}") {
        return Err(ConvoyError::ConfigError(
            "[dispatch].command must contain the {item} placeholder".to_string(),
        ));
    }
    if cfg.dispatch.stranded_command.trim().is_empty() {
        return Err(ConvoyError::ConfigError(
            "[dispatch].stranded_command must not be empty".to_string(),
        ));
    }
    if !cfg.dispatch.check_command.contains("{convoy}") {
        return Err(ConvoyError::ConfigError(
            "[dispatch].check_command must contain the {convoy} placeholder".to_string(),
        ));
    }
    Ok(())
}

fn nonzero_duration(key: &str, raw: &str) -> Result<Duration> {
    let d = duration(key, raw)?;
    if d.is_zero() {
        return Err(ConvoyError::ConfigError(format!("{key} must be greater than zero")));
    }
    Ok(d)
}

fn duration(key: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| ConvoyError::ConfigError(format!("{key}: {e}")))
}

/// Parse `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
