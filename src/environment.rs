//! Host environment snapshot
//!
//! The pieces of the connect payload that come from the process
//! environment: reported hostname (with the Heroku dyno rules), the
//! `NEW_RELIC_METADATA_*` passthrough block, the environment key-value
//! list, and a minimal utilization stub. Full OS utilization probing is a
//! collaborator concern; its output slots into [`UtilizationData`].

use crate::config::AgentConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;

pub const METADATA_PREFIX: &str = "NEW_RELIC_METADATA_";

/// `NEW_RELIC_METADATA_*` variables, copied verbatim (sorted for
/// deterministic payloads).
pub fn metadata_env() -> BTreeMap<String, String> {
    metadata_from(env::vars())
}

fn metadata_from(vars: impl Iterator<Item = (String, String)>) -> BTreeMap<String, String> {
    vars.filter(|(k, _)| k.starts_with(METADATA_PREFIX))
        .collect()
}

/// Reported hostname: config override, then the Heroku dyno name (with
/// prefix collapsing), then the OS hostname.
pub fn hostname(config: &AgentConfig) -> String {
    if let Some(h) = &config.hostname {
        return h.clone();
    }
    if config.heroku.use_dyno_names {
        if let Ok(dyno) = env::var("DYNO") {
            return collapse_dyno(&dyno, &config.heroku.dyno_name_prefixes_to_shorten);
        }
    }
    os_hostname()
}

/// `scheduler.7341` collapses to `scheduler.*` when "scheduler" is a
/// configured prefix; unknown prefixes pass through whole.
pub fn collapse_dyno(dyno: &str, prefixes: &[String]) -> String {
    for prefix in prefixes {
        if dyno
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
        {
            return format!("{prefix}.*");
        }
    }
    dyno.to_string()
}

fn os_hostname() -> String {
    if let Ok(h) = env::var("HOSTNAME") {
        if !h.is_empty() {
            return h;
        }
    }
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Environment key-value list sent in the connect payload.
pub fn environment_entries() -> Vec<(String, String)> {
    vec![
        ("runtime.compiler".to_string(), "rustc".to_string()),
        ("runtime.arch".to_string(), env::consts::ARCH.to_string()),
        ("runtime.os".to_string(), env::consts::OS.to_string()),
    ]
}

/// Utilization block. The OS probe collaborator fills in what it can; the
/// agent only guarantees the metadata version and hostname.
#[derive(Debug, Clone, Serialize)]
pub struct UtilizationData {
    pub metadata_version: u32,
    pub logical_processors: Option<usize>,
    pub total_ram_mib: Option<u64>,
    pub hostname: String,
}

impl UtilizationData {
    pub fn detect(hostname: String) -> Self {
        UtilizationData {
            metadata_version: 5,
            logical_processors: std::thread::available_parallelism().ok().map(|n| n.get()),
            total_ram_mib: None,
            hostname,
        }
    }
}
