// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Garbage collector configuration.
//!
//! Values come from `BROOKLYN_GC_*` environment variables or from a property
//! map using the `gc.*` keys (optionally prefixed with `brooklyn.`). Durations
//! accept a number with an optional unit: `500ms`, `30s`, `5m`, `2h`, `30d`.
//! A bare number is read as seconds.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

/// Immutable garbage collector settings. The collector takes a copy at the
/// start of every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Interval between periodic collections.
    pub period: Duration,
    /// Completed root tasks older than this are deleted.
    pub max_task_age: Duration,
    /// Cap per non-entity tag.
    pub max_tasks_per_tag: usize,
    /// Cap per display name within a tag.
    pub max_tasks_per_name: usize,
    /// Cap per entity tag.
    pub max_tasks_per_entity: usize,
    /// Cap over the whole registry.
    pub max_tasks_global: usize,
    /// Compact registry indexes after each collection.
    pub do_system_gc: bool,
    /// Re-check submitter liveness during the sweep, not only on completion.
    pub check_subtask_submitters: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),                  // 1 minute
            max_task_age: Duration::from_secs(30 * 24 * 3600), // 30 days
            max_tasks_per_tag: 50,
            max_tasks_per_name: 10,
            max_tasks_per_entity: 1000,
            max_tasks_global: 100_000,
            do_system_gc: false,
            check_subtask_submitters: true,
        }
    }
}

const KEYS: [(&str, &str); 8] = [
    ("gc.period", "BROOKLYN_GC_PERIOD"),
    ("gc.maxTaskAge", "BROOKLYN_GC_MAX_TASK_AGE"),
    ("gc.maxTasksPerTag", "BROOKLYN_GC_MAX_TASKS_PER_TAG"),
    ("gc.maxTasksPerName", "BROOKLYN_GC_MAX_TASKS_PER_NAME"),
    ("gc.maxTasksPerEntity", "BROOKLYN_GC_MAX_TASKS_PER_ENTITY"),
    ("gc.maxTasksGlobal", "BROOKLYN_GC_MAX_TASKS_GLOBAL"),
    ("gc.doSystemGc", "BROOKLYN_GC_DO_SYSTEM_GC"),
    ("gc.checkSubtaskSubmitters", "BROOKLYN_GC_CHECK_SUBTASK_SUBMITTERS"),
];

impl GcConfig {
    /// Load configuration from environment variables, defaulting anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|_, env_key| std::env::var(env_key).ok())
    }

    /// Load configuration from a property map keyed by `gc.*` or
    /// `brooklyn.gc.*`.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key, _| {
            props
                .get(key)
                .or_else(|| props.get(&format!("brooklyn.{key}")))
                .cloned()
        })
    }

    fn from_lookup(lookup: impl Fn(&'static str, &'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |i: usize| lookup(KEYS[i].0, KEYS[i].1);

        Ok(Self {
            period: get(0)
                .map(|v| parse_duration(&v))
                .transpose()?
                .unwrap_or(defaults.period),
            max_task_age: get(1)
                .map(|v| parse_duration(&v))
                .transpose()?
                .unwrap_or(defaults.max_task_age),
            max_tasks_per_tag: parse_count(KEYS[2].0, get(2))?.unwrap_or(defaults.max_tasks_per_tag),
            max_tasks_per_name: parse_count(KEYS[3].0, get(3))?.unwrap_or(defaults.max_tasks_per_name),
            max_tasks_per_entity: parse_count(KEYS[4].0, get(4))?.unwrap_or(defaults.max_tasks_per_entity),
            max_tasks_global: parse_count(KEYS[5].0, get(5))?.unwrap_or(defaults.max_tasks_global),
            do_system_gc: parse_bool(KEYS[6].0, get(6))?.unwrap_or(defaults.do_system_gc),
            check_subtask_submitters: parse_bool(KEYS[7].0, get(7))?
                .unwrap_or(defaults.check_subtask_submitters),
        })
    }
}

fn parse_count(key: &'static str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid(key, v.clone()))
        })
        .transpose()
}

fn parse_bool(key: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid(key, v.clone())),
        })
        .transpose()
}

/// Parse `"30d"`, `"5m"`, `"250ms"`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let invalid = || ConfigError::Duration(value.to_string());
    let amount: u64 = number.parse().map_err(|_| invalid())?;

    let seconds_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 24 * 3600,
        _ => return Err(invalid()),
    };
    let seconds = amount.checked_mul(seconds_per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_secs(seconds))
}
