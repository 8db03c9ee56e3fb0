//! TOML-based application configuration.
//!
//! Stores operator-tunable settings including:
//! - Geofence defaults for new gyms (radius, minimum stay)
//! - Reward amounts and the multiplier stacking policy
//! - The gym-local day boundary offset
//!
//! Configuration is stored at `~/.config/gymtally/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::day::DayBoundary;
use crate::ledger::StackingPolicy;

/// Geofence defaults applied when a gym does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,
    #[serde(default = "default_min_stay_min")]
    pub default_min_stay_min: i64,
}

/// Reward amounts and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Tokens for one confirmed visit, before multipliers.
    #[serde(default = "default_attendance_tokens")]
    pub attendance_tokens: i64,
    /// Tokens for reaching the weekly goal.
    #[serde(default = "default_weekly_bonus_tokens")]
    pub weekly_bonus_tokens: i64,
    /// Tokens carried by the audit entry of a consumed recovery item.
    #[serde(default)]
    pub streak_recovery_tokens: i64,
    /// Weekly goal used for members who have not set their own.
    #[serde(default = "default_weekly_goal")]
    pub default_weekly_goal: u32,
    /// How overlapping multipliers combine.
    #[serde(default)]
    pub stacking_policy: StackingPolicy,
}

/// Day boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayConfig {
    /// Fixed UTC offset, in whole hours, defining the gym-local day.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/gymtally/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub day: DayConfig,
}

// Default functions
fn default_radius_m() -> f64 {
    180.0
}
fn default_min_stay_min() -> i64 {
    20
}
fn default_attendance_tokens() -> i64 {
    10
}
fn default_weekly_bonus_tokens() -> i64 {
    50
}
fn default_weekly_goal() -> u32 {
    3
}
fn default_utc_offset_hours() -> i32 {
    DayBoundary::DEFAULT_UTC_OFFSET_HOURS
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            default_radius_m: default_radius_m(),
            default_min_stay_min: default_min_stay_min(),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            attendance_tokens: default_attendance_tokens(),
            weekly_bonus_tokens: default_weekly_bonus_tokens(),
            streak_recovery_tokens: 0,
            default_weekly_goal: default_weekly_goal(),
            stacking_policy: StackingPolicy::default(),
        }
    }
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geofence: GeofenceConfig::default(),
            rewards: RewardsConfig::default(),
            day: DayConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| format!("cannot parse '{value}' as number"))?
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }

    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Day boundary built from the configured offset.
    ///
    /// Falls back to the stock offset when the configured one is out of
    /// chrono's representable range.
    pub fn day_boundary(&self) -> DayBoundary {
        DayBoundary::from_offset_hours(self.day.utc_offset_hours).unwrap_or_else(|| {
            tracing::warn!(
                "Configured UTC offset {} is out of range, using {}",
                self.day.utc_offset_hours,
                DayBoundary::DEFAULT_UTC_OFFSET_HOURS
            );
            DayBoundary::default()
        })
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
