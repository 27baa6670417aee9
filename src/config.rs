use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const CONFLICTS_SETTINGS_KEY: &str = "setup.conflicts";

/// Env var holding the command line of the external text-completion program.
pub const GENERATOR_ENV: &str = "TIMETABLED_GENERATOR";

/// Thresholds below which a teacher or room value is treated as partially
/// typed input that must not produce a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    pub teacher_min_length: usize,
    pub room_min_length: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            teacher_min_length: 2,
            room_min_length: 1,
        }
    }
}

impl DetectorConfig {
    pub fn to_json(self) -> Value {
        json!({
            "teacherMinLength": self.teacher_min_length,
            "roomMinLength": self.room_min_length,
        })
    }

    /// Applies a partial update, rejecting unknown keys and out-of-range values.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "teacherMinLength" => self.teacher_min_length = parse_len(v, k)?,
                "roomMinLength" => self.room_min_length = parse_len(v, k)?,
                _ => return Err(format!("unknown conflicts field: {}", k)),
            }
        }
        Ok(())
    }

    /// Defaults overlaid with whatever valid values the workspace has saved.
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(saved) = db::settings_get_json(conn, CONFLICTS_SETTINGS_KEY)? {
            if let Some(obj) = saved.as_object() {
                let mut candidate = cfg;
                if candidate.merge_patch(obj).is_ok() {
                    cfg = candidate;
                } else {
                    tracing::warn!("ignoring malformed {} settings", CONFLICTS_SETTINGS_KEY);
                }
            }
        }
        Ok(cfg)
    }

    pub fn load_or_default(conn: Option<&Connection>) -> Self {
        match conn {
            Some(c) => Self::load(c).unwrap_or_default(),
            None => Self::default(),
        }
    }
}

fn parse_len(v: &Value, key: &str) -> Result<usize, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(0..=32).contains(&n) {
        return Err(format!("{} must be in 0..=32", key));
    }
    Ok(n as usize)
}

/// Command line for the generator process, split on whitespace.
pub fn generator_command_from_env() -> Option<Vec<String>> {
    let raw = std::env::var(GENERATOR_ENV).ok()?;
    let parts: Vec<String> = raw.split_whitespace().map(|s| s.to_string()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
