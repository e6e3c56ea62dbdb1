// Persisted user preferences over a string key/value store.
// Unreadable values are logged and replaced by defaults; nothing here fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const KEY_ENABLED: &str = "guide.enabled";
pub const KEY_NARRATION_ENABLED: &str = "guide.narration.enabled";
pub const KEY_VOLUME: &str = "guide.narration.volume";
pub const KEY_VOICE: &str = "guide.narration.voice";

/// Host persistence (localStorage in the browser).
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

/// In-memory store for hosts without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Master feature flag.
    pub enabled: bool,
    pub narration_enabled: bool,
    /// 0.0 to 1.0.
    pub volume: f32,
    pub preferred_voice: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            enabled: true,
            narration_enabled: true,
            volume: 1.0,
            preferred_voice: None,
        }
    }
}

impl Preferences {
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let defaults = Preferences::default();
        Preferences {
            enabled: read_bool(store, KEY_ENABLED, defaults.enabled),
            narration_enabled: read_bool(store, KEY_NARRATION_ENABLED, defaults.narration_enabled),
            volume: read_volume(store, defaults.volume),
            preferred_voice: store
                .get(KEY_VOICE)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) {
        store.set(KEY_ENABLED, &self.enabled.to_string());
        store.set(KEY_NARRATION_ENABLED, &self.narration_enabled.to_string());
        store.set(KEY_VOLUME, &self.volume.to_string());
        store.set(KEY_VOICE, self.preferred_voice.as_deref().unwrap_or(""));
    }
}

fn read_bool(store: &dyn PreferenceStore, key: &str, default: bool) -> bool {
    let Some(raw) = store.get(key) else {
        return default;
    };
    match raw.trim() {
        "true" | "1" => true,
        "false" | "0" => false,
        other => {
            tracing::warn!(key, value = other, "unreadable preference; using default");
            default
        }
    }
}

fn read_volume(store: &dyn PreferenceStore, default: f32) -> f32 {
    let Some(raw) = store.get(KEY_VOLUME) else {
        return default;
    };
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => {
            tracing::warn!(key = KEY_VOLUME, value = %raw, "unreadable preference; using default");
            default
        }
    }
}
