//! Persisted user settings.
//!
//! Settings live in a small key-value store behind [`SettingsStore`]:
//!
//! | Key | Value |
//! |-----|-------|
//! | `chatSettings` | [`Settings`] object |
//! | `openMode` | [`OpenMode`](crate::launch::OpenMode) name |
//! | `ark_overlay_width:{host}` | Overlay width in pixels |
//!
//! [`JsonFileStore`] keeps the whole map in one JSON file; [`MemoryStore`]
//! keeps it in memory.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::gateway::{ChatMode, DEFAULT_GATEWAY_URL};

// ============================================================================
// Constants
// ============================================================================

/// Store key of the [`Settings`] object.
pub const SETTINGS_KEY: &str = "chatSettings";

/// Narrowest overlay, in pixels.
pub const MIN_OVERLAY_WIDTH: u32 = 360;

/// Widest overlay as a percentage of the viewport.
pub const MAX_OVERLAY_WIDTH_PERCENT: u32 = 86;

const OVERLAY_WIDTH_PREFIX: &str = "ark_overlay_width:";

// ============================================================================
// Settings
// ============================================================================

/// Gateway connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Gateway base URL.
    pub gateway_url: String,
    /// Token sent in secure mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Starting chat mode.
    pub chat_mode: ChatMode,
    /// Last save, in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            bearer_token: None,
            chat_mode: ChatMode::Open,
            updated_at: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("gateway_url", &self.gateway_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("chat_mode", &self.chat_mode)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Settings {
    /// Loads settings, falling back to defaults when none are stored.
    ///
    /// A stored value that does not parse is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        let Some(value) = store.get(SETTINGS_KEY)? else {
            return Ok(Self::default());
        };

        match serde_json::from_value(value) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(error = %e, "Stored settings unreadable, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Stamps `updated_at` and saves.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save(&mut self, store: &dyn SettingsStore) -> Result<()> {
        self.updated_at = Some(now_millis());
        store.set(SETTINGS_KEY, serde_json::to_value(&*self)?)?;
        debug!(gateway_url = %self.gateway_url, "Settings saved");
        Ok(())
    }

    /// Removes stored settings so the next load yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn reset(store: &dyn SettingsStore) -> Result<()> {
        store.remove(SETTINGS_KEY)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// ============================================================================
// Overlay Width
// ============================================================================

/// Store key for the overlay width remembered for `host`.
///
/// An empty host maps to `default`.
#[must_use]
pub fn overlay_width_key(host: &str) -> String {
    let host = if host.is_empty() { "default" } else { host };
    format!("{OVERLAY_WIDTH_PREFIX}{host}")
}

/// Clamps `width` to `[360, floor(viewport_width * 0.86)]`.
///
/// The lower bound wins on narrow viewports.
#[must_use]
pub fn clamp_overlay_width(width: u32, viewport_width: u32) -> u32 {
    let max = u64::from(viewport_width) * u64::from(MAX_OVERLAY_WIDTH_PERCENT) / 100;
    let max = u32::try_from(max).unwrap_or(u32::MAX);
    width.min(max).max(MIN_OVERLAY_WIDTH)
}

/// Reads the remembered width for `host`, clamped to the viewport.
///
/// Returns `None` if nothing usable is stored.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn load_overlay_width(
    store: &dyn SettingsStore,
    host: &str,
    viewport_width: u32,
) -> Result<Option<u32>> {
    let saved = store
        .get(&overlay_width_key(host))?
        .and_then(|v| v.as_f64())
        .filter(|w| *w > 0.0);

    // float-to-int `as` saturates
    Ok(saved.map(|w| clamp_overlay_width(w as u32, viewport_width)))
}

/// Remembers `width` for `host`.
///
/// # Errors
///
/// Returns an error if the store cannot be written.
pub fn save_overlay_width(store: &dyn SettingsStore, host: &str, width: u32) -> Result<()> {
    store.set(&overlay_width_key(host), Value::from(width))
}

// ============================================================================
// SettingsStore
// ============================================================================

/// Key-value storage for settings.
pub trait SettingsStore: Send + Sync {
    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Deletes a key. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn remove(&self, key: &str) -> Result<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Store persisted as a single JSON object on disk.
///
/// Every write rewrites the file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::config(format!(
                        "settings file {} is not a JSON object",
                        path.display()
                    )));
                }
            }
        } else {
            Map::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "Settings store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_overlay_width_key() {
        assert_eq!(overlay_width_key("shop.test:8080"), "ark_overlay_width:shop.test:8080");
        assert_eq!(overlay_width_key(""), "ark_overlay_width:default");
    }

    #[test]
    fn test_clamp_overlay_width() {
        assert_eq!(clamp_overlay_width(500, 1280), 500);
        assert_eq!(clamp_overlay_width(2000, 1280), 1100);
        assert_eq!(clamp_overlay_width(100, 1280), 360);
        // narrow viewport: the minimum wins
        assert_eq!(clamp_overlay_width(800, 300), 360);
    }

    #[test]
    fn test_overlay_width_round_trip_is_clamped() {
        let store = MemoryStore::new();
        assert_eq!(load_overlay_width(&store, "a.test", 1280).unwrap(), None);

        save_overlay_width(&store, "a.test", 1500).unwrap();
        assert_eq!(load_overlay_width(&store, "a.test", 1280).unwrap(), Some(1100));
        assert_eq!(load_overlay_width(&store, "a.test", 2000).unwrap(), Some(1500));
    }

    #[test]
    fn test_overlay_width_ignores_non_numbers() {
        let store = MemoryStore::new();
        store.set(&overlay_width_key("a.test"), json!("wide")).unwrap();
        assert_eq!(load_overlay_width(&store, "a.test", 1280).unwrap(), None);

        store.set(&overlay_width_key("a.test"), json!(0)).unwrap();
        assert_eq!(load_overlay_width(&store, "a.test", 1280).unwrap(), None);
    }

    #[test]
    fn test_settings_defaults_and_camel_case() {
        let settings = Settings::default();
        assert_eq!(settings.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(settings.chat_mode, ChatMode::Open);

        let parsed: Settings =
            serde_json::from_value(json!({"gatewayUrl": "https://gw.test", "chatMode": "secure"}))
                .unwrap();
        assert_eq!(parsed.gateway_url, "https://gw.test");
        assert_eq!(parsed.chat_mode, ChatMode::Secure);
        assert_eq!(parsed.bearer_token, None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = Settings {
            bearer_token: Some("hunter2".into()),
            ..Settings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_load_garbage_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(SETTINGS_KEY, json!([1, 2, 3])).unwrap();
        assert_eq!(Settings::load(&store).unwrap(), Settings::default());
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            let mut settings = Settings {
                gateway_url: "https://gw.test".into(),
                bearer_token: Some("t".into()),
                ..Settings::default()
            };
            settings.save(&store).unwrap();
            assert!(settings.updated_at.is_some());
        }

        let store = JsonFileStore::open(&path).unwrap();
        let loaded = Settings::load(&store).unwrap();
        assert_eq!(loaded.gateway_url, "https://gw.test");
        assert_eq!(loaded.bearer_token.as_deref(), Some("t"));

        Settings::reset(&store).unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(Settings::load(&reopened).unwrap(), Settings::default());
    }

    #[test]
    fn test_file_store_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[]").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
