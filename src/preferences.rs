/*!
 * Persisted user preferences.
 *
 * Two free-form string preferences are kept: the model identifier and the
 * target language. A blank value is never written and never returned as the
 * effective value; the built-in default takes its place.
 */

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::{Config, DEFAULT_MODEL, DEFAULT_TARGET_LANGUAGE};
use crate::errors::PreferenceError;

/// Storage key for the model identifier
pub const MODEL_KEY: &str = "ollama-translator-model";

/// Storage key for the target language
pub const TARGET_LANGUAGE_KEY: &str = "ollama-translator-target-language";

/// Raw key-value storage behind [`Preferences`]
pub trait PreferenceStore: Send + Sync + Debug {
    /// Read the raw stored value for `key`
    fn load(&self, key: &str) -> Result<Option<String>, PreferenceError>;

    /// Store `value` under `key`
    fn save(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// Volatile store, used by tests and when no preference file is wanted
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON file store holding a flat string map
///
/// The whole map is cached in memory and rewritten on every save.
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl JsonFilePreferenceStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferenceError> {
        let path = path.into();
        let cache = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Loaded {} preference(s) from {}", cache.len(), path.display());

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&*cache)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Typed access to the two session preferences with default substitution
#[derive(Debug, Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
    default_model: String,
    default_target_language: String,
}

impl Preferences {
    /// Preferences over `store` with the built-in defaults
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            default_model: DEFAULT_MODEL.to_string(),
            default_target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
        }
    }

    /// Preferences over `store` with defaults taken from the configuration
    pub fn with_config(store: Arc<dyn PreferenceStore>, config: &Config) -> Self {
        let mut preferences = Self::new(store);
        if !config.default_model.trim().is_empty() {
            preferences.default_model = config.default_model.trim().to_string();
        }
        if !config.default_target_language.trim().is_empty() {
            preferences.default_target_language = config.default_target_language.trim().to_string();
        }
        preferences
    }

    /// In-memory preferences with built-in defaults
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferenceStore::new()))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_target_language(&self) -> &str {
        &self.default_target_language
    }

    /// Effective model identifier
    pub fn model(&self) -> String {
        self.get(MODEL_KEY, &self.default_model)
    }

    /// Effective target language
    pub fn target_language(&self) -> String {
        self.get(TARGET_LANGUAGE_KEY, &self.default_target_language)
    }

    pub fn set_model(&self, value: &str) {
        self.set(MODEL_KEY, value);
    }

    pub fn set_target_language(&self, value: &str) {
        self.set(TARGET_LANGUAGE_KEY, value);
    }

    fn get(&self, key: &str, default: &str) -> String {
        match self.store.load(key) {
            Ok(Some(value)) if !value.trim().is_empty() => value.trim().to_string(),
            Ok(_) => default.to_string(),
            Err(e) => {
                warn!("Failed to read preference '{}': {}", key, e);
                default.to_string()
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            debug!("Ignoring blank value for preference '{}'", key);
            return;
        }
        if let Err(e) = self.store.save(key, trimmed) {
            warn!("Failed to persist preference '{}': {}", key, e);
        }
    }
}
