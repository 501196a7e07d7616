//! JSON-based configuration model and persistence.
//!
//! Reads and writes the VKVM config to the platform-appropriate location:
//! - Windows:  `%APPDATA%\vkvm\config.json`
//! - macOS:    `~/Library/Application Support/vkvm/config.json`
//! - elsewhere: `~/.config/vkvm/config.json` (honoring `XDG_CONFIG_HOME`)
//!
//! Profiles are authoritative on the host; agents receive them over the
//! control channel (`sync_resp`) and persist a local copy so hotkeys keep
//! working across restarts while the host is unreachable.
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "...")]` use the given
//! function's return value when absent from the JSON file. This keeps the
//! app working on first run (no file yet) and when upgrading from an older
//! config that lacks newer fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoConfigDir,

    /// A file system error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON content could not be parsed or serialized.
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Schema types ──────────────────────────────────────────────────────────────

/// Which machine role this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The machine with the physical keyboard and mouse.
    Host,
    /// A machine driven remotely by the host.
    Agent,
}

/// How a profile switch is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Drive local DDC writes only.
    Local,
    /// Notify peers only; no local DDC writes.
    Remote,
    /// Both (the default).
    Both,
}

impl Default for SwitchMode {
    fn default() -> Self {
        SwitchMode::Both
    }
}

/// A named switching target: one "seat" the operator can switch to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique profile name (e.g. "PC1", "Mac").
    pub name: String,
    /// Hotkey chord that triggers this profile (e.g. "Ctrl+Alt+1"); empty
    /// for none.
    #[serde(default)]
    pub hotkey: String,
    #[serde(default)]
    pub switch_mode: SwitchMode,
    /// Monitor ID → VCP 0x60 input code. IDs not present on this machine
    /// are silently skipped at switch time: configs sync across
    /// heterogeneous machines and foreign IDs are expected.
    #[serde(default)]
    pub monitor_inputs: BTreeMap<String, u16>,
}

impl Profile {
    /// Convenience constructor used by defaults and tests.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hotkey: String::new(),
            switch_mode: SwitchMode::default(),
            monitor_inputs: BTreeMap::new(),
        }
    }
}

/// Persisted snapshot of a detected monitor, kept so the settings UI can
/// label profile rows while the monitor is unplugged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial: String,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_role")]
    pub role: Role,

    /// `host:port` of the coordinator; mandatory for agents, unused on the
    /// host.
    #[serde(default)]
    pub coordinator_addr: String,

    /// Optional bearer token shared by the HTTP API and control channel.
    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_api_enabled")]
    pub api_enabled: bool,

    /// Chord that opens the settings UI.
    #[serde(default = "default_settings_hotkey")]
    pub settings_hotkey: String,

    /// Chord that puts all DDC-capable displays into standby.
    #[serde(default)]
    pub sleep_hotkey: String,

    /// Preferred kill-switch chord; the capture layer falls back to its
    /// built-in alternatives when this one is already claimed.
    #[serde(default = "default_escape_hotkey")]
    pub escape_hotkey: String,

    /// The profile name that means "this agent owns input". An agent
    /// injects events iff the active profile equals this name.
    #[serde(default)]
    pub agent_profile: String,

    #[serde(default = "default_true")]
    pub usb_forwarding_enabled: bool,

    /// Currently active profile; names an existing profile or is empty.
    #[serde(default)]
    pub current_profile: String,

    #[serde(default = "default_true")]
    pub show_notifications: bool,

    #[serde(default = "default_true")]
    pub start_minimized: bool,

    /// `tracing` log level: "error", "warn", "info", "debug", "trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Workaround for adapters that report no metadata and a bogus HDMI1
    /// input for DisplayPort monitors. Gated here because the driver bug
    /// it covers may be fixed upstream.
    #[serde(default = "default_true")]
    pub hdmi_dp_heuristic: bool,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub monitors: Vec<MonitorEntry>,
    pub general: GeneralConfig,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_role() -> Role {
    Role::Host
}
fn default_api_port() -> u16 {
    18080
}
fn default_api_enabled() -> bool {
    true
}
fn default_settings_hotkey() -> String {
    "Ctrl+Alt+S".to_string()
}
fn default_escape_hotkey() -> String {
    "Ctrl+Alt+Esc".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            coordinator_addr: String::new(),
            api_token: String::new(),
            api_port: default_api_port(),
            api_enabled: default_api_enabled(),
            settings_hotkey: default_settings_hotkey(),
            sleep_hotkey: String::new(),
            escape_hotkey: default_escape_hotkey(),
            agent_profile: String::new(),
            usb_forwarding_enabled: true,
            current_profile: "PC1".to_string(),
            show_notifications: true,
            start_minimized: true,
            log_level: default_log_level(),
            hdmi_dp_heuristic: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut pc1 = Profile::named("PC1");
        pc1.hotkey = "Ctrl+Alt+1".to_string();
        let mut pc2 = Profile::named("PC2");
        pc2.hotkey = "Ctrl+Alt+2".to_string();
        Self {
            profiles: vec![pc1, pc2],
            monitors: Vec::new(),
            general: GeneralConfig::default(),
        }
    }
}

impl Config {
    /// Looks up a profile by name.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

// ── Path resolution ───────────────────────────────────────────────────────────

/// Resolves the platform-appropriate config file path, creating the parent
/// directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] when the base directory cannot be
/// determined from the environment, or [`ConfigError::Io`] when it cannot
/// be created.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let dir = platform_config_dir().ok_or(ConfigError::NoConfigDir)?;
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir.join("config.json"))
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("vkvm"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("vkvm")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .map(|base| base.join("vkvm"))
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// Single-writer, many-readers owner of the live configuration.
///
/// All mutations go through [`update`](ConfigManager::update), which
/// persists the new state and fires the registered change callback *after*
/// the write lock is released, so the callback may freely call back into
/// the manager (hotkey rebinding, capture re-gating).
pub struct ConfigManager {
    path: PathBuf,
    config: RwLock<Config>,
    on_change: Mutex<Option<ChangeCallback>>,
}

impl ConfigManager {
    /// Creates a manager for an explicit path (tests use a temp dir).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(Config::default()),
            on_change: Mutex::new(None),
        }
    }

    /// Creates a manager for the platform default path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no config directory can be
    /// resolved.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::with_path(default_config_path()?))
    }

    /// Loads the config from disk. A missing file is not an error: the
    /// in-memory defaults stay in effect until the first save.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found" and [`ConfigError::Json`] for malformed content.
    pub fn load(&self) -> Result<(), ConfigError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let parsed: Config = serde_json::from_str(&data)?;
        *self.config.write().expect("config lock poisoned") = parsed;
        self.fire_change_callback();
        Ok(())
    }

    /// Persists the current config to disk as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Json`].
    pub fn save(&self) -> Result<(), ConfigError> {
        let snapshot = self.get();
        self.write_snapshot(&snapshot)
    }

    /// Returns a clone of the current configuration.
    pub fn get(&self) -> Config {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Mutates the config under the write lock, then saves and fires the
    /// change callback with no lock held.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if persisting the new state fails. The
    /// in-memory mutation is kept either way.
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        let snapshot = {
            let mut guard = self.config.write().expect("config lock poisoned");
            f(&mut guard);
            guard.clone()
        };
        let result = self.write_snapshot(&snapshot);
        self.fire_change_callback();
        result
    }

    /// Replaces the entire configuration (used by `POST /api/config`
    /// push-sync) and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if persisting fails.
    pub fn replace(&self, config: Config) -> Result<(), ConfigError> {
        self.update(|c| *c = config)
    }

    /// Replaces the profile list only (agent-side `sync_resp` handling).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if persisting fails.
    pub fn set_profiles(&self, profiles: Vec<Profile>) -> Result<(), ConfigError> {
        self.update(|c| c.profiles = profiles)
    }

    /// Looks up a profile by name.
    pub fn profile(&self, name: &str) -> Option<Profile> {
        self.config
            .read()
            .expect("config lock poisoned")
            .profile(name)
            .cloned()
    }

    /// Inserts or replaces a profile by name, keeping names unique.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if persisting fails.
    pub fn upsert_profile(&self, profile: Profile) -> Result<(), ConfigError> {
        self.update(|c| {
            if let Some(existing) = c.profiles.iter_mut().find(|p| p.name == profile.name) {
                *existing = profile;
            } else {
                c.profiles.push(profile);
            }
        })
    }

    /// Registers the function called after every config change.
    pub fn on_change(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_change.lock().expect("callback lock poisoned") = Some(Box::new(callback));
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, snapshot: &Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let data = serde_json::to_string_pretty(snapshot)?;
        debug!(path = %self.path.display(), bytes = data.len(), "saving configuration");
        std::fs::write(&self.path, data).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn fire_change_callback(&self) {
        let guard = self.on_change.lock().expect("callback lock poisoned");
        if let Some(cb) = guard.as_ref() {
            cb();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn temp_manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = ConfigManager::with_path(dir.path().join("config.json"));
        (dir, mgr)
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_has_two_starter_profiles() {
        let cfg = Config::default();
        assert_eq!(cfg.profiles.len(), 2);
        assert_eq!(cfg.profiles[0].name, "PC1");
        assert_eq!(cfg.profiles[0].hotkey, "Ctrl+Alt+1");
        assert_eq!(cfg.profiles[1].name, "PC2");
    }

    #[test]
    fn test_default_general_settings() {
        let g = GeneralConfig::default();
        assert_eq!(g.role, Role::Host);
        assert_eq!(g.api_port, 18080);
        assert!(g.usb_forwarding_enabled);
        assert_eq!(g.escape_hotkey, "Ctrl+Alt+Esc");
        assert_eq!(g.current_profile, "PC1");
    }

    #[test]
    fn test_current_profile_names_an_existing_profile() {
        let cfg = Config::default();
        assert!(cfg.profile(&cfg.general.current_profile).is_some());
    }

    // ── JSON round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_config_json_round_trip() {
        let mut cfg = Config::default();
        cfg.general.role = Role::Agent;
        cfg.general.coordinator_addr = "192.168.1.10:18080".to_string();
        cfg.profiles[0]
            .monitor_inputs
            .insert("MONITOR\\DEL1234".to_string(), 0x0F);

        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Agent).unwrap();
        assert_eq!(json, r#""agent""#);
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"general":{}}"#).unwrap();
        assert_eq!(cfg.general.api_port, 18080);
        assert_eq!(cfg.general.role, Role::Host);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn test_partial_general_overrides_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"general":{"api_port":9999,"role":"agent"}}"#).unwrap();
        assert_eq!(cfg.general.api_port, 9999);
        assert_eq!(cfg.general.role, Role::Agent);
        // Untouched fields keep defaults.
        assert!(cfg.general.usb_forwarding_enabled);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let result: Result<Config, _> = serde_json::from_str("{{{ not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_serial_is_omitted_from_json() {
        let entry = MonitorEntry {
            id: "uuid-1".to_string(),
            name: "VG27A".to_string(),
            serial: String::new(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("serial"), "got {json}");
    }

    // ── Manager ───────────────────────────────────────────────────────────────

    #[test]
    fn test_load_missing_file_keeps_defaults() {
        let (_dir, mgr) = temp_manager();
        mgr.load().unwrap();
        assert_eq!(mgr.get(), Config::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let (_dir, mgr) = temp_manager();
        mgr.update(|c| {
            c.general.api_port = 12345;
            c.general.current_profile = "PC2".to_string();
        })
        .unwrap();

        let mgr2 = ConfigManager::with_path(mgr.path());
        mgr2.load().unwrap();
        assert_eq!(mgr2.get().general.api_port, 12345);
        assert_eq!(mgr2.get().general.current_profile, "PC2");
    }

    #[test]
    fn test_update_fires_change_callback() {
        let (_dir, mgr) = temp_manager();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        mgr.on_change(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        mgr.update(|c| c.general.api_port = 1).unwrap();
        mgr.update(|c| c.general.api_port = 2).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_change_callback_may_reenter_manager() {
        // The callback fires with no lock held, so reading back is legal.
        let (_dir, mgr) = temp_manager();
        let mgr = Arc::new(mgr);
        let observed = Arc::new(Mutex::new(0u16));
        let mgr_clone = Arc::clone(&mgr);
        let observed_clone = Arc::clone(&observed);
        mgr.on_change(move || {
            *observed_clone.lock().unwrap() = mgr_clone.get().general.api_port;
        });

        mgr.update(|c| c.general.api_port = 777).unwrap();
        assert_eq!(*observed.lock().unwrap(), 777);
    }

    #[test]
    fn test_upsert_profile_keeps_names_unique() {
        let (_dir, mgr) = temp_manager();
        let mut p = Profile::named("PC1");
        p.hotkey = "Ctrl+Alt+9".to_string();
        mgr.upsert_profile(p).unwrap();

        let cfg = mgr.get();
        let count = cfg.profiles.iter().filter(|p| p.name == "PC1").count();
        assert_eq!(count, 1, "upsert must not duplicate names");
        assert_eq!(cfg.profile("PC1").unwrap().hotkey, "Ctrl+Alt+9");
    }

    #[test]
    fn test_set_profiles_replaces_list_and_persists() {
        let (_dir, mgr) = temp_manager();
        mgr.set_profiles(vec![Profile::named("Mac")]).unwrap();
        assert_eq!(mgr.get().profiles.len(), 1);

        let mgr2 = ConfigManager::with_path(mgr.path());
        mgr2.load().unwrap();
        assert_eq!(mgr2.get().profiles[0].name, "Mac");
    }

    #[test]
    fn test_profile_lookup() {
        let (_dir, mgr) = temp_manager();
        assert!(mgr.profile("PC1").is_some());
        assert!(mgr.profile("nope").is_none());
    }
}
