use serde::{Deserialize, Serialize};

use crate::check::CheckKind;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub checks: Checks,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Cap on accumulated request body bytes per request context.
    #[serde(default = "default_body_max")]
    pub body_max_bytes: usize,
    /// Upload content is truncated to this many bytes before decoding.
    #[serde(default = "default_body_max")]
    pub upload_content_max_bytes: usize,
    /// Append block decisions to the blocked-decision log file.
    #[serde(default = "default_true")]
    pub log_blocked: bool,
}

fn default_body_max() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            body_max_bytes: default_body_max(),
            upload_content_max_bytes: default_body_max(),
            log_blocked: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Checks {
    /// Check tags the dispatcher skips entirely.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Checks {
    pub fn is_disabled(&self, kind: CheckKind) -> bool {
        self.disabled.iter().any(|tag| tag == kind.as_str())
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    checks: ChecksOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    body_max_bytes: Option<usize>,
    upload_content_max_bytes: Option<usize>,
    log_blocked: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ChecksOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    disabled: Vec<String>,
    #[serde(default)]
    remove_disabled: Vec<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/rasp-gate/config.toml (if exists)
    ///
    /// User config merges with defaults: lists extend, scalars override.
    /// Set `replace = true` in `[checks]` to replace the disabled list
    /// entirely; use `remove_disabled` to subtract specific tags.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/rasp-gate/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/rasp-gate/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                log::warn!("config parse error, keeping defaults: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        if let Some(v) = overlay.settings.body_max_bytes {
            self.settings.body_max_bytes = v;
        }
        if let Some(v) = overlay.settings.upload_content_max_bytes {
            self.settings.upload_content_max_bytes = v;
        }
        if let Some(v) = overlay.settings.log_blocked {
            self.settings.log_blocked = v;
        }

        // Checks
        let c = overlay.checks;
        merge_list(
            &mut self.checks.disabled,
            c.disabled,
            &c.remove_disabled,
            c.replace,
        );
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
