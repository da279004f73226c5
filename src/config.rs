//! Configuration management.
//!
//! Loads policy configuration from TOML files and provides runtime defaults.
//! The defaults mirror the deployed selector lists, host blocklist, and rule
//! tables; all of them are replaceable via the config file.

use crate::intercept::{InterceptionRule, SurfaceKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub interception: InterceptionConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the sentry is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

/// Region selector policy, ordered by priority within each slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Prompt region candidates; first non-empty match wins
    #[serde(default = "default_prompt_selectors")]
    pub prompt: Vec<String>,

    /// Options region candidates
    #[serde(default = "default_options_selectors")]
    pub options: Vec<String>,

    /// Noise subtrees removed before canonicalization
    #[serde(default = "default_strip_selectors")]
    pub strip: Vec<String>,

    /// Where an answer item's text lives, tried in order, else the item itself
    #[serde(default = "default_item_text_selectors")]
    pub item_text: Vec<String>,

    /// Class marking explanatory/rationale items excluded from the options
    #[serde(default = "default_rationale_class")]
    pub rationale_class: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt_selectors(),
            options: default_options_selectors(),
            strip: default_strip_selectors(),
            item_text: default_item_text_selectors(),
            rationale_class: default_rationale_class(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Debounce window after a mutation burst, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Fallback poll interval, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Added-node tags that arm the debounce timer
    #[serde(default = "default_extract_tags")]
    pub extract_tags: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            extract_tags: default_extract_tags(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hostnames blocked outright (exact or suffix match)
    #[serde(default = "default_blocked_hosts")]
    pub blocked_hosts: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            blocked_hosts: default_blocked_hosts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptionConfig {
    /// Rule table keyed by surface name
    #[serde(default = "default_interception_rules")]
    pub rules: Vec<InterceptionRule>,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            rules: default_interception_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key-value keys whose writes are dropped
    #[serde(default = "default_blocked_storage_keys")]
    pub blocked_keys: Vec<String>,

    /// Cookies matching this pattern are purged
    #[serde(default = "default_blocked_cookie_pattern")]
    pub blocked_cookie_pattern: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blocked_keys: default_blocked_storage_keys(),
            blocked_cookie_pattern: default_blocked_cookie_pattern(),
        }
    }
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prompt_selectors() -> Vec<String> {
    vec![
        ".challenge-v2-question__text".to_string(),
        ".question-body .question".to_string(),
        ".question-body".to_string(),
    ]
}

fn default_options_selectors() -> Vec<String> {
    vec![
        ".challenge-v2-answer__list".to_string(),
        ".multiple-choice-answer-fields".to_string(),
    ]
}

fn default_strip_selectors() -> Vec<String> {
    vec![
        "ul.multiple-choice-answer-fields".to_string(),
        "ul.answer-fields".to_string(),
        ".challenge-v2-answer__list".to_string(),
        "#resubmit-message-place".to_string(),
        "#helpful-tutorials-message-place".to_string(),
        ".button-block".to_string(),
        ".control-section".to_string(),
        ".assessment-report-wrapper".to_string(),
        ".letter".to_string(),
    ]
}

fn default_item_text_selectors() -> Vec<String> {
    vec![
        ".challenge-v2-answer__text div".to_string(),
        "label div".to_string(),
        ".challenge-v2-answer__text".to_string(),
    ]
}

fn default_rationale_class() -> String {
    "rationale-item".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_extract_tags() -> Vec<String> {
    vec!["div".to_string(), "ul".to_string(), "li".to_string()]
}

fn default_blocked_hosts() -> Vec<String> {
    vec![
        "cdn.optimizely.com".to_string(),
        "static.cloudflareinsights.com".to_string(),
        "stat.sophia.org".to_string(),
        "stats.sophia.org".to_string(),
        "dpm.demdex.net".to_string(),
        "js.hs-scripts.com".to_string(),
        "analytics.sophia.org".to_string(),
        "assets.adobedtm.com".to_string(),
    ]
}

fn default_interception_rules() -> Vec<InterceptionRule> {
    vec![
        InterceptionRule {
            surface: "dataLayer".to_string(),
            kind: SurfaceKind::Append,
            trigger_field: "event".to_string(),
            blocked: vec![
                "modal_view",
                "modal_close",
                "alert_view",
                "click_link",
                "click_toggle",
                "form_view",
                "form_start",
                "form_submit",
                "form_field_change",
                "form_progress",
                "login",
                "student_expired",
                "show_tour",
                "close_tour",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            scrub_field: Some("session_duration".to_string()),
            reject_field: Some("userId".to_string()),
        },
        InterceptionRule {
            surface: "optimizely".to_string(),
            kind: SurfaceKind::Append,
            trigger_field: "type".to_string(),
            blocked: vec!["event", "user", "activate"]
                .into_iter()
                .map(String::from)
                .collect(),
            scrub_field: None,
            reject_field: None,
        },
        InterceptionRule {
            surface: "ga".to_string(),
            kind: SurfaceKind::Call,
            trigger_field: String::new(),
            blocked: vec!["pageview", "send", "create", "require"]
                .into_iter()
                .map(String::from)
                .collect(),
            scrub_field: None,
            reject_field: None,
        },
        InterceptionRule {
            surface: "snowplow".to_string(),
            kind: SurfaceKind::Call,
            trigger_field: String::new(),
            blocked: vec!["trackPageView", "trackStructEvent", "newTracker"]
                .into_iter()
                .map(String::from)
                .collect(),
            scrub_field: None,
            reject_field: None,
        },
    ]
}

fn default_blocked_storage_keys() -> Vec<String> {
    vec!["postponed_form_submit".to_string()]
}

fn default_blocked_cookie_pattern() -> String {
    "^(sophia_st|AMCVS?|_sp_)".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("page-sentry")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
