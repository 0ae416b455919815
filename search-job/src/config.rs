use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::formats::Flexible;
use serde_with::{serde_as, DurationSeconds};

use crate::query::Protocol;

/// Service-wide defaults of the search engine.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub limits: LimitSettings,
    pub timeouts: TimeoutSettings,
    pub pager: PagerSettings,
    pub mutations: MutationSettings,
    pub stream: StreamSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LimitSettings {
    pub default_streaming: i64,
    pub default_batch: i64,
    /// Used by `count:all` and as a cap on explicit counts.
    pub max: i64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            default_streaming: 500,
            default_batch: 30,
            max: 999_999,
        }
    }
}

impl LimitSettings {
    pub fn default_for(&self, protocol: Protocol) -> i64 {
        match protocol {
            Protocol::Streaming => self.default_streaming,
            Protocol::Batch => self.default_batch,
        }
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub default: Duration,
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub max: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(20),
            max: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PagerSettings {
    /// Repositories resolved per page.
    pub page_size: usize,
}

impl Default for PagerSettings {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

/// Toggles for the clause mutation rules.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MutationSettings {
    pub unordered_terms: bool,
    pub uri_as_filter: bool,
    pub unquote: bool,
    pub only_select: bool,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            unordered_terms: true,
            uri_as_filter: true,
            unquote: true,
            only_select: false,
        }
    }
}

impl MutationSettings {
    pub fn disabled() -> Self {
        Self {
            unordered_terms: false,
            uri_as_filter: false,
            unquote: false,
            only_select: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    /// Capacity of the channel between a spawned search and its consumer.
    pub buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

/// Reads settings from the compiled defaults, an optional file and
/// `SEARCH_`-prefixed environment variables, in that order.
///
/// Nested keys are separated by `__`, e.g. `SEARCH_LIMITS__DEFAULT_STREAMING=100`.
pub fn read_settings(path: Option<&Path>) -> Result<SearchSettings, config::ConfigError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&SearchSettings::default())?);
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("SEARCH")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<SearchSettings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = read_settings(None).unwrap();
        assert_eq!(settings, SearchSettings::default());
        assert_eq!(settings.limits.default_for(Protocol::Batch), 30);
        assert_eq!(settings.timeouts.default, Duration::from_secs(20));
        assert!(!settings.mutations.only_select);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("search-settings-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "limits:\n  default_streaming: 100\ntimeouts:\n  max: 90\nmutations:\n  only_select: true\n",
        )
        .unwrap();

        let settings = read_settings(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.limits.default_streaming, 100);
        assert_eq!(settings.limits.default_batch, 30);
        assert_eq!(settings.timeouts.max, Duration::from_secs(90));
        assert_eq!(settings.timeouts.default, Duration::from_secs(20));
        assert!(settings.mutations.only_select);
        assert!(settings.mutations.unquote);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_settings(Some(Path::new("/nonexistent/search.yaml"))).is_err());
    }
}
