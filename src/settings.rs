use config::{Config, File};
use serde::{de, Deserialize, Serialize};

/// Wrapper under [`serde::de::IgnoredAny`] which implements
/// [`PartialEq`] and [`Eq`] for fields to be ignored.
#[derive(Copy, Clone, Debug, Default, Deserialize)]
struct IgnoredAny(de::IgnoredAny);

impl PartialEq for IgnoredAny {
    fn eq(&self, _other: &Self) -> bool {
        // We ignore that values, so they should not impact the equality
        true
    }
}

impl Eq for IgnoredAny {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Seconds between refresh cycles; re-read at the end of every cycle.
    pub refresh_interval_secs: u64,
    /// Request timeout applied by the REST transport backend.
    pub rest_request_timeout_secs: u64,
    /// Force-disables the server-side reporter path.
    pub disable_reporter: bool,
    /// Disables the cluster-identity sanity check on refresh.
    pub disable_cluster_identity_check: bool,
    /// Includes the internal name-resolution service in proxy listings.
    pub include_name_service: bool,

    // Is required as we deny unknown fields, but allow users provide
    // path to config through PREFIX__CONFIG env variable. If removed,
    // the setup would fail with `unknown field `config`, expected one of...`
    #[serde(skip_serializing, rename = "config")]
    config_path: IgnoredAny,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            rest_request_timeout_secs: 30,
            disable_reporter: false,
            disable_cluster_identity_check: false,
            include_name_service: false,
            config_path: Default::default(),
        }
    }
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let config_path = std::env::var("GRID_STATS__CONFIG");

        let mut builder = Config::builder();
        if let Ok(config_path) = config_path {
            builder = builder.add_source(File::with_name(&config_path));
        };
        // Use `__` so that it would be possible to address keys with underscores in names
        builder =
            builder.add_source(config::Environment::with_prefix("GRID_STATS").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.refresh_interval_secs, 30);
        assert!(!settings.disable_reporter);
        assert!(!settings.include_name_service);
    }
}
