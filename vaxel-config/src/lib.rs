//! # Vaxel Configuration System
//!
//! Layered configuration for the controller daemon.
//!
//! The core crates never read configuration themselves. The daemon loads a
//! [`VaxelConfig`] once at start-up and hands each section to the component
//! that needs it.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

mod core;
mod error;
mod forwarding;
mod session;
mod telemetry;
mod transport;
mod validation;

pub use self::core::CoreConfig;
pub use error::ConfigError;
pub use forwarding::{DefaultEntryConfig, ForwardingConfig};
pub use session::SessionConfig;
pub use telemetry::TelemetryConfig;
pub use transport::TransportConfig;

const BASE_FILE: &str = "config/vaxel.yaml";
const ENV_PREFIX: &str = "VAXEL_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct VaxelConfig {
    /// Dispatch loop timing.
    #[serde(default)]
    #[validate(nested)]
    pub core: CoreConfig,

    /// Listening endpoints and connection limits.
    #[serde(default)]
    #[validate(nested)]
    pub transport: TransportConfig,

    #[serde(default)]
    #[validate(nested)]
    pub session: SessionConfig,

    #[serde(default)]
    #[validate(nested)]
    pub forwarding: ForwardingConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl VaxelConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/vaxel.yaml`, if present
    /// 3. `config/<VAXEL_ENV>.yaml`, if present
    /// 4. `VAXEL_*` environment variables, `__` separating sections
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(VaxelConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            debug!(path = BASE_FILE, "Base configuration not found, using defaults");
        }

        if let Ok(env) = std::env::var("VAXEL_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file, still honouring the
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(VaxelConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::path::PathBuf;

    #[test]
    fn default_config_validates() {
        let config = VaxelConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.core.tick_ms, 100);
        assert_eq!(config.transport.read_chunk, 2048);
        assert_eq!(config.session.miss_send_len, 128);
    }

    #[test]
    fn file_then_environment_override() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                BASE_FILE,
                r#"
core:
  tick_ms: 20
transport:
  openflow_addr: "127.0.0.1:6653"
forwarding:
  policy: flood
"#,
            )?;
            jail.set_env("VAXEL_CORE__TICK_MS", "50");

            let config = VaxelConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.core.tick_ms, 50);
            assert_eq!(config.transport.openflow_addr, "127.0.0.1:6653");
            assert_eq!(config.forwarding.policy, "flood");
            assert_eq!(config.telemetry.log_level, "info");
            Ok(())
        });
    }

    #[test]
    fn environment_file_layers_over_base() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(BASE_FILE, "session:\n  miss_send_len: 256\n")?;
            jail.create_file("config/lab.yaml", "session:\n  request_config: true\n")?;
            jail.set_env("VAXEL_ENV", "lab");

            let config = VaxelConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.session.miss_send_len, 256);
            assert!(config.session.request_config);
            Ok(())
        });
    }

    #[test]
    fn out_of_range_tick_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("VAXEL_CORE__TICK_MS", "0");
            match VaxelConfig::load() {
                Err(ConfigError::Validation(_)) => {}
                other => panic!("expected validation failure, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn unknown_policy_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yaml", "forwarding:\n  policy: nat\n")?;
            assert!(matches!(
                VaxelConfig::load_from_path("custom.yaml"),
                Err(ConfigError::Validation(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn default_entries_and_aging_load_from_file() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                BASE_FILE,
                r#"
forwarding:
  mac_aging_secs: 0
  default_entries:
    - kind: udp
      action: controller
      port: 67
    - kind: ethertype
      action: flood
      ethertype: 2054
      priority: high
    - kind: all
      action: drop
"#,
            )?;
            let config = VaxelConfig::load().expect("Config should load");
            let forwarding = &config.forwarding;
            assert_eq!(forwarding.mac_aging_secs, 0);
            assert_eq!(forwarding.default_entries.len(), 3);
            assert_eq!(forwarding.default_entries[0].port, Some(67));
            assert_eq!(forwarding.default_entries[1].ethertype, Some(0x0806));
            assert_eq!(forwarding.default_entries[1].priority.as_deref(), Some("high"));
            assert_eq!(forwarding.default_entries[2].action, "drop");
            Ok(())
        });
    }

    #[test]
    fn malformed_default_entries_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "missing.yaml",
                "forwarding:\n  default_entries:\n    - kind: ip_proto\n      action: drop\n",
            )?;
            assert!(matches!(
                VaxelConfig::load_from_path("missing.yaml"),
                Err(ConfigError::Validation(_))
            ));

            jail.create_file(
                "action.yaml",
                "forwarding:\n  default_entries:\n    - kind: arp\n      action: mirror\n",
            )?;
            assert!(matches!(
                VaxelConfig::load_from_path("action.yaml"),
                Err(ConfigError::Validation(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(matches!(
            VaxelConfig::load_from_path("/nonexistent/vaxel.yaml"),
            Err(ConfigError::FileNotFound(p)) if p == PathBuf::from("/nonexistent/vaxel.yaml")
        ));
    }

    #[test]
    fn renders_effective_yaml() {
        let yaml = VaxelConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("policy: learning"));
        assert!(yaml.contains("tick_ms: 100"));
    }
}
