//! Resolves the configuration file path and loads it.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::{ConfigError, GatewayConfig};

/// Default configuration path when no CLI argument is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/risk-sms.yml";

/// Loads `GatewayConfig` from an explicit path, or `DEFAULT_CONFIG_PATH`.
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(explicit_path: Option<&Path>) -> Self {
        Self {
            config_path: explicit_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        }
    }

    pub fn load(&self) -> Result<GatewayConfig, ConfigError> {
        info!(path = %self.config_path.display(), "Loading gateway configuration");
        GatewayConfig::from_file(&self.config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_well_known_path() {
        let loader = ConfigLoader::new(None);
        assert_eq!(loader.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn loads_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
datasource:
  serverName: h
  port: 1521
  serviceName: s
  user: u
  password: p
sms:
  nombre: svc
  smpp:
    host: h
    port: 2775
    systemId: id
    password: pw
    sourceAdress: "1"
"#
        )
        .unwrap();

        let loader = ConfigLoader::new(Some(file.path()));
        let config = loader.load().unwrap();
        assert_eq!(config.services()[0].nombre, "svc");
    }
}
