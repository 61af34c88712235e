//! The YAML configuration file of the daemon and the command line operations.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::database::DatabaseParameters;
use crate::error::Result;
use crate::record::ProductCatalog;
use crate::report::{DEFAULT_ALERT_THRESHOLD, DEFAULT_CHART_PAGE_SIZE};
use crate::socket::SocketParameters;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "resources/qclogd.yml";

/// Readings older than this many days are removed by the retention sweep.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

fn default_log_config_path() -> String {
    String::from("resources/log.yml")
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_chart_page_size() -> usize {
    DEFAULT_CHART_PAGE_SIZE
}

fn default_alert_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Configuration {
    pub database_connection_parameters: DatabaseParameters,
    pub socket_connection_parameters: SocketParameters,
    /// log4rs configuration file.
    #[serde(default = "default_log_config_path")]
    pub log_config_path: String,
    /// Email whose first use creates the administrator profile.
    #[serde(default)]
    pub bootstrap_admin_email: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_chart_page_size")]
    pub chart_page_size: usize,
    /// Highest accepted temperature of external-market frozen products.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default)]
    pub product_catalog: ProductCatalog,
}

impl Configuration {
    pub fn from_yaml(yaml: &str) -> Result<Configuration> {
        let mut configuration = serde_yaml::from_str::<Configuration>(yaml)?;
        configuration.product_catalog = configuration
            .product_catalog
            .into_iter()
            .map(|(code, info)| (code.trim().to_uppercase(), info))
            .collect();
        Ok(configuration)
    }

    /// Reads and deserializes the configuration file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Configuration> {
        let mut configuration_file = File::open(path)?;
        let mut configuration_string = String::new();
        configuration_file.read_to_string(&mut configuration_string)?;
        Configuration::from_yaml(&configuration_string)
    }
}
