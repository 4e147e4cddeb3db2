//! Command line arguments and configuration loading

use clap::{Parser, ValueEnum};

use meridian_common::RegistryError;
use meridian_core::Configuration;
use meridian_core::model::{NODE_ADDRESS_PROPERTY, NODE_ID_PROPERTY, STANDALONE_PROPERTY};

/// How the node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Single process, node cleanup disabled
    Standalone,
    /// Member of a cluster
    Cluster,
}

/// Command line arguments for the node
#[derive(Debug, Default, Parser)]
#[command(name = "meridian-server", version, about)]
pub struct Cli {
    /// Configuration file, defaults to conf/application.yml
    #[arg(short = 'c', long = "config", env = "MERIDIAN_CONFIG")]
    pub config: Option<String>,
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<Mode>,
    #[arg(long = "node-id")]
    pub node_id: Option<String>,
    #[arg(long = "address")]
    pub address: Option<String>,
}

impl Cli {
    /// Load the configuration with the command line taking precedence
    pub fn load_configuration(&self) -> Result<Configuration, RegistryError> {
        let build = || -> Result<config::Config, config::ConfigError> {
            let mut builder = Configuration::builder(self.config.as_deref())?;
            if let Some(mode) = self.mode {
                builder = builder.set_override(STANDALONE_PROPERTY, mode == Mode::Standalone)?;
            }
            if let Some(node_id) = &self.node_id {
                builder = builder.set_override(NODE_ID_PROPERTY, node_id.as_str())?;
            }
            if let Some(address) = &self.address {
                builder = builder.set_override(NODE_ADDRESS_PROPERTY, address.as_str())?;
            }
            builder.build()
        };

        build()
            .map(Configuration::from_config)
            .map_err(|e| RegistryError::Config(e.to_string()))
    }
}
