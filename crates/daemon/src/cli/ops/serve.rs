use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use statetree_daemon::{spawn_service, ConfigError};

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Override the listen address (default from config)
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Override the log level (default from config)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Override the schema file (default from config)
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = ctx.config()?;

        // Flags win over the config file
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if let Some(schema) = &self.schema {
            config.schema = Some(schema.clone());
        }
        config.log_level()?;

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
