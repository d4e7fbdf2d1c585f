use clap::Args;

use statetree_daemon::{ServiceState, StateError};

/// Load the config and schema, seed a store, and report what it holds
#[derive(Args, Debug, Clone)]
pub struct Check {
    /// List every seeded value
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Check {
    type Error = CheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.config().map_err(StateError::from)?;
        let state = ServiceState::from_config(&config)?;
        let store = state.store();

        let mut lines = vec![
            format!("listen_addr: {}", config.listen_addr),
            format!("log_level:   {}", config.log_level),
            format!("values:      {}", store.len()),
        ];
        if self.verbose {
            store.visit_values(|node| {
                lines.push(format!(
                    "  {} [{}] = {}",
                    node.path(),
                    node.value().kind().name(),
                    node.value()
                ));
            });
        }
        Ok(lines.join("\n"))
    }
}
