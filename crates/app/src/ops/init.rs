use std::path::PathBuf;

use clap::Args;
use common::crypto::S2kParams;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Lock new key sets with the slower, more memory-hungry Argon2 profile
    #[arg(long)]
    pub sensitive: bool,

    /// Store key sets here instead of <config dir>/keys
    #[arg(long)]
    pub keys_dir: Option<PathBuf>,

    /// Default log level (RUST_LOG still wins)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.log_level.clone(),
            keys_dir: self.keys_dir.clone(),
            s2k: if self.sensitive {
                S2kParams::SENSITIVE
            } else {
                S2kParams::INTERACTIVE
            },
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let s2k = state.config.s2k;
        let output = format!(
            "Initialized grendel directory at: {}\n\
             - Config: {}\n\
             - Key sets: {}\n\
             - Argon2: t={} p={} m=2^{} KiB",
            state.grendel_dir.display(),
            state.config_path.display(),
            state.keys_path.display(),
            s2k.passes,
            s2k.parallelism,
            s2k.memory_exponent,
        );

        Ok(output)
    }
}
