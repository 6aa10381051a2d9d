use std::path::PathBuf;

use clap::Args;
use common::crypto::{CryptoError, Key, KeySetGenerator};

use crate::ops::passphrase::read_passphrase;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Generate {
    /// Name to store the key set under
    pub name: String,

    /// User ID to certify, e.g. "Alice <alice@example.com>"
    #[arg(long)]
    pub user_id: String,

    /// Read the passphrase from this file instead of stdin
    #[arg(long)]
    pub passphrase_file: Option<PathBuf>,

    /// Replace an existing key set of the same name
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("could not read passphrase: {0}")]
    Passphrase(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[async_trait::async_trait]
impl crate::op::Op for Generate {
    type Error = GenerateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        // fail before the expensive part
        if state.key_set_path(&self.name)?.exists() && !self.force {
            return Err(StateError::KeySetExists(self.name.clone()).into());
        }
        let passphrase = read_passphrase(self.passphrase_file.as_deref())?;

        let key_set = KeySetGenerator::new(ctx.random.clone())
            .with_s2k_params(state.config.s2k)
            .generate(&self.user_id, &passphrase)
            .await?;
        let path = state.save_key_set(&self.name, &key_set, self.force)?;

        tracing::info!(name = %self.name, key_set = %key_set, "generated key set");
        Ok(format!(
            "Generated key set {} for {}\n\
             - master: {} ({})\n\
             - subkey: {} ({})\n\
             - stored at: {}",
            self.name,
            key_set.user_id(),
            key_set.master_key(),
            key_set.master_key().fingerprint(),
            key_set.sub_key(),
            key_set.sub_key().fingerprint(),
            path.display(),
        ))
    }
}
