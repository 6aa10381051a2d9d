use std::path::PathBuf;

use clap::Args;
use common::crypto::CryptoError;

use crate::ops::passphrase::read_passphrase;
use crate::state::StateError;

/// Change a key set's passphrase. Without files, reads the old passphrase
/// then the new one from stdin, one per line.
#[derive(Args, Debug, Clone)]
pub struct Passwd {
    /// Name of the key set
    pub name: String,

    /// Read the current passphrase from this file
    #[arg(long)]
    pub old_passphrase_file: Option<PathBuf>,

    /// Read the new passphrase from this file
    #[arg(long)]
    pub new_passphrase_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum PasswdError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("could not read passphrase: {0}")]
    Passphrase(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[async_trait::async_trait]
impl crate::op::Op for Passwd {
    type Error = PasswdError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let key_set = state.load_key_set(&self.name)?;

        let old = read_passphrase(self.old_passphrase_file.as_deref())?;
        let new = read_passphrase(self.new_passphrase_file.as_deref())?;

        let relocked = key_set
            .unlock(&old)?
            .relock(&old, &new, ctx.random.as_ref())?;
        state.save_key_set(&self.name, &relocked, true)?;

        tracing::info!(name = %self.name, "changed key set passphrase");
        Ok(format!("Changed passphrase for {}", self.name))
    }
}
