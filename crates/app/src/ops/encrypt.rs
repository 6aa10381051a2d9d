use std::path::PathBuf;

use clap::Args;
use common::crypto::{CryptoError, KeySet, MessageWriter};

use crate::ops::passphrase::read_passphrase;
use crate::state::StateError;

/// Sign a document with one key set and encrypt it to others.
#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// File to encrypt
    pub input: PathBuf,

    /// Where to write the encrypted message
    #[arg(long, short)]
    pub output: PathBuf,

    /// Key set that signs the message (its passphrase is required)
    #[arg(long)]
    pub from: String,

    /// Key sets that can read the message; repeat for several
    #[arg(long = "to", required = true)]
    pub recipients: Vec<String>,

    /// Read the sender's passphrase from this file instead of stdin
    #[arg(long)]
    pub passphrase_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[async_trait::async_trait]
impl crate::op::Op for Encrypt {
    type Error = EncryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let sender = state.load_key_set(&self.from)?;
        let recipients = self
            .recipients
            .iter()
            .map(|name| state.load_key_set(name))
            .collect::<Result<Vec<KeySet>, _>>()?;

        let passphrase = read_passphrase(self.passphrase_file.as_deref())?;
        let sender = sender.unlock(&passphrase)?;

        let payload = tokio::fs::read(&self.input).await?;
        let recipients: Vec<&KeySet> = recipients.iter().collect();
        let message =
            MessageWriter::new(&sender, &recipients, ctx.random.as_ref()).write(&payload)?;
        tokio::fs::write(&self.output, &message).await?;

        tracing::info!(
            from = %self.from,
            recipients = recipients.len(),
            bytes = message.len(),
            "encrypted document"
        );
        Ok(format!(
            "Encrypted {} ({} bytes) for {} to {}",
            self.input.display(),
            payload.len(),
            self.recipients.join(", "),
            self.output.display(),
        ))
    }
}
