use std::path::PathBuf;

use clap::Args;
use common::crypto::{CryptoError, MessageReader, SignatureStatus};

use crate::ops::passphrase::read_passphrase;
use crate::state::StateError;

/// Decrypt a message and check who signed it.
#[derive(Args, Debug, Clone)]
pub struct Decrypt {
    /// Encrypted message
    pub input: PathBuf,

    /// Where to write the decrypted document
    #[arg(long, short)]
    pub output: PathBuf,

    /// Key set the message was encrypted to (its passphrase is required)
    #[arg(long = "as")]
    pub recipient: String,

    /// Key set expected to have signed the message
    #[arg(long)]
    pub from: String,

    /// Fail instead of warning when the signature doesn't verify
    #[arg(long)]
    pub require_signature: bool,

    /// Read the recipient's passphrase from this file instead of stdin
    #[arg(long)]
    pub passphrase_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("message is not signed by {0} ({1:?})")]
    Unverified(String, SignatureStatus),
}

#[async_trait::async_trait]
impl crate::op::Op for Decrypt {
    type Error = DecryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let sender = state.load_key_set(&self.from)?;
        let recipient = state.load_key_set(&self.recipient)?;

        let passphrase = read_passphrase(self.passphrase_file.as_deref())?;
        let recipient = recipient.unlock(&passphrase)?;

        let message = tokio::fs::read(&self.input).await?;
        let decrypted = MessageReader::new(&sender, &recipient).read_message(&message)?;
        if self.require_signature && !decrypted.is_verified() {
            return Err(DecryptError::Unverified(
                self.from.clone(),
                decrypted.signature,
            ));
        }
        tokio::fs::write(&self.output, &decrypted.payload).await?;

        let signature = match decrypted.signature {
            SignatureStatus::Verified => format!("signed by {}", self.from),
            SignatureStatus::Invalid => match decrypted.signer {
                Some(id) => format!("NOT signed by {} (signer key {})", self.from, id),
                None => format!("NOT signed by {}", self.from),
            },
            SignatureStatus::Missing => "unsigned".to_string(),
        };
        Ok(format!(
            "Decrypted {} ({} bytes, {}) to {}",
            self.input.display(),
            decrypted.payload.len(),
            signature,
            self.output.display(),
        ))
    }
}
