use super::key::KeyId;
use super::packet::PacketError;

/// Broad classes of [`CryptoError`], for boundaries that map failures to
/// user-facing outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller proved the wrong secret.
    Authentication,
    /// Stored or transmitted data is corrupt or forged.
    DataIntegrity,
    /// A primitive or provider failed.
    Operational,
    /// The caller holds no key that can open the data.
    Access,
}

/// The single error type of the key and message engine
///
/// Every operation is all-or-nothing: when one of these is returned nothing
/// was mutated and nothing partial was produced. Nothing is retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
    #[error("not a self-signed master key")]
    NotSelfCertified,
    #[error("subkey is not bound to its master key")]
    NotBoundToMaster,
    #[error("malformed key set: {0}")]
    MalformedKeySet(String),
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("no encrypted session key for subkey {0}")]
    NoMatchingRecipient(KeyId),
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    #[error("relock failed: {0}")]
    RelockFailed(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("random source failure: {0}")]
    Random(String),
}

impl CryptoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CryptoError::IncorrectPassphrase => ErrorClass::Authentication,
            CryptoError::NotSelfCertified
            | CryptoError::NotBoundToMaster
            | CryptoError::MalformedKeySet(_)
            | CryptoError::IntegrityCheckFailed
            | CryptoError::MalformedMessage(_) => ErrorClass::DataIntegrity,
            CryptoError::KeyGenerationFailed(_)
            | CryptoError::EncryptionFailed(_)
            | CryptoError::RelockFailed(_)
            | CryptoError::Random(_) => ErrorClass::Operational,
            CryptoError::NoMatchingRecipient(_) => ErrorClass::Access,
        }
    }

    pub(crate) fn malformed_key_set(e: impl std::fmt::Display) -> Self {
        CryptoError::MalformedKeySet(e.to_string())
    }

    pub(crate) fn malformed_message(e: impl std::fmt::Display) -> Self {
        CryptoError::MalformedMessage(e.to_string())
    }
}

impl From<PacketError> for CryptoError {
    /// Codec failures outside a more specific context are message faults;
    /// key set loading maps them to [`CryptoError::MalformedKeySet`] itself.
    fn from(e: PacketError) -> Self {
        CryptoError::MalformedMessage(e.to_string())
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CryptoError::IncorrectPassphrase.to_string(),
            "incorrect passphrase"
        );
        assert_eq!(
            CryptoError::NotSelfCertified.to_string(),
            "not a self-signed master key"
        );
        assert_eq!(
            CryptoError::NoMatchingRecipient(KeyId::from(0xA3A5_D038_FF30_574Eu64)).to_string(),
            "no encrypted session key for subkey A3A5D038FF30574E"
        );
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            CryptoError::IncorrectPassphrase.class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            CryptoError::IntegrityCheckFailed.class(),
            ErrorClass::DataIntegrity
        );
        assert_eq!(
            CryptoError::RelockFailed("x".into()).class(),
            ErrorClass::Operational
        );
        assert_eq!(
            CryptoError::NoMatchingRecipient(KeyId::from(1u64)).class(),
            ErrorClass::Access
        );
    }
}
