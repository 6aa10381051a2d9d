pub mod decrypt;
pub mod encrypt;
pub mod init;
pub mod key;
mod passphrase;
pub mod version;

pub use decrypt::Decrypt;
pub use encrypt::Encrypt;
pub use init::Init;
pub use key::Key;
pub use version::Version;

#[cfg(test)]
mod tests;
