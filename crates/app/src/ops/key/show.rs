use clap::Args;
use common::crypto::Key;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Name of the key set
    pub name: String,
}

fn describe(label: &str, key: &(impl Key + std::fmt::Display)) -> String {
    format!(
        "{label}: {key}\n\
         - key id: {}\n\
         - fingerprint: {}\n\
         - created: {}\n\
         - flags: {}\n\
         - can sign: {}, can encrypt: {}",
        key.key_id(),
        key.fingerprint(),
        key.created_at().to_rfc3339(),
        key.key_flags(),
        key.can_sign(),
        key.can_encrypt(),
    )
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let key_set = state.load_key_set(&self.name)?;
        let master = key_set.master_key();
        let s2k = master.s2k_params();

        Ok(format!(
            "{}: {}\n{}\n{}\n\
             preferred ciphers: {}\n\
             preferred hashes: {}\n\
             preferred compression: {}\n\
             argon2: t={} p={} m=2^{} KiB",
            self.name,
            key_set.user_id(),
            describe("master", master),
            describe("subkey", key_set.sub_key()),
            join(&master.preferred_symmetric_algorithms()),
            join(&master.preferred_hash_algorithms()),
            join(&master.preferred_compression_algorithms()),
            s2k.passes,
            s2k.parallelism,
            s2k.memory_exponent,
        ))
    }
}
