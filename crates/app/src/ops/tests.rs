use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::crypto::{CryptoError, S2kParams, SecureRandom, SignatureStatus};
use tempfile::TempDir;

use super::decrypt::{Decrypt, DecryptError};
use super::encrypt::Encrypt;
use super::key::generate::Generate;
use super::key::list::List;
use super::key::passwd::{Passwd, PasswdError};
use super::key::show::Show;
use crate::op::{Op, OpContext};
use crate::state::{AppConfig, AppState, StateError};

struct Harness {
    temp: TempDir,
    ctx: OpContext,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("grendel");
        let config = AppConfig {
            s2k: S2kParams::new(1, 1, 8),
            ..Default::default()
        };
        AppState::init(Some(config_path.clone()), Some(config)).unwrap();
        let random = Arc::new(SecureRandom::new().unwrap());
        Self {
            ctx: OpContext::new(Some(config_path), random),
            temp,
        }
    }

    fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn generate(&self, name: &str, passphrase: &str) {
        let op = Generate {
            name: name.to_string(),
            user_id: format!("{name} <{name}@example.com>"),
            passphrase_file: Some(self.file(&format!("{name}.pass"), passphrase.as_bytes())),
            force: false,
        };
        op.execute(&self.ctx).await.unwrap();
    }

    fn decrypt_op(&self, input: &Path, recipient: &str, from: &str) -> Decrypt {
        Decrypt {
            input: input.to_path_buf(),
            output: self.temp.path().join("plain.out"),
            recipient: recipient.to_string(),
            from: from.to_string(),
            require_signature: false,
            passphrase_file: Some(self.temp.path().join(format!("{recipient}.pass"))),
        }
    }
}

#[tokio::test]
async fn test_encrypt_decrypt_between_key_sets() {
    let h = Harness::new();
    h.generate("alice", "alice pw").await;
    h.generate("bob", "bob pw").await;

    let input = h.file("report.txt", b"quarterly numbers");
    let sealed = h.temp.path().join("report.grendel");
    Encrypt {
        input: input.clone(),
        output: sealed.clone(),
        from: "alice".to_string(),
        recipients: vec!["alice".to_string(), "bob".to_string()],
        passphrase_file: Some(h.temp.path().join("alice.pass")),
    }
    .execute(&h.ctx)
    .await
    .unwrap();

    let op = h.decrypt_op(&sealed, "bob", "alice");
    let output = op.execute(&h.ctx).await.unwrap();
    assert!(output.contains("signed by alice"));
    assert_eq!(std::fs::read(&op.output).unwrap(), b"quarterly numbers");
}

#[tokio::test]
async fn test_require_signature_rejects_wrong_sender() {
    let h = Harness::new();
    h.generate("alice", "a").await;
    h.generate("bob", "b").await;
    h.generate("mallory", "m").await;

    let sealed = h.temp.path().join("msg.grendel");
    Encrypt {
        input: h.file("msg.txt", b"hi"),
        output: sealed.clone(),
        from: "mallory".to_string(),
        recipients: vec!["bob".to_string()],
        passphrase_file: Some(h.temp.path().join("mallory.pass")),
    }
    .execute(&h.ctx)
    .await
    .unwrap();

    let mut op = h.decrypt_op(&sealed, "bob", "alice");
    assert!(op.execute(&h.ctx).await.unwrap().contains("NOT signed by alice"));

    op.require_signature = true;
    assert!(matches!(
        op.execute(&h.ctx).await,
        Err(DecryptError::Unverified(_, SignatureStatus::Invalid))
    ));
}

#[tokio::test]
async fn test_non_recipient_cannot_decrypt() {
    let h = Harness::new();
    h.generate("alice", "a").await;
    h.generate("eve", "e").await;

    let sealed = h.temp.path().join("msg.grendel");
    Encrypt {
        input: h.file("msg.txt", b"private"),
        output: sealed.clone(),
        from: "alice".to_string(),
        recipients: vec!["alice".to_string()],
        passphrase_file: Some(h.temp.path().join("alice.pass")),
    }
    .execute(&h.ctx)
    .await
    .unwrap();

    assert!(matches!(
        h.decrypt_op(&sealed, "eve", "alice").execute(&h.ctx).await,
        Err(DecryptError::Crypto(CryptoError::NoMatchingRecipient(_)))
    ));
}

#[tokio::test]
async fn test_passwd_changes_passphrase() {
    let h = Harness::new();
    h.generate("alice", "old").await;

    let wrong = Passwd {
        name: "alice".to_string(),
        old_passphrase_file: Some(h.file("wrong.pass", b"nope")),
        new_passphrase_file: Some(h.file("new.pass", b"new")),
    };
    assert!(matches!(
        wrong.execute(&h.ctx).await,
        Err(PasswdError::Crypto(CryptoError::IncorrectPassphrase))
    ));

    Passwd {
        name: "alice".to_string(),
        old_passphrase_file: Some(h.temp.path().join("alice.pass")),
        new_passphrase_file: Some(h.temp.path().join("new.pass")),
    }
    .execute(&h.ctx)
    .await
    .unwrap();

    let state = h.ctx.state().unwrap();
    let key_set = state.load_key_set("alice").unwrap();
    assert!(key_set.unlock(b"new").is_ok());
    assert!(key_set.unlock(b"old").is_err());
}

#[tokio::test]
async fn test_generate_refuses_to_overwrite() {
    let h = Harness::new();
    h.generate("alice", "a").await;
    let again = Generate {
        name: "alice".to_string(),
        user_id: "someone else".to_string(),
        passphrase_file: Some(h.temp.path().join("alice.pass")),
        force: false,
    };
    assert!(matches!(
        again.execute(&h.ctx).await,
        Err(super::key::generate::GenerateError::State(
            StateError::KeySetExists(_)
        ))
    ));
}

#[tokio::test]
async fn test_show_and_list() {
    let h = Harness::new();
    h.generate("alice", "a").await;
    h.generate("bob", "b").await;

    let shown = Show {
        name: "alice".to_string(),
    }
    .execute(&h.ctx)
    .await
    .unwrap();
    assert!(shown.contains("alice <alice@example.com>"));
    assert!(shown.contains("256-EdDSA/"));
    assert!(shown.contains("256-ECDH/"));
    assert!(shown.contains("m=2^8 KiB"));

    let listed = List.execute(&h.ctx).await.unwrap();
    let names: Vec<&str> = listed
        .lines()
        .filter_map(|line| line.split('\t').next())
        .collect();
    assert_eq!(names, vec!["alice", "bob"]);
}
