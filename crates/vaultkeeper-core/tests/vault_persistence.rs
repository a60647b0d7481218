use secrecy::SecretString;
use vaultkeeper_core::session::CredentialInput;
use vaultkeeper_core::{SqliteStore, VaultError, VaultSession};

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn sample_input() -> CredentialInput {
    CredentialInput {
        domain: "example.com".to_string(),
        username: "alice".to_string(),
        password: "correct horse battery staple".to_string(),
        notes: None,
        totp_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
        backup_codes: Some("1111-2222".to_string()),
    }
}

#[test]
fn test_vault_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir should be available");
    let db_path = dir.path().join("vault.db");

    let id = {
        let store = SqliteStore::open(&db_path).expect("open should succeed");
        let mut session = VaultSession::new(store);
        session.unlock(&secret("master")).expect("first unlock initializes");
        session.save_credential(&sample_input()).expect("save should succeed")
    };

    let store = SqliteStore::open(&db_path).expect("reopen should succeed");
    let mut session = VaultSession::new(store);

    let status = session.status().expect("status should succeed");
    assert!(!status.unlocked);
    assert!(!status.first_run);
    assert_eq!(status.credential_count, 1);

    session.unlock(&secret("master")).expect("unlock should succeed");
    let creds = session
        .get_credentials("example.com")
        .expect("read should succeed");
    assert_eq!(creds.len(), 1);
    assert_eq!(creds[0].id, id);
    assert_eq!(creds[0].password, "correct horse battery staple");
    assert_eq!(creds[0].totp_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
}

#[test]
fn test_wrong_password_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir should be available");
    let db_path = dir.path().join("vault.db");

    {
        let store = SqliteStore::open(&db_path).expect("open should succeed");
        let mut session = VaultSession::new(store);
        session.unlock(&secret("master")).expect("first unlock initializes");
    }

    let store = SqliteStore::open(&db_path).expect("reopen should succeed");
    let mut session = VaultSession::new(store);
    assert!(matches!(
        session.unlock(&secret("not-master")),
        Err(VaultError::WrongPassword)
    ));
    assert!(matches!(
        session.get_all_credentials(),
        Err(VaultError::Locked)
    ));
}

#[test]
fn test_master_password_rotation_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir should be available");
    let db_path = dir.path().join("vault.db");

    {
        let store = SqliteStore::open(&db_path).expect("open should succeed");
        let mut session = VaultSession::new(store);
        session.unlock(&secret("old")).expect("first unlock initializes");
        session.save_credential(&sample_input()).expect("save should succeed");
        session
            .change_master_password(&secret("old"), &secret("new"))
            .expect("rotation should succeed");
    }

    let store = SqliteStore::open(&db_path).expect("reopen should succeed");
    let mut session = VaultSession::new(store);
    assert!(matches!(
        session.unlock(&secret("old")),
        Err(VaultError::WrongPassword)
    ));
    session.unlock(&secret("new")).expect("new password should unlock");
    let creds = session.get_all_credentials().expect("read should succeed");
    assert_eq!(creds[0].password, "correct horse battery staple");
}
