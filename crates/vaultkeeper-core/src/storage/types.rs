//! Data types for the storage layer.
//!
//! Two families: `*Row` structs are what the store persists — sensitive
//! columns are opaque encrypted blobs. The plain structs (`Credential`,
//! `CreditCard`, `SecureNote`) are decrypted views produced by the session
//! and serialized onto the wire; they exist only transiently per request.
//!
//! Domain, username, and titles are deliberately plaintext metadata so
//! lookup-by-domain works without decrypting the whole vault.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored credential: plaintext metadata plus encrypted field blobs.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: i64,
    pub domain: String,
    pub username: String,
    pub password: Vec<u8>,
    pub notes: Option<Vec<u8>>,
    pub totp_secret: Option<Vec<u8>>,
    pub backup_codes: Option<Vec<u8>>,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Builder for inserting a credential. Blobs are already encrypted.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub domain: String,
    pub username: String,
    pub password: Vec<u8>,
    pub notes: Option<Vec<u8>>,
    pub totp_secret: Option<Vec<u8>>,
    pub backup_codes: Option<Vec<u8>>,
}

/// Field-wise credential update.
///
/// Outer `None` leaves the column untouched; `Some(None)` clears an
/// optional column (the wire's "clear_totp"/"clear_backup" flags).
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub notes: Option<Option<Vec<u8>>>,
    pub totp_secret: Option<Option<Vec<u8>>>,
    pub backup_codes: Option<Option<Vec<u8>>>,
}

impl CredentialUpdate {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.notes.is_none()
            && self.totp_secret.is_none()
            && self.backup_codes.is_none()
    }
}

/// Decrypted credential view returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub id: i64,
    pub domain: String,
    pub username: String,
    pub password: String,
    pub notes: Option<String>,
    pub totp_secret: Option<String>,
    pub backup_codes: Option<String>,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Non-secret credential metadata, safe to return while locked.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: i64,
    pub domain: String,
    pub username: String,
    pub has_totp: bool,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialRow> for CredentialSummary {
    fn from(row: &CredentialRow) -> Self {
        Self {
            id: row.id,
            domain: row.domain.clone(),
            username: row.username.clone(),
            has_totp: row.totp_secret.is_some(),
            is_favorite: row.is_favorite,
            folder_id: row.folder_id,
            updated_at: row.updated_at,
        }
    }
}

/// A stored payment card.
#[derive(Debug, Clone)]
pub struct CardRow {
    pub id: i64,
    pub title: String,
    pub cardholder_name: String,
    pub card_number: Vec<u8>,
    pub expiry_date: String,
    pub cvv: Vec<u8>,
    pub notes: Option<Vec<u8>>,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub title: String,
    pub cardholder_name: String,
    pub card_number: Vec<u8>,
    pub expiry_date: String,
    pub cvv: Vec<u8>,
    pub notes: Option<Vec<u8>>,
}

/// Decrypted card view.
#[derive(Debug, Clone, Serialize)]
pub struct CreditCard {
    pub id: i64,
    pub title: String,
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub notes: Option<String>,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored secure note; the body is one encrypted blob of rich text.
#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: i64,
    pub title: String,
    pub content: Vec<u8>,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub content: Vec<u8>,
}

/// Decrypted note view.
#[derive(Debug, Clone, Serialize)]
pub struct SecureNote {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub is_favorite: bool,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A folder; nothing in it is secret.
#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_update_is_empty() {
        assert!(CredentialUpdate::default().is_empty());

        let update = CredentialUpdate {
            totp_secret: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_summary_carries_no_secrets() {
        let row = CredentialRow {
            id: 1,
            domain: "example.com".to_string(),
            username: "a@b.com".to_string(),
            password: vec![1, 2, 3],
            notes: None,
            totp_secret: Some(vec![4, 5, 6]),
            backup_codes: None,
            is_favorite: true,
            folder_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let summary = CredentialSummary::from(&row);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("example.com"));
        assert!(json.contains("has_totp"));
        assert!(!json.contains("password"));
        assert!(!json.contains("totp_secret"));
    }
}
