//! Record store trait definition.
//!
//! The `RecordStore` trait is the seam between the session engine and
//! persistence. It deals exclusively in pre-encrypted blobs and plaintext
//! metadata — no key material and no decryption ever crosses this boundary.

use crate::error::Result;
use crate::storage::types::{
    CardRow, CredentialRow, CredentialUpdate, Folder, NewCard, NewCredential, NewNote, NoteRow,
};

/// Persistent keyed blob storage for vault records.
///
/// All implementations must ensure:
/// - Each call is atomic (a record is written whole or not at all)
/// - Sensitive columns are stored exactly as the opaque blobs handed in
/// - Row ids are stable integers assigned on insert
pub trait RecordStore: Send {
    // --- Vault metadata (KDF salt, canary) ---

    /// Read a metadata value by key, `None` if unset.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write (or overwrite) a metadata value.
    fn set_meta(&mut self, key: &str, value: &[u8]) -> Result<()>;

    // --- Credentials ---

    /// Insert a credential, returning its new id.
    fn insert_credential(&mut self, credential: &NewCredential) -> Result<i64>;

    /// Fetch one credential by id.
    fn get_credential(&self, id: i64) -> Result<Option<CredentialRow>>;

    /// All credentials, ordered by domain then username.
    fn list_credentials(&self) -> Result<Vec<CredentialRow>>;

    /// Credentials whose domain matches exactly or is a subdomain of
    /// `domain`, most recently updated first.
    fn credentials_by_domain(&self, domain: &str) -> Result<Vec<CredentialRow>>;

    /// Credentials whose domain or username contains `query`.
    fn search_credentials(&self, query: &str) -> Result<Vec<CredentialRow>>;

    /// Apply a field-wise update. Returns false if the id does not exist.
    fn update_credential(&mut self, id: i64, update: &CredentialUpdate) -> Result<bool>;

    /// Delete a credential. Returns false if the id does not exist.
    fn delete_credential(&mut self, id: i64) -> Result<bool>;

    /// Flip the favorite flag, returning the new state, or `None` if the id
    /// does not exist.
    fn toggle_favorite(&mut self, id: i64) -> Result<Option<bool>>;

    /// Move a credential into a folder (`None` clears the assignment).
    fn set_folder(&mut self, id: i64, folder_id: Option<i64>) -> Result<bool>;

    /// Number of stored credentials; usable while locked.
    fn credential_count(&self) -> Result<u64>;

    // --- Payment cards ---

    fn insert_card(&mut self, card: &NewCard) -> Result<i64>;

    fn list_cards(&self) -> Result<Vec<CardRow>>;

    fn delete_card(&mut self, id: i64) -> Result<bool>;

    /// Replace a card's encrypted columns (master password rotation).
    fn replace_card_secrets(
        &mut self,
        id: i64,
        card_number: &[u8],
        cvv: &[u8],
        notes: Option<&[u8]>,
    ) -> Result<bool>;

    // --- Secure notes ---

    fn insert_note(&mut self, note: &NewNote) -> Result<i64>;

    fn list_notes(&self) -> Result<Vec<NoteRow>>;

    fn delete_note(&mut self, id: i64) -> Result<bool>;

    /// Replace a note's encrypted body (master password rotation).
    fn replace_note_content(&mut self, id: i64, content: &[u8]) -> Result<bool>;

    // --- Folders ---

    fn insert_folder(&mut self, name: &str, icon: &str) -> Result<i64>;

    fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Delete a folder, unassigning any credentials inside it first.
    fn delete_folder(&mut self, id: i64) -> Result<bool>;
}
