//! Persistence layer: the `RecordStore` trait and its SQLite implementation.

pub mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::SqliteStore;
pub use traits::RecordStore;
pub use types::{
    CardRow, Credential, CredentialRow, CredentialSummary, CredentialUpdate, CreditCard, Folder,
    NewCard, NewCredential, NewNote, NoteRow, SecureNote,
};
