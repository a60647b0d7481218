//! SQLite record store.
//!
//! Sensitive columns are opaque BLOBs encrypted by the session before they
//! get here; domain, username, titles, and timestamps are plaintext so the
//! extension can look up records without unlocking everything.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, VaultError};
use crate::storage::traits::RecordStore;
use crate::storage::types::{
    CardRow, CredentialRow, CredentialUpdate, Folder, NewCard, NewCredential, NewNote, NoteRow,
};

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a vault database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Storage(format!("Failed to create vault dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                icon TEXT NOT NULL DEFAULT 'folder',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                username TEXT NOT NULL,
                password BLOB NOT NULL,
                notes BLOB,
                totp_secret BLOB,
                backup_codes BLOB,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                folder_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                FOREIGN KEY (folder_id) REFERENCES folders(id)
            );

            CREATE INDEX IF NOT EXISTS idx_credentials_domain ON credentials(domain);
            CREATE INDEX IF NOT EXISTS idx_credentials_favorite ON credentials(is_favorite);

            CREATE TABLE IF NOT EXISTS secure_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content BLOB NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                folder_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                FOREIGN KEY (folder_id) REFERENCES folders(id)
            );

            CREATE TABLE IF NOT EXISTS credit_cards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                cardholder_name TEXT NOT NULL,
                card_number BLOB NOT NULL,
                expiry_date TEXT NOT NULL,
                cvv BLOB NOT NULL,
                notes BLOB,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                folder_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                FOREIGN KEY (folder_id) REFERENCES folders(id)
            );
            "#,
        )?;
        Ok(Self { conn })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn credential_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CredentialRow> {
    Ok(CredentialRow {
        id: row.get("id")?,
        domain: row.get("domain")?,
        username: row.get("username")?,
        password: row.get("password")?,
        notes: row.get("notes")?,
        totp_secret: row.get("totp_secret")?,
        backup_codes: row.get("backup_codes")?,
        is_favorite: row.get::<_, i64>("is_favorite")? != 0,
        folder_id: row.get("folder_id")?,
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

fn card_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get("id")?,
        title: row.get("title")?,
        cardholder_name: row.get("cardholder_name")?,
        card_number: row.get("card_number")?,
        expiry_date: row.get("expiry_date")?,
        cvv: row.get("cvv")?,
        notes: row.get("notes")?,
        is_favorite: row.get::<_, i64>("is_favorite")? != 0,
        folder_id: row.get("folder_id")?,
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        is_favorite: row.get::<_, i64>("is_favorite")? != 0,
        folder_id: row.get("folder_id")?,
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

impl RecordStore for SqliteStore {
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_meta(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn insert_credential(&mut self, credential: &NewCredential) -> Result<i64> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO credentials
                 (domain, username, password, notes, totp_secret, backup_codes,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                credential.domain,
                credential.username,
                credential.password,
                credential.notes,
                credential.totp_secret,
                credential.backup_codes,
                ts,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_credential(&self, id: i64) -> Result<Option<CredentialRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM credentials WHERE id = ?1",
                [id],
                credential_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn list_credentials(&self) -> Result<Vec<CredentialRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM credentials ORDER BY domain, username")?;
        let rows = stmt
            .query_map([], credential_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn credentials_by_domain(&self, domain: &str) -> Result<Vec<CredentialRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM credentials
             WHERE domain = ?1 OR domain LIKE ?2
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map(params![domain, format!("%.{}", domain)], credential_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn search_credentials(&self, query: &str) -> Result<Vec<CredentialRow>> {
        let pattern = format!("%{}%", query);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM credentials
             WHERE domain LIKE ?1 OR username LIKE ?1
             ORDER BY domain, username",
        )?;
        let rows = stmt
            .query_map([pattern], credential_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn update_credential(&mut self, id: i64, update: &CredentialUpdate) -> Result<bool> {
        if update.is_empty() {
            // Nothing to write; report whether the row exists
            let exists: Option<i64> = self
                .conn
                .query_row("SELECT id FROM credentials WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            return Ok(exists.is_some());
        }

        let tx = self.conn.transaction()?;
        let mut changed = 0;
        if let Some(domain) = &update.domain {
            changed += tx.execute(
                "UPDATE credentials SET domain = ?1 WHERE id = ?2",
                params![domain, id],
            )?;
        }
        if let Some(username) = &update.username {
            changed += tx.execute(
                "UPDATE credentials SET username = ?1 WHERE id = ?2",
                params![username, id],
            )?;
        }
        if let Some(password) = &update.password {
            changed += tx.execute(
                "UPDATE credentials SET password = ?1 WHERE id = ?2",
                params![password, id],
            )?;
        }
        if let Some(notes) = &update.notes {
            changed += tx.execute(
                "UPDATE credentials SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
        }
        if let Some(totp_secret) = &update.totp_secret {
            changed += tx.execute(
                "UPDATE credentials SET totp_secret = ?1 WHERE id = ?2",
                params![totp_secret, id],
            )?;
        }
        if let Some(backup_codes) = &update.backup_codes {
            changed += tx.execute(
                "UPDATE credentials SET backup_codes = ?1 WHERE id = ?2",
                params![backup_codes, id],
            )?;
        }
        let updated = changed > 0;
        if updated {
            tx.execute(
                "UPDATE credentials SET updated_at = ?1 WHERE id = ?2",
                params![now(), id],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    fn delete_credential(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM credentials WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn toggle_favorite(&mut self, id: i64) -> Result<Option<bool>> {
        let current: Option<i64> = self
            .conn
            .query_row(
                "SELECT is_favorite FROM credentials WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(current) = current else {
            return Ok(None);
        };
        let new_state = current == 0;
        self.conn.execute(
            "UPDATE credentials SET is_favorite = ?1 WHERE id = ?2",
            params![new_state as i64, id],
        )?;
        Ok(Some(new_state))
    }

    fn set_folder(&mut self, id: i64, folder_id: Option<i64>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE credentials SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        Ok(changed > 0)
    }

    fn credential_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert_card(&mut self, card: &NewCard) -> Result<i64> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO credit_cards
                 (title, cardholder_name, card_number, expiry_date, cvv, notes,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                card.title,
                card.cardholder_name,
                card.card_number,
                card.expiry_date,
                card.cvv,
                card.notes,
                ts,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_cards(&self) -> Result<Vec<CardRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM credit_cards ORDER BY title")?;
        let rows = stmt
            .query_map([], card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_card(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM credit_cards WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn replace_card_secrets(
        &mut self,
        id: i64,
        card_number: &[u8],
        cvv: &[u8],
        notes: Option<&[u8]>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE credit_cards
             SET card_number = ?1, cvv = ?2, notes = ?3, updated_at = ?4
             WHERE id = ?5",
            params![card_number, cvv, notes, now(), id],
        )?;
        Ok(changed > 0)
    }

    fn insert_note(&mut self, note: &NewNote) -> Result<i64> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO secure_notes (title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![note.title, note.content, ts],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_notes(&self) -> Result<Vec<NoteRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM secure_notes ORDER BY title")?;
        let rows = stmt
            .query_map([], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_note(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM secure_notes WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn replace_note_content(&mut self, id: i64, content: &[u8]) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE secure_notes SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![content, now(), id],
        )?;
        Ok(changed > 0)
    }

    fn insert_folder(&mut self, name: &str, icon: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO folders (name, icon, created_at) VALUES (?1, ?2, ?3)",
            params![name, icon, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut stmt = self.conn.prepare("SELECT * FROM folders ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Folder {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    icon: row.get("icon")?,
                    created_at: parse_ts(row.get("created_at")?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_folder(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE credentials SET folder_id = NULL WHERE folder_id = ?1",
            [id],
        )?;
        let deleted = tx.execute("DELETE FROM folders WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credential(domain: &str, username: &str) -> NewCredential {
        NewCredential {
            domain: domain.to_string(),
            username: username.to_string(),
            password: vec![1, 2, 3, 4],
            notes: None,
            totp_secret: None,
            backup_codes: None,
        }
    }

    #[test]
    fn test_meta_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_meta("kdf_salt").unwrap().is_none());

        store.set_meta("kdf_salt", b"0123456789abcdef").unwrap();
        assert_eq!(
            store.get_meta("kdf_salt").unwrap().unwrap(),
            b"0123456789abcdef"
        );

        store.set_meta("kdf_salt", b"overwritten").unwrap();
        assert_eq!(store.get_meta("kdf_salt").unwrap().unwrap(), b"overwritten");
    }

    #[test]
    fn test_insert_and_get_credential() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_credential(&sample_credential("github.com", "a@b.com"))
            .unwrap();

        let row = store.get_credential(id).unwrap().unwrap();
        assert_eq!(row.domain, "github.com");
        assert_eq!(row.username, "a@b.com");
        assert_eq!(row.password, vec![1, 2, 3, 4]);
        assert!(!row.is_favorite);
        assert!(store.get_credential(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_domain_lookup_includes_subdomains() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_credential(&sample_credential("example.com", "root"))
            .unwrap();
        store
            .insert_credential(&sample_credential("mail.example.com", "sub"))
            .unwrap();
        store
            .insert_credential(&sample_credential("other.org", "other"))
            .unwrap();

        let rows = store.credentials_by_domain("example.com").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.domain.ends_with("example.com")));
    }

    #[test]
    fn test_search_matches_domain_and_username() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_credential(&sample_credential("github.com", "alice"))
            .unwrap();
        store
            .insert_credential(&sample_credential("gitlab.com", "bob"))
            .unwrap();

        assert_eq!(store.search_credentials("git").unwrap().len(), 2);
        assert_eq!(store.search_credentials("alice").unwrap().len(), 1);
        assert!(store.search_credentials("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_update_clears_optional_column() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut credential = sample_credential("github.com", "alice");
        credential.totp_secret = Some(vec![9, 9, 9]);
        let id = store.insert_credential(&credential).unwrap();

        let update = CredentialUpdate {
            totp_secret: Some(None),
            ..Default::default()
        };
        assert!(store.update_credential(id, &update).unwrap());

        let row = store.get_credential(id).unwrap().unwrap();
        assert!(row.totp_secret.is_none());
    }

    #[test]
    fn test_empty_update_reports_row_existence() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_credential(&sample_credential("github.com", "alice"))
            .unwrap();

        let update = CredentialUpdate::default();
        assert!(store.update_credential(id, &update).unwrap());
        assert!(!store.update_credential(id + 1, &update).unwrap());
    }

    #[test]
    fn test_update_missing_id_returns_false() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let update = CredentialUpdate {
            domain: Some("new.com".to_string()),
            ..Default::default()
        };
        assert!(!store.update_credential(42, &update).unwrap());
    }

    #[test]
    fn test_toggle_favorite() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_credential(&sample_credential("github.com", "alice"))
            .unwrap();

        assert_eq!(store.toggle_favorite(id).unwrap(), Some(true));
        assert_eq!(store.toggle_favorite(id).unwrap(), Some(false));
        assert_eq!(store.toggle_favorite(999).unwrap(), None);
    }

    #[test]
    fn test_delete_folder_unassigns_credentials() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let folder_id = store.insert_folder("Work", "folder").unwrap();
        let cred_id = store
            .insert_credential(&sample_credential("github.com", "alice"))
            .unwrap();
        store.set_folder(cred_id, Some(folder_id)).unwrap();

        assert!(store.delete_folder(folder_id).unwrap());
        let row = store.get_credential(cred_id).unwrap().unwrap();
        assert!(row.folder_id.is_none());
        assert!(store.list_folders().unwrap().is_empty());
    }

    #[test]
    fn test_cards_and_notes_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let card_id = store
            .insert_card(&NewCard {
                title: "Personal Visa".to_string(),
                cardholder_name: "A Person".to_string(),
                card_number: vec![1; 32],
                expiry_date: "12/27".to_string(),
                cvv: vec![2; 28],
                notes: None,
            })
            .unwrap();
        let note_id = store
            .insert_note(&NewNote {
                title: "Wifi".to_string(),
                content: vec![3; 40],
            })
            .unwrap();

        assert_eq!(store.list_cards().unwrap().len(), 1);
        assert_eq!(store.list_notes().unwrap().len(), 1);
        assert!(store.delete_card(card_id).unwrap());
        assert!(store.delete_note(note_id).unwrap());
        assert!(!store.delete_card(card_id).unwrap());
        assert!(!store.delete_note(note_id).unwrap());
    }

    #[test]
    fn test_credential_count() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.credential_count().unwrap(), 0);
        store
            .insert_credential(&sample_credential("github.com", "alice"))
            .unwrap();
        assert_eq!(store.credential_count().unwrap(), 1);
    }
}
