//! The vault session state machine.
//!
//! `VaultSession` owns the master key (or the absence of one) and is the only
//! place where plaintext secrets exist in memory. Everything below it deals
//! in encrypted blobs, everything above it in per-request decrypted views.
//!
//! State machine: `Uninitialized -> Locked <-> Unlocked`, with a lazy
//! inactivity expiry: every guarded operation first checks the monotonic
//! clock and locks the vault if the idle window has elapsed, rejecting that
//! same call. There is no background timer.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ListCache;
use crate::crypto::{decrypt_blob, decrypt_string, derive_key, encrypt, generate_salt, MasterKey};
use crate::error::{Result, VaultError};
use crate::storage::types::{
    Credential, CredentialRow, CredentialSummary, CredentialUpdate, CreditCard, Folder, NewCard,
    NewCredential, NewNote, SecureNote,
};
use crate::storage::RecordStore;
use crate::totp;

const META_KDF_SALT: &str = "kdf_salt";
const META_CANARY: &str = "canary";

// Fixed plaintext encrypted at vault creation; decrypting it proves a derived
// key is correct without touching any real record.
const CANARY_PLAINTEXT: &[u8] = b"vaultkeeper.canary.v1";

/// Session tunables. Defaults match the shipped configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle window after which the vault locks itself. Zero disables
    /// auto-locking entirely.
    pub inactivity_timeout: Duration,
    /// Consecutive wrong passwords before lockout kicks in.
    pub max_failed_attempts: u32,
    /// First lockout window; doubles per additional failure.
    pub lockout_base: Duration,
    /// Upper bound on the lockout window.
    pub lockout_cap: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(300),
            max_failed_attempts: 5,
            lockout_base: Duration::from_secs(30),
            lockout_cap: Duration::from_secs(15 * 60),
        }
    }
}

/// Snapshot returned by `status()`. Carries no secrets.
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub unlocked: bool,
    pub first_run: bool,
    pub credential_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_remaining_secs: Option<u64>,
}

/// Plaintext credential fields as submitted by the caller.
#[derive(Debug, Clone, Default)]
pub struct CredentialInput {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub notes: Option<String>,
    pub totp_secret: Option<String>,
    pub backup_codes: Option<String>,
}

/// Plaintext card fields as submitted by the caller.
#[derive(Debug, Clone)]
pub struct CardInput {
    pub title: String,
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub notes: Option<String>,
}

/// The stateful vault core. Exactly one instance owns the master key.
pub struct VaultSession<S: RecordStore> {
    store: S,
    config: SessionConfig,
    key: Option<MasterKey>,
    last_activity: Instant,
    failed_attempts: u32,
    lockout_until: Option<Instant>,
    cache: ListCache,
}

impl<S: RecordStore> VaultSession<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn with_config(store: S, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            key: None,
            last_activity: Instant::now(),
            failed_attempts: 0,
            lockout_until: None,
            cache: ListCache::new(),
        }
    }

    /// Whether a master password has ever been set.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.store.get_meta(META_KDF_SALT)?.is_some())
    }

    /// First-run setup: generate a salt, derive the key, write the canary.
    /// Leaves the vault Locked; call `unlock` afterwards.
    pub fn initialize(&mut self, master_password: &SecretString) -> Result<()> {
        if self.is_initialized()? {
            return Err(VaultError::InvalidInput(
                "Vault is already initialized".into(),
            ));
        }
        let salt = generate_salt()?;
        let key = derive_key(master_password.expose_secret(), &salt)?;
        let canary = encrypt(&key, CANARY_PLAINTEXT)?;

        self.store.set_meta(META_KDF_SALT, &salt)?;
        self.store.set_meta(META_CANARY, &canary.to_blob())?;
        info!("vault initialized");
        Ok(())
    }

    /// Derive a key from the password and verify it against the canary.
    ///
    /// On first run this initializes the vault with the given password.
    /// Five consecutive failures start an escalating lockout window.
    pub fn unlock(&mut self, master_password: &SecretString) -> Result<()> {
        if let Some(retry_after_secs) = self.lockout_remaining() {
            return Err(VaultError::LockedOut { retry_after_secs });
        }

        if !self.is_initialized()? {
            self.initialize(master_password)?;
        }

        let salt = self
            .store
            .get_meta(META_KDF_SALT)?
            .ok_or_else(|| VaultError::Storage("Vault salt missing".into()))?;
        let canary_blob = self
            .store
            .get_meta(META_CANARY)?
            .ok_or_else(|| VaultError::Storage("Vault canary missing".into()))?;

        let key = derive_key(master_password.expose_secret(), &salt)?;
        match decrypt_blob(&key, &canary_blob) {
            Ok(plaintext) if plaintext == CANARY_PLAINTEXT => {
                self.key = Some(key);
                self.failed_attempts = 0;
                self.lockout_until = None;
                self.last_activity = Instant::now();
                info!("vault unlocked");
                Ok(())
            }
            _ => {
                self.register_failed_attempt();
                Err(VaultError::WrongPassword)
            }
        }
    }

    /// Zero the master key and drop all cached plaintext. Idempotent.
    pub fn lock(&mut self) {
        if self.key.take().is_some() {
            info!("vault locked");
        }
        self.cache.clear();
    }

    /// Whether the vault currently holds a key, after applying lazy expiry.
    pub fn is_unlocked(&mut self) -> bool {
        self.expire_if_idle();
        self.key.is_some()
    }

    /// Current state. Does NOT refresh the activity clock, so a polling UI
    /// cannot keep an idle vault unlocked.
    pub fn status(&mut self) -> Result<VaultStatus> {
        self.expire_if_idle();
        Ok(VaultStatus {
            unlocked: self.key.is_some(),
            first_run: !self.is_initialized()?,
            credential_count: self.store.credential_count()?,
            lockout_remaining_secs: self.lockout_remaining(),
        })
    }

    // --- Credentials ---

    /// Decrypted credentials for a domain (exact match or subdomain).
    pub fn get_credentials(&mut self, domain: &str) -> Result<Vec<Credential>> {
        let key = self.unlocked_key()?;
        let rows = self.store.credentials_by_domain(domain)?;
        let credentials = decrypt_rows(&rows, &key);
        self.touch();
        Ok(credentials)
    }

    /// Non-secret summaries for a domain. Works while Locked: domain and
    /// username are plaintext metadata, so the extension can tell "we have an
    /// account here, unlock to fill" without a key.
    pub fn check_credentials(&mut self, domain: &str) -> Result<Vec<CredentialSummary>> {
        self.expire_if_idle();
        let rows = self.store.credentials_by_domain(domain)?;
        Ok(rows.iter().map(CredentialSummary::from).collect())
    }

    pub fn get_all_credentials(&mut self) -> Result<Vec<Credential>> {
        let key = self.unlocked_key()?;
        if let Some(cached) = self.cache.credentials() {
            self.touch();
            return Ok(cached);
        }
        let rows = self.store.list_credentials()?;
        let credentials = decrypt_rows(&rows, &key);
        self.cache.put_credentials(credentials.clone());
        self.touch();
        Ok(credentials)
    }

    pub fn search(&mut self, query: &str) -> Result<Vec<Credential>> {
        let key = self.unlocked_key()?;
        let rows = self.store.search_credentials(query)?;
        let credentials = decrypt_rows(&rows, &key);
        self.touch();
        Ok(credentials)
    }

    /// Encrypt and persist a credential, returning its id.
    ///
    /// A credential with the same domain and username already in the store is
    /// updated in place instead of duplicated.
    pub fn save_credential(&mut self, input: &CredentialInput) -> Result<i64> {
        let key = self.unlocked_key()?;
        validate_credential_input(input)?;

        if let Some(existing) = self
            .store
            .credentials_by_domain(&input.domain)?
            .iter()
            .find(|row| row.domain == input.domain && row.username == input.username)
        {
            let id = existing.id;
            debug!(id, "duplicate save, updating in place");
            let update = CredentialUpdate {
                password: Some(encrypt(&key, input.password.as_bytes())?.to_blob()),
                notes: Some(encrypt_opt(&key, input.notes.as_deref())?),
                totp_secret: Some(encrypt_opt(&key, input.totp_secret.as_deref())?),
                backup_codes: Some(encrypt_opt(&key, input.backup_codes.as_deref())?),
                ..Default::default()
            };
            self.store.update_credential(id, &update)?;
            self.cache.invalidate_credentials();
            self.touch();
            return Ok(id);
        }

        let record = NewCredential {
            domain: input.domain.clone(),
            username: input.username.clone(),
            password: encrypt(&key, input.password.as_bytes())?.to_blob(),
            notes: encrypt_opt(&key, input.notes.as_deref())?,
            totp_secret: encrypt_opt(&key, input.totp_secret.as_deref())?,
            backup_codes: encrypt_opt(&key, input.backup_codes.as_deref())?,
        };
        let id = self.store.insert_credential(&record)?;
        self.cache.invalidate_credentials();
        self.touch();
        Ok(id)
    }

    /// Re-encrypt and overwrite the given fields of an existing credential.
    ///
    /// An explicit `Some(None)` in an optional field clears it.
    pub fn update_credential(
        &mut self,
        id: i64,
        domain: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        notes: Option<Option<&str>>,
        totp_secret: Option<Option<&str>>,
        backup_codes: Option<Option<&str>>,
    ) -> Result<()> {
        let key = self.unlocked_key()?;
        if let Some(Some(secret)) = totp_secret {
            if !totp::is_valid_secret(secret) {
                return Err(VaultError::InvalidInput(
                    "Invalid TOTP secret. Must be a valid base32 string".into(),
                ));
            }
        }

        let update = CredentialUpdate {
            domain: domain.map(str::to_string),
            username: username.map(str::to_string),
            password: password
                .map(|p| encrypt(&key, p.as_bytes()).map(|f| f.to_blob()))
                .transpose()?,
            notes: notes.map(|n| encrypt_opt(&key, n)).transpose()?,
            totp_secret: totp_secret.map(|t| encrypt_opt(&key, t)).transpose()?,
            backup_codes: backup_codes.map(|b| encrypt_opt(&key, b)).transpose()?,
        };
        if !self.store.update_credential(id, &update)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_credentials();
        self.touch();
        Ok(())
    }

    pub fn delete_credential(&mut self, id: i64) -> Result<()> {
        self.unlocked_key()?;
        if !self.store.delete_credential(id)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_credentials();
        self.touch();
        Ok(())
    }

    /// Flip the favorite flag, returning the new state.
    pub fn toggle_favorite(&mut self, id: i64) -> Result<bool> {
        self.unlocked_key()?;
        let state = self
            .store
            .toggle_favorite(id)?
            .ok_or(VaultError::NotFound(id))?;
        self.cache.invalidate_credentials();
        self.touch();
        Ok(state)
    }

    pub fn set_folder(&mut self, id: i64, folder_id: Option<i64>) -> Result<()> {
        self.unlocked_key()?;
        if !self.store.set_folder(id, folder_id)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_credentials();
        self.touch();
        Ok(())
    }

    /// Current TOTP code and seconds until rollover for a credential.
    ///
    /// Cheap enough to poll every second: one blob decrypt and one HMAC, no
    /// key derivation.
    pub fn get_totp(&mut self, id: i64) -> Result<(String, u8)> {
        let key = self.unlocked_key()?;
        let row = self
            .store
            .get_credential(id)?
            .ok_or(VaultError::NotFound(id))?;
        let blob = row.totp_secret.ok_or_else(|| {
            VaultError::InvalidInput("No TOTP secret configured for this credential".into())
        })?;
        let secret = decrypt_string(&key, &blob)?;
        self.touch();
        totp::totp_now(&secret)
    }

    // --- Payment cards ---

    pub fn save_credit_card(&mut self, input: &CardInput) -> Result<i64> {
        let key = self.unlocked_key()?;
        if input.title.trim().is_empty() || input.card_number.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "Card title and number are required".into(),
            ));
        }
        let record = NewCard {
            title: input.title.clone(),
            cardholder_name: input.cardholder_name.clone(),
            card_number: encrypt(&key, input.card_number.as_bytes())?.to_blob(),
            expiry_date: input.expiry_date.clone(),
            cvv: encrypt(&key, input.cvv.as_bytes())?.to_blob(),
            notes: encrypt_opt(&key, input.notes.as_deref())?,
        };
        let id = self.store.insert_card(&record)?;
        self.cache.invalidate_cards();
        self.touch();
        Ok(id)
    }

    pub fn get_all_credit_cards(&mut self) -> Result<Vec<CreditCard>> {
        let key = self.unlocked_key()?;
        if let Some(cached) = self.cache.cards() {
            self.touch();
            return Ok(cached);
        }
        let rows = self.store.list_cards()?;
        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            let card_number = match decrypt_string(&key, &row.card_number) {
                Ok(value) => value,
                Err(_) => {
                    warn!(id = row.id, "skipping card with undecryptable number");
                    continue;
                }
            };
            let cvv = match decrypt_string(&key, &row.cvv) {
                Ok(value) => value,
                Err(_) => {
                    warn!(id = row.id, "skipping card with undecryptable cvv");
                    continue;
                }
            };
            cards.push(CreditCard {
                id: row.id,
                title: row.title,
                cardholder_name: row.cardholder_name,
                card_number,
                expiry_date: row.expiry_date,
                cvv,
                notes: decrypt_opt(&key, row.notes.as_deref()),
                is_favorite: row.is_favorite,
                folder_id: row.folder_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        self.cache.put_cards(cards.clone());
        self.touch();
        Ok(cards)
    }

    pub fn delete_credit_card(&mut self, id: i64) -> Result<()> {
        self.unlocked_key()?;
        if !self.store.delete_card(id)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_cards();
        self.touch();
        Ok(())
    }

    // --- Secure notes ---

    pub fn save_secure_note(&mut self, title: &str, content: &str) -> Result<i64> {
        let key = self.unlocked_key()?;
        if title.trim().is_empty() {
            return Err(VaultError::InvalidInput("Note title is required".into()));
        }
        let record = NewNote {
            title: title.to_string(),
            content: encrypt(&key, content.as_bytes())?.to_blob(),
        };
        let id = self.store.insert_note(&record)?;
        self.cache.invalidate_notes();
        self.touch();
        Ok(id)
    }

    pub fn get_all_secure_notes(&mut self) -> Result<Vec<SecureNote>> {
        let key = self.unlocked_key()?;
        if let Some(cached) = self.cache.notes() {
            self.touch();
            return Ok(cached);
        }
        let rows = self.store.list_notes()?;
        let mut notes = Vec::with_capacity(rows.len());
        for row in rows {
            match decrypt_string(&key, &row.content) {
                Ok(content) => notes.push(SecureNote {
                    id: row.id,
                    title: row.title,
                    content,
                    is_favorite: row.is_favorite,
                    folder_id: row.folder_id,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                }),
                Err(_) => warn!(id = row.id, "skipping undecryptable note"),
            }
        }
        self.cache.put_notes(notes.clone());
        self.touch();
        Ok(notes)
    }

    pub fn delete_secure_note(&mut self, id: i64) -> Result<()> {
        self.unlocked_key()?;
        if !self.store.delete_note(id)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_notes();
        self.touch();
        Ok(())
    }

    // --- Folders ---

    pub fn create_folder(&mut self, name: &str, icon: Option<&str>) -> Result<i64> {
        self.unlocked_key()?;
        if name.trim().is_empty() {
            return Err(VaultError::InvalidInput("Folder name is required".into()));
        }
        let id = self.store.insert_folder(name, icon.unwrap_or("folder"))?;
        self.cache.invalidate_folders();
        self.touch();
        Ok(id)
    }

    pub fn get_folders(&mut self) -> Result<Vec<Folder>> {
        self.unlocked_key()?;
        if let Some(cached) = self.cache.folders() {
            self.touch();
            return Ok(cached);
        }
        let folders = self.store.list_folders()?;
        self.cache.put_folders(folders.clone());
        self.touch();
        Ok(folders)
    }

    pub fn delete_folder(&mut self, id: i64) -> Result<()> {
        self.unlocked_key()?;
        if !self.store.delete_folder(id)? {
            return Err(VaultError::NotFound(id));
        }
        self.cache.invalidate_folders();
        self.cache.invalidate_credentials();
        self.touch();
        Ok(())
    }

    // --- Master password rotation ---

    /// Verify the old password, then re-encrypt every blob in the store under
    /// a key derived from the new password with a fresh salt.
    ///
    /// A record that fails to decrypt aborts the rotation: rotating past a
    /// corrupted record would silently destroy it.
    pub fn change_master_password(
        &mut self,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<()> {
        let old_key = self.unlocked_key()?;

        let salt = self
            .store
            .get_meta(META_KDF_SALT)?
            .ok_or_else(|| VaultError::Storage("Vault salt missing".into()))?;
        let verify = derive_key(old_password.expose_secret(), &salt)?;
        if verify.as_bytes() != old_key.as_bytes() {
            return Err(VaultError::WrongPassword);
        }

        let new_salt = generate_salt()?;
        let new_key = derive_key(new_password.expose_secret(), &new_salt)?;

        for row in self.store.list_credentials()? {
            let update = CredentialUpdate {
                password: Some(reencrypt(&old_key, &new_key, &row.password)?),
                notes: Some(reencrypt_opt(&old_key, &new_key, row.notes.as_deref())?),
                totp_secret: Some(reencrypt_opt(
                    &old_key,
                    &new_key,
                    row.totp_secret.as_deref(),
                )?),
                backup_codes: Some(reencrypt_opt(
                    &old_key,
                    &new_key,
                    row.backup_codes.as_deref(),
                )?),
                ..Default::default()
            };
            self.store.update_credential(row.id, &update)?;
        }
        for row in self.store.list_cards()? {
            let card_number = reencrypt(&old_key, &new_key, &row.card_number)?;
            let cvv = reencrypt(&old_key, &new_key, &row.cvv)?;
            let notes = reencrypt_opt(&old_key, &new_key, row.notes.as_deref())?;
            self.store
                .replace_card_secrets(row.id, &card_number, &cvv, notes.as_deref())?;
        }
        for row in self.store.list_notes()? {
            let content = reencrypt(&old_key, &new_key, &row.content)?;
            self.store.replace_note_content(row.id, &content)?;
        }

        let canary = encrypt(&new_key, CANARY_PLAINTEXT)?;
        self.store.set_meta(META_KDF_SALT, &new_salt)?;
        self.store.set_meta(META_CANARY, &canary.to_blob())?;

        self.key = Some(new_key);
        self.cache.clear();
        self.touch();
        info!("master password changed, vault re-encrypted");
        Ok(())
    }

    // --- Internals ---

    /// Lazy inactivity expiry: lock if the idle window has elapsed.
    /// A zero window means auto-locking is disabled.
    fn expire_if_idle(&mut self) {
        if self.config.inactivity_timeout.is_zero() {
            return;
        }
        if self.key.is_some() && self.last_activity.elapsed() >= self.config.inactivity_timeout {
            info!("inactivity timeout elapsed, locking vault");
            self.lock();
        }
    }

    /// Guard for every operation that needs the key. Applies lazy expiry
    /// first, so a call arriving after the idle window locks the vault and
    /// is itself rejected.
    fn unlocked_key(&mut self) -> Result<MasterKey> {
        self.expire_if_idle();
        self.key.clone().ok_or(VaultError::Locked)
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn lockout_remaining(&self) -> Option<u64> {
        let until = self.lockout_until?;
        let now = Instant::now();
        if until > now {
            Some((until - now).as_secs().max(1))
        } else {
            None
        }
    }

    fn register_failed_attempt(&mut self) {
        self.failed_attempts += 1;
        warn!(attempts = self.failed_attempts, "wrong master password");
        if self.failed_attempts >= self.config.max_failed_attempts {
            let overage = self.failed_attempts - self.config.max_failed_attempts;
            let window = self
                .config
                .lockout_base
                .saturating_mul(1u32 << overage.min(16))
                .min(self.config.lockout_cap);
            warn!(window_secs = window.as_secs(), "unlock lockout engaged");
            self.lockout_until = Some(Instant::now() + window);
        }
    }
}

fn validate_credential_input(input: &CredentialInput) -> Result<()> {
    if input.domain.trim().is_empty() || input.username.trim().is_empty() {
        return Err(VaultError::InvalidInput(
            "Domain and username are required".into(),
        ));
    }
    if let Some(secret) = &input.totp_secret {
        if !totp::is_valid_secret(secret) {
            return Err(VaultError::InvalidInput(
                "Invalid TOTP secret. Must be a valid base32 string".into(),
            ));
        }
    }
    Ok(())
}

/// Decrypt a batch of credential rows, skipping any record whose ciphertext
/// fails authentication. One corrupted record must not take down the vault.
fn decrypt_rows(rows: &[CredentialRow], key: &MasterKey) -> Vec<Credential> {
    rows.iter()
        .filter_map(|row| match decrypt_credential(row, key) {
            Ok(credential) => Some(credential),
            Err(err) => {
                warn!(id = row.id, %err, "skipping undecryptable credential");
                None
            }
        })
        .collect()
}

fn decrypt_credential(row: &CredentialRow, key: &MasterKey) -> Result<Credential> {
    Ok(Credential {
        id: row.id,
        domain: row.domain.clone(),
        username: row.username.clone(),
        password: decrypt_string(key, &row.password)?,
        notes: decrypt_opt(key, row.notes.as_deref()),
        totp_secret: decrypt_opt(key, row.totp_secret.as_deref()),
        backup_codes: decrypt_opt(key, row.backup_codes.as_deref()),
        is_favorite: row.is_favorite,
        folder_id: row.folder_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn encrypt_opt(key: &MasterKey, value: Option<&str>) -> Result<Option<Vec<u8>>> {
    value
        .map(|v| encrypt(key, v.as_bytes()).map(|f| f.to_blob()))
        .transpose()
}

/// Optional-field decrypt for bulk views: a blob that fails to decrypt is
/// dropped rather than failing the record.
fn decrypt_opt(key: &MasterKey, blob: Option<&[u8]>) -> Option<String> {
    blob.and_then(|b| decrypt_string(key, b).ok())
}

fn reencrypt(old_key: &MasterKey, new_key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>> {
    let plaintext = decrypt_blob(old_key, blob)?;
    Ok(encrypt(new_key, &plaintext)?.to_blob())
}

fn reencrypt_opt(
    old_key: &MasterKey,
    new_key: &MasterKey,
    blob: Option<&[u8]>,
) -> Result<Option<Vec<u8>>> {
    blob.map(|b| reencrypt(old_key, new_key, b)).transpose()
}
