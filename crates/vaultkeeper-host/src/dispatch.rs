//! Request dispatch: decodes wire requests into typed actions and translates
//! session results back into `{success, ...}` responses.
//!
//! Every failure is recovered here and turned into a structured response;
//! nothing from the session layer escapes as a panic or a closed channel.
//! Only a framing violation (handled in `channel`) terminates the connection.

use std::io::{Read, Write};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use vaultkeeper_core::{
    BreachChecker, BreachStatus, CardInput, CredentialInput, RecordStore, VaultError, VaultSession,
};

use crate::channel;

/// One wire request. Unknown `action` values fail to decode and are answered
/// with an error response, never by closing the channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Request {
    Ping,
    Status,
    Unlock {
        password: SecretString,
    },
    Lock,
    GetCredentials {
        domain: String,
    },
    CheckCredentials {
        domain: String,
    },
    GetAllCredentials,
    Search {
        #[serde(default)]
        query: String,
    },
    SaveCredentials {
        domain: String,
        username: String,
        password: String,
        notes: Option<String>,
        totp_secret: Option<String>,
        backup_codes: Option<String>,
        // Saves carrying an id are updates; the flags clear optional columns
        id: Option<i64>,
        #[serde(default)]
        clear_totp: bool,
        #[serde(default)]
        clear_backup: bool,
    },
    UpdateCredentials {
        id: i64,
        domain: Option<String>,
        username: Option<String>,
        password: Option<String>,
        notes: Option<String>,
        totp_secret: Option<String>,
        backup_codes: Option<String>,
        #[serde(default)]
        clear_totp: bool,
        #[serde(default)]
        clear_backup: bool,
    },
    DeleteCredentials {
        id: i64,
    },
    ToggleFavorite {
        id: i64,
    },
    SetFolder {
        id: i64,
        folder_id: Option<i64>,
    },
    GetFolders,
    GetTotp {
        id: i64,
    },
    GetAllCreditCards,
    SaveCreditCard {
        title: String,
        cardholder_name: String,
        card_number: String,
        expiry_date: String,
        cvv: String,
        notes: Option<String>,
    },
    DeleteCreditCard {
        id: i64,
    },
    GetAllSecureNotes,
    SaveSecureNote {
        title: String,
        content: String,
    },
    DeleteSecureNote {
        id: i64,
    },
}

/// Owns the session and turns decoded requests into responses.
pub struct Dispatcher<S: RecordStore> {
    session: VaultSession<S>,
    breach: Option<Arc<BreachChecker>>,
}

impl<S: RecordStore> Dispatcher<S> {
    pub fn new(session: VaultSession<S>, breach: Option<Arc<BreachChecker>>) -> Self {
        Self { session, breach }
    }

    /// Handle one raw request payload, always producing a response payload.
    pub fn handle(&mut self, raw: &[u8]) -> Vec<u8> {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "request is not valid JSON");
                return serialize(json!({
                    "success": false,
                    "error": "Request is not valid JSON",
                }));
            }
        };
        let request_id = value.get("_requestId").cloned();

        let mut response = match serde_json::from_value::<Request>(value.clone()) {
            Ok(request) => self.dispatch(request),
            Err(err) => {
                let action = value
                    .get("action")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing>");
                if err.to_string().starts_with("unknown variant") {
                    json!({
                        "success": false,
                        "error": format!("Unknown action: {}", action),
                    })
                } else {
                    json!({
                        "success": false,
                        "error": format!("Malformed {} request: {}", action, err),
                    })
                }
            }
        };

        if let (Some(id), Some(map)) = (request_id, response.as_object_mut()) {
            map.insert("_requestId".to_string(), id);
        }
        serialize(response)
    }

    fn dispatch(&mut self, request: Request) -> Value {
        match request {
            Request::Ping => json!({
                "success": true,
                "message": "pong",
                "version": vaultkeeper_core::VERSION,
            }),

            Request::Status => match self.session.status() {
                Ok(status) => {
                    let mut response = json!({ "success": true });
                    merge(&mut response, &status);
                    response
                }
                Err(err) => error_response(&err),
            },

            Request::Unlock { password } => match self.session.unlock(&password) {
                Ok(()) => json!({ "success": true, "message": "Vault unlocked" }),
                Err(err) => error_response(&err),
            },

            Request::Lock => {
                self.session.lock();
                json!({ "success": true, "message": "Vault locked" })
            }

            Request::GetCredentials { domain } => match self.session.get_credentials(&domain) {
                Ok(credentials) => json!({ "success": true, "credentials": credentials }),
                Err(err) => error_response(&err),
            },

            Request::CheckCredentials { domain } => {
                match self.session.check_credentials(&domain) {
                    Ok(summaries) => json!({
                        "success": true,
                        "credentials": summaries,
                        "locked": !self.session.is_unlocked(),
                    }),
                    Err(err) => error_response(&err),
                }
            }

            Request::GetAllCredentials => match self.session.get_all_credentials() {
                Ok(credentials) => json!({ "success": true, "credentials": credentials }),
                Err(err) => error_response(&err),
            },

            Request::Search { query } => match self.session.search(&query) {
                Ok(credentials) => json!({ "success": true, "credentials": credentials }),
                Err(err) => error_response(&err),
            },

            Request::SaveCredentials {
                domain,
                username,
                password,
                notes,
                totp_secret,
                backup_codes,
                id,
                clear_totp,
                clear_backup,
            } => {
                if let Some(id) = id {
                    let result = self.session.update_credential(
                        id,
                        Some(&domain),
                        Some(&username),
                        Some(&password),
                        notes.as_deref().map(Some),
                        clear_or_set(clear_totp, totp_secret.as_deref()),
                        clear_or_set(clear_backup, backup_codes.as_deref()),
                    );
                    return match result {
                        Ok(()) => {
                            json!({ "success": true, "message": "Credential updated", "id": id })
                        }
                        Err(err) => error_response(&err),
                    };
                }

                let input = CredentialInput {
                    domain,
                    username,
                    password,
                    notes,
                    totp_secret,
                    backup_codes,
                };
                match self.session.save_credential(&input) {
                    Ok(id) => {
                        self.spawn_breach_check(&input.domain, &input.password);
                        json!({ "success": true, "message": "Credential saved", "id": id })
                    }
                    Err(err) => error_response(&err),
                }
            }

            Request::UpdateCredentials {
                id,
                domain,
                username,
                password,
                notes,
                totp_secret,
                backup_codes,
                clear_totp,
                clear_backup,
            } => {
                let result = self.session.update_credential(
                    id,
                    domain.as_deref(),
                    username.as_deref(),
                    password.as_deref(),
                    notes.as_deref().map(Some),
                    clear_or_set(clear_totp, totp_secret.as_deref()),
                    clear_or_set(clear_backup, backup_codes.as_deref()),
                );
                match result {
                    Ok(()) => json!({ "success": true, "message": "Credential updated" }),
                    Err(err) => error_response(&err),
                }
            }

            Request::DeleteCredentials { id } => match self.session.delete_credential(id) {
                Ok(()) => json!({ "success": true, "message": "Credential deleted" }),
                Err(err) => error_response(&err),
            },

            Request::ToggleFavorite { id } => match self.session.toggle_favorite(id) {
                Ok(is_favorite) => json!({ "success": true, "is_favorite": is_favorite }),
                Err(err) => error_response(&err),
            },

            Request::SetFolder { id, folder_id } => {
                match self.session.set_folder(id, folder_id) {
                    Ok(()) => json!({ "success": true, "message": "Credential moved" }),
                    Err(err) => error_response(&err),
                }
            }

            Request::GetFolders => match self.session.get_folders() {
                Ok(folders) => json!({ "success": true, "folders": folders }),
                Err(err) => error_response(&err),
            },

            Request::GetTotp { id } => match self.session.get_totp(id) {
                Ok((code, remaining_seconds)) => json!({
                    "success": true,
                    "code": code,
                    "remaining_seconds": remaining_seconds,
                    "credential_id": id,
                }),
                Err(err) => error_response(&err),
            },

            Request::GetAllCreditCards => match self.session.get_all_credit_cards() {
                Ok(cards) => json!({ "success": true, "cards": cards }),
                Err(err) => error_response(&err),
            },

            Request::SaveCreditCard {
                title,
                cardholder_name,
                card_number,
                expiry_date,
                cvv,
                notes,
            } => {
                let input = CardInput {
                    title,
                    cardholder_name,
                    card_number,
                    expiry_date,
                    cvv,
                    notes,
                };
                match self.session.save_credit_card(&input) {
                    Ok(id) => json!({ "success": true, "message": "Card saved", "id": id }),
                    Err(err) => error_response(&err),
                }
            }

            Request::DeleteCreditCard { id } => match self.session.delete_credit_card(id) {
                Ok(()) => json!({ "success": true, "message": "Card deleted" }),
                Err(err) => error_response(&err),
            },

            Request::GetAllSecureNotes => match self.session.get_all_secure_notes() {
                Ok(notes) => json!({ "success": true, "notes": notes }),
                Err(err) => error_response(&err),
            },

            Request::SaveSecureNote { title, content } => {
                match self.session.save_secure_note(&title, &content) {
                    Ok(id) => json!({ "success": true, "message": "Note saved", "id": id }),
                    Err(err) => error_response(&err),
                }
            }

            Request::DeleteSecureNote { id } => match self.session.delete_secure_note(id) {
                Ok(()) => json!({ "success": true, "message": "Note deleted" }),
                Err(err) => error_response(&err),
            },
        }
    }

    /// Advisory breach check off the session path. The result is logged,
    /// never surfaced to the extension, and a failure never fails the save.
    fn spawn_breach_check(&self, domain: &str, password: &str) {
        let Some(checker) = &self.breach else {
            return;
        };
        let checker = Arc::clone(checker);
        let domain = domain.to_string();
        let password = password.to_string();
        std::thread::spawn(move || match checker.check(&password) {
            BreachStatus::Compromised(count) => {
                warn!(%domain, count, "saved password appears in breach corpus")
            }
            BreachStatus::Safe => debug!(%domain, "saved password not found in breach corpus"),
            BreachStatus::Error(reason) => debug!(%domain, %reason, "breach check inconclusive"),
        });
    }
}

/// Serve framed requests until the peer closes the stream.
///
/// Requests are processed strictly in arrival order; the session is owned by
/// this loop. A framing violation returns an error and ends the channel.
pub fn serve<S, R, W>(
    dispatcher: &mut Dispatcher<S>,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<()>
where
    S: RecordStore,
    R: Read,
    W: Write,
{
    info!("native messaging channel open");
    while let Some(raw) = channel::read_message(reader)? {
        let response = dispatcher.handle(&raw);
        channel::write_message(writer, &response)?;
    }
    info!("native messaging channel closed by peer");
    Ok(())
}

fn clear_or_set<'a>(clear: bool, value: Option<&'a str>) -> Option<Option<&'a str>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn error_response(err: &VaultError) -> Value {
    let mut response = json!({ "success": false, "error": err.to_string() });
    if matches!(err, VaultError::Locked) {
        response["locked"] = Value::Bool(true);
    }
    response
}

fn merge<T: serde::Serialize>(response: &mut Value, extra: &T) {
    if let (Some(map), Ok(Value::Object(fields))) =
        (response.as_object_mut(), serde_json::to_value(extra))
    {
        map.extend(fields);
    }
}

fn serialize(response: Value) -> Vec<u8> {
    serde_json::to_vec(&response).unwrap_or_else(|_| {
        br#"{"success":false,"error":"Failed to serialize response"}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkeeper_core::SqliteStore;

    fn dispatcher() -> Dispatcher<SqliteStore> {
        let session = VaultSession::new(SqliteStore::open_in_memory().unwrap());
        Dispatcher::new(session, None)
    }

    fn call(dispatcher: &mut Dispatcher<SqliteStore>, request: Value) -> Value {
        let raw = serde_json::to_vec(&request).unwrap();
        serde_json::from_slice(&dispatcher.handle(&raw)).unwrap()
    }

    fn unlock(dispatcher: &mut Dispatcher<SqliteStore>) {
        let response = call(
            dispatcher,
            json!({ "action": "unlock", "password": "master" }),
        );
        assert_eq!(response["success"], true);
    }

    #[test]
    fn test_ping() {
        let mut d = dispatcher();
        let response = call(&mut d, json!({ "action": "ping" }));
        assert_eq!(response["success"], true);
        assert_eq!(response["message"], "pong");
    }

    #[test]
    fn test_unknown_action_does_not_close_channel() {
        let mut d = dispatcher();
        let response = call(&mut d, json!({ "action": "self_destruct" }));
        assert_eq!(response["success"], false);
        assert_eq!(response["error"], "Unknown action: self_destruct");

        // Channel still serves the next request
        let response = call(&mut d, json!({ "action": "ping" }));
        assert_eq!(response["success"], true);
    }

    #[test]
    fn test_invalid_json_is_answered() {
        let mut d = dispatcher();
        let response: Value = serde_json::from_slice(&d.handle(b"{nope")).unwrap();
        assert_eq!(response["success"], false);
    }

    #[test]
    fn test_request_id_is_echoed() {
        let mut d = dispatcher();
        let response = call(&mut d, json!({ "action": "ping", "_requestId": 42 }));
        assert_eq!(response["_requestId"], 42);

        // Also echoed on failures
        let response = call(&mut d, json!({ "action": "bogus", "_requestId": 7 }));
        assert_eq!(response["_requestId"], 7);
    }

    #[test]
    fn test_locked_flag_on_guarded_action() {
        let mut d = dispatcher();
        unlock(&mut d);
        call(&mut d, json!({ "action": "lock" }));

        let response = call(&mut d, json!({ "action": "get_all_credentials" }));
        assert_eq!(response["success"], false);
        assert_eq!(response["locked"], true);
    }

    #[test]
    fn test_status_reports_first_run() {
        let mut d = dispatcher();
        let response = call(&mut d, json!({ "action": "status" }));
        assert_eq!(response["success"], true);
        assert_eq!(response["first_run"], true);
        assert_eq!(response["unlocked"], false);

        unlock(&mut d);
        let response = call(&mut d, json!({ "action": "status" }));
        assert_eq!(response["first_run"], false);
        assert_eq!(response["unlocked"], true);
    }

    #[test]
    fn test_save_get_flow() {
        let mut d = dispatcher();
        unlock(&mut d);

        let response = call(
            &mut d,
            json!({
                "action": "save_credentials",
                "domain": "github.com",
                "username": "alice",
                "password": "hunter2",
                "totp_secret": "JBSWY3DPEHPK3PXP",
            }),
        );
        assert_eq!(response["success"], true);
        let id = response["id"].as_i64().unwrap();

        let response = call(
            &mut d,
            json!({ "action": "get_credentials", "domain": "github.com" }),
        );
        assert_eq!(response["success"], true);
        let creds = response["credentials"].as_array().unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0]["password"], "hunter2");

        let response = call(&mut d, json!({ "action": "get_totp", "id": id }));
        assert_eq!(response["success"], true);
        assert_eq!(response["code"].as_str().unwrap().len(), 6);
        assert_eq!(response["credential_id"], id);
    }

    #[test]
    fn test_save_with_id_updates() {
        let mut d = dispatcher();
        unlock(&mut d);

        let response = call(
            &mut d,
            json!({
                "action": "save_credentials",
                "domain": "github.com",
                "username": "alice",
                "password": "old",
            }),
        );
        let id = response["id"].as_i64().unwrap();

        let response = call(
            &mut d,
            json!({
                "action": "save_credentials",
                "id": id,
                "domain": "github.com",
                "username": "alice",
                "password": "new",
            }),
        );
        assert_eq!(response["success"], true);
        assert_eq!(response["id"], id);

        let response = call(&mut d, json!({ "action": "get_all_credentials" }));
        let creds = response["credentials"].as_array().unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0]["password"], "new");
    }

    #[test]
    fn test_update_clear_totp_flag() {
        let mut d = dispatcher();
        unlock(&mut d);
        let response = call(
            &mut d,
            json!({
                "action": "save_credentials",
                "domain": "github.com",
                "username": "alice",
                "password": "pw",
                "totp_secret": "JBSWY3DPEHPK3PXP",
            }),
        );
        let id = response["id"].as_i64().unwrap();

        let response = call(
            &mut d,
            json!({ "action": "update_credentials", "id": id, "clear_totp": true }),
        );
        assert_eq!(response["success"], true);

        let response = call(&mut d, json!({ "action": "get_totp", "id": id }));
        assert_eq!(response["success"], false);
    }

    #[test]
    fn test_check_credentials_while_locked() {
        let mut d = dispatcher();
        unlock(&mut d);
        call(
            &mut d,
            json!({
                "action": "save_credentials",
                "domain": "github.com",
                "username": "alice",
                "password": "pw",
            }),
        );
        call(&mut d, json!({ "action": "lock" }));

        let response = call(
            &mut d,
            json!({ "action": "check_credentials", "domain": "github.com" }),
        );
        assert_eq!(response["success"], true);
        assert_eq!(response["locked"], true);
        let creds = response["credentials"].as_array().unwrap();
        assert_eq!(creds[0]["username"], "alice");
        assert!(creds[0].get("password").is_none());
    }

    #[test]
    fn test_delete_missing_id() {
        let mut d = dispatcher();
        unlock(&mut d);
        let response = call(&mut d, json!({ "action": "delete_credentials", "id": 99 }));
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("not found"));
    }

    #[test]
    fn test_cards_and_notes_actions() {
        let mut d = dispatcher();
        unlock(&mut d);

        let response = call(
            &mut d,
            json!({
                "action": "save_credit_card",
                "title": "Visa",
                "cardholder_name": "Alice",
                "card_number": "4111111111111111",
                "expiry_date": "12/27",
                "cvv": "123",
            }),
        );
        assert_eq!(response["success"], true);
        let card_id = response["id"].as_i64().unwrap();

        let response = call(&mut d, json!({ "action": "get_all_credit_cards" }));
        assert_eq!(
            response["cards"][0]["card_number"],
            "4111111111111111"
        );

        let response = call(
            &mut d,
            json!({ "action": "save_secure_note", "title": "Wifi", "content": "hunter2" }),
        );
        let note_id = response["id"].as_i64().unwrap();
        let response = call(&mut d, json!({ "action": "get_all_secure_notes" }));
        assert_eq!(response["notes"][0]["content"], "hunter2");

        call(&mut d, json!({ "action": "delete_credit_card", "id": card_id }));
        call(&mut d, json!({ "action": "delete_secure_note", "id": note_id }));
        let response = call(&mut d, json!({ "action": "get_all_credit_cards" }));
        assert!(response["cards"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_serve_over_in_memory_pipe() {
        let mut d = dispatcher();
        let mut wire = Vec::new();
        for request in [
            json!({ "action": "ping", "_requestId": 1 }),
            json!({ "action": "status", "_requestId": 2 }),
        ] {
            channel::write_message(&mut wire, &serde_json::to_vec(&request).unwrap()).unwrap();
        }

        let mut reader = std::io::Cursor::new(wire);
        let mut output = Vec::new();
        serve(&mut d, &mut reader, &mut output).unwrap();

        let mut responses = std::io::Cursor::new(output);
        let first: Value =
            serde_json::from_slice(&channel::read_message(&mut responses).unwrap().unwrap())
                .unwrap();
        let second: Value =
            serde_json::from_slice(&channel::read_message(&mut responses).unwrap().unwrap())
                .unwrap();
        assert_eq!(first["_requestId"], 1);
        assert_eq!(first["message"], "pong");
        assert_eq!(second["_requestId"], 2);
        assert!(channel::read_message(&mut responses).unwrap().is_none());
    }
}
