//! User identity store.
//!
//! One record per user: the id plus its credential, either an argon2
//! password hash or an ed25519 public key in base64. First contact
//! auto-provisions the account; the credential is persisted before the
//! success verdict is returned, so a reported registration always
//! survives a restart.
//!
//! Snapshot line format: `userId:pwd:<argon2-phc>` or
//! `userId:key:<base64>`.

use crate::error::{CatalogError, CatalogResult};
use crate::snapshot;
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// A stored user credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Argon2 password hash in PHC string format.
    Password(String),
    /// Base64 ed25519 public key.
    Certificate(String),
}

/// Outcome of a password authentication attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordVerdict {
    /// Unknown id: the account was provisioned with this password.
    NewUser,
    /// Known id, password matched.
    Ok,
    /// Known id, password (or credential kind) did not match.
    Wrong,
}

struct UserTable {
    users: BTreeMap<String, Credential>,
    path: PathBuf,
}

impl UserTable {
    fn render(&self) -> String {
        let mut out = String::new();
        for (id, credential) in &self.users {
            match credential {
                Credential::Password(hash) => {
                    out.push_str(id);
                    out.push_str(":pwd:");
                    out.push_str(hash);
                }
                Credential::Certificate(key) => {
                    out.push_str(id);
                    out.push_str(":key:");
                    out.push_str(key);
                }
            }
            out.push('\n');
        }
        out
    }

    async fn persist(&self) -> CatalogResult<()> {
        snapshot::rewrite(&self.path, &self.render()).await
    }
}

/// The user identity store.
pub struct UserRegistry {
    inner: RwLock<UserTable>,
}

impl UserRegistry {
    /// Load the registry from its snapshot file.
    pub async fn load(path: PathBuf) -> CatalogResult<Self> {
        let mut users = BTreeMap::new();
        for line in snapshot::load_lines(&path).await? {
            let mut fields = line.splitn(3, ':');
            let (id, kind, material) = match (fields.next(), fields.next(), fields.next()) {
                (Some(id), Some(kind), Some(material)) => (id, kind, material),
                _ => {
                    return Err(CatalogError::Corrupt {
                        file: path.display().to_string(),
                        detail: format!("bad user record: {line}"),
                    })
                }
            };
            let credential = match kind {
                "pwd" => Credential::Password(material.to_string()),
                "key" => Credential::Certificate(material.to_string()),
                other => {
                    return Err(CatalogError::Corrupt {
                        file: path.display().to_string(),
                        detail: format!("unknown credential kind: {other}"),
                    })
                }
            };
            users.insert(id.to_string(), credential);
        }

        Ok(Self {
            inner: RwLock::new(UserTable { users, path }),
        })
    }

    /// Whether the id names a known identity.
    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.inner.read().await.users.contains_key(user_id)
    }

    /// Password-mode authentication. Unknown ids are auto-provisioned
    /// (the new credential is durable before `NewUser` is returned);
    /// known ids verify without mutating state.
    pub async fn authenticate_password(
        &self,
        user_id: &str,
        password: &str,
    ) -> CatalogResult<PasswordVerdict> {
        {
            let table = self.inner.read().await;
            if let Some(credential) = table.users.get(user_id) {
                let Credential::Password(hash) = credential else {
                    return Ok(PasswordVerdict::Wrong);
                };
                return Ok(if verify_password(password, hash)? {
                    PasswordVerdict::Ok
                } else {
                    PasswordVerdict::Wrong
                });
            }
        }

        let hash = hash_password(password)?;
        let mut table = self.inner.write().await;
        // Another connection may have provisioned the id while the
        // read lock was released.
        match table.users.get(user_id) {
            Some(Credential::Password(existing)) => {
                return Ok(if verify_password(password, existing)? {
                    PasswordVerdict::Ok
                } else {
                    PasswordVerdict::Wrong
                });
            }
            Some(Credential::Certificate(_)) => return Ok(PasswordVerdict::Wrong),
            None => {}
        }
        table
            .users
            .insert(user_id.to_string(), Credential::Password(hash));
        if let Err(e) = table.persist().await {
            table.users.remove(user_id);
            return Err(e);
        }
        Ok(PasswordVerdict::NewUser)
    }

    /// The stored certificate for a user, if any.
    pub async fn certificate(&self, user_id: &str) -> Option<String> {
        match self.inner.read().await.users.get(user_id) {
            Some(Credential::Certificate(key)) => Some(key.clone()),
            _ => None,
        }
    }

    /// Bind a certificate to a previously unknown id. The binding is
    /// durable before success is returned and is never overwritten.
    pub async fn bind_certificate(&self, user_id: &str, certificate: &str) -> CatalogResult<bool> {
        let mut table = self.inner.write().await;
        if table.users.contains_key(user_id) {
            return Ok(false);
        }
        table.users.insert(
            user_id.to_string(),
            Credential::Certificate(certificate.to_string()),
        );
        if let Err(e) = table.persist().await {
            table.users.remove(user_id);
            return Err(e);
        }
        Ok(true)
    }
}

fn hash_password(password: &str) -> CatalogResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CatalogError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> CatalogResult<bool> {
    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| CatalogError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
