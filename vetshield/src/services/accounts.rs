//! In-memory client accounts with bcrypt password hashes.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;
use vetshield_core::utils::redact::mask_email;

use crate::settings::config::SeedAccount;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Account already exists")]
    AlreadyExists,

    #[error("Account not found")]
    NotFound,

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    password_hash: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &mask_email(&self.email))
            .finish_non_exhaustive()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn hash_password(password: &SecretString, cost: u32) -> Result<String, AccountError> {
    let password = password.clone();
    let hash =
        tokio::task::spawn_blocking(move || bcrypt::hash(password.expose_secret(), cost)).await??;
    Ok(hash)
}

async fn verify_password(password: &SecretString, hash: String) -> Result<bool, AccountError> {
    let password = password.clone();
    let matches = tokio::task::spawn_blocking(move || {
        bcrypt::verify(password.expose_secret(), &hash)
    })
    .await?;

    match matches {
        Ok(matches) => Ok(matches),
        Err(e) => {
            warn!("Stored password hash could not be verified: {}", e);
            Ok(false)
        }
    }
}

/// Directory of registered client accounts keyed by normalized e-mail.
#[derive(Clone)]
pub struct AccountDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    hash_cost: u32,
    /// Verified against for unknown addresses, so lookups of unknown and
    /// known accounts take the same time.
    dummy_hash: Arc<str>,
}

impl std::fmt::Debug for AccountDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDirectory")
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

impl AccountDirectory {
    pub fn new(hash_cost: u32, seed: &[SeedAccount]) -> Result<Self, AccountError> {
        let dummy_hash = bcrypt::hash(Uuid::new_v4().simple().to_string(), hash_cost)?;

        let accounts = seed
            .iter()
            .map(|entry| {
                let email = normalize_email(&entry.email);
                let account = Account {
                    id: Uuid::new_v4(),
                    email: email.clone(),
                    password_hash: entry.password_hash.clone(),
                };
                (email, account)
            })
            .collect::<HashMap<_, _>>();
        debug!("Seeded {} account(s)", accounts.len());

        Ok(Self {
            accounts: Arc::new(RwLock::new(accounts)),
            hash_cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn exists(&self, email: &str) -> bool {
        self.accounts
            .read()
            .await
            .contains_key(&normalize_email(email))
    }

    /// Check a password, returning the account on a match.
    pub async fn verify(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<Account>, AccountError> {
        let account = self
            .accounts
            .read()
            .await
            .get(&normalize_email(email))
            .cloned();

        let hash = account
            .as_ref()
            .map(|account| account.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.to_string());

        let matches = verify_password(password, hash).await?;
        Ok(account.filter(|_| matches))
    }

    pub async fn create(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        if self.accounts.read().await.contains_key(&email) {
            return Err(AccountError::AlreadyExists);
        }

        let password_hash = hash_password(password, self.hash_cost).await?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(AccountError::AlreadyExists);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
        };
        accounts.insert(email, account.clone());
        debug!("Created account {}", mask_email(&account.email));

        Ok(account)
    }

    pub async fn set_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        if !self.accounts.read().await.contains_key(&email) {
            return Err(AccountError::NotFound);
        }

        let password_hash = hash_password(password, self.hash_cost).await?;

        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&email).ok_or(AccountError::NotFound)?;
        account.password_hash = password_hash;
        debug!("Updated password of {}", mask_email(&account.email));

        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.into())
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let directory = AccountDirectory::new(COST, &[]).unwrap();
        let account = directory
            .create("Reception@Clinic.example ", &secret("kennel-orbit-42"))
            .await
            .unwrap();
        assert_eq!(account.email, "reception@clinic.example");

        let verified = directory
            .verify("reception@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap();
        assert_eq!(verified.map(|a| a.id), Some(account.id));

        let wrong = directory
            .verify("reception@clinic.example", &secret("wrong"))
            .await
            .unwrap();
        assert!(wrong.is_none());
    }

    #[tokio::test]
    async fn test_unknown_account_does_not_verify() {
        let directory = AccountDirectory::new(COST, &[]).unwrap();
        let result = directory
            .verify("nobody@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let directory = AccountDirectory::new(COST, &[]).unwrap();
        directory
            .create("vet@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap();
        let err = directory
            .create("VET@clinic.example", &secret("another-pass-99"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_seeded_accounts_verify() {
        let hash = bcrypt::hash("kennel-orbit-42", COST).unwrap();
        let seed = vec![
            SeedAccount {
                email: "Front.Desk@clinic.example".to_string(),
                password_hash: hash,
            },
            SeedAccount {
                email: "broken@clinic.example".to_string(),
                password_hash: "not-a-bcrypt-hash".to_string(),
            },
        ];
        let directory = AccountDirectory::new(COST, &seed).unwrap();

        assert!(directory.exists("front.desk@clinic.example").await);
        assert!(directory
            .verify("front.desk@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap()
            .is_some());
        assert!(directory
            .verify("broken@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_password() {
        let directory = AccountDirectory::new(COST, &[]).unwrap();
        directory
            .create("vet@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap();

        directory
            .set_password("vet@clinic.example", &secret("rabbit-hutch-77"))
            .await
            .unwrap();
        assert!(directory
            .verify("vet@clinic.example", &secret("kennel-orbit-42"))
            .await
            .unwrap()
            .is_none());
        assert!(directory
            .verify("vet@clinic.example", &secret("rabbit-hutch-77"))
            .await
            .unwrap()
            .is_some());

        let err = directory
            .set_password("nobody@clinic.example", &secret("rabbit-hutch-77"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
    }
}
