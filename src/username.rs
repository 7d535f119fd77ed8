//! Username providers decide which identifier a service sees for the
//! authenticated principal.
//!
//! The encrypted provider needs a cipher. It is passed in by the caller
//! rather than looked up from global state, so the provider stays a plain
//! serializable value.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::{
    registry::{RegisteredService, Service},
    ticket::Principal,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum UsernameError {
    #[error("Encrypted username provider requires a cipher, but none was supplied")]
    CipherUnavailable,

    #[error("Failed to encrypt username: {0}")]
    Encryption(String),

    #[error("Invalid anonymous username salt: {0}")]
    InvalidSalt(String),
}

/// Encrypts usernames for services that must not see them in the clear.
pub trait UsernameCipher: Send + Sync {
    fn encrypt(&self, username: &str) -> Result<Vec<u8>, UsernameError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseCanonicalization {
    #[default]
    None,
    Lower,
    Upper,
}

impl CaseCanonicalization {
    fn apply(self, value: &str) -> String {
        match self {
            Self::None => value.to_string(),
            Self::Lower => value.to_lowercase(),
            Self::Upper => value.to_uppercase(),
        }
    }
}

/// All supported username providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceUsernameProvider {
    /// The principal id, optionally case-canonicalized.
    Default {
        #[serde(default)]
        canonicalization: CaseCanonicalization,
    },
    /// A stable opaque identifier per principal and service.
    Anonymous { salt: String },
    /// The principal id encrypted with the caller's cipher, base64-encoded.
    Encrypted {
        #[serde(default)]
        canonicalization: CaseCanonicalization,
    },
}

impl Default for RegisteredServiceUsernameProvider {
    fn default() -> Self {
        Self::Default {
            canonicalization: CaseCanonicalization::None,
        }
    }
}

impl RegisteredServiceUsernameProvider {
    /// The username to release to `service`.
    pub fn resolve_username(
        &self,
        principal: &Principal,
        service: &Service,
        registered_service: &RegisteredService,
        cipher: Option<&dyn UsernameCipher>,
    ) -> Result<String, UsernameError> {
        let username = match self {
            Self::Default { canonicalization } => canonicalization.apply(&principal.id),
            Self::Anonymous { salt } => anonymous_id(salt, &principal.id, registered_service)?,
            Self::Encrypted { canonicalization } => {
                let cipher = cipher.ok_or(UsernameError::CipherUnavailable)?;
                let canonical = canonicalization.apply(&principal.id);
                STANDARD.encode(cipher.encrypt(&canonical)?)
            }
        };
        tracing::debug!(service = %service.id, principal = %principal.id, "Resolved username for service");
        Ok(username)
    }
}

/// HMAC-SHA256 over `service!principal`, keyed with the salt.
fn anonymous_id(
    salt: &str,
    principal_id: &str,
    registered_service: &RegisteredService,
) -> Result<String, UsernameError> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| UsernameError::InvalidSalt(e.to_string()))?;
    mac.update(registered_service.service_id.as_bytes());
    mac.update(b"!");
    mac.update(principal_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
