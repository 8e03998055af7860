//! Credential check used by the authentication gate.
//!
//! The gate never sees clear-text passwords past this module: it hashes the
//! submitted `login` and `password` with [`hash_credentials`] and hands the
//! login plus the hash to the configured [`Identifier`].
//!
//! ```rust
//! use frontline::security::{hash_credentials, Identifier};
//! use serde_json::{json, Value};
//!
//! struct Fixed { login: String, hash: String }
//!
//! impl Identifier for Fixed {
//!     fn identify(&self, login: &str, hashed: &str) -> Option<Value> {
//!         (login == self.login && hashed == self.hash).then(|| json!({ "login": login }))
//!     }
//! }
//!
//! let id = Fixed { login: "ann".into(), hash: hash_credentials("ann", "secret") };
//! assert!(id.identify("ann", &hash_credentials("ann", "secret")).is_some());
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha512};

/// Looks up a user by login and hashed credentials.
pub trait Identifier: Send + Sync {
    /// Identity to store in the HTTP session, or `None` when the credentials are wrong.
    fn identify(&self, login: &str, hashed: &str) -> Option<Value>;
}

/// Base64 (standard alphabet, padded) of SHA-512 over `login` followed by `password`.
#[must_use]
pub fn hash_credentials(login: &str, password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(login.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}
