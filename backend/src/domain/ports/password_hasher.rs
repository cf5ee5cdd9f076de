//! Port for password digests.

use super::define_port_error;

define_port_error! {
    /// Errors raised by password hashers.
    pub enum PasswordHasherError {
        /// Digest could not be produced.
        Hash { message: String } => "password hashing failed: {message}",
        /// Stored digest is malformed.
        MalformedDigest { message: String } => "stored password digest is malformed: {message}",
    }
}

/// Port for hashing and verifying passwords.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Produce a self-describing digest for `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError>;

    /// Whether `plaintext` matches `digest`.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordHasherError>;
}
