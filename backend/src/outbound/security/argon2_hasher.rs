//! Argon2id password digests in PHC string form.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};

use crate::domain::ports::{PasswordHasher, PasswordHasherError};

/// Password hasher using Argon2 default parameters and a random salt.
#[derive(Default, Clone)]
pub struct Argon2PasswordHasher {
    argon: Argon2<'static>,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|digest| digest.to_string())
            .map_err(|err| PasswordHasherError::hash(err.to_string()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordHasherError> {
        let parsed = PasswordHash::new(digest)
            .map_err(|err| PasswordHasherError::malformed_digest(err.to_string()))?;
        match self.argon.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHasherError::hash(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn digests_verify_only_their_own_password() {
        let hasher = Argon2PasswordHasher::new();
        let digest = hasher.hash("correct horse").expect("hash");
        assert!(digest.starts_with("$argon2"));
        assert!(hasher.verify("correct horse", &digest).expect("verify"));
        assert!(!hasher.verify("battery staple", &digest).expect("verify"));
    }

    #[rstest]
    fn salts_differ_between_digests() {
        let hasher = Argon2PasswordHasher::new();
        let a = hasher.hash("same").expect("hash a");
        let b = hasher.hash("same").expect("hash b");
        assert_ne!(a, b);
    }

    #[rstest]
    fn malformed_digest_is_reported() {
        let err = Argon2PasswordHasher::new()
            .verify("x", "plainly-not-a-digest")
            .expect_err("malformed");
        assert!(matches!(err, PasswordHasherError::MalformedDigest { .. }));
    }
}
