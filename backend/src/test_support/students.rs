//! In-process student accounts and a reversible password "hasher".

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{
    PasswordHasher, PasswordHasherError, StudentRepository, StudentRepositoryError,
};
use crate::domain::rules::ALLOWANCE_CAP;
use crate::domain::{NewStudent, Role, StudentCredentials, StudentId};

/// Student table held in process memory.
#[derive(Default)]
pub struct InMemoryStudents {
    rows: Mutex<BTreeMap<StudentId, NewStudent>>,
}

impl InMemoryStudents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account directly, bypassing registration rules.
    pub fn seed(&self, id: StudentId, name: &str, role: Role, password_hash: &str) {
        self.lock().insert(
            id,
            NewStudent {
                id,
                name: name.to_owned(),
                phone_number: "+628123456789".to_owned(),
                email: format!("{}@school.id", id.get()),
                password_hash: password_hash.to_owned(),
                class: "XI".to_owned(),
                sub_class: "A".to_owned(),
                major: "RPL".to_owned(),
                batch: 2024,
                allowance: ALLOWANCE_CAP,
                role,
            },
        );
    }

    /// The stored row for `id`.
    pub fn get(&self, id: StudentId) -> Option<NewStudent> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<StudentId, NewStudent>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StudentRepository for InMemoryStudents {
    async fn find_credentials(
        &self,
        id: StudentId,
    ) -> Result<Option<StudentCredentials>, StudentRepositoryError> {
        Ok(self.lock().get(&id).map(|row| StudentCredentials {
            id: row.id,
            password_hash: row.password_hash.clone(),
            role: row.role,
        }))
    }

    async fn nis_exists(&self, id: StudentId) -> Result<bool, StudentRepositoryError> {
        Ok(self.lock().contains_key(&id))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StudentRepositoryError> {
        Ok(self.lock().values().any(|row| row.email == email))
    }

    async fn insert(&self, student: &NewStudent) -> Result<(), StudentRepositoryError> {
        let mut rows = self.lock();
        if rows.contains_key(&student.id) {
            return Err(StudentRepositoryError::duplicate("nis"));
        }
        if rows.values().any(|row| row.email == student.email) {
            return Err(StudentRepositoryError::duplicate("email"));
        }
        rows.insert(student.id, student.clone());
        Ok(())
    }
}

const PLAIN_PREFIX: &str = "plain$";

/// Hasher that stores the password behind a marker prefix.
///
/// Only for tests: it keeps login round trips fast without Argon2 cost.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPasswordHasher;

impl PlainPasswordHasher {
    /// Digest for `password` as this hasher would store it.
    pub fn digest(password: &str) -> String {
        format!("{PLAIN_PREFIX}{password}")
    }
}

impl PasswordHasher for PlainPasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError> {
        Ok(Self::digest(plaintext))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordHasherError> {
        digest
            .strip_prefix(PLAIN_PREFIX)
            .map(|stored| stored == plaintext)
            .ok_or_else(|| PasswordHasherError::malformed_digest("missing plain$ prefix"))
    }
}
