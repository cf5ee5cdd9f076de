//! Port for student accounts.

use async_trait::async_trait;

use crate::domain::{NewStudent, StudentCredentials, StudentId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by student repository adapters.
    pub enum StudentRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "student repository connection failed: {message}",
        /// Query failed during execution or row conversion.
        Query { message: String } => "student repository query failed: {message}",
        /// A unique column already holds the value.
        Duplicate { field: String } => "{field} already registered",
    }
}

/// Port for reading and creating student accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Credentials for login, or `None` when the NIS is unknown.
    async fn find_credentials(
        &self,
        id: StudentId,
    ) -> Result<Option<StudentCredentials>, StudentRepositoryError>;

    /// Whether the NIS is already registered.
    async fn nis_exists(&self, id: StudentId) -> Result<bool, StudentRepositoryError>;

    /// Whether the email is already registered.
    async fn email_exists(&self, email: &str) -> Result<bool, StudentRepositoryError>;

    /// Insert a validated student.
    ///
    /// A concurrent registration of the same NIS or email surfaces as
    /// [`StudentRepositoryError::Duplicate`].
    async fn insert(&self, student: &NewStudent) -> Result<(), StudentRepositoryError>;
}
