//! PostgreSQL-backed student account adapter.

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{StudentRepository, StudentRepositoryError};
use crate::domain::{NewStudent, Role, StudentCredentials, StudentId};

use super::diesel_basic_error_mapping::{DieselFailure, classify, names};
use super::models::{CredentialsRow, NewStudentRow};
use super::pool::{DbPool, PoolError};
use super::schema::students;

/// Diesel-backed implementation of the student repository port.
#[derive(Clone)]
pub struct DieselStudentRepository {
    pool: DbPool,
}

impl DieselStudentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> StudentRepositoryError {
    StudentRepositoryError::connection(error.into_message())
}

fn map_diesel_error(error: diesel::result::Error) -> StudentRepositoryError {
    match classify(error) {
        DieselFailure::Unique { constraint } if names(constraint.as_deref(), "email") => {
            StudentRepositoryError::duplicate("email")
        }
        DieselFailure::Unique { .. } => StudentRepositoryError::duplicate("nis"),
        DieselFailure::Connection { message } => StudentRepositoryError::connection(message),
        DieselFailure::Query { message } => StudentRepositoryError::query(message),
        other => StudentRepositoryError::query(format!("{other:?}")),
    }
}

fn row_to_credentials(row: CredentialsRow) -> Result<StudentCredentials, StudentRepositoryError> {
    let role = Role::parse(&row.role)
        .ok_or_else(|| StudentRepositoryError::query(format!("unknown role {}", row.role)))?;
    Ok(StudentCredentials {
        id: StudentId::new(row.id),
        password_hash: row.password_hash,
        role,
    })
}

#[async_trait]
impl StudentRepository for DieselStudentRepository {
    async fn find_credentials(
        &self,
        id: StudentId,
    ) -> Result<Option<StudentCredentials>, StudentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<CredentialsRow> = students::table
            .find(id.get())
            .select(CredentialsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_credentials).transpose()
    }

    async fn nis_exists(&self, id: StudentId) -> Result<bool, StudentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(exists(students::table.find(id.get())))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StudentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(exists(students::table.filter(students::email.eq(email))))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn insert(&self, student: &NewStudent) -> Result<(), StudentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewStudentRow {
            id: student.id.get(),
            name: &student.name,
            phone_number: &student.phone_number,
            email: &student.email,
            password_hash: &student.password_hash,
            class: &student.class,
            sub_class: &student.sub_class,
            major: &student.major,
            batch: student.batch,
            allowance: student.allowance,
            role: student.role.as_str(),
        };
        diesel::insert_into(students::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(drop)
            .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn stored_roles_map_onto_the_domain() {
        let creds = row_to_credentials(CredentialsRow {
            id: 7,
            password_hash: "$argon2id$stub".into(),
            role: "admin".into(),
        })
        .expect("known role");
        assert_eq!(creds.id, StudentId::new(7));
        assert_eq!(creds.role, Role::Admin);
    }

    #[rstest]
    fn unknown_roles_are_query_failures() {
        let err = row_to_credentials(CredentialsRow {
            id: 7,
            password_hash: String::new(),
            role: "librarian".into(),
        })
        .expect_err("unknown role");
        assert!(matches!(err, StudentRepositoryError::Query { .. }));
    }
}
