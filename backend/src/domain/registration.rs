//! Student registration.

use std::sync::Arc;

use tracing::{error, info};

use super::ports::{PasswordHasher, StudentRepository, StudentRepositoryError};
use super::rules::{self, ALLOWANCE_CAP, Major};
use super::{Error, FieldViolation, NewStudent, Registration, Role, StudentId};

const NAME_CHARS: std::ops::RangeInclusive<usize> = 5..=30;
const PASSWORD_CHARS: std::ops::RangeInclusive<usize> = 8..=72;
const BATCH_YEARS: std::ops::RangeInclusive<i32> = 2000..=2100;

/// Registers new students.
#[derive(Clone)]
pub struct RegistrationService {
    students: Arc<dyn StudentRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl RegistrationService {
    pub fn new(students: Arc<dyn StudentRepository>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { students, hasher }
    }

    /// Validate, hash and store a registration.
    ///
    /// Every violation, uniqueness included, is reported in one response.
    pub async fn register(&self, form: Registration) -> Result<StudentId, Error> {
        let (mut student, mut violations) = validate(&form);
        let id = StudentId::new(form.nis);

        if form.nis > 0
            && self
                .students
                .nis_exists(id)
                .await
                .map_err(map_student_error)?
        {
            violations.push(FieldViolation::new("nis", "already registered"));
        }
        if !student.email.is_empty()
            && self
                .students
                .email_exists(&student.email)
                .await
                .map_err(map_student_error)?
        {
            violations.push(FieldViolation::new("email", "already registered"));
        }
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        student.password_hash = self.hasher.hash(&form.password).map_err(|err| {
            error!(error = %err, "password hashing failed");
            Error::internal(err.to_string())
        })?;
        self.students.insert(&student).await.map_err(|err| match err {
            StudentRepositoryError::Duplicate { field } => {
                Error::validation(vec![FieldViolation::new(field, "already registered")])
            }
            other => map_student_error(other),
        })?;
        info!(student = %id, "student registered");
        Ok(id)
    }
}

fn validate(form: &Registration) -> (NewStudent, Vec<FieldViolation>) {
    let mut violations = Vec::new();

    if form.nis <= 0 {
        violations.push(FieldViolation::new("nis", "must be a positive number"));
    }
    let name = form.name.trim().to_owned();
    if !NAME_CHARS.contains(&name.chars().count()) {
        violations.push(FieldViolation::new("name", "must be 5-30 characters"));
    }
    let email = form.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        violations.push(FieldViolation::new("email", "must be a valid email address"));
    }
    let phone = rules::normalize_phone(&form.phone_number).unwrap_or_else(|violation| {
        violations.push(FieldViolation::new("phoneNumber", violation.to_string()));
        String::new()
    });
    if !PASSWORD_CHARS.contains(&form.password.chars().count()) {
        violations.push(FieldViolation::new("password", "must be 8-72 characters"));
    }
    if !BATCH_YEARS.contains(&form.batch) {
        violations.push(FieldViolation::new("batch", "must be a year between 2000 and 2100"));
    }

    let class = form.class.trim().to_uppercase();
    let major = match Major::parse(&form.major.trim().to_uppercase()) {
        Ok(major) => {
            if let Err(violation) = rules::validate_class(major, &class) {
                violations.push(FieldViolation::new("class", violation.to_string()));
            }
            major.code().to_owned()
        }
        Err(violation) => {
            violations.push(FieldViolation::new("major", violation.to_string()));
            String::new()
        }
    };
    let sub_class = form.sub_class.trim().to_uppercase();
    if let Err(violation) = rules::validate_sub_class(&sub_class) {
        violations.push(FieldViolation::new("subClass", violation.to_string()));
    }

    let student = NewStudent {
        id: StudentId::new(form.nis),
        name,
        phone_number: phone,
        email,
        password_hash: String::new(),
        class,
        sub_class,
        major,
        batch: form.batch,
        allowance: ALLOWANCE_CAP,
        role: Role::Student,
    };
    (student, violations)
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !email.chars().any(char::is_whitespace)
}

fn map_student_error(err: StudentRepositoryError) -> Error {
    error!(error = %err, "student store call failed");
    match err {
        StudentRepositoryError::Connection { .. } => {
            Error::service_unavailable("student store unavailable")
        }
        other => Error::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::{MockPasswordHasher, MockStudentRepository};
    use rstest::{fixture, rstest};

    #[fixture]
    fn form() -> Registration {
        Registration {
            nis: 2_024_001,
            name: " Ada Lovelace ".into(),
            phone_number: "0812-3456-7890".into(),
            email: "Ada@School.id".into(),
            password: "correct horse".into(),
            class: "xi".into(),
            sub_class: "b".into(),
            major: "rpl".into(),
            batch: 2024,
        }
    }

    fn hasher() -> MockPasswordHasher {
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_hash()
            .returning(|plain| Ok(format!("$argon2id${plain}")));
        hasher
    }

    fn fresh_students() -> MockStudentRepository {
        let mut repo = MockStudentRepository::new();
        repo.expect_nis_exists().returning(|_| Ok(false));
        repo.expect_email_exists().returning(|_| Ok(false));
        repo
    }

    #[rstest]
    #[tokio::test]
    async fn valid_form_is_normalised_and_stored(form: Registration) {
        let mut repo = fresh_students();
        repo.expect_insert()
            .withf(|s| {
                s.name == "Ada Lovelace"
                    && s.phone_number == "+6281234567890"
                    && s.email == "ada@school.id"
                    && s.class == "XI"
                    && s.sub_class == "B"
                    && s.major == "RPL"
                    && s.allowance == ALLOWANCE_CAP
                    && s.role == Role::Student
                    && s.password_hash.starts_with("$argon2id$")
            })
            .times(1)
            .returning(|_| Ok(()));
        let service = RegistrationService::new(Arc::new(repo), Arc::new(hasher()));

        let id = service.register(form).await.expect("registered");
        assert_eq!(id, StudentId::new(2_024_001));
    }

    #[rstest]
    #[tokio::test]
    async fn all_violations_are_reported_together(form: Registration) {
        let mut repo = MockStudentRepository::new();
        repo.expect_nis_exists().returning(|_| Ok(true));
        repo.expect_email_exists().returning(|_| Ok(false));
        let service = RegistrationService::new(Arc::new(repo), Arc::new(hasher()));
        let bad = Registration {
            name: "Ada".into(),
            phone_number: "12345".into(),
            class: "XIII".into(),
            sub_class: "D".into(),
            password: "short".into(),
            ..form
        };

        let err = service.register(bad).await.expect_err("invalid");

        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        let fields: Vec<String> = err
            .details()
            .and_then(|d| d.get("fields"))
            .and_then(|f| f.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("field")?.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        assert_eq!(
            fields,
            ["name", "phoneNumber", "password", "class", "subClass", "nis"]
        );
    }

    #[rstest]
    #[case("XIII", "IOP", true)]
    #[case("XIII", "SIJA", true)]
    #[case("XIII", "TEI", false)]
    #[case("X", "MEKA", true)]
    #[case("X", "ART", false)]
    #[tokio::test]
    async fn classes_depend_on_major(
        form: Registration,
        #[case] class: &str,
        #[case] major: &str,
        #[case] accepted: bool,
    ) {
        let mut repo = fresh_students();
        repo.expect_insert().returning(|_| Ok(()));
        let service = RegistrationService::new(Arc::new(repo), Arc::new(hasher()));
        let input = Registration {
            class: class.into(),
            major: major.into(),
            ..form
        };
        assert_eq!(service.register(input).await.is_ok(), accepted);
    }

    #[rstest]
    #[case("ada@school")]
    #[case("@school.id")]
    #[case("ada school@x.id")]
    #[tokio::test]
    async fn malformed_email_is_rejected(form: Registration, #[case] email: &str) {
        let service = RegistrationService::new(Arc::new(fresh_students()), Arc::new(hasher()));
        let err = service
            .register(Registration {
                email: email.into(),
                ..form
            })
            .await
            .expect_err("bad email");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn racing_duplicate_insert_is_a_field_violation(form: Registration) {
        let mut repo = fresh_students();
        repo.expect_insert()
            .returning(|_| Err(StudentRepositoryError::duplicate("email")));
        let service = RegistrationService::new(Arc::new(repo), Arc::new(hasher()));

        let err = service.register(form).await.expect_err("duplicate");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
