//! Student identity, roles and registration input.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

/// Student identifier (the school's NIS number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct StudentId(i64);

impl StudentId {
    /// Wrap a raw NIS value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw NIS value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Authorisation role carried in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Library administrator.
    Admin,
    /// Enrolled student.
    Student,
}

impl Role {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }

    /// Parse the stored representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

/// How an operator names a student when confirming a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentRef {
    /// Lookup by NIS.
    Nis(StudentId),
    /// Lookup by exact full name.
    Name(String),
}

impl StudentRef {
    /// Interpret free-form operator input: all digits means NIS.
    ///
    /// # Examples
    /// ```
    /// use lending::domain::{StudentId, StudentRef};
    ///
    /// assert_eq!(StudentRef::parse("12345"), StudentRef::Nis(StudentId::new(12345)));
    /// assert_eq!(StudentRef::parse(" Ada "), StudentRef::Name("Ada".to_owned()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(nis) = trimmed.parse::<i64>() {
                return Self::Nis(StudentId::new(nis));
            }
        }
        Self::Name(trimmed.to_owned())
    }
}

/// Stored credentials used during login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentCredentials {
    /// Student the credentials belong to.
    pub id: StudentId,
    /// PHC-formatted password digest.
    pub password_hash: String,
    /// Role granted at login.
    pub role: Role,
}

/// Raw login input; the password is wiped on drop.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    nis: StudentId,
    password: Zeroizing<String>,
}

impl LoginCredentials {
    /// Build credentials from request parts.
    pub fn new(nis: i64, password: impl Into<String>) -> Self {
        Self {
            nis: StudentId::new(nis),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Claimed NIS.
    pub fn nis(&self) -> StudentId {
        self.nis
    }

    /// Plaintext password.
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

/// Unvalidated registration form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[schema(example = 1234567890)]
    pub nis: i64,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "0812-3456-7890")]
    pub phone_number: String,
    #[schema(example = "ada@school.id")]
    pub email: String,
    pub password: String,
    #[schema(example = "XI")]
    pub class: String,
    #[schema(example = "A")]
    pub sub_class: String,
    #[schema(example = "RPL")]
    pub major: String,
    #[schema(example = 2024)]
    pub batch: i32,
}

/// Validated student row ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub id: StudentId,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub password_hash: String,
    pub class: String,
    pub sub_class: String,
    pub major: String,
    pub batch: i32,
    pub allowance: i32,
    pub role: Role,
}
