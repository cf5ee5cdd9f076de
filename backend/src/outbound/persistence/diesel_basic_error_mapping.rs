//! One-time classification of Diesel failures.
//!
//! Adapters call [`classify`] once and translate the resulting
//! [`DieselFailure`] into their port error; nothing above the adapter looks at
//! driver errors again.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

/// Driver-independent shape of a failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DieselFailure {
    /// A `first`/`get_result` found no row.
    NotFound,
    /// A unique index rejected the write.
    Unique { constraint: Option<String> },
    /// A foreign key pointed at a missing row.
    ForeignKey { constraint: Option<String> },
    /// A `CHECK` constraint rejected the write.
    Check { constraint: Option<String> },
    /// The connection was lost.
    Connection { message: String },
    /// Anything else.
    Query { message: String },
}

pub(crate) fn classify(error: DieselError) -> DieselFailure {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(
                ?kind,
                message = info.message(),
                constraint = info.constraint_name(),
                "diesel operation failed"
            );
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => DieselFailure::NotFound,
        DieselError::DatabaseError(kind, info) => {
            let constraint = info.constraint_name().map(str::to_owned);
            match kind {
                DatabaseErrorKind::UniqueViolation => DieselFailure::Unique { constraint },
                DatabaseErrorKind::ForeignKeyViolation => DieselFailure::ForeignKey { constraint },
                DatabaseErrorKind::CheckViolation => DieselFailure::Check { constraint },
                DatabaseErrorKind::ClosedConnection => DieselFailure::Connection {
                    message: "database connection error".to_owned(),
                },
                _ => DieselFailure::Query {
                    message: "database error".to_owned(),
                },
            }
        }
        DieselError::QueryBuilderError(_) => DieselFailure::Query {
            message: "database query error".to_owned(),
        },
        DieselError::BrokenTransactionManager => DieselFailure::Connection {
            message: "transaction manager is broken".to_owned(),
        },
        other => DieselFailure::Query {
            message: other.to_string(),
        },
    }
}

/// Whether a constraint name mentions `needle`.
pub(crate) fn names(constraint: Option<&str>, needle: &str) -> bool {
    constraint.is_some_and(|name| name.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug)]
    struct Info(Option<&'static str>);

    impl diesel::result::DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "boom"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            self.0
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn db(kind: DatabaseErrorKind, constraint: Option<&'static str>) -> DieselError {
        DieselError::DatabaseError(kind, Box::new(Info(constraint)))
    }

    #[rstest]
    fn not_found_is_kept_distinct() {
        assert_eq!(classify(DieselError::NotFound), DieselFailure::NotFound);
    }

    #[rstest]
    #[case(
        db(DatabaseErrorKind::UniqueViolation, Some("books_isbn_key")),
        DieselFailure::Unique { constraint: Some("books_isbn_key".into()) }
    )]
    #[case(
        db(DatabaseErrorKind::ForeignKeyViolation, None),
        DieselFailure::ForeignKey { constraint: None }
    )]
    #[case(
        db(DatabaseErrorKind::CheckViolation, Some("books_available_stock_check")),
        DieselFailure::Check { constraint: Some("books_available_stock_check".into()) }
    )]
    fn constraint_violations_keep_their_name(
        #[case] error: DieselError,
        #[case] expected: DieselFailure,
    ) {
        assert_eq!(classify(error), expected);
    }

    #[rstest]
    fn closed_connections_are_connection_failures() {
        let failure = classify(db(DatabaseErrorKind::ClosedConnection, None));
        assert!(matches!(failure, DieselFailure::Connection { .. }));
    }

    #[rstest]
    #[case(Some("students_email_key"), "email", true)]
    #[case(Some("students_pkey"), "email", false)]
    #[case(None, "email", false)]
    fn constraint_name_matching(
        #[case] constraint: Option<&str>,
        #[case] needle: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(names(constraint, needle), expected);
    }
}
