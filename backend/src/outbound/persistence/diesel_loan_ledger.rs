//! PostgreSQL-backed loan ledger.
//!
//! Each [`LedgerTransaction`] owns a pooled connection with an open
//! transaction. Reads that precede a write take `FOR UPDATE` row locks and
//! every decrement is guarded in its `WHERE` clause, so concurrent borrowers
//! of the last copy serialize on the book row and the loser sees zero rows
//! affected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{exists, sql};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable};
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use tracing::debug;

use crate::domain::ports::{LedgerError, LedgerTransaction, LoanLedger};
use crate::domain::rules::ALLOWANCE_CAP;
use crate::domain::{BookId, LoanId, NewLoan, OpenLoan, StudentId, StudentRef};

use super::diesel_basic_error_mapping::{DieselFailure, classify, names};
use super::models::NewLoanRow;
use super::pool::{DbPool, OwnedConnection, PoolError};
use super::schema::{books, loans, students};

/// Index guaranteeing one open loan per student and book.
const OPEN_LOAN_INDEX: &str = "loans_one_open_per_pair";

/// Diesel-backed implementation of the loan ledger port.
#[derive(Clone)]
pub struct DieselLoanLedger {
    pool: DbPool,
}

impl DieselLoanLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> LedgerError {
    LedgerError::connection(error.into_message())
}

fn map_diesel_error(error: diesel::result::Error) -> LedgerError {
    match classify(error) {
        DieselFailure::NotFound => LedgerError::not_found("row"),
        DieselFailure::Unique { constraint } => LedgerError::constraint_violation(
            constraint.unwrap_or_else(|| OPEN_LOAN_INDEX.to_owned()),
        ),
        DieselFailure::ForeignKey { constraint } => {
            if names(constraint.as_deref(), "student") {
                LedgerError::not_found("student")
            } else {
                LedgerError::not_found("book")
            }
        }
        DieselFailure::Check { constraint } => {
            LedgerError::constraint_violation(constraint.unwrap_or_else(|| "check".to_owned()))
        }
        DieselFailure::Connection { message } => LedgerError::connection(message),
        DieselFailure::Query { message } => LedgerError::query(message),
    }
}

fn guarded(rows: usize, operation: &str) -> Result<(), LedgerError> {
    if rows == 0 {
        Err(LedgerError::no_rows_affected(operation))
    } else {
        Ok(())
    }
}

#[async_trait]
impl LoanLedger for DieselLoanLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let mut conn = self.pool.get_owned().await.map_err(map_pool_error)?;
        AnsiTransactionManager::begin_transaction(&mut *conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(Box::new(DieselLedgerTransaction { conn }))
    }

    async fn find_student(&self, student: &StudentRef) -> Result<StudentId, LedgerError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let found: Option<i64> = match student {
            StudentRef::Nis(id) => {
                students::table
                    .find(id.get())
                    .select(students::id)
                    .first(&mut conn)
                    .await
            }
            StudentRef::Name(name) => {
                students::table
                    .filter(students::name.eq(name))
                    .select(students::id)
                    .order_by(students::id)
                    .first(&mut conn)
                    .await
            }
        }
        .optional()
        .map_err(map_diesel_error)?;
        found
            .map(StudentId::new)
            .ok_or_else(|| LedgerError::not_found("student"))
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> Result<BookId, LedgerError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        books::table
            .filter(books::isbn.eq(isbn))
            .select(books::id)
            .first::<i32>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(BookId::new)
            .ok_or_else(|| LedgerError::not_found("book"))
    }
}

/// Open transaction on a connection checked out for its whole lifetime.
///
/// Dropping it without `commit` returns the connection mid-transaction; the
/// pool treats such a connection as broken and closes it, which rolls the
/// transaction back server-side.
struct DieselLedgerTransaction {
    conn: OwnedConnection,
}

impl DieselLedgerTransaction {
    fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl LedgerTransaction for DieselLedgerTransaction {
    async fn has_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<bool, LedgerError> {
        diesel::select(exists(
            loans::table
                .filter(loans::student_id.eq(student.get()))
                .filter(loans::book_id.eq(book.get()))
                .filter(loans::returned_at.is_null()),
        ))
        .get_result(self.conn())
        .await
        .map_err(map_diesel_error)
    }

    async fn lock_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<OpenLoan, LedgerError> {
        let row: Option<(i64, DateTime<Utc>)> = loans::table
            .filter(loans::student_id.eq(student.get()))
            .filter(loans::book_id.eq(book.get()))
            .filter(loans::returned_at.is_null())
            .select((loans::id, loans::due_at))
            .for_update()
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(|(id, due_at)| OpenLoan {
            id: LoanId::new(id),
            due_at,
        })
        .ok_or_else(|| LedgerError::not_found("loan"))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> Result<LoanId, LedgerError> {
        diesel::insert_into(loans::table)
            .values(&NewLoanRow {
                student_id: loan.student.get(),
                book_id: loan.book.get(),
                borrowed_at: loan.borrowed_at,
                due_at: loan.due_at,
            })
            .returning(loans::id)
            .get_result::<i64>(self.conn())
            .await
            .map(LoanId::new)
            .map_err(map_diesel_error)
    }

    async fn take_stock(&mut self, book: BookId) -> Result<(), LedgerError> {
        books::table
            .find(book.get())
            .select(books::id)
            .for_update()
            .first::<i32>(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| LedgerError::not_found("book"))?;
        let rows = diesel::update(
            books::table
                .find(book.get())
                .filter(books::available_stock.gt(0)),
        )
        .set(books::available_stock.eq(books::available_stock - 1))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        guarded(rows, "take_stock")
    }

    async fn take_allowance(&mut self, student: StudentId) -> Result<(), LedgerError> {
        students::table
            .find(student.get())
            .select(students::id)
            .for_update()
            .first::<i64>(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| LedgerError::not_found("student"))?;
        let rows = diesel::update(
            students::table
                .find(student.get())
                .filter(students::allowance.gt(0)),
        )
        .set(students::allowance.eq(students::allowance - 1))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        guarded(rows, "take_allowance")
    }

    async fn close_loan(
        &mut self,
        loan: LoanId,
        returned_at: DateTime<Utc>,
        sanction: i64,
    ) -> Result<(), LedgerError> {
        let rows = diesel::update(
            loans::table
                .find(loan.get())
                .filter(loans::returned_at.is_null()),
        )
        .set((
            loans::returned_at.eq(Some(returned_at)),
            loans::sanction.eq(
                sql::<Nullable<BigInt>>("COALESCE(sanction, 0) + ").bind::<BigInt, _>(sanction),
            ),
        ))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        guarded(rows, "close_loan")
    }

    async fn restore_stock(&mut self, book: BookId) -> Result<(), LedgerError> {
        let rows = diesel::update(books::table.find(book.get()))
            .set(books::available_stock.eq(books::available_stock + 1))
            .execute(self.conn())
            .await
            .map_err(map_diesel_error)?;
        if rows == 0 {
            return Err(LedgerError::not_found("book"));
        }
        Ok(())
    }

    async fn restore_allowance(&mut self, student: StudentId) -> Result<bool, LedgerError> {
        let current: i32 = students::table
            .find(student.get())
            .select(students::allowance)
            .for_update()
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| LedgerError::not_found("student"))?;
        if current >= ALLOWANCE_CAP {
            debug!(student = student.get(), "allowance already at cap");
            return Ok(false);
        }
        let rows = diesel::update(
            students::table
                .find(student.get())
                .filter(students::allowance.lt(ALLOWANCE_CAP)),
        )
        .set(students::allowance.eq(students::allowance + 1))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(rows == 1)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), LedgerError> {
        AnsiTransactionManager::commit_transaction(self.conn())
            .await
            .map_err(map_diesel_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), LedgerError> {
        AnsiTransactionManager::rollback_transaction(self.conn())
            .await
            .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
    use rstest::rstest;

    #[derive(Debug)]
    struct Info(Option<&'static str>);

    impl DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "violation"
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
    #[case(
        db(DatabaseErrorKind::UniqueViolation, None),
        LedgerError::constraint_violation(OPEN_LOAN_INDEX)
    )]
    #[case(
        db(DatabaseErrorKind::ForeignKeyViolation, Some("loans_student_id_fkey")),
        LedgerError::not_found("student")
    )]
    #[case(
        db(DatabaseErrorKind::ForeignKeyViolation, Some("loans_book_id_fkey")),
        LedgerError::not_found("book")
    )]
    #[case(
        db(DatabaseErrorKind::CheckViolation, Some("books_available_stock_check")),
        LedgerError::constraint_violation("books_available_stock_check")
    )]
    fn violations_classify_by_constraint(
        #[case] error: DieselError,
        #[case] expected: LedgerError,
    ) {
        assert_eq!(map_diesel_error(error), expected);
    }

    #[rstest]
    #[case(0, Err(LedgerError::no_rows_affected("take_stock")))]
    #[case(1, Ok(()))]
    fn zero_rows_fail_the_guard(#[case] rows: usize, #[case] expected: Result<(), LedgerError>) {
        assert_eq!(guarded(rows, "take_stock"), expected);
    }
}
