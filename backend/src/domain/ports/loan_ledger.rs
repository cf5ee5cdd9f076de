//! Transactional port over loans, book stock and borrow allowances.
//!
//! A [`LedgerTransaction`] is an explicit handle: every row-locked read and
//! guarded write goes through it, and nothing becomes visible until
//! [`LedgerTransaction::commit`]. Dropping a handle without committing rolls
//! the transaction back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BookId, LoanId, NewLoan, OpenLoan, StudentId, StudentRef};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ledger adapters, classified once at the boundary.
    pub enum LedgerError {
        /// Store connection could not be established or was lost.
        Connection { message: String } => "ledger connection failed: {message}",
        /// Statement failed for an unclassified reason.
        Query { message: String } => "ledger query failed: {message}",
        /// A referenced row does not exist.
        NotFound { entity: String } => "{entity} not found",
        /// A guarded update matched no rows.
        NoRowsAffected { operation: String } => "{operation} affected no rows",
        /// A schema constraint rejected the write.
        ConstraintViolation { constraint: String } => "constraint {constraint} violated",
    }
}

/// Entry point for ledger work.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError>;

    /// Resolve a student from an operator-facing reference.
    async fn find_student(&self, student: &StudentRef) -> Result<StudentId, LedgerError>;

    /// Resolve a book from its ISBN.
    async fn find_book_by_isbn(&self, isbn: &str) -> Result<BookId, LedgerError>;
}

/// Transaction-scoped ledger handle.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Whether an unreturned loan exists for the pair.
    async fn has_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<bool, LedgerError>;

    /// Lock and return the open loan for the pair.
    ///
    /// Fails with [`LedgerError::NotFound`] when no open loan exists.
    async fn lock_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<OpenLoan, LedgerError>;

    /// Insert a new open loan.
    async fn insert_loan(&mut self, loan: &NewLoan) -> Result<LoanId, LedgerError>;

    /// Decrement available stock when positive.
    ///
    /// Fails with [`LedgerError::NoRowsAffected`] when stock is zero.
    async fn take_stock(&mut self, book: BookId) -> Result<(), LedgerError>;

    /// Decrement the student's allowance when positive.
    ///
    /// Fails with [`LedgerError::NoRowsAffected`] when the allowance is spent.
    async fn take_allowance(&mut self, student: StudentId) -> Result<(), LedgerError>;

    /// Close a loan, adding `sanction` to any sanction already recorded.
    async fn close_loan(
        &mut self,
        loan: LoanId,
        returned_at: DateTime<Utc>,
        sanction: i64,
    ) -> Result<(), LedgerError>;

    /// Increment available stock.
    async fn restore_stock(&mut self, book: BookId) -> Result<(), LedgerError>;

    /// Increment the allowance when below the cap.
    ///
    /// Returns `false` when the allowance was already at the cap.
    async fn restore_allowance(&mut self, student: StudentId) -> Result<bool, LedgerError>;

    /// Make every staged change visible.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    /// Discard every staged change.
    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
