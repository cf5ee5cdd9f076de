//! Loan creation.
//!
//! One ledger transaction checks for a duplicate open loan, inserts the loan
//! row, then takes one unit of stock and one unit of the student's
//! allowance. The insert precedes both decrements so that either exhaustion
//! aborts the whole transaction, loan row included.

use std::sync::Arc;

use mockable::Clock;
use tracing::{error, info, warn};

use super::ports::{LedgerError, LedgerTransaction, LoanLedger, SharedCache};
use super::rules::{RuleViolation, parse_due_date};
use super::{Error, FieldViolation, LoanReceipt, LoanRequest, NewLoan, catalogue};

/// Loan transaction engine.
#[derive(Clone)]
pub struct LoanService {
    ledger: Arc<dyn LoanLedger>,
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
}

impl LoanService {
    pub fn new(
        ledger: Arc<dyn LoanLedger>,
        cache: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            cache,
            clock,
        }
    }

    /// Borrow one copy of a book.
    ///
    /// # Errors
    /// - `conflict` when the student already holds an open loan for the book.
    /// - `invalid_request` when the due date is malformed, past or too far.
    /// - `capacity_exceeded` when the book is out of stock or the student's
    ///   allowance is spent.
    pub async fn create(&self, request: LoanRequest) -> Result<LoanReceipt, Error> {
        let mut tx = self.ledger.begin().await.map_err(map_ledger_error)?;
        match self.create_in(tx.as_mut(), &request).await {
            Ok(receipt) => {
                tx.commit().await.map_err(map_ledger_error)?;
                info!(
                    loan = %receipt.loan_id,
                    student = %request.student,
                    book = %request.book,
                    "loan created"
                );
                catalogue::evict_book(self.cache.as_ref(), request.book).await;
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "loan rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn create_in(
        &self,
        tx: &mut dyn LedgerTransaction,
        request: &LoanRequest,
    ) -> Result<LoanReceipt, Error> {
        if tx
            .has_open_loan(request.student, request.book)
            .await
            .map_err(map_ledger_error)?
        {
            return Err(duplicate_loan());
        }

        let now = self.clock.utc();
        let due_at = parse_due_date(&request.due_date, now).map_err(due_date_error)?;
        let loan = NewLoan {
            student: request.student,
            book: request.book,
            borrowed_at: now,
            due_at,
        };

        let loan_id = tx.insert_loan(&loan).await.map_err(|err| match err {
            LedgerError::ConstraintViolation { .. } => duplicate_loan(),
            LedgerError::NotFound { entity } => Error::not_found(format!("{entity} not found")),
            other => map_ledger_error(other),
        })?;
        tx.take_stock(request.book).await.map_err(|err| match err {
            LedgerError::NoRowsAffected { .. } => Error::capacity_exceeded("out of stock"),
            other => map_ledger_error(other),
        })?;
        tx.take_allowance(request.student)
            .await
            .map_err(|err| match err {
                LedgerError::NoRowsAffected { .. } => {
                    Error::capacity_exceeded("borrow limit reached")
                }
                other => map_ledger_error(other),
            })?;

        Ok(LoanReceipt {
            loan_id,
            book_id: request.book,
            borrowed_at: now,
            due_at,
        })
    }
}

fn duplicate_loan() -> Error {
    Error::conflict("book already borrowed by this student")
}

fn due_date_error(violation: RuleViolation) -> Error {
    Error::validation(vec![FieldViolation::new("dueDate", violation.to_string())])
}

/// Classify ledger failures that carry no workflow-specific meaning.
pub(crate) fn map_ledger_error(err: LedgerError) -> Error {
    match err {
        LedgerError::Connection { .. } => {
            error!(error = %err, "ledger unavailable");
            Error::service_unavailable("store temporarily unavailable")
        }
        LedgerError::NotFound { entity } => Error::not_found(format!("{entity} not found")),
        LedgerError::ConstraintViolation { .. } => Error::conflict(err.to_string()),
        other => {
            error!(error = %other, "ledger operation failed");
            Error::internal(other.to_string())
        }
    }
}
