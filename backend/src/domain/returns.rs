//! Return confirmation.
//!
//! Resolves the student and book from their operator-facing keys, locks the
//! open loan, charges the late sanction and restores stock and allowance in
//! one ledger transaction.

use std::sync::Arc;

use mockable::Clock;
use tracing::{info, warn};

use super::loans::map_ledger_error;
use super::ports::{LedgerError, LedgerTransaction, LoanLedger, SharedCache};
use super::rules::sanction_for;
use super::{
    BookId, ConfirmRequest, Error, FieldViolation, ReturnReceipt, StudentId, StudentRef,
    catalogue,
};

/// Return/confirmation engine.
#[derive(Clone)]
pub struct ReturnService {
    ledger: Arc<dyn LoanLedger>,
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
}

impl ReturnService {
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

    /// Close the open loan for the named student and book.
    ///
    /// # Errors
    /// - `invalid_request` when the student reference or ISBN is blank.
    /// - `not_found` when the student, the book or an open loan is missing.
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<ReturnReceipt, Error> {
        validate(&request)?;
        let student = self
            .ledger
            .find_student(&request.student)
            .await
            .map_err(map_ledger_error)?;
        let book = self
            .ledger
            .find_book_by_isbn(request.isbn.trim())
            .await
            .map_err(map_ledger_error)?;

        let mut tx = self.ledger.begin().await.map_err(map_ledger_error)?;
        match self.confirm_in(tx.as_mut(), student, book).await {
            Ok(receipt) => {
                tx.commit().await.map_err(map_ledger_error)?;
                info!(
                    loan = %receipt.loan_id,
                    student = %student,
                    book = %book,
                    sanction = receipt.sanction,
                    "return confirmed"
                );
                catalogue::evict_book(self.cache.as_ref(), book).await;
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "confirmation rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn confirm_in(
        &self,
        tx: &mut dyn LedgerTransaction,
        student: StudentId,
        book: BookId,
    ) -> Result<ReturnReceipt, Error> {
        let loan = tx
            .lock_open_loan(student, book)
            .await
            .map_err(|err| match err {
                LedgerError::NotFound { .. } => Error::not_found("no open loan for this book"),
                other => map_ledger_error(other),
            })?;

        let returned_at = self.clock.utc();
        let sanction = sanction_for(loan.due_at, returned_at);
        tx.close_loan(loan.id, returned_at, sanction)
            .await
            .map_err(map_ledger_error)?;
        tx.restore_stock(book).await.map_err(map_ledger_error)?;
        if !tx
            .restore_allowance(student)
            .await
            .map_err(map_ledger_error)?
        {
            warn!(student = %student, "allowance already at cap; not restored");
        }

        Ok(ReturnReceipt {
            loan_id: loan.id,
            student_id: student,
            book_id: book,
            returned_at,
            sanction,
        })
    }
}

fn validate(request: &ConfirmRequest) -> Result<(), Error> {
    let mut violations = Vec::new();
    let blank_student = match &request.student {
        StudentRef::Name(name) => name.trim().is_empty(),
        StudentRef::Nis(_) => false,
    };
    if blank_student {
        violations.push(FieldViolation::new("student", "must not be empty"));
    }
    if request.isbn.trim().is_empty() {
        violations.push(FieldViolation::new("isbn", "must not be empty"));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}
