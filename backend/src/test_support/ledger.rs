//! In-process loan ledger with serialised, all-or-nothing transactions.
//!
//! A transaction holds an exclusive permit for its whole lifetime and works
//! on a private copy of the tables; commit publishes the copy, while rollback
//! or drop discards it. This is coarser than row locks but gives the same
//! observable guarantees.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ports::{LedgerError, LedgerTransaction, LoanLedger};
use crate::domain::rules::ALLOWANCE_CAP;
use crate::domain::{BookId, LoanId, NewLoan, OpenLoan, StudentId, StudentRef};

#[derive(Debug, Clone)]
struct StudentRow {
    name: String,
    allowance: i32,
}

#[derive(Debug, Clone)]
struct BookRow {
    isbn: String,
    stock: i32,
}

#[derive(Debug, Clone)]
struct LoanRow {
    id: LoanId,
    student: StudentId,
    book: BookId,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    sanction: Option<i64>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    students: BTreeMap<StudentId, StudentRow>,
    books: BTreeMap<BookId, BookRow>,
    loans: Vec<LoanRow>,
    next_loan: i64,
}

/// Ledger held in process memory.
#[derive(Default)]
pub struct InMemoryLedger {
    tables: Arc<Mutex<Tables>>,
    permit: Arc<AsyncMutex<()>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_student(&self, id: StudentId, name: &str, allowance: i32) {
        self.lock().students.insert(
            id,
            StudentRow {
                name: name.to_owned(),
                allowance,
            },
        );
    }

    pub fn add_book(&self, id: BookId, isbn: &str, stock: i32) {
        self.lock().books.insert(
            id,
            BookRow {
                isbn: isbn.to_owned(),
                stock,
            },
        );
    }

    pub fn set_allowance(&self, id: StudentId, allowance: i32) {
        if let Some(row) = self.lock().students.get_mut(&id) {
            row.allowance = allowance;
        }
    }

    pub fn stock(&self, id: BookId) -> Option<i32> {
        self.lock().books.get(&id).map(|row| row.stock)
    }

    pub fn allowance(&self, id: StudentId) -> Option<i32> {
        self.lock().students.get(&id).map(|row| row.allowance)
    }

    /// Number of unreturned loans held by `student`.
    pub fn open_loans(&self, student: StudentId) -> usize {
        self.lock()
            .loans
            .iter()
            .filter(|loan| loan.student == student && loan.returned_at.is_none())
            .count()
    }

    /// Sanctions recorded against `student`, oldest loan first.
    pub fn sanctions(&self, student: StudentId) -> Vec<Option<i64>> {
        self.lock()
            .loans
            .iter()
            .filter(|loan| loan.student == student)
            .map(|loan| loan.sanction)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        lock_tables(&self.tables)
    }
}

fn lock_tables(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    match tables.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl LoanLedger for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let permit = Arc::clone(&self.permit).lock_owned().await;
        let staged = self.lock().clone();
        Ok(Box::new(InMemoryTransaction {
            _permit: permit,
            tables: Arc::clone(&self.tables),
            staged,
        }))
    }

    async fn find_student(&self, student: &StudentRef) -> Result<StudentId, LedgerError> {
        let tables = self.lock();
        let found = match student {
            StudentRef::Nis(id) => tables.students.contains_key(id).then_some(*id),
            StudentRef::Name(name) => tables
                .students
                .iter()
                .find(|(_, row)| row.name == *name)
                .map(|(id, _)| *id),
        };
        found.ok_or_else(|| LedgerError::not_found("student"))
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> Result<BookId, LedgerError> {
        self.lock()
            .books
            .iter()
            .find(|(_, row)| row.isbn == isbn)
            .map(|(id, _)| *id)
            .ok_or_else(|| LedgerError::not_found("book"))
    }
}

struct InMemoryTransaction {
    _permit: OwnedMutexGuard<()>,
    tables: Arc<Mutex<Tables>>,
    staged: Tables,
}

impl InMemoryTransaction {
    fn open_loan_mut(&mut self, student: StudentId, book: BookId) -> Option<&mut LoanRow> {
        self.staged
            .loans
            .iter_mut()
            .find(|loan| loan.student == student && loan.book == book && loan.returned_at.is_none())
    }

    fn book_mut(&mut self, book: BookId) -> Result<&mut BookRow, LedgerError> {
        self.staged
            .books
            .get_mut(&book)
            .ok_or_else(|| LedgerError::not_found("book"))
    }

    fn student_mut(&mut self, student: StudentId) -> Result<&mut StudentRow, LedgerError> {
        self.staged
            .students
            .get_mut(&student)
            .ok_or_else(|| LedgerError::not_found("student"))
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn has_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<bool, LedgerError> {
        Ok(self.open_loan_mut(student, book).is_some())
    }

    async fn lock_open_loan(
        &mut self,
        student: StudentId,
        book: BookId,
    ) -> Result<OpenLoan, LedgerError> {
        self.open_loan_mut(student, book)
            .map(|loan| OpenLoan {
                id: loan.id,
                due_at: loan.due_at,
            })
            .ok_or_else(|| LedgerError::not_found("loan"))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> Result<LoanId, LedgerError> {
        self.student_mut(loan.student)?;
        self.book_mut(loan.book)?;
        if self.open_loan_mut(loan.student, loan.book).is_some() {
            return Err(LedgerError::constraint_violation("loans_one_open_per_pair"));
        }
        self.staged.next_loan += 1;
        let id = LoanId::new(self.staged.next_loan);
        self.staged.loans.push(LoanRow {
            id,
            student: loan.student,
            book: loan.book,
            due_at: loan.due_at,
            returned_at: None,
            sanction: None,
        });
        Ok(id)
    }

    async fn take_stock(&mut self, book: BookId) -> Result<(), LedgerError> {
        let row = self.book_mut(book)?;
        if row.stock <= 0 {
            return Err(LedgerError::no_rows_affected("take_stock"));
        }
        row.stock -= 1;
        Ok(())
    }

    async fn take_allowance(&mut self, student: StudentId) -> Result<(), LedgerError> {
        let row = self.student_mut(student)?;
        if row.allowance <= 0 {
            return Err(LedgerError::no_rows_affected("take_allowance"));
        }
        row.allowance -= 1;
        Ok(())
    }

    async fn close_loan(
        &mut self,
        loan: LoanId,
        returned_at: DateTime<Utc>,
        sanction: i64,
    ) -> Result<(), LedgerError> {
        let row = self
            .staged
            .loans
            .iter_mut()
            .find(|row| row.id == loan && row.returned_at.is_none())
            .ok_or_else(|| LedgerError::no_rows_affected("close_loan"))?;
        row.returned_at = Some(returned_at);
        row.sanction = Some(row.sanction.unwrap_or(0) + sanction);
        Ok(())
    }

    async fn restore_stock(&mut self, book: BookId) -> Result<(), LedgerError> {
        self.book_mut(book)?.stock += 1;
        Ok(())
    }

    async fn restore_allowance(&mut self, student: StudentId) -> Result<bool, LedgerError> {
        let row = self.student_mut(student)?;
        if row.allowance >= ALLOWANCE_CAP {
            return Ok(false);
        }
        row.allowance += 1;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let Self {
            _permit, tables, staged,
        } = *self;
        *lock_tables(&tables) = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}
