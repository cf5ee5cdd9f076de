//! Loan records and the inputs of the loan and return workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{BookId, StudentId, StudentRef};

/// Loan primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct LoanId(i64);

impl LoanId {
    /// Wrap a raw key.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw key.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Student request to borrow a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRequest {
    pub student: StudentId,
    pub book: BookId,
    /// Due date exactly as the client sent it (`dd-mm-yyyy`).
    pub due_date: String,
}

/// Row inserted when a loan opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub student: StudentId,
    pub book: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Result handed back after a successful loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanReceipt {
    pub loan_id: LoanId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// The open loan a confirmation closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenLoan {
    pub id: LoanId,
    pub due_at: DateTime<Utc>,
}

/// Operator request to confirm a returned book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub student: StudentRef,
    pub isbn: String,
}

/// Outcome of a confirmed return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub loan_id: LoanId,
    pub student_id: StudentId,
    pub book_id: BookId,
    pub returned_at: DateTime<Utc>,
    /// Sanction charged for this return; `0` when on time.
    pub sanction: i64,
}

/// Filter for the administrative loan report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatusFilter {
    /// Every loan.
    #[default]
    All,
    /// Loans already returned.
    Returned,
    /// Loans still out.
    Outstanding,
}

impl LoanStatusFilter {
    /// Cache key segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Returned => "returned",
            Self::Outstanding => "outstanding",
        }
    }
}

/// Loan report line joined with student and book names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub loan_id: LoanId,
    pub book_name: String,
    pub student_name: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub sanction: Option<i64>,
}
