//! Internal Diesel row structs.
//!
//! These never leave the persistence layer; adapters convert them into domain
//! types before returning.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{book_categories, books, categories, loans, students};

/// Catalogue columns of a book.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct BookRow {
    pub id: i32,
    pub name: String,
    pub author: String,
    pub publisher: String,
    pub description: String,
    pub available_stock: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = books)]
pub(crate) struct NewBookRow<'a> {
    pub isbn: &'a str,
    pub name: &'a str,
    pub author: &'a str,
    pub publisher: &'a str,
    pub description: &'a str,
    pub stock: i32,
    pub available_stock: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = categories)]
pub(crate) struct NewCategoryRow<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy, Insertable)]
#[diesel(table_name = book_categories)]
pub(crate) struct BookCategoryRow {
    pub book_id: i32,
    pub category_id: i32,
}

/// Login columns of a student.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CredentialsRow {
    pub id: i64,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = students)]
pub(crate) struct NewStudentRow<'a> {
    pub id: i64,
    pub name: &'a str,
    pub phone_number: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub class: &'a str,
    pub sub_class: &'a str,
    pub major: &'a str,
    pub batch: i32,
    pub allowance: i32,
    pub role: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = loans)]
pub(crate) struct NewLoanRow {
    pub student_id: i64,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Loan report line, joined with book and student names.
#[derive(Debug, Clone, Queryable)]
pub(crate) struct LoanReportRow {
    pub loan_id: i64,
    pub book_name: String,
    pub student_name: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub sanction: Option<i64>,
}
