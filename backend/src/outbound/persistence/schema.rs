//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `migrations/` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Registered students and administrators. `id` is the NIS.
    students (id) {
        id -> Int8,
        name -> Varchar,
        phone_number -> Varchar,
        email -> Varchar,
        password_hash -> Text,
        class -> Varchar,
        sub_class -> Varchar,
        major -> Varchar,
        batch -> Int4,
        /// Books the student may still borrow, between 0 and 3.
        allowance -> Int4,
        /// `admin` or `student`.
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Int4,
        name -> Varchar,
    }
}

diesel::table! {
    /// Catalogue entries; `available_stock` never drops below zero.
    books (id) {
        id -> Int4,
        isbn -> Varchar,
        name -> Varchar,
        author -> Varchar,
        publisher -> Varchar,
        description -> Text,
        stock -> Int4,
        available_stock -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    book_categories (book_id, category_id) {
        book_id -> Int4,
        category_id -> Int4,
    }
}

diesel::table! {
    /// Loans. At most one row per student and book has a null `returned_at`.
    loans (id) {
        id -> Int8,
        student_id -> Int8,
        book_id -> Int4,
        borrowed_at -> Timestamptz,
        due_at -> Timestamptz,
        returned_at -> Nullable<Timestamptz>,
        sanction -> Nullable<Int8>,
    }
}

diesel::joinable!(book_categories -> books (book_id));
diesel::joinable!(book_categories -> categories (category_id));
diesel::joinable!(loans -> books (book_id));
diesel::joinable!(loans -> students (student_id));

diesel::allow_tables_to_appear_in_same_query!(book_categories, books, categories, loans, students);
