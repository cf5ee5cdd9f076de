//! Borrowing endpoint.
//!
//! ```text
//! POST /api/v1/loans {"bookId":12,"dueDate":"17-03-2026"}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{BookId, Error, LoanReceipt, LoanRequest};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::StudentSession;
use crate::inbound::http::state::HttpState;

/// Loan request body; the borrower is the authenticated student.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanBody {
    pub book_id: BookId,
    /// `dd-mm-yyyy`, today at the earliest and at most a week ahead.
    #[schema(example = "17-03-2026")]
    pub due_date: String,
}

/// Borrow one copy of a book.
#[utoipa::path(
    post,
    path = "/api/v1/loans",
    request_body = LoanBody,
    responses(
        (status = 201, description = "Loan recorded", body = LoanReceipt),
        (status = 400, description = "Malformed or out-of-range due date", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Student role required", body = Error),
        (status = 404, description = "Book not found", body = Error),
        (status = 409, description = "Book already borrowed by this student", body = Error),
        (status = 422, description = "Out of stock or borrow limit reached", body = Error)
    ),
    tags = ["loans"],
    operation_id = "createLoan"
)]
#[post("/loans")]
pub async fn create_loan(
    state: web::Data<HttpState>,
    session: StudentSession,
    payload: web::Json<LoanBody>,
) -> ApiResult<HttpResponse> {
    let LoanBody { book_id, due_date } = payload.into_inner();
    let receipt = state
        .loans
        .create(LoanRequest {
            student: session.0.student,
            book: book_id,
            due_date,
        })
        .await?;
    Ok(HttpResponse::Created().json(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use rstest::rstest;
    use serde_json::Value;

    use crate::domain::{Role, StudentId};
    use crate::test_support::TestHarness;

    const STUDENT: i64 = 1001;

    async fn borrow(
        harness: &TestHarness,
        token: &str,
        book: i32,
        due_date: &str,
    ) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(harness.http_state()))
                .service(web::scope("/api/v1").service(create_loan)),
        )
        .await;
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/loans")
                .insert_header((AUTHORIZATION, format!("Bearer {token}")))
                .set_json(LoanBody {
                    book_id: BookId::new(book),
                    due_date: due_date.to_owned(),
                })
                .to_request(),
        )
        .await;
        let status = res.status();
        (status, test::read_body_json(res).await)
    }

    async fn student(harness: &TestHarness) -> String {
        harness.seed_student(STUDENT, "Ada Lovelace", Role::Student, "student-pass");
        harness
            .login(STUDENT, "student-pass")
            .await
            .expect("login")
            .access_token
    }

    #[actix_web::test]
    async fn borrowing_takes_stock_and_allowance() {
        let harness = TestHarness::new();
        harness.ledger.add_book(BookId::new(7), "978-0", 2);
        let token = student(&harness).await;

        let (status, body) = borrow(&harness, &token, 7, "14-03-2026").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["bookId"], 7);
        assert_eq!(harness.ledger.stock(BookId::new(7)), Some(1));
        assert_eq!(harness.ledger.allowance(StudentId::new(STUDENT)), Some(2));

        let (again, _) = borrow(&harness, &token, 7, "14-03-2026").await;
        assert_eq!(again, StatusCode::CONFLICT);
        assert_eq!(harness.ledger.stock(BookId::new(7)), Some(1));
    }

    #[rstest]
    #[case("2026-03-14", StatusCode::BAD_REQUEST)]
    #[case("09-03-2026", StatusCode::BAD_REQUEST)]
    #[case("30-03-2026", StatusCode::BAD_REQUEST)]
    #[actix_rt::test]
    async fn due_dates_are_validated(#[case] due_date: &str, #[case] expected: StatusCode) {
        let harness = TestHarness::new();
        harness.ledger.add_book(BookId::new(7), "978-0", 2);
        let token = student(&harness).await;
        let (status, body) = borrow(&harness, &token, 7, due_date).await;
        assert_eq!(status, expected);
        assert_eq!(body["details"]["fields"][0]["field"], "dueDate");
        assert_eq!(harness.ledger.stock(BookId::new(7)), Some(2));
    }

    #[actix_web::test]
    async fn empty_shelves_are_a_capacity_error() {
        let harness = TestHarness::new();
        harness.ledger.add_book(BookId::new(7), "978-0", 0);
        let token = student(&harness).await;
        let (status, body) = borrow(&harness, &token, 7, "14-03-2026").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "capacity_exceeded");
        assert_eq!(harness.ledger.open_loans(StudentId::new(STUDENT)), 0);
    }
}
