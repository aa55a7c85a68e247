use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use shared::{Booking, BookingError, BookingStatus};

use crate::lifecycle::{BookingLifecycle, BookingRequest};

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<BookingLifecycle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/confirm", get(confirm_booking))
        .route("/bookings/cancel/:booking_id", get(cancel_booking))
        .route("/bookings/status/:booking_id", patch(update_status))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateBookingBody {
    user_id: Uuid,
    event_id: Uuid,
    slot_id: Uuid,
    date: NaiveDate,
    sub_slot: String,
    seats: i32,
}

#[derive(Debug, Serialize)]
struct CreatedBookingBody {
    booking: Booking,
    approval_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmParams {
    booking_id: Uuid,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusBody {
    status: BookingStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<i32>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<CreatedBookingBody>), ApiError> {
    let created = state
        .lifecycle
        .create_booking(BookingRequest {
            user_id: body.user_id,
            event_id: body.event_id,
            slot_id: body.slot_id,
            date: body.date,
            sub_slot: body.sub_slot,
            seats: body.seats,
        })
        .await
        .map_err(error_response)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedBookingBody {
            booking: created.booking,
            approval_url: created.approval_url,
        }),
    ))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Query(params): Query<ConfirmParams>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .confirm_payment(params.booking_id, &params.token)
        .await
        .map_err(error_response)?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .cancel_booking(booking_id)
        .await
        .map_err(error_response)?;
    Ok(Json(booking))
}

async fn update_status(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .update_status(booking_id, body.status)
        .await
        .map_err(error_response)?;
    Ok(Json(booking))
}

async fn health() -> &'static str {
    "ok"
}

fn error_response(err: BookingError) -> ApiError {
    let (status, available) = match &err {
        BookingError::InvalidSeats(_) | BookingError::DuplicateBooking => {
            (StatusCode::BAD_REQUEST, None)
        }
        BookingError::SlotNotFound
        | BookingError::BookingNotFound
        | BookingError::HoldNotFound => (StatusCode::NOT_FOUND, None),
        BookingError::InsufficientCapacity { available } => {
            (StatusCode::CONFLICT, Some(*available))
        }
        BookingError::SlotInactive
        | BookingError::AlreadyCancelled
        | BookingError::CannotCancelPaidBooking
        | BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, None),
        BookingError::PaymentGateway(_) => (StatusCode::BAD_GATEWAY, None),
        BookingError::ConcurrentModification
        | BookingError::StorageTimeout
        | BookingError::Storage(_) => {
            error!(error = %err, "request failed on a backend error");
            // backend detail stays in the logs
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "temporary error, please try again".to_string(),
                    available: None,
                }),
            );
        }
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            available,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_the_documented_status_codes() {
        let cases = [
            (BookingError::InvalidSeats(0), StatusCode::BAD_REQUEST),
            (BookingError::DuplicateBooking, StatusCode::BAD_REQUEST),
            (BookingError::SlotNotFound, StatusCode::NOT_FOUND),
            (BookingError::BookingNotFound, StatusCode::NOT_FOUND),
            (BookingError::HoldNotFound, StatusCode::NOT_FOUND),
            (BookingError::SlotInactive, StatusCode::CONFLICT),
            (BookingError::AlreadyCancelled, StatusCode::CONFLICT),
            (
                BookingError::CannotCancelPaidBooking,
                StatusCode::CONFLICT,
            ),
            (
                BookingError::InvalidTransition {
                    from: BookingStatus::Cancelled,
                    to: BookingStatus::Approved,
                },
                StatusCode::CONFLICT,
            ),
            (
                BookingError::PaymentGateway("declined".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                BookingError::ConcurrentModification,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (BookingError::StorageTimeout, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, _) = error_response(err);
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn capacity_conflicts_report_remaining_seats() {
        let (status, Json(body)) =
            error_response(BookingError::InsufficientCapacity { available: 2 });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.available, Some(2));
    }

    #[test]
    fn backend_errors_do_not_leak_detail() {
        let (_, Json(body)) = error_response(BookingError::Storage("pg down".to_string()));
        assert!(!body.error.contains("pg down"));
    }
}
