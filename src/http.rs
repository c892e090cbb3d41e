use crate::backend::SlotLedger;
use crate::booking_code::BOOKING_CODE_REGEX;
use crate::configuration::Configuration;
use crate::error::LedgerError;
use crate::types::{SlotAvailability, SlotOccupancy};
use axum::async_trait;
use axum::extract::{FromRequestParts, Query, Request};
use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

#[derive(Clone)]
pub struct AppState<T: SlotLedger> {
    pub ledger: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub slot_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

impl DateQuery {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StatsQuery {
    #[validate(range(min = 1, max = 730))]
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CodeQuery {
    #[validate(regex(path = *BOOKING_CODE_REGEX))]
    pub code: String,
}

/// Identity of the caller, authenticated upstream and forwarded in `x-user-id`.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(USER_ID_HEADER) else {
            return Err((StatusCode::UNAUTHORIZED, "Missing credentials".to_string()));
        };
        header
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(CallerId)
            .ok_or((StatusCode::BAD_REQUEST, "Malformed user id".to_string()))
    }
}

impl LedgerError {
    fn kind(&self) -> &'static str {
        match self {
            LedgerError::SlotFull => "slot_full",
            LedgerError::DuplicateBooking => "duplicate_booking",
            LedgerError::NotFound => "not_found",
            LedgerError::TransientStoreFailure(_) => "transient_store_failure",
            LedgerError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match self {
            LedgerError::SlotFull | LedgerError::DuplicateBooking => StatusCode::CONFLICT,
            LedgerError::NotFound => StatusCode::NOT_FOUND,
            LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LedgerError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({ "error": self.kind(), "message": self.to_string() });
        let mut response = (status, Json(body)).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

pub fn create_app<T: SlotLedger, C: Configuration>(ledger: T, configuration: C) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let member = Router::new()
        .route("/slots", get(get_slots::<T>))
        .route("/slots/events", get(slot_events::<T>))
        .route("/book", post(book_slot::<T>))
        .route("/cancel", post(cancel_booking::<T>))
        .route("/bookings", get(get_bookings::<T>))
        .route("/stats", get(get_stats::<T>));

    let admin = Router::new()
        .route("/admin/occupancy", get(get_occupancy::<T>))
        .route("/admin/verify", get(verify_booking::<T>))
        .route_layer(middleware::from_fn_with_state(
            configuration.admin_password(),
            admin_auth,
        ));

    Router::new()
        .merge(member)
        .merge(admin)
        .with_state(AppState { ledger })
        .layer(cors)
}

async fn admin_auth(
    State(admin_password): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    if let Some(auth_header) = request.headers().get(ADMIN_PASSWORD_HEADER) {
        if auth_header.to_str().unwrap_or("") != admin_password {
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
        }
    } else {
        return Err((StatusCode::UNAUTHORIZED, "Missing credentials".to_string()));
    }
    Ok(next.run(request).await)
}

/// Ledger operations may block on the database.
async fn run_blocking<R, F>(operation: F) -> Result<R, LedgerError>
where
    F: FnOnce() -> Result<R, LedgerError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(operation).await.map_err(|err| {
        error!(?err, "Ledger operation did not complete");
        LedgerError::TransientStoreFailure("Ledger operation did not complete".into())
    })?
}

fn validated<Q: Validate>(query: &Q) -> Result<(), LedgerError> {
    query
        .validate()
        .map_err(|err| LedgerError::InvalidInput(err.to_string()))
}

async fn get_slots<T: SlotLedger>(
    State(state): State<AppState<T>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<SlotAvailability>>, LedgerError> {
    let date = query.date();
    let slots = run_blocking(move || state.ledger.ensure_day_slots(date)).await?;
    Ok(Json(slots.into_iter().map(SlotAvailability::from).collect()))
}

async fn slot_events<T: SlotLedger>(
    State(state): State<AppState<T>>,
    Query(query): Query<DateQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = state
        .ledger
        .slot_updates(query.date())
        .map(|update| Event::default().event("slot").json_data(update));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn book_slot<T: SlotLedger>(
    State(state): State<AppState<T>>,
    CallerId(user_id): CallerId,
    Json(request): Json<BookingRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let booking = run_blocking(move || state.ledger.book(user_id, request.slot_id)).await?;
    info!(%user_id, slot_id = %booking.slot_id, booking_code = %booking.booking_code, "Slot booked");
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn cancel_booking<T: SlotLedger>(
    State(state): State<AppState<T>>,
    CallerId(user_id): CallerId,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let booking_id = request.booking_id;
    run_blocking(move || {
        let owned = state
            .ledger
            .user_bookings(user_id)?
            .iter()
            .any(|booking| booking.id == booking_id);
        if !owned {
            return Err(LedgerError::NotFound);
        }
        state.ledger.cancel(booking_id)
    })
    .await?;
    info!(%user_id, %booking_id, "Booking cancelled");
    Ok((StatusCode::OK, "Booking cancelled successfully".to_string()))
}

async fn get_bookings<T: SlotLedger>(
    State(state): State<AppState<T>>,
    CallerId(user_id): CallerId,
) -> Result<impl IntoResponse, LedgerError> {
    let bookings = run_blocking(move || state.ledger.user_bookings(user_id)).await?;
    Ok(Json(bookings))
}

async fn get_stats<T: SlotLedger>(
    State(state): State<AppState<T>>,
    CallerId(user_id): CallerId,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, LedgerError> {
    validated(&query)?;
    let today = Local::now().date_naive();
    let stats =
        run_blocking(move || state.ledger.booking_stats(user_id, query.days, today)).await?;
    Ok(Json(stats))
}

async fn get_occupancy<T: SlotLedger>(
    State(state): State<AppState<T>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<SlotOccupancy>>, LedgerError> {
    let date = query.date();
    let slots = run_blocking(move || state.ledger.slots(date)).await?;
    Ok(Json(slots.into_iter().map(SlotOccupancy::from).collect()))
}

async fn verify_booking<T: SlotLedger>(
    State(state): State<AppState<T>>,
    Query(query): Query<CodeQuery>,
) -> Result<impl IntoResponse, LedgerError> {
    validated(&query)?;
    let booking = run_blocking(move || state.ledger.booking_by_code(&query.code)).await?;
    Ok(Json(booking))
}
