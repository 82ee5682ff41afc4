//! HTTP surface of the daemon.
//!
//! Thin handlers: parse, delegate to the store or the check-in service,
//! shape the JSON answer. Every failure leaves through [`ServiceError`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use facecheck_core::{ErrorKind, MatchError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::checkin::{self, CheckinService};
use crate::error::ServiceError;
use crate::recognition::{FeatureExtractor, RecognitionClient, RecognitionError};
use crate::store::{
    Attendance, AttendanceFilter, Employee, EmployeeUpdate, Listing, NewEmployee, PageRequest,
    Store, StoreError,
};

pub struct AppState<E = RecognitionClient> {
    pub store: Store,
    pub checkin: CheckinService<E, Store>,
}

pub fn router<E: FeatureExtractor + 'static>(state: Arc<AppState<E>>) -> Router {
    Router::new()
        .route("/health", get(health::<E>))
        .route("/employees", get(list_employees::<E>).post(create_employee::<E>))
        .route(
            "/employees/{id}",
            get(get_employee::<E>)
                .patch(update_employee::<E>)
                .delete(delete_employee::<E>),
        )
        .route("/face-encodings", get(list_face_encodings::<E>))
        .route("/face-encodings/process-registration", post(process_registration::<E>))
        .route("/face-encodings/sync-from-recognition-service", post(sync_encoding::<E>))
        .route(
            "/face-encodings/employee/{employee_id}",
            get(face_encoding_for::<E>).delete(remove_face::<E>),
        )
        .route("/face-encodings/employee/{employee_id}/exists", get(face_exists::<E>))
        .route("/attendances", get(list_attendances::<E>))
        .route("/attendances/stats", get(attendance_stats::<E>))
        .route("/attendances/{id}", get(get_attendance::<E>))
        .route("/attendances/employee/{employee_id}", get(attendances_of_employee::<E>))
        .route("/attendances/date/{date}", get(attendances_on_date::<E>))
        .route("/attendances/face-recognition-checkin", post(face_checkin::<E>))
        .route("/attendances/face-recognition-only", post(face_recognize::<E>))
        .route("/attendances/employee/{employee_id}/active-today", get(active_today::<E>))
        .route("/attendances/employee/{employee_id}/checkout-today", post(checkout_today::<E>))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest {
    employee_id: String,
    #[serde(default)]
    video_frames: Vec<String>,
}

#[derive(Deserialize)]
struct SyncRequest {
    employee_id: String,
    encoding: String,
}

#[derive(Deserialize)]
struct ImageRequest {
    image: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    #[serde(default)]
    check_out_time: Option<DateTime<Utc>>,
}

#[derive(Default, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterQuery {
    page: Option<u32>,
    limit: Option<u32>,
    employee_id: Option<String>,
    date: Option<String>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ServiceError::MalformedPayload(format!("invalid date {raw:?}: {e}")))
}

fn listing<T: Serialize>(key: &str, page: Listing<T>) -> Json<Value> {
    let mut body = json!({
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    });
    body[key] = json!(page.items);
    Json(body)
}

async fn health<E: FeatureExtractor>(State(state): State<Arc<AppState<E>>>) -> Json<Value> {
    let thresholds = state.checkin.thresholds();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "acceptThreshold": thresholds.accept,
        "lowConfidenceThreshold": thresholds.low_confidence,
    }))
}

async fn create_employee<E>(
    State(state): State<Arc<AppState<E>>>,
    Json(new): Json<NewEmployee>,
) -> Result<impl IntoResponse, ServiceError> {
    let employee = state.store.create_employee(new).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn list_employees<E>(
    State(state): State<Arc<AppState<E>>>,
    Query(query): Query<EmployeeQuery>,
) -> Result<Json<Value>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let employees = state.store.employees(query.search.as_deref(), page).await?;
    Ok(listing("employees", employees))
}

async fn get_employee<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(id): Path<String>,
) -> Result<Json<Employee>, ServiceError> {
    Ok(Json(state.store.employee(&id).await?))
}

async fn update_employee<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(id): Path<String>,
    Json(update): Json<EmployeeUpdate>,
) -> Result<Json<Employee>, ServiceError> {
    Ok(Json(state.store.update_employee(&id, update).await?))
}

async fn delete_employee<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.store.delete_employee(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn process_registration<E: FeatureExtractor>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<RegistrationRequest>,
) -> Result<Json<Value>, ServiceError> {
    let employee = state.store.employee(&req.employee_id).await?;
    let (registration, processing_result) = checkin::register_face(
        state.checkin.extractor(),
        &state.store,
        &employee,
        &req.video_frames,
    )
    .await?;

    let verb = if registration.profile.replaced {
        "updated"
    } else {
        "registered"
    };
    Ok(Json(json!({
        "success": true,
        "message": format!("Face {verb} for {}", employee.full_name),
        "data": registration,
        "processingResult": processing_result,
    })))
}

async fn sync_encoding<E>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<Value>, ServiceError> {
    let registration =
        checkin::store_encoding(&state.store, &req.employee_id, &req.encoding).await?;
    let message = if registration.profile.replaced {
        "Face encoding updated successfully"
    } else {
        "Face encoding created successfully"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": registration,
    })))
}

async fn list_face_encodings<E>(
    State(state): State<Arc<AppState<E>>>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let records = state
        .store
        .profile_records(query.employee_id.as_deref(), page)
        .await?;
    Ok(listing("faceEncodings", records))
}

async fn face_encoding_for<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let record = state.store.profile_record_for(&employee_id).await?;
    Ok(Json(json!(record.into_iter().collect::<Vec<_>>())))
}

async fn face_exists<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let exists = state.store.profile_exists(&employee_id).await?;
    Ok(Json(json!({ "exists": exists, "count": u8::from(exists) })))
}

async fn remove_face<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let removed = state.store.remove_profile_for(&employee_id).await?;
    tracing::info!(%employee_id, removed, "face profile removal requested");
    Ok(Json(json!({ "success": true, "removed": removed })))
}

async fn list_attendances<E>(
    State(state): State<Arc<AppState<E>>>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ServiceError> {
    let filter = AttendanceFilter {
        employee_id: query.employee_id,
        date: query.date.as_deref().map(parse_date).transpose()?,
    };
    let page = PageRequest::new(query.page, query.limit);
    Ok(listing("attendances", state.store.attendances(filter, page).await?))
}

async fn attendances_of_employee<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ServiceError> {
    let filter = AttendanceFilter {
        employee_id: Some(employee_id),
        date: None,
    };
    let page = PageRequest::new(query.page, query.limit);
    Ok(listing("attendances", state.store.attendances(filter, page).await?))
}

async fn attendances_on_date<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(date): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ServiceError> {
    let filter = AttendanceFilter {
        employee_id: None,
        date: Some(parse_date(&date)?),
    };
    let page = PageRequest::new(query.page, query.limit);
    Ok(listing("attendances", state.store.attendances(filter, page).await?))
}

async fn attendance_stats<E>(
    State(state): State<Arc<AppState<E>>>,
) -> Result<Json<Value>, ServiceError> {
    let stats = state.store.attendance_stats(Utc::now()).await?;
    Ok(Json(json!(stats)))
}

async fn get_attendance<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(id): Path<String>,
) -> Result<Json<Attendance>, ServiceError> {
    Ok(Json(state.store.attendance(&id).await?))
}

async fn face_checkin<E: FeatureExtractor>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<ImageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let at = req.timestamp.unwrap_or_else(Utc::now);
    let checkin = checkin::check_in_by_face(&state.checkin, &state.store, &req.image, at).await?;
    Ok((StatusCode::CREATED, Json(checkin)))
}

async fn face_recognize<E: FeatureExtractor>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<Value>, ServiceError> {
    let recognition = state.checkin.recognize(&req.image).await?;
    Ok(Json(json!({ "success": true, "recognition": recognition })))
}

async fn active_today<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let attendance = state.store.active_today(&employee_id, Utc::now()).await?;
    Ok(Json(json!({
        "success": attendance.is_some(),
        "attendance": attendance,
    })))
}

async fn checkout_today<E>(
    State(state): State<Arc<AppState<E>>>,
    Path(employee_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let req: CheckoutRequest = if body.is_empty() {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::MalformedPayload(e.to_string()))?
    };
    let at = req.check_out_time.unwrap_or_else(Utc::now);
    let (attendance, summary) = state.store.checkout_today(&employee_id, at).await?;

    Ok(Json(json!({
        "success": true,
        "attendance": attendance,
        "summary": summary,
    })))
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::LowQuality | ErrorKind::DecodeError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::LowConfidence => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
    }
}

fn kind_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidInput => "invalid_input",
        ErrorKind::LowQuality => "low_quality",
        ErrorKind::LowConfidence => "low_confidence",
        ErrorKind::NotFound => "not_found",
        ErrorKind::DecodeError => "decode_error",
    }
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Match(e) => kind_status(e.kind()),
            ServiceError::Decode(e) => kind_status(e.kind()),
            ServiceError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ServiceError::IncompleteEmployee(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Recognition(RecognitionError::Rejected(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Recognition(RecognitionError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ServiceError::Store(StoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServiceError::Match(e) => kind_code(e.kind()),
            ServiceError::Decode(e) => kind_code(e.kind()),
            ServiceError::MalformedPayload(_) => "malformed_payload",
            ServiceError::IncompleteEmployee(_) => "employee_incomplete",
            ServiceError::Recognition(RecognitionError::Rejected(_)) => "recognition_rejected",
            ServiceError::Recognition(RecognitionError::Unavailable(_)) => {
                "recognition_unavailable"
            }
            ServiceError::Store(StoreError::NotFound(_)) => "not_found",
            ServiceError::Store(StoreError::Conflict(_)) => "conflict",
            ServiceError::Store(StoreError::InvalidInput(_)) => "invalid_input",
            ServiceError::Store(_) => "internal",
            ServiceError::Timeout(_) => "timeout",
        }
    }

    fn body(&self) -> Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        match self {
            ServiceError::Match(MatchError::LowConfidence { score, .. }) => {
                error["score"] = json!(score);
            }
            ServiceError::Match(MatchError::NotFound { best_score }) => {
                error["score"] = json!(best_score);
            }
            ServiceError::Match(MatchError::LowQuality { quality, .. }) => {
                error["quality"] = json!(quality);
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
