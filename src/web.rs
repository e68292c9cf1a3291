//! HTTP surface: JSON API over the storage port, bearer-token authenticated.
//!
//! `router` builds the complete application so tests can drive it in-process;
//! `serve` binds it to the configured address.
use crate::auth::{self, Role};
use crate::errors::ApiError;
use crate::import::{self, template, ImportError, UploadedFile};
use crate::jobs;
use crate::jwks::JwksManager;
use crate::reports::{self, ReportFilter};
use crate::session::Principal;
use crate::settings::Settings;
use crate::storage::{
    Course, CourseUpdate, Document, Enrollment, ImportJob, NewAttendance, NewCourse, NewGrade,
    Participant, Store,
};
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const ADMIN: &[Role] = &[Role::Admin];
const REPORTING: &[Role] = &[Role::Admin, Role::Reporter];

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub jwks: JwksManager,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // X-Frame-Options: Prevent clickjacking
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    // X-Content-Type-Options: Prevent MIME sniffing
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    response
}

fn json_with_headers(status: StatusCode, value: Value, headers: &[(&str, String)]) -> Response {
    let mut resp = (status, Json(value)).into_response();
    let h = resp.headers_mut();
    for (name, val) in headers {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(val),
        ) {
            h.insert(name, val);
        }
    }
    resp
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.import.max_upload_bytes;

    Router::new()
        .route("/healthz", get(healthz))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/users", post(create_user))
        .route("/providers", get(list_providers).post(create_provider))
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/{id}/enrollments", get(course_enrollments))
        .route(
            "/courses/{id}/attendance",
            get(list_attendance).post(record_attendance),
        )
        .route("/courses/{id}/grades", get(list_grades).post(record_grade))
        .route("/imports/participants", post(upload_participants))
        .route("/imports/participants/template", get(import_template))
        .route("/imports", get(list_imports))
        .route("/imports/{id}", get(get_import))
        .route("/reports/attendance", get(attendance_report))
        .route("/reports/grades", get(grade_report))
        .route("/admin/jobs", get(list_jobs))
        .route("/admin/jobs/{name}", post(trigger_job))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    settings: Settings,
    store: Arc<dyn Store>,
    jwks: JwksManager,
) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let app = router(AppState {
        settings: Arc::new(settings),
        store,
        jwks,
    });

    tracing::info!(%addr, "Campus API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

async fn healthz(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn jwks_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.jwks.jwks_json())
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

fn token_response(pair: auth::TokenPair) -> Result<Response, ApiError> {
    let value = serde_json::to_value(pair).map_err(|e| ApiError::internal(e.to_string()))?;
    // Token responses must not be cached
    Ok(json_with_headers(
        StatusCode::OK,
        value,
        &[
            ("cache-control", "no-store".to_string()),
            ("pragma", "no-cache".to_string()),
        ],
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let pair = auth::login(
        state.store.as_ref(),
        &state.jwks,
        &state.settings,
        &req.username,
        &req.password,
    )
    .await?;
    token_response(pair)
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let pair = auth::refresh(
        state.store.as_ref(),
        &state.jwks,
        &state.settings,
        &req.refresh_token,
    )
    .await?;
    token_response(pair)
}

async fn logout(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    auth::logout(state.store.as_ref(), &principal.user_id, &req.refresh_token).await?;
    tracing::info!(user_id = %principal.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

// ---------------------------------------------------------------------------
// Users, providers, courses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    role: Role,
    #[serde(default)]
    email: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(ADMIN)?;
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let user = auth::create_user(
        state.store.as_ref(),
        username,
        &req.password,
        req.role,
        req.email,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct ProviderRequest {
    name: String,
}

async fn list_providers(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_providers().await?))
}

async fn create_provider(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(ADMIN)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("provider name is required"));
    }
    Ok(Json(state.store.upsert_provider(name).await?))
}

async fn check_provider(state: &AppState, provider_id: Option<i64>) -> Result<(), ApiError> {
    if let Some(id) = provider_id {
        if state.store.get_provider(id).await?.is_none() {
            return Err(ApiError::bad_request(format!("provider {id} does not exist")));
        }
    }
    Ok(())
}

async fn list_courses(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_courses().await?))
}

async fn create_course(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut req): Json<NewCourse>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(ADMIN)?;
    req.code = req.code.trim().to_string();
    req.name = req.name.trim().to_string();
    if req.code.is_empty() || req.name.is_empty() {
        return Err(ApiError::bad_request("course code and name are required"));
    }
    check_provider(&state, req.provider_id).await?;

    let course = state.store.create_course(req).await?;
    tracing::info!(course_id = course.id, code = %course.code, "Created course");
    Ok((StatusCode::CREATED, Json(course)))
}

async fn load_course(state: &AppState, id: i64) -> Result<Course, ApiError> {
    state
        .store
        .get_course(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("course {id} does not exist")))
}

async fn get_course(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(load_course(&state, id).await?))
}

async fn update_course(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(mut req): Json<CourseUpdate>,
) -> Result<Json<Course>, ApiError> {
    principal.require(ADMIN)?;
    req.name = req.name.trim().to_string();
    if req.name.is_empty() {
        return Err(ApiError::bad_request("course name is required"));
    }
    check_provider(&state, req.provider_id).await?;
    Ok(Json(state.store.update_course(id, req).await?))
}

async fn delete_course(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    principal.require(ADMIN)?;
    state.store.delete_course(id).await?;
    tracing::info!(course_id = id, "Deleted course");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Course activity: enrollments, attendance, grades
// ---------------------------------------------------------------------------

/// Admins see every course; instructors only the ones assigned to them.
async fn authorize_course(
    state: &AppState,
    principal: &Principal,
    id: i64,
) -> Result<Course, ApiError> {
    principal.require(&[Role::Admin, Role::Instructor])?;
    let course = load_course(state, id).await?;
    if principal.is_admin() || course.instructor_id.as_deref() == Some(principal.user_id.as_str())
    {
        Ok(course)
    } else {
        Err(ApiError::forbidden(format!(
            "course {} is not assigned to you",
            course.code
        )))
    }
}

#[derive(Debug, Serialize)]
struct EnrollmentView {
    #[serde(flatten)]
    enrollment: Enrollment,
    participant: Option<Participant>,
}

async fn course_enrollments(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Vec<EnrollmentView>>, ApiError> {
    let course = authorize_course(&state, &principal, id).await?;
    let mut views = Vec::new();
    for enrollment in state.store.list_enrollments(course.id).await? {
        let participant = state.store.get_participant(enrollment.participant_id).await?;
        views.push(EnrollmentView {
            enrollment,
            participant,
        });
    }
    Ok(Json(views))
}

async fn enrollment_for(
    state: &AppState,
    course: &Course,
    participant_id: i64,
) -> Result<Enrollment, ApiError> {
    state
        .store
        .find_enrollment(participant_id, course.id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "participant {participant_id} is not enrolled in {}",
                course.code
            ))
        })
}

#[derive(Debug, Deserialize)]
struct AttendanceRequest {
    participant_id: i64,
    session_date: String,
    present: bool,
}

async fn list_attendance(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let course = authorize_course(&state, &principal, id).await?;
    Ok(Json(state.store.list_attendance(course.id).await?))
}

async fn record_attendance(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<AttendanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = authorize_course(&state, &principal, id).await?;
    let session_date = NaiveDate::parse_from_str(req.session_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("session_date must be YYYY-MM-DD"))?;
    let enrollment = enrollment_for(&state, &course, req.participant_id).await?;

    let record = state
        .store
        .upsert_attendance(NewAttendance {
            enrollment_id: enrollment.id,
            session_date,
            present: req.present,
            recorded_by: principal.user_id,
        })
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct GradeRequest {
    participant_id: i64,
    score: f64,
}

async fn list_grades(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let course = authorize_course(&state, &principal, id).await?;
    Ok(Json(state.store.list_grades(course.id).await?))
}

async fn record_grade(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<GradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = authorize_course(&state, &principal, id).await?;
    if !(0.0..=100.0).contains(&req.score) {
        return Err(ApiError::bad_request("score must be between 0 and 100"));
    }
    let enrollment = enrollment_for(&state, &course, req.participant_id).await?;

    let grade = state
        .store
        .upsert_grade(NewGrade {
            enrollment_id: enrollment.id,
            score: req.score,
            recorded_by: principal.user_id,
        })
        .await?;
    Ok(Json(grade))
}

// ---------------------------------------------------------------------------
// Participant import
// ---------------------------------------------------------------------------

/// Keeps the status multer assigns, so an oversized body is a 413.
fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_request"
    };
    ApiError::new(status, code, e.body_text())
}

async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some(UploadedFile {
            file_name,
            mime_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

async fn upload_participants(
    State(state): State<AppState>,
    principal: Principal,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    principal.require(ADMIN)?;
    let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let file = read_upload(multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("no file uploaded in field \"file\""))?;

    tracing::info!(
        file_name = %file.file_name,
        size = file.bytes.len(),
        user_id = %principal.user_id,
        "Participant import uploaded"
    );

    let report = import::run_import(state.store.as_ref(), &file, Some(principal.user_id))
        .await
        .map_err(|e| match e {
            ImportError::Parse(p) => ApiError::bad_request(p.to_string()),
            ImportError::Store(s) => s.into(),
        })?;

    let status = if report.fatal {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report.summary)).into_response())
}

async fn import_template(principal: Principal) -> Result<Response, ApiError> {
    principal.require(ADMIN)?;
    let bytes = template::build_template().map_err(|e| ApiError::internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, template::XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", template::TEMPLATE_FILE_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct ImportDetail {
    job: ImportJob,
    document: Option<Document>,
}

async fn list_imports(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ImportJob>>, ApiError> {
    principal.require(ADMIN)?;
    Ok(Json(state.store.list_import_jobs().await?))
}

async fn get_import(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<ImportDetail>, ApiError> {
    principal.require(ADMIN)?;
    let job = state
        .store
        .get_import_job(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("import job {id} does not exist")))?;
    let document = state.store.get_document_for_job(id).await?;
    Ok(Json(ImportDetail { job, document }))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

async fn attendance_report(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<ReportFilter>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(REPORTING)?;
    Ok(Json(
        reports::attendance_report(state.store.as_ref(), &filter).await?,
    ))
}

async fn grade_report(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<ReportFilter>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(REPORTING)?;
    let pass_mark = state.settings.reports.pass_mark;
    Ok(Json(
        reports::grade_report(state.store.as_ref(), &filter, pass_mark).await?,
    ))
}

// ---------------------------------------------------------------------------
// Maintenance jobs
// ---------------------------------------------------------------------------

async fn list_jobs(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(ADMIN)?;
    let executions = state.store.list_job_executions(50).await?;
    let known: Vec<_> = jobs::JOBS
        .iter()
        .map(|(name, schedule)| json!({ "name": name, "schedule": schedule }))
        .collect();
    Ok(Json(json!({ "jobs": known, "executions": executions })))
}

async fn trigger_job(
    State(state): State<AppState>,
    principal: Principal,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require(ADMIN)?;
    if !jobs::is_known_job(&name) {
        return Err(ApiError::not_found(format!("unknown job {name}")));
    }
    jobs::trigger_job_manually(state.store.as_ref(), &name).await?;
    let latest = state.store.list_job_executions(1).await?;
    Ok(Json(latest.into_iter().next()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::storage::{ImportStatus, MockStore, User};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "campus-web-test";

    fn admin() -> User {
        User {
            id: "admin-1".to_string(),
            username: "admin".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            email: None,
            enabled: true,
            created_at: 0,
        }
    }

    fn import_job(id: i64, status: ImportStatus) -> ImportJob {
        ImportJob {
            id,
            kind: crate::storage::PARTICIPANT_IMPORT_KIND.to_string(),
            status,
            provider_id: None,
            course_id: None,
            total_rows: 2,
            processed_rows: 0,
            success_count: 0,
            failure_count: 0,
            error_message: None,
            created_by: Some("admin-1".to_string()),
            started_at: 0,
            completed_at: None,
        }
    }

    async fn app(store: MockStore, dir: &TempDir) -> (Router, String) {
        let mut settings = Settings::default();
        settings.keys.jwks_path = dir.path().join("jwks.json");
        settings.keys.private_key_path = dir.path().join("private_key.json");
        let jwks = JwksManager::new(settings.keys.clone()).await.unwrap();
        let token = auth::issue_access_token(&jwks, &settings, &admin()).unwrap();

        let router = router(AppState {
            settings: Arc::new(settings),
            store: Arc::new(store),
            jwks,
        });
        (router, token)
    }

    fn upload_request(token: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"p.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/imports/participants")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_outage_returns_500_with_summary() {
        let mut store = MockStore::new();
        store
            .expect_create_import_job()
            .times(1)
            .returning(|_| Ok(import_job(11, ImportStatus::Processing)));
        store.expect_create_document().times(1).returning(|d| {
            Ok(Document {
                id: 12,
                import_job_id: d.import_job_id,
                file_name: d.file_name,
                checksum: d.checksum,
                size_bytes: d.size_bytes,
                mime_type: d.mime_type,
                metadata: d.metadata,
                provider_id: None,
                course_id: None,
                created_at: 0,
            })
        });
        store
            .expect_upsert_provider()
            .returning(|_| Err(StoreError::Unavailable("connection refused".into())));
        store
            .expect_finish_import_job()
            .withf(|id, c| *id == 11 && c.status == ImportStatus::Failed && c.failure_count == 1)
            .times(1)
            .returning(|id, _| Ok(import_job(id, ImportStatus::Failed)));
        store.expect_link_document().times(1).returning(|_, _, _| Ok(()));

        let dir = TempDir::new().unwrap();
        let (router, token) = app(store, &dir).await;
        let response = router
            .oneshot(upload_request(
                &token,
                "email,nombre,proveedor,codigo_curso\na@x.com,Ana,P1,CUR-001\nb@x.com,Bea,P1,CUR-001",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["importJobId"], 11);
        assert_eq!(body["total"], 2);
        assert_eq!(body["created"], 0);
        assert_eq!(body["updated"], 0);
        assert_eq!(body["errors"], json!([]));
        assert_eq!(body["error"], "storage unavailable: connection refused");
    }

    #[tokio::test]
    async fn test_job_creation_failure_uses_error_body() {
        let mut store = MockStore::new();
        store
            .expect_create_import_job()
            .returning(|_| Err(StoreError::Unavailable("connection refused".into())));

        let dir = TempDir::new().unwrap();
        let (router, token) = app(store, &dir).await;
        let response = router
            .oneshot(upload_request(
                &token,
                "email,nombre,proveedor,codigo_curso\na@x.com,Ana,P1,CUR-001",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "storage_unavailable");
        assert!(body.get("importJobId").is_none());
    }
}
