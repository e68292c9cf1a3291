use super::builders::{UserBuilder, DEFAULT_PASSWORD};
use super::db::TestDb;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use campus::auth::Role;
use campus::jwks::JwksManager;
use campus::settings::Settings;
use campus::storage::{Store, User};
use campus::web::{self, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "campus-test-boundary";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.body).expect("response body is not JSON")
        }
    }
}

/// The full router over a fresh database and fresh signing keys
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn Store>,
    pub settings: Arc<Settings>,
    _db: TestDb,
    _keys: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Like `new`, with `configure` applied to the default settings first
    pub async fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let db = TestDb::new().await;
        let keys = TempDir::new().expect("Failed to create key dir");

        let mut settings = Settings::default();
        configure(&mut settings);
        settings.keys.jwks_path = keys.path().join("jwks.json");
        settings.keys.private_key_path = keys.path().join("private_key.json");
        let settings = Arc::new(settings);

        let jwks = JwksManager::new(settings.keys.clone())
            .await
            .expect("Failed to create JWKS");
        let store = db.store();

        let router = web::router(AppState {
            settings: settings.clone(),
            store: store.clone(),
            jwks,
        });

        Self {
            router,
            store,
            settings,
            _db: db,
            _keys: keys,
        }
    }

    pub async fn user(&self, username: &str, role: Role) -> User {
        UserBuilder::new(username)
            .with_role(role)
            .create(self.store.as_ref())
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn login(&self, username: &str) -> Value {
        let resp = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(serde_json::json!({ "username": username, "password": DEFAULT_PASSWORD })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {:?}", resp.body);
        resp.json()
    }

    /// Create a user with `role` and return an access token for it
    pub async fn token(&self, username: &str, role: Role) -> (User, String) {
        let user = self.user(username, role).await;
        let tokens = self.login(username).await;
        let access = tokens["access_token"]
            .as_str()
            .expect("no access_token")
            .to_string();
        (user, access)
    }

    pub async fn upload(&self, token: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/imports/participants")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("Failed to build upload request");
        self.send(request).await
    }
}
