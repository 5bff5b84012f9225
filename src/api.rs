use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{ClassEntry, Emotion, Kind, ReleaseRequest, ReleasedCode, UserDetails};
use crate::session::SessionContext;

const USER_AGENT: &str = concat!("vibe-check/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid value for the {0} header")]
    Header(&'static str),
    #[error("failed to create HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Create the HTTP client used for every backend call.
///
/// The bearer token and configured session cookie ride along as default
/// headers; cookies set by the backend are kept for the life of the client.
pub fn create_http_client(config: &Config) -> Result<Client, ClientBuildError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &config.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientBuildError::Header("Authorization"))?;
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(cookie) = &config.session_cookie {
        let value =
            HeaderValue::from_str(cookie).map_err(|_| ClientBuildError::Header("Cookie"))?;
        headers.insert(COOKIE, value);
    }

    let client = ClientBuilder::new()
        .timeout(config.timeout)
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Typed access to the Vibe Check backend.
pub struct BackendClient {
    http: Client,
    base_url: Url,
    session: Arc<SessionContext>,
}

impl BackendClient {
    pub fn new(config: &Config, session: Arc<SessionContext>) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: create_http_client(config)?,
            base_url: config.base_url.clone(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Class names known to the backend, sorted alphabetically.
    pub async fn list_classes(&self, cancel: &CancelToken) -> Result<Vec<String>, ApiError> {
        let path = "api/codigo/turmas";
        let result = async {
            let response = self.execute(Method::GET, path, |r| r, cancel).await?;
            let entries: Vec<ClassEntry> = read_json(response, path, cancel).await?;
            Ok::<_, ApiError>(entries)
        }
        .await;
        let entries = self.watch_unauthorized(result).await?;

        let mut names: Vec<String> = entries.into_iter().map(ClassEntry::into_name).collect();
        names.sort_by(|a, b| {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        });
        Ok(names)
    }

    /// Opens a check-in or check-out window for `class_name` and returns its code.
    pub async fn release_code(
        &self,
        kind: Kind,
        class_name: &str,
        cancel: &CancelToken,
    ) -> Result<String, ApiError> {
        let path = kind.release_path();
        let body = ReleaseRequest { class_name };
        let result = async {
            let response = self
                .execute(Method::POST, path, |r| r.json(&body), cancel)
                .await?;
            let released: ReleasedCode = read_json(response, path, cancel).await?;
            Ok::<_, ApiError>(released.code)
        }
        .await;
        self.watch_unauthorized(result).await
    }

    pub async fn verify_code(&self, code: &str, cancel: &CancelToken) -> Result<bool, ApiError> {
        let path = "api/registro/verificar-codigo";
        let result = async {
            let response = self
                .execute(Method::GET, path, |r| r.query(&[("codigo", code)]), cancel)
                .await?;
            read_json::<bool>(response, path, cancel).await
        }
        .await;
        self.watch_unauthorized(result).await
    }

    pub async fn register_emotion(
        &self,
        code: &str,
        emotion: Emotion,
        cancel: &CancelToken,
    ) -> Result<(), ApiError> {
        let path = "api/registro/registrar";
        let query = [
            ("codigo", code.to_string()),
            ("emocao", emotion.code().to_string()),
        ];
        let result = self
            .execute(Method::POST, path, |r| r.query(&query), cancel)
            .await
            .map(|_| ());
        self.watch_unauthorized(result).await
    }

    /// Raw dashboard rows; shape checks happen in [`crate::schema`].
    pub async fn dashboard_records(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let path = "api/codigo/dashboard";
        let result = async {
            let response = self.execute(Method::GET, path, |r| r, cancel).await?;
            read_json(response, path, cancel).await
        }
        .await;
        self.watch_unauthorized(result).await
    }

    /// `None` when the backend says nobody is signed in.
    pub async fn user_details(
        &self,
        cancel: &CancelToken,
    ) -> Result<Option<UserDetails>, ApiError> {
        let path = "user/details";
        let response = match self.execute(Method::GET, path, |r| r, cancel).await {
            Ok(response) => response,
            Err(ApiError::Unauthorized { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        read_json(response, path, cancel).await.map(Some)
    }

    /// Ends the local session even when the backend refuses or fails the call.
    pub async fn logout(&self, cancel: &CancelToken) -> Result<(), ApiError> {
        let result = self.execute(Method::POST, "logout", |r| r, cancel).await;
        self.session.invalidate().await;
        result.map(|_| ())
    }

    async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        build: F,
        cancel: &CancelToken,
    ) -> Result<Response, ApiError>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let url = self.base_url.join(path)?;
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, %method, path, "sending request");

        let request = build(
            self.http
                .request(method, url)
                .header("X-Request-Id", request_id.to_string()),
        );
        let response = cancel
            .run(async {
                request.send().await.map_err(|source| ApiError::Network {
                    endpoint: path.to_string(),
                    source,
                })
            })
            .await?;

        let status = response.status();
        tracing::debug!(%request_id, status = status.as_u16(), "response received");
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized {
                endpoint: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status,
            });
        }
        Ok(response)
    }

    async fn watch_unauthorized<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(ApiError::Unauthorized { endpoint }) = &result {
            tracing::warn!("{} rejected the session; signing out locally", endpoint);
            self.session.invalidate().await;
        }
        result
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    path: &str,
    cancel: &CancelToken,
) -> Result<T, ApiError> {
    let bytes = cancel
        .run(async {
            response.bytes().await.map_err(|source| ApiError::Network {
                endpoint: path.to_string(),
                source,
            })
        })
        .await?;
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
        endpoint: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[derive(Clone, Default)]
    struct Backend {
        details_calls: Arc<AtomicUsize>,
    }

    async fn turmas() -> Json<Value> {
        Json(json!(["infoweb", {"id": 3, "nome": "Artes"}, "2B"]))
    }

    async fn liberar(headers: AxumHeaders, Json(body): Json<Value>) -> Json<Value> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let class_name = body["nomeTurma"].as_str().unwrap_or_default();
        Json(json!({ "codigo": format!("{class_name}-{}", token.len()) }))
    }

    async fn verificar(
        Query(params): Query<std::collections::HashMap<String, String>>,
    ) -> Json<bool> {
        Json(params.get("codigo").map(String::as_str) == Some("ABC123"))
    }

    async fn registrar(
        Query(params): Query<std::collections::HashMap<String, String>>,
    ) -> AxumStatus {
        match (params.get("codigo"), params.get("emocao")) {
            (Some(code), Some(emotion)) if code == "ABC123" && emotion == "4" => AxumStatus::OK,
            _ => AxumStatus::BAD_REQUEST,
        }
    }

    async fn details(
        State(backend): State<Backend>,
        headers: AxumHeaders,
    ) -> Result<Json<Value>, AxumStatus> {
        backend.details_calls.fetch_add(1, Ordering::SeqCst);
        match headers.get("cookie").and_then(|v| v.to_str().ok()) {
            Some(cookie) if cookie.contains("JSESSIONID=ok") => Ok(Json(json!({
                "roles": ["ROLE_PROFESSOR"],
                "googleId": "g-1",
                "email": "ana@ifpe.edu.br",
                "name": "Ana"
            }))),
            _ => Err(AxumStatus::UNAUTHORIZED),
        }
    }

    async fn dashboard_unauthorized() -> AxumStatus {
        AxumStatus::UNAUTHORIZED
    }

    async fn slow() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Json(json!([]))
    }

    async fn spawn_backend(backend: Backend, with_slow_dashboard: bool) -> Url {
        let dashboard = if with_slow_dashboard {
            get(slow)
        } else {
            get(dashboard_unauthorized)
        };
        let app = Router::new()
            .route("/api/codigo/turmas", get(turmas))
            .route("/api/codigo/liberar-checkin", post(liberar))
            .route("/api/codigo/liberar-checkout", post(liberar))
            .route("/api/registro/verificar-codigo", get(verificar))
            .route("/api/registro/registrar", post(registrar))
            .route("/api/codigo/dashboard", dashboard)
            .route("/user/details", get(details))
            .route("/logout", post(|| async { AxumStatus::OK }))
            .with_state(backend);
        serve(app).await
    }

    async fn serve(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    fn config(base_url: Url, token: Option<&str>, cookie: Option<&str>) -> Config {
        Config {
            base_url,
            timeout: Duration::from_secs(5),
            token: token.map(str::to_string),
            session_cookie: cookie.map(str::to_string),
            state_dir: PathBuf::from("/tmp/vibe-check-api-tests"),
        }
    }

    fn client(config: &Config) -> BackendClient {
        BackendClient::new(config, Arc::new(SessionContext::new())).unwrap()
    }

    #[tokio::test]
    async fn lists_classes_sorted_from_mixed_shapes() {
        let base = spawn_backend(Backend::default(), false).await;
        let client = client(&config(base, None, None));
        let classes = client.list_classes(&CancelToken::new()).await.unwrap();
        assert_eq!(classes, vec!["2B", "Artes", "infoweb"]);
    }

    #[tokio::test]
    async fn release_sends_class_name_and_bearer_token() {
        let base = spawn_backend(Backend::default(), false).await;
        let client = client(&config(base, Some("tok"), None));
        let code = client
            .release_code(Kind::CheckOut, "3A", &CancelToken::new())
            .await
            .unwrap();
        // "Bearer tok" is ten bytes long.
        assert_eq!(code, "3A-10");
    }

    #[tokio::test]
    async fn verifies_and_registers_codes() {
        let base = spawn_backend(Backend::default(), false).await;
        let client = client(&config(base, None, None));
        let cancel = CancelToken::new();
        assert!(client.verify_code("ABC123", &cancel).await.unwrap());
        assert!(!client.verify_code("nope", &cancel).await.unwrap());

        client
            .register_emotion("ABC123", Emotion::Indifferent, &cancel)
            .await
            .unwrap();
        let err = client
            .register_emotion("ABC123", Emotion::Sad, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn session_resolves_once_and_unauthorized_invalidates_it() {
        let backend = Backend::default();
        let calls = backend.details_calls.clone();
        let base = spawn_backend(backend, false).await;
        let client = client(&config(base, None, Some("JSESSIONID=ok")));
        let cancel = CancelToken::new();

        let user = client.session().current(&client, &cancel).await.unwrap();
        assert_eq!(user.map(|u| u.name), Some("Ana".to_string()));
        client.session().current(&client, &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = client.dashboard_records(&cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert!(!client.session().is_resolved().await);

        client.session().current(&client, &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_session_cookie_means_no_user() {
        let base = spawn_backend(Backend::default(), false).await;
        let client = client(&config(base, None, None));
        let user = client
            .session()
            .current(&client, &CancelToken::new())
            .await
            .unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn logout_clears_the_session() {
        let base = spawn_backend(Backend::default(), false).await;
        let client = client(&config(base, None, Some("JSESSIONID=ok")));
        let cancel = CancelToken::new();
        client.session().current(&client, &cancel).await.unwrap();
        assert!(client.session().is_resolved().await);

        client.logout(&cancel).await.unwrap();
        assert!(!client.session().is_resolved().await);
    }

    #[tokio::test]
    async fn rejected_logout_still_clears_the_session() {
        let app = Router::new()
            .route("/user/details", get(details))
            .route("/logout", post(|| async { AxumStatus::UNAUTHORIZED }))
            .with_state(Backend::default());
        let base = serve(app).await;
        let client = client(&config(base, None, Some("JSESSIONID=ok")));
        let cancel = CancelToken::new();
        let user = client.session().current(&client, &cancel).await.unwrap();
        assert!(user.is_some());

        let err = client.logout(&cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert!(!client.session().is_resolved().await);
    }

    #[tokio::test]
    async fn cancelling_aborts_an_in_flight_fetch() {
        let base = spawn_backend(Backend::default(), true).await;
        let client = client(&config(base, None, None));
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.dashboard_records(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let client = client(&config(base, None, None));
        let err = client.list_classes(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Network { .. }));
    }
}
