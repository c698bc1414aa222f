pub(crate) mod stream;

use crate::models::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) use stream::Subscription;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    Unauthorized,
    Network,
    Http,
    Parse,
    /// The provider answered with an error code (e.g. `EMAIL_EXISTS`).
    Rejected,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub(crate) fn network(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            code: None,
            message: e.to_string(),
        }
    }

    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            code: None,
            message: e.to_string(),
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            code: None,
            message: "Unauthorized".to_string(),
        }
    }

    pub(crate) fn http(status: reqwest::StatusCode, body: String, ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            code: None,
            message: format!("{ctx} ({status}): {body}"),
        }
    }

    pub(crate) fn rejected(code: &str) -> Self {
        Self {
            kind: ApiErrorKind::Rejected,
            code: Some(code.to_string()),
            message: code.to_string(),
        }
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct EnvConfig {
    pub api_key: String,
    pub auth_url: String,
    pub token_url: String,
    pub database_url: String,
    pub database_namespace: Option<String>,
    pub password_min_length: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        // Local Firebase emulators.
        Self {
            api_key: "fake-api-key".to_string(),
            auth_url: "http://localhost:9099/identitytoolkit.googleapis.com/v1".to_string(),
            token_url: "http://localhost:9099/securetoken.googleapis.com/v1".to_string(),
            database_url: "http://localhost:9000".to_string(),
            database_namespace: None,
            password_min_length: 6,
        }
    }
}

impl EnvConfig {
    /// Read `window.ENV`, accepting both `UPPER_CASE` and `snake_case` keys.
    pub fn from_window() -> Self {
        let mut cfg = Self::default();

        let Some(env) = web_sys::window().and_then(|w| w.get("ENV")) else {
            return cfg;
        };
        if env.is_undefined() || !env.is_object() {
            return cfg;
        }

        let get_s = |upper: &str, lower: &str| {
            [upper, lower].iter().find_map(|k| {
                js_sys::Reflect::get(&env, &(*k).into())
                    .ok()
                    .and_then(|v| v.as_string())
                    .filter(|s| !s.trim().is_empty())
            })
        };

        if let Some(v) = get_s("FIREBASE_API_KEY", "api_key") {
            cfg.api_key = v;
        }
        if let Some(v) = get_s("AUTH_URL", "auth_url") {
            cfg.auth_url = v;
        }
        if let Some(v) = get_s("TOKEN_URL", "token_url") {
            cfg.token_url = v;
        }
        if let Some(v) = get_s("DATABASE_URL", "database_url") {
            cfg.database_url = v;
        }
        if let Some(v) = get_s("DATABASE_NAMESPACE", "database_namespace") {
            cfg.database_namespace = Some(v);
        }
        if let Some(n) = get_s("PASSWORD_MIN_LENGTH", "password_min_length")
            .and_then(|v| v.parse::<usize>().ok())
        {
            cfg.password_min_length = n;
        }

        cfg
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordRequest {
    pub email: String,
    pub password: String,
    pub return_secure_token: bool,
}

#[derive(Serialize, Clone, Debug)]
pub(crate) struct RefreshRequest {
    pub grant_type: String,
    pub refresh_token: String,
}

/// Body of `accounts:signInWithPassword` and `accounts:signUp`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, as a string.
    pub expires_in: String,
}

impl PasswordResponse {
    pub fn into_session(self, now_ms: i64) -> Session {
        Session {
            uid: self.local_id,
            email: self.email,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at_ms: expires_at(now_ms, &self.expires_in),
        }
    }
}

/// Body of the secure-token refresh endpoint.
#[derive(Deserialize, Clone, Debug)]
pub(crate) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub user_id: String,
}

impl RefreshResponse {
    pub fn apply_to(self, session: &Session, now_ms: i64) -> Session {
        Session {
            uid: self.user_id,
            email: session.email.clone(),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at_ms: expires_at(now_ms, &self.expires_in),
        }
    }
}

fn expires_at(now_ms: i64, expires_in: &str) -> i64 {
    let secs = expires_in.trim().parse::<i64>().unwrap_or(3600);
    now_ms + secs * 1000
}

/// Extract the provider error code from an Identity Toolkit error body.
///
/// `{"error": {"message": "WEAK_PASSWORD : Password should be at least 6 characters"}}`
/// yields `WEAK_PASSWORD`.
pub(crate) fn parse_provider_error_code(body: &str) -> Option<String> {
    let data: Value = serde_json::from_str(body).ok()?;
    let message = data.get("error")?.get("message")?.as_str()?;
    let code = message.split(" : ").next().unwrap_or(message).trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    res: reqwest::Response,
    ctx: &str,
) -> ApiResult<T> {
    let status = res.status();
    if status.is_success() {
        return res.json().await.map_err(ApiError::parse);
    }
    if status.as_u16() == 401 {
        return Err(ApiError::unauthorized());
    }

    let body = res.text().await.unwrap_or_default();
    match parse_provider_error_code(&body) {
        Some(code) => Err(ApiError::rejected(&code)),
        None => Err(ApiError::http(status, body, ctx)),
    }
}

/// Identity Toolkit client (email/password accounts).
#[derive(Clone)]
pub(crate) struct AuthClient {
    pub(crate) auth_url: String,
    pub(crate) token_url: String,
    pub(crate) api_key: String,
}

impl AuthClient {
    pub fn new(cfg: &EnvConfig) -> Self {
        Self {
            auth_url: cfg.auth_url.trim_end_matches('/').to_string(),
            token_url: cfg.token_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }
    }

    pub(crate) fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.auth_url,
            action,
            urlencoding::encode(&self.api_key)
        )
    }

    pub(crate) fn refresh_endpoint(&self) -> String {
        format!(
            "{}/token?key={}",
            self.token_url,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn password_request(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> ApiResult<PasswordResponse> {
        let client = reqwest::Client::new();
        let res = client
            .post(self.endpoint(action))
            .json(&PasswordRequest {
                email: email.to_string(),
                password: password.to_string(),
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(ApiError::network)?;

        read_json(res, action).await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ApiResult<PasswordResponse> {
        self.password_request("signInWithPassword", email, password)
            .await
    }

    pub async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ApiResult<PasswordResponse> {
        self.password_request("signUp", email, password).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> ApiResult<RefreshResponse> {
        let client = reqwest::Client::new();
        let res = client
            .post(self.refresh_endpoint())
            .json(&RefreshRequest {
                grant_type: "refresh_token".to_string(),
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await
            .map_err(ApiError::network)?;

        read_json(res, "token").await
    }
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct PushResponse {
    /// Push-generated id of the new child.
    pub name: String,
}

/// Realtime Database REST client scoped to one session's id token.
#[derive(Clone)]
pub(crate) struct DbClient {
    pub(crate) base_url: String,
    pub(crate) namespace: Option<String>,
    pub(crate) token: Option<String>,
}

impl DbClient {
    pub fn new(cfg: &EnvConfig) -> Self {
        Self {
            base_url: cfg.database_url.trim_end_matches('/').to_string(),
            namespace: cfg.database_namespace.clone(),
            token: None,
        }
    }

    pub fn with_session(mut self, session: &Session) -> Self {
        self.token = Some(session.id_token.clone());
        self
    }

    /// `{base}/{path}.json` plus auth and namespace query parameters.
    pub(crate) fn url(&self, path: &str) -> String {
        let mut url = format!("{}/{}.json", self.base_url, path.trim_matches('/'));
        let mut sep = '?';
        if let Some(token) = &self.token {
            url.push_str(&format!("{sep}auth={}", urlencoding::encode(token)));
            sep = '&';
        }
        if let Some(ns) = &self.namespace {
            url.push_str(&format!("{sep}ns={}", urlencoding::encode(ns)));
        }
        url
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        let client = reqwest::Client::new();
        let mut req = client.request(method, self.url(path));
        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;
        read_json(res, path).await
    }

    pub async fn push_record(&self, path: &str, record: &Value) -> ApiResult<String> {
        let res: PushResponse = self
            .request(reqwest::Method::POST, path, Some(record))
            .await?;
        Ok(res.name)
    }

    pub async fn patch(&self, path: &str, partial: &Value) -> ApiResult<()> {
        let _: Value = self
            .request(reqwest::Method::PATCH, path, Some(partial))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let _: Value = self.request(reqwest::Method::DELETE, path, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EnvConfig {
        EnvConfig {
            api_key: "k ey".to_string(),
            auth_url: "https://identitytoolkit.googleapis.com/v1/".to_string(),
            token_url: "https://securetoken.googleapis.com/v1".to_string(),
            database_url: "https://demo.firebaseio.com/".to_string(),
            database_namespace: None,
            password_min_length: 6,
        }
    }

    #[test]
    fn test_auth_endpoints() {
        let c = AuthClient::new(&cfg());
        assert_eq!(
            c.endpoint("signInWithPassword"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=k%20ey"
        );
        assert_eq!(
            c.refresh_endpoint(),
            "https://securetoken.googleapis.com/v1/token?key=k%20ey"
        );
    }

    #[test]
    fn test_db_url_without_session() {
        let db = DbClient::new(&cfg());
        assert_eq!(db.url("notes/u1"), "https://demo.firebaseio.com/notes/u1.json");
    }

    #[test]
    fn test_db_url_with_session_and_namespace() {
        let session = Session {
            uid: "u1".to_string(),
            email: String::new(),
            id_token: "a+b".to_string(),
            refresh_token: String::new(),
            expires_at_ms: 0,
        };
        let mut db = DbClient::new(&cfg()).with_session(&session);
        db.namespace = Some("demo".to_string());
        assert_eq!(
            db.url("/notes/u1/-N1/"),
            "https://demo.firebaseio.com/notes/u1/-N1.json?auth=a%2Bb&ns=demo"
        );
    }

    #[test]
    fn test_password_response_contract_deserialize() {
        let json = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "uid-1",
            "email": "u@example.com",
            "displayName": "",
            "idToken": "id-token",
            "registered": true,
            "refreshToken": "refresh",
            "expiresIn": "3600"
        }"#;
        let parsed: PasswordResponse =
            serde_json::from_str(json).expect("password response should parse");
        let session = parsed.into_session(1_000);
        assert_eq!(session.uid, "uid-1");
        assert_eq!(session.id_token, "id-token");
        assert_eq!(session.expires_at_ms, 1_000 + 3_600_000);
    }

    #[test]
    fn test_refresh_response_keeps_email() {
        let json = r#"{
            "expires_in": "3600",
            "token_type": "Bearer",
            "refresh_token": "r2",
            "id_token": "t2",
            "user_id": "uid-1",
            "project_id": "demo"
        }"#;
        let parsed: RefreshResponse =
            serde_json::from_str(json).expect("refresh response should parse");
        let old = Session {
            uid: "uid-1".to_string(),
            email: "u@example.com".to_string(),
            id_token: "t1".to_string(),
            refresh_token: "r1".to_string(),
            expires_at_ms: 0,
        };
        let s = parsed.apply_to(&old, 10);
        assert_eq!(s.email, "u@example.com");
        assert_eq!(s.id_token, "t2");
        assert_eq!(s.refresh_token, "r2");
        assert_eq!(s.expires_at_ms, 10 + 3_600_000);
    }

    #[test]
    fn test_password_request_serialization() {
        let req = PasswordRequest {
            email: "u@example.com".to_string(),
            password: "secret".to_string(),
            return_secure_token: true,
        };
        let v = serde_json::to_value(req).expect("should serialize");
        assert_eq!(v["returnSecureToken"], true);
        assert_eq!(v["email"], "u@example.com");
    }

    #[test]
    fn test_parse_provider_error_code() {
        let body = r#"{"error":{"code":400,"message":"WEAK_PASSWORD : Password should be at least 6 characters","errors":[]}}"#;
        assert_eq!(parse_provider_error_code(body).as_deref(), Some("WEAK_PASSWORD"));

        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS"}}"#;
        assert_eq!(parse_provider_error_code(body).as_deref(), Some("EMAIL_EXISTS"));

        assert!(parse_provider_error_code("<html>bad gateway</html>").is_none());
        assert!(parse_provider_error_code(r#"{"error":"Permission denied"}"#).is_none());
    }

    #[test]
    fn test_push_response_contract() {
        let parsed: PushResponse =
            serde_json::from_str(r#"{"name":"-NxYz"}"#).expect("push response should parse");
        assert_eq!(parsed.name, "-NxYz");
    }
}
