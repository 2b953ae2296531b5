//! reqwest implementation of [`AuthTransport`].

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::transport::{AuthTransport, LoginGrant, RefreshGrant, TransportError};
use crate::models::auth::{Credentials, DeviceInfo, DeviceSession, User};

/// Name of the cookie that carries the bearer token.
const TOKEN_COOKIE: &str = "token";

/// Login response: the user record plus optional session credentials.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterSessionRequest<'a> {
    device_info: &'a DeviceInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeSessionRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeAllExceptRequest<'a> {
    current_session_id: &'a str,
}

/// Error body shape of the auth API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the remote auth API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport rooted at `base_url` (e.g. "https://dummyjson.com").
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|e| TransportError::Unknown(format!("invalid base url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TransportError::Unknown(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Unknown(format!("invalid endpoint {path}: {e}")))
    }

    /// Send a request, turning transport failures and non-2xx statuses into errors.
    async fn send(request: RequestBuilder) -> Result<Response, TransportError> {
        let resp = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));
        debug!(status = status.as_u16(), "auth API request failed");
        Err(TransportError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, TransportError> {
        resp.json::<T>()
            .await
            .map_err(|e| TransportError::Unknown(format!("response parse error: {e}")))
    }
}

/// Extract the bearer token cookie from `Set-Cookie` headers.
fn token_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name.trim() == TOKEN_COOKIE && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, TransportError> {
        let url = self.endpoint("auth/login")?;
        let resp = Self::send(self.client.post(url).json(credentials)).await?;
        let cookie_token = token_cookie(&resp);
        let body: LoginResponse = Self::parse(resp).await?;
        Ok(LoginGrant {
            user: body.user,
            refresh_token: body.refresh_token,
            csrf_token: body.csrf_token,
            cookie_token,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, TransportError> {
        let url = self.endpoint("auth/refresh")?;
        let resp =
            Self::send(self.client.post(url).json(&RefreshRequest { refresh_token })).await?;
        let cookie_token = token_cookie(&resp);
        let body: RefreshResponse = Self::parse(resp).await?;
        Ok(RefreshGrant {
            token: body.token,
            refresh_token: body.refresh_token,
            cookie_token,
        })
    }

    async fn register_session(
        &self,
        access_token: &str,
        device: &DeviceInfo,
    ) -> Result<DeviceSession, TransportError> {
        let url = self.endpoint("auth/sessions/register")?;
        let request = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&RegisterSessionRequest {
                device_info: device,
            });
        Self::parse(Self::send(request).await?).await
    }

    async fn list_sessions(
        &self,
        access_token: &str,
    ) -> Result<Vec<DeviceSession>, TransportError> {
        let url = self.endpoint("auth/sessions")?;
        let request = self.client.get(url).bearer_auth(access_token);
        Self::parse(Self::send(request).await?).await
    }

    async fn revoke_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<(), TransportError> {
        let url = self.endpoint("auth/sessions/revoke")?;
        let request = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&RevokeSessionRequest { session_id });
        Self::send(request).await.map(|_| ())
    }

    async fn revoke_all_except(
        &self,
        access_token: &str,
        keep_session_id: &str,
    ) -> Result<(), TransportError> {
        let url = self.endpoint("auth/sessions/revoke-all-except")?;
        let request = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&RevokeAllExceptRequest {
                current_session_id: keep_session_id,
            });
        Self::send(request).await.map(|_| ())
    }
}
