//! External collaborators the gateway consults: identity lookup, document
//! authorization and the task log store.
//!
//! The gateway only sees the traits; [`HttpBackend`] implements all three
//! against the web backend's HTTP API.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

pub const GUEST: &str = "Guest";

/// Error from a collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("no backend URL for this connection")]
    NoBaseUrl,
}

/// Credentials and routing for calls made on behalf of one connection.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub site: String,
    /// Backend base URL derived from the upgrade request
    pub base_url: Option<String>,
    pub sid: Option<String>,
    /// Raw `Authorization` header, forwarded as-is
    pub authorization: Option<String>,
    /// Bearer/JWT credential, also sent as a query parameter
    pub token: Option<String>,
}

/// Result of an identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub user: String,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub allow_guest: bool,
}

impl UserInfo {
    pub fn guest() -> Self {
        Self {
            user: GUEST.to_string(),
            sid: None,
            allow_guest: false,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.user == GUEST
    }
}

/// Accepts `true`/`false` as well as the backend's `0`/`1` flags.
pub(crate) fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Null(()) => false,
    })
}

/// The backend wraps every response body in `{"message": ...}`.
#[derive(Deserialize)]
struct Wrapped<T> {
    message: T,
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup(&self, session: &Session) -> Result<UserInfo, BackendError>;
}

#[async_trait]
pub trait DocAuthorizer: Send + Sync {
    /// `Ok(true)` only on an explicit grant; `Ok(false)` on an explicit denial.
    async fn can_subscribe(
        &self,
        session: &Session,
        doctype: &str,
        docname: &str,
    ) -> Result<bool, BackendError>;
}

#[async_trait]
pub trait TaskLogStore: Send + Sync {
    /// Log lines accumulated so far for a task.
    async fn task_lines(
        &self,
        session: &Session,
        task_id: &str,
    ) -> Result<serde_json::Value, BackendError>;
}

/// HTTP implementation of every collaborator.
pub struct HttpBackend {
    client: Client,
    backend_url: Option<String>,
    identity_path: String,
    doc_auth_path: String,
    task_log_path: String,
    task_log_url: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &GatewayConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            backend_url: config
                .backend_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            identity_path: config.identity_path.clone(),
            doc_auth_path: config.doc_auth_path.clone(),
            task_log_path: config.task_log_path.clone(),
            task_log_url: config.task_log_url.clone(),
        })
    }

    fn url(&self, session: &Session, path: &str) -> Result<String, BackendError> {
        let base = self
            .backend_url
            .as_deref()
            .or(session.base_url.as_deref())
            .ok_or(BackendError::NoBaseUrl)?;
        Ok(format!("{}{}", base, path))
    }

    fn get(&self, session: &Session, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("X-Client-Site", &session.site)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(auth) = &session.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        request
    }
}

#[async_trait]
impl IdentityLookup for HttpBackend {
    async fn lookup(&self, session: &Session) -> Result<UserInfo, BackendError> {
        let url = self.url(session, &self.identity_path)?;

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(sid) = session.sid.as_deref() {
            query.push(("sid", sid));
        }
        // The token is sent both as a header and as a query parameter.
        if let Some(token) = session.token.as_deref() {
            query.push(("token", token));
        }

        let resp = self.get(session, &url).query(&query).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(BackendError::Status(resp.status().as_u16()));
        }

        let body: Wrapped<UserInfo> = resp.json().await?;
        Ok(body.message)
    }
}

#[async_trait]
impl DocAuthorizer for HttpBackend {
    async fn can_subscribe(
        &self,
        session: &Session,
        doctype: &str,
        docname: &str,
    ) -> Result<bool, BackendError> {
        let url = self.url(session, &self.doc_auth_path)?;

        let resp = self
            .get(session, &url)
            .query(&[
                ("sid", session.sid.as_deref().unwrap_or(GUEST)),
                ("doctype", doctype),
                ("docname", docname),
            ])
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::FORBIDDEN => Ok(false),
            other => Err(BackendError::Status(other.as_u16())),
        }
    }
}

#[async_trait]
impl TaskLogStore for HttpBackend {
    async fn task_lines(
        &self,
        session: &Session,
        task_id: &str,
    ) -> Result<serde_json::Value, BackendError> {
        let url = match &self.task_log_url {
            Some(url) => url.clone(),
            None => self.url(session, &self.task_log_path)?,
        };

        let resp = self
            .get(session, &url)
            .query(&[("task_id", task_id)])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(BackendError::Status(resp.status().as_u16()));
        }

        let body: Wrapped<Option<serde_json::Value>> = resp.json().await?;
        Ok(body
            .message
            .unwrap_or_else(|| serde_json::Value::Object(Default::default())))
    }
}
