//! Authenticated session lifecycle.
//!
//! # Design
//! `SessionManager` owns the transport, the normalized base URL and the one
//! live `Session`. Login and logout are the only writers of the session; a
//! 401 answer to an authorized request also drops it, since the server no
//! longer recognizes the cookie. Every other component only ever reads a
//! snapshot of the cookie while building a request.
//!
//! Request construction is split from execution (`build_*` / `parse_*`) the
//! same way the rest of the crate is, so the wire format is testable without
//! a transport.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Cookie name replayed when the server's `Set-Cookie` omits one.
pub const DEFAULT_COOKIE_NAME: &str = "JSESSIONID";

/// A live DSpace REST session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub cookie_name: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Value for the `Cookie` request header.
    pub fn cookie(&self) -> String {
        format!("{}={}", self.cookie_name, self.token)
    }
}

/// Split the first `;`-delimited segment of a `Set-Cookie` value into
/// `(name, token)`. The token is everything after the first `=`.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let first = header.split(';').next()?.trim();
    let (name, token) = first.split_once('=')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let name = match name.trim() {
        "" => DEFAULT_COOKIE_NAME,
        name => name,
    };
    Some((name.to_string(), token.to_string()))
}

pub fn build_login_request(base_url: &str, email: &str, password: &str) -> HttpRequest {
    let body = format!(
        "email={}&password={}",
        urlencoding::encode(email),
        urlencoding::encode(password)
    );
    HttpRequest {
        method: HttpMethod::Post,
        url: format!("{base_url}/login"),
        headers: vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )],
        body: Some(body),
    }
}

/// Extract the session from a login response. Anything but 200 with a
/// usable `Set-Cookie` is an authentication failure.
pub fn parse_login_response(response: &HttpResponse) -> Result<Session, ApiError> {
    if response.status != 200 {
        return Err(ApiError::Authentication(format!(
            "login returned HTTP {}",
            response.status
        )));
    }
    let header = response.header("set-cookie").ok_or_else(|| {
        ApiError::Authentication("login response carried no Set-Cookie header".to_string())
    })?;
    let (cookie_name, token) = parse_set_cookie(header).ok_or_else(|| {
        ApiError::Authentication(format!("unusable Set-Cookie header {header:?}"))
    })?;
    Ok(Session {
        cookie_name,
        token,
        created_at: Utc::now(),
    })
}

/// Owns the credentials' session and attaches it to every request.
pub struct SessionManager<T> {
    transport: T,
    base_url: String,
    session: RwLock<Option<Session>>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    /// Log in and replace any existing session.
    pub fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = build_login_request(&self.base_url, email, password);
        info!(url = %request.url, "logging in to REST API");

        let response = self.transport.execute(&request).map_err(|e| {
            error!(url = %request.url, error = %e, "login endpoint unreachable");
            ApiError::Authentication(format!("login endpoint unreachable: {e}"))
        })?;
        let session = parse_login_response(&response).inspect_err(|e| {
            error!(status = response.status, error = %e, "login rejected");
        })?;

        info!(cookie = %session.cookie_name, "logged in to REST API");
        *self.session.write() = Some(session.clone());
        Ok(session)
    }

    /// Log out. Failures are logged, never returned; the local session is
    /// dropped either way.
    pub fn logout(&self) {
        if let Err(e) = self.try_logout() {
            error!(error = %e, "error logging out of REST API");
        }
    }

    fn try_logout(&self) -> Result<(), ApiError> {
        let request = self.build_authorized_request(HttpMethod::Post, "/logout", None);
        self.session.write().take();
        let request = request?;

        let response = self
            .transport
            .execute(&request)
            .map_err(|e| ApiError::Logout(e.to_string()))?;
        if response.status != 200 {
            return Err(ApiError::Logout(format!(
                "logout returned HTTP {}",
                response.status
            )));
        }
        info!("logged out of REST API");
        Ok(())
    }

    /// Build a request for `path` carrying the session cookie and JSON
    /// headers. Fails with `NotAuthenticated` when there is no session.
    pub fn build_authorized_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpRequest, ApiError> {
        let cookie = self
            .session
            .read()
            .as_ref()
            .map(Session::cookie)
            .ok_or(ApiError::NotAuthenticated)?;
        Ok(HttpRequest {
            method,
            url: join_url(&self.base_url, path),
            headers: vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Cookie".to_string(), cookie),
            ],
            body,
        })
    }

    /// Execute an authorized request. Non-2xx statuses come back as data;
    /// only transport failures are errors.
    pub fn authorized_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let request = self.build_authorized_request(method, path, body)?;
        info!(%method, path, "request");

        let response = self.transport.execute(&request).map_err(|source| {
            error!(%method, path, error = %source, "request failed");
            ApiError::Transport {
                path: path.to_string(),
                source,
            }
        })?;

        if matches!(response.status, 401 | 403) {
            warn!(path, status = response.status, "session rejected by server, discarding it");
            self.session.write().take();
        }
        Ok(response)
    }
}

/// Join a base URL and a resource path with exactly one `/` between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
