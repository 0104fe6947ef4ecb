//! Error types for the DSpace REST client.
//!
//! # Design
//! Authentication failures are fatal for client construction: a client is
//! only ever handed out with a live session. Everything else is recoverable
//! and surfaces as a typed variant at the operation boundary. `Logout` is
//! produced internally and logged; `DSpaceClient::logout` never returns it.

use thiserror::Error;

use crate::transport::TransportError;
use crate::types::EntityKind;

/// Errors returned by the session manager, the fetcher and the client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Login was rejected or the login endpoint was unreachable.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A request was attempted without a live session.
    #[error("not authenticated: no live session")]
    NotAuthenticated,

    /// A page request returned a non-success status.
    #[error("could not fetch {path}: HTTP {status}: {body}")]
    Fetch {
        path: String,
        status: u16,
        body: String,
    },

    /// The server kept answering full pages without advancing.
    #[error("pagination of {path} stalled at offset {offset}: {reason}")]
    Pagination {
        path: String,
        offset: usize,
        reason: String,
    },

    /// A JSON record could not be turned into a typed entity.
    #[error("could not hydrate {kind}: field `{field}`: {reason}")]
    Hydration {
        kind: EntityKind,
        field: String,
        reason: String,
    },

    /// The logout request failed. Logged by `SessionManager::logout`.
    #[error("logout failed: {0}")]
    Logout(String),

    /// The transport failed before a response was received.
    #[error("transport failure on {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: TransportError,
    },

    /// The server returned 404.
    #[error("resource not found: {path}")]
    NotFound { path: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// A response body was not the JSON shape expected.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A request payload could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Client settings or paging arguments that cannot work.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    pub(crate) fn hydration(
        kind: EntityKind,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ApiError::Hydration {
            kind,
            field: field.into(),
            reason: reason.into(),
        }
    }
}
