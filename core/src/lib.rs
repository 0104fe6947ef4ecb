//! Synchronous client for the DSpace REST API.
//!
//! # Overview
//! Logs in with e-mail and password, keeps the session cookie, and exposes
//! the repository's communities, collections, items and bitstreams as typed
//! entities. List endpoints are walked page by page with offset/limit.
//!
//! # Design
//! - `SessionManager` owns the one session and attaches it to every request.
//! - `pagination::fetch_all` walks pages sequentially until a short page.
//! - `Hydrate` turns raw JSON records into typed entities, keeping unknown
//!   fields in an `extra` map.
//! - Requests and responses are plain data; the `Transport` trait performs
//!   the round-trip (`UreqTransport` in production, fakes in tests).

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod hydrate;
pub mod pagination;
pub mod resources;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{DSpaceClient, DefaultTransport};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use hydrate::{Entity, Hydrate};
pub use session::{Session, SessionManager};
pub use transport::{RetryingTransport, Transport, TransportError, UreqTransport};
pub use types::{
    format_metadata, Bitstream, Collection, Community, CreateCollection, CreateCommunity,
    CreateItem, EntityKind, Item, MetadataEntry, ObjectInfo, ResourcePolicy, UpdateContainer,
};
