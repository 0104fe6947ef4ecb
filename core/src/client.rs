//! The DSpace REST client.
//!
//! # Design
//! `DSpaceClient` is only ever handed out logged in: construction performs
//! the login and fails with `ApiError::Authentication` otherwise. There is
//! no process-wide client; entity operations in `resources` take the client
//! they should talk through as an argument.
//!
//! List operations go through the paginated fetcher with the configured
//! offset and limit unless a `*_page` variant is used. Items are hydrated by
//! `hydrate_item`, which also loads metadata when the config asks for it.

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::hydrate::{Entity, Hydrate};
use crate::http::{HttpMethod, HttpResponse};
use crate::pagination;
use crate::session::SessionManager;
use crate::transport::{RetryingTransport, Transport, UreqTransport};
use crate::types::{
    Bitstream, Collection, Community, CreateCommunity, Item, MetadataEntry, UpdateContainer,
};

/// Transport used by `DSpaceClient::connect`.
pub type DefaultTransport = RetryingTransport<UreqTransport>;

/// Synchronous client bound to one DSpace REST endpoint and session.
pub struct DSpaceClient<T: Transport = DefaultTransport> {
    session: SessionManager<T>,
    config: ClientConfig,
}

impl DSpaceClient<DefaultTransport> {
    /// Log in over `ureq` with the TLS, timeout and retry settings of `config`.
    pub fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let transport =
            RetryingTransport::new(UreqTransport::from_config(&config), config.retry_max_elapsed());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> DSpaceClient<T> {
    /// Log in over `transport`.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self, ApiError> {
        config.validate()?;
        let base_url = config.base_url()?;
        info!(base_url, "DSpace REST root");

        let session = SessionManager::new(transport, base_url);
        session.login(&config.user, &config.password)?;
        Ok(Self { session, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    /// End the session. Never fails; problems are logged.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Fetch every page of `path` from `offset` in pages of `limit`.
    pub fn fetch_all<E, F>(
        &self,
        path: &str,
        offset: usize,
        limit: usize,
        hydrate: F,
    ) -> Result<Vec<E>, ApiError>
    where
        F: FnMut(Value) -> Result<E, ApiError>,
    {
        pagination::fetch_all(&self.session, path, offset, limit, hydrate)
    }

    pub(crate) fn fetch_entities<E: Hydrate>(
        &self,
        path: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<E>, ApiError> {
        self.fetch_all(path, offset, limit, E::hydrate)
    }

    pub(crate) fn fetch_items(
        &self,
        path: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Item>, ApiError> {
        self.fetch_all(path, offset, limit, |record| self.hydrate_item(record))
    }

    /// Hydrate an item record, attaching its metadata when the client is
    /// configured to load it eagerly.
    pub fn hydrate_item(&self, record: Value) -> Result<Item, ApiError> {
        let mut item = Item::hydrate(record)?;
        if self.config.load_item_metadata {
            item.metadata = Some(self.item_metadata(&item.info.uuid)?);
        }
        Ok(item)
    }

    fn default_page(&self) -> (usize, usize) {
        (self.config.offset, self.config.limit)
    }

    pub fn items(&self) -> Result<Vec<Item>, ApiError> {
        let (offset, limit) = self.default_page();
        self.items_page(offset, limit)
    }

    pub fn items_page(&self, offset: usize, limit: usize) -> Result<Vec<Item>, ApiError> {
        self.fetch_items("/items", offset, limit)
    }

    pub fn communities(&self) -> Result<Vec<Community>, ApiError> {
        let (offset, limit) = self.default_page();
        self.communities_page(offset, limit)
    }

    pub fn communities_page(&self, offset: usize, limit: usize) -> Result<Vec<Community>, ApiError> {
        self.fetch_entities("/communities", offset, limit)
    }

    pub fn top_communities(&self) -> Result<Vec<Community>, ApiError> {
        let (offset, limit) = self.default_page();
        self.top_communities_page(offset, limit)
    }

    pub fn top_communities_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Community>, ApiError> {
        self.fetch_entities("/communities/top-communities", offset, limit)
    }

    pub fn collections(&self) -> Result<Vec<Collection>, ApiError> {
        let (offset, limit) = self.default_page();
        self.collections_page(offset, limit)
    }

    pub fn collections_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Collection>, ApiError> {
        self.fetch_entities("/collections", offset, limit)
    }

    pub fn bitstreams(&self) -> Result<Vec<Bitstream>, ApiError> {
        let (offset, limit) = self.default_page();
        self.bitstreams_page(offset, limit)
    }

    pub fn bitstreams_page(&self, offset: usize, limit: usize) -> Result<Vec<Bitstream>, ApiError> {
        self.fetch_entities("/bitstreams", offset, limit)
    }

    /// Items whose `field` contains `needle`. Items without the field never
    /// match.
    pub fn find_items_by(&self, field: &str, needle: &str) -> Result<Vec<Item>, ApiError> {
        Ok(filter_by(self.items()?, field, needle))
    }

    /// Communities whose `field` contains `needle`.
    pub fn find_communities_by(
        &self,
        field: &str,
        needle: &str,
    ) -> Result<Vec<Community>, ApiError> {
        Ok(filter_by(self.communities()?, field, needle))
    }

    /// Resolve a handle such as `123456789/42` to the object's UUID.
    pub fn resolve_handle(&self, handle: &str) -> Result<String, ApiError> {
        let path = format!("/handle/{}", handle.trim_matches('/'));
        let response = self.request(HttpMethod::Get, &path, None)?;
        let value: Value = parse_json(&response)?;
        value
            .get("uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Deserialization(format!("{path}: response carries no uuid"))
            })
    }

    pub(crate) fn item_metadata(&self, uuid: &str) -> Result<Vec<MetadataEntry>, ApiError> {
        let response = self.request(HttpMethod::Get, &format!("/items/{uuid}/metadata"), None)?;
        parse_json(&response)
    }

    /// Create a community; nested under `parent` when given.
    pub fn create_community(&self, name: &str, parent: Option<&str>) -> Result<Community, ApiError> {
        let path = match parent {
            Some(parent) => format!("/communities/{parent}/communities"),
            None => "/communities".to_string(),
        };
        let response = self.send_json(HttpMethod::Post, &path, &CreateCommunity::new(name))?;
        let community = Community::hydrate(parse_json(&response)?)?;
        info!(name, uuid = %community.info.uuid, "created community");
        Ok(community)
    }

    pub fn update_community(&self, uuid: &str, update: &UpdateContainer) -> Result<(), ApiError> {
        self.send_json(HttpMethod::Put, &format!("/communities/{uuid}"), update)?;
        info!(uuid, "updated community");
        Ok(())
    }

    pub fn delete_community(&self, uuid: &str) -> Result<(), ApiError> {
        self.delete(&format!("/communities/{uuid}"))
    }

    pub fn update_collection(&self, uuid: &str, update: &UpdateContainer) -> Result<(), ApiError> {
        self.send_json(HttpMethod::Put, &format!("/collections/{uuid}"), update)?;
        info!(uuid, "updated collection");
        Ok(())
    }

    pub fn delete_collection(&self, uuid: &str) -> Result<(), ApiError> {
        self.delete(&format!("/collections/{uuid}"))
    }

    pub fn delete_item(&self, uuid: &str) -> Result<(), ApiError> {
        self.delete(&format!("/items/{uuid}"))
    }

    /// Delete the item a handle points at. Returns the item's UUID.
    pub fn delete_item_by_handle(&self, handle: &str) -> Result<String, ApiError> {
        let uuid = self.resolve_handle(handle)?;
        self.delete_item(&uuid)?;
        Ok(uuid)
    }

    pub fn delete_bitstream(&self, uuid: &str) -> Result<(), ApiError> {
        self.delete(&format!("/bitstreams/{uuid}"))
    }

    /// Delete every bitstream named `file_name` from `items`, or from all
    /// items when none are given. Returns how many were deleted.
    pub fn delete_bitstream_named(
        &self,
        file_name: &str,
        items: Option<&[Item]>,
    ) -> Result<usize, ApiError> {
        let fetched;
        let items = match items {
            Some(items) => items,
            None => {
                fetched = self.items()?;
                &fetched
            }
        };

        let mut deleted = 0;
        for item in items {
            for bitstream in item.bitstreams(self)? {
                if bitstream.info.name.as_deref() == Some(file_name) {
                    self.delete_bitstream(&bitstream.info.uuid)?;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request(HttpMethod::Delete, path, None)?;
        info!(path, "deleted");
        Ok(())
    }

    /// Serialize `body` as JSON and send it; non-2xx statuses are errors.
    pub(crate) fn send_json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        let body =
            serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.request(method, path, Some(body))
    }

    /// Authorized request whose non-2xx statuses are turned into errors.
    pub(crate) fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let response = self.session.authorized_request(method, path, body)?;
        check_status(path, response).inspect_err(|e| {
            error!(%method, path, error = %e, "request unsuccessful");
        })
    }
}

fn filter_by<E: Entity>(entities: Vec<E>, field: &str, needle: &str) -> Vec<E> {
    entities
        .into_iter()
        .filter(|e| e.field(field).is_some_and(|value| value.contains(needle)))
        .collect()
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(path: &str, response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    if response.status == 404 {
        return Err(ApiError::NotFound {
            path: path.to_string(),
        });
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body,
    })
}

pub(crate) fn parse_json<D: serde::de::DeserializeOwned>(
    response: &HttpResponse,
) -> Result<D, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}
