//! Operations reached through an entity: its children, its metadata, its
//! policies. Each takes the client to talk through explicitly.

use tracing::info;

use crate::client::{parse_json, DSpaceClient};
use crate::error::ApiError;
use crate::hydrate::Hydrate;
use crate::http::HttpMethod;
use crate::transport::Transport;
use crate::types::{
    Bitstream, Collection, Community, CreateCollection, CreateItem, Item, MetadataEntry,
    ResourcePolicy,
};

impl Community {
    pub fn collections<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
    ) -> Result<Vec<Collection>, ApiError> {
        let config = client.config();
        client.fetch_entities(
            &format!("/communities/{}/collections", self.info.uuid),
            config.offset,
            config.limit,
        )
    }

    pub fn subcommunities<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
    ) -> Result<Vec<Community>, ApiError> {
        let config = client.config();
        client.fetch_entities(
            &format!("/communities/{}/communities", self.info.uuid),
            config.offset,
            config.limit,
        )
    }

    pub fn create_subcommunity<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        name: &str,
    ) -> Result<Community, ApiError> {
        client.create_community(name, Some(&self.info.uuid))
    }

    pub fn create_collection<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        name: &str,
    ) -> Result<Collection, ApiError> {
        let path = format!("/communities/{}/collections", self.info.uuid);
        let response = client.send_json(HttpMethod::Post, &path, &CreateCollection::new(name))?;
        let collection = Collection::hydrate(parse_json(&response)?)?;
        info!(name, uuid = %collection.info.uuid, "created collection");
        Ok(collection)
    }
}

impl Collection {
    pub fn items<T: Transport>(&self, client: &DSpaceClient<T>) -> Result<Vec<Item>, ApiError> {
        let config = client.config();
        client.fetch_items(
            &format!("/collections/{}/items", self.info.uuid),
            config.offset,
            config.limit,
        )
    }

    /// Create an item in this collection from its metadata.
    pub fn create_item<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        metadata: Vec<MetadataEntry>,
    ) -> Result<Item, ApiError> {
        let path = format!("/collections/{}/items", self.info.uuid);
        let response = client.send_json(HttpMethod::Post, &path, &CreateItem::new(metadata))?;
        let item = client.hydrate_item(parse_json(&response)?)?;
        info!(uuid = %item.info.uuid, collection = %self.info.uuid, "created item");
        Ok(item)
    }
}

impl Item {
    /// Fetch this item's metadata from the server.
    pub fn metadata<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
    ) -> Result<Vec<MetadataEntry>, ApiError> {
        client.item_metadata(&self.info.uuid)
    }

    pub fn bitstreams<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
    ) -> Result<Vec<Bitstream>, ApiError> {
        let config = client.config();
        client.fetch_entities(
            &format!("/items/{}/bitstreams", self.info.uuid),
            config.offset,
            config.limit,
        )
    }

    /// Append metadata entries.
    pub fn add_metadata<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        metadata: &[MetadataEntry],
    ) -> Result<(), ApiError> {
        let path = format!("/items/{}/metadata", self.info.uuid);
        client.send_json(HttpMethod::Post, &path, metadata)?;
        info!(uuid = %self.info.uuid, count = metadata.len(), "added metadata");
        Ok(())
    }

    /// Replace the values of the metadata keys present in `metadata`.
    pub fn update_metadata<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        metadata: &[MetadataEntry],
    ) -> Result<(), ApiError> {
        let path = format!("/items/{}/metadata", self.info.uuid);
        client.send_json(HttpMethod::Put, &path, metadata)?;
        info!(uuid = %self.info.uuid, count = metadata.len(), "updated metadata");
        Ok(())
    }

    pub fn delete<T: Transport>(&self, client: &DSpaceClient<T>) -> Result<(), ApiError> {
        client.delete_item(&self.info.uuid)
    }
}

impl Bitstream {
    pub fn policies<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
    ) -> Result<Vec<ResourcePolicy>, ApiError> {
        let path = format!("/bitstreams/{}/policy", self.info.uuid);
        let response = client.request(HttpMethod::Get, &path, None)?;
        parse_json(&response)
    }

    pub fn add_policy<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        policy: &ResourcePolicy,
    ) -> Result<(), ApiError> {
        let path = format!("/bitstreams/{}/policy", self.info.uuid);
        client.send_json(HttpMethod::Post, &path, policy)?;
        info!(uuid = %self.info.uuid, action = ?policy.action, "added policy");
        Ok(())
    }

    pub fn delete_policy<T: Transport>(
        &self,
        client: &DSpaceClient<T>,
        policy_id: i64,
    ) -> Result<(), ApiError> {
        let path = format!("/bitstreams/{}/policy/{policy_id}", self.info.uuid);
        client.request(HttpMethod::Delete, &path, None)?;
        info!(uuid = %self.info.uuid, policy_id, "deleted policy");
        Ok(())
    }

    pub fn delete<T: Transport>(&self, client: &DSpaceClient<T>) -> Result<(), ApiError> {
        client.delete_bitstream(&self.info.uuid)
    }
}
