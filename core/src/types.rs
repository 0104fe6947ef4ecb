//! Typed DSpace entities and request payloads.
//!
//! # Design
//! Each entity kind gets an explicit struct built by pulling named fields
//! out of the record's JSON map (see `hydrate`). Fields the client does not
//! model are kept verbatim in `extra` and written back out when the entity
//! is serialized, so nothing the server sent is lost.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The entity kinds the client hydrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Community,
    Collection,
    Item,
    Bitstream,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Community => "community",
            EntityKind::Collection => "collection",
            EntityKind::Item => "item",
            EntityKind::Bitstream => "bitstream",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields every DSpace object carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Community {
    #[serde(flatten)]
    pub info: ObjectInfo,
    #[serde(rename = "countItems", skip_serializing_if = "Option::is_none")]
    pub count_items: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    #[serde(flatten)]
    pub info: ObjectInfo,
    #[serde(rename = "numberItems", skip_serializing_if = "Option::is_none")]
    pub number_items: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    #[serde(flatten)]
    pub info: ObjectInfo,
    #[serde(rename = "lastModified")]
    pub last_modified: NaiveDateTime,
    pub archived: bool,
    pub withdrawn: bool,
    /// Present when the record embedded it or the client loads it eagerly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bitstream {
    #[serde(flatten)]
    pub info: ObjectInfo,
    #[serde(rename = "bundleName", skip_serializing_if = "Option::is_none")]
    pub bundle_name: Option<String>,
    #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `(key, value, language)` triple attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            language: language.map(str::to_string),
        }
    }
}

/// Shorthand for building the metadata list of a new or updated item.
pub fn format_metadata(key: &str, value: &str, lang: &str) -> MetadataEntry {
    MetadataEntry::new(key, value, Some(lang))
}

/// Access policy attached to a bitstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub eperson_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub rp_description: Option<String>,
    #[serde(default)]
    pub rp_name: Option<String>,
    #[serde(default)]
    pub rp_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Payload for creating a community, top-level or nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommunity {
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
}

impl CreateCommunity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            object_type: "community".to_string(),
            name: name.into(),
        }
    }
}

/// Payload for creating a collection inside a community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollection {
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
}

impl CreateCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            object_type: "collection".to_string(),
            name: name.into(),
        }
    }
}

/// Payload for creating an item inside a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItem {
    #[serde(rename = "type")]
    pub object_type: String,
    pub metadata: Vec<MetadataEntry>,
}

impl CreateItem {
    pub fn new(metadata: Vec<MetadataEntry>) -> Self {
        Self {
            object_type: "item".to_string(),
            metadata,
        }
    }
}

/// Partial update for a community or collection. Only the fields present are
/// sent; omitted fields remain unchanged on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContainer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introductory_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidebar_text: Option<String>,
}
