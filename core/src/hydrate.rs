//! Turning raw JSON records into typed entities.
//!
//! # Design
//! `Record` owns the record's key/value map and hands fields out one at a
//! time. Every extractor removes the field it reads, so whatever is left at
//! the end becomes the entity's `extra` map. Extractors fail with
//! `ApiError::Hydration` naming the entity kind and the field.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::types::{Bitstream, Collection, Community, EntityKind, Item, ObjectInfo};

/// Format of `Item.lastModified`; the fraction may carry 1 to 9 digits.
pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Build a typed entity from one JSON record.
pub trait Hydrate: Sized {
    const KIND: EntityKind;

    fn hydrate(record: Value) -> Result<Self, ApiError>;
}

/// Read access shared by all entity kinds.
pub trait Entity {
    fn info(&self) -> &ObjectInfo;

    fn extra(&self) -> &Map<String, Value>;

    /// Kind-specific typed fields, looked up by their JSON name.
    fn own_field(&self, _name: &str) -> Option<String> {
        None
    }

    fn uuid(&self) -> &str {
        &self.info().uuid
    }

    /// Text value of a field by JSON name: common fields first, then the
    /// kind's typed fields, then preserved extras.
    fn field(&self, name: &str) -> Option<String> {
        let info = self.info();
        match name {
            "uuid" => Some(info.uuid.clone()),
            "name" => info.name.clone(),
            "handle" => info.handle.clone(),
            "type" => info.object_type.clone(),
            "link" => info.link.clone(),
            _ => self
                .own_field(name)
                .or_else(|| self.extra().get(name).and_then(value_as_text)),
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) struct Record {
    kind: EntityKind,
    fields: Map<String, Value>,
}

impl Record {
    pub(crate) fn new(kind: EntityKind, value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Object(fields) => Ok(Self { kind, fields }),
            other => Err(ApiError::hydration(
                kind,
                "<record>",
                format!("expected a JSON object, got {}", describe(&other)),
            )),
        }
    }

    fn error(&self, field: &str, reason: impl Into<String>) -> ApiError {
        ApiError::hydration(self.kind, field, reason)
    }

    /// Remove `field`, treating JSON `null` as absent.
    fn take(&mut self, field: &str) -> Option<Value> {
        match self.fields.remove(field) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    pub(crate) fn string(&mut self, field: &str) -> Result<Option<String>, ApiError> {
        match self.take(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.error(
                field,
                format!("expected a string, got {}", describe(&other)),
            )),
        }
    }

    pub(crate) fn required_string(&mut self, field: &str) -> Result<String, ApiError> {
        self.string(field)?
            .ok_or_else(|| self.error(field, "missing required field"))
    }

    pub(crate) fn integer(&mut self, field: &str) -> Result<Option<i64>, ApiError> {
        match self.take(field) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.error(field, format!("{n} is not an integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.error(field, format!("{s:?} is not an integer"))),
            Some(other) => Err(self.error(
                field,
                format!("expected an integer, got {}", describe(&other)),
            )),
        }
    }

    /// Accepts JSON booleans and the strings `"true"`/`"false"` in any case.
    pub(crate) fn required_bool(&mut self, field: &str) -> Result<bool, ApiError> {
        match self.take(field) {
            None => Err(self.error(field, "missing required field")),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.error(field, format!("{s:?} is not a boolean"))),
            },
            Some(other) => Err(self.error(
                field,
                format!("expected a boolean, got {}", describe(&other)),
            )),
        }
    }

    pub(crate) fn required_timestamp(&mut self, field: &str) -> Result<NaiveDateTime, ApiError> {
        let raw = self.required_string(field)?;
        NaiveDateTime::parse_from_str(raw.trim(), LAST_MODIFIED_FORMAT).map_err(|e| {
            self.error(
                field,
                format!("{raw:?} does not match {LAST_MODIFIED_FORMAT}: {e}"),
            )
        })
    }

    pub(crate) fn parsed<T: DeserializeOwned>(&mut self, field: &str) -> Result<Option<T>, ApiError> {
        match self.take(field) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.error(field, e.to_string())),
        }
    }

    pub(crate) fn object_info(&mut self) -> Result<ObjectInfo, ApiError> {
        Ok(ObjectInfo {
            uuid: self.required_string("uuid")?,
            name: self.string("name")?,
            handle: self.string("handle")?,
            object_type: self.string("type")?,
            link: self.string("link")?,
        })
    }

    pub(crate) fn into_extra(self) -> Map<String, Value> {
        self.fields
    }
}

impl Hydrate for Community {
    const KIND: EntityKind = EntityKind::Community;

    fn hydrate(record: Value) -> Result<Self, ApiError> {
        let mut record = Record::new(Self::KIND, record)?;
        Ok(Community {
            info: record.object_info()?,
            count_items: record.integer("countItems")?,
            extra: record.into_extra(),
        })
    }
}

impl Hydrate for Collection {
    const KIND: EntityKind = EntityKind::Collection;

    fn hydrate(record: Value) -> Result<Self, ApiError> {
        let mut record = Record::new(Self::KIND, record)?;
        Ok(Collection {
            info: record.object_info()?,
            number_items: record.integer("numberItems")?,
            extra: record.into_extra(),
        })
    }
}

impl Hydrate for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn hydrate(record: Value) -> Result<Self, ApiError> {
        let mut record = Record::new(Self::KIND, record)?;
        Ok(Item {
            info: record.object_info()?,
            last_modified: record.required_timestamp("lastModified")?,
            archived: record.required_bool("archived")?,
            withdrawn: record.required_bool("withdrawn")?,
            metadata: record.parsed("metadata")?,
            extra: record.into_extra(),
        })
    }
}

impl Hydrate for Bitstream {
    const KIND: EntityKind = EntityKind::Bitstream;

    fn hydrate(record: Value) -> Result<Self, ApiError> {
        let mut record = Record::new(Self::KIND, record)?;
        Ok(Bitstream {
            info: record.object_info()?,
            bundle_name: record.string("bundleName")?,
            size_bytes: record.integer("sizeBytes")?,
            mime_type: record.string("mimeType")?,
            extra: record.into_extra(),
        })
    }
}

impl Entity for Community {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    fn own_field(&self, name: &str) -> Option<String> {
        match name {
            "countItems" => self.count_items.map(|n| n.to_string()),
            _ => None,
        }
    }
}

impl Entity for Collection {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    fn own_field(&self, name: &str) -> Option<String> {
        match name {
            "numberItems" => self.number_items.map(|n| n.to_string()),
            _ => None,
        }
    }
}

impl Entity for Item {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    fn own_field(&self, name: &str) -> Option<String> {
        match name {
            "lastModified" => Some(self.last_modified.format(LAST_MODIFIED_FORMAT).to_string()),
            "archived" => Some(self.archived.to_string()),
            "withdrawn" => Some(self.withdrawn.to_string()),
            _ => None,
        }
    }
}

impl Entity for Bitstream {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    fn own_field(&self, name: &str) -> Option<String> {
        match name {
            "bundleName" => self.bundle_name.clone(),
            "sizeBytes" => self.size_bytes.map(|n| n.to_string()),
            "mimeType" => self.mime_type.clone(),
            _ => None,
        }
    }
}
