use crate::app::metadata::{IpfsGateway, RawAttribute, TokenMetadata};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use utoipa::ToSchema;

pub const EVENT_ACCESS_TRAIT: &str = "Event Access";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

impl Attribute {
    fn from_raw(raw: RawAttribute) -> Self {
        let value = match raw.value {
            serde_json::Value::String(value) => value,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            trait_type: raw.trait_type.unwrap_or_default(),
            value,
        }
    }
}

/// Ordered attribute list with lookup by trait name. The first entry of a trait wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<Attribute>,
    by_trait: HashMap<String, usize>,
}

impl Attributes {
    pub fn new(entries: Vec<Attribute>) -> Self {
        let mut by_trait = HashMap::with_capacity(entries.len());
        for (pos, attribute) in entries.iter().enumerate() {
            by_trait.entry(attribute.trait_type.clone()).or_insert(pos);
        }
        Self { entries, by_trait }
    }

    pub fn get(&self, trait_type: &str) -> Option<&str> {
        self.by_trait
            .get(trait_type)
            .map(|pos| self.entries[*pos].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Attribute>::deserialize(deserializer).map(Self::new)
    }
}

/// Render-ready NFT owned by the reconciled wallet at read time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NftRecord {
    /// Decimal token id.
    pub token_id: String,
    /// Metadata location as reported by the contract.
    pub uri: String,
    pub image: String,
    pub name: String,
    #[schema(value_type = Vec<Attribute>)]
    pub attributes: Attributes,
    pub has_events: bool,
}

/// Normalization applied when turning metadata into records.
#[derive(Debug, Clone)]
pub struct RecordRules {
    pub gateway: IpfsGateway,
    pub placeholder_image: String,
}

impl NftRecord {
    pub fn from_metadata(
        token_id: String,
        uri: String,
        metadata: TokenMetadata,
        rules: &RecordRules,
    ) -> Self {
        let image = match metadata.image {
            Some(image) if !image.is_empty() => rules.gateway.resolve(&image).into_owned(),
            _ => rules.placeholder_image.clone(),
        };
        let name = match metadata.name {
            Some(name) if !name.is_empty() => name,
            _ => format!("NFT {token_id}"),
        };
        let attributes = Attributes::new(
            metadata
                .attributes
                .unwrap_or_default()
                .into_iter()
                .map(Attribute::from_raw)
                .collect(),
        );
        let has_events = has_event_access(&attributes);

        Self {
            token_id,
            uri,
            image,
            name,
            attributes,
            has_events,
        }
    }

    /// First non-empty "Event Access" value, the trait may repeat.
    pub fn event_access(&self) -> Option<&str> {
        event_access(&self.attributes)
    }
}

fn event_access(attributes: &Attributes) -> Option<&str> {
    attributes
        .iter()
        .find(|attribute| attribute.trait_type == EVENT_ACCESS_TRAIT && !attribute.value.is_empty())
        .map(|attribute| attribute.value.as_str())
}

fn has_event_access(attributes: &Attributes) -> bool {
    event_access(attributes).is_some()
}
