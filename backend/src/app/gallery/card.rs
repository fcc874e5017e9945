use super::record::NftRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const ARTICLE_TRAIT: &str = "Article";
const UNKNOWN_ARTICLE: &str = "Desconocido";
const WATCH_MARKER: &str = "reloj";
const MISSING_VALUE: &str = "N/A";

const WATCH_TRAITS: [&str; 3] = ["Model", "Serial Number", "Manufacture Date"];
const MEMORABILIA_TRAITS: [&str; 3] = ["Team", "Player", "Article Date"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CardKind {
    Watch,
    Memorabilia,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardField {
    pub label: String,
    pub value: String,
}

/// Display summary of a record, the highlighted fields depend on the article type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub article_type: String,
    pub kind: CardKind,
    pub fields: Vec<CardField>,
}

impl CardDetails {
    pub fn of(record: &NftRecord) -> Self {
        let article_type = record
            .attributes
            .get(ARTICLE_TRAIT)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_ARTICLE)
            .to_string();
        let kind = if article_type.to_lowercase().contains(WATCH_MARKER) {
            CardKind::Watch
        } else {
            CardKind::Memorabilia
        };
        let labels = match kind {
            CardKind::Watch => WATCH_TRAITS,
            CardKind::Memorabilia => MEMORABILIA_TRAITS,
        };
        let fields = labels
            .into_iter()
            .map(|label| CardField {
                label: label.to_string(),
                value: record
                    .attributes
                    .get(label)
                    .filter(|value| !value.is_empty())
                    .unwrap_or(MISSING_VALUE)
                    .to_string(),
            })
            .collect();

        Self {
            article_type,
            kind,
            fields,
        }
    }
}

/// Event access a record grants, listed for every record in the collection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub token_id: String,
    pub name: String,
    pub event_access: Option<String>,
    /// Only tokens with event access may be registered.
    pub registrable: bool,
}

impl Experience {
    pub fn of(record: &NftRecord) -> Self {
        let event_access = record.event_access().map(str::to_string);
        Self {
            token_id: record.token_id.clone(),
            name: record.name.clone(),
            registrable: event_access.is_some(),
            event_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gallery::record::{Attribute, Attributes};

    fn record(attributes: &[(&str, &str)]) -> NftRecord {
        NftRecord {
            token_id: "3".into(),
            uri: "https://meta.example/3.json".into(),
            image: "https://via.placeholder.com/150".into(),
            name: "NFT 3".into(),
            attributes: Attributes::new(
                attributes
                    .iter()
                    .map(|(trait_type, value)| Attribute {
                        trait_type: trait_type.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
            ),
            has_events: false,
        }
    }

    fn values(card: &CardDetails) -> Vec<&str> {
        card.fields.iter().map(|field| field.value.as_str()).collect()
    }

    #[test]
    fn test_watch_card() {
        let card = CardDetails::of(&record(&[
            ("Article", "Reloj de pulsera"),
            ("Model", "Seamaster"),
            ("Serial Number", ""),
        ]));
        assert_eq!(card.kind, CardKind::Watch);
        assert_eq!(card.article_type, "Reloj de pulsera");
        assert_eq!(values(&card), vec!["Seamaster", "N/A", "N/A"]);
        assert_eq!(card.fields[2].label, "Manufacture Date");
    }

    #[test]
    fn test_memorabilia_card() {
        let card = CardDetails::of(&record(&[
            ("Article", "Camiseta"),
            ("Team", "Boca"),
            ("Player", "Riquelme"),
            ("Article Date", "2001"),
        ]));
        assert_eq!(card.kind, CardKind::Memorabilia);
        assert_eq!(values(&card), vec!["Boca", "Riquelme", "2001"]);
    }

    #[test]
    fn test_unknown_article() {
        let card = CardDetails::of(&record(&[]));
        assert_eq!(card.article_type, "Desconocido");
        assert_eq!(card.kind, CardKind::Memorabilia);
        assert_eq!(values(&card), vec!["N/A", "N/A", "N/A"]);
    }

    #[test]
    fn test_empty_article_is_unknown() {
        let card = CardDetails::of(&record(&[("Article", ""), ("Article", "Reloj")]));
        assert_eq!(card.article_type, "Desconocido");
        assert_eq!(card.kind, CardKind::Memorabilia);
    }

    #[test]
    fn test_experience() {
        let experience = Experience::of(&record(&[("Event Access", "Gala")]));
        assert_eq!(experience.event_access.as_deref(), Some("Gala"));
        assert!(experience.registrable);

        let experience = Experience::of(&record(&[("Event Access", "")]));
        assert_eq!(experience.event_access, None);
        assert!(!experience.registrable);
    }
}
