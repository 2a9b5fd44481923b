use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::normalize::{normalize_numeric, normalize_text};
use crate::parser::ParsedContent;
use crate::rich_text;

/// Remote metafield id: numeric from REST, or a `gid://` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldId {
    Numeric(u64),
    Text(String),
}

impl FieldId {
    /// Numeric tail usable in a REST path (`gid://shopify/Metafield/42` → `42`).
    pub fn rest_id(&self) -> String {
        match self {
            FieldId::Numeric(n) => n.to_string(),
            FieldId::Text(s) => s.rsplit('/').next().unwrap_or(s).to_string(),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Numeric(n) => write!(f, "{}", n),
            FieldId::Text(s) => f.write_str(s),
        }
    }
}

/// Field key → remote id for one product.
pub type FieldIdMap = BTreeMap<String, FieldId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Decimal,
    Integer,
    JsonString,
}

impl ValueType {
    /// Legacy REST `value_type`; decimals travel as strings.
    pub fn rest_value_type(self) -> &'static str {
        match self {
            ValueType::String | ValueType::Decimal => "string",
            ValueType::Integer => "integer",
            ValueType::JsonString => "json_string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetafieldType {
    RichTextField,
    NumberDecimal,
    NumberInteger,
    SingleLineTextField,
}

impl MetafieldType {
    pub fn value_type(self) -> ValueType {
        match self {
            MetafieldType::RichTextField => ValueType::JsonString,
            MetafieldType::NumberDecimal => ValueType::Decimal,
            MetafieldType::NumberInteger => ValueType::Integer,
            MetafieldType::SingleLineTextField => ValueType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Bullet(usize),
    FaqAnswer(usize),
    Number { aliases: &'static [&'static str], integer: bool },
    Text { aliases: &'static [&'static str] },
    VideoTitle,
    VideoBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub source: FieldSource,
    pub kind: MetafieldType,
}

const WIDTH: &[&str] = &["width", "ancho"];
const LENGTH: &[&str] = &["length", "longitud", "largo"];
const HEIGHT: &[&str] = &["height", "alto", "altura"];
const PIECES: &[&str] = &["pieces", "piezas"];
const SCALE: &[&str] = &["scale", "escala"];

const fn rich(key: &'static str, name: &'static str, source: FieldSource) -> FieldSpec {
    FieldSpec { key, name, source, kind: MetafieldType::RichTextField }
}

/// Every metafield this tool writes, in write order.
pub const FIELD_SCHEMA: &[FieldSpec] = &[
    rich("bullet_1", "Bullet 1", FieldSource::Bullet(0)),
    rich("bullet_2", "Bullet 2", FieldSource::Bullet(1)),
    rich("bullet_3", "Bullet 3", FieldSource::Bullet(2)),
    rich("bullet_4", "Bullet 4", FieldSource::Bullet(3)),
    rich("bullet_5", "Bullet 5", FieldSource::Bullet(4)),
    rich("faq_2", "FAQ 2", FieldSource::FaqAnswer(0)),
    rich("faq_3", "FAQ 3", FieldSource::FaqAnswer(1)),
    rich("faq_4", "FAQ 4", FieldSource::FaqAnswer(2)),
    FieldSpec {
        key: "width",
        name: "Width",
        source: FieldSource::Number { aliases: WIDTH, integer: false },
        kind: MetafieldType::NumberDecimal,
    },
    FieldSpec {
        key: "length",
        name: "Length",
        source: FieldSource::Number { aliases: LENGTH, integer: false },
        kind: MetafieldType::NumberDecimal,
    },
    FieldSpec {
        key: "height",
        name: "Height",
        source: FieldSource::Number { aliases: HEIGHT, integer: false },
        kind: MetafieldType::NumberDecimal,
    },
    FieldSpec {
        key: "pieces",
        name: "Pieces",
        source: FieldSource::Number { aliases: PIECES, integer: true },
        kind: MetafieldType::NumberInteger,
    },
    FieldSpec {
        key: "scale",
        name: "Scale",
        source: FieldSource::Text { aliases: SCALE },
        kind: MetafieldType::SingleLineTextField,
    },
    FieldSpec {
        key: "video_title",
        name: "Video Title",
        source: FieldSource::VideoTitle,
        kind: MetafieldType::SingleLineTextField,
    },
    rich("video_body", "Video Body", FieldSource::VideoBody),
];

impl FieldSpec {
    /// Platform-ready value, or `None` when the source is absent or unusable.
    pub fn value(&self, parsed: &ParsedContent) -> Option<String> {
        match self.source {
            FieldSource::Bullet(i) => parsed
                .bullets
                .get(i)
                .map(|text| rich_text::encode(text).to_json_string()),
            FieldSource::FaqAnswer(i) => parsed
                .faq_answers
                .get(i)
                .map(|text| rich_text::encode(text).to_json_string()),
            FieldSource::Number { aliases, integer } => {
                normalize_numeric(detail(parsed, aliases), integer)
            }
            FieldSource::Text { aliases } => normalize_text(detail(parsed, aliases)),
            FieldSource::VideoTitle => parsed
                .video_title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            FieldSource::VideoBody => parsed
                .video_body
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .map(|body| rich_text::encode_paragraphs(body, true).to_json_string()),
        }
    }
}

fn detail<'a>(parsed: &'a ParsedContent, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|alias| parsed.details.get(*alias))
        .map(String::as_str)
}

/// Overwrite of an existing remote field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstruction {
    pub id: FieldId,
    pub value: String,
    pub value_type: ValueType,
}

/// `MetafieldsSetInput` for a field the product does not have yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstruction {
    pub owner_id: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: MetafieldType,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub updates: Vec<UpdateInstruction>,
    pub creations: Vec<CreateInstruction>,
}

/// Update instructions for schema fields present in `ids`.
pub fn plan_updates(ids: &FieldIdMap, parsed: &ParsedContent) -> Vec<UpdateInstruction> {
    FIELD_SCHEMA
        .iter()
        .filter_map(|spec| {
            let id = ids.get(spec.key)?;
            let value = spec.value(parsed)?;
            Some(UpdateInstruction {
                id: id.clone(),
                value,
                value_type: spec.kind.value_type(),
            })
        })
        .collect()
}

/// Creation instructions for schema fields missing from `ids`.
pub fn plan_creations(
    owner_id: &str,
    namespace: &str,
    ids: &FieldIdMap,
    parsed: &ParsedContent,
) -> Vec<CreateInstruction> {
    FIELD_SCHEMA
        .iter()
        .filter(|spec| !ids.contains_key(spec.key))
        .filter_map(|spec| {
            Some(CreateInstruction {
                owner_id: owner_id.to_string(),
                namespace: namespace.to_string(),
                key: spec.key.to_string(),
                kind: spec.kind,
                value: spec.value(parsed)?,
            })
        })
        .collect()
}

pub fn plan(owner_id: &str, namespace: &str, ids: &FieldIdMap, parsed: &ParsedContent) -> Plan {
    let plan = Plan {
        updates: plan_updates(ids, parsed),
        creations: plan_creations(owner_id, namespace, ids, parsed),
    };
    debug!(
        updates = plan.updates.len(),
        creations = plan.creations.len(),
        "metafield plan built"
    );
    plan
}

pub fn product_gid(product_id: u64) -> String {
    format!("gid://shopify/Product/{}", product_id)
}

/// `MetafieldDefinitionInput` for one schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: MetafieldType,
    pub owner_type: String,
    pub visible_to_storefront: bool,
}

pub fn field_definitions(namespace: &str) -> Vec<FieldDefinition> {
    FIELD_SCHEMA
        .iter()
        .map(|spec| FieldDefinition {
            name: spec.name.to_string(),
            namespace: namespace.to_string(),
            key: spec.key.to_string(),
            kind: spec.kind,
            owner_type: "PRODUCT".to_string(),
            visible_to_storefront: false,
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_markdown;
    use crate::rich_text::RichTextDocument;

    fn ids(pairs: &[(&str, u64)]) -> FieldIdMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldId::Numeric(*v)))
            .collect()
    }

    fn full_ids() -> FieldIdMap {
        FIELD_SCHEMA
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.key.to_string(), FieldId::Numeric(100 + i as u64)))
            .collect()
    }

    #[test]
    fn details_end_to_end() {
        let parsed = parse_markdown("### 3. Detalles Técnicos\n- **Ancho:** 12 cm\n- **Piezas:** 150 pzas\n");
        let updates = plan_updates(&ids(&[("width", 7), ("pieces", 9)]), &parsed);
        assert_eq!(
            updates,
            vec![
                UpdateInstruction {
                    id: FieldId::Numeric(7),
                    value: "12".into(),
                    value_type: ValueType::Decimal,
                },
                UpdateInstruction {
                    id: FieldId::Numeric(9),
                    value: "150".into(),
                    value_type: ValueType::Integer,
                },
            ]
        );
    }

    #[test]
    fn absent_values_emit_nothing() {
        let parsed = ParsedContent::default();
        assert!(plan_updates(&full_ids(), &parsed).is_empty());
        assert!(plan_creations("gid://shopify/Product/1", "custom", &FieldIdMap::new(), &parsed).is_empty());
    }

    #[test]
    fn absence_phrases_emit_nothing() {
        let mut parsed = ParsedContent::default();
        for key in ["ancho", "longitud", "alto", "piezas", "escala"] {
            parsed.details.insert(key.into(), "No observado en imágenes".into());
        }
        parsed.video_title = Some("   ".into());
        parsed.video_body = Some("\n".into());
        assert!(plan_updates(&full_ids(), &parsed).is_empty());
        assert!(plan_creations("o", "custom", &FieldIdMap::new(), &parsed).is_empty());
    }

    #[test]
    fn missing_ids_become_creations() {
        let parsed = parse_markdown(
            "### 1. Viñetas\n- **Uno**\n- Dos\n### 3. Detalles\n- **Escala:** 1:8\n### 4. Video\n- **Title:** Hola",
        );
        let plan = plan(&product_gid(42), "custom", &ids(&[("bullet_1", 1)]), &parsed);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].value_type, ValueType::JsonString);

        let keys: Vec<&str> = plan.creations.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["bullet_2", "scale", "video_title"]);
        assert!(plan.creations.iter().all(|c| c.owner_id == "gid://shopify/Product/42"));
        assert_eq!(plan.creations[1].value, "1:8");
        assert_eq!(plan.creations[1].kind, MetafieldType::SingleLineTextField);
    }

    #[test]
    fn each_key_in_exactly_one_branch() {
        let parsed = parse_markdown(&std::fs::read_to_string("tests/fixtures/product_copy.md").unwrap());
        let known = ids(&[("bullet_1", 1), ("faq_2", 2), ("height", 3), ("video_body", 4)]);
        let plan = plan("o", "custom", &known, &parsed);
        for c in &plan.creations {
            assert!(!known.contains_key(&c.key));
        }
        assert_eq!(plan.updates.len(), 4);
        // width and length carry absence phrases
        assert!(!plan.creations.iter().any(|c| c.key == "width" || c.key == "length"));
        let pieces = plan.creations.iter().find(|c| c.key == "pieces").unwrap();
        assert_eq!(pieces.value, "1458");
    }

    #[test]
    fn video_body_forced_to_two_paragraphs() {
        let mut parsed = ParsedContent::default();
        parsed.video_body = Some("Uno. Dos.\nTres. Cuatro.".into());
        let value = FIELD_SCHEMA
            .iter()
            .find(|s| s.key == "video_body")
            .and_then(|s| s.value(&parsed))
            .unwrap();
        let doc: RichTextDocument = serde_json::from_str(&value).unwrap();
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[0].children[0].value, "Uno. Dos.");
    }

    #[test]
    fn english_detail_keys() {
        let mut parsed = ParsedContent::default();
        parsed.details.insert("height".into(), "20,5 cm".into());
        let updates = plan_updates(&ids(&[("height", 5)]), &parsed);
        assert_eq!(updates[0].value, "20.5");
    }

    #[test]
    fn instruction_json_shape() {
        let update = UpdateInstruction {
            id: FieldId::Numeric(1),
            value: "12".into(),
            value_type: ValueType::Decimal,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["valueType"], "decimal");

        let create = CreateInstruction {
            owner_id: product_gid(3),
            namespace: "custom".into(),
            key: "pieces".into(),
            kind: MetafieldType::NumberInteger,
            value: "8".into(),
        };
        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["ownerId"], "gid://shopify/Product/3");
        assert_eq!(json["type"], "number_integer");
    }

    #[test]
    fn field_ids_from_json() {
        let map: FieldIdMap =
            serde_json::from_str(&std::fs::read_to_string("tests/fixtures/ids_map.json").unwrap()).unwrap();
        assert_eq!(map["width"], FieldId::Numeric(30100020));
        assert_eq!(map["faq_2"].rest_id(), "30100010");
    }

    #[test]
    fn definitions_cover_schema() {
        let defs = field_definitions("custom");
        assert_eq!(defs.len(), FIELD_SCHEMA.len());
        let json = serde_json::to_value(&defs[8]).unwrap();
        assert_eq!(json["key"], "width");
        assert_eq!(json["type"], "number_decimal");
        assert_eq!(json["ownerType"], "PRODUCT");
        assert_eq!(json["visibleToStorefront"], false);
    }

    #[test]
    fn rest_value_types() {
        assert_eq!(ValueType::Decimal.rest_value_type(), "string");
        assert_eq!(ValueType::JsonString.rest_value_type(), "json_string");
    }
}
