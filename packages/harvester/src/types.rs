//! Typed records for registry documents.
//!
//! Field names follow the registry's JSON (camelCase, including its
//! `manufacterName` spelling). Unknown fields are ignored; a missing
//! required field fails deserialization at this boundary instead of
//! surfacing later as a blank export column.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One entry of the technical-regulation dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub id: u64,

    /// E.g. `ТР ТС 017/2011 "О безопасности продукции легкой промышленности"`.
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// One row of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    pub id: u64,

    #[serde(default)]
    pub id_status: Option<i64>,

    #[serde(default, deserialize_with = "string_from_scalar")]
    pub number: String,

    /// Registration date (`date` for certificates, `declDate` for declarations).
    #[serde(
        rename = "regDate",
        alias = "date",
        alias = "declDate",
        default,
        deserialize_with = "string_from_scalar"
    )]
    pub reg_date: String,

    /// Expiry date (`endDate` / `declEndDate`).
    #[serde(
        rename = "endDate",
        alias = "declEndDate",
        default,
        deserialize_with = "string_from_scalar"
    )]
    pub end_date: String,

    /// Object type code (`certObjectType` / `declObjectType`).
    #[serde(
        rename = "objectType",
        alias = "certObjectType",
        alias = "declObjectType",
        default,
        deserialize_with = "string_from_scalar"
    )]
    pub object_type: String,

    #[serde(rename = "manufacterName", default)]
    pub manufacturer_name: Option<String>,
}

/// One listing page as returned by the registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    /// Total item count across all pages; certificate listings only.
    #[serde(default)]
    pub total: Option<u64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ListItem>,
}

/// Full per-record document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub applicant: Applicant,

    pub manufacturer: Manufacturer,

    pub product: Product,

    #[serde(deserialize_with = "null_as_default")]
    pub id_technical_reglaments: Vec<u64>,

    /// Scheme code (`idCertScheme` / `idObjectDeclType`).
    #[serde(
        rename = "idCertScheme",
        alias = "idObjectDeclType",
        default,
        deserialize_with = "string_from_scalar"
    )]
    pub scheme: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub patronymic: Option<String>,
    #[serde(default)]
    pub head_position: Option<String>,
    #[serde(default)]
    pub ogrn: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contacts: Vec<Contact>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<Address>,
}

impl Applicant {
    /// Values of contacts whose type is one of `types`, in document order.
    pub fn contacts_of<'a>(&'a self, types: &'a [i64]) -> impl Iterator<Item = &'a str> + 'a {
        self.contacts
            .iter()
            .filter(move |c| c.id_contact_type.is_some_and(|t| types.contains(&t)))
            .filter_map(|c| c.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manufacturer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub id_contact_type: Option<i64>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub full_address: Option<String>,
}

/// The registry's identifier dictionary. Only status labels are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Identifiers {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: BTreeMap<String, StatusEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusEntry {
    pub id: i64,
    pub name: String,
}

impl Identifiers {
    /// Status id → human label.
    #[must_use]
    pub fn status_labels(&self) -> HashMap<i64, String> {
        self.status
            .values()
            .map(|s| (s.id, s.name.clone()))
            .collect()
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept strings, numbers and `null` for fields exported as text.
fn string_from_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other}"
        ))),
    }
}

/// Ids arrive as numbers, but some listings quote them.
fn u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid id {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id '{s}'"))),
        other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}
