use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::conversion;

/// Wildcard accepted for entity names and entity types in the directory.
pub const ALL: &str = "all";

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// One reporting row of the transaction file.
///
/// Several rows may share every field; they are summed, never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub seller_id: String,
    pub entity_name: String,
    pub entity_type_name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub offer_name: Option<String>,
    #[serde(alias = "trnsaction_date", deserialize_with = "flexible_date")]
    pub transaction_date: NaiveDate,
    #[serde(deserialize_with = "flexible_date")]
    pub activation_date: NaiveDate,
    #[serde(
        alias = "nbr_transaction",
        alias = "nombretransaction",
        deserialize_with = "count_or_zero"
    )]
    pub transaction_count: u64,
    #[serde(
        alias = "nbr_activation",
        alias = "nombreactivation",
        deserialize_with = "count_or_zero"
    )]
    pub activation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmcode: Option<i64>,
}

impl TransactionRecord {
    pub fn value(&self, field: Field) -> FieldValue<'_> {
        match field {
            Field::TransactionDate => FieldValue::Date(self.transaction_date),
            Field::ActivationDate => FieldValue::Date(self.activation_date),
            Field::SellerId => FieldValue::Text(&self.seller_id),
            Field::EntityName => FieldValue::Text(&self.entity_name),
            Field::EntityTypeName => FieldValue::Text(&self.entity_type_name),
            Field::OfferName => self
                .offer_name
                .as_deref()
                .map_or(FieldValue::Missing, FieldValue::Text),
            Field::Tmcode => self.tmcode.map_or(FieldValue::Missing, FieldValue::Integer),
            Field::TransactionCount => FieldValue::Count(self.transaction_count),
            Field::ActivationCount => FieldValue::Count(self.activation_count),
        }
    }
}

/// A column of [`TransactionRecord`] that can be filtered, grouped, summed or sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    TransactionDate,
    ActivationDate,
    SellerId,
    EntityName,
    EntityTypeName,
    OfferName,
    Tmcode,
    TransactionCount,
    ActivationCount,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::TransactionDate => "transaction_date",
            Field::ActivationDate => "activation_date",
            Field::SellerId => "seller_id",
            Field::EntityName => "entity_name",
            Field::EntityTypeName => "entity_type_name",
            Field::OfferName => "offer_name",
            Field::Tmcode => "tmcode",
            Field::TransactionCount => "transaction_count",
            Field::ActivationCount => "activation_count",
        }
    }

    /// Whether the field holds a count that can be summed.
    pub fn is_measure(self) -> bool {
        matches!(self, Field::TransactionCount | Field::ActivationCount)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed view of a single field of a record.
///
/// `Missing` orders before every other value so absent offers sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue<'a> {
    Missing,
    Text(&'a str),
    Date(NaiveDate),
    Integer(i64),
    Count(u64),
}

impl FieldValue<'_> {
    pub fn to_key(self) -> KeyValue {
        match self {
            FieldValue::Missing => KeyValue::Missing,
            FieldValue::Text(value) => KeyValue::Text(value.to_string()),
            FieldValue::Date(value) => KeyValue::Date(value),
            FieldValue::Integer(value) => KeyValue::Integer(value),
            FieldValue::Count(value) => KeyValue::Count(value),
        }
    }
}

/// Owned field value, used in group keys and filter predicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Missing,
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Count(u64),
}

impl KeyValue {
    pub fn as_field_value(&self) -> FieldValue<'_> {
        match self {
            KeyValue::Missing => FieldValue::Missing,
            KeyValue::Text(value) => FieldValue::Text(value),
            KeyValue::Date(value) => FieldValue::Date(*value),
            KeyValue::Integer(value) => FieldValue::Integer(*value),
            KeyValue::Count(value) => FieldValue::Count(*value),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeyValue::Missing => serializer.serialize_none(),
            KeyValue::Text(value) => serializer.serialize_str(value),
            KeyValue::Date(value) => value.serialize(serializer),
            KeyValue::Integer(value) => serializer.serialize_i64(*value),
            KeyValue::Count(value) => serializer.serialize_u64(*value),
        }
    }
}

/// One group produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub key: Vec<(Field, KeyValue)>,
    pub sums: Vec<(Field, u64)>,
}

impl AggregateRow {
    pub fn sum(&self, field: Field) -> Option<u64> {
        self.sums
            .iter()
            .find(|(measure, _)| *measure == field)
            .map(|(_, total)| *total)
    }

    pub fn value(&self, field: Field) -> FieldValue<'_> {
        if let Some(total) = self.sum(field) {
            return FieldValue::Count(total);
        }
        self.key
            .iter()
            .find(|(key_field, _)| *key_field == field)
            .map_or(FieldValue::Missing, |(_, value)| value.as_field_value())
    }
}

impl Serialize for AggregateRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let counts = self
            .sum(Field::TransactionCount)
            .zip(self.sum(Field::ActivationCount));
        let extra = if counts.is_some() { 2 } else { 0 };

        let mut map = serializer.serialize_map(Some(self.key.len() + self.sums.len() + extra))?;
        for (field, value) in &self.key {
            map.serialize_entry(field.name(), value)?;
        }
        for (field, total) in &self.sums {
            map.serialize_entry(field.name(), total)?;
        }
        if let Some((transactions, activations)) = counts {
            let rates = conversion::rates(transactions, activations);
            map.serialize_entry("conversion_rate", &rates.conversion_rate)?;
            map.serialize_entry("non_conversion_rate", &rates.non_conversion_rate)?;
        }
        map.end()
    }
}

/// Entities a directory user may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityScope {
    All,
    Only(BTreeSet<String>),
}

impl EntityScope {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() || names.contains(ALL) {
            EntityScope::All
        } else {
            EntityScope::Only(names)
        }
    }

    pub fn allows(&self, entity_name: &str) -> bool {
        match self {
            EntityScope::All => true,
            EntityScope::Only(names) => names.contains(entity_name),
        }
    }
}

impl<'de> Deserialize<'de> for EntityScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Names {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Names::deserialize(deserializer)? {
            Names::One(name) => EntityScope::from_names([name]),
            Names::Many(names) => EntityScope::from_names(names),
        })
    }
}

impl Serialize for EntityScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntityScope::All => [ALL].serialize(serializer),
            EntityScope::Only(names) => names.serialize(serializer),
        }
    }
}

/// A directory entry: login identity plus the scope it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredential {
    pub msisdn: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub entity_type_name: String,
    #[serde(rename = "entity_name", alias = "allowed_entity_names")]
    pub allowed_entity_names: EntityScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill: Option<String>,
}

impl UserCredential {
    pub fn allows_entity_type(&self, entity_type_name: &str) -> bool {
        self.entity_type_name == ALL || self.entity_type_name == entity_type_name
    }
}

fn flexible_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unparsable date '{raw}'")))
}

fn count_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|value| !value.trim().is_empty()))
}
