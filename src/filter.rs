use serde::Deserialize;

use crate::error::{QueryError, QueryResult};
use crate::models::{parse_date, Field, KeyValue, TransactionRecord};

/// Equality test on one field. A predicate without a value matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: Field,
    pub value: Option<KeyValue>,
}

impl Predicate {
    pub fn new(field: Field, value: Option<KeyValue>) -> Self {
        Self { field, value }
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match &self.value {
            Some(expected) => record.value(self.field) == expected.as_field_value(),
            None => true,
        }
    }
}

/// Keeps the records satisfying every predicate, in their original order.
pub fn filter_records<'a, I>(records: I, predicates: &[Predicate]) -> Vec<&'a TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|record| predicates.iter().all(|predicate| predicate.matches(record)))
        .collect()
}

/// Optional equality filters as they arrive from a query string or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub seller_id: Option<String>,
    pub entity_name: Option<String>,
    pub entity_type_name: Option<String>,
    pub offer_name: Option<String>,
    pub transaction_date: Option<String>,
    pub activation_date: Option<String>,
    pub tmcode: Option<i64>,
}

impl RecordFilter {
    pub fn predicates(&self) -> QueryResult<Vec<Predicate>> {
        let text = |value: &Option<String>| value.clone().map(KeyValue::Text);

        Ok(vec![
            Predicate::new(Field::SellerId, text(&self.seller_id)),
            Predicate::new(Field::EntityName, text(&self.entity_name)),
            Predicate::new(Field::EntityTypeName, text(&self.entity_type_name)),
            Predicate::new(Field::OfferName, text(&self.offer_name)),
            Predicate::new(Field::TransactionDate, date(&self.transaction_date)?),
            Predicate::new(Field::ActivationDate, date(&self.activation_date)?),
            Predicate::new(Field::Tmcode, self.tmcode.map(KeyValue::Integer)),
        ])
    }

    /// Human readable summary of the active filters, `None` when nothing is set.
    pub fn describe(&self) -> Option<String> {
        let tmcode = self.tmcode.map(|code| code.to_string());
        let parts: Vec<String> = [
            ("seller_id", &self.seller_id),
            ("entity_name", &self.entity_name),
            ("entity_type_name", &self.entity_type_name),
            ("offer_name", &self.offer_name),
            ("transaction_date", &self.transaction_date),
            ("activation_date", &self.activation_date),
            ("tmcode", &tmcode),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|value| format!("{name}={value}")))
        .collect();

        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

fn date(value: &Option<String>) -> QueryResult<Option<KeyValue>> {
    value
        .as_deref()
        .map(|raw| {
            parse_date(raw)
                .map(KeyValue::Date)
                .ok_or_else(|| QueryError::Computation(format!("unparsable date '{raw}'")))
        })
        .transpose()
}
