use std::cmp::Ordering;

use crate::models::{AggregateRow, Field, FieldValue, TransactionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Field,
    pub direction: Direction,
}

/// Newest transactions first, then newest activations.
pub const LATEST_FIRST: [SortKey; 2] = [
    SortKey {
        field: Field::TransactionDate,
        direction: Direction::Descending,
    },
    SortKey {
        field: Field::ActivationDate,
        direction: Direction::Descending,
    },
];

/// Anything whose fields can be read by [`Field`].
pub trait Sortable {
    fn sort_value(&self, field: Field) -> FieldValue<'_>;
}

impl Sortable for TransactionRecord {
    fn sort_value(&self, field: Field) -> FieldValue<'_> {
        self.value(field)
    }
}

impl Sortable for AggregateRow {
    fn sort_value(&self, field: Field) -> FieldValue<'_> {
        self.value(field)
    }
}

impl<T: Sortable + ?Sized> Sortable for &T {
    fn sort_value(&self, field: Field) -> FieldValue<'_> {
        (**self).sort_value(field)
    }
}

pub fn compare<T: Sortable>(a: &T, b: &T, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ordering = a.sort_value(key.field).cmp(&b.sort_value(key.field));
            match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Stable multi-key sort: items equal on every key keep their input order.
pub fn sort_by_keys<T: Sortable>(mut items: Vec<T>, keys: &[SortKey]) -> Vec<T> {
    items.sort_by(|a, b| compare(a, b, keys));
    items
}
