use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::conversion;
use crate::error::{QueryError, QueryResult};
use crate::models::{AggregateRow, Field, FieldValue, KeyValue, TransactionRecord};
use crate::rank::{self, Direction, SortKey, LATEST_FIRST};

const MEASURES: [Field; 2] = [Field::TransactionCount, Field::ActivationCount];
const LEADERBOARD_KEY: [Field; 2] = [Field::SellerId, Field::EntityName];
const LEADERBOARD_ORDER: [SortKey; 3] = [
    SortKey {
        field: Field::TransactionCount,
        direction: Direction::Descending,
    },
    SortKey {
        field: Field::SellerId,
        direction: Direction::Ascending,
    },
    SortKey {
        field: Field::EntityName,
        direction: Direction::Ascending,
    },
];
const EVOLUTION_KEY: [Field; 4] = [
    Field::TransactionDate,
    Field::OfferName,
    Field::SellerId,
    Field::EntityName,
];

/// Groups records by `group_by` and sums each of `measures` per group.
///
/// Groups come out sorted by key. Every measure must be a count field.
pub fn aggregate<'a, I>(
    records: I,
    group_by: &[Field],
    measures: &[Field],
) -> QueryResult<Vec<AggregateRow>>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    if let Some(field) = measures.iter().find(|field| !field.is_measure()) {
        return Err(QueryError::Computation(format!(
            "cannot sum non-numeric field '{field}'"
        )));
    }

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<u64>> = BTreeMap::new();
    for record in records {
        let key = group_by
            .iter()
            .map(|field| record.value(*field).to_key())
            .collect();
        let totals = groups.entry(key).or_insert_with(|| vec![0; measures.len()]);

        for (total, measure) in totals.iter_mut().zip(measures) {
            let amount = match record.value(*measure) {
                FieldValue::Count(amount) => amount,
                _ => 0,
            };
            *total = total.checked_add(amount).ok_or_else(|| {
                QueryError::Computation(format!("{measure} total overflowed"))
            })?;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, totals)| AggregateRow {
            key: group_by.iter().copied().zip(key).collect(),
            sums: measures.iter().copied().zip(totals).collect(),
        })
        .collect())
}

pub fn daily_totals(records: &[&TransactionRecord]) -> QueryResult<Vec<AggregateRow>> {
    aggregate(records.iter().copied(), &[Field::TransactionDate], &MEASURES)
}

/// Seller/entity pairs ranked by transactions, highest first.
pub fn leaderboard(records: &[&TransactionRecord]) -> QueryResult<Vec<AggregateRow>> {
    let rows = aggregate(records.iter().copied(), &LEADERBOARD_KEY, &MEASURES)?;
    Ok(rank::sort_by_keys(rows, &LEADERBOARD_ORDER))
}

pub fn evolution(records: &[&TransactionRecord]) -> QueryResult<Vec<AggregateRow>> {
    aggregate(records.iter().copied(), &EVOLUTION_KEY, &MEASURES)
}

#[derive(Debug, Serialize)]
pub struct KpiReport {
    pub transactions_per_day: Vec<AggregateRow>,
    pub best_sellers: Vec<AggregateRow>,
}

#[derive(Debug, Serialize)]
pub struct EvolutionReport {
    pub transactions_per_day: Vec<AggregateRow>,
    pub evolution: Vec<AggregateRow>,
}

pub fn kpi_report(records: &[&TransactionRecord]) -> QueryResult<KpiReport> {
    Ok(KpiReport {
        transactions_per_day: daily_totals(records)?,
        best_sellers: leaderboard(records)?,
    })
}

pub fn evolution_report(records: &[&TransactionRecord]) -> QueryResult<EvolutionReport> {
    Ok(EvolutionReport {
        transactions_per_day: daily_totals(records)?,
        evolution: evolution(records)?,
    })
}

fn describe_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |rate| format!("{:.1}%", rate * 100.0))
}

/// Group key joined for display, e.g. `S1 / Plateau`.
pub fn label(row: &AggregateRow) -> String {
    row.key
        .iter()
        .map(|(_, value)| match value {
            KeyValue::Missing => "-".to_string(),
            KeyValue::Text(text) => text.clone(),
            KeyValue::Date(date) => date.to_string(),
            KeyValue::Integer(value) => value.to_string(),
            KeyValue::Count(value) => value.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

fn write_rows(output: &mut String, rows: &[AggregateRow], limit: usize, empty: &str) {
    if rows.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }

    for row in rows.iter().take(limit) {
        let transactions = row.sum(Field::TransactionCount).unwrap_or(0);
        let activations = row.sum(Field::ActivationCount).unwrap_or(0);
        let rates = conversion::rates(transactions, activations);
        let _ = writeln!(
            output,
            "- {}: {} transactions, {} activations (conversion {})",
            label(row),
            transactions,
            activations,
            describe_rate(rates.conversion_rate)
        );
    }
}

/// Markdown summary of daily totals, the leaderboard and the latest rows.
pub fn build_report(scope: Option<&str>, records: &[&TransactionRecord]) -> QueryResult<String> {
    let per_day = daily_totals(records)?;
    let sellers = leaderboard(records)?;

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all sellers");
    let total_transactions: u64 = per_day
        .iter()
        .filter_map(|row| row.sum(Field::TransactionCount))
        .sum();
    let total_activations: u64 = per_day
        .iter()
        .filter_map(|row| row.sum(Field::ActivationCount))
        .sum();
    let overall = conversion::rates(total_transactions, total_activations);

    let _ = writeln!(output, "# Activation KPI Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} rows, {} transactions, {} activations, conversion {})",
        scope_label,
        records.len(),
        total_transactions,
        total_activations,
        describe_rate(overall.conversion_rate)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Transactions Per Day");
    write_rows(&mut output, &per_day, usize::MAX, "No transactions recorded.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Sellers");
    write_rows(&mut output, &sellers, 10, "No sellers recorded.");

    let recent = rank::sort_by_keys(records.to_vec(), &LATEST_FIRST);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Rows");

    if recent.is_empty() {
        let _ = writeln!(output, "No transactions recorded.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) on {}: {} transactions, {} activations",
                record.seller_id,
                record.entity_name,
                record.offer_name.as_deref().unwrap_or("no offer"),
                record.transaction_date,
                record.transaction_count,
                record.activation_count
            );
        }
    }

    Ok(output)
}
