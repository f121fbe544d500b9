use serde::Serialize;

use crate::models::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rates {
    pub conversion_rate: Option<f64>,
    pub non_conversion_rate: Option<f64>,
}

/// A record with its conversion ratios, serialized as one flat object.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedRecord<'a> {
    #[serde(flatten)]
    pub record: &'a TransactionRecord,
    #[serde(flatten)]
    pub rates: Rates,
}

pub fn annotate(record: &TransactionRecord) -> AnnotatedRecord<'_> {
    AnnotatedRecord {
        record,
        rates: rates(record.transaction_count, record.activation_count),
    }
}

/// Both ratios are 0.0 when there were no transactions.
pub fn rates(transactions: u64, activations: u64) -> Rates {
    if transactions == 0 {
        return Rates {
            conversion_rate: Some(0.0),
            non_conversion_rate: Some(0.0),
        };
    }

    let conversion = round3(activations as f64 / transactions as f64);
    Rates {
        conversion_rate: conversion,
        non_conversion_rate: conversion.and_then(|rate| round3(1.0 - rate)),
    }
}

/// Rounds half-to-even on the exact decimal value of `value`, which is what
/// `{:.3}` formatting does. Scaling by 1000 first would round 0.0625 up.
fn round3(value: f64) -> Option<f64> {
    finite(value)
        .and_then(|value| format!("{value:.3}").parse::<f64>().ok())
        .and_then(finite)
}

/// NaN and infinities are not valid JSON numbers; they become null.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(transactions: u64, activations: u64) -> TransactionRecord {
        TransactionRecord {
            seller_id: "A".to_string(),
            entity_name: "Plateau".to_string(),
            entity_type_name: "BOUTIQUE".to_string(),
            offer_name: Some("Pass".to_string()),
            transaction_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            activation_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            transaction_count: transactions,
            activation_count: activations,
            tmcode: None,
        }
    }

    #[test]
    fn rounds_to_three_decimals() {
        let r = rates(15, 10);
        assert_eq!(r.conversion_rate, Some(0.667));
        assert_eq!(r.non_conversion_rate, Some(0.333));
    }

    #[test]
    fn halfway_ratios_round_to_even_decimal() {
        let r = rates(16, 1);
        assert_eq!(r.conversion_rate, Some(0.062));
        assert_eq!(r.non_conversion_rate, Some(0.938));

        // 1/80 is stored slightly above 0.0125, so it rounds up.
        assert_eq!(rates(80, 1).conversion_rate, Some(0.013));
        assert_eq!(rates(8, 1).conversion_rate, Some(0.125));
    }

    #[test]
    fn more_activations_than_transactions_are_not_clamped() {
        let r = rates(2, 5);
        assert_eq!(r.conversion_rate, Some(2.5));
        assert_eq!(r.non_conversion_rate, Some(-1.5));
    }

    #[test]
    fn zero_transactions_yield_zero_rates() {
        let r = rates(0, 4);
        assert_eq!(r.conversion_rate, Some(0.0));
        assert_eq!(r.non_conversion_rate, Some(0.0));
    }

    #[test]
    fn rates_stay_in_unit_interval() {
        for transactions in 1..40u64 {
            for activations in 0..=transactions {
                let r = rates(transactions, activations);
                let conversion = r.conversion_rate.unwrap();
                let non_conversion = r.non_conversion_rate.unwrap();
                assert!((0.0..=1.0).contains(&conversion));
                assert!((0.0..=1.0).contains(&non_conversion));
            }
        }
    }

    #[test]
    fn non_finite_values_become_none() {
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(f64::INFINITY), None);
        assert_eq!(finite(0.5), Some(0.5));
    }

    #[test]
    fn annotated_record_serializes_flat() {
        let source = record(4, 1);
        let json = serde_json::to_value(annotate(&source)).unwrap();
        assert_eq!(json["seller_id"], "A");
        assert_eq!(json["transaction_date"], "2024-06-01");
        assert_eq!(json["conversion_rate"], 0.25);
        assert_eq!(json["non_conversion_rate"], 0.75);
    }
}
