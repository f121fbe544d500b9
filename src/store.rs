use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::access::Directory;
use crate::error::LoadError;
use crate::models::{TransactionRecord, UserCredential};

/// Columns every transaction file must carry. Each entry lists the canonical
/// name first, then the legacy spellings accepted in its place.
const REQUIRED_COLUMNS: [&[&str]; 8] = [
    &["transaction_date", "trnsaction_date"],
    &["activation_date"],
    &["transaction_count", "nbr_transaction", "nombretransaction"],
    &["activation_count", "nbr_activation", "nombreactivation"],
    &["offer_name"],
    &["seller_id"],
    &["entity_name"],
    &["entity_type_name"],
];

/// Immutable view over everything loaded at startup.
#[derive(Debug, Default)]
pub struct Snapshot {
    records: Vec<TransactionRecord>,
    directory: Directory,
}

impl Snapshot {
    pub fn new(records: Vec<TransactionRecord>, directory: Directory) -> Self {
        Self { records, directory }
    }

    pub fn load(records_path: &Path, users_path: Option<&Path>) -> Result<Self, LoadError> {
        let records = load_records(records_path)?;
        let directory = match users_path {
            Some(path) => Directory::new(load_credentials(path)?),
            None => Directory::default(),
        };
        tracing::info!(
            records = records.len(),
            users = directory.len(),
            path = %records_path.display(),
            "snapshot loaded"
        );
        Ok(Self::new(records, directory))
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn load_records(path: &Path) -> Result<Vec<TransactionRecord>, LoadError> {
    match extension(path).as_deref() {
        Some("csv") => load_records_csv(path),
        Some("json") => read_json(path),
        _ => Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

pub fn load_credentials(path: &Path) -> Result<Vec<UserCredential>, LoadError> {
    match extension(path).as_deref() {
        Some("json") => read_json(path),
        _ => Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn load_records_csv(path: &Path) -> Result<Vec<TransactionRecord>, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(open(path)?);

    let headers = reader.headers().map_err(csv_error)?.clone();
    for accepted in REQUIRED_COLUMNS {
        if !accepted.iter().any(|name| headers.iter().any(|h| h == *name)) {
            return Err(LoadError::MissingColumn {
                path: path.to_path_buf(),
                column: accepted[0],
            });
        }
    }

    let mut records = Vec::new();
    for result in reader.deserialize::<TransactionRecord>() {
        records.push(result.map_err(csv_error)?);
    }
    Ok(records)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    serde_json::from_reader(BufReader::new(open(path)?)).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
