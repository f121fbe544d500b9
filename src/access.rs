use crate::error::{QueryError, QueryResult};
use crate::models::{TransactionRecord, UserCredential};

/// Entity types the directory lookup can narrow on. Any other value,
/// including "all", leaves the lookup unnarrowed.
const ENTITY_TYPES: [&str; 3] = ["BOUTIQUE", "LAB2.0", "FRANCHISE"];

/// The credential list loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct Directory {
    entries: Vec<UserCredential>,
}

impl Directory {
    pub fn new(entries: Vec<UserCredential>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Linear lookup on msisdn. The first entry with a matching msisdn decides
    /// the outcome, so a wrong password is reported as such and never as an
    /// unknown user.
    pub fn authenticate(&self, msisdn: &str, password: &str) -> QueryResult<&UserCredential> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.msisdn == msisdn)
            .ok_or_else(|| QueryError::NotFound(format!("msisdn '{msisdn}' not found")))?;

        if entry.password != password {
            return Err(QueryError::Unauthorized("incorrect password".to_string()));
        }
        Ok(entry)
    }

    /// Entries belonging to `user`, narrowed to `entity_type_name` only when it
    /// names a known entity type.
    pub fn entries_for<'a>(
        &'a self,
        user: &UserCredential,
        entity_type_name: Option<&str>,
    ) -> Vec<&'a UserCredential> {
        let entity_type = entity_type_name.filter(|name| ENTITY_TYPES.contains(name));
        self.entries
            .iter()
            .filter(|entry| entry.msisdn == user.msisdn)
            .filter(|entry| entity_type.map_or(true, |name| entry.entity_type_name == name))
            .collect()
    }
}

/// Records the credential is allowed to see, in their original order.
pub fn scope<'a, I>(records: I, credential: &UserCredential) -> Vec<&'a TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|record| credential.allowed_entity_names.allows(&record.entity_name))
        .filter(|record| credential.allows_entity_type(&record.entity_type_name))
        .collect()
}
