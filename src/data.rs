use serde::{Deserialize, Serialize};

pub use crate::types::{DocId, DocUrl};

/// One corpus document as published by either variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Document URL (join key).
    pub url: DocUrl,
    /// Document body.
    pub text: String,
    /// Crawl timestamp as published by the corpus (e.g. `2019-04-25T12:57:54Z`).
    #[serde(default)]
    pub timestamp: String,
}

impl Record {
    /// Build a record from borrowed parts.
    pub fn new(url: &str, text: &str, timestamp: &str) -> Self {
        Self {
            url: url.to_string(),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        }
    }
}

/// Ordered in-memory table of records.
pub type Table = Vec<Record>;

/// A clean record joined with a raw record sharing its `url`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinedRecord {
    /// Shared document URL.
    pub url: DocUrl,
    /// Timestamp taken from the clean side.
    pub timestamp: String,
    /// Text of the clean variant.
    pub clean: String,
    /// Text of the raw variant.
    pub raw: String,
    /// Dense row index assigned after the join. Only unique within one run.
    pub doc_id: DocId,
}

/// Train/validate/test partitions of the joined table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partitions {
    /// First block of the shuffled rows.
    pub train: Vec<JoinedRecord>,
    /// Middle block.
    pub validate: Vec<JoinedRecord>,
    /// Remaining rows.
    pub test: Vec<JoinedRecord>,
}

impl Partitions {
    /// Total rows across all three partitions.
    pub fn total(&self) -> usize {
        self.train.len() + self.validate.len() + self.test.len()
    }
}
