//! Routine description sidecar
//!
//! A pipe-delimited `name|description` file kept next to the fixtures.

use crate::error::AppError;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Descriptions {
    entries: HashMap<String, String>,
}

impl Descriptions {
    /// Parse sidecar content; keys are lower-cased
    pub fn parse(content: &str) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut entries = HashMap::new();
        for row in reader.records() {
            let row = row?;
            if let (Some(name), Some(description)) = (row.get(0), row.get(1)) {
                entries.insert(name.trim().to_lowercase(), description.to_string());
            }
        }
        Ok(Self { entries })
    }

    /// Load the sidecar; a missing file means no descriptions
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No routine descriptions at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, routine: &str) -> Option<&str> {
        self.entries.get(&routine.to_lowercase()).map(String::as_str)
    }
}
