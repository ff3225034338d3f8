//! Dataset records and where they come from.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One house sale. The working copy may be reordered, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub sqft_living: f32,
    pub price: f32,
    #[serde(default)]
    pub waterfront: f32,
    #[serde(default)]
    pub bedrooms: f32,
}

impl Record {
    pub fn new(sqft_living: f32, price: f32, waterfront: f32, bedrooms: f32) -> Self {
        Self {
            sqft_living,
            price,
            waterfront,
            bedrooms,
        }
    }

    fn check_finite(&self) -> Result<()> {
        let fields = [self.sqft_living, self.price, self.waterfront, self.bedrooms];
        if fields.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(Error::InvalidData(format!("non-finite field in {self:?}")))
        }
    }
}

/// A one-shot bulk supplier of records.
pub trait RecordSource {
    fn read(&mut self) -> Result<Vec<Record>>;
}

impl RecordSource for Vec<Record> {
    fn read(&mut self) -> Result<Vec<Record>> {
        for r in self.iter() {
            r.check_finite()?;
        }
        Ok(std::mem::take(self))
    }
}

/// Reads one JSON object per line; blank lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for JsonLinesSource {
    fn read(&mut self) -> Result<Vec<Record>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                Error::InvalidData(format!(
                    "{}:{}: {e}",
                    self.path.display(),
                    lineno + 1
                ))
            })?;
            record.check_finite()?;
            records.push(record);
        }
        debug!("read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}
