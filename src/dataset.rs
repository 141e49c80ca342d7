//! Input dataset handling.
//!
//! The dataset is a CSV with a header row: a date column followed by one column per asset
//! holding its starting weight. It is read exactly once, at submission time.

use crate::error::RunError;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum DatasetHandle {
    File(PathBuf),
    /// In-memory document, used when the caller already holds the bytes.
    Memory { file_name: String, contents: Bytes },
}

/// Dataset contents read for one submission. Dropped once the request is sent.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub file_name: String,
    pub contents: Bytes,
}

/// Header-level view of a dataset, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetShape {
    pub assets: Vec<String>,
    pub data_rows: usize,
}

impl DatasetHandle {
    pub async fn load(&self) -> Result<LoadedDataset, RunError> {
        match self {
            DatasetHandle::File(path) => {
                let contents = tokio::fs::read(path)
                    .await
                    .map_err(|source| RunError::DatasetRead {
                        path: path.clone(),
                        source,
                    })?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "dataset.csv".into());
                Ok(LoadedDataset {
                    file_name,
                    contents: Bytes::from(contents),
                })
            }
            DatasetHandle::Memory {
                file_name,
                contents,
            } => Ok(LoadedDataset {
                file_name: file_name.clone(),
                contents: contents.clone(),
            }),
        }
    }
}

impl LoadedDataset {
    /// Read the header and count data rows. `None` if the document is not readable CSV.
    pub fn shape(&self) -> Option<DatasetShape> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(self.contents.as_ref());
        let headers = rdr.headers().ok()?.clone();
        let assets = headers
            .iter()
            .skip(1)
            .map(|h| h.trim().to_string())
            .collect();
        let mut data_rows = 0;
        for record in rdr.records() {
            record.ok()?;
            data_rows += 1;
        }
        Some(DatasetShape { assets, data_rows })
    }

    /// Log what is about to be sent. The service owns validation, so nothing is rejected here.
    pub fn log_shape(&self) {
        match self.shape() {
            Some(shape) => {
                debug!(
                    file = %self.file_name,
                    assets = shape.assets.len(),
                    rows = shape.data_rows,
                    "dataset inspected"
                );
                if shape.data_rows != 1 {
                    warn!(
                        file = %self.file_name,
                        rows = shape.data_rows,
                        "dataset should have exactly one data row with starting weights"
                    );
                }
            }
            None => warn!(file = %self.file_name, "dataset is not readable as CSV"),
        }
    }
}
