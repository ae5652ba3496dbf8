//! CSV rendering of tables and result sets

use crate::error::AppError;
use crate::value::{CellValue, ResultSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write a header and rows as comma-separated UTF-8
pub fn write_csv<W, H, R>(writer: W, header: H, rows: &[R]) -> Result<W, AppError>
where
    W: io::Write,
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: AsRef<[CellValue]>,
{
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row.as_ref().iter().map(CellValue::to_csv_field))?;
    }
    writer.into_inner().map_err(|e| AppError::Io(e.into_error()))
}

pub fn to_csv_bytes<H, R>(header: H, rows: &[R]) -> Result<Vec<u8>, AppError>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: AsRef<[CellValue]>,
{
    write_csv(Vec::new(), header, rows)
}

/// Reject names that would escape the export directory
fn file_name(name: &str) -> Result<String, AppError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(AppError::Validation(format!(
            "'{}' cannot be used as a file name",
            name
        )));
    }
    Ok(format!("{}.csv", name))
}

/// Write a result set to `<dir>/<name>.csv`, replacing an earlier export
pub async fn save_result(dir: &Path, name: &str, result: &ResultSet) -> Result<PathBuf, AppError> {
    let path = dir.join(file_name(name)?);
    let bytes = to_csv_bytes(&result.columns, &result.rows)?;

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, bytes).await?;

    info!("Exported {} rows to {}", result.rows.len(), path.display());
    Ok(path)
}
