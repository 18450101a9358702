//! CSV export of raw records.
//!
//! Writes the buffer's retained records, unfiltered, one row per sample with
//! the header `us,V,mA,mW`. The export is a point-in-time copy; nothing is
//! read back.

use crate::error::{AppResult, PicovaError};
use crate::measurement::Measurement;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Column header of exported files.
pub const CSV_HEADER: [&str; 4] = ["us", "V", "mA", "mW"];

/// Write `records` as CSV to any writer.
#[cfg(feature = "storage_csv")]
pub fn write_csv<W: Write>(records: &[Measurement], writer: W) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(CSV_HEADER)?;
    for m in records {
        writer.write_record(&[
            m.timestamp.to_string(),
            m.voltage.to_string(),
            m.current.to_string(),
            m.power.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
pub fn write_csv<W: Write>(_records: &[Measurement], _writer: W) -> AppResult<()> {
    Err(PicovaError::Configuration(
        "CSV export not enabled. Rebuild with --features storage_csv".to_string(),
    ))
}

/// Write `records` to a new timestamped file under `dir` and return its path.
///
/// The directory is created if missing. File names look like
/// `picova_20240131_174502.csv`.
pub fn export_csv(records: &[Measurement], dir: &Path) -> AppResult<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let file_name = format!(
        "picova_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(file_name);
    export_csv_to(records, &path)?;
    Ok(path)
}

/// Write `records` to exactly `path`, replacing any existing file.
pub fn export_csv_to(records: &[Measurement], path: &Path) -> AppResult<()> {
    let file = std::fs::File::create(path).map_err(|e| {
        PicovaError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create '{}': {}", path.display(), e),
        ))
    })?;
    write_csv(records, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows = records.len(), "CSV export written");
    Ok(())
}
