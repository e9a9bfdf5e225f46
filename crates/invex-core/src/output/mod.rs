//! Output artifacts: one XML document per invoice and a summary workbook.

mod xlsx;
mod xml;

pub use xlsx::to_xlsx;
pub use xml::{ROOT_ELEMENT, to_xml};

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OutputError;
use crate::models::invoice::InvoiceRecord;

/// File name of the summary workbook inside the output directory.
pub const SUMMARY_FILE_NAME: &str = "invoices_summary.xlsx";

/// Writes invoice artifacts to disk.
///
/// Every write replaces the target file atomically: content goes to a
/// temporary file in the same directory which is then renamed over it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self
    }

    /// Write one record as XML, replacing any existing file.
    pub fn write_document(&self, record: &InvoiceRecord, path: &Path) -> Result<(), OutputError> {
        let xml = to_xml(record)?;
        write_atomic(path, &xml)?;
        debug!("Wrote {} bytes of XML to {}", xml.len(), path.display());
        Ok(())
    }

    /// Write the summary workbook, replacing any existing file.
    pub fn write_summary(&self, records: &[InvoiceRecord], path: &Path) -> Result<(), OutputError> {
        let workbook = to_xlsx(records)?;
        write_atomic(path, &workbook)?;
        debug!("Wrote summary of {} records to {}", records.len(), path.display());
        Ok(())
    }
}

/// `<output_dir>/<document stem>.xml`
pub fn document_path(output_dir: &Path, document: &Path) -> PathBuf {
    output_dir.join(format!("{}.xml", document_stem(document)))
}

/// `<output_dir>/invoices_summary.xlsx`
pub fn summary_path(output_dir: &Path) -> PathBuf {
    output_dir.join(SUMMARY_FILE_NAME)
}

/// Base name of a document without its extension.
pub fn document_stem(document: &Path) -> String {
    document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
pub(crate) use tests::read_sheet;
