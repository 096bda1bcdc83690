use std::io::Write;
use std::path::Path;

use crate::aggregate::CrawlResult;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn write_csv_to<W: Write>(result: &CrawlResult, out: W) -> Result<(), WriteError> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer.write_record(result.header())?;
    for row in result.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv(result: &CrawlResult, path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv_to(result, file)?;
    log::info!(
        "Wrote {} row(s) to {}",
        result.records.len(),
        path.display()
    );
    Ok(())
}
