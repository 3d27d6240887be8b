use crate::config::{CompressionType, ExportConfig};
use crate::db::QueryResult;
use crate::error::{ExtractError, Result};
use csv::{Terminator, WriterBuilder};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

const BUFFER_SIZE: usize = 64 * 1024;

/// Record terminator written after every CSV line.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

fn terminator() -> Terminator {
    if cfg!(windows) {
        Terminator::CRLF
    } else {
        Terminator::Any(b'\n')
    }
}

/// Writes `result` to `path` as comma-separated text with a header row.
pub fn save_to_csv(result: &QueryResult, path: impl AsRef<Path>) -> Result<ExportStats> {
    Exporter::new(ExportConfig::new(path.as_ref())).export(result)
}

pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Output lands in a temporary file next to the destination and is
    /// renamed into place only once fully written.
    pub fn export(&self, result: &QueryResult) -> Result<ExportStats> {
        let start_time = Instant::now();
        let path = self.config.output_file.as_path();
        let delimiter = self.config.delimiter_byte()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(".rds-extract-").suffix(".tmp");
        // 0666 before the umask, as for any newly created file.
        #[cfg(unix)]
        builder.permissions(fs::Permissions::from_mode(0o666));
        let mut temp = builder
            .tempfile_in(dir)
            .map_err(|e| ExtractError::io(dir, e))?;
        debug!(temp = %temp.path().display(), "writing to temporary file");

        let buffered = BufWriter::with_capacity(BUFFER_SIZE, temp.as_file_mut());
        let mut buffered = match self.config.compression {
            CompressionType::None => self.write_records(buffered, result, delimiter)?,
            CompressionType::Gzip => {
                let encoder = GzEncoder::new(buffered, Compression::default());
                self.write_records(encoder, result, delimiter)?
                    .finish()
                    .map_err(|e| ExtractError::io(path, e))?
            }
        };
        buffered.flush().map_err(|e| ExtractError::io(path, e))?;
        drop(buffered);

        temp.as_file()
            .sync_all()
            .map_err(|e| ExtractError::io(path, e))?;
        if let Ok(existing) = fs::metadata(path) {
            temp.as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| ExtractError::io(path, e))?;
        }
        let file = temp.persist(path).map_err(|e| ExtractError::io(path, e.error))?;
        let file_size = file
            .metadata()
            .map_err(|e| ExtractError::io(path, e))?
            .len();

        Ok(ExportStats {
            rows_exported: result.row_count() as u64,
            duration_secs: start_time.elapsed().as_secs_f64(),
            file_size_bytes: file_size,
            output_file: path.to_path_buf(),
        })
    }

    fn write_records<W: Write>(&self, writer: W, result: &QueryResult, delimiter: u8) -> Result<W> {
        let mut csv_writer = WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(terminator())
            .from_writer(writer);

        if self.config.include_header && !result.columns.is_empty() {
            csv_writer.write_record(&result.columns)?;
        }
        for row in &result.rows {
            csv_writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
        }

        csv_writer
            .into_inner()
            .map_err(|e| ExtractError::io(&self.config.output_file, e.into_error()))
    }
}

#[derive(Debug, Clone)]
pub struct ExportStats {
    pub rows_exported: u64,
    pub duration_secs: f64,
    pub file_size_bytes: u64,
    pub output_file: PathBuf,
}

impl ExportStats {
    pub fn print_summary(&self) {
        let rows_per_sec = if self.duration_secs > 0.0 {
            self.rows_exported as f64 / self.duration_secs
        } else {
            0.0
        };
        info!(
            output = %self.output_file.display(),
            rows = self.rows_exported,
            bytes = self.file_size_bytes,
            seconds = format_args!("{:.2}", self.duration_secs),
            rows_per_sec = format_args!("{:.0}", rows_per_sec),
            "export finished"
        );
    }
}
