//! 📂 FileSource: the offer CSV, served in pages.
//!
//! The file is read line by line through a tokio `BufReader`. The first line is the header;
//! it is parsed once, kept, and never shipped downstream. Every page after that is raw
//! data lines joined by `\n`, capped by row count and by bytes, whichever bites first.
//!
//! ⚠️ Line-based paging assumes no quoted field contains a newline. The offer exports don't.
//! If one ever does, that record gets split across two rows and both halves are counted
//! as undecodable by the transform.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use csv::StringRecord;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, trace};

use crate::backends::{CommonSourceConfig, Source};
use crate::progress::ProgressMetrics;

/// 📂 Which file, how it's delimited, and how big the pages are.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSourceConfig {
    pub file_name: String,
    pub delimiter: char,
    pub common_config: CommonSourceConfig,
}

/// 🔧 CSV delimiters are single bytes. "🦆" is not a delimiter, however much it wants to be.
pub(crate) fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("💀 The CSV delimiter '{delimiter}' is not a single ASCII character. The csv reader only speaks bytes.");
    }
    Ok(delimiter as u8)
}

/// 🏷️ Parse a header line into column names: trimmed, lowercased, BOM removed.
pub(crate) fn parse_header(line: &str, delimiter: char) -> Result<StringRecord> {
    let line = line.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter_byte(delimiter)?)
        .from_reader(line.as_bytes());
    let record = reader
        .records()
        .next()
        .transpose()
        .context("💀 The header line is not valid CSV")?
        .unwrap_or_default();
    Ok(record
        .iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect())
}

/// 📂 Pages raw CSV lines out of a file on disk.
pub(crate) struct FileSource {
    reader: BufReader<File>,
    config: FileSourceConfig,
    headers: StringRecord,
    progress: ProgressMetrics,
    exhausted: bool,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("config", &self.config)
            .field("headers", &self.headers)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl FileSource {
    /// 🚀 Open the file and consume its header line.
    ///
    /// Fails when the file can't be opened or has no header at all. An empty file is not an
    /// offer file, it's a cry for help.
    pub(crate) async fn new(config: FileSourceConfig) -> Result<Self> {
        let file = File::open(&config.file_name).await.context(format!(
            "💀 The door to '{}' would not budge. It might not exist. The permissions might be wrong. \
            Either way, the offers stay outside.",
            config.file_name
        ))?;
        // -- 📏 0 = unknown size; the progress bar will shrug instead of estimating
        let file_size = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        let header_bytes = reader
            .read_line(&mut header_line)
            .await
            .context(format!("💀 Could not read the header line of '{}'", config.file_name))?;
        let headers = parse_header(header_line.trim_end_matches(['\r', '\n']), config.delimiter)?;
        if header_bytes == 0 || headers.iter().all(str::is_empty) {
            bail!(
                "💀 '{}' has no header line. Without column names we can't tell a price from a postcode.",
                config.file_name
            );
        }
        debug!("🏷️ '{}' columns: {:?}", config.file_name, headers);

        let mut progress = ProgressMetrics::new(config.file_name.clone(), file_size);
        progress.update(header_bytes as u64, 0);

        Ok(Self {
            reader,
            config,
            headers,
            progress,
            exhausted: false,
        })
    }

    /// 🏷️ Column names from the header line, in file order.
    pub(crate) fn headers(&self) -> &StringRecord {
        &self.headers
    }
}

#[async_trait]
impl Source for FileSource {
    async fn next_page(&mut self) -> Result<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }
        let limits = &self.config.common_config;
        let mut page = String::new();
        let mut line = Vec::new();
        let mut bytes_read = 0usize;
        let mut rows = 0usize;

        while rows < limits.chunk_size && bytes_read < limits.max_batch_size_bytes {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .await
                .context(format!("💀 Reading '{}' failed mid-file", self.config.file_name))?;
            if read == 0 {
                self.exhausted = true;
                self.progress.finish();
                break;
            }
            bytes_read += read;
            // -- 🔤 a stray Latin-1 byte costs one character, not the whole load
            let decoded = String::from_utf8_lossy(&line);
            let trimmed = decoded.trim_end_matches(['\r', '\n']);
            // -- 🧹 blank lines carry no offers; they don't count toward the chunk either
            if trimmed.trim().is_empty() {
                continue;
            }
            if !page.is_empty() {
                page.push('\n');
            }
            page.push_str(trimmed);
            rows += 1;
        }

        trace!("📖 paged {} rows ({} bytes) out of '{}'", rows, bytes_read, self.config.file_name);
        self.progress.update(bytes_read as u64, rows as u64);

        if page.is_empty() {
            debug!(
                "🏁 '{}' is exhausted after {} rows",
                self.config.file_name,
                self.progress.rows_read()
            );
            return Ok(None);
        }
        Ok(Some(page))
    }
}
