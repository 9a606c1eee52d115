use std::fs;
use std::io::{self, BufWriter, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::{AggregateSummary, CitationSummary, ProgressEvent, ProgressSink};
use crate::catalog::Catalog;
use crate::error::OwidError;
use crate::table::Table;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_aggregate(result: &AggregateSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_citations(result: &CitationSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_catalog(catalog: &Catalog) -> io::Result<()> {
        Self::print_json(catalog)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub fn write_table(table: &Table, destination: Option<&Utf8Path>) -> Result<(), OwidError> {
    match destination {
        Some(path) => write_file_atomic(path, |writer| table.write_csv(writer)),
        None => table.write_csv(io::stdout().lock()),
    }
}

pub fn write_citations(citations: &[String], destination: Option<&Utf8Path>) -> Result<(), OwidError> {
    match destination {
        Some(path) => write_file_atomic(path, |writer| write_lines(writer, citations)),
        None => write_lines(&mut io::stdout().lock(), citations),
    }
}

fn write_lines(writer: &mut dyn Write, lines: &[String]) -> Result<(), OwidError> {
    for line in lines {
        writeln!(writer, "{line}").map_err(|err| OwidError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Writes through a temp file in the destination directory, then renames it into place.
pub fn write_file_atomic<F>(dest: &Utf8Path, write: F) -> Result<(), OwidError>
where
    F: FnOnce(&mut BufWriter<&fs::File>) -> Result<(), OwidError>,
{
    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| OwidError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("owid-cy-out")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| OwidError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|err| OwidError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| OwidError::Filesystem(err.to_string()))?;
    Ok(())
}
