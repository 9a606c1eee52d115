use std::collections::HashMap;

use serde::Deserialize;

use crate::catalog::{CODE_COLUMN, DatasetDescriptor, YEAR_COLUMN};
use crate::domain::{EntityKey, Stage};
use crate::error::OwidError;
use crate::grapher::GrapherClient;
use crate::table::{Table, Value};

/// Cell contents read as missing, matching common CSV reader defaults.
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_null_cell(raw: &str) -> bool {
    NULL_MARKERS.contains(&raw.trim())
}

/// Downloads one dataset and reduces it to its key and renamed value columns.
pub fn fetch_table<C: GrapherClient + ?Sized>(
    client: &C,
    descriptor: &DatasetDescriptor,
) -> Result<Table, OwidError> {
    let body = client.fetch_csv(&descriptor.slug)?;
    parse_table(descriptor, &body)
}

/// Downloads one dataset's metadata and returns the long citation of every
/// declared column the metadata knows about, in declaration order.
pub fn fetch_citations<C: GrapherClient + ?Sized>(
    client: &C,
    descriptor: &DatasetDescriptor,
) -> Result<Vec<String>, OwidError> {
    let body = client.fetch_metadata(&descriptor.slug)?;
    parse_citations(descriptor, &body)
}

pub fn parse_table(descriptor: &DatasetDescriptor, body: &str) -> Result<Table, OwidError> {
    let slug = descriptor.slug.to_string();
    let parse_error = |message: String| OwidError::Parse {
        slug: slug.clone(),
        stage: Stage::Parse,
        message,
    };

    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| parse_error(err.to_string()))?
        .clone();

    let position = |column: &str| {
        headers
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| OwidError::MissingColumn {
                slug: slug.clone(),
                column: column.to_string(),
            })
    };
    let code_index = position(CODE_COLUMN)?;
    let year_index = position(YEAR_COLUMN)?;
    let value_indices = descriptor
        .source_columns()
        .map(position)
        .collect::<Result<Vec<_>, _>>()?;

    let targets = rename_targets(descriptor)?;
    let mut table = Table::new(targets);
    let mut dropped = 0usize;
    let mut duplicates = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| parse_error(err.to_string()))?;
        let code = record.get(code_index).unwrap_or_default();
        let year = record.get(year_index).unwrap_or_default();
        let cells = value_indices
            .iter()
            .map(|index| record.get(*index).unwrap_or_default())
            .collect::<Vec<_>>();

        if is_null_cell(code) || is_null_cell(year) || cells.iter().any(|cell| is_null_cell(cell)) {
            dropped += 1;
            continue;
        }

        let year = parse_year(year)
            .ok_or_else(|| parse_error(format!("row {}: invalid Year `{year}`", row + 1)))?;
        let values = cells.into_iter().map(|cell| Some(Value::parse(cell))).collect();
        if !table.insert(EntityKey::new(code.trim(), year), values) {
            duplicates += 1;
        }
    }

    if dropped > 0 {
        tracing::debug!(%slug, dropped, "dropped incomplete rows");
    }
    if duplicates > 0 {
        tracing::warn!(%slug, duplicates, "duplicate Code/Year rows ignored");
    }
    Ok(table)
}

/// Target names for the projected value columns, refusing any that would
/// overwrite the key columns or each other.
fn rename_targets(descriptor: &DatasetDescriptor) -> Result<Vec<String>, OwidError> {
    let mut columns = vec![CODE_COLUMN.to_string(), YEAR_COLUMN.to_string()];
    for target in descriptor.target_columns() {
        if columns.iter().any(|existing| existing == target) {
            return Err(OwidError::RenameCollision {
                slug: descriptor.slug.to_string(),
                column: target.to_string(),
            });
        }
        columns.push(target.to_string());
    }
    Ok(columns.split_off(2))
}

fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(year) = raw.parse::<i32>() {
        return Some(year);
    }
    let float = raw.parse::<f64>().ok()?;
    let in_range = float.fract() == 0.0 && float >= i32::MIN as f64 && float <= i32::MAX as f64;
    in_range.then_some(float as i32)
}

#[derive(Debug, Deserialize)]
struct GrapherMetadata {
    columns: HashMap<String, ColumnMetadata>,
}

#[derive(Debug, Deserialize)]
struct ColumnMetadata {
    #[serde(rename = "citationLong")]
    citation_long: Option<String>,
}

pub fn parse_citations(descriptor: &DatasetDescriptor, body: &str) -> Result<Vec<String>, OwidError> {
    let parse_error = |message: String| OwidError::Parse {
        slug: descriptor.slug.to_string(),
        stage: Stage::Metadata,
        message,
    };

    let metadata: GrapherMetadata =
        serde_json::from_str(body).map_err(|err| parse_error(err.to_string()))?;

    let mut citations = Vec::new();
    for source in descriptor.source_columns() {
        let Some(column) = metadata.columns.get(source) else {
            tracing::debug!(slug = %descriptor.slug, column = source, "no metadata for column");
            continue;
        };
        let citation = column
            .citation_long
            .clone()
            .ok_or_else(|| parse_error(format!("column `{source}` has no citationLong")))?;
        citations.push(citation);
    }
    Ok(citations)
}
