use std::time::{Duration, Instant};

use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::OwidError;
use crate::fetch::{fetch_citations, fetch_table};
use crate::grapher::GrapherClient;
use crate::table::Table;

#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub datasets: usize,
    pub rows: usize,
    pub columns: Vec<String>,
    pub output: Option<String>,
    pub generated_at: String,
}

impl AggregateSummary {
    pub fn new(catalog: &Catalog, table: &Table, output: Option<String>) -> Self {
        Self {
            datasets: catalog.len(),
            rows: table.len(),
            columns: table.columns().to_vec(),
            output,
            generated_at: iso_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationSummary {
    pub datasets: usize,
    pub citations: Vec<String>,
    pub output: Option<String>,
    pub generated_at: String,
}

impl CitationSummary {
    pub fn new(catalog: &Catalog, citations: &[String], output: Option<String>) -> Self {
        Self {
            datasets: catalog.len(),
            citations: citations.to_vec(),
            output,
            generated_at: iso_timestamp(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs the fetch pipelines over a catalog, one dataset at a time, failing fast.
#[derive(Clone)]
pub struct App<C: GrapherClient> {
    client: C,
    catalog: Catalog,
}

impl<C: GrapherClient> App<C> {
    pub fn new(client: C, catalog: Catalog) -> Self {
        Self { client, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches every dataset and folds them into one table by full outer join.
    pub fn aggregate(&self, sink: &dyn ProgressSink) -> Result<Table, OwidError> {
        let total = self.catalog.len();
        let mut joined = Table::default();
        for (index, descriptor) in self.catalog.iter().enumerate() {
            let started = Instant::now();
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; [{}/{total}] {}", index + 1, descriptor.slug),
                elapsed: None,
            });
            let table = fetch_table(&self.client, descriptor)?;
            tracing::info!(
                slug = %descriptor.slug,
                rows = table.len(),
                "fetched dataset"
            );
            joined = joined.outer_join(table)?;
            sink.event(ProgressEvent {
                message: format!("phase=Join; {} rows after {}", joined.len(), descriptor.slug),
                elapsed: Some(started.elapsed()),
            });
        }
        Ok(joined)
    }

    /// Fetches every dataset's citations and concatenates them in catalog order.
    pub fn collect_citations(&self, sink: &dyn ProgressSink) -> Result<Vec<String>, OwidError> {
        let total = self.catalog.len();
        let mut citations = Vec::new();
        for (index, descriptor) in self.catalog.iter().enumerate() {
            let started = Instant::now();
            let found = fetch_citations(&self.client, descriptor)?;
            tracing::info!(
                slug = %descriptor.slug,
                citations = found.len(),
                "fetched metadata"
            );
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Cite; [{}/{total}] {} ({} citations)",
                    index + 1,
                    descriptor.slug,
                    found.len()
                ),
                elapsed: Some(started.elapsed()),
            });
            citations.extend(found);
        }
        Ok(citations)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
