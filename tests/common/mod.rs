#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use owid_cy::catalog::{ColumnMapping, DatasetDescriptor};
use owid_cy::domain::{Slug, Stage};
use owid_cy::error::OwidError;
use owid_cy::grapher::GrapherClient;

/// Serves canned bodies per slug and records the order of requests.
#[derive(Default)]
pub struct MockGrapher {
    pub csv: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
    pub failing: HashMap<String, u16>,
    pub calls: Mutex<Vec<String>>,
}

impl MockGrapher {
    pub fn with_csv(mut self, slug: &str, body: &str) -> Self {
        self.csv.insert(slug.to_string(), body.to_string());
        self
    }

    pub fn with_metadata(mut self, slug: &str, body: &str) -> Self {
        self.metadata.insert(slug.to_string(), body.to_string());
        self
    }

    pub fn with_status(mut self, slug: &str, status: u16) -> Self {
        self.failing.insert(slug.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn serve(
        &self,
        slug: &Slug,
        stage: Stage,
        bodies: &HashMap<String, String>,
    ) -> Result<String, OwidError> {
        self.calls.lock().unwrap().push(slug.to_string());
        if let Some(status) = self.failing.get(slug.as_str()) {
            return Err(OwidError::Status {
                slug: slug.to_string(),
                stage,
                status: *status,
                message: "mock failure".to_string(),
            });
        }
        bodies.get(slug.as_str()).cloned().ok_or(OwidError::Status {
            slug: slug.to_string(),
            stage,
            status: 404,
            message: "not found".to_string(),
        })
    }
}

impl GrapherClient for MockGrapher {
    fn fetch_csv(&self, slug: &Slug) -> Result<String, OwidError> {
        self.serve(slug, Stage::Fetch, &self.csv)
    }

    fn fetch_metadata(&self, slug: &Slug) -> Result<String, OwidError> {
        self.serve(slug, Stage::Metadata, &self.metadata)
    }
}

pub fn descriptor(slug: &str, columns: &[(&str, &str)]) -> DatasetDescriptor {
    DatasetDescriptor::new(
        slug.parse().unwrap(),
        columns
            .iter()
            .map(|(source, target)| ColumnMapping::new(*source, *target))
            .collect(),
    )
}
