use std::collections::HashSet;

use serde::Serialize;

use crate::domain::Slug;
use crate::error::OwidError;

pub const CODE_COLUMN: &str = "Code";
pub const YEAR_COLUMN: &str = "Year";

/// One source indicator and the name it is published under in the joined table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDescriptor {
    pub slug: Slug,
    pub columns: Vec<ColumnMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl DatasetDescriptor {
    pub fn new(slug: Slug, columns: Vec<ColumnMapping>) -> Self {
        Self {
            slug,
            columns,
            citation: None,
        }
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    pub fn source_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.source.as_str())
    }

    pub fn target_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.target.as_str())
    }

    pub fn validate(&self) -> Result<(), OwidError> {
        let invalid = |message: String| OwidError::InvalidDescriptor {
            slug: self.slug.to_string(),
            message,
        };

        if self.columns.is_empty() {
            return Err(invalid("no columns declared".to_string()));
        }

        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for column in &self.columns {
            if column.source.trim().is_empty() || column.target.trim().is_empty() {
                return Err(invalid("column names must not be empty".to_string()));
            }
            if !sources.insert(column.source.as_str()) {
                return Err(invalid(format!("source column `{}` repeated", column.source)));
            }
            if column.target == CODE_COLUMN || column.target == YEAR_COLUMN {
                return Err(invalid(format!(
                    "target column `{}` clashes with the row key",
                    column.target
                )));
            }
            if !targets.insert(column.target.as_str()) {
                return Err(invalid(format!("target column `{}` repeated", column.target)));
            }
        }
        Ok(())
    }
}

/// Ordered, validated list of datasets to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    datasets: Vec<DatasetDescriptor>,
}

impl Catalog {
    pub fn new(datasets: Vec<DatasetDescriptor>) -> Result<Self, OwidError> {
        let mut slugs = HashSet::new();
        let mut targets = HashSet::new();
        for descriptor in &datasets {
            descriptor.validate()?;
            if !slugs.insert(descriptor.slug.clone()) {
                return Err(OwidError::InvalidDescriptor {
                    slug: descriptor.slug.to_string(),
                    message: "slug listed twice".to_string(),
                });
            }
            for target in descriptor.target_columns() {
                if !targets.insert(target.to_string()) {
                    return Err(OwidError::InvalidDescriptor {
                        slug: descriptor.slug.to_string(),
                        message: format!("target column `{target}` already used by another dataset"),
                    });
                }
            }
        }
        Ok(Self { datasets })
    }

    pub fn builtin() -> Self {
        Self {
            datasets: builtin_descriptors(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetDescriptor> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn descriptor(&self, slug: &Slug) -> Option<&DatasetDescriptor> {
        self.datasets.iter().find(|descriptor| &descriptor.slug == slug)
    }

    /// Keeps only the listed slugs, in catalog order.
    pub fn subset(&self, slugs: &[Slug]) -> Result<Self, OwidError> {
        if let Some(missing) = slugs.iter().find(|slug| self.descriptor(slug).is_none()) {
            return Err(OwidError::InvalidDescriptor {
                slug: missing.to_string(),
                message: "not present in catalog".to_string(),
            });
        }
        let datasets = self
            .datasets
            .iter()
            .filter(|descriptor| slugs.contains(&descriptor.slug))
            .cloned()
            .collect();
        Ok(Self { datasets })
    }

    pub fn extend(self, extra: Vec<DatasetDescriptor>) -> Result<Self, OwidError> {
        let mut datasets = self.datasets;
        datasets.extend(extra);
        Self::new(datasets)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a DatasetDescriptor;
    type IntoIter = std::slice::Iter<'a, DatasetDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}

struct BuiltinDataset {
    slug: &'static str,
    columns: &'static [(&'static str, &'static str)],
    cite: Option<&'static str>,
}

const BUILTIN: &[BuiltinDataset] = &[
    BuiltinDataset {
        slug: "gdp-per-capita-worldbank",
        columns: &[("ny_gdp_pcap_pp_kd", "gdp_pcap_wb")],
        cite: Some(
            "Eurostat, OECD, and World Bank (2025) – with minor processing by Our World in Data",
        ),
    },
    BuiltinDataset {
        slug: "gdp-worldbank",
        columns: &[("ny_gdp_mktp_pp_kd", "gdp_wb")],
        cite: Some(
            "Feenstra et al. - Penn World Table (2023) – with major processing by Our World in Data",
        ),
    },
    BuiltinDataset {
        slug: "democracy-index-eiu",
        columns: &[("democracy_eiu", "democracy")],
        cite: Some("Economist Intelligence Unit (2006-2024) – processed by Our World in Data"),
    },
    BuiltinDataset {
        slug: "human-rights-index-vdem",
        columns: &[("civ_libs_vdem__estimate_best", "hdi")],
        cite: Some("V-Dem (2025) – processed by Our World in Data"),
    },
    BuiltinDataset {
        slug: "country-position-nuclear-weapons",
        columns: &[("status", "nuclear_weapons_position")],
        cite: Some(
            "Bleek (2017); Nuclear Threat Initiative (2024) – with major processing by Our World in Data",
        ),
    },
    BuiltinDataset {
        slug: "military-spending-sipri",
        columns: &[("constant_usd", "military_spending_sipri_usd_adjusted")],
        cite: Some(
            "Stockholm International Peace Research Institute (2025) – with minor processing by Our World in Data.",
        ),
    },
    BuiltinDataset {
        slug: "armed-forces-personnel",
        columns: &[("ms_mil_totl_p1", "armed_forces_personnel_iiss")],
        cite: None,
    },
    BuiltinDataset {
        slug: "child-mortality-igme",
        columns: &[(
            "observation_value__indicator_child_mortality_rate__sex_total__wealth_quintile_total__unit_of_measure_deaths_per_100_live_births",
            "child_mortality_rate",
        )],
        cite: None,
    },
    BuiltinDataset {
        slug: "infant-mortality",
        columns: &[(
            "observation_value__indicator_infant_mortality_rate__sex_total__wealth_quintile_total__unit_of_measure_deaths_per_100_live_births",
            "infant_mortality_rate",
        )],
        cite: None,
    },
    BuiltinDataset {
        slug: "homicide-rate-unodc",
        columns: &[(
            "value__category_total__sex_total__age_total__unit_of_measurement_rate_per_100_000_population",
            "homicide_rate",
        )],
        cite: None,
    },
    BuiltinDataset {
        slug: "share-of-population-urban",
        columns: &[("sp_urb_totl_in_zs", "urban_population_share")],
        cite: None,
    },
    BuiltinDataset {
        slug: "share-of-population-in-extreme-poverty",
        columns: &[(
            "headcount_ratio__ppp_version_2021__poverty_line_300__welfare_type_income_or_consumption__table_income_or_consumption_consolidated__survey_comparability_no_spells",
            "extreme_poverty_share",
        )],
        cite: None,
    },
    BuiltinDataset {
        slug: "political-corruption-index",
        columns: &[("corruption_vdem__estimate_best", "political_corruption_index")],
        cite: None,
    },
    BuiltinDataset {
        slug: "rule-of-law-index",
        columns: &[("rule_of_law_vdem__estimate_best", "rule_of_law_index")],
        cite: None,
    },
    BuiltinDataset {
        slug: "academic-freedom-index",
        columns: &[("v2xca_academ__estimate_best", "academic_freedom_index")],
        cite: None,
    },
    BuiltinDataset {
        slug: "freedom-of-association-index",
        columns: &[("freeassoc_vdem__estimate_best", "freedom_of_association_index")],
        cite: None,
    },
    BuiltinDataset {
        slug: "freedom-of-expression-index",
        columns: &[("freeexpr_vdem__estimate_best", "freedom_of_expression_index")],
        cite: None,
    },
];

fn builtin_descriptors() -> Vec<DatasetDescriptor> {
    BUILTIN
        .iter()
        .map(|entry| DatasetDescriptor {
            slug: Slug::from_static(entry.slug),
            columns: entry
                .columns
                .iter()
                .map(|(source, target)| ColumnMapping::new(*source, *target))
                .collect(),
            citation: entry.cite.map(str::to_string),
        })
        .collect()
}
