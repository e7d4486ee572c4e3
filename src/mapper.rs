use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::PropertyDataType;
use crate::error::SyncError;

const DEFAULT_ASSAY_TYPE: &str = "http://jermontology.org/ontology/JERMOntology#Experimental_assay_type";

/// Catalogue asset kinds a dataset file can become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    DataFile,
    Document,
    Sop,
    Publication,
    Model,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::DataFile,
        AssetCategory::Document,
        AssetCategory::Sop,
        AssetCategory::Publication,
        AssetCategory::Model,
    ];

    /// Collection name in the catalogue API, also the JSON:API `type`.
    pub fn endpoint(self) -> &'static str {
        match self {
            AssetCategory::DataFile => "data_files",
            AssetCategory::Document => "documents",
            AssetCategory::Sop => "sops",
            AssetCategory::Publication => "publications",
            AssetCategory::Model => "models",
        }
    }

    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.endpoint() == endpoint)
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

impl FromStr for AssetCategory {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "data_file" | "data_files" => Ok(AssetCategory::DataFile),
            "document" | "documents" => Ok(AssetCategory::Document),
            "sop" | "sops" => Ok(AssetCategory::Sop),
            "publication" | "publications" => Ok(AssetCategory::Publication),
            "model" | "models" => Ok(AssetCategory::Model),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown asset category: {other}"
            ))),
        }
    }
}

/// Sample attribute type as seeded by a stock catalogue installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeType {
    pub id: &'static str,
    pub title: &'static str,
    pub base_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssayClass {
    pub key: &'static str,
    pub type_uri: &'static str,
}

/// Lookup tables from LIMS type codes to catalogue vocabulary. Built once,
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct Mapper {
    dataset_categories: HashMap<String, Option<AssetCategory>>,
    experiment_classes: HashMap<String, AssayClass>,
    data_formats: Vec<(&'static str, &'static str)>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    pub fn new() -> Self {
        use AssetCategory::*;

        // `None` marks types that exist in the LIMS but must never be transferred.
        let dataset_categories = [
            ("ANALYSIS_NOTEBOOK", Some(Document)),
            ("ANALYZED_DATA", Some(DataFile)),
            ("ATTACHMENT", Some(Document)),
            ("ELN_PREVIEW", None),
            ("EXPERIMENT_PROTOCOL", Some(Sop)),
            ("EXPERIMENT_RESULT", Some(Document)),
            ("HISTOLOGICAL_SLIDE", Some(DataFile)),
            ("IB_DATA", Some(DataFile)),
            ("LUMINEX_DATA", Some(DataFile)),
            ("MS_DATA_ANALYZED", Some(DataFile)),
            ("MS_DATA_RAW", Some(DataFile)),
            ("OTHER_DATA", Some(Document)),
            ("PROCESSED_DATA", Some(DataFile)),
            ("PUBLICATION_DATA", Some(Publication)),
            ("QPCR_DATA", Some(DataFile)),
            ("RAW_DATA", Some(DataFile)),
            ("SOURCE_CODE", Some(Document)),
            ("TEST_CONT", None),
            ("TEST_DAT", None),
            ("UNKNOWN", None),
        ]
        .into_iter()
        .map(|(code, category)| (code.to_string(), category))
        .collect();

        let experiment_classes = [
            ("00_MOUSE_DATABASE", DEFAULT_ASSAY_TYPE),
            ("00_PATIENT_DATABASE", DEFAULT_ASSAY_TYPE),
            ("00_STANDARD_OPERATING_PROTOCOLS", DEFAULT_ASSAY_TYPE),
            (
                "01_BIOLOGICAL_EXPERIMENT",
                "http://jermontology.org/ontology/JERMOntology#Cultivation_experiment",
            ),
            (
                "02_MASSSPECTROMETRY_EXPERIMENT",
                "http://jermontology.org/ontology/JERMOntology#Proteomics",
            ),
            ("03_HISTOLOGICAL_ANALYSIS", DEFAULT_ASSAY_TYPE),
            ("04_MICRO_CT", DEFAULT_ASSAY_TYPE),
            ("DEFAULT_EXPERIMENT", DEFAULT_ASSAY_TYPE),
        ]
        .into_iter()
        .map(|(code, type_uri)| {
            (
                code.to_string(),
                AssayClass {
                    key: "EXP",
                    type_uri,
                },
            )
        })
        .collect();

        let mut data_formats = vec![
            ("fastq.gz", "http://edamontology.org/format_1930"),
            ("fastq", "http://edamontology.org/format_1930"),
            ("json", "http://edamontology.org/format_3464"),
            ("yaml", "http://edamontology.org/format_3750"),
            ("raw", "http://edamontology.org/format_3712"),
            ("tsv", "http://edamontology.org/format_3475"),
            ("csv", "http://edamontology.org/format_3752"),
        ];
        data_formats.sort_by_key(|(ext, _)| std::cmp::Reverse(ext.len()));

        Self {
            dataset_categories,
            experiment_classes,
            data_formats,
        }
    }

    /// Adds or overrides dataset type mappings. Meant for construction time.
    pub fn with_asset_categories<I>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, AssetCategory)>,
    {
        for (code, category) in extra {
            self.dataset_categories.insert(code, Some(category));
        }
        self
    }

    pub fn asset_category_for(&self, dataset_type: &str) -> Result<AssetCategory, SyncError> {
        self.dataset_categories
            .get(dataset_type)
            .copied()
            .flatten()
            .ok_or_else(|| SyncError::UnmappedType {
                kind: "dataset",
                code: dataset_type.to_string(),
            })
    }

    pub fn assay_class_for(&self, experiment_type: &str) -> Result<AssayClass, SyncError> {
        self.experiment_classes
            .get(experiment_type)
            .copied()
            .ok_or_else(|| SyncError::UnmappedType {
                kind: "experiment",
                code: experiment_type.to_string(),
            })
    }

    /// Vocabulary terms and entity links have no catalogue counterpart and
    /// degrade to plain strings.
    pub fn attribute_type_for(&self, data_type: PropertyDataType) -> AttributeType {
        match data_type {
            PropertyDataType::Integer => AttributeType {
                id: "2",
                title: "Integer",
                base_type: "Integer",
            },
            PropertyDataType::Real => AttributeType {
                id: "3",
                title: "Real number",
                base_type: "Float",
            },
            PropertyDataType::Varchar
            | PropertyDataType::ControlledVocabulary
            | PropertyDataType::Sample => AttributeType {
                id: "4",
                title: "String",
                base_type: "String",
            },
            PropertyDataType::MultilineVarchar => AttributeType {
                id: "7",
                title: "Text",
                base_type: "Text",
            },
            PropertyDataType::Boolean => AttributeType {
                id: "8",
                title: "Boolean",
                base_type: "Boolean",
            },
            PropertyDataType::Timestamp => AttributeType {
                id: "1",
                title: "Date time",
                base_type: "DateTime",
            },
            PropertyDataType::Date => AttributeType {
                id: "5",
                title: "Date",
                base_type: "Date",
            },
            PropertyDataType::Hyperlink => AttributeType {
                id: "6",
                title: "Web link",
                base_type: "String",
            },
            PropertyDataType::Xml => AttributeType {
                id: "7",
                title: "Text",
                base_type: "Text",
            },
        }
    }

    pub fn data_format_annotation_for(&self, file_name: &str) -> Option<&'static str> {
        let lowered = file_name.to_lowercase();
        self.data_formats
            .iter()
            .find(|(ext, _)| lowered.ends_with(&format!(".{ext}")))
            .map(|(_, annotation)| *annotation)
    }

    pub fn content_type_for(&self, file_name: &str) -> &'static str {
        let lowered = file_name.to_lowercase();
        let ext = lowered.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match ext {
            "gz" => "application/gzip",
            "zip" => "application/zip",
            "json" => "application/json",
            "yaml" | "yml" => "application/yaml",
            "csv" => "text/csv",
            "tsv" => "text/tab-separated-values",
            "txt" | "fastq" | "fasta" | "fa" => "text/plain",
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "tif" | "tiff" => "image/tiff",
            "xml" => "application/xml",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_extension_wins() {
        let mapper = Mapper::new();
        assert_eq!(
            mapper.data_format_annotation_for("reads.FASTQ.gz"),
            Some("http://edamontology.org/format_1930")
        );
        assert_eq!(mapper.data_format_annotation_for("archive.tar"), None);
    }

    #[test]
    fn category_endpoint_round_trip() {
        for category in AssetCategory::ALL {
            assert_eq!(AssetCategory::from_endpoint(category.endpoint()), Some(category));
        }
    }
}
