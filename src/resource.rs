use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::mapper::{AssayClass, AssetCategory, AttributeType};

/// Catalogue collections the synchronizer reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Assay,
    Sample,
    SampleType,
    Asset(AssetCategory),
    Study,
    Project,
}

impl ResourceKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            ResourceKind::Assay => "assays",
            ResourceKind::Sample => "samples",
            ResourceKind::SampleType => "sample_types",
            ResourceKind::Asset(category) => category.endpoint(),
            ResourceKind::Study => "studies",
            ResourceKind::Project => "projects",
        }
    }

    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        match endpoint {
            "assays" => Some(ResourceKind::Assay),
            "samples" => Some(ResourceKind::Sample),
            "sample_types" => Some(ResourceKind::SampleType),
            "studies" => Some(ResourceKind::Study),
            "projects" => Some(ResourceKind::Project),
            other => AssetCategory::from_endpoint(other).map(ResourceKind::Asset),
        }
    }

    pub fn is_asset(self) -> bool {
        matches!(self, ResourceKind::Asset(_))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assay {
    pub title: String,
    pub description: String,
    pub class: AssayClass,
    pub study_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Value of the title attribute; the catalogue derives the sample title from it.
    pub title: String,
    pub attributes: Map<String, Value>,
    pub sample_type_id: String,
    pub project_ids: Vec<String>,
    pub assay_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTypeAttribute {
    pub title: String,
    pub attribute_type: AttributeType,
    pub required: bool,
    pub is_title: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleType {
    pub title: String,
    pub description: String,
    pub attributes: Vec<SampleTypeAttribute>,
    pub project_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub category: AssetCategory,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub content_type: String,
    /// Set when the bytes stay in the LIMS and the blob only points at them.
    pub remote_url: Option<String>,
    pub data_format_annotations: Vec<String>,
    pub project_ids: Vec<String>,
    pub assay_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum TargetResource {
    Assay(Assay),
    Sample(Sample),
    SampleType(SampleType),
    Asset(Asset),
}

impl TargetResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            TargetResource::Assay(_) => ResourceKind::Assay,
            TargetResource::Sample(_) => ResourceKind::Sample,
            TargetResource::SampleType(_) => ResourceKind::SampleType,
            TargetResource::Asset(asset) => ResourceKind::Asset(asset.category),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TargetResource::Assay(assay) => &assay.title,
            TargetResource::Sample(sample) => &sample.title,
            TargetResource::SampleType(sample_type) => &sample_type.title,
            TargetResource::Asset(asset) => &asset.title,
        }
    }

    pub fn relate_to_assay(&mut self, assay_id: &str) {
        let assay_ids = match self {
            TargetResource::Sample(sample) => &mut sample.assay_ids,
            TargetResource::Asset(asset) => &mut asset.assay_ids,
            TargetResource::Assay(_) | TargetResource::SampleType(_) => return,
        };
        if !assay_ids.iter().any(|id| id == assay_id) {
            assay_ids.push(assay_id.to_string());
        }
    }

    /// JSON:API document for a create (`id == None`) or an update.
    ///
    /// Content blobs are only sent on create; the catalogue treats them as
    /// immutable afterwards.
    pub fn to_payload(&self, id: Option<&str>) -> Value {
        let (attributes, relationships) = match self {
            TargetResource::Assay(assay) => (
                json!({
                    "title": assay.title,
                    "description": assay.description,
                    "assay_class": { "key": assay.class.key },
                    "assay_type": { "uri": assay.class.type_uri },
                }),
                vec![("study", "studies", vec![assay.study_id.clone()])],
            ),
            TargetResource::Sample(sample) => (
                json!({ "attribute_map": sample.attributes }),
                vec![
                    ("sample_type", "sample_types", vec![sample.sample_type_id.clone()]),
                    ("projects", "projects", sample.project_ids.clone()),
                    ("assays", "assays", sample.assay_ids.clone()),
                ],
            ),
            TargetResource::SampleType(sample_type) => {
                let attributes: Vec<Value> = sample_type
                    .attributes
                    .iter()
                    .enumerate()
                    .map(|(pos, attribute)| {
                        json!({
                            "title": attribute.title,
                            "sample_attribute_type": attribute.attribute_type,
                            "required": attribute.required,
                            "is_title": attribute.is_title,
                            "pos": pos + 1,
                        })
                    })
                    .collect();
                (
                    json!({
                        "title": sample_type.title,
                        "description": sample_type.description,
                        "sample_attributes": attributes,
                    }),
                    vec![("projects", "projects", sample_type.project_ids.clone())],
                )
            }
            TargetResource::Asset(asset) => {
                let mut attributes = json!({
                    "title": asset.title,
                    "description": asset.description,
                    "data_format_annotations": asset.data_format_annotations,
                });
                if id.is_none() {
                    let mut blob = json!({
                        "original_filename": asset.file_name,
                        "content_type": asset.content_type,
                    });
                    if let Some(url) = &asset.remote_url {
                        blob["url"] = Value::String(url.clone());
                    }
                    attributes["content_blobs"] = json!([blob]);
                }
                (
                    attributes,
                    vec![
                        ("projects", "projects", asset.project_ids.clone()),
                        ("assays", "assays", asset.assay_ids.clone()),
                    ],
                )
            }
        };
        envelope(self.kind(), id, attributes, &relationships)
    }
}

fn envelope(
    kind: ResourceKind,
    id: Option<&str>,
    attributes: Value,
    relationships: &[(&str, &str, Vec<String>)],
) -> Value {
    let mut related = Map::new();
    for (name, target_type, ids) in relationships {
        if ids.is_empty() {
            continue;
        }
        let data: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "type": target_type }))
            .collect();
        related.insert(name.to_string(), json!({ "data": data }));
    }

    let mut data = json!({
        "type": kind.endpoint(),
        "attributes": attributes,
        "relationships": related,
    });
    if let Some(id) = id {
        data["id"] = Value::String(id.to_string());
    }
    json!({ "data": data })
}
