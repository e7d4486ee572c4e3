use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalogue::{CatalogueClient, SearchHit, id_of};
use crate::domain::PermId;
use crate::error::SyncError;
use crate::mapper::AssetCategory;
use crate::resource::ResourceKind;

/// A catalogue resource as read back, with the LIMS identifier it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistingResource {
    pub id: String,
    pub kind: ResourceKind,
    pub title: String,
    pub description: String,
    pub attributes: Map<String, Value>,
    /// Path identifier for samples, perm id for everything else.
    pub source_id: Option<String>,
    pub file_name: Option<String>,
}

impl ExistingResource {
    pub fn from_data(kind: ResourceKind, data: &Value) -> Result<Self, SyncError> {
        let id = id_of(data)
            .ok_or_else(|| SyncError::MalformedResponse(format!("{kind} without id")))?;
        let text = |pointer: &str| {
            data.pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let title = text("/attributes/title");
        let description = text("/attributes/description");
        let attributes = data
            .pointer("/attributes/attribute_map")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let file_name = data
            .pointer("/attributes/content_blobs/0/original_filename")
            .and_then(Value::as_str)
            .map(str::to_string);

        let source_id = match kind {
            ResourceKind::Sample => Some(title.clone()).filter(|title| !title.is_empty()),
            _ => PermId::find_in(&title)
                .or_else(|| PermId::find_in(&description))
                .map(|perm_id| perm_id.to_string()),
        };

        Ok(Self {
            id,
            kind,
            title,
            description,
            attributes,
            source_id,
            file_name,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExistingNodeInfo {
    pub top: Option<ExistingResource>,
    pub samples: Vec<ExistingResource>,
    pub assets: Vec<ExistingResource>,
}

pub struct Locator<'a, C: CatalogueClient + ?Sized> {
    catalogue: &'a C,
}

impl<'a, C: CatalogueClient + ?Sized> Locator<'a, C> {
    pub fn new(catalogue: &'a C) -> Self {
        Self { catalogue }
    }

    /// Id of the single resource of `kind` built from `identifier`, if any.
    pub fn find(&self, kind: ResourceKind, identifier: &str) -> Result<Option<String>, SyncError> {
        let hits = self.catalogue.search(kind, &format!("*{identifier}*"))?;
        let mut ids: Vec<String> = hits
            .into_iter()
            .filter(|hit| embeds(kind, hit, identifier))
            .map(|hit| hit.id)
            .collect();
        ids.sort();
        ids.dedup();
        debug!("{} {kind} match(es) for {identifier}", ids.len());

        match ids.len() {
            0 => Ok(None),
            1 => Ok(ids.pop()),
            _ => Err(SyncError::AmbiguousMatch {
                kind: kind.to_string(),
                identifier: identifier.to_string(),
                ids,
            }),
        }
    }

    pub fn read(&self, kind: ResourceKind, id: &str) -> Result<ExistingResource, SyncError> {
        let data = self.catalogue.read(kind, id)?;
        ExistingResource::from_data(kind, &data)
    }

    /// Reads a top-level resource. Assays bring their related samples and assets.
    pub fn read_back(&self, kind: ResourceKind, id: &str) -> Result<ExistingNodeInfo, SyncError> {
        let data = self.catalogue.read(kind, id)?;
        let top = ExistingResource::from_data(kind, &data)?;
        let mut info = ExistingNodeInfo::default();

        if kind == ResourceKind::Assay {
            for sample_id in related_ids(&data, "samples") {
                info.samples.push(self.read(ResourceKind::Sample, &sample_id)?);
            }
            for category in AssetCategory::ALL {
                for asset_id in related_ids(&data, category.endpoint()) {
                    info.assets.push(self.read(ResourceKind::Asset(category), &asset_id)?);
                }
            }
        }

        info.top = Some(top);
        Ok(info)
    }

    /// Assets of any category whose title or description embeds one of the datasets.
    pub fn find_assets(&self, datasets: &[PermId]) -> Result<Vec<ExistingResource>, SyncError> {
        let wanted: BTreeSet<&str> = datasets.iter().map(PermId::as_str).collect();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for dataset in &wanted {
            for category in AssetCategory::ALL {
                let kind = ResourceKind::Asset(category);
                for hit in self.catalogue.search(kind, &format!("*{dataset}*"))? {
                    if !seen.insert((kind, hit.id.clone())) {
                        continue;
                    }
                    let existing = self.read(kind, &hit.id)?;
                    if existing
                        .source_id
                        .as_deref()
                        .is_some_and(|source| wanted.contains(source))
                    {
                        found.push(existing);
                    }
                }
            }
        }
        Ok(found)
    }
}

/// Samples are titled by their identifier. Everything else counts when the
/// perm id appears as a whole token in the title or the description.
fn embeds(kind: ResourceKind, hit: &SearchHit, identifier: &str) -> bool {
    match kind {
        ResourceKind::Sample => hit.title == identifier,
        _ => identifier.parse::<PermId>().is_ok_and(|perm_id| {
            perm_id.occurs_in(&hit.title) || perm_id.occurs_in(&hit.description)
        }),
    }
}

fn related_ids(data: &Value, relationship: &str) -> Vec<String> {
    data.pointer(&format!("/relationships/{relationship}/data"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_of).collect())
        .unwrap_or_default()
}
