use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalogue::{CatalogueClient, blob_endpoint_of, id_of};
use crate::domain::{DatasetFile, LinkParent};
use crate::error::SyncError;
use crate::reconcile::{ChildNode, ReconcilePlan, TopPlan};
use crate::resource::{ResourceKind, TargetResource};
use crate::transfer::AssetToUpload;

/// How long to wait for a new top-level resource to show up in search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredTop {
    pub source: String,
    pub parent: LinkParent,
    pub kind: ResourceKind,
    pub id: String,
    pub url: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredSample {
    pub source: String,
    pub parent: LinkParent,
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredAsset {
    pub file: DatasetFile,
    pub owner: Option<LinkParent>,
    pub id: String,
    pub url: String,
    /// Present when the bytes still have to be uploaded.
    pub blob_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostRegistrationInfo {
    pub top: Option<RegisteredTop>,
    pub created_samples: Vec<RegisteredSample>,
    pub created_assets: Vec<RegisteredAsset>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl PostRegistrationInfo {
    pub fn assets_to_upload(&self) -> Vec<AssetToUpload> {
        self.created_assets
            .iter()
            .filter_map(|asset| {
                Some(AssetToUpload {
                    blob_endpoint: asset.blob_endpoint.clone()?,
                    dataset: asset.file.dataset.clone(),
                    file_path: asset.file.path.clone(),
                    size: asset.file.size,
                })
            })
            .collect()
    }

    /// Urls of everything this run touched, top level first.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.top.iter().map(|top| top.url.clone()).collect();
        urls.extend(self.created_samples.iter().map(|sample| sample.url.clone()));
        urls.extend(self.created_assets.iter().map(|asset| asset.url.clone()));
        urls.extend(self.updated.iter().cloned());
        urls.dedup();
        urls
    }
}

pub struct Registrar<'a, C: CatalogueClient + ?Sized> {
    catalogue: &'a C,
    visibility: Visibility,
}

impl<'a, C: CatalogueClient + ?Sized> Registrar<'a, C> {
    pub fn new(catalogue: &'a C, visibility: Visibility) -> Self {
        Self {
            catalogue,
            visibility,
        }
    }

    pub fn register(&self, plan: ReconcilePlan) -> Result<PostRegistrationInfo, SyncError> {
        let mut info = PostRegistrationInfo::default();

        let top = match plan.top {
            TopPlan::None => None,
            TopPlan::Create(top) => {
                let kind = top.resource.kind();
                let data = self.catalogue.create(kind, &top.resource.to_payload(None))?;
                let id = created_id(kind, &data)?;
                let url = self.catalogue.resource_url(kind, &id);
                info!("created {kind} {url}");
                self.wait_until_visible(kind, &top.source, &id);
                Some(RegisteredTop {
                    source: top.source,
                    parent: top.parent,
                    kind,
                    id,
                    url,
                    created: true,
                })
            }
            TopPlan::Update { id, top, changed } => {
                let kind = top.resource.kind();
                let url = self.catalogue.resource_url(kind, &id);
                if changed {
                    self.catalogue.update(kind, &id, &top.resource.to_payload(Some(&id)))?;
                    info!("updated {kind} {url}");
                    info.updated.push(url.clone());
                } else {
                    debug!("{kind} {url} unchanged");
                    info.unchanged.push(url.clone());
                }
                Some(RegisteredTop {
                    source: top.source,
                    parent: top.parent,
                    kind,
                    id,
                    url,
                    created: false,
                })
            }
        };
        let assay_id = top
            .as_ref()
            .filter(|top| top.kind == ResourceKind::Assay)
            .map(|top| top.id.clone());
        info.top = top;

        for node in plan.to_create {
            let mut resource = node.resource();
            if let Some(assay_id) = &assay_id {
                resource.relate_to_assay(assay_id);
            }
            let kind = resource.kind();
            let data = self.catalogue.create(kind, &resource.to_payload(None))?;
            let id = created_id(kind, &data)?;
            let url = self.catalogue.resource_url(kind, &id);
            info!("created {kind} {url}");

            match node {
                ChildNode::Sample(sample) => info.created_samples.push(RegisteredSample {
                    source: sample.source,
                    parent: sample.parent,
                    id,
                    url,
                }),
                ChildNode::Asset(asset) => {
                    let blob_endpoint = match asset.asset.remote_url {
                        Some(_) => None,
                        None => Some(blob_endpoint_of(&data).ok_or_else(|| {
                            SyncError::MalformedResponse(format!("{kind} {id} has no content blob link"))
                        })?),
                    };
                    info.created_assets.push(RegisteredAsset {
                        file: asset.file,
                        owner: asset.owner,
                        id,
                        url,
                        blob_endpoint,
                    });
                }
            }
        }

        for update in plan.to_update {
            let url = self.catalogue.resource_url(update.kind, &update.id);
            if !update.changed {
                debug!("{} {url} unchanged", update.kind);
                info.unchanged.push(url);
                continue;
            }
            let mut resource: TargetResource = update.node.resource();
            if let Some(assay_id) = &assay_id {
                resource.relate_to_assay(assay_id);
            }
            self.catalogue
                .update(update.kind, &update.id, &resource.to_payload(Some(&update.id)))?;
            info!("updated {} {url}", update.kind);
            info.updated.push(url);
        }

        Ok(info)
    }

    /// Search indexes lag behind creates. Only asks whether `id` is among the
    /// hits; duplicates from earlier runs do not matter here, and a failing
    /// search counts as not yet visible. A resource that never shows up is
    /// reported and the run continues.
    fn wait_until_visible(&self, kind: ResourceKind, source: &str, id: &str) {
        let query = format!("*{source}*");
        for attempt in 1..=self.visibility.attempts {
            match self.catalogue.search(kind, &query) {
                Ok(hits) if hits.iter().any(|hit| hit.id == id) => {
                    debug!("{kind} {id} searchable after {attempt} attempt(s)");
                    return;
                }
                Ok(_) => {}
                Err(err) => debug!("search for {kind} {id} failed: {err}"),
            }
            thread::sleep(self.visibility.interval);
        }
        warn!(
            "{kind} {id} not searchable after {} attempts; continuing",
            self.visibility.attempts
        );
    }
}

fn created_id(kind: ResourceKind, data: &Value) -> Result<String, SyncError> {
    id_of(data).ok_or_else(|| SyncError::MalformedResponse(format!("{kind} created without id")))
}
