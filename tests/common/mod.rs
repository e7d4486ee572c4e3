#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};

use lims_sync::catalogue::{CatalogueClient, SearchHit, UploadBody, asset_url_from_blob};
use lims_sync::domain::{
    DatasetFile, LinkParent, PermId, Property, PropertyAssignment, PropertyDataType, SourceKind,
    SourceObject, SourceSampleType,
};
use lims_sync::error::SyncError;
use lims_sync::lims::LimsClient;
use lims_sync::reconcile::MergePolicyKind;
use lims_sync::register::Visibility;
use lims_sync::resource::ResourceKind;
use lims_sync::sync::{ProgressEvent, ProgressSink, SyncSettings};
use lims_sync::transfer::{MIB, TransferLimits};

pub const BASE: &str = "https://catalogue.test";
pub const ELN: &str = "https://lims.test/openbis/webapp/eln-lims";
pub const TITLE_KEY: &str = "LIMS ID";
pub const EXP1_PERM: &str = "20240117093512345-1";
pub const SAMPLE1_PERM: &str = "20240117093512345-2";
pub const DATASET1_PERM: &str = "20240117093512345-3";

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub blob_endpoint: String,
    pub bytes: usize,
    /// Staging file path when uploaded from disk.
    pub staged_path: Option<PathBuf>,
}

#[derive(Default)]
struct CatalogueState {
    next_id: u64,
    resources: BTreeMap<(String, String), Value>,
    creates: Vec<(String, Value)>,
    updates: Vec<(String, String)>,
    uploads: Vec<RecordedUpload>,
}

/// In-memory JSON:API catalogue. Search is a substring match over title and
/// description, as a full-text index would roughly behave.
pub struct MockCatalogue {
    state: Mutex<CatalogueState>,
    pub fail_uploads: bool,
}

impl Default for MockCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalogue {
    pub fn new() -> Self {
        let catalogue = Self {
            state: Mutex::new(CatalogueState {
                next_id: 100,
                ..CatalogueState::default()
            }),
            fail_uploads: false,
        };
        catalogue.seed("projects", "1", json!({ "title": "Default Project" }));
        catalogue.seed("studies", "2", json!({ "title": "Default Study" }));
        catalogue.seed("sample_types", "5", json!({ "title": "CELL_LINE" }));
        catalogue
    }

    pub fn seed(&self, endpoint: &str, id: &str, attributes: Value) {
        let data = json!({ "id": id, "type": endpoint, "attributes": attributes, "relationships": {} });
        self.state
            .lock()
            .unwrap()
            .resources
            .insert((endpoint.to_string(), id.to_string()), data);
    }

    /// Simulates a curator editing a resource in the catalogue UI.
    pub fn seed_attribute(&self, endpoint: &str, id: &str, name: &str, value: Value) {
        if let Some(data) = self
            .state
            .lock()
            .unwrap()
            .resources
            .get_mut(&(endpoint.to_string(), id.to_string()))
        {
            data["attributes"][name] = value;
        }
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .resources
            .keys()
            .filter(|(kind, _)| kind == endpoint)
            .count()
    }

    pub fn all(&self, endpoint: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .resources
            .iter()
            .filter(|((kind, _), _)| kind == endpoint)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn creates(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn derive_fields(endpoint: &str, id: &str, data: &mut Value) {
        if endpoint == "samples" {
            let title = data
                .pointer(&format!("/attributes/attribute_map/{TITLE_KEY}"))
                .cloned()
                .unwrap_or(Value::Null);
            data["attributes"]["title"] = title;
        }
        if let Some(blobs) = data
            .pointer_mut("/attributes/content_blobs")
            .and_then(Value::as_array_mut)
        {
            for (index, blob) in blobs.iter_mut().enumerate() {
                if blob.get("link").is_none() {
                    blob["link"] = json!(format!("{BASE}/{endpoint}/{id}/content_blobs/{}", index + 1));
                }
            }
        }
    }

    /// Mirrors `assays` relationships onto the assay, like the server does.
    fn link_assays(state: &mut CatalogueState, endpoint: &str, id: &str, data: &Value) {
        let assay_ids: Vec<String> = data
            .pointer("/relationships/assays/data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        for assay_id in assay_ids {
            if let Some(assay) = state
                .resources
                .get_mut(&("assays".to_string(), assay_id))
            {
                let related = assay["relationships"]
                    .as_object_mut()
                    .map(|map| map.entry(endpoint.to_string()).or_insert_with(|| json!({ "data": [] })));
                if let Some(related) = related {
                    let entry = json!({ "id": id, "type": endpoint });
                    if let Some(items) = related["data"].as_array_mut() {
                        if !items.contains(&entry) {
                            items.push(entry);
                        }
                    }
                }
            }
        }
    }

    fn matches(data: &Value, term: &str) -> bool {
        ["/attributes/title", "/attributes/description"]
            .iter()
            .filter_map(|pointer| data.pointer(pointer).and_then(Value::as_str))
            .any(|text| text.contains(term))
    }

    fn hit(data: &Value) -> SearchHit {
        SearchHit {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            title: data
                .pointer("/attributes/title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            description: data
                .pointer("/attributes/description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl CatalogueClient for MockCatalogue {
    fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id.to_string();
        let endpoint = kind.endpoint();

        let mut data = payload["data"].clone();
        data["id"] = json!(id);
        Self::derive_fields(endpoint, &id, &mut data);
        Self::link_assays(&mut state, endpoint, &id, &data);
        state.creates.push((endpoint.to_string(), data.clone()));
        state
            .resources
            .insert((endpoint.to_string(), id), data.clone());
        Ok(data)
    }

    fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> Result<Value, SyncError> {
        let mut state = self.state.lock().unwrap();
        let endpoint = kind.endpoint();
        let key = (endpoint.to_string(), id.to_string());
        let mut data = state
            .resources
            .get(&key)
            .cloned()
            .ok_or(SyncError::CatalogueStatus {
                status: 404,
                message: format!("{endpoint}/{id}"),
            })?;

        if let Some(attributes) = payload.pointer("/data/attributes").and_then(Value::as_object) {
            for (name, value) in attributes {
                data["attributes"][name] = value.clone();
            }
        }
        if let Some(relationships) = payload.pointer("/data/relationships").and_then(Value::as_object) {
            for (name, value) in relationships {
                data["relationships"][name] = value.clone();
            }
        }
        Self::derive_fields(endpoint, id, &mut data);
        Self::link_assays(&mut state, endpoint, id, &data);
        state.updates.push((endpoint.to_string(), id.to_string()));
        state.resources.insert(key, data.clone());
        Ok(data)
    }

    fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, SyncError> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&(kind.endpoint().to_string(), id.to_string()))
            .cloned()
            .ok_or(SyncError::CatalogueStatus {
                status: 404,
                message: format!("{kind}/{id}"),
            })
    }

    fn search(&self, kind: ResourceKind, query: &str) -> Result<Vec<SearchHit>, SyncError> {
        let term = query.trim_matches('*');
        Ok(self
            .all(kind.endpoint())
            .iter()
            .filter(|data| Self::matches(data, term))
            .map(Self::hit)
            .collect())
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<SearchHit>, SyncError> {
        Ok(self.all(kind.endpoint()).iter().map(Self::hit).collect())
    }

    fn upload(&self, blob_endpoint: &str, body: UploadBody<'_>) -> Result<String, SyncError> {
        if self.fail_uploads {
            return Err(SyncError::CatalogueStatus {
                status: 500,
                message: "upload rejected".to_string(),
            });
        }
        let (bytes, staged_path) = match body {
            UploadBody::Stream { open, .. } => {
                let mut buffer = Vec::new();
                open()?
                    .read_to_end(&mut buffer)
                    .map_err(|err| SyncError::Filesystem(err.to_string()))?;
                (buffer.len(), None)
            }
            UploadBody::File(path) => {
                let content = std::fs::read(path).map_err(|err| SyncError::Filesystem(err.to_string()))?;
                (content.len(), Some(path.to_path_buf()))
            }
        };
        self.state.lock().unwrap().uploads.push(RecordedUpload {
            blob_endpoint: blob_endpoint.to_string(),
            bytes,
            staged_path,
        });
        Ok(asset_url_from_blob(blob_endpoint))
    }

    fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{BASE}/{}/{id}", kind.endpoint())
    }
}

/// LIMS with a fixed set of hierarchies, keyed by path identifier and perm id.
pub struct MockLims {
    objects: HashMap<String, SourceObject>,
    sample_types: Vec<SourceSampleType>,
    pub supports_links: bool,
    links: Mutex<Vec<(LinkParent, String)>>,
    downloads: Mutex<Vec<String>>,
}

impl MockLims {
    pub fn new(roots: Vec<SourceObject>) -> Self {
        let mut objects = HashMap::new();
        for root in roots {
            objects.insert(root.identifier.clone(), root.clone());
            objects.insert(root.perm_id.to_string(), root);
        }
        Self {
            objects,
            sample_types: Vec::new(),
            supports_links: true,
            links: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sample_types(mut self, sample_types: Vec<SourceSampleType>) -> Self {
        self.sample_types = sample_types;
        self
    }

    pub fn without_links(mut self) -> Self {
        self.supports_links = false;
        self
    }

    pub fn links(&self) -> Vec<(LinkParent, String)> {
        self.links.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl LimsClient for MockLims {
    fn query_hierarchy(&self, identifier: &str) -> Result<SourceObject, SyncError> {
        self.objects
            .get(identifier)
            .cloned()
            .ok_or_else(|| SyncError::SourceNotFound(identifier.to_string()))
    }

    /// Content is a short marker; declared sizes drive the strategy.
    fn download_file(&self, dataset: &PermId, path: &str) -> Result<Box<dyn Read + Send>, SyncError> {
        self.downloads.lock().unwrap().push(format!("{dataset}/{path}"));
        Ok(Box::new(Cursor::new(format!("content of {path}").into_bytes())))
    }

    fn create_link_object(&self, parent: &LinkParent, url: &str) -> Result<(), SyncError> {
        self.links
            .lock()
            .unwrap()
            .push((parent.clone(), url.to_string()));
        Ok(())
    }

    fn supports_kind(&self, _kind: &str) -> Result<bool, SyncError> {
        Ok(self.supports_links)
    }

    fn list_sample_types(&self) -> Result<Vec<SourceSampleType>, SyncError> {
        Ok(self.sample_types.clone())
    }
}

pub fn settings(staging_dir: PathBuf) -> SyncSettings {
    SyncSettings {
        eln_url: ELN.to_string(),
        title_attribute: TITLE_KEY.to_string(),
        default_project: "Default Project".to_string(),
        default_study: "Default Study".to_string(),
        limits: TransferLimits::default(),
        staging_dir,
        visibility: Visibility {
            attempts: 2,
            interval: Duration::from_millis(0),
        },
        merge_policy: MergePolicyKind::Append,
    }
}

pub fn perm(value: &str) -> PermId {
    value.parse().unwrap()
}

pub fn property(code: &str, value: &str) -> Property {
    Property {
        code: code.to_string(),
        label: None,
        data_type: PropertyDataType::Varchar,
        value: value.to_string(),
    }
}

pub fn dataset(perm_id: &str, type_code: &str, owner: LinkParent, files: &[(&str, u64)]) -> SourceObject {
    SourceObject {
        kind: SourceKind::Dataset,
        perm_id: perm(perm_id),
        identifier: perm_id.to_string(),
        code: perm_id.to_string(),
        type_code: type_code.to_string(),
        properties: Vec::new(),
        children: Vec::new(),
        files: files
            .iter()
            .map(|(path, size)| DatasetFile {
                path: path.to_string(),
                size: *size,
                is_directory: false,
                dataset: perm(perm_id),
            })
            .collect(),
        owner: Some(owner),
    }
}

/// `EXP1` with one `CELL_LINE` sample holding one `RAW_DATA` dataset of a 10 MiB file.
pub fn exp1() -> SourceObject {
    let sample_parent = LinkParent {
        kind: SourceKind::Sample,
        identifier: "/SPACE/SAMPLE1".to_string(),
    };
    let sample = SourceObject {
        kind: SourceKind::Sample,
        perm_id: perm(SAMPLE1_PERM),
        identifier: "/SPACE/SAMPLE1".to_string(),
        code: "SAMPLE1".to_string(),
        type_code: "CELL_LINE".to_string(),
        properties: vec![property("ORGANISM", "human")],
        children: vec![dataset(
            DATASET1_PERM,
            "RAW_DATA",
            sample_parent,
            &[("original/reads.fastq.gz", 10 * MIB)],
        )],
        files: Vec::new(),
        owner: None,
    };
    SourceObject {
        kind: SourceKind::Experiment,
        perm_id: perm(EXP1_PERM),
        identifier: "/SPACE/PROJECT/EXP1".to_string(),
        code: "EXP1".to_string(),
        type_code: "01_BIOLOGICAL_EXPERIMENT".to_string(),
        properties: vec![property("GOAL", "baseline")],
        children: vec![sample],
        files: Vec::new(),
        owner: None,
    }
}

pub fn cell_line_type() -> SourceSampleType {
    SourceSampleType {
        code: "CELL_LINE".to_string(),
        description: Some("Cell line".to_string()),
        properties: vec![PropertyAssignment {
            code: "ORGANISM".to_string(),
            label: Some("Organism".to_string()),
            data_type: PropertyDataType::ControlledVocabulary,
            mandatory: true,
        }],
    }
}
