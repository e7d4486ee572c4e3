use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::{
    DatasetFile, LinkParent, PermId, Property, PropertyAssignment, PropertyDataType, SourceKind,
    SourceObject, SourceSampleType,
};
use crate::error::SyncError;

pub const LINK_KIND: &str = "EXTERNAL_LINK";

pub trait LimsClient: Send + Sync {
    /// The object with all its descendants, properties and dataset files.
    fn query_hierarchy(&self, identifier: &str) -> Result<SourceObject, SyncError>;
    fn download_file(&self, dataset: &PermId, path: &str) -> Result<Box<dyn Read + Send>, SyncError>;
    fn create_link_object(&self, parent: &LinkParent, url: &str) -> Result<(), SyncError>;
    fn supports_kind(&self, kind: &str) -> Result<bool, SyncError>;
    fn list_sample_types(&self) -> Result<Vec<SourceSampleType>, SyncError>;
}

/// Client for the LIMS JSON-RPC v3 API of the application and data store servers.
#[derive(Clone)]
pub struct LimsHttpClient {
    client: Client,
    app_url: String,
    dss_url: String,
    token: String,
}

impl LimsHttpClient {
    pub fn new(app_url: &str, dss_url: &str, token: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lims-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::LimsHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| SyncError::LimsHttp(err.to_string()))?;
        Ok(Self {
            client,
            app_url: app_url.trim_end_matches('/').to_string(),
            dss_url: dss_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn handle_status(response: Response) -> Result<Response, SyncError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "LIMS request failed".to_string());
        Err(SyncError::LimsStatus { status, message })
    }

    fn call(&self, endpoint: &str, method: &str, params: Vec<Value>) -> Result<Value, SyncError> {
        let mut all = vec![Value::String(self.token.clone())];
        all.extend(params);
        let body = json!({ "id": "1", "jsonrpc": "2.0", "method": method, "params": all });
        debug!("LIMS {method}");

        let response = self
            .client
            .post(endpoint)
            .timeout(Duration::from_secs(120))
            .json(&body)
            .send()
            .map_err(|err| SyncError::LimsHttp(err.to_string()))?;
        let mut document: Value = Self::handle_status(response)?
            .json()
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;
        if let Some(error) = document.get("error") {
            return Err(SyncError::LimsHttp(format!("{method}: {error}")));
        }
        document
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| SyncError::MalformedResponse(format!("{method}: missing result")))
    }

    fn app(&self, method: &str, params: Vec<Value>) -> Result<Value, SyncError> {
        self.call(
            &format!("{}/rmi-application-server-v3.json", self.app_url),
            method,
            params,
        )
    }

    fn dss(&self, method: &str, params: Vec<Value>) -> Result<Value, SyncError> {
        self.call(
            &format!("{}/rmi-data-store-server-v3.json", self.dss_url),
            method,
            params,
        )
    }

    fn fetch_one(&self, method: &str, id: Value, options: Value) -> Result<Option<(Value, RefTable)>, SyncError> {
        let result = self.app(method, vec![json!([id]), options])?;
        let refs = RefTable::collect(&result);
        let found = result
            .as_object()
            .and_then(|map| map.values().next())
            .map(|value| refs.resolve(value).clone());
        Ok(found.map(|value| (value, refs)))
    }

    fn experiment(&self, identifier: &str) -> Result<Option<SourceObject>, SyncError> {
        let Some((value, refs)) = self.fetch_one("getExperiments", object_id("experiment", identifier), experiment_fetch_options())? else {
            return Ok(None);
        };
        self.build_object(SourceKind::Experiment, &value, &refs, None).map(Some)
    }

    fn sample(&self, identifier: &str) -> Result<Option<SourceObject>, SyncError> {
        let Some((value, refs)) = self.fetch_one("getSamples", object_id("sample", identifier), sample_fetch_options())? else {
            return Ok(None);
        };
        self.build_object(SourceKind::Sample, &value, &refs, None).map(Some)
    }

    fn dataset(&self, identifier: &str) -> Result<Option<SourceObject>, SyncError> {
        if identifier.parse::<PermId>().is_err() {
            return Ok(None);
        }
        let Some((value, refs)) = self.fetch_one("getDataSets", object_id("dataset", identifier), dataset_fetch_options())? else {
            return Ok(None);
        };
        self.build_object(SourceKind::Dataset, &value, &refs, None).map(Some)
    }

    fn build_object(
        &self,
        kind: SourceKind,
        value: &Value,
        refs: &RefTable,
        holder: Option<&LinkParent>,
    ) -> Result<SourceObject, SyncError> {
        let perm_id: PermId = text(refs.resolve(&value["permId"]), "permId").parse()?;
        let identifier = match kind {
            SourceKind::Dataset => perm_id.to_string(),
            _ => text(refs.resolve(&value["identifier"]), "identifier"),
        };
        let mut object = SourceObject {
            kind,
            perm_id,
            identifier,
            code: text(value, "code"),
            type_code: text(refs.resolve(&value["type"]), "code"),
            properties: parse_properties(value, refs),
            children: Vec::new(),
            files: Vec::new(),
            owner: None,
        };
        let this = LinkParent::of(&object);

        match kind {
            SourceKind::Experiment => {
                for sample in related(value, refs, "samples") {
                    object.children.push(self.build_object(SourceKind::Sample, sample, refs, Some(&this))?);
                }
                // Datasets hanging off samples are reached through the samples.
                for dataset in related(value, refs, "dataSets")
                    .filter(|dataset| refs.resolve(&dataset["sample"]).is_null())
                {
                    object.children.push(self.build_object(SourceKind::Dataset, dataset, refs, Some(&this))?);
                }
            }
            SourceKind::Sample => {
                for dataset in related(value, refs, "dataSets") {
                    object.children.push(self.build_object(SourceKind::Dataset, dataset, refs, Some(&this))?);
                }
            }
            SourceKind::Dataset => {
                object.owner = owner_of(value, refs).or_else(|| holder.cloned());
                object.files = self.search_files(&object.perm_id)?;
            }
        }
        Ok(object)
    }

    fn search_files(&self, dataset: &PermId) -> Result<Vec<DatasetFile>, SyncError> {
        let criteria = json!({
            "@type": "dss.dto.datasetfile.search.DataSetFileSearchCriteria",
            "operator": "AND",
            "criteria": [{
                "@type": "as.dto.dataset.search.DataSetSearchCriteria",
                "relation": "DATASET",
                "operator": "OR",
                "criteria": [{
                    "@type": "as.dto.common.search.PermIdSearchCriteria",
                    "fieldValue": { "@type": "as.dto.common.search.StringEqualToValue", "value": dataset.as_str() }
                }]
            }]
        });
        let options = json!({ "@type": "dss.dto.datasetfile.fetchoptions.DataSetFileFetchOptions" });
        let result = self.dss("searchFiles", vec![criteria, options])?;

        Ok(result["objects"]
            .as_array()
            .map(|files| {
                files
                    .iter()
                    .map(|file| DatasetFile {
                        path: text(file, "path"),
                        size: file["fileLength"].as_u64().unwrap_or(0),
                        is_directory: file["directory"].as_bool().unwrap_or(false),
                        dataset: dataset.clone(),
                    })
                    .filter(|file| !file.path.is_empty())
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl LimsClient for LimsHttpClient {
    fn query_hierarchy(&self, identifier: &str) -> Result<SourceObject, SyncError> {
        let identifier = identifier.trim();
        if let Some(object) = self.experiment(identifier)? {
            return Ok(object);
        }
        if let Some(object) = self.sample(identifier)? {
            return Ok(object);
        }
        if let Some(object) = self.dataset(identifier)? {
            return Ok(object);
        }
        Err(SyncError::SourceNotFound(identifier.to_string()))
    }

    fn download_file(&self, dataset: &PermId, path: &str) -> Result<Box<dyn Read + Send>, SyncError> {
        let url = format!("{}/{}/{}", self.dss_url, dataset, path.trim_start_matches('/'));
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .query(&[("sessionID", self.token.as_str())])
            .send()
            .map_err(|err| SyncError::LimsHttp(err.to_string()))?;
        Ok(Box::new(Self::handle_status(response)?))
    }

    fn create_link_object(&self, parent: &LinkParent, url: &str) -> Result<(), SyncError> {
        let space = parent
            .identifier
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|space| !space.is_empty())
            .ok_or_else(|| SyncError::LimsHttp(format!("no space in {}", parent.identifier)))?;

        let mut creation = json!({
            "@type": "as.dto.sample.create.SampleCreation",
            "typeId": { "@type": "as.dto.entitytype.id.EntityTypePermId", "permId": LINK_KIND, "entityKind": "SAMPLE" },
            "spaceId": { "@type": "as.dto.space.id.SpacePermId", "permId": space },
            "properties": { "LINK_TYPE": "SEEK", "URL": url },
        });
        match parent.kind {
            SourceKind::Experiment => {
                creation["experimentId"] = object_id("experiment", &parent.identifier);
            }
            SourceKind::Sample => {
                creation["parentIds"] = json!([object_id("sample", &parent.identifier)]);
            }
            SourceKind::Dataset => {
                return Err(SyncError::LimsHttp(format!(
                    "link objects cannot be attached to dataset {}",
                    parent.identifier
                )));
            }
        }
        self.app("createSamples", vec![json!([creation])])?;
        Ok(())
    }

    fn supports_kind(&self, kind: &str) -> Result<bool, SyncError> {
        let id = json!({ "@type": "as.dto.entitytype.id.EntityTypePermId", "permId": kind, "entityKind": "SAMPLE" });
        let options = json!({ "@type": "as.dto.sample.fetchoptions.SampleTypeFetchOptions" });
        let result = self.app("getSampleTypes", vec![json!([id]), options])?;
        Ok(result.as_object().is_some_and(|types| !types.is_empty()))
    }

    fn list_sample_types(&self) -> Result<Vec<SourceSampleType>, SyncError> {
        let criteria = json!({ "@type": "as.dto.sample.search.SampleTypeSearchCriteria" });
        let options = json!({
            "@type": "as.dto.sample.fetchoptions.SampleTypeFetchOptions",
            "propertyAssignments": {
                "@type": "as.dto.property.fetchoptions.PropertyAssignmentFetchOptions",
                "propertyType": { "@type": "as.dto.property.fetchoptions.PropertyTypeFetchOptions" }
            }
        });
        let result = self.app("searchSampleTypes", vec![criteria, options])?;
        let refs = RefTable::collect(&result);

        let types = result["objects"].as_array().cloned().unwrap_or_default();
        Ok(types
            .iter()
            .map(|sample_type| {
                let sample_type = refs.resolve(sample_type);
                SourceSampleType {
                    code: text(sample_type, "code"),
                    description: sample_type["description"].as_str().map(str::to_string),
                    properties: assignments(sample_type, &refs)
                        .map(|(assignment, property_type)| PropertyAssignment {
                            code: text(property_type, "code"),
                            label: property_type["label"].as_str().map(str::to_string),
                            data_type: data_type_of(property_type),
                            mandatory: assignment["mandatory"].as_bool().unwrap_or(false),
                        })
                        .collect(),
                }
            })
            .collect())
    }
}

/// Objects the server already sent once come back as their numeric `@id`.
struct RefTable(HashMap<u64, Value>);

impl RefTable {
    fn collect(root: &Value) -> Self {
        let mut table = HashMap::new();
        let mut stack = vec![root];
        while let Some(value) = stack.pop() {
            match value {
                Value::Object(map) => {
                    if let Some(id) = map.get("@id").and_then(Value::as_u64) {
                        table.entry(id).or_insert_with(|| value.clone());
                    }
                    stack.extend(map.values());
                }
                Value::Array(items) => stack.extend(items.iter()),
                _ => {}
            }
        }
        Self(table)
    }

    fn resolve<'v>(&'v self, value: &'v Value) -> &'v Value {
        value
            .as_u64()
            .and_then(|id| self.0.get(&id))
            .unwrap_or(value)
    }
}

fn text(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("permId")
            .or_else(|| map.get("identifier"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn related<'v>(value: &'v Value, refs: &'v RefTable, key: &str) -> impl Iterator<Item = &'v Value> {
    value[key]
        .as_array()
        .map(|items| items.as_slice())
        .unwrap_or_default()
        .iter()
        .map(move |item| refs.resolve(item))
}

fn assignments<'v>(entity_type: &'v Value, refs: &'v RefTable) -> impl Iterator<Item = (&'v Value, &'v Value)> {
    related(entity_type, refs, "propertyAssignments")
        .map(move |assignment| (assignment, refs.resolve(&assignment["propertyType"])))
}

fn data_type_of(property_type: &Value) -> PropertyDataType {
    property_type["dataType"]
        .as_str()
        .and_then(|code| code.parse().ok())
        .unwrap_or(PropertyDataType::Varchar)
}

fn parse_properties(value: &Value, refs: &RefTable) -> Vec<Property> {
    let entity_type = refs.resolve(&value["type"]);
    let Some(values) = value["properties"].as_object() else {
        return Vec::new();
    };
    let mut properties: Vec<Property> = assignments(entity_type, refs)
        .filter_map(|(_, property_type)| {
            let code = text(property_type, "code");
            let value = values.get(&code)?.as_str()?.to_string();
            Some(Property {
                label: property_type["label"].as_str().map(str::to_string),
                data_type: data_type_of(property_type),
                code,
                value,
            })
        })
        .collect();

    // Values without a fetched assignment are kept as plain text.
    for (code, raw) in values {
        if properties.iter().any(|property| &property.code == code) {
            continue;
        }
        if let Some(raw) = raw.as_str() {
            properties.push(Property {
                code: code.clone(),
                label: None,
                data_type: PropertyDataType::Varchar,
                value: raw.to_string(),
            });
        }
    }
    properties
}

fn owner_of(dataset: &Value, refs: &RefTable) -> Option<LinkParent> {
    let sample = refs.resolve(&dataset["sample"]);
    if sample.is_object() {
        return Some(LinkParent {
            kind: SourceKind::Sample,
            identifier: text(sample, "identifier"),
        });
    }
    let experiment = refs.resolve(&dataset["experiment"]);
    experiment.is_object().then(|| LinkParent {
        kind: SourceKind::Experiment,
        identifier: text(experiment, "identifier"),
    })
}

fn object_id(entity: &str, identifier: &str) -> Value {
    let is_perm_id = identifier.parse::<PermId>().is_ok();
    match (entity, is_perm_id) {
        ("experiment", true) => json!({ "@type": "as.dto.experiment.id.ExperimentPermId", "permId": identifier }),
        ("experiment", false) => json!({ "@type": "as.dto.experiment.id.ExperimentIdentifier", "identifier": identifier }),
        ("sample", true) => json!({ "@type": "as.dto.sample.id.SamplePermId", "permId": identifier }),
        ("sample", false) => json!({ "@type": "as.dto.sample.id.SampleIdentifier", "identifier": identifier }),
        _ => json!({ "@type": "as.dto.dataset.id.DataSetPermId", "permId": identifier }),
    }
}

fn type_fetch_options(entity: &str) -> Value {
    json!({
        "@type": format!("as.dto.{entity}.fetchoptions.{}TypeFetchOptions", capitalize(entity)),
        "propertyAssignments": {
            "@type": "as.dto.property.fetchoptions.PropertyAssignmentFetchOptions",
            "propertyType": { "@type": "as.dto.property.fetchoptions.PropertyTypeFetchOptions" }
        }
    })
}

fn dataset_fetch_options() -> Value {
    json!({
        "@type": "as.dto.dataset.fetchoptions.DataSetFetchOptions",
        "type": type_fetch_options("dataset"),
        "properties": { "@type": "as.dto.property.fetchoptions.PropertyFetchOptions" },
        "sample": { "@type": "as.dto.sample.fetchoptions.SampleFetchOptions" },
        "experiment": { "@type": "as.dto.experiment.fetchoptions.ExperimentFetchOptions" }
    })
}

fn sample_fetch_options() -> Value {
    json!({
        "@type": "as.dto.sample.fetchoptions.SampleFetchOptions",
        "type": type_fetch_options("sample"),
        "properties": { "@type": "as.dto.property.fetchoptions.PropertyFetchOptions" },
        "dataSets": dataset_fetch_options()
    })
}

fn experiment_fetch_options() -> Value {
    json!({
        "@type": "as.dto.experiment.fetchoptions.ExperimentFetchOptions",
        "type": type_fetch_options("experiment"),
        "properties": { "@type": "as.dto.property.fetchoptions.PropertyFetchOptions" },
        "samples": sample_fetch_options(),
        "dataSets": dataset_fetch_options()
    })
}

fn capitalize(entity: &str) -> String {
    match entity {
        "dataset" => "DataSet".to_string(),
        other => {
            let mut chars = other.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect())
                .unwrap_or_default()
        }
    }
}
