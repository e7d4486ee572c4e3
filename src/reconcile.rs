use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::locator::{ExistingNodeInfo, ExistingResource};
use crate::resource::{ResourceKind, TargetResource};
use crate::translate::{AssetNode, SampleNode, TargetStructure, TopLevel};

/// Combines a value already in the catalogue with a freshly translated one.
pub trait MergePolicy: Send + Sync {
    fn merge_value(&self, existing: &Value, new: &Value) -> Value;

    fn merge_text(&self, existing: &str, new: &str) -> String {
        let merged = self.merge_value(
            &Value::String(existing.to_string()),
            &Value::String(new.to_string()),
        );
        match merged {
            Value::String(text) => text,
            other => other.to_string(),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Text form of a scalar. Arrays and objects have none.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Never loses curated values: when both sides are set and differ, the new
/// value is appended to the existing one.
#[derive(Debug, Clone)]
pub struct AppendMerge {
    separator: String,
}

impl Default for AppendMerge {
    fn default() -> Self {
        Self {
            separator: ", ".to_string(),
        }
    }
}

impl AppendMerge {
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl MergePolicy for AppendMerge {
    fn merge_value(&self, existing: &Value, new: &Value) -> Value {
        if is_blank(existing) {
            return new.clone();
        }
        if is_blank(new) {
            return existing.clone();
        }
        let (Some(old), Some(incoming)) = (scalar_text(existing), scalar_text(new)) else {
            return existing.clone();
        };
        if old == incoming {
            return existing.clone();
        }
        Value::String(format!("{old}{}{incoming}", self.separator))
    }
}

/// Like [`AppendMerge`], but splits both values on the separator and only
/// appends the segments of the new value that are not present yet.
#[derive(Debug, Clone)]
pub struct AppendNewSegments {
    separator: String,
}

impl Default for AppendNewSegments {
    fn default() -> Self {
        Self {
            separator: ", ".to_string(),
        }
    }
}

impl MergePolicy for AppendNewSegments {
    fn merge_value(&self, existing: &Value, new: &Value) -> Value {
        if is_blank(existing) {
            return new.clone();
        }
        if is_blank(new) {
            return existing.clone();
        }
        let (Some(old), Some(incoming)) = (scalar_text(existing), scalar_text(new)) else {
            return existing.clone();
        };

        let separator = match self.separator.trim() {
            "" => self.separator.as_str(),
            trimmed => trimmed,
        };
        let present: Vec<&str> = old.split(separator).map(str::trim).collect();
        let missing: Vec<&str> = incoming
            .split(separator)
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && !present.contains(segment))
            .collect();
        if missing.is_empty() {
            return existing.clone();
        }

        let mut merged = old;
        for segment in missing {
            merged.push_str(&self.separator);
            merged.push_str(segment);
        }
        Value::String(merged)
    }
}

/// Non-blank translated values replace what the catalogue holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferNew;

impl MergePolicy for PreferNew {
    fn merge_value(&self, existing: &Value, new: &Value) -> Value {
        if is_blank(new) {
            existing.clone()
        } else {
            new.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MergePolicyKind {
    #[default]
    Append,
    AppendNewSegments,
    PreferNew,
}

impl MergePolicyKind {
    pub fn policy(self) -> Box<dyn MergePolicy> {
        match self {
            MergePolicyKind::Append => Box::new(AppendMerge::default()),
            MergePolicyKind::AppendNewSegments => Box::new(AppendNewSegments::default()),
            MergePolicyKind::PreferNew => Box::new(PreferNew),
        }
    }
}

impl FromStr for MergePolicyKind {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "append" => Ok(MergePolicyKind::Append),
            "append_new_segments" | "append-new-segments" => Ok(MergePolicyKind::AppendNewSegments),
            "prefer_new" | "prefer-new" => Ok(MergePolicyKind::PreferNew),
            other => Err(SyncError::InvalidConfig(format!("unknown merge policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum ChildNode {
    Sample(SampleNode),
    Asset(AssetNode),
}

impl ChildNode {
    pub fn resource(&self) -> TargetResource {
        match self {
            ChildNode::Sample(node) => TargetResource::Sample(node.sample.clone()),
            ChildNode::Asset(node) => TargetResource::Asset(node.asset.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedUpdate {
    pub id: String,
    pub kind: ResourceKind,
    pub node: ChildNode,
    /// False when merging left the catalogue values untouched.
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum TopPlan {
    None,
    Create(TopLevel),
    Update {
        id: String,
        top: TopLevel,
        changed: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    pub top: TopPlan,
    pub to_create: Vec<ChildNode>,
    pub to_update: Vec<PlannedUpdate>,
}

impl ReconcilePlan {
    pub fn created_count(&self) -> usize {
        self.to_create.len() + usize::from(matches!(self.top, TopPlan::Create(_)))
    }
}

pub struct Reconciler<'a> {
    policy: &'a dyn MergePolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(policy: &'a dyn MergePolicy) -> Self {
        Self { policy }
    }

    /// Splits the translated structure into creates and merged updates.
    /// Catalogue resources without a translated counterpart are left alone.
    pub fn reconcile(&self, new: TargetStructure, existing: &ExistingNodeInfo) -> ReconcilePlan {
        let top = match (new.top, &existing.top) {
            (None, _) => TopPlan::None,
            (Some(top), None) => TopPlan::Create(top),
            (Some(mut top), Some(current)) => {
                let changed = self.merge_into(&mut top.resource, current);
                TopPlan::Update {
                    id: current.id.clone(),
                    top,
                    changed,
                }
            }
        };

        let mut to_create = Vec::new();
        let mut to_update = Vec::new();

        for mut node in new.samples {
            let matched = existing
                .samples
                .iter()
                .find(|current| current.source_id.as_deref() == Some(node.source.as_str()));
            match matched {
                Some(current) => {
                    let mut resource = TargetResource::Sample(node.sample.clone());
                    let changed = self.merge_into(&mut resource, current);
                    if let TargetResource::Sample(sample) = resource {
                        node.sample = sample;
                    }
                    to_update.push(PlannedUpdate {
                        id: current.id.clone(),
                        kind: current.kind,
                        node: ChildNode::Sample(node),
                        changed,
                    });
                }
                None => to_create.push(ChildNode::Sample(node)),
            }
        }

        for mut node in new.assets {
            let matched = existing.assets.iter().find(|current| {
                current.source_id.as_deref() == Some(node.file.dataset.as_str())
                    && current.file_name.as_deref().unwrap_or(current.title.as_str())
                        == node.file.file_name()
            });
            match matched {
                Some(current) => {
                    let mut resource = TargetResource::Asset(node.asset.clone());
                    let changed = self.merge_into(&mut resource, current);
                    if let TargetResource::Asset(asset) = resource {
                        node.asset = asset;
                    }
                    to_update.push(PlannedUpdate {
                        id: current.id.clone(),
                        kind: current.kind,
                        node: ChildNode::Asset(node),
                        changed,
                    });
                }
                None => to_create.push(ChildNode::Asset(node)),
            }
        }

        ReconcilePlan {
            top,
            to_create,
            to_update,
        }
    }

    /// Folds the catalogue state into `resource`; returns whether anything
    /// differs from what the catalogue holds.
    fn merge_into(&self, resource: &mut TargetResource, current: &ExistingResource) -> bool {
        match resource {
            TargetResource::Assay(assay) => {
                assay.description = self.policy.merge_text(&current.description, &assay.description);
                assay.description != current.description
            }
            TargetResource::Asset(asset) => {
                asset.description = self.policy.merge_text(&current.description, &asset.description);
                asset.description != current.description
            }
            TargetResource::Sample(sample) => {
                let merged = self.merge_attributes(&current.attributes, &sample.attributes);
                let changed = merged != current.attributes;
                sample.attributes = merged;
                changed
            }
            TargetResource::SampleType(_) => false,
        }
    }

    fn merge_attributes(&self, existing: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = existing.clone();
        for (key, value) in new {
            let combined = match existing.get(key) {
                Some(current) => self.policy.merge_value(current, value),
                None => value.clone(),
            };
            merged.insert(key.clone(), combined);
        }
        merged
    }
}
