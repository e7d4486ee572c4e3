use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Blacklist, DatasetFile, LinkParent, PropertyDataType, SourceKind, SourceObject};
use crate::error::SyncError;
use crate::mapper::Mapper;
use crate::resource::{Assay, Asset, Sample, TargetResource};

/// Catalogue context every translated resource is attached to.
#[derive(Debug, Clone)]
pub struct TranslateSettings {
    pub eln_url: String,
    pub title_attribute: String,
    pub project_id: String,
    pub study_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopLevel {
    pub resource: TargetResource,
    /// Perm id for experiments, path identifier for samples.
    pub source: String,
    pub parent: LinkParent,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleNode {
    pub sample: Sample,
    /// Path identifier of the LIMS sample.
    pub source: String,
    pub parent: LinkParent,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetNode {
    pub asset: Asset,
    pub file: DatasetFile,
    /// LIMS object a link for this asset is written under.
    pub owner: Option<LinkParent>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetStructure {
    pub top: Option<TopLevel>,
    pub samples: Vec<SampleNode>,
    pub assets: Vec<AssetNode>,
}

impl TargetStructure {
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.samples.is_empty() && self.assets.is_empty()
    }
}

pub fn sample_page_url(eln_url: &str, perm_or_identifier: &str) -> String {
    format!(
        "{}/?menuUniqueId=null&viewName=showViewSamplePageFromPermId&viewData={}",
        eln_url.trim_end_matches('/'),
        perm_or_identifier
    )
}

pub fn dataset_page_url(eln_url: &str, perm_id: &str) -> String {
    format!(
        "{}/?menuUniqueId=null&viewName=showViewDataSetPageFromPermId&viewData={}",
        eln_url.trim_end_matches('/'),
        perm_id
    )
}

pub struct Translator<'a> {
    mapper: &'a Mapper,
    settings: &'a TranslateSettings,
}

impl<'a> Translator<'a> {
    pub fn new(mapper: &'a Mapper, settings: &'a TranslateSettings) -> Self {
        Self { mapper, settings }
    }

    /// Builds the catalogue graph for one LIMS hierarchy. Any unmapped type
    /// fails the whole translation.
    pub fn translate(
        &self,
        source: &SourceObject,
        sample_types: &HashMap<String, String>,
        blacklist: &Blacklist,
        transfer_files: bool,
    ) -> Result<TargetStructure, SyncError> {
        let mut structure = TargetStructure::default();

        match source.kind {
            SourceKind::Experiment => {
                let class = self.mapper.assay_class_for(&source.type_code)?;
                let assay = Assay {
                    title: assay_title(&source.code, source.perm_id.as_str()),
                    description: self.describe_properties(source),
                    class,
                    study_id: self.settings.study_id.clone(),
                };
                structure.top = Some(TopLevel {
                    resource: TargetResource::Assay(assay),
                    source: source.perm_id.to_string(),
                    parent: LinkParent::of(source),
                });

                for sample in source.children_of_kind(SourceKind::Sample) {
                    structure.samples.push(SampleNode {
                        sample: self.translate_sample(sample, sample_types)?,
                        source: sample.identifier.clone(),
                        parent: LinkParent::of(sample),
                    });
                    self.collect_assets(sample, blacklist, transfer_files, &mut structure)?;
                }
                self.collect_assets(source, blacklist, transfer_files, &mut structure)?;
            }
            SourceKind::Sample => {
                structure.top = Some(TopLevel {
                    resource: TargetResource::Sample(self.translate_sample(source, sample_types)?),
                    source: source.identifier.clone(),
                    parent: LinkParent::of(source),
                });
                self.collect_assets(source, blacklist, transfer_files, &mut structure)?;
            }
            SourceKind::Dataset => {
                self.dataset_assets(source, source.owner.clone(), blacklist, transfer_files, &mut structure)?;
            }
        }

        debug!(
            samples = structure.samples.len(),
            assets = structure.assets.len(),
            "translated {}",
            source.identifier
        );
        Ok(structure)
    }

    fn translate_sample(
        &self,
        sample: &SourceObject,
        sample_types: &HashMap<String, String>,
    ) -> Result<Sample, SyncError> {
        let sample_type_id = sample_types
            .get(&sample.type_code)
            .cloned()
            .ok_or_else(|| SyncError::UnmappedType {
                kind: "sample",
                code: sample.type_code.clone(),
            })?;

        let mut attributes = Map::new();
        for property in &sample.properties {
            let value = match property.data_type {
                PropertyDataType::Sample => sample_page_url(&self.settings.eln_url, &property.value),
                _ => property.value.clone(),
            };
            attributes.insert(property.display_key().to_string(), Value::String(value));
        }
        attributes.insert(
            self.settings.title_attribute.clone(),
            Value::String(sample.identifier.clone()),
        );

        Ok(Sample {
            title: sample.identifier.clone(),
            attributes,
            sample_type_id,
            project_ids: vec![self.settings.project_id.clone()],
            assay_ids: Vec::new(),
        })
    }

    fn collect_assets(
        &self,
        holder: &SourceObject,
        blacklist: &Blacklist,
        transfer_files: bool,
        structure: &mut TargetStructure,
    ) -> Result<(), SyncError> {
        for dataset in holder.children_of_kind(SourceKind::Dataset) {
            let owner = dataset.owner.clone().or_else(|| Some(LinkParent::of(holder)));
            self.dataset_assets(dataset, owner, blacklist, transfer_files, structure)?;
        }
        Ok(())
    }

    fn dataset_assets(
        &self,
        dataset: &SourceObject,
        owner: Option<LinkParent>,
        blacklist: &Blacklist,
        transfer_files: bool,
        structure: &mut TargetStructure,
    ) -> Result<(), SyncError> {
        if blacklist.contains(&dataset.perm_id) {
            debug!("skipping blacklisted dataset {}", dataset.perm_id);
            return Ok(());
        }
        let category = self.mapper.asset_category_for(&dataset.type_code)?;
        let dataset_url = dataset_page_url(&self.settings.eln_url, dataset.perm_id.as_str());

        for file in dataset.files.iter().filter(|file| !file.is_directory) {
            let file_name = file.file_name().to_string();
            let asset = Asset {
                category,
                title: file_name.clone(),
                description: format!("File from dataset {} ({})", dataset.perm_id, dataset_url),
                content_type: self.mapper.content_type_for(&file_name).to_string(),
                remote_url: (!transfer_files).then(|| dataset_url.clone()),
                data_format_annotations: self
                    .mapper
                    .data_format_annotation_for(&file_name)
                    .map(|annotation| vec![annotation.to_string()])
                    .unwrap_or_default(),
                project_ids: vec![self.settings.project_id.clone()],
                assay_ids: Vec::new(),
                file_name,
            };
            structure.assets.push(AssetNode {
                asset,
                file: file.clone(),
                owner: owner.clone(),
            });
        }
        Ok(())
    }

    fn describe_properties(&self, source: &SourceObject) -> String {
        source
            .properties
            .iter()
            .filter(|property| !property.value.trim().is_empty())
            .map(|property| format!("{}: {}", property.display_key(), property.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Human code plus perm id. The perm id in the title is what later runs
/// search for.
pub fn assay_title(code: &str, perm_id: &str) -> String {
    format!("{code} ({perm_id})")
}
