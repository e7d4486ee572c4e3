use serde::Serialize;
use tracing::{debug, info};

use crate::catalogue::{CatalogueClient, id_of};
use crate::domain::{PropertyDataType, SourceSampleType};
use crate::error::SyncError;
use crate::lims::LimsClient;
use crate::mapper::Mapper;
use crate::resource::{ResourceKind, SampleType, SampleTypeAttribute, TargetResource};

#[derive(Debug, Clone, Serialize)]
pub struct CreatedSampleType {
    pub code: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleTypeReport {
    pub created: Vec<CreatedSampleType>,
    pub existing: Vec<String>,
    pub skipped_material: Vec<String>,
}

/// Copies LIMS sample type schemas into catalogue sample types.
pub struct SampleTypeTransfer<'a, L: LimsClient + ?Sized, C: CatalogueClient + ?Sized> {
    lims: &'a L,
    catalogue: &'a C,
    mapper: &'a Mapper,
    title_attribute: &'a str,
    project_id: &'a str,
}

impl<'a, L: LimsClient + ?Sized, C: CatalogueClient + ?Sized> SampleTypeTransfer<'a, L, C> {
    pub fn new(
        lims: &'a L,
        catalogue: &'a C,
        mapper: &'a Mapper,
        title_attribute: &'a str,
        project_id: &'a str,
    ) -> Self {
        Self {
            lims,
            catalogue,
            mapper,
            title_attribute,
            project_id,
        }
    }

    /// The title attribute always comes first and carries the LIMS identifier.
    pub fn translate(&self, source: &SourceSampleType) -> SampleType {
        let mut attributes = vec![SampleTypeAttribute {
            title: self.title_attribute.to_string(),
            attribute_type: self.mapper.attribute_type_for(PropertyDataType::Varchar),
            required: true,
            is_title: true,
        }];
        for assignment in &source.properties {
            let title = assignment
                .label
                .as_deref()
                .filter(|label| !label.trim().is_empty())
                .unwrap_or(&assignment.code);
            if title == self.title_attribute {
                continue;
            }
            attributes.push(SampleTypeAttribute {
                title: title.to_string(),
                attribute_type: self.mapper.attribute_type_for(assignment.data_type),
                required: assignment.mandatory,
                is_title: false,
            });
        }

        SampleType {
            title: source.code.clone(),
            description: source.description.clone().unwrap_or_default(),
            attributes,
            project_ids: vec![self.project_id.to_string()],
        }
    }

    pub fn run(&self, ignore_existing: bool) -> Result<SampleTypeReport, SyncError> {
        let existing: Vec<String> = self
            .catalogue
            .list(ResourceKind::SampleType)?
            .into_iter()
            .map(|hit| hit.title)
            .collect();
        let mut report = SampleTypeReport::default();

        for source in self.lims.list_sample_types()? {
            if source.is_material() {
                debug!("skipping material type {}", source.code);
                report.skipped_material.push(source.code);
                continue;
            }
            if !ignore_existing && existing.contains(&source.code) {
                info!("sample type {} already exists", source.code);
                report.existing.push(source.code);
                continue;
            }

            let resource = TargetResource::SampleType(self.translate(&source));
            let data = self.catalogue.create(resource.kind(), &resource.to_payload(None))?;
            let id = id_of(&data).ok_or_else(|| {
                SyncError::MalformedResponse(format!("sample type {} created without id", source.code))
            })?;
            let url = self.catalogue.resource_url(ResourceKind::SampleType, &id);
            info!("created sample type {} at {url}", source.code);
            report.created.push(CreatedSampleType {
                code: source.code,
                url,
            });
        }
        Ok(report)
    }
}
