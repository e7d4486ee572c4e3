use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::catalogue::CatalogueClient;
use crate::config::ResolvedConfig;
use crate::domain::{Blacklist, PermId, SourceKind};
use crate::error::SyncError;
use crate::lims::LimsClient;
use crate::linkback::{LinkBackOutcome, LinkBackWriter};
use crate::locator::{ExistingNodeInfo, Locator};
use crate::mapper::Mapper;
use crate::reconcile::{MergePolicyKind, Reconciler};
use crate::register::{PostRegistrationInfo, Registrar, Visibility};
use crate::resource::ResourceKind;
use crate::sample_types::{SampleTypeReport, SampleTypeTransfer};
use crate::transfer::{TransferLimits, TransferOrchestrator, TransferOutcome};
use crate::translate::{TargetStructure, TranslateSettings, Translator};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub eln_url: String,
    pub title_attribute: String,
    pub default_project: String,
    pub default_study: String,
    pub limits: TransferLimits,
    pub staging_dir: PathBuf,
    pub visibility: Visibility,
    pub merge_policy: MergePolicyKind,
}

impl SyncSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            eln_url: config.lims.eln_url.clone(),
            title_attribute: config.title_attribute.clone(),
            default_project: config.catalogue.default_project.clone(),
            default_study: config.catalogue.default_study.clone(),
            limits: config.limits,
            staging_dir: config.staging_dir.clone().into_std_path_buf(),
            visibility: config.visibility,
            merge_policy: config.merge_policy,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Upload file bytes; otherwise assets only point back at the LIMS.
    pub transfer_data: bool,
    pub blacklist: Blacklist,
    /// Look for resources from earlier runs and update them instead of creating duplicates.
    pub update_existing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub identifier: String,
    pub source_kind: SourceKind,
    pub urls: Vec<String>,
    pub registered: PostRegistrationInfo,
    pub transfer: Option<TransferOutcome>,
    pub link_back: LinkBackOutcome,
    /// RFC 3339, UTC.
    pub finished_at: String,
}

pub struct Synchronizer<L: LimsClient, C: CatalogueClient> {
    lims: L,
    catalogue: C,
    mapper: Mapper,
    settings: SyncSettings,
}

impl<L: LimsClient, C: CatalogueClient> Synchronizer<L, C> {
    pub fn new(lims: L, catalogue: C, mapper: Mapper, settings: SyncSettings) -> Self {
        Self {
            lims,
            catalogue,
            mapper,
            settings,
        }
    }

    pub fn lims(&self) -> &L {
        &self.lims
    }

    pub fn catalogue(&self) -> &C {
        &self.catalogue
    }

    /// Mirrors one LIMS object and everything below it into the catalogue.
    pub fn transfer_object(
        &self,
        identifier: &str,
        options: &TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, SyncError> {
        let start = Instant::now();

        phase(sink, "phase=Resolve; catalogue defaults".to_string());
        let project_id = self.project_id()?;
        let study_id = self.study_id()?;

        phase(sink, format!("phase=Query; {identifier}"));
        let source = self.lims.query_hierarchy(identifier)?;
        info!("found {} {}", source.kind, source.identifier);

        phase(sink, "phase=Translate; mapping to catalogue resources".to_string());
        let translate_settings = TranslateSettings {
            eln_url: self.settings.eln_url.clone(),
            title_attribute: self.settings.title_attribute.clone(),
            project_id,
            study_id,
        };
        let structure = Translator::new(&self.mapper, &translate_settings).translate(
            &source,
            &self.sample_type_ids()?,
            &options.blacklist,
            options.transfer_data,
        )?;

        let existing = if options.update_existing {
            phase(sink, "phase=Locate; looking for earlier transfers".to_string());
            self.locate(&structure)?
        } else {
            ExistingNodeInfo::default()
        };

        phase(sink, "phase=Reconcile; merging with catalogue state".to_string());
        let policy = self.settings.merge_policy.policy();
        let plan = Reconciler::new(policy.as_ref()).reconcile(structure, &existing);
        info!(
            create = plan.created_count(),
            update = plan.to_update.len(),
            "reconciled {identifier}"
        );

        phase(sink, "phase=Register; writing catalogue resources".to_string());
        let registered = Registrar::new(&self.catalogue, self.settings.visibility).register(plan)?;

        let transfer = if options.transfer_data {
            let uploads = registered.assets_to_upload();
            phase(sink, format!("phase=Transfer; {} file(s)", uploads.len()));
            let orchestrator = TransferOrchestrator::new(
                &self.lims,
                &self.catalogue,
                self.settings.limits,
                self.settings.staging_dir.clone(),
            );
            Some(orchestrator.transfer(&uploads)?)
        } else {
            None
        };

        phase(sink, "phase=LinkBack; writing links into the LIMS".to_string());
        let link_back = LinkBackWriter::new(&self.lims).write_links(&registered)?;

        sink.event(ProgressEvent {
            message: format!("phase=Done; {identifier}"),
            elapsed: Some(start.elapsed()),
        });

        Ok(TransferReport {
            identifier: identifier.to_string(),
            source_kind: source.kind,
            urls: registered.urls(),
            registered,
            transfer,
            link_back,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn transfer_sample_types(
        &self,
        ignore_existing: bool,
        sink: &dyn ProgressSink,
    ) -> Result<SampleTypeReport, SyncError> {
        phase(sink, "phase=Resolve; catalogue defaults".to_string());
        let project_id = self.project_id()?;
        phase(sink, "phase=Register; sample types".to_string());
        SampleTypeTransfer::new(
            &self.lims,
            &self.catalogue,
            &self.mapper,
            &self.settings.title_attribute,
            &project_id,
        )
        .run(ignore_existing)
    }

    fn project_id(&self) -> Result<String, SyncError> {
        let title = &self.settings.default_project;
        self.catalogue
            .list(ResourceKind::Project)?
            .into_iter()
            .find(|hit| &hit.title == title)
            .map(|hit| hit.id)
            .ok_or_else(|| SyncError::MissingDefault(format!("project '{title}' not found in catalogue")))
    }

    fn study_id(&self) -> Result<String, SyncError> {
        let title = &self.settings.default_study;
        self.catalogue
            .search(ResourceKind::Study, title)?
            .into_iter()
            .find(|hit| &hit.title == title)
            .map(|hit| hit.id)
            .ok_or_else(|| SyncError::MissingDefault(format!("study '{title}' not found in catalogue")))
    }

    /// LIMS sample type code -> catalogue sample type id, matched by title.
    fn sample_type_ids(&self) -> Result<HashMap<String, String>, SyncError> {
        Ok(self
            .catalogue
            .list(ResourceKind::SampleType)?
            .into_iter()
            .map(|hit| (hit.title, hit.id))
            .collect())
    }

    fn locate(&self, structure: &TargetStructure) -> Result<ExistingNodeInfo, SyncError> {
        let locator = Locator::new(&self.catalogue);
        let mut existing = ExistingNodeInfo::default();

        if let Some(top) = &structure.top {
            let kind = top.resource.kind();
            if let Some(id) = locator.find(kind, &top.source)? {
                existing = locator.read_back(kind, &id)?;
            }
        }

        // Assets hang off the assay; anything else has to be searched for directly.
        let is_assay = structure
            .top
            .as_ref()
            .is_some_and(|top| top.resource.kind() == ResourceKind::Assay);
        if !is_assay && !structure.assets.is_empty() {
            let mut datasets: Vec<PermId> = structure
                .assets
                .iter()
                .map(|node| node.file.dataset.clone())
                .collect();
            datasets.sort();
            datasets.dedup();
            existing.assets = locator.find_assets(&datasets)?;
        }
        Ok(existing)
    }
}
