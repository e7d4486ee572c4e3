use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{LinkParent, SourceKind};
use crate::error::SyncError;
use crate::lims::{LINK_KIND, LimsClient};
use crate::register::PostRegistrationInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenLink {
    pub parent: LinkParent,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkBackOutcome {
    /// True when the LIMS has no link object kind and nothing was written.
    pub unsupported: bool,
    pub links: Vec<WrittenLink>,
}

/// Writes catalogue URLs back into the LIMS, one link object per created resource.
pub struct LinkBackWriter<'a, L: LimsClient + ?Sized> {
    lims: &'a L,
}

impl<'a, L: LimsClient + ?Sized> LinkBackWriter<'a, L> {
    pub fn new(lims: &'a L) -> Self {
        Self { lims }
    }

    pub fn write_links(&self, registered: &PostRegistrationInfo) -> Result<LinkBackOutcome, SyncError> {
        let mut outcome = LinkBackOutcome::default();
        if !self.lims.supports_kind(LINK_KIND)? {
            warn!("LIMS has no {LINK_KIND} sample type; skipping link-back");
            outcome.unsupported = true;
            return Ok(outcome);
        }

        let mut pending: Vec<(&LinkParent, &str)> = Vec::new();
        if let Some(top) = registered.top.as_ref().filter(|top| top.created) {
            pending.push((&top.parent, &top.url));
        }
        for sample in &registered.created_samples {
            pending.push((&sample.parent, &sample.url));
        }
        for asset in &registered.created_assets {
            match &asset.owner {
                Some(owner) if owner.kind != SourceKind::Dataset => pending.push((owner, &asset.url)),
                _ => debug!("no link parent for {}", asset.file.path),
            }
        }

        for (parent, url) in pending {
            self.lims.create_link_object(parent, url)?;
            info!("linked {} {} -> {url}", parent.kind, parent.identifier);
            outcome.links.push(WrittenLink {
                parent: parent.clone(),
                url: url.to_string(),
            });
        }
        Ok(outcome)
    }
}
