use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalogue::{CatalogueClient, UploadBody};
use crate::domain::PermId;
use crate::error::SyncError;
use crate::lims::LimsClient;

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferLimits {
    /// Files smaller than this are piped straight from the LIMS into the upload.
    pub stream_below: u64,
    /// Files larger than this are never moved.
    pub skip_above: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            stream_below: 500 * MIB,
            skip_above: 1024 * MIB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferStrategy {
    Stream,
    Staged,
    Skip,
}

impl TransferLimits {
    pub fn strategy_for(&self, size: u64) -> TransferStrategy {
        if size > self.skip_above {
            TransferStrategy::Skip
        } else if size >= self.stream_below {
            TransferStrategy::Staged
        } else {
            TransferStrategy::Stream
        }
    }
}

/// A created asset whose content blob still waits for its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetToUpload {
    pub blob_endpoint: String,
    pub dataset: PermId,
    pub file_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub dataset: PermId,
    pub file_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferOutcome {
    pub uploaded: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

pub struct TransferOrchestrator<'a, L: LimsClient + ?Sized, C: CatalogueClient + ?Sized> {
    lims: &'a L,
    catalogue: &'a C,
    limits: TransferLimits,
    staging_dir: PathBuf,
}

impl<'a, L: LimsClient + ?Sized, C: CatalogueClient + ?Sized> TransferOrchestrator<'a, L, C> {
    pub fn new(lims: &'a L, catalogue: &'a C, limits: TransferLimits, staging_dir: PathBuf) -> Self {
        Self {
            lims,
            catalogue,
            limits,
            staging_dir,
        }
    }

    /// Moves every file in order. The first failure aborts the rest of the batch.
    pub fn transfer(&self, assets: &[AssetToUpload]) -> Result<TransferOutcome, SyncError> {
        let mut outcome = TransferOutcome::default();
        for asset in assets {
            let strategy = self.limits.strategy_for(asset.size);
            info!(
                size = asset.size,
                "transfer {}/{} ({strategy:?})",
                asset.dataset,
                asset.file_path
            );
            let url = match strategy {
                TransferStrategy::Skip => {
                    warn!(
                        "skipping {} from dataset {}: {} bytes exceeds the limit of {} bytes",
                        asset.file_path, asset.dataset, asset.size, self.limits.skip_above
                    );
                    outcome.skipped.push(SkippedFile {
                        dataset: asset.dataset.clone(),
                        file_path: asset.file_path.clone(),
                        size: asset.size,
                    });
                    continue;
                }
                TransferStrategy::Stream => self.stream(asset),
                TransferStrategy::Staged => self.staged(asset),
            }
            .map_err(|err| match err {
                SyncError::Upload { .. } => err,
                other => SyncError::Upload {
                    file: format!("{}/{}", asset.dataset, asset.file_path),
                    message: other.to_string(),
                },
            })?;
            outcome.uploaded.push(url);
        }
        Ok(outcome)
    }

    fn stream(&self, asset: &AssetToUpload) -> Result<String, SyncError> {
        let body = UploadBody::Stream {
            size: asset.size,
            open: Box::new(|| self.lims.download_file(&asset.dataset, &asset.file_path)),
        };
        self.catalogue.upload(&asset.blob_endpoint, body)
    }

    /// The staging file is removed when it drops, whether or not the upload succeeded.
    fn staged(&self, asset: &AssetToUpload) -> Result<String, SyncError> {
        fs::create_dir_all(&self.staging_dir).map_err(|err| staging_error(&self.staging_dir, err))?;
        let mut staged = tempfile::Builder::new()
            .prefix("lims-sync-")
            .tempfile_in(&self.staging_dir)
            .map_err(|err| staging_error(&self.staging_dir, err))?;

        let mut reader = self.lims.download_file(&asset.dataset, &asset.file_path)?;
        io::copy(&mut reader, staged.as_file_mut())
            .and_then(|_| staged.as_file_mut().flush())
            .map_err(|err| staging_error(staged.path(), err))?;

        self.catalogue
            .upload(&asset.blob_endpoint, UploadBody::File(staged.path()))
    }
}

fn staging_error(path: &Path, err: io::Error) -> SyncError {
    SyncError::Filesystem(format!("{}: {err}", path.display()))
}
