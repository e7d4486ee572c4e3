use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::Blacklist;
use crate::error::SyncError;
use crate::mapper::AssetCategory;
use crate::reconcile::MergePolicyKind;
use crate::register::Visibility;
use crate::transfer::{MIB, TransferLimits};

pub const CONFIG_FILE: &str = "lims-sync.json";
pub const LIMS_TOKEN_VAR: &str = "LIMS_SESSION_TOKEN";
pub const CATALOGUE_PASSWORD_VAR: &str = "CATALOGUE_PASSWORD";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub lims: LimsSection,
    pub catalogue: CatalogueSection,
    #[serde(default)]
    pub sample_title_attribute: Option<String>,
    #[serde(default)]
    pub transfer: Option<TransferSection>,
    #[serde(default)]
    pub visibility: Option<VisibilitySection>,
    #[serde(default)]
    pub merge_policy: Option<String>,
    #[serde(default)]
    pub asset_categories: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LimsSection {
    pub url: String,
    pub dss_url: String,
    #[serde(default)]
    pub eln_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogueSection {
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub default_project: Option<String>,
    #[serde(default)]
    pub default_study: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TransferSection {
    #[serde(default)]
    pub stream_below_mib: Option<u64>,
    #[serde(default)]
    pub skip_above_mib: Option<u64>,
    #[serde(default)]
    pub staging_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VisibilitySection {
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LimsSettings {
    pub url: String,
    pub dss_url: String,
    pub eln_url: String,
}

#[derive(Debug, Clone)]
pub struct CatalogueSettings {
    pub url: String,
    pub user: String,
    /// Titles, resolved to ids against the catalogue at run time.
    pub default_project: String,
    pub default_study: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub lims: LimsSettings,
    pub catalogue: CatalogueSettings,
    pub title_attribute: String,
    pub limits: TransferLimits,
    pub staging_dir: Utf8PathBuf,
    pub visibility: Visibility,
    pub merge_policy: MergePolicyKind,
    pub asset_categories: Vec<(String, AssetCategory)>,
}

/// Credentials are never stored in the config file.
#[derive(Clone)]
pub struct Secrets {
    pub lims_token: String,
    pub catalogue_password: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, SyncError> {
        let read = |name: &str| {
            env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SyncError::InvalidConfig(format!("environment variable {name} is not set")))
        };
        Ok(Self {
            lims_token: read(LIMS_TOKEN_VAR)?,
            catalogue_password: read(CATALOGUE_PASSWORD_VAR)?,
        })
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(SyncError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SyncError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Working directory first, then the per-user config directory.
    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("lims-sync").join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SyncError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let default_project = required_default(config.catalogue.default_project, "default_project")?;
        let default_study = required_default(config.catalogue.default_study, "default_study")?;
        let lims_url = required_url(config.lims.url, "lims.url")?;
        let dss_url = required_url(config.lims.dss_url, "lims.dss_url")?;
        let catalogue_url = required_url(config.catalogue.url, "catalogue.url")?;
        let eln_url = match config.lims.eln_url {
            Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => default_eln_url(&lims_url),
        };

        let transfer = config.transfer.unwrap_or_default();
        let defaults = TransferLimits::default();
        let limits = TransferLimits {
            stream_below: mib_to_bytes(transfer.stream_below_mib, "transfer.stream_below_mib")?
                .unwrap_or(defaults.stream_below),
            skip_above: mib_to_bytes(transfer.skip_above_mib, "transfer.skip_above_mib")?
                .unwrap_or(defaults.skip_above),
        };
        if limits.stream_below > limits.skip_above {
            return Err(SyncError::InvalidConfig(
                "transfer.stream_below_mib must not exceed transfer.skip_above_mib".to_string(),
            ));
        }
        let staging_dir = match transfer.staging_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => Utf8PathBuf::from_path_buf(env::temp_dir()).map_err(|_| {
                SyncError::InvalidConfig("temporary directory is not valid UTF-8".to_string())
            })?,
        };

        let visibility_section = config.visibility.unwrap_or_default();
        let visibility_defaults = Visibility::default();
        let visibility = Visibility {
            attempts: visibility_section
                .attempts
                .unwrap_or(visibility_defaults.attempts),
            interval: visibility_section
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(visibility_defaults.interval),
        };

        let merge_policy = match config.merge_policy {
            Some(policy) => policy.parse()?,
            None => MergePolicyKind::default(),
        };

        let asset_categories = config
            .asset_categories
            .into_iter()
            .map(|(code, category)| Ok((code, category.parse::<AssetCategory>()?)))
            .collect::<Result<Vec<_>, SyncError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            lims: LimsSettings {
                url: lims_url,
                dss_url,
                eln_url,
            },
            catalogue: CatalogueSettings {
                url: catalogue_url,
                user: config.catalogue.user,
                default_project,
                default_study,
            },
            title_attribute: config
                .sample_title_attribute
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| "LIMS ID".to_string()),
            limits,
            staging_dir,
            visibility,
            merge_policy,
            asset_categories,
        })
    }
}

pub fn load_blacklist(path: &str) -> Result<Blacklist, SyncError> {
    let content =
        fs::read_to_string(path).map_err(|_| SyncError::BlacklistRead(PathBuf::from(path)))?;
    Ok(Blacklist::parse(&content))
}

fn required_default(value: Option<String>, name: &str) -> Result<String, SyncError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SyncError::MissingDefault(format!("catalogue.{name}")))
}

fn mib_to_bytes(value: Option<u64>, name: &str) -> Result<Option<u64>, SyncError> {
    value
        .map(|mib| {
            mib.checked_mul(MIB)
                .ok_or_else(|| SyncError::InvalidConfig(format!("{name} is too large")))
        })
        .transpose()
}

fn required_url(value: String, name: &str) -> Result<String, SyncError> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SyncError::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// `https://host/openbis/openbis` -> `https://host/openbis/webapp/eln-lims`
fn default_eln_url(lims_url: &str) -> String {
    let base = lims_url
        .strip_suffix("/openbis/openbis")
        .or_else(|| lims_url.strip_suffix("/openbis"))
        .unwrap_or(lims_url);
    format!("{base}/openbis/webapp/eln-lims")
}
