use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

static PERM_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9]{17}-[0-9]+\b").unwrap());

/// Immutable, globally unique identifier the LIMS assigns to experiments,
/// samples and datasets, e.g. `20240117093512345-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermId(String);

impl PermId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the first identifier-shaped substring of free text.
    pub fn find_in(text: &str) -> Option<PermId> {
        PERM_ID
            .find(text)
            .map(|found| PermId(found.as_str().to_string()))
    }

    /// True when `text` carries this exact identifier as a token, so `-1`
    /// does not match inside `-12`.
    pub fn occurs_in(&self, text: &str) -> bool {
        PERM_ID
            .find_iter(text)
            .any(|found| found.as_str() == self.0)
    }
}

impl fmt::Display for PermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PermId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = PERM_ID
            .find(trimmed)
            .map(|found| found.start() == 0 && found.end() == trimmed.len())
            .unwrap_or(false);
        if !is_valid {
            return Err(SyncError::InvalidPermId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Experiment,
    Sample,
    Dataset,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Experiment => write!(f, "experiment"),
            SourceKind::Sample => write!(f, "sample"),
            SourceKind::Dataset => write!(f, "dataset"),
        }
    }
}

/// Data types a LIMS property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyDataType {
    Integer,
    Real,
    Varchar,
    MultilineVarchar,
    Boolean,
    Timestamp,
    Date,
    #[serde(rename = "CONTROLLEDVOCABULARY")]
    ControlledVocabulary,
    Sample,
    Hyperlink,
    Xml,
}

impl FromStr for PropertyDataType {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "INTEGER" => Ok(PropertyDataType::Integer),
            "REAL" => Ok(PropertyDataType::Real),
            "VARCHAR" => Ok(PropertyDataType::Varchar),
            "MULTILINE_VARCHAR" => Ok(PropertyDataType::MultilineVarchar),
            "BOOLEAN" => Ok(PropertyDataType::Boolean),
            "TIMESTAMP" => Ok(PropertyDataType::Timestamp),
            "DATE" => Ok(PropertyDataType::Date),
            "CONTROLLEDVOCABULARY" => Ok(PropertyDataType::ControlledVocabulary),
            "SAMPLE" => Ok(PropertyDataType::Sample),
            "HYPERLINK" => Ok(PropertyDataType::Hyperlink),
            "XML" => Ok(PropertyDataType::Xml),
            other => Err(SyncError::UnmappedType {
                kind: "property data",
                code: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub code: String,
    pub label: Option<String>,
    pub data_type: PropertyDataType,
    pub value: String,
}

impl Property {
    /// Human-readable key, falling back to the property code.
    pub fn display_key(&self) -> &str {
        self.label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(&self.code)
    }
}

/// The LIMS object a link or an asset hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkParent {
    pub kind: SourceKind,
    pub identifier: String,
}

impl LinkParent {
    pub fn of(object: &SourceObject) -> Self {
        Self {
            kind: object.kind,
            identifier: object.identifier.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub dataset: PermId,
}

impl DatasetFile {
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    pub kind: SourceKind,
    pub perm_id: PermId,
    /// Path-style identifier, e.g. `/SPACE/PROJECT/EXP1`.
    pub identifier: String,
    pub code: String,
    pub type_code: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub children: Vec<SourceObject>,
    #[serde(default)]
    pub files: Vec<DatasetFile>,
    /// Closest sample or experiment, for datasets.
    #[serde(default)]
    pub owner: Option<LinkParent>,
}

impl SourceObject {
    pub fn children_of_kind(&self, kind: SourceKind) -> impl Iterator<Item = &SourceObject> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    pub fn property(&self, code: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAssignment {
    pub code: String,
    pub label: Option<String>,
    pub data_type: PropertyDataType,
    pub mandatory: bool,
}

/// A LIMS sample type with its property schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSampleType {
    pub code: String,
    pub description: Option<String>,
    pub properties: Vec<PropertyAssignment>,
}

impl SourceSampleType {
    pub fn is_material(&self) -> bool {
        self.code.starts_with("MATERIAL.")
    }
}

/// Dataset identifiers excluded entirely from a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist(HashSet<String>);

impl Blacklist {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(codes.into_iter().map(Into::into).collect())
    }

    /// One identifier per line; surrounding whitespace and blank lines are ignored.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        )
    }

    pub fn contains(&self, dataset: &PermId) -> bool {
        self.0.contains(dataset.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_perm_id_valid() {
        let id: PermId = " 20240117093512345-12 ".parse().unwrap();
        assert_eq!(id.as_str(), "20240117093512345-12");
    }

    #[test]
    fn parse_perm_id_rejects_surrounding_text() {
        let err = "EXP1 (20240117093512345-12)".parse::<PermId>().unwrap_err();
        assert_matches!(err, SyncError::InvalidPermId(_));
    }

    #[test]
    fn find_perm_id_in_text() {
        let found = PermId::find_in("EXP1 (20240117093512345-12)").unwrap();
        assert_eq!(found.as_str(), "20240117093512345-12");
        assert!(PermId::find_in("no identifier here").is_none());
    }

    #[test]
    fn blacklist_skips_blank_lines() {
        let blacklist = Blacklist::parse("  20240117093512345-1\n\n20240117093512345-2  \n");
        assert_eq!(blacklist.len(), 2);
        assert!(blacklist.contains(&"20240117093512345-2".parse().unwrap()));
    }

    #[test]
    fn file_name_is_last_segment() {
        let file = DatasetFile {
            path: "original/run1/reads.fastq.gz".to_string(),
            size: 10,
            is_directory: false,
            dataset: "20240117093512345-3".parse().unwrap(),
        };
        assert_eq!(file.file_name(), "reads.fastq.gz");
    }
}
