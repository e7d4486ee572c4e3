use assert_matches::assert_matches;

use lims_sync::domain::{Blacklist, PermId, PropertyDataType, SourceSampleType};
use lims_sync::error::SyncError;

#[test]
fn parse_perm_id_valid() {
    let id: PermId = "20240117093512345-1".parse().unwrap();
    assert_eq!(id.as_str(), "20240117093512345-1");
    assert_eq!(id.to_string(), "20240117093512345-1");
}

#[test]
fn parse_perm_id_invalid() {
    for raw in ["", "2024-1", "/SPACE/SAMPLE1", "20240117093512345-"] {
        let err = raw.parse::<PermId>().unwrap_err();
        assert_matches!(err, SyncError::InvalidPermId(_));
    }
}

#[test]
fn perm_id_found_in_description() {
    let found = PermId::find_in("File from dataset 20240117093512345-3 (https://lims)").unwrap();
    assert_eq!(found.as_str(), "20240117093512345-3");
}

#[test]
fn perm_id_needs_token_boundaries() {
    assert!(PermId::find_in("120240117093512345-1").is_none());
    assert!(PermId::find_in("20240117093512345-1x").is_none());
    assert!("120240117093512345-1".parse::<PermId>().is_err());
}

#[test]
fn perm_id_occurs_only_as_whole_token() {
    let id: PermId = "20240117093512345-1".parse().unwrap();
    assert!(id.occurs_in("derived from 20240117093512345-1, see notes"));
    assert!(!id.occurs_in("EXP12 (20240117093512345-12)"));
    assert!(id.occurs_in("20240117093512345-12 and 20240117093512345-1"));
}

#[test]
fn parse_property_data_types() {
    assert_eq!(
        "CONTROLLEDVOCABULARY".parse::<PropertyDataType>().unwrap(),
        PropertyDataType::ControlledVocabulary
    );
    assert_eq!(
        "MULTILINE_VARCHAR".parse::<PropertyDataType>().unwrap(),
        PropertyDataType::MultilineVarchar
    );
    assert_eq!("SAMPLE".parse::<PropertyDataType>().unwrap(), PropertyDataType::Sample);
    assert!("MATERIAL_LINK".parse::<PropertyDataType>().is_err());
}

#[test]
fn blacklist_matches_perm_ids() {
    let blacklist = Blacklist::parse("20240117093512345-3\n  \n");
    assert_eq!(blacklist.len(), 1);
    assert!(blacklist.contains(&"20240117093512345-3".parse().unwrap()));
    assert!(!blacklist.contains(&"20240117093512345-4".parse().unwrap()));
    assert!(Blacklist::default().is_empty());
}

#[test]
fn material_sample_types_are_recognised() {
    let sample_type = |code: &str| SourceSampleType {
        code: code.to_string(),
        description: None,
        properties: Vec::new(),
    };
    assert!(sample_type("MATERIAL.GENES").is_material());
    assert!(!sample_type("CELL_LINE").is_material());
}
