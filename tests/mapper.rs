use assert_matches::assert_matches;

use lims_sync::domain::PropertyDataType;
use lims_sync::error::SyncError;
use lims_sync::mapper::{AssetCategory, Mapper};

#[test]
fn dataset_types_map_to_categories() {
    let mapper = Mapper::new();
    assert_eq!(mapper.asset_category_for("RAW_DATA").unwrap(), AssetCategory::DataFile);
    assert_eq!(mapper.asset_category_for("ATTACHMENT").unwrap(), AssetCategory::Document);
    assert_eq!(mapper.asset_category_for("EXPERIMENT_PROTOCOL").unwrap(), AssetCategory::Sop);
    assert_eq!(
        mapper.asset_category_for("PUBLICATION_DATA").unwrap(),
        AssetCategory::Publication
    );
}

#[test]
fn unmappable_dataset_type_is_an_error() {
    let mapper = Mapper::new();
    let err = mapper.asset_category_for("ELN_PREVIEW").unwrap_err();
    assert_matches!(err, SyncError::UnmappedType { kind: "dataset", .. });
    let err = mapper.asset_category_for("NOT_A_TYPE").unwrap_err();
    assert_matches!(err, SyncError::UnmappedType { code, .. } if code == "NOT_A_TYPE");
}

#[test]
fn configured_categories_extend_the_table() {
    let mapper = Mapper::new().with_asset_categories([
        ("UNKNOWN".to_string(), AssetCategory::Document),
        ("MODEL_FILE".to_string(), AssetCategory::Model),
    ]);
    assert_eq!(mapper.asset_category_for("UNKNOWN").unwrap(), AssetCategory::Document);
    assert_eq!(mapper.asset_category_for("MODEL_FILE").unwrap(), AssetCategory::Model);
}

#[test]
fn vocabulary_and_entity_links_degrade_to_strings() {
    let mapper = Mapper::new();
    let vocabulary = mapper.attribute_type_for(PropertyDataType::ControlledVocabulary);
    let link = mapper.attribute_type_for(PropertyDataType::Sample);
    let text = mapper.attribute_type_for(PropertyDataType::Varchar);
    assert_eq!(vocabulary, text);
    assert_eq!(link, text);
    assert_eq!(mapper.attribute_type_for(PropertyDataType::Integer).base_type, "Integer");
    assert_eq!(mapper.attribute_type_for(PropertyDataType::Timestamp).base_type, "DateTime");
}

#[test]
fn data_format_is_best_effort() {
    let mapper = Mapper::new();
    assert_eq!(
        mapper.data_format_annotation_for("table.csv"),
        Some("http://edamontology.org/format_3752")
    );
    assert_eq!(mapper.data_format_annotation_for("notes.docx"), None);
    assert_eq!(mapper.data_format_annotation_for("README"), None);
}

#[test]
fn experiment_types_map_to_assay_classes() {
    let mapper = Mapper::new();
    let proteomics = mapper
        .assay_class_for("02_MASSSPECTROMETRY_EXPERIMENT")
        .unwrap();
    assert_eq!(proteomics.key, "EXP");
    assert!(proteomics.type_uri.ends_with("#Proteomics"));
    assert!(mapper.assay_class_for("04_MICRO_CT").is_ok());
    assert_matches!(
        mapper.assay_class_for("99_UNKNOWN"),
        Err(SyncError::UnmappedType { kind: "experiment", .. })
    );
}
