mod common;

use assert_matches::assert_matches;
use serde_json::json;

use lims_sync::catalogue::CatalogueClient;
use lims_sync::error::SyncError;
use lims_sync::locator::Locator;
use lims_sync::mapper::AssetCategory;
use lims_sync::resource::ResourceKind;
use lims_sync::translate::assay_title;

use common::{DATASET1_PERM, EXP1_PERM, MockCatalogue};

fn assay(catalogue: &MockCatalogue, id: &str, title: &str) {
    catalogue.seed("assays", id, json!({ "title": title, "description": "" }));
}

#[test]
fn no_match_is_none() {
    let catalogue = MockCatalogue::new();
    let found = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap();
    assert_eq!(found, None);
}

#[test]
fn single_match_returns_its_id() {
    let catalogue = MockCatalogue::new();
    assay(&catalogue, "40", &assay_title("EXP1", EXP1_PERM));
    let found = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap();
    assert_eq!(found.as_deref(), Some("40"));
}

#[test]
fn perm_id_must_match_exactly() {
    let catalogue = MockCatalogue::new();
    // `-1` is a prefix of `-12`; substring search returns both.
    assay(&catalogue, "40", &assay_title("EXP12", "20240117093512345-12"));
    let found = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap();
    assert_eq!(found, None);
}

#[test]
fn several_matches_are_ambiguous() {
    let catalogue = MockCatalogue::new();
    assay(&catalogue, "40", &assay_title("EXP1", EXP1_PERM));
    assay(&catalogue, "41", &assay_title("EXP1 copy", EXP1_PERM));

    let err = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap_err();
    assert_matches!(err, SyncError::AmbiguousMatch { ids, .. } if ids == vec!["40".to_string(), "41".to_string()]);
}

#[test]
fn identifier_in_a_description_counts_as_a_match() {
    let catalogue = MockCatalogue::new();
    assay(&catalogue, "40", &assay_title("EXP1", EXP1_PERM));
    catalogue.seed(
        "assays",
        "41",
        json!({ "title": "Reanalysis", "description": format!("derived from {EXP1_PERM}") }),
    );

    let err = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap_err();
    assert_matches!(err, SyncError::AmbiguousMatch { ids, .. } if ids == vec!["40".to_string(), "41".to_string()]);
}

#[test]
fn longer_perm_id_in_a_description_is_not_a_match() {
    let catalogue = MockCatalogue::new();
    assay(&catalogue, "40", &assay_title("EXP1", EXP1_PERM));
    catalogue.seed(
        "assays",
        "41",
        json!({ "title": "Reanalysis", "description": "derived from 20240117093512345-12" }),
    );

    let found = Locator::new(&catalogue)
        .find(ResourceKind::Assay, EXP1_PERM)
        .unwrap();
    assert_eq!(found.as_deref(), Some("40"));
}

#[test]
fn samples_match_on_identifier_title() {
    let catalogue = MockCatalogue::new();
    catalogue.seed("samples", "60", json!({ "title": "/SPACE/SAMPLE1" }));
    catalogue.seed("samples", "61", json!({ "title": "/SPACE/SAMPLE10" }));

    let found = Locator::new(&catalogue)
        .find(ResourceKind::Sample, "/SPACE/SAMPLE1")
        .unwrap();
    assert_eq!(found.as_deref(), Some("60"));
}

#[test]
fn read_back_follows_assay_relationships() {
    let catalogue = MockCatalogue::new();
    assay(&catalogue, "40", &assay_title("EXP1", EXP1_PERM));
    catalogue
        .create(
            ResourceKind::Sample,
            &json!({ "data": {
                "type": "samples",
                "attributes": { "attribute_map": { "LIMS ID": "/SPACE/SAMPLE1" } },
                "relationships": { "assays": { "data": [{ "id": "40", "type": "assays" }] } },
            }}),
        )
        .unwrap();
    catalogue
        .create(
            ResourceKind::Asset(AssetCategory::DataFile),
            &json!({ "data": {
                "type": "data_files",
                "attributes": {
                    "title": "reads.fastq.gz",
                    "description": format!("File from dataset {DATASET1_PERM}"),
                    "content_blobs": [{ "original_filename": "reads.fastq.gz" }],
                },
                "relationships": { "assays": { "data": [{ "id": "40", "type": "assays" }] } },
            }}),
        )
        .unwrap();

    let info = Locator::new(&catalogue)
        .read_back(ResourceKind::Assay, "40")
        .unwrap();

    let top = info.top.unwrap();
    assert_eq!(top.source_id.as_deref(), Some(EXP1_PERM));
    assert_eq!(info.samples.len(), 1);
    assert_eq!(info.samples[0].source_id.as_deref(), Some("/SPACE/SAMPLE1"));
    assert_eq!(info.assets.len(), 1);
    assert_eq!(info.assets[0].source_id.as_deref(), Some(DATASET1_PERM));
    assert_eq!(info.assets[0].file_name.as_deref(), Some("reads.fastq.gz"));
}

#[test]
fn sample_read_back_has_no_children() {
    let catalogue = MockCatalogue::new();
    catalogue.seed("samples", "60", json!({ "title": "/SPACE/SAMPLE1" }));
    let info = Locator::new(&catalogue)
        .read_back(ResourceKind::Sample, "60")
        .unwrap();
    assert!(info.top.is_some());
    assert!(info.samples.is_empty());
    assert!(info.assets.is_empty());
}

#[test]
fn assets_are_found_across_categories() {
    let catalogue = MockCatalogue::new();
    let description = format!("File from dataset {DATASET1_PERM}");
    catalogue.seed("data_files", "70", json!({ "title": "a.csv", "description": description }));
    catalogue.seed("documents", "71", json!({ "title": "b.pdf", "description": description }));
    catalogue.seed(
        "documents",
        "72",
        json!({ "title": "c.pdf", "description": "File from dataset 20240117093512345-9" }),
    );

    let found = Locator::new(&catalogue)
        .find_assets(&[DATASET1_PERM.parse().unwrap()])
        .unwrap();

    let mut ids: Vec<&str> = found.iter().map(|asset| asset.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["70", "71"]);
}
