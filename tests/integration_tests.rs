//! Integration tests for the complete model pipeline
//!
//! These tests run both ingestion paths end to end through the facade:
//! - descriptor set + service config → mixins → enrichment → frozen model
//! - OpenAPI document → enrichment → frozen model
//!
//! Run with: cargo test --test integration_tests

use apimodel::model::{Api, Message, ModelError, Typez};
use apimodel::{
    build_model, build_model_from_path, build_model_from_path_with_report, ModelOptions,
    OpenApiOptions, ProtobufOptions, SpecificationFormat,
};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const SM: &str = ".google.cloud.secretmanager.v1";
const SERVICE: &str = ".google.cloud.secretmanager.v1.SecretManagerService";

fn fixture(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(path)
}

fn secretmanager_options() -> ModelOptions {
    ModelOptions {
        protobuf: ProtobufOptions {
            target_prefix: Some("google/cloud/secretmanager/".into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_secretmanager() -> Api {
    build_model_from_path(
        SpecificationFormat::Protobuf,
        &fixture("secretmanager/descriptor.json"),
        Some(&fixture("secretmanager/secretmanager_v1.yaml")),
        secretmanager_options(),
    )
    .expect("secretmanager model")
}

/// Every message or enum reference in the table resolves.
fn assert_references_resolve(api: &Api) {
    let check = |message: &Message| {
        for field in &message.fields {
            match field.typez {
                Typez::Message | Typez::Group => assert!(
                    api.state.message_by_id(&field.typez_id).is_some(),
                    "{} -> {}",
                    field.id,
                    field.typez_id
                ),
                Typez::Enum => assert!(
                    api.state.enum_by_id(&field.typez_id).is_some(),
                    "{} -> {}",
                    field.id,
                    field.typez_id
                ),
                _ => {}
            }
        }
    };
    api.state.messages().for_each(check);
    for method in api.state.methods() {
        assert!(api.state.message_by_id(&method.input_type_id).is_some(), "{}", method.id);
        assert!(api.state.message_by_id(&method.output_type_id).is_some(), "{}", method.id);
    }
}

// ============================================================================
// Descriptor sets
// ============================================================================

#[test]
fn test_descriptor_set_builds_a_composed_enriched_model() {
    let api = build_secretmanager();

    assert_eq!(api.name, "secretmanager");
    assert_eq!(api.services, vec![SERVICE.to_string()]);
    assert!(api.state.is_frozen());
    assert_references_resolve(&api);

    let service = api.state.service_by_id(SERVICE).unwrap();
    let names: Vec<_> = api.methods(service).map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "ListSecrets",
            "CreateSecret",
            "GetSecret",
            "DeleteSecret",
            "ImportSecrets",
            "WatchSecrets",
            "GetLocation",
            "ListLocations",
            "GetOperation",
        ]
    );

    let list = api.state.method_by_id(&format!("{SERVICE}.ListSecrets")).unwrap();
    assert_eq!(list.pagination.as_deref(), Some("page_token"));
    let response = api.state.message_by_id(&format!("{SM}.ListSecretsResponse")).unwrap();
    assert_eq!(response.pagination.as_ref().unwrap().pageable_item, "secrets");

    let create = api.state.method_by_id(&format!("{SERVICE}.CreateSecret")).unwrap();
    assert_eq!(create.auto_populated, ["request_id"]);
    let request = api.state.message_by_id(&create.input_type_id).unwrap();
    assert!(request.field("request_id").unwrap().auto_populated);

    let import = api.state.method_by_id(&format!("{SERVICE}.ImportSecrets")).unwrap();
    assert!(import.is_long_running());

    let get_operation = api.state.method_by_id(&format!("{SERVICE}.GetOperation")).unwrap();
    assert_eq!(
        get_operation.source_service_id.as_deref(),
        Some(".google.longrunning.Operations")
    );
}

#[test]
fn test_report_counts_every_pass() {
    let (_, report) = build_model_from_path_with_report(
        SpecificationFormat::Protobuf,
        &fixture("secretmanager/descriptor.json"),
        Some(&fixture("secretmanager/secretmanager_v1.yaml")),
        secretmanager_options(),
    )
    .unwrap();

    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.target_files, 1);
    assert_eq!(ingest.dropped_methods, 1);
    assert_eq!(report.mixins.unwrap().composed_methods, 3);
    // ListSecrets and the composed ListLocations.
    assert_eq!(report.enrich.pageable, 2);
    assert_eq!(report.enrich.auto_populated, 1);
    assert_eq!(report.enrich.long_running, 1);
}

#[test]
fn test_frozen_models_reject_insertions() {
    let mut api = build_secretmanager();
    let err = api
        .state
        .insert_message(Message::new("Late", ".x.Late", "x"))
        .unwrap_err();
    assert!(matches!(err, ModelError::Frozen { .. }));
    assert!(api.state.message_by_id_mut(&format!("{SM}.Secret")).is_none());
    assert!(api.state.message_by_id(&format!("{SM}.Secret")).is_some());
}

#[test]
fn test_unresolved_references_fail_the_build() {
    let source = std::fs::read_to_string(fixture("secretmanager/descriptor.json")).unwrap();
    let mut set: serde_json::Value = serde_json::from_str(&source).unwrap();
    let files = set["file"].as_array_mut().unwrap();
    for file in files.iter_mut() {
        if file["name"] == "google/cloud/secretmanager/v1/service.proto" {
            for message in file["messageType"].as_array_mut().unwrap() {
                if message["name"] == "OperationMetadata" {
                    message["field"][0]["typeName"] = ".google.cloud.secretmanager.v1.Nowhere".into();
                }
            }
        }
    }

    let err = build_model(
        SpecificationFormat::Protobuf,
        &set.to_string(),
        &secretmanager_options(),
    )
    .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("Nowhere"), "{text}");
}

#[test]
fn test_unresolved_long_running_types_fail_the_build() {
    let source = std::fs::read_to_string(fixture("secretmanager/descriptor.json")).unwrap();
    let original = "\"metadataType\": \"OperationMetadata\"";
    assert!(source.contains(original));
    let source = source.replace(original, "\"metadataType\": \"NoSuchMetadata\"");

    let err = build_model(SpecificationFormat::Protobuf, &source, &secretmanager_options())
        .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("`.NoSuchMetadata`"), "{text}");
    assert!(text.contains("ImportSecrets"), "{text}");
}

#[test]
fn test_missing_input_files_name_the_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let err = build_model_from_path(
        SpecificationFormat::OpenApi,
        &missing,
        None,
        ModelOptions::default(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));

    let err = build_model_from_path(
        SpecificationFormat::Protobuf,
        &fixture("secretmanager/descriptor.json"),
        Some(&dir.path().join("missing.yaml")),
        secretmanager_options(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}

// ============================================================================
// OpenAPI
// ============================================================================

#[test]
fn test_openapi_document_builds_a_frozen_model() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("petstore.yaml");
    std::fs::write(
        &config,
        "name: petstore.example.com\n\
         title: Pet Store\n\
         apis:\n- name: petstore.v1.PetStore\n\
         publishing:\n  method_settings:\n  - selector: petstore.v1.PetStore.CreatePet\n    auto_populated_fields: [requestId]\n",
    )
    .unwrap();

    let api = build_model_from_path(
        SpecificationFormat::OpenApi,
        &fixture("petstore/openapi.json"),
        Some(&config),
        ModelOptions::default(),
    )
    .unwrap();

    assert_eq!(api.title, "Pet Store");
    assert!(api.state.is_frozen());
    assert_references_resolve(&api);

    let list = api.state.method_by_id(".petstore.v1.PetStore.ListPets").unwrap();
    assert!(list.is_pageable());
    let create = api.state.method_by_id(".petstore.v1.PetStore.CreatePet").unwrap();
    assert_eq!(create.auto_populated, ["requestId"]);

    // Maps with the same value type share one entry message.
    let pet = api.state.message_by_id(".petstore.v1.Pet").unwrap();
    assert_eq!(
        pet.field("labels").unwrap().typez_id,
        pet.field("annotations").unwrap().typez_id
    );
}

#[test]
fn test_openapi_package_override() {
    let source = std::fs::read_to_string(fixture("petstore/openapi.json")).unwrap();
    let options = ModelOptions {
        openapi: OpenApiOptions {
            package_name: Some("zoo.v2".into()),
        },
        ..Default::default()
    };
    let api = build_model(SpecificationFormat::OpenApi, &source, &options).unwrap();
    assert_eq!(api.package_name, "zoo.v2");
    assert_eq!(api.name, "zoo");
    assert_eq!(api.services, vec![".zoo.v2.PetStoreApi".to_string()]);
}

#[test]
fn test_model_serializes_to_json() {
    let api = build_secretmanager();
    let json = serde_json::to_value(&api).unwrap();
    assert_eq!(json["package_name"], "google.cloud.secretmanager.v1");
    assert!(json["state"]["methods"].as_object().unwrap().contains_key(&format!("{SERVICE}.GetOperation")));
}
