use apimodel_core::{enrich, finalize, Api, FieldBehavior, FieldFormat, ServiceConfig, Typez};
use apimodel_ingest_openapi::{ingest_openapi, OpenApiOptions};
use std::path::Path;

const PKG: &str = ".petstore.v1";

fn petstore() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/petstore/openapi.json");
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

fn options() -> OpenApiOptions {
    OpenApiOptions {
        package_name: Some("petstore.v1".into()),
    }
}

fn ingest() -> Api {
    ingest_openapi(&petstore(), &options(), None).expect("ingest")
}

fn method_names(api: &Api) -> Vec<String> {
    let service = api.services().next().expect("one service");
    api.methods(service).map(|m| m.name.clone()).collect()
}

#[test]
fn object_schemas_become_messages() {
    let api = ingest();
    assert_eq!(api.package_name, "petstore.v1");
    assert_eq!(api.title, "Pet Store API");
    for name in ["Pet", "Owner", "Dog", "ListPetsResponse", "TagPetRequest"] {
        assert!(api.messages.contains(&format!("{PKG}.{name}")), "{name}");
    }
    // String enums are inlined as strings, not messages.
    assert!(api.state.message_by_id(&format!("{PKG}.Status")).is_none());

    let pet = api.state.message_by_id(&format!("{PKG}.Pet")).unwrap();
    assert_eq!(pet.documentation, "A pet in the store.");

    let name = pet.field("name").unwrap();
    assert!(name.is_required());
    assert!(!name.optional);
    assert_eq!(name.behavior, vec![FieldBehavior::Required]);

    assert_eq!(pet.field("id").unwrap().typez, Typez::Int64);
    assert_eq!(pet.field("status").unwrap().typez, Typez::String);
    assert_eq!(pet.field("weight").unwrap().typez, Typez::Double);
    assert!(pet.field("tags").unwrap().repeated);
    assert_eq!(
        pet.field("createTime").unwrap().typez_id,
        ".google.protobuf.Timestamp"
    );

    let owner = pet.field("owner").unwrap();
    assert_eq!(owner.typez, Typez::Message);
    assert_eq!(owner.typez_id, format!("{PKG}.Owner"));
    assert!(owner.optional);

    let metadata = pet.field("metadata").unwrap();
    assert_eq!(metadata.typez_id, format!("{PKG}.Pet.Metadata"));
    assert_eq!(pet.messages, vec![format!("{PKG}.Pet.Metadata")]);
    let nested = api.state.message_by_id(&metadata.typez_id).unwrap();
    assert_eq!(nested.parent.as_deref(), Some(".petstore.v1.Pet"));
}

#[test]
fn maps_share_one_canonical_entry_message() {
    let api = ingest();
    let pet = api.state.message_by_id(&format!("{PKG}.Pet")).unwrap();

    let labels = pet.field("labels").unwrap();
    let annotations = pet.field("annotations").unwrap();
    assert!(labels.map && !labels.optional);
    assert_eq!(labels.typez_id, ".$map<string, string>");
    assert_eq!(labels.typez_id, annotations.typez_id);

    let entry = api.state.message_by_id(&labels.typez_id).unwrap();
    assert!(entry.is_map);
    assert_eq!(entry.fields.len(), 2);
    assert_eq!(entry.fields[1].typez, Typez::String);
    // Entry messages are not part of the API's own message list.
    assert!(!api.messages.contains(&labels.typez_id));

    let attributes = pet.field("attributes").unwrap();
    assert_eq!(attributes.typez_id, ".$map<string, .google.protobuf.Any>");
}

#[test]
fn all_of_merges_referenced_properties() {
    let api = ingest();
    let dog = api.state.message_by_id(&format!("{PKG}.Dog")).unwrap();
    let pet = api.state.message_by_id(&format!("{PKG}.Pet")).unwrap();
    assert_eq!(dog.fields.len(), pet.fields.len() + 1);
    assert_eq!(dog.fields.last().unwrap().name, "breed");
    assert!(dog.field("name").unwrap().is_required());
}

#[test]
fn operations_become_methods_of_one_service() {
    let api = ingest();
    let service = api.services().next().unwrap();
    assert_eq!(service.id, format!("{PKG}.PetStoreApi"));
    assert_eq!(service.default_host, "petstore.example.com");
    assert_eq!(
        method_names(&api),
        ["ListPets", "CreatePet", "GetPet", "DeletePet", "UpdatePet", "TagPet", "TransferPet"]
    );

    let list = api
        .state
        .method_by_id(&format!("{PKG}.PetStoreApi.ListPets"))
        .unwrap();
    assert_eq!(list.documentation, "Lists pets.");
    assert_eq!(list.path_info.body_field_path, None);
    let binding = &list.path_info.bindings[0];
    assert_eq!(binding.verb, "GET");
    assert_eq!(binding.path_template.to_string(), "/v1/pets");
    let query: Vec<_> = binding.query_parameters.iter().cloned().collect();
    assert_eq!(query, ["filter", "pageSize", "pageToken"]);

    let request = api.state.message_by_id(&list.input_type_id).unwrap();
    assert_eq!(request.id, format!("{PKG}.ListPetsRequest"));
    assert!(request.field("X-Request-Reason").is_none());
    assert_eq!(request.field("filter").unwrap().documentation, "A filter expression.");

    let delete = api
        .state
        .method_by_id(&format!("{PKG}.PetStoreApi.DeletePet"))
        .unwrap();
    assert!(delete.deprecated);
    assert_eq!(delete.output_type_id, ".google.protobuf.Empty");
    let delete_request = api.state.message_by_id(&delete.input_type_id).unwrap();
    assert!(delete_request.field("petId").unwrap().is_required());
}

#[test]
fn request_bodies_are_wrapped_or_reused() {
    let api = ingest();
    let state = &api.state;

    let create = state.method_by_id(&format!("{PKG}.PetStoreApi.CreatePet")).unwrap();
    assert_eq!(create.path_info.body_field_path.as_deref(), Some("requestBody"));
    let request = state.message_by_id(&create.input_type_id).unwrap();
    let body = request.field("requestBody").unwrap();
    assert_eq!(body.typez_id, format!("{PKG}.Pet"));
    assert!(body.is_required());
    assert_eq!(request.field("requestId").unwrap().format, Some(FieldFormat::Uuid4));

    // A query parameter already uses the body's usual name.
    let transfer = state.method_by_id(&format!("{PKG}.PetStoreApi.TransferPet")).unwrap();
    assert_eq!(
        transfer.path_info.body_field_path.as_deref(),
        Some("openapiRequestBody")
    );
    let request = state.message_by_id(&transfer.input_type_id).unwrap();
    assert_eq!(request.field("requestBody").unwrap().typez, Typez::String);
    assert_eq!(
        request.field("openapiRequestBody").unwrap().typez_id,
        format!("{PKG}.Owner")
    );

    // `TagPetRequest` is defined by the document, so it is reused and
    // extended with the path parameter.
    let tag = state.method_by_id(&format!("{PKG}.PetStoreApi.TagPet")).unwrap();
    assert_eq!(tag.input_type_id, format!("{PKG}.TagPetRequest"));
    assert_eq!(tag.path_info.body_field_path.as_deref(), Some("*"));
    let names: Vec<_> = state
        .message_by_id(&tag.input_type_id)
        .unwrap()
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, ["tags", "petId"]);

    // Inline 2xx responses get a synthesized message.
    assert_eq!(tag.output_type_id, format!("{PKG}.TagPetResponse"));
    let response = state.message_by_id(&tag.output_type_id).unwrap();
    assert_eq!(response.field("tagged").unwrap().typez, Typez::Int32);
}

#[test]
fn configuration_names_the_service_and_drives_enrichment() -> anyhow::Result<()> {
    let config = ServiceConfig::from_json(
        r#"{
            "name": "petstore.example.com",
            "apis": [{"name": "petstore.v1.PetStore"}],
            "publishing": {"methodSettings": [
                {"selector": "petstore.v1.PetStore.CreatePet", "autoPopulatedFields": ["requestId"]}
            ]}
        }"#,
    )?;
    let mut api = ingest_openapi(&petstore(), &OpenApiOptions::default(), Some(&config))?;
    assert_eq!(api.package_name, "petstore.v1");
    assert_eq!(api.name, "petstore");
    assert_eq!(api.services, vec![format!("{PKG}.PetStore")]);

    let stats = enrich(&mut api, Some(&config));
    assert_eq!(stats.pageable, 1);
    assert_eq!(stats.auto_populated, 1);

    let list = api.state.method_by_id(&format!("{PKG}.PetStore.ListPets")).unwrap();
    assert_eq!(list.pagination.as_deref(), Some("pageToken"));
    let response = api.state.message_by_id(&list.output_type_id).unwrap();
    let info = response.pagination.as_ref().unwrap();
    assert_eq!(info.next_page_token, "nextPageToken");
    assert_eq!(info.pageable_item, "pets");

    let create = api.state.method_by_id(&format!("{PKG}.PetStore.CreatePet")).unwrap();
    assert_eq!(create.auto_populated, ["requestId"]);

    finalize(&mut api)?;
    assert!(api.state.is_frozen());
    Ok(())
}

const MINIMAL_YAML: &str = r#"
openapi: 3.1.0
info:
  title: Things
servers:
- url: https://things.example.com
paths:
  /v1/things/{thingId}:
    get:
      operationId: getThing
      parameters:
      - name: thingId
        in: path
        required: true
        schema:
          type: string
      responses:
        '200':
          description: OK
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Thing'
components:
  schemas:
    Thing:
      type: object
      properties:
        name:
          type: [string, "null"]
        size:
          type: integer
          format: uint64
"#;

#[test]
fn yaml_documents_are_accepted() -> anyhow::Result<()> {
    let api = ingest_openapi(MINIMAL_YAML, &OpenApiOptions::default(), None)?;
    assert_eq!(api.package_name, "openapi");
    let service = api.services().next().unwrap();
    assert_eq!(service.name, "Things");
    assert_eq!(service.default_host, "things.example.com");

    let thing = api.state.message_by_id(".openapi.Thing").unwrap();
    assert_eq!(thing.field("name").unwrap().typez, Typez::String);
    assert_eq!(thing.field("size").unwrap().typez, Typez::UInt64);
    Ok(())
}

#[test]
fn unknown_response_reference_is_fatal() {
    let text = MINIMAL_YAML.replace("schemas/Thing'", "schemas/Missing'");
    let err = ingest_openapi(&text, &OpenApiOptions::default(), None).unwrap_err();
    assert!(format!("{err:#}").contains("#/components/schemas/Missing"), "{err:#}");
}

#[test]
fn invalid_path_templates_drop_the_method() -> anyhow::Result<()> {
    let text = MINIMAL_YAML.replace("/v1/things/{thingId}:", "/v1/things/{thingId}/:");
    let api = ingest_openapi(&text, &OpenApiOptions::default(), None)?;
    let service = api.services().next().unwrap();
    assert!(service.methods.is_empty());
    Ok(())
}

#[test]
fn nested_arrays_are_rejected() {
    let text = MINIMAL_YAML.replace(
        "format: uint64",
        "format: uint64\n        grid:\n          type: array\n          items:\n            type: array\n            items:\n              type: integer",
    );
    let err = ingest_openapi(&text, &OpenApiOptions::default(), None).unwrap_err();
    assert!(format!("{err:#}").contains("nested arrays"), "{err:#}");
}
