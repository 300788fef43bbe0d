//! Cross-reference validation of a built model.

use crate::error::ModelError;
use crate::model::{Api, Typez};

/// Check that every ID the model mentions resolves in its symbol table.
///
/// All failures are collected; a model with several dangling references
/// reports them together.
pub fn cross_reference(api: &Api) -> Result<(), ModelError> {
    let state = &api.state;
    let mut errors = Vec::new();

    for message in state.messages() {
        for field in &message.fields {
            let found = match field.typez {
                Typez::Message | Typez::Group => state.message_by_id(&field.typez_id).is_some(),
                Typez::Enum => state.enum_by_id(&field.typez_id).is_some(),
                _ => true,
            };
            if !found {
                let kind = if field.typez == Typez::Enum { "enum" } else { "message" };
                errors.push(ModelError::unresolved(&field.id, kind, &field.typez_id));
            }
        }
        if let Some(parent) = &message.parent {
            if state.message_by_id(parent).is_none() {
                errors.push(ModelError::unresolved(&message.id, "message", parent));
            }
        }
    }

    for method in state.methods() {
        if state.service_by_id(&method.service_id).is_none() {
            errors.push(ModelError::unresolved(&method.id, "service", &method.service_id));
        }
        for id in [&method.input_type_id, &method.output_type_id] {
            if state.message_by_id(id).is_none() {
                errors.push(ModelError::unresolved(&method.id, "message", id));
            }
        }
        if let Some(info) = &method.operation_info {
            for id in [&info.response_type_id, &info.metadata_type_id] {
                if state.message_by_id(id).is_none() {
                    errors.push(ModelError::unresolved(&method.id, "message", id));
                }
            }
        }
    }

    for service in state.services() {
        for id in &service.methods {
            if state.method_by_id(id).is_none() {
                errors.push(ModelError::unresolved(&service.id, "method", id));
            }
        }
    }

    for id in &api.services {
        if state.service_by_id(id).is_none() {
            errors.push(ModelError::unresolved(&api.name, "service", id));
        }
    }
    for id in &api.messages {
        if state.message_by_id(id).is_none() {
            errors.push(ModelError::unresolved(&api.name, "message", id));
        }
    }
    for id in &api.enums {
        if state.enum_by_id(id).is_none() {
            errors.push(ModelError::unresolved(&api.name, "enum", id));
        }
    }

    ModelError::collect(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Message, Method, Service};

    #[test]
    fn complete_models_pass() {
        let mut api = Api::new("p");
        let mut m = Message::new("Foo", ".p.Foo", "p");
        let mut f = Field::new("when", ".p.Foo.when", Typez::Message);
        f.typez_id = ".google.protobuf.Timestamp".into();
        m.fields.push(f);
        api.state.insert_message(m).unwrap();
        api.messages.push(".p.Foo".into());
        assert_eq!(cross_reference(&api), Ok(()));
    }

    #[test]
    fn dangling_references_are_aggregated() {
        let mut api = Api::new("p");
        api.name = "p".into();
        let mut m = Message::new("Foo", ".p.Foo", "p");
        let mut f = Field::new("state", ".p.Foo.state", Typez::Enum);
        f.typez_id = ".p.State".into();
        m.fields.push(f);
        api.state.insert_message(m).unwrap();

        let mut service = Service::new("S", ".p.S", "p");
        service.methods.push(".p.S.Gone".into());
        api.state.insert_service(service).unwrap();
        api.state
            .insert_method(Method {
                name: "Get".into(),
                id: ".p.S.Get".into(),
                service_id: ".p.S".into(),
                input_type_id: ".p.Foo".into(),
                output_type_id: ".p.Missing".into(),
                ..Default::default()
            })
            .unwrap();

        let Err(ModelError::Aggregate(errors)) = cross_reference(&api) else {
            panic!("expected aggregate error");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ModelError::unresolved(".p.Foo.state", "enum", ".p.State")));
        assert!(errors.contains(&ModelError::unresolved(".p.S.Get", "message", ".p.Missing")));
        assert!(errors.contains(&ModelError::unresolved(".p.S", "method", ".p.S.Gone")));
    }
}
