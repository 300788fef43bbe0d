//! Registry of every message, enum, service and method by fully-qualified ID.
//!
//! The table is append-only while a model is being built and frozen once the
//! cross-reference pass succeeds. It is owned by a single [`Api`](crate::Api);
//! there is no process-wide instance.

use crate::error::ModelError;
use crate::model::{Enum, Message, Method, Service};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolTable {
    messages: BTreeMap<String, Message>,
    enums: BTreeMap<String, Enum>,
    services: BTreeMap<String, Service>,
    methods: BTreeMap<String, Method>,
    #[serde(skip)]
    frozen: bool,
}

/// `google.protobuf` messages every model can reference.
pub const WELL_KNOWN_MESSAGES: &[&str] = &[
    "Any",
    "Empty",
    "Timestamp",
    "Duration",
    "FieldMask",
    "Struct",
    "Value",
    "ListValue",
    "DoubleValue",
    "FloatValue",
    "Int64Value",
    "UInt64Value",
    "Int32Value",
    "UInt32Value",
    "BoolValue",
    "StringValue",
    "BytesValue",
];

pub const WELL_KNOWN_PACKAGE: &str = "google.protobuf";

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-seeded with the `google.protobuf` well-known types.
    pub fn with_well_known_types() -> Self {
        let mut table = Self::default();
        for name in WELL_KNOWN_MESSAGES {
            let id = format!(".{WELL_KNOWN_PACKAGE}.{name}");
            table
                .messages
                .insert(id.clone(), Message::new(*name, id, WELL_KNOWN_PACKAGE));
        }
        let id = format!(".{WELL_KNOWN_PACKAGE}.NullValue");
        table
            .enums
            .insert(id.clone(), Enum::new("NullValue", id, WELL_KNOWN_PACKAGE));
        table
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn message_by_id(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn enum_by_id(&self, id: &str) -> Option<&Enum> {
        self.enums.get(id)
    }

    pub fn service_by_id(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn method_by_id(&self, id: &str) -> Option<&Method> {
        self.methods.get(id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.enums.values()
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    // -------------------------------------------------------------------------
    // Mutation (build phase only)
    //
    // The `_mut` accessors return `None` once the table is frozen.
    // -------------------------------------------------------------------------

    pub fn message_by_id_mut(&mut self, id: &str) -> Option<&mut Message> {
        if self.frozen {
            return None;
        }
        self.messages.get_mut(id)
    }

    pub fn enum_by_id_mut(&mut self, id: &str) -> Option<&mut Enum> {
        if self.frozen {
            return None;
        }
        self.enums.get_mut(id)
    }

    pub fn service_by_id_mut(&mut self, id: &str) -> Option<&mut Service> {
        if self.frozen {
            return None;
        }
        self.services.get_mut(id)
    }

    pub fn method_by_id_mut(&mut self, id: &str) -> Option<&mut Method> {
        if self.frozen {
            return None;
        }
        self.methods.get_mut(id)
    }

    /// Register a message, replacing any earlier entry with the same ID.
    ///
    /// Replacement is what the two-pass ingestor relies on: pass 1 registers a
    /// skeleton and pass 2 stores the resolved message under the same ID.
    pub fn insert_message(&mut self, message: Message) -> Result<(), ModelError> {
        self.check_open(&message.id)?;
        self.messages.insert(message.id.clone(), message);
        Ok(())
    }

    pub fn insert_enum(&mut self, e: Enum) -> Result<(), ModelError> {
        self.check_open(&e.id)?;
        self.enums.insert(e.id.clone(), e);
        Ok(())
    }

    pub fn insert_service(&mut self, service: Service) -> Result<(), ModelError> {
        self.check_open(&service.id)?;
        self.services.insert(service.id.clone(), service);
        Ok(())
    }

    /// Register a method. Method IDs must be unique: a second insert with the
    /// same ID is rejected so composed copies cannot silently replace the
    /// service's own methods.
    pub fn insert_method(&mut self, method: Method) -> Result<(), ModelError> {
        self.check_open(&method.id)?;
        if self.methods.contains_key(&method.id) {
            return Err(ModelError::Duplicate { id: method.id });
        }
        self.methods.insert(method.id.clone(), method);
        Ok(())
    }

    /// Drop a method that failed ingestion.
    pub fn remove_method(&mut self, id: &str) -> Result<Option<Method>, ModelError> {
        self.check_open(id)?;
        Ok(self.methods.remove(id))
    }

    fn check_open(&self, id: &str) -> Result<(), ModelError> {
        if self.frozen {
            return Err(ModelError::Frozen { id: id.to_string() });
        }
        Ok(())
    }
}
