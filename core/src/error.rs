use thiserror::Error;

/// Generation-time failures. Each one aborts generation for the offending
/// type only; the remaining types still generate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type '{type_name}' declares no identity field")]
    MissingIdentity { type_name: String },

    #[error("type '{type_name}' declares {count} identity fields, expected exactly one")]
    MultipleIdentities { type_name: String, count: usize },

    #[error("identity field '{type_name}.{field}' must be string-typed")]
    NonStringIdentity { type_name: String, field: String },

    #[error(
        "field '{type_name}.{field}' of type '{value_type}' is neither persistable nor \
         handled by a converter"
    )]
    UnresolvableField {
        type_name:  String,
        field:      String,
        value_type: String,
    },

    #[error("field '{type_name}.{field}' is bound to unknown converter '{converter}'")]
    UnknownConverter {
        type_name: String,
        field:     String,
        converter: String,
    },

    #[error("type '{type_name}' uses unknown node adaptor '{adaptor}'")]
    UnknownNodeAdaptor { type_name: String, adaptor: String },

    #[error("type '{type_name}' declares no persistable fields")]
    NoFields { type_name: String },

    #[error("type '{type_name}' declares field '{field}' more than once")]
    DuplicateField { type_name: String, field: String },
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("No generated schema for type '{type_name}'")]
    MissingSchema { type_name: String },

    #[error("Cannot instantiate '{type_name}': {reason}")]
    Instantiation { type_name: String, reason: String },

    #[error("Save '{name}' not found")]
    SaveNotFound { name: String },

    #[error("Field '{type_name}.{field}' expected a {expected} value")]
    FieldType {
        type_name: String,
        field:     String,
        expected:  &'static str,
    },

    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Hierarchy error: {reason}")]
    Hierarchy { reason: String },

    #[error("Converter '{converter}' failed: {reason}")]
    Converter { converter: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PersistResult<T> = Result<T, PersistError>;
