use thiserror::Error;

/// An unrecognized mutation kind. Rejects the whole batch: no partial
/// effect from the unparsed record may be observed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized mutation kind `{module}.{kind}`")]
    UnknownKind { module: String, kind: String },
}

/// A malformed field inside an otherwise-recognized mutation. Only the
/// offending record is skipped; sibling records in the batch are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed `{field}` in `{kind}` record: expected {expected}")]
pub struct FieldError {
    pub kind: &'static str,
    pub field: &'static str,
    pub expected: &'static str,
}

impl FieldError {
    pub fn new(kind: &'static str, field: &'static str, expected: &'static str) -> Self {
        Self {
            kind,
            field,
            expected,
        }
    }
}

/// Outcome of decoding a single raw record.
#[derive(Debug, Clone, Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Field(#[from] FieldError),
}
