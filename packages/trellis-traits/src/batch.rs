/// Generic argument tree carried by a mutation record.
///
/// Argument encoding is opaque to the core: producers hand over
/// already-parsed JSON-shaped values (object/array/string/number/bool)
/// and the core picks fields out positionally.
pub use serde_json::Value;

/// One raw mutation record as emitted by the scripting runtime.
///
/// The `(module, kind)` pair discriminates the mutation; `args` is a
/// positional argument list whose shape depends on the kind.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub module: String,
    pub kind: String,
    pub args: Vec<Value>,
}

impl RawRecord {
    pub fn new(module: impl Into<String>, kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            module: module.into(),
            kind: kind.into(),
            args,
        }
    }
}

/// An ordered list of raw mutation records for one page: the unit of
/// submission to the pipeline and of delivery to the sink.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<RawRecord> for RawBatch {
    fn from_iter<T: IntoIterator<Item = RawRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
