use std::collections::HashMap;

use serde::Deserialize;

/// A field entry: a named value inside a group, with its byte offset,
/// inclusive numeric range, and optional symbol table.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub offset: Vec<u8>,
    pub value_range: (i64, i64),
    #[serde(default)]
    pub values: HashMap<String, i64>,
}

/// A group entry: a named sub-region with a relative address and the name
/// of the table describing its contents. `base-addresses.json` uses the
/// same shape for section pointers (relative address = absolute address).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupDef {
    pub address: Vec<u8>,
    pub table: String,
}

/// One JSON document holds either all group entries or all field entries;
/// this untagged enum lets a single deserialization pass figure out which
/// shape a given entry has before the caller decides what the whole table is.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TableEntry {
    Group(GroupDef),
    Field(FieldDef),
}
