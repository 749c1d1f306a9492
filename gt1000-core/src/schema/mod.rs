//! Schema Store: resolves `(section, group, field, symbol?)` tuples against
//! a bundle of named JSON tables into absolute device addresses and values.

mod types;

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use types::{FieldDef, GroupDef, TableEntry};

/// Names of the JSON documents making up the default schema bundle, embedded
/// into the binary at compile time. `load_from_dir` accepts the same set of
/// names from an arbitrary directory instead.
const BUNDLE_FILES: &[(&str, &str)] = &[
    ("base-addresses", include_str!("../../schema/base-addresses.json")),
    ("Patch", include_str!("../../schema/Patch.json")),
    ("Patch2", include_str!("../../schema/Patch2.json")),
    ("Patch3", include_str!("../../schema/Patch3.json")),
    ("PatchComp", include_str!("../../schema/PatchComp.json")),
    ("PatchDist", include_str!("../../schema/PatchDist.json")),
    ("PatchPreamp", include_str!("../../schema/PatchPreamp.json")),
    ("PatchNs", include_str!("../../schema/PatchNs.json")),
    ("PatchEq", include_str!("../../schema/PatchEq.json")),
    ("PatchDelay", include_str!("../../schema/PatchDelay.json")),
    ("PatchMstDelay", include_str!("../../schema/PatchMstDelay.json")),
    ("PatchChorus", include_str!("../../schema/PatchChorus.json")),
    ("PatchPedalFx", include_str!("../../schema/PatchPedalFx.json")),
    ("PatchFx", include_str!("../../schema/PatchFx.json")),
    ("PatchFxLevelOnly", include_str!("../../schema/PatchFxLevelOnly.json")),
    (
        "PatchFxEffectDirectMix",
        include_str!("../../schema/PatchFxEffectDirectMix.json"),
    ),
    (
        "PatchFxEffectDirectLevel",
        include_str!("../../schema/PatchFxEffectDirectLevel.json"),
    ),
    ("PatchFxOvertone", include_str!("../../schema/PatchFxOvertone.json")),
    ("PatchFxOctave", include_str!("../../schema/PatchFxOctave.json")),
    ("PatchFxEffectDepth", include_str!("../../schema/PatchFxEffectDepth.json")),
    ("PatchFxSoundHold", include_str!("../../schema/PatchFxSoundHold.json")),
    ("PatchFxSBend", include_str!("../../schema/PatchFxSBend.json")),
    ("PatchFxLevelDepth", include_str!("../../schema/PatchFxLevelDepth.json")),
    ("PatchFxDistortion", include_str!("../../schema/PatchFxDistortion.json")),
    ("PatchFxMasteringFx", include_str!("../../schema/PatchFxMasteringFx.json")),
    ("PatchFxLevelSens", include_str!("../../schema/PatchFxLevelSens.json")),
    (
        "PatchFxLevelDirectMix",
        include_str!("../../schema/PatchFxLevelDirectMix.json"),
    ),
    ("PatchFxFeedbacker", include_str!("../../schema/PatchFxFeedbacker.json")),
    ("PatchFxHarmonist", include_str!("../../schema/PatchFxHarmonist.json")),
    (
        "PatchFxPitchShifter",
        include_str!("../../schema/PatchFxPitchShifter.json"),
    ),
];

const SECTIONS_TABLE: &str = "base-addresses";

/// A loaded table is either a group table (group name -> relative address +
/// child table name) or a field table (field name -> offset/range/symbols).
/// Which kind a given JSON file holds is implied by its role in the bundle,
/// not recorded explicitly, so callers ask for the kind they expect.
#[derive(Debug, Clone)]
enum Table {
    Group(HashMap<String, GroupDef>),
    Field(HashMap<String, FieldDef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(pub [u8; 4]);

impl Address {
    fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    fn checked_add(self, other: u32) -> Option<Address> {
        self.as_u32().checked_add(other).map(|v| Address(v.to_be_bytes()))
    }
}

pub struct SchemaStore {
    tables: HashMap<String, Table>,
}

fn pad4(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let start = 4 - bytes.len().min(4);
    buf[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(4)..]);
    u32::from_be_bytes(buf)
}

impl SchemaStore {
    /// Loads the default bundle checked into the crate.
    pub fn load_embedded() -> Result<Self> {
        let files = BUNDLE_FILES
            .iter()
            .map(|(name, contents)| (name.to_string(), contents.to_string()));
        Self::build(files)
    }

    /// Loads a bundle from a directory on disk, using the same file names as
    /// the embedded bundle. Intended for experimenting with a hand-edited or
    /// vendor-refreshed table set without recompiling.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut files = Vec::with_capacity(BUNDLE_FILES.len());
        for (name, _) in BUNDLE_FILES {
            let path = dir.join(format!("{name}.json"));
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::InvalidSchema(format!("{}: {e}", path.display())))?;
            files.push((name.to_string(), contents));
        }
        Self::build(files.into_iter())
    }

    fn build(files: impl Iterator<Item = (String, String)>) -> Result<Self> {
        let mut tables = HashMap::new();
        for (name, contents) in files {
            let raw: HashMap<String, TableEntry> = serde_json::from_str(&contents)
                .map_err(|e| Error::InvalidSchema(format!("{name}.json: {e}")))?;
            let table = if name == SECTIONS_TABLE {
                Table::Group(group_entries(&name, raw)?)
            } else {
                // A table is a group table if every entry in it looks like a
                // group entry; a field table otherwise. Bundle files never
                // mix the two kinds.
                let all_groups = raw.values().all(|e| matches!(e, TableEntry::Group(_)));
                if all_groups {
                    Table::Group(group_entries(&name, raw)?)
                } else {
                    Table::Field(field_entries(&name, raw)?)
                }
            };
            tables.insert(name, table);
        }
        Ok(SchemaStore { tables })
    }

    fn group_table(&self, name: &str) -> Result<&HashMap<String, GroupDef>> {
        match self.tables.get(name) {
            Some(Table::Group(m)) => Ok(m),
            Some(Table::Field(_)) => {
                Err(Error::InvalidSchema(format!("{name} is a field table, not a group table")))
            }
            None => Err(Error::SchemaMissing(name.to_string())),
        }
    }

    fn field_table(&self, name: &str) -> Result<&HashMap<String, FieldDef>> {
        match self.tables.get(name) {
            Some(Table::Field(m)) => Ok(m),
            Some(Table::Group(_)) => {
                Err(Error::InvalidSchema(format!("{name} is a group table, not a field table")))
            }
            None => Err(Error::SchemaMissing(name.to_string())),
        }
    }

    fn section(&self, section: &str) -> Result<&GroupDef> {
        self.group_table(SECTIONS_TABLE)?
            .get(section)
            .ok_or_else(|| Error::SchemaMissing(section.to_string()))
    }

    fn group(&self, table: &str, group: &str) -> Result<&GroupDef> {
        self.group_table(table)?
            .get(group)
            .ok_or_else(|| Error::SchemaMissing(format!("{table}.{group}")))
    }

    fn field(&self, table: &str, field: &str) -> Result<&FieldDef> {
        self.field_table(table)?
            .get(field)
            .ok_or_else(|| Error::SchemaMissing(format!("{table}.{field}")))
    }

    /// Names of every entry declared directly inside `table_name`. For group
    /// tables this lists sub-group names (including type-specific ones);
    /// for field tables it lists field names.
    pub fn groups_of(&self, table_name: &str) -> Result<Vec<String>> {
        match self.tables.get(table_name) {
            Some(Table::Group(m)) => Ok(m.keys().cloned().collect()),
            Some(Table::Field(m)) => Ok(m.keys().cloned().collect()),
            None => Err(Error::SchemaMissing(table_name.to_string())),
        }
    }

    pub fn value_range(&self, section: &str, group: &str, field: &str) -> Result<(i64, i64)> {
        let sec = self.section(section)?;
        let grp = self.group(&sec.table, group)?;
        let fld = self.field(&grp.table, field)?;
        Ok(fld.value_range)
    }

    /// Every symbol defined for `field`, e.g. the vendor fx type names for
    /// `fx1.TYPE`. Used by `list_types`.
    pub fn symbols(&self, section: &str, group: &str, field: &str) -> Result<Vec<String>> {
        let sec = self.section(section)?;
        let grp = self.group(&sec.table, group)?;
        let fld = self.field(&grp.table, field)?;
        Ok(fld.values.keys().cloned().collect())
    }

    /// Whether `field` is declared at all within `(section, group)`,
    /// without failing if it is absent. Used to tell whether a category
    /// carries a `TYPE` field before trying to read one.
    pub fn has_field(&self, section: &str, group: &str, field: &str) -> bool {
        let found = (|| -> Result<()> {
            let sec = self.section(section)?;
            let grp = self.group(&sec.table, group)?;
            self.field(&grp.table, field)?;
            Ok(())
        })();
        found.is_ok()
    }

    pub fn decode(&self, section: &str, group: &str, field: &str, byte: u8) -> Result<String> {
        let sec = self.section(section)?;
        let grp = self.group(&sec.table, group)?;
        let fld = self.field(&grp.table, field)?;
        let value = byte as i64;
        for (symbol, code) in &fld.values {
            if *code == value {
                return Ok(symbol.clone());
            }
        }
        if value >= fld.value_range.0 && value <= fld.value_range.1 {
            Ok(value.to_string())
        } else {
            Err(Error::ValueOutOfRange {
                field: field.to_string(),
                value,
                lo: fld.value_range.0,
                hi: fld.value_range.1,
            })
        }
    }

    /// Resolves `(section, group, field)` to a 4-byte absolute address, and
    /// when `symbol` is given, also to its encoded value byte. `symbol` is
    /// looked up in the field's symbol map first; if absent there, it is
    /// parsed as a raw decimal integer and range-checked.
    pub fn resolve_address(
        &self,
        section: &str,
        group: &str,
        field: &str,
        symbol: Option<&str>,
    ) -> Result<(Address, Option<u8>)> {
        let sec = self.section(section)?;
        let grp = self.group(&sec.table, group)?;
        let fld = self.field(&grp.table, field)?;

        let base = pad4(&sec.address);
        let rel = pad4(&grp.address);
        let offset = pad4(&fld.offset);

        let addr = Address(base.to_be_bytes())
            .checked_add(rel)
            .and_then(|a| a.checked_add(offset))
            .ok_or_else(|| {
                Error::InvalidSchema(format!("address overflow resolving {section}.{group}.{field}"))
            })?;

        let value = match symbol {
            None => None,
            Some(s) => Some(encode_value(field, fld, s)?),
        };

        Ok((addr, value))
    }
}

fn encode_value(field: &str, fld: &FieldDef, symbol: &str) -> Result<u8> {
    if let Some(code) = fld.values.get(symbol) {
        return u8::try_from(*code)
            .map_err(|_| Error::InvalidSchema(format!("{field} code {code} does not fit in a byte")));
    }
    let raw: i64 = symbol
        .parse()
        .map_err(|_| Error::SchemaMissing(format!("{field}={symbol}")))?;
    if raw < fld.value_range.0 || raw > fld.value_range.1 {
        return Err(Error::ValueOutOfRange {
            field: field.to_string(),
            value: raw,
            lo: fld.value_range.0,
            hi: fld.value_range.1,
        });
    }
    u8::try_from(raw).map_err(|_| Error::InvalidSchema(format!("{field} value {raw} does not fit in a byte")))
}

fn group_entries(table_name: &str, raw: HashMap<String, TableEntry>) -> Result<HashMap<String, GroupDef>> {
    raw.into_iter()
        .map(|(k, v)| match v {
            TableEntry::Group(g) => Ok((k, g)),
            TableEntry::Field(_) => {
                Err(Error::InvalidSchema(format!("{table_name}.{k} is a field entry in a group table")))
            }
        })
        .collect()
}

fn field_entries(table_name: &str, raw: HashMap<String, TableEntry>) -> Result<HashMap<String, FieldDef>> {
    raw.into_iter()
        .map(|(k, v)| match v {
            TableEntry::Field(f) => Ok((k, f)),
            TableEntry::Group(_) => {
                Err(Error::InvalidSchema(format!("{table_name}.{k} is a group entry in a field table")))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_bundle() {
        SchemaStore::load_embedded().expect("embedded bundle must parse");
    }

    #[test]
    fn resolves_fx1_sw() {
        let store = SchemaStore::load_embedded().unwrap();
        let (addr, value) = store
            .resolve_address("patch (temporary patch)", "fx1", "SW", Some("ON"))
            .unwrap();
        assert_eq!(value, Some(1));
        assert_eq!(addr.0.len(), 4);
    }

    #[test]
    fn fx4_lives_in_patch3() {
        let store = SchemaStore::load_embedded().unwrap();
        let (addr4, _) = store
            .resolve_address("patch3 (temporary patch)", "fx4", "SW", Some("ON"))
            .unwrap();
        let (addr1, _) = store
            .resolve_address("patch (temporary patch)", "fx1", "SW", Some("ON"))
            .unwrap();
        assert_ne!(addr4.0, addr1.0);
    }

    #[test]
    fn eq_level_raw_value() {
        let store = SchemaStore::load_embedded().unwrap();
        let (_, value) = store
            .resolve_address("patch (temporary patch)", "eq", "LEVEL", Some("32"))
            .unwrap();
        assert_eq!(value, Some(32));
    }

    #[test]
    fn eq_level_out_of_range() {
        let store = SchemaStore::load_embedded().unwrap();
        let err = store.resolve_address("patch (temporary patch)", "eq", "LEVEL", Some("5"));
        assert!(err.is_err());
    }

    #[test]
    fn unknown_section_is_schema_missing() {
        let store = SchemaStore::load_embedded().unwrap();
        let err = store.resolve_address("no such section", "fx1", "SW", None);
        assert!(matches!(err, Err(Error::SchemaMissing(_))));
    }
}
