//! Effect Model: a typed view over the Schema Store. Knows how many
//! instances each category has, which two sliders a category (or, for
//! `fx`, the currently selected type) exposes, and the addressing quirks
//! that route some instances to a different section than the obvious one.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handshake::Model;
use crate::schema::SchemaStore;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Comp,
    Dist,
    Preamp,
    Ns,
    Eq,
    Delay,
    MstDelay,
    Chorus,
    Fx,
    PedalFx,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Comp => "comp",
            Category::Dist => "dist",
            Category::Preamp => "preamp",
            Category::Ns => "ns",
            Category::Eq => "eq",
            Category::Delay => "delay",
            Category::MstDelay => "mstDelay",
            Category::Chorus => "chorus",
            Category::Fx => "fx",
            Category::PedalFx => "pedalFx",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "comp" => Category::Comp,
            "dist" => Category::Dist,
            "preamp" => Category::Preamp,
            "ns" => Category::Ns,
            "eq" => Category::Eq,
            "delay" => Category::Delay,
            "mstDelay" => Category::MstDelay,
            "chorus" => Category::Chorus,
            "fx" => Category::Fx,
            "pedalFx" => Category::PedalFx,
            _ => return None,
        })
    }

    pub const ALL: [Category; 10] = [
        Category::Comp,
        Category::Dist,
        Category::Preamp,
        Category::Ns,
        Category::Eq,
        Category::Delay,
        Category::MstDelay,
        Category::Chorus,
        Category::Fx,
        Category::PedalFx,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slider {
    pub label: String,
    pub min: i64,
    pub max: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectView {
    pub category: Category,
    pub index: String,
    pub switch: bool,
    pub type_name: Option<String>,
    pub slider1: Option<Slider>,
    pub slider2: Option<Slider>,
}

const SECTION_PATCH: &str = "patch (temporary patch)";
const SECTION_PATCH2: &str = "patch2 (temporary patch)";
const SECTION_PATCH3: &str = "patch3 (temporary patch)";

/// Categories whose base group carries a `TYPE` field alongside `SW`. `ns`
/// and `delay` are the only ones that do not: their instances are named
/// `"{category}{index}"` with no vendor type name to show.
fn has_type_field(category: Category) -> bool {
    !matches!(category, Category::Ns | Category::Delay)
}

/// The two slider field labels for a non-`fx` category. `eq` additionally
/// depends on whether the parametric type is selected.
fn fixed_sliders(category: Category, type_name: Option<&str>) -> (Option<&'static str>, Option<&'static str>) {
    match category {
        Category::Comp => (Some("SUSTAIN"), Some("LEVEL")),
        Category::Dist => (Some("DRIVE"), Some("LEVEL")),
        Category::Preamp => (Some("GAIN"), Some("LEVEL")),
        Category::Ns => (Some("THRESHOLD"), Some("RELEASE")),
        Category::Eq => {
            if type_name == Some("PARAMETRIC") {
                (Some("LEVEL1"), None)
            } else {
                (Some("LEVEL"), None)
            }
        }
        Category::Delay | Category::MstDelay | Category::Chorus => (Some("EFFECT LEVEL"), Some("DIRECT LEVEL")),
        Category::PedalFx => (Some("EFFECT LEVEL"), Some("DIRECT MIX")),
        Category::Fx => unreachable!("fx sliders are type-dependent, see fx_sliders"),
    }
}

/// The fx-type-to-slider-pair decision table. A partial transcription of
/// the vendor parameter map (see DESIGN.md); types not listed here have no
/// sliders at all, by design (e.g. pure switches like ISOLATOR).
fn fx_sliders(type_name: &str) -> (Option<&'static str>, Option<&'static str>) {
    match type_name {
        "AC GUITAR SIM" | "AC RESONANCE" => (Some("LEVEL"), None),
        "AUTO WAH" | "DEFRETTER BASS" | "FLANGER" | "PAN" | "PHASER" | "RING MOD" | "ROTARY" | "SITAR SIM"
        | "SLICER" | "TOUCH WAH" | "TREMOLO" | "VIBRATO" | "FLANGER BASS" => (Some("EFFECT LEVEL"), Some("DIRECT MIX")),
        "CHORUS" => (Some("EFFECT LEVEL"), Some("DIRECT LEVEL")),
        "OVERTONE" => (Some("UPPER LEVEL"), Some("DIRECT LEVEL")),
        "OCTAVE" => (Some("OCTAVE LEVEL"), Some("DIRECT LEVEL")),
        "CLASSIC-VIBE" | "DEFRETTER" | "CHORUS BASS" => (Some("EFFECT LEVEL"), Some("DEPTH")),
        "SOUND HOLD" => (Some("EFFECT LEVEL"), Some("RISE TIME")),
        "S-BEND" => (Some("FALL TIME"), Some("RISE TIME")),
        "HUMANIZER" => (Some("LEVEL"), Some("DEPTH")),
        "DISTORTION" => (Some("DRIVE"), Some("LEVEL")),
        "MASTERING FX" => (Some("TONE"), Some("NATURAL")),
        "SLOW GEAR" | "SLOW GEAR BASS" => (Some("LEVEL"), Some("SENS")),
        "COMPRESSOR" => (Some("LEVEL"), Some("DIRECT MIX")),
        "FEEDBACKER" => (Some("FEEDBACK"), Some("OCT FEEDBACK")),
        "HARMONIST" => (Some("HR1:LEVEL"), Some("DIRECT LEVEL")),
        "PITCH SHIFTER" => (Some("PS1:LEVEL"), Some("DIRECT LEVEL")),
        _ => (None, None),
    }
}

/// PascalCase, space/hyphen/colon-stripped form of a vendor type name, used
/// to build the per-type group name (`fx1Flanger`) and field table suffix.
fn type_suffix(type_name: &str) -> String {
    type_name
        .replace(['-', ':'], " ")
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

/// The section an `fx` instance's *base* group (`SW`/`TYPE`) lives in.
/// Depends only on slot number.
fn fx_base_section(slot: u32) -> &'static str {
    if slot == 4 {
        SECTION_PATCH3
    } else {
        SECTION_PATCH
    }
}

/// The section an `fx` instance's type-specific slider group lives in.
/// Depends on slot number and the currently selected type.
fn fx_slider_section(slot: u32, type_name: &str) -> &'static str {
    if slot == 4 {
        SECTION_PATCH3
    } else if type_name.ends_with("BASS") {
        SECTION_PATCH2
    } else if type_name == "DISTORTION" || type_name == "MASTERING FX" {
        SECTION_PATCH3
    } else {
        SECTION_PATCH
    }
}

fn base_group_name(category: Category, index: &str) -> String {
    match category {
        Category::Preamp => format!("preamp{index}"),
        Category::Fx => format!("fx{index}"),
        _ => category.as_str().to_string(),
    }
}

pub struct EffectModel {
    schema: Arc<SchemaStore>,
    device_model: Model,
}

impl EffectModel {
    pub fn new(schema: Arc<SchemaStore>, device_model: Model) -> Self {
        Self { schema, device_model }
    }

    /// Every valid index for `category`: `["A", "B"]` for `preamp`,
    /// `["1".."N"]` for `fx` (N depends on the device model), `[""]` for
    /// every singleton category.
    pub fn instance_indices(&self, category: Category) -> Vec<String> {
        match category {
            Category::Preamp => vec!["A".to_string(), "B".to_string()],
            Category::Fx => (1..=self.device_model.fx_count()).map(|n| n.to_string()).collect(),
            _ => vec![String::new()],
        }
    }

    /// Every vendor type symbol defined for `category`, or empty for `ns`
    /// and `delay` which have no `TYPE` field.
    pub fn list_types(&self, category: Category) -> Result<Vec<String>> {
        if !has_type_field(category) {
            return Ok(Vec::new());
        }
        let index = self.instance_indices(category).into_iter().next().unwrap_or_default();
        let group = base_group_name(category, &index);
        let section = match category {
            Category::Fx => fx_base_section(1),
            _ => SECTION_PATCH,
        };
        self.schema.symbols(section, &group, "TYPE")
    }

    fn read_byte(&self, txn: &Transaction, section: &str, group: &str, field: &str) -> Result<u8> {
        let (addr, _) = self.schema.resolve_address(section, group, field, None)?;
        let body = txn.fetch(addr.0, 1, None)?;
        body.first().copied().ok_or(Error::Timeout)
    }

    fn current_type(&self, txn: &Transaction, category: Category, index: &str) -> Result<Option<String>> {
        if !has_type_field(category) {
            return Ok(None);
        }
        let section = match category {
            Category::Fx => fx_base_section(index.parse().unwrap_or(1)),
            _ => SECTION_PATCH,
        };
        let group = base_group_name(category, index);
        let byte = self.read_byte(txn, section, &group, "TYPE")?;
        Ok(Some(self.schema.decode(section, &group, "TYPE", byte)?))
    }

    fn slider(&self, txn: &Transaction, section: &str, group: &str, label: &str) -> Option<Slider> {
        let (lo, hi) = self.schema.value_range(section, group, label).ok()?;
        let byte = self.read_byte(txn, section, group, label).ok()?;
        Some(Slider {
            label: label.to_string(),
            min: lo,
            max: hi,
            value: byte as i64,
        })
    }

    /// Reads one instance's full state from the device.
    pub fn read(&self, txn: &Transaction, category: Category, index: &str) -> Result<EffectView> {
        let base_section = match category {
            Category::Fx => fx_base_section(index.parse().unwrap_or(1)),
            _ => SECTION_PATCH,
        };
        let base_group = base_group_name(category, index);

        let sw_byte = self.read_byte(txn, base_section, &base_group, "SW")?;
        let switch = self.schema.decode(base_section, &base_group, "SW", sw_byte)? == "ON";

        let type_name = self.current_type(txn, category, index)?;

        let (label1, label2) = if category == Category::Fx {
            match &type_name {
                Some(t) => fx_sliders(t),
                None => (None, None),
            }
        } else {
            fixed_sliders(category, type_name.as_deref())
        };

        let (slider_section, slider_group): (&str, String) = if category == Category::Fx {
            let slot: u32 = index.parse().unwrap_or(1);
            match &type_name {
                Some(t) => (fx_slider_section(slot, t), format!("fx{index}{}", type_suffix(t))),
                None => (base_section, base_group.clone()),
            }
        } else {
            (base_section, base_group.clone())
        };

        let slider1 = label1.and_then(|l| self.slider(txn, slider_section, &slider_group, l));
        let slider2 = label2.and_then(|l| self.slider(txn, slider_section, &slider_group, l));

        Ok(EffectView {
            category,
            index: index.to_string(),
            switch,
            type_name,
            slider1,
            slider2,
        })
    }

    pub fn write_switch(&self, txn: &Transaction, category: Category, index: &str, on: bool) -> Result<()> {
        let section = match category {
            Category::Fx => fx_base_section(index.parse().unwrap_or(1)),
            _ => SECTION_PATCH,
        };
        let group = base_group_name(category, index);
        let symbol = if on { "ON" } else { "OFF" };
        let (addr, value) = self.schema.resolve_address(section, &group, "SW", Some(symbol))?;
        txn.set(addr.0, &[value.expect("SW always encodes a value")])
    }

    pub fn write_type(&self, txn: &Transaction, category: Category, index: &str, type_symbol: &str) -> Result<()> {
        if !has_type_field(category) {
            return Err(Error::SchemaMissing(format!("{category} has no TYPE field")));
        }
        let section = match category {
            Category::Fx => fx_base_section(index.parse().unwrap_or(1)),
            _ => SECTION_PATCH,
        };
        let group = base_group_name(category, index);
        let (addr, value) = self.schema.resolve_address(section, &group, "TYPE", Some(type_symbol))?;
        txn.set(addr.0, &[value.expect("TYPE always encodes a value")])
    }

    /// Writes a raw slider value by field label. For `fx`, this first reads
    /// the instance's current type (since the slider lives in a
    /// type-specific group) before resolving the address.
    pub fn write_value(&self, txn: &Transaction, category: Category, index: &str, field_label: &str, value: i64) -> Result<()> {
        let (section, group): (&str, String) = if category == Category::Fx {
            let slot: u32 = index.parse().unwrap_or(1);
            let type_name = self
                .current_type(txn, category, index)?
                .ok_or_else(|| Error::SchemaMissing(format!("fx{index} has no selected type")))?;
            (fx_slider_section(slot, &type_name), format!("fx{index}{}", type_suffix(&type_name)))
        } else {
            (SECTION_PATCH, base_group_name(category, index))
        };
        let (addr, encoded) = self
            .schema
            .resolve_address(section, &group, field_label, Some(&value.to_string()))?;
        txn.set(addr.0, &[encoded.expect("slider fields always encode a value")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_suffix_matches_addressing_quirks() {
        assert_eq!(type_suffix("DISTORTION"), "Distortion");
        assert_eq!(type_suffix("MASTERING FX"), "MasteringFx");
        assert_eq!(type_suffix("CHORUS BASS"), "ChorusBass");
        assert_eq!(type_suffix("FLANGER BASS"), "FlangerBass");
        assert_eq!(type_suffix("S-BEND"), "SBend");
        assert_eq!(type_suffix("HR1:LEVEL"), "Hr1Level");
    }

    #[test]
    fn fx4_always_routes_to_patch3() {
        assert_eq!(fx_base_section(4), SECTION_PATCH3);
        assert_eq!(fx_slider_section(4, "FLANGER"), SECTION_PATCH3);
        assert_eq!(fx_slider_section(4, "CHORUS BASS"), SECTION_PATCH3);
    }

    #[test]
    fn bass_types_route_to_patch2_except_on_slot4() {
        assert_eq!(fx_slider_section(1, "CHORUS BASS"), SECTION_PATCH2);
        assert_eq!(fx_slider_section(3, "FLANGER BASS"), SECTION_PATCH2);
    }

    #[test]
    fn dist_and_masterfx_route_to_patch3() {
        assert_eq!(fx_slider_section(1, "DISTORTION"), SECTION_PATCH3);
        assert_eq!(fx_slider_section(2, "MASTERING FX"), SECTION_PATCH3);
    }

    #[test]
    fn plain_types_stay_in_patch() {
        assert_eq!(fx_slider_section(1, "FLANGER"), SECTION_PATCH);
    }

    #[test]
    fn unmapped_type_has_no_sliders() {
        assert_eq!(fx_sliders("ISOLATOR"), (None, None));
    }

    #[test]
    fn eq_exposes_exactly_one_slider_keyed_by_type() {
        assert_eq!(fixed_sliders(Category::Eq, Some("PARAMETRIC")), (Some("LEVEL1"), None));
        assert_eq!(fixed_sliders(Category::Eq, Some("GRAPHIC")), (Some("LEVEL"), None));
    }

    #[test]
    fn instance_indices_respect_device_model() {
        let schema = Arc::new(SchemaStore::load_embedded().unwrap());
        let core = EffectModel::new(schema.clone(), Model::Gt1000Core);
        assert_eq!(core.instance_indices(Category::Fx).len(), 3);
        let full = EffectModel::new(schema, Model::Gt1000);
        assert_eq!(full.instance_indices(Category::Fx).len(), 4);
        assert_eq!(full.instance_indices(Category::Preamp), vec!["A", "B"]);
        assert_eq!(full.instance_indices(Category::Comp), vec![""]);
    }
}
