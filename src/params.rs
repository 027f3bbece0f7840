//! The tunable parameter surface.
//!
//! [`Params`] is the single record of every user-adjustable value. It is only
//! mutated through [`ParamSurface::apply`], which clamps, rejects garbage and
//! reports what downstream state must react to the change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::PassKind;

// ============================================================================
// Parameter record
// ============================================================================

/// Current value of every tunable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
    pub disk_speed: f32,
    /// Linear RGB in [0, 1]; serialized as `#rrggbb`.
    #[serde(with = "hex_color")]
    pub disk_color: [f32; 3],
    pub lensing_mass: f32,
    pub lensing_radius: f32,
    pub resolution_scale: f32,
    pub bloom_enabled: bool,
    pub lensing_enabled: bool,
    pub stars_visible: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bloom_strength: 1.5,
            bloom_radius: 0.0,
            bloom_threshold: 0.0,
            disk_speed: 0.2,
            disk_color: [1.0, 170.0 / 255.0, 51.0 / 255.0],
            lensing_mass: 0.02,
            lensing_radius: 0.05,
            resolution_scale: 1.0,
            bloom_enabled: true,
            lensing_enabled: true,
            stars_visible: true,
        }
    }
}

impl Params {
    pub fn get(&self, id: ParamId) -> ParamValue {
        match id {
            ParamId::BloomStrength => ParamValue::Float(self.bloom_strength),
            ParamId::BloomRadius => ParamValue::Float(self.bloom_radius),
            ParamId::BloomThreshold => ParamValue::Float(self.bloom_threshold),
            ParamId::DiskSpeed => ParamValue::Float(self.disk_speed),
            ParamId::DiskColor => ParamValue::Color(self.disk_color),
            ParamId::LensingMass => ParamValue::Float(self.lensing_mass),
            ParamId::LensingRadius => ParamValue::Float(self.lensing_radius),
            ParamId::ResolutionScale => ParamValue::Float(self.resolution_scale),
            ParamId::BloomEnabled => ParamValue::Bool(self.bloom_enabled),
            ParamId::LensingEnabled => ParamValue::Bool(self.lensing_enabled),
            ParamId::StarsVisible => ParamValue::Bool(self.stars_visible),
        }
    }

    fn float_mut(&mut self, id: ParamId) -> Option<&mut f32> {
        match id {
            ParamId::BloomStrength => Some(&mut self.bloom_strength),
            ParamId::BloomRadius => Some(&mut self.bloom_radius),
            ParamId::BloomThreshold => Some(&mut self.bloom_threshold),
            ParamId::DiskSpeed => Some(&mut self.disk_speed),
            ParamId::LensingMass => Some(&mut self.lensing_mass),
            ParamId::LensingRadius => Some(&mut self.lensing_radius),
            ParamId::ResolutionScale => Some(&mut self.resolution_scale),
            _ => None,
        }
    }

    fn bool_mut(&mut self, id: ParamId) -> Option<&mut bool> {
        match id {
            ParamId::BloomEnabled => Some(&mut self.bloom_enabled),
            ParamId::LensingEnabled => Some(&mut self.lensing_enabled),
            ParamId::StarsVisible => Some(&mut self.stars_visible),
            _ => None,
        }
    }

    /// Copy with every value forced into its bounds; non-finite values fall
    /// back to the default. Used for records loaded from disk.
    pub fn sanitized(&self) -> Self {
        let defaults = Params::default();
        let mut out = self.clone();
        for id in ParamId::ALL {
            let ParamKind::Float { min, max } = id.def().kind else {
                continue;
            };
            if let (Some(value), ParamValue::Float(fallback)) = (out.float_mut(id), defaults.get(id)) {
                if !value.is_finite() {
                    log::warn!("{} is not finite, using default {}", id, fallback);
                    *value = fallback;
                } else if *value < min || *value > max {
                    log::warn!("{} = {} out of range [{}, {}], clamping", id, value, min, max);
                    *value = value.clamp(min, max);
                }
            }
        }
        out.disk_color = if out.disk_color.iter().all(|c| c.is_finite()) {
            out.disk_color.map(|c| c.clamp(0.0, 1.0))
        } else {
            defaults.disk_color
        };
        out
    }
}

// ============================================================================
// Parameter definitions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    BloomStrength,
    BloomRadius,
    BloomThreshold,
    DiskSpeed,
    DiskColor,
    LensingMass,
    LensingRadius,
    ResolutionScale,
    BloomEnabled,
    LensingEnabled,
    StarsVisible,
}

impl ParamId {
    pub const ALL: [ParamId; 11] = [
        ParamId::BloomStrength,
        ParamId::BloomRadius,
        ParamId::BloomThreshold,
        ParamId::DiskSpeed,
        ParamId::DiskColor,
        ParamId::LensingMass,
        ParamId::LensingRadius,
        ParamId::ResolutionScale,
        ParamId::BloomEnabled,
        ParamId::LensingEnabled,
        ParamId::StarsVisible,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamId::BloomStrength => "bloom_strength",
            ParamId::BloomRadius => "bloom_radius",
            ParamId::BloomThreshold => "bloom_threshold",
            ParamId::DiskSpeed => "disk_speed",
            ParamId::DiskColor => "disk_color",
            ParamId::LensingMass => "lensing_mass",
            ParamId::LensingRadius => "lensing_radius",
            ParamId::ResolutionScale => "resolution_scale",
            ParamId::BloomEnabled => "bloom_enabled",
            ParamId::LensingEnabled => "lensing_enabled",
            ParamId::StarsVisible => "stars_visible",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn def(&self) -> ParamDef {
        let defaults = Params::default();
        let (label, kind) = match self {
            ParamId::BloomStrength => ("Bloom strength", ParamKind::float(0.0, 3.0)),
            ParamId::BloomRadius => ("Bloom radius", ParamKind::float(0.0, 1.0)),
            ParamId::BloomThreshold => ("Bloom threshold", ParamKind::float(0.0, 1.0)),
            ParamId::DiskSpeed => ("Disk rotation speed", ParamKind::float(0.0, 2.0)),
            ParamId::DiskColor => ("Disk colour", ParamKind::Color),
            ParamId::LensingMass => ("Lensing mass", ParamKind::float(0.0, 0.1)),
            ParamId::LensingRadius => ("Horizon radius", ParamKind::float(0.0, 0.5)),
            ParamId::ResolutionScale => ("Resolution scale", ParamKind::float(0.1, 2.0)),
            ParamId::BloomEnabled => ("Bloom", ParamKind::Bool),
            ParamId::LensingEnabled => ("Lensing", ParamKind::Bool),
            ParamId::StarsVisible => ("Stars", ParamKind::Bool),
        };
        ParamDef {
            id: *self,
            label,
            kind,
            default: defaults.get(*self),
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value type and bounds of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Float { min: f32, max: f32 },
    Bool,
    Color,
}

impl ParamKind {
    const fn float(min: f32, max: f32) -> Self {
        ParamKind::Float { min, max }
    }
}

/// A parameter value
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
    Color([f32; 3]),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
            ParamValue::Color(_) => "color",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Color(rgb) => f.write_str(&hex_color::format(rgb)),
        }
    }
}

/// Parameter definition for the control panel
#[derive(Clone, Debug, Serialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub label: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
}

impl Serialize for ParamId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ============================================================================
// Parameter surface
// ============================================================================

/// A request to change one parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamUpdate {
    pub id: ParamId,
    pub value: ParamValue,
}

impl ParamUpdate {
    pub fn new(id: ParamId, value: ParamValue) -> Self {
        Self { id, value }
    }
}

/// Downstream work caused by a parameter change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reaction {
    /// Bloom threshold, strength or radius changed.
    BloomUniforms,
    DiskColor,
    /// Lensing mass or horizon radius changed.
    LensingUniforms,
    /// Reallocate the buffer chain at the new scale.
    Resize(f32),
    PassToggled(PassKind, bool),
    StarsVisible(bool),
    /// Read by the frame driver every tick; nothing to rebuild.
    ReadEachTick,
}

/// Why an update was refused.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    NotFinite(ParamId),
    TypeMismatch {
        id: ParamId,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotFinite(id) => write!(f, "{} must be a finite number", id),
            Rejection::TypeMismatch { id, expected, found } => {
                write!(f, "{} expects a {} value, got {}", id, expected, found)
            }
        }
    }
}

/// Single writer of the [`Params`] record.
#[derive(Clone, Debug, Default)]
pub struct ParamSurface {
    params: Params,
}

impl ParamSurface {
    pub fn new(params: Params) -> Self {
        Self {
            params: params.sanitized(),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn get(&self, id: ParamId) -> ParamValue {
        self.params.get(id)
    }

    /// Apply an update. Rejections are logged and leave the record untouched;
    /// `None` means the record did not change.
    pub fn apply(&mut self, update: ParamUpdate) -> Option<Reaction> {
        match self.try_apply(update) {
            Ok(reaction) => reaction,
            Err(rejection) => {
                log::warn!("Rejected parameter update: {}", rejection);
                None
            }
        }
    }

    /// [`apply`](Self::apply) with the rejection reason returned.
    pub fn try_apply(&mut self, update: ParamUpdate) -> Result<Option<Reaction>, Rejection> {
        let id = update.id;
        let def = id.def();
        let changed = match (def.kind, update.value) {
            (ParamKind::Float { min, max }, ParamValue::Float(v)) => {
                if !v.is_finite() {
                    return Err(Rejection::NotFinite(id));
                }
                let clamped = v.clamp(min, max);
                if clamped != v {
                    log::debug!("{} = {} clamped to {}", id, v, clamped);
                }
                match self.params.float_mut(id) {
                    Some(slot) if *slot != clamped => {
                        *slot = clamped;
                        true
                    }
                    _ => false,
                }
            }
            (ParamKind::Bool, ParamValue::Bool(v)) => match self.params.bool_mut(id) {
                Some(slot) if *slot != v => {
                    *slot = v;
                    true
                }
                _ => false,
            },
            (ParamKind::Color, ParamValue::Color(rgb)) => {
                if !rgb.iter().all(|c| c.is_finite()) {
                    return Err(Rejection::NotFinite(id));
                }
                let clamped = rgb.map(|c| c.clamp(0.0, 1.0));
                if self.params.disk_color != clamped {
                    self.params.disk_color = clamped;
                    true
                } else {
                    false
                }
            }
            (_, value) => {
                return Err(Rejection::TypeMismatch {
                    id,
                    expected: def.default.type_name(),
                    found: value.type_name(),
                })
            }
        };

        if !changed {
            return Ok(None);
        }
        log::debug!("{} -> {}", id, self.params.get(id));
        Ok(Some(self.reaction(id)))
    }

    fn reaction(&self, id: ParamId) -> Reaction {
        let p = &self.params;
        match id {
            ParamId::BloomStrength | ParamId::BloomRadius | ParamId::BloomThreshold => {
                Reaction::BloomUniforms
            }
            ParamId::DiskSpeed => Reaction::ReadEachTick,
            ParamId::DiskColor => Reaction::DiskColor,
            ParamId::LensingMass | ParamId::LensingRadius => Reaction::LensingUniforms,
            ParamId::ResolutionScale => Reaction::Resize(p.resolution_scale),
            ParamId::BloomEnabled => Reaction::PassToggled(PassKind::Bloom, p.bloom_enabled),
            ParamId::LensingEnabled => Reaction::PassToggled(PassKind::Lensing, p.lensing_enabled),
            ParamId::StarsVisible => Reaction::StarsVisible(p.stars_visible),
        }
    }
}

// ============================================================================
// Hex colours
// ============================================================================

/// `#rrggbb` <-> linear `[f32; 3]`.
pub mod hex_color {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(text: &str) -> Option<[f32; 3]> {
        let digits = text
            .trim()
            .trim_start_matches('#')
            .trim_start_matches("0x");
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        Some([
            ((value >> 16) & 0xff) as f32 / 255.0,
            ((value >> 8) & 0xff) as f32 / 255.0,
            (value & 0xff) as f32 / 255.0,
        ])
    }

    pub fn format(rgb: &[f32; 3]) -> String {
        let [r, g, b] = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn serialize<S: Serializer>(rgb: &[f32; 3], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(rgb))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f32; 3], D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| serde::de::Error::custom(format!("invalid colour '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(id: ParamId, v: f32) -> ParamUpdate {
        ParamUpdate::new(id, ParamValue::Float(v))
    }

    #[test]
    fn test_defaults_match_table() {
        let p = Params::default();
        assert_eq!(p.bloom_strength, 1.5);
        assert_eq!(p.lensing_mass, 0.02);
        assert_eq!(p.lensing_radius, 0.05);
        assert_eq!(hex_color::format(&p.disk_color), "#ffaa33");
        for id in ParamId::ALL {
            assert_eq!(ParamId::from_name(id.name()), Some(id));
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let mut surface = ParamSurface::default();
        let reaction = surface.apply(float(ParamId::BloomStrength, 10.0));
        assert_eq!(reaction, Some(Reaction::BloomUniforms));
        assert_eq!(surface.params().bloom_strength, 3.0);

        surface.apply(float(ParamId::ResolutionScale, 0.0));
        assert_eq!(surface.params().resolution_scale, 0.1);
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let mut surface = ParamSurface::default();
        assert_eq!(
            surface.try_apply(float(ParamId::LensingMass, f32::NAN)),
            Err(Rejection::NotFinite(ParamId::LensingMass))
        );
        assert_eq!(surface.apply(float(ParamId::LensingMass, f32::INFINITY)), None);
        assert_eq!(surface.params().lensing_mass, 0.02);
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut surface = ParamSurface::default();
        let result = surface.try_apply(ParamUpdate::new(ParamId::BloomEnabled, ParamValue::Float(0.0)));
        assert!(matches!(result, Err(Rejection::TypeMismatch { .. })));
        assert!(surface.params().bloom_enabled);
    }

    #[test]
    fn test_unchanged_value_has_no_reaction() {
        let mut surface = ParamSurface::default();
        assert_eq!(surface.apply(float(ParamId::BloomStrength, 1.5)), None);
        assert_eq!(surface.apply(float(ParamId::DiskSpeed, 0.2)), None);
    }

    #[test]
    fn test_disk_speed_change_is_reported() {
        let mut surface = ParamSurface::default();
        assert_eq!(
            surface.apply(float(ParamId::DiskSpeed, 1.0)),
            Some(Reaction::ReadEachTick)
        );
        assert_eq!(surface.params().disk_speed, 1.0);
        assert_eq!(surface.apply(float(ParamId::DiskSpeed, 1.0)), None);
    }

    #[test]
    fn test_reactions() {
        let mut surface = ParamSurface::default();
        assert_eq!(
            surface.apply(ParamUpdate::new(ParamId::LensingEnabled, ParamValue::Bool(false))),
            Some(Reaction::PassToggled(PassKind::Lensing, false))
        );
        assert_eq!(
            surface.apply(float(ParamId::ResolutionScale, 0.5)),
            Some(Reaction::Resize(0.5))
        );
        assert_eq!(
            surface.apply(ParamUpdate::new(ParamId::DiskColor, ParamValue::Color([0.0, 0.5, 2.0]))),
            Some(Reaction::DiskColor)
        );
        assert_eq!(surface.params().disk_color, [0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_hex_color_parse() {
        assert_eq!(hex_color::parse("#ff0000"), Some([1.0, 0.0, 0.0]));
        assert_eq!(hex_color::parse("0x00ff00"), Some([0.0, 1.0, 0.0]));
        assert_eq!(hex_color::parse("0000ff"), Some([0.0, 0.0, 1.0]));
        assert_eq!(hex_color::parse("#fff"), None);
        assert_eq!(hex_color::parse("#gggggg"), None);
    }

    #[test]
    fn test_params_json() {
        let json = r##"{"bloom_strength": 2.0, "disk_color": "#3366ff"}"##;
        let p: Params = serde_json::from_str(json).unwrap();
        assert_eq!(p.bloom_strength, 2.0);
        assert_eq!(hex_color::format(&p.disk_color), "#3366ff");
        assert_eq!(p.lensing_mass, 0.02);
    }

    #[test]
    fn test_sanitized_clamps_loaded_values() {
        let p = Params {
            lensing_mass: 5.0,
            disk_speed: f32::NAN,
            ..Params::default()
        }
        .sanitized();
        assert_eq!(p.lensing_mass, 0.1);
        assert_eq!(p.disk_speed, 0.2);
    }
}
