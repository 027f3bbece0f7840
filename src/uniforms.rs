//! Typed uniform tables.
//!
//! Every program declares its uniforms up front ([`UniformDecl`]); a
//! [`UniformSet`] holds the bound value of each one. Backends upload a set
//! only when its revision changed since the previous upload, so per-frame
//! values (time, centre) cost one write per frame and tunables cost nothing
//! until they change.

use std::collections::HashMap;
use std::fmt;

use glam::{Vec2, Vec3};

use crate::params::Params;
use crate::pipeline::{PassKind, RenderExtent, Source};

/// Value type of a declared uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Color,
    Texture,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Color => "color",
            UniformKind::Texture => "texture",
        };
        f.write_str(name)
    }
}

/// A bound uniform value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Color(Vec3),
    Texture(Source),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Color(_) => UniformKind::Color,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }
}

/// Declaration of one uniform in a program's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
    /// Rewritten every frame by the frame driver.
    pub per_frame: bool,
}

impl UniformDecl {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self {
            name,
            kind,
            per_frame: false,
        }
    }

    pub const fn per_frame(name: &'static str, kind: UniformKind) -> Self {
        Self {
            name,
            kind,
            per_frame: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformError {
    /// The program declares no uniform with this name.
    Unknown {
        program: &'static str,
        name: String,
    },
    /// The value does not match the declared kind.
    KindMismatch {
        program: &'static str,
        name: &'static str,
        expected: UniformKind,
        found: UniformKind,
    },
    /// A declared uniform has no value.
    Unbound {
        program: &'static str,
        name: &'static str,
    },
}

impl fmt::Display for UniformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformError::Unknown { program, name } => {
                write!(f, "program '{}' has no uniform '{}'", program, name)
            }
            UniformError::KindMismatch {
                program,
                name,
                expected,
                found,
            } => write!(
                f,
                "uniform '{}.{}' expects {} but was given {}",
                program, name, expected, found
            ),
            UniformError::Unbound { program, name } => {
                write!(f, "uniform '{}.{}' is not bound", program, name)
            }
        }
    }
}

impl std::error::Error for UniformError {}

/// Bound values for one program's uniform table.
#[derive(Clone, Debug)]
pub struct UniformSet {
    program: &'static str,
    decls: &'static [UniformDecl],
    values: HashMap<&'static str, UniformValue>,
    revision: u64,
}

impl UniformSet {
    pub fn new(program: &'static str, decls: &'static [UniformDecl]) -> Self {
        Self {
            program,
            decls,
            values: HashMap::new(),
            revision: 0,
        }
    }

    pub fn program(&self) -> &'static str {
        self.program
    }

    pub fn decls(&self) -> &'static [UniformDecl] {
        self.decls
    }

    /// Bind a value. Rebinding an identical value leaves the revision alone.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let decl = self
            .decls
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| UniformError::Unknown {
                program: self.program,
                name: name.to_string(),
            })?;

        if decl.kind != value.kind() {
            return Err(UniformError::KindMismatch {
                program: self.program,
                name: decl.name,
                expected: decl.kind,
                found: value.kind(),
            });
        }

        if self.values.get(decl.name) != Some(&value) {
            self.values.insert(decl.name, value);
            self.revision += 1;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    /// Incremented on every value change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Check that every declared uniform has a value.
    pub fn validate(&self) -> Result<(), UniformError> {
        for decl in self.decls {
            if !self.values.contains_key(decl.name) {
                return Err(UniformError::Unbound {
                    program: self.program,
                    name: decl.name,
                });
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<(&'static str, UniformValue), UniformError> {
        let decl = self
            .decls
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| UniformError::Unknown {
                program: self.program,
                name: name.to_string(),
            })?;
        let value = self.values.get(decl.name).ok_or(UniformError::Unbound {
            program: self.program,
            name: decl.name,
        })?;
        Ok((decl.name, *value))
    }

    fn mismatch(&self, name: &'static str, expected: UniformKind, found: &UniformValue) -> UniformError {
        UniformError::KindMismatch {
            program: self.program,
            name,
            expected,
            found: found.kind(),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32, UniformError> {
        match self.lookup(name)? {
            (_, UniformValue::Float(v)) => Ok(v),
            (name, other) => Err(self.mismatch(name, UniformKind::Float, &other)),
        }
    }

    pub fn vec2(&self, name: &str) -> Result<Vec2, UniformError> {
        match self.lookup(name)? {
            (_, UniformValue::Vec2(v)) => Ok(v),
            (name, other) => Err(self.mismatch(name, UniformKind::Vec2, &other)),
        }
    }

    pub fn color(&self, name: &str) -> Result<Vec3, UniformError> {
        match self.lookup(name)? {
            (_, UniformValue::Color(v)) => Ok(v),
            (name, other) => Err(self.mismatch(name, UniformKind::Color, &other)),
        }
    }

    pub fn texture(&self, name: &str) -> Result<Source, UniformError> {
        match self.lookup(name)? {
            (_, UniformValue::Texture(v)) => Ok(v),
            (name, other) => Err(self.mismatch(name, UniformKind::Texture, &other)),
        }
    }
}

// ============================================================================
// Frame uniforms
// ============================================================================

pub const DISK_UNIFORMS: &[UniformDecl] = &[
    UniformDecl::per_frame("time", UniformKind::Float),
    UniformDecl::new("color", UniformKind::Color),
];

pub const LENSING_UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new("source", UniformKind::Texture),
    UniformDecl::new("resolution", UniformKind::Vec2),
    UniformDecl::per_frame("center", UniformKind::Vec2),
    UniformDecl::new("mass", UniformKind::Float),
    UniformDecl::new("radius", UniformKind::Float),
];

pub const BLOOM_UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new("source", UniformKind::Texture),
    UniformDecl::new("threshold", UniformKind::Float),
    UniformDecl::new("strength", UniformKind::Float),
    UniformDecl::new("radius", UniformKind::Float),
];

/// Uniform sets of the three passes.
#[derive(Clone, Debug)]
pub struct FrameUniforms {
    pub disk: UniformSet,
    pub lensing: UniformSet,
    pub bloom: UniformSet,
}

impl FrameUniforms {
    /// Bind every uniform from the parameter record and render extent.
    ///
    /// The lensing centre starts at the middle of the screen and is replaced
    /// by the projected horizon on the first tick.
    pub fn new(params: &Params, extent: RenderExtent) -> Result<Self, UniformError> {
        let mut uniforms = Self {
            disk: UniformSet::new("disk", DISK_UNIFORMS),
            lensing: UniformSet::new("lensing", LENSING_UNIFORMS),
            bloom: UniformSet::new("bloom", BLOOM_UNIFORMS),
        };
        uniforms.disk.set("time", UniformValue::Float(0.0))?;
        uniforms.lensing.set("source", UniformValue::Texture(Source::Cleared))?;
        uniforms.lensing.set("center", UniformValue::Vec2(Vec2::splat(0.5)))?;
        uniforms.bloom.set("source", UniformValue::Texture(Source::Cleared))?;
        uniforms.set_resolution(extent)?;
        uniforms.apply_params(params)?;
        uniforms.validate()?;
        Ok(uniforms)
    }

    /// Push every tunable from `params`; unchanged values are no-ops.
    pub fn apply_params(&mut self, params: &Params) -> Result<(), UniformError> {
        self.disk
            .set("color", UniformValue::Color(Vec3::from_array(params.disk_color)))?;
        self.lensing.set("mass", UniformValue::Float(params.lensing_mass))?;
        self.lensing.set("radius", UniformValue::Float(params.lensing_radius))?;
        self.bloom.set("threshold", UniformValue::Float(params.bloom_threshold))?;
        self.bloom.set("strength", UniformValue::Float(params.bloom_strength))?;
        self.bloom.set("radius", UniformValue::Float(params.bloom_radius))?;
        Ok(())
    }

    pub fn set_resolution(&mut self, extent: RenderExtent) -> Result<(), UniformError> {
        self.lensing.set(
            "resolution",
            UniformValue::Vec2(Vec2::new(extent.width as f32, extent.height as f32)),
        )
    }

    /// The set read by `kind`'s pass.
    pub fn for_pass(&self, kind: PassKind) -> &UniformSet {
        match kind {
            PassKind::Scene => &self.disk,
            PassKind::Lensing => &self.lensing,
            PassKind::Bloom => &self.bloom,
        }
    }

    pub fn for_pass_mut(&mut self, kind: PassKind) -> &mut UniformSet {
        match kind {
            PassKind::Scene => &mut self.disk,
            PassKind::Lensing => &mut self.lensing,
            PassKind::Bloom => &mut self.bloom,
        }
    }

    pub fn validate(&self) -> Result<(), UniformError> {
        self.disk.validate()?;
        self.lensing.validate()?;
        self.bloom.validate()
    }
}
