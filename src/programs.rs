//! GPU program assets.
//!
//! A program is one or more WGSL chunks joined in order (shared preludes such
//! as the noise library come first) plus the typed uniform table the frame
//! driver and backends bind against.

use crate::uniforms::{UniformDecl, UniformKind, DISK_UNIFORMS, LENSING_UNIFORMS};

pub const FULLSCREEN_WGSL: &str = include_str!("gpu/shaders/fullscreen.wgsl");
pub const SCENE_COMMON_WGSL: &str = include_str!("gpu/shaders/scene_common.wgsl");
pub const NOISE_WGSL: &str = include_str!("gpu/shaders/noise.wgsl");

/// WGSL sources and uniform table of one program.
#[derive(Debug)]
pub struct ProgramAsset {
    pub name: &'static str,
    /// Concatenated in order.
    pub sources: &'static [&'static str],
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub uniforms: &'static [UniformDecl],
}

impl ProgramAsset {
    /// Full module source.
    pub fn source(&self) -> String {
        self.sources.join("\n")
    }

    pub fn label(&self) -> String {
        format!("{} Shader", self.name)
    }
}

pub static STARS_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Stars",
    sources: &[SCENE_COMMON_WGSL, include_str!("gpu/shaders/stars.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[],
};

pub static HORIZON_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Horizon",
    sources: &[SCENE_COMMON_WGSL, include_str!("gpu/shaders/horizon.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[],
};

pub static DISK_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Disk",
    sources: &[SCENE_COMMON_WGSL, NOISE_WGSL, include_str!("gpu/shaders/disk.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: DISK_UNIFORMS,
};

pub static LENSING_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Lensing",
    sources: &[FULLSCREEN_WGSL, include_str!("gpu/shaders/lensing.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: LENSING_UNIFORMS,
};

pub static BLOOM_THRESHOLD_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Bloom Threshold",
    sources: &[FULLSCREEN_WGSL, include_str!("gpu/shaders/bloom_threshold.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("source", UniformKind::Texture),
        UniformDecl::new("threshold", UniformKind::Float),
    ],
};

pub static BLOOM_BLUR_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Bloom Blur",
    sources: &[FULLSCREEN_WGSL, include_str!("gpu/shaders/bloom_blur.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("source", UniformKind::Texture),
        UniformDecl::new("radius", UniformKind::Float),
    ],
};

pub static BLOOM_COMPOSITE_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Bloom Composite",
    sources: &[FULLSCREEN_WGSL, include_str!("gpu/shaders/bloom_composite.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("source", UniformKind::Texture),
        UniformDecl::new("strength", UniformKind::Float),
    ],
};

/// Texture copy, used for upscaling and pass-through.
pub static BLIT_PROGRAM: ProgramAsset = ProgramAsset {
    name: "Blit",
    sources: &[FULLSCREEN_WGSL, include_str!("gpu/shaders/blit.wgsl")],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[UniformDecl::new("source", UniformKind::Texture)],
};

pub static ALL_PROGRAMS: &[&ProgramAsset] = &[
    &STARS_PROGRAM,
    &HORIZON_PROGRAM,
    &DISK_PROGRAM,
    &LENSING_PROGRAM,
    &BLOOM_THRESHOLD_PROGRAM,
    &BLOOM_BLUR_PROGRAM,
    &BLOOM_COMPOSITE_PROGRAM,
    &BLIT_PROGRAM,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_declared_uniform_is_referenced() {
        for program in ALL_PROGRAMS {
            let source = program.source();
            for decl in program.uniforms {
                assert!(
                    source.contains(decl.name),
                    "{} declares '{}' but never references it",
                    program.name,
                    decl.name
                );
            }
        }
    }

    #[test]
    fn test_entry_points_exist() {
        for program in ALL_PROGRAMS {
            let source = program.source();
            assert!(source.contains(&format!("fn {}(", program.vertex_entry)), "{}", program.name);
            assert!(source.contains(&format!("fn {}(", program.fragment_entry)), "{}", program.name);
            assert_eq!(source.matches("@vertex").count(), 1, "{}", program.name);
        }
    }

    #[test]
    fn test_noise_prelude_precedes_disk() {
        let source = DISK_PROGRAM.source();
        let noise_at = source.find("fn simplex_noise(").unwrap();
        let use_at = source.find("fn fs_main(").unwrap();
        assert!(noise_at < use_at);
    }
}
