//! Real-time black hole: starfield, event horizon and a procedural accretion
//! disk, post-processed with screen-space gravitational lensing and bloom.
//!
//! The pass chain is described once ([`pipeline`]) and executed by either
//! the wgpu backend ([`gpu`]) or the CPU backend ([`software`]).

pub mod bloom;
pub mod camera;
pub mod config;
pub mod control;
pub mod disk;
pub mod frame;
pub mod gpu;
pub mod lensing;
pub mod noise;
pub mod params;
pub mod pipeline;
pub mod programs;
pub mod scene;
pub mod software;
pub mod uniforms;

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
