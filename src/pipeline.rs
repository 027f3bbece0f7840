//! Pass pipeline: which passes run, in what order, into which buffers.
//!
//! The composition is fixed: Scene -> Lensing -> Bloom. Each pass can be
//! switched off; disabled passes are skipped and the next enabled pass reads
//! whatever the previous enabled one wrote. The plan is pure data, executed
//! by a [`RenderBackend`] (GPU or software).

use anyhow::Result;

use crate::camera::Camera;
use crate::scene::Scene;
use crate::uniforms::{FrameUniforms, UniformValue};

/// Largest buffer edge the pipeline will allocate.
pub const MAX_EXTENT: u32 = 8192;

/// Intermediate buffers needed by a three-pass chain (ping-pong).
pub const INTERMEDIATE_BUFFERS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Scene,
    Lensing,
    Bloom,
}

impl PassKind {
    /// Execution order.
    pub const ALL: [PassKind; 3] = [PassKind::Scene, PassKind::Lensing, PassKind::Bloom];

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::Scene => "scene",
            PassKind::Lensing => "lensing",
            PassKind::Bloom => "bloom",
        }
    }

    fn index(self) -> usize {
        match self {
            PassKind::Scene => 0,
            PassKind::Lensing => 1,
            PassKind::Bloom => 2,
        }
    }
}

/// Pixel size of every buffer in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderExtent {
    pub width: u32,
    pub height: u32,
}

impl RenderExtent {
    /// Clamped to `1..=MAX_EXTENT` on both axes.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(1, MAX_EXTENT),
            height: height.clamp(1, MAX_EXTENT),
        }
    }

    /// `floor(width * scale) x floor(height * scale)`, clamped.
    ///
    /// Zero, negative or non-finite inputs produce 1 on that axis and log a
    /// warning; they are never an error.
    pub fn scaled(width: f64, height: f64, scale: f64) -> Self {
        Self {
            width: Self::scaled_axis("width", width, scale),
            height: Self::scaled_axis("height", height, scale),
        }
    }

    fn scaled_axis(axis: &str, size: f64, scale: f64) -> u32 {
        let value = (size * scale).floor();
        if !value.is_finite() || value < 1.0 {
            log::warn!(
                "Render {} {} x scale {} is not a usable size, clamping to 1",
                axis,
                size,
                scale
            );
            return 1;
        }
        if value > MAX_EXTENT as f64 {
            log::warn!("Render {} {} exceeds {}, clamping", axis, value, MAX_EXTENT);
            return MAX_EXTENT;
        }
        value as u32
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of a buffer downsampled by `factor` (at least 1x1).
    pub fn downsampled(&self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self::new(self.width / factor, self.height / factor)
    }
}

/// Where a pass reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// A black, fully opaque buffer.
    Cleared,
    Buffer(usize),
}

/// Where a pass writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Buffer(usize),
    /// The presentable surface.
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassStep {
    pub kind: PassKind,
    pub input: Source,
    pub output: Target,
}

/// Enable flags and current extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassPipeline {
    enabled: [bool; 3],
    extent: RenderExtent,
}

impl PassPipeline {
    pub fn new(extent: RenderExtent) -> Self {
        Self {
            enabled: [true; 3],
            extent,
        }
    }

    pub fn is_enabled(&self, kind: PassKind) -> bool {
        self.enabled[kind.index()]
    }

    /// Returns whether the flag changed.
    pub fn set_enabled(&mut self, kind: PassKind, enabled: bool) -> bool {
        let slot = &mut self.enabled[kind.index()];
        let changed = *slot != enabled;
        *slot = enabled;
        changed
    }

    pub fn extent(&self) -> RenderExtent {
        self.extent
    }

    pub fn set_extent(&mut self, extent: RenderExtent) -> bool {
        let changed = self.extent != extent;
        self.extent = extent;
        changed
    }

    /// Steps for the enabled passes, in order.
    ///
    /// Intermediate outputs alternate between the two buffers so a pass never
    /// reads the buffer it writes. The last step writes [`Target::Output`].
    pub fn plan(&self) -> Vec<PassStep> {
        let kinds: Vec<PassKind> = PassKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect();

        let mut steps = Vec::with_capacity(kinds.len());
        let mut input = Source::Cleared;
        for (i, kind) in kinds.iter().enumerate() {
            let last = i + 1 == kinds.len();
            let output = if last {
                Target::Output
            } else {
                Target::Buffer(i % INTERMEDIATE_BUFFERS)
            };
            steps.push(PassStep {
                kind: *kind,
                input,
                output,
            });
            if let Target::Buffer(b) = output {
                input = Source::Buffer(b);
            }
        }
        steps
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Everything a backend reads to render one frame.
pub struct FrameInputs<'a> {
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub uniforms: &'a FrameUniforms,
}

/// Executes pass plans.
pub trait RenderBackend {
    /// What the final pass writes into.
    type Target;

    /// Reallocate every intermediate buffer at `extent`.
    fn resize(&mut self, extent: RenderExtent);

    /// Run `steps` in order. An empty plan clears the target to black.
    fn execute(
        &mut self,
        steps: &[PassStep],
        frame: &FrameInputs<'_>,
        target: &mut Self::Target,
    ) -> Result<()>;

    /// Sizes of the intermediate buffers currently allocated.
    fn buffer_extents(&self) -> Vec<RenderExtent>;
}

/// Owns the pass pipeline and the backend that runs it.
pub struct Composer<B: RenderBackend> {
    pipeline: PassPipeline,
    backend: B,
}

impl<B: RenderBackend> Composer<B> {
    pub fn new(mut backend: B, extent: RenderExtent) -> Self {
        backend.resize(extent);
        Self {
            pipeline: PassPipeline::new(extent),
            backend,
        }
    }

    pub fn pipeline(&self) -> &PassPipeline {
        &self.pipeline
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn extent(&self) -> RenderExtent {
        self.pipeline.extent()
    }

    pub fn set_pass_enabled(&mut self, kind: PassKind, enabled: bool) {
        if self.pipeline.set_enabled(kind, enabled) {
            log::debug!("Pass {} {}", kind.name(), if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Resize the chain to `floor(width * scale) x floor(height * scale)` and
    /// rebind the lensing `resolution` to the new extent.
    pub fn resize(
        &mut self,
        width: impl Into<f64>,
        height: impl Into<f64>,
        scale: impl Into<f64>,
        uniforms: &mut FrameUniforms,
    ) -> Result<RenderExtent> {
        let extent = RenderExtent::scaled(width.into(), height.into(), scale.into());
        if self.pipeline.set_extent(extent) {
            log::debug!("Render extent {}x{}", extent.width, extent.height);
            self.backend.resize(extent);
        }
        uniforms.set_resolution(extent)?;
        Ok(extent)
    }

    /// Render one frame into `target`.
    ///
    /// Texture uniforms are bound from the plan, then every set a step reads
    /// is validated before the backend runs.
    pub fn render(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        uniforms: &mut FrameUniforms,
        target: &mut B::Target,
    ) -> Result<()> {
        let steps = self.pipeline.plan();
        for step in &steps {
            let set = uniforms.for_pass_mut(step.kind);
            if set.decls().iter().any(|d| d.name == "source") {
                set.set("source", UniformValue::Texture(step.input))?;
            }
            set.validate()?;
        }
        let frame = FrameInputs {
            scene,
            camera,
            uniforms,
        };
        self.backend.execute(&steps, &frame, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> PassPipeline {
        PassPipeline::new(RenderExtent::new(320, 200))
    }

    #[test]
    fn test_full_plan() {
        let steps = pipeline().plan();
        assert_eq!(
            steps,
            vec![
                PassStep {
                    kind: PassKind::Scene,
                    input: Source::Cleared,
                    output: Target::Buffer(0)
                },
                PassStep {
                    kind: PassKind::Lensing,
                    input: Source::Buffer(0),
                    output: Target::Buffer(1)
                },
                PassStep {
                    kind: PassKind::Bloom,
                    input: Source::Buffer(1),
                    output: Target::Output
                },
            ]
        );
    }

    #[test]
    fn test_disabled_pass_is_skipped() {
        let mut p = pipeline();
        p.set_enabled(PassKind::Lensing, false);
        let steps = p.plan();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].kind, PassKind::Bloom);
        assert_eq!(steps[1].input, Source::Buffer(0));
        assert_eq!(steps[1].output, Target::Output);
    }

    #[test]
    fn test_single_pass_writes_output() {
        let mut p = pipeline();
        p.set_enabled(PassKind::Scene, false);
        p.set_enabled(PassKind::Bloom, false);
        assert_eq!(
            p.plan(),
            vec![PassStep {
                kind: PassKind::Lensing,
                input: Source::Cleared,
                output: Target::Output
            }]
        );
    }

    #[test]
    fn test_nothing_enabled_is_empty() {
        let mut p = pipeline();
        for kind in PassKind::ALL {
            p.set_enabled(kind, false);
        }
        assert!(p.plan().is_empty());
    }

    #[test]
    fn test_set_enabled_reports_change() {
        let mut p = pipeline();
        assert!(!p.set_enabled(PassKind::Bloom, true));
        assert!(p.set_enabled(PassKind::Bloom, false));
        assert!(!p.is_enabled(PassKind::Bloom));
    }

    #[test]
    fn test_scaled_extent() {
        assert_eq!(RenderExtent::scaled(801.0, 601.0, 0.5), RenderExtent::new(400, 300));
        assert_eq!(RenderExtent::scaled(1280.0, 720.0, 2.0), RenderExtent::new(2560, 1440));
        assert_eq!(RenderExtent::scaled(0.0, -5.0, 1.0), RenderExtent::new(1, 1));
        assert_eq!(RenderExtent::scaled(f64::NAN, 100.0, 1.0), RenderExtent::new(1, 100));
        assert_eq!(RenderExtent::scaled(100.0, 100.0, 1000.0).width, MAX_EXTENT);
    }

    #[test]
    fn test_downsampled() {
        assert_eq!(RenderExtent::new(101, 3).downsampled(2), RenderExtent::new(50, 1));
        assert_eq!(RenderExtent::new(1, 1).downsampled(2), RenderExtent::new(1, 1));
    }
}
