//! Software (CPU) render backend.
//!
//! Executes the same pass plans as the GPU backend into [`Framebuffer`]s.
//! It needs no adapter, so it backs headless rendering on machines without a
//! GPU and every pipeline test.

pub mod framebuffer;
pub mod post;
pub mod raster;

use anyhow::{bail, Result};

pub use framebuffer::Framebuffer;

use crate::bloom::BloomParams;
use crate::disk::DiskParams;
use crate::lensing::LensingParams;
use crate::pipeline::{
    FrameInputs, PassKind, PassStep, RenderBackend, RenderExtent, Source, Target, INTERMEDIATE_BUFFERS,
};
use post::BloomScratch;

#[derive(Debug)]
pub struct SoftwareBackend {
    extent: RenderExtent,
    buffers: [Framebuffer; INTERMEDIATE_BUFFERS],
    /// Stays black; read by steps whose input is [`Source::Cleared`].
    cleared: Framebuffer,
    bloom: BloomScratch,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new(RenderExtent::new(1, 1))
    }
}

impl SoftwareBackend {
    pub fn new(extent: RenderExtent) -> Self {
        Self {
            extent,
            buffers: [Framebuffer::new(extent), Framebuffer::new(extent)],
            cleared: Framebuffer::new(extent),
            bloom: BloomScratch::default(),
        }
    }

    pub fn extent(&self) -> RenderExtent {
        self.extent
    }

    fn source(&self, source: Source) -> Result<&Framebuffer> {
        match source {
            Source::Cleared => Ok(&self.cleared),
            Source::Buffer(i) if i < INTERMEDIATE_BUFFERS => Ok(&self.buffers[i]),
            Source::Buffer(i) => bail!("Pass reads buffer {} but only {} exist", i, INTERMEDIATE_BUFFERS),
        }
    }

    fn run_step(&mut self, step: &PassStep, frame: &FrameInputs<'_>, out: &mut Framebuffer) -> Result<()> {
        let uniforms = frame.uniforms.for_pass(step.kind);
        match step.kind {
            PassKind::Scene => {
                let params = DiskParams::from_set(uniforms)?;
                raster::render_scene(frame.scene, frame.camera, &params, out);
            }
            PassKind::Lensing => {
                let params = LensingParams::from_set(uniforms)?;
                let input = self.source(uniforms.texture("source")?)?;
                post::lensing(input, &params, out);
            }
            PassKind::Bloom => {
                let params = BloomParams::from_set(uniforms)?;
                let source = uniforms.texture("source")?;
                let input = match source {
                    Source::Cleared => &self.cleared,
                    Source::Buffer(i) if i < INTERMEDIATE_BUFFERS => &self.buffers[i],
                    Source::Buffer(i) => bail!("Pass reads buffer {} but only {} exist", i, INTERMEDIATE_BUFFERS),
                };
                self.bloom.apply(input, &params, out);
            }
        }
        Ok(())
    }
}

impl RenderBackend for SoftwareBackend {
    type Target = Framebuffer;

    fn resize(&mut self, extent: RenderExtent) {
        self.extent = extent;
        for buffer in &mut self.buffers {
            buffer.resize(extent);
        }
        self.cleared.resize(extent);
    }

    fn execute(&mut self, steps: &[PassStep], frame: &FrameInputs<'_>, target: &mut Framebuffer) -> Result<()> {
        target.resize(self.extent);
        if steps.is_empty() {
            target.clear();
            return Ok(());
        }

        for step in steps {
            match step.output {
                Target::Output => self.run_step(step, frame, target)?,
                Target::Buffer(i) => {
                    if i >= INTERMEDIATE_BUFFERS {
                        bail!("Pass writes buffer {} but only {} exist", i, INTERMEDIATE_BUFFERS);
                    }
                    if step.input == Source::Buffer(i) {
                        bail!("Pass {} reads and writes buffer {}", step.kind.name(), i);
                    }
                    // Take the buffer out so the step can borrow its input
                    let mut out = std::mem::take(&mut self.buffers[i]);
                    let result = self.run_step(step, frame, &mut out);
                    self.buffers[i] = out;
                    result?;
                }
            }
        }
        Ok(())
    }

    fn buffer_extents(&self) -> Vec<RenderExtent> {
        self.buffers.iter().map(Framebuffer::extent).collect()
    }
}
