//! Scoped restoration of context state after a pass overrides it.
//!
//! Passes like the shadow map or the skybox change the viewport, the render
//! targets or the fixed-function states, then must leave the context the way
//! the main pass expects it. [`RestoreGuard`] wraps the GPU for the duration of
//! such a pass and puts the flagged defaults back when dropped, including on an
//! early return or a panic.
//!
//! ```ignore
//! let mut gpu = RestoreGuard::new(gpu, RestoreFlags::VIEWPORT | RestoreFlags::RENDER_TARGETS);
//! gpu.set_viewport(Viewport::new(1024, 1024));
//! gpu.set_render_targets(None, Some(&shadow_dsv));
//! // ... draws ...
//! // dropped here: window viewport and back buffer + depth buffer rebound
//! ```

use std::ops::{Deref, DerefMut};

use crate::gpu::Gpu;

bitflags::bitflags! {
    /// Which pieces of state a [`RestoreGuard`] restores.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RestoreFlags: u8 {
        /// Full-window viewport.
        const VIEWPORT = 1 << 0;
        /// Back buffer and main depth buffer.
        const RENDER_TARGETS = 1 << 1;
        /// Default rasterizer state.
        const RASTERIZER = 1 << 2;
        /// Default depth-stencil state.
        const DEPTH_STENCIL = 1 << 3;
    }
}

pub struct RestoreGuard<'a> {
    gpu: &'a mut dyn Gpu,
    flags: RestoreFlags,
}

impl<'a> RestoreGuard<'a> {
    pub fn new(gpu: &'a mut dyn Gpu, flags: RestoreFlags) -> Self {
        Self { gpu, flags }
    }

    pub fn flags(&self) -> RestoreFlags {
        self.flags
    }
}

impl<'a> Deref for RestoreGuard<'a> {
    type Target = dyn Gpu + 'a;

    fn deref(&self) -> &Self::Target {
        self.gpu
    }
}

impl<'a> DerefMut for RestoreGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.gpu
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        let gpu = &mut *self.gpu;
        if self.flags.contains(RestoreFlags::VIEWPORT) {
            let viewport = gpu.window_viewport();
            gpu.set_viewport(viewport);
        }
        if self.flags.contains(RestoreFlags::RENDER_TARGETS) {
            let back = gpu.back_buffer();
            let depth = gpu.depth_buffer();
            gpu.set_render_targets(Some(&back), Some(&depth));
        }
        if self.flags.contains(RestoreFlags::RASTERIZER) {
            gpu.set_rasterizer_state(None);
        }
        if self.flags.contains(RestoreFlags::DEPTH_STENCIL) {
            gpu.set_depth_stencil_state(None);
        }
    }
}
