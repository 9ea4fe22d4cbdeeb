//! Common renderer trait
//!
//! A video chip that produces frames implements [`Renderer`] so host code
//! can read the framebuffer without knowing the chip.
//!
//! ```rust,ignore
//! use emu_core::renderer::Renderer;
//! use emu_core::types::Frame;
//!
//! struct LineRenderer {
//!     frame: Frame,
//! }
//!
//! impl Renderer for LineRenderer {
//!     fn get_frame(&self) -> &Frame {
//!         &self.frame
//!     }
//!
//!     fn clear(&mut self, color: u32) {
//!         self.frame.pixels.fill(color);
//!     }
//!
//!     fn name(&self) -> &str {
//!         "Line Renderer"
//!     }
//! }
//! ```

use crate::types::Frame;

pub trait Renderer {
    /// Get the current framebuffer (read-only)
    fn get_frame(&self) -> &Frame;

    /// Clear the framebuffer with a solid ARGB8888 color (0xAARRGGBB)
    fn clear(&mut self, color: u32);

    /// Get the name of this renderer (for debugging/UI)
    fn name(&self) -> &str;
}
