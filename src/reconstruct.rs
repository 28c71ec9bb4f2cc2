//! Reconstruction of markup from stored rows.
//!
//! Stored tags only carry `(start, end, parent)`; their nesting order is
//! recovered by [`layout::arrange`], which yields an ordered list of
//! markers, and [`render::render`] interleaves those markers with the
//! document text.

pub mod generator;
pub mod layout;
pub mod render;

pub use generator::DocumentGenerator;
pub use layout::{Marker, MarkerKind, arrange};
pub use render::render;
