//! Input image normalization.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Fetch** | `reqwest` blocking client with a bounded timeout |
//! | **Inline decode** | `base64` standard alphabet |
//! | **Canonicalize** | `image` decode → RGB8 → Lanczos3 downscale → PNG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Source**: [`SourceLoader`], turning an [`ImageSource`](crate::types::ImageSource) into raw bytes
//! - **Normalize**: [`Normalizer`] and [`normalize_bytes`]

mod calculations;
pub mod normalize;
pub mod source;

pub use calculations::{bounded_dimensions, scale_factor};
pub use normalize::{NormalizedImage, Normalizer, normalize_bytes};
pub use source::{SourceLoader, decode_inline};
