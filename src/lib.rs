//! Lossy image compression via data-parallel k-means color quantization.
//!
//! `kquant` reduces an image's palette to `K` representative colors by running
//! a fixed number of k-means iterations on an in-process compute device, then
//! rebuilds the image by substituting each pixel with its cluster's color.
//!
//! Each iteration runs two data-parallel stages on an in-order command queue:
//! an assignment stage (one task per pixel, atomic accumulation into
//! per-cluster sums) followed by a centroid-update stage (one task per
//! cluster, with empty clusters reseeded from a random pixel).
//!
//! # Example
//! ```no_run
//! # use kquant::{Centroids, ClusterCount, PixelSlice};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = image::open("some image")?.into_rgba8();
//! let pixels = PixelSlice::try_from(&img)?;
//!
//! let k = ClusterCount::try_from(64)?;
//! let centroids = Centroids::from_random_pixels(pixels, k, 42);
//! let output = kquant::indexed_palette(pixels, 50, centroids, 42)?;
//!
//! let rgba = kquant::to_rgba_bytes(&output, img.width(), img.height());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::many_single_char_names)]

pub mod device;
pub mod kernel;

mod kmeans;
mod remap;
mod types;

pub use kmeans::*;
pub use remap::*;
pub use types::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The largest cluster count the kernel program can be built for.
///
/// The update kernel sizes its per-cluster working storage at program build
/// time, so `K` is capped by the device rather than by the data model.
pub const MAX_CLUSTERS: u16 = 256;

/// The smallest meaningful cluster count.
pub const MIN_CLUSTERS: u16 = 2;
