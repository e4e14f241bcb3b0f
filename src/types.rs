//! Input, output, and parameter types shared across the crate.

use crate::{MAX_PIXELS, MIN_CLUSTERS};

use std::{
    error::Error,
    fmt::{self, Display},
};

use image::RgbaImage;
use palette::Srgb;

/// An error for [`PixelSlice`] construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelSliceError {
    /// The image holds more than [`MAX_PIXELS`](crate::MAX_PIXELS) pixels.
    AboveMaxPixels,
    /// The buffer length does not equal `width * height * 4`.
    LengthMismatch {
        /// The length implied by the dimensions.
        expected: usize,
        /// The length of the provided buffer.
        actual: usize,
    },
}

impl Display for PixelSliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PixelSliceError::AboveMaxPixels => {
                write!(f, "above the maximum image size of {MAX_PIXELS} pixels")
            }
            PixelSliceError::LengthMismatch { expected, actual } => {
                write!(f, "expected an rgba buffer of {expected} bytes but got {actual}")
            }
        }
    }
}

impl Error for PixelSliceError {}

/// A validated view over a flat, row-major, interleaved RGBA8 pixel buffer.
///
/// The invariant is that the buffer length equals `width * height * 4` and
/// the pixel count does not exceed [`MAX_PIXELS`](crate::MAX_PIXELS).
/// Alpha is carried through untouched by the codec boundary but ignored for
/// clustering.
///
/// Use [`PixelSlice::new`] for raw buffers or `try_from` for an [`RgbaImage`]:
/// ```no_run
/// # use kquant::PixelSlice;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("some image")?.into_rgba8();
/// let pixels = PixelSlice::try_from(&img)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSlice<'a> {
    /// Interleaved RGBA bytes, `width * height * 4` of them.
    data: &'a [u8],
    /// Image width in pixels.
    width: u32,
    /// Image height in pixels.
    height: u32,
}

impl<'a> PixelSlice<'a> {
    /// Creates a [`PixelSlice`] over `data`, checking the length invariant.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, PixelSliceError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > u64::from(MAX_PIXELS) {
            return Err(PixelSliceError::AboveMaxPixels);
        }
        let expected = pixels as usize * 4;
        if data.len() != expected {
            return Err(PixelSliceError::LengthMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, width, height })
    }

    /// The image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// The image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The total number of pixels.
    #[must_use]
    pub const fn num_pixels(&self) -> u32 {
        self.width * self.height
    }

    /// The underlying interleaved RGBA bytes.
    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// The color of the pixel at the given linear index (`y * width + x`).
    #[must_use]
    pub fn rgb(&self, index: usize) -> Srgb<u8> {
        let i = index * 4;
        Srgb::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

impl<'a> TryFrom<&'a RgbaImage> for PixelSlice<'a> {
    type Error = PixelSliceError;

    fn try_from(image: &'a RgbaImage) -> Result<Self, Self::Error> {
        Self::new(image.as_raw(), image.width(), image.height())
    }
}

/// An error for when a cluster count lies outside `2..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidClusterCount(pub u16);

impl Display for InvalidClusterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster count must be at least {MIN_CLUSTERS}, got {}", self.0)
    }
}

impl Error for InvalidClusterCount {}

/// The number of clusters (`K`) to partition the image's colors into.
///
/// A newtype over `u16` with the invariant `K >= 2`. Counts above
/// [`MAX_CLUSTERS`](crate::MAX_CLUSTERS) are representable but rejected
/// later, when the kernel program is built for the device.
///
/// ```
/// # use kquant::{ClusterCount, InvalidClusterCount};
/// # fn main() -> Result<(), InvalidClusterCount> {
/// let k = ClusterCount::try_from(64)?;
/// assert!(ClusterCount::try_from(1).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClusterCount(u16);

impl ClusterCount {
    /// The default cluster count used by the command line interface.
    pub const DEFAULT: Self = Self(64);

    /// Gets the inner `u16` value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Creates a [`ClusterCount`] directly from the given `u16` without
    /// checking the `K >= 2` invariant.
    pub(crate) const fn new_unchecked(value: u16) -> Self {
        Self(value)
    }

    /// `K` as a `usize` for buffer lengths.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Default for ClusterCount {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u16> for ClusterCount {
    type Error = InvalidClusterCount;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value >= MIN_CLUSTERS {
            Ok(Self(value))
        } else {
            Err(InvalidClusterCount(value))
        }
    }
}

impl From<ClusterCount> for u16 {
    fn from(value: ClusterCount) -> Self {
        value.get()
    }
}

impl Display for ClusterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The output struct returned by [`indexed_palette`](crate::indexed_palette).
///
/// `palette` holds the final centroid colors, `counts` the number of pixels
/// assigned to each centroid by the final assignment pass, and `indices` a
/// palette index for every pixel in the input.
///
/// Palette colors are not guaranteed to be unique, and a count of zero marks
/// a cluster that was reseeded on the final iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizeOutput {
    /// The computed color palette, one entry per cluster.
    pub palette: Vec<Srgb<u8>>,
    /// The number of pixels assigned to each palette entry.
    pub counts: Vec<u64>,
    /// An index into `palette` for each pixel, in row-major order.
    pub indices: Vec<u32>,
}
