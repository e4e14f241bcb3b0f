//! Reconstructs the quantized image from the assignment map and palette.

use crate::QuantizeOutput;

use image::RgbaImage;
use rayon::prelude::*;

/// Builds the output RGBA8 buffer: each pixel takes its cluster's centroid
/// color, in the same row-major interleaved layout as the input, with alpha
/// forced to fully opaque.
///
/// # Panics
/// Panics if `output.indices` does not hold `width * height` entries or
/// contains an index outside the palette.
#[must_use]
pub fn to_rgba_bytes(output: &QuantizeOutput, width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    assert_eq!(output.indices.len(), pixels, "assignment map does not match dimensions");

    let mut bytes = vec![0u8; pixels * 4];
    bytes
        .par_chunks_exact_mut(4)
        .zip(&output.indices)
        .for_each(|(chunk, &index)| {
            let color = output.palette[index as usize];
            chunk[0] = color.red;
            chunk[1] = color.green;
            chunk[2] = color.blue;
            chunk[3] = u8::MAX;
        });
    bytes
}

/// Like [`to_rgba_bytes`], but packaged as an [`RgbaImage`] ready for the
/// codec.
#[must_use]
#[allow(clippy::expect_used)]
pub fn to_rgba_image(output: &QuantizeOutput, width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_raw(width, height, to_rgba_bytes(output, width, height))
        .expect("buffer length matches dimensions by construction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use palette::Srgb;

    #[test]
    fn remap_preserves_layout_and_forces_alpha() {
        let output = QuantizeOutput {
            palette: vec![Srgb::new(1u8, 2, 3), Srgb::new(250u8, 251, 252)],
            counts: vec![3, 1],
            indices: vec![0, 1, 0, 0],
        };

        let bytes = to_rgba_bytes(&output, 2, 2);
        assert_eq!(
            bytes,
            [1, 2, 3, 255, 250, 251, 252, 255, 1, 2, 3, 255, 1, 2, 3, 255]
        );

        let img = to_rgba_image(&output, 2, 2);
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 0).0, [250, 251, 252, 255]);
    }

    #[test]
    #[should_panic(expected = "assignment map does not match dimensions")]
    fn remap_rejects_mismatched_dimensions() {
        let output = QuantizeOutput {
            palette: vec![Srgb::new(0u8, 0, 0), Srgb::new(1u8, 1, 1)],
            counts: vec![1, 0],
            indices: vec![0],
        };
        let _ = to_rgba_bytes(&output, 2, 2);
    }
}
