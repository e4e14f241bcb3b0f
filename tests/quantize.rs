//! End-to-end quantization properties over small synthetic images.

use kquant::{Centroids, ClusterCount, PixelSlice};
use palette::Srgb;

/// Builds an interleaved RGBA buffer (alpha 255) from RGB triples.
fn rgba(colors: &[(u8, u8, u8)]) -> Vec<u8> {
    colors
        .iter()
        .flat_map(|&(r, g, b)| [r, g, b, 255])
        .collect()
}

fn centroids(colors: &[(u8, u8, u8)]) -> Centroids {
    Centroids::try_from(
        colors.iter().map(|&(r, g, b)| Srgb::new(r, g, b)).collect::<Vec<_>>(),
    )
    .unwrap()
}

#[test]
fn black_white_halves_round_trip_exactly() {
    // Top row black, bottom row white; both clusters start at their exact
    // means, so one iteration must reproduce the input.
    let data = rgba(&[(0, 0, 0), (0, 0, 0), (255, 255, 255), (255, 255, 255)]);
    let pixels = PixelSlice::new(&data, 2, 2).unwrap();
    let initial = centroids(&[(0, 0, 0), (255, 255, 255)]);

    let output = kquant::indexed_palette(pixels, 1, initial, 0).unwrap();

    assert_eq!(output.indices, vec![0, 0, 1, 1]);
    assert_eq!(output.counts, vec![2, 2]);
    assert_eq!(output.palette, vec![Srgb::new(0, 0, 0), Srgb::new(255, 255, 255)]);
    assert_eq!(kquant::to_rgba_bytes(&output, 2, 2), data);
}

#[test]
fn distinct_colors_each_own_a_cluster() {
    // A 1xK image of K distinct colors seeded with those exact colors: every
    // pixel keeps its own cluster and the output equals the input.
    let colors = [(0, 0, 0), (80, 90, 100), (160, 10, 20), (255, 255, 255)];
    let data = rgba(&colors);
    let pixels = PixelSlice::new(&data, 4, 1).unwrap();

    let output = kquant::indexed_palette(pixels, 1, centroids(&colors), 7).unwrap();

    assert_eq!(output.indices, vec![0, 1, 2, 3]);
    assert_eq!(output.counts, vec![1, 1, 1, 1]);
    let expected: Vec<_> = colors.iter().map(|&(r, g, b)| Srgb::new(r, g, b)).collect();
    assert_eq!(output.palette, expected);
    assert_eq!(kquant::to_rgba_bytes(&output, 4, 1), data);
}

#[test]
fn counts_cover_every_pixel_and_indices_stay_in_range() {
    let data: Vec<u8> = (0..8 * 8).flat_map(|i: u32| {
        let v = (i * 37 % 256) as u8;
        [v, v.wrapping_mul(3), v.wrapping_add(91), 255]
    })
    .collect();
    let pixels = PixelSlice::new(&data, 8, 8).unwrap();
    let k = ClusterCount::try_from(5).unwrap();
    let initial = Centroids::from_random_pixels(pixels, k, 11);

    let output = kquant::indexed_palette(pixels, 3, initial, 11).unwrap();

    assert_eq!(output.counts.len(), 5);
    assert_eq!(output.counts.iter().sum::<u64>(), 64);
    assert_eq!(output.indices.len(), 64);
    assert!(output.indices.iter().all(|&i| i < 5));
}

#[test]
fn non_empty_clusters_get_the_truncated_mean() {
    // Cluster 0 collects (10,0,0) and (11,0,0): mean red 10.5 truncates to 10.
    let data = rgba(&[(10, 0, 0), (11, 0, 0), (200, 200, 200)]);
    let pixels = PixelSlice::new(&data, 3, 1).unwrap();
    let initial = centroids(&[(0, 0, 0), (255, 255, 255)]);

    let output = kquant::indexed_palette(pixels, 1, initial, 0).unwrap();

    assert_eq!(output.counts, vec![2, 1]);
    assert_eq!(output.palette[0], Srgb::new(10, 0, 0));
    assert_eq!(output.palette[1], Srgb::new(200, 200, 200));
}

#[test]
fn empty_clusters_reseed_to_a_true_pixel_color() {
    // Every pixel is (7,9,11), so cluster 1 receives nothing and must take
    // the color of its reseed pixel, which can only be (7,9,11).
    let data = rgba(&[(7, 9, 11); 4]);
    let pixels = PixelSlice::new(&data, 2, 2).unwrap();
    let initial = centroids(&[(7, 9, 11), (200, 0, 0)]);

    let output = kquant::indexed_palette(pixels, 1, initial, 3).unwrap();

    assert_eq!(output.counts, vec![4, 0]);
    assert_eq!(output.palette[1], Srgb::new(7, 9, 11));
    assert_ne!(output.palette[1], Srgb::new(0, 0, 0));
}

#[test]
fn fixed_seed_reproduces_the_whole_run() {
    let data: Vec<u8> = (0..6 * 6).flat_map(|i: u32| {
        [(i * 53 % 256) as u8, (i * 11 % 256) as u8, (i * 199 % 256) as u8, 255]
    })
    .collect();
    let pixels = PixelSlice::new(&data, 6, 6).unwrap();
    let k = ClusterCount::try_from(4).unwrap();

    let run = |seed| {
        let initial = Centroids::from_random_pixels(pixels, k, seed);
        kquant::indexed_palette(pixels, 4, initial, seed).unwrap()
    };

    let first = run(21);
    let second = run(21);
    assert_eq!(first, second);
    assert_eq!(
        kquant::to_rgba_bytes(&first, 6, 6),
        kquant::to_rgba_bytes(&second, 6, 6)
    );
}

#[test]
fn extra_iterations_leave_a_fixed_point_unchanged() {
    // Centroids already sit at their partitions' exact means and neither
    // cluster is empty, so further iterations must be no-ops.
    let data = rgba(&[(0, 0, 0), (0, 0, 0), (255, 255, 255), (255, 255, 255)]);
    let pixels = PixelSlice::new(&data, 2, 2).unwrap();

    let once =
        kquant::indexed_palette(pixels, 1, centroids(&[(0, 0, 0), (255, 255, 255)]), 5).unwrap();
    let many =
        kquant::indexed_palette(pixels, 7, centroids(&[(0, 0, 0), (255, 255, 255)]), 5).unwrap();

    assert_eq!(once.palette, many.palette);
    assert_eq!(once.indices, many.indices);
    assert_eq!(once.counts, many.counts);
}

#[test]
fn oversized_cluster_counts_fail_the_program_build() {
    let data = rgba(&[(1, 2, 3); 4]);
    let pixels = PixelSlice::new(&data, 2, 2).unwrap();
    let initial = Centroids::try_from(vec![Srgb::new(0u8, 0, 0); 300]).unwrap();

    let err = kquant::indexed_palette(pixels, 1, initial, 0).unwrap_err();
    assert_eq!(err.op(), "Program::build");
}
