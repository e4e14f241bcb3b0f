//! Centroid initialization and the host-side iteration orchestrator.

use crate::{
    device::{AccumulatorBuffer, Buffer, Device, DeviceError, Queue},
    kernel::{AssignArgs, Program, UpdateArgs},
    ClusterCount, InvalidClusterCount, PixelSlice, QuantizeOutput, MIN_CLUSTERS,
};

use log::{debug, trace};
use palette::Srgb;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The initial centroid colors handed to [`indexed_palette`].
///
/// A newtype over `Vec<Srgb<u8>>` with the invariant that it holds at least
/// [`MIN_CLUSTERS`](crate::MIN_CLUSTERS) colors. Duplicate colors are
/// allowed; two clusters seeded with the same color simply compete for the
/// same pixels, with ties going to the lower index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct Centroids(Vec<Srgb<u8>>);

impl Centroids {
    /// Samples `K` initial centroids from random pixel positions.
    ///
    /// Positions are drawn uniformly from `[0, width - 2] × [0, height - 2]`:
    /// the bottom row and rightmost column are deliberately never sampled.
    /// The same seed over the same image yields the same centroids.
    /// Degenerate one-wide or one-tall images clamp the range to column or
    /// row zero.
    #[must_use]
    pub fn from_random_pixels(pixels: PixelSlice<'_>, k: ClusterCount, seed: u64) -> Self {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        let x_bound = pixels.width().saturating_sub(1).max(1);
        let y_bound = pixels.height().saturating_sub(1).max(1);

        let centroids = (0..k.get())
            .map(|_| {
                let y = rng.gen_range(0..y_bound);
                let x = rng.gen_range(0..x_bound);
                pixels.rgb((y * pixels.width() + x) as usize)
            })
            .collect();

        Self(centroids)
    }

    /// The number of clusters these centroids seed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cluster_count(&self) -> ClusterCount {
        // the length invariant is checked at construction
        ClusterCount::new_unchecked(self.0.len() as u16)
    }

    /// Unwraps the inner centroid colors.
    #[must_use]
    pub fn into_inner(self) -> Vec<Srgb<u8>> {
        self.0
    }
}

impl From<Centroids> for Vec<Srgb<u8>> {
    fn from(value: Centroids) -> Self {
        value.into_inner()
    }
}

impl TryFrom<Vec<Srgb<u8>>> for Centroids {
    type Error = InvalidClusterCount;

    fn try_from(colors: Vec<Srgb<u8>>) -> Result<Self, Self::Error> {
        let len = u16::try_from(colors.len()).map_err(|_| InvalidClusterCount(u16::MAX))?;
        if len >= MIN_CLUSTERS {
            Ok(Self(colors))
        } else {
            Err(InvalidClusterCount(len))
        }
    }
}

/// Runs `iterations` k-means iterations over the image and returns the final
/// palette, per-cluster counts, and per-pixel palette indices.
///
/// Each iteration clears the accumulators, draws fresh reseed indices, and
/// dispatches the assignment and update kernels in order on a single
/// command stream. There is no convergence check: the run costs exactly
/// `iterations` passes regardless of how early the centroids settle, which
/// keeps the runtime predictable. `seed` drives the reseed indices only;
/// fixing it (and the initial centroids) makes the whole run reproducible.
///
/// Any device failure aborts the run with no partial results.
pub fn indexed_palette(
    pixels: PixelSlice<'_>,
    iterations: u32,
    initial: Centroids,
    seed: u64,
) -> Result<QuantizeOutput, DeviceError> {
    let device = Device::preferred()?;
    let queue = Queue::new(&device)?;
    let program = Program::build(&device, initial.cluster_count())?;

    let mut orchestrator = Orchestrator::new(pixels, queue, program, initial, seed);
    debug!(
        "quantizing {}x{} pixels into K={} clusters over {iterations} iterations",
        pixels.width(),
        pixels.height(),
        orchestrator.program.k(),
    );

    for i in 0..iterations {
        trace!("iteration {}/{iterations}", i + 1);
        orchestrator.iterate()?;
    }

    orchestrator.finalize()
}

/// Host-side state for one quantization run: the device handles and every
/// buffer that lives across iterations.
struct Orchestrator<'a> {
    /// The input image view.
    pixels: PixelSlice<'a>,
    /// The in-order command stream all stages are dispatched on.
    queue: Queue,
    /// The kernel program, built with `K` frozen in.
    program: Program,
    /// Drives the per-iteration reseed indices.
    rng: Xoroshiro128PlusPlus,
    /// Device copy of the input image (read-only after upload).
    image: Buffer<u8>,
    /// The per-pixel assignment map, fully rewritten every iteration.
    assignments: Buffer<u32>,
    /// The centroids, updated in place every iteration.
    centroids: Buffer<Srgb<u8>>,
    /// The per-cluster accumulators, cleared and reused every iteration.
    accumulators: AccumulatorBuffer,
    /// This iteration's reseed pixel indices.
    reseed: Buffer<u32>,
}

impl<'a> Orchestrator<'a> {
    /// Uploads the image and initial centroids and allocates the working
    /// buffers.
    fn new(
        pixels: PixelSlice<'a>,
        queue: Queue,
        program: Program,
        initial: Centroids,
        seed: u64,
    ) -> Self {
        let k = initial.cluster_count().as_usize();
        Self {
            pixels,
            queue,
            program,
            rng: Xoroshiro128PlusPlus::seed_from_u64(seed),
            image: Buffer::from_host("image", pixels.bytes()),
            assignments: Buffer::zeroed("assignments", pixels.num_pixels() as usize),
            centroids: Buffer::from_host("centroids", &initial.into_inner()),
            accumulators: AccumulatorBuffer::new(k),
            reseed: Buffer::zeroed("reseed", k),
        }
    }

    /// Runs one iteration: clear accumulators, draw reseed indices, then the
    /// assignment and update stages in order.
    fn iterate(&mut self) -> Result<(), DeviceError> {
        // Clear-and-reuse: the accumulators must hold nothing from the
        // previous iteration before assignment starts.
        let accumulators = &self.accumulators;
        self.queue.run(|| accumulators.clear());

        // Fresh reseed indices every iteration, sampled short of the buffer
        // tail like the initial centroids.
        let bound = self.pixels.num_pixels().saturating_sub(2).max(1);
        let indices: Vec<u32> = (0..self.accumulators.len())
            .map(|_| self.rng.gen_range(0..bound))
            .collect();
        self.reseed.write(&indices)?;

        self.program.enqueue_assign(
            &self.queue,
            AssignArgs {
                image: &self.image,
                assignments: &mut self.assignments,
                centroids: &self.centroids,
                accumulators: &self.accumulators,
                width: self.pixels.width(),
                height: self.pixels.height(),
            },
        )?;

        // The in-order queue guarantees the accumulators are settled here.
        self.program.enqueue_update(
            &self.queue,
            UpdateArgs {
                centroids: &mut self.centroids,
                accumulators: &self.accumulators,
                reseed: &self.reseed,
                image: &self.image,
            },
        )
    }

    /// Blocking read-back of the assignment map, centroids, and final
    /// counts.
    fn finalize(self) -> Result<QuantizeOutput, DeviceError> {
        let mut indices = vec![0u32; self.pixels.num_pixels() as usize];
        self.assignments.read_to(&mut indices)?;

        let mut palette = vec![Srgb::new(0u8, 0, 0); self.accumulators.len()];
        self.centroids.read_to(&mut palette)?;

        let counts = self.accumulators.counts();
        debug!("finalized run: {} palette entries", palette.len());

        Ok(QuantizeOutput { palette, counts, indices })
    }
}
