//! The kernel program: the two data-parallel stages of one k-means iteration.
//!
//! A [`Program`] is built once per run with `K` frozen in as a build-time
//! constant; every later dispatch validates its bindings against that `K`,
//! and the device caps it at [`MAX_CLUSTERS`](crate::MAX_CLUSTERS) to bound
//! the per-cluster working storage.
//!
//! # Binding layout
//!
//! The slot layout below is the public contract between host orchestration
//! and the kernels; the argument structs bind by name so the contract cannot
//! drift silently.
//!
//! `assign_to_cluster` (one task per pixel):
//!
//! | slot | binding        | element       | access           |
//! |------|----------------|---------------|------------------|
//! | 0    | `image`        | `u8` (RGBA)   | read             |
//! | 1    | `assignments`  | `u32`         | write            |
//! | 2    | `centroids`    | `Srgb<u8>`    | read             |
//! | 3    | `accumulators` | cluster sums  | atomic add       |
//! | 4, 5 | `width`, `height` scalars      |                  |
//!
//! `update_centroids` (one task per cluster):
//!
//! | slot | binding        | element       | access           |
//! |------|----------------|---------------|------------------|
//! | 0    | `centroids`    | `Srgb<u8>`    | read/write       |
//! | 1    | `accumulators` | cluster sums  | read (settled)   |
//! | 2    | `reseed`       | `u32`         | read             |
//! | 3    | `image`        | `u8` (RGBA)   | read             |
//!
//! `update_centroids` must only be enqueued after `assign_to_cluster` has
//! fully drained; the in-order [`Queue`] provides exactly that.

use crate::{
    device::{AccumulatorBuffer, Buffer, Device, DeviceError, ErrorKind, Queue},
    ClusterCount, MAX_CLUSTERS,
};

use log::{debug, error};
use palette::Srgb;
use rayon::prelude::*;

/// Bindings for the `assign_to_cluster` kernel (see the module docs for the
/// slot contract).
pub struct AssignArgs<'a> {
    /// Slot 0: the input image, interleaved RGBA bytes.
    pub image: &'a Buffer<u8>,
    /// Slot 1: the per-pixel assignment map, fully overwritten.
    pub assignments: &'a mut Buffer<u32>,
    /// Slot 2: the current centroids, one per cluster.
    pub centroids: &'a Buffer<Srgb<u8>>,
    /// Slot 3: the per-cluster accumulators, added to atomically.
    pub accumulators: &'a AccumulatorBuffer,
    /// Slot 4: image width in pixels.
    pub width: u32,
    /// Slot 5: image height in pixels.
    pub height: u32,
}

/// Bindings for the `update_centroids` kernel (see the module docs for the
/// slot contract).
pub struct UpdateArgs<'a> {
    /// Slot 0: the centroids, overwritten in place.
    pub centroids: &'a mut Buffer<Srgb<u8>>,
    /// Slot 1: the settled accumulators from this iteration's assignment.
    pub accumulators: &'a AccumulatorBuffer,
    /// Slot 2: this iteration's reseed pixel indices, one per cluster.
    pub reseed: &'a Buffer<u32>,
    /// Slot 3: the input image, read only by reseeded clusters.
    pub image: &'a Buffer<u8>,
}

/// A kernel program built for one device with a fixed cluster count.
#[derive(Debug, Clone, Copy)]
pub struct Program {
    /// The cluster count frozen in at build time.
    k: u16,
}

impl Program {
    /// Builds the kernel program for `device` with `K` as a build-time
    /// constant.
    ///
    /// Building fails if `K` exceeds the device's per-cluster working
    /// storage limit of [`MAX_CLUSTERS`](crate::MAX_CLUSTERS); the build log
    /// is emitted through [`log::error!`] and the failure is fatal to the
    /// run.
    pub fn build(device: &Device, k: ClusterCount) -> Result<Self, DeviceError> {
        if k.get() > MAX_CLUSTERS {
            let log = format!(
                "K={k} exceeds the per-cluster working storage limit of {MAX_CLUSTERS}"
            );
            error!("kernel program build log: {log}");
            return Err(DeviceError::new("Program::build", ErrorKind::BuildProgramFailure(log)));
        }
        debug!("built kernel program for {} with K={k}", device.name());
        Ok(Self { k: k.get() })
    }

    /// The cluster count the program was built for.
    #[must_use]
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Enqueues the assignment stage: every pixel picks its nearest centroid
    /// by squared RGB distance and adds itself to that cluster's
    /// accumulator.
    ///
    /// Pixel tasks run in no defined order; correctness rests entirely on
    /// the atomic accumulation. Ties go to the lowest cluster index (strict
    /// less-than against the running minimum). The call returns once every
    /// pixel task has drained.
    pub fn enqueue_assign(&self, queue: &Queue, args: AssignArgs<'_>) -> Result<(), DeviceError> {
        const OP: &str = "Program::enqueue_assign";
        let pixels = args.width as usize * args.height as usize;
        self.check_cluster_binding(OP, "centroids", args.centroids.len())?;
        self.check_cluster_binding(OP, "accumulators", args.accumulators.len())?;
        check_args(OP, args.image.len() == pixels * 4, "image does not match dimensions")?;
        check_args(OP, args.assignments.len() == pixels, "assignment map does not match dimensions")?;

        let image = args.image.as_slice();
        let centroids = args.centroids.as_slice();
        let accumulators = args.accumulators;
        let assignments = args.assignments.as_mut_slice();

        queue.run(|| {
            assignments.par_iter_mut().enumerate().for_each(|(i, assignment)| {
                let p = i * 4;
                let (r, g, b) = (image[p], image[p + 1], image[p + 2]);

                let mut best = 0u32;
                let mut best_dist = u32::MAX;
                for (cluster, centroid) in centroids.iter().enumerate() {
                    let dr = i32::from(r) - i32::from(centroid.red);
                    let dg = i32::from(g) - i32::from(centroid.green);
                    let db = i32::from(b) - i32::from(centroid.blue);
                    let dist = (dr * dr + dg * dg + db * db) as u32;
                    if dist < best_dist {
                        best_dist = dist;
                        best = cluster as u32;
                    }
                }

                *assignment = best;
                accumulators.add(best as usize, r, g, b);
            });
        });
        Ok(())
    }

    /// Enqueues the centroid-update stage: one task per cluster.
    ///
    /// A cluster with assigned pixels becomes the truncated integer mean of
    /// their channels; a cluster with none is reseeded to the true color of
    /// the pixel at its reseed index. Requires this iteration's assignment
    /// dispatch to have completed, which the in-order queue guarantees.
    pub fn enqueue_update(&self, queue: &Queue, args: UpdateArgs<'_>) -> Result<(), DeviceError> {
        const OP: &str = "Program::enqueue_update";
        self.check_cluster_binding(OP, "centroids", args.centroids.len())?;
        self.check_cluster_binding(OP, "accumulators", args.accumulators.len())?;
        self.check_cluster_binding(OP, "reseed", args.reseed.len())?;
        let pixels = args.image.len() / 4;
        check_args(
            OP,
            args.reseed.as_slice().iter().all(|&i| (i as usize) < pixels),
            "reseed index out of range",
        )?;

        let image = args.image.as_slice();
        let reseed = args.reseed.as_slice();
        let accumulators = args.accumulators;
        let centroids = args.centroids.as_mut_slice();

        queue.run(|| {
            centroids.par_iter_mut().enumerate().for_each(|(cluster, centroid)| {
                let sums = accumulators.sums(cluster);
                *centroid = if sums.count > 0 {
                    // truncating division, not rounding
                    Srgb::new(
                        (sums.r / sums.count) as u8,
                        (sums.g / sums.count) as u8,
                        (sums.b / sums.count) as u8,
                    )
                } else {
                    let p = reseed[cluster] as usize * 4;
                    Srgb::new(image[p], image[p + 1], image[p + 2])
                };
            });
        });
        Ok(())
    }

    /// Errors unless a per-cluster binding's length equals the program's `K`.
    fn check_cluster_binding(
        &self,
        op: &'static str,
        binding: &'static str,
        len: usize,
    ) -> Result<(), DeviceError> {
        if len == usize::from(self.k) {
            Ok(())
        } else {
            Err(DeviceError::new(
                op,
                ErrorKind::InvalidKernelArgs(format!(
                    "binding `{binding}` has length {len}, program was built with K={}",
                    self.k
                )),
            ))
        }
    }
}

/// Errors with [`ErrorKind::InvalidKernelArgs`] unless `ok` holds.
fn check_args(op: &'static str, ok: bool, reason: &str) -> Result<(), DeviceError> {
    if ok {
        Ok(())
    } else {
        Err(DeviceError::new(op, ErrorKind::InvalidKernelArgs(reason.into())))
    }
}
