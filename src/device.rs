//! The in-process compute device: discovery, the in-order command queue, and
//! device buffers.
//!
//! The device executes data-parallel kernels on a dedicated thread pool. The
//! [`Queue`] is a single in-order command stream: a dispatch returns only
//! once every task it spawned has drained, so cross-stage data dependencies
//! are enforced purely by submission order. Host-side reads are blocking.
//!
//! Every operation that can fail reports a [`DeviceError`] naming the
//! operation and a human-readable category. Failures are meant to be
//! fail-fast; nothing here retries.

use std::{
    error::Error,
    fmt::{self, Display},
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
    thread,
};

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// The category of a failed device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No compute device is available.
    DeviceNotFound,
    /// The device's thread pool could not be created.
    QueueCreation(String),
    /// The kernel program could not be built; the payload is the build log.
    BuildProgramFailure(String),
    /// A kernel was dispatched with inconsistent buffer bindings.
    InvalidKernelArgs(String),
    /// A host transfer was issued against a buffer of a different length.
    InvalidBufferSize {
        /// The buffer's length in elements.
        expected: usize,
        /// The host slice's length in elements.
        actual: usize,
    },
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::DeviceNotFound => write!(f, "device not found"),
            ErrorKind::QueueCreation(reason) => write!(f, "queue creation failed: {reason}"),
            ErrorKind::BuildProgramFailure(log) => write!(f, "program build failure: {log}"),
            ErrorKind::InvalidKernelArgs(reason) => {
                write!(f, "invalid kernel arguments: {reason}")
            }
            ErrorKind::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: buffer holds {expected} elements, host slice {actual}")
            }
        }
    }
}

/// An error from a device operation, carrying the identifying name of the
/// operation that failed and its failure category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// The identifying name of the failed operation.
    op: &'static str,
    /// The failure category.
    kind: ErrorKind,
}

impl DeviceError {
    /// Creates an error for the named operation.
    pub(crate) fn new(op: &'static str, kind: ErrorKind) -> Self {
        Self { op, kind }
    }

    /// The identifying name of the operation that failed.
    #[must_use]
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The failure category.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error at {}: {}", self.op, self.kind)
    }
}

impl Error for DeviceError {}

/// A compute device capable of running the quantization kernels.
///
/// Discovery returns a growable list rather than a fixed-capacity array, so
/// no device is ever silently truncated away. Today there is a single
/// logical device per process, backed by a thread pool sized to the
/// machine's available parallelism.
#[derive(Debug, Clone)]
pub struct Device {
    /// Human-readable device name for diagnostics.
    name: String,
    /// Number of hardware threads the device schedules tasks onto.
    compute_units: usize,
}

impl Device {
    /// Enumerates all available devices.
    #[must_use]
    pub fn enumerate() -> Vec<Device> {
        let compute_units = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        vec![Device {
            name: format!("cpu device ({compute_units} compute units)"),
            compute_units,
        }]
    }

    /// Selects the preferred device: the first enumerated one.
    pub fn preferred() -> Result<Device, DeviceError> {
        let device = Device::enumerate()
            .into_iter()
            .next()
            .ok_or_else(|| DeviceError::new("Device::preferred", ErrorKind::DeviceNotFound))?;
        debug!("selected device: {}", device.name);
        Ok(device)
    }

    /// The device's human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of compute units tasks are scheduled onto.
    #[must_use]
    pub fn compute_units(&self) -> usize {
        self.compute_units
    }
}

/// An in-order command stream for one device.
///
/// Each submitted command runs to completion before the next one starts, so
/// a kernel enqueued after another observes all of its writes. This ordering
/// discipline is what makes the assignment → update data dependency hold
/// without any further synchronization.
pub struct Queue {
    /// The pool the queue dispatches kernel tasks onto.
    pool: ThreadPool,
}

impl Queue {
    /// Creates a command queue on the given device.
    pub fn new(device: &Device) -> Result<Self, DeviceError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(device.compute_units)
            .build()
            .map_err(|e| DeviceError::new("Queue::new", ErrorKind::QueueCreation(e.to_string())))?;
        debug!("created command queue on {}", device.name);
        Ok(Self { pool })
    }

    /// Runs one command to completion on the device's pool.
    ///
    /// Returning from this call is the completion signal: all parallel tasks
    /// the command spawned have joined.
    pub(crate) fn run<R: Send>(&self, command: impl FnOnce() -> R + Send) -> R {
        self.pool.install(command)
    }
}

/// A device-resident buffer of `T` elements.
///
/// The label identifies the buffer in transfer errors. Reads and writes are
/// whole-buffer and blocking, and both require the host slice to match the
/// buffer's length exactly.
#[derive(Debug)]
pub struct Buffer<T> {
    /// Identifying name used in error reports.
    label: &'static str,
    /// The device-side storage.
    data: Vec<T>,
}

impl<T: Copy + Send + Sync> Buffer<T> {
    /// Allocates a buffer initialized from a host slice.
    #[must_use]
    pub fn from_host(label: &'static str, data: &[T]) -> Self {
        Self { label, data: data.to_vec() }
    }

    /// Allocates a buffer of `len` default-valued elements.
    #[must_use]
    pub fn zeroed(label: &'static str, len: usize) -> Self
    where
        T: Default,
    {
        Self { label, data: vec![T::default(); len] }
    }

    /// The buffer length in elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer's identifying label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Overwrites the whole buffer from a host slice.
    pub fn write(&mut self, data: &[T]) -> Result<(), DeviceError> {
        self.check_len("Buffer::write", data.len())?;
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// Reads the whole buffer back into a host slice, blocking.
    pub fn read_to(&self, out: &mut [T]) -> Result<(), DeviceError> {
        self.check_len("Buffer::read_to", out.len())?;
        out.copy_from_slice(&self.data);
        Ok(())
    }

    /// Errors unless the host slice length matches the buffer length.
    fn check_len(&self, op: &'static str, actual: usize) -> Result<(), DeviceError> {
        if self.data.len() == actual {
            Ok(())
        } else {
            debug!("{op} length mismatch on buffer `{}`", self.label);
            Err(DeviceError::new(
                op,
                ErrorKind::InvalidBufferSize { expected: self.data.len(), actual },
            ))
        }
    }

    /// Kernel-side view of the buffer contents.
    pub(crate) fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Kernel-side mutable view of the buffer contents.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// One cluster's accumulated channel sums and pixel count, read back from an
/// [`AccumulatorBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterSums {
    /// Sum of the red channels of all assigned pixels.
    pub r: u64,
    /// Sum of the green channels of all assigned pixels.
    pub g: u64,
    /// Sum of the blue channels of all assigned pixels.
    pub b: u64,
    /// Number of pixels assigned to the cluster.
    pub count: u64,
}

/// One cluster's shared counters. All updates use relaxed atomics: integer
/// addition commutes, so the totals do not depend on task interleaving.
#[derive(Debug, Default)]
struct Accumulator {
    /// Red channel sum.
    r: AtomicU64,
    /// Green channel sum.
    g: AtomicU64,
    /// Blue channel sum.
    b: AtomicU64,
    /// Assigned pixel count.
    count: AtomicU64,
}

/// A device buffer of per-cluster accumulators, written concurrently by many
/// assignment tasks.
///
/// Sums are 64-bit, wide enough for 255 × [`MAX_PIXELS`](crate::MAX_PIXELS)
/// without overflow.
#[derive(Debug)]
pub struct AccumulatorBuffer {
    /// One accumulator per cluster.
    clusters: Vec<Accumulator>,
}

impl AccumulatorBuffer {
    /// Allocates zeroed accumulators for `len` clusters.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut clusters = Vec::with_capacity(len);
        clusters.resize_with(len, Accumulator::default);
        Self { clusters }
    }

    /// The number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the buffer holds no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Resets every sum and count to zero in place.
    pub fn clear(&self) {
        for acc in &self.clusters {
            acc.r.store(0, Ordering::Relaxed);
            acc.g.store(0, Ordering::Relaxed);
            acc.b.store(0, Ordering::Relaxed);
            acc.count.store(0, Ordering::Relaxed);
        }
    }

    /// Adds one pixel's channels to `cluster` and increments its count.
    pub(crate) fn add(&self, cluster: usize, r: u8, g: u8, b: u8) {
        let acc = &self.clusters[cluster];
        acc.r.fetch_add(u64::from(r), Ordering::Relaxed);
        acc.g.fetch_add(u64::from(g), Ordering::Relaxed);
        acc.b.fetch_add(u64::from(b), Ordering::Relaxed);
        acc.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads one cluster's settled sums.
    #[must_use]
    pub fn sums(&self, cluster: usize) -> ClusterSums {
        let acc = &self.clusters[cluster];
        ClusterSums {
            r: acc.r.load(Ordering::Relaxed),
            g: acc.g.load(Ordering::Relaxed),
            b: acc.b.load(Ordering::Relaxed),
            count: acc.count.load(Ordering::Relaxed),
        }
    }

    /// Reads back every cluster's pixel count.
    #[must_use]
    pub fn counts(&self) -> Vec<u64> {
        self.clusters
            .iter()
            .map(|acc| acc.count.load(Ordering::Relaxed))
            .collect()
    }
}
