//! Cache-aligned storage and the row-stride rule shared by every plane.

use std::fmt;
use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};

use crate::constants::{ALIAS_BOUNDARY, CACHE_ALIGNMENT};

/// One cache-aligned storage unit. Buffers are built from these so the base
/// pointer is always `CACHE_ALIGNMENT`-aligned.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
struct CacheLine([u8; CACHE_ALIGNMENT]);

const _: () = assert!(std::mem::align_of::<CacheLine>() == CACHE_ALIGNMENT);
const _: () = assert!(std::mem::size_of::<CacheLine>() == CACHE_ALIGNMENT);

/// Widest vector (in bytes) a transform kernel may load from a row. Kernels are
/// selected at runtime elsewhere, so this covers the widest instruction set of
/// the target architecture. Zero means scalar-only targets.
pub const fn vector_size() -> usize {
    if cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
        64
    } else if cfg!(any(
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "wasm32"
    )) {
        16
    } else {
        0
    }
}

/// Alignment of row strides for the given vector size.
pub const fn row_alignment(vec_size: usize) -> usize {
    if vec_size > CACHE_ALIGNMENT {
        vec_size
    } else {
        CACHE_ALIGNMENT
    }
}

/// Distance in bytes between the starts of two consecutive rows.
pub fn bytes_per_row(xsize: usize, sizeof_t: usize) -> usize {
    bytes_per_row_with(vector_size(), xsize, sizeof_t)
}

/// [`bytes_per_row`] for an explicit vector size.
///
/// The stride leaves room for one unaligned vector load starting at the last
/// valid element, is a multiple of the vector and cache line size, and is never
/// a multiple of [`ALIAS_BOUNDARY`]. The last rule avoids false store-to-load
/// dependencies between consecutive rows on CPUs that only compare the low
/// address bits; it is harmless elsewhere.
pub fn bytes_per_row_with(vec_size: usize, xsize: usize, sizeof_t: usize) -> usize {
    let mut valid_bytes = xsize * sizeof_t;

    // No extra lanes are loaded in scalar mode.
    if vec_size != 0 {
        valid_bytes += vec_size - sizeof_t;
    }

    let align = row_alignment(vec_size);
    let mut bytes_per_row = valid_bytes.next_multiple_of(align);

    if bytes_per_row % ALIAS_BOUNDARY == 0 {
        bytes_per_row += align;
    }

    debug_assert_eq!(bytes_per_row % align, 0);
    bytes_per_row
}

/// Zero-initialized, `CACHE_ALIGNMENT`-aligned buffer of `len` elements.
#[derive(Clone)]
pub struct AlignedBuffer<T> {
    lines: Vec<CacheLine>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> AlignedBuffer<T> {
    pub fn zeroed(len: usize) -> Self {
        let bytes = len * std::mem::size_of::<T>();
        Self {
            lines: vec![CacheLine::zeroed(); bytes.div_ceil(CACHE_ALIGNMENT)],
            len,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &bytemuck::cast_slice::<CacheLine, T>(&self.lines)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut bytemuck::cast_slice_mut::<CacheLine, T>(&mut self.lines)[..self.len]
    }
}

impl<T> Default for AlignedBuffer<T> {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("bytes", &(self.lines.len() * CACHE_ALIGNMENT))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_invariants() {
        for vec_size in [0, 16, 32, 64] {
            let align = row_alignment(vec_size);
            for sizeof_t in [1, 2, 4, 8] {
                for xsize in 0..1200 {
                    let bpr = bytes_per_row_with(vec_size, xsize, sizeof_t);
                    assert!(bpr >= xsize * sizeof_t);
                    assert_eq!(bpr % align, 0);
                    assert_ne!(bpr % ALIAS_BOUNDARY, 0, "xsize={xsize} sizeof={sizeof_t}");
                }
            }
        }
    }

    #[test]
    fn test_stride_leaves_room_for_vector_tail() {
        let bpr = bytes_per_row_with(64, 32, 4);
        // 128 valid bytes + 60 slack bytes round up to 256.
        assert_eq!(bpr, 256);
        assert!(bpr >= 32 * 4 + 64 - 4);
    }

    #[test]
    fn test_stride_avoids_alias_boundary() {
        // 512 floats are exactly 2 KiB in scalar mode.
        assert_eq!(bytes_per_row_with(0, 512, 4), 2048 + 128);
        assert_eq!(bytes_per_row_with(0, 511, 4), 2048 + 128);
        assert_eq!(bytes_per_row_with(0, 480, 4), 1920);
    }

    #[test]
    fn test_buffer_is_aligned_and_zeroed() {
        let mut buffer = AlignedBuffer::<f32>::zeroed(1000);
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.as_slice().as_ptr() as usize % CACHE_ALIGNMENT, 0);
        assert!(buffer.as_slice().iter().all(|&v| v == 0.0));
        buffer.as_mut_slice()[999] = 1.5;
        assert_eq!(buffer.as_slice()[999], 1.5);

        let empty = AlignedBuffer::<u8>::zeroed(0);
        assert!(empty.is_empty());
        assert!(empty.as_slice().is_empty());
    }
}
