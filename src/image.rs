//! Single-channel planes with padded, aligned rows and their 3-channel
//! composition.

use bytemuck::Pod;

use crate::aligned::{AlignedBuffer, bytes_per_row, vector_size};

/// How far past the valid row width [`Plane::initialize_padding`] zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Up to the next multiple of the vector size.
    RoundUp,
    /// Enough for one unaligned vector load starting at the last valid element.
    Unaligned,
}

/// Single-channel 2D buffer. Rows start `bytes_per_row` apart; see
/// [`crate::aligned::bytes_per_row`] for the stride rule.
#[derive(Debug, Clone)]
pub struct Plane<T> {
    xsize: usize,
    ysize: usize,
    orig_xsize: usize,
    orig_ysize: usize,
    bytes_per_row: usize,
    storage: AlignedBuffer<T>,
}

pub type ImageB = Plane<u8>;
pub type ImageS = Plane<i16>;
pub type ImageU = Plane<u16>;
pub type ImageI = Plane<i32>;
pub type ImageF = Plane<f32>;
pub type ImageD = Plane<f64>;

impl<T: Pod> Plane<T> {
    /// Allocates a `xsize` x `ysize` plane. Nothing is allocated if either
    /// dimension is zero.
    pub fn new(xsize: usize, ysize: usize) -> Self {
        let sizeof_t = std::mem::size_of::<T>();
        assert!(
            matches!(sizeof_t, 1 | 2 | 4 | 8),
            "unsupported plane element size {sizeof_t}"
        );

        let mut plane = Self {
            xsize,
            ysize,
            orig_xsize: xsize,
            orig_ysize: ysize,
            bytes_per_row: 0,
            storage: AlignedBuffer::default(),
        };
        if xsize != 0 && ysize != 0 {
            plane.bytes_per_row = bytes_per_row(xsize, sizeof_t);
            plane.storage = AlignedBuffer::zeroed(plane.bytes_per_row / sizeof_t * ysize);
            plane.initialize_padding(Padding::RoundUp);
        }
        plane
    }

    pub fn filled(xsize: usize, ysize: usize, value: T) -> Self {
        let mut plane = Self::new(xsize, ysize);
        plane.fill(value);
        plane
    }

    pub fn xsize(&self) -> usize {
        self.xsize
    }

    pub fn ysize(&self) -> usize {
        self.ysize
    }

    /// Dimensions at allocation time; [`Plane::shrink_to`] may grow back up to these.
    pub fn orig_xsize(&self) -> usize {
        self.orig_xsize
    }

    pub fn orig_ysize(&self) -> usize {
        self.orig_ysize
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Row stride in elements.
    pub fn pixels_per_row(&self) -> usize {
        self.bytes_per_row / std::mem::size_of::<T>()
    }

    pub fn same_size(&self, other: &Self) -> bool {
        self.xsize == other.xsize && self.ysize == other.ysize
    }

    /// Valid elements of row `y`.
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.ysize, "row {y} out of bounds ({})", self.ysize);
        let start = y * self.pixels_per_row();
        &self.storage.as_slice()[start..start + self.xsize]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.ysize, "row {y} out of bounds ({})", self.ysize);
        let start = y * self.pixels_per_row();
        let xsize = self.xsize;
        &mut self.storage.as_mut_slice()[start..start + xsize]
    }

    /// Row `y` including the stride padding, for kernels that load whole
    /// vectors past the last valid element.
    pub fn row_with_padding(&self, y: usize) -> &[T] {
        assert!(y < self.ysize, "row {y} out of bounds ({})", self.ysize);
        let stride = self.pixels_per_row();
        &self.storage.as_slice()[y * stride..(y + 1) * stride]
    }

    pub fn row_with_padding_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.ysize, "row {y} out of bounds ({})", self.ysize);
        let stride = self.pixels_per_row();
        &mut self.storage.as_mut_slice()[y * stride..(y + 1) * stride]
    }

    /// Copies the valid part of row `src_y` over row `dst_y`.
    pub fn copy_row(&mut self, src_y: usize, dst_y: usize) {
        assert!(src_y < self.ysize && dst_y < self.ysize);
        let stride = self.pixels_per_row();
        let src = src_y * stride;
        let xsize = self.xsize;
        self.storage
            .as_mut_slice()
            .copy_within(src..src + xsize, dst_y * stride);
    }

    pub fn fill(&mut self, value: T) {
        for y in 0..self.ysize {
            self.row_mut(y).fill(value);
        }
    }

    /// Changes the logical dimensions without touching the allocation. Both
    /// dimensions must fit in the original allocation.
    pub fn shrink_to(&mut self, xsize: usize, ysize: usize) {
        assert!(
            xsize <= self.orig_xsize && ysize <= self.orig_ysize,
            "{xsize}x{ysize} exceeds allocation {}x{}",
            self.orig_xsize,
            self.orig_ysize
        );
        self.xsize = xsize;
        self.ysize = ysize;
    }

    /// Exchanges dimensions, stride and storage with `other`.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Zeroes the bytes past the valid row width that vector loads may touch,
    /// so reading them never observes stale data. Only runs in debug builds;
    /// release builds skip the pass.
    pub fn initialize_padding(&mut self, padding: Padding) {
        if !cfg!(debug_assertions) || self.xsize == 0 || self.ysize == 0 {
            return;
        }
        let vec_size = vector_size();
        if vec_size == 0 {
            return;
        }

        let sizeof_t = std::mem::size_of::<T>();
        let valid_size = self.xsize * sizeof_t;
        let initialize_size = match padding {
            Padding::RoundUp => valid_size.next_multiple_of(vec_size),
            Padding::Unaligned => valid_size + vec_size - sizeof_t,
        };
        if valid_size == initialize_size {
            return;
        }

        let end = initialize_size.div_ceil(sizeof_t).min(self.pixels_per_row());
        let xsize = self.xsize;
        for y in 0..self.ysize {
            let row = self.row_with_padding_mut(y);
            row[xsize..end].fill(T::zeroed());
        }
    }
}

/// Region of a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: usize,
    pub y0: usize,
    pub xsize: usize,
    pub ysize: usize,
}

impl Rect {
    pub fn new(x0: usize, y0: usize, xsize: usize, ysize: usize) -> Self {
        Self {
            x0,
            y0,
            xsize,
            ysize,
        }
    }

    /// Whether the rect lies inside a `xsize` x `ysize` image.
    pub fn is_inside(&self, xsize: usize, ysize: usize) -> bool {
        self.x0 + self.xsize <= xsize && self.y0 + self.ysize <= ysize
    }
}

/// Exactly three planes with identical geometry (one per color channel).
#[derive(Debug, Clone)]
pub struct Image3<T> {
    planes: [Plane<T>; 3],
}

pub type Image3B = Image3<u8>;
pub type Image3S = Image3<i16>;
pub type Image3I = Image3<i32>;
pub type Image3F = Image3<f32>;
pub type Image3D = Image3<f64>;

impl<T: Pod> Image3<T> {
    pub fn new(xsize: usize, ysize: usize) -> Self {
        Self {
            planes: [
                Plane::new(xsize, ysize),
                Plane::new(xsize, ysize),
                Plane::new(xsize, ysize),
            ],
        }
    }

    /// Takes ownership of three planes, which must share dimensions.
    pub fn from_planes(plane0: Plane<T>, plane1: Plane<T>, plane2: Plane<T>) -> Self {
        assert!(
            plane0.same_size(&plane1) && plane0.same_size(&plane2),
            "plane geometry mismatch"
        );
        Self {
            planes: [plane0, plane1, plane2],
        }
    }

    pub fn into_planes(self) -> [Plane<T>; 3] {
        self.planes
    }

    pub fn xsize(&self) -> usize {
        self.planes[0].xsize()
    }

    pub fn ysize(&self) -> usize {
        self.planes[0].ysize()
    }

    pub fn orig_xsize(&self) -> usize {
        self.planes[0].orig_xsize()
    }

    pub fn orig_ysize(&self) -> usize {
        self.planes[0].orig_ysize()
    }

    pub fn bytes_per_row(&self) -> usize {
        self.planes[0].bytes_per_row()
    }

    pub fn same_size(&self, other: &Self) -> bool {
        self.planes[0].same_size(&other.planes[0])
    }

    pub fn plane(&self, c: usize) -> &Plane<T> {
        &self.planes[c]
    }

    pub fn plane_mut(&mut self, c: usize) -> &mut Plane<T> {
        &mut self.planes[c]
    }

    /// Mutable access to all three planes at once.
    pub fn planes_mut(&mut self) -> [&mut Plane<T>; 3] {
        let [p0, p1, p2] = &mut self.planes;
        [p0, p1, p2]
    }

    pub fn plane_row(&self, c: usize, y: usize) -> &[T] {
        self.planes[c].row(y)
    }

    pub fn plane_row_mut(&mut self, c: usize, y: usize) -> &mut [T] {
        self.planes[c].row_mut(y)
    }

    pub fn shrink_to(&mut self, xsize: usize, ysize: usize) {
        for plane in &mut self.planes {
            plane.shrink_to(xsize, ysize);
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ALIAS_BOUNDARY, CACHE_ALIGNMENT};

    #[test]
    fn test_plane_geometry() {
        let plane = ImageF::new(100, 7);
        assert_eq!(plane.xsize(), 100);
        assert_eq!(plane.ysize(), 7);
        assert!(plane.bytes_per_row() >= 400);
        assert_eq!(plane.bytes_per_row() % CACHE_ALIGNMENT, 0);
        assert_ne!(plane.bytes_per_row() % ALIAS_BOUNDARY, 0);
        assert_eq!(plane.pixels_per_row() * 4, plane.bytes_per_row());
        assert_eq!(plane.row(0).as_ptr() as usize % CACHE_ALIGNMENT, 0);
        assert_eq!(plane.row(6).as_ptr() as usize % CACHE_ALIGNMENT, 0);
    }

    #[test]
    fn test_zero_sized_plane_is_unallocated() {
        let plane = ImageB::new(0, 10);
        assert_eq!(plane.bytes_per_row(), 0);
        assert_eq!(plane.row(3).len(), 0);
        let plane = ImageD::new(10, 0);
        assert_eq!(plane.bytes_per_row(), 0);
    }

    #[test]
    fn test_rows_are_independent() {
        let mut plane = ImageI::new(5, 3);
        plane.row_mut(1).copy_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(plane.row(0), &[0, 0, 0, 0, 0]);
        assert_eq!(plane.row(1), &[1, 2, 3, 4, 5]);
        assert_eq!(plane.row(2), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_swap() {
        let mut a = ImageS::filled(4, 2, 7);
        let mut b = ImageS::new(9, 9);
        a.swap(&mut b);
        assert_eq!((a.xsize(), a.ysize()), (9, 9));
        assert_eq!((b.xsize(), b.ysize()), (4, 2));
        assert_eq!(b.row(1), &[7, 7, 7, 7]);
        assert_eq!(a.row(8)[8], 0);
    }

    #[test]
    fn test_shrink_and_regrow() {
        let mut plane = ImageF::filled(16, 16, 2.0);
        let ptr = plane.row(0).as_ptr();
        plane.shrink_to(10, 12);
        assert_eq!((plane.xsize(), plane.ysize()), (10, 12));
        assert_eq!(plane.row(11).len(), 10);
        plane.shrink_to(16, 16);
        assert_eq!(plane.row(15)[15], 2.0);
        assert_eq!(plane.row(0).as_ptr(), ptr);
    }

    #[test]
    #[should_panic]
    fn test_shrink_beyond_allocation_panics() {
        let mut plane = ImageU::new(8, 8);
        plane.shrink_to(9, 8);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_padding_is_zeroed() {
        let mut plane = ImageB::filled(3, 4, 0xAB);
        for y in 0..4 {
            plane.row_with_padding_mut(y).fill(0xFF);
        }
        plane.fill(0xAB);
        plane.initialize_padding(Padding::Unaligned);
        let tail = (3 + vector_size() - 1).min(plane.pixels_per_row());
        for y in 0..4 {
            let row = plane.row_with_padding(y);
            assert!(row[..3].iter().all(|&v| v == 0xAB));
            assert!(row[3..tail].iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_image3() {
        let mut image = Image3F::new(6, 5);
        assert_eq!((image.xsize(), image.ysize()), (6, 5));
        image.plane_row_mut(2, 4)[5] = 3.0;
        let [_, _, p2] = image.planes_mut();
        p2.row_mut(0)[0] = 1.0;
        assert_eq!(image.plane(2).row(4)[5], 3.0);
        assert_eq!(image.plane_row(2, 0)[0], 1.0);
        assert_eq!(image.plane_row(0, 0)[0], 0.0);
    }

    #[test]
    #[should_panic(expected = "plane geometry mismatch")]
    fn test_image3_rejects_mismatched_planes() {
        let _ = Image3B::from_planes(ImageB::new(4, 4), ImageB::new(4, 4), ImageB::new(4, 5));
    }
}
