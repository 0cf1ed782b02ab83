//! Copying, padding and reductions over planes.

use bytemuck::Pod;
use log::debug;

use crate::constants::BLOCK_DIM;
use crate::error::{DequantError, Result};
use crate::image::{Image3, ImageB, ImageF, Plane, Rect};

/// Copies a tightly packed 8-bit buffer whose rows start `bytes_per_row` apart.
pub fn image_from_packed(
    packed: &[u8],
    xsize: usize,
    ysize: usize,
    bytes_per_row: usize,
) -> Result<ImageB> {
    if bytes_per_row < xsize {
        return Err(DequantError::InvalidArgumentStride);
    }
    if ysize > 0 {
        let required = (ysize - 1)
            .checked_mul(bytes_per_row)
            .and_then(|n| n.checked_add(xsize))
            .ok_or(DequantError::InvalidArgumentSize)?;
        if packed.len() < required {
            return Err(DequantError::InvalidArgumentSize);
        }
    }

    let mut image = ImageB::new(xsize, ysize);
    for y in 0..ysize {
        let packed_row = &packed[y * bytes_per_row..y * bytes_per_row + xsize];
        image.row_mut(y).copy_from_slice(packed_row);
    }
    Ok(image)
}

/// Copy of the valid region of `from` in a freshly allocated plane.
pub fn copy_image<T: Pod>(from: &Plane<T>) -> Plane<T> {
    let mut to = Plane::new(from.xsize(), from.ysize());
    for y in 0..from.ysize() {
        to.row_mut(y).copy_from_slice(from.row(y));
    }
    to
}

pub fn fill_image<T: Pod>(value: T, image: &mut Image3<T>) {
    for plane in image.planes_mut() {
        plane.fill(value);
    }
}

/// Copies all of `from` into `to` at `rect`; `rect` must match the size of
/// `from` and lie inside `to`.
pub fn copy_image_to<T: Pod>(from: &Plane<T>, rect: Rect, to: &mut Plane<T>) {
    assert!(rect.xsize == from.xsize() && rect.ysize == from.ysize());
    assert!(rect.is_inside(to.xsize(), to.ysize()));
    for y in 0..rect.ysize {
        to.row_mut(rect.y0 + y)[rect.x0..rect.x0 + rect.xsize].copy_from_slice(from.row(y));
    }
}

/// Extends `input` to `xsize` x `ysize` by repeating the last column and then
/// the last row. Mirroring gives slightly worse results after compression.
pub fn pad_image<T: Pod>(input: &Plane<T>, xsize: usize, ysize: usize) -> Plane<T> {
    assert!(xsize >= input.xsize() && ysize >= input.ysize());
    let mut out = Plane::new(xsize, ysize);
    if xsize == 0 || ysize == 0 {
        return out;
    }
    assert!(
        input.xsize() > 0 && input.ysize() > 0,
        "cannot pad an empty image"
    );

    let in_xsize = input.xsize();
    for y in 0..input.ysize() {
        let row_out = out.row_mut(y);
        row_out[..in_xsize].copy_from_slice(input.row(y));
        let lastval = row_out[in_xsize - 1];
        row_out[in_xsize..].fill(lastval);
    }

    let lastrow = input.ysize() - 1;
    for y in input.ysize()..ysize {
        out.copy_row(lastrow, y);
    }
    out
}

/// Adds `border` pixels on all four sides of every plane, replicating the
/// nearest edge pixel.
pub fn pad_image_symmetric<T: Pod>(input: &Image3<T>, border: usize) -> Image3<T> {
    let xsize = input.xsize();
    let ysize = input.ysize();
    let mut out = Image3::new(xsize + 2 * border, ysize + 2 * border);
    if border > 0 {
        assert!(xsize > 0 && ysize > 0, "cannot pad an empty image");
    }

    for (c, out_plane) in out.planes_mut().into_iter().enumerate() {
        let in_plane = input.plane(c);
        copy_image_to(in_plane, Rect::new(border, border, xsize, ysize), out_plane);
        if border == 0 {
            continue;
        }

        for y in 0..ysize {
            let first = in_plane.row(y)[0];
            let last = in_plane.row(y)[xsize - 1];
            let row = out_plane.row_mut(y + border);
            row[..border].fill(first);
            row[xsize + border..].fill(last);
        }

        for y in 0..border {
            out_plane.copy_row(border, y);
            out_plane.copy_row(ysize + border - 1, y + ysize + border);
        }
    }
    out
}

/// Rounds both dimensions up to a multiple of `n`, replicating edge pixels.
pub fn pad_image_to_multiple<T: Pod>(input: &Image3<T>, n: usize) -> Image3<T> {
    assert!(n > 0);
    let xsize = input.xsize().next_multiple_of(n);
    let ysize = input.ysize().next_multiple_of(n);
    let [p0, p1, p2] = [0, 1, 2].map(|c| pad_image(input.plane(c), xsize, ysize));
    Image3::from_planes(p0, p1, p2)
}

/// Rounds both dimensions up to a multiple of the block size. Reuses the
/// existing allocation when it already covers the padded size (for example an
/// image allocated padded and then shrunk); otherwise reallocates.
pub fn pad_image_to_block_multiple_in_place<T: Pod>(input: &mut Image3<T>) {
    let xsize_orig = input.xsize();
    let ysize_orig = input.ysize();
    if xsize_orig == 0 || ysize_orig == 0 {
        return;
    }
    let xsize = xsize_orig.next_multiple_of(BLOCK_DIM);
    let ysize = ysize_orig.next_multiple_of(BLOCK_DIM);
    if xsize == xsize_orig && ysize == ysize_orig {
        return;
    }

    if xsize > input.orig_xsize() || ysize > input.orig_ysize() {
        debug!(
            "block padding {}x{} -> {}x{} needs a new allocation",
            xsize_orig, ysize_orig, xsize, ysize
        );
        *input = pad_image_to_multiple(input, BLOCK_DIM);
        return;
    }

    input.shrink_to(xsize, ysize);
    for plane in input.planes_mut() {
        for y in 0..ysize_orig {
            let row = plane.row_mut(y);
            let lastval = row[xsize_orig - 1];
            row[xsize_orig..].fill(lastval);
        }
        for y in ysize_orig..ysize {
            plane.copy_row(ysize_orig - 1, y);
        }
    }
}

/// Sum of elementwise products, accumulated in double precision.
pub fn dot_product(a: &ImageF, b: &ImageF) -> f32 {
    assert!(a.same_size(b));
    let mut sum = 0.0f64;
    for y in 0..a.ysize() {
        for (&va, &vb) in a.row(y).iter().zip(b.row(y)) {
            sum += f64::from(va) * f64::from(vb);
        }
    }
    sum as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(xsize: usize, ysize: usize) -> ImageF {
        let mut image = ImageF::new(xsize, ysize);
        for y in 0..ysize {
            for (x, v) in image.row_mut(y).iter_mut().enumerate() {
                *v = (y * 100 + x) as f32;
            }
        }
        image
    }

    #[test]
    fn test_copy_row() {
        let mut image = ramp(4, 3);
        image.copy_row(2, 0);
        assert_eq!(image.row(0), &[200.0, 201.0, 202.0, 203.0]);
        assert_eq!(image.row(1), &[100.0, 101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_pad_image_replicates_edges() {
        let image = ramp(3, 2);
        let padded = pad_image(&image, 5, 4);
        assert_eq!(padded.row(0), &[0.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(padded.row(1), &[100.0, 101.0, 102.0, 102.0, 102.0]);
        assert_eq!(padded.row(2), padded.row(1));
        assert_eq!(padded.row(3), padded.row(1));
    }

    #[test]
    fn test_copy_image_to() {
        let image = ramp(2, 2);
        let mut out = ImageF::new(4, 4);
        copy_image_to(&image, Rect::new(1, 2, 2, 2), &mut out);
        assert_eq!(out.row(2), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(out.row(3), &[0.0, 100.0, 101.0, 0.0]);
    }

    #[test]
    fn test_copy_image_drops_shrunk_region() {
        let mut image = ramp(16, 4);
        image.shrink_to(5, 3);
        let copy = copy_image(&image);
        assert_eq!((copy.xsize(), copy.ysize()), (5, 3));
        assert_eq!((copy.orig_xsize(), copy.orig_ysize()), (5, 3));
        assert_eq!(copy.row(2), &[200.0, 201.0, 202.0, 203.0, 204.0]);
    }

    #[test]
    fn test_fill_image() {
        let mut image = Image3::<i16>::new(3, 2);
        fill_image(-7, &mut image);
        for c in 0..3 {
            assert!(image.plane_row(c, 1).iter().all(|&v| v == -7));
        }
    }

    #[test]
    fn test_image_from_packed_huge_stride() {
        let packed = [0u8; 16];
        assert_eq!(
            image_from_packed(&packed, 4, 3, usize::MAX / 2 + 1).unwrap_err(),
            DequantError::InvalidArgumentSize
        );
        let image = image_from_packed(&packed, 4, 1, usize::MAX).unwrap();
        assert_eq!(image.row(0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_image_from_packed_rejects_bad_stride() {
        let packed = [0u8; 16];
        assert_eq!(
            image_from_packed(&packed, 4, 2, 3).unwrap_err(),
            DequantError::InvalidArgumentStride
        );
        assert_eq!(
            image_from_packed(&packed, 4, 3, 8).unwrap_err(),
            DequantError::InvalidArgumentSize
        );
    }
}
