//! Geometric queries over binary masks

use super::types::{BinaryMask, BoundingBox, MaskError};

/// Tight box over set pixels, or `None` for an empty mask
pub fn bounding_box(mask: &BinaryMask) -> Option<BoundingBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for y in 0..mask.height() {
        for x in 0..mask.width() {
            if !mask.get(x, y) {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                }
            });
        }
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| {
        [min_x as f32, min_y as f32, max_x as f32, max_y as f32]
    })
}

/// Whether `(x, y)` lies on a set pixel; false outside the mask's bounds
pub fn contains_point(mask: &BinaryMask, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= mask.width() as i64 || y >= mask.height() as i64 {
        return false;
    }
    mask.get(x as u32, y as u32)
}

/// Number of set pixels
pub fn area(mask: &BinaryMask) -> u64 {
    mask.count_ones()
}

/// Pixelwise OR of two equally sized masks
pub fn union(a: &BinaryMask, b: &BinaryMask) -> Result<BinaryMask, MaskError> {
    if a.dimensions() != b.dimensions() {
        return Err(MaskError::DimensionMismatch {
            left_width: a.width(),
            left_height: a.height(),
            right_width: b.width(),
            right_height: b.height(),
        });
    }

    let (left, right) = (a.as_slice(), b.as_slice());
    Ok(BinaryMask::from_fn(a.width(), a.height(), |x, y| {
        let idx = y as usize * a.width() as usize + x as usize;
        left[idx] || right[idx]
    }))
}

/// Union of every mask in `masks`; `None` when the slice is empty
pub fn union_all(masks: &[BinaryMask]) -> Result<Option<BinaryMask>, MaskError> {
    let mut iter = masks.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };

    let mut combined = first.clone();
    for mask in iter {
        combined = union(&combined, mask)?;
    }
    Ok(Some(combined))
}
