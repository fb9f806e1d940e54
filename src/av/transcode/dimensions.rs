use crate::error::{CompressError, Result};

/// Encoder output size. Both sides are positive and even.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDimensions {
    pub width: u32,
    pub height: u32,
}

/// Fits `src_w`x`src_h` inside `max_w`x`max_h`, keeping the aspect ratio,
/// never upscaling, and rounding both sides down to even.
///
/// Scaling is done in integer arithmetic: the limiting side lands exactly on
/// its bound and the other side is `floor(side * bound / limiting_side)`.
pub fn compute_output_dimensions(
    src_w: i64,
    src_h: i64,
    max_w: u32,
    max_h: u32,
) -> Result<OutputDimensions> {
    if src_w <= 0 || src_h <= 0 {
        return Err(CompressError::InvalidDimensions {
            width: src_w,
            height: src_h,
        });
    }
    if max_w == 0 || max_h == 0 {
        return Err(CompressError::InvalidDimensions {
            width: i64::from(max_w),
            height: i64::from(max_h),
        });
    }

    let (max_w, max_h) = (i64::from(max_w), i64::from(max_h));
    let (width, height) = if src_w <= max_w && src_h <= max_h {
        (src_w, src_h)
    } else if i128::from(max_w) * i128::from(src_h) <= i128::from(max_h) * i128::from(src_w) {
        (max_w, (i128::from(src_h) * i128::from(max_w) / i128::from(src_w)) as i64)
    } else {
        ((i128::from(src_w) * i128::from(max_h) / i128::from(src_h)) as i64, max_h)
    };

    let (width, height) = (width & !1, height & !1);
    if width <= 0 || height <= 0 || width > i64::from(u32::MAX) || height > i64::from(u32::MAX) {
        return Err(CompressError::InvalidDimensions { width, height });
    }

    Ok(OutputDimensions {
        width: width as u32,
        height: height as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn dims(src_w: i64, src_h: i64, max_w: u32, max_h: u32) -> (u32, u32) {
        let out = compute_output_dimensions(src_w, src_h, max_w, max_h).unwrap();
        (out.width, out.height)
    }

    #[test]
    fn test_downscale_4k_to_720p() {
        assert_eq!(dims(3840, 2160, 1280, 720), (1280, 720));
    }

    #[test]
    fn test_within_bounds_is_kept() {
        assert_eq!(dims(800, 600, 1280, 720), (800, 600));
        assert_eq!(dims(641, 359, 1280, 720), (640, 358));
    }

    #[test]
    fn test_height_limited() {
        // portrait 1080x1920 into 1280x720: ratio 720/1920
        assert_eq!(dims(1080, 1920, 1280, 720), (404, 720));
    }

    #[test]
    fn test_odd_result_rounded_down() {
        // height limits at 720/1081: 1920 * 720 / 1081 = 1278.8 -> 1278
        assert_eq!(dims(1920, 1081, 1280, 720), (1278, 720));
        // width limits at 1280/1921: 1080 * 1280 / 1921 = 719.6 -> 719 -> 718
        assert_eq!(dims(1921, 1080, 1280, 720), (1280, 718));
        // 1000x1000 into 641x641 -> 641 -> 640
        assert_eq!(dims(1000, 1000, 641, 641), (640, 640));
    }

    #[test]
    fn test_degenerate_inputs_fail() {
        assert!(compute_output_dimensions(0, 1080, 1280, 720).is_err());
        assert!(compute_output_dimensions(1920, -1, 1280, 720).is_err());
        assert!(compute_output_dimensions(1920, 1080, 0, 720).is_err());
        // collapses to zero height after scaling
        assert!(compute_output_dimensions(100_000, 1, 1280, 720).is_err());
        // a 1 pixel source rounds to zero
        assert!(compute_output_dimensions(1, 1, 1280, 720).is_err());
    }

    #[quickcheck]
    fn prop_even_and_bounded(src_w: u16, src_h: u16, max_w: u16, max_h: u16) -> bool {
        let (src_w, src_h) = (i64::from(src_w), i64::from(src_h));
        let (max_w, max_h) = (u32::from(max_w), u32::from(max_h));
        match compute_output_dimensions(src_w, src_h, max_w, max_h) {
            Ok(out) => {
                let within = src_w <= i64::from(max_w) && src_h <= i64::from(max_h);
                let exact = !within
                    || (i64::from(out.width), i64::from(out.height)) == (src_w & !1, src_h & !1);
                out.width % 2 == 0
                    && out.height % 2 == 0
                    && out.width > 0
                    && out.height > 0
                    && out.width <= max_w
                    && out.height <= max_h
                    && exact
            }
            // only degenerate inputs or outputs may fail
            Err(_) => {
                src_w == 0
                    || src_h == 0
                    || max_w == 0
                    || max_h == 0
                    || src_w * i64::from(max_h) < 2 * src_h
                    || src_h * i64::from(max_w) < 2 * src_w
                    || src_w < 2
                    || src_h < 2
                    || max_w < 2
                    || max_h < 2
            }
        }
    }

    #[quickcheck]
    fn prop_aspect_preserved(src_w: u16, src_h: u16) -> bool {
        let (src_w, src_h) = (i64::from(src_w) + 64, i64::from(src_h) + 64);
        let Ok(out) = compute_output_dimensions(src_w, src_h, 1280, 720) else {
            return true;
        };
        if src_w <= 1280 && src_h <= 720 {
            return true;
        }
        let source = src_w as f64 / src_h as f64;
        let output = f64::from(out.width) / f64::from(out.height);
        // floor plus parity correction moves each side by < 3 pixels
        let tolerance = source * (3.0 / f64::from(out.width) + 3.0 / f64::from(out.height));
        (output - source).abs() <= tolerance
    }
}
