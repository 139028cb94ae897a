//! Skin-tone detection in YCbCr space.
//!
//! A pixel is skin when its (Y, Cb, Cr) triple falls inside an axis-aligned
//! rectangle. The default rectangle is a generic one; the Fitzpatrick IV-VI
//! calibration widens it for darker skin tones. Thresholds are public and
//! overridable per product.

use crate::types::Yuv420;

/// Axis-aligned YCbCr thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinThresholds {
    pub y_min: u8,
    pub y_max: u8,
    pub cb_min: u8,
    pub cb_max: u8,
    pub cr_min: u8,
    pub cr_max: u8,
}

impl Default for SkinThresholds {
    fn default() -> Self {
        Self {
            y_min: 80,
            y_max: 220,
            cb_min: 85,
            cb_max: 135,
            cr_min: 135,
            cr_max: 180,
        }
    }
}

impl SkinThresholds {
    /// Calibration for Fitzpatrick IV-VI skin tones.
    pub fn fitzpatrick_iv_vi() -> Self {
        Self {
            y_min: 70,
            y_max: 230,
            cb_min: 80,
            cb_max: 140,
            cr_min: 130,
            cr_max: 185,
        }
    }

    #[inline]
    fn matches(&self, y: u8, cb: u8, cr: u8) -> bool {
        y >= self.y_min
            && y <= self.y_max
            && cb >= self.cb_min
            && cb <= self.cb_max
            && cr >= self.cr_min
            && cr <= self.cr_max
    }
}

/// YCbCr-rectangle skin detector.
#[derive(Debug, Clone, Default)]
pub struct SkinToneDetector {
    pub thresholds: SkinThresholds,
}

impl SkinToneDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector pre-calibrated for Fitzpatrick IV-VI.
    pub fn calibrated() -> Self {
        Self {
            thresholds: SkinThresholds::fitzpatrick_iv_vi(),
        }
    }

    /// Switch an existing detector to the Fitzpatrick IV-VI calibration.
    pub fn calibrate_for_fitzpatrick_iv_vi(&mut self) {
        self.thresholds = SkinThresholds::fitzpatrick_iv_vi();
    }

    /// Coverage = fraction of pixels inside the skin rectangle. When `mask`
    /// is provided it receives one byte per pixel (1 = skin), row-major.
    pub fn detect(&self, frame: &Yuv420<'_>, mut mask: Option<&mut [u8]>) -> f32 {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return 0.0;
        }
        if let Some(mask) = mask.as_deref_mut() {
            let len = mask.len().min(width * height);
            mask[..len].fill(0);
        }

        let uv_width = width / 2;
        let mut skin_pixels = 0usize;

        for row in 0..height {
            for col in 0..width {
                let y = frame.y[row * width + col];
                // Chroma is subsampled 2x2.
                let cb = frame.u[(row / 2) * uv_width + (col / 2)];
                let cr = frame.v[(row / 2) * uv_width + (col / 2)];

                if self.thresholds.matches(y, cb, cr) {
                    skin_pixels += 1;
                    if let Some(mask) = mask.as_deref_mut() {
                        if let Some(slot) = mask.get_mut(row * width + col) {
                            *slot = 1;
                        }
                    }
                }
            }
        }

        skin_pixels as f32 / (width * height) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a frame where the left half is skin-colored and the right half
    /// is far outside the rectangle.
    fn half_skin_frame(width: usize, height: usize) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut y = vec![0u8; width * height];
        let mut u = vec![0u8; (width / 2) * (height / 2)];
        let mut v = vec![0u8; (width / 2) * (height / 2)];
        for row in 0..height {
            for col in 0..width {
                y[row * width + col] = if col < width / 2 { 150 } else { 20 };
            }
        }
        for row in 0..height / 2 {
            for col in 0..width / 2 {
                let skin = col < width / 4;
                u[row * (width / 2) + col] = if skin { 110 } else { 200 };
                v[row * (width / 2) + col] = if skin { 150 } else { 50 };
            }
        }
        (y, u, v)
    }

    #[test]
    fn test_half_coverage() {
        let (w, h) = (32, 16);
        let (y, u, v) = half_skin_frame(w, h);
        let frame = Yuv420 {
            y: &y,
            u: &u,
            v: &v,
            width: w,
            height: h,
        };
        let det = SkinToneDetector::calibrated();
        let coverage = det.detect(&frame, None);
        assert!((coverage - 0.5).abs() < 0.05, "coverage {}", coverage);
    }

    #[test]
    fn test_mask_marks_skin_pixels() {
        let (w, h) = (16, 8);
        let (y, u, v) = half_skin_frame(w, h);
        let frame = Yuv420 {
            y: &y,
            u: &u,
            v: &v,
            width: w,
            height: h,
        };
        let det = SkinToneDetector::calibrated();
        let mut mask = vec![0u8; w * h];
        det.detect(&frame, Some(&mut mask));

        assert_eq!(mask[0], 1); // left edge is skin
        assert_eq!(mask[w - 1], 0); // right edge is not
    }

    #[test]
    fn test_calibration_widens_rectangle() {
        // A dark skin tone outside the generic Y range but inside the
        // Fitzpatrick IV-VI range.
        let (w, h) = (2, 2);
        let y = vec![72u8; w * h];
        let u = vec![100u8; 1];
        let v = vec![160u8; 1];
        let frame = Yuv420 {
            y: &y,
            u: &u,
            v: &v,
            width: w,
            height: h,
        };

        let generic = SkinToneDetector::new();
        assert_eq!(generic.detect(&frame, None), 0.0);

        let mut calibrated = SkinToneDetector::new();
        calibrated.calibrate_for_fitzpatrick_iv_vi();
        assert_eq!(calibrated.detect(&frame, None), 1.0);
    }

    #[test]
    fn test_threshold_override() {
        let (w, h) = (2, 2);
        let y = vec![50u8; w * h];
        let u = vec![100u8; 1];
        let v = vec![160u8; 1];
        let frame = Yuv420 {
            y: &y,
            u: &u,
            v: &v,
            width: w,
            height: h,
        };

        let mut det = SkinToneDetector::calibrated();
        assert_eq!(det.detect(&frame, None), 0.0);
        det.thresholds.y_min = 40;
        assert_eq!(det.detect(&frame, None), 1.0);
    }
}
