//! Frame views, analysis records, and statistics types.

use crate::error::{Result, VideoError};

/// Macroblock edge in pixels; ROI coordinates use macroblock units.
pub const MACROBLOCK_SIZE: usize = 16;

/// Maximum regions of interest per frame.
pub const MAX_REGIONS: usize = 8;

/// Borrowed view of a planar YUV420 frame.
#[derive(Debug, Clone, Copy)]
pub struct Yuv420<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub width: usize,
    pub height: usize,
}

impl<'a> Yuv420<'a> {
    /// Split a contiguous YUV420 buffer (Y then U then V) into plane views.
    pub fn from_contiguous(data: &'a [u8], width: usize, height: usize) -> Result<Self> {
        let y_size = width * height;
        let uv_size = (width / 2) * (height / 2);
        if data.len() < y_size + 2 * uv_size {
            return Err(VideoError::InvalidFrame(format!(
                "buffer {} bytes, YUV420 {}x{} needs {}",
                data.len(),
                width,
                height,
                y_size + 2 * uv_size
            )));
        }
        Ok(Self {
            y: &data[..y_size],
            u: &data[y_size..y_size + uv_size],
            v: &data[y_size + uv_size..y_size + 2 * uv_size],
            width,
            height,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let y_size = self.width * self.height;
        let uv_size = (self.width / 2) * (self.height / 2);
        if self.y.len() < y_size || self.u.len() < uv_size || self.v.len() < uv_size {
            return Err(VideoError::InvalidFrame(format!(
                "plane sizes {}/{}/{} too small for {}x{}",
                self.y.len(),
                self.u.len(),
                self.v.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

/// Input frame for the encoder: YUV420 planes with strides.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
    pub width: usize,
    pub height: usize,
    pub force_keyframe: bool,
}

/// Rectangular region of interest, in macroblock units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Perceptual importance in [0, 1].
    pub importance: f32,
}

impl Roi {
    /// Whether a macroblock coordinate falls inside this region.
    pub fn contains(&self, mb_x: u32, mb_y: u32) -> bool {
        mb_x >= self.x as u32
            && mb_x < self.x as u32 + self.width as u32
            && mb_y >= self.y as u32
            && mb_y < self.y as u32 + self.height as u32
    }
}

/// Per-frame analysis record. Ephemeral: discarded once the rate controller
/// has updated its error accumulator.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    /// Fraction of pixels inside the skin rectangle (0-1).
    pub skin_tone_coverage: f32,
    /// Talking-head confidence (0-1).
    pub talking_head_score: f32,
    /// Sampled-variance complexity (0-1).
    pub scene_complexity: f32,
    /// Similarity to the previous frame (0-1).
    pub temporal_stability: f32,
    /// Whether a keyframe should be forced.
    pub keyframe_needed: bool,
    /// Up to [`MAX_REGIONS`] skin regions, macroblock units.
    pub regions: Vec<Roi>,
}

/// One encoded packet: a contiguous OBU byte stream.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub frame_number: u64,
    pub keyframe: bool,
}

/// Encoder-side statistics with running means.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_encoded: u64,
    pub average_bitrate_kbps: f32,
    pub average_encode_time_ms: f32,
}

/// Decoder-side statistics with running means.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub bytes_processed: u64,
    pub average_decode_time_ms: f32,
}

/// Rate-controller statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateControlStats {
    pub total_frames: u64,
    pub total_bits: u64,
    pub average_skin_coverage: f32,
    pub average_bitrate_kbps: f32,
    pub bitrate_savings_percent: f32,
}

/// Update a running mean with the next sample.
pub(crate) fn running_mean(mean: f32, count: u64, sample: f32) -> f32 {
    debug_assert!(count > 0);
    (mean * (count - 1) as f32 + sample) / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_split() {
        let (w, h) = (16, 8);
        let data = vec![0u8; w * h + 2 * (w / 2) * (h / 2)];
        let frame = Yuv420::from_contiguous(&data, w, h).unwrap();
        assert_eq!(frame.y.len(), 128);
        assert_eq!(frame.u.len(), 32);
        assert_eq!(frame.v.len(), 32);

        let short = vec![0u8; 64];
        assert!(Yuv420::from_contiguous(&short, w, h).is_err());
    }

    #[test]
    fn test_roi_contains() {
        let roi = Roi {
            x: 2,
            y: 3,
            width: 4,
            height: 2,
            importance: 1.0,
        };
        assert!(roi.contains(2, 3));
        assert!(roi.contains(5, 4));
        assert!(!roi.contains(6, 4));
        assert!(!roi.contains(2, 5));
        assert!(!roi.contains(1, 3));
    }

    #[test]
    fn test_running_mean() {
        let mut mean = 0.0;
        for (i, sample) in [2.0f32, 4.0, 6.0].iter().enumerate() {
            mean = running_mean(mean, (i + 1) as u64, *sample);
        }
        assert!((mean - 4.0).abs() < 1e-6);
    }
}
