//! Outer rate controller: clamps the kip-mode per-frame target into the
//! configured bitrate window and keeps a smoothed correction factor for
//! callers that bypass frame analysis.

use kipepeo_core::config::VideoSettings;

use crate::error::Result;
use crate::lowband::KipModeLowband;
use crate::types::{FrameAnalysis, RateControlStats, Yuv420};

/// Assumed cadence for the savings estimate.
const NOMINAL_FPS: f32 = 30.0;

/// Rate controller wrapping [`KipModeLowband`] with hard bitrate bounds.
pub struct RateControl {
    config: VideoSettings,
    kip: KipModeLowband,
    adjustment: f32,
    total_frames: u64,
    total_bits: u64,
}

impl RateControl {
    pub fn new(config: VideoSettings) -> Self {
        let kip = KipModeLowband::new(config.clone());
        Self {
            config,
            kip,
            adjustment: 1.0,
            total_frames: 0,
            total_bits: 0,
        }
    }

    /// Access the inner kip-mode controller (scorer install, QP queries).
    pub fn kip_mode_mut(&mut self) -> &mut KipModeLowband {
        &mut self.kip
    }

    pub fn kip_mode(&self) -> &KipModeLowband {
        &self.kip
    }

    /// Analyze a frame and produce its clamped bitrate target in kbps.
    pub fn compute_target_bitrate(
        &mut self,
        frame: &Yuv420<'_>,
        base_bitrate_kbps: u32,
    ) -> Result<(u32, FrameAnalysis)> {
        let analysis = self.kip.analyze_frame(frame)?;
        let target = self.kip.frame_bitrate(&analysis, base_bitrate_kbps);
        let clamped = target.clamp(self.config.min_bitrate_kbps, self.config.max_bitrate_kbps);

        self.total_frames += 1;
        Ok((clamped, analysis))
    }

    /// Fold the encoded frame back into both error accumulators.
    pub fn update_after_frame(&mut self, actual_bits: u32, target_bits: u32) {
        self.kip.update_after_frame(actual_bits, target_bits);
        self.total_bits += actual_bits as u64;

        if target_bits > 0 && actual_bits > 0 {
            let ratio = actual_bits as f32 / target_bits as f32;
            self.adjustment = (0.95 * self.adjustment + 0.05 * (1.0 / ratio)).clamp(0.5, 2.0);
        }
    }

    /// Smoothed correction factor in [0.5, 2.0].
    pub fn bitrate_adjustment(&self) -> f32 {
        self.adjustment
    }

    pub fn stats(&self) -> RateControlStats {
        let mut stats = self.kip.stats();
        stats.total_bits = self.total_bits;
        if self.total_frames > 0 {
            // kbits per frame.
            stats.average_bitrate_kbps =
                self.total_bits as f32 / 1000.0 / self.total_frames as f32;

            let nominal_bits =
                self.config.target_bitrate_kbps as f32 * 1000.0 / NOMINAL_FPS
                    * self.total_frames as f32;
            if nominal_bits > 0.0 {
                stats.bitrate_savings_percent =
                    (1.0 - self.total_bits as f32 / nominal_bits) * 100.0;
            }
        }
        stats
    }
}
