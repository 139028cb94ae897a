//! kip-mode-lowband: perceptual AV1 rate control.
//!
//! Scores each frame for skin coverage and talking-head likelihood, then
//! spends the bit budget where it matters: lower QP inside skin regions,
//! higher per-frame targets for complex or keyframe frames, and an EMA error
//! accumulator that bleeds off over/under-spend across frames.

use kipepeo_core::config::VideoSettings;

use crate::analysis::{AnalyzerConfig, FrameAnalyzer, TalkingHeadScorer};
use crate::error::Result;
use crate::types::{running_mean, FrameAnalysis, RateControlStats, Yuv420};

/// QP reduction per unit of skin boost and ROI importance.
const SKIN_QP_STEP: f32 = 5.0;
/// QP reduction per unit of talking-head score outside skin regions.
const TALKING_HEAD_QP_STEP: f32 = 2.0;
/// EMA coefficient for the rate error accumulator.
const ERROR_EMA_ALPHA: f32 = 0.1;
/// Weight of the accumulated error in the next frame's multiplier.
const ERROR_COMPENSATION: f32 = 0.1;

/// The kip-mode-lowband rate controller. One controller per encoder;
/// single-threaded by contract.
pub struct KipModeLowband {
    config: VideoSettings,
    analyzer: FrameAnalyzer,
    rate_error: f32,
    stats: RateControlStats,
}

impl KipModeLowband {
    pub fn new(config: VideoSettings) -> Self {
        let analyzer = FrameAnalyzer::new(AnalyzerConfig {
            enable_skin_protection: config.enable_skin_protection,
            enable_talking_head_detection: config.enable_talking_head_detection,
        });
        Self {
            config,
            analyzer,
            rate_error: 0.0,
            stats: RateControlStats::default(),
        }
    }

    /// Install a CLIP-class talking-head scorer.
    pub fn set_scorer(&mut self, scorer: Box<dyn TalkingHeadScorer>) {
        self.analyzer.set_scorer(scorer);
    }

    /// Access to the analyzer, e.g. for threshold overrides.
    pub fn analyzer_mut(&mut self) -> &mut FrameAnalyzer {
        &mut self.analyzer
    }

    /// Analyze one frame and fold its skin coverage into the running stats.
    pub fn analyze_frame(&mut self, frame: &Yuv420<'_>) -> Result<FrameAnalysis> {
        frame.validate()?;
        let analysis = self.analyzer.analyze(frame);

        self.stats.total_frames += 1;
        self.stats.average_skin_coverage = running_mean(
            self.stats.average_skin_coverage,
            self.stats.total_frames,
            analysis.skin_tone_coverage,
        );

        Ok(analysis)
    }

    /// Per-macroblock QP, macroblock coordinates in 16x16 units.
    ///
    /// Skin ROIs get the full boost scaled by importance; talking-head frames
    /// get a milder reduction outside the ROIs. Always clamped to
    /// [min_qp_skin, max_qp_background].
    pub fn macroblock_qp(
        &self,
        mb_x: u32,
        mb_y: u32,
        base_qp: f32,
        analysis: &FrameAnalysis,
    ) -> f32 {
        let mut qp = base_qp;

        let in_skin_region = analysis
            .regions
            .iter()
            .find(|roi| roi.contains(mb_x, mb_y));

        if let Some(roi) = in_skin_region {
            qp -= self.config.skin_tone_boost * SKIN_QP_STEP * roi.importance;
        } else if analysis.talking_head_score > 0.5 {
            qp -= TALKING_HEAD_QP_STEP * analysis.talking_head_score;
        }

        qp.clamp(self.config.min_qp_skin, self.config.max_qp_background)
    }

    /// Per-frame bitrate target from the analysis record.
    pub fn frame_bitrate(&self, analysis: &FrameAnalysis, base_bitrate_kbps: u32) -> u32 {
        let mut multiplier = 1.0f32;

        if analysis.skin_tone_coverage > 0.1 {
            multiplier += 0.3 * analysis.skin_tone_coverage;
        }
        if analysis.talking_head_score > 0.5 {
            multiplier += 0.2 * analysis.talking_head_score;
        }
        multiplier += 0.2 * analysis.scene_complexity;
        multiplier *= 1.0 - 0.1 * analysis.temporal_stability;
        if analysis.keyframe_needed {
            multiplier *= 3.0;
        }

        // Error compensation: a positive accumulated error (over budget)
        // shrinks the next target.
        multiplier -= ERROR_COMPENSATION * self.rate_error;

        (base_bitrate_kbps as f32 * multiplier.max(0.0)) as u32
    }

    /// Fold the encoded frame's actual spend into the EMA error accumulator.
    pub fn update_after_frame(&mut self, actual_bits: u32, target_bits: u32) {
        self.stats.total_bits += actual_bits as u64;
        if target_bits == 0 {
            return;
        }
        let error = (actual_bits as f32 - target_bits as f32) / target_bits as f32;
        self.rate_error = (1.0 - ERROR_EMA_ALPHA) * self.rate_error + ERROR_EMA_ALPHA * error;
        log::trace!(
            "rate update: actual={} target={} ema_error={:.4}",
            actual_bits,
            target_bits,
            self.rate_error
        );
    }

    /// Current accumulated rate error.
    pub fn rate_error(&self) -> f32 {
        self.rate_error
    }

    pub fn stats(&self) -> RateControlStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Roi;

    fn controller() -> KipModeLowband {
        KipModeLowband::new(VideoSettings::default())
    }

    fn analysis_with(
        coverage: f32,
        talking: f32,
        complexity: f32,
        stability: f32,
        keyframe: bool,
    ) -> FrameAnalysis {
        FrameAnalysis {
            skin_tone_coverage: coverage,
            talking_head_score: talking,
            scene_complexity: complexity,
            temporal_stability: stability,
            keyframe_needed: keyframe,
            regions: Vec::new(),
        }
    }

    #[test]
    fn test_qp_skin_region_reduction() {
        let kip = controller();
        let mut analysis = analysis_with(0.5, 0.0, 0.0, 0.0, false);
        analysis.regions.push(Roi {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
            importance: 1.0,
        });

        // Inside the ROI: base - boost * 5 * importance = 30 - 7.5.
        let qp = kip.macroblock_qp(1, 1, 30.0, &analysis);
        assert!((qp - 22.5).abs() < 1e-5, "qp {}", qp);

        // Outside the ROI with no talking head: unchanged.
        let qp = kip.macroblock_qp(10, 10, 30.0, &analysis);
        assert!((qp - 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_qp_talking_head_reduction() {
        let kip = controller();
        let analysis = analysis_with(0.0, 0.9, 0.0, 0.0, false);
        let qp = kip.macroblock_qp(0, 0, 30.0, &analysis);
        assert!((qp - 28.2).abs() < 1e-5, "qp {}", qp);
    }

    #[test]
    fn test_qp_always_clamped() {
        let kip = controller();
        let cfg = VideoSettings::default();

        let mut analysis = analysis_with(1.0, 1.0, 1.0, 0.0, false);
        analysis.regions.push(Roi {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
            importance: 1.0,
        });

        for base in [-100.0f32, 0.0, 12.0, 30.0, 55.0, 500.0] {
            for mb in 0..20 {
                let qp = kip.macroblock_qp(mb, mb, base, &analysis);
                assert!(
                    (cfg.min_qp_skin..=cfg.max_qp_background).contains(&qp),
                    "qp {} out of bounds for base {}",
                    qp,
                    base
                );
            }
        }
    }

    #[test]
    fn test_frame_bitrate_components() {
        let kip = controller();

        // Neutral analysis: multiplier 1.0.
        let neutral = analysis_with(0.0, 0.0, 0.0, 0.0, false);
        assert_eq!(kip.frame_bitrate(&neutral, 1000), 1000);

        // Keyframe triples the target.
        let key = analysis_with(0.0, 0.0, 0.0, 0.0, true);
        assert_eq!(kip.frame_bitrate(&key, 1000), 3000);

        // Coverage at or below 0.1 contributes nothing.
        let low_skin = analysis_with(0.1, 0.0, 0.0, 0.0, false);
        assert_eq!(kip.frame_bitrate(&low_skin, 1000), 1000);
    }

    #[test]
    fn test_error_ema_update() {
        let mut kip = controller();
        kip.update_after_frame(1100, 1000); // 10% over
        assert!((kip.rate_error() - 0.01).abs() < 1e-6);
        kip.update_after_frame(1100, 1000);
        assert!((kip.rate_error() - 0.019).abs() < 1e-6);
    }

    #[test]
    fn test_over_budget_shrinks_next_target() {
        let neutral = analysis_with(0.0, 0.0, 0.0, 0.0, false);

        // Larger accumulated error -> strictly smaller next target.
        let mut last = u32::MAX;
        for over_pct in [10u32, 50, 100, 300] {
            let mut kip = controller();
            kip.update_after_frame(1000 + 10 * over_pct, 1000);
            let target = kip.frame_bitrate(&neutral, 1000);
            assert!(
                target < last,
                "error {}% -> target {} not below {}",
                over_pct,
                target,
                last
            );
            last = target;
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let mut kip = controller();
        kip.update_after_frame(8000, 8000);
        kip.update_after_frame(4000, 8000);
        let stats = kip.stats();
        assert_eq!(stats.total_bits, 12000);
    }
}
