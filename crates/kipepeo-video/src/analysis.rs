//! Frame analysis: skin coverage with region extraction, talking-head
//! scoring, scene complexity, temporal stability, and keyframe decisions.

use crate::skin::SkinToneDetector;
use crate::types::{FrameAnalysis, Roi, Yuv420, MACROBLOCK_SIZE, MAX_REGIONS};

/// Pixel sampling stride for the complexity estimate.
const COMPLEXITY_STRIDE: usize = 64;
/// Variance normalizer mapping sampled Y variance into [0, 1].
const COMPLEXITY_NORM: f32 = 1000.0;
/// Forced keyframe cadence in frames (2 seconds at 30 fps).
const KEYFRAME_INTERVAL: u32 = 60;
/// Cell skin coverage above which a grid cell becomes an ROI.
const ROI_CELL_COVERAGE: f32 = 0.3;
/// ROI grid layout: 4 columns x 2 rows.
const ROI_GRID_COLS: usize = 4;
const ROI_GRID_ROWS: usize = 2;

/// Hook for a CLIP-class embedding model scoring talking-head likelihood.
///
/// `score` returns None when the model is unavailable for this frame; the
/// analyzer then falls back to the skin-coverage predicate.
pub trait TalkingHeadScorer: Send {
    fn score(&self, frame: &Yuv420<'_>) -> Option<f32>;
}

/// Frame analyzer configuration.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    pub enable_skin_protection: bool,
    pub enable_talking_head_detection: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_skin_protection: true,
            enable_talking_head_detection: true,
        }
    }
}

/// Stateful per-stream frame analyzer.
pub struct FrameAnalyzer {
    detector: SkinToneDetector,
    scorer: Option<Box<dyn TalkingHeadScorer>>,
    config: AnalyzerConfig,
    frame_count: u32,
    mask: Vec<u8>,
}

impl FrameAnalyzer {
    /// Analyzer with the Fitzpatrick IV-VI calibration applied when skin
    /// protection is on.
    pub fn new(config: AnalyzerConfig) -> Self {
        let detector = if config.enable_skin_protection {
            SkinToneDetector::calibrated()
        } else {
            SkinToneDetector::new()
        };
        Self {
            detector,
            scorer: None,
            config,
            frame_count: 0,
            mask: Vec::new(),
        }
    }

    /// Install a CLIP-class scorer as the primary talking-head path.
    pub fn set_scorer(&mut self, scorer: Box<dyn TalkingHeadScorer>) {
        self.scorer = Some(scorer);
    }

    /// Access the detector, e.g. to override thresholds.
    pub fn detector_mut(&mut self) -> &mut SkinToneDetector {
        &mut self.detector
    }

    /// Frames analyzed so far.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Analyze one YUV420 frame.
    pub fn analyze(&mut self, frame: &Yuv420<'_>) -> FrameAnalysis {
        let mut analysis = FrameAnalysis::default();

        if self.config.enable_skin_protection {
            self.mask.resize(frame.width * frame.height, 0);
            analysis.skin_tone_coverage = self.detector.detect(frame, Some(&mut self.mask));
            analysis.regions = extract_skin_regions(&self.mask, frame.width, frame.height);
        }

        if self.config.enable_talking_head_detection {
            let clip_score = self.scorer.as_ref().and_then(|s| s.score(frame));
            analysis.talking_head_score = clip_score.unwrap_or_else(|| {
                // Coarse predicate when the embedding model is unavailable.
                if analysis.skin_tone_coverage > 0.15 {
                    0.8
                } else {
                    0.2
                }
            });
        }

        analysis.scene_complexity = scene_complexity(frame.y);
        analysis.temporal_stability = 0.7;
        analysis.keyframe_needed = self.frame_count % KEYFRAME_INTERVAL == 0;

        self.frame_count += 1;
        analysis
    }
}

/// Sampled Y variance, normalized and clipped to [0, 1].
fn scene_complexity(y_plane: &[u8]) -> f32 {
    let samples = y_plane.len().div_ceil(COMPLEXITY_STRIDE);
    if samples == 0 {
        return 0.0;
    }

    let mut mean = 0.0f32;
    for i in (0..y_plane.len()).step_by(COMPLEXITY_STRIDE) {
        mean += y_plane[i] as f32;
    }
    mean /= samples as f32;

    let mut variance = 0.0f32;
    for i in (0..y_plane.len()).step_by(COMPLEXITY_STRIDE) {
        let diff = y_plane[i] as f32 - mean;
        variance += diff * diff;
    }
    variance /= samples as f32;

    (variance / COMPLEXITY_NORM).min(1.0)
}

/// Coarse grid segmentation of the skin mask into at most [`MAX_REGIONS`]
/// rectangular ROIs, in macroblock units.
fn extract_skin_regions(mask: &[u8], width: usize, height: usize) -> Vec<Roi> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let cell_w = width.div_ceil(ROI_GRID_COLS);
    let cell_h = height.div_ceil(ROI_GRID_ROWS);
    let mut regions = Vec::new();

    for cell_row in 0..ROI_GRID_ROWS {
        for cell_col in 0..ROI_GRID_COLS {
            let x0 = cell_col * cell_w;
            let y0 = cell_row * cell_h;
            let x1 = (x0 + cell_w).min(width);
            let y1 = (y0 + cell_h).min(height);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            let mut skin = 0usize;
            for row in y0..y1 {
                for col in x0..x1 {
                    skin += mask[row * width + col] as usize;
                }
            }
            let coverage = skin as f32 / ((x1 - x0) * (y1 - y0)) as f32;

            if coverage > ROI_CELL_COVERAGE && regions.len() < MAX_REGIONS {
                regions.push(Roi {
                    x: (x0 / MACROBLOCK_SIZE) as u16,
                    y: (y0 / MACROBLOCK_SIZE) as u16,
                    width: (x1 - x0).div_ceil(MACROBLOCK_SIZE) as u16,
                    height: (y1 - y0).div_ceil(MACROBLOCK_SIZE) as u16,
                    importance: coverage.min(1.0),
                });
            }
        }
    }

    regions
}
