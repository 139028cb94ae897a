//! kip-mode-lowband rate control and thin AV1 codec wrappers.
//!
//! Frame analysis (skin mask, talking-head score, scene complexity) drives
//! per-macroblock QP modulation and per-frame bitrate targets; the encoder
//! and decoder wrappers keep the external codec libraries at arm's length
//! behind frame-in/packet-out contracts.

pub mod analysis;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod lowband;
pub mod rate;
pub mod skin;
pub mod types;

pub use analysis::{AnalyzerConfig, FrameAnalyzer, TalkingHeadScorer};
pub use decoder::{AlignedPlane, Av1Decoder, Av1DecoderConfig, DecodedFrame, FramePlanes};
pub use encoder::{Av1Encoder, Av1EncoderConfig};
pub use error::{Result, VideoError};
pub use lowband::KipModeLowband;
pub use rate::RateControl;
pub use skin::{SkinThresholds, SkinToneDetector};
pub use types::{
    EncodedPacket, EncoderStats, DecoderStats, FrameAnalysis, InputFrame, RateControlStats, Roi,
    Yuv420,
};
