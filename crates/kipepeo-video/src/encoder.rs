//! Thin AV1 encoder wrapper: frames in, OBU packets out.
//!
//! Wraps the rav1e context directly; everything perceptual lives in
//! [`KipModeLowband`], which the encoder feeds with each submitted frame when
//! kip-mode is enabled. Threading inside the encoder belongs to rav1e and is
//! fixed at initialization.

use std::sync::Arc;
use std::time::Instant;

use rav1e::prelude::*;

use kipepeo_core::config::VideoSettings;

use crate::error::{Result, VideoError};
use crate::lowband::KipModeLowband;
use crate::types::{running_mean, EncodedPacket, EncoderStats, FrameAnalysis, InputFrame, Yuv420};

/// Encoder initialization parameters.
#[derive(Debug, Clone)]
pub struct Av1EncoderConfig {
    pub width: usize,
    pub height: usize,
    pub fps_num: u64,
    pub fps_den: u64,
    pub bitrate_kbps: u32,
    /// rav1e speed preset, 0 (slowest) to 10 (fastest).
    pub speed: u8,
    /// 0 = let the library decide.
    pub threads: usize,
    pub low_latency: bool,
    /// Enable kip-mode-lowband analysis with these settings.
    pub kip_mode: Option<VideoSettings>,
}

impl Default for Av1EncoderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps_num: 30,
            fps_den: 1,
            bitrate_kbps: 500,
            speed: 9,
            threads: 0,
            low_latency: true,
            kip_mode: Some(VideoSettings::default()),
        }
    }
}

/// AV1 encoder wrapper. Packets come back one at a time from
/// [`Av1Encoder::receive_packet`]; a `None` frame flushes.
pub struct Av1Encoder {
    ctx: Context<u8>,
    config: Av1EncoderConfig,
    kip: Option<KipModeLowband>,
    last_analysis: Option<FrameAnalysis>,
    stats: EncoderStats,
    frames_sent: u64,
    // Scratch planes for de-striding frames handed to the analyzer.
    scratch: (Vec<u8>, Vec<u8>, Vec<u8>),
}

impl Av1Encoder {
    /// Build and start the underlying encoder. Library failures come back
    /// verbatim as [`VideoError::Init`].
    pub fn new(config: Av1EncoderConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(VideoError::Init("dimensions must be non-zero".into()));
        }

        let enc = EncoderConfig {
            width: config.width,
            height: config.height,
            time_base: Rational::new(config.fps_den, config.fps_num),
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Cs420,
            bitrate: (config.bitrate_kbps as i32).saturating_mul(1000),
            low_latency: config.low_latency,
            speed_settings: SpeedSettings::from_preset(config.speed.min(10) as u8),
            ..Default::default()
        };

        let mut cfg = Config::new().with_encoder_config(enc);
        if config.threads > 0 {
            cfg = cfg.with_threads(config.threads);
        }

        let ctx: Context<u8> = cfg
            .new_context()
            .map_err(|e| VideoError::Init(format!("{e:?}")))?;

        let kip = config.kip_mode.clone().map(KipModeLowband::new);

        Ok(Self {
            ctx,
            config,
            kip,
            last_analysis: None,
            stats: EncoderStats::default(),
            frames_sent: 0,
            scratch: (Vec::new(), Vec::new(), Vec::new()),
        })
    }

    /// Submit one frame; `None` signals flush.
    pub fn send_frame(&mut self, frame: Option<&InputFrame<'_>>) -> Result<()> {
        let Some(frame) = frame else {
            self.ctx.flush();
            return Ok(());
        };

        if frame.width != self.config.width || frame.height != self.config.height {
            return Err(VideoError::InvalidFrame(format!(
                "frame {}x{} does not match encoder {}x{}",
                frame.width, frame.height, self.config.width, self.config.height
            )));
        }

        let start = Instant::now();

        if let Some(kip) = self.kip.as_mut() {
            let view = destride_into(&mut self.scratch, frame)?;
            let analysis = kip.analyze_frame(&view)?;
            self.last_analysis = Some(analysis);
        }

        let mut ra_frame = self.ctx.new_frame();
        ra_frame.planes[0].copy_from_raw_u8(frame.y, frame.y_stride, 1);
        ra_frame.planes[1].copy_from_raw_u8(frame.u, frame.uv_stride, 1);
        ra_frame.planes[2].copy_from_raw_u8(frame.v, frame.uv_stride, 1);

        let send_result = if frame.force_keyframe {
            self.ctx.send_frame((
                Arc::new(ra_frame),
                FrameParameters {
                    frame_type_override: FrameTypeOverride::Key,
                    ..Default::default()
                },
            ))
        } else {
            self.ctx.send_frame(ra_frame)
        };

        match send_result {
            Ok(()) => {}
            Err(EncoderStatus::EnoughData) => {
                return Err(VideoError::Encode(
                    "encoder queue full; drain packets first".into(),
                ))
            }
            Err(e) => return Err(VideoError::Encode(format!("{e:?}"))),
        }

        self.frames_sent += 1;
        let elapsed_ms = start.elapsed().as_secs_f32() * 1000.0;
        self.stats.average_encode_time_ms =
            running_mean(self.stats.average_encode_time_ms, self.frames_sent, elapsed_ms);

        Ok(())
    }

    /// Receive the next packet, or `None` when the encoder needs more input
    /// (or is fully drained after a flush).
    pub fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        loop {
            match self.ctx.receive_packet() {
                Ok(packet) => {
                    self.stats.frames_encoded += 1;
                    self.stats.bytes_encoded += packet.data.len() as u64;
                    self.update_bitrate_stat();

                    return Ok(Some(EncodedPacket {
                        keyframe: packet.frame_type == FrameType::KEY,
                        frame_number: packet.input_frameno,
                        data: packet.data,
                    }));
                }
                // A frame finished encoding without producing a packet yet.
                Err(EncoderStatus::Encoded) => continue,
                Err(EncoderStatus::NeedMoreData) | Err(EncoderStatus::LimitReached) => {
                    return Ok(None)
                }
                Err(e) => return Err(VideoError::Encode(format!("{e:?}"))),
            }
        }
    }

    /// Analysis of the most recently submitted frame, when kip-mode is on.
    pub fn last_analysis(&self) -> Option<&FrameAnalysis> {
        self.last_analysis.as_ref()
    }

    /// The kip-mode controller, for QP queries and rate feedback.
    pub fn kip_mode_mut(&mut self) -> Option<&mut KipModeLowband> {
        self.kip.as_mut()
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    fn update_bitrate_stat(&mut self) {
        if self.stats.frames_encoded == 0 || self.config.fps_num == 0 {
            return;
        }
        let seconds = self.stats.frames_encoded as f32 * self.config.fps_den as f32
            / self.config.fps_num as f32;
        if seconds > 0.0 {
            self.stats.average_bitrate_kbps =
                self.stats.bytes_encoded as f32 * 8.0 / 1000.0 / seconds;
        }
    }

}

/// A packed-row YUV view of the frame for the analyzer; copies through the
/// scratch planes only when the strides carry padding.
fn destride_into<'a>(
    scratch: &'a mut (Vec<u8>, Vec<u8>, Vec<u8>),
    frame: &InputFrame<'a>,
) -> Result<Yuv420<'a>> {
    let (w, h) = (frame.width, frame.height);
    let (uv_w, uv_h) = (w / 2, h / 2);

    if frame.y_stride == w && frame.uv_stride == uv_w {
        let view = Yuv420 {
            y: frame.y,
            u: frame.u,
            v: frame.v,
            width: w,
            height: h,
        };
        view.validate()?;
        return Ok(view);
    }

    if frame.y.len() < frame.y_stride * h || frame.u.len() < frame.uv_stride * uv_h {
        return Err(VideoError::InvalidFrame(
            "plane shorter than stride * rows".into(),
        ));
    }

    let (sy, su, sv) = scratch;
    sy.resize(w * h, 0);
    su.resize(uv_w * uv_h, 0);
    sv.resize(uv_w * uv_h, 0);
    for row in 0..h {
        sy[row * w..(row + 1) * w]
            .copy_from_slice(&frame.y[row * frame.y_stride..row * frame.y_stride + w]);
    }
    for row in 0..uv_h {
        su[row * uv_w..(row + 1) * uv_w]
            .copy_from_slice(&frame.u[row * frame.uv_stride..row * frame.uv_stride + uv_w]);
        sv[row * uv_w..(row + 1) * uv_w]
            .copy_from_slice(&frame.v[row * frame.uv_stride..row * frame.uv_stride + uv_w]);
    }

    Ok(Yuv420 {
        y: sy,
        u: su,
        v: sv,
        width: w,
        height: h,
    })
}
