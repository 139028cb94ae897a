//! Thin AV1 decoder wrapper: OBU byte streams in, pooled YUV420 frames out.
//!
//! The decode work itself belongs to libdav1d (behind the `dav1d` feature);
//! this module owns the frame-buffer pool, the plane copies, and the
//! statistics. The backend is a trait so the pool and copy paths are
//! exercised without the system library.

use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, VideoError};
use crate::types::{running_mean, DecoderStats};

/// Pool capacity: four frames covers the decode-ahead of low-latency streams.
const POOL_SIZE: usize = 4;

/// Plane buffer alignment for SIMD row access.
const PLANE_ALIGN: usize = 64;

/// A zeroed byte buffer with guaranteed 64-byte alignment.
pub struct AlignedPlane {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: AlignedPlane owns its allocation exclusively.
unsafe impl Send for AlignedPlane {}
unsafe impl Sync for AlignedPlane {}

impl AlignedPlane {
    /// Allocate a zeroed, 64-byte aligned buffer of `len` bytes.
    pub fn new_zeroed(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len: 0,
            };
        }
        let layout = Layout::from_size_align(len, PLANE_ALIGN).expect("invalid plane layout");
        // SAFETY: layout has nonzero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };
        Self { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for AlignedPlane {
    fn drop(&mut self) {
        if self.len != 0 {
            let layout =
                Layout::from_size_align(self.len, PLANE_ALIGN).expect("invalid plane layout");
            // SAFETY: allocated in new_zeroed with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

impl Deref for AlignedPlane {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes (dangling only when len == 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedPlane {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and uniquely owned.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for AlignedPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedPlane").field("len", &self.len).finish()
    }
}

/// Decoder initialization parameters.
#[derive(Debug, Clone)]
pub struct Av1DecoderConfig {
    /// 0 = let the library decide.
    pub threads: u32,
    /// Maximum frame delay; 1 = low-latency.
    pub max_frame_delay: u32,
    /// Apply film grain synthesis.
    pub apply_grain: bool,
    /// Restrict in-loop filters for low-latency decode.
    pub low_latency: bool,
}

impl Default for Av1DecoderConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_frame_delay: 1,
            apply_grain: false,
            low_latency: true,
        }
    }
}

/// One set of YUV420 plane buffers, each 64-byte aligned.
#[derive(Debug)]
pub struct FramePlanes {
    pub y: AlignedPlane,
    pub u: AlignedPlane,
    pub v: AlignedPlane,
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl FramePlanes {
    fn sized_for(width: usize, height: usize) -> Self {
        Self {
            y: AlignedPlane::new_zeroed(width * height),
            u: AlignedPlane::new_zeroed((width / 2) * (height / 2)),
            v: AlignedPlane::new_zeroed((width / 2) * (height / 2)),
            y_stride: width,
            uv_stride: width / 2,
        }
    }

    fn fits(&self, width: usize, height: usize) -> bool {
        self.y.len() >= width * height && self.u.len() >= (width / 2) * (height / 2)
    }
}

/// Lazily grown pool of frame buffers, capped at [`POOL_SIZE`]. A buffer is
/// free when the pool holds its only reference; dropping a returned frame
/// releases its buffer back automatically. When every pooled buffer is in
/// flight a fresh caller-owned allocation is handed out instead.
#[derive(Debug, Default)]
pub struct FramePool {
    buffers: Vec<Arc<FramePlanes>>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a free buffer, fill it while the pool is still its sole
    /// owner, and hand back the shared handle.
    pub fn acquire_with(
        &mut self,
        width: usize,
        height: usize,
        fill: impl FnOnce(&mut FramePlanes),
    ) -> Arc<FramePlanes> {
        for buf in &mut self.buffers {
            if Arc::strong_count(buf) == 1 && buf.fits(width, height) {
                let planes = Arc::get_mut(buf).expect("sole owner checked above");
                fill(planes);
                return Arc::clone(buf);
            }
        }
        let mut fresh = FramePlanes::sized_for(width, height);
        fill(&mut fresh);
        let fresh = Arc::new(fresh);
        if self.buffers.len() < POOL_SIZE {
            self.buffers.push(Arc::clone(&fresh));
        }
        fresh
    }

    /// Drop buffers whose only owner is the pool, keeping the allocations of
    /// in-flight frames valid.
    pub fn clear(&mut self) {
        self.buffers.retain(|buf| Arc::strong_count(buf) > 1);
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// One decoded frame. Holding it keeps its pool buffer checked out.
#[derive(Debug)]
pub struct DecodedFrame {
    pub planes: Arc<FramePlanes>,
    pub width: usize,
    pub height: usize,
    pub pts: i64,
    pub keyframe: bool,
}

/// A picture produced by a decode backend, planes still in backend layout.
pub struct BackendPicture {
    pub width: usize,
    pub height: usize,
    pub pts: i64,
    pub keyframe: bool,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub y_stride: usize,
    pub uv_stride: usize,
}

/// The decode half the wrapper delegates to.
pub trait DecodeBackend: Send {
    fn send_data(&mut self, data: &[u8], pts: i64) -> Result<()>;
    /// Next decoded picture, or None when more input is needed.
    fn next_picture(&mut self) -> Result<Option<BackendPicture>>;
    /// Drop all queued state (seek support).
    fn flush(&mut self);
}

/// AV1 decoder wrapper.
pub struct Av1Decoder {
    backend: Box<dyn DecodeBackend>,
    pool: FramePool,
    stats: DecoderStats,
}

impl Av1Decoder {
    /// Build the decoder over libdav1d. Fails with
    /// [`VideoError::DecoderUnavailable`] when no backend is compiled in.
    #[cfg(feature = "dav1d")]
    pub fn new(config: Av1DecoderConfig) -> Result<Self> {
        let backend = dav1d_backend::Dav1dBackend::new(&config)?;
        Ok(Self::with_backend(Box::new(backend)))
    }

    #[cfg(not(feature = "dav1d"))]
    pub fn new(_config: Av1DecoderConfig) -> Result<Self> {
        Err(VideoError::DecoderUnavailable)
    }

    /// Build the decoder over an explicit backend (tests, custom decoders).
    pub fn with_backend(backend: Box<dyn DecodeBackend>) -> Self {
        Self {
            backend,
            pool: FramePool::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Feed one compressed OBU payload.
    pub fn send_data(&mut self, data: &[u8], pts: i64) -> Result<()> {
        if data.is_empty() {
            return Err(VideoError::Decode("empty payload".into()));
        }
        self.backend.send_data(data, pts)?;
        self.stats.bytes_processed += data.len() as u64;
        Ok(())
    }

    /// Pull the next decoded frame, or None when more data is needed.
    pub fn get_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let start = Instant::now();

        let Some(picture) = self.backend.next_picture()? else {
            return Ok(None);
        };

        let planes = self
            .pool
            .acquire_with(picture.width, picture.height, |buf| {
                copy_picture(&picture, buf)
            });

        self.stats.frames_decoded += 1;
        let elapsed_ms = start.elapsed().as_secs_f32() * 1000.0;
        self.stats.average_decode_time_ms = running_mean(
            self.stats.average_decode_time_ms,
            self.stats.frames_decoded,
            elapsed_ms,
        );

        Ok(Some(DecodedFrame {
            width: picture.width,
            height: picture.height,
            pts: picture.pts,
            keyframe: picture.keyframe,
            planes,
        }))
    }

    /// Drain frames buffered behind the last payload.
    pub fn flush(&mut self) -> Result<Option<DecodedFrame>> {
        self.get_frame()
    }

    /// Clear state for seeking; frees idle pool buffers.
    pub fn reset(&mut self) {
        self.backend.flush();
        self.pool.clear();
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }
}

/// Stride-aware plane copy from the backend picture into pooled planes.
fn copy_picture(picture: &BackendPicture, planes: &mut FramePlanes) {
    let (w, h) = (picture.width, picture.height);
    let (uv_w, uv_h) = (w / 2, h / 2);

    planes.y_stride = w;
    planes.uv_stride = uv_w;

    for row in 0..h {
        planes.y[row * w..(row + 1) * w]
            .copy_from_slice(&picture.y[row * picture.y_stride..row * picture.y_stride + w]);
    }
    for row in 0..uv_h {
        planes.u[row * uv_w..(row + 1) * uv_w]
            .copy_from_slice(&picture.u[row * picture.uv_stride..row * picture.uv_stride + uv_w]);
        planes.v[row * uv_w..(row + 1) * uv_w]
            .copy_from_slice(&picture.v[row * picture.uv_stride..row * picture.uv_stride + uv_w]);
    }
}

#[cfg(feature = "dav1d")]
mod dav1d_backend {
    //! libdav1d-backed decode path.

    use super::{Av1DecoderConfig, BackendPicture, DecodeBackend};
    use crate::error::{Result, VideoError};

    pub struct Dav1dBackend {
        decoder: dav1d::Decoder,
        first_picture_seen: bool,
    }

    impl Dav1dBackend {
        pub fn new(config: &Av1DecoderConfig) -> Result<Self> {
            let mut settings = dav1d::Settings::new();
            if config.threads > 0 {
                settings.set_n_threads(config.threads);
            }
            let delay = if config.low_latency {
                1
            } else {
                config.max_frame_delay
            };
            settings.set_max_frame_delay(delay);
            settings.set_apply_grain(config.apply_grain);

            let decoder = dav1d::Decoder::with_settings(&settings)
                .map_err(|e| VideoError::Init(format!("{e:?}")))?;
            Ok(Self {
                decoder,
                first_picture_seen: false,
            })
        }
    }

    impl DecodeBackend for Dav1dBackend {
        fn send_data(&mut self, data: &[u8], pts: i64) -> Result<()> {
            self.decoder
                .send_data(data.to_vec(), None, Some(pts), None)
                .map_err(|e| VideoError::Decode(format!("{e:?}")))
        }

        fn next_picture(&mut self) -> Result<Option<BackendPicture>> {
            let picture = match self.decoder.get_picture() {
                Ok(p) => p,
                Err(e) if e.is_again() => return Ok(None),
                Err(e) => return Err(VideoError::Decode(format!("{e:?}"))),
            };

            let width = picture.width() as usize;
            let height = picture.height() as usize;
            let y_stride = picture.stride(dav1d::PlanarImageComponent::Y) as usize;
            let uv_stride = picture.stride(dav1d::PlanarImageComponent::U) as usize;

            // The stream's first picture is its keyframe; libdav1d does not
            // expose the frame header beyond that.
            let keyframe = !self.first_picture_seen;
            self.first_picture_seen = true;

            Ok(Some(BackendPicture {
                width,
                height,
                pts: picture.timestamp().unwrap_or(0),
                keyframe,
                y: picture.plane(dav1d::PlanarImageComponent::Y).to_vec(),
                u: picture.plane(dav1d::PlanarImageComponent::U).to_vec(),
                v: picture.plane(dav1d::PlanarImageComponent::V).to_vec(),
                y_stride,
                uv_stride,
            }))
        }

        fn flush(&mut self) {
            self.decoder.flush();
            self.first_picture_seen = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Backend that replays queued pictures, one per submitted payload.
    struct ReplayBackend {
        queue: VecDeque<(usize, usize, i64)>,
        flushed: bool,
    }

    impl ReplayBackend {
        fn new() -> Self {
            Self {
                queue: VecDeque::new(),
                flushed: false,
            }
        }
    }

    impl DecodeBackend for ReplayBackend {
        fn send_data(&mut self, data: &[u8], pts: i64) -> Result<()> {
            // Payload bytes encode the dimensions for the test.
            let w = data[0] as usize * 2;
            let h = data[1] as usize * 2;
            self.queue.push_back((w, h, pts));
            Ok(())
        }

        fn next_picture(&mut self) -> Result<Option<BackendPicture>> {
            let Some((w, h, pts)) = self.queue.pop_front() else {
                return Ok(None);
            };
            // Strided planes with 4 bytes of row padding.
            let y_stride = w + 4;
            let uv_stride = w / 2 + 4;
            Ok(Some(BackendPicture {
                width: w,
                height: h,
                pts,
                keyframe: pts == 0,
                y: (0..y_stride * h).map(|i| (i % 256) as u8).collect(),
                u: vec![110; uv_stride * (h / 2)],
                v: vec![150; uv_stride * (h / 2)],
                y_stride,
                uv_stride,
            }))
        }

        fn flush(&mut self) {
            self.queue.clear();
            self.flushed = true;
        }
    }

    fn decoder() -> Av1Decoder {
        Av1Decoder::with_backend(Box::new(ReplayBackend::new()))
    }

    #[test]
    fn test_decode_strips_stride_padding() {
        let mut dec = decoder();
        dec.send_data(&[16, 8], 0).unwrap();
        let frame = dec.get_frame().unwrap().unwrap();

        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 16);
        assert!(frame.keyframe);
        assert_eq!(frame.planes.y_stride, 32);
        // Row 1 starts at source offset y_stride (36), destination offset 32.
        assert_eq!(frame.planes.y[32], (36 % 256) as u8);
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut dec = decoder();
        assert!(matches!(
            dec.send_data(&[], 0),
            Err(VideoError::Decode(_))
        ));
    }

    #[test]
    fn test_pool_reuses_buffers() {
        let mut dec = decoder();

        // Frames dropped immediately: the pool should stay at one buffer.
        for pts in 0..6 {
            dec.send_data(&[16, 8], pts).unwrap();
            let frame = dec.get_frame().unwrap().unwrap();
            drop(frame);
        }
        assert_eq!(dec.pool_len(), 1);
    }

    #[test]
    fn test_pool_overflow_allocates_fresh() {
        let mut dec = decoder();

        // Hold every frame: pool fills to its cap, then hands out unpooled
        // allocations.
        let mut held = Vec::new();
        for pts in 0..6 {
            dec.send_data(&[16, 8], pts).unwrap();
            held.push(dec.get_frame().unwrap().unwrap());
        }
        assert_eq!(dec.pool_len(), POOL_SIZE);
        assert_eq!(held.len(), 6);
        // The overflow frames are caller-owned: unique references.
        assert_eq!(Arc::strong_count(&held[5].planes), 1);
    }

    #[test]
    fn test_get_frame_needs_data() {
        let mut dec = decoder();
        assert!(dec.get_frame().unwrap().is_none());
    }

    #[test]
    fn test_reset_clears_pool_and_backend() {
        let mut dec = decoder();
        dec.send_data(&[16, 8], 0).unwrap();
        let _ = dec.get_frame().unwrap();
        assert_eq!(dec.pool_len(), 1);

        dec.reset();
        assert_eq!(dec.pool_len(), 0);
        assert!(dec.get_frame().unwrap().is_none());
    }

    #[test]
    fn test_stats_track_bytes_and_frames() {
        let mut dec = decoder();
        dec.send_data(&[16, 8], 0).unwrap();
        dec.send_data(&[16, 8], 1).unwrap();
        let _ = dec.get_frame().unwrap();
        let _ = dec.get_frame().unwrap();

        let stats = dec.stats();
        assert_eq!(stats.frames_decoded, 2);
        assert_eq!(stats.bytes_processed, 4);
    }

    #[test]
    fn test_planes_are_64_byte_aligned() {
        // Both pooled and overflow allocations must carry the alignment.
        let mut dec = decoder();
        let mut held = Vec::new();
        for pts in 0..6 {
            dec.send_data(&[16, 8], pts).unwrap();
            held.push(dec.get_frame().unwrap().unwrap());
        }
        for frame in &held {
            assert!((frame.planes.y.as_ptr() as usize).is_multiple_of(64));
            assert!((frame.planes.u.as_ptr() as usize).is_multiple_of(64));
            assert!((frame.planes.v.as_ptr() as usize).is_multiple_of(64));
        }
    }

    #[test]
    fn test_aligned_plane_zeroed_and_empty() {
        let plane = AlignedPlane::new_zeroed(100);
        assert_eq!(plane.len(), 100);
        assert!(plane.iter().all(|&b| b == 0));

        let empty = AlignedPlane::new_zeroed(0);
        assert!(empty.is_empty());
        assert_eq!(&empty[..], &[] as &[u8]);
    }

    #[test]
    fn test_unavailable_without_feature() {
        #[cfg(not(feature = "dav1d"))]
        {
            let err = Av1Decoder::new(Av1DecoderConfig::default());
            assert!(matches!(err, Err(VideoError::DecoderUnavailable)));
        }
    }
}
