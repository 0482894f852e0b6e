use tracing::{debug, info};

use super::{MediaError, VideoSettings};

/// One planar YUV 4:2:0 picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl Frame {
    /// Uniform frame, handy for tests and padding.
    pub fn filled(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let (cw, ch) = chroma_size(width, height);
        Self {
            y: vec![y; width as usize * height as usize],
            u: vec![u; cw as usize * ch as usize],
            v: vec![v; cw as usize * ch as usize],
        }
    }
}

pub fn chroma_size(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(2), height.div_ceil(2))
}

/// Byte lengths of the luma plane and of one chroma plane.
pub fn plane_sizes(width: u32, height: u32) -> Result<(usize, usize), MediaError> {
    let overflow = || MediaError::VideoFormat(format!("frame size {width}x{height} overflows"));
    let (cw, ch) = chroma_size(width, height);
    let luma = (width as usize).checked_mul(height as usize).ok_or_else(overflow)?;
    let chroma = (cw as usize).checked_mul(ch as usize).ok_or_else(overflow)?;
    // The whole frame must be addressable too.
    chroma
        .checked_mul(2)
        .and_then(|c| c.checked_add(luma))
        .ok_or_else(overflow)?;
    Ok((luma, chroma))
}

/// A decoded video stream with a rational frame rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub frames: Vec<Frame>,
}

impl Clip {
    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 * self.fps_den as f64 / self.fps_num as f64
    }
}

/// A fixed codec/container pair.
pub trait VideoCodec {
    fn name(&self) -> &str;

    fn decode(&self, bytes: &[u8]) -> Result<Clip, MediaError>;

    fn encode(&self, clip: &Clip) -> Result<Vec<u8>, MediaError>;
}

/// Concatenate encoded videos in the given order using the configured codec.
pub fn concatenate_video<B: AsRef<[u8]>>(buffers: &[B], settings: &VideoSettings) -> Result<Vec<u8>, MediaError> {
    let codec = settings.codec();
    concatenate_with(codec.as_ref(), buffers, settings.frame_rate)
}

pub fn concatenate_with<B: AsRef<[u8]>>(
    codec: &dyn VideoCodec,
    buffers: &[B],
    frame_rate: u32,
) -> Result<Vec<u8>, MediaError> {
    if buffers.is_empty() {
        return Err(MediaError::NoInput);
    }

    let clips = buffers
        .iter()
        .enumerate()
        .map(|(i, b)| {
            codec.decode(b.as_ref()).map_err(|e| match e {
                MediaError::VideoFormat(msg) => MediaError::VideoFormat(format!("input {}: {msg}", i + 1)),
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let combined = render_sequence(&clips, frame_rate)?;
    info!(
        "Combined {} video segments into {} frames at {} fps ({:.2}s, {})",
        clips.len(),
        combined.frames.len(),
        frame_rate,
        combined.duration_secs(),
        codec.name()
    );
    codec.encode(&combined)
}

/// Play each clip to completion, one after another, onto a single timeline.
///
/// The first clip fixes the output size. A clip ending at time `t` on the
/// combined timeline ends at output tick `round(t * frame_rate)`; each clip
/// gets at least one tick and samples the source frame on screen at each.
pub fn render_sequence(clips: &[Clip], frame_rate: u32) -> Result<Clip, MediaError> {
    let first = clips.first().ok_or(MediaError::NoInput)?;
    if frame_rate == 0 {
        return Err(MediaError::VideoFormat("output frame rate must be positive".into()));
    }
    let (width, height) = (first.width, first.height);

    let mut frames = Vec::new();
    // Clip boundaries are rounded on the shared timeline so error never accumulates.
    let mut elapsed = 0.0f64;
    let mut emitted = 0u64;
    for (i, clip) in clips.iter().enumerate() {
        if clip.frames.is_empty() {
            return Err(MediaError::VideoFormat(format!("input {} has no frames", i + 1)));
        }
        if clip.fps_num == 0 || clip.fps_den == 0 {
            return Err(MediaError::VideoFormat(format!(
                "input {} has invalid frame rate {}:{}",
                i + 1,
                clip.fps_num,
                clip.fps_den
            )));
        }

        elapsed += clip.duration_secs();
        let end = (elapsed * frame_rate as f64).round() as u64;
        let ticks = end.saturating_sub(emitted).max(1);
        emitted += ticks;
        debug!(
            clip = i + 1,
            source_frames = clip.frames.len(),
            ticks,
            "rendering clip"
        );

        for k in 0..ticks {
            // Source frame shown at time k / frame_rate.
            let src = (k * clip.fps_num as u64) / (frame_rate as u64 * clip.fps_den as u64);
            let src = (src as usize).min(clip.frames.len() - 1);
            frames.push(scale_frame(&clip.frames[src], clip.width, clip.height, width, height));
        }
    }

    Ok(Clip {
        width,
        height,
        fps_num: frame_rate,
        fps_den: 1,
        frames,
    })
}

fn scale_frame(frame: &Frame, sw: u32, sh: u32, dw: u32, dh: u32) -> Frame {
    if sw == dw && sh == dh {
        return frame.clone();
    }
    let (scw, sch) = chroma_size(sw, sh);
    let (dcw, dch) = chroma_size(dw, dh);
    Frame {
        y: scale_plane(&frame.y, sw, sh, dw, dh),
        u: scale_plane(&frame.u, scw, sch, dcw, dch),
        v: scale_plane(&frame.v, scw, sch, dcw, dch),
    }
}

/// Nearest-neighbour resize of one plane.
fn scale_plane(src: &[u8], sw: u32, sh: u32, dw: u32, dh: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(dw as usize * dh as usize);
    for y in 0..dh {
        let sy = (y as u64 * sh as u64 / dh as u64) as usize;
        let row = sy * sw as usize;
        for x in 0..dw {
            let sx = (x as u64 * sw as u64 / dw as u64) as usize;
            out.push(src[row + sx]);
        }
    }
    out
}
