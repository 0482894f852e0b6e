//! YUV4MPEG2 reader/writer for 8-bit 4:2:0 streams.

use super::video::{plane_sizes, Clip, Frame, VideoCodec};
use super::MediaError;

const MAGIC: &[u8] = b"YUV4MPEG2";
const FRAME_TAG: &[u8] = b"FRAME";

/// Colour spaces that are 8-bit 4:2:0 and differ only in chroma siting.
const SUPPORTED_COLORSPACES: &[&str] = &["420", "420jpeg", "420paldv", "420mpeg2"];

pub struct Y4mCodec;

impl VideoCodec for Y4mCodec {
    fn name(&self) -> &str {
        "y4m"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Clip, MediaError> {
        let (header, mut pos) = read_line(bytes, 0)
            .ok_or_else(|| MediaError::VideoFormat("truncated stream header".into()))?;
        let header = parse_header(header)?;

        let (luma, chroma) = plane_sizes(header.width, header.height)?;
        let frame_len = luma + 2 * chroma;

        let mut frames = Vec::new();
        while pos < bytes.len() {
            let (tag, next) = read_line(bytes, pos).ok_or_else(|| {
                MediaError::VideoFormat(format!("truncated frame header after frame {}", frames.len()))
            })?;
            // Frame headers may carry parameters after the tag; we ignore them.
            if !tag.starts_with(FRAME_TAG) {
                return Err(MediaError::VideoFormat(format!(
                    "expected FRAME marker at byte {pos}"
                )));
            }
            let end = next.checked_add(frame_len).filter(|e| *e <= bytes.len());
            let Some(end) = end else {
                return Err(MediaError::VideoFormat(format!(
                    "frame {} is truncated",
                    frames.len() + 1
                )));
            };
            let data = &bytes[next..end];
            frames.push(Frame {
                y: data[..luma].to_vec(),
                u: data[luma..luma + chroma].to_vec(),
                v: data[luma + chroma..].to_vec(),
            });
            pos = end;
        }

        Ok(Clip {
            width: header.width,
            height: header.height,
            fps_num: header.fps_num,
            fps_den: header.fps_den,
            frames,
        })
    }

    fn encode(&self, clip: &Clip) -> Result<Vec<u8>, MediaError> {
        let (luma, chroma) = plane_sizes(clip.width, clip.height)?;

        let header = format!(
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C420jpeg\n",
            clip.width, clip.height, clip.fps_num, clip.fps_den
        );
        let frame_len = 6 + luma + 2 * chroma;
        let mut out = Vec::with_capacity(header.len() + clip.frames.len().saturating_mul(frame_len));
        out.extend_from_slice(header.as_bytes());

        for (i, f) in clip.frames.iter().enumerate() {
            if f.y.len() != luma || f.u.len() != chroma || f.v.len() != chroma {
                return Err(MediaError::VideoFormat(format!(
                    "frame {} does not match {}x{}",
                    i + 1,
                    clip.width,
                    clip.height
                )));
            }
            out.extend_from_slice(b"FRAME\n");
            out.extend_from_slice(&f.y);
            out.extend_from_slice(&f.u);
            out.extend_from_slice(&f.v);
        }
        Ok(out)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Header {
    width: u32,
    height: u32,
    fps_num: u32,
    fps_den: u32,
}

fn parse_header(line: &[u8]) -> Result<Header, MediaError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| MediaError::VideoFormat("stream header is not ASCII".into()))?;
    let mut tokens = line.split(' ').filter(|t| !t.is_empty());
    if tokens.next().map(str::as_bytes) != Some(MAGIC) {
        return Err(MediaError::VideoFormat("not a YUV4MPEG2 stream".into()));
    }

    let mut width = None;
    let mut height = None;
    let mut fps = None;
    for token in tokens {
        let mut chars = token.chars();
        let key = chars.next();
        let value = chars.as_str();
        match key {
            Some('W') => width = value.parse::<u32>().ok(),
            Some('H') => height = value.parse::<u32>().ok(),
            Some('F') => {
                fps = value
                    .split_once(':')
                    .and_then(|(n, d)| Some((n.parse::<u32>().ok()?, d.parse::<u32>().ok()?)));
            }
            Some('C') => {
                if !SUPPORTED_COLORSPACES.contains(&value) {
                    return Err(MediaError::VideoFormat(format!(
                        "unsupported colour space C{value}, need 8-bit 4:2:0"
                    )));
                }
            }
            _ => {}
        }
    }

    let width = width
        .filter(|w| *w > 0)
        .ok_or_else(|| MediaError::VideoFormat("missing or invalid width".into()))?;
    let height = height
        .filter(|h| *h > 0)
        .ok_or_else(|| MediaError::VideoFormat("missing or invalid height".into()))?;
    let (fps_num, fps_den) = fps
        .filter(|(n, d)| *n > 0 && *d > 0)
        .ok_or_else(|| MediaError::VideoFormat("missing or invalid frame rate".into()))?;

    Ok(Header {
        width,
        height,
        fps_num,
        fps_den,
    })
}

/// Returns the line starting at `start` (without the newline) and the offset after it.
fn read_line(bytes: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rel = bytes[start..].iter().position(|b| *b == b'\n')?;
    Some((&bytes[start..start + rel], start + rel + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_handwritten_stream() {
        let mut bytes = b"YUV4MPEG2 W2 H2 F25:1 Ip A0:0 C420mpeg2 XYSCSS=420MPEG2\n".to_vec();
        bytes.extend_from_slice(b"FRAME\n");
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        bytes.extend_from_slice(b"FRAME Ixyz\n");
        bytes.extend_from_slice(&[7, 8, 9, 10, 11, 12]);

        let clip = Y4mCodec.decode(&bytes).unwrap();
        assert_eq!((clip.width, clip.height), (2, 2));
        assert_eq!((clip.fps_num, clip.fps_den), (25, 1));
        assert_eq!(clip.frames.len(), 2);
        assert_eq!(clip.frames[0].y, vec![1, 2, 3, 4]);
        assert_eq!(clip.frames[0].u, vec![5]);
        assert_eq!(clip.frames[1].v, vec![12]);
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        let clip = Clip {
            width: 3,
            height: 3,
            fps_num: 30000,
            fps_den: 1001,
            frames: vec![Frame::filled(3, 3, 16, 128, 128)],
        };
        let bytes = Y4mCodec.encode(&clip).unwrap();
        let back = Y4mCodec.decode(&bytes).unwrap();
        assert_eq!(back.frames[0].u.len(), 4);
        assert_eq!((back.fps_num, back.fps_den), (30000, 1001));
    }

    #[test]
    fn rejects_unsupported_colour_space() {
        let bytes = b"YUV4MPEG2 W2 H2 F25:1 C444\n".to_vec();
        let err = Y4mCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, MediaError::VideoFormat(ref m) if m.contains("C444")));
    }

    #[test]
    fn rejects_truncated_frames_and_bad_headers() {
        let mut bytes = b"YUV4MPEG2 W2 H2 F25:1\nFRAME\n".to_vec();
        bytes.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(Y4mCodec.decode(&bytes), Err(MediaError::VideoFormat(_))));

        assert!(Y4mCodec.decode(b"RIFF....\n").is_err());
        assert!(Y4mCodec.decode(b"YUV4MPEG2 W2 F25:1\n").is_err());
        assert!(Y4mCodec.decode(b"YUV4MPEG2 W2 H2 F0:1\n").is_err());
    }

    #[test]
    fn oversized_header_is_rejected_without_panicking() {
        let err = Y4mCodec.decode(b"YUV4MPEG2 W70000 H70000 F25:1\nFRAME\n\0\0").unwrap_err();
        assert!(matches!(err, MediaError::VideoFormat(_)));

        let err = Y4mCodec
            .decode(format!("YUV4MPEG2 W{} H{} F25:1\nFRAME\n", u32::MAX, u32::MAX).as_bytes())
            .unwrap_err();
        assert!(matches!(err, MediaError::VideoFormat(_)));
    }

    #[test]
    fn encode_checks_plane_sizes() {
        let clip = Clip {
            width: 4,
            height: 4,
            fps_num: 30,
            fps_den: 1,
            frames: vec![Frame::filled(2, 2, 0, 0, 0)],
        };
        assert!(Y4mCodec.encode(&clip).is_err());
    }
}
