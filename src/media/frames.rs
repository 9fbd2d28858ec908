// src/media/frames.rs
//! Blocking image work: decode, normalize, lay out and encode GIFs.

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, Rgba, RgbaImage};

use super::ComposeError;

/// Canvas fill behind letterboxed artwork (chat dark theme grey).
pub const BACKGROUND: Rgba<u8> = Rgba([47, 49, 54, 255]);

/// Largest multiple of 16 not above `h`, never below 16.
pub fn align_down_16(h: u32) -> u32 {
    (h / 16).max(1) * 16
}

pub fn align_up_16(w: u32) -> u32 {
    w.div_ceil(16).max(1) * 16
}

/// Decode whatever artwork parses; undecodable blobs are skipped with a warning.
pub fn decode_all(label: &str, blobs: &[(String, bytes::Bytes)]) -> Vec<RgbaImage> {
    blobs
        .iter()
        .filter_map(|(url, raw)| match image::load_from_memory(raw) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                tracing::warn!(source = label, %url, error = %e, "artwork not decodable, skipping");
                None
            }
        })
        .collect()
}

/// Scale to exactly `height`, keeping aspect ratio.
pub fn fit_height(img: &RgbaImage, height: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if h == height {
        return img.clone();
    }
    let width = ((w as u64 * height as u64) / h.max(1) as u64).max(1) as u32;
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// Place two images side by side.
pub fn hstack(left: &RgbaImage, right: &RgbaImage) -> RgbaImage {
    let height = left.height().max(right.height());
    let mut canvas = RgbaImage::from_pixel(left.width() + right.width(), height, BACKGROUND);
    imageops::overlay(&mut canvas, left, 0, 0);
    imageops::overlay(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// Pair each current image with an upcoming one; the last upcoming image repeats when
/// there are fewer of them.
pub fn pair(current: &[RgbaImage], upcoming: &[RgbaImage]) -> Vec<RgbaImage> {
    if upcoming.is_empty() {
        return current.to_vec();
    }
    let n = current.len().max(upcoming.len());
    (0..n)
        .map(|i| {
            let l = &current[i.min(current.len() - 1)];
            let r = &upcoming[i.min(upcoming.len() - 1)];
            hstack(l, r)
        })
        .collect()
}

/// Bring every frame to one canvas whose sides are multiples of 16, centering narrower art.
pub fn normalize(frames: &[RgbaImage], target_height: u32) -> Vec<RgbaImage> {
    let height = align_down_16(target_height);
    let scaled: Vec<RgbaImage> = frames.iter().map(|f| fit_height(f, height)).collect();
    let width = align_up_16(scaled.iter().map(|f| f.width()).max().unwrap_or(16));
    scaled
        .into_iter()
        .map(|f| {
            let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
            let x = (width - f.width()) / 2;
            imageops::overlay(&mut canvas, &f, x as i64, 0);
            canvas
        })
        .collect()
}

/// Shrink normalized frames by half, staying 16-aligned.
pub fn half_size(frames: &[RgbaImage]) -> Vec<RgbaImage> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let height = align_down_16(first.height() / 2);
    let width = align_up_16(first.width() / 2);
    frames
        .iter()
        .map(|f| imageops::resize(f, width, height, FilterType::Triangle))
        .collect()
}

/// Looping GIF, `frame_ms` per frame.
pub fn encode_gif(frames: &[RgbaImage], frame_ms: u32) -> Result<Vec<u8>, ComposeError> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, 10);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames.iter().map(|f| {
            Frame::from_parts(f.clone(), 0, 0, Delay::from_numer_denom_ms(frame_ms, 1))
        }))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::solid_png;
    use image::AnimationDecoder;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down_16(300), 288);
        assert_eq!(align_down_16(5), 16);
        assert_eq!(align_up_16(225), 240);
        assert_eq!(align_up_16(240), 240);
    }

    #[test]
    fn normalize_produces_common_aligned_canvas() {
        let frames = vec![
            RgbaImage::from_pixel(400, 600, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(1280, 720, Rgba([0, 255, 0, 255])),
        ];
        let out = normalize(&frames, 300);
        assert_eq!(out.len(), 2);
        for f in &out {
            assert_eq!(f.height(), 288);
            assert_eq!(f.width() % 16, 0);
            assert_eq!(f.dimensions(), out[0].dimensions());
        }
        // 1280x720 scaled to 288 high is 512 wide.
        assert_eq!(out[0].width(), 512);
    }

    #[test]
    fn pairing_repeats_last_upcoming() {
        let cur = vec![
            RgbaImage::new(10, 20),
            RgbaImage::new(10, 20),
            RgbaImage::new(10, 20),
        ];
        let next = vec![RgbaImage::new(30, 20)];
        let out = pair(&cur, &next);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|f| f.width() == 40));
        assert_eq!(pair(&cur, &[]).len(), 3);
    }

    #[test]
    fn gif_loops_with_requested_delay() {
        let frames = normalize(
            &[
                RgbaImage::from_pixel(32, 32, Rgba([1, 2, 3, 255])),
                RgbaImage::from_pixel(32, 32, Rgba([200, 2, 3, 255])),
            ],
            32,
        );
        let gif = encode_gif(&frames, 2000).unwrap();
        assert!(gif.starts_with(b"GIF89a"));

        let decoder = image::codecs::gif::GifDecoder::new(std::io::Cursor::new(gif)).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 2);
        let (num, den) = decoded[0].delay().numer_denom_ms();
        assert_eq!(num / den, 2000);
    }

    #[test]
    fn broken_blobs_are_skipped() {
        let blobs = vec![
            ("https://ok".to_string(), solid_png(8, 8, [9, 9, 9])),
            ("https://bad".to_string(), bytes::Bytes::from_static(b"<html>")),
        ];
        assert_eq!(decode_all("test", &blobs).len(), 1);
    }
}
