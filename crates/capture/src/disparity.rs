//! Depth-to-disparity conversion.
//!
//! The simulator encodes depth across the B, G, R channels of a BGRA
//! frame: `normalized = (R + G*256 + B*256^2) / (256^3 - 1)`, with 1000m
//! at normalized = 1. Disparity is `baseline * focal / depth`, with pixels
//! at the far clip forced to zero.

use contracts::{DepthImage, SessionError, SessionResult};

/// Stereo baseline assumed for disparity (meters)
const BASELINE_M: f64 = 0.6;

/// Fixed-point scale of the stored 16-bit disparity (1/256 pixel)
pub const DISPARITY_SCALE: f64 = 256.0;

const MAX_ENCODED: f64 = (256u32 * 256 * 256 - 1) as f64;

/// Convert an encoded depth frame into 16-bit fixed-point disparity samples.
pub fn disparity_from_depth(image: &DepthImage) -> SessionResult<Vec<u16>> {
    let expected = image.width as usize * image.height as usize * 4;
    if image.data.len() != expected {
        return Err(SessionError::Other(format!(
            "depth frame has {} bytes, expected {}",
            image.data.len(),
            expected
        )));
    }

    let focal = image.width as f64 / (2.0 * (image.fov_deg.to_radians() / 2.0).tan());
    let pixels: &[[u8; 4]] = bytemuck::cast_slice(&image.data);

    let mut max_meters = 0.0f64;
    let mut meters = Vec::with_capacity(pixels.len());
    for px in pixels {
        // BGRA layout: channel 2 is R
        let encoded = px[2] as f64 + px[1] as f64 * 256.0 + px[0] as f64 * 65536.0;
        let m = 1000.0 * encoded / MAX_ENCODED;
        if m > max_meters {
            max_meters = m;
        }
        meters.push(m);
    }

    Ok(meters
        .into_iter()
        .map(|m| {
            // Far-clip pixels carry no disparity information
            if m <= 0.0 || m == max_meters {
                0
            } else {
                let disparity = BASELINE_M * focal / m;
                (disparity * DISPARITY_SCALE).round().min(u16::MAX as f64) as u16
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(width: u32, height: u32, pixels: &[[u8; 4]]) -> DepthImage {
        let mut data = Vec::new();
        for px in pixels {
            data.extend_from_slice(px);
        }
        DepthImage {
            width,
            height,
            fov_deg: 90.0,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn near_pixels_have_larger_disparity() {
        // encoded depth ~ R + G*256 + B*65536; far clip goes to zero
        let image = frame(
            2,
            2,
            &[
                [0, 0, 40, 255],   // near
                [0, 40, 0, 255],   // mid
                [40, 0, 0, 255],   // far
                [255, 255, 255, 255], // max depth -> forced 0
            ],
        );
        let disparity = disparity_from_depth(&image).unwrap();
        assert!(disparity[0] > disparity[1]);
        assert!(disparity[1] > disparity[2]);
        assert_eq!(disparity[3], 0);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut image = frame(2, 2, &[[0, 0, 1, 255]; 4]);
        image.data = image.data.slice(0..15);
        assert!(disparity_from_depth(&image).is_err());
    }

    #[test]
    fn disparity_matches_pinhole_model() {
        // One known pixel: encoded = 1000 -> meters = 1000 * 1000 / (256^3-1)
        let encoded = 1000u32;
        let px = [
            (encoded >> 16) as u8,
            ((encoded >> 8) & 0xff) as u8,
            (encoded & 0xff) as u8,
            255,
        ];
        // Add a far pixel so the known pixel isn't the max (which gets zeroed)
        let image = frame(2, 1, &[px, [255, 255, 255, 255]]);
        let disparity = disparity_from_depth(&image).unwrap();

        let meters = 1000.0 * encoded as f64 / MAX_ENCODED;
        let focal = 2.0 / (2.0 * (90.0f64.to_radians() / 2.0).tan());
        let expected = (0.6 * focal / meters * DISPARITY_SCALE).round() as u16;
        assert_eq!(disparity[0], expected);
    }
}
