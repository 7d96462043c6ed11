//! Image sequence writing and renumbering.
//!
//! During capture each frame is written immediately, named by its absolute
//! tick. Finalize renames the on-disk files into a zero-based contiguous
//! sequence matching window-relative offsets.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{SessionError, SessionResult, SimTick};
use image::{ImageBuffer, Luma};
use tracing::debug;

/// Path of a frame written during capture, named by absolute tick
pub fn tick_image_path(sensor_dir: &Path, tick: SimTick) -> PathBuf {
    sensor_dir.join(format!("{tick}.png"))
}

/// Path of a finalized frame, named by window-relative offset
pub fn sequence_image_path(sensor_dir: &Path, offset: u64) -> PathBuf {
    sensor_dir.join(format!("{offset:04}.png"))
}

/// Write one disparity frame as 16-bit grayscale PNG
pub fn write_disparity_png(
    path: &Path,
    width: u32,
    height: u32,
    disparity: &[u16],
) -> SessionResult<()> {
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width, height, disparity.to_vec()).ok_or_else(|| {
            SessionError::storage(
                path.display().to_string(),
                format!(
                    "disparity buffer has {} samples, expected {}",
                    disparity.len(),
                    width as usize * height as usize
                ),
            )
        })?;
    buffer
        .save(path)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))
}

/// Rename per-tick files into the zero-based sequence `0000.png..`.
///
/// The mapping is bijective: tick `start_frame + i` becomes file `i`.
/// A missing source file is a storage error; validation runs first, so by
/// the time this executes every in-window tick must be on disk.
pub fn renumber_images(sensor_dir: &Path, start_frame: SimTick, len: u64) -> SessionResult<()> {
    for offset in 0..len {
        let from = tick_image_path(sensor_dir, start_frame + offset);
        let to = sequence_image_path(sensor_dir, offset);
        fs::rename(&from, &to).map_err(|e| {
            SessionError::storage(
                from.display().to_string(),
                format!("rename to {} failed: {e}", to.display()),
            )
        })?;
    }
    debug!(dir = %sensor_dir.display(), len, "image sequence renumbered");
    Ok(())
}
