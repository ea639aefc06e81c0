//! Pasting a logo or icon into the top-left corner of an image.

use super::RenderingError;
use crate::grid::PixelGrid;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use std::path::Path;

/// A single-channel icon with floating point samples.
pub type IconImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Reads the red channel of an image file, normalised to `[0, 1]`.
pub fn read_icon(path: &Path) -> Result<IconImage, RenderingError> {
	if !path.exists() {
		return Err(RenderingError::IconNotFound {
			path: path.to_owned(),
		});
	}
	let rgba = image::open(path)?.to_rgba8();
	Ok(ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
		Luma([f32::from(rgba.get_pixel(x, y).0[0]) / 255.0])
	}))
}

/// Resizes `icon` to `scale` times the size of `grid`, multiplies it by `intensity` and
/// overwrites the top-left corner with it.
///
/// The icon must hold samples in `[0, 1]`, resizing clamps to that range.
///
/// # Errors
/// Returns [`RenderingError::InvalidScale`] unless `0 < scale <= 1`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn paste_icon(
	icon: &IconImage,
	grid: &mut PixelGrid,
	scale: f32,
	intensity: f32,
) -> Result<(), RenderingError> {
	if !(scale > 0.0 && scale <= 1.0) {
		return Err(RenderingError::InvalidScale(scale));
	}

	let rows = (grid.rows() as f64 * f64::from(scale)) as u32;
	let columns = (grid.columns() as f64 * f64::from(scale)) as u32;
	if rows == 0 || columns == 0 {
		return Ok(());
	}

	let scaled = imageops::resize(icon, columns, rows, FilterType::Triangle);
	for (x, y, pixel) in scaled.enumerate_pixels() {
		grid.set(y as usize, x as usize, pixel.0[0] * intensity);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scale_outside_unit_interval_is_rejected() {
		let icon = IconImage::from_pixel(4, 4, Luma([1.0]));
		let mut grid = PixelGrid::filled(10, 10, 0.0);
		for scale in [0.0, -1.0, 1.01] {
			assert!(matches!(
				paste_icon(&icon, &mut grid, scale, 1.0),
				Err(RenderingError::InvalidScale(_))
			));
		}
		assert!(paste_icon(&icon, &mut grid, 1.0, 1.0).is_ok());
	}

	#[test]
	fn half_scale_covers_quarter_of_image() {
		let icon = IconImage::from_pixel(20, 20, Luma([0.5]));
		let mut grid = PixelGrid::filled(100, 100, 0.0);
		paste_icon(&icon, &mut grid, 0.5, 14.0).unwrap();

		for row in 0..100 {
			for column in 0..100 {
				let value = grid.get(row, column).unwrap();
				if row < 50 && column < 50 {
					assert!((value - 7.0).abs() < 1e-4, "({row}, {column}) = {value}");
				} else {
					assert!(value.abs() < f32::EPSILON, "({row}, {column}) = {value}");
				}
			}
		}
	}

	#[test]
	fn intensity_is_applied_after_resizing() {
		let icon = IconImage::from_pixel(10, 10, Luma([1.0]));
		let mut grid = PixelGrid::filled(100, 100, 0.0);
		paste_icon(&icon, &mut grid, 0.5, 4095.0).unwrap();

		let value = grid.get(0, 0).unwrap();
		assert!((value - 4095.0).abs() < 0.5, "(0, 0) = {value}");
		assert_eq!(grid.get(50, 50), Some(0.0));
	}

	#[test]
	fn missing_icon_is_reported() {
		let result = read_icon(Path::new("/nonexistent/icon.png"));
		assert!(matches!(result, Err(RenderingError::IconNotFound { .. })));
	}

	#[test]
	fn icon_red_channel_is_normalised() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("icon.png");
		image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]))
			.save(&path)
			.unwrap();

		let icon = read_icon(&path).unwrap();
		assert_eq!(icon.dimensions(), (3, 2));
		assert!(icon.pixels().all(|p| (p.0[0] - 1.0).abs() < 1e-6));
	}
}
