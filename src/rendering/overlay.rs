use super::{Alignment, Location, Mask, RenderingError, TextRenderer};
use crate::config::OverlayConfig;
use crate::grid::PixelGrid;
use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::debug;

/// How and where overlay text is burnt into an image.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOptions {
	pub location: Location,
	pub scale: f32,
	pub offset: f32,
	pub align: Alignment,
	pub value: f32,
	pub bg_value: f32,
	pub remove_background: bool,
	pub threshold: u8,
}

impl Default for OverlayOptions {
	fn default() -> Self {
		Self {
			location: Location::TopLeft,
			scale: 0.75,
			offset: 0.05,
			align: Alignment::Left,
			value: 4095.0,
			bg_value: 0.0,
			remove_background: false,
			threshold: 100,
		}
	}
}

impl From<&OverlayConfig> for OverlayOptions {
	fn from(config: &OverlayConfig) -> Self {
		Self {
			location: config.location,
			scale: config.scale,
			offset: config.offset,
			align: config.align,
			value: config.value,
			bg_value: config.bg_value,
			remove_background: config.remove_background,
			threshold: config.threshold,
		}
	}
}

impl OverlayOptions {
	pub fn validate(&self) -> Result<(), RenderingError> {
		if !(self.scale > 0.0 && self.scale <= 1.0) {
			return Err(RenderingError::InvalidScale(self.scale));
		}
		if !(0.0..1.0).contains(&self.offset) {
			return Err(RenderingError::InvalidOffset(self.offset));
		}
		Ok(())
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn fraction_of(length: usize, fraction: f32) -> usize {
	(length as f64 * f64::from(fraction)).floor() as usize
}

/// Rasterizes `text` and burns it into `grid`.
///
/// Pixels outside the pasted rectangle are never modified. Blank text leaves the grid unchanged.
pub fn paste_text(
	renderer: &TextRenderer,
	text: &str,
	grid: &mut PixelGrid,
	options: &OverlayOptions,
) -> Result<(), RenderingError> {
	options.validate()?;
	let Some(rendered) = renderer.render(text) else {
		debug!("Overlay text is blank, leaving image unchanged");
		return Ok(());
	};
	paste_rendered(&rendered, grid, options);
	Ok(())
}

/// Scales `rendered` to fit inside `scale` of the grid, keeping its aspect ratio, and pastes it
/// into the configured corner.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn paste_rendered(rendered: &GrayImage, grid: &mut PixelGrid, options: &OverlayOptions) {
	let (rows, columns) = grid.shape();
	let box_rows = fraction_of(rows, options.scale);
	let box_columns = fraction_of(columns, options.scale);
	if box_rows == 0 || box_columns == 0 {
		debug!(rows, columns, "Image too small for overlay");
		return;
	}

	let (width, height) = (rendered.width() as usize, rendered.height() as usize);
	let factor = (box_rows as f64 / height as f64).min(box_columns as f64 / width as f64);
	let target_rows = ((height as f64 * factor).floor() as usize).clamp(1, box_rows);
	let target_columns = ((width as f64 * factor).floor() as usize).clamp(1, box_columns);

	let resized = imageops::resize(
		rendered,
		target_columns as u32,
		target_rows as u32,
		FilterType::Triangle,
	);
	let mask = Mask::from_image(&resized, options.threshold);

	let margin_rows = fraction_of(rows, options.offset);
	let margin_columns = fraction_of(columns, options.offset);
	let top = match options.location {
		Location::TopLeft | Location::TopRight => margin_rows,
		Location::BottomLeft | Location::BottomRight => {
			rows.saturating_sub(margin_rows + target_rows)
		}
	};
	let left = match options.location {
		Location::TopLeft | Location::BottomLeft => margin_columns,
		Location::TopRight | Location::BottomRight => {
			columns.saturating_sub(margin_columns + target_columns)
		}
	};

	debug!(
		top,
		left,
		rows = target_rows,
		columns = target_columns,
		pixels = mask.count(),
		"Pasting overlay"
	);
	paste_mask(grid, &mask, top, left, options);
}

fn paste_mask(grid: &mut PixelGrid, mask: &Mask, top: usize, left: usize, options: &OverlayOptions) {
	for row in 0..mask.rows() {
		for column in 0..mask.columns() {
			if mask.is_set(row, column) {
				grid.set(top + row, left + column, options.value);
			} else if options.remove_background {
				grid.set(top + row, left + column, options.bg_value);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rendering::Font;
	use image::Luma;

	fn solid(width: u32, height: u32) -> GrayImage {
		GrayImage::from_pixel(width, height, Luma([255]))
	}

	fn set_cells(grid: &PixelGrid, value: f32) -> Vec<(usize, usize)> {
		let mut cells = Vec::new();
		for row in 0..grid.rows() {
			for column in 0..grid.columns() {
				if grid.get(row, column) == Some(value) {
					cells.push((row, column));
				}
			}
		}
		cells
	}

	#[test]
	fn solid_text_fills_scaled_box_in_top_left() {
		let mut grid = PixelGrid::filled(100, 100, 0.0);
		let options = OverlayOptions {
			scale: 0.5,
			offset: 0.1,
			..OverlayOptions::default()
		};
		paste_rendered(&solid(10, 10), &mut grid, &options);

		let cells = set_cells(&grid, 4095.0);
		assert_eq!(cells.len(), 50 * 50);
		assert_eq!(cells.first(), Some(&(10, 10)));
		assert_eq!(cells.last(), Some(&(59, 59)));
	}

	#[test]
	fn aspect_ratio_is_preserved() {
		let mut grid = PixelGrid::filled(100, 100, 0.0);
		let options = OverlayOptions {
			scale: 0.5,
			offset: 0.0,
			..OverlayOptions::default()
		};
		paste_rendered(&solid(20, 10), &mut grid, &options);

		let cells = set_cells(&grid, 4095.0);
		assert_eq!(cells.len(), 25 * 50);
		assert_eq!(cells.last(), Some(&(24, 49)));
	}

	#[test]
	fn bottom_right_respects_margin() {
		let mut grid = PixelGrid::filled(20, 20, 0.0);
		let options = OverlayOptions {
			location: Location::BottomRight,
			scale: 0.5,
			offset: 0.1,
			..OverlayOptions::default()
		};
		paste_rendered(&solid(4, 4), &mut grid, &options);

		let cells = set_cells(&grid, 4095.0);
		assert_eq!(cells.first(), Some(&(8, 8)));
		assert_eq!(cells.last(), Some(&(17, 17)));
	}

	#[test]
	fn background_is_kept_unless_removed() {
		let mut image = GrayImage::new(2, 1);
		image.put_pixel(0, 0, Luma([255]));

		let mut kept = PixelGrid::filled(4, 4, 7.0);
		let options = OverlayOptions {
			scale: 0.5,
			offset: 0.0,
			..OverlayOptions::default()
		};
		paste_rendered(&image, &mut kept, &options);
		assert_eq!(kept.get(0, 0), Some(4095.0));
		assert_eq!(kept.get(0, 1), Some(7.0));

		let mut removed = PixelGrid::filled(4, 4, 7.0);
		let options = OverlayOptions {
			remove_background: true,
			bg_value: 1.0,
			..options
		};
		paste_rendered(&image, &mut removed, &options);
		assert_eq!(removed.get(0, 0), Some(4095.0));
		assert_eq!(removed.get(0, 1), Some(1.0));
		assert_eq!(removed.get(1, 0), Some(7.0));
	}

	#[test]
	fn invalid_scale_is_rejected() {
		let renderer = TextRenderer::new(Font::Builtin, 8.0, Alignment::Left);
		let mut grid = PixelGrid::filled(4, 4, 0.0);
		for scale in [0.0, -0.5, 1.5] {
			let options = OverlayOptions {
				scale,
				..OverlayOptions::default()
			};
			assert!(matches!(
				paste_text(&renderer, "A", &mut grid, &options),
				Err(RenderingError::InvalidScale(_))
			));
		}
	}

	#[test]
	fn text_lands_in_top_left_of_small_image() {
		let renderer = TextRenderer::new(Font::Builtin, 40.0, Alignment::Left);
		let mut grid = PixelGrid::filled(4, 4, 0.0);
		paste_text(&renderer, "HI", &mut grid, &OverlayOptions::default()).unwrap();

		let cells = set_cells(&grid, 4095.0);
		assert!(!cells.is_empty());
		assert!(cells.iter().all(|&(row, column)| row < 3 && column < 3));
		assert!(grid.samples().iter().all(|&v| v == 0.0 || v == 4095.0));
	}
}
