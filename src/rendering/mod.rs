use image::GrayImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{instrument, trace};

mod font;
pub mod icon;
pub mod overlay;

pub use font::Font;
pub use icon::{paste_icon, read_icon, IconImage};
pub use overlay::{paste_text, OverlayOptions};

#[derive(Debug, Error)]
pub enum RenderingError {
	#[error("failed to read font {path}: {source}")]
	FontIo {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("{path} is not a valid TrueType font")]
	InvalidFont { path: PathBuf },
	#[error("scale must be in (0, 1], got {0}")]
	InvalidScale(f32),
	#[error("offset must be in [0, 1), got {0}")]
	InvalidOffset(f32),
	#[error("icon {path} does not exist")]
	IconNotFound { path: PathBuf },
	#[error(transparent)]
	Image(#[from] image::ImageError),
}

/// The corner of the image that receives the overlay.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
	#[default]
	TopLeft,
	TopRight,
	BottomLeft,
	BottomRight,
}

/// Horizontal alignment of the lines of a multi-line text.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
	#[default]
	Left,
	Center,
	Right,
}

/// Rasterizes text into 8-bit images where ink is bright and background is zero.
pub struct TextRenderer {
	font: Font,
	font_size: f32,
	align: Alignment,
}

impl TextRenderer {
	pub const fn new(font: Font, font_size: f32, align: Alignment) -> Self {
		Self {
			font,
			font_size,
			align,
		}
	}

	/// Creates a renderer using the TrueType font at `font_path`, or the built-in bitmap font.
	///
	/// # Errors
	/// Fails if the font file cannot be read or parsed.
	pub fn from_font_path(
		font_path: Option<&Path>,
		font_size: f32,
		align: Alignment,
	) -> Result<Self, RenderingError> {
		let font = match font_path {
			Some(path) => Font::from_path(path)?,
			None => Font::Builtin,
		};
		Ok(Self::new(font, font_size, align))
	}

	/// Renders `text` and crops the result to the bounding box of its ink.
	///
	/// Returns `None` if the text produces no visible pixels (e.g. empty or whitespace only).
	#[instrument(skip_all, fields(chars = text.chars().count()))]
	pub fn render(&self, text: &str) -> Option<GrayImage> {
		let lines: Vec<GrayImage> = text
			.lines()
			.map(|line| self.font.rasterize_line(line, self.font_size))
			.collect();

		let line_height = self.font.line_height(self.font_size);
		let width = lines.iter().map(GrayImage::width).max().unwrap_or(0);
		let height = line_height * u32::try_from(lines.len()).ok()?;
		if width == 0 || height == 0 {
			return None;
		}

		let mut canvas = GrayImage::new(width, height);
		for (index, line) in (0u32..).zip(&lines) {
			let x = match self.align {
				Alignment::Left => 0,
				Alignment::Center => (width - line.width()) / 2,
				Alignment::Right => width - line.width(),
			};
			image::imageops::overlay(
				&mut canvas,
				line,
				i64::from(x),
				i64::from(index * line_height),
			);
		}

		let cropped = crop_to_ink(&canvas);
		if let Some(image) = &cropped {
			trace!(
				width = image.width(),
				height = image.height(),
				"Rasterized overlay text"
			);
		}
		cropped
	}

	/// Renders `text` and thresholds it into a [`Mask`].
	pub fn render_mask(&self, text: &str, threshold: u8) -> Option<Mask> {
		self.render(text).map(|image| Mask::from_image(&image, threshold))
	}
}

/// Crops to the inclusive bounding box of all non-zero pixels.
fn crop_to_ink(image: &GrayImage) -> Option<GrayImage> {
	let mut bounds: Option<(u32, u32, u32, u32)> = None;
	for (x, y, pixel) in image.enumerate_pixels() {
		if pixel.0[0] == 0 {
			continue;
		}
		bounds = Some(match bounds {
			None => (x, y, x, y),
			Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
		});
	}

	let (x0, y0, x1, y1) = bounds?;
	Some(image::imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}

/// A binary image; `true` marks text pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
	rows: usize,
	columns: usize,
	bits: Vec<bool>,
}

impl Mask {
	/// Marks every pixel brighter than `threshold`.
	pub fn from_image(image: &GrayImage, threshold: u8) -> Self {
		Self {
			rows: image.height() as usize,
			columns: image.width() as usize,
			bits: image.pixels().map(|p| p.0[0] > threshold).collect(),
		}
	}

	pub const fn rows(&self) -> usize {
		self.rows
	}

	pub const fn columns(&self) -> usize {
		self.columns
	}

	pub fn is_set(&self, row: usize, column: usize) -> bool {
		row < self.rows && column < self.columns && self.bits[row * self.columns + column]
	}

	pub fn count(&self) -> usize {
		self.bits.iter().filter(|&&bit| bit).count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Luma;

	fn renderer() -> TextRenderer {
		TextRenderer::new(Font::Builtin, 8.0, Alignment::Left)
	}

	#[test]
	fn render_crops_to_ink() {
		// 'I' in the built-in font is 4 pixels wide and 7 pixels tall
		let image = renderer().render("I").unwrap();
		assert_eq!(image.dimensions(), (4, 7));
		assert!(image.pixels().any(|p| p.0[0] == 255));
	}

	#[test]
	fn blank_text_renders_nothing() {
		assert!(renderer().render("").is_none());
		assert!(renderer().render("   ").is_none());
	}

	#[test]
	fn multi_line_text_stacks_lines() {
		let single = renderer().render("II").unwrap();
		let double = renderer().render("II\nII").unwrap();
		assert_eq!(single.width(), double.width());
		assert!(double.height() > single.height());
	}

	#[test]
	fn font_size_scales_glyphs() {
		let small = renderer().render("I").unwrap();
		let large = TextRenderer::new(Font::Builtin, 16.0, Alignment::Left)
			.render("I")
			.unwrap();
		assert_eq!(large.width(), small.width() * 2);
		assert_eq!(large.height(), small.height() * 2);
	}

	#[test]
	fn mask_thresholds_pixels() {
		let mut image = GrayImage::new(2, 1);
		image.put_pixel(0, 0, Luma([101]));
		image.put_pixel(1, 0, Luma([100]));
		let mask = Mask::from_image(&image, 100);
		assert!(mask.is_set(0, 0));
		assert!(!mask.is_set(0, 1));
		assert_eq!(mask.count(), 1);
	}

	#[test]
	fn missing_font_file_is_reported() {
		let result =
			TextRenderer::from_font_path(Some(Path::new("/nonexistent/font.ttf")), 40.0, Alignment::Left);
		assert!(matches!(result, Err(RenderingError::FontIo { .. })));
	}
}
