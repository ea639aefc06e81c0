use super::RenderingError;
use ab_glyph::{point, Font as _, FontVec, PxScale, ScaleFont as _};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, Luma};
use std::path::Path;

const BITMAP_GLYPH_SIZE: u32 = 8;

pub enum Font {
	/// 8x8 bitmap glyphs scaled by an integer factor.
	Builtin,
	TrueType(FontVec),
}

impl Font {
	pub fn from_path(path: &Path) -> Result<Self, RenderingError> {
		let data = std::fs::read(path).map_err(|source| RenderingError::FontIo {
			path: path.to_owned(),
			source,
		})?;
		let font = FontVec::try_from_vec(data).map_err(|_| RenderingError::InvalidFont {
			path: path.to_owned(),
		})?;
		Ok(Self::TrueType(font))
	}

	/// Vertical distance between consecutive baselines.
	pub fn line_height(&self, size: f32) -> u32 {
		match self {
			Self::Builtin => {
				let factor = bitmap_factor(size);
				(BITMAP_GLYPH_SIZE + 2) * factor
			}
			Self::TrueType(font) => {
				let scaled = font.as_scaled(PxScale::from(size));
				px(scaled.height() + scaled.line_gap())
			}
		}
	}

	/// Rasterizes a single line of text. The image is not cropped.
	pub fn rasterize_line(&self, line: &str, size: f32) -> GrayImage {
		match self {
			Self::Builtin => rasterize_bitmap(line, bitmap_factor(size)),
			Self::TrueType(font) => rasterize_outline(font, line, size),
		}
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn px(value: f32) -> u32 {
	value.ceil().max(0.0) as u32
}

fn bitmap_factor(size: f32) -> u32 {
	px((size / 8.0).round()).max(1)
}

fn rasterize_bitmap(line: &str, factor: u32) -> GrayImage {
	let glyphs: Vec<[u8; 8]> = line
		.chars()
		.map(|c| BASIC_FONTS.get(c).or_else(|| BASIC_FONTS.get('?')).unwrap_or([0; 8]))
		.collect();

	let cell = BITMAP_GLYPH_SIZE * factor;
	let width = cell * u32::try_from(glyphs.len()).unwrap_or(0);
	let mut image = GrayImage::new(width, cell);

	for (index, glyph) in (0u32..).zip(&glyphs) {
		for (row, bits) in (0u32..).zip(glyph) {
			for bit in 0..BITMAP_GLYPH_SIZE {
				if bits & (1 << bit) == 0 {
					continue;
				}
				let x0 = index * cell + bit * factor;
				let y0 = row * factor;
				for dy in 0..factor {
					for dx in 0..factor {
						image.put_pixel(x0 + dx, y0 + dy, Luma([255]));
					}
				}
			}
		}
	}

	image
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn rasterize_outline(font: &FontVec, line: &str, size: f32) -> GrayImage {
	let scaled = font.as_scaled(PxScale::from(size));

	let mut glyphs = Vec::new();
	let mut caret = 0.0f32;
	let mut previous = None;
	for c in line.chars() {
		let id = scaled.glyph_id(c);
		if let Some(previous) = previous {
			caret += scaled.kern(previous, id);
		}
		glyphs.push(id.with_scale_and_position(size, point(caret, scaled.ascent())));
		caret += scaled.h_advance(id);
		previous = Some(id);
	}

	let mut image = GrayImage::new(px(caret), px(scaled.height()));
	for glyph in glyphs {
		let Some(outlined) = scaled.outline_glyph(glyph) else {
			continue;
		};
		let bounds = outlined.px_bounds();
		outlined.draw(|x, y, coverage| {
			let px_x = bounds.min.x as i32 + x as i32;
			let px_y = bounds.min.y as i32 + y as i32;
			if px_x < 0 || px_y < 0 {
				return;
			}
			let (px_x, px_y) = (px_x as u32, px_y as u32);
			if px_x >= image.width() || px_y >= image.height() {
				return;
			}
			let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
			let pixel = image.get_pixel_mut(px_x, px_y);
			pixel.0[0] = pixel.0[0].max(value);
		});
	}

	image
}
