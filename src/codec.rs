//! Conversion between [`PixelGrid`] and the flattened wire [`Image`].
//!
//! The wire format carries the samples in row-major order together with the row and column
//! counts that are needed to reshape them.

use crate::grid::{GridError, PixelGrid};
use crate::proto::Image;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
	#[error("negative image dimensions {rows}x{columns}")]
	NegativeDimensions { rows: i32, columns: i32 },
	#[error("image dimension {0} does not fit into the wire format")]
	DimensionOverflow(usize),
	#[error(transparent)]
	Shape(#[from] GridError),
}

/// Flattens a grid into the wire representation.
///
/// # Errors
/// Fails if a dimension exceeds `i32::MAX`.
pub fn encode(grid: PixelGrid) -> Result<Image, CodecError> {
	let rows = i32::try_from(grid.rows()).map_err(|_| CodecError::DimensionOverflow(grid.rows()))?;
	let columns =
		i32::try_from(grid.columns()).map_err(|_| CodecError::DimensionOverflow(grid.columns()))?;

	Ok(Image {
		rows,
		columns,
		image: grid.into_samples(),
	})
}

/// Reshapes a wire image into a grid.
///
/// # Errors
/// Fails if the dimensions are negative or do not match the number of samples.
pub fn decode(image: Image) -> Result<PixelGrid, CodecError> {
	let Image {
		rows,
		columns,
		image,
	} = image;

	let (Ok(r), Ok(c)) = (usize::try_from(rows), usize::try_from(columns)) else {
		return Err(CodecError::NegativeDimensions { rows, columns });
	};

	Ok(PixelGrid::from_samples(r, c, image)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_grid(rows: usize, columns: usize) -> PixelGrid {
		#[allow(clippy::cast_precision_loss)]
		let samples = (0..rows * columns).map(|i| i as f32 * 1.5).collect();
		PixelGrid::from_samples(rows, columns, samples).unwrap()
	}

	#[test]
	fn decode_restores_encoded_grid() {
		for (rows, columns) in [(1, 1), (3, 7), (64, 2), (512, 512)] {
			let grid = sample_grid(rows, columns);
			let image = encode(grid.clone()).unwrap();
			assert_eq!(image.rows, i32::try_from(rows).unwrap());
			assert_eq!(image.columns, i32::try_from(columns).unwrap());
			assert_eq!(decode(image).unwrap(), grid);
		}
	}

	#[test]
	fn encode_flattens_row_major() {
		let grid = PixelGrid::from_samples(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
		assert_eq!(encode(grid).unwrap().image, vec![1.0, 2.0, 3.0, 4.0]);
	}

	#[test]
	fn decode_rejects_length_mismatch() {
		let image = Image {
			rows: 10,
			columns: 10,
			image: vec![0.0; 99],
		};
		assert_eq!(
			decode(image),
			Err(CodecError::Shape(GridError::ShapeMismatch {
				len: 99,
				rows: 10,
				columns: 10
			}))
		);
	}

	#[test]
	fn decode_rejects_negative_dimensions() {
		let image = Image {
			rows: -1,
			columns: 4,
			image: vec![],
		};
		assert!(matches!(
			decode(image),
			Err(CodecError::NegativeDimensions { .. })
		));
	}
}
