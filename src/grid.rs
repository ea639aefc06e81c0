use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
	#[error("cannot reshape {len} samples into {rows}x{columns}")]
	ShapeMismatch {
		len: usize,
		rows: usize,
		columns: usize,
	},
}

/// A single-channel 2-D image stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
	rows: usize,
	columns: usize,
	samples: Vec<f32>,
}

impl PixelGrid {
	/// Creates a grid of the given shape filled with `value`.
	pub fn filled(rows: usize, columns: usize, value: f32) -> Self {
		Self {
			rows,
			columns,
			samples: vec![value; rows * columns],
		}
	}

	/// Reshapes a flat row-major sequence into a grid.
	///
	/// # Errors
	/// Returns [`GridError::ShapeMismatch`] unless `samples.len() == rows * columns`.
	pub fn from_samples(rows: usize, columns: usize, samples: Vec<f32>) -> Result<Self, GridError> {
		let mismatch = GridError::ShapeMismatch {
			len: samples.len(),
			rows,
			columns,
		};
		match rows.checked_mul(columns) {
			Some(expected) if expected == samples.len() => Ok(Self {
				rows,
				columns,
				samples,
			}),
			_ => Err(mismatch),
		}
	}

	pub const fn rows(&self) -> usize {
		self.rows
	}

	pub const fn columns(&self) -> usize {
		self.columns
	}

	pub const fn shape(&self) -> (usize, usize) {
		(self.rows, self.columns)
	}

	pub fn samples(&self) -> &[f32] {
		&self.samples
	}

	pub fn into_samples(self) -> Vec<f32> {
		self.samples
	}

	pub fn get(&self, row: usize, column: usize) -> Option<f32> {
		if row < self.rows && column < self.columns {
			Some(self.samples[row * self.columns + column])
		} else {
			None
		}
	}

	/// Writes `value` at the given position. Positions outside the grid are ignored.
	pub fn set(&mut self, row: usize, column: usize, value: f32) {
		if row < self.rows && column < self.columns {
			self.samples[row * self.columns + column] = value;
		}
	}

	/// The largest sample, or `None` for an empty grid.
	pub fn max(&self) -> Option<f32> {
		self.samples.iter().copied().reduce(f32::max)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reshape_is_row_major() {
		let grid = PixelGrid::from_samples(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
		assert_eq!(grid.shape(), (2, 3));
		assert_eq!(grid.get(0, 2), Some(2.0));
		assert_eq!(grid.get(1, 0), Some(3.0));
		assert_eq!(grid.get(2, 0), None);
	}

	#[test]
	fn reshape_rejects_wrong_length() {
		let result = PixelGrid::from_samples(10, 10, vec![0.0; 99]);
		assert_eq!(
			result,
			Err(GridError::ShapeMismatch {
				len: 99,
				rows: 10,
				columns: 10
			})
		);
	}

	#[test]
	fn set_outside_is_ignored() {
		let mut grid = PixelGrid::filled(2, 2, 1.0);
		grid.set(5, 5, 9.0);
		grid.set(1, 1, 9.0);
		assert_eq!(grid.samples(), &[1.0, 1.0, 1.0, 9.0]);
		assert_eq!(grid.max(), Some(9.0));
	}
}
