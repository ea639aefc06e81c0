//! The host viewer owning the pixel data.
//!
//! A viewer exposes its images as [`Pix`] values that can be read into and written back from a
//! [`PixelGrid`]. Writes become visible once [`Viewer::needs_display_update`] is called.

use crate::grid::{GridError, PixelGrid};
use thiserror::Error;

mod dicom_file;

pub use dicom_file::DicomFileViewer;

#[derive(Debug, Error)]
pub enum ViewerError {
	#[error("colour images are not supported yet")]
	UnsupportedColor,
	#[error("cannot write a {actual_rows}x{actual_columns} image into a {rows}x{columns} image")]
	ShapeMismatch {
		rows: usize,
		columns: usize,
		actual_rows: usize,
		actual_columns: usize,
	},
	#[error("movie {index} does not exist, the viewer has {count} movies")]
	MovieOutOfRange { index: usize, count: usize },
	#[error("frame {index} does not exist, the movie has {count} frames")]
	FrameOutOfRange { index: usize, count: usize },
	#[error("decoded frame does not match the image size: {0}")]
	FrameShape(#[from] GridError),
	#[error("DICOM file has no pixel data")]
	MissingPixelData,
	#[error("encapsulated pixel data cannot be written back")]
	EncapsulatedPixelData,
	#[error("{0} bits allocated per sample are not supported")]
	UnsupportedBitsAllocated(u16),
	#[error(transparent)]
	Read(#[from] dicom::object::ReadError),
	#[error(transparent)]
	Write(#[from] dicom::object::WriteError),
	#[error(transparent)]
	PixelData(#[from] dicom_pixeldata::Error),
}

/// A single image of the viewer.
pub trait Pix {
	fn is_rgb(&self) -> bool;

	fn read_grid(&self) -> PixelGrid;

	/// Replaces the pixel data. The grid must have the shape of the image.
	fn write_grid(&mut self, grid: PixelGrid) -> Result<(), ViewerError>;
}

pub trait Viewer {
	type Pix: Pix;

	/// Number of movies (time points) of the viewer.
	fn movie_count(&self) -> usize;

	/// The images of one movie.
	fn pix_list(&mut self, movie: usize) -> Result<&mut [Self::Pix], ViewerError>;

	/// Publishes all written images.
	fn needs_display_update(&mut self) -> Result<(), ViewerError>;
}

/// An image held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPix {
	grid: PixelGrid,
	rgb: bool,
}

impl MemoryPix {
	pub const fn new(grid: PixelGrid) -> Self {
		Self { grid, rgb: false }
	}

	/// A colour image. Its samples are not accessible as a single-channel grid.
	pub fn rgb(rows: usize, columns: usize) -> Self {
		Self {
			grid: PixelGrid::filled(rows, columns, 0.0),
			rgb: true,
		}
	}

	pub const fn grid(&self) -> &PixelGrid {
		&self.grid
	}
}

impl Pix for MemoryPix {
	fn is_rgb(&self) -> bool {
		self.rgb
	}

	fn read_grid(&self) -> PixelGrid {
		self.grid.clone()
	}

	fn write_grid(&mut self, grid: PixelGrid) -> Result<(), ViewerError> {
		if grid.shape() != self.grid.shape() {
			return Err(ViewerError::ShapeMismatch {
				rows: self.grid.rows(),
				columns: self.grid.columns(),
				actual_rows: grid.rows(),
				actual_columns: grid.columns(),
			});
		}
		self.grid = grid;
		Ok(())
	}
}

/// A viewer whose movies live in memory.
#[derive(Debug, Default)]
pub struct MemoryViewer {
	movies: Vec<Vec<MemoryPix>>,
	display_updates: usize,
}

impl MemoryViewer {
	pub const fn new(movies: Vec<Vec<MemoryPix>>) -> Self {
		Self {
			movies,
			display_updates: 0,
		}
	}

	pub fn movies(&self) -> &[Vec<MemoryPix>] {
		&self.movies
	}

	pub const fn display_updates(&self) -> usize {
		self.display_updates
	}
}

impl Viewer for MemoryViewer {
	type Pix = MemoryPix;

	fn movie_count(&self) -> usize {
		self.movies.len()
	}

	fn pix_list(&mut self, movie: usize) -> Result<&mut [MemoryPix], ViewerError> {
		let count = self.movies.len();
		self.movies
			.get_mut(movie)
			.map(Vec::as_mut_slice)
			.ok_or(ViewerError::MovieOutOfRange {
				index: movie,
				count,
			})
	}

	fn needs_display_update(&mut self) -> Result<(), ViewerError> {
		self.display_updates += 1;
		Ok(())
	}
}
