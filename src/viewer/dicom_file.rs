use super::{MemoryPix, Pix, Viewer, ViewerError};
use crate::grid::PixelGrid;
use dicom::core::value::Value;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// A viewer backed by a DICOM file with native (uncompressed) pixel data.
///
/// All frames of the file form a single movie. Stored values are exposed without applying the
/// modality LUT, and [`Viewer::needs_display_update`] writes the file to the output path.
pub struct DicomFileViewer {
	object: DefaultDicomObject,
	frames: Vec<MemoryPix>,
	bits_allocated: u16,
	signed: bool,
	output: PathBuf,
}

impl DicomFileViewer {
	#[instrument(skip_all, fields(input = %input.display()))]
	pub fn open(input: &Path, output: PathBuf) -> Result<Self, ViewerError> {
		let object = open_file(input)?;

		let element = object
			.element(tags::PIXEL_DATA)
			.map_err(|_| ViewerError::MissingPixelData)?;
		if matches!(element.value(), Value::PixelSequence(_)) {
			return Err(ViewerError::EncapsulatedPixelData);
		}

		let attribute = |tag| {
			object
				.element(tag)
				.ok()
				.and_then(|element| element.to_int::<u16>().ok())
				.unwrap_or_default()
		};
		let rows = usize::from(attribute(tags::ROWS));
		let columns = usize::from(attribute(tags::COLUMNS));
		let rgb = attribute(tags::SAMPLES_PER_PIXEL) != 1;
		let bits_allocated = attribute(tags::BITS_ALLOCATED);
		let signed = attribute(tags::PIXEL_REPRESENTATION) == 1;

		let pixel_data = object.decode_pixel_data()?;

		let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
		let frames = (0..pixel_data.number_of_frames())
			.map(|frame| -> Result<MemoryPix, ViewerError> {
				if rgb {
					return Ok(MemoryPix::rgb(rows, columns));
				}
				let samples: Vec<f32> = pixel_data.to_vec_frame_with_options(frame, &options)?;
				frame_pix(rows, columns, samples)
			})
			.collect::<Result<Vec<_>, _>>()?;
		drop(pixel_data);

		info!(rows, columns, frames = frames.len(), rgb, "Opened DICOM file");

		Ok(Self {
			object,
			frames,
			bits_allocated,
			signed,
			output,
		})
	}

	fn encode_pixel_data(&self) -> Result<(VR, PrimitiveValue), ViewerError> {
		if self.frames.iter().any(Pix::is_rgb) {
			return Err(ViewerError::UnsupportedColor);
		}
		let samples = self.frames.iter().flat_map(|pix| pix.grid().samples().iter().copied());

		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let encoded = match (self.bits_allocated, self.signed) {
			(8, false) => (
				VR::OB,
				PrimitiveValue::U8(samples.map(|v| v.round().clamp(0.0, 255.0) as u8).collect()),
			),
			(16, false) => (
				VR::OW,
				PrimitiveValue::U16(
					samples
						.map(|v| v.round().clamp(0.0, f32::from(u16::MAX)) as u16)
						.collect(),
				),
			),
			(16, true) => (
				VR::OW,
				PrimitiveValue::I16(
					samples
						.map(|v| v.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
						.collect(),
				),
			),
			(bits, _) => return Err(ViewerError::UnsupportedBitsAllocated(bits)),
		};
		Ok(encoded)
	}
}

fn frame_pix(rows: usize, columns: usize, samples: Vec<f32>) -> Result<MemoryPix, ViewerError> {
	Ok(MemoryPix::new(PixelGrid::from_samples(rows, columns, samples)?))
}

impl Viewer for DicomFileViewer {
	type Pix = MemoryPix;

	fn movie_count(&self) -> usize {
		1
	}

	fn pix_list(&mut self, movie: usize) -> Result<&mut [MemoryPix], ViewerError> {
		if movie != 0 {
			return Err(ViewerError::MovieOutOfRange {
				index: movie,
				count: 1,
			});
		}
		Ok(&mut self.frames)
	}

	fn needs_display_update(&mut self) -> Result<(), ViewerError> {
		let (vr, value) = self.encode_pixel_data()?;
		self.object
			.put(DataElement::new(tags::PIXEL_DATA, vr, value));
		self.object.write_to_file(&self.output)?;
		info!(output = %self.output.display(), "Wrote DICOM file");
		Ok(())
	}
}
