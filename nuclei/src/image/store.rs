//! Pixel-format-preserving persistence for image arrays.
//!
//! The [`ImageStore`] trait is the seam between the pipeline and the file
//! system. [`TiffStore`] is the bundled implementation: grayscale multi-page
//! TIFF with 8, 16 or 32 bit unsigned samples. Axis order, aspect and
//! physical-unit metadata travel in a JSON `ImageDescription` on the first
//! page.

use ndarray::{ArrayD, ArrayViewD, Axis as NdAxis, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Lzw, Uncompressed};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use super::axes::AxesOrder;
use super::ImageError;

/// Unsigned sample width of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SampleDepth {
    U8,
    U16,
    U32,
}

impl SampleDepth {
    /// Smallest depth able to hold `max`.
    pub fn for_max(max: u64) -> Self {
        if max <= u8::MAX as u64 {
            SampleDepth::U8
        } else if max <= u16::MAX as u64 {
            SampleDepth::U16
        } else {
            SampleDepth::U32
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            SampleDepth::U8 => 8,
            SampleDepth::U16 => 16,
            SampleDepth::U32 => 32,
        }
    }

    pub fn max_value(self) -> u64 {
        match self {
            SampleDepth::U8 => u8::MAX as u64,
            SampleDepth::U16 => u16::MAX as u64,
            SampleDepth::U32 => u32::MAX as u64,
        }
    }
}

impl fmt::Display for SampleDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uint{}", self.bits())
    }
}

/// Samples as they exist on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPixels {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
}

impl StoredPixels {
    pub fn shape(&self) -> &[usize] {
        match self {
            StoredPixels::U8(a) => a.shape(),
            StoredPixels::U16(a) => a.shape(),
            StoredPixels::U32(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn depth(&self) -> SampleDepth {
        match self {
            StoredPixels::U8(_) => SampleDepth::U8,
            StoredPixels::U16(_) => SampleDepth::U16,
            StoredPixels::U32(_) => SampleDepth::U32,
        }
    }

    pub fn to_u32(&self) -> ArrayD<u32> {
        match self {
            StoredPixels::U8(a) => a.mapv(u32::from),
            StoredPixels::U16(a) => a.mapv(u32::from),
            StoredPixels::U32(a) => a.clone(),
        }
    }

    /// Narrow `pixels` to `depth`, failing if any sample does not fit.
    pub fn from_u32(pixels: &ArrayViewD<u32>, depth: SampleDepth) -> Result<Self, ImageError> {
        let max = pixels.iter().copied().max().unwrap_or(0) as u64;
        if max > depth.max_value() {
            return Err(ImageError::SampleOverflow { max, depth });
        }
        Ok(match depth {
            SampleDepth::U8 => StoredPixels::U8(pixels.mapv(|v| v as u8)),
            SampleDepth::U16 => StoredPixels::U16(pixels.mapv(|v| v as u16)),
            SampleDepth::U32 => StoredPixels::U32(pixels.to_owned()),
        })
    }

    /// Pick the narrowest depth that holds every sample.
    pub fn inferred(pixels: &ArrayViewD<u32>) -> Self {
        let max = pixels.iter().copied().max().unwrap_or(0) as u64;
        match SampleDepth::for_max(max) {
            SampleDepth::U8 => StoredPixels::U8(pixels.mapv(|v| v as u8)),
            SampleDepth::U16 => StoredPixels::U16(pixels.mapv(|v| v as u16)),
            SampleDepth::U32 => StoredPixels::U32(pixels.to_owned()),
        }
    }

    /// Keep only index 0 of the outermost axis.
    pub(crate) fn first_of_leading(self) -> Self {
        match self {
            StoredPixels::U8(a) => StoredPixels::U8(a.index_axis_move(NdAxis(0), 0)),
            StoredPixels::U16(a) => StoredPixels::U16(a.index_axis_move(NdAxis(0), 0)),
            StoredPixels::U32(a) => StoredPixels::U32(a.index_axis_move(NdAxis(0), 0)),
        }
    }
}

/// An image as exchanged with an [`ImageStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub pixels: StoredPixels,
    pub axes: Option<AxesOrder>,
    pub aspect: Option<Vec<f64>>,
    pub unit: Option<String>,
    pub spacing: Option<f64>,
}

impl StoredImage {
    pub fn new(pixels: StoredPixels) -> Self {
        Self {
            pixels,
            axes: None,
            aspect: None,
            unit: None,
            spacing: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    Deflate,
    Lzw,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Force a sample depth instead of inferring it from the maximum.
    pub depth: Option<SampleDepth>,
    pub compression: Compression,
    /// Physical unit of the aspect values, e.g. `"um"`.
    pub unit: Option<String>,
    /// Physical distance between depth slices.
    pub spacing: Option<f64>,
}

/// Loads and saves sample arrays with their axis metadata.
pub trait ImageStore: Send + Sync + fmt::Debug {
    fn load(&self, path: &Path) -> Result<StoredImage, ImageError>;

    fn save(&self, path: &Path, image: &StoredImage, options: &SaveOptions)
        -> Result<(), ImageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TiffDescription {
    shape: Vec<usize>,
    axes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aspect: Option<Vec<f64>>,
}

/// Grayscale multi-page TIFF backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffStore;

impl TiffStore {
    pub fn new() -> Self {
        Self
    }
}

fn tiff_error(path: &Path) -> impl FnOnce(tiff::TiffError) -> ImageError + '_ {
    move |source| ImageError::Tiff {
        path: path.to_path_buf(),
        source,
    }
}

enum PageBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl PageBuffer {
    fn len(&self) -> usize {
        match self {
            PageBuffer::U8(v) => v.len(),
            PageBuffer::U16(v) => v.len(),
            PageBuffer::U32(v) => v.len(),
        }
    }

    fn depth_name(&self) -> &'static str {
        match self {
            PageBuffer::U8(_) => "uint8",
            PageBuffer::U16(_) => "uint16",
            PageBuffer::U32(_) => "uint32",
        }
    }

    fn append(&mut self, page: DecodingResult, path: &Path) -> Result<(), ImageError> {
        match (self, page) {
            (PageBuffer::U8(buf), DecodingResult::U8(page)) => buf.extend(page),
            (PageBuffer::U16(buf), DecodingResult::U16(page)) => buf.extend(page),
            (PageBuffer::U32(buf), DecodingResult::U32(page)) => buf.extend(page),
            (buf, _) => {
                return Err(ImageError::InconsistentPages {
                    path: path.to_path_buf(),
                    reason: format!(
                        "page sample format differs from first page ({})",
                        buf.depth_name()
                    ),
                })
            }
        }
        Ok(())
    }

    fn into_pixels(self, shape: &[usize], path: &Path) -> Result<StoredPixels, ImageError> {
        let shape_error = |e: ndarray::ShapeError| ImageError::InconsistentPages {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        Ok(match self {
            PageBuffer::U8(v) => {
                StoredPixels::U8(ArrayD::from_shape_vec(IxDyn(shape), v).map_err(shape_error)?)
            }
            PageBuffer::U16(v) => {
                StoredPixels::U16(ArrayD::from_shape_vec(IxDyn(shape), v).map_err(shape_error)?)
            }
            PageBuffer::U32(v) => {
                StoredPixels::U32(ArrayD::from_shape_vec(IxDyn(shape), v).map_err(shape_error)?)
            }
        })
    }
}

impl ImageStore for TiffStore {
    fn load(&self, path: &Path) -> Result<StoredImage, ImageError> {
        let file = File::open(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_error(path))?
            .with_limits(Limits::unlimited());

        let description = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .ok()
            .and_then(|text| serde_json::from_str::<TiffDescription>(&text).ok());

        let (width, height) = decoder.dimensions().map_err(tiff_error(path))?;
        let mut pages = 0usize;
        let mut buffer: Option<PageBuffer> = None;
        loop {
            let dims = decoder.dimensions().map_err(tiff_error(path))?;
            if dims != (width, height) {
                return Err(ImageError::InconsistentPages {
                    path: path.to_path_buf(),
                    reason: format!(
                        "page {pages} is {}x{}, first page is {width}x{height}",
                        dims.0, dims.1
                    ),
                });
            }

            let page = decoder.read_image().map_err(tiff_error(path))?;
            match buffer.as_mut() {
                Some(buf) => buf.append(page, path)?,
                None => {
                    buffer = Some(match page {
                        DecodingResult::U8(v) => PageBuffer::U8(v),
                        DecodingResult::U16(v) => PageBuffer::U16(v),
                        DecodingResult::U32(v) => PageBuffer::U32(v),
                        other => {
                            return Err(ImageError::UnsupportedSampleFormat {
                                path: path.to_path_buf(),
                                format: decoder_format(&other).to_string(),
                            })
                        }
                    })
                }
            }
            pages += 1;

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_error(path))?;
        }

        let buffer = buffer.ok_or_else(|| ImageError::InconsistentPages {
            path: path.to_path_buf(),
            reason: "no image data".to_string(),
        })?;

        let page_shape = if pages == 1 {
            vec![height as usize, width as usize]
        } else {
            vec![pages, height as usize, width as usize]
        };

        // Restore the recorded shape only when it agrees with the page data.
        let restored = description.filter(|d| {
            d.shape.iter().product::<usize>() == buffer.len()
                && d.shape.len() == d.axes.len()
                && d.shape.len() >= 2
                && d.shape[d.shape.len() - 2..] == [height as usize, width as usize]
        });

        match restored {
            Some(description) => {
                let pixels = buffer.into_pixels(&description.shape, path)?;
                let axes = AxesOrder::parse(&description.axes).ok();
                let aspect = description
                    .aspect
                    .filter(|a| a.len() == description.shape.len());
                Ok(StoredImage {
                    pixels,
                    axes,
                    aspect,
                    unit: description.unit,
                    spacing: description.spacing,
                })
            }
            None => Ok(StoredImage::new(buffer.into_pixels(&page_shape, path)?)),
        }
    }

    fn save(
        &self,
        path: &Path,
        image: &StoredImage,
        options: &SaveOptions,
    ) -> Result<(), ImageError> {
        let shape = image.pixels.shape().to_vec();
        if shape.len() < 2 {
            return Err(ImageError::UnsupportedRank { rank: shape.len() });
        }
        if shape.contains(&0) {
            return Err(ImageError::EmptyImage { shape });
        }
        if let Some(axes) = &image.axes {
            if axes.len() != shape.len() {
                return Err(ImageError::RankMismatch {
                    expected: shape.len(),
                    found: axes.len(),
                });
            }
        }

        let pixels = match options.depth {
            Some(depth) if depth != image.pixels.depth() => {
                StoredPixels::from_u32(&image.pixels.to_u32().view(), depth)?
            }
            _ => image.pixels.clone(),
        };

        let axes = match &image.axes {
            Some(axes) => axes.clone(),
            None => AxesOrder::canonical(shape.len())?,
        };
        let description = TiffDescription {
            shape: shape.clone(),
            axes: axes.to_string(),
            unit: options.unit.clone().or_else(|| image.unit.clone()),
            spacing: options.spacing.or(image.spacing),
            aspect: image.aspect.clone(),
        };
        let description = serde_json::to_string(&description)?;

        let layout = PageLayout {
            width: shape[shape.len() - 1],
            height: shape[shape.len() - 2],
            pages: shape[..shape.len() - 2].iter().product(),
        };

        let file = File::create(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_error(path))?;

        let result = match &pixels {
            StoredPixels::U8(a) => write_typed::<colortype::Gray8>(
                &mut encoder,
                &a.iter().copied().collect::<Vec<_>>(),
                layout,
                &description,
                options.compression,
            ),
            StoredPixels::U16(a) => write_typed::<colortype::Gray16>(
                &mut encoder,
                &a.iter().copied().collect::<Vec<_>>(),
                layout,
                &description,
                options.compression,
            ),
            StoredPixels::U32(a) => write_typed::<colortype::Gray32>(
                &mut encoder,
                &a.iter().copied().collect::<Vec<_>>(),
                layout,
                &description,
                options.compression,
            ),
        };
        result.map_err(tiff_error(path))
    }
}

fn decoder_format(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "uint8",
        DecodingResult::U16(_) => "uint16",
        DecodingResult::U32(_) => "uint32",
        DecodingResult::U64(_) => "uint64",
        DecodingResult::I8(_) => "int8",
        DecodingResult::I16(_) => "int16",
        DecodingResult::I32(_) => "int32",
        DecodingResult::I64(_) => "int64",
        DecodingResult::F32(_) => "float32",
        DecodingResult::F64(_) => "float64",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, Copy)]
struct PageLayout {
    width: usize,
    height: usize,
    pages: usize,
}

fn write_typed<C>(
    encoder: &mut TiffEncoder<BufWriter<File>>,
    data: &[C::Inner],
    layout: PageLayout,
    description: &str,
    compression: Compression,
) -> tiff::TiffResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    match compression {
        Compression::None => write_pages::<C, _>(encoder, data, layout, description, Uncompressed),
        Compression::Deflate => {
            write_pages::<C, _>(encoder, data, layout, description, Deflate::default())
        }
        Compression::Lzw => write_pages::<C, _>(encoder, data, layout, description, Lzw),
    }
}

fn write_pages<C, D>(
    encoder: &mut TiffEncoder<BufWriter<File>>,
    data: &[C::Inner],
    layout: PageLayout,
    description: &str,
    compression: D,
) -> tiff::TiffResult<()>
where
    C: ColorType,
    D: TiffCompression + Clone,
    [C::Inner]: TiffValue,
{
    let page_len = layout.width * layout.height;
    for (index, page) in data.chunks(page_len).take(layout.pages).enumerate() {
        let mut image = encoder.new_image_with_compression::<C, D>(
            layout.width as u32,
            layout.height as u32,
            compression.clone(),
        )?;
        if index == 0 {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description)?;
        }
        image.write_data(page)?;
    }
    Ok(())
}
