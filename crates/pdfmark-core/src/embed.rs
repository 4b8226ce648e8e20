//! Image payload handling for signature fields
//!
//! Signature values travel as `data:` URLs. The MIME prefix is not trusted:
//! the format is sniffed from the decoded bytes.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GenericImageView;

use crate::error::ImageDecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Identify PNG or JPEG from the leading bytes
pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Decode the base64 payload of a `data:` URL (or a bare base64 string)
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, ImageDecodeError> {
    let payload = match value.split_once(',') {
        Some((_, payload)) => payload,
        None => value,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| ImageDecodeError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    Ok(bytes)
}

pub fn to_data_url(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime(), STANDARD.encode(bytes))
}

/// Color space of an embedded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
}

impl ColorSpace {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRgb => "DeviceRGB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFilter {
    /// JPEG bytes embedded as-is
    Dct,
    /// zlib-compressed raw samples
    Flate,
}

impl StreamFilter {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            StreamFilter::Dct => "DCTDecode",
            StreamFilter::Flate => "FlateDecode",
        }
    }
}

/// Image ready to become a PDF image XObject
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub filter: StreamFilter,
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit alpha channel, if the source had one
    pub soft_mask: Option<Vec<u8>>,
}

/// Sniff, validate and convert raw image bytes for embedding
pub fn prepare(bytes: &[u8]) -> Result<PreparedImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    match sniff(bytes) {
        Some(ImageFormat::Png) => prepare_png(bytes),
        Some(ImageFormat::Jpeg) => prepare_jpeg(bytes),
        None => Err(ImageDecodeError::UnsupportedFormat),
    }
}

fn prepare_png(bytes: &[u8]) -> Result<PreparedImage, ImageDecodeError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .map_err(|e| ImageDecodeError::Png(e.to_string()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| ImageDecodeError::Png(e.to_string()))?;
    let samples = &buf[..frame.buffer_size()];

    let (color_space, channels, has_alpha) = match frame.color_type {
        png::ColorType::Grayscale => (ColorSpace::DeviceGray, 1, false),
        png::ColorType::GrayscaleAlpha => (ColorSpace::DeviceGray, 2, true),
        png::ColorType::Rgb => (ColorSpace::DeviceRgb, 3, false),
        png::ColorType::Rgba => (ColorSpace::DeviceRgb, 4, true),
        png::ColorType::Indexed => {
            return Err(ImageDecodeError::Png(
                "indexed colour survived palette expansion".to_string(),
            ))
        }
    };

    let color_channels = if has_alpha { channels - 1 } else { channels };
    let pixel_count = frame.width as usize * frame.height as usize;
    let mut color = Vec::with_capacity(pixel_count * color_channels);
    let mut alpha = Vec::with_capacity(if has_alpha { pixel_count } else { 0 });

    for pixel in samples.chunks_exact(channels) {
        color.extend_from_slice(&pixel[..color_channels]);
        if has_alpha {
            alpha.push(pixel[color_channels]);
        }
    }

    let soft_mask = if has_alpha && alpha.iter().any(|&a| a != u8::MAX) {
        Some(deflate(&alpha).map_err(|e| ImageDecodeError::Png(e.to_string()))?)
    } else {
        None
    };

    Ok(PreparedImage {
        width: frame.width,
        height: frame.height,
        color_space,
        filter: StreamFilter::Flate,
        data: deflate(&color).map_err(|e| ImageDecodeError::Png(e.to_string()))?,
        soft_mask,
    })
}

/// JPEG bytes are embedded unchanged as a DCT stream once a full decode succeeds
fn prepare_jpeg(bytes: &[u8]) -> Result<PreparedImage, ImageDecodeError> {
    let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .map_err(|e| ImageDecodeError::Jpeg(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    let color_space = match decoded.color() {
        image::ColorType::L8 | image::ColorType::La8 | image::ColorType::L16 => {
            ColorSpace::DeviceGray
        }
        _ => ColorSpace::DeviceRgb,
    };
    Ok(PreparedImage {
        width,
        height,
        color_space,
        filter: StreamFilter::Dct,
        data: bytes.to_vec(),
        soft_mask: None,
    })
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate a zlib stream; used to inspect burned image streams
pub fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Size of an image scaled to fit a box while keeping its aspect ratio.
///
/// The axis that overflows the box the most is shrunk to the box; the other
/// follows the image's aspect ratio.
pub fn fit_within(
    image_width: f64,
    image_height: f64,
    box_width: f64,
    box_height: f64,
) -> (f64, f64) {
    if image_width <= 0.0 || image_height <= 0.0 {
        return (box_width, box_height);
    }
    let image_aspect = image_width / image_height;
    let box_aspect = box_width / box_height;
    if image_aspect > box_aspect {
        (box_width, box_width / image_aspect)
    } else {
        (box_height * image_aspect, box_height)
    }
}

/// Encode RGBA pixels as PNG bytes
pub fn encode_png_rgba(
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
        writer.finish()?;
    }
    Ok(out)
}
