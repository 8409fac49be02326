
//! Decode the channels of a layer to RGBA pixels, for every color mode.

use crate::error::{Result, Error};
use crate::file::PsdFile;
use crate::file::layer::{Layer, Channel, Mask};
use crate::math::Vec2;
use crate::meta::{BitDepth, ColorMode, Version};
use crate::parallel;
use super::{Pixel, RgbaImage};


/// Samples of one channel, converted to bytes.
#[derive(Clone, Copy, Debug)]
enum Plane<'d> {

    /// The channel is missing or has no pixels.
    Constant(u8),

    Samples { data: &'d [u8], depth: BitDepth, width: usize },
}

/// A mask channel with its position inside the layer.
#[derive(Clone, Copy, Debug)]
struct MaskPlane<'d> {
    plane: Plane<'d>,
    offset: Vec2<i32>,
    size: Vec2<usize>,
}

/// Everything needed to compute the transparency of a pixel.
#[derive(Clone, Copy, Debug)]
struct AlphaPlanes<'d> {
    alpha: Plane<'d>,
    layer_mask: Option<MaskPlane<'d>>,
    user_mask: Option<MaskPlane<'d>>,
}


/// Photoshop uses this gamma for 32-bit images.
const HDR_GAMMA: f32 = 2.199_218_75;

/// Convert a linear 32-bit sample to a byte.
#[inline]
pub fn byte_from_hdr(value: f32) -> u8 {
    (255.0 * value.powf(1.0 / HDR_GAMMA)) as u8
}

impl<'d> Plane<'d> {

    /// Returns an error if the channel has pixels, but not enough of them.
    fn new(channel: Option<&'d Channel>, size: Vec2<usize>, depth: BitDepth) -> Result<Self> {
        match channel {
            Some(channel) if !channel.data.is_empty() => {
                if channel.data.len() < depth.bytes_per_row(size.width()).saturating_mul(size.height()) {
                    return Err(Error::invalid(format!("channel {} is smaller than its rectangle", channel.id)));
                }

                Ok(Plane::Samples { data: &channel.data, depth, width: size.width() })
            },

            _ => Ok(Plane::Constant(255)),
        }
    }

    /// The sample at this position, counted from the top row.
    /// Bitmap samples are black if the bit is set.
    #[inline]
    fn sample(&self, x: usize, y: usize) -> u8 {
        match *self {
            Plane::Constant(value) => value,

            Plane::Samples { data, depth, width } => match depth {
                BitDepth::One => {
                    let byte = data[y * depth.bytes_per_row(width) + x / 8];
                    if byte & (0x80 >> (x % 8)) != 0 { 0 } else { 255 }
                },

                BitDepth::Eight => data[y * width + x],

                // the most significant byte
                BitDepth::Sixteen => data[(y * width + x) * 2],

                BitDepth::ThirtyTwo => {
                    let index = (y * width + x) * 4;
                    let bits = [ data[index], data[index + 1], data[index + 2], data[index + 3] ];
                    byte_from_hdr(f32::from_be_bytes(bits))
                },
            },
        }
    }
}

impl<'d> MaskPlane<'d> {

    fn new(layer: &'d Layer, mask: &Option<Mask>, id: i16, depth: BitDepth) -> Result<Option<Self>> {
        let mask = match mask {
            Some(mask) if !mask.flags.disabled() => mask,
            _ => return Ok(None),
        };

        let channel = match layer.channel(id) {
            Some(channel) if !channel.data.is_empty() => channel,
            _ => return Ok(None),
        };

        let size = mask.rect.size();
        let plane = Plane::new(Some(channel), size, depth)?;
        Ok(Some(MaskPlane { plane, offset: mask.offset_in_layer(&layer.rect), size }))
    }

    /// Fully opaque outside of the mask rectangle.
    #[inline]
    fn sample(&self, x: usize, y: usize) -> u32 {
        let mask_x = x as i64 - self.offset.x() as i64;
        let mask_y = y as i64 - self.offset.y() as i64;

        let outside = mask_x < 0 || mask_y < 0
            || mask_x >= self.size.width() as i64 || mask_y >= self.size.height() as i64;

        if outside { 255 } else { u32::from(self.plane.sample(mask_x as usize, mask_y as usize)) }
    }
}

impl AlphaPlanes<'_> {

    #[inline]
    fn sample(&self, x: usize, y: usize) -> u8 {
        let alpha = u32::from(self.alpha.sample(x, y));

        let alpha = match (&self.layer_mask, &self.user_mask) {
            (None, None) => alpha,
            (Some(mask), None) | (None, Some(mask)) => alpha * mask.sample(x, y) / 255,
            (Some(layer), Some(user)) => alpha * layer.sample(x, y) * user.sample(x, y) / 65025,
        };

        alpha as u8
    }
}


/// Convert the decompressed channels of a layer to a bottom-up RGBA image of the layer rectangle.
/// Missing color channels are treated as fully saturated, a missing alpha channel as opaque.
pub fn decode_layer(layer: &Layer, file: &PsdFile, parallel: bool) -> Result<RgbaImage> {
    let header = &file.header;
    let size = layer.rect.size();
    let depth = header.bit_depth;

    let max_dimension = Version::Psb.max_dimension();
    if size.width() > max_dimension || size.height() > max_dimension {
        return Err(Error::invalid("layer rectangle exceeds the maximum image size"));
    }

    if depth == BitDepth::ThirtyTwo && !matches!(header.color_mode, ColorMode::Rgb | ColorMode::Grayscale) {
        return Err(Error::invalid("32-bit images must be rgb or grayscale"));
    }

    let color_count = match header.color_mode {
        ColorMode::Bitmap | ColorMode::Grayscale | ColorMode::Duotone | ColorMode::Indexed => 1,
        ColorMode::Rgb | ColorMode::Lab => 3,
        ColorMode::Cmyk => 4,
        ColorMode::Multichannel => return Err(Error::unsupported("multichannel images must be converted to layers first")),
    };

    let mut colors = [Plane::Constant(255); 4];
    for (id, plane) in colors.iter_mut().enumerate().take(color_count) {
        *plane = Plane::new(layer.channel(id as i16), size, depth)?;
    }

    let alpha = AlphaPlanes {
        alpha: Plane::new(layer.alpha_channel(), size, depth)?,
        layer_mask: MaskPlane::new(layer, &layer.masks.layer_mask, Channel::LAYER_MASK, depth)?,
        user_mask: MaskPlane::new(layer, &layer.masks.user_mask, Channel::USER_MASK, depth)?,
    };

    let palette = &file.color_mode_data;
    if header.color_mode == ColorMode::Indexed && palette.len() < 768 {
        return Err(Error::invalid("indexed image without a full palette"));
    }

    let color_mode = header.color_mode;
    let width = size.width();
    let mut pixels = vec![ Pixel::TRANSPARENT; size.area() ];

    parallel::fill_indexed(&mut pixels, parallel, |index| {
        let x = index % width;

        // the buffer stores the bottom row first
        let y = size.height() - 1 - index / width;

        let a = alpha.sample(x, y);
        let [c0, c1, c2, c3] = [ colors[0].sample(x, y), colors[1].sample(x, y), colors[2].sample(x, y), colors[3].sample(x, y) ];

        match color_mode {
            ColorMode::Rgb => Pixel::rgba(c0, c1, c2, a),
            ColorMode::Cmyk => cmyk_to_rgb(c0, c1, c2, c3, a),
            ColorMode::Lab => lab_to_rgb(c0, c1, c2, a),

            ColorMode::Indexed => {
                let index = c0 as usize;
                Pixel::rgba(palette[index], palette[index + 256], palette[index + 512], a)
            },

            _ => Pixel::gray(c0, a),
        }
    });

    RgbaImage::from_pixels(size, pixels)
}

/// Decode the flattened composite image of the whole document.
pub fn decode_composite(file: &PsdFile, parallel: bool) -> Result<RgbaImage> {
    decode_layer(&file.base_layer, file, parallel)
}


/// Stored inverted: 255 is no ink.
fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8, a: u8) -> Pixel {
    let (c, m, y, k) = (255 - u32::from(c), 255 - u32::from(m), 255 - u32::from(y), 255 - u32::from(k));
    let convert = |color: u32| (255 - (color * (255 - k) / 255 + k).min(255)) as u8;
    Pixel::rgba(convert(c), convert(m), convert(y), a)
}

/// CIE Lab to sRGB, with observer 2° and illuminant D65.
fn lab_to_rgb(l: u8, a: u8, b: u8, alpha: u8) -> Pixel {
    // the scaled values are truncated to whole numbers
    let l = (f64::from(l) / 2.55).trunc();
    let a = (f64::from(a) - 127.5).trunc();
    let b = (f64::from(b) - 127.5).trunc();

    let (reference_x, reference_y, reference_z) = (95.047, 100.000, 108.883);

    let y = (l + 16.0) / 116.0;
    let x = a / 500.0 + y;
    let z = y - b / 200.0;

    let from_lab = |value: f64| {
        let cubed = value * value * value;
        if cubed > 0.008856 { cubed } else { (value - 16.0 / 116.0) / 7.787 }
    };

    let x = reference_x * from_lab(x);
    let y = reference_y * from_lab(y);
    let z = reference_z * from_lab(z);

    let r = x * 0.032406 + y * -0.015372 + z * -0.004986;
    let g = x * -0.009689 + y * 0.018758 + z * 0.000415;
    let b = x * 0.000557 + y * -0.002040 + z * 0.010570;

    let to_byte = |linear: f64| {
        let gamma = if linear > 0.0031308 { 1.055 * linear.powf(1.0 / 2.4) - 0.055 } else { 12.92 * linear };
        ((gamma * 256.0) as i64).max(0).min(255) as u8
    };

    Pixel::rgba(to_byte(r), to_byte(g), to_byte(b), alpha)
}
