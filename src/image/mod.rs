
//! Convert the channels of a layer to RGBA pixels and back.
//!
//! All pixel buffers in this module are stored bottom row first:
//! row `height - 1 - y` of the buffer holds row `y` of the file.

pub mod decode;
pub mod encode;
pub mod composite;

pub use self::decode::decode_layer;
pub use self::encode::encode_channels;
pub use self::composite::{composite, CompositeSource};

use crate::math::{Rect, Vec2};
use crate::error::{Result, Error};


/// A single pixel with red, green, blue, and alpha values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// An image with 8-bit RGBA pixels, stored bottom row first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgbaImage {

    /// Width and height.
    pub size: Vec2<usize>,

    /// `width * height` pixels, row by row, starting with the bottom row.
    pub pixels: Vec<Pixel>,
}


impl Pixel {

    /// Fully transparent black, which is also the value of an unwritten pixel.
    pub const TRANSPARENT: Pixel = Pixel { r: 0, g: 0, b: 0, a: 0 };

    #[inline]
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self { Pixel { r, g, b, a } }

    #[inline]
    pub fn gray(value: u8, a: u8) -> Self { Pixel { r: value, g: value, b: value, a } }
}

impl From<[u8; 4]> for Pixel {
    fn from([r, g, b, a]: [u8; 4]) -> Self { Pixel { r, g, b, a } }
}

impl From<Pixel> for [u8; 4] {
    fn from(pixel: Pixel) -> Self { [ pixel.r, pixel.g, pixel.b, pixel.a ] }
}


impl RgbaImage {

    /// A transparent image.
    pub fn new(size: Vec2<usize>) -> Self {
        RgbaImage { size, pixels: vec![ Pixel::TRANSPARENT; size.area() ] }
    }

    /// Returns an error if the number of pixels does not match the size.
    pub fn from_pixels(size: Vec2<usize>, pixels: Vec<Pixel>) -> Result<Self> {
        if pixels.len() != size.area() {
            return Err(Error::invalid("pixel count does not match image size"));
        }

        Ok(RgbaImage { size, pixels })
    }

    pub fn width(&self) -> usize { self.size.width() }
    pub fn height(&self) -> usize { self.size.height() }

    pub fn is_empty(&self) -> bool { self.pixels.is_empty() }

    /// The pixel at the buffer position, where `y` counts from the bottom row.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Pixel> {
        if x >= self.width() || y >= self.height() { return None; }
        Some(self.pixels[y * self.width() + x])
    }

    /// The pixels as `r, g, b, a` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&pixel| <[u8; 4]>::from(pixel)).collect()
    }

    /// The pixels inside the rectangle, which must lie inside this image.
    pub fn crop(&self, rect: Rect) -> Result<RgbaImage> {
        let inside = rect.left >= 0 && rect.top >= 0 && !rect.is_empty()
            && rect.right as usize <= self.width() && rect.bottom as usize <= self.height();

        if !inside {
            return Err(Error::invalid("crop rectangle outside of image"));
        }

        let size = rect.size();
        let mut pixels = Vec::with_capacity(size.area());

        for y in rect.top as usize .. rect.bottom as usize {
            let start = y * self.width();
            pixels.extend_from_slice(&self.pixels[start + rect.left as usize .. start + rect.right as usize]);
        }

        Ok(RgbaImage { size, pixels })
    }
}


/// Find the smallest rectangle that contains all pixels with any opacity,
/// in buffer coordinates, and crop the image to it.
/// Returns `None` if every pixel is fully transparent.
pub fn trim(image: &RgbaImage) -> Option<(Rect, RgbaImage)> {
    let width = image.width();
    let (mut left, mut top, mut right, mut bottom) = (usize::MAX, usize::MAX, 0, 0);

    for (index, pixel) in image.pixels.iter().enumerate() {
        if pixel.a == 0 { continue; }

        let (x, y) = (index % width, index / width);
        left = left.min(x);
        top = top.min(y);
        right = right.max(x + 1);
        bottom = bottom.max(y + 1);
    }

    if left == usize::MAX { return None; }

    let rect = Rect { left: left as i32, top: top as i32, right: right as i32, bottom: bottom as i32 };
    let trimmed = image.crop(rect).ok()?;
    Some((rect, trimmed))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trim_to_opaque_pixels(){
        let mut image = RgbaImage::new(Vec2(4, 3));
        image.pixels[1 * 4 + 1] = Pixel::rgba(1, 2, 3, 4);
        image.pixels[2 * 4 + 2] = Pixel::gray(9, 255);

        let (rect, trimmed) = trim(&image).unwrap();
        assert_eq!(rect, Rect::from_position_size(1, 1, 2, 2));
        assert_eq!(trimmed.size, Vec2(2, 2));
        assert_eq!(trimmed.pixel(0, 0), Some(Pixel::rgba(1, 2, 3, 4)));
        assert_eq!(trimmed.pixel(1, 1), Some(Pixel::gray(9, 255)));
        assert_eq!(trimmed.pixel(1, 0), Some(Pixel::TRANSPARENT));
    }

    #[test]
    fn trim_transparent_image(){
        assert_eq!(trim(&RgbaImage::new(Vec2(5, 5))), None);
        assert_eq!(trim(&RgbaImage::new(Vec2(0, 0))), None);
    }

    #[test]
    fn bytes_are_interleaved(){
        let image = RgbaImage::from_pixels(Vec2(2, 1), vec![ Pixel::rgba(1, 2, 3, 4), Pixel::rgba(5, 6, 7, 8) ]).unwrap();
        assert_eq!(image.to_bytes(), vec![ 1, 2, 3, 4, 5, 6, 7, 8 ]);
        assert!(RgbaImage::from_pixels(Vec2(2, 2), Vec::new()).is_err());
    }
}
