
//! Flatten several decoded layers into one image,
//! used for the base image of linked smart objects.
//! This is a simple painter's algorithm, blend modes are not emulated.

use crate::math::Vec2;
use crate::parallel;
use super::{Pixel, RgbaImage};


/// One decoded layer, placed inside the destination image.
#[derive(Clone, Copy, Debug)]
pub struct CompositeSource<'i> {
    pub image: &'i RgbaImage,

    /// The buffer position of the first pixel of the source inside the destination.
    pub position: Vec2<i64>,

    /// From zero to one. Multiplied with the alpha of each source pixel.
    pub opacity: f32,
}

impl CompositeSource<'_> {

    #[inline]
    fn pixel_at(&self, x: usize, y: usize) -> Option<Pixel> {
        let source_x = x as i64 - self.position.x();
        let source_y = y as i64 - self.position.y();

        if source_x < 0 || source_y < 0 { return None; }
        self.image.pixel(source_x as usize, source_y as usize)
    }
}


/// Draw all sources from the first to the last.
/// Sources must be ordered bottom layer first, so the topmost layer is drawn last.
/// A destination pixel that is still transparent black takes the first covering source pixel,
/// later sources are blended over it with their alpha and opacity.
pub fn composite(size: Vec2<usize>, sources: &[CompositeSource<'_>], parallel: bool) -> RgbaImage {
    let mut pixels = vec![ Pixel::TRANSPARENT; size.area() ];
    let width = size.width();

    parallel::fill_indexed(&mut pixels, parallel, |index| {
        let (x, y) = (index % width, index / width);
        let mut destination = Pixel::TRANSPARENT;

        for source in sources {
            let color = match source.pixel_at(x, y) {
                Some(color) => color,
                None => continue,
            };

            let alpha = color.a as f32 / 255.0 * source.opacity;

            destination = if destination == Pixel::TRANSPARENT {
                Pixel { a: (alpha * 255.0) as u8, .. color }
            }
            else {
                let blend = |source: u8, destination: u8| (alpha * source as f32 + (1.0 - alpha) * destination as f32) as u8;
                let destination_alpha = destination.a as f32 / 255.0;

                Pixel {
                    r: blend(color.r, destination.r),
                    g: blend(color.g, destination.g),
                    b: blend(color.b, destination.b),
                    a: (255.0 * (alpha + (1.0 - alpha) * destination_alpha)) as u8,
                }
            };
        }

        destination
    });

    RgbaImage { size, pixels }
}


#[cfg(test)]
mod test {
    use super::*;

    fn filled(size: Vec2<usize>, pixel: Pixel) -> RgbaImage {
        RgbaImage { size, pixels: vec![ pixel; size.area() ] }
    }

    #[test]
    fn first_source_is_copied(){
        let red = filled(Vec2(1, 1), Pixel::rgba(255, 0, 0, 255));
        let sources = [ CompositeSource { image: &red, position: Vec2(1, 0), opacity: 1.0 } ];

        let image = composite(Vec2(2, 1), &sources, false);
        assert_eq!(image.pixels, vec![ Pixel::TRANSPARENT, Pixel::rgba(255, 0, 0, 255) ]);
    }

    #[test]
    fn later_sources_are_blended_over(){
        let red = filled(Vec2(2, 2), Pixel::rgba(200, 0, 0, 255));
        let blue = filled(Vec2(1, 1), Pixel::rgba(0, 0, 200, 255));

        let sources = [
            CompositeSource { image: &red, position: Vec2(0, 0), opacity: 1.0 },
            CompositeSource { image: &blue, position: Vec2(1, 1), opacity: 0.5 },
        ];

        for &parallel in &[ false, true ] {
            let image = composite(Vec2(2, 2), &sources, parallel);
            assert_eq!(image.pixel(0, 0), Some(Pixel::rgba(200, 0, 0, 255)));
            assert_eq!(image.pixel(1, 1), Some(Pixel::rgba(100, 0, 100, 255)));
        }
    }

    #[test]
    fn opaque_topmost_source_is_drawn_last(){
        let bottom = filled(Vec2(2, 1), Pixel::rgba(200, 0, 0, 255));
        let top = filled(Vec2(1, 1), Pixel::rgba(0, 0, 200, 255));

        let sources = [
            CompositeSource { image: &bottom, position: Vec2(0, 0), opacity: 1.0 },
            CompositeSource { image: &top, position: Vec2(1, 0), opacity: 1.0 },
        ];

        let image = composite(Vec2(2, 1), &sources, false);
        assert_eq!(image.pixels, vec![ Pixel::rgba(200, 0, 0, 255), Pixel::rgba(0, 0, 200, 255) ]);
    }

    #[test]
    fn transparent_sources_keep_later_sources_visible(){
        let clear = filled(Vec2(1, 1), Pixel::TRANSPARENT);
        let green = filled(Vec2(1, 1), Pixel::rgba(0, 255, 0, 255));

        let sources = [
            CompositeSource { image: &clear, position: Vec2(0, 0), opacity: 1.0 },
            CompositeSource { image: &green, position: Vec2(0, 0), opacity: 1.0 },
        ];

        assert_eq!(composite(Vec2(1, 1), &sources, false).pixels, vec![ Pixel::rgba(0, 255, 0, 255) ]);
    }
}
