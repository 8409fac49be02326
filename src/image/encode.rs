
//! Split RGBA pixels into 8-bit channels for saving.

use smallvec::smallvec;

use crate::file::layer::{Channel, Channels};
use crate::parallel;
use super::{Pixel, RgbaImage};


/// Split a bottom-up image into alpha, red, green and blue channels
/// with ids `-1, 0, 1, 2`, each with the top row first.
pub fn encode_channels(image: &RgbaImage, parallel: bool) -> Channels {
    let extractors: [(i16, fn(&Pixel) -> u8); 4] = [
        (Channel::ALPHA, |pixel| pixel.a),
        (0, |pixel| pixel.r),
        (1, |pixel| pixel.g),
        (2, |pixel| pixel.b),
    ];

    let (width, height) = (image.width(), image.height());
    let mut channels: Channels = smallvec![];

    for &(id, extract) in &extractors {
        let mut data = vec![ 0_u8; image.pixels.len() ];

        parallel::fill_indexed(&mut data, parallel, |file_index| {
            let (x, file_y) = (file_index % width, file_index / width);
            extract(&image.pixels[(height - 1 - file_y) * width + x])
        });

        channels.push(Channel::new(id, data));
    }

    channels
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{Vec2, Rect};
    use crate::meta::{Header, Version, BitDepth, ColorMode};
    use crate::file::PsdFile;
    use crate::file::layer::Layer;
    use crate::image::decode_layer;

    #[test]
    fn channels_are_flipped(){
        let image = RgbaImage::from_pixels(Vec2(1, 2), vec![ Pixel::rgba(1, 2, 3, 4), Pixel::rgba(5, 6, 7, 8) ]).unwrap();
        let channels = encode_channels(&image, false);

        let ids: Vec<i16> = channels.iter().map(|channel| channel.id).collect();
        assert_eq!(ids, vec![ -1, 0, 1, 2 ]);
        assert_eq!(channels[0].data, vec![ 8, 4 ]);
        assert_eq!(channels[1].data, vec![ 5, 1 ]);
    }

    #[test]
    fn decoding_restores_pixels(){
        let pixels = (0 .. 12_u8).map(|value| Pixel::rgba(value, value * 2, value * 3, 255 - value)).collect();
        let image = RgbaImage::from_pixels(Vec2(4, 3), pixels).unwrap();

        let mut layer = Layer::new("round trip", Rect::from_size(4, 3));
        layer.channels = encode_channels(&image, true);

        let file = PsdFile::new(Header::new(Version::Psd, Vec2(4, 3), 4, BitDepth::Eight, ColorMode::Rgb).unwrap()).unwrap();
        assert_eq!(decode_layer(&layer, &file, true).unwrap(), image);
    }
}
