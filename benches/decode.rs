#[macro_use]
extern crate bencher;

extern crate psdfile;
use psdfile::prelude::*;

use bencher::Bencher;

/// A document with a few overlapping layers and a gradient composite.
fn generated_file(compression: Compression) -> Vec<u8> {
    let size = Vec2(512, 384);
    let header = Header::new(Version::Psd, size, 4, BitDepth::Eight, ColorMode::Rgb).unwrap();
    let mut file = PsdFile::new(header).unwrap();

    for index in 0 .. 6_i32 {
        let rect = Rect::from_position_size(index * 40, index * 30, 256, 192);
        let mut layer = Layer::new(format!("layer {}", index), rect);

        for &id in &[ -1_i16, 0, 1, 2 ] {
            let data = (0 .. rect.pixel_count())
                .map(|pixel| ((pixel / 7) as i32 * (index + 1) + i32::from(id)) as u8)
                .collect();

            layer.channels.push(Channel::new(id, data));
        }

        file.layers.push(layer);
    }

    for &id in &[ 0_i16, 1, 2, -1 ] {
        let data = (0 .. size.area()).map(|pixel| (pixel % size.width()) as u8 ^ id as u8).collect();
        file.base_layer.channels.push(Channel::new(id, data));
    }

    file.to_bytes(WriteOptions { parallel: true, compression }).unwrap()
}

fn read_rle_file(bench: &mut Bencher) {
    let bytes = generated_file(Compression::Rle);

    bench.iter(||{
        let file = PsdFile::read_from_slice(&bytes, &ReadOptions::default()).unwrap();
        bencher::black_box(file);
    })
}

fn read_zip_document(bench: &mut Bencher) {
    let bytes = generated_file(Compression::ZipPrediction);

    bench.iter(||{
        let document = Document::read_from_slice(&bytes, &ReadOptions::default()).unwrap();
        bencher::black_box(document);
    })
}

fn read_rle_document_non_parallel(bench: &mut Bencher) {
    let bytes = generated_file(Compression::Rle);
    let options = ReadOptions { parallel: false, .. ReadOptions::default() };

    bench.iter(||{
        let document = Document::read_from_slice(&bytes, &options).unwrap();
        bencher::black_box(document);
    })
}

fn write_document(bench: &mut Bencher) {
    let document = Document::read_from_slice(&generated_file(Compression::Rle), &ReadOptions::default()).unwrap();

    bench.iter(||{
        let bytes = document.to_bytes(WriteOptions::default()).unwrap();
        bencher::black_box(bytes);
    })
}

benchmark_group!(decode,
    read_rle_file,
    read_zip_document,
    read_rle_document_non_parallel,
    write_document
);

benchmark_main!(decode);
