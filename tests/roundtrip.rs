//! Write files and documents, read them back, and compare the structure and pixels.

extern crate psdfile;

use std::path::PathBuf;
use std::ffi::OsStr;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use psdfile::prelude::*;
use psdfile::file::layer::{Channel, Mask, MaskFlags};
use psdfile::image::decode_layer;
use psdfile::meta::layer_info::{LayerInfo, SectionInfo, SectionKind};
use psdfile::io::FourCc;


fn psd_files() -> impl Iterator<Item = PathBuf> {
    walkdir::WalkDir::new("tests/images").into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            let extension = entry.path().extension();
            extension == Some(OsStr::new("psd")) || extension == Some(OsStr::new("psb"))
        })
        .map(walkdir::DirEntry::into_path)
}

fn ramp(length: usize, seed: u8) -> Vec<u8> {
    (0 .. length).map(|index| (index as u8).wrapping_mul(7).wrapping_add(seed) / 3 * 3).collect()
}

fn rgba_layer(name: &str, rect: Rect, seed: u8) -> Layer {
    let mut layer = Layer::new(name, rect);

    for &id in &[ -1_i16, 0, 1, 2 ] {
        layer.channels.push(Channel::new(id, ramp(rect.pixel_count(), seed.wrapping_add(id as u8))));
    }

    layer
}

fn marker(name: &str, kind: SectionKind) -> Layer {
    let mut layer = Layer::new(name, Rect::default());
    layer.additional_info.push(LayerInfo::Section(SectionInfo::new(kind, FourCc(*b"pass"))));
    layer
}

fn sample_file(version: Version) -> PsdFile {
    let header = Header::new(version, Vec2(40, 30), 4, BitDepth::Eight, ColorMode::Rgb).unwrap();
    let mut file = PsdFile::new(header).unwrap();

    let mut masked = rgba_layer("masked", Rect::from_position_size(5, 5, 20, 10), 3);
    masked.masks.layer_mask = Some(Mask { rect: Rect::from_position_size(5, 5, 10, 10), default_color: 0, flags: MaskFlags(0) });
    masked.channels.push(Channel::new(Channel::LAYER_MASK, vec![ 200; 100 ]));
    masked.opacity = 77;
    masked.blend_mode = FourCc(*b"scrn");

    let mut hidden = rgba_layer("hidden ✓", Rect::from_position_size(-4, 20, 16, 16), 9);
    hidden.flags.set_visible(false);

    file.layers = vec![
        rgba_layer("background", Rect::from_size(40, 30), 0),
        marker("</Layer group>", SectionKind::Divider),
        masked,
        hidden,
        marker("group", SectionKind::OpenFolder),
    ];

    for id in 0 .. 4 {
        file.base_layer.channels.push(Channel::new(if id == 3 { -1 } else { id }, ramp(40 * 30, id as u8)));
    }

    file
}

fn assert_same_layers(expected: &PsdFile, actual: &PsdFile) {
    assert_eq!(expected.layers.len(), actual.layers.len());

    for (expected_layer, actual_layer) in expected.layers.iter().zip(&actual.layers) {
        assert_eq!(expected_layer.name, actual_layer.name);
        assert_eq!(expected_layer.rect, actual_layer.rect);
        assert_eq!(expected_layer.opacity, actual_layer.opacity);
        assert_eq!(expected_layer.blend_mode, actual_layer.blend_mode);
        assert_eq!(expected_layer.visible(), actual_layer.visible());
        assert_eq!(expected_layer.section_kind(), actual_layer.section_kind());
        assert_eq!(expected_layer.masks, actual_layer.masks);

        for channel in &expected_layer.channels {
            assert_eq!(Some(&channel.data), actual_layer.channel(channel.id).map(|channel| &channel.data));
        }

        assert_eq!(
            decode_layer(expected_layer, expected, false).unwrap(),
            decode_layer(actual_layer, actual, true).unwrap()
        );
    }
}

#[test]
fn files_survive_every_compression(){
    for &version in &[ Version::Psd, Version::Psb ] {
        let file = sample_file(version);

        for &compression in &[ Compression::Raw, Compression::Rle, Compression::Zip, Compression::ZipPrediction ] {
            for &parallel in &[ false, true ] {
                let bytes = file.to_bytes(WriteOptions { parallel, compression }).unwrap();
                let loaded = PsdFile::read_from_slice(&bytes, &ReadOptions::debug()).unwrap();

                assert_eq!(loaded.header, file.header);
                assert_eq!(loaded.composite_compression, Compression::Rle);
                assert_same_layers(&file, &loaded);

                for (expected, actual) in file.base_layer.channels.iter().zip(&loaded.base_layer.channels) {
                    assert_eq!(expected.id, actual.id);
                    assert_eq!(expected.data, actual.data);
                }
            }
        }
    }
}

#[test]
fn saving_twice_gives_the_same_bytes(){
    let file = sample_file(Version::Psd);
    let bytes = file.to_bytes(WriteOptions::default()).unwrap();

    let loaded = PsdFile::read_from_slice(&bytes, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.to_bytes(WriteOptions::default()).unwrap(), bytes);
}

#[test]
fn documents_survive_file_round_trips(){
    let bytes = sample_file(Version::Psd).to_bytes(WriteOptions::default()).unwrap();
    let document = Document::read_from_slice(&bytes, &ReadOptions::default()).unwrap();

    let names: Vec<&str> = document.depth_first().into_iter()
        .map(|id| document.node(id).attributes.raw_name.as_str()).collect();

    assert_eq!(names, vec![ "group", "hidden ✓", "masked", "background" ]);

    let saved = document.to_bytes(WriteOptions::default()).unwrap();
    let reloaded = Document::read_from_slice(&saved, &ReadOptions::default()).unwrap();

    assert_eq!(reloaded.base, document.base);
    assert_eq!(reloaded.depth_first().len(), document.depth_first().len());

    for (before, after) in document.depth_first().into_iter().zip(reloaded.depth_first()) {
        let (before, after) = (document.node(before), reloaded.node(after));
        assert_eq!(before.attributes.raw_name, after.attributes.raw_name);
        assert_eq!(before.attributes.rect, after.attributes.rect);
        assert_eq!(before.attributes.visible, after.attributes.visible);
        assert_eq!(before.attributes.blend_mode, after.attributes.blend_mode);
        assert_eq!(before.image(), after.image());
    }
}

#[test]
fn masks_reduce_alpha(){
    let bytes = sample_file(Version::Psd).to_bytes(WriteOptions::default()).unwrap();
    let document = Document::read_from_slice(&bytes, &ReadOptions::default()).unwrap();

    let masked = document.depth_first().into_iter()
        .find(|&id| document.node(id).attributes.name == "masked").unwrap();

    let image = document.node(masked).image().unwrap();

    // the mask covers the left half of the layer, the right half is outside the mask
    let alpha_channel = ramp(200, 2);
    let (x, file_y) = (3, 2);
    let inside = image.pixel(x, image.height() - 1 - file_y).unwrap();
    assert_eq!(u32::from(inside.a), u32::from(alpha_channel[file_y * 20 + x]) * 200 / 255);

    let (x, file_y) = (15, 2);
    let outside = image.pixel(x, image.height() - 1 - file_y).unwrap();
    assert_eq!(outside.a, alpha_channel[file_y * 20 + x]);
}

/// Reads every psd file in `tests/images`, if that directory exists.
#[test]
fn round_trip_all_files(){
    let files: Vec<PathBuf> = psd_files().collect();

    files.into_par_iter().for_each(|path| {
        let file = PsdFile::read_from_file(&path, &ReadOptions::default())
            .unwrap_or_else(|error| panic!("{:?}: {}", path, error));

        let bytes = file.to_bytes(WriteOptions::default()).unwrap();
        let loaded = PsdFile::read_from_slice(&bytes, &ReadOptions::default()).unwrap();
        assert_same_layers(&file, &loaded);

        Document::from_file(loaded, &ReadOptions::default())
            .unwrap_or_else(|error| panic!("{:?}: {}", path, error));
    });
}
