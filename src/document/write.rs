
//! Turn a layer tree back into a flat layer list and write it.

use std::io::Cursor;
use std::path::Path;

use crate::io::{Write, Seek, FourCc};
use crate::error::{Result, UnitResult, Error};
use crate::math::{Rect, Vec2};
use crate::meta::{Header, Version, BitDepth, ColorMode};
use crate::meta::resource::{ImageResource, ResourceData, ResourceId};
use crate::meta::layer_info::{LayerInfo, LinkedFile, SectionInfo, SectionKind, TypeToolInfo};
use crate::meta::engine_data::EngineData;
use crate::file::{PsdFile, WriteOptions};
use crate::file::layer::{Layer, Channels};
use crate::image::{RgbaImage, encode_channels};
use super::*;


/// The name Photoshop gives to the layer that closes a group.
const DIVIDER_NAME: &str = "</Layer group>";


impl Document {

    /// Write the document to the file system.
    pub fn write_to_file(&self, path: impl AsRef<Path>, options: WriteOptions) -> UnitResult {
        self.to_file(options.parallel)?.write_to_file(path, options)
    }

    /// Write the document to a new buffer.
    pub fn to_bytes(&self, options: WriteOptions) -> Result<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        self.write(&mut bytes, options)?;
        Ok(bytes.into_inner())
    }

    /// Write the document as an 8-bit rgb file.
    pub fn write(&self, write: impl Write + Seek, options: WriteOptions) -> UnitResult {
        self.to_file(options.parallel)?.write(write, options)
    }

    /// Create an 8-bit rgb file with a layer for each node.
    /// Linked roots are embedded as psd files.
    pub fn to_file(&self, parallel: bool) -> Result<PsdFile> {
        let size = self.size();
        let header = Header::new(Version::for_size(self.width, self.height), size, 4, BitDepth::Eight, ColorMode::Rgb)?;

        let mut file = PsdFile::new(header)?;
        file.composite_compression = self.compression;
        file.resources.set(ImageResource::new(ResourceId::RESOLUTION_INFO, ResourceData::Resolution(self.resolution)));
        file.base_layer.channels = composite_channels(&self.base, size, parallel)?;

        // collected topmost first, stored bottom first
        let mut layers = Vec::with_capacity(self.nodes.len());
        for &root in &self.roots {
            self.push_layers(root, &mut layers, parallel)?;
        }

        layers.reverse();
        file.layers = layers;

        if !self.linked_roots.is_empty() {
            let files = self.linked_roots.iter()
                .map(|root| embed_linked_root(root, parallel))
                .collect::<Result<Vec<LinkedFile>>>()?;

            file.additional_info.push(LayerInfo::LinkedFiles { key: FourCc(*b"lnk2"), files });
        }

        Ok(file)
    }

    /// Append the layer of the node, and the layers of all children followed by a divider.
    fn push_layers(&self, id: NodeId, layers: &mut Vec<Layer>, parallel: bool) -> UnitResult {
        let node = self.node(id);
        let mut layer = self.layer_record(&node.attributes);

        match &node.kind {
            NodeKind::Group { children } => {
                layer.additional_info.push(LayerInfo::Section(SectionInfo::new(SectionKind::ClosedFolder, node.attributes.blend_mode)));
                layers.push(layer);

                for &child in children {
                    self.push_layers(child, layers, parallel)?;
                }

                let mut divider = Layer::new(DIVIDER_NAME, Rect::default());
                divider.additional_info.push(LayerInfo::Section(SectionInfo::new(SectionKind::Divider, FourCc(*b"norm"))));
                layers.push(divider);
                return Ok(());
            },

            NodeKind::Image { image } => {
                layer.channels = image_channels(image, layer.rect, parallel)?;
            },

            NodeKind::Text { image, type_tool, .. } => {
                layer.channels = image_channels(image, layer.rect, parallel)?;

                let mut type_tool = type_tool.clone();
                reset_kinsoku_sets(&mut type_tool)?;
                layer.additional_info.push(LayerInfo::TypeTool(type_tool));
            },

            NodeKind::Linked { image, placed, .. } => {
                layer.channels = image_channels(image, layer.rect, parallel)?;
                layer.additional_info.push(LayerInfo::Placed(placed.clone()));
            },
        }

        layers.push(layer);
        Ok(())
    }

    fn layer_record(&self, attributes: &Attributes) -> Layer {
        let rect = attributes.rect.to_file_space(self.width, self.height).round();
        let mut layer = Layer::new(attributes.raw_name.clone(), rect);

        layer.blend_mode = attributes.blend_mode;
        layer.opacity = (attributes.opacity.max(0.0).min(1.0) * 255.0) as u8;
        layer.flags.set_visible(attributes.visible);

        if attributes.id != 0 {
            layer.additional_info.push(LayerInfo::LayerId(attributes.id));
        }

        layer
    }
}


/// Red, green, blue, then alpha, as the composite stores them.
/// An empty base image is written as opaque white.
fn composite_channels(base: &RgbaImage, size: Vec2<usize>, parallel: bool) -> Result<Channels> {
    if base.is_empty() {
        return Ok(Channels::new());
    }

    if base.size != size {
        return Err(Error::invalid("base image size does not match document size"));
    }

    let mut channels = encode_channels(base, parallel);
    channels.rotate_left(1);
    Ok(channels)
}

fn image_channels(image: &RgbaImage, rect: Rect, parallel: bool) -> Result<Channels> {
    if image.is_empty() {
        return Ok(Channels::new());
    }

    if image.size != rect.size() {
        return Err(Error::invalid("layer image size does not match layer rectangle"));
    }

    Ok(encode_channels(image, parallel))
}

/// Photoshop rejects some kinsoku sets written by other applications.
fn reset_kinsoku_sets(type_tool: &mut TypeToolInfo) -> UnitResult {
    if let Some(engine_data) = &mut type_tool.engine_data {
        for &key in &[ "ResourceDict", "DocumentResources" ] {
            if let Some(resources) = engine_data.get_mut(key) {
                resources.insert("KinsokuSet", EngineData::List(Vec::new()))?;
            }
        }
    }

    Ok(())
}

/// A psd file with a single layer that holds the flattened image.
fn embed_linked_root(root: &LinkedRoot, parallel: bool) -> Result<LinkedFile> {
    let mut nested = Document::new(root.size);
    nested.base = root.image.clone();

    if !root.image.is_empty() {
        let rect = Rect::from_size(
            crate::error::usize_to_i32(root.size.width(), "linked width")?,
            crate::error::usize_to_i32(root.size.height(), "linked height")?,
        );

        let attributes = Attributes::new(root.name.clone(), rect.to_engine_space(root.size.width(), root.size.height()));
        nested.push_node(None, attributes, NodeKind::Image { image: root.image.clone() });
    }

    let bytes = nested.to_bytes(WriteOptions { parallel, .. WriteOptions::default() })?;
    Ok(LinkedFile::embedded(root.id.clone(), format!("{}.psd", root.name), bytes))
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::FloatRect;
    use crate::image::Pixel;
    use crate::file::ReadOptions;
    use crate::meta::layer_info::TextTransform;
    use crate::meta::descriptor::Descriptor;

    fn gradient(size: Vec2<usize>) -> RgbaImage {
        let pixels = (0 .. size.area()).map(|index| Pixel::rgba(index as u8, 2 * index as u8, 255 - index as u8, 255)).collect();
        RgbaImage::from_pixels(size, pixels).unwrap()
    }

    fn image_node(document: &mut Document, parent: Option<NodeId>, name: &str, rect: Rect) -> NodeId {
        let attributes = Attributes::new(name, rect.to_engine_space(document.width, document.height));
        let image = gradient(rect.size());
        document.push_node(parent, attributes, NodeKind::Image { image }).unwrap()
    }

    fn sample_document() -> Document {
        let mut document = Document::new(Vec2(8, 6));
        document.base = gradient(Vec2(8, 6));

        let group_attributes = Attributes { opacity: 0.5, .. Attributes::new("group", FloatRect::default()) };
        let group = document.push_node(None, group_attributes, NodeKind::Group { children: Vec::new() }).unwrap();

        image_node(&mut document, Some(group), "first", Rect::from_position_size(1, 1, 3, 2));
        image_node(&mut document, Some(group), "second", Rect::from_position_size(4, 2, 4, 4));
        image_node(&mut document, None, "background", Rect::from_size(8, 6));
        document
    }

    #[test]
    fn groups_are_written_between_markers(){
        let file = sample_document().to_file(false).unwrap();

        let names: Vec<&str> = file.layers.iter().map(|layer| layer.name.as_str()).collect();
        assert_eq!(names, vec![ "background", DIVIDER_NAME, "second", "first", "group" ]);

        assert_eq!(file.layers[1].section_kind(), SectionKind::Divider);
        assert_eq!(file.layers[4].section_kind(), SectionKind::ClosedFolder);
        assert_eq!(file.layers[4].opacity, 127);
        assert_eq!(file.layers[3].rect, Rect::from_position_size(1, 1, 3, 2));

        let ids: Vec<i16> = file.base_layer.channels.iter().map(|channel| channel.id).collect();
        assert_eq!(ids, vec![ 0, 1, 2, -1 ]);
    }

    #[test]
    fn documents_survive_writing_and_reading(){
        let document = sample_document();

        for &options in &[ WriteOptions::debug(), WriteOptions::default() ] {
            let bytes = document.to_bytes(options).unwrap();
            let loaded = Document::read_from_slice(&bytes, &ReadOptions::debug()).unwrap();

            assert_eq!(loaded.size(), document.size());
            assert_eq!(loaded.base, document.base);
            assert_eq!(loaded.roots().len(), 2);

            for (original, loaded_id) in document.depth_first().into_iter().zip(loaded.depth_first()) {
                let (original, loaded_node) = (document.node(original), loaded.node(loaded_id));
                assert_eq!(loaded_node.attributes.name, original.attributes.name);
                assert_eq!(loaded_node.attributes.rect, original.attributes.rect);
                assert_eq!(loaded_node.image(), original.image());
            }
        }
    }

    #[test]
    fn mismatched_image_sizes_are_invalid(){
        let mut document = Document::new(Vec2(4, 4));
        let attributes = Attributes::new("wrong", Rect::from_size(2, 2).to_engine_space(4, 4));
        document.push_node(None, attributes, NodeKind::Image { image: gradient(Vec2(3, 3)) });

        assert!(matches!(document.to_file(false), Err(Error::Invalid(_))));

        let mut wrong_base = Document::new(Vec2(4, 4));
        wrong_base.base = gradient(Vec2(1, 1));
        assert!(matches!(wrong_base.to_file(false), Err(Error::Invalid(_))));
    }

    #[test]
    fn kinsoku_sets_are_emptied(){
        let kinsoku = EngineData::List(vec![ EngineData::Text("x".to_string()) ]);
        let engine_data = EngineData::Dictionary(vec![
            ("ResourceDict".to_string(), EngineData::Dictionary(vec![ ("KinsokuSet".to_string(), kinsoku.clone()) ])),
            ("DocumentResources".to_string(), EngineData::Dictionary(vec![ ("KinsokuSet".to_string(), kinsoku) ])),
        ]);

        let mut type_tool = TypeToolInfo::new(TextTransform::default(), Descriptor::new("", "TxLr"), Descriptor::new("", "warp"), Some(engine_data));
        reset_kinsoku_sets(&mut type_tool).unwrap();

        let engine_data = type_tool.engine_data.unwrap();
        for &key in &[ "ResourceDict", "DocumentResources" ] {
            assert_eq!(engine_data.get_path(&[ key, "KinsokuSet" ]), Some(&EngineData::List(Vec::new())));
        }
    }

    #[test]
    fn linked_roots_are_embedded(){
        let mut document = Document::new(Vec2(2, 2));
        document.linked_roots.push(LinkedRoot {
            id: "5c7e".to_string(),
            name: "logo".to_string(),
            size: Vec2(3, 2),
            image: gradient(Vec2(3, 2)),
        });

        let bytes = document.to_bytes(WriteOptions::default()).unwrap();
        let loaded = Document::read_from_slice(&bytes, &ReadOptions::default()).unwrap();

        assert_eq!(loaded.linked_roots, document.linked_roots);
        assert_eq!(loaded.linked_root("5c7e").map(|root| root.name.as_str()), Some("logo"));
    }
}
