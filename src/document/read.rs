
//! Build the layer tree from the flat layer list of a file.

use std::path::Path;

use crate::io::{Read, Seek, FourCc};
use crate::error::{Result, UnitResult, Error};
use crate::math::{FloatRect, Matrix3, Vec2};
use crate::meta::ColorMode;
use crate::meta::layer_info::{LayerInfo, SectionKind, TypeToolInfo, PlacedLayer};
use crate::file::{PsdFile, ReadOptions, verify_layer_sections};
use crate::file::layer::Layer;
use crate::image::{RgbaImage, CompositeSource, composite, decode_layer};
use crate::image::decode::decode_composite;
use crate::parallel;
use super::*;


/// What a layer record turns into.
#[derive(Clone, Copy, Debug)]
enum LayerClass<'l> {
    Group,
    Divider,
    Text(&'l TypeToolInfo),
    Linked(&'l PlacedLayer),
    Image,
}

impl<'l> LayerClass<'l> {

    /// Inspect the additional info once.
    /// Section markers win, and text wins over smart objects.
    fn of(layer: &'l Layer) -> Self {
        let mut class = LayerClass::Image;

        for info in &layer.additional_info {
            match info {
                LayerInfo::Section(section) => match section.kind {
                    SectionKind::OpenFolder | SectionKind::ClosedFolder => return LayerClass::Group,
                    SectionKind::Divider => return LayerClass::Divider,
                    SectionKind::Layer => {},
                },

                LayerInfo::TypeTool(type_tool) => class = LayerClass::Text(type_tool),

                LayerInfo::Placed(placed) => if !matches!(class, LayerClass::Text(_)) {
                    class = LayerClass::Linked(placed)
                },

                _ => {},
            }
        }

        class
    }

    fn has_pixels(self) -> bool {
        !matches!(self, LayerClass::Group | LayerClass::Divider)
    }
}


impl Document {

    /// Read a file from the file system and build its layer tree.
    pub fn read_from_file(path: impl AsRef<Path>, options: &ReadOptions<'_>) -> Result<Self> {
        Self::from_file(PsdFile::read_from_file(path, options)?, options)
    }

    /// Read a file that is already in memory and build its layer tree.
    pub fn read_from_slice(bytes: &[u8], options: &ReadOptions<'_>) -> Result<Self> {
        Self::from_file(PsdFile::read_from_slice(bytes, options)?, options)
    }

    /// Read a file and build its layer tree. The reader should be buffered.
    pub fn read(read: impl Read + Seek, options: &ReadOptions<'_>) -> Result<Self> {
        Self::from_file(PsdFile::read(read, options)?, options)
    }

    /// Decode all layers and arrange them in a tree.
    /// Multichannel files are converted to one grayscale layer per channel first.
    pub fn from_file(mut file: PsdFile, options: &ReadOptions<'_>) -> Result<Self> {
        let context = options.context();

        convert_multichannel(&mut file)?;
        verify_layer_sections(&file.layers)?;

        let size = file.header.size();
        let classes: Vec<LayerClass<'_>> = file.layers.iter().map(LayerClass::of).collect();

        let file_ref = &file;
        let images = parallel::map_items(
            file.layers.iter().zip(&classes).collect(), options.parallel,
            |(layer, class)| {
                if !class.has_pixels() || layer.rect.is_empty() { Ok(RgbaImage::default()) }
                else { decode_layer(layer, file_ref, options.parallel) }
            }
        ).into_iter().collect::<Result<Vec<RgbaImage>>>()?;

        let mut document = Document {
            resolution: file.resources.resolution().copied().unwrap_or_default(),
            compression: file.composite_compression,
            base: decode_composite(&file, options.parallel)?,
            linked_roots: read_linked_roots(&file, options)?,
            nodes: Vec::with_capacity(file.layers.len()),
            .. Document::new(size)
        };

        // the innermost open group is the last element
        let mut groups: Vec<NodeId> = Vec::new();

        for ((layer, class), image) in file.layers.iter().zip(classes).zip(images).rev() {
            let mut attributes = layer_attributes(layer, size);

            let kind = match class {
                LayerClass::Divider => {
                    groups.pop();
                    continue;
                },

                LayerClass::Group => NodeKind::Group { children: Vec::new() },
                LayerClass::Image => NodeKind::Image { image },

                LayerClass::Text(type_tool) => NodeKind::Text {
                    image,
                    text: type_tool.text_string().unwrap_or_default().to_string(),
                    text_rect: text_rect(type_tool, size).unwrap_or(attributes.rect),
                    type_tool: type_tool.clone(),
                },

                LayerClass::Linked(placed) => {
                    let transform = placed.transform();
                    if let Some(transform) = &transform { attributes.rect = linked_rect(transform, size); }

                    NodeKind::Linked {
                        image,
                        linked_id: placed.unique_id().unwrap_or_default(),
                        rotation: transform.map_or(0.0, |transform| transform.rotation_degrees()),
                        placed: placed.clone(),
                    }
                },
            };

            if class.has_pixels() && layer.rect.is_empty() {
                context.notice(format_args!("layer {:?} has no pixels", layer.name));
            }

            let parent = groups.last().copied();
            let id = document.push_node(parent, attributes, kind)
                .ok_or_else(|| Error::invalid("layer parent is not a group"))?;

            if let LayerClass::Group = class {
                groups.push(id);
            }
        }

        Ok(document)
    }
}


/// Replace the composite channels of a multichannel file with
/// one grayscale layer per channel, named after the alpha channel names.
/// Does nothing for other color modes.
pub fn convert_multichannel(file: &mut PsdFile) -> UnitResult {
    if file.header.color_mode != ColorMode::Multichannel {
        return Ok(());
    }

    if !file.layers.is_empty() {
        return Err(Error::invalid("Multichannel image should not have layers"));
    }

    let names = file.resources.unicode_alpha_names()
        .or_else(|| file.resources.alpha_channel_names())
        .ok_or_else(|| Error::invalid("No channel names found"))?
        .to_vec();

    if file.base_layer.channels.len() > names.len() {
        return Err(Error::invalid("More channels than channel names"));
    }

    let rect = file.base_layer.rect;

    // channels are stored top to bottom, layers bottom to top
    file.layers = file.base_layer.channels.iter().zip(names).rev()
        .map(|(channel, name)| {
            let mut channel = channel.clone();
            channel.id = 0;

            let mut layer = Layer::new(name, rect);
            layer.blend_mode = FourCc(*b"dark");
            layer.channels.push(channel);
            layer
        })
        .collect();

    file.header.color_mode = ColorMode::Grayscale;
    Ok(())
}

/// Composite all visible layers of a file with simple alpha blending,
/// the way the base image of a smart object is shown.
pub fn flatten_layers(file: &PsdFile, parallel: bool) -> Result<RgbaImage> {
    // bottom layer first, as the composite expects
    let layers: Vec<&Layer> = file.layers.iter()
        .filter(|layer| layer.visible() && layer.section_kind() == SectionKind::Layer && !layer.rect.is_empty())
        .collect();

    let images = parallel::map_items(layers.clone(), parallel, |layer| decode_layer(layer, file, parallel))
        .into_iter().collect::<Result<Vec<RgbaImage>>>()?;

    let height = file.header.height() as i64;
    let sources: Vec<CompositeSource<'_>> = layers.iter().zip(&images)
        .map(|(layer, image)| CompositeSource {
            image,
            position: Vec2(i64::from(layer.rect.left), height - i64::from(layer.rect.bottom)),
            opacity: f32::from(layer.opacity) / 255.0,
        })
        .collect();

    Ok(composite(file.header.size(), &sources, parallel))
}

/// Flatten every embedded document once, keyed by the id of its linked file.
/// Linked files that are not psd documents are skipped.
fn read_linked_roots(file: &PsdFile, options: &ReadOptions<'_>) -> Result<Vec<LinkedRoot>> {
    let mut roots: Vec<LinkedRoot> = Vec::new();

    for linked in file.linked_files() {
        let id = linked.id.trim_end_matches('\0');
        if !linked.is_embedded_document() || roots.iter().any(|root| root.id == id) {
            continue;
        }

        let mut nested = PsdFile::read_from_slice(&linked.data, options)?;
        convert_multichannel(&mut nested)?;

        roots.push(LinkedRoot {
            id: id.to_string(),
            name: sanitize_name(linked.name_without_extension()),
            size: nested.header.size(),
            image: flatten_layers(&nested, options.parallel)?,
        });
    }

    Ok(roots)
}

fn layer_attributes(layer: &Layer, document_size: Vec2<usize>) -> Attributes {
    Attributes {
        id: layer.layer_id().unwrap_or(0),
        opacity: f32::from(layer.opacity) / 255.0,
        visible: layer.visible(),
        blend_mode: layer.blend_mode,
        .. Attributes::new(layer.name.clone(), layer.rect.to_engine_space(document_size.width(), document_size.height()))
    }
}

/// The `bounds` of the text descriptor, scaled and moved by the text transform.
fn text_rect(type_tool: &TypeToolInfo, document_size: Vec2<usize>) -> Option<FloatRect> {
    let bounds = type_tool.text.get_descriptor("bounds")?;
    let scale = type_tool.transform.scale();

    let rect = FloatRect::from_bounds(
        bounds.get_number("Left")? * scale.x(),
        bounds.get_number("Top ")? * scale.y(),
        bounds.get_number("Rght")? * scale.x(),
        bounds.get_number("Btom")? * scale.y(),
    );

    Some(rect
        .translated(type_tool.transform.tx as f32, type_tool.transform.ty as f32)
        .to_engine_space(document_size.width(), document_size.height()))
}

/// The transform maps the centered unit square, so the scale is half the size.
fn linked_rect(transform: &Matrix3, document_size: Vec2<usize>) -> FloatRect {
    let position = transform.position();
    let scale = transform.scale();

    FloatRect {
        x: position.x() - document_size.width() as f32 / 2.0 - scale.x(),
        y: document_size.height() as f32 / 2.0 - position.y() - scale.y(),
        width: scale.x() * 2.0,
        height: scale.y() * 2.0,
    }
}
