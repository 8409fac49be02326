
//! Read and write the sections of a psd file.
//! This is the structural model: no pixels are converted here,
//! channels are only decompressed into their file byte order.

pub mod layer;

use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use log::Log;

use crate::io::*;
use crate::error::{Result, UnitResult, Error, u64_to_usize, i64_to_usize};
use crate::context::{Context, Action, NO_LOG};
use crate::compression::{Compression, RleRowLengths};
use crate::math::{Rect, Vec2};
use crate::meta::{Header, ColorMode};
use crate::meta::resource::ResourceList;
use crate::meta::layer_info::{LayerInfo, LinkedFile, SectionKind};
use crate::parallel;
use self::layer::{Layer, Channel, CompressedChannel};


/// A psd or psb file, with decompressed channels.
#[derive(Clone, Debug, PartialEq)]
pub struct PsdFile {
    pub header: Header,

    /// The palette of indexed images, or the parameters of duotone images.
    pub color_mode_data: Vec<u8>,

    pub resources: ResourceList,

    /// Ordered from the bottom to the top layer.
    pub layers: Vec<Layer>,

    /// The first alpha channel of the composite contains the merged transparency.
    pub absolute_alpha: bool,

    /// Not interpreted.
    pub global_mask: Vec<u8>,

    /// Global additional info, such as linked files.
    pub additional_info: Vec<LayerInfo>,

    /// The flattened image of the whole document.
    pub base_layer: Layer,

    /// How the composite image was stored.
    pub composite_compression: Compression,
}

/// Specify how to read a file.
#[derive(Clone, Copy)]
pub struct ReadOptions<'l> {

    /// Decompress channels on multiple threads.
    pub parallel: bool,

    /// Unread bytes at the end of a section are an error instead of a warning.
    pub pedantic: bool,

    /// Receives the section trace and repair warnings.
    pub logger: &'l dyn Log,
}

/// Specify how to write a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOptions {

    /// Compress channels on multiple threads.
    pub parallel: bool,

    /// Used for all layer channels. The composite image is always written with rle.
    pub compression: Compression,
}

impl Default for ReadOptions<'static> {
    fn default() -> Self {
        ReadOptions { parallel: true, pedantic: false, logger: &NO_LOG }
    }
}

impl ReadOptions<'static> {

    /// Single-threaded and pedantic, to find errors in a file.
    pub fn debug() -> Self {
        ReadOptions { parallel: false, pedantic: true, logger: &NO_LOG }
    }
}

impl<'l> ReadOptions<'l> {

    /// Report sections and warnings to this logger.
    pub fn with_logger<'n>(self, logger: &'n dyn Log) -> ReadOptions<'n> {
        ReadOptions { parallel: self.parallel, pedantic: self.pedantic, logger }
    }

    pub(crate) fn context(&self) -> Context<'l> {
        Context::new(self.logger, Action::Load, self.pedantic)
    }
}

impl std::fmt::Debug for ReadOptions<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ReadOptions")
            .field("parallel", &self.parallel)
            .field("pedantic", &self.pedantic)
            .finish()
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { parallel: true, compression: Compression::Rle }
    }
}

impl WriteOptions {

    /// Single-threaded and uncompressed.
    pub fn debug() -> Self {
        WriteOptions { parallel: false, compression: Compression::Raw }
    }
}


impl PsdFile {

    /// A file without layers, with an empty composite of the header size.
    pub fn new(header: Header) -> Result<Self> {
        let size = header.size();

        Ok(PsdFile {
            header,
            color_mode_data: Vec::new(),
            resources: ResourceList::default(),
            layers: Vec::new(),
            absolute_alpha: false,
            global_mask: Vec::new(),
            additional_info: Vec::new(),
            base_layer: Layer::new("", document_rect(size)?),
            composite_compression: Compression::Rle,
        })
    }

    /// Whether lengths in this file may have 8 bytes.
    pub fn is_large_document(&self) -> bool {
        self.header.is_large_document()
    }

    /// The linked files of all global linked file blocks.
    pub fn linked_files(&self) -> impl Iterator<Item = &LinkedFile> {
        self.additional_info.iter()
            .filter_map(|info| match info {
                LayerInfo::LinkedFiles { files, .. } => Some(files.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Read a file from the file system.
    pub fn read_from_file(path: impl AsRef<Path>, options: &ReadOptions<'_>) -> Result<Self> {
        Self::read(BufReader::new(std::fs::File::open(path)?), options)
    }

    /// Read a file that is already in memory.
    pub fn read_from_slice(bytes: &[u8], options: &ReadOptions<'_>) -> Result<Self> {
        Self::read(Cursor::new(bytes), options)
    }

    /// Read all sections and decompress all channels.
    /// The reader should be buffered.
    pub fn read(read: impl Read + Seek, options: &ReadOptions<'_>) -> Result<Self> {
        let context = options.context();
        let mut read = Tracking::new(read);

        context.begin(read.byte_position(), "Header");
        let header = Header::read(&mut read)?;
        context.end(read.byte_position(), "Header");

        context.begin(read.byte_position(), "ColorModeData");
        let color_mode_data = read_i32_sized_bytes(&mut read)?;
        context.end(read.byte_position(), "ColorModeData");

        let resources = ResourceList::read(&mut read, &context)?;

        let mut file = PsdFile { color_mode_data, resources, .. PsdFile::new(header)? };

        file.read_layer_and_mask_info(&mut read, &context)?;
        file.read_composite(&mut read, &context)?;
        file.decompress_channels(options.parallel)?;

        Ok(file)
    }

    fn read_layer_and_mask_info<R: Read + Seek>(&mut self, read: &mut Tracking<R>, context: &Context<'_>) -> UnitResult {
        context.begin(read.byte_position(), "Layer and mask info");
        let large = self.is_large_document();

        let length = read_section_length(read, large)?;
        if length == 0 {
            context.end(read.byte_position(), "Layer and mask info");
            return Ok(());
        }

        let end = read.byte_position().checked_add(length)
            .ok_or_else(|| Error::invalid("layer and mask info length"))?;

        // layers section
        {
            context.begin(read.byte_position(), "Layers Info section");
            let layers_length = read_section_length(read, large)?;

            if layers_length > 0 {
                let layers_end = read.byte_position().checked_add(layers_length)
                    .ok_or_else(|| Error::invalid("layers info length"))?;

                let (layers, absolute_alpha) = read_layers_data(read, large, context)?;
                self.layers = layers;
                self.absolute_alpha = absolute_alpha;

                // documented as padded to 2, but actually padded to 4
                let position = read.byte_position();
                if position > layers_end { return Err(Error::invalid("layers read past the end of the layers info section")); }
                else if layers_end - position < 4 { read.seek_read_to(layers_end)?; }
                else { context.finish_block(read, layers_end, "layers info section")?; }
            }

            context.end(read.byte_position(), "Layers Info section");
        }

        context.begin(read.byte_position(), "GlobalLayerMask");
        if end.saturating_sub(read.byte_position()) >= 4 {
            self.global_mask = read_i32_sized_bytes(read)?;
        }
        context.end(read.byte_position(), "GlobalLayerMask");

        let mut info_layers = None;

        self.additional_info = LayerInfo::read_all(read, end, true, large, context, &mut |read, _| {
            info_layers = Some(read_layers_data(read, large, context)?);
            Ok(())
        })?;

        if let Some((layers, absolute_alpha)) = info_layers {
            if self.layers.is_empty() {
                self.layers = layers;
                self.absolute_alpha = absolute_alpha;
            }
        }

        if let Some(data) = self.additional_info.iter().find_map(|info| match info {
            LayerInfo::Raw { key, data, .. } if *key == *b"LMsk" => Some(data),
            _ => None,
        }) {
            self.global_mask = data.clone();
        }

        context.end(read.byte_position(), "Layer and mask info");
        Ok(())
    }

    fn read_composite<R: Read + Seek>(&mut self, read: &mut Tracking<R>, context: &Context<'_>) -> UnitResult {
        context.begin(read.byte_position(), "Composite image");

        let compression = Compression::read(read)?;
        self.composite_compression = compression;

        let channel_count = self.header.channel_count();
        let rows = self.header.height();
        let large = self.is_large_document();

        let lengths = match compression {
            Compression::Raw => {
                let length = self.header.bit_depth.bytes_per_row(self.header.width()) * rows;
                vec![ (length, None); channel_count ]
            },

            // the composite image stores all rle tables up front
            Compression::Rle => (0 .. channel_count)
                .map(|_| {
                    let table = RleRowLengths::read(read, rows, large)?;
                    Ok((table.total(), Some(table)))
                })
                .collect::<Result<Vec<_>>>()?,

            Compression::Zip | Compression::ZipPrediction =>
                return Err(Error::unsupported("zip compressed composite image")),
        };

        let mut channels = layer::Channels::new();
        for (index, (length, table)) in lengths.into_iter().enumerate() {
            context.begin(read.byte_position(), "Channel image data");
            let bytes = read_bytes(read, length)?;
            channels.push(Channel::from_compressed(index as i16, compression, bytes, table));
            context.end(read.byte_position(), "Channel image data");
        }

        // exactly one more channel than required is the alpha channel
        if self.header.color_mode != ColorMode::Multichannel
            && channel_count == self.header.color_mode.min_channel_count() + 1
        {
            if let Some(alpha) = channels.last_mut() { alpha.id = Channel::ALPHA; }
        }

        self.base_layer.channels = channels;
        context.end(read.byte_position(), "Composite image");
        Ok(())
    }

    /// Decompress the channels of all layers and the composite.
    /// Each channel is an independent job.
    fn decompress_channels(&mut self, parallel: bool) -> UnitResult {
        let depth = self.header.bit_depth;
        let mut jobs = Vec::new();

        for layer in self.layers.iter_mut().chain(std::iter::once(&mut self.base_layer)) {
            let sizes = layer.channels.iter()
                .map(|channel| layer.channel_rect(channel.id).map(|rect| rect.size()))
                .collect::<Result<Vec<Vec2<usize>>>>()?;

            jobs.extend(layer.channels.iter_mut().zip(sizes));
        }

        parallel::try_for_each(jobs, parallel, |(channel, size)| channel.decompress(size, depth))
    }


    /// Write the file to the file system.
    pub fn write_to_file(&self, path: impl AsRef<Path>, options: WriteOptions) -> UnitResult {
        let mut write = BufWriter::new(std::fs::File::create(path)?);
        self.write(&mut write, options)?;
        write.flush()?;
        Ok(())
    }

    /// Write the file into a new byte vector.
    pub fn to_bytes(&self, options: WriteOptions) -> Result<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        self.write(&mut bytes, options)?;
        Ok(bytes.into_inner())
    }

    /// Validate and write all sections.
    /// Structural errors are found before the first byte is written.
    pub fn write(&self, write: impl Write + Seek, options: WriteOptions) -> UnitResult {
        self.write_with_logger(write, options, &NO_LOG)
    }

    /// Validate and write all sections, reporting them to the logger.
    pub fn write_with_logger(&self, write: impl Write + Seek, options: WriteOptions, logger: &dyn Log) -> UnitResult {
        let context = Context::new(logger, Action::Save, false);

        self.verify_info_layers()?;
        verify_layer_sections(&self.layers)?;

        let mut header = self.header;
        if !self.base_layer.channels.is_empty() {
            header.set_channel_count(self.base_layer.channels.len())?;
        }

        let depth = header.bit_depth;
        let compressed_layers = parallel::map_items(
            self.layers.iter().collect(), options.parallel,
            |layer: &Layer| layer.compress_channels(depth, options.compression)
        ).into_iter().collect::<Result<Vec<_>>>()?;

        let composite = self.compress_composite(&header, options.parallel)?;

        let mut resources = self.resources.clone();
        resources.ensure_version_info();

        let mut write = Tracking::new(write);

        context.begin(write.byte_position(), "Header");
        header.write(&mut write)?;
        context.end(write.byte_position(), "Header");

        context.begin(write.byte_position(), "ColorModeData");
        write_i32_sized_bytes(&mut write, &self.color_mode_data)?;
        context.end(write.byte_position(), "ColorModeData");

        resources.write(&mut write, &context)?;
        self.write_layer_and_mask_info(&mut write, &compressed_layers, &context)?;
        write_composite(&mut write, &composite, header.is_large_document(), &context)?;

        Ok(())
    }

    fn write_layer_and_mask_info<W: Write + Seek>(
        &self, write: &mut Tracking<W>, compressed_layers: &[Vec<CompressedChannel>], context: &Context<'_>
    ) -> UnitResult
    {
        context.begin(write.byte_position(), "Layer and mask info");
        let large = self.is_large_document();
        let has_info_layers = self.additional_info.iter().any(|info| matches!(info, LayerInfo::InfoLayers { .. }));

        write_length_block(write, large, |write| {
            let start = write.byte_position();

            context.begin(write.byte_position(), "Layers Info section");
            write_length_block(write, large, |write| {
                let layers_start = write.byte_position();

                // only one layer list may exist in a file
                if !has_info_layers {
                    self.write_layers_data(write, compressed_layers, context)?;
                }

                write_padding(write, layers_start, 4)
            })?;
            context.end(write.byte_position(), "Layers Info section");

            context.begin(write.byte_position(), "GlobalLayerMask");
            let has_mask_info = self.additional_info.iter().any(|info| info.key() == *b"LMsk");
            if has_mask_info { 0_u32.write(write)?; }
            else { write_i32_sized_bytes(write, &self.global_mask)?; }
            context.end(write.byte_position(), "GlobalLayerMask");

            for info in &self.additional_info {
                info.write(write, true, large, context, &mut |write, _| {
                    self.write_layers_data(write, compressed_layers, context)
                })?;
            }

            write_padding(write, start, 2)
        })?;

        context.end(write.byte_position(), "Layer and mask info");
        Ok(())
    }

    /// Write the layer count, the records, and the channels, without length or padding.
    fn write_layers_data<W: Write + Seek>(
        &self, write: &mut Tracking<W>, compressed_layers: &[Vec<CompressedChannel>], context: &Context<'_>
    ) -> UnitResult
    {
        // photoshop rejects a layer count of zero, the section must be empty instead
        if self.layers.is_empty() { return Ok(()); }

        context.begin(write.byte_position(), "Layers");
        let large = self.is_large_document();

        let count = crate::error::usize_to_i16(self.layers.len(), "too many layers")?;
        (if self.absolute_alpha { -count } else { count }).write(write)?;

        for (layer, channels) in self.layers.iter().zip(compressed_layers) {
            layer.write(write, channels, large, context)?;
        }

        for (layer, channels) in self.layers.iter().zip(compressed_layers) {
            context.begin(write.byte_position(), format_args!("Layer image, {}", layer.name));
            for channel in channels { channel.write(write, large)?; }
            context.end(write.byte_position(), format_args!("Layer image, {}", layer.name));
        }

        context.end(write.byte_position(), "Layers");
        Ok(())
    }

    /// Compress the composite channels with rle.
    /// Channels without pixels are stored as white.
    fn compress_composite(&self, header: &Header, parallel: bool) -> Result<Vec<CompressedChannel>> {
        let size = header.size();
        let depth = header.bit_depth;
        let full_length = depth.bytes_per_row(size.width()) * size.height();

        let channels: Vec<Channel> = if self.base_layer.channels.is_empty() {
            (0 .. header.channel_count()).map(|id| Channel::new(id as i16, Vec::new())).collect()
        } else {
            self.base_layer.channels.to_vec()
        };

        parallel::map_items(channels, parallel, |mut channel: Channel| {
            if channel.data.is_empty() { channel.data = vec![ 255; full_length ]; }
            CompressedChannel::compress(&channel, size, depth, Compression::Rle)
        }).into_iter().collect()
    }

    fn verify_info_layers(&self) -> UnitResult {
        let count = self.additional_info.iter()
            .filter(|info| matches!(info, LayerInfo::InfoLayers { .. }))
            .count();

        if count > 1 {
            return Err(Error::invalid("more than one nested layer list"));
        }

        if count > 0 && self.layers.is_empty() {
            return Err(Error::invalid("nested layer list without layers"));
        }

        Ok(())
    }
}


/// Every folder marker must be closed by a divider, searching from the top layer down.
pub fn verify_layer_sections(layers: &[Layer]) -> UnitResult {
    let mut depth = 0_usize;

    for layer in layers.iter().rev() {
        match layer.section().map(|section| section.kind) {
            None | Some(SectionKind::Layer) => {},
            Some(SectionKind::OpenFolder) | Some(SectionKind::ClosedFolder) => depth += 1,

            Some(SectionKind::Divider) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::invalid("Layer section ended without matching start marker")
                })?;
            },
        }
    }

    if depth != 0 {
        return Err(Error::invalid("Layer section not closed by end marker"));
    }

    Ok(())
}

fn document_rect(size: Vec2<usize>) -> Result<Rect> {
    Ok(Rect::from_size(
        crate::error::usize_to_i32(size.width(), "document width")?,
        crate::error::usize_to_i32(size.height(), "document height")?,
    ))
}

/// A `u32` length, or an `i64` length in large documents.
fn read_section_length(read: &mut impl Read, large_document: bool) -> Result<usize> {
    if large_document { i64_to_usize(i64::read(read)?, "negative section length") }
    else { u64_to_usize(u64::from(u32::read(read)?), "section length") }
}

/// Read the layer count, all records, and all compressed channels.
/// Returns whether the count was negative, which marks absolute alpha.
fn read_layers_data<R: Read + Seek>(read: &mut Tracking<R>, large_document: bool, context: &Context<'_>) -> Result<(Vec<Layer>, bool)> {
    context.begin(read.byte_position(), "Layers");

    let count = i16::read(read)?;
    let absolute_alpha = count < 0;
    let count = count.unsigned_abs() as usize;

    let mut layers = Vec::with_capacity(count);
    for _ in 0 .. count {
        layers.push(Layer::read(read, large_document, context)?);
    }

    for layer in &mut layers {
        layer.read_pixel_data(read, large_document, context)?;
    }

    context.end(read.byte_position(), "Layers");
    Ok((layers, absolute_alpha))
}

fn write_composite<W: Write + Seek>(write: &mut Tracking<W>, channels: &[CompressedChannel], large_document: bool, context: &Context<'_>) -> UnitResult {
    context.begin(write.byte_position(), "Composite image");
    Compression::Rle.write(write)?;

    for channel in channels {
        if let Some(lengths) = &channel.rle_row_lengths {
            lengths.write(write, large_document)?;
        }
    }

    for channel in channels {
        u8::write_slice(write, &channel.bytes)?;
    }

    context.end(write.byte_position(), "Composite image");
    Ok(())
}
