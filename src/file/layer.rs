
//! Layer records, their channels and their masks.

use smallvec::SmallVec;
use bit_field::BitField;

use crate::io::*;
use crate::error::{Result, UnitResult, Error, u64_to_usize, i64_to_usize, usize_to_i16};
use crate::context::Context;
use crate::math::{Rect, Vec2};
use crate::compression::{Compression, RleRowLengths, ByteVec};
use crate::meta::BitDepth;
use crate::meta::layer_info::{LayerInfo, SectionKind, SectionInfo};


/// Most layers have alpha and three colors, sometimes a mask.
pub type Channels = SmallVec<[Channel; 5]>;


/// A layer as stored in the file, with its channels decompressed after loading.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {

    /// The unicode name if present, otherwise the pascal name.
    pub name: String,

    pub rect: Rect,
    pub channels: Channels,

    /// A four-character key such as `norm` or `mul `.
    pub blend_mode: FourCc,

    pub opacity: u8,
    pub clipping: bool,
    pub flags: LayerFlags,
    pub masks: MaskInfo,

    /// Not interpreted.
    pub blending_ranges: Vec<u8>,

    pub additional_info: Vec<LayerInfo>,
}

/// The flags byte of a layer record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerFlags(pub u8);

/// The layer mask and the user mask of a layer.
/// Their pixels are stored in the channels `-2` and `-3`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaskInfo {
    pub layer_mask: Option<Mask>,
    pub user_mask: Option<Mask>,
}

/// A mask rectangle with its default color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mask {
    pub rect: Rect,
    pub default_color: u8,
    pub flags: MaskFlags,
}

/// The flags byte of a mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaskFlags(pub u8);

/// One plane of pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {

    /// `-1` is transparency, `-2` the layer mask, `-3` the user mask, `0..` the colors.
    pub id: i16,

    /// How the pixels were stored in the file.
    pub compression: Compression,

    /// The decompressed pixels in file byte order, one row after another.
    /// Empty if the channel has no pixels or was not yet decompressed.
    pub data: ByteVec,

    stored_length: u64,
    compressed: ByteVec,
    rle_row_lengths: Option<RleRowLengths>,
}

/// A channel that is ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CompressedChannel {
    pub id: i16,
    pub compression: Compression,
    pub rle_row_lengths: Option<RleRowLengths>,
    pub bytes: ByteVec,
}


impl LayerFlags {

    /// The layer is visible unless bit 1 is set.
    pub fn visible(self) -> bool { !self.0.get_bit(1) }

    pub fn set_visible(&mut self, visible: bool) { self.0.set_bit(1, !visible); }

    pub fn transparency_protected(self) -> bool { self.0.get_bit(0) }
}

impl MaskFlags {

    /// The mask rectangle is relative to the layer instead of the document.
    pub fn position_relative_to_layer(self) -> bool { self.0.get_bit(0) }

    pub fn disabled(self) -> bool { self.0.get_bit(1) }

    pub fn inverted(self) -> bool { self.0.get_bit(2) }

    /// Mask parameters follow the flags. These are skipped when reading.
    pub fn has_parameters(self) -> bool { self.0.get_bit(4) }
}


impl Mask {

    /// The offset of the mask inside the layer.
    pub fn offset_in_layer(&self, layer: &Rect) -> Vec2<i32> {
        if self.flags.position_relative_to_layer() { Vec2(self.rect.left, self.rect.top) }
        else { Vec2(self.rect.left.saturating_sub(layer.left), self.rect.top.saturating_sub(layer.top)) }
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        let rect = Rect::read(read)?;
        let default_color = u8::read(read)?;
        let flags = MaskFlags(u8::read(read)?);
        Ok(Mask { rect, default_color, flags })
    }

    fn write_flags(&self, write: &mut impl Write) -> UnitResult {
        // parameters are never written
        let mut flags = self.flags.0;
        flags.set_bit(4, false);
        flags.write(write)
    }
}

impl MaskInfo {

    fn read<R: Read + Seek>(read: &mut Tracking<R>, context: &Context<'_>) -> Result<Self> {
        let length = u32::read(read)? as usize;
        if length == 0 { return Ok(MaskInfo::default()); }

        context.begin(read.byte_position(), "MaskInfo");
        let end = read.byte_position() + length;

        let layer_mask = Mask::read(read)?;
        let mut user_mask = None;

        if length >= 36 && !layer_mask.flags.has_parameters() {
            let flags = MaskFlags(u8::read(read)?);
            let default_color = u8::read(read)?;
            let rect = Rect::read(read)?;
            user_mask = Some(Mask { rect, default_color, flags });
        }

        if read.byte_position() > end {
            return Err(Error::invalid("mask data read past its declared length"));
        }

        // skips the padding and any mask parameters
        read.seek_read_to(end)?;
        context.end(read.byte_position(), "MaskInfo");

        Ok(MaskInfo { layer_mask: Some(layer_mask), user_mask })
    }

    fn write<W: Write + Seek>(&self, write: &mut Tracking<W>) -> UnitResult {
        let layer_mask = match &self.layer_mask {
            Some(mask) => mask,
            None => return 0_u32.write(write),
        };

        write_length_block(write, false, |write| {
            layer_mask.rect.write(write)?;
            layer_mask.default_color.write(write)?;
            layer_mask.write_flags(write)?;

            match &self.user_mask {
                None => 0_u16.write(write),
                Some(user_mask) => {
                    user_mask.write_flags(write)?;
                    user_mask.default_color.write(write)?;
                    user_mask.rect.write(write)
                },
            }
        })
    }
}


impl Channel {

    pub const ALPHA: i16 = -1;
    pub const LAYER_MASK: i16 = -2;
    pub const USER_MASK: i16 = -3;

    /// A decompressed channel.
    pub fn new(id: i16, data: ByteVec) -> Self {
        Channel {
            id, data,
            compression: Compression::Raw,
            stored_length: 0,
            compressed: Vec::new(),
            rle_row_lengths: None,
        }
    }

    /// A channel of the composite image, which shares the compression of all composite channels.
    pub(crate) fn from_compressed(id: i16, compression: Compression, compressed: ByteVec, rle_row_lengths: Option<RleRowLengths>) -> Self {
        Channel { id, compression, data: Vec::new(), stored_length: 0, compressed, rle_row_lengths }
    }

    /// Whether the pixels are still compressed.
    pub fn is_compressed(&self) -> bool {
        !self.compressed.is_empty()
    }

    /// The compressed bytes declared for this channel.
    pub fn stored_length(&self) -> u64 { self.stored_length }

    fn read_pixel_data<R: Read + Seek>(&mut self, read: &mut Tracking<R>, rows: usize, large_document: bool, context: &Context<'_>) -> UnitResult {
        let start = read.byte_position();
        let length = u64_to_usize(self.stored_length, "channel length")?;
        let end = start.checked_add(length).ok_or_else(|| Error::invalid("channel length"))?;

        if length == 0 {
            self.compression = Compression::Raw;
            return Ok(());
        }

        self.compression = Compression::read(read)?;

        let data_length = if self.compression == Compression::Rle {
            let table_size = rows.saturating_mul(if large_document { 4 } else { 2 });
            if table_size > length.saturating_sub(2) {
                return Err(Error::invalid("rle row table exceeds the channel length"));
            }

            let lengths = RleRowLengths::read(read, rows, large_document)?;
            let total = lengths.total();
            self.rle_row_lengths = Some(lengths);
            total
        }
        else {
            length.saturating_sub(2)
        };

        if read.byte_position() + data_length > end {
            return Err(Error::invalid("channel data exceeds its declared length"));
        }

        self.compressed = read_bytes(read, data_length)?;
        context.finish_block(read, end, "channel image data")
    }

    /// Decompress the stored bytes into `data` and release them.
    pub(crate) fn decompress(&mut self, size: Vec2<usize>, depth: BitDepth) -> UnitResult {
        let compressed = std::mem::take(&mut self.compressed);
        self.rle_row_lengths = None;

        if compressed.is_empty() {
            self.data = Vec::new();
            return Ok(());
        }

        // a single packbits run of two bytes produces at most 128 bytes
        let expected_size = depth.byte_size(size)?;
        if self.compression == Compression::Rle && expected_size / 64 > compressed.len() {
            return Err(Error::rle("channel is larger than its compressed data allows"));
        }

        self.data = self.compression.decompress(&compressed, size, depth)?;
        Ok(())
    }
}

impl CompressedChannel {

    /// Compress the pixels of a channel with the specified size.
    /// Channels without pixels are stored as raw and empty.
    pub fn compress(channel: &Channel, size: Vec2<usize>, depth: BitDepth, compression: Compression) -> Result<Self> {
        if channel.data.is_empty() {
            return Ok(CompressedChannel { id: channel.id, compression: Compression::Raw, rle_row_lengths: None, bytes: Vec::new() });
        }

        let (bytes, rle_row_lengths) = compression.compress(&channel.data, size, depth)?;
        Ok(CompressedChannel { id: channel.id, compression, rle_row_lengths, bytes })
    }

    /// The length field of the layer record, including the compression code.
    pub fn stored_length(&self, large_document: bool) -> usize {
        let table = self.rle_row_lengths.as_ref().map_or(0, |lengths| lengths.byte_size(large_document));
        2 + table + self.bytes.len()
    }

    pub fn write(&self, write: &mut impl Write, large_document: bool) -> UnitResult {
        self.compression.write(write)?;

        if let Some(lengths) = &self.rle_row_lengths {
            lengths.write(write, large_document)?;
        }

        u8::write_slice(write, &self.bytes)
    }
}


impl Layer {

    /// A visible layer with normal blending, full opacity, and no channels.
    pub fn new(name: impl Into<String>, rect: Rect) -> Self {
        Layer {
            name: name.into(),
            rect,
            channels: SmallVec::new(),
            blend_mode: FourCc(*b"norm"),
            opacity: 255,
            clipping: false,
            flags: LayerFlags::default(),
            masks: MaskInfo::default(),
            blending_ranges: Vec::new(),
            additional_info: Vec::new(),
        }
    }

    pub fn visible(&self) -> bool { self.flags.visible() }

    /// The channel with the specified id.
    pub fn channel(&self, id: i16) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.id == id)
    }

    /// The transparency channel, if any.
    pub fn alpha_channel(&self) -> Option<&Channel> {
        self.channel(Channel::ALPHA)
    }

    /// The group marker of this layer, if any.
    pub fn section(&self) -> Option<&SectionInfo> {
        self.additional_info.iter().find_map(|info| match info {
            LayerInfo::Section(section) => Some(section),
            _ => None,
        })
    }

    /// The kind of the group marker, or `Layer` if there is none.
    pub fn section_kind(&self) -> SectionKind {
        self.section().map_or(SectionKind::Layer, |section| section.kind)
    }

    /// The `lyid` of this layer.
    pub fn layer_id(&self) -> Option<i32> {
        self.additional_info.iter().find_map(|info| match info {
            LayerInfo::LayerId(id) => Some(*id),
            _ => None,
        })
    }

    /// The rectangle of the pixels of the channel.
    /// Mask channels use the rectangle of their mask.
    pub fn channel_rect(&self, id: i16) -> Result<Rect> {
        let mask = match id {
            Channel::LAYER_MASK => &self.masks.layer_mask,
            Channel::USER_MASK => &self.masks.user_mask,
            _ => return Ok(self.rect),
        };

        mask.map(|mask| mask.rect)
            .ok_or_else(|| Error::invalid("mask channel without mask"))
    }

    /// Read the record, but not the pixels.
    pub(crate) fn read<R: Read + Seek>(read: &mut Tracking<R>, large_document: bool, context: &Context<'_>) -> Result<Self> {
        context.begin(read.byte_position(), "Layer");

        let rect = Rect::read(read)?;
        rect.validate()?;

        let channel_count = u16::read(read)? as usize;
        let mut channels = Channels::new();

        for _ in 0 .. channel_count {
            let id = i16::read(read)?;

            let stored_length = if large_document {
                i64_to_usize(i64::read(read)?, "negative channel length")? as u64
            } else {
                u64::from(u32::read(read)?)
            };

            let mut channel = Channel::new(id, Vec::new());
            channel.stored_length = stored_length;
            channels.push(channel);
        }

        if FourCc::read(read)? != *b"8BIM" {
            return Err(Error::invalid("layer blend mode signature"));
        }

        let blend_mode = FourCc::read(read)?;
        let opacity = u8::read(read)?;
        let clipping = read_bool(read)?;
        let flags = LayerFlags(u8::read(read)?);
        let _filler = u8::read(read)?;

        let extra_length = u32::read(read)? as usize;
        let extra_end = read.byte_position() + extra_length;

        let masks = MaskInfo::read(read, context)?;

        let blending_ranges_length = i32::read(read)?;
        let blending_ranges = if blending_ranges_length > 0 { read_bytes(read, blending_ranges_length as usize)? } else { Vec::new() };

        let mut name = read_pascal_string(read, 4)?;

        let additional_info = LayerInfo::read_all(
            read, extra_end, false, large_document, context,
            &mut |_, _| Err(Error::invalid("nested layer list inside a layer record"))
        )?;

        if let Some(unicode_name) = additional_info.iter().find_map(|info| match info {
            LayerInfo::UnicodeName(name) => Some(name), _ => None
        }) {
            name = unicode_name.clone();
        }

        context.end(read.byte_position(), format_args!("Layer, {}", name));

        Ok(Layer {
            name, rect, channels, blend_mode, opacity, clipping,
            flags, masks, blending_ranges, additional_info,
        })
    }

    /// Read the compressed pixels of all channels, which follow all layer records.
    pub(crate) fn read_pixel_data<R: Read + Seek>(&mut self, read: &mut Tracking<R>, large_document: bool, context: &Context<'_>) -> UnitResult {
        context.begin(read.byte_position(), format_args!("Layer image, {}", self.name));

        for index in 0 .. self.channels.len() {
            let rows = self.channel_rect(self.channels[index].id)?.size().height();
            self.channels[index].read_pixel_data(read, rows, large_document, context)?;
        }

        context.end(read.byte_position(), format_args!("Layer image, {}", self.name));
        Ok(())
    }

    /// Compress every channel for writing.
    pub(crate) fn compress_channels(&self, depth: BitDepth, compression: Compression) -> Result<Vec<CompressedChannel>> {
        self.channels.iter()
            .map(|channel| {
                let size = self.channel_rect(channel.id)?.size();
                CompressedChannel::compress(channel, size, depth, compression)
            })
            .collect()
    }

    /// The additional info as written: a single `luni` block that matches the name.
    fn info_for_saving(&self) -> Result<Vec<LayerInfo>> {
        let unicode_name_count = self.additional_info.iter()
            .filter(|info| matches!(info, LayerInfo::UnicodeName(_)))
            .count();

        if unicode_name_count > 1 {
            return Err(Error::invalid("layer has more than one unicode name"));
        }

        let mut infos = self.additional_info.clone();
        let unicode_name = LayerInfo::UnicodeName(self.name.clone());

        match infos.iter_mut().find(|info| matches!(info, LayerInfo::UnicodeName(_))) {
            Some(existing) => *existing = unicode_name,
            None => infos.push(unicode_name),
        }

        Ok(infos)
    }

    /// Write the record, with the channel lengths of the already compressed channels.
    pub(crate) fn write<W: Write + Seek>(
        &self, write: &mut Tracking<W>, channels: &[CompressedChannel],
        large_document: bool, context: &Context<'_>
    ) -> UnitResult
    {
        context.begin(write.byte_position(), format_args!("Layer, {}", self.name));

        self.rect.write(write)?;
        usize_to_i16(channels.len(), "too many channels in layer")?.write(write)?;

        for channel in channels {
            channel.id.write(write)?;

            let length = channel.stored_length(large_document);
            if large_document { (length as u64).write(write)?; }
            else { crate::error::usize_to_u32(length, "channel too large for a standard document")?.write(write)?; }
        }

        FourCc(*b"8BIM").write(write)?;
        self.blend_mode.write(write)?;
        self.opacity.write(write)?;
        write_bool(write, self.clipping)?;
        self.flags.0.write(write)?;
        0_u8.write(write)?;

        let infos = self.info_for_saving()?;

        write_length_block(write, false, |write| {
            self.masks.write(write)?;

            crate::error::usize_to_u32(self.blending_ranges.len(), "blending ranges too large")?.write(write)?;
            u8::write_slice(write, &self.blending_ranges)?;

            write_pascal_string(write, &self.name, 4)?;

            for info in &infos {
                info.write(write, false, large_document, context,
                    &mut |_, _| Err(Error::invalid("nested layer list inside a layer record")))?;
            }

            Ok(())
        })?;

        context.end(write.byte_position(), format_args!("Layer, {}", self.name));
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn layer_with_pixels() -> Layer {
        let mut layer = Layer::new("Ebene", Rect::from_position_size(3, 4, 2, 2));
        layer.channels.push(Channel::new(Channel::ALPHA, vec![ 255, 255, 0, 0 ]));
        layer.channels.push(Channel::new(0, vec![ 10, 20, 30, 40 ]));
        layer.channels.push(Channel::new(Channel::LAYER_MASK, vec![ 7 ]));
        layer.masks.layer_mask = Some(Mask { rect: Rect::from_position_size(3, 4, 1, 1), default_color: 255, flags: MaskFlags(1) });
        layer.additional_info.push(LayerInfo::LayerId(9));
        layer
    }

    fn round_trip(layer: &Layer, compression: Compression, large: bool) -> Layer {
        let context = Context::default();
        let compressed = layer.compress_channels(BitDepth::Eight, compression).unwrap();

        let mut write = Tracking::new(Cursor::new(Vec::new()));
        layer.write(&mut write, &compressed, large, &context).unwrap();
        for channel in &compressed { channel.write(&mut write, large).unwrap(); }

        let bytes = write.into_inner().into_inner();
        let mut read = Tracking::new(Cursor::new(bytes));
        let mut read_layer = Layer::read(&mut read, large, &context).unwrap();
        read_layer.read_pixel_data(&mut read, large, &context).unwrap();

        for channel in read_layer.channels.iter_mut() {
            let size = layer.channel_rect(channel.id).unwrap().size();
            channel.decompress(size, BitDepth::Eight).unwrap();
        }

        read_layer
    }

    #[test]
    fn record_and_pixels_survive(){
        let layer = layer_with_pixels();

        for &compression in &[ Compression::Raw, Compression::Rle, Compression::Zip, Compression::ZipPrediction ] {
            for &large in &[ false, true ] {
                let read = round_trip(&layer, compression, large);
                assert_eq!(read.name, "Ebene");
                assert_eq!(read.rect, layer.rect);
                assert_eq!(read.masks, layer.masks);
                assert_eq!(read.layer_id(), Some(9));
                assert_eq!(read.channel(0).unwrap().data, vec![ 10, 20, 30, 40 ]);
                assert_eq!(read.channel(Channel::LAYER_MASK).unwrap().data, vec![ 7 ]);
                assert_eq!(read.channel(Channel::ALPHA).unwrap().compression, compression);
            }
        }
    }

    #[test]
    fn unicode_name_overrides_pascal_name(){
        let mut layer = layer_with_pixels();
        layer.name = "Größe".to_string();
        layer.additional_info.push(LayerInfo::UnicodeName("old".into()));

        let read = round_trip(&layer, Compression::Rle, false);
        assert_eq!(read.name, "Größe");

        let unicode_names: Vec<_> = read.additional_info.iter()
            .filter(|info| matches!(info, LayerInfo::UnicodeName(_))).collect();

        assert_eq!(unicode_names.len(), 1);
    }

    #[test]
    fn two_unicode_names_are_invalid(){
        let mut layer = layer_with_pixels();
        layer.additional_info.push(LayerInfo::UnicodeName("a".into()));
        layer.additional_info.push(LayerInfo::UnicodeName("b".into()));

        let mut write = Tracking::new(Cursor::new(Vec::new()));
        let compressed = layer.compress_channels(BitDepth::Eight, Compression::Raw).unwrap();
        assert!(matches!(layer.write(&mut write, &compressed, false, &Context::default()), Err(Error::Invalid(_))));
    }

    #[test]
    fn flags(){
        let mut flags = LayerFlags(0b1001);
        assert!(flags.visible());
        assert!(flags.transparency_protected());
        flags.set_visible(false);
        assert_eq!(flags.0, 0b1011);

        let mask = Mask { rect: Rect::from_position_size(12, 14, 4, 4), default_color: 0, flags: MaskFlags(0) };
        assert_eq!(mask.offset_in_layer(&Rect::from_position_size(10, 10, 8, 8)), Vec2(2, 4));
    }

    #[test]
    fn both_masks_survive(){
        let mut layer = layer_with_pixels();
        layer.masks.user_mask = Some(Mask { rect: Rect::from_position_size(0, 0, 2, 1), default_color: 0, flags: MaskFlags(0b100) });
        layer.channels.push(Channel::new(Channel::USER_MASK, vec![ 1, 2 ]));

        let read = round_trip(&layer, Compression::Rle, false);
        assert_eq!(read.masks, layer.masks);
        assert_eq!(read.channel(Channel::USER_MASK).unwrap().data, vec![ 1, 2 ]);
    }
}
