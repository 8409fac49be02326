
//! Image resource blocks, which follow the color mode data.
//! Only a handful of resources are decoded, all others are preserved as raw bytes.

use crate::io::*;
use crate::error::{Result, UnitResult, Error};
use crate::context::Context;


/// The numeric id of an image resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u16);

macro_rules! define_resource_ids {
    ( $( $name: ident = $value: literal ),* $(,)? ) => {
        #[allow(missing_docs)]
        impl ResourceId {
            $( pub const $name: ResourceId = ResourceId($value); )*

            /// The well-known name of this id, if any.
            pub fn known_name(self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some(stringify!($name)), )*
                    2000 ..= 2997 => Some("PATH_INFO"),
                    _ => None,
                }
            }
        }
    };
}

define_resource_ids! {
    MAC_PRINT_INFO = 1001,
    RESOLUTION_INFO = 1005,
    ALPHA_CHANNEL_NAMES = 1006,
    DISPLAY_INFO = 1007,
    CAPTION = 1008,
    BORDER_INFO = 1009,
    BACKGROUND_COLOR = 1010,
    PRINT_FLAGS = 1011,
    MULTICHANNEL_HALFTONE_INFO = 1012,
    COLOR_HALFTONE_INFO = 1013,
    DUOTONE_HALFTONE_INFO = 1014,
    MULTICHANNEL_TRANSFER_FUNCTIONS = 1015,
    COLOR_TRANSFER_FUNCTIONS = 1016,
    DUOTONE_TRANSFER_FUNCTIONS = 1017,
    DUOTONE_IMAGE_INFO = 1018,
    BLACK_WHITE_RANGE = 1019,
    EPS_OPTIONS = 1021,
    QUICK_MASK_INFO = 1022,
    LAYER_STATE_INFO = 1024,
    WORKING_PATH_UNSAVED = 1025,
    LAYERS_GROUP_INFO = 1026,
    IPTC_NAA = 1028,
    RAW_FORMAT_IMAGE_MODE = 1029,
    JPEG_QUALITY = 1030,
    GRID_GUIDES_INFO = 1032,
    THUMBNAIL_BGR = 1033,
    COPYRIGHT_INFO = 1034,
    URL = 1035,
    THUMBNAIL_RGB = 1036,
    GLOBAL_ANGLE = 1037,
    COLOR_SAMPLERS_OBSOLETE = 1038,
    ICC_PROFILE = 1039,
    WATERMARK = 1040,
    ICC_UNTAGGED = 1041,
    EFFECTS_VISIBLE = 1042,
    SPOT_HALFTONE = 1043,
    DOCUMENT_SPECIFIC = 1044,
    UNICODE_ALPHA_NAMES = 1045,
    INDEXED_COLOR_TABLE_COUNT = 1046,
    TRANSPARENT_INDEX = 1047,
    GLOBAL_ALTITUDE = 1049,
    SLICES = 1050,
    WORKFLOW_URL = 1051,
    JUMP_TO_XPEP = 1052,
    ALPHA_IDENTIFIERS = 1053,
    URL_LIST = 1054,
    VERSION_INFO = 1057,
    EXIF_DATA_1 = 1058,
    EXIF_DATA_3 = 1059,
    XMP_METADATA = 1060,
    CAPTION_DIGEST = 1061,
    PRINT_SCALE = 1062,
    PIXEL_ASPECT_RATIO = 1064,
    LAYER_COMPS = 1065,
    ALTERNATE_DUOTONE_COLORS = 1066,
    ALTERNATE_SPOT_COLORS = 1067,
    LAYER_SELECTION_IDS = 1069,
    HDR_TONING_INFO = 1070,
    PRINT_INFO = 1071,
    LAYER_GROUPS_ENABLED = 1072,
    COLOR_SAMPLERS = 1073,
    MEASUREMENT_SCALE = 1074,
    TIMELINE_INFO = 1075,
    SHEET_DISCLOSURE = 1076,
    FLOAT_DISPLAY_INFO = 1077,
    ONION_SKINS = 1078,
    COUNT_INFO = 1080,
    PRINT_SETTINGS_INFO = 1082,
    PRINT_STYLE = 1083,
    MAC_NS_PRINT_INFO = 1084,
    WIN_DEV_MODE = 1085,
    AUTO_SAVE_FILE_PATH = 1086,
    AUTO_SAVE_FORMAT = 1087,
    CLIPPING_PATH_NAME = 2999,
    LIGHTROOM_WORKFLOW = 8000,
    PRINT_FLAGS_INFO = 10000,
}

impl std::fmt::Debug for ResourceId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.known_name() {
            Some(name) => write!(formatter, "{}({})", name, self.0),
            None => write!(formatter, "ResourceId({})", self.0),
        }
    }
}


/// A single image resource block.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageResource {

    /// Usually `8BIM`.
    pub signature: FourCc,

    pub id: ResourceId,

    /// Almost always empty.
    pub name: String,

    pub data: ResourceData,
}

/// The decoded payload of an image resource.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceData {
    Resolution(ResolutionInfo),
    AlphaChannelNames(Vec<String>),
    UnicodeAlphaNames(Vec<String>),
    Thumbnail(Thumbnail),
    VersionInfo(VersionInfo),

    /// Any resource that is not decoded.
    Raw(Vec<u8>),
}

/// An unsigned fixed point number with 16 integer bits and 16 fraction bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Fixed16(pub u32);

impl Fixed16 {
    pub fn from_f64(value: f64) -> Self {
        Fixed16((value.max(0.0) * 65536.0).round().min(u32::MAX as f64) as u32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 65536.0
    }
}

/// How the resolution is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionUnit {
    PixelsPerInch,
    PixelsPerCentimeter,
    Other(i16),
}

/// How the width and height are displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayUnit {
    Inches,
    Centimeters,
    Points,
    Picas,
    Columns,
    Other(i16),
}

/// Resolution for both axes, resource 1005.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionInfo {
    pub horizontal_dpi: Fixed16,
    pub horizontal_unit: ResolutionUnit,
    pub width_unit: DisplayUnit,
    pub vertical_dpi: Fixed16,
    pub vertical_unit: ResolutionUnit,
    pub height_unit: DisplayUnit,
}

/// A preview image, resources 1033 and 1036.
#[derive(Clone, Debug, PartialEq)]
pub struct Thumbnail {

    /// Whether the pixels are jpeg-compressed.
    pub format: ThumbnailFormat,

    pub width: u32,
    pub height: u32,
    pub width_bytes: u32,
    pub total_size: u32,
    pub compressed_size: u32,
    pub bits_per_pixel: u16,
    pub planes: u16,

    /// The image bytes after the header. Jpeg data for `ThumbnailFormat::Jpeg`.
    pub data: Vec<u8>,
}

/// The pixel format of a thumbnail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThumbnailFormat { Raw, Jpeg }

/// Information about the application that wrote the file, resource 1057.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: u32,
    pub has_real_merged_data: bool,
    pub reader_name: String,
    pub writer_name: String,
    pub file_version: u32,
}

/// The resource blocks of a file, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceList {
    pub resources: Vec<ImageResource>,
}


/// Signatures that are accepted in front of a resource block.
const SIGNATURES: [[u8; 4]; 5] = [ *b"8BIM", *b"MeSa", *b"AgHg", *b"PHUT", *b"DCSR" ];


impl ResolutionUnit {
    fn from_code(code: i16) -> Self {
        match code {
            1 => ResolutionUnit::PixelsPerInch,
            2 => ResolutionUnit::PixelsPerCentimeter,
            other => ResolutionUnit::Other(other),
        }
    }

    fn code(self) -> i16 {
        match self {
            ResolutionUnit::PixelsPerInch => 1,
            ResolutionUnit::PixelsPerCentimeter => 2,
            ResolutionUnit::Other(other) => other,
        }
    }
}

impl DisplayUnit {
    fn from_code(code: i16) -> Self {
        match code {
            1 => DisplayUnit::Inches,
            2 => DisplayUnit::Centimeters,
            3 => DisplayUnit::Points,
            4 => DisplayUnit::Picas,
            5 => DisplayUnit::Columns,
            other => DisplayUnit::Other(other),
        }
    }

    fn code(self) -> i16 {
        match self {
            DisplayUnit::Inches => 1,
            DisplayUnit::Centimeters => 2,
            DisplayUnit::Points => 3,
            DisplayUnit::Picas => 4,
            DisplayUnit::Columns => 5,
            DisplayUnit::Other(other) => other,
        }
    }
}

impl ResolutionInfo {

    /// The same resolution on both axes, in pixels per inch.
    pub fn with_dpi(dpi: f64) -> Self {
        ResolutionInfo {
            horizontal_dpi: Fixed16::from_f64(dpi),
            horizontal_unit: ResolutionUnit::PixelsPerInch,
            width_unit: DisplayUnit::Inches,
            vertical_dpi: Fixed16::from_f64(dpi),
            vertical_unit: ResolutionUnit::PixelsPerInch,
            height_unit: DisplayUnit::Inches,
        }
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        Ok(ResolutionInfo {
            horizontal_dpi: Fixed16(u32::read(read)?),
            horizontal_unit: ResolutionUnit::from_code(i16::read(read)?),
            width_unit: DisplayUnit::from_code(i16::read(read)?),
            vertical_dpi: Fixed16(u32::read(read)?),
            vertical_unit: ResolutionUnit::from_code(i16::read(read)?),
            height_unit: DisplayUnit::from_code(i16::read(read)?),
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.horizontal_dpi.0.write(write)?;
        self.horizontal_unit.code().write(write)?;
        self.width_unit.code().write(write)?;
        self.vertical_dpi.0.write(write)?;
        self.vertical_unit.code().write(write)?;
        self.height_unit.code().write(write)
    }
}

impl Default for ResolutionInfo {
    fn default() -> Self { Self::with_dpi(72.0) }
}

impl Thumbnail {
    const HEADER_BYTE_SIZE: usize = 28;

    fn read(bytes: &[u8]) -> Result<Self> {
        let mut read = bytes;

        let format = match u32::read(&mut read)? {
            0 => ThumbnailFormat::Raw,
            1 => ThumbnailFormat::Jpeg,
            _ => return Err(Error::invalid("unknown thumbnail format")),
        };

        let thumbnail = Thumbnail {
            format,
            width: u32::read(&mut read)?,
            height: u32::read(&mut read)?,
            width_bytes: u32::read(&mut read)?,
            total_size: u32::read(&mut read)?,
            compressed_size: u32::read(&mut read)?,
            bits_per_pixel: u16::read(&mut read)?,
            planes: u16::read(&mut read)?,
            data: Vec::new(),
        };

        debug_assert_eq!(bytes.len() - read.len(), Self::HEADER_BYTE_SIZE);
        Ok(Thumbnail { data: read.to_vec(), .. thumbnail })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        let format: u32 = match self.format { ThumbnailFormat::Raw => 0, ThumbnailFormat::Jpeg => 1 };
        format.write(write)?;
        self.width.write(write)?;
        self.height.write(write)?;
        self.width_bytes.write(write)?;
        self.total_size.write(write)?;
        self.compressed_size.write(write)?;
        self.bits_per_pixel.write(write)?;
        self.planes.write(write)?;
        u8::write_slice(write, &self.data)
    }
}

impl VersionInfo {

    /// The version info that is attached to files written by this crate.
    pub fn of_this_crate() -> Self {
        VersionInfo {
            version: 1,
            has_real_merged_data: true,
            reader_name: env!("CARGO_PKG_NAME").to_string(),
            writer_name: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            file_version: 1,
        }
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        Ok(VersionInfo {
            version: u32::read(read)?,
            has_real_merged_data: read_bool(read)?,
            reader_name: read_unicode_string(read)?,
            writer_name: read_unicode_string(read)?,
            file_version: u32::read(read)?,
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.version.write(write)?;
        write_bool(write, self.has_real_merged_data)?;
        write_unicode_string(write, &self.reader_name)?;
        write_unicode_string(write, &self.writer_name)?;
        self.file_version.write(write)
    }
}


impl ResourceData {

    fn read(id: ResourceId, bytes: Vec<u8>) -> Result<Self> {
        let mut read = bytes.as_slice();

        Ok(match id {
            ResourceId::RESOLUTION_INFO => ResourceData::Resolution(ResolutionInfo::read(&mut read)?),
            ResourceId::THUMBNAIL_BGR | ResourceId::THUMBNAIL_RGB => ResourceData::Thumbnail(Thumbnail::read(read)?),
            ResourceId::VERSION_INFO => ResourceData::VersionInfo(VersionInfo::read(&mut read)?),

            ResourceId::ALPHA_CHANNEL_NAMES => {
                let mut read = Tracking::new(read);
                let mut names = Vec::new();

                while read.byte_position() < bytes.len() {
                    names.push(read_pascal_string(&mut read, 1)?);
                }

                ResourceData::AlphaChannelNames(names)
            },

            ResourceId::UNICODE_ALPHA_NAMES => {
                let mut names = Vec::new();

                while !read.is_empty() {
                    let name = read_unicode_string(&mut read)?;
                    names.push(name.trim_end_matches('\0').to_string());
                }

                ResourceData::UnicodeAlphaNames(names)
            },

            _ => ResourceData::Raw(bytes),
        })
    }

    fn write<W: Write>(&self, write: &mut Tracking<W>) -> UnitResult {
        match self {
            ResourceData::Resolution(info) => info.write(write),
            ResourceData::Thumbnail(thumbnail) => thumbnail.write(write),
            ResourceData::VersionInfo(info) => info.write(write),
            ResourceData::Raw(bytes) => u8::write_slice(write, bytes),

            ResourceData::AlphaChannelNames(names) => {
                for name in names { write_pascal_string(write, name, 1)?; }
                Ok(())
            },

            ResourceData::UnicodeAlphaNames(names) => {
                for name in names {
                    let mut terminated = name.clone();
                    terminated.push('\0');
                    write_unicode_string(write, &terminated)?;
                }

                Ok(())
            },
        }
    }
}


impl ImageResource {

    /// Create a resource with the `8BIM` signature and an empty name.
    pub fn new(id: ResourceId, data: ResourceData) -> Self {
        ImageResource { signature: FourCc(*b"8BIM"), id, name: String::new(), data }
    }

    /// Read one resource block, including the padding of its data.
    pub fn read<R: Read + Seek>(read: &mut Tracking<R>, context: &Context<'_>) -> Result<Self> {
        let signature = FourCc::read(read)?;
        if !SIGNATURES.contains(&signature.0) {
            return Err(Error::invalid(format!("image resource signature {:?}", signature)));
        }

        let id = ResourceId(u16::read(read)?);
        let name = read_pascal_string(read, 2)?;
        let data_length = u32::read(read)? as usize;
        context.begin(read.byte_position(), format_args!("ImageResource, {:?}", id));

        let end = read.byte_position() + round_up(data_length, 2);
        let bytes = u8::read_vec(read, data_length, SOFT_MAX_ALLOCATION, Some(MAX_BYTE_ARRAY_LENGTH))?;
        let data = ResourceData::read(id, bytes)?;

        context.finish_block(read, end, "image resource")?;
        context.end(read.byte_position(), format_args!("ImageResource, {:?}", id));

        Ok(ImageResource { signature, id, name, data })
    }

    /// Write the block, with a back-patched data length and even padding.
    pub fn write<W: Write + Seek>(&self, write: &mut Tracking<W>, context: &Context<'_>) -> UnitResult {
        context.begin(write.byte_position(), format_args!("ImageResource, {:?}", self.id));

        self.signature.write(write)?;
        self.id.0.write(write)?;
        write_pascal_string(write, &self.name, 2)?;

        let start = write.byte_position();
        write_length_block(write, false, |write| self.data.write(write))?;
        write_padding(write, start, 2)?;

        context.end(write.byte_position(), format_args!("ImageResource, {:?}", self.id));
        Ok(())
    }
}


impl ResourceList {

    /// The first resource with that id.
    pub fn get(&self, id: ResourceId) -> Option<&ImageResource> {
        self.resources.iter().find(|resource| resource.id == id)
    }

    /// Insert the resource in place of the first resource with the same id,
    /// removing all other resources with that id. Appends if there is none.
    pub fn set(&mut self, resource: ImageResource) {
        match self.resources.iter().position(|existing| existing.id == resource.id) {
            None => self.resources.push(resource),

            Some(first_index) => {
                let id = resource.id;
                self.resources[first_index] = resource;

                let mut index = 0;
                self.resources.retain(|existing| {
                    let keep = existing.id != id || index == first_index;
                    index += 1;
                    keep
                });
            },
        }
    }

    /// The decoded resolution, if present.
    pub fn resolution(&self) -> Option<&ResolutionInfo> {
        match &self.get(ResourceId::RESOLUTION_INFO)?.data {
            ResourceData::Resolution(info) => Some(info),
            _ => None,
        }
    }

    /// The pascal string names of the alpha channels, if present.
    pub fn alpha_channel_names(&self) -> Option<&[String]> {
        match &self.get(ResourceId::ALPHA_CHANNEL_NAMES)?.data {
            ResourceData::AlphaChannelNames(names) => Some(names),
            _ => None,
        }
    }

    /// The unicode names of the alpha channels, if present.
    pub fn unicode_alpha_names(&self) -> Option<&[String]> {
        match &self.get(ResourceId::UNICODE_ALPHA_NAMES)?.data {
            ResourceData::UnicodeAlphaNames(names) => Some(names),
            _ => None,
        }
    }

    /// Generate version info, unless the file already has one.
    pub fn ensure_version_info(&mut self) {
        if self.get(ResourceId::VERSION_INFO).is_none() {
            self.set(ImageResource::new(
                ResourceId::VERSION_INFO,
                ResourceData::VersionInfo(VersionInfo::of_this_crate())
            ));
        }
    }

    /// Read the whole section, including its `u32` length.
    pub fn read<R: Read + Seek>(read: &mut Tracking<R>, context: &Context<'_>) -> Result<Self> {
        context.begin(read.byte_position(), "ImageResources");

        let length = u32::read(read)? as usize;
        let end = read.byte_position() + length;
        let mut resources = Vec::new();

        while read.byte_position() < end {
            resources.push(ImageResource::read(read, context)?);
        }

        context.finish_block(read, end, "image resources")?;
        context.end(read.byte_position(), "ImageResources");
        Ok(ResourceList { resources })
    }

    /// Write the whole section, including its `u32` length.
    pub fn write<W: Write + Seek>(&self, write: &mut Tracking<W>, context: &Context<'_>) -> UnitResult {
        context.begin(write.byte_position(), "ImageResources");

        write_length_block(write, false, |write| {
            for resource in &self.resources { resource.write(write, context)?; }
            Ok(())
        })?;

        context.end(write.byte_position(), "ImageResources");
        Ok(())
    }

}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn round_trip(list: &ResourceList) -> ResourceList {
        let context = Context::default();
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        list.write(&mut write, &context).unwrap();

        let bytes = write.into_inner().into_inner();
        let mut read = Tracking::new(Cursor::new(bytes));
        ResourceList::read(&mut read, &context).unwrap()
    }

    #[test]
    fn decoded_resources_survive(){
        let mut list = ResourceList::default();
        list.set(ImageResource::new(ResourceId::RESOLUTION_INFO, ResourceData::Resolution(ResolutionInfo::with_dpi(300.0))));
        list.set(ImageResource::new(ResourceId::ALPHA_CHANNEL_NAMES, ResourceData::AlphaChannelNames(vec![ "Alpha 1".into(), "Spot".into() ])));
        list.set(ImageResource::new(ResourceId::UNICODE_ALPHA_NAMES, ResourceData::UnicodeAlphaNames(vec![ "Ä".into() ])));
        list.set(ImageResource::new(ResourceId(4000), ResourceData::Raw(vec![ 1, 2, 3 ])));
        list.ensure_version_info();

        let read = round_trip(&list);
        assert_eq!(read, list);
        assert_eq!(read.resolution().unwrap().horizontal_dpi.to_f64(), 300.0);
        assert_eq!(read.unicode_alpha_names().unwrap(), &[ "Ä".to_string() ]);
    }

    #[test]
    fn odd_data_is_padded(){
        let resource = ImageResource::new(ResourceId(4000), ResourceData::Raw(vec![ 9 ]));
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        resource.write(&mut write, &Context::default()).unwrap();

        let bytes = write.into_inner().into_inner();
        // signature, id, empty name padded to 2, length, data, padding
        assert_eq!(bytes.len(), 4 + 2 + 2 + 4 + 1 + 1);
        assert_eq!(&bytes[8 .. 12], &[ 0, 0, 0, 1 ]);
    }

    #[test]
    fn set_replaces_duplicates(){
        let mut list = ResourceList::default();
        list.resources.push(ImageResource::new(ResourceId(1), ResourceData::Raw(vec![ 1 ])));
        list.resources.push(ImageResource::new(ResourceId(7), ResourceData::Raw(vec![ 7 ])));
        list.resources.push(ImageResource::new(ResourceId(1), ResourceData::Raw(vec![ 2 ])));

        list.set(ImageResource::new(ResourceId(1), ResourceData::Raw(vec![ 3 ])));
        assert_eq!(list.resources.len(), 2);
        assert_eq!(list.resources[0].data, ResourceData::Raw(vec![ 3 ]));
        assert_eq!(list.resources[1].id, ResourceId(7));
    }

    #[test]
    fn unknown_signature_is_invalid(){
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&[ 0, 1, 0, 0, 0, 0, 0, 0 ]);
        let mut read = Tracking::new(Cursor::new(bytes));
        assert!(matches!(ImageResource::read(&mut read, &Context::default()), Err(Error::Invalid(_))));
    }

    #[test]
    fn unknown_thumbnail_format_is_invalid(){
        let mut bytes = vec![ 0_u8; 28 ];
        bytes[3] = 2;
        assert!(Thumbnail::read(&bytes).is_err());

        bytes[3] = 1;
        bytes.extend_from_slice(&[ 0xff, 0xd8 ]);
        let thumbnail = Thumbnail::read(&bytes).unwrap();
        assert_eq!(thumbnail.format, ThumbnailFormat::Jpeg);
        assert_eq!(thumbnail.data, vec![ 0xff, 0xd8 ]);
    }

    #[test]
    fn fixed_point(){
        assert_eq!(Fixed16::from_f64(72.0).0, 72 << 16);
        assert_eq!(Fixed16(0x0001_8000).to_f64(), 1.5);
    }
}
