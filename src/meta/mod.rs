
//! Describes the document as a whole:
//! the file header, and the codecs for the tagged blocks
//! that carry metadata, such as image resources and additional layer info.

pub mod resource;
pub mod descriptor;
pub mod engine_data;
pub mod layer_info;

use crate::io::*;
use crate::error::{Result, UnitResult, Error};
use crate::math::Vec2;


/// Whether this is a standard document or a large document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Version {

    /// A `.psd` file, limited to 30000 pixels per side.
    Psd,

    /// A `.psb` file, limited to 300000 pixels per side.
    /// Some lengths in this format have 8 bytes instead of 4.
    Psb,
}

impl Version {

    /// Choose the smallest version that can store the specified dimensions.
    pub fn for_size(width: usize, height: usize) -> Self {
        if width > Version::Psd.max_dimension() || height > Version::Psd.max_dimension() { Version::Psb }
        else { Version::Psd }
    }

    /// The maximum number of rows and columns.
    pub fn max_dimension(self) -> usize {
        match self {
            Version::Psd => 30_000,
            Version::Psb => 300_000,
        }
    }

    /// Whether some lengths are stored with 8 bytes.
    pub fn is_large_document(self) -> bool {
        self == Version::Psb
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        match i16::read(read)? {
            1 => Ok(Version::Psd),
            2 => Ok(Version::Psb),
            _ => Err(Error::invalid("file version")),
        }
    }

    fn write(self, write: &mut impl Write) -> UnitResult {
        let code: i16 = match self { Version::Psd => 1, Version::Psb => 2 };
        code.write(write)
    }
}


/// Number of bits per channel sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitDepth {

    /// Bitmap images only. Eight pixels per byte, most significant bit first.
    One,

    /// One byte per sample.
    Eight,

    /// Two big-endian bytes per sample.
    Sixteen,

    /// A big-endian `f32` per sample.
    ThirtyTwo,
}

impl BitDepth {

    /// Number of bits per sample.
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::One => 1,
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// Interpret the bit count stored in the header.
    pub fn from_bits(bits: i16) -> Result<Self> {
        Ok(match bits {
            1 => BitDepth::One,
            8 => BitDepth::Eight,
            16 => BitDepth::Sixteen,
            32 => BitDepth::ThirtyTwo,
            _ => return Err(Error::invalid("bit depth")),
        })
    }

    /// Number of bytes per sample. One-bit samples are counted as one byte.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::One | BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
            BitDepth::ThirtyTwo => 4,
        }
    }

    /// Number of bytes a row of the specified width occupies.
    /// One-bit rows are padded to full bytes.
    pub fn bytes_per_row(self, width: usize) -> usize {
        match self {
            BitDepth::One => (width + 7) / 8,
            other => width * other.bytes_per_sample(),
        }
    }

    /// Number of bytes a channel of the specified size occupies.
    /// Returns an error if the size cannot be addressed.
    pub fn byte_size(self, size: Vec2<usize>) -> Result<usize> {
        self.bytes_per_row(size.width()).checked_mul(size.height())
            .ok_or_else(|| Error::invalid("channel size"))
    }
}


/// How the channels of the document are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Bitmap,
    Grayscale,
    Indexed,
    Rgb,
    Cmyk,
    Multichannel,
    Duotone,
    Lab,
}

impl ColorMode {

    /// Interpret the code stored in the header.
    pub fn from_code(code: i16) -> Result<Self> {
        Ok(match code {
            0 => ColorMode::Bitmap,
            1 => ColorMode::Grayscale,
            2 => ColorMode::Indexed,
            3 => ColorMode::Rgb,
            4 => ColorMode::Cmyk,
            7 => ColorMode::Multichannel,
            8 => ColorMode::Duotone,
            9 => ColorMode::Lab,
            _ => return Err(Error::invalid("color mode")),
        })
    }

    /// The code stored in the header.
    pub fn code(self) -> i16 {
        match self {
            ColorMode::Bitmap => 0,
            ColorMode::Grayscale => 1,
            ColorMode::Indexed => 2,
            ColorMode::Rgb => 3,
            ColorMode::Cmyk => 4,
            ColorMode::Multichannel => 7,
            ColorMode::Duotone => 8,
            ColorMode::Lab => 9,
        }
    }

    /// The number of color channels, excluding alpha.
    pub fn min_channel_count(self) -> usize {
        match self {
            ColorMode::Bitmap | ColorMode::Duotone | ColorMode::Grayscale
                | ColorMode::Indexed | ColorMode::Multichannel => 1,

            ColorMode::Lab | ColorMode::Rgb => 3,
            ColorMode::Cmyk => 4,
        }
    }
}


/// The fixed-size header at the start of every file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    channel_count: usize,
    height: usize,
    width: usize,
    pub bit_depth: BitDepth,
    pub color_mode: ColorMode,
}

/// The first four bytes of each psd and psb file.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each psd and psb file.
    pub const BYTES: [u8; 4] = *b"8BPS";

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> Result<()> {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be a psd file.
    pub fn is_psd(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate this image. If it is a psd file, return `Ok(())`.
    pub fn validate_psd(read: &mut impl Read) -> UnitResult {
        if self::is_psd(read)? {
            Ok(())

        } else {
            Err(Error::invalid("file signature missing"))
        }
    }
}

impl Header {

    /// The number of channels may range from 1 to this value.
    pub const MAX_CHANNEL_COUNT: usize = 56;

    /// Create a validated header.
    pub fn new(version: Version, size: Vec2<usize>, channel_count: usize, bit_depth: BitDepth, color_mode: ColorMode) -> Result<Self> {
        let mut header = Header { version, channel_count: 1, width: 1, height: 1, bit_depth, color_mode };
        header.set_channel_count(channel_count)?;
        header.set_size(size)?;
        Ok(header)
    }

    /// Number of channels in the composite image, including alpha.
    pub fn channel_count(&self) -> usize { self.channel_count }

    /// Number of pixel rows.
    pub fn height(&self) -> usize { self.height }

    /// Number of pixel columns.
    pub fn width(&self) -> usize { self.width }

    /// Width and height.
    pub fn size(&self) -> Vec2<usize> { Vec2(self.width, self.height) }

    /// Whether lengths in this document may have 8 bytes.
    pub fn is_large_document(&self) -> bool { self.version.is_large_document() }

    /// Change the number of channels, which must be between 1 and 56.
    pub fn set_channel_count(&mut self, channel_count: usize) -> UnitResult {
        if channel_count < 1 || channel_count > Self::MAX_CHANNEL_COUNT {
            return Err(Error::invalid("channel count"));
        }

        self.channel_count = channel_count;
        Ok(())
    }

    /// Change the dimensions, which must be between 1 and the version-specific maximum.
    pub fn set_size(&mut self, size: Vec2<usize>) -> UnitResult {
        Self::validate_dimension(size.width(), self.version, "column count")?;
        Self::validate_dimension(size.height(), self.version, "row count")?;
        self.width = size.width();
        self.height = size.height();
        Ok(())
    }

    fn validate_dimension(value: usize, version: Version, message: &'static str) -> UnitResult {
        if value < 1 || value > version.max_dimension() { Err(Error::invalid(message)) }
        else { Ok(()) }
    }

    /// Read the signature and the header fields.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        magic_number::validate_psd(read)?;
        let version = Version::read(read)?;

        let mut reserved = [0_u8; 6];
        u8::read_slice(read, &mut reserved)?;

        let channel_count = i16::read(read)?;
        let height = i32::read(read)?;
        let width = i32::read(read)?;
        let bit_depth = BitDepth::from_bits(i16::read(read)?)?;
        let color_mode = ColorMode::from_code(i16::read(read)?)?;

        let channel_count = usize::try_from(channel_count).map_err(|_| Error::invalid("channel count"))?;
        let height = usize::try_from(height).map_err(|_| Error::invalid("row count"))?;
        let width = usize::try_from(width).map_err(|_| Error::invalid("column count"))?;

        Self::new(version, Vec2(width, height), channel_count, bit_depth, color_mode)
    }

    /// Write the signature and the header fields.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        magic_number::write(write)?;
        self.version.write(write)?;
        u8::write_slice(write, &[0; 6])?;

        (self.channel_count as i16).write(write)?;
        (self.height as i32).write(write)?;
        (self.width as i32).write(write)?;
        (self.bit_depth.bits() as i16).write(write)?;
        self.color_mode.code().write(write)
    }

    /// Number of bytes the header occupies.
    pub fn byte_size() -> usize {
        4 + 2 + 6 + 2 + 4 + 4 + 2 + 2
    }
}

use std::convert::TryFrom;


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_round_trip(){
        let header = Header::new(Version::Psb, Vec2(40_000, 3), 4, BitDepth::Sixteen, ColorMode::Rgb).unwrap();

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), Header::byte_size());
        assert_eq!(&bytes[.. 6], b"8BPS\0\x02");

        assert_eq!(Header::read(&mut bytes.as_slice()).unwrap(), header);
    }

    #[test]
    fn bad_signature(){
        let mut bytes = Vec::new();
        Header::new(Version::Psd, Vec2(1, 1), 1, BitDepth::Eight, ColorMode::Grayscale).unwrap()
            .write(&mut bytes).unwrap();

        bytes[0] = b'9';
        assert!(matches!(Header::read(&mut bytes.as_slice()), Err(Error::Invalid(_))));
    }

    #[test]
    fn unknown_version(){
        let mut bytes = Vec::new();
        Header::new(Version::Psd, Vec2(1, 1), 1, BitDepth::Eight, ColorMode::Grayscale).unwrap()
            .write(&mut bytes).unwrap();

        bytes[5] = 3;
        assert!(Header::read(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn dimension_limits_depend_on_version(){
        assert!(Header::new(Version::Psd, Vec2(30_001, 1), 3, BitDepth::Eight, ColorMode::Rgb).is_err());
        assert!(Header::new(Version::Psb, Vec2(30_001, 1), 3, BitDepth::Eight, ColorMode::Rgb).is_ok());
        assert!(Header::new(Version::Psb, Vec2(1, 300_001), 3, BitDepth::Eight, ColorMode::Rgb).is_err());
        assert!(Header::new(Version::Psd, Vec2(0, 1), 3, BitDepth::Eight, ColorMode::Rgb).is_err());
    }

    #[test]
    fn channel_count_limits(){
        let mut header = Header::new(Version::Psd, Vec2(1, 1), 1, BitDepth::Eight, ColorMode::Rgb).unwrap();
        assert!(header.set_channel_count(0).is_err());
        assert!(header.set_channel_count(57).is_err());
        assert!(header.set_channel_count(56).is_ok());
    }

    #[test]
    fn bytes_per_row(){
        assert_eq!(BitDepth::One.bytes_per_row(9), 2);
        assert_eq!(BitDepth::One.bytes_per_row(8), 1);
        assert_eq!(BitDepth::Sixteen.bytes_per_row(3), 6);
        assert_eq!(BitDepth::ThirtyTwo.bytes_per_row(3), 12);
        assert_eq!(BitDepth::Sixteen.byte_size(Vec2(3, 2)).unwrap(), 12);
        assert!(BitDepth::ThirtyTwo.byte_size(Vec2(1 << 31, 1 << 31)).is_err());
        assert_eq!(Version::for_size(30_001, 10), Version::Psb);
        assert_eq!(Version::for_size(30_000, 30_000), Version::Psd);
    }
}
