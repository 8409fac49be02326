
//! Contains the compression attribute definition
//! and methods to compress and decompress channel data.


pub mod rle;
mod zip;

pub use rle::RleRowLengths;

use crate::error::{Result, Error};
use crate::io::{Data, Read, Write};
use crate::meta::BitDepth;
use crate::math::Vec2;


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// Specifies how the pixels of a channel are stored.
/// Photoshop itself writes RLE almost exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Raw,

    /// PackBits run-length coding of each row.
    /// Each channel is preceded by a table of the compressed row lengths.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    Rle,

    /// Deflate compression of the whole channel, in a zlib container.
    Zip,

    /// Like `Zip`, but each row is delta-coded before compression.
    /// For 32-bit channels, the bytes of each row are also split into byte planes.
    ZipPrediction,
}

impl Default for Compression {
    fn default() -> Self { Compression::Rle }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Raw => "no",
            Compression::Rle => "rle",
            Compression::Zip => "zip",
            Compression::ZipPrediction => "zip with prediction",
        })
    }
}

impl Compression {

    /// The code stored in the file.
    pub fn code(self) -> i16 {
        match self {
            Compression::Raw => 0,
            Compression::Rle => 1,
            Compression::Zip => 2,
            Compression::ZipPrediction => 3,
        }
    }

    /// Interpret a code stored in the file.
    pub fn from_code(code: i16) -> Result<Self> {
        Ok(match code {
            0 => Compression::Raw,
            1 => Compression::Rle,
            2 => Compression::Zip,
            3 => Compression::ZipPrediction,
            _ => return Err(Error::invalid("compression method")),
        })
    }

    /// Read the `i16` compression code.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Self::from_code(i16::read(read)?)
    }

    /// Write the `i16` compression code.
    pub fn write(self, write: &mut impl Write) -> Result<()> {
        self.code().write(write)
    }

    /// Decompress the pixels of one channel with the specified dimensions.
    /// The result has exactly `rows * bytes_per_row` bytes, in file byte order.
    pub fn decompress(self, compressed: Bytes<'_>, size: Vec2<usize>, depth: BitDepth) -> Result<ByteVec> {
        let expected_byte_size = depth.byte_size(size)?;

        match self {
            Compression::Raw => {
                if compressed.len() < expected_byte_size {
                    return Err(Error::invalid("raw channel data is shorter than the channel"));
                }

                Ok(compressed[.. expected_byte_size].to_vec())
            },

            Compression::Rle => rle::decompress_bytes(compressed, expected_byte_size),
            Compression::Zip => zip::decompress_bytes(compressed, expected_byte_size),

            Compression::ZipPrediction => {
                let mut decompressed = zip::decompress_bytes(compressed, expected_byte_size)?;
                zip::prediction_to_samples(&mut decompressed, size.width(), depth)?;
                Ok(decompressed)
            },
        }
    }

    /// Compress the pixels of one channel.
    /// Returns the compressed bytes, and the row length table for rle compression.
    pub fn compress(self, data: Bytes<'_>, size: Vec2<usize>, depth: BitDepth) -> Result<(ByteVec, Option<RleRowLengths>)> {
        let bytes_per_row = depth.bytes_per_row(size.width());

        if data.len() != bytes_per_row * size.height() {
            return Err(Error::invalid("channel data does not match the channel size"));
        }

        Ok(match self {
            Compression::Raw => (data.to_vec(), None),

            Compression::Rle => {
                let (compressed, lengths) = rle::compress_rows(data, bytes_per_row)?;
                (compressed, Some(lengths))
            },

            Compression::Zip => (zip::compress_bytes(data), None),

            Compression::ZipPrediction => {
                let mut predicted = data.to_vec();
                zip::samples_to_prediction(&mut predicted, size.width(), depth)?;
                (zip::compress_bytes(&predicted), None)
            },
        })
    }
}
