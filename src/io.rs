
//! Specialized binary input and output.
//! Every multi-byte value in a psd file is big-endian, regardless of the host.
//! Uses the error handling for this crate.

pub use ::std::io::{Read, Write, Seek, SeekFrom};
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult, IoResult, usize_to_i32, i32_to_usize};
use std::fmt;
use std::convert::TryFrom;


/// Photoshop refuses byte arrays longer than this.
pub const MAX_BYTE_ARRAY_LENGTH: usize = 0x7fff_ffc7;

/// Never allocate more than this at once before the bytes have actually arrived.
pub(crate) const SOFT_MAX_ALLOCATION: usize = 1 << 20;


/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: usize) -> IoResult<()> {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count as u64),
        &mut std::io::sink()
    )?;

    if skipped < count as u64 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "cannot skip past the end"));
    }

    Ok(())
}


/// Keep track of what byte we are at.
/// Used to skip back to a previous place after writing some information,
/// and to compare the consumed bytes of a section against its declared length.
#[derive(Debug)]
pub struct Tracking<T> {

    /// Do not expose to prevent seeking without updating position
    inner: T,

    position: usize,

    /// The largest position ever written to.
    /// Seeking forward up to here must not overwrite the bytes.
    written_end: usize,
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        self.written_end = self.written_end.max(self.position);
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T> Tracking<T> {

    /// If `inner` is a reference, if must never be seeked directly,
    /// but only through this `Tracking` instance.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0, written_end: 0 }
    }

    /// Current number of bytes written or read.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Give up tracking and return the wrapped stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Set the reader to the specified byte position.
    /// If it is only a couple of bytes, no seek system call is performed.
    pub fn seek_read_to(&mut self, target_position: usize) -> std::io::Result<()> {
        let delta = target_position as i64 - self.position as i64;

        if delta > 0 && delta < 16 {
            skip_bytes(&mut self.inner, delta as usize)?;
            self.position += delta as usize;
        }
        else if delta != 0 {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }

    /// Number of bytes from the current position to the end of the stream.
    /// Does not move the reading cursor.
    pub fn remaining_bytes(&mut self) -> std::io::Result<usize> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.position as u64))?;
        Ok((end as usize).saturating_sub(self.position))
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the writing cursor to the specified target byte index.
    /// Bytes that were already written are never touched.
    /// If seeking past the end of the written bytes, this will write zeroes.
    pub fn seek_write_to(&mut self, target_position: usize) -> std::io::Result<()> {
        if target_position <= self.written_end {
            if target_position != self.position {
                self.inner.seek(SeekFrom::Start(target_position as u64))?;
            }
        }
        else {
            if self.position != self.written_end {
                self.inner.seek(SeekFrom::Start(self.written_end as u64))?;
            }

            std::io::copy(
                &mut std::io::repeat(0).take((target_position - self.written_end) as u64),
                &mut self.inner
            )?;

            self.written_end = target_position;
        }

        self.position = target_position;
        Ok(())
    }
}


/// Generic trait that defines common binary operations such as reading and writing for this type.
pub trait Data: Sized + Default + Clone {
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of type `Self`.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice.
    /// If the slice cannot be filled completely, returns `Error::Invalid`.
    fn read_slice(read: &mut impl Read, slice: &mut[Self]) -> UnitResult;

    /// Read as many values of type `Self` as specified with `data_size`.
    ///
    /// This method will not allocate more memory than `soft_max` at once.
    /// If `hard_max` is specified, it will never read any more than that.
    /// Returns `Error::Invalid` if reader does not contain the desired number of elements.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>) -> Result<Vec<Self>> {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::invalid("content size"))
            }
        }

        let mut data = Vec::new();

        // do not allocate more than $chunks memory at once
        // (most of the time, this loop will run only once)
        while data.len() < data_size {
            let chunk_start = data.len();
            let chunk_end = (chunk_start + soft_max).min(data_size);

            data.resize(chunk_end, Self::default());
            Self::read_slice(read, &mut data[chunk_start .. chunk_end])?;
        }

        Ok(data)
    }

    /// Write this value to the writer.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_big_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> Result<()> {
                write.write_as_big_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_big_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_big_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);


/// A single byte where anything except zero means `true`.
#[inline]
pub fn read_bool(read: &mut impl Read) -> Result<bool> {
    Ok(u8::read(read)? != 0)
}

/// Write `1` for `true` and `0` for `false`.
#[inline]
pub fn write_bool(write: &mut impl Write, value: bool) -> UnitResult {
    (value as u8).write(write)
}

/// Read exactly `count` bytes, never trusting the declared count for allocation.
#[inline]
pub fn read_bytes(read: &mut impl Read, count: usize) -> Result<Vec<u8>> {
    u8::read_vec(read, count, SOFT_MAX_ALLOCATION, Some(MAX_BYTE_ARRAY_LENGTH))
}

/// Read an `i32` length followed by that many bytes.
#[inline]
pub fn read_i32_sized_bytes(read: &mut impl Read) -> Result<Vec<u8>> {
    let size = i32::read(read)?;
    let size = i32_to_usize(size, "negative array size")?;
    read_bytes(read, size)
}

/// Write the length of the slice as `i32` and then its contents.
#[inline]
pub fn write_i32_sized_bytes(write: &mut impl Write, bytes: &[u8]) -> UnitResult {
    usize_to_i32(bytes.len(), "byte array too large")?.write(write)?;
    u8::write_slice(write, bytes)
}


/// The number of bytes needed to bring a block, which started at `start`
/// and now ends at `position`, to a multiple of `multiple` bytes.
#[inline]
pub fn padding_size(start: usize, position: usize, multiple: usize) -> usize {
    debug_assert!(multiple > 0, "padding multiple must be positive");
    let length = position.saturating_sub(start);
    (multiple - length % multiple) % multiple
}

/// Round the byte count up to the next multiple.
#[inline]
pub fn round_up(value: usize, multiple: usize) -> usize {
    value + padding_size(0, value, multiple)
}

/// Skip the padding that follows a block which started at `start`.
pub fn skip_padding<R: Read>(read: &mut Tracking<R>, start: usize, multiple: usize) -> UnitResult {
    let padding = padding_size(start, read.byte_position(), multiple);
    skip_bytes(read, padding)?;
    Ok(())
}

/// Write zeroes until the block which started at `start` is a multiple of `multiple` bytes.
pub fn write_padding<W: Write>(write: &mut Tracking<W>, start: usize, multiple: usize) -> UnitResult {
    let padding = padding_size(start, write.byte_position(), multiple);
    for _ in 0 .. padding { 0_u8.write(write)?; }
    Ok(())
}


/// Write a length field, then the body, and then patch the length field
/// with the number of body bytes. Leaves the cursor after the body.
/// The length field has 8 bytes if `long` is set, and 4 bytes otherwise.
pub fn write_length_block<W, F>(write: &mut Tracking<W>, long: bool, body: F) -> UnitResult
    where W: Write + Seek, F: FnOnce(&mut Tracking<W>) -> UnitResult
{
    let length_position = write.byte_position();
    if long { 0_u64.write(write)?; } else { 0_u32.write(write)?; }

    let body_start = write.byte_position();
    body(write)?;
    let body_end = write.byte_position();
    let body_length = body_end - body_start;

    write.seek_write_to(length_position)?;

    if long { (body_length as u64).write(write)?; }
    else {
        let length = u32::try_from(body_length)
            .map_err(|_| Error::invalid("block too large for a 32-bit length"))?;

        length.write(write)?;
    }

    write.seek_write_to(body_end)?;
    Ok(())
}


/// A four-character code, such as a signature, a blend mode or an additional info key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {

    /// Read four raw characters.
    #[inline]
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let mut bytes = [0_u8; 4];
        u8::read_slice(read, &mut bytes)?;
        Ok(FourCc(bytes))
    }

    /// Write four raw characters.
    #[inline]
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self.0)
    }

    /// Create a code from text, which must be exactly four ascii bytes long.
    pub fn from_text(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 4 { return Err(Error::invalid("four-character code length")) }
        Ok(FourCc([ bytes[0], bytes[1], bytes[2], bytes[3] ]))
    }

    /// The code as text, replacing bytes that are not ascii.
    pub fn to_text(self) -> String {
        self.0.iter().map(|&byte| byte as char).collect()
    }

    /// The code as text, without trailing spaces and nuls.
    pub fn to_trimmed_text(self) -> String {
        self.to_text().trim_end_matches(|c| c == ' ' || c == '\0').to_string()
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "'{}'", self.to_text())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_text())
    }
}

impl PartialEq<[u8; 4]> for FourCc {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}


/// Read a one-byte length, that many bytes, and the padding
/// that brings the whole string to a multiple of `pad_multiple`.
/// Bytes are interpreted as latin-1.
pub fn read_pascal_string<R: Read>(read: &mut Tracking<R>, pad_multiple: usize) -> Result<String> {
    let start = read.byte_position();
    let length = u8::read(read)? as usize;
    let bytes = read_bytes(read, length)?;
    skip_padding(read, start, pad_multiple)?;

    Ok(bytes.into_iter().map(char::from).collect())
}

/// Write a pascal string, truncated to 255 bytes, then pad.
/// Characters outside latin-1 become `?`.
pub fn write_pascal_string<W: Write>(write: &mut Tracking<W>, text: &str, pad_multiple: usize) -> UnitResult {
    let start = write.byte_position();

    let bytes: Vec<u8> = text.chars()
        .map(|character| if (character as u32) < 256 { character as u32 as u8 } else { b'?' })
        .take(255).collect();

    (bytes.len() as u8).write(write)?;
    u8::write_slice(write, &bytes)?;
    write_padding(write, start, pad_multiple)
}

/// Read an `i32` character count, then that many big-endian utf-16 code units.
/// No padding follows.
pub fn read_unicode_string(read: &mut impl Read) -> Result<String> {
    let count = i32::read(read)?;
    let count = i32_to_usize(count, "negative string length")?;
    let units = u16::read_vec(read, count, SOFT_MAX_ALLOCATION, Some(MAX_BYTE_ARRAY_LENGTH / 2))?;

    Ok(std::char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(std::char::REPLACEMENT_CHARACTER))
        .collect())
}

/// Write the number of utf-16 code units, then the big-endian code units.
pub fn write_unicode_string(write: &mut impl Write, text: &str) -> UnitResult {
    let units: Vec<u16> = text.encode_utf16().collect();
    usize_to_i32(units.len(), "string too long")?.write(write)?;
    u16::write_slice(write, &units)
}

/// Descriptor keys are stored with an `i32` length,
/// where zero stands for a four-character key.
pub fn read_key(read: &mut impl Read) -> Result<String> {
    let length = i32::read(read)?;
    let length = if length == 0 { 4 } else { i32_to_usize(length, "negative key length")? };
    let bytes = read_bytes(read, length)?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Four-character keys are written with a zero length.
pub fn write_key(write: &mut impl Write, key: &str) -> UnitResult {
    let bytes: Vec<u8> = key.chars().map(|character| character as u32 as u8).collect();
    let length = if bytes.len() == 4 { 0 } else { usize_to_i32(bytes.len(), "key too long")? };
    length.write(write)?;
    u8::write_slice(write, &bytes)
}
