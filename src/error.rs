
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::num::TryFromIntError;


/// A result that may contain a psd error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a psd error.
pub type UnitResult = Result<()>;


/// An error that may happen while reading or writing a psd file.
/// Distinguishes between unsupported features, malformed structure,
/// corrupt run-length data, and file system errors.
#[derive(Debug)]
pub enum Error {

    /// The contents of the file are well-formed,
    /// but use a feature that this crate does not decode.
    NotSupported(Cow<'static, str>),

    /// The contents of the file are malformed.
    /// Bad signatures, overruns past a declared block end,
    /// unbalanced layer sections and unknown descriptor tags end up here.
    Invalid(Cow<'static, str>),

    /// A PackBits run would overrun the caller-supplied output window.
    Rle(Cow<'static, str>),

    /// The underlying byte stream could not be read or written.
    Io(IoError),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create an error of the variant `Rle`.
    pub(crate) fn rle(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Rle(message.into())
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::invalid("reference to missing bytes")
        }
        else {
            Error::Io(error)
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Error::invalid("invalid size")
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(formatter),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
            Error::Rle(message) => write!(formatter, "corrupt rle data: {}", message),
        }
    }
}


/// Return error on invalid range.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn i64_to_usize(value: i64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u64_to_usize(value: u64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_i32(value: usize, error_message: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_u32(value: usize, error_message: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_i16(value: usize, error_message: &'static str) -> Result<i16> {
    i16::try_from(value).map_err(|_| Error::invalid(error_message))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eof_is_invalid_data(){
        let io = IoError::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from(io), Error::Invalid(_)));

        let io = IoError::new(ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(io), Error::Io(_)));
    }

    #[test]
    fn conversions_reject_out_of_range(){
        assert!(i32_to_usize(-1, "negative").is_err());
        assert_eq!(i32_to_usize(7, "negative").unwrap(), 7);
        assert!(usize_to_i16(40_000, "too large").is_err());
    }
}
