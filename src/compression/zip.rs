
//! Zlib compressed channels, optionally with per-row prediction.

use super::*;
use crate::error::Result;
use zune_inflate::{DeflateDecoder, DeflateOptions};


pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    // deflate cannot expand a byte to more than 1032 bytes
    if expected_byte_size / 1032 > compressed.len() {
        return Err(Error::invalid("zlib-compressed data is too short"));
    }

    let options = DeflateOptions::default()
        .set_size_hint(expected_byte_size)
        .set_limit(expected_byte_size);

    let decompressed = DeflateDecoder::new_with_options(compressed, options)
        .decode_zlib()
        .map_err(|_| Error::invalid("zlib-compressed data malformed"))?;

    if decompressed.len() != expected_byte_size {
        return Err(Error::invalid("zlib-compressed data has the wrong size"));
    }

    Ok(decompressed)
}

pub fn compress_bytes(uncompressed: Bytes<'_>) -> ByteVec {
    miniz_oxide::deflate::compress_to_vec_zlib(uncompressed, 6)
}


/// Undo the delta coding of each row.
/// 8-bit rows are byte deltas, 16-bit rows are big-endian `u16` deltas,
/// 32-bit rows are byte deltas over the whole row, followed by byte plane separation.
pub fn prediction_to_samples(data: &mut [u8], width: usize, depth: BitDepth) -> Result<()> {
    let bytes_per_row = depth.bytes_per_row(width);
    if bytes_per_row == 0 { return Ok(()) }

    match depth {
        BitDepth::One => return Err(Error::unsupported("zip prediction for 1-bit channels")),

        BitDepth::Eight => for row in data.chunks_exact_mut(bytes_per_row) {
            for index in 1 .. row.len() {
                row[index] = row[index].wrapping_add(row[index - 1]);
            }
        },

        BitDepth::Sixteen => for row in data.chunks_exact_mut(bytes_per_row) {
            let mut previous = 0_u16;

            for sample in row.chunks_exact_mut(2) {
                let value = u16::from_be_bytes([ sample[0], sample[1] ]).wrapping_add(previous);
                sample.copy_from_slice(&value.to_be_bytes());
                previous = value;
            }
        },

        BitDepth::ThirtyTwo => {
            let mut planes = vec![ 0_u8; bytes_per_row ];

            for row in data.chunks_exact_mut(bytes_per_row) {
                for index in 1 .. row.len() {
                    row[index] = row[index].wrapping_add(row[index - 1]);
                }

                planes.copy_from_slice(row);

                for x in 0 .. width {
                    for byte in 0 .. 4 {
                        row[x * 4 + byte] = planes[byte * width + x];
                    }
                }
            }
        },
    }

    Ok(())
}

/// The inverse of `prediction_to_samples`.
pub fn samples_to_prediction(data: &mut [u8], width: usize, depth: BitDepth) -> Result<()> {
    let bytes_per_row = depth.bytes_per_row(width);
    if bytes_per_row == 0 { return Ok(()) }

    match depth {
        BitDepth::One => return Err(Error::unsupported("zip prediction for 1-bit channels")),

        BitDepth::Eight => for row in data.chunks_exact_mut(bytes_per_row) {
            for index in (1 .. row.len()).rev() {
                row[index] = row[index].wrapping_sub(row[index - 1]);
            }
        },

        BitDepth::Sixteen => for row in data.chunks_exact_mut(bytes_per_row) {
            let mut previous = 0_u16;

            for sample in row.chunks_exact_mut(2) {
                let value = u16::from_be_bytes([ sample[0], sample[1] ]);
                sample.copy_from_slice(&value.wrapping_sub(previous).to_be_bytes());
                previous = value;
            }
        },

        BitDepth::ThirtyTwo => {
            let mut samples = vec![ 0_u8; bytes_per_row ];

            for row in data.chunks_exact_mut(bytes_per_row) {
                samples.copy_from_slice(row);

                for x in 0 .. width {
                    for byte in 0 .. 4 {
                        row[byte * width + x] = samples[x * 4 + byte];
                    }
                }

                for index in (1 .. row.len()).rev() {
                    row[index] = row[index].wrapping_sub(row[index - 1]);
                }
            }
        },
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eight_bit_prediction_is_a_running_sum(){
        let mut row = vec![ 10, 1, 1, 253 ];
        prediction_to_samples(&mut row, 4, BitDepth::Eight).unwrap();
        assert_eq!(row, vec![ 10, 11, 12, 9 ]);
    }

    #[test]
    fn thirty_two_bit_rows_are_interleaved(){
        let width = 2;
        let original = vec![ 1, 2, 3, 4,  5, 6, 7, 8 ];

        let mut predicted = original.clone();
        samples_to_prediction(&mut predicted, width, BitDepth::ThirtyTwo).unwrap();

        // planes are 1 5 2 6 3 7 4 8, then delta coded
        assert_eq!(predicted, vec![ 1, 4, 253, 4, 253, 4, 253, 4 ]);

        prediction_to_samples(&mut predicted, width, BitDepth::ThirtyTwo).unwrap();
        assert_eq!(predicted, original);
    }
}
