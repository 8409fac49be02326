//! PackBits run-length coding, as used per channel row,
//! and the row length tables that precede the compressed rows.

use std::convert::TryFrom;

use super::*;
use crate::io::{Data, Read, Write};
use crate::error::{Error, Result, UnitResult, usize_to_u32};

const MIN_RUN_LENGTH : usize = 3;
const MAX_RUN_LENGTH : usize = 128;


/// Decode PackBits packets from the front of `remaining` until `output` is full.
/// Advances `remaining` past the consumed packets.
///
/// A packet that would write past the end of `output` is an `Error::Rle`,
/// and so is data that ends before `output` is full.
pub fn decompress_into(remaining: &mut Bytes<'_>, output: &mut [u8]) -> UnitResult {
    let mut index = 0;

    while index < output.len() {
        let control = take_1(remaining)? as i8 as i32;

        if control > 0 {
            // copy the next 'control + 1' bytes as-is
            let count = control as usize + 1;
            if count > output.len() - index {
                return Err(Error::rle("raw packet overruns the decode window"));
            }

            let values = take_n(remaining, count)?;
            output[index .. index + count].copy_from_slice(values);
            index += count;
        }
        else if control > -128 {
            // repeat the next value '1 - control' times
            let count = (1 - control) as usize;
            let value = take_1(remaining)?;

            if count > output.len() - index {
                return Err(Error::rle("run packet overruns the decode window"));
            }

            output[index .. index + count].iter_mut().for_each(|byte| *byte = value);
            index += count;
        }

        // -128 is a no-op, even though canonical packbits never emits it
    }

    Ok(())
}

/// Decode a complete buffer of the specified size.
pub fn decompress_bytes(mut compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    // two bytes of a run packet produce at most 128 bytes
    if expected_byte_size / 64 > compressed.len() {
        return Err(Error::rle("compressed data is too short for the decode window"));
    }

    let mut decompressed = vec![0_u8; expected_byte_size];
    decompress_into(&mut compressed, &mut decompressed)?;
    Ok(decompressed)
}

/// Greedy PackBits encoder: runs of three or more equal bytes
/// become run packets, everything else becomes literal packets.
pub fn compress_bytes(data: Bytes<'_>) -> ByteVec {
    let mut compressed = Vec::with_capacity(data.len() + data.len() / MAX_RUN_LENGTH + 1);
    let mut run_start = 0;

    while run_start < data.len() {
        let mut run_end = run_start + 1;

        while run_end < data.len()
            && data[run_end] == data[run_start]
            && run_end - run_start < MAX_RUN_LENGTH
        {
            run_end += 1;
        }

        if run_end - run_start >= MIN_RUN_LENGTH {
            compressed.push((1 - (run_end - run_start) as i32) as i8 as u8);
            compressed.push(data[run_start]);
            run_start = run_end;
        }
        else {
            let mut literal_end = run_start + 1;

            while literal_end < data.len()
                && literal_end - run_start < MAX_RUN_LENGTH
                && !starts_run(data, literal_end)
            {
                literal_end += 1;
            }

            compressed.push((literal_end - run_start - 1) as u8);
            compressed.extend_from_slice(&data[run_start .. literal_end]);
            run_start = literal_end;
        }
    }

    compressed
}

fn starts_run(data: Bytes<'_>, index: usize) -> bool {
    index + MIN_RUN_LENGTH <= data.len()
        && data[index + 1 .. index + MIN_RUN_LENGTH].iter().all(|&byte| byte == data[index])
}

fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if let Some((&first, rest)) = slice.split_first() {
        *slice = rest;
        Ok(first)
    }
    else {
        Err(Error::rle("compressed data ended before the decode window was filled"))
    }
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)
    }
    else {
        Err(Error::rle("compressed data ended inside a raw packet"))
    }
}


/// The compressed byte count of each row of a channel.
/// Stored as `u16` in standard documents and as `u32` in large documents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RleRowLengths {
    pub lengths: Vec<u32>,
}

impl RleRowLengths {

    /// Read one entry for each row.
    pub fn read(read: &mut impl Read, row_count: usize, large_document: bool) -> Result<Self> {
        let lengths = if large_document {
            u32::read_vec(read, row_count, crate::io::SOFT_MAX_ALLOCATION, None)?
        }
        else {
            u16::read_vec(read, row_count, crate::io::SOFT_MAX_ALLOCATION, None)?
                .into_iter().map(u32::from).collect()
        };

        Ok(RleRowLengths { lengths })
    }

    /// Write one entry for each row.
    pub fn write(&self, write: &mut impl Write, large_document: bool) -> UnitResult {
        for &length in &self.lengths {
            if large_document { length.write(write)?; }
            else {
                let length = u16::try_from(length)
                    .map_err(|_| Error::invalid("rle row too long for a standard document"))?;

                length.write(write)?;
            }
        }

        Ok(())
    }

    /// The sum of all row lengths.
    pub fn total(&self) -> usize {
        self.lengths.iter().map(|&length| length as usize).sum()
    }

    /// Number of bytes the table itself occupies.
    pub fn byte_size(&self, large_document: bool) -> usize {
        self.lengths.len() * if large_document { 4 } else { 2 }
    }
}

/// Compress each row on its own and record the compressed row lengths.
pub fn compress_rows(data: Bytes<'_>, bytes_per_row: usize) -> Result<(ByteVec, RleRowLengths)> {
    let mut compressed = Vec::with_capacity(data.len() / 2);
    let mut lengths = Vec::with_capacity(data.len() / bytes_per_row.max(1));

    if bytes_per_row != 0 {
        for row in data.chunks(bytes_per_row) {
            let packed = compress_bytes(row);
            lengths.push(usize_to_u32(packed.len(), "rle row too long")?);
            compressed.extend_from_slice(&packed);
        }
    }

    Ok((compressed, RleRowLengths { lengths }))
}


#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    fn round_trip(data: &[u8]) {
        let compressed = compress_bytes(data);
        let decompressed = decompress_bytes(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn known_packets(){
        // literal of three, run of four, no-op, run of one
        let compressed = [ 2, 1, 2, 3,  0xfd, 9,  0x80,  0, 7 ];
        let decompressed = decompress_bytes(&compressed, 8).unwrap();
        assert_eq!(decompressed, vec![ 1, 2, 3, 9, 9, 9, 9, 7 ]);
    }

    #[test]
    fn overrun_is_rle_error(){
        let raw = [ 3, 1, 2, 3, 4 ];
        assert!(matches!(decompress_bytes(&raw, 3), Err(Error::Rle(_))));

        let run = [ 0xfe, 5 ];
        assert!(matches!(decompress_bytes(&run, 2), Err(Error::Rle(_))));

        let short = [ 0xfe, 5 ];
        assert!(matches!(decompress_bytes(&short, 4), Err(Error::Rle(_))));
    }

    #[test]
    fn edge_case_buffers(){
        round_trip(&[]);
        round_trip(&[ 0 ]);
        round_trip(&[ 0xff ]);
        round_trip(&[ 0; 129 ]);
        round_trip(&[ 0xff; 300 ]);
        round_trip(&[ 1, 1, 2, 2, 3, 3, 3, 4 ]);
        round_trip(&[ 0, 23, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 0, 0, 0, 1, 23, 43, 4 ]);
    }

    #[test]
    fn long_runs_are_split_at_packet_boundary(){
        let compressed = compress_bytes(&[ 7; 128 ]);
        assert_eq!(compressed, vec![ 0x81, 7 ]);

        let compressed = compress_bytes(&[ 7; 129 ]);
        assert_eq!(compressed, vec![ 0x81, 7,  0, 7 ]);
    }

    #[test]
    fn random_buffers(){
        let mut random = rand::rng();

        for length in [ 0_usize, 1, 2, 127, 128, 129, 1000, 4097 ] {
            let noise: Vec<u8> = (0 .. length).map(|_| random.random()).collect();
            round_trip(&noise);

            let runs: Vec<u8> = (0 .. length).map(|_| random.random_range(0 .. 3)).collect();
            round_trip(&runs);
        }
    }

    #[test]
    fn row_lengths_io(){
        let (compressed, lengths) = compress_rows(&[ 1, 1, 1, 1,  1, 2, 3, 4 ], 4).unwrap();
        assert_eq!(lengths.lengths, vec![ 2, 5 ]);
        assert_eq!(lengths.total(), compressed.len());

        for &large in &[ false, true ] {
            let mut bytes = Vec::new();
            lengths.write(&mut bytes, large).unwrap();
            assert_eq!(bytes.len(), lengths.byte_size(large));
            assert_eq!(RleRowLengths::read(&mut bytes.as_slice(), 2, large).unwrap(), lengths);
        }
    }
}
