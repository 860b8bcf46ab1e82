use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

pub struct Transcoder {
    decoder: encoding_rs::Decoder,
}

impl Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
        }
    }
}

impl Decoder for Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut temp_out = vec![
            0;
            self.decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .unwrap_or_else(|| src.len() * 2)
        ];

        let (_result, bytes_read, bytes_written, _has_errors) =
            self.decoder.decode_to_utf8(src, &mut temp_out, false);

        if bytes_read == 0 && bytes_written == 0 && !src.is_empty() {
            return Ok(None);
        }

        src.advance(bytes_read);
        Ok(Some(BytesMut::from(&temp_out[..bytes_written])))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut temp_out = vec![
            0;
            self.decoder
                .max_utf8_buffer_length(buf.len())
                .unwrap_or_else(|| buf.len() * 2)
        ];
        let (_result, _bytes_read, bytes_written, _has_errors) =
            self.decoder.decode_to_utf8(buf, &mut temp_out, true);

        buf.clear();

        if bytes_written > 0 {
            Ok(Some(BytesMut::from(&temp_out[..bytes_written])))
        } else {
            Ok(None)
        }
    }
}

/// Longest line [`LineCodec::new`] accepts, terminator included.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Splits a byte stream into lines on `\n`, dropping a `\r` that directly
/// precedes it. Lines are yielded as raw bytes; UTF-8 is checked by the
/// row parser so a bad line can be skipped instead of ending the stream.
///
/// A line longer than the configured maximum is an `InvalidData` error.
#[derive(Debug)]
pub struct LineCodec {
    // bytes already scanned without finding a newline
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn too_long(&mut self) -> io::Error {
        self.next_index = 0;
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line longer than {} bytes", self.max_length),
        )
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_cr(mut line: BytesMut) -> BytesMut {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src[self.next_index..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline = self.next_index + offset;
                if newline + 1 > self.max_length {
                    return Err(self.too_long());
                }
                self.next_index = 0;
                let mut line = src.split_to(newline + 1);
                line.truncate(newline);
                Ok(Some(strip_cr(line)))
            }
            None if src.len() > self.max_length => Err(self.too_long()),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        // final line without a terminator
        let line = buf.split_to(buf.len());
        Ok(Some(strip_cr(line)))
    }
}
