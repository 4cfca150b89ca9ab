//! Tokio codec for newline-delimited JSON messages

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum accepted length of a single line (1 MiB)
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A decoded line
///
/// Lines that are valid UTF-8/JSON framing-wise but do not match the
/// expected message type are surfaced as `Malformed` so the connection can
/// answer with an error and keep going.
#[derive(Debug)]
pub enum Parsed<T> {
    Message(T),
    Malformed(String),
}

/// Codec decoding `D` values and encoding any `Serialize` value, one per line
pub struct JsonLineCodec<D> {
    max_line_length: usize,
    _decode: PhantomData<fn() -> D>,
}

impl<D> JsonLineCodec<D> {
    /// Create a codec with the default maximum line length
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length
    pub fn with_max_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            _decode: PhantomData,
        }
    }

    fn parse(line: &[u8]) -> Parsed<D>
    where
        D: DeserializeOwned,
    {
        match serde_json::from_slice::<D>(line) {
            Ok(message) => Parsed::Message(message),
            Err(e) => Parsed::Malformed(format!("Invalid message: {}", e)),
        }
    }
}

impl<D> Default for JsonLineCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> std::fmt::Debug for JsonLineCodec<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLineCodec")
            .field("max_line_length", &self.max_line_length)
            .finish()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    let mut start = 0;
    while start < end && matches!(line[start], b' ' | b'\t') {
        start += 1;
    }
    &line[start..end]
}

impl<D: DeserializeOwned> Decoder for JsonLineCodec<D> {
    type Item = Parsed<D>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_line_length {
                    return Err(ProtocolError::LineTooLong {
                        size: src.len(),
                        max: self.max_line_length,
                    });
                }
                return Ok(None); // Need more data
            };

            if newline > self.max_line_length {
                return Err(ProtocolError::LineTooLong {
                    size: newline,
                    max: self.max_line_length,
                });
            }

            let line = src.split_to(newline + 1);
            let trimmed = trim_line(&line);
            if trimmed.is_empty() {
                continue;
            }

            return Ok(Some(Self::parse(trimmed)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        // Unterminated final line
        let rest = src.split();
        let trimmed = trim_line(&rest);
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::parse(trimmed)))
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonLineCodec<D> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;

        if payload.len() > self.max_line_length {
            return Err(ProtocolError::LineTooLong {
                size: payload.len(),
                max: self.max_line_length,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
