//! CBOR encoding of wire messages.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;

/// Encodes a message to CBOR bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if the value cannot be serialized.
pub fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decodes a message from CBOR bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] on malformed input.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Counts bytes without storing them.
#[derive(Debug, Default)]
struct CountingWriter {
    written: usize,
}

impl io::Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Returns the size of the CBOR encoding of `value` without allocating it.
///
/// Used to account entries against byte budgets.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if the value cannot be serialized.
pub fn encoded_len<T: Serialize + ?Sized>(value: &T) -> ProtocolResult<usize> {
    let mut counter = CountingWriter::default();
    ciborium::ser::into_writer(value, &mut counter)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(counter.written)
}
