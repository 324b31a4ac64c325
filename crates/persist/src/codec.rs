//! Text and binary encodings of a [`Document`].
//!
//! Binary layout:
//! ```text
//! b"TSRA" | flags: u8 | payload length: u64 LE | payload (CBOR, zstd when flagged)
//! ```

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tessera_scene::Document;

use crate::store::StoreError;

pub const MAGIC: [u8; 4] = *b"TSRA";

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const HEADER_LEN: usize = MAGIC.len() + 1 + 8;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Json,
    Binary,
    BinaryCompressed,
}

impl Format {
    pub fn is_binary(self) -> bool {
        !matches!(self, Self::Json)
    }

    pub fn binary(compressed: bool) -> Self {
        if compressed {
            Self::BinaryCompressed
        } else {
            Self::Binary
        }
    }
}

pub fn encode(doc: &Document, format: Format) -> Result<Vec<u8>, StoreError> {
    match format {
        Format::Json => Ok(serde_json::to_vec_pretty(doc)?),
        Format::Binary => encode_binary(doc, false),
        Format::BinaryCompressed => encode_binary(doc, true),
    }
}

/// Decode either form, sniffing the leading bytes.
pub fn decode(bytes: &[u8]) -> Result<(Document, Format), StoreError> {
    if bytes.starts_with(&MAGIC) {
        return decode_binary(bytes);
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Ok((serde_json::from_slice(bytes)?, Format::Json)),
        _ => Err(StoreError::BadMagic),
    }
}

fn encode_binary(doc: &Document, compressed: bool) -> Result<Vec<u8>, StoreError> {
    let mut payload = Vec::new();
    ciborium::into_writer(doc, &mut payload).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    if compressed {
        payload = zstd_compress(&payload)?;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(if compressed { FLAG_COMPRESSED } else { 0 });
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_binary(bytes: &[u8]) -> Result<(Document, Format), StoreError> {
    if !bytes.starts_with(&MAGIC) {
        return Err(StoreError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(StoreError::Truncated {
            expected: HEADER_LEN as u64,
            actual: bytes.len() as u64,
        });
    }
    let flags = bytes[MAGIC.len()];
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[MAGIC.len() + 1..HEADER_LEN]);
    let len = u64::from_le_bytes(len);

    let body = &bytes[HEADER_LEN..];
    if (body.len() as u64) < len {
        return Err(StoreError::Truncated {
            expected: len,
            actual: body.len() as u64,
        });
    }
    let body = &body[..len as usize];

    let compressed = flags & FLAG_COMPRESSED != 0;
    let doc = if compressed {
        let raw = zstd_decompress(body)?;
        ciborium::from_reader(raw.as_slice())
    } else {
        ciborium::from_reader(body)
    }
    .map_err(|e| StoreError::CborDecode(e.to_string()))?;
    Ok((doc, Format::binary(compressed)))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
