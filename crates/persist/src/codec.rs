use std::io::{Read, Write};

use gridspace_model::Chunk;
use gridspace_stream::StoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Chunk as CBOR, zstd compressed.
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>, StoreError> {
    zstd_compress(&cbor_serialize(chunk)?)
}

pub fn decode_chunk(data: &[u8]) -> Result<Chunk, StoreError> {
    cbor_deserialize(&zstd_decompress(data)?)
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
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
