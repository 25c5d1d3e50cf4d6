//! Durable record encoding: MessagePack body behind a one-byte format flag.
//!
//! The flag lets compressed and raw records coexist across a compression
//! migration; decode always accepts both forms regardless of the codec's
//! current setting.

use crate::core::{JobsError, Result};
use crate::store::record::ProgressionRecord;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

const FORMAT_RAW: u8 = 0;
const FORMAT_GZIP: u8 = 1;

#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    compress: bool,
}

impl RecordCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    pub fn encode(&self, record: &ProgressionRecord) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec(record)
            .map_err(|e| JobsError::EncodingError(format!("serialize record: {}", e)))?;

        if !self.compress {
            let mut out = Vec::with_capacity(body.len() + 1);
            out.push(FORMAT_RAW);
            out.extend_from_slice(&body);
            return Ok(out);
        }

        let mut encoder = GzEncoder::new(vec![FORMAT_GZIP], Compression::default());
        encoder
            .write_all(&body)
            .map_err(|e| JobsError::EncodingError(format!("compress record: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| JobsError::EncodingError(format!("compress record: {}", e)))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ProgressionRecord> {
        let (&flag, body) = bytes
            .split_first()
            .ok_or_else(|| JobsError::EncodingError("empty record payload".into()))?;

        let body = match flag {
            FORMAT_RAW => body.to_vec(),
            FORMAT_GZIP => {
                let mut decoded = Vec::new();
                GzDecoder::new(body)
                    .read_to_end(&mut decoded)
                    .map_err(|e| JobsError::EncodingError(format!("decompress record: {}", e)))?;
                decoded
            }
            other => {
                return Err(JobsError::EncodingError(format!(
                    "unknown record format flag {}",
                    other
                )));
            }
        };

        rmp_serde::from_slice(&body)
            .map_err(|e| JobsError::EncodingError(format!("deserialize record: {}", e)))
    }

    /// Whether an encoded payload is marked compressed (for the relational
    /// row's flag column).
    pub fn is_compressed(bytes: &[u8]) -> bool {
        bytes.first() == Some(&FORMAT_GZIP)
    }
}
