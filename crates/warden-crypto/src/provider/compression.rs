//! Payload compression (`zip` header): identity and raw DEFLATE (RFC 1951).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::debug;
use zeroize::Zeroizing;

use super::{validate_binding, CryptoFactory};
use crate::algorithm::{AlgorithmDescriptor, AlgorithmFamily, AlgorithmParams, CompressionKind};
use crate::error::CryptoError;
use crate::key::SecretKey;
use crate::memory::{Rental, SecurePool};

/// Default cap on decompressed output.
pub const DEFAULT_MAX_DECOMPRESSED: usize = 10 * 1024 * 1024;

const CHUNK_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CompressionFactory {
    max_output: usize,
}

impl Default for CompressionFactory {
    fn default() -> Self {
        Self {
            max_output: DEFAULT_MAX_DECOMPRESSED,
        }
    }
}

impl CompressionFactory {
    pub fn with_max_output(max_output: usize) -> Self {
        Self { max_output }
    }
}

impl CryptoFactory for CompressionFactory {
    type Provider = CompressionProvider;

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Compression
    }

    /// Compression takes no key; pass [`SecretKey::none`].
    fn create_provider(
        &self,
        key: Arc<SecretKey>,
        descriptor: Arc<AlgorithmDescriptor>,
    ) -> Result<CompressionProvider, CryptoError> {
        validate_binding(self.family(), &key, &descriptor)?;
        let AlgorithmParams::Compression(kind) = descriptor.params() else {
            return Err(CryptoError::FamilyMismatch {
                code: descriptor.code().to_string(),
                expected: self.family().name(),
            });
        };
        Ok(CompressionProvider {
            descriptor,
            kind,
            max_output: self.max_output,
        })
    }
}

#[derive(Debug)]
pub struct CompressionProvider {
    descriptor: Arc<AlgorithmDescriptor>,
    kind: CompressionKind,
    max_output: usize,
}

impl CompressionProvider {
    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    pub fn is_identity(&self) -> bool {
        self.kind == CompressionKind::None
    }

    pub fn compress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let pool = SecurePool::new();
        let mut out = pool.rent(0, true);
        self.compress_into(data, &mut out)?;
        Ok(out.to_zeroizing())
    }

    /// Compress `data` into `out`, replacing its contents.
    pub fn compress_into(&self, data: &[u8], out: &mut Rental<'_>) -> Result<(), CryptoError> {
        out.truncate(0);
        if self.kind == CompressionKind::None {
            out.extend_from_slice(data);
            return Ok(());
        }

        let mut deflater = Compress::new(Compression::default(), false);
        loop {
            let start = out.len();
            out.resize(start + CHUNK_LEN);
            let consumed = deflater.total_in() as usize;
            let before = deflater.total_out();
            let status = deflater
                .compress(&data[consumed..], &mut out[start..], FlushCompress::Finish)
                .map_err(|e| CryptoError::Format(format!("deflate: {}", e)))?;
            out.truncate(start + (deflater.total_out() - before) as usize);
            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok => {}
                Status::BufError => {
                    return Err(CryptoError::Format("deflate made no progress".to_string()))
                }
            }
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let pool = SecurePool::new();
        let mut out = pool.rent(0, true);
        self.decompress_into(data, &AtomicBool::new(false), &mut out)?;
        Ok(out.to_zeroizing())
    }

    /// Decompress into `out`, replacing its contents and checking `cancel`
    /// between chunks.
    ///
    /// Malformed or truncated input is a format error, as are bytes after the
    /// end of the stream and output beyond the configured limit.
    pub fn decompress_into(
        &self,
        data: &[u8],
        cancel: &AtomicBool,
        out: &mut Rental<'_>,
    ) -> Result<(), CryptoError> {
        out.truncate(0);
        if self.kind == CompressionKind::None {
            if data.len() > self.max_output {
                return Err(CryptoError::Format("payload exceeds size limit".to_string()));
            }
            out.extend_from_slice(data);
            return Ok(());
        }

        let mut inflater = Decompress::new(false);
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(CryptoError::Cancelled);
            }
            let start = out.len();
            out.resize(start + CHUNK_LEN);
            let consumed = inflater.total_in() as usize;
            let before = inflater.total_out();
            let status = inflater
                .decompress(&data[consumed..], &mut out[start..], FlushDecompress::None)
                .map_err(|e| CryptoError::Format(format!("inflate: {}", e)))?;
            let produced = (inflater.total_out() - before) as usize;
            out.truncate(start + produced);

            if out.len() > self.max_output {
                debug!(limit = self.max_output, "decompressed payload over limit");
                return Err(CryptoError::Format(
                    "decompressed payload exceeds size limit".to_string(),
                ));
            }
            let progressed = produced > 0 || inflater.total_in() as usize > consumed;
            match status {
                Status::StreamEnd => break,
                Status::Ok if progressed => {}
                Status::Ok | Status::BufError => {
                    return Err(CryptoError::Format("truncated deflate stream".to_string()))
                }
            }
        }
        if inflater.total_in() as usize != data.len() {
            return Err(CryptoError::Format(
                "trailing bytes after deflate stream".to_string(),
            ));
        }
        Ok(())
    }
}
