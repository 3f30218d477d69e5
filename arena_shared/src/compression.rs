//! Raw deflate datagram compression.
//!
//! Every datagram is compressed (no zlib header) before it leaves the socket.
//! Decompression is bounded so a hostile peer cannot inflate a tiny packet
//! into an unbounded allocation.

use std::io::Read;

use anyhow::{bail, Context, Result};
use flate2::{
    read::{DeflateDecoder, DeflateEncoder},
    Compression,
};

/// Upper bound for a decompressed datagram.
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024;

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(data, Compression::fast());
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    encoder.read_to_end(&mut out).context("deflate")?;
    Ok(out)
}

/// Inflates `data`, failing once the output would exceed `max_size` bytes.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let max_size = max_size.min(MAX_DECOMPRESSED_SIZE);
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(max_size.min(data.len() * 4));
    let mut chunk = [0u8; 4096];
    loop {
        let n = decoder.read(&mut chunk).context("inflate")?;
        if n == 0 {
            break;
        }
        if out.len() + n > max_size {
            bail!("datagram inflates past {max_size} bytes");
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitive_payloads_shrink() {
        let json = br#"{"name":"crate0","position":[0.0,0.5]}"#.repeat(40);
        let packed = compress(&json).unwrap();
        assert!(packed.len() < json.len() / 4);
        assert_eq!(decompress(&packed, json.len()).unwrap(), json);
    }

    #[test]
    fn size_limit_is_enforced() {
        let packed = compress(&vec![0u8; 10_000]).unwrap();
        assert!(decompress(&packed, 100).is_err());
        assert!(decompress(&packed, 20_000).is_ok());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decompress(&[0xff, 0x00, 0x13, 0x37], 1024).is_err());
    }
}
