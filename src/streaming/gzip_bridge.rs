//! gzip Bridge
//!
//! Adapts a push-style gzip inflater to the pipeline shape:
//! `write(bytes)` returns whatever plain bytes became available,
//! `end(bytes)` flushes the trailer and returns the rest.
//! Concatenated members decode as one stream.
//! No content-specific logic; malformed input surfaces as `io::Error`.

use std::io::{self, Write};

use flate2::write::MultiGzDecoder;

/// Incremental gzip decoder for response bodies
pub struct GzipBridge {
    decoder: Option<MultiGzDecoder<Vec<u8>>>,
    /// Plain bytes produced
    bytes_out: usize,
}

impl GzipBridge {
    pub fn new() -> Self {
        Self {
            decoder: Some(MultiGzDecoder::new(Vec::new())),
            bytes_out: 0,
        }
    }

    /// Feed compressed bytes, returning the inflated bytes ready so far
    pub fn write(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        let decoder = self.decoder.as_mut().ok_or_else(Self::ended)?;
        decoder.write_all(chunk)?;
        // the last inflated block stays inside the decoder until flushed
        decoder.flush()?;

        let plain = std::mem::take(decoder.get_mut());
        self.bytes_out += plain.len();
        Ok(plain)
    }

    /// Feed an optional final chunk and finish the stream
    pub fn end(&mut self, chunk: Option<&[u8]>) -> io::Result<Vec<u8>> {
        let mut plain = match chunk {
            Some(bytes) if !bytes.is_empty() => self.write(bytes)?,
            _ => Vec::new(),
        };

        let decoder = self.decoder.take().ok_or_else(Self::ended)?;
        let rest = decoder.finish()?;
        self.bytes_out += rest.len();
        plain.extend_from_slice(&rest);
        Ok(plain)
    }

    /// Plain bytes produced so far
    pub fn bytes_out(&self) -> usize {
        self.bytes_out
    }

    fn ended() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "gzip stream already ended")
    }
}

impl Default for GzipBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_single_chunk() {
        let mut bridge = GzipBridge::new();
        let compressed = gzip(b"<html><body>hello</body></html>");

        let mut plain = bridge.write(&compressed).unwrap();
        plain.extend(bridge.end(None).unwrap());

        assert_eq!(plain, b"<html><body>hello</body></html>");
    }

    #[test]
    fn test_whole_member_returned_by_same_write() {
        let mut bridge = GzipBridge::new();
        let compressed = gzip(b"<html><body>hello</body></html>");

        let plain = bridge.write(&compressed).unwrap();
        assert_eq!(plain, b"<html><body>hello</body></html>");
        assert!(bridge.end(None).unwrap().is_empty());
    }

    #[test]
    fn test_concatenated_members() {
        let mut compressed = gzip(b"<p>one</p>");
        compressed.extend(gzip(b"<p>two</p>"));
        let mut bridge = GzipBridge::new();

        let mut plain = bridge.write(&compressed).unwrap();
        plain.extend(bridge.end(None).unwrap());

        assert_eq!(plain, b"<p>one</p><p>two</p>");
        assert_eq!(bridge.bytes_out(), 20);
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = "<p>streamed</p>".repeat(64);
        let compressed = gzip(body.as_bytes());
        let mut bridge = GzipBridge::new();

        let mut plain = Vec::new();
        for byte in &compressed {
            plain.extend(bridge.write(std::slice::from_ref(byte)).unwrap());
        }
        plain.extend(bridge.end(None).unwrap());

        assert_eq!(plain, body.as_bytes());
        assert_eq!(bridge.bytes_out(), body.len());
    }

    #[test]
    fn test_final_chunk_on_end() {
        let compressed = gzip(b"tail data");
        let (head, tail) = compressed.split_at(compressed.len() / 2);
        let mut bridge = GzipBridge::new();

        let mut plain = bridge.write(head).unwrap();
        plain.extend(bridge.end(Some(tail)).unwrap());

        assert_eq!(plain, b"tail data");
    }

    #[test]
    fn test_malformed_input() {
        let mut bridge = GzipBridge::new();
        let result = bridge
            .write(b"this is definitely not gzip data at all")
            .and_then(|_| bridge.end(None));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_after_end() {
        let mut bridge = GzipBridge::new();
        bridge.end(Some(&gzip(b""))).unwrap();
        assert_eq!(
            bridge.write(b"more").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
