//! Line framing over a [`Client`].

use bytes::{Bytes, BytesMut};
use munin_transport_traits::{CancellationToken, Client, TransportResult};

const READ_CHUNK: usize = 512;

/// One received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Line {
    /// A line without its `\n` or `\r\n` terminator.
    Complete(Bytes),
    /// A line longer than the limit; its bytes were discarded.
    Overlong,
}

/// Splits received bytes into lines of bounded length.
///
/// Bytes past the newline stay buffered for the next call, so pipelined
/// commands are answered in order.
#[derive(Debug)]
pub(crate) struct LineReader {
    buffer: BytesMut,
    max_line_length: usize,
    /// Skipping the rest of an overlong line
    discarding: bool,
}

impl LineReader {
    pub(crate) fn new(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_line_length,
            discarding: false,
        }
    }

    /// Reads until a full line is buffered.
    pub(crate) async fn read_line(
        &mut self,
        client: &mut dyn Client,
        cancel: &CancellationToken,
    ) -> TransportResult<Line> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.next_buffered() {
                return Ok(line);
            }
            let n = client.receive(&mut chunk, cancel).await?;
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn next_buffered(&mut self) -> Option<Line> {
        let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
            // Room for the longest allowed line plus its '\r'
            if self.buffer.len() > self.max_line_length + 1 {
                self.buffer.clear();
                self.discarding = true;
            }
            return None;
        };

        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }

        if std::mem::take(&mut self.discarding) || line.len() > self.max_line_length {
            return Some(Line::Overlong);
        }
        Some(Line::Complete(line.freeze()))
    }
}
