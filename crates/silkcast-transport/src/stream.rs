use std::io::Read;

/// A chunked byte stream carrying back-to-back frames.
///
/// Wraps either a live HTTP response body or any other reader (a recorded
/// file, stdin, a test fixture). Dropping or closing the stream releases
/// the underlying connection.
pub struct LiveStream {
    inner: Option<LiveStreamInner>,
    source: String,
}

enum LiveStreamInner {
    Http(Box<dyn Read + Send + Sync + 'static>),
    Reader(Box<dyn Read + Send + 'static>),
}

impl LiveStream {
    /// Wrap an HTTP response body.
    pub(crate) fn from_http(url: String, body: Box<dyn Read + Send + Sync + 'static>) -> Self {
        Self {
            inner: Some(LiveStreamInner::Http(body)),
            source: url,
        }
    }

    /// Wrap an arbitrary reader (file, stdin, fixture).
    pub fn from_reader(source: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Some(LiveStreamInner::Reader(Box::new(reader))),
            source: source.into(),
        }
    }

    /// Where the bytes come from (URL or label).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Close the stream. Subsequent reads return EOF. Idempotent.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(source = %self.source, "live stream closed");
        }
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Read for LiveStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            Some(LiveStreamInner::Http(body)) => body.read(buf),
            Some(LiveStreamInner::Reader(reader)) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl std::fmt::Debug for LiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Some(LiveStreamInner::Http(_)) => "http",
            Some(LiveStreamInner::Reader(_)) => "reader",
            None => "closed",
        };
        f.debug_struct("LiveStream")
            .field("type", &kind)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_through_wrapped_reader() {
        let mut stream = LiveStream::from_reader("fixture", Cursor::new(b"abc".to_vec()));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(stream.source(), "fixture");
    }

    #[test]
    fn close_is_idempotent_and_reads_eof() {
        let mut stream = LiveStream::from_reader("fixture", Cursor::new(b"abc".to_vec()));
        stream.close();
        stream.close();
        assert!(stream.is_closed());

        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
