//! Response Sink Capability
//!
//! The interceptor never patches a response object in place. It wraps an
//! inner `ResponseSink` and implements the same trait itself.

/// Ordered header pairs, names compared case-insensitively
pub type HeaderList = Vec<(String, String)>;

/// Case-insensitive lookup of the first matching header
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Remove every header with the given name. Returns true if any was removed.
pub fn remove_header(headers: &mut HeaderList, name: &str) -> bool {
    let before = headers.len();
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    headers.len() != before
}

/// Arguments of a `write_head` call.
///
/// Covers both `(status, headers)` and `(status, reason, headers)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: Option<String>,
    /// Headers passed positionally, on top of those already set on the sink
    pub headers: Option<HeaderList>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Positional header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_deref().and_then(|h| header_value(h, name))
    }
}

/// Where response bytes finally go
pub trait ResponseSink {
    /// Status used for an implicit head
    fn status(&self) -> u16;

    /// Header already set on the response
    fn header(&self, name: &str) -> Option<String>;

    /// Every header already set on the response
    fn headers(&self) -> HeaderList;

    fn remove_header(&mut self, name: &str);

    fn write_head(&mut self, head: ResponseHead);

    fn write(&mut self, chunk: &[u8]);

    fn end(&mut self);
}

/// In-memory response: records the head, body bytes and `end` calls
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub head: Option<ResponseHead>,
    pub body: Vec<u8>,
    pub writes: usize,
    pub end_calls: usize,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            head: None,
            body: Vec::new(),
            writes: 0,
            end_calls: 0,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace any existing header of the same name
    pub fn set_header(&mut self, name: &str, value: &str) {
        remove_header(&mut self.headers, name);
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Take the body bytes written so far
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    pub fn is_ended(&self) -> bool {
        self.end_calls > 0
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for BufferedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn header(&self, name: &str) -> Option<String> {
        header_value(&self.headers, name).map(String::from)
    }

    fn headers(&self) -> HeaderList {
        self.headers.clone()
    }

    fn remove_header(&mut self, name: &str) {
        remove_header(&mut self.headers, name);
    }

    fn write_head(&mut self, head: ResponseHead) {
        self.status = head.status;
        if let Some(positional) = &head.headers {
            for (name, value) in positional {
                self.set_header(name, value);
            }
        }
        self.head = Some(head);
    }

    fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
        self.writes += 1;
    }

    fn end(&mut self) {
        self.end_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_helpers_ignore_case() {
        let mut headers: HeaderList = vec![
            ("Content-Length".to_string(), "100".to_string()),
            ("content-length".to_string(), "100".to_string()),
            ("X-Keep".to_string(), "yes".to_string()),
        ];
        assert_eq!(header_value(&headers, "CONTENT-LENGTH"), Some("100"));
        assert!(remove_header(&mut headers, "content-length"));
        assert_eq!(headers.len(), 1);
        assert!(!remove_header(&mut headers, "content-length"));
    }

    #[test]
    fn test_buffered_write_head_merges_positional() {
        let mut response = BufferedResponse::new().with_header("content-type", "text/plain");
        response.write_head(
            ResponseHead::new(404)
                .with_reason("Not Found")
                .with_header("Content-Type", "text/html"),
        );

        assert_eq!(response.status(), 404);
        assert_eq!(response.header("content-type").as_deref(), Some("text/html"));
        assert_eq!(response.head.as_ref().and_then(|h| h.reason.as_deref()), Some("Not Found"));
    }

    #[test]
    fn test_buffered_records_writes_and_end() {
        let mut response = BufferedResponse::new();
        response.write(b"ab");
        response.write(b"c");
        response.end();

        assert_eq!(response.writes, 2);
        assert_eq!(response.take_body(), b"abc");
        assert!(response.body.is_empty());
        assert!(response.is_ended());
    }
}
