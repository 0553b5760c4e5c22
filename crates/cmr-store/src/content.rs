use serde::{Deserialize, Serialize};

/// A content stream attached to a document or document version.
///
/// The store never interprets the bytes; mime type and file name travel
/// with them for the protocol layer's benefit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStream {
    /// Suggested file name, if any.
    pub file_name: Option<String>,
    /// MIME type of the payload.
    pub mime_type: String,
    /// The raw bytes.
    pub data: Vec<u8>,
}

impl ContentStream {
    /// Create a content stream.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: None,
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Attach a file name (builder style).
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_reflects_payload() {
        let stream = ContentStream::new("text/plain", b"hello".to_vec());
        assert_eq!(stream.len(), 5);
        assert!(!stream.is_empty());
        assert!(stream.file_name.is_none());
    }

    #[test]
    fn with_file_name_sets_the_name() {
        let stream =
            ContentStream::new("text/plain", Vec::new()).with_file_name("notes.txt");
        assert_eq!(stream.file_name.as_deref(), Some("notes.txt"));
        assert!(stream.is_empty());
    }
}
