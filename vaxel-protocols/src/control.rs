//! Local control channel framing.
//!
//! The control protocol has no length prefix: a frame is one complete JSON
//! document. Bytes are buffered until a document parses; whitespace
//! between documents is ignored.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Default)]
pub struct DocumentFramer {
    buf: BytesMut,
}

impl DocumentFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Adds `data` and returns every document it completes.
    ///
    /// Input that can never become valid JSON is logged and discarded
    /// along with the rest of the buffer.
    pub fn push(&mut self, data: &[u8]) -> Vec<Value> {
        self.buf.extend_from_slice(data);

        let mut documents = Vec::new();
        let mut consumed = 0;
        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
        loop {
            match stream.next() {
                Some(Ok(document)) => {
                    documents.push(document);
                    consumed = stream.byte_offset();
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => {
                    warn!(error = %e, discarded = self.buf.len(), "Malformed control document");
                    consumed = self.buf.len();
                    break;
                }
                None => {
                    consumed = self.buf.len();
                    break;
                }
            }
        }

        self.buf.advance(consumed);
        documents
    }
}

/// Encodes a reply document.
pub fn encode_document(document: &Value) -> Vec<u8> {
    document.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn buffers_until_document_completes() {
        let mut framer = DocumentFramer::new();
        assert!(framer.push(br#"{"command": "li"#).is_empty());
        assert!(framer.buffered() > 0);

        let docs = framer.push(br#"st", "args": [1, 2]}"#);
        assert_eq!(docs, vec![json!({"command": "list", "args": [1, 2]})]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn yields_back_to_back_documents() {
        let mut framer = DocumentFramer::new();
        let docs = framer.push(br#"{"a":1} {"b":2}{"c""#);
        assert_eq!(docs, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(framer.push(b":3}\n"), vec![json!({"c": 3})]);
    }

    #[test]
    #[traced_test]
    fn garbage_is_discarded() {
        let mut framer = DocumentFramer::new();
        assert!(framer.push(b"}not json").is_empty());
        assert_eq!(framer.buffered(), 0);
        assert!(logs_contain("Malformed control document"));
        assert_eq!(framer.push(br#"{"ok":true}"#), vec![json!({"ok": true})]);
    }

    #[test]
    fn encodes_compactly() {
        assert_eq!(encode_document(&json!({"status": "ok"})), br#"{"status":"ok"}"#);
    }
}
