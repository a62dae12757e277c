//! Length-delimited frame reassembly.
//!
//! Bytes arrive in arbitrary chunks. The framer keeps only the bytes of
//! the frame currently being assembled and hands out each complete frame
//! exactly once.

use std::marker::PhantomData;

use bytes::{Buf, Bytes, BytesMut};

use crate::openflow::{self, ProtocolError};

/// Where a protocol keeps its total-length field.
pub trait LengthPrefix {
    /// Bytes needed before the frame length can be read.
    const HEADER_LEN: usize;

    /// Total frame length (header included) declared by `header`.
    fn frame_len(header: &[u8]) -> usize;
}

/// OpenFlow: 16-bit big-endian length at offset 2.
#[derive(Debug, Default)]
pub struct OpenFlowPrefix;

impl LengthPrefix for OpenFlowPrefix {
    const HEADER_LEN: usize = openflow::HEADER_LEN;

    fn frame_len(header: &[u8]) -> usize {
        u16::from_be_bytes([header[2], header[3]]) as usize
    }
}

#[derive(Debug)]
pub struct Framer<P> {
    buf: BytesMut,
    _prefix: PhantomData<P>,
}

pub type OpenFlowFramer = Framer<OpenFlowPrefix>;

impl<P: LengthPrefix> Default for Framer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: LengthPrefix> Framer<P> {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            _prefix: PhantomData,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Takes the next complete frame, if any.
    ///
    /// A header declaring a length shorter than itself cannot be framed.
    /// Its header bytes are dropped and the error returned; the following
    /// bytes are then treated as the next header.
    pub fn next_frame(&mut self) -> Option<Result<Bytes, ProtocolError>> {
        if self.buf.len() < P::HEADER_LEN {
            return None;
        }
        let declared = P::frame_len(&self.buf[..P::HEADER_LEN]);
        if declared < P::HEADER_LEN {
            self.buf.advance(P::HEADER_LEN);
            return Some(Err(ProtocolError::BadLength {
                declared,
                minimum: P::HEADER_LEN,
            }));
        }
        if self.buf.len() < declared {
            return None;
        }
        Some(Ok(self.buf.split_to(declared).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow::{echo_request, hello, Header, MessageType};
    use proptest::prelude::*;

    #[test]
    fn waits_for_complete_frames() {
        let message = echo_request(5, b"keepalive");
        let mut framer = OpenFlowFramer::new();

        framer.push(&message[..3]);
        assert!(framer.next_frame().is_none());
        framer.push(&message[3..10]);
        assert!(framer.next_frame().is_none());
        framer.push(&message[10..]);
        assert_eq!(framer.next_frame(), Some(Ok(message)));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn splits_back_to_back_frames_and_keeps_the_tail() {
        let first = hello(1);
        let second = echo_request(2, &[0xab; 4]);
        let mut stream = Vec::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&second[..5]);

        let mut framer = OpenFlowFramer::new();
        framer.push(&stream);
        assert_eq!(framer.next_frame(), Some(Ok(first)));
        assert_eq!(framer.next_frame(), Some(Ok(second)));
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.buffered(), 5);
    }

    #[test]
    fn undersized_length_is_skipped() {
        let mut framer = OpenFlowFramer::new();
        framer.push(&[1, 0, 0, 4, 0, 0, 0, 1]);
        framer.push(&hello(9));

        assert_eq!(
            framer.next_frame(),
            Some(Err(ProtocolError::BadLength {
                declared: 4,
                minimum: 8
            }))
        );
        let frame = framer.next_frame().unwrap().unwrap();
        let header = Header::parse(&frame).unwrap();
        assert_eq!(header.message_type(), Ok(MessageType::Hello));
        assert_eq!(header.xid, 9);
    }

    proptest! {
        #[test]
        fn reassembles_any_chunking(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
            cuts in prop::collection::vec(1usize..17, 1..40),
        ) {
            let messages: Vec<Bytes> = payloads
                .iter()
                .enumerate()
                .map(|(xid, payload)| echo_request(xid as u32, payload))
                .collect();
            let stream: Vec<u8> = messages.iter().flat_map(|m| m.iter().copied()).collect();

            let mut framer = OpenFlowFramer::new();
            let mut frames = Vec::new();
            let mut offset = 0;
            for cut in cuts.iter().cycle() {
                if offset >= stream.len() {
                    break;
                }
                let end = (offset + cut).min(stream.len());
                framer.push(&stream[offset..end]);
                offset = end;
                while let Some(frame) = framer.next_frame() {
                    frames.push(frame.unwrap());
                }
            }

            prop_assert_eq!(frames, messages);
            prop_assert_eq!(framer.buffered(), 0);
        }
    }
}
