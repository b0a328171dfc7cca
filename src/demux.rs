//! # Inbound Message Demultiplexer
//!
//! Pulls `+MQTTSUBRECV:<link>,"<topic>",<len>,<payload>` notifications out of
//! the receive stream while leaving everything else (command responses that
//! happen to be interleaved) where it is.
//!
//! Scanning is tolerant of partial input. A frame that has started but has
//! neither a line break nor [`MIN_FRAME_LEN`] bytes yet is left alone until
//! more bytes arrive. A frame whose length field claims more bytes than were
//! received is surfaced as truncated instead of reading past the data, and
//! a frame whose header is garbage is dropped.

use core::ops::Range;

use heapless::{String, Vec};

use crate::command::MAX_TOPIC_LEN;
use crate::ring::RxBuffer;
use crate::util::{self, ScanError, expect_byte, read_decimal, read_quoted};

/// Prefix of every inbound publish notification.
pub const FRAME_MARKER: &[u8] = b"+MQTTSUBRECV:";

/// An unterminated frame shorter than this is assumed to still be arriving.
pub const MIN_FRAME_LEN: usize = 40;

/// Largest payload kept from a single inbound message.
pub const MAX_INBOUND_PAYLOAD: usize = 512;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    topic: String<MAX_TOPIC_LEN>,
    payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
    declared_len: usize,
    truncated: bool,
}

impl InboundMessage {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }

    /// Length announced by the modem, which may exceed `payload().len()`.
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    /// `true` if fewer payload bytes were kept than the modem announced.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn from_parts(topic: &str, payload: &[u8], declared_len: usize, cut_short: bool) -> Option<Self> {
        let mut owned_topic = String::new();
        owned_topic.push_str(topic).ok()?;
        let kept = &payload[..payload.len().min(MAX_INBOUND_PAYLOAD)];
        let mut owned_payload = Vec::new();
        owned_payload.extend_from_slice(kept).ok()?;
        Some(Self {
            topic: owned_topic,
            payload: owned_payload,
            declared_len,
            truncated: cut_short || kept.len() < payload.len(),
        })
    }
}

/// Outcome of scanning received bytes for a frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan<'a> {
    /// No frame marker in the data.
    Empty,
    /// A frame has started but more bytes are needed.
    Pending,
    /// A complete frame occupying `span` of the scanned bytes.
    Frame {
        span: Range<usize>,
        topic: &'a str,
        payload: &'a [u8],
    },
    /// The length field runs past the received data. `payload` holds what
    /// was actually there.
    Truncated {
        span: Range<usize>,
        topic: &'a str,
        payload: &'a [u8],
        declared_len: usize,
    },
    /// The marker is followed by something that is not a frame header.
    /// `span` covers the bytes to drop.
    Malformed { span: Range<usize> },
}

/// Finds the first frame in `data` without modifying anything.
pub fn scan(data: &[u8]) -> Scan<'_> {
    let Some(start) = util::find(data, FRAME_MARKER) else {
        return Scan::Empty;
    };
    let line_end = util::find_from(data, b"\n", start);
    if line_end.is_none() && data.len() - start < MIN_FRAME_LEN {
        return Scan::Pending;
    }

    let mut cursor = start + FRAME_MARKER.len();
    let header = read_header(&mut cursor, data);
    let (topic, declared_len) = match header {
        Ok(h) => h,
        Err(ScanError::Incomplete) => return Scan::Pending,
        Err(ScanError::Malformed) => {
            let end = line_end.map_or(start + FRAME_MARKER.len(), |e| e + 1);
            return Scan::Malformed { span: start..end };
        }
    };

    let available = data.len() - cursor;
    if declared_len <= available {
        let payload = &data[cursor..cursor + declared_len];
        let mut end = cursor + declared_len;
        if data[end..].starts_with(b"\r\n") {
            end += 2;
        } else if data[end..].starts_with(b"\n") {
            end += 1;
        }
        return Scan::Frame {
            span: start..end,
            topic,
            payload,
        };
    }

    // Claimed length overruns the data: keep what belongs to this line.
    let (payload_end, end) = match line_end {
        Some(eol) if eol >= cursor => {
            let body = &data[cursor..eol];
            (cursor + body.trim_ascii_end().len(), eol + 1)
        }
        _ => (data.len(), data.len()),
    };
    Scan::Truncated {
        span: start..end,
        topic,
        payload: &data[cursor..payload_end],
        declared_len,
    }
}

fn read_header<'a>(cursor: &mut usize, data: &'a [u8]) -> Result<(&'a str, usize), ScanError> {
    // Link id, always 0 in practice.
    read_decimal(cursor, data, b',')?;
    let topic = read_quoted(cursor, data, MAX_TOPIC_LEN)?;
    expect_byte(cursor, data, b',')?;
    let len = read_decimal(cursor, data, b',')?;
    Ok((topic, len))
}

/// Extracts the next inbound message from `rx`, if a complete one is there.
///
/// Only the bytes of the recognised frame are consumed; anything before or
/// after it stays in the buffer. Malformed frames are logged and dropped.
/// A truncated frame is returned with [`InboundMessage::is_truncated`] set.
pub fn try_extract<const N: usize>(rx: &RxBuffer<N>) -> Option<InboundMessage> {
    loop {
        let snapshot = rx.snapshot();
        match scan(&snapshot) {
            Scan::Empty | Scan::Pending => return None,
            Scan::Frame {
                span,
                topic,
                payload,
            } => {
                let message = InboundMessage::from_parts(topic, payload, payload.len(), false);
                rx.excise(&snapshot, span);
                if let Some(m) = &message {
                    debug!("rx publish on {} ({} bytes)", m.topic(), payload.len());
                }
                return message;
            }
            Scan::Truncated {
                span,
                topic,
                payload,
                declared_len,
            } => {
                warn!(
                    "malformed frame on {}: declared {} bytes, got {}",
                    topic,
                    declared_len,
                    payload.len()
                );
                let message = InboundMessage::from_parts(topic, payload, declared_len, true);
                rx.excise(&snapshot, span);
                return message;
            }
            Scan::Malformed { span } => {
                warn!("dropping malformed frame ({} bytes)", span.len());
                rx.excise(&snapshot, span);
            }
        }
    }
}
