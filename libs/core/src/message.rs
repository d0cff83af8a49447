//! Request and response messages and their byte-exact encoding.
//!
//! Request header, after the frame prefix:
//!
//! ```text
//! request_id u64 | version u8 | compressor u8 | serializer u8
//! | service_name (u16 len + utf8) | method_name (u16 len + utf8)
//! | meta_count u16 | meta_count * (key: u16 len + utf8, value: u16 len + utf8)
//! ```
//!
//! followed by the (serialized, then compressed) `data` as the body.
//!
//! Response header:
//!
//! ```text
//! request_id u64 | version u8 | compressor u8 | serializer u8 | error_len u32
//! ```
//!
//! followed by the error text and then `data` as the body. Only `data` is
//! ever compressed.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::frame::{self, MAX_FRAME_SIZE, PREFIX_LEN};

/// Version byte written into every message
pub const PROTOCOL_VERSION: u8 = 1;

/// Meta key carrying the caller's deadline as epoch milliseconds
pub const META_DEADLINE: &str = "deadline";

/// Meta key marking a call as oneway
pub const META_ONEWAY: &str = "one-way";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub request_id: u64,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    pub service_name: String,
    pub method_name: String,
    pub meta: BTreeMap<String, String>,
    pub data: Vec<u8>,
    pub header_length: u32,
    pub body_length: u32,
}

impl Request {
    /// request_id + version + compressor + serializer + two name lengths + meta count
    const FIXED_HEADER: usize = 8 + 1 + 1 + 1 + 2 + 2 + 2;

    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            service_name: service_name.into(),
            method_name: method_name.into(),
            ..Self::default()
        }
    }

    pub fn calculate_header_length(&mut self) {
        let meta: usize = self
            .meta
            .iter()
            .map(|(k, v)| 2 + k.len() + 2 + v.len())
            .sum();
        let len = Self::FIXED_HEADER + self.service_name.len() + self.method_name.len() + meta;
        self.header_length = len as u32;
    }

    pub fn calculate_body_length(&mut self) {
        self.body_length = self.data.len() as u32;
    }

    /// Record an absolute deadline under [`META_DEADLINE`]
    pub fn set_deadline(&mut self, deadline: SystemTime) {
        let millis = match deadline.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        self.meta.insert(META_DEADLINE.to_string(), millis.to_string());
    }

    /// The deadline carried in meta, if present and a valid epoch-millisecond integer
    pub fn deadline(&self) -> Option<SystemTime> {
        let millis: i64 = self.meta.get(META_DEADLINE)?.parse().ok()?;
        if millis >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_millis(millis as u64))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_millis(millis.unsigned_abs()))
        }
    }

    pub fn set_oneway(&mut self) {
        self.meta.insert(META_ONEWAY.to_string(), "true".to_string());
    }

    pub fn is_oneway(&self) -> bool {
        self.meta.get(META_ONEWAY).map(String::as_str) == Some("true")
    }

    /// Recompute both lengths, then write the full frame.
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        self.calculate_header_length();
        self.calculate_body_length();
        check_frame_size(self.header_length as usize + self.data.len())?;

        if self.meta.len() > u16::MAX as usize {
            return Err(Error::InvalidFrame(format!(
                "{} meta entries exceed the wire limit",
                self.meta.len()
            )));
        }

        let mut buf = Vec::with_capacity(PREFIX_LEN + self.header_length as usize + self.data.len());
        buf.put_u32(self.header_length);
        buf.put_u32(self.body_length);
        buf.put_u64(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);
        put_str(&mut buf, "service name", &self.service_name)?;
        put_str(&mut buf, "method name", &self.method_name)?;
        buf.put_u16(self.meta.len() as u16);
        for (key, value) in &self.meta {
            put_str(&mut buf, "meta key", key)?;
            put_str(&mut buf, "meta value", value)?;
        }
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Parse a complete frame as returned by [`frame::read_frame`]
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let (header, body) = frame::split(frame)?;
        let mut reader = FieldReader::new(header);

        let request_id = reader.u64()?;
        let version = reader.u8()?;
        let compressor = reader.u8()?;
        let serializer = reader.u8()?;
        let service_name = reader.string("service name")?;
        let method_name = reader.string("method name")?;

        let count = reader.u16()?;
        let mut meta = BTreeMap::new();
        for _ in 0..count {
            let key = reader.string("meta key")?;
            let value = reader.string("meta value")?;
            meta.insert(key, value);
        }
        reader.finish()?;

        Ok(Self {
            request_id,
            version,
            compressor,
            serializer,
            service_name,
            method_name,
            meta,
            data: body.to_vec(),
            header_length: header.len() as u32,
            body_length: body.len() as u32,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub request_id: u64,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    pub error: Vec<u8>,
    pub data: Vec<u8>,
    pub header_length: u32,
    pub body_length: u32,
}

impl Response {
    /// request_id + version + compressor + serializer + error length
    const FIXED_HEADER: usize = 8 + 1 + 1 + 1 + 4;

    /// An empty response echoing the request's id, version and codec codes
    pub fn for_request(request: &Request) -> Self {
        Self {
            request_id: request.request_id,
            version: request.version,
            compressor: request.compressor,
            serializer: request.serializer,
            ..Self::default()
        }
    }

    pub fn calculate_header_length(&mut self) {
        self.header_length = Self::FIXED_HEADER as u32;
    }

    pub fn calculate_body_length(&mut self) {
        self.body_length = (self.error.len() + self.data.len()) as u32;
    }

    pub fn set_error(&mut self, err: impl std::fmt::Display) {
        self.error = err.to_string().into_bytes();
    }

    /// The remote error text, `None` when the call succeeded
    pub fn error_message(&self) -> Option<String> {
        if self.error.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.error).into_owned())
        }
    }

    /// Recompute both lengths, then write the full frame.
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        self.calculate_header_length();
        self.calculate_body_length();
        check_frame_size(Self::FIXED_HEADER + self.error.len() + self.data.len())?;

        let error_len = u32::try_from(self.error.len())
            .map_err(|_| Error::InvalidFrame("error text exceeds the wire limit".to_string()))?;

        let mut buf =
            Vec::with_capacity(PREFIX_LEN + self.header_length as usize + self.body_length as usize);
        buf.put_u32(self.header_length);
        buf.put_u32(self.body_length);
        buf.put_u64(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);
        buf.put_u32(error_len);
        buf.put_slice(&self.error);
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Parse a complete frame as returned by [`frame::read_frame`]
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let (header, body) = frame::split(frame)?;
        let mut reader = FieldReader::new(header);

        let request_id = reader.u64()?;
        let version = reader.u8()?;
        let compressor = reader.u8()?;
        let serializer = reader.u8()?;
        let error_len = reader.u32()? as usize;
        reader.finish()?;

        if error_len > body.len() {
            return Err(Error::InvalidFrame(format!(
                "error length {} exceeds body of {} bytes",
                error_len,
                body.len()
            )));
        }
        let (error, data) = body.split_at(error_len);

        Ok(Self {
            request_id,
            version,
            compressor,
            serializer,
            error: error.to_vec(),
            data: data.to_vec(),
            header_length: header.len() as u32,
            body_length: body.len() as u32,
        })
    }
}

/// Refuse to build a frame the receiving side would reject
fn check_frame_size(len: usize) -> Result<()> {
    if len > MAX_FRAME_SIZE {
        return Err(Error::InvalidFrame(format!("Message too large: {} bytes", len)));
    }
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, field: &str, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        Error::InvalidFrame(format!("{} of {} bytes exceeds the wire limit", field, value.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked cursor over header bytes
struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::InvalidFrame(format!(
                "header truncated: need {} bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u16()? as usize;
        self.need(len)?;
        let buf: &'a [u8] = self.buf;
        let (raw, rest) = buf.split_at(len);
        self.buf = rest;
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::InvalidFrame(format!("{} is not valid UTF-8", field)))
    }

    fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::InvalidFrame(format!(
                "{} unexpected trailing header bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        let mut request = Request::new("user-service", "GetById");
        request.request_id = 42;
        request.serializer = 1;
        request.compressor = 1;
        request.data = vec![7, 0, 0, 0, 0, 0, 0, 0];
        request
    }

    #[test]
    fn request_roundtrip_without_meta() {
        let mut request = sample_request();
        let bytes = request.encode().unwrap();

        let decoded = Request::decode(&bytes).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.header_length as usize + decoded.body_length as usize + PREFIX_LEN, bytes.len());
    }

    #[test]
    fn request_roundtrip_with_meta_and_empty_data() {
        let mut request = sample_request();
        request.data.clear();
        request.set_oneway();
        request.meta.insert("trace".to_string(), "abc\r\n123".to_string());
        request.set_deadline(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));

        let bytes = request.encode().unwrap();
        let decoded = Request::decode(&bytes).unwrap();

        assert_eq!(decoded, request);
        assert!(decoded.is_oneway());
        assert_eq!(
            decoded.deadline(),
            Some(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123))
        );
        assert_eq!(decoded.body_length, 0);
    }

    #[test]
    fn lengths_follow_content_not_stale_fields() {
        let mut request = sample_request();
        request.header_length = 9999;
        request.body_length = 1;

        let bytes = request.encode().unwrap();
        let expected_header = Request::FIXED_HEADER + "user-service".len() + "GetById".len();
        assert_eq!(request.header_length as usize, expected_header);
        assert_eq!(request.body_length, 8);
        assert_eq!(&bytes[..4], &(expected_header as u32).to_be_bytes());
        assert_eq!(&bytes[4..8], &8u32.to_be_bytes());
    }

    #[test]
    fn header_fields_precede_the_data_segment() {
        let mut request = sample_request();
        let bytes = request.encode().unwrap();
        let body_start = PREFIX_LEN + request.header_length as usize;
        assert_eq!(&bytes[body_start..], request.data.as_slice());
    }

    #[test]
    fn invalid_deadline_is_ignored() {
        let mut request = sample_request();
        request.meta.insert(META_DEADLINE.to_string(), "soon".to_string());
        assert_eq!(request.deadline(), None);

        request.meta.insert(META_ONEWAY.to_string(), "yes".to_string());
        assert!(!request.is_oneway());
    }

    #[test]
    fn response_roundtrip_with_error_and_data() {
        let request = sample_request();
        let mut response = Response::for_request(&request);
        response.data = b"partial".to_vec();
        response.set_error("mock error");

        let bytes = response.encode().unwrap();
        let decoded = Response::decode(&bytes).unwrap();

        assert_eq!(decoded, response);
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.error_message().as_deref(), Some("mock error"));
        assert_eq!(decoded.data, b"partial");
        assert_eq!(decoded.body_length as usize, "mock error".len() + "partial".len());
    }

    #[test]
    fn empty_response_roundtrip() {
        let mut response = Response::default();
        let bytes = response.encode().unwrap();
        assert_eq!(bytes.len(), PREFIX_LEN + Response::FIXED_HEADER);

        let decoded = Response::decode(&bytes).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.error_message(), None);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let mut request = sample_request();
        let bytes = request.encode().unwrap();

        // Shrink the announced header so the method name runs past it
        let mut broken = bytes.clone();
        let header_length = request.header_length - 4;
        broken[..4].copy_from_slice(&header_length.to_be_bytes());
        broken[4..8].copy_from_slice(&(request.body_length + 4).to_be_bytes());

        assert!(matches!(Request::decode(&broken), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn response_error_length_is_bounded_by_body() {
        let mut response = Response::default();
        response.set_error("boom");
        let mut bytes = response.encode().unwrap();

        // error_len sits in the last four header bytes
        let at = PREFIX_LEN + Response::FIXED_HEADER - 4;
        bytes[at..at + 4].copy_from_slice(&100u32.to_be_bytes());

        assert!(matches!(Response::decode(&bytes), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn frames_past_the_reader_limit_are_not_encoded() {
        let mut request = Request::new("svc", "Method");
        request.data = vec![0u8; MAX_FRAME_SIZE];
        match request.encode() {
            Err(Error::InvalidFrame(msg)) => assert!(msg.contains("too large")),
            other => panic!("expected InvalidFrame, got {:?}", other.map(|b| b.len())),
        }

        let mut response = Response::default();
        response.data = vec![0u8; MAX_FRAME_SIZE];
        assert!(matches!(response.encode(), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let mut request = Request::new("s".repeat(u16::MAX as usize + 1), "m");
        assert!(matches!(request.encode(), Err(Error::InvalidFrame(_))));
    }
}
