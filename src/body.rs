//! Request bodies: JSON documents, URL-encoded forms, and multipart uploads.
//!
//! The three encodings are mutually exclusive; the variant decides the `Content-Type`.

use crate::error::RestError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::distr::Alphanumeric;
use rand::{rng, Rng};
use serde::Serialize;

const BOUNDARY_LEN: usize = 30;

/// Encoded request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Pre-serialized JSON document.
    Json(Bytes),
    /// `application/x-www-form-urlencoded` key/value pairs, in order.
    Form(Vec<(String, String)>),
    Multipart(Multipart),
}

impl Body {
    /// Serialize `value` as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, RestError> {
        serde_json::to_vec(value).map(|raw| Body::Json(Bytes::from(raw))).map_err(RestError::Encode)
    }

    pub fn form<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Body::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn content_type(&self) -> String {
        match self {
            Body::Json(_) => "application/json".to_owned(),
            Body::Form(_) => "application/x-www-form-urlencoded".to_owned(),
            Body::Multipart(multipart) => multipart.content_type(),
        }
    }

    /// Wire bytes of the body.
    pub fn encode(&self) -> Bytes {
        match self {
            Body::Json(raw) => raw.clone(),
            Body::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .finish();
                Bytes::from(encoded)
            }
            Body::Multipart(multipart) => multipart.encode(),
        }
    }
}

impl From<Multipart> for Body {
    fn from(multipart: Multipart) -> Self {
        Body::Multipart(multipart)
    }
}

/// One file attached to a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// `multipart/form-data` body with an optional `payload_json` part followed by file parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    boundary: String,
    payload_json: Option<Bytes>,
    files: Vec<FilePart>,
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    /// Empty body with a random boundary.
    pub fn new() -> Self {
        let boundary = rng()
            .sample_iter(Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();
        Self { boundary, payload_json: None, files: Vec::new() }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Attach the JSON part of the message.
    pub fn payload_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, RestError> {
        let raw = serde_json::to_vec(value).map_err(RestError::Encode)?;
        self.payload_json = Some(Bytes::from(raw));
        Ok(self)
    }

    /// Attach a file as `files[n]`, where `n` is its position among the files.
    pub fn file(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let name = format!("files[{}]", self.files.len());
        self.files.push(FilePart {
            name,
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        if let Some(payload) = &self.payload_json {
            self.part_header(
                &mut out,
                "form-data; name=\"payload_json\"",
                "application/json",
            );
            out.put_slice(payload);
            out.put_slice(b"\r\n");
        }
        for file in &self.files {
            let disposition = format!(
                "form-data; name=\"{}\"; filename=\"{}\"",
                file.name,
                escape_quotes(&file.filename)
            );
            self.part_header(&mut out, &disposition, &file.content_type);
            out.put_slice(&file.data);
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out.freeze()
    }

    fn part_header(&self, out: &mut BytesMut, disposition: &str, content_type: &str) {
        out.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        out.put_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        out.put_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    }
}

fn escape_quotes(name: &str) -> String {
    name.replace('"', "%22")
}
