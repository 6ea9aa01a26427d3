//! Multipart file normalization and `multipart/form-data` encoding.
//!
//! A file entry is a field name plus a file spec. The spec is bare content,
//! or a file name with content, optionally followed by a content type and
//! per-part headers. Every entry is resolved to a [`MultipartFile`] carrying
//! all five pieces.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::body::{BodyStream, RawBody};
use crate::error::NormalizeError;
use crate::headers::{HeaderInput, Headers, normalize_headers};

const PARAM: &str = "files";

/// Content type used when a file spec does not name one.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Content of a single file part.
pub enum FileSource {
    Text(String),
    Bytes(Vec<u8>),
    Buffer(Bytes),
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<&str> for FileSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FileSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for FileSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for FileSource {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<Bytes> for FileSource {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl FileSource {
    fn into_raw(self) -> RawBody {
        match self {
            Self::Text(text) => RawBody::Bytes(Bytes::from(text)),
            Self::Bytes(bytes) => RawBody::Bytes(Bytes::from(bytes)),
            Self::Buffer(bytes) => RawBody::Bytes(bytes),
            Self::Reader(reader) => RawBody::Stream(BodyStream::new(reader)),
        }
    }
}

/// File spec shapes, from bare content up to the full four-element form.
#[derive(Debug)]
pub enum FileSpec {
    /// Content only; the file name defaults to the field name.
    Content(FileSource),
    /// (file name, content)
    Named(String, FileSource),
    /// (file name, content, content type)
    Typed(String, FileSource, String),
    /// (file name, content, content type, headers)
    Full(String, FileSource, String, HeaderInput),
}

impl<S: Into<FileSource>> From<(&str, S)> for FileSpec {
    fn from((file_name, content): (&str, S)) -> Self {
        Self::Named(file_name.to_string(), content.into())
    }
}

impl<S: Into<FileSource>> From<(&str, S, &str)> for FileSpec {
    fn from((file_name, content, content_type): (&str, S, &str)) -> Self {
        Self::Typed(file_name.to_string(), content.into(), content_type.to_string())
    }
}

impl<S: Into<FileSource>, H: Into<HeaderInput>> From<(&str, S, &str, H)> for FileSpec {
    fn from((file_name, content, content_type, headers): (&str, S, &str, H)) -> Self {
        Self::Full(
            file_name.to_string(),
            content.into(),
            content_type.to_string(),
            headers.into(),
        )
    }
}

/// Accepted shapes for the `files` request parameter.
#[derive(Debug)]
pub enum MultipartInput {
    /// Ordered (field name, file spec) entries.
    List(Vec<(String, FileSpec)>),
    /// Field name → file spec, iterated in key order.
    Map(BTreeMap<String, FileSpec>),
}

impl From<Vec<(String, FileSpec)>> for MultipartInput {
    fn from(entries: Vec<(String, FileSpec)>) -> Self {
        Self::List(entries)
    }
}

impl From<BTreeMap<String, FileSpec>> for MultipartInput {
    fn from(entries: BTreeMap<String, FileSpec>) -> Self {
        Self::Map(entries)
    }
}

/// A fully resolved file part.
#[derive(Debug, Serialize)]
pub struct MultipartFile {
    pub field_name: String,
    pub file_name: String,
    #[serde(skip)]
    pub content: RawBody,
    pub content_type: String,
    pub headers: Headers,
}

/// Ordered, fully resolved file parts.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct MultipartFiles {
    files: Vec<MultipartFile>,
}

impl MultipartFiles {
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MultipartFile> {
        self.files.iter()
    }

    /// First part submitted under `field_name`.
    #[must_use]
    pub fn get(&self, field_name: &str) -> Option<&MultipartFile> {
        self.files.iter().find(|file| file.field_name == field_name)
    }

    /// Encodes every part as a `multipart/form-data` body.
    ///
    /// Stream contents are read to the end.
    ///
    /// # Errors
    ///
    /// Propagates read errors from stream contents.
    #[instrument(level = "debug", skip(self))]
    pub fn encode(self, boundary: &str) -> std::io::Result<Bytes> {
        let mut out = Vec::new();
        let part_count = self.files.len();
        for file in self.files {
            write!(out, "--{boundary}\r\n")?;
            write!(
                out,
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quoted(&file.field_name),
                escape_quoted(&file.file_name)
            )?;
            if !file.headers.contains("content-type") {
                write!(out, "Content-Type: {}\r\n", file.content_type)?;
            }
            for (name, value) in file.headers.iter() {
                if name.eq_ignore_ascii_case("content-disposition") {
                    continue;
                }
                write!(out, "{name}: {value}\r\n")?;
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&file.content.into_bytes()?);
            out.extend_from_slice(b"\r\n");
        }
        write!(out, "--{boundary}--\r\n")?;
        debug!(parts = part_count, bytes = out.len(), "encoded multipart body");
        Ok(Bytes::from(out))
    }
}

/// `Content-Type` header value for a multipart body with `boundary`.
#[must_use]
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Generates a random 32-character hexadecimal boundary.
#[must_use]
pub fn generate_boundary() -> String {
    let raw: [u8; 16] = rand::thread_rng().r#gen();
    raw.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Normalizes any accepted files shape into [`MultipartFiles`].
///
/// # Errors
///
/// Returns [`NormalizeError::ShapeIncomplete`] when a field name or an
/// explicit file name is empty, and propagates header errors from the
/// four-element form.
#[instrument(level = "debug", skip(input))]
pub fn normalize_files(input: MultipartInput) -> Result<MultipartFiles, NormalizeError> {
    let entries: Vec<(String, FileSpec)> = match input {
        MultipartInput::List(entries) => entries,
        MultipartInput::Map(map) => map.into_iter().collect(),
    };

    let mut files = Vec::with_capacity(entries.len());
    for (field_name, spec) in entries {
        if field_name.is_empty() {
            return Err(NormalizeError::incomplete(
                PARAM,
                "(field name, file spec) entry",
                "field name",
            ));
        }
        files.push(resolve_file(field_name, spec)?);
    }

    debug!(count = files.len(), "normalized multipart files");
    Ok(MultipartFiles { files })
}

fn resolve_file(field_name: String, spec: FileSpec) -> Result<MultipartFile, NormalizeError> {
    let (file_name, content, content_type, headers) = match spec {
        FileSpec::Content(content) => (field_name.clone(), content, None, Headers::new()),
        FileSpec::Named(name, content) => (
            checked_file_name(name, "(file name, content)")?,
            content,
            None,
            Headers::new(),
        ),
        FileSpec::Typed(name, content, content_type) => (
            checked_file_name(name, "(file name, content, content type)")?,
            content,
            Some(content_type),
            Headers::new(),
        ),
        FileSpec::Full(name, content, content_type, headers) => (
            checked_file_name(name, "(file name, content, content type, headers)")?,
            content,
            Some(content_type),
            normalize_headers(headers)?,
        ),
    };

    let content_type = content_type
        .map(|ct| ct.trim().to_string())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_CONTENT_TYPE.to_string());

    Ok(MultipartFile {
        field_name,
        file_name,
        content: content.into_raw(),
        content_type,
        headers,
    })
}

fn checked_file_name(name: String, shape: &'static str) -> Result<String, NormalizeError> {
    if name.is_empty() {
        return Err(NormalizeError::incomplete(PARAM, shape, "file name"));
    }
    Ok(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn list(entries: Vec<(&str, FileSpec)>) -> MultipartInput {
        MultipartInput::List(
            entries
                .into_iter()
                .map(|(field, spec)| (field.to_string(), spec))
                .collect(),
        )
    }

    #[test]
    fn test_named_file_defaults_content_type_and_headers() {
        let files = normalize_files(list(vec![("field", ("name.txt", b"data").into())])).unwrap();
        let file = files.get("field").unwrap();
        assert_eq!(file.file_name, "name.txt");
        assert_eq!(file.content_type, DEFAULT_FILE_CONTENT_TYPE);
        assert!(file.headers.is_empty());
        assert_eq!(file.content.len(), Some(4));
    }

    #[test]
    fn test_full_file_keeps_content_type_and_headers() {
        let spec: FileSpec = ("name.txt", b"data", "text/plain", [("X-Foo", "bar")]).into();
        let files = normalize_files(list(vec![("field", spec)])).unwrap();
        let file = files.get("field").unwrap();
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(file.headers.get("x-foo"), Some("bar"));
    }

    #[test]
    fn test_bare_content_uses_field_name_as_file_name() {
        let files =
            normalize_files(list(vec![("upload", FileSpec::Content("hello".into()))])).unwrap();
        assert_eq!(files.get("upload").unwrap().file_name, "upload");
    }

    #[test]
    fn test_blank_content_type_falls_back_to_default() {
        let files = normalize_files(list(vec![("f", ("a.bin", b"x", "  ").into())])).unwrap();
        assert_eq!(files.get("f").unwrap().content_type, DEFAULT_FILE_CONTENT_TYPE);
    }

    #[test]
    fn test_map_input_is_ordered_by_field_name() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), FileSpec::Content("2".into()));
        map.insert("a".to_string(), FileSpec::Content("1".into()));
        let files = normalize_files(map.into()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_field_name_is_shape_incomplete() {
        let err = normalize_files(list(vec![("", ("a.txt", b"x").into())])).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ShapeIncomplete { missing: "field name", .. }
        ));
    }

    #[test]
    fn test_empty_file_name_is_shape_incomplete() {
        let err = normalize_files(list(vec![("f", ("", b"x").into())])).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ShapeIncomplete { missing: "file name", .. }
        ));
    }

    #[test]
    fn test_encode_produces_form_data() {
        let spec: FileSpec = ("a.txt", b"hi", "text/plain", [("X-Foo", "bar")]).into();
        let stream = FileSpec::Named(
            "b.bin".to_string(),
            FileSource::Reader(Box::new(Cursor::new(b"raw".to_vec()))),
        );
        let files = normalize_files(list(vec![("one", spec), ("two", stream)])).unwrap();
        let body = files.encode("XYZ").unwrap();
        let expected = "--XYZ\r\n\
Content-Disposition: form-data; name=\"one\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
X-Foo: bar\r\n\
\r\n\
hi\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"two\"; filename=\"b.bin\"\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
raw\r\n\
--XYZ--\r\n";
        assert_eq!(std::str::from_utf8(&body).unwrap(), expected);
    }

    #[test]
    fn test_encode_escapes_quotes_in_names() {
        let files = normalize_files(list(vec![("f\"x", ("a\"b.txt", b"").into())])).unwrap();
        let body = files.encode("B").unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("name=\"f%22x\"; filename=\"a%22b.txt\""));
    }

    #[test]
    fn test_generate_boundary_shape() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(multipart_content_type(&a), format!("multipart/form-data; boundary={a}"));
    }
}
