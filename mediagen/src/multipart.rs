//! `multipart/form-data` bodies for uploads.

use bytes::Bytes;

/// A finished multipart body together with its `Content-Type` header value.
#[derive(Debug, Clone)]
pub struct Multipart {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug)]
pub struct MultipartBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBuilder {
    pub fn new() -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        Self::with_boundary(format!("----FormBoundary{nanos:x}"))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: vec![],
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn add_field(mut self, name: &str, value: &str) -> Self {
        self.open_part(name, None);
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn add_file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.open_part(name, Some(filename));
        self.body.extend_from_slice(b"Content-Type: ");
        self.body.extend_from_slice(content_type.as_bytes());
        self.body.extend_from_slice(b"\r\n\r\n");
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn build(mut self) -> Multipart {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");

        Multipart {
            content_type: format!("multipart/form-data; boundary={}", self.boundary),
            body: Bytes::from(self.body),
        }
    }

    fn open_part(&mut self, name: &str, filename: Option<&str>) {
        let mut header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            quote(name)
        );
        if let Some(filename) = filename {
            header.push_str(&format!("; filename=\"{}\"", quote(filename)));
        }
        header.push_str("\r\n");
        self.body.extend_from_slice(header.as_bytes());
    }
}

// quoted-string in a Content-Disposition header: no raw quotes or line breaks
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
