use bytes::{BufMut, Bytes, BytesMut};

pub const BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

/// One named part of a `multipart/mixed` body.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
}

impl Part {
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Frames `parts` in order and returns the body with the boundary used.
pub fn encode(parts: &[Part]) -> (Bytes, &'static str) {
    let mut out = BytesMut::new();
    for part in parts {
        out.put_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        out.put_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
        );
        for (name, value) in &part.headers {
            out.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.put_slice(b"\r\n");
        out.put_slice(&part.body);
        out.put_slice(b"\r\n");
    }
    out.put_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (out.freeze(), BOUNDARY)
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}
