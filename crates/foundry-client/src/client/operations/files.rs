//! File upload and directory browsing
//!
//! Uploads go over HTTP with the session cookie; browsing rides the socket
//! as a `manageFiles` event. A listing carries no usable correlation id, so
//! the browse matcher is structural: a payload is a listing if it has `dirs`.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::FoundryClient;
use crate::correlator::{ResponseMatcher, truthy};
use crate::error::{FoundryError, FoundryResult};

/// Extensions listed when a browse request names none.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 10] = [
    ".apng", ".avif", ".bmp", ".gif", ".jpeg", ".jpg", ".png", ".svg", ".tiff", ".webp",
];

const OCTET_STREAM: &str = "application/octet-stream";

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes base64 the way browsers and Node accept it: whitespace anywhere
/// (line-wrapped MIME output), URL-safe `-`/`_` digits, optional padding.
pub fn decode_base64(data: &str) -> FoundryResult<Vec<u8>> {
    let normalized: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    LENIENT_BASE64
        .decode(normalized)
        .map_err(|e| FoundryError::InvalidArgument(format!("Invalid base64 image_data: {e}")))
}

/// Where the uploaded bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Downloaded first, following redirects
    Url(String),
    /// Base64 encoded file contents
    Base64(String),
}

impl UploadSource {
    /// Exactly one of `url` and `image_data` must be non-empty.
    ///
    /// # Errors
    ///
    /// [`FoundryError::InvalidArgument`] when both or neither are given.
    pub fn from_parts(url: Option<String>, image_data: Option<String>) -> FoundryResult<Self> {
        let url = url.filter(|s| !s.is_empty());
        let image_data = image_data.filter(|s| !s.is_empty());
        match (url, image_data) {
            (Some(_), Some(_)) => Err(FoundryError::InvalidArgument(
                "Cannot provide both 'url' and 'image_data'. Please provide exactly one.".into(),
            )),
            (None, None) => Err(FoundryError::InvalidArgument(
                "Must provide either 'url' or 'image_data'. Please provide exactly one.".into(),
            )),
            (Some(url), None) => Ok(Self::Url(url)),
            (None, Some(data)) => Ok(Self::Base64(data)),
        }
    }
}

/// Where an upload landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// Server path of the stored file
    pub path: String,
    /// Server message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A directory listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseRequest {
    /// Directory to list, e.g. `worlds/myworld/assets`
    pub target: String,
    /// File type filter
    pub file_type: String,
    /// Extensions to list, with leading dots
    pub extensions: Vec<String>,
}

impl BrowseRequest {
    /// Image listing of `target` with the default extensions.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            file_type: "image".into(),
            extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Override the type filter.
    pub fn with_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    /// Override the extension filter.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    fn payload(&self) -> Value {
        json!([
            "manageFiles",
            {
                "action": "browseFiles",
                "storage": "data",
                "target": self.target,
            },
            {
                "type": self.file_type,
                "extensions": self.extensions,
                "wildcard": false,
                "render": true,
            }
        ])
    }
}

/// MIME type inferred from a file name's extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        "apng" => "image/apng",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => OCTET_STREAM,
    }
}

/// Interprets the `/upload` response; JSON bodies are trusted over the status.
///
/// # Errors
///
/// [`FoundryError::Server`] for an `error` field or a non-JSON failure status.
pub fn interpret_upload_response(
    status: u16,
    body: &str,
    target: &str,
    filename: &str,
) -> FoundryResult<UploadOutcome> {
    let fallback = || format!("{target}/{filename}");
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => {
            if let Some(error) = parsed.get("error")
                && truthy(Some(error))
            {
                return Err(FoundryError::server("Upload", error));
            }
            let path = parsed
                .get("path")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map_or_else(fallback, str::to_string);
            let message = parsed.get("message").and_then(Value::as_str).map(str::to_string);
            Ok(UploadOutcome { path, message })
        }
        Err(_) if (200..300).contains(&status) => Ok(UploadOutcome {
            path: fallback(),
            message: Some("Upload completed".into()),
        }),
        Err(_) => Err(FoundryError::Server {
            operation: "Upload",
            message: format!("status {status}: {body}"),
        }),
    }
}

impl FoundryClient {
    /// Uploads a file to `target/filename` on the connected server.
    ///
    /// Arguments are validated before anything touches the network.
    pub async fn upload_file(
        &self,
        target: &str,
        filename: &str,
        url: Option<String>,
        image_data: Option<String>,
    ) -> FoundryResult<UploadOutcome> {
        let source = UploadSource::from_parts(url, image_data)?;
        let session = self.session()?;

        let (bytes, content_type) = match source {
            UploadSource::Url(url) => self.download(&url).await?,
            UploadSource::Base64(data) => {
                let bytes = decode_base64(&data)?;
                (bytes, content_type_for(filename).to_string())
            }
        };
        debug!("Uploading {} bytes as {}", bytes.len(), content_type);

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(&content_type)
            .map_err(|e| FoundryError::InvalidArgument(format!("Invalid content type {content_type}: {e}")))?;
        let form = Form::new()
            .text("source", "data")
            .text("target", target.to_string())
            .part("upload", part)
            .text("bucket", "null");

        let url = format!(
            "{}://{}/upload",
            self.inner.config.http_scheme(),
            session.hostname
        );
        let request_error = |e: reqwest::Error| FoundryError::Request {
            operation: "POST /upload",
            host: session.hostname.clone(),
            reason: e.to_string(),
        };
        let response = self
            .inner
            .http
            .post(&url)
            .header(COOKIE, format!("session={}", session.session_id))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;

        let outcome = interpret_upload_response(status, &body, target, filename)?;
        info!("Uploaded {} to {}", filename, outcome.path);
        Ok(outcome)
    }

    async fn download(&self, url: &str) -> FoundryResult<(Vec<u8>, String)> {
        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FoundryError::Download(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FoundryError::Download(format!("HTTP {}", status.as_u16())));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(OCTET_STREAM)
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FoundryError::Download(e.to_string()))?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Lists a directory of the server's data storage.
    ///
    /// # Errors
    ///
    /// [`FoundryError::Server`] when the server reports an error,
    /// a timeout when no listing arrives.
    pub async fn browse_files(&self, request: &BrowseRequest) -> FoundryResult<Value> {
        let socket = self.socket()?;
        self.inner
            .correlator
            .emit(
                &socket,
                &request.payload(),
                ResponseMatcher::FileListing,
                "browseFiles response",
                None,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn source_requires_exactly_one() {
        let both = UploadSource::from_parts(Some("http://x/a.png".into()), Some("AAAA".into()));
        assert!(both.unwrap_err().to_string().starts_with("Cannot provide both"));

        let neither = UploadSource::from_parts(Some(String::new()), None);
        assert!(neither.unwrap_err().to_string().starts_with("Must provide either"));

        assert_eq!(
            UploadSource::from_parts(Some(String::new()), Some("AAAA".into())).unwrap(),
            UploadSource::Base64("AAAA".into())
        );
    }

    #[test]
    fn base64_accepts_wrapped_and_url_safe_input() {
        let bytes: Vec<u8> = (0..=255).collect();
        let standard = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let wrapped = standard
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert_eq!(decode_base64(&wrapped).unwrap(), bytes);

        let url_safe = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(decode_base64(&url_safe).unwrap(), bytes);
        assert_eq!(decode_base64(" aGk= \n").unwrap(), b"hi");

        let err = decode_base64("not*base64").unwrap_err();
        assert!(err.to_string().contains("Invalid base64 image_data"), "{err}");
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("token.PNG"), "image/png");
        assert_eq!(content_type_for("map.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("theme.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("archive.tar.gz"), OCTET_STREAM);
        assert_eq!(content_type_for("README"), OCTET_STREAM);
    }

    #[test]
    fn upload_response_variants() {
        let ok = interpret_upload_response(200, r#"{"path":"a/b.png","message":"saved"}"#, "a", "b.png");
        assert_eq!(
            ok.unwrap(),
            UploadOutcome {
                path: "a/b.png".into(),
                message: Some("saved".into())
            }
        );

        let no_path = interpret_upload_response(200, r#"{"status":"success"}"#, "dir", "f.png").unwrap();
        assert_eq!(no_path.path, "dir/f.png");

        let rejected = interpret_upload_response(200, r#"{"error":"forbidden"}"#, "d", "f").unwrap_err();
        assert_eq!(rejected.to_string(), "Upload failed: forbidden");

        let plain = interpret_upload_response(204, "", "d", "f").unwrap();
        assert_eq!(plain.message.as_deref(), Some("Upload completed"));

        let failed = interpret_upload_response(500, "boom", "d", "f").unwrap_err();
        assert_eq!(failed.to_string(), "Upload failed: status 500: boom");
    }

    #[test]
    fn browse_payload_shape() {
        let payload = BrowseRequest::new("worlds/w/assets").payload();
        assert_eq!(payload[0], "manageFiles");
        assert_eq!(
            payload[1],
            json!({"action": "browseFiles", "storage": "data", "target": "worlds/w/assets"})
        );
        assert_eq!(payload[2]["type"], "image");
        assert_eq!(payload[2]["extensions"].as_array().map(Vec::len), Some(10));
        assert_eq!(payload[2]["wildcard"], false);
    }
}
