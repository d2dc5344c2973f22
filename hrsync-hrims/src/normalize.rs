//! Response Normalizer.
//!
//! HRIMS returns the same artifact in several shapes depending on endpoint
//! version and record age. Extraction is an ordered list of independent,
//! pure strategies; the first one that yields content wins. Strategy order:
//!
//! | # | Photo strategy        | Matches                                          |
//! |---|-----------------------|--------------------------------------------------|
//! | 1 | `raw_image_body`      | `Content-Type: image/*` with a binary body       |
//! | 2 | `whole_body_string`   | body is a data URI, bare base64, or JSON string  |
//! | 3 | `root_photo_field`    | `{"Picture": "..."}` and friends at the root     |
//! | 4 | `nested_photo_field`  | the same fields under `data` / `Data`            |
//! | 5 | `first_data_element`  | the first element of a `data` array              |
//!
//! Document and certificate sets are lists of attachment entries, found at
//! the root, under `data`, or under `attachments`.

use serde_json::{Map, Value};

use hrsync_core::{CertificateType, DocumentKind};

use crate::client::RawResponse;
use crate::error::NormalizeError;
use crate::payload::{bare_mime, decode, Decoded};

pub const DEFAULT_PHOTO_MIME: &str = "image/jpeg";
pub const DEFAULT_DOCUMENT_MIME: &str = "application/pdf";

const PHOTO_FIELDS: &[&str] = &[
    "Picture",
    "picture",
    "Photo",
    "photo",
    "EmployeePhoto",
    "employeePhoto",
    "photoBase64",
    "Image",
    "image",
];
const CONTENT_FIELDS: &[&str] = &[
    "AttachmentContent",
    "attachmentContent",
    "FileContent",
    "fileContent",
    "Content",
    "content",
    "base64",
];
const MIME_FIELDS: &[&str] = &["ContentType", "contentType", "MimeType", "mimeType"];
const DATA_FIELDS: &[&str] = &["data", "Data"];
const LIST_FIELDS: &[&str] = &["attachments", "Attachments", "documents", "Documents", "certificates", "Certificates"];
const DOCUMENT_TYPE_FIELDS: &[&str] = &["AttachmentType", "attachmentType", "DocumentType", "documentType", "type"];
const LEVEL_FIELDS: &[&str] = &["EducationLevel", "educationLevel", "Level", "level", "CertificateType", "certificateType"];
const NAME_FIELDS: &[&str] = &["CertificateName", "certificateName", "Course", "course", "Name", "name", "Institution", "institution"];
const PAYROLL_FIELDS: &[&str] = &["PayrollNumber", "payrollNumber", "payrollNo", "PayrollNo"];

/// A parsed view of the raw response handed to every strategy.
pub struct Payload<'a> {
    pub content_type: Option<String>,
    pub body: &'a [u8],
    pub json: Option<Value>,
}

impl<'a> Payload<'a> {
    pub fn new(raw: &'a RawResponse) -> Self {
        let json = serde_json::from_slice::<Value>(&raw.body).ok();
        Self {
            content_type: raw.content_type.as_deref().map(bare_mime),
            body: &raw.body,
            json,
        }
    }

    fn is_null_or_empty(&self) -> bool {
        match &self.json {
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => {
                map.is_empty()
                    || DATA_FIELDS.iter().any(|f| match map.get(*f) {
                        Some(Value::Null) => true,
                        Some(Value::Array(items)) => items.is_empty(),
                        Some(Value::String(s)) => s.trim().is_empty(),
                        _ => false,
                    })
            }
            _ => self.body.iter().all(u8::is_ascii_whitespace),
        }
    }
}

type Strategy = fn(&Payload<'_>) -> Option<Decoded>;

const PHOTO_STRATEGIES: &[(&str, Strategy)] = &[
    ("raw_image_body", raw_image_body),
    ("whole_body_string", whole_body_string),
    ("root_photo_field", root_photo_field),
    ("nested_photo_field", nested_photo_field),
    ("first_data_element", first_data_element),
];

/// Extract a single employee photo. Defaults to `image/jpeg` when the
/// payload does not declare a mime type.
pub fn extract_photo(raw: &RawResponse) -> Result<(Vec<u8>, String), NormalizeError> {
    let payload = Payload::new(raw);
    for (name, strategy) in PHOTO_STRATEGIES {
        if let Some(decoded) = strategy(&payload) {
            tracing::debug!("photo extracted via {name}");
            return Ok(decoded.with_default_mime(DEFAULT_PHOTO_MIME));
        }
    }
    Err(shape_or_no_data(&payload, "photo"))
}

// ---------------------------------------------------------------------------
// Photo strategies
// ---------------------------------------------------------------------------

fn raw_image_body(payload: &Payload<'_>) -> Option<Decoded> {
    let mime = payload.content_type.as_deref()?;
    if !mime.starts_with("image/") || payload.body.is_empty() || payload.json.is_some() {
        return None;
    }
    Some(Decoded {
        bytes: payload.body.to_vec(),
        mime_type: Some(mime.to_string()),
    })
}

fn whole_body_string(payload: &Payload<'_>) -> Option<Decoded> {
    match &payload.json {
        Some(Value::String(s)) => decode(s),
        Some(_) => None,
        None => {
            let text = std::str::from_utf8(payload.body).ok()?.trim();
            // Unquoted text bodies are only trusted when explicitly a data URI.
            if text.starts_with("data:") {
                decode(text)
            } else {
                None
            }
        }
    }
}

fn root_photo_field(payload: &Payload<'_>) -> Option<Decoded> {
    photo_from_object(payload.json.as_ref()?.as_object()?)
}

fn nested_photo_field(payload: &Payload<'_>) -> Option<Decoded> {
    let root = payload.json.as_ref()?.as_object()?;
    let data = first_field(root, DATA_FIELDS)?;
    match data {
        Value::Object(inner) => photo_from_object(inner),
        Value::String(s) => decode(s),
        _ => None,
    }
}

fn first_data_element(payload: &Payload<'_>) -> Option<Decoded> {
    let json = payload.json.as_ref()?;
    let list = match json {
        Value::Array(items) => items,
        Value::Object(root) => first_field(root, DATA_FIELDS)?.as_array()?,
        _ => return None,
    };
    match list.first()? {
        Value::Object(inner) => photo_from_object(inner),
        Value::String(s) => decode(s),
        _ => None,
    }
}

fn photo_from_object(object: &Map<String, Value>) -> Option<Decoded> {
    let text = first_string(object, PHOTO_FIELDS)?;
    let mut decoded = decode(text)?;
    if decoded.mime_type.is_none() {
        decoded.mime_type = first_string(object, MIME_FIELDS).map(bare_mime);
    }
    Some(decoded)
}

// ---------------------------------------------------------------------------
// Institution bulk photos
// ---------------------------------------------------------------------------

/// One employee photo from an institution-level bulk response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollPhoto {
    pub payroll_number: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Extract every `(payroll number, photo)` pair from a bulk response.
/// Entries without a payroll number or a decodable photo are dropped.
pub fn extract_institution_photos(raw: &RawResponse) -> Result<Vec<PayrollPhoto>, NormalizeError> {
    let payload = Payload::new(raw);
    let entries = entry_list(&payload).ok_or_else(|| shape_or_no_data(&payload, "institution photos"))?;

    let mut photos = Vec::new();
    for entry in entries {
        let Some(object) = entry.as_object() else { continue };
        let Some(payroll) = first_string(object, PAYROLL_FIELDS).map(str::trim) else {
            continue;
        };
        if payroll.is_empty() {
            continue;
        }
        match photo_from_object(object) {
            Some(decoded) => {
                let (bytes, mime_type) = decoded.with_default_mime(DEFAULT_PHOTO_MIME);
                photos.push(PayrollPhoto {
                    payroll_number: payroll.to_string(),
                    bytes,
                    mime_type,
                });
            }
            None => tracing::debug!("bulk entry for payroll {payroll} has no decodable photo"),
        }
    }
    Ok(photos)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// One decoded employee document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAttachment {
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Extract the document set for one employee.
///
/// Accepts either a list of `{AttachmentType, AttachmentContent, ContentType}`
/// entries or a keyed object such as `{"ardhilHali": "...", "jobContract": "..."}`.
/// Unknown attachment types are ignored. When the same kind appears more than
/// once, the first entry wins.
pub fn extract_documents(raw: &RawResponse) -> Result<Vec<DocumentAttachment>, NormalizeError> {
    let payload = Payload::new(raw);
    let declared = declared_document_mime(&payload);

    let mut documents: Vec<DocumentAttachment> = Vec::new();
    let mut push = |kind: DocumentKind, decoded: Decoded| {
        if documents.iter().any(|d| d.kind == kind) {
            return;
        }
        let (bytes, mime_type) = decoded.with_default_mime(&declared);
        documents.push(DocumentAttachment {
            kind,
            bytes,
            mime_type,
        });
    };

    if let Some(entries) = entry_list(&payload) {
        for entry in entries {
            let Some(object) = entry.as_object() else { continue };
            let Some(label) = first_string(object, DOCUMENT_TYPE_FIELDS) else { continue };
            let Some(kind) = DocumentKind::from_label(label) else {
                tracing::debug!("ignoring unknown attachment type '{label}'");
                continue;
            };
            if let Some(decoded) = attachment_content(object) {
                push(kind, decoded);
            }
        }
        return Ok(documents);
    }

    if let Some(object) = keyed_object(&payload) {
        for (key, value) in object {
            let (Some(kind), Some(text)) = (DocumentKind::from_label(key), value.as_str()) else {
                continue;
            };
            if let Some(decoded) = decode(text) {
                push(kind, decoded);
            }
        }
        if !documents.is_empty() {
            return Ok(documents);
        }
    }

    Err(shape_or_no_data(&payload, "documents"))
}

fn declared_document_mime(payload: &Payload<'_>) -> String {
    payload
        .content_type
        .as_deref()
        .filter(|m| *m != "application/json" && !m.starts_with("text/"))
        .unwrap_or(DEFAULT_DOCUMENT_MIME)
        .to_string()
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// One decoded educational certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAttachment {
    pub cert_type: CertificateType,
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Extract the certificate set for one employee.
///
/// An empty list is a valid answer (the employee has no certificates on
/// record) and yields `Ok(vec![])`; a `null` or empty body is
/// [`NormalizeError::NoData`].
pub fn extract_certificates(raw: &RawResponse) -> Result<Vec<CertificateAttachment>, NormalizeError> {
    let payload = Payload::new(raw);
    let declared = declared_document_mime(&payload);
    let entries = entry_list(&payload).ok_or_else(|| shape_or_no_data(&payload, "certificates"))?;

    let mut certificates = Vec::new();
    for entry in entries {
        let Some(object) = entry.as_object() else { continue };
        let Some(decoded) = attachment_content(object) else {
            tracing::debug!("certificate entry without decodable content skipped");
            continue;
        };
        let level = first_string(object, LEVEL_FIELDS).unwrap_or_default();
        let cert_type = CertificateType::from_label(level);
        let name = first_string(object, NAME_FIELDS)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| cert_type.as_str().to_string());
        let (bytes, mime_type) = decoded.with_default_mime(&declared);
        certificates.push(CertificateAttachment {
            cert_type,
            name,
            bytes,
            mime_type,
        });
    }
    Ok(certificates)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Locate the list of entries: root array, `data` array, `data.attachments`,
/// or a root-level list field.
fn entry_list<'p>(payload: &'p Payload<'_>) -> Option<&'p Vec<Value>> {
    let json = payload.json.as_ref()?;
    match json {
        Value::Array(items) => Some(items),
        Value::Object(root) => {
            if let Some(data) = first_field(root, DATA_FIELDS) {
                match data {
                    Value::Array(items) => return Some(items),
                    Value::Object(inner) => {
                        if let Some(items) = first_field(inner, LIST_FIELDS).and_then(Value::as_array) {
                            return Some(items);
                        }
                    }
                    _ => {}
                }
            }
            first_field(root, LIST_FIELDS).and_then(Value::as_array)
        }
        _ => None,
    }
}

/// A keyed object of `kind → base64`, at the root or under `data`.
fn keyed_object<'p>(payload: &'p Payload<'_>) -> Option<&'p Map<String, Value>> {
    let root = payload.json.as_ref()?.as_object()?;
    match first_field(root, DATA_FIELDS) {
        Some(Value::Object(inner)) => Some(inner),
        _ => Some(root),
    }
}

fn attachment_content(object: &Map<String, Value>) -> Option<Decoded> {
    let text = first_string(object, CONTENT_FIELDS)?;
    let mut decoded = decode(text)?;
    if decoded.mime_type.is_none() {
        decoded.mime_type = first_string(object, MIME_FIELDS).map(bare_mime);
    }
    Some(decoded)
}

fn first_field<'m>(object: &'m Map<String, Value>, names: &[&str]) -> Option<&'m Value> {
    names.iter().find_map(|name| object.get(*name).filter(|v| !v.is_null()))
}

fn first_string<'m>(object: &'m Map<String, Value>, names: &[&str]) -> Option<&'m str> {
    names
        .iter()
        .find_map(|name| object.get(*name).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

fn shape_or_no_data(payload: &Payload<'_>, kind: &'static str) -> NormalizeError {
    if payload.json.is_none() || payload.is_null_or_empty() {
        NormalizeError::NoData
    } else {
        NormalizeError::UnrecognizedShape { kind }
    }
}
