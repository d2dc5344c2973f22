//! # hrsync-hrims
//!
//! Outbound side of the pipeline: the authenticated, timeout-bounded
//! [`HrimsClient`] and the [`normalize`] strategies that turn HRIMS's
//! inconsistent response shapes into bytes plus a mime type.

pub mod client;
pub mod error;
pub mod normalize;
pub mod payload;

pub use client::{HrimsApi, HrimsClient, RawResponse};
pub use error::{FetchError, NormalizeError};
pub use normalize::{
    extract_certificates, extract_documents, extract_institution_photos, extract_photo,
    CertificateAttachment, DocumentAttachment, PayrollPhoto,
};
pub use payload::Decoded;
