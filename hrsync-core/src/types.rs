//! Domain types for HRIMS artifact synchronization.
//!
//! Institutions and employees are owned by the relational store; the sync
//! pipeline only reads identity from them and writes back reference fields.
//! All types are serializable via serde + serde_yaml.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed institution identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstitutionId(pub String);

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstitutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstitutionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed employee identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EmployeeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which family of artifacts a pipeline run synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Photos,
    Documents,
    Certificates,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Photos,
        ArtifactKind::Documents,
        ArtifactKind::Certificates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Photos => "photos",
            ArtifactKind::Documents => "documents",
            ArtifactKind::Certificates => "certificates",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photo" | "photos" => Ok(ArtifactKind::Photos),
            "document" | "documents" => Ok(ArtifactKind::Documents),
            "certificate" | "certificates" => Ok(ArtifactKind::Certificates),
            other => Err(format!(
                "unknown artifact '{other}'; expected: photos, documents, certificates"
            )),
        }
    }
}

/// The identity/employment documents tracked per employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    ArdhilHali,
    ConfirmationLetter,
    JobContract,
    BirthCertificate,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::ArdhilHali,
        DocumentKind::ConfirmationLetter,
        DocumentKind::JobContract,
        DocumentKind::BirthCertificate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::ArdhilHali => "ardhil_hali",
            DocumentKind::ConfirmationLetter => "confirmation_letter",
            DocumentKind::JobContract => "job_contract",
            DocumentKind::BirthCertificate => "birth_certificate",
        }
    }

    /// Parse the free-form labels HRIMS uses for attachment types.
    ///
    /// Case, spaces, dashes and underscores are ignored, so `"Ardhil Hali"`,
    /// `"ardhilhali"` and `"ARDHIL_HALI"` all resolve to [`DocumentKind::ArdhilHali`].
    pub fn from_label(label: &str) -> Option<Self> {
        match squash(label).as_str() {
            "ardhilhali" | "ardhil" => Some(DocumentKind::ArdhilHali),
            "confirmationletter" | "confirmation" => Some(DocumentKind::ConfirmationLetter),
            "jobcontract" | "contract" | "employmentcontract" => Some(DocumentKind::JobContract),
            "birthcertificate" | "birth" => Some(DocumentKind::BirthCertificate),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualification level of an educational certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    Certificate,
    Diploma,
    AdvancedDiploma,
    BachelorDegree,
    MasterDegree,
    Doctorate,
    #[default]
    Other,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Certificate => "certificate",
            CertificateType::Diploma => "diploma",
            CertificateType::AdvancedDiploma => "advanced_diploma",
            CertificateType::BachelorDegree => "bachelor_degree",
            CertificateType::MasterDegree => "master_degree",
            CertificateType::Doctorate => "doctorate",
            CertificateType::Other => "other",
        }
    }

    /// Map an HRIMS education-level label onto a qualification level.
    /// Unknown labels map to [`CertificateType::Other`].
    pub fn from_label(label: &str) -> Self {
        let key = squash(label);
        if key.contains("phd") || key.contains("doctor") {
            CertificateType::Doctorate
        } else if key.contains("master") {
            CertificateType::MasterDegree
        } else if key.contains("bachelor") || key == "degree" || key.contains("firstdegree") {
            CertificateType::BachelorDegree
        } else if key.contains("advanceddiploma") {
            CertificateType::AdvancedDiploma
        } else if key.contains("diploma") {
            CertificateType::Diploma
        } else if key.contains("certificate") {
            CertificateType::Certificate
        } else {
            CertificateType::Other
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The key used to address a subject in HRIMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    Payroll(String),
    NationalId(String),
    Vote(String),
    TaxId(String),
}

impl SearchKey {
    pub fn value(&self) -> &str {
        match self {
            SearchKey::Payroll(v)
            | SearchKey::NationalId(v)
            | SearchKey::Vote(v)
            | SearchKey::TaxId(v) => v,
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKey::Payroll(v) => write!(f, "payroll:{v}"),
            SearchKey::NationalId(v) => write!(f, "national-id:{v}"),
            SearchKey::Vote(v) => write!(f, "vote:{v}"),
            SearchKey::TaxId(v) => write!(f, "tax-id:{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// An institution whose employees are synchronized as one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl Institution {
    /// Key for institution-level HRIMS calls: vote number, else tax id.
    pub fn search_key(&self) -> Option<SearchKey> {
        non_blank(self.vote_number.as_deref())
            .map(|v| SearchKey::Vote(v.to_string()))
            .or_else(|| non_blank(self.tax_id.as_deref()).map(|v| SearchKey::TaxId(v.to_string())))
    }
}

/// Storage references for each tracked document kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ardhil_hali: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_certificate: Option<String>,
}

impl DocumentRefs {
    pub fn get(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::ArdhilHali => self.ardhil_hali.as_deref(),
            DocumentKind::ConfirmationLetter => self.confirmation_letter.as_deref(),
            DocumentKind::JobContract => self.job_contract.as_deref(),
            DocumentKind::BirthCertificate => self.birth_certificate.as_deref(),
        }
    }

    pub fn set(&mut self, kind: DocumentKind, reference: impl Into<String>) {
        let slot = match kind {
            DocumentKind::ArdhilHali => &mut self.ardhil_hali,
            DocumentKind::ConfirmationLetter => &mut self.confirmation_letter,
            DocumentKind::JobContract => &mut self.job_contract,
            DocumentKind::BirthCertificate => &mut self.birth_certificate,
        };
        *slot = Some(reference.into());
    }

    pub fn populated(&self) -> usize {
        DocumentKind::ALL
            .iter()
            .filter(|kind| self.get(**kind).is_some())
            .count()
    }
}

/// An educational certificate row belonging to an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub employee_id: EmployeeId,
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<String>,
}

/// An employee as seen by the sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub institution_id: InstitutionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payroll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub documents: DocumentRefs,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

impl Employee {
    /// HRIMS search key: payroll number, falling back to national id.
    ///
    /// `None` when both are missing or blank.
    pub fn search_key(&self) -> Option<SearchKey> {
        non_blank(self.payroll_number.as_deref())
            .map(|v| SearchKey::Payroll(v.to_string()))
            .or_else(|| {
                non_blank(self.national_id.as_deref())
                    .map(|v| SearchKey::NationalId(v.to_string()))
            })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn squash(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
