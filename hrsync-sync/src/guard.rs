//! Idempotency Guard: decide, before any external call, whether an employee
//! needs work for an artifact family.

use hrsync_core::{ArtifactKind, DocumentKind, Employee, SearchKey};

use crate::object_store::{CERTIFICATE_NAMESPACE, DOCUMENT_NAMESPACE, PHOTO_NAMESPACE};

/// Outcome of the pre-fetch check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Work is needed; fetch with this key.
    Proceed(SearchKey),
    /// Everything requested is already stored.
    AlreadyStored(&'static str),
    /// Neither payroll number nor national id; never retried.
    MissingIdentifier,
}

impl Guard {
    pub fn skip_message(&self) -> Option<&'static str> {
        match self {
            Guard::Proceed(_) => None,
            Guard::AlreadyStored(message) => Some(message),
            Guard::MissingIdentifier => Some("No payroll number or national id"),
        }
    }
}

/// `true` if `value` points into `namespace` under `reference_prefix`, or is
/// a legacy inline `data:` payload from an earlier import.
pub fn is_stored(value: Option<&str>, reference_prefix: &str, namespace: &str) -> bool {
    let Some(value) = value.map(str::trim) else {
        return false;
    };
    if value.starts_with("data:") {
        return true;
    }
    let expected = format!("{}/{namespace}/", reference_prefix.trim_end_matches('/'));
    value.starts_with(&expected)
}

/// Document kinds that still need to be fetched for `employee`.
pub fn missing_documents(employee: &Employee, reference_prefix: &str) -> Vec<DocumentKind> {
    DocumentKind::ALL
        .iter()
        .copied()
        .filter(|kind| {
            !is_stored(
                employee.documents.get(*kind),
                reference_prefix,
                DOCUMENT_NAMESPACE,
            )
        })
        .collect()
}

pub fn check(employee: &Employee, artifact: ArtifactKind, reference_prefix: &str) -> Guard {
    let stored = match artifact {
        ArtifactKind::Photos => is_stored(
            employee.profile_image.as_deref(),
            reference_prefix,
            PHOTO_NAMESPACE,
        )
        .then_some("Photo already stored"),
        ArtifactKind::Documents => missing_documents(employee, reference_prefix)
            .is_empty()
            .then_some("All documents already stored"),
        ArtifactKind::Certificates => employee
            .certificates
            .iter()
            .any(|c| is_stored(c.storage_ref.as_deref(), reference_prefix, CERTIFICATE_NAMESPACE))
            .then_some("Certificates already stored"),
    };
    if let Some(message) = stored {
        return Guard::AlreadyStored(message);
    }
    match employee.search_key() {
        Some(key) => Guard::Proceed(key),
        None => Guard::MissingIdentifier,
    }
}

/// The guard for institution-level photo batches. Batch entries carry only a
/// payroll number, so an employee known solely by national id is skipped
/// rather than looked up in a response that cannot contain them.
pub fn check_bulk_photo(employee: &Employee, reference_prefix: &str) -> Result<String, &'static str> {
    match check(employee, ArtifactKind::Photos, reference_prefix) {
        Guard::Proceed(SearchKey::Payroll(payroll)) => Ok(payroll),
        Guard::Proceed(_) => Err("No payroll number; institution batch photos are matched by payroll number"),
        skip => Err(skip.skip_message().unwrap_or("skipped")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrsync_core::{Certificate, CertificateType, DocumentRefs, EmployeeId, InstitutionId};

    const PREFIX: &str = "/api/files";

    fn employee() -> Employee {
        Employee {
            id: EmployeeId::from("e1"),
            institution_id: InstitutionId::from("i1"),
            name: "Asha".to_string(),
            payroll_number: Some("P1".to_string()),
            national_id: None,
            profile_image: None,
            documents: DocumentRefs::default(),
            certificates: vec![],
        }
    }

    #[test]
    fn stored_photo_is_skipped() {
        let mut e = employee();
        e.profile_image = Some("/api/files/employee-photos/e1.jpg".to_string());
        assert_eq!(check(&e, ArtifactKind::Photos, PREFIX), Guard::AlreadyStored("Photo already stored"));
    }

    #[test]
    fn legacy_inline_photo_is_skipped() {
        let mut e = employee();
        e.profile_image = Some("data:image/jpeg;base64,/9j/4AAQ".to_string());
        assert!(matches!(check(&e, ArtifactKind::Photos, PREFIX), Guard::AlreadyStored(_)));
    }

    #[test]
    fn foreign_reference_is_not_trusted() {
        let mut e = employee();
        e.profile_image = Some("https://cdn.example.org/e1.jpg".to_string());
        assert_eq!(
            check(&e, ArtifactKind::Photos, PREFIX),
            Guard::Proceed(SearchKey::Payroll("P1".to_string()))
        );
    }

    #[test]
    fn missing_identifier_is_reported() {
        let mut e = employee();
        e.payroll_number = Some("  ".to_string());
        assert_eq!(check(&e, ArtifactKind::Documents, PREFIX), Guard::MissingIdentifier);
    }

    #[test]
    fn documents_skip_only_when_every_kind_is_stored() {
        let mut e = employee();
        for kind in &DocumentKind::ALL[..3] {
            e.documents
                .set(*kind, format!("/api/files/employee-documents/e1/{kind}.pdf"));
        }
        assert_eq!(missing_documents(&e, PREFIX), vec![DocumentKind::ALL[3]]);
        assert!(matches!(check(&e, ArtifactKind::Documents, PREFIX), Guard::Proceed(_)));

        e.documents.set(
            DocumentKind::ALL[3],
            format!("/api/files/employee-documents/e1/{}.pdf", DocumentKind::ALL[3]),
        );
        assert!(matches!(check(&e, ArtifactKind::Documents, PREFIX), Guard::AlreadyStored(_)));
    }

    #[test]
    fn any_stored_certificate_skips() {
        let mut e = employee();
        e.certificates.push(Certificate {
            id: "c1".to_string(),
            employee_id: e.id.clone(),
            cert_type: CertificateType::Diploma,
            name: "ICT".to_string(),
            storage_ref: Some("/api/files/employee-certificates/e1/diploma_ict.pdf".to_string()),
        });
        assert!(matches!(check(&e, ArtifactKind::Certificates, PREFIX), Guard::AlreadyStored(_)));
    }

    #[test]
    fn bulk_photos_need_a_payroll_number() {
        assert_eq!(check_bulk_photo(&employee(), PREFIX), Ok("P1".to_string()));

        let mut national_only = employee();
        national_only.payroll_number = Some("  ".to_string());
        national_only.national_id = Some("19800101-00001".to_string());
        let message = check_bulk_photo(&national_only, PREFIX).unwrap_err();
        assert!(message.contains("payroll number"), "got: {message}");

        let mut stored = employee();
        stored.profile_image = Some("/api/files/employee-photos/e1.jpg".to_string());
        assert_eq!(check_bulk_photo(&stored, PREFIX), Err("Photo already stored"));
    }
}
