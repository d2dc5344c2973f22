//! Per-employee processing: guard → fetch (with retry) → normalize → write →
//! reference update.
//!
//! Nothing here returns an error. Every failure becomes an [`Outcome`] with
//! status `failed` and the error's display string as message.

use std::collections::HashMap;

use hrsync_core::{
    ArtifactKind, Certificate, Directory, DirectoryError, DocumentKind, Employee, SearchKey,
};
use hrsync_hrims::{
    extract_certificates, extract_documents, extract_photo, FetchError, HrimsApi, PayrollPhoto,
    RawResponse,
};

use crate::error::ArtifactError;
use crate::guard::{self, Guard};
use crate::object_store::{self, ObjectStore};
use crate::progress::SyncStatus;
use crate::retry::RetryPolicy;
use crate::unit::{Unit, UnitState};

/// Result of processing one employee for one artifact family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: SyncStatus,
    pub message: String,
    /// HRIMS attempts made for this employee (0 when skipped).
    pub attempts: u32,
}

impl Outcome {
    fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Skipped,
            message: message.into(),
            attempts: 0,
        }
    }

    fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: SyncStatus::Failed,
            message: message.into(),
            attempts,
        }
    }

    /// `true` if this outcome involved at least one HRIMS call.
    pub fn called_hrims(&self) -> bool {
        self.attempts > 0
    }
}

pub(crate) struct Processor<'a> {
    pub directory: &'a dyn Directory,
    pub hrims: &'a dyn HrimsApi,
    pub store: &'a dyn ObjectStore,
    pub retry: RetryPolicy,
}

impl Processor<'_> {
    fn prefix(&self) -> &str {
        self.store.reference_prefix()
    }

    /// Close a unit straight from `pending` to `skipped`.
    fn skip(&self, employee: &Employee, artifact: ArtifactKind, message: &str) -> Outcome {
        let mut unit = Unit::new(format!("{}/{artifact}", employee.id));
        match unit.advance(UnitState::Skipped) {
            Ok(()) => Outcome::skipped(message),
            Err(err) => Outcome::failed(err.to_string(), 0),
        }
    }

    /// Process one employee for `artifact` with a dedicated HRIMS call.
    pub fn process(&self, employee: &Employee, artifact: ArtifactKind) -> Outcome {
        let key = match guard::check(employee, artifact, self.prefix()) {
            Guard::Proceed(key) => key,
            skip => {
                return self.skip(employee, artifact, skip.skip_message().unwrap_or("skipped"))
            }
        };

        let (fetched, attempts) = self.fetch(&key, artifact);
        let raw = match fetched {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("{} ({}): {err}", employee.name, employee.id);
                return Outcome::failed(err.to_string(), attempts);
            }
        };

        let mut outcome = match artifact {
            ArtifactKind::Photos => self.store_photo(employee, &raw),
            ArtifactKind::Documents => self.store_documents(employee, &raw),
            ArtifactKind::Certificates => self.store_certificates(employee, &raw),
        };
        outcome.attempts = attempts;
        outcome
    }

    /// Process one employee against an institution-level bulk photo map.
    ///
    /// `bulk` is `Err` when the bulk call itself failed; every employee that
    /// needed a photo is then `failed` with that message.
    pub fn process_bulk_photo(
        &self,
        employee: &Employee,
        bulk: &Result<HashMap<String, PayrollPhoto>, String>,
        attempts: u32,
    ) -> Outcome {
        let payroll = match guard::check_bulk_photo(employee, self.prefix()) {
            Ok(payroll) => payroll,
            Err(message) => return self.skip(employee, ArtifactKind::Photos, message),
        };
        let photos = match bulk {
            Ok(photos) => photos,
            Err(message) => return Outcome::failed(message.clone(), attempts),
        };
        let Some(photo) = photos.get(&payroll) else {
            return Outcome::failed("No photo in institution response", attempts);
        };

        let key = object_store::photo_key(&employee.id, &photo.mime_type);
        let written = self.persist(
            format!("{}/photo", employee.id),
            &key,
            &photo.bytes,
            &photo.mime_type,
            |reference| self.directory.set_photo_ref(employee, reference),
        );
        match written {
            Ok(_) => Outcome {
                status: SyncStatus::Success,
                message: "Photo synced from institution batch".to_string(),
                attempts,
            },
            Err(err) => Outcome::failed(err.to_string(), attempts),
        }
    }

    fn fetch(&self, key: &SearchKey, artifact: ArtifactKind) -> (Result<RawResponse, FetchError>, u32) {
        self.retry.run(|| self.hrims.fetch(key, artifact))
    }

    /// Upload, then write the reference. The reference is only touched after
    /// the upload succeeded.
    fn write(
        &self,
        unit: &mut Unit,
        key: &str,
        bytes: &[u8],
        mime_type: &str,
        set_reference: impl FnOnce(&str) -> Result<(), DirectoryError>,
    ) -> Result<String, ArtifactError> {
        unit.advance(UnitState::Writing)?;
        let stored = self.store.put(key, bytes, mime_type)?;
        set_reference(&stored.reference)?;
        unit.advance(UnitState::Success)?;
        Ok(stored.reference)
    }

    /// Drive a unit whose payload is already decoded from `pending` to a
    /// terminal state.
    fn persist(
        &self,
        label: String,
        key: &str,
        bytes: &[u8],
        mime_type: &str,
        set_reference: impl FnOnce(&str) -> Result<(), DirectoryError>,
    ) -> Result<String, ArtifactError> {
        let mut unit = Unit::new(label);
        let result = unit
            .advance(UnitState::Fetching)
            .and_then(|()| unit.advance(UnitState::Normalizing))
            .map_err(ArtifactError::from)
            .and_then(|()| self.write(&mut unit, key, bytes, mime_type, set_reference));
        if result.is_err() {
            unit.fail();
        }
        result
    }

    // -----------------------------------------------------------------------
    // Photos
    // -----------------------------------------------------------------------

    fn store_photo(&self, employee: &Employee, raw: &RawResponse) -> Outcome {
        let mut unit = Unit::new(format!("{}/photo", employee.id));
        match self.photo_unit(&mut unit, employee, raw) {
            Ok(_) => Outcome {
                status: SyncStatus::Success,
                message: "Photo synced".to_string(),
                attempts: 0,
            },
            Err(err) => {
                unit.fail();
                tracing::warn!("{} ({}): {err}", employee.name, employee.id);
                Outcome::failed(err.to_string(), 0)
            }
        }
    }

    fn photo_unit(
        &self,
        unit: &mut Unit,
        employee: &Employee,
        raw: &RawResponse,
    ) -> Result<String, ArtifactError> {
        unit.advance(UnitState::Fetching)?;
        unit.advance(UnitState::Normalizing)?;
        let (bytes, mime_type) = extract_photo(raw)?;
        let key = object_store::photo_key(&employee.id, &mime_type);
        self.write(unit, &key, &bytes, &mime_type, |reference| {
            self.directory.set_photo_ref(employee, reference)
        })
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    fn store_documents(&self, employee: &Employee, raw: &RawResponse) -> Outcome {
        let wanted = guard::missing_documents(employee, self.prefix());
        let documents = match extract_documents(raw) {
            Ok(documents) if documents.is_empty() => {
                return Outcome::failed("No documents found in response", 0)
            }
            Ok(documents) => documents,
            Err(err) => return Outcome::failed(err.to_string(), 0),
        };

        let mut obtained = 0;
        let mut missing: Vec<DocumentKind> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        for kind in &wanted {
            let Some(doc) = documents.iter().find(|d| d.kind == *kind) else {
                missing.push(*kind);
                continue;
            };
            let key = object_store::document_key(&employee.id, *kind, &doc.mime_type);
            let result = self.persist(
                format!("{}/{kind}", employee.id),
                &key,
                &doc.bytes,
                &doc.mime_type,
                |reference| self.directory.set_document_ref(employee, *kind, reference),
            );
            match result {
                Ok(_) => obtained += 1,
                Err(err) => errors.push(format!("{kind}: {err}")),
            }
        }

        let status = SyncStatus::from_counts(wanted.len(), obtained);
        let mut message = format!("Stored {obtained} of {} documents", wanted.len());
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            message.push_str(&format!("; missing: {}", names.join(", ")));
        }
        if !errors.is_empty() {
            message.push_str(&format!("; errors: {}", errors.join("; ")));
        }
        Outcome {
            status,
            message,
            attempts: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Certificates
    // -----------------------------------------------------------------------

    fn store_certificates(&self, employee: &Employee, raw: &RawResponse) -> Outcome {
        let certificates = match extract_certificates(raw) {
            Ok(certificates) => certificates,
            Err(err) => return Outcome::failed(err.to_string(), 0),
        };
        if certificates.is_empty() {
            return Outcome {
                status: SyncStatus::Success,
                message: "No certificates on record".to_string(),
                attempts: 0,
            };
        }

        let mut obtained = 0;
        let mut errors = Vec::new();
        for cert in &certificates {
            let slug = object_store::slug(&cert.name);
            let key = object_store::certificate_key(
                &employee.id,
                cert.cert_type,
                &cert.name,
                &cert.mime_type,
            );
            let result = self.persist(
                format!("{}/{}_{slug}", employee.id, cert.cert_type),
                &key,
                &cert.bytes,
                &cert.mime_type,
                |reference| {
                    self.directory.upsert_certificate(
                        employee,
                        Certificate {
                            id: format!("{}-{}-{slug}", employee.id, cert.cert_type),
                            employee_id: employee.id.clone(),
                            cert_type: cert.cert_type,
                            name: cert.name.clone(),
                            storage_ref: Some(reference.to_string()),
                        },
                    )
                },
            );
            match result {
                Ok(_) => obtained += 1,
                Err(err) => errors.push(format!("{}: {err}", cert.name)),
            }
        }

        let mut message = format!("Stored {obtained} of {} certificates", certificates.len());
        if !errors.is_empty() {
            message.push_str(&format!("; errors: {}", errors.join("; ")));
        }
        Outcome {
            status: SyncStatus::from_counts(certificates.len(), obtained),
            message,
            attempts: 0,
        }
    }
}
