//! Institution/employee directory: the relational-store seam.
//!
//! The sync pipeline only needs to enumerate institutions and employees and
//! write back reference fields, so the store is reached through the
//! [`Directory`] trait. [`YamlDirectory`] is the file-backed implementation.
//!
//! # Storage layout
//!
//! ```text
//! <data_dir>/
//!   institutions/
//!     <institution_id>.yaml   (institution + employees, mode 0600)
//! ```
//!
//! Saves are atomic: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, DirectoryError};
use crate::types::{Certificate, DocumentKind, Employee, EmployeeId, Institution, InstitutionId};

/// Read identity, write back references.
pub trait Directory: Send + Sync {
    /// All institutions, sorted by name then id.
    fn list_institutions(&self) -> Result<Vec<Institution>, DirectoryError>;

    fn find_institution(&self, id: &InstitutionId) -> Result<Institution, DirectoryError>;

    /// Employees of one institution, sorted by id.
    fn list_employees(&self, institution: &InstitutionId) -> Result<Vec<Employee>, DirectoryError>;

    fn set_photo_ref(&self, employee: &Employee, reference: &str) -> Result<(), DirectoryError>;

    fn set_document_ref(
        &self,
        employee: &Employee,
        kind: DocumentKind,
        reference: &str,
    ) -> Result<(), DirectoryError>;

    /// Insert the certificate, or replace the one with the same id.
    fn upsert_certificate(
        &self,
        employee: &Employee,
        certificate: Certificate,
    ) -> Result<(), DirectoryError>;
}

/// On-disk payload for one institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionFile {
    pub institution: Institution,
    #[serde(default)]
    pub employees: Vec<Employee>,
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<data_dir>/institutions/`
pub fn institutions_dir_at(data_dir: &Path) -> PathBuf {
    data_dir.join("institutions")
}

/// `<data_dir>/institutions/<id>.yaml`. Pure, no I/O.
///
/// Callers holding an id from outside the process go through
/// [`checked_path_at`] instead.
pub fn institution_path_at(data_dir: &Path, id: &InstitutionId) -> PathBuf {
    institutions_dir_at(data_dir).join(format!("{}.yaml", id.0))
}

/// True when `id` names exactly one file inside `institutions/`: a single
/// normal path component, no separators, no `.`/`..`.
pub fn is_valid_institution_id(id: &str) -> bool {
    let mut components = Path::new(id).components();
    !id.is_empty()
        && !id.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

fn checked_path_at(data_dir: &Path, id: &InstitutionId) -> Result<PathBuf, DirectoryError> {
    if !is_valid_institution_id(&id.0) {
        return Err(DirectoryError::InvalidId { id: id.0.clone() });
    }
    Ok(institution_path_at(data_dir, id))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load one institution file.
///
/// Returns `DirectoryError::InvalidId` for ids that would escape
/// `institutions/`, `DirectoryError::InstitutionNotFound` if absent,
/// `DirectoryError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(data_dir: &Path, id: &InstitutionId) -> Result<InstitutionFile, DirectoryError> {
    let path = checked_path_at(data_dir, id)?;
    if !path.exists() {
        return Err(DirectoryError::InstitutionNotFound { id: id.clone() });
    }
    read_file(&path)
}

fn read_file(path: &Path) -> Result<InstitutionFile, DirectoryError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| DirectoryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically save an institution file.
///
/// `.tmp` is always in the same directory as the target so the rename never
/// crosses filesystems.
pub fn save_at(data_dir: &Path, file: &InstitutionFile) -> Result<(), DirectoryError> {
    let path = checked_path_at(data_dir, &file.institution.id)?;
    let dir = institutions_dir_at(data_dir);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", file.institution.id.0));

    let yaml = serde_yaml::to_string(file)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Walk `<data_dir>/institutions/*.yaml` and return every institution file.
pub fn list_at(data_dir: &Path) -> Result<Vec<InstitutionFile>, DirectoryError> {
    let dir = institutions_dir_at(data_dir);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(".yaml"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        files.push(read_file(&entry.path())?);
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// YamlDirectory
// ---------------------------------------------------------------------------

/// File-backed [`Directory`] rooted at a data directory.
///
/// Read-modify-write cycles are serialized through an internal lock so that
/// reference updates from one process never interleave.
#[derive(Debug)]
pub struct YamlDirectory {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl YamlDirectory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create or replace an institution together with its employees.
    pub fn put_institution(
        &self,
        institution: Institution,
        employees: Vec<Employee>,
    ) -> Result<(), DirectoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        save_at(
            &self.data_dir,
            &InstitutionFile {
                institution,
                employees,
            },
        )
    }

    fn update_employee(
        &self,
        employee: &Employee,
        apply: impl FnOnce(&mut Employee),
    ) -> Result<(), DirectoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = load_at(&self.data_dir, &employee.institution_id)?;
        let target = file
            .employees
            .iter_mut()
            .find(|e| e.id == employee.id)
            .ok_or_else(|| DirectoryError::EmployeeNotFound {
                institution: employee.institution_id.clone(),
                employee: employee.id.clone(),
            })?;
        apply(target);
        save_at(&self.data_dir, &file)
    }
}

impl Directory for YamlDirectory {
    fn list_institutions(&self) -> Result<Vec<Institution>, DirectoryError> {
        let mut institutions: Vec<Institution> = list_at(&self.data_dir)?
            .into_iter()
            .map(|file| file.institution)
            .collect();
        institutions.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(institutions)
    }

    fn find_institution(&self, id: &InstitutionId) -> Result<Institution, DirectoryError> {
        load_at(&self.data_dir, id).map(|file| file.institution)
    }

    fn list_employees(&self, institution: &InstitutionId) -> Result<Vec<Employee>, DirectoryError> {
        let mut employees = load_at(&self.data_dir, institution)?.employees;
        employees.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(employees)
    }

    fn set_photo_ref(&self, employee: &Employee, reference: &str) -> Result<(), DirectoryError> {
        self.update_employee(employee, |e| e.profile_image = Some(reference.to_string()))
    }

    fn set_document_ref(
        &self,
        employee: &Employee,
        kind: DocumentKind,
        reference: &str,
    ) -> Result<(), DirectoryError> {
        self.update_employee(employee, |e| e.documents.set(kind, reference))
    }

    fn upsert_certificate(
        &self,
        employee: &Employee,
        certificate: Certificate,
    ) -> Result<(), DirectoryError> {
        self.update_employee(employee, |e| {
            match e.certificates.iter_mut().find(|c| c.id == certificate.id) {
                Some(existing) => *existing = certificate,
                None => e.certificates.push(certificate),
            }
        })
    }
}

/// Look up a single employee by id; used by tests and reporting.
pub fn find_employee(
    directory: &dyn Directory,
    institution: &InstitutionId,
    employee: &EmployeeId,
) -> Result<Employee, DirectoryError> {
    directory
        .list_employees(institution)?
        .into_iter()
        .find(|e| &e.id == employee)
        .ok_or_else(|| DirectoryError::EmployeeNotFound {
            institution: institution.clone(),
            employee: employee.clone(),
        })
}

// ---------------------------------------------------------------------------
// Permissions (unix only)
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), DirectoryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), DirectoryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), DirectoryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), DirectoryError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CertificateType, DocumentRefs};
    use tempfile::TempDir;

    fn institution(id: &str, name: &str) -> Institution {
        Institution {
            id: InstitutionId::from(id),
            name: name.to_string(),
            vote_number: None,
            tax_id: None,
        }
    }

    fn employee(id: &str, institution: &str) -> Employee {
        Employee {
            id: EmployeeId::from(id),
            institution_id: InstitutionId::from(institution),
            name: format!("Employee {id}"),
            payroll_number: Some(format!("P-{id}")),
            national_id: None,
            profile_image: None,
            documents: DocumentRefs::default(),
            certificates: vec![],
        }
    }

    #[test]
    fn empty_data_dir_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        assert!(dir.list_institutions().unwrap().is_empty());
    }

    #[test]
    fn institutions_sorted_by_name_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        dir.put_institution(institution("a", "zanzibar ports"), vec![]).unwrap();
        dir.put_institution(institution("b", "Afya"), vec![]).unwrap();
        dir.put_institution(institution("c", "Maji"), vec![]).unwrap();

        let names: Vec<_> = dir
            .list_institutions()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Afya", "Maji", "zanzibar ports"]);
    }

    #[test]
    fn photo_ref_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        let e = employee("e1", "i1");
        dir.put_institution(institution("i1", "Afya"), vec![e.clone()]).unwrap();

        dir.set_photo_ref(&e, "/api/files/employee-photos/e1.jpg").unwrap();

        let reloaded = find_employee(&dir, &e.institution_id, &e.id).unwrap();
        assert_eq!(
            reloaded.profile_image.as_deref(),
            Some("/api/files/employee-photos/e1.jpg")
        );
    }

    #[test]
    fn upsert_certificate_replaces_same_id() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        let e = employee("e1", "i1");
        dir.put_institution(institution("i1", "Afya"), vec![e.clone()]).unwrap();

        let mut cert = Certificate {
            id: "e1-diploma-ict".to_string(),
            employee_id: e.id.clone(),
            cert_type: CertificateType::Diploma,
            name: "ICT".to_string(),
            storage_ref: None,
        };
        dir.upsert_certificate(&e, cert.clone()).unwrap();
        cert.storage_ref = Some("/api/files/employee-certificates/e1/diploma_ict.pdf".to_string());
        dir.upsert_certificate(&e, cert.clone()).unwrap();

        let reloaded = find_employee(&dir, &e.institution_id, &e.id).unwrap();
        assert_eq!(reloaded.certificates, vec![cert]);
    }

    #[test]
    fn update_unknown_employee_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        dir.put_institution(institution("i1", "Afya"), vec![]).unwrap();
        let ghost = employee("ghost", "i1");
        let err = dir.set_photo_ref(&ghost, "/x").unwrap_err();
        assert!(matches!(err, DirectoryError::EmployeeNotFound { .. }), "got: {err}");
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        dir.put_institution(institution("i1", "Afya"), vec![]).unwrap();
        let tmp_path = institutions_dir_at(tmp.path()).join("i1.yaml.tmp");
        assert!(!tmp_path.exists(), ".tmp must be removed after atomic rename");
    }
}
