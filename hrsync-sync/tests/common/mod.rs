#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hrsync_core::{
    ArtifactKind, Directory, DocumentRefs, Employee, EmployeeId, Institution, InstitutionId,
    SearchKey, YamlDirectory,
};
use hrsync_hrims::{FetchError, HrimsApi, RawResponse};
use hrsync_sync::{MemoryObjectStore, Pipeline, RetryPolicy, Settings};
use tempfile::TempDir;

/// base64("hello")
pub const HELLO_B64: &str = "aGVsbG8=";

/// Scripted HRIMS: answers by search key, records every call.
#[derive(Default)]
pub struct FakeHrims {
    replies: Mutex<HashMap<(String, ArtifactKind), Result<RawResponse, FetchError>>>,
    bulk_replies: Mutex<HashMap<String, Result<RawResponse, FetchError>>>,
    calls: Mutex<Vec<(String, ArtifactKind)>>,
    bulk_calls: Mutex<Vec<String>>,
}

impl FakeHrims {
    pub fn reply(&self, key: &str, kind: ArtifactKind, result: Result<RawResponse, FetchError>) {
        self.replies
            .lock()
            .unwrap()
            .insert((key.to_string(), kind), result);
    }

    pub fn reply_bulk(&self, key: &str, result: Result<RawResponse, FetchError>) {
        self.bulk_replies
            .lock()
            .unwrap()
            .insert(key.to_string(), result);
    }

    pub fn calls(&self) -> Vec<(String, ArtifactKind)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.lock().unwrap().len()
    }
}

impl HrimsApi for FakeHrims {
    fn fetch(&self, key: &SearchKey, kind: ArtifactKind) -> Result<RawResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((key.value().to_string(), kind));
        self.replies
            .lock()
            .unwrap()
            .get(&(key.value().to_string(), kind))
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }

    fn fetch_institution_photos(&self, key: &SearchKey) -> Result<RawResponse, FetchError> {
        self.bulk_calls.lock().unwrap().push(key.value().to_string());
        self.bulk_replies
            .lock()
            .unwrap()
            .get(key.value())
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}

pub fn photo_reply() -> Result<RawResponse, FetchError> {
    Ok(RawResponse::json(format!(r#"{{"data":{{"Picture":"{HELLO_B64}"}}}}"#)))
}

pub fn institution(id: &str, name: &str) -> Institution {
    Institution {
        id: InstitutionId::from(id),
        name: name.to_string(),
        vote_number: None,
        tax_id: None,
    }
}

pub fn employee(id: &str, institution: &str, payroll: Option<&str>) -> Employee {
    Employee {
        id: EmployeeId::from(id),
        institution_id: InstitutionId::from(institution),
        name: format!("Employee {}", id.to_uppercase()),
        payroll_number: payroll.map(str::to_string),
        national_id: None,
        profile_image: None,
        documents: DocumentRefs::default(),
        certificates: vec![],
    }
}

pub fn unpaced(max_retries: u32) -> Settings {
    Settings {
        employee_delay: Duration::ZERO,
        institution_delay: Duration::ZERO,
        batch_size: 25,
        retry: RetryPolicy::new(max_retries, Duration::ZERO),
    }
}

/// Temp data dir + YAML directory + fake HRIMS + in-memory object store.
pub struct Fixture {
    pub tmp: TempDir,
    pub directory: Arc<YamlDirectory>,
    pub hrims: Arc<FakeHrims>,
    pub store: Arc<MemoryObjectStore>,
    pub settings: Settings,
}

impl Fixture {
    pub fn new(institutions: Vec<(Institution, Vec<Employee>)>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let tmp = TempDir::new().expect("tempdir");
        let directory = Arc::new(YamlDirectory::new(tmp.path()));
        for (inst, employees) in institutions {
            directory.put_institution(inst, employees).expect("seed");
        }
        Self {
            tmp,
            directory,
            hrims: Arc::new(FakeHrims::default()),
            store: Arc::new(MemoryObjectStore::new("/api/files")),
            settings: unpaced(2),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.directory.clone(),
            self.hrims.clone(),
            self.store.clone(),
            self.tmp.path(),
            self.settings,
        )
    }

    pub fn employee(&self, institution: &str, id: &str) -> Employee {
        self.directory
            .list_employees(&InstitutionId::from(institution))
            .expect("list")
            .into_iter()
            .find(|e| e.id.0 == id)
            .expect("employee present")
    }
}
