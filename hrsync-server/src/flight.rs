//! Single-flight guard: at most one run per artifact family at a time.
//!
//! Checkpoints are stored per artifact, so two concurrent runs of the same
//! family would overwrite each other's resume point and double the load on
//! HRIMS.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use hrsync_core::ArtifactKind;

use crate::error::ServerError;

#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<Mutex<HashSet<ArtifactKind>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `artifact`, or fail with [`ServerError::Busy`] when a run of the
    /// same family is still going. The claim is released when the returned
    /// guard drops.
    pub fn acquire(&self, artifact: ArtifactKind) -> Result<FlightGuard, ServerError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(artifact) {
            return Err(ServerError::Busy { artifact });
        }
        Ok(FlightGuard {
            running: self.running.clone(),
            artifact,
        })
    }

    pub fn is_running(&self, artifact: ArtifactKind) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&artifact)
    }
}

#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<Mutex<HashSet<ArtifactKind>>>,
    artifact: ArtifactKind,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_release() {
        let flights = InFlight::new();
        let guard = flights.acquire(ArtifactKind::Photos).expect("first claim");
        assert!(matches!(
            flights.acquire(ArtifactKind::Photos),
            Err(ServerError::Busy {
                artifact: ArtifactKind::Photos
            })
        ));
        assert!(
            flights.acquire(ArtifactKind::Documents).is_ok(),
            "other families are independent"
        );

        drop(guard);
        assert!(!flights.is_running(ArtifactKind::Photos));
        assert!(flights.acquire(ArtifactKind::Photos).is_ok());
    }
}
