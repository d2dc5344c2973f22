//! Institution enumeration and selection.

use std::fmt;

use hrsync_core::{Directory, DirectoryError, Institution, InstitutionId};

use crate::error::SyncError;

/// Which institutions a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Explicit institutions, in the given order.
    Ids(Vec<InstitutionId>),
    /// Every institution sorted strictly after the named boundary.
    After(String),
    /// Case-insensitive substring match on the name.
    NameContains(String),
}

/// A [`Scope`] plus an optional cap on the number of institutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub scope: Scope,
    pub limit: Option<usize>,
}

impl Selection {
    pub fn all() -> Self {
        Self {
            scope: Scope::All,
            limit: None,
        }
    }

    pub fn institution(id: impl Into<InstitutionId>) -> Self {
        Self {
            scope: Scope::Ids(vec![id.into()]),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::All => write!(f, "all")?,
            Scope::Ids(ids) => {
                let ids: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
                write!(f, "institutions {}", ids.join(","))?
            }
            Scope::After(name) => write!(f, "after '{name}'")?,
            Scope::NameContains(needle) => write!(f, "name contains '{needle}'")?,
        }
        if let Some(limit) = self.limit {
            write!(f, " (limit {limit})")?;
        }
        Ok(())
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Resolve `selection` against the directory.
///
/// An empty result is an error: a run that would silently do nothing is
/// almost always a typo.
pub fn select_institutions(
    directory: &dyn Directory,
    selection: &Selection,
) -> Result<Vec<Institution>, SyncError> {
    let mut selected = match &selection.scope {
        Scope::All => directory.list_institutions()?,
        Scope::Ids(ids) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match directory.find_institution(id) {
                    Ok(inst) => out.push(inst),
                    Err(DirectoryError::InstitutionNotFound { id }) => {
                        return Err(SyncError::InstitutionNotFound { id })
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            out
        }
        Scope::After(boundary) => {
            let all = directory.list_institutions()?;
            let matches: Vec<usize> = all
                .iter()
                .enumerate()
                .filter(|(_, inst)| same_name(&inst.name, boundary))
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [] => {
                    return Err(SyncError::BoundaryNotFound {
                        name: boundary.clone(),
                    })
                }
                [index] => all.into_iter().skip(index + 1).collect(),
                _ => {
                    return Err(SyncError::AmbiguousBoundary {
                        name: boundary.clone(),
                        matches: matches.iter().map(|i| all[*i].id.0.clone()).collect(),
                    })
                }
            }
        }
        Scope::NameContains(needle) => {
            let needle = needle.trim().to_lowercase();
            directory
                .list_institutions()?
                .into_iter()
                .filter(|inst| inst.name.to_lowercase().contains(&needle))
                .collect()
        }
    };

    if let Some(limit) = selection.limit {
        selected.truncate(limit);
    }
    if selected.is_empty() {
        return Err(SyncError::NoInstitutions);
    }
    tracing::info!("selected {} institution(s) for {selection}", selected.len());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrsync_core::YamlDirectory;
    use tempfile::TempDir;

    fn directory(names: &[(&str, &str)]) -> (TempDir, YamlDirectory) {
        let tmp = TempDir::new().unwrap();
        let dir = YamlDirectory::new(tmp.path());
        for (id, name) in names {
            dir.put_institution(
                Institution {
                    id: InstitutionId::from(*id),
                    name: name.to_string(),
                    vote_number: None,
                    tax_id: None,
                },
                vec![],
            )
            .unwrap();
        }
        (tmp, dir)
    }

    fn ids(institutions: &[Institution]) -> Vec<&str> {
        institutions.iter().map(|i| i.id.0.as_str()).collect()
    }

    #[test]
    fn after_boundary_returns_strictly_later_names() {
        let (_tmp, dir) = directory(&[("1", "Afya"), ("2", "Elimu"), ("3", "Maji"), ("4", "Ujenzi")]);
        let selection = Selection {
            scope: Scope::After("elimu".to_string()),
            limit: None,
        };
        assert_eq!(ids(&select_institutions(&dir, &selection).unwrap()), vec!["3", "4"]);
    }

    #[test]
    fn missing_boundary_fails_loudly() {
        let (_tmp, dir) = directory(&[("1", "Afya"), ("2", "Elimu")]);
        let selection = Selection {
            scope: Scope::After("Kilimo".to_string()),
            limit: None,
        };
        let err = select_institutions(&dir, &selection).unwrap_err();
        assert!(matches!(err, SyncError::BoundaryNotFound { .. }), "got: {err}");
    }

    #[test]
    fn ambiguous_boundary_fails_loudly() {
        let (_tmp, dir) = directory(&[("1", "Afya"), ("2", "AFYA "), ("3", "Maji")]);
        let selection = Selection {
            scope: Scope::After("afya".to_string()),
            limit: None,
        };
        match select_institutions(&dir, &selection).unwrap_err() {
            SyncError::AmbiguousBoundary { matches, .. } => assert_eq!(matches, vec!["1", "2"]),
            other => panic!("expected ambiguous boundary, got {other}"),
        }
    }

    #[test]
    fn unknown_id_is_setup_error() {
        let (_tmp, dir) = directory(&[("1", "Afya")]);
        let err = select_institutions(&dir, &Selection::institution("nope")).unwrap_err();
        assert!(matches!(err, SyncError::InstitutionNotFound { .. }));
    }

    #[test]
    fn name_filter_and_limit() {
        let (_tmp, dir) = directory(&[("1", "Wizara ya Afya"), ("2", "Hospitali ya Afya"), ("3", "Maji")]);
        let selection = Selection {
            scope: Scope::NameContains("AFYA".to_string()),
            limit: Some(1),
        };
        assert_eq!(ids(&select_institutions(&dir, &selection).unwrap()), vec!["2"]);
    }

    #[test]
    fn boundary_at_end_selects_nothing() {
        let (_tmp, dir) = directory(&[("1", "Afya"), ("2", "Maji")]);
        let selection = Selection {
            scope: Scope::After("Maji".to_string()),
            limit: None,
        };
        assert!(matches!(
            select_institutions(&dir, &selection).unwrap_err(),
            SyncError::NoInstitutions
        ));
    }
}
