//! Policy caches shared across database handles
//!
//! Each `Database::open` is its own connection, the way separate processes
//! would see the same file.

use std::sync::Arc;

use esign_core::{ESignError, NewPolicy, PolicyUpdate};
use esign_policy::PolicyResolver;
use esign_store::Database;
use tempfile::TempDir;

fn open_pair(dir: &TempDir) -> (PolicyResolver, PolicyResolver) {
    let path = dir.path().join("esign.db");
    let a = PolicyResolver::with_database(Arc::new(Database::open(&path).unwrap()));
    let b = PolicyResolver::with_database(Arc::new(Database::open(&path).unwrap()));
    (a, b)
}

#[test]
fn test_cached_miss_sees_policy_created_elsewhere() {
    let dir = TempDir::new().unwrap();
    let (a, b) = open_pair(&dir);

    assert!(a.resolve("NC", "CLOSE").unwrap().is_none());
    let created = b.create_policy(NewPolicy::new("NC", "CLOSE"), 1).unwrap();

    assert_eq!(a.resolve("NC", "CLOSE").unwrap().map(|p| p.id), Some(created.id));
    assert!(matches!(
        a.create_policy(NewPolicy::new("NC", "CLOSE"), 1),
        Err(ESignError::Conflict(_))
    ));
}

#[test]
fn test_cached_hit_sees_update_made_elsewhere() {
    let dir = TempDir::new().unwrap();
    let (a, b) = open_pair(&dir);

    let policy = a.create_policy(NewPolicy::new("CAPA", "CLOSE"), 1).unwrap();
    assert_eq!(a.resolve("CAPA", "CLOSE").unwrap().unwrap().required_signatures, 1);

    b.update_policy(
        policy.id,
        PolicyUpdate {
            required_signatures: Some(3),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(a.resolve("CAPA", "CLOSE").unwrap().unwrap().required_signatures, 3);

    b.update_policy(
        policy.id,
        PolicyUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(a.resolve("CAPA", "CLOSE").unwrap().is_none());
}

#[test]
fn test_resolvers_sharing_one_handle() {
    let db = Arc::new(Database::in_memory().unwrap());
    let a = PolicyResolver::with_database(db.clone());
    let b = PolicyResolver::with_database(db);

    assert!(a.resolve("DOC", "RELEASE").unwrap().is_none());
    b.create_policy(NewPolicy::new("DOC", "RELEASE").required(2), 1).unwrap();
    assert_eq!(a.resolve("DOC", "RELEASE").unwrap().unwrap().required_signatures, 2);
}
