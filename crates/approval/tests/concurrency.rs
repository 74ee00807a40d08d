//! Concurrent signers against one file database
//!
//! Each worker opens its own connection, like separate server processes.

use std::sync::{Arc, Barrier};
use std::thread;

use esign_approval::ApprovalEngine;
use esign_core::{
    signing_now, ESignError, NewRequest, RequestStatus, SignatureDraft, SignerAssignment,
    SignerSnapshot,
};
use esign_ledger::SignatureLedger;
use esign_policy::PolicyResolver;
use esign_store::Database;
use tempfile::tempdir;

struct Node {
    db: Arc<Database>,
    ledger: SignatureLedger,
    engine: ApprovalEngine,
}

fn node(path: &std::path::Path) -> Node {
    let db = Arc::new(Database::open(path).unwrap());
    let policies = Arc::new(PolicyResolver::with_database(db.clone()));
    Node {
        ledger: SignatureLedger::with_database(db.clone()),
        engine: ApprovalEngine::with_database(db.clone(), policies),
        db,
    }
}

fn draft(signer_id: i64) -> SignatureDraft {
    SignatureDraft {
        entity_type: "NC".to_string(),
        entity_id: 42,
        action: "APPROVE_CLOSURE".to_string(),
        signer_id,
        signer: SignerSnapshot {
            full_name: "Ada Quality".to_string(),
            role: "QA_MANAGER".to_string(),
        },
        meaning: "approved".to_string(),
        reason: None,
        method: None,
        origin: Default::default(),
    }
}

fn signature_count(db: &Database) -> i64 {
    db.read(|conn| {
        conn.query_row("SELECT COUNT(*) FROM signatures", [], |row| row.get(0))
            .map_err(esign_store::StoreError::from)
    })
    .unwrap()
}

#[test]
fn test_concurrent_signs_on_one_slot_record_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("esign.db");

    let setup = node(&path);
    let detail = setup
        .engine
        .create_request(
            NewRequest::new(
                "NC",
                42,
                "APPROVE_CLOSURE",
                "Close NC-42",
                vec![SignerAssignment::new(1), SignerAssignment::new(2)],
            ),
            99,
        )
        .unwrap();
    let slot = detail.slot_for(1).unwrap().id;

    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let n = node(&path);
                barrier.wait();
                n.db.write(|tx| {
                    let signature = n.ledger.create_signature_in(tx, draft(1), signing_now())?;
                    n.engine.record_sign_in(tx, slot, 1, signature.id, signing_now())
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ESignError::Conflict(_))));
    }

    let stored = setup.engine.get_request(detail.request.id).unwrap();
    assert_eq!(stored.request.current_signatures, 1);
    assert_eq!(stored.request.status, RequestStatus::PartiallySigned);
    // Losing workers rolled back their signature rows
    assert_eq!(signature_count(&setup.db), 1);
}

#[test]
fn test_concurrent_creation_allocates_unique_numbers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("esign.db");
    drop(node(&path));

    let workers = 4;
    let per_worker = 5;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let n = node(&path);
                barrier.wait();
                (0..per_worker)
                    .map(|i| {
                        n.engine
                            .create_request(
                                NewRequest::new(
                                    "DOC",
                                    (w * 100 + i) as i64,
                                    "RELEASE",
                                    "Release document",
                                    vec![SignerAssignment::new(1)],
                                ),
                                99,
                            )
                            .unwrap()
                            .request
                            .request_number
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    numbers.sort();
    let expected: Vec<String> = (1..=(workers * per_worker))
        .map(|n| format!("SR-{:04}", n))
        .collect();
    assert_eq!(numbers, expected);
}
