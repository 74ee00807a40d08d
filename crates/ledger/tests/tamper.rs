//! Tamper detection against a file-backed database
//!
//! Simulates someone with raw database access rewriting a signed field.

use std::sync::Arc;

use esign_core::{OriginMeta, SignatureDraft, SignerSnapshot};
use esign_ledger::SignatureLedger;
use esign_store::{Database, StoreError};
use tempfile::TempDir;

fn draft() -> SignatureDraft {
    SignatureDraft {
        entity_type: "DOC".to_string(),
        entity_id: 7,
        action: "RELEASE".to_string(),
        signer_id: 3,
        signer: SignerSnapshot {
            full_name: "Lin Reviewer".to_string(),
            role: "DOC_CONTROL".to_string(),
        },
        meaning: "reviewed".to_string(),
        reason: None,
        method: None,
        origin: OriginMeta::default(),
    }
}

#[test]
fn test_out_of_band_edit_breaks_integrity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("esign.db");

    let db = Arc::new(Database::open(&path).unwrap());
    let ledger = SignatureLedger::with_database(db.clone());
    let sig = ledger.create_signature(draft()).unwrap();
    assert!(ledger.verify_signature(sig.id).unwrap().is_intact);

    // Raw access bypasses the immutability trigger
    db.write(|tx| {
        tx.execute_batch("DROP TRIGGER signatures_immutable;")?;
        tx.execute(
            "UPDATE signatures SET entity_id = 8 WHERE id = ?1",
            [sig.id],
        )?;
        Ok::<_, StoreError>(())
    })
    .unwrap();

    let v = ledger.verify_signature(sig.id).unwrap();
    assert!(!v.is_intact);
    assert!(v.is_valid, "validity flag is independent of integrity");
    assert_ne!(v.stored_digest, v.recomputed_digest);
}

#[test]
fn test_backdated_timestamp_breaks_integrity() {
    let db = Arc::new(Database::in_memory().unwrap());
    let ledger = SignatureLedger::with_database(db.clone());
    let sig = ledger.create_signature(draft()).unwrap();

    db.write(|tx| {
        tx.execute_batch("DROP TRIGGER signatures_immutable;")?;
        tx.execute(
            "UPDATE signatures SET signed_at = '2020-01-01T00:00:00.000000Z' WHERE id = ?1",
            [sig.id],
        )?;
        Ok::<_, StoreError>(())
    })
    .unwrap();

    assert!(!ledger.verify_signature(sig.id).unwrap().is_intact);
}

#[test]
fn test_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("esign.db");

    let id = {
        let ledger = SignatureLedger::with_database(Arc::new(Database::open(&path).unwrap()));
        ledger.create_signature(draft()).unwrap().id
    };

    let ledger = SignatureLedger::with_database(Arc::new(Database::open(&path).unwrap()));
    let v = ledger.verify_signature(id).unwrap();
    assert!(v.is_intact);
}

fn rewrite(db: &Database, sql: &str, id: i64) {
    db.write(|tx| {
        tx.execute_batch("DROP TRIGGER IF EXISTS signatures_immutable;")?;
        tx.execute(sql, [id])?;
        Ok::<_, StoreError>(())
    })
    .unwrap();
}

#[test]
fn test_unparseable_timestamp_is_reported_not_raised() {
    let db = Arc::new(Database::in_memory().unwrap());
    let ledger = SignatureLedger::with_database(db.clone());
    let sig = ledger.create_signature(draft()).unwrap();

    rewrite(&db, "UPDATE signatures SET signed_at = 'yesterday' WHERE id = ?1", sig.id);

    let v = ledger.verify_signature(sig.id).unwrap();
    assert!(!v.is_intact);
    assert!(v.is_valid);
    assert_eq!(v.signed_at, "yesterday");
    assert_eq!(v.stored_digest, sig.digest);
    assert_ne!(v.recomputed_digest, sig.digest);
}

#[test]
fn test_unknown_method_does_not_block_verification() {
    let db = Arc::new(Database::in_memory().unwrap());
    let ledger = SignatureLedger::with_database(db.clone());
    let sig = ledger.create_signature(draft()).unwrap();

    rewrite(&db, "UPDATE signatures SET method = 'CARRIER_PIGEON' WHERE id = ?1", sig.id);

    // The method is not part of the digest, so the row is still intact
    let v = ledger.verify_signature(sig.id).unwrap();
    assert!(v.is_intact);
    assert!(ledger.get_signature(sig.id).is_err());
}

#[test]
fn test_non_integer_entity_id_is_not_intact() {
    let db = Arc::new(Database::in_memory().unwrap());
    let ledger = SignatureLedger::with_database(db.clone());
    let sig = ledger.create_signature(draft()).unwrap();

    rewrite(&db, "UPDATE signatures SET entity_id = 'seven' WHERE id = ?1", sig.id);

    let v = ledger.verify_signature(sig.id).unwrap();
    assert!(!v.is_intact);
    assert!(v.recomputed_digest.is_empty());
}

#[test]
fn test_missing_signature_is_still_not_found() {
    let ledger = SignatureLedger::with_database(Arc::new(Database::in_memory().unwrap()));
    assert!(matches!(
        ledger.verify_signature(404),
        Err(esign_core::ESignError::NotFound { .. })
    ));
}
