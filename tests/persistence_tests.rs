use bidsheet::codec::{self, Envelope, PAYLOAD_VERSION};
use bidsheet::extract::FieldMap;
use bidsheet::persistence::{FileStore, WorksheetStore};
use bidsheet::worksheet::WorksheetKind;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_blob_round_trip_keeps_non_ascii_text() {
    let payload = json!({ "formData": { "jobName": "Café Façade – 北棟", "floors": 3 } });
    let blob = codec::encode(&payload).expect("encode");
    assert!(blob.is_ascii());
    assert_eq!(codec::decode(&blob).expect("decode"), payload);

    // Surrounding whitespace from a pasted blob is tolerated
    let padded = format!("  {}\n", blob);
    assert_eq!(codec::decode(&padded).expect("decode"), payload);

    assert!(codec::decode("%%% not base64 %%%").is_err());
    println!("✓ Blobs carry UTF-8 JSON through base64");
}

#[test]
fn test_envelope_header_and_body() {
    let body = json!({ "summaryRows": [], "summary": { "totalSOV": "0.00" } });
    let envelope = Envelope::new(WorksheetKind::ScheduleOfValues, "006ABC", body);
    assert_eq!(envelope.worksheet_type, "ScheduleOfValues");
    assert_eq!(envelope.version, PAYLOAD_VERSION);
    assert_eq!(envelope.opportunity_id, "006ABC");
    assert!(envelope.saved_date.ends_with('Z'));

    let raw = codec::decode(&envelope.encode().expect("encode")).expect("decode");
    assert_eq!(raw["worksheetType"], "ScheduleOfValues");
    assert_eq!(raw["summary"]["totalSOV"], "0.00", "Body keys sit beside the header");

    let decoded = Envelope::decode(&envelope.encode().expect("encode")).expect("decode");
    assert_eq!(decoded, envelope);
    assert_eq!(decoded.kind(), Some(WorksheetKind::ScheduleOfValues));
    assert!(decoded.body_value().get("worksheetType").is_none());
    println!("✓ Envelope flattens the body next to its header");
}

#[tokio::test]
async fn test_versions_are_numbered_and_listed_newest_first() {
    let dir = TempDir::new().expect("temp dir");
    let store = FileStore::new(dir.path()).with_user("estimator");
    let kind = WorksheetKind::Estimate;

    assert_eq!(store.next_version_number(kind, "OPP-1").await.unwrap(), 1);
    assert!(store.load_latest(kind, "OPP-1").await.unwrap().is_none());
    assert!(store.list_versions(kind, "OPP-1").await.unwrap().is_empty());

    let first = store.save(kind, "OPP-1", "blob-one").await.unwrap();
    let second = store.save(kind, "OPP-1", "blob-two").await.unwrap();
    assert_eq!(first.version_number, 1);
    assert_eq!(second.version_number, 2);
    assert_eq!(second.created_by, "estimator");
    assert_eq!(second.title, "BidWorksheet_Estimate");
    assert_ne!(first.id, second.id);

    assert_eq!(store.next_version_number(kind, "OPP-1").await.unwrap(), 3);
    let listed = store.list_versions(kind, "OPP-1").await.unwrap();
    let numbers: Vec<u32> = listed.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![2, 1]);

    assert_eq!(
        store.load_version(kind, "OPP-1", &first.id).await.unwrap().as_deref(),
        Some("blob-one")
    );
    assert!(store.load_version(kind, "OPP-1", "missing").await.unwrap().is_none());

    // Other kinds and records are separate archives
    assert_eq!(store.next_version_number(WorksheetKind::Itm, "OPP-1").await.unwrap(), 1);
    assert_eq!(store.next_version_number(kind, "OPP-2").await.unwrap(), 1);
    println!("✓ Versions 1, 2 saved, next is 3");
}

#[tokio::test]
async fn test_latest_is_newest_of_autosave_and_versions() {
    let dir = TempDir::new().expect("temp dir");
    let store = FileStore::new(dir.path());
    let kind = WorksheetKind::Underground;

    store.autosave(kind, "OPP-1", "draft-1").await.unwrap();
    assert_eq!(store.load_latest(kind, "OPP-1").await.unwrap().as_deref(), Some("draft-1"));

    // Autosave overwrites its single slot
    store.autosave(kind, "OPP-1", "draft-2").await.unwrap();
    assert_eq!(store.load_latest(kind, "OPP-1").await.unwrap().as_deref(), Some("draft-2"));

    let version = store.save(kind, "OPP-1", "saved-1").await.unwrap();
    assert_eq!(version.created_by, "system");
    assert_eq!(store.load_latest(kind, "OPP-1").await.unwrap().as_deref(), Some("saved-1"));

    store.autosave(kind, "OPP-1", "draft-3").await.unwrap();
    assert_eq!(store.load_latest(kind, "OPP-1").await.unwrap().as_deref(), Some("draft-3"));
    assert!(store.list_versions(kind, "OPP-1").await.unwrap().len() == 1);
    println!("✓ Latest snapshot picks the newest write");
}

#[tokio::test]
async fn test_external_record_merges_fields() {
    let dir = TempDir::new().expect("temp dir");
    let store = FileStore::new(dir.path());

    let mut fields = FieldMap::new();
    fields.insert("Pump_Direct_Cost_Total__c".into(), json!(1200.0));
    fields.insert("Type_FDC__c".into(), json!("2 Way"));
    store.update_external_record("OPP-1", &fields).await.unwrap();

    let mut more = FieldMap::new();
    more.insert("Type_FDC__c".into(), json!("Flush"));
    store.update_external_record("OPP-1", &more).await.unwrap();

    let record = store.external_record("OPP-1").unwrap();
    assert_eq!(record["Pump_Direct_Cost_Total__c"], json!(1200.0));
    assert_eq!(record["Type_FDC__c"], "Flush");
    assert!(store.external_record("OPP-9").unwrap().is_empty());
    println!("✓ Record fields merge across saves");
}

#[tokio::test]
async fn test_record_ids_cannot_escape_the_root() {
    let dir = TempDir::new().expect("temp dir");
    let store = FileStore::new(dir.path());

    assert!(store.autosave(WorksheetKind::Design, "../etc", "x").await.is_err());
    assert!(store.load_latest(WorksheetKind::Design, "").await.is_err());
    assert!(store.autosave(WorksheetKind::Design, "OPP_1-a", "x").await.is_ok());
    println!("✓ Record ids are restricted to a safe alphabet");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_saves_get_distinct_numbers() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileStore::new(dir.path()));
    let kind = WorksheetKind::Estimate;

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            if n % 2 == 0 {
                store.autosave(kind, "OPP-1", &format!("draft-{}", n)).await.map(|_| None)
            } else {
                store.save(kind, "OPP-1", &format!("saved-{}", n)).await.map(Some)
            }
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        if let Some(info) = handle.await.expect("task").expect("store call") {
            numbers.push(info.version_number);
        }
    }
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(store.list_versions(kind, "OPP-1").await.unwrap().len(), 4);
    assert_eq!(store.next_version_number(kind, "OPP-1").await.unwrap(), 5);
    assert!(store.load_latest(kind, "OPP-1").await.unwrap().is_some());
    println!("✓ Parallel writers share one archive without losing versions");
}
