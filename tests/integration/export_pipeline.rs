//! Integration tests for the export pipeline against the in-memory service

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use coda_exporter::pipeline::{ExportOptions, Exporter, NoProgress};
use coda_exporter::Error;

use crate::support::{plans_columns, plans_doc, FakeApi, RecordingProgress};

#[tokio::test]
async fn test_export_writes_full_layout() {
    let temp_dir = TempDir::new().unwrap();
    let api = Arc::new(plans_doc());
    let progress = Arc::new(RecordingProgress::default());

    // A single file slot still writes the whole layout.
    let options = ExportOptions::new(temp_dir.path()).with_file_concurrency(1);
    let summary = Exporter::new(api, options)
        .export(&CancellationToken::new(), progress.clone())
        .await
        .unwrap();

    assert_eq!(summary.docs, 1);
    assert_eq!(summary.tables, 2);
    assert_eq!(summary.rows, 3);
    assert_eq!(progress.last("Roadmap d-1"), Some((2, 2)));

    let doc_dir = temp_dir.path().join("Team fl-1").join("Roadmap d-1");
    assert!(doc_dir.join("doc.json").is_file());

    let table_dir = doc_dir.join("tables/table/Plans grid-1");
    for file in ["table.json", "values.csv", "values.html", "snapshot.json"] {
        assert!(table_dir.join(file).is_file(), "missing {file}");
    }
    assert!(table_dir.join("columns/C1 c-1.json").is_file());
    assert!(table_dir.join("columns/C2 c-2.json").is_file());
    assert!(table_dir.join("rows/i-1.json").is_file());
    assert!(table_dir.join("rows/i-2.json").is_file());
    assert!(doc_dir.join("tables/view/Open plans view-1/values.csv").is_file());

    // Rows come out in index order even though the service listed them reversed.
    let csv = fs::read_to_string(table_dir.join("values.csv")).unwrap();
    assert_eq!(csv, "\"C1\",\"C2\"\n\"v1\",\"v2\"\n\"v3\",\"v4\"\n");

    let html = fs::read_to_string(table_dir.join("values.html")).unwrap();
    assert!(html.contains(r#"<th title="thisRow.C1">C2</th>"#));
    assert!(html.contains(r#"<th title="no formula">C1</th>"#));

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(table_dir.join("rows/i-2.json")).unwrap())
            .unwrap();
    assert_eq!(raw["values"]["c-1"], "v3");
}

#[tokio::test]
async fn test_export_single_doc_by_id() {
    let temp_dir = TempDir::new().unwrap();
    let options = ExportOptions::new(temp_dir.path()).with_doc_id("d-1");

    let summary = Exporter::new(Arc::new(plans_doc()), options)
        .export(&CancellationToken::new(), Arc::new(NoProgress))
        .await
        .unwrap();
    assert_eq!(summary.docs, 1);

    let options = ExportOptions::new(temp_dir.path().join("other")).with_doc_id("missing");
    let err = Exporter::new(Arc::new(plans_doc()), options)
        .export(&CancellationToken::new(), Arc::new(NoProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_export_refuses_existing_doc_dir() {
    let temp_dir = TempDir::new().unwrap();
    let doc_dir = temp_dir.path().join("Team fl-1").join("Roadmap d-1");
    fs::create_dir_all(&doc_dir).unwrap();
    fs::write(doc_dir.join("keep.txt"), "mine").unwrap();

    let result = Exporter::new(Arc::new(plans_doc()), ExportOptions::new(temp_dir.path()))
        .export(&CancellationToken::new(), Arc::new(NoProgress))
        .await;

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(doc_dir.join("keep.txt")).unwrap(), "mine");
    assert!(!doc_dir.join("doc.json").exists());
}

#[tokio::test]
async fn test_export_cancelled_before_start() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = Exporter::new(Arc::new(plans_doc()), ExportOptions::new(temp_dir.path()))
        .export(&cancel, Arc::new(NoProgress))
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_failed_tables_do_not_skip_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let table = |id: &str, name: &str| json!({"id": id, "name": name, "tableType": "table"});
    let row = json!({"id": "i-1", "index": 1, "values": {"c-1": "v1", "c-2": "v2"}});
    let api = FakeApi::new("d-1", "Roadmap")
        .with_table(table("grid-0", "Drafts"), plans_columns(), vec![])
        .with_table(table("grid-1", "Plans"), plans_columns(), vec![row])
        .with_table(table("grid-2", "Archive"), plans_columns(), vec![])
        .with_failing_rows("grid-0")
        .with_failing_rows("grid-2");
    let progress = Arc::new(RecordingProgress::default());

    let err = Exporter::new(Arc::new(api), ExportOptions::new(temp_dir.path()))
        .export(&CancellationToken::new(), progress.clone())
        .await
        .unwrap_err();

    // Lowest submission index wins.
    match err {
        Error::Network(message) => assert_eq!(message, "rows of grid-0"),
        other => panic!("expected network error, got {other}"),
    }

    let doc_dir = temp_dir.path().join("Team fl-1").join("Roadmap d-1");
    let table_dir = doc_dir.join("tables/table/Plans grid-1");
    for file in ["table.json", "values.csv", "values.html", "snapshot.json", "rows/i-1.json"] {
        assert!(table_dir.join(file).is_file(), "missing {file}");
    }
    assert!(!doc_dir.join("tables/table/Drafts grid-0/values.csv").exists());
    assert_eq!(progress.last("Roadmap d-1"), Some((1, 3)));
}
