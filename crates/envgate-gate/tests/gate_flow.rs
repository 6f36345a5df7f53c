// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end gate flow against the filesystem store.

use std::fs;
use std::path::Path;

use envgate_core::config::{GateConfig, GatePaths};
use envgate_core::error::GateError;
use envgate_core::types::{GateMode, Pin};
use envgate_gate::export::{MANIFEST_FILE, REPORT_FILE};
use envgate_gate::{
    ExportOptions, ExportReport, Gate, GateRequest, ManifestEntry, SnapshotOptions, export, snapshot,
};
use envgate_security::{
    ApprovalIssuer, ApprovalVerifier, CredentialStore, DecisionLog, FsStore, Ledger,
};

fn workspace(root: &Path) -> GatePaths {
    let paths = GateConfig::default().resolve(root);
    fs::create_dir_all(paths.secrets_file.parent().unwrap()).unwrap();
    fs::write(&paths.secrets_file, "API_TOKEN=s3cret\n").unwrap();
    fs::create_dir_all(root.join("tools")).unwrap();
    fs::write(root.join("tools/deploy.sh"), "#!/bin/sh\necho deploy\n").unwrap();
    fs::write(root.join("README.md"), "# project\n").unwrap();
    paths
}

#[test]
fn approval_lifecycle_and_gated_export() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let store = FsStore::new(&paths);

    CredentialStore::new(&store)
        .set_credential(&Pin::new("1234"), false)
        .unwrap();
    let record = ApprovalIssuer::new(&store)
        .issue(&Pin::new("1234"), "test")
        .unwrap();
    let id = record.payload.id.to_string();

    assert!(Ledger::new(&store).contains(&id).unwrap());
    let ledger_text = fs::read_to_string(&paths.ledger_file).unwrap();
    assert!(ledger_text.contains(&format!("APPROVAL: id={id} message=test")));

    let verifier = ApprovalVerifier::new(&store);
    assert!(verifier.verify_with_pin(&id, &Pin::new("1234")).granted);
    assert!(!verifier.verify_with_pin(&id, &Pin::new("0000")).granted);
    assert!(verifier.verify_exists(&id).granted);

    let log = DecisionLog::open(&paths.decision_db).unwrap();
    let gate = Gate::new(&store).with_decision_log(&log);
    let out = dir.path().join("release");
    let options = ExportOptions::from_paths(&paths, &out, true);

    let request = GateRequest::approval(&id).with_pin(Pin::new("1234"));
    let report = export(&gate, &request, &options).unwrap();
    assert!(report.secrets_included);
    assert_eq!(report.approval_id.as_deref(), Some(id.as_str()));
    assert!(report.included.contains(&"ops/secrets.env".to_string()));

    let manifest: Vec<ManifestEntry> =
        serde_json::from_str(&fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest.len(), 3);
    let written: ExportReport =
        serde_json::from_str(&fs::read_to_string(out.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(written.approval_id, Some(id.clone()));
    assert_eq!(
        fs::read_to_string(report.bundle.join("ops/secrets.env")).unwrap(),
        "API_TOKEN=s3cret\n"
    );
    assert!(report.archive.is_file());

    let logged = log.for_approval(&id).unwrap();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].granted);
    assert_eq!(logged[0].mode, GateMode::Strict.as_str());
}

#[test]
fn export_without_approval_refused_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let store = FsStore::new(&paths);
    CredentialStore::new(&store)
        .set_credential(&Pin::new("1234"), false)
        .unwrap();

    let out = dir.path().join("release");
    let options = ExportOptions::from_paths(&paths, &out, true);
    let err = export(&Gate::new(&store), &GateRequest::default(), &options).unwrap_err();

    assert!(matches!(err, GateError::MissingApproval));
    assert!(!out.exists());
    assert_eq!(
        fs::read_to_string(&paths.secrets_file).unwrap(),
        "API_TOKEN=s3cret\n"
    );
}

#[test]
fn wrong_pin_export_refused() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let store = FsStore::new(&paths);
    CredentialStore::new(&store)
        .set_credential(&Pin::new("1234"), false)
        .unwrap();
    let id = ApprovalIssuer::new(&store)
        .issue(&Pin::new("1234"), "backup")
        .unwrap()
        .payload
        .id
        .to_string();

    let out = dir.path().join("release");
    let options = ExportOptions::from_paths(&paths, &out, true);
    let request = GateRequest::approval(&id).with_pin(Pin::new("0000"));
    let err = export(&Gate::new(&store), &request, &options).unwrap_err();

    assert!(matches!(err, GateError::SignatureMismatch));
    assert!(!out.exists());
}

#[test]
fn forged_ledger_line_without_record_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let store = FsStore::new(&paths);
    CredentialStore::new(&store)
        .set_credential(&Pin::new("1234"), false)
        .unwrap();

    let forged = "3f2504e0-4f89-41d3-9a0c-0305e82c3301";
    fs::write(
        &paths.ledger_file,
        format!("- [2026-01-01 00:00:00] APPROVAL: id={forged} message=forged\n"),
    )
    .unwrap();

    let err = Gate::new(&store)
        .authorize("exec", GateMode::Existence, &GateRequest::approval(forged))
        .unwrap_err();
    assert!(matches!(err, GateError::NotFound(_)));
}

#[test]
fn approvals_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let id = {
        let store = FsStore::new(&paths);
        CredentialStore::new(&store)
            .set_credential(&Pin::new("1234"), false)
            .unwrap();
        ApprovalIssuer::new(&store)
            .issue(&Pin::new("1234"), "persist")
            .unwrap()
            .payload
            .id
            .to_string()
    };

    let reopened = FsStore::new(&paths);
    let auth = Gate::new(&reopened)
        .authorize(
            "unlock",
            GateMode::Strict,
            &GateRequest::approval(&id).with_pin(Pin::new("1234")),
        )
        .unwrap();
    assert_eq!(auth.approval_id, id);
}

#[test]
fn snapshot_without_approval_copies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = workspace(dir.path());
    let store = FsStore::new(&paths);
    let log = DecisionLog::open(&paths.decision_db).unwrap();

    let out = dir.path().join("build");
    let options = SnapshotOptions::from_paths(&paths, &out, vec![]);
    let err = snapshot(
        &Gate::new(&store).with_decision_log(&log),
        &GateRequest::default(),
        &options,
    )
    .unwrap_err();

    assert!(matches!(err, GateError::MissingApproval));
    assert!(!out.exists());
    let recent = log.recent(1).unwrap();
    assert_eq!(recent[0].operation, "snapshot");
    assert!(!recent[0].granted);
}
