#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: open the account and top it up.
    let mut stream1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(stream1, r#"{{"op":"open_account","holder":"customer","id":1}}"#).unwrap();
    writeln!(
        stream1,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"100.00","request_id":"t1"}}"#
    )
    .unwrap();

    let mut cmd1 = Command::new(cargo_bin!("fleetpay"));
    cmd1.arg(stream1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("customer,1,100.00,active"));

    // 2. Second run against the same DB path: the chain resumes.
    let mut stream2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        stream2,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"50.00","request_id":"t2"}}"#
    )
    .unwrap();
    writeln!(stream2, r#"{{"op":"verify_chain","holder":"customer","id":1}}"#).unwrap();

    let mut cmd2 = Command::new(cargo_bin!("fleetpay"));
    cmd2.arg(stream2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("customer,1,150.00,active"));

    // 3. A replayed top-up request is a no-op across processes.
    let mut stream3 = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        stream3,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"50.00","request_id":"t2"}}"#
    )
    .unwrap();

    let mut cmd3 = Command::new(cargo_bin!("fleetpay"));
    cmd3.arg(stream3.path()).arg("--db-path").arg(&db_path);

    let output3 = cmd3.output().expect("Failed to execute command");
    assert!(output3.status.success());
    let stdout3 = String::from_utf8_lossy(&output3.stdout);
    assert!(stdout3.contains("customer,1,150.00,active"));
}
