use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_malformed_lines_do_not_abort_the_stream() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"op":"open_account","holder":"customer","id":1}}"#).unwrap();
    // Unknown operation.
    writeln!(file, r#"{{"op":"teleport","id":1}}"#).unwrap();
    // Not even JSON.
    writeln!(file, "deposit, 1, 1, 1.0").unwrap();
    writeln!(
        file,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"30.00","request_id":"t1"}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("fleetpay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains("customer,1,30.00,active"));
}

#[test]
fn test_declined_commands_are_reported_and_skipped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"op":"open_account","holder":"customer","id":1}}"#).unwrap();
    writeln!(
        file,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"20.00","request_id":"t1"}}"#
    )
    .unwrap();
    // Overdraft: declined, no entry.
    writeln!(
        file,
        r#"{{"op":"withdraw","holder":"customer","id":1,"amount":"100.00","request_id":"w1"}}"#
    )
    .unwrap();
    // Non-positive amount: declined at validation.
    writeln!(
        file,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"-5.00","request_id":"t2"}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"op":"withdraw","holder":"customer","id":1,"amount":"5.00","request_id":"w2"}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("fleetpay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("insufficient funds"))
        .stderr(predicate::str::contains("must be positive"))
        .stdout(predicate::str::contains("customer,1,15.00,active"));
}

#[test]
fn test_order_for_closed_merchant_is_a_named_decline() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"op":"open_account","holder":"customer","id":1}}"#).unwrap();
    writeln!(
        file,
        r#"{{"op":"topup","holder":"customer","id":1,"amount":"100.00","request_id":"t1"}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"op":"set_merchant","merchant":10,"lat":40.4168,"lng":-3.7038,"accepting_orders":false}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"op":"place_order","customer":1,"merchant":10,"payment_method":"wallet","items":[{{"name":"soup","unit_price":"10.00","quantity":1}}],"address":"home","lat":40.4180,"lng":-3.7020,"order_token":"tok-1"}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("fleetpay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("merchant 10 is not accepting orders"))
        // No debit happened.
        .stdout(predicate::str::contains("customer,1,100.00,active"));
}
