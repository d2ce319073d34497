//! CLI integration tests
//!
//! These tests run the built binary against schema and instance files
//! written to a temporary directory.

#![cfg(feature = "cli")]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const ORDER_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="order">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="item" maxOccurs="unbounded"/>
            </xs:sequence>
            <xs:attribute name="id" use="required"/>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xmlcursor"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_validate_valid_document() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "order.xsd", ORDER_XSD);
    let doc = write(dir.path(), "order.xml", r#"<order id="1"><item/></order>"#);

    let output = run(&["validate", "-s", schema.to_str().unwrap(), doc.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout.contains("valid"));
}

#[test]
fn test_cli_validate_invalid_document_json() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "order.xsd", ORDER_XSD);
    let doc = write(dir.path(), "order.xml", "<order><item/></order>");

    let output = run(&[
        "validate",
        "--schema",
        schema.to_str().unwrap(),
        "--json",
        doc.to_str().unwrap(),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["valid"], serde_json::Value::Bool(false));
    assert!(!report["issues"].as_array().unwrap().is_empty());
}

#[test]
fn test_cli_validate_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "order.xsd", ORDER_XSD);
    let missing = dir.path().join("missing.xml");

    let output = run(&["validate", "-s", schema.to_str().unwrap(), missing.to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("Error"));
}

#[test]
fn test_cli_rejects_unknown_mode() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "order.xsd", ORDER_XSD);
    let doc = write(dir.path(), "order.xml", r#"<order id="1"><item/></order>"#);

    let output = run(&[
        "validate",
        "-s",
        schema.to_str().unwrap(),
        "--mode",
        "bogus",
        doc.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
}
