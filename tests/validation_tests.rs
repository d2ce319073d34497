//! Schema compilation and streaming validation integration tests

use std::fs;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use xmlcursor::validators::{
    IssueKind, SchemaTypeSystem, Severity, ValidationMode, Validator, ValidatorOptions,
    ValidatorState,
};
use xmlcursor::{Document, Error};

fn system(xsd: &str) -> SchemaTypeSystem {
    SchemaTypeSystem::from_xsd(&[("test.xsd", xsd)]).unwrap()
}

fn schema(body: &str) -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    )
}

const EXTENSION_XSD: &str = r#"
    <xs:complexType name="Base">
        <xs:sequence>
            <xs:element name="a"/>
            <xs:element name="b"/>
        </xs:sequence>
    </xs:complexType>
    <xs:complexType name="Derived">
        <xs:complexContent>
            <xs:extension base="Base">
                <xs:sequence><xs:element name="c"/></xs:sequence>
            </xs:extension>
        </xs:complexContent>
    </xs:complexType>
    <xs:element name="root" type="Derived"/>"#;

#[test]
fn test_extension_requires_own_content() {
    let system = system(&schema(EXTENSION_XSD));
    let report = system.validate_str("<root><a/><b/></root>").unwrap();

    assert!(!report.is_valid());
    assert_eq!(report.issues.len(), 1);
    let issue = &report.issues[0];
    assert_eq!(issue.kind, IssueKind::MissingElement);
    assert_eq!(issue.expected, vec!["c".to_string()]);
    assert_eq!(issue.path.as_deref(), Some("/root"));

    let report = system.validate_str("<root><a/><b/><c/></root>").unwrap();
    assert!(report.is_valid());
    assert!(report.issues.is_empty());
    assert_eq!(report.state, ValidatorState::AfterDocument);
}

#[test]
fn test_absent_required_child_is_reported_once() {
    let system = system(&schema(
        r#"<xs:element name="root"><xs:complexType><xs:sequence>
            <xs:element name="a"/><xs:element name="b"/><xs:element name="c"/>
        </xs:sequence></xs:complexType></xs:element>"#,
    ));

    let report = system.validate_str("<root><a/><c/></root>").unwrap();
    assert_eq!(report.count_of(IssueKind::MissingElement), 1);
    assert_eq!(report.count_of(IssueKind::UnexpectedElement), 0);
    assert_eq!(report.issues[0].expected, vec!["b".to_string()]);

    let report = system.validate_str("<root><a/></root>").unwrap();
    assert_eq!(report.count_of(IssueKind::MissingElement), 1);
}

#[test]
fn test_missing_first_child_is_reported_once() {
    let system = system(&schema(
        r#"<xs:element name="root"><xs:complexType><xs:sequence>
            <xs:element name="a"/><xs:element name="b"/><xs:element name="c"/>
        </xs:sequence></xs:complexType></xs:element>"#,
    ));

    let report = system.validate_str("<root><b/><c/></root>").unwrap();
    assert_eq!(report.issues.len(), 1, "{}", report);
    assert_eq!(report.issues[0].kind, IssueKind::MissingElement);
    assert_eq!(report.issues[0].expected, vec!["a".to_string()]);
    assert_eq!(report.issues[0].path.as_deref(), Some("/root"));
}

#[test]
fn test_missing_first_base_child_in_extension() {
    let system = system(&schema(EXTENSION_XSD));

    let report = system.validate_str("<root><b/><c/></root>").unwrap();
    assert_eq!(report.issues.len(), 1, "{}", report);
    assert_eq!(report.issues[0].kind, IssueKind::MissingElement);
    assert_eq!(report.issues[0].expected, vec!["a".to_string()]);

    let report = system.validate_str("<root><a/><c/></root>").unwrap();
    assert_eq!(report.issues.len(), 1, "{}", report);
    assert_eq!(report.issues[0].expected, vec!["b".to_string()]);
}

#[test]
fn test_sequence_is_order_sensitive() {
    let system = system(&schema(
        r#"<xs:element name="root"><xs:complexType><xs:sequence>
            <xs:element name="a"/><xs:element name="b"/>
        </xs:sequence></xs:complexType></xs:element>"#,
    ));

    assert!(system.is_valid_str("<root><a/><b/></root>"));
    let report = system.validate_str("<root><b/><a/></root>").unwrap();
    assert!(!report.is_valid());
    assert!(report.count_of(IssueKind::UnexpectedElement) >= 1);
}

#[test]
fn test_choice_commits_to_one_branch() {
    let system = system(&schema(
        r#"<xs:element name="root"><xs:complexType><xs:choice>
            <xs:element name="a"/><xs:element name="b"/>
        </xs:choice></xs:complexType></xs:element>"#,
    ));

    assert!(system.is_valid_str("<root><b/></root>"));
    let report = system.validate_str("<root><a/><a/></root>").unwrap();
    assert_eq!(report.issues.len(), 1);
    let issue = &report.issues[0];
    assert_eq!(issue.kind, IssueKind::UnexpectedElement);
    assert_eq!(issue.element.as_deref(), Some("a"));
    assert_eq!(issue.path.as_deref(), Some("/root/a"));
}

#[test]
fn test_circular_redefine_is_fatal() {
    let redefining = |target: &str| schema(&format!(r#"<xs:redefine schemaLocation="{}"/>"#, target));
    let (a, b, c, d) = (
        redefining("D.xsd"),
        redefining("A.xsd"),
        redefining("B.xsd"),
        redefining("C.xsd"),
    );

    let sources = [
        ("A.xsd", a.as_str()),
        ("B.xsd", b.as_str()),
        ("C.xsd", c.as_str()),
        ("D.xsd", d.as_str()),
    ];
    let err = SchemaTypeSystem::from_xsd(&sources).unwrap_err();
    assert!(matches!(err, Error::CircularRedefinition(_)));
    assert!(
        err.to_string().contains("A.xsd -> D.xsd -> C.xsd -> B.xsd -> A.xsd"),
        "{}",
        err
    );
}

#[test]
fn test_circular_redefine_from_files() {
    let dir = tempfile::tempdir().unwrap();
    for (name, target) in [("A.xsd", "D.xsd"), ("B.xsd", "A.xsd"), ("C.xsd", "B.xsd"), ("D.xsd", "C.xsd")] {
        let text = schema(&format!(r#"<xs:redefine schemaLocation="{}"/>"#, target));
        fs::write(dir.path().join(name), text).unwrap();
    }

    let err = SchemaTypeSystem::from_files(&[dir.path().join("A.xsd")]).unwrap_err();
    assert!(matches!(err, Error::CircularRedefinition(_)));
}

#[test]
fn test_redefinition_of_missing_type_deriving_from_itself_is_fatal() {
    let main = schema(
        r#"<xs:redefine schemaLocation="base.xsd">
            <xs:complexType name="T">
                <xs:complexContent><xs:extension base="T"/></xs:complexContent>
            </xs:complexType>
        </xs:redefine>
        <xs:element name="root" type="T"/>"#,
    );
    let base = schema("");

    let result =
        SchemaTypeSystem::from_xsd(&[("main.xsd", main.as_str()), ("base.xsd", base.as_str())]);
    match result {
        Err(err @ Error::CircularRedefinition(_)) => assert!(err.to_string().contains("circular")),
        other => panic!("expected a circular redefinition, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_redefinition_extends_previous_definition() {
    let base = schema(
        r#"<xs:complexType name="T"><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>
           <xs:element name="root" type="T"/>"#,
    );
    let main = schema(
        r#"<xs:redefine schemaLocation="base.xsd">
            <xs:complexType name="T"><xs:complexContent>
                <xs:extension base="T"><xs:sequence><xs:element name="b"/></xs:sequence></xs:extension>
            </xs:complexContent></xs:complexType>
        </xs:redefine>"#,
    );
    let system = SchemaTypeSystem::from_xsd(&[("main.xsd", main.as_str()), ("base.xsd", base.as_str())]).unwrap();

    assert!(system.errors().is_empty());
    assert!(system.is_valid_str("<root><a/><b/></root>"));
    let report = system.validate_str("<root><a/></root>").unwrap();
    assert_eq!(report.count_of(IssueKind::MissingElement), 1);
}

#[test]
fn test_substitution_groups() {
    let system = system(&schema(
        r#"<xs:complexType name="Shape"/>
        <xs:complexType name="Circle"><xs:complexContent><xs:extension base="Shape"/></xs:complexContent></xs:complexType>
        <xs:element name="shape" type="Shape" abstract="true"/>
        <xs:element name="circle" type="Circle" substitutionGroup="shape"/>
        <xs:element name="sealed" type="Shape" block="substitution"/>
        <xs:element name="triangle" type="Shape" substitutionGroup="sealed"/>
        <xs:element name="drawing"><xs:complexType><xs:sequence>
            <xs:element ref="shape" minOccurs="0" maxOccurs="unbounded"/>
            <xs:element ref="sealed" minOccurs="0"/>
        </xs:sequence></xs:complexType></xs:element>"#,
    ));

    assert!(system.is_valid_str("<drawing><circle/><circle/><sealed/></drawing>"));

    let report = system.validate_str("<drawing><circle/><shape/></drawing>").unwrap();
    assert_eq!(report.count_of(IssueKind::AbstractElementUsed), 1);

    let report = system.validate_str("<drawing><triangle/></drawing>").unwrap();
    assert_eq!(report.count_of(IssueKind::SubstitutionFinalViolation), 1);
}

#[test]
fn test_namespaced_schema() {
    let xsd = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:o="urn:order" targetNamespace="urn:order" elementFormDefault="qualified">
        <xs:element name="order">
            <xs:complexType>
                <xs:sequence>
                    <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
                    <xs:any namespace="##other" processContents="skip" minOccurs="0"/>
                </xs:sequence>
                <xs:attribute name="id" use="required"/>
            </xs:complexType>
        </xs:element>
    </xs:schema>"###;
    let system = system(xsd);

    assert!(system.is_valid_str(
        r#"<order xmlns="urn:order" id="1"><item>x</item><item>y</item><ext xmlns="urn:other"><free/></ext></order>"#
    ));

    let report = system
        .validate_str(r#"<o:order xmlns:o="urn:order"><item/></o:order>"#)
        .unwrap();
    assert_eq!(report.count_of(IssueKind::MissingAttribute), 1);
    assert_eq!(report.count_of(IssueKind::UnexpectedElement), 1);
    assert_eq!(report.count_of(IssueKind::MissingElement), 1);
}

#[test]
fn test_validation_modes_for_undeclared_root() {
    let system = system(&schema(EXTENSION_XSD));
    let document = Document::from_string("<unknown><child/></unknown>").unwrap();
    let cursor = document.new_cursor().unwrap();

    let strict = system.validate(&cursor).unwrap();
    assert!(!strict.is_valid());
    assert_eq!(strict.issues[0].kind, IssueKind::UndeclaredElement);
    assert_eq!(strict.state, ValidatorState::Invalid);

    let lax = system
        .validate_with_options(&cursor, ValidatorOptions::new().with_mode(ValidationMode::Lax))
        .unwrap();
    assert!(lax.is_valid());
    assert_eq!(lax.issues[0].severity, Severity::Warning);
}

#[test]
fn test_incomplete_and_unresolved() {
    let unresolved = SchemaTypeSystem::new();
    let document = Document::from_string("<root/>").unwrap();
    assert!(matches!(
        unresolved.validate_document(&document),
        Err(Error::NotResolved)
    ));

    let system = system(&schema(EXTENSION_XSD));
    let empty = Document::new();
    let report = system.validate_document(&empty).unwrap();
    assert_eq!(report.state, ValidatorState::Invalid);
    assert_eq!(report.count_of(IssueKind::IncompleteDocument), 1);
}

#[test]
fn test_report_json() {
    let system = system(&schema(EXTENSION_XSD));
    let report = system.validate_str("<root><a/><b/></root>").unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["valid"], false);
    assert_eq!(json["issues"][0]["kind"], "missing_element");
    assert_eq!(json["issues"][0]["severity"], "error");
    assert_eq!(json["issues"][0]["location"]["line"], 1);
}

#[test]
fn test_type_system_is_shared_across_threads() {
    let system = Arc::new(system(&schema(EXTENSION_XSD)));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let system = Arc::clone(&system);
            thread::spawn(move || {
                let xml = if i % 2 == 0 {
                    "<root><a/><b/><c/></root>"
                } else {
                    "<root><a/></root>"
                };
                system.is_valid_str(xml)
            })
        })
        .collect();
    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![true, false, true, false]);
}

fn all_group_system() -> SchemaTypeSystem {
    system(&schema(
        r#"<xs:element name="root"><xs:complexType><xs:all>
            <xs:element name="a"/><xs:element name="b"/>
            <xs:element name="c"/><xs:element name="d" minOccurs="0"/>
        </xs:all></xs:complexType></xs:element>"#,
    ))
}

proptest! {
    #[test]
    fn prop_all_group_is_order_independent(
        children in Just(vec!["a", "b", "c", "d"]).prop_shuffle(),
        with_optional in any::<bool>(),
    ) {
        let system = all_group_system();
        let body: String = children
            .iter()
            .filter(|name| with_optional || **name != "d")
            .map(|name| format!("<{}/>", name))
            .collect();
        let report = system.validate_str(&format!("<root>{}</root>", body)).unwrap();
        prop_assert!(report.is_valid(), "{}", report);
        prop_assert!(report.issues.is_empty());
    }

    #[test]
    fn prop_all_group_reports_each_missing_child(
        children in Just(vec!["a", "b", "c"]).prop_shuffle(),
        keep in 0usize..3,
    ) {
        let system = all_group_system();
        let body: String = children[..keep].iter().map(|name| format!("<{}/>", name)).collect();
        let report = system.validate_str(&format!("<root>{}</root>", body)).unwrap();
        prop_assert_eq!(report.count_of(IssueKind::MissingElement), 3 - keep);
    }
}
