//! Token store, cursor and loader integration tests

use std::cmp::Ordering;
use std::fs;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use xmlcursor::locations::Location;
use xmlcursor::namespaces::QName;
use xmlcursor::store::StoreBuilder;
use xmlcursor::{loaders, Cursor, Document, Error, Loader, Token, TokenKind, TokenStore};

fn q(name: &str) -> QName {
    QName::local(name)
}

fn all_cursors(document: &Document) -> Vec<Cursor> {
    let mut cursor = document.new_cursor().unwrap();
    let mut cursors = vec![cursor.new_cursor().unwrap()];
    while cursor.to_next_token() {
        cursors.push(cursor.new_cursor().unwrap());
    }
    cursors
}

#[test]
fn test_loaded_token_sequence() {
    let document = loaders::load_str(r#"<r xmlns:p="urn:p" id="1"><p:a>text</p:a><!--c--><?pi data?></r>"#)
        .unwrap();
    assert_eq!(
        document.tokens(),
        vec![
            Token::StartDoc,
            Token::start(q("r")),
            Token::namespace(Some("p"), "urn:p"),
            Token::attribute(q("id"), "1"),
            Token::start(QName::namespaced("urn:p", "a").with_prefix("p")),
            Token::text("text"),
            Token::EndElement,
            Token::Comment("c".to_string()),
            Token::ProcessingInstruction {
                target: "pi".to_string(),
                data: "data".to_string(),
            },
            Token::EndElement,
            Token::EndDoc,
        ]
    );
}

#[test]
fn test_builder_rejects_unbalanced_input() {
    let mut builder = StoreBuilder::new();
    builder.push_token(Token::StartDoc).unwrap();
    assert!(matches!(
        builder.push_token(Token::EndElement),
        Err(Error::Structural(_))
    ));

    let unclosed = TokenStore::bulk_load(vec![Token::StartDoc, Token::start(q("a")), Token::EndDoc]);
    assert!(matches!(unclosed, Err(Error::Structural(_))));
}

#[test]
fn test_cursor_edits_and_bookmarks() {
    let document = Document::from_string("<root><a/><b/></root>").unwrap();
    let mut cursor = document.root_cursor().unwrap().unwrap();
    assert!(cursor.to_first_child());
    let bookmark = cursor.create_bookmark("a").unwrap();

    assert!(cursor.to_next_sibling());
    cursor.insert_element_with_text(q("x"), "hello").unwrap();
    assert_eq!(cursor.name().unwrap(), Some(q("b")));

    let mut inserted = cursor.new_cursor().unwrap();
    assert!(inserted.to_prev_sibling());
    assert_eq!(inserted.text().unwrap(), "hello");

    let mut marked = bookmark.new_cursor().unwrap();
    assert_eq!(marked.name().unwrap(), Some(q("a")));
    marked.remove_xml().unwrap();
    assert!(!bookmark.is_valid());
    assert!(matches!(
        bookmark.resolve(),
        Err(Error::BookmarkInvalidated(name)) if name == "a"
    ));
    assert!(marked.is_at_same_position_as(&inserted).unwrap());

    let other = Document::from_string("<other/>").unwrap();
    let foreign = other.new_cursor().unwrap();
    assert!(matches!(
        cursor.compare_position(&foreign),
        Err(Error::CrossDocument)
    ));
}

#[test]
fn test_load_file_records_locations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.xml");
    fs::write(&path, "<root>\n  <child/>\n</root>").unwrap();

    let document = Loader::new().load(&Location::Path(path)).unwrap();
    let mut cursor = document.root_cursor().unwrap().unwrap();
    assert!(cursor.to_first_child());
    let location = cursor.location().unwrap().unwrap();
    assert_eq!(location.line, 2);
    assert!(location.to_string().starts_with("file://"));
    assert!(location.to_string().ends_with("doc.xml:2:3"));
    assert_eq!(cursor.depth().unwrap(), 1);
    assert_eq!(cursor.kind().unwrap(), TokenKind::StartElement);
}

fn document_with_children(count: usize) -> Document {
    let mut xml = String::from("<root>");
    for i in 0..count {
        xml.push_str(&format!("<e{0} a=\"{0}\">t{0}</e{0}>", i));
    }
    xml.push_str("</root>");
    Document::from_string(&xml).unwrap()
}

proptest! {
    #[test]
    fn prop_cursor_positions_are_totally_ordered(
        count in 1usize..12,
        inserts in prop::collection::vec(0usize..64, 0..24),
    ) {
        let document = document_with_children(count);
        for target in inserts {
            let cursors = all_cursors(&document);
            let mut cursor = cursors[target % cursors.len()].new_cursor().unwrap();
            if cursor.kind().unwrap().is_content() && cursor.depth().unwrap() > 0 {
                cursor.insert_element(q("ins")).unwrap();
            }
        }

        let cursors = all_cursors(&document);
        for (i, a) in cursors.iter().enumerate() {
            for (j, b) in cursors.iter().enumerate() {
                prop_assert_eq!(a.compare_position(b).unwrap(), i.cmp(&j));
            }
        }
        prop_assert_eq!(
            cursors[0].compare_position(&cursors[cursors.len() - 1]).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn prop_insert_then_remove_restores_tokens(count in 1usize..10, pick in 0usize..10) {
        let document = document_with_children(count);
        let original = document.tokens();

        let mut cursor = document.root_cursor().unwrap().unwrap();
        prop_assert!(cursor.to_first_child());
        for _ in 0..(pick % count) {
            prop_assert!(cursor.to_next_sibling());
        }
        cursor.insert_element_with_text(q("extra"), "x").unwrap();
        prop_assert_ne!(document.tokens(), original.clone());

        prop_assert!(cursor.to_prev_sibling());
        prop_assert_eq!(cursor.name().unwrap(), Some(q("extra")));
        cursor.remove_xml().unwrap();
        prop_assert_eq!(document.tokens(), original);
    }
}
