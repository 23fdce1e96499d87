//! Unit tests for docacl-types

use test_case::test_case;

use crate::{Access, CellValue, ColId, DocSchema, Record, UserInfo};

// ============================================================================
// Access Tests
// ============================================================================

#[test_case("owners" => Access::Owner; "plural owners")]
#[test_case("Editor" => Access::Editor; "singular mixed case")]
#[test_case(" VIEWERS " => Access::Viewer; "padded upper case")]
fn access_parses_role_names(input: &str) -> Access {
    input.parse().unwrap()
}

#[test]
fn access_rejects_unknown_role() {
    assert!("guests".parse::<Access>().is_err());
}

#[test]
fn access_ordering_matches_privilege() {
    assert!(Access::Viewer < Access::Editor);
    assert!(Access::Editor < Access::Owner);
    assert!(!Access::Viewer.can_edit_structure());
    assert!(Access::Editor.can_edit_structure());
}

#[test]
fn access_serializes_as_plural_role() {
    let json = serde_json::to_string(&Access::Editor).unwrap();
    assert_eq!(json, "\"editors\"");

    let parsed: Access = serde_json::from_str("\"owner\"").unwrap();
    assert_eq!(parsed, Access::Owner);
}

// ============================================================================
// Cell Value Tests
// ============================================================================

#[test_case(CellValue::Null => false; "null")]
#[test_case(CellValue::Int(0) => false; "zero")]
#[test_case(CellValue::Int(3) => true; "non-zero")]
#[test_case(CellValue::Text(String::new()) => false; "empty text")]
#[test_case(CellValue::Text("x".into()) => true; "text")]
#[test_case(CellValue::List(vec![]) => false; "empty list")]
fn truthiness(value: CellValue) -> bool {
    value.is_truthy()
}

#[test]
fn cell_values_deserialize_untagged() {
    let values: Vec<CellValue> = serde_json::from_str(r#"[null, true, 4, 1.5, "a", [1]]"#).unwrap();
    assert_eq!(
        values,
        vec![
            CellValue::Null,
            CellValue::Bool(true),
            CellValue::Int(4),
            CellValue::Float(1.5),
            CellValue::Text("a".into()),
            CellValue::List(vec![CellValue::Int(1)]),
        ]
    );
}

// ============================================================================
// Record Tests
// ============================================================================

#[test]
fn record_deserializes_flat_cells() {
    let record: Record = serde_json::from_str(r#"{"id": 7, "Name": "Ada", "Salary": 100}"#).unwrap();
    assert_eq!(i64::from(record.id), 7);
    assert_eq!(record.get("Name"), Some(&CellValue::Text("Ada".into())));
    assert_eq!(record.get("Salary"), Some(&CellValue::Int(100)));
    assert!(record.get("id").is_none());
}

#[test]
fn retain_columns_removes_keys() {
    let mut record = Record::new(1).with("Name", "Ada").with("Salary", 100);
    record.retain_columns(&[ColId::from("Name")]);

    assert!(record.get("Salary").is_none());
    assert_eq!(record.cells.len(), 1);
}

#[test]
fn changed_columns_reports_both_sides() {
    let old = Record::new(1).with("A", 1).with("B", 2);
    let new = Record::new(1).with("A", 1).with("B", 3).with("C", 4);

    assert_eq!(
        old.changed_columns(&new),
        vec![ColId::from("B"), ColId::from("C")]
    );
}

// ============================================================================
// User Tests
// ============================================================================

#[test]
fn builtin_user_attributes_shadow_custom_ones() {
    let user = UserInfo::new("ada@example.com", Access::Editor)
        .with_attribute("Email", "spoofed@example.com")
        .with_attribute("Team", "Finance");

    assert_eq!(
        user.attribute("Email"),
        Some(CellValue::Text("ada@example.com".into()))
    );
    assert_eq!(
        user.attribute("Access"),
        Some(CellValue::Text("editors".into()))
    );
    assert_eq!(user.attribute("Team"), Some(CellValue::Text("Finance".into())));
    assert_eq!(user.attribute("UserID"), Some(CellValue::Null));
    assert!(user.attribute("Missing").is_none());
}

// ============================================================================
// Schema Tests
// ============================================================================

#[test]
fn schema_lookup() {
    let schema = DocSchema::new().with_table("Employees", ["Name", "Salary"]);

    assert!(schema.has_table("Employees"));
    assert!(schema.has_column("Employees", "Salary"));
    assert!(!schema.has_column("Employees", "Bonus"));
    assert!(!schema.has_column("Payroll", "Salary"));
    assert!(schema.columns("Payroll").is_empty());
}
