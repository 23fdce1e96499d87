//! Unit tests for docacl-formula

use docacl_types::{Access, CellValue, Record, UserInfo};
use proptest::prelude::*;
use test_case::test_case;

use crate::{Bindings, EvalError, Formula, FormulaError};

fn editor() -> UserInfo {
    UserInfo::new("ada@example.com", Access::Editor)
        .with_name("Ada")
        .with_attribute("Team", "Finance")
}

fn eval(source: &str, user: &UserInfo, rec: Option<&Record>) -> Result<bool, EvalError> {
    let formula = Formula::parse(source).unwrap();
    let mut bindings = Bindings::new(user);
    if let Some(rec) = rec {
        bindings = bindings.with_rec(rec);
    }
    formula.evaluate(&bindings, 1_000)
}

// ============================================================================
// User Conditions
// ============================================================================

#[test_case("user.Access != OWNER" => true; "editor is not owner")]
#[test_case("user.Access == EDITOR" => true; "editor constant")]
#[test_case("user.Access in [EDITOR, OWNER]" => true; "membership in role list")]
#[test_case("user.Access not in [EDITOR, OWNER]" => false; "negated membership")]
#[test_case("user.Email == 'ada@example.com'" => true; "email equality")]
#[test_case("'example.com' in user.Email" => true; "substring")]
#[test_case("user.Team == 'Finance' and user.Name == 'Ada'" => true; "custom attribute")]
#[test_case("not user.Team == 'Finance'" => false; "not applies to comparison")]
#[test_case("user.UserID is None" => true; "missing user id is None")]
#[test_case("True" => true; "literal true")]
#[test_case("False or None" => false; "falsy or")]
fn user_conditions(source: &str) -> bool {
    eval(source, &editor(), None).unwrap()
}

#[test]
fn blank_formula_always_matches() {
    let formula = Formula::parse("  ").unwrap();
    assert!(formula.is_always());
    assert!(formula.evaluate(&Bindings::new(&editor()), 1).unwrap());
    assert_eq!(formula.to_string(), "(everyone)");
}

#[test]
fn unknown_user_attribute_is_an_evaluation_error() {
    assert_eq!(
        eval("user.Office == 'HQ'", &editor(), None),
        Err(EvalError::UnknownAttribute("user.Office".into()))
    );
}

#[test]
fn nested_user_attributes() {
    let mut team = std::collections::BTreeMap::new();
    team.insert("Name".to_string(), CellValue::Text("Finance".into()));
    let user = UserInfo::new("ada@example.com", Access::Viewer)
        .with_attribute("Team", CellValue::Record(team))
        .with_attribute("Manager", CellValue::Null);

    assert_eq!(eval("user.Team.Name == 'Finance'", &user, None), Ok(true));
    // Lookups through an empty reference stay empty.
    assert_eq!(eval("user.Manager.Email is None", &user, None), Ok(true));
}

// ============================================================================
// Row Conditions
// ============================================================================

#[test]
fn rec_columns_and_row_id() {
    let row = Record::new(12)
        .with("Owner", "ada@example.com")
        .with("Amount", 250);

    assert_eq!(eval("rec.Owner == user.Email", &editor(), Some(&row)), Ok(true));
    assert_eq!(eval("rec.Amount > 100", &editor(), Some(&row)), Ok(true));
    assert_eq!(eval("rec.Amount <= 249.5", &editor(), Some(&row)), Ok(false));
    assert_eq!(eval("rec.id == 12", &editor(), Some(&row)), Ok(true));
    assert_eq!(eval("rec.Amount == 250.0", &editor(), Some(&row)), Ok(true));
}

#[test]
fn unbound_rec_is_reported_as_unbound() {
    let err = eval("rec.Owner == user.Email", &editor(), None).unwrap_err();
    assert_eq!(err, EvalError::Unbound("rec"));
    assert!(err.is_unbound());
}

#[test]
fn missing_column_is_an_evaluation_error() {
    let row = Record::new(1).with("Owner", "ada@example.com");
    let err = eval("rec.Status == 'Done'", &editor(), Some(&row)).unwrap_err();
    assert_eq!(
        err,
        EvalError::UnknownColumn {
            binding: "rec",
            column: "Status".into(),
        }
    );
    assert!(!err.is_unbound());
}

#[test]
fn new_rec_is_bound_separately() {
    let old = Record::new(1).with("Status", "Draft");
    let new = Record::new(1).with("Status", "Done");
    let user = editor();
    let formula = Formula::parse("rec.Status == 'Draft' and newRec.Status == 'Done'").unwrap();

    let bindings = Bindings::new(&user).with_rec(&old).with_new_rec(&new);
    assert_eq!(formula.evaluate(&bindings, 100), Ok(true));

    let only_new = Bindings::new(&user).with_new_rec(&new);
    assert_eq!(
        formula.evaluate(&only_new, 100),
        Err(EvalError::Unbound("rec"))
    );
}

#[test]
fn ordering_mismatched_types_is_an_error() {
    let row = Record::new(1).with("Amount", "lots");
    assert_eq!(
        eval("rec.Amount > 100", &editor(), Some(&row)),
        Err(EvalError::TypeMismatch {
            op: ">",
            left: "text",
            right: "int",
        })
    );
}

#[test]
fn short_circuit_skips_failing_operand() {
    let row = Record::new(1);
    assert_eq!(
        eval("user.Access == EDITOR or rec.Missing == 1", &editor(), Some(&row)),
        Ok(true)
    );
}

#[test_case("rec.Owner == user.Email or user.Access == EDITOR" => Ok(true); "unknown or true")]
#[test_case("user.Access == EDITOR or rec.Owner == user.Email" => Ok(true); "true or unknown")]
#[test_case("rec.Owner == user.Email and user.Access == OWNER" => Ok(false); "unknown and false")]
#[test_case("user.Access == OWNER and rec.Owner == user.Email" => Ok(false); "false and unknown")]
#[test_case("rec.Owner == user.Email or user.Access == OWNER" => Err(EvalError::Unbound("rec")); "unknown or false")]
#[test_case("rec.Owner == user.Email and user.Access == EDITOR" => Err(EvalError::Unbound("rec")); "unknown and true")]
#[test_case("not (rec.Owner == user.Email or user.Access == EDITOR)" => Ok(false); "negated settled or")]
fn unbound_operands_are_unknown(source: &str) -> Result<bool, EvalError> {
    eval(source, &editor(), None)
}

#[test]
fn unknown_operand_does_not_hide_other_errors() {
    assert_eq!(
        eval("rec.Owner == 1 or user.Missing == 1", &editor(), None),
        Err(EvalError::UnknownAttribute("user.Missing".into()))
    );
}

// ============================================================================
// Budget
// ============================================================================

#[test]
fn budget_exhaustion_fails_instead_of_running_on() {
    let formula = Formula::parse("user.Email in ['a', 'b', 'c', 'd'] or False").unwrap();
    let user = editor();
    let bindings = Bindings::new(&user);

    assert_eq!(
        formula.evaluate(&bindings, 3),
        Err(EvalError::BudgetExhausted { budget: 3 })
    );
    assert_eq!(formula.evaluate(&bindings, 100), Ok(false));
}

// ============================================================================
// References
// ============================================================================

#[test]
fn references_are_collected_per_binding() {
    let formula =
        Formula::parse("rec.Owner == user.Email and newRec.Status != 'x' or user.Team.Name == 'y'")
            .unwrap();
    let refs = formula.references();

    assert!(refs.uses_rec);
    assert!(refs.uses_new_rec);
    assert!(refs.uses_row());
    assert_eq!(
        refs.rec_columns.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["Owner"]
    );
    assert_eq!(
        refs.new_rec_columns
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["Status"]
    );
    assert_eq!(
        refs.user_attributes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["Email", "Team"]
    );
}

#[test]
fn user_only_formula_does_not_use_row() {
    let refs = Formula::parse("user.Access != OWNER").unwrap().references();
    assert!(!refs.uses_row());
}

#[test]
fn parse_error_surfaces() {
    assert_eq!(
        Formula::parse("user.Access = OWNER"),
        Err(FormulaError::UnexpectedChar { ch: '=', offset: 12 })
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Evaluating the same formula against the same bindings always agrees.
    #[test]
    fn evaluation_is_deterministic(amount in any::<i64>(), threshold in 0i64..1_000_000) {
        let row = Record::new(1).with("Amount", amount);
        let user = editor();
        let formula = Formula::parse(&format!("rec.Amount >= {threshold}")).unwrap();
        let bindings = Bindings::new(&user).with_rec(&row);

        let first = formula.evaluate(&bindings, 100);
        let second = formula.evaluate(&bindings, 100);
        prop_assert_eq!(first, second);
    }

    /// `not` always inverts a comparison that evaluates successfully.
    #[test]
    fn negation_inverts(amount in any::<i32>(), threshold in 0i32..1000) {
        let row = Record::new(1).with("Amount", amount);
        let user = editor();
        let bindings = Bindings::new(&user).with_rec(&row);
        let plain = Formula::parse(&format!("rec.Amount < {threshold}")).unwrap();
        let negated = Formula::parse(&format!("not rec.Amount < {threshold}")).unwrap();

        prop_assert_eq!(
            plain.evaluate(&bindings, 100).unwrap(),
            !negated.evaluate(&bindings, 100).unwrap()
        );
    }
}
