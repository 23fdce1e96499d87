//! # docacl: Granular access control for spreadsheet documents
//!
//! Decides, for every document operation, whether a user may perform it,
//! on which rows, and on which columns.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Persisted rules (resources + rule records)  │
//! └─────────────────┬───────────────────────────┘
//!                   │ Policy::from_records
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyHandle ── Arc<Policy> snapshots       │
//! └─────────────────┬───────────────────────────┘
//!                   │ snapshot()
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Resolver                                    │
//! │  ├─ authorize(action)    → Decision | denial │
//! │  ├─ filter_columns / filter_rows / TableView │
//! │  └─ check_mutation(add, update, remove)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Rules attach to a [`Resource`]: the default resource, a table, a column,
//! or one of the [`SpecialKind`] resources. Each rule part pairs a condition
//! with allow/deny deltas over five [`Bit`]s (Read, Update, Create, Delete,
//! Schema). Resolution walks from the most specific rule set to the least,
//! and the first matching part fixes each bit it sets. Bits no rule decides
//! are allowed, except Schema (owners and editors only) and rule access
//! (owners only).
//!
//! ## Example
//!
//! ```
//! use docacl::{Action, Policy, PersistedRules, ResourceRecord, RuleRecord, authorize};
//! use docacl_formula::Bindings;
//! use docacl_types::{Access, UserInfo};
//!
//! let records = PersistedRules::new()
//!     .with_resource(ResourceRecord::new(1, "*", "*"))
//!     .with_rule(
//!         RuleRecord::new(1, 1, "user.Access != OWNER", "-S")
//!             .with_memo("Only owners can change document structure"),
//!     );
//! let policy = Policy::from_records(&records)?;
//!
//! let editor = UserInfo::new("ada@example.com", Access::Editor);
//! let action = Action::RenameTable { table: "T1".into() };
//!
//! let denied = authorize(&policy, &action, &Bindings::new(&editor)).unwrap_err();
//! assert_eq!(denied.memos, vec!["Only owners can change document structure"]);
//! # Ok::<(), docacl::PolicyError>(())
//! ```

mod action;
mod error;
mod filter;
mod handle;
pub mod import;
mod permissions;
mod policy;
mod resolver;
mod resource;
mod rule;
mod store;
pub mod validate;

pub use action::{Action, authorize};
pub use docacl_formula::{Bindings, Formula};
pub use error::{AccessDenied, PolicyError};
pub use filter::{
    ColumnFilter, Mutation, Page, RowFilter, TableView, censor_row, check_mutation,
    filter_columns, filter_rows,
};
pub use handle::{DEFAULT_MAX_VERSIONS, PolicyHandle};
pub use import::{TokenMap, TokenResolution, TokenTarget, resolve_tokens};
pub use permissions::{Bit, BitMask, BitState, PermissionDelta, PermissionTextError};
pub use policy::{EngineSettings, Policy, PolicyBuilder};
pub use resolver::{BitDecision, Decision, DecisionSource, resolve};
pub use resource::{Resource, ResourceError, SPECIAL_TABLE, SpecialKind, WILDCARD};
pub use rule::{RuleId, RulePart, RuleSet};
pub use store::{OWNERS_ONLY_SCHEMA_MEMO, PersistedRules, ResourceRecord, RuleRecord};
pub use validate::{Severity, Warning, validate};
