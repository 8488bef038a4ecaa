//! Plan types for cloud resource reconciliation

use serde::{Deserialize, Serialize};

/// Lifecycle action a plan resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Replace the resource (new identity)
    Replace,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Kind of change for a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Field is set on a resource that does not exist yet
    Add,
    /// Field can be changed in place
    Update,
    /// Field change forces replacement
    Replace,
    /// Derived field is cleared as a consequence of another change
    Clear,
}

/// A single field-level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub kind: ChangeKind,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        kind: ChangeKind,
        old: Option<serde_json::Value>,
        new: Option<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            old,
            new,
        }
    }
}

/// Reconcile plan for one resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Action the reconciler has to perform
    pub action: ActionType,

    /// Ordered field-level changes
    pub changes: Vec<FieldChange>,

    /// Whether any change forces a replacement
    pub requires_replace: bool,
}

impl Plan {
    pub fn new(action: ActionType, changes: Vec<FieldChange>) -> Self {
        let requires_replace = changes.iter().any(|c| c.kind == ChangeKind::Replace);
        let action = if requires_replace && action == ActionType::Update {
            ActionType::Replace
        } else {
            action
        };
        Self {
            action,
            changes,
            requires_replace,
        }
    }

    pub fn empty() -> Self {
        Self {
            action: ActionType::NoOp,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.action == ActionType::NoOp && self.changes.is_empty()
    }

    /// Get the change for a field, if any
    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Names of the fields that change
    pub fn changed_fields(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.field.as_str()).collect()
    }

    /// Fields whose change forces replacement
    pub fn replace_keys(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Replace)
            .map(|c| c.field.as_str())
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |kind: ChangeKind| self.changes.iter().filter(|c| c.kind == kind).count();
        PlanSummary {
            action: self.action,
            add: count(ChangeKind::Add),
            update: count(ChangeKind::Update),
            replace: count(ChangeKind::Replace),
            clear: count(ChangeKind::Clear),
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::empty()
    }
}

/// Summary of planned changes
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub action: ActionType,
    pub add: usize,
    pub update: usize,
    pub replace: usize,
    pub clear: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} to add, {} to update, {} forcing replacement, {} cleared",
            self.action, self.add, self.update, self.replace, self.clear
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_change_promotes_update() {
        let plan = Plan::new(
            ActionType::Update,
            vec![
                FieldChange::new("name", ChangeKind::Update, Some(json!("a")), Some(json!("b"))),
                FieldChange::new("team", ChangeKind::Replace, Some(json!(1)), Some(json!(2))),
            ],
        );

        assert!(plan.requires_replace);
        assert_eq!(plan.action, ActionType::Replace);
        assert_eq!(plan.replace_keys(), vec!["team"]);
        assert_eq!(plan.changed_fields(), vec!["name", "team"]);
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::empty();
        assert!(plan.is_empty());
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_summary_display() {
        let plan = Plan::new(
            ActionType::Update,
            vec![
                FieldChange::new("bgp", ChangeKind::Update, Some(json!(true)), Some(json!(false))),
                FieldChange::new("local_asn", ChangeKind::Clear, Some(json!(65000)), None),
            ],
        );

        assert_eq!(
            plan.summary().to_string(),
            "update: 0 to add, 1 to update, 0 forcing replacement, 1 cleared"
        );
    }
}
