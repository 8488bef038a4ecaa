//! Project state differ
//!
//! Pure comparison of the last observed state with the desired spec. Field
//! order in the resulting plan is fixed: name, team, bgp, local_asn.

use crate::model::{ProjectSpec, ProjectState};
use cherry_cloud::{ActionType, ChangeKind, FieldChange, Plan};
use serde_json::json;

/// Compute the plan that takes `prior` to `desired`.
///
/// - no prior state: create, every input is added
/// - `team` changed: replacement (a project can't move between teams)
/// - `name` / `bgp` changed: in-place update
/// - BGP turned off: the derived `local_asn` is cleared
pub fn diff(prior: Option<&ProjectState>, desired: &ProjectSpec) -> Plan {
    let Some(prior) = prior else {
        return Plan::new(
            ActionType::Create,
            vec![
                FieldChange::new("name", ChangeKind::Add, None, Some(json!(desired.name))),
                FieldChange::new("team", ChangeKind::Add, None, Some(json!(desired.team))),
                FieldChange::new("bgp", ChangeKind::Add, None, Some(json!(desired.bgp))),
            ],
        );
    };

    let mut changes = Vec::new();

    if prior.name != desired.name {
        changes.push(FieldChange::new(
            "name",
            ChangeKind::Update,
            Some(json!(prior.name)),
            Some(json!(desired.name)),
        ));
    }

    if prior.team != desired.team {
        changes.push(FieldChange::new(
            "team",
            ChangeKind::Replace,
            Some(json!(prior.team)),
            Some(json!(desired.team)),
        ));
    }

    if prior.bgp != desired.bgp {
        changes.push(FieldChange::new(
            "bgp",
            ChangeKind::Update,
            Some(json!(prior.bgp)),
            Some(json!(desired.bgp)),
        ));
    }

    // Turning BGP off always clears the ASN, known or not.
    if !desired.bgp && (prior.bgp || prior.local_asn.is_some()) {
        changes.push(FieldChange::new(
            "local_asn",
            ChangeKind::Clear,
            prior.local_asn.map(|asn| json!(asn)),
            None,
        ));
    }

    if changes.is_empty() {
        Plan::empty()
    } else {
        Plan::new(ActionType::Update, changes)
    }
}

/// State the plan is expected to produce, for previews.
///
/// `local_asn` survives only an in-place update that keeps BGP on; anything
/// else leaves it unknown until the remote assigns it.
pub fn planned_state(
    prior: Option<&ProjectState>,
    desired: &ProjectSpec,
    plan: &Plan,
) -> ProjectState {
    let mut state = ProjectState::planned(desired);
    if let Some(prior) = prior {
        if desired.bgp && !plan.requires_replace {
            state.local_asn = prior.local_asn;
        }
    }
    state
}
