//! Replay scripts: YAML lists of registry calls executed in order.
//!
//! ```yaml
//! - caller: "0x1111111111111111111111111111111111111111"
//!   resource: test-item
//!   op: create_resource
//!   enforce_uniqueness: true
//! - caller: "0x1111111111111111111111111111111111111111"
//!   resource: test-item
//!   op: register_change
//!   payload: '{"foo":"bar"}'
//!   change_type: CREATE
//! - resource: test-item
//!   op: get_version_count
//! ```

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use provenance::{
    Address, ChangeRecord, ChangeType, DataHash, Engine, ErrorKind, Proposal, ProposalKind,
    Receipt, RegistryError, ResourceId, ResourceRegistry,
};

/// One scripted call.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Calling identity; required for mutations
    #[serde(default)]
    pub caller: Option<Address>,
    pub resource: ResourceId,
    #[serde(flatten)]
    pub call: Call,
}

/// Registry call and its arguments, tagged by `op`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Call {
    Mutation(Mutation),
    Query(Query),
}

impl Call {
    /// Operation name as written in scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mutation(m) => m.name(),
            Self::Query(q) => q.name(),
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Mutation(_))
    }
}

/// Calls that commit a transition and return a receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateResource {
        #[serde(default)]
        enforce_uniqueness: bool,
    },
    SetResourceActiveStatus {
        active: bool,
    },
    SetUniqueness {
        enforce: bool,
    },
    ProposeAddAdmin {
        target: Address,
    },
    ProposeRemoveAdmin {
        target: Address,
    },
    ProposeTransferOwnership {
        new_owner: Address,
    },
    ApproveAddAdmin,
    ApproveRemoveAdmin,
    ApproveTransferOwnership,
    WithdrawProposal {
        kind: ProposalKind,
    },
    /// `data_hash` wins when given; otherwise `payload` is hashed.
    RegisterChange {
        #[serde(default)]
        data_hash: Option<DataHash>,
        #[serde(default)]
        payload: String,
        change_type: ChangeType,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateResource { .. } => "create_resource",
            Self::SetResourceActiveStatus { .. } => "set_resource_active_status",
            Self::SetUniqueness { .. } => "set_uniqueness",
            Self::ProposeAddAdmin { .. } => "propose_add_admin",
            Self::ProposeRemoveAdmin { .. } => "propose_remove_admin",
            Self::ProposeTransferOwnership { .. } => "propose_transfer_ownership",
            Self::ApproveAddAdmin => "approve_add_admin",
            Self::ApproveRemoveAdmin => "approve_remove_admin",
            Self::ApproveTransferOwnership => "approve_transfer_ownership",
            Self::WithdrawProposal { .. } => "withdraw_proposal",
            Self::RegisterChange { .. } => "register_change",
        }
    }

    fn apply(
        &self,
        registry: &mut ResourceRegistry,
        caller: Address,
        id: &ResourceId,
    ) -> Result<Receipt, RegistryError> {
        match self {
            Self::CreateResource { enforce_uniqueness } => {
                registry.create_resource(caller, id, *enforce_uniqueness)
            }
            Self::SetResourceActiveStatus { active } => {
                registry.set_resource_active_status(caller, id, *active)
            }
            Self::SetUniqueness { enforce } => registry.set_uniqueness(caller, id, *enforce),
            Self::ProposeAddAdmin { target } => registry.propose_add_admin(caller, id, *target),
            Self::ProposeRemoveAdmin { target } => {
                registry.propose_remove_admin(caller, id, *target)
            }
            Self::ProposeTransferOwnership { new_owner } => {
                registry.propose_transfer_ownership(caller, id, *new_owner)
            }
            Self::ApproveAddAdmin => registry.approve_add_admin(caller, id),
            Self::ApproveRemoveAdmin => registry.approve_remove_admin(caller, id),
            Self::ApproveTransferOwnership => registry.approve_transfer_ownership(caller, id),
            Self::WithdrawProposal { kind } => registry.withdraw_proposal(caller, id, *kind),
            Self::RegisterChange {
                data_hash,
                payload,
                change_type,
            } => {
                let hash = data_hash.unwrap_or_else(|| DataHash::digest(payload));
                registry.register_change(caller, id, hash, *change_type)
            }
        }
    }
}

/// Read-only calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Query {
    IsResourceActive,
    IsUniquenessEnforced,
    GetResourceOwner,
    IsAdmin {
        identity: Address,
    },
    GetAdmins,
    GetAdminCount,
    GetOpenProposals,
    GetLatestChange,
    GetHistoryRange {
        start: u64,
        count: u64,
    },
    GetVersionCount,
    GetChange {
        version: u64,
    },
    FindVersionsByHash {
        data_hash: DataHash,
    },
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsResourceActive => "is_resource_active",
            Self::IsUniquenessEnforced => "is_uniqueness_enforced",
            Self::GetResourceOwner => "get_resource_owner",
            Self::IsAdmin { .. } => "is_admin",
            Self::GetAdmins => "get_admins",
            Self::GetAdminCount => "get_admin_count",
            Self::GetOpenProposals => "get_open_proposals",
            Self::GetLatestChange => "get_latest_change",
            Self::GetHistoryRange { .. } => "get_history_range",
            Self::GetVersionCount => "get_version_count",
            Self::GetChange { .. } => "get_change",
            Self::FindVersionsByHash { .. } => "find_versions_by_hash",
        }
    }

    fn read(&self, registry: &ResourceRegistry, id: &ResourceId) -> Result<Answer, RegistryError> {
        Ok(match self {
            Self::IsResourceActive => Answer::Flag(registry.is_resource_active(id)?),
            Self::IsUniquenessEnforced => Answer::Flag(registry.is_uniqueness_enforced(id)?),
            Self::GetResourceOwner => Answer::Identity(registry.get_resource_owner(id)?),
            Self::IsAdmin { identity } => Answer::Flag(registry.is_admin(id, identity)?),
            Self::GetAdmins => Answer::Identities(registry.get_admins(id)?),
            Self::GetAdminCount => Answer::Count(registry.get_admin_count(id)? as u64),
            Self::GetOpenProposals => Answer::Proposals(registry.get_open_proposals(id)?),
            Self::GetLatestChange => Answer::Change(registry.get_latest_change(id)?),
            Self::GetHistoryRange { start, count } => {
                Answer::Changes(registry.get_history_range(id, *start, *count)?)
            }
            Self::GetVersionCount => Answer::Count(registry.get_version_count(id)?),
            Self::GetChange { version } => Answer::Change(registry.get_change(id, *version)?),
            Self::FindVersionsByHash { data_hash } => {
                Answer::Versions(registry.find_versions_by_hash(id, data_hash)?)
            }
        })
    }
}

/// Successful result of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    Receipt(Receipt),
    Flag(bool),
    Count(u64),
    Identity(Address),
    Identities(Vec<Address>),
    Proposals(Vec<Proposal>),
    Change(ChangeRecord),
    Changes(Vec<ChangeRecord>),
    Versions(Vec<u64>),
}

/// Failed step, classified by error kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<RegistryError> for Failure {
    fn from(err: RegistryError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One JSON line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Zero-based position in the script
    pub step: usize,
    pub op: &'static str,
    pub resource: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

/// Totals for a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub executed: usize,
    pub failed: usize,
}

/// Parse and check a script.
pub fn parse_script(yaml: &str) -> anyhow::Result<Vec<Step>> {
    let steps: Vec<Step> = serde_yaml::from_str(yaml).context("Failed to parse replay script")?;

    for (index, step) in steps.iter().enumerate() {
        if step.call.is_mutation() && step.caller.is_none() {
            bail!("step {index} ({}): mutating calls need a caller", step.call.name());
        }
    }
    Ok(steps)
}

/// Read and parse a script file.
pub fn load_script(path: &Path) -> anyhow::Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&content)
}

/// Execute one step through the engine.
pub async fn run_step(engine: &Engine, index: usize, step: &Step) -> StepReport {
    let id = step.resource.clone();
    let result: Result<Answer, Failure> = match (&step.call, step.caller) {
        (Call::Mutation(mutation), Some(caller)) => {
            let mutation = mutation.clone();
            let id = id.clone();
            engine
                .submit(move |registry| mutation.apply(registry, caller, &id))
                .await
                .map(Answer::Receipt)
                .map_err(Failure::from)
        }
        (Call::Mutation(_), None) => Err(Failure {
            kind: ErrorKind::Unauthorized,
            message: "mutating call without a caller".to_string(),
        }),
        (Call::Query(query), _) => engine
            .query(|registry| query.read(registry, &id))
            .await
            .map_err(Failure::from),
    };

    let (ok, error) = match result {
        Ok(answer) => (Some(answer), None),
        Err(failure) => (None, Some(failure)),
    };
    StepReport {
        step: index,
        op: step.call.name(),
        resource: id,
        ok,
        error,
    }
}

/// Execute every step in order, writing one JSON line per step to `out`.
/// With `fail_fast`, stops at the first failing step.
pub async fn replay<W: Write>(
    engine: &Engine,
    steps: &[Step],
    fail_fast: bool,
    out: &mut W,
) -> anyhow::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (index, step) in steps.iter().enumerate() {
        let report = run_step(engine, index, step).await;
        summary.executed += 1;
        writeln!(out, "{}", serde_json::to_string(&report)?)?;

        if let Some(failure) = &report.error {
            summary.failed += 1;
            debug!(step = index, op = report.op, kind = ?failure.kind, "Step failed");
            if fail_fast {
                break;
            }
        }
    }

    info!(
        executed = summary.executed,
        failed = summary.failed,
        sequence = engine.sequence().await,
        "Replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";

    fn governance_script() -> String {
        format!(
            r#"
- caller: "{OWNER}"
  resource: gov
  op: create_resource
- caller: "{OWNER}"
  resource: gov
  op: propose_add_admin
  target: "{OTHER}"
- caller: "{OWNER}"
  resource: gov
  op: approve_add_admin
- resource: gov
  op: get_admins
- caller: "{OWNER}"
  resource: gov
  op: register_change
  payload: '{{"foo":"bar"}}'
  change_type: CREATE
- caller: "{OWNER}"
  resource: gov
  op: register_change
  data_hash: "0x00000000000000000000000000000000000000000000000000000000000000aa"
  change_type:
    CUSTOM: 7
- resource: gov
  op: get_history_range
  start: 0
  count: 10
"#
        )
    }

    fn json_lines(buf: &[u8]) -> Vec<serde_json::Value> {
        String::from_utf8(buf.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_script_requires_callers_for_mutations() {
        let steps = parse_script(&governance_script()).unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[1].call.name(), "propose_add_admin");
        assert!(steps[3].caller.is_none());

        let missing_caller = "- resource: r\n  op: create_resource\n";
        assert!(parse_script(missing_caller).is_err());

        assert!(parse_script("- resource: r\n  op: launch_rockets\n").is_err());
    }

    #[test]
    fn test_load_script_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(governance_script().as_bytes()).unwrap();

        let steps = load_script(file.path()).unwrap();
        assert_eq!(steps.len(), 7);
        assert!(load_script(Path::new("/nonexistent/script.yaml")).is_err());
    }

    #[tokio::test]
    async fn test_replay_reports_each_step() {
        let steps = parse_script(&governance_script()).unwrap();
        let engine = Engine::default();
        let mut out = Vec::new();

        let summary = replay(&engine, &steps, false, &mut out).await.unwrap();
        assert_eq!(summary, ReplaySummary { executed: 7, failed: 1 });

        let lines = json_lines(&out);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0]["ok"]["sequence"], 1);

        // Default policy: the proposer cannot approve their own proposal.
        assert_eq!(lines[2]["error"]["kind"], "already_approved");
        assert_eq!(lines[3]["ok"], serde_json::json!([OWNER]));

        let history = lines[6]["ok"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["change_type"], "CREATE");
        assert_eq!(history[1]["version"], 2);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let steps = parse_script(&governance_script()).unwrap();
        let engine = Engine::default();
        let mut out = Vec::new();

        let summary = replay(&engine, &steps, true, &mut out).await.unwrap();
        assert_eq!(summary, ReplaySummary { executed: 3, failed: 1 });
        assert_eq!(json_lines(&out).len(), 3);
        assert_eq!(engine.sequence().await, 2);
    }

    #[tokio::test]
    async fn test_query_on_unknown_resource_reports_not_found() {
        let steps = parse_script("- resource: ghost\n  op: get_version_count\n").unwrap();
        let report = run_step(&Engine::default(), 0, &steps[0]).await;

        assert!(report.ok.is_none());
        assert_eq!(report.error.map(|f| f.kind), Some(ErrorKind::NotFound));
    }
}
