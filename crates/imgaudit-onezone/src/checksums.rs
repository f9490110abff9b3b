//! Lambda checksum recalculation.
//!
//! Checksums stored in a workflow dump are computed by Onezone. After a dump
//! is edited (a new docker image, changed arguments), each lambda revision is
//! round-tripped through a scratch inventory so Onezone recomputes its
//! checksum, and the dump is patched with the new value.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::OnezoneClient;
use crate::error::{OnezoneError, Result};

/// Name of the scratch inventory lambdas are uploaded to.
pub const DUMP_INVENTORY_NAME: &str = "__inventory_for_dumps";

const LAMBDAS_POINTER: &str = "/revision/supplementaryAtmLambdas";
const CHECKSUM_POINTER: &str = "/revision/atmLambdaRevision/checksum";

/// Outcome for one lambda revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionChecksum {
    pub lambda_id: String,
    pub name: Option<String>,
    pub revision: u64,
    pub previous: Option<String>,
    pub current: String,
}

impl RevisionChecksum {
    /// Whether Onezone computed a different checksum than the dump held.
    pub fn changed(&self) -> bool {
        self.previous.as_deref() != Some(self.current.as_str())
    }
}

/// Result of a recalculation over a whole dump.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ChecksumReport {
    pub revisions: Vec<RevisionChecksum>,
}

impl ChecksumReport {
    /// Whether any checksum in the dump was updated.
    pub fn changed(&self) -> bool {
        self.revisions.iter().any(RevisionChecksum::changed)
    }

    /// Revisions whose checksum was updated.
    pub fn updated(&self) -> impl Iterator<Item = &RevisionChecksum> {
        self.revisions.iter().filter(|r| r.changed())
    }
}

/// Recompute every lambda revision checksum in `dump`, updating it in place.
///
/// The scratch inventory is removed even when a revision fails; the first
/// error is returned.
pub async fn recalculate_checksums(
    client: &OnezoneClient,
    dump: &mut Value,
) -> Result<ChecksumReport> {
    if !dump.pointer(LAMBDAS_POINTER).is_some_and(Value::is_object) {
        return Err(OnezoneError::DumpFormat(
            "missing revision.supplementaryAtmLambdas object".to_string(),
        ));
    }

    let inventory_id = client.create_inventory(DUMP_INVENTORY_NAME).await?;
    let outcome = recalculate_in_inventory(client, &inventory_id, dump).await;
    let removed = client.remove_inventory(&inventory_id).await;

    match (outcome, removed) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), removed) => {
            if let Err(cleanup) = removed {
                warn!(%inventory_id, error = %cleanup, "failed to remove scratch inventory");
            }
            Err(e)
        }
    }
}

async fn recalculate_in_inventory(
    client: &OnezoneClient,
    inventory_id: &str,
    dump: &mut Value,
) -> Result<ChecksumReport> {
    let mut report = ChecksumReport::default();

    let Some(lambdas) = dump
        .pointer_mut(LAMBDAS_POINTER)
        .and_then(Value::as_object_mut)
    else {
        return Ok(report);
    };

    for (lambda_id, revisions) in lambdas.iter_mut() {
        let revisions = revisions.as_object_mut().ok_or_else(|| {
            OnezoneError::DumpFormat(format!("lambda '{}' is not a revision map", lambda_id))
        })?;

        for revision_dump in revisions.values_mut() {
            let outcome =
                recalculate_revision(client, inventory_id, lambda_id, revision_dump).await?;
            report.revisions.push(outcome);
        }
    }

    info!(
        revisions = report.revisions.len(),
        updated = report.updated().count(),
        "lambda checksums recalculated"
    );
    Ok(report)
}

async fn recalculate_revision(
    client: &OnezoneClient,
    inventory_id: &str,
    lambda_id: &str,
    revision_dump: &mut Value,
) -> Result<RevisionChecksum> {
    let revision = revision_number(revision_dump).ok_or_else(|| {
        OnezoneError::DumpFormat(format!(
            "lambda '{}' revision has no originalRevisionNumber",
            lambda_id
        ))
    })?;
    let name = revision_dump
        .pointer("/revision/atmLambdaRevision/name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let label = name.as_deref().unwrap_or(lambda_id);

    debug!(lambda = label, revision, "uploading lambda revision");
    let uploaded_id = client.upload_lambda(inventory_id, revision_dump).await?;

    debug!(lambda = label, revision, "dumping uploaded revision");
    let dumped = client.dump_lambda(&uploaded_id, revision).await?;
    let current = dumped
        .pointer(CHECKSUM_POINTER)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            OnezoneError::DumpFormat(format!(
                "dump of lambda '{}' rev. {} carries no checksum",
                label, revision
            ))
        })?;

    let previous = revision_dump
        .pointer(CHECKSUM_POINTER)
        .and_then(Value::as_str)
        .map(str::to_string);

    if previous.as_deref() != Some(current.as_str()) {
        info!(lambda = label, revision, checksum = %current, "checksum has changed");
        set_checksum(revision_dump, &current)?;
    } else {
        debug!(lambda = label, revision, "checksum has not changed");
    }

    client.unlink_lambda(&uploaded_id, inventory_id).await?;

    Ok(RevisionChecksum {
        lambda_id: lambda_id.to_string(),
        name,
        revision,
        previous,
        current,
    })
}

/// `originalRevisionNumber`, given either as a number or a numeric string.
fn revision_number(revision_dump: &Value) -> Option<u64> {
    match revision_dump.pointer("/revision/originalRevisionNumber")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn set_checksum(revision_dump: &mut Value, checksum: &str) -> Result<()> {
    let content = revision_dump
        .pointer_mut("/revision/atmLambdaRevision")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            OnezoneError::DumpFormat("revision has no atmLambdaRevision object".to_string())
        })?;
    content.insert("checksum".to_string(), Value::String(checksum.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API: &str = "/api/v3/onezone";

    fn client_for(server: &MockServer) -> OnezoneClient {
        OnezoneClient::builder()
            .base_url(format!("{}{}", server.uri(), API))
            .token("tok")
            .build()
            .unwrap()
    }

    fn lambda_revision(name: &str, revision: u64, checksum: &str) -> Value {
        json!({
            "schemaFormatVersion": 3,
            "originalAtmLambdaId": name,
            "revision": {
                "schemaFormatVersion": 3,
                "originalRevisionNumber": revision,
                "atmLambdaRevision": {
                    "name": name,
                    "operationSpec": {
                        "engine": "openfaas",
                        "dockerImage": format!("onedata/{}:v1", name)
                    },
                    "checksum": checksum
                }
            }
        })
    }

    fn workflow(lambdas: Value) -> Value {
        json!({
            "schemaFormatVersion": 3,
            "name": "detect-file-formats",
            "revision": {
                "originalRevisionNumber": 1,
                "supplementaryAtmLambdas": lambdas
            }
        })
    }

    async fn mount_inventory(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{}/user/atm_inventories", API)))
            .and(body_json(json!({ "name": DUMP_INVENTORY_NAME })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", format!("{}/atm_inventories/inv1", API)),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/user/atm_inventories/inv1", API)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_lambda(
        server: &MockServer,
        name: &str,
        id: &str,
        revision: u64,
        checksum: &str,
    ) {
        Mock::given(method("POST"))
            .and(path(format!("{}/atm_lambdas", API)))
            .and(body_partial_json(json!({
                "atmInventoryId": "inv1",
                "originalAtmLambdaId": name
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", format!("{}/atm_lambdas/{}", API, id)),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/atm_lambdas/{}/dump", API, id)))
            .and(body_json(json!({ "includeRevision": revision })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(lambda_revision(name, revision, checksum)),
            )
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/atm_lambdas/{}/atm_inventories/inv1", API, id)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_only_changed_checksums_are_updated() {
        let server = MockServer::start().await;
        mount_inventory(&server).await;
        mount_lambda(&server, "detect", "lam1", 1, "fresh").await;
        mount_lambda(&server, "echo", "lam2", 2, "same").await;

        let mut dump = workflow(json!({
            "a": { "1": lambda_revision("detect", 1, "stale") },
            "b": { "2": lambda_revision("echo", 2, "same") }
        }));

        let report = recalculate_checksums(&client_for(&server), &mut dump)
            .await
            .unwrap();

        assert_eq!(report.revisions.len(), 2);
        assert!(report.changed());
        let updated: Vec<_> = report.updated().map(|r| r.lambda_id.as_str()).collect();
        assert_eq!(updated, vec!["a"]);

        assert_eq!(
            dump.pointer("/revision/supplementaryAtmLambdas/a/1/revision/atmLambdaRevision/checksum"),
            Some(&json!("fresh"))
        );
        assert_eq!(
            dump.pointer("/revision/supplementaryAtmLambdas/b/2/revision/atmLambdaRevision/checksum"),
            Some(&json!("same"))
        );
    }

    #[tokio::test]
    async fn test_unchanged_dump_reports_no_change() {
        let server = MockServer::start().await;
        mount_inventory(&server).await;
        mount_lambda(&server, "detect", "lam1", 1, "abc").await;

        let mut dump = workflow(json!({ "a": { "1": lambda_revision("detect", 1, "abc") } }));
        let before = dump.clone();

        let report = recalculate_checksums(&client_for(&server), &mut dump)
            .await
            .unwrap();
        assert!(!report.changed());
        assert_eq!(dump, before);
    }

    #[tokio::test]
    async fn test_inventory_removed_when_revision_fails() {
        let server = MockServer::start().await;
        mount_inventory(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{}/atm_lambdas", API)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "id": "badValue", "description": "Bad value: atmLambdaRevision." }
            })))
            .mount(&server)
            .await;

        let mut dump = workflow(json!({ "a": { "1": lambda_revision("detect", 1, "abc") } }));
        let err = recalculate_checksums(&client_for(&server), &mut dump)
            .await
            .unwrap_err();
        assert!(matches!(err, OnezoneError::Api { status: 400, .. }));
        // The DELETE expectation in mount_inventory is verified on drop.
    }

    #[tokio::test]
    async fn test_malformed_dump_rejected_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut dump = json!({ "name": "no-revision" });
        let err = recalculate_checksums(&client_for(&server), &mut dump)
            .await
            .unwrap_err();
        assert!(matches!(err, OnezoneError::DumpFormat(_)));
    }

    #[test]
    fn test_revision_number_accepts_strings() {
        assert_eq!(
            revision_number(&json!({ "revision": { "originalRevisionNumber": "4" } })),
            Some(4)
        );
        assert_eq!(
            revision_number(&json!({ "revision": { "originalRevisionNumber": 2 } })),
            Some(2)
        );
        assert_eq!(revision_number(&json!({ "revision": {} })), None);
    }

    #[test]
    fn test_first_checksum_counts_as_change() {
        let outcome = RevisionChecksum {
            lambda_id: "a".to_string(),
            name: None,
            revision: 1,
            previous: None,
            current: "abc".to_string(),
        };
        assert!(outcome.changed());
    }
}
