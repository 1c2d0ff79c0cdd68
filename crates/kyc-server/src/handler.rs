use axum::extract::{Multipart, Path, State};
use axum::response::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use kyc_ledger::{Entry, LedgerReader, Payload, ValidationReport};
use kyc_types::{Decision, Digest, EventKind, SubjectId, VerificationStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::profile::Profile;
use crate::state::AppState;

/// Payload key recording the profile fingerprint on submission.
pub const PROFILE_DIGEST: &str = "profileDigest";
pub const DOCUMENT_ID: &str = "documentId";
pub const DOCUMENT_LOCATION: &str = "documentLocation";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub kyc_id: SubjectId,
    pub sequence: u64,
    pub digest: Digest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub pending: Vec<SubjectId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// `VERIFIED` or `REJECTED`.
    pub decision: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub kyc_id: SubjectId,
    pub status: VerificationStatus,
    pub sequence: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub kyc_id: SubjectId,
    pub status: VerificationStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    pub kyc_id: SubjectId,
    #[serde(flatten)]
    pub profile: Profile,
    pub status: VerificationStatus,
    /// Whether the stored profile still matches the digest recorded at
    /// submission. Absent when no digest was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_intact: Option<bool>,
}

/// Audit view of one ledger entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub previous_digest: Digest,
    pub digest: Digest,
}

impl From<&Entry> for EntryView {
    fn from(entry: &Entry) -> Self {
        Self {
            sequence: entry.sequence(),
            timestamp: entry.timestamp(),
            payload: entry.payload().clone(),
            previous_digest: entry.previous_digest(),
            digest: entry.digest(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerResponse {
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub kyc_id: SubjectId,
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub entries: u64,
}

pub async fn health(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".into(),
        version: state.version.into(),
        entries: state.ledger().len()?,
    }))
}

/// Fields collected from a multipart submission.
#[derive(Default)]
struct SubmissionForm {
    name: Option<String>,
    dob: Option<String>,
    address: Option<String>,
    document_id: Option<String>,
    file: Option<(String, Bytes)>,
}

fn required(value: Option<String>, field: &str) -> ServerResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServerError::BadRequest(format!("missing form field `{field}`"))),
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ServerError {
    ServerError::BadRequest(format!("invalid multipart body: {e}"))
}

pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<SubmitResponse>> {
    let mut form = SubmissionForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let contents = field.bytes().await.map_err(multipart_error)?;
                form.file = Some((file_name, contents));
            }
            "name" => form.name = Some(field.text().await.map_err(multipart_error)?),
            "dob" => form.dob = Some(field.text().await.map_err(multipart_error)?),
            "address" => form.address = Some(field.text().await.map_err(multipart_error)?),
            "documentId" => form.document_id = Some(field.text().await.map_err(multipart_error)?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let name = required(form.name, "name")?;
    let dob = required(form.dob, "dob")?;
    let address = required(form.address, "address")?;
    let document_id = required(form.document_id, "documentId")?;
    let (file_name, contents) = form
        .file
        .ok_or_else(|| ServerError::BadRequest("missing form field `file`".into()))?;

    let subject = SubjectId::generate();
    let location = state.documents.save(&subject, &file_name, contents).await?;
    let profile = Profile {
        name,
        dob,
        address,
        document_id,
        document_location: location,
    };
    let profile_digest = profile.digest()?;
    let fields = Payload::new()
        .with(PROFILE_DIGEST, profile_digest.to_hex())
        .with(DOCUMENT_ID, profile.document_id.as_str())
        .with(DOCUMENT_LOCATION, profile.document_location.as_str());
    state.profiles.put(&subject, profile).await?;

    let resolver = state.resolver.clone();
    let submitted = subject.clone();
    let entry = blocking(move || Ok(resolver.record_submission(&submitted, fields)?)).await?;
    Ok(Json(SubmitResponse {
        kyc_id: subject,
        sequence: entry.sequence(),
        digest: entry.digest(),
    }))
}

pub async fn pending(State(state): State<AppState>) -> ServerResult<Json<PendingResponse>> {
    Ok(Json(PendingResponse {
        pending: state.resolver.pending_subjects()?,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    Path(kyc_id): Path<String>,
    Json(request): Json<VerifyRequest>,
) -> ServerResult<Json<VerifyResponse>> {
    let subject = subject_from_path(kyc_id)?;
    let decision: Decision = request
        .decision
        .parse()
        .map_err(|e: kyc_types::TypeError| ServerError::BadRequest(e.to_string()))?;

    let resolver = state.resolver.clone();
    let decided = subject.clone();
    let entry = blocking(move || {
        // A subject never returns to NOT_FOUND, so a concurrent append
        // cannot invalidate this check.
        if !resolver.status_of(&decided)?.is_found() {
            return Err(ServerError::NotFound(format!("no submission for {decided}")));
        }
        Ok(resolver.record_decision(&decided, decision)?)
    })
    .await?;
    Ok(Json(VerifyResponse {
        kyc_id: subject,
        status: decision.into(),
        sequence: entry.sequence(),
    }))
}

/// Run a ledger write off the async executor; journal appends may `fsync`.
async fn blocking<T, F>(write: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(write)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

pub async fn status(
    State(state): State<AppState>,
    Path(kyc_id): Path<String>,
) -> ServerResult<Json<StatusResponse>> {
    let subject = subject_from_path(kyc_id)?;
    let status = state.resolver.status_of(&subject)?;
    Ok(Json(StatusResponse {
        kyc_id: subject,
        status,
    }))
}

pub async fn details(
    State(state): State<AppState>,
    Path(kyc_id): Path<String>,
) -> ServerResult<Json<DetailsResponse>> {
    let subject = subject_from_path(kyc_id)?;
    let profile = state
        .profiles
        .get(&subject)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("KYC record {subject} not found")))?;

    let status = state.resolver.status_of(&subject)?;
    let recorded = state
        .resolver
        .history(&subject)?
        .iter()
        .rev()
        .filter(|entry| matches!(entry.event_kind(), Ok(EventKind::Submitted)))
        .find_map(|entry| entry.payload().get_str(PROFILE_DIGEST).map(str::to_owned));
    let profile_intact = match recorded {
        Some(hex) => Some(profile.digest()?.to_hex() == hex),
        None => None,
    };

    Ok(Json(DetailsResponse {
        kyc_id: subject,
        profile,
        status,
        profile_intact,
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Path(kyc_id): Path<String>,
) -> ServerResult<Json<HistoryResponse>> {
    let subject = subject_from_path(kyc_id)?;
    let entries = state
        .resolver
        .history(&subject)?
        .iter()
        .map(|entry| EntryView::from(entry.as_ref()))
        .collect();
    Ok(Json(HistoryResponse {
        kyc_id: subject,
        entries,
    }))
}

pub async fn ledger(State(state): State<AppState>) -> ServerResult<Json<LedgerResponse>> {
    let snapshot = state.ledger().all_entries()?;
    Ok(Json(LedgerResponse {
        entries: snapshot.iter().map(EntryView::from).collect(),
    }))
}

pub async fn validate(State(state): State<AppState>) -> ServerResult<Json<ValidationReport>> {
    Ok(Json(state.ledger().validation_report()?))
}

fn subject_from_path(raw: String) -> ServerResult<SubjectId> {
    SubjectId::new(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}
