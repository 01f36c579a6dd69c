//! Command and query handlers

use super::state::AppState;
use crate::error::ServiceResult;
use crate::payment::PaymentUpdate;
use crate::service::CandidateAssessment;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use groupbid_engine::GroupSnapshot;
use groupbid_types::{
    BidOffer, CandidateProject, EventEnvelope, GroupBidId, GroupId, GroupSpec, JoinOutcome,
    JoiningCriterion, ProjectId, UserId,
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: i64,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// Create group request
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub spec: GroupSpec,
    #[serde(default)]
    pub criteria: Vec<JoiningCriterion>,
    #[serde(default)]
    pub founder: Option<CandidateProject>,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub id: String,
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> ServiceResult<Json<CreateGroupResponse>> {
    let id = state
        .service
        .create_group(
            request.spec,
            request.criteria,
            request.founder,
            request.idempotency_token,
        )
        .await?;
    Ok(Json(CreateGroupResponse { id: id.to_string() }))
}

pub async fn list_groups(
    State(state): State<AppState>,
) -> ServiceResult<Json<Vec<GroupSnapshot>>> {
    Ok(Json(state.service.list_groups().await?))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<GroupSnapshot>> {
    let snapshot = state.service.get_group(&GroupId::new(id)).await?;
    Ok(Json(snapshot))
}

pub async fn get_journal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Vec<EventEnvelope>>> {
    Ok(Json(state.service.get_journal(&GroupId::new(id)).await?))
}

pub async fn evaluate_candidates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(candidates): Json<Vec<CandidateProject>>,
) -> ServiceResult<Json<Vec<CandidateAssessment>>> {
    let assessments = state
        .service
        .evaluate_candidates(&GroupId::new(id), candidates)
        .await?;
    Ok(Json(assessments))
}

/// Join request
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub candidate: CandidateProject,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub admitted: bool,
    pub already_member: bool,
}

pub async fn join_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> ServiceResult<Json<JoinResponse>> {
    let outcome = state
        .service
        .join_group(&GroupId::new(id), request.candidate, request.idempotency_token)
        .await?;
    Ok(Json(JoinResponse {
        admitted: true,
        already_member: outcome == JoinOutcome::AlreadyMember,
    }))
}

/// Leave request
#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub project_id: ProjectId,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<LeaveRequest>,
) -> ServiceResult<StatusCode> {
    state
        .service
        .leave_group(&GroupId::new(id), &request.project_id, request.idempotency_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Token-only request body
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

pub async fn close_formation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TokenRequest>,
) -> ServiceResult<StatusCode> {
    state
        .service
        .close_formation(&GroupId::new(id), request.idempotency_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dissolve request
#[derive(Debug, Deserialize)]
pub struct DissolveRequest {
    pub reason: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

pub async fn dissolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DissolveRequest>,
) -> ServiceResult<StatusCode> {
    state
        .service
        .dissolve(&GroupId::new(id), &request.reason, request.idempotency_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bid submission request
#[derive(Debug, Deserialize)]
pub struct SubmitBidRequest {
    pub offer: BidOffer,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitBidResponse {
    pub bid_id: String,
}

pub async fn submit_bid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitBidRequest>,
) -> ServiceResult<Json<SubmitBidResponse>> {
    let bid_id = state
        .service
        .submit_group_bid(&GroupId::new(id), request.offer, request.idempotency_token)
        .await?;
    Ok(Json(SubmitBidResponse {
        bid_id: bid_id.to_string(),
    }))
}

/// Invalidate request
#[derive(Debug, Deserialize)]
pub struct InvalidateBidRequest {
    pub reason: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

pub async fn invalidate_bid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InvalidateBidRequest>,
) -> ServiceResult<Json<SubmitBidResponse>> {
    let bid_id = state
        .service
        .invalidate_open_bid(&GroupId::new(id), &request.reason, request.idempotency_token)
        .await?;
    Ok(Json(SubmitBidResponse {
        bid_id: bid_id.to_string(),
    }))
}

/// Accept request
#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub project_id: ProjectId,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub acceptance_id: String,
}

pub async fn accept(
    State(state): State<AppState>,
    Path((id, _bid_id)): Path<(String, String)>,
    Json(request): Json<AcceptRequest>,
) -> ServiceResult<Json<AcceptResponse>> {
    let acceptance_id = state
        .service
        .accept(&GroupId::new(id), &request.project_id, request.idempotency_token)
        .await?;
    Ok(Json(AcceptResponse {
        acceptance_id: acceptance_id.to_string(),
    }))
}

pub async fn revoke(
    State(state): State<AppState>,
    Path((id, _bid_id)): Path<(String, String)>,
    Json(request): Json<AcceptRequest>,
) -> ServiceResult<StatusCode> {
    state
        .service
        .revoke_acceptance(&GroupId::new(id), &request.project_id, request.idempotency_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Extension request
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub new_deadline: DateTime<Utc>,
    pub reason: String,
    pub actor: UserId,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

pub async fn extend_deadline(
    State(state): State<AppState>,
    Path((id, bid_id)): Path<(String, String)>,
    Json(request): Json<ExtendRequest>,
) -> ServiceResult<StatusCode> {
    state
        .service
        .extend_deadline(
            &GroupId::new(id),
            &GroupBidId::new(bid_id),
            request.new_deadline,
            &request.reason,
            request.actor,
            request.idempotency_token,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Payment collaborator webhook
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(update): Json<PaymentUpdate>,
) -> ServiceResult<StatusCode> {
    state.service.handle_payment_update(update).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Manual sweep trigger
pub async fn trigger_sweep(State(state): State<AppState>) -> StatusCode {
    state.sweeper.trigger_sweep().await;
    StatusCode::ACCEPTED
}
