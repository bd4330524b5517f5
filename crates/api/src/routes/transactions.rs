//! Transaction creation, lookup, processor trigger, and audit endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use common::{FundId, IdempotencyKey, SecurityId, TransactionId, TransactionSubTypeId};
use domain::LedgerTransaction;
use ledger_store::{LedgerStore, ReferenceDirectory};
use pipeline::{
    CreateTransactionRequest, ProcessOutcome, TransactionProcessor, WriteCoordinator,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore + ReferenceDirectory> {
    pub coordinator: WriteCoordinator<S>,
    pub processor: TransactionProcessor<S>,
    pub store: Arc<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateTransactionBody {
    pub fund_id: i32,
    pub security_id: Option<i32>,
    pub sub_type_id: i32,
    pub trade_date: NaiveDate,
    pub settle_date: NaiveDate,
    pub quantity: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub created_by: String,
}

#[derive(Deserialize, Default)]
pub struct ProcessBody {
    pub correlation_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub fund_id: i32,
    pub security_id: Option<i32>,
    pub sub_type_id: i32,
    pub trade_date: NaiveDate,
    pub settle_date: NaiveDate,
    pub quantity: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&LedgerTransaction> for TransactionResponse {
    fn from(tx: &LedgerTransaction) -> Self {
        Self {
            id: tx.id().to_string(),
            fund_id: tx.fund_id().as_i32(),
            security_id: tx.security_id().map(|s| s.as_i32()),
            sub_type_id: tx.sub_type_id().as_i32(),
            trade_date: tx.trade_date(),
            settle_date: tx.settle_date(),
            quantity: tx.quantity(),
            price: tx.price(),
            amount: tx.amount(),
            currency: tx.currency().to_string(),
            status: tx.status().to_string(),
            created_by: tx.created_by().to_string(),
            created_at: tx.created_at(),
            updated_at: tx.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub transaction_id: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct AuditEntryResponse {
    pub event_type: String,
    pub performed_by: Option<String>,
    pub data_before: Option<serde_json::Value>,
    pub data_after: Option<serde_json::Value>,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub source: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// -- Handlers --

/// POST /transactions — record a transaction, exactly once per
/// `x-idempotency-key`.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create<S: LedgerStore + ReferenceDirectory + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<CreateTransactionBody>,
) -> Result<(axum::http::StatusCode, Json<TransactionResponse>), ApiError> {
    let idempotency_key = required_key_header(&headers)?;
    let correlation_id = optional_header(&headers, "x-correlation-id");
    let request_id = optional_header(&headers, "x-request-id");

    let request = CreateTransactionRequest {
        fund_id: FundId::new(body.fund_id),
        security_id: body.security_id.map(SecurityId::new),
        sub_type_id: TransactionSubTypeId::new(body.sub_type_id),
        trade_date: body.trade_date,
        settle_date: body.settle_date,
        quantity: body.quantity,
        price: body.price,
        amount: body.amount,
        currency: body.currency,
        created_by: body.created_by,
        idempotency_key,
        correlation_id,
        request_id,
    };

    let transaction = state.coordinator.create_transaction(request).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(TransactionResponse::from(&transaction)),
    ))
}

/// GET /transactions/:id — load a transaction by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + ReferenceDirectory + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;
    let transaction = state
        .store
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {id} not found")))?;

    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /transactions/:id/process — settle a pending transaction.
///
/// Stands in for the queue consumer that receives the published
/// created event; duplicate invocations are safe no-ops.
#[tracing::instrument(skip(state, body))]
pub async fn process<S: LedgerStore + ReferenceDirectory + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Option<Json<ProcessBody>>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;
    let correlation_id = body.and_then(|Json(b)| b.correlation_id);

    let outcome = state.processor.process(transaction_id, correlation_id).await?;

    match outcome {
        ProcessOutcome::Succeeded => Ok(Json(ProcessResponse {
            transaction_id: id,
            outcome: "Succeeded",
            reason: None,
        })),
        ProcessOutcome::Rejected { reason } => Ok(Json(ProcessResponse {
            transaction_id: id,
            outcome: "Rejected",
            reason: Some(reason),
        })),
        ProcessOutcome::NotFound => {
            Err(ApiError::NotFound(format!("Transaction {id} not found")))
        }
    }
}

/// GET /transactions/:id/audit — audit trail for a transaction.
#[tracing::instrument(skip(state))]
pub async fn audit<S: LedgerStore + ReferenceDirectory + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntryResponse>>, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;

    let entries = state
        .store
        .audit_entries_for("Transaction", &transaction_id.to_string())
        .await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| AuditEntryResponse {
                event_type: e.event_type,
                performed_by: e.performed_by,
                data_before: e.data_before,
                data_after: e.data_after,
                correlation_id: e.correlation_id,
                request_id: e.request_id,
                source: e.source,
                recorded_at: e.recorded_at,
            })
            .collect(),
    ))
}

fn required_key_header(headers: &HeaderMap) -> Result<IdempotencyKey, ApiError> {
    let value = headers
        .get("x-idempotency-key")
        .ok_or_else(|| ApiError::BadRequest("Missing x-idempotency-key header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid x-idempotency-key header".to_string()))?;

    let uuid = uuid::Uuid::parse_str(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid x-idempotency-key: {e}")))?;
    Ok(IdempotencyKey::from_uuid(uuid))
}

fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_transaction_id(id: &str) -> Result<TransactionId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(TransactionId::from_uuid(uuid))
}
