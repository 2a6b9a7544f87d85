//! # REST API
//!
//! Builds the axum router exposing the escrow node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                          |
//! |--------|---------------------------|--------------------------------------|
//! | GET    | `/health`                 | Liveness probe                       |
//! | GET    | `/status`                 | Node status summary                  |
//! | POST   | `/v1/escrows`             | Create and secure an escrow plan     |
//! | POST   | `/v1/escrows/:id/relay`   | Chain a relay off a stored package   |
//! | POST   | `/v1/packages/:id/events` | Report a lifecycle event             |
//! | GET    | `/v1/packages/:id`        | Stored package record                |
//! | GET    | `/v1/accounts/:pubkey`    | Ledger account details               |
//! | POST   | `/v1/transactions`        | Submit a signed envelope blob        |
//! | POST   | `/v1/debug/fund`          | Devnet account creation and funding  |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use caravan_escrow::{
    link_relay, EscrowError, EscrowPlanBuilder, PackageEvent, PackageState, RelayError, SetupError,
};
use caravan_protocol::{
    config::ESCROW_STARTING_BALANCE_STROOPS, Asset, CaravanKeypair, CaravanPublicKey,
    InMemoryLedger, LedgerClient, LedgerError, SignedEnvelope,
};

use crate::metrics::SharedMetrics;
use crate::store::{PackageRecord, PackageStore, StoreError};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet").
    pub network: String,
    /// The ledger backend the node plans against and submits to.
    pub ledger: Arc<InMemoryLedger>,
    /// Package record persistence.
    pub store: Arc<PackageStore>,
    /// Issuer of the delivery token.
    pub issuer: CaravanPublicKey,
    /// The delivery token itself.
    pub asset: Asset,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// Process start time, reported by `/status`.
    pub started_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/v1/escrows", post(create_escrow_handler))
        .route("/v1/escrows/:id/relay", post(create_relay_handler))
        .route("/v1/packages/:id/events", post(package_event_handler))
        .route("/v1/packages/:id", get(package_handler))
        .route("/v1/accounts/:pubkey", get(account_handler))
        .route("/v1/transactions", post(submit_transaction_handler))
        .route("/v1/debug/fund", post(debug_fund_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/escrows`.
#[derive(Debug, Deserialize)]
pub struct CreateEscrowRequest {
    pub launcher: CaravanPublicKey,
    pub courier: CaravanPublicKey,
    pub recipient: CaravanPublicKey,
    /// Courier's fee in stroops.
    pub payment_stroops: i64,
    /// Courier's collateral in stroops.
    pub collateral_stroops: i64,
    /// Delivery deadline, Unix seconds.
    pub deadline: i64,
}

/// Request body for `POST /v1/escrows/:id/relay`.
#[derive(Debug, Deserialize)]
pub struct CreateRelayRequest {
    pub relayer: CaravanPublicKey,
    pub relayee: CaravanPublicKey,
    pub relayer_stroops: i64,
    pub relayee_stroops: i64,
    pub deadline: i64,
}

/// Request body for `POST /v1/transactions`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Hex-encoded signed envelope blob.
    pub envelope: String,
}

/// Request body for `POST /v1/debug/fund`.
#[derive(Debug, Deserialize)]
pub struct DebugFundRequest {
    pub account: CaravanPublicKey,
    /// Native balance for account creation. Ignored if the account exists.
    pub native_stroops: i64,
    /// When present, opens a delivery-token trust line and credits this
    /// amount. Zero just opens the line.
    pub token_stroops: Option<i64>,
}

/// The four envelope blobs of a stored plan, hex-encoded and opaque.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeBlobs {
    pub refund: String,
    pub payment: String,
    pub merge: String,
    pub set_options: String,
}

/// Response payload for package creation and lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct PackageResponse {
    pub package_id: Uuid,
    pub escrow: CaravanPublicKey,
    pub launcher: CaravanPublicKey,
    pub courier: CaravanPublicKey,
    pub recipient: CaravanPublicKey,
    pub custodian: CaravanPublicKey,
    pub payment_stroops: i64,
    pub collateral_stroops: i64,
    pub deadline: i64,
    pub state: PackageState,
    pub parent_escrow: Option<CaravanPublicKey>,
    pub envelopes: EnvelopeBlobs,
}

/// Response payload for `POST /v1/packages/:id/events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub package_id: Uuid,
    pub state: PackageState,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    /// Issuer of the delivery token on this network.
    pub issuer: CaravanPublicKey,
    /// The ledger's current clock, Unix seconds.
    pub ledger_time: i64,
    pub packages_total: usize,
    pub packages_open: usize,
    pub uptime_seconds: i64,
}

/// Generic error body returned by endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn package_response(record: &PackageRecord) -> PackageResponse {
    let plan = &record.plan;
    PackageResponse {
        package_id: record.package_id,
        escrow: plan.escrow,
        launcher: plan.launcher,
        courier: plan.courier,
        recipient: plan.recipient,
        custodian: record.lifecycle.custodian(),
        payment_stroops: plan.payment,
        collateral_stroops: plan.collateral,
        deadline: plan.deadline,
        state: record.lifecycle.state(),
        parent_escrow: record.parent_escrow,
        envelopes: EnvelopeBlobs {
            refund: plan.envelopes.refund.encode_blob(),
            payment: plan.envelopes.payment.encode_blob(),
            merge: plan.envelopes.merge.encode_blob(),
            set_options: plan.envelopes.set_options.encode_blob(),
        },
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe for orchestrators. Intentionally does not
/// check subsystem health; that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        issuer: state.issuer,
        ledger_time: state.ledger.now(),
        packages_total: state.store.len(),
        packages_open: state.store.open_count(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// `POST /v1/escrows` — create, secure, and persist a new escrow plan.
///
/// Generates a single-use escrow keypair, funds the account on the devnet
/// ledger, builds the four-envelope plan, and runs the setup ritual. A plan
/// whose signer configuration was rejected is reported as 502 with a
/// distinct `escrow_not_secured` error and is not persisted: the account is
/// still controlled by its own key and must not be funded.
async fn create_escrow_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateEscrowRequest>,
) -> Response {
    let timer = std::time::Instant::now();
    let escrow = CaravanKeypair::generate();

    if let Err(e) = state
        .ledger
        .create_account(escrow.public_key(), ESCROW_STARTING_BALANCE_STROOPS)
    {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("escrow account creation failed: {e}"),
        );
    }

    let plan = match EscrowPlanBuilder::new(escrow.public_key())
        .launcher(req.launcher)
        .courier(req.courier)
        .recipient(req.recipient)
        .payment(req.payment_stroops)
        .collateral(req.collateral_stroops)
        .deadline(req.deadline)
        .asset(state.asset.clone())
        .build(state.ledger.as_ref())
    {
        Ok(plan) => plan,
        Err(e @ EscrowError::AccountQuery(_)) => {
            return error_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if let Err(e) = plan.execute_setup(state.ledger.as_ref(), &escrow) {
        let message = match &e {
            SetupError::NotSecured(_) => format!("escrow_not_secured: {e}"),
            SetupError::TrustRejected(_) => e.to_string(),
        };
        return error_response(StatusCode::BAD_GATEWAY, message);
    }

    let record = PackageRecord::new(plan, None);
    let response = package_response(&record);
    state.store.insert(record);

    state.metrics.plans_created_total.inc();
    state.metrics.packages_open.set(state.store.open_count() as i64);
    state.metrics.plan_build_seconds.observe(timer.elapsed().as_secs_f64());
    tracing::info!(package = %response.package_id, escrow = %response.escrow, "package launched");

    (StatusCode::CREATED, Json(response)).into_response()
}

/// `POST /v1/escrows/:id/relay` — chain a relay escrow off a stored
/// package's courier leg and mark the parent handed off.
async fn create_relay_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateRelayRequest>,
) -> Response {
    let Some(parent) = state.store.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("package {id} not found"));
    };

    // Checked before any ledger work, so a settled parent never leaves a
    // secured child escrow account behind.
    if parent.lifecycle.state().is_terminal() {
        return error_response(
            StatusCode::CONFLICT,
            format!("package {id} is already settled and cannot be relayed"),
        );
    }

    let relay_escrow = CaravanKeypair::generate();
    if let Err(e) = state
        .ledger
        .create_account(relay_escrow.public_key(), ESCROW_STARTING_BALANCE_STROOPS)
    {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("relay escrow account creation failed: {e}"),
        );
    }

    let relay = match link_relay(
        state.ledger.as_ref(),
        &parent.plan,
        relay_escrow.public_key(),
        req.relayer,
        req.relayee,
        req.relayer_stroops,
        req.relayee_stroops,
        req.deadline,
    ) {
        Ok(relay) => relay,
        Err(e @ RelayError::SplitMismatch { .. }) => {
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
        Err(RelayError::Plan(e @ EscrowError::AccountQuery(_))) => {
            return error_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
        Err(RelayError::Plan(e)) => {
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    if let Err(e) = relay.plan.execute_setup(state.ledger.as_ref(), &relay_escrow) {
        let message = match &e {
            SetupError::NotSecured(_) => format!("escrow_not_secured: {e}"),
            SetupError::TrustRejected(_) => e.to_string(),
        };
        return error_response(StatusCode::BAD_GATEWAY, message);
    }

    // Custody moves to the relayee on the parent leg.
    let handoff = state.store.update(&id, |record| {
        record.lifecycle.apply(PackageEvent::HandedOff {
            custodian: req.relayee,
        })
    });
    match handoff {
        Ok(Ok(_)) => {}
        Ok(Err(invalid)) => {
            return error_response(StatusCode::CONFLICT, invalid.to_string());
        }
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    }

    let record = PackageRecord::new(relay.plan, Some(relay.parent_escrow));
    let response = package_response(&record);
    state.store.insert(record);

    state.metrics.relays_created_total.inc();
    state.metrics.packages_open.set(state.store.open_count() as i64);
    tracing::info!(parent = %id, package = %response.package_id, "relay created");

    (StatusCode::CREATED, Json(response)).into_response()
}

/// `POST /v1/packages/:id/events` — report a submission outcome and advance
/// the package lifecycle.
async fn package_event_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<PackageEvent>,
) -> Response {
    let result = state
        .store
        .update(&id, |record| record.lifecycle.apply(event));

    match result {
        Ok(Ok(new_state)) => {
            match new_state {
                PackageState::Delivered => state.metrics.deliveries_total.inc(),
                PackageState::Refunded => state.metrics.refunds_total.inc(),
                _ => {}
            }
            state.metrics.packages_open.set(state.store.open_count() as i64);
            Json(EventResponse {
                package_id: id,
                state: new_state,
            })
            .into_response()
        }
        Ok(Err(invalid)) => error_response(StatusCode::CONFLICT, invalid.to_string()),
        Err(StoreError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("package {id} not found"))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /v1/packages/:id` — stored package record.
async fn package_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.get(&id) {
        Some(record) => Json(package_response(&record)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("package {id} not found")),
    }
}

/// `GET /v1/accounts/:pubkey` — ledger account details for a hex-encoded
/// public key.
async fn account_handler(State(state): State<AppState>, Path(pubkey): Path<String>) -> Response {
    let account = match CaravanPublicKey::from_hex(&pubkey) {
        Ok(key) => key,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.ledger.get_account(&account) {
        Ok(record) => Json(record).into_response(),
        Err(e @ LedgerError::AccountNotFound { .. }) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /v1/transactions` — submit a signed envelope blob to the ledger.
///
/// Rejections come back as 400 with the ledger's closed reject reason;
/// nothing is retried.
async fn submit_transaction_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let signed = match SignedEnvelope::decode_blob(&req.envelope) {
        Ok(signed) => signed,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    state.metrics.submissions_total.inc();
    match state.ledger.submit(&signed) {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e @ LedgerError::TransactionRejected(_)) => {
            state.metrics.rejections_total.inc();
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ LedgerError::AccountNotFound { .. }) => {
            state.metrics.rejections_total.inc();
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// `POST /v1/debug/fund` — devnet account creation and funding. The
/// friendbot analog: creates the account if absent, optionally opens a
/// delivery-token trust line and credits it from the issuer.
async fn debug_fund_handler(
    State(state): State<AppState>,
    Json(req): Json<DebugFundRequest>,
) -> Response {
    if !state.ledger.account_exists(&req.account) {
        if let Err(e) = state.ledger.create_account(req.account, req.native_stroops) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }
    if let Some(token_stroops) = req.token_stroops {
        if let Err(e) = state.ledger.open_trustline(&req.account, &state.asset) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
        if token_stroops > 0 {
            if let Err(e) = state
                .ledger
                .credit_token(&req.account, &state.asset, token_stroops)
            {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    }

    match state.ledger.get_account(&req.account) {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
