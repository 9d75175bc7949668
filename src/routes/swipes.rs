use crate::core::{CompatibilityEngine, CompatibilityError, SwipeError, SwipeProcessor};
use crate::models::{
    CompatibilityRequest, CreditGrantRequest, CreditGrantResponse, CreditKind, ErrorResponse,
    FeatureKind, HealthResponse, RewindRequest, RewindResponse, SubmitSwipeRequest, SwipeResponse,
};
use crate::services::PostgresStore;
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<SwipeProcessor>,
    pub compatibility: Arc<CompatibilityEngine>,
    /// Present when the ledger lives in PostgreSQL
    pub postgres: Option<Arc<PostgresStore>>,
}

/// Configure all swipe-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/swipes", web::post().to(submit_swipe))
        .route("/swipes/rewind", web::post().to(rewind))
        .route("/entitlements/{user_id}/{feature}", web::get().to(check_entitlement))
        .route("/credits", web::post().to(grant_credits))
        .route("/usage/{user_id}", web::get().to(usage))
        .route("/compatibility", web::post().to(compatibility));
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new("validationFailed", errors.to_string(), 400))
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.postgres {
        Some(pg) => pg.health_check().await.unwrap_or(false),
        None => true,
    };
    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Record a swipe
///
/// POST /api/v1/swipes
///
/// ```json
/// { "userId": "string", "candidateId": "string", "action": "like|pass|superlike" }
/// ```
async fn submit_swipe(
    state: web::Data<AppState>,
    req: web::Json<SubmitSwipeRequest>,
) -> Result<HttpResponse, SwipeError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }

    let outcome = state
        .processor
        .submit_swipe_str(&req.user_id, &req.candidate_id, &req.action)
        .await?;

    Ok(HttpResponse::Ok().json(SwipeResponse {
        matched: outcome.matched,
    }))
}

/// Undo the most recent swipe
///
/// POST /api/v1/swipes/rewind
async fn rewind(
    state: web::Data<AppState>,
    req: web::Json<RewindRequest>,
) -> Result<HttpResponse, SwipeError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }

    let outcome = state.processor.rewind(&req.user_id).await?;
    Ok(HttpResponse::Ok().json(RewindResponse {
        restored_candidate_id: outcome.restored_candidate_id,
    }))
}

/// Would the feature be allowed right now; nothing is consumed
///
/// GET /api/v1/entitlements/{userId}/{feature}
async fn check_entitlement(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, SwipeError> {
    let (user_id, feature) = path.into_inner();
    let feature = FeatureKind::parse(&feature)
        .ok_or_else(|| SwipeError::InvalidAction(format!("unknown feature '{}'", feature)))?;

    let view = state.processor.check_entitlement(&user_id, feature).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Credit top-up from the purchase flow
///
/// POST /api/v1/credits
async fn grant_credits(
    state: web::Data<AppState>,
    req: web::Json<CreditGrantRequest>,
) -> Result<HttpResponse, SwipeError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }
    let credit = CreditKind::parse(&req.credit)
        .ok_or_else(|| SwipeError::InvalidAction(format!("unknown credit '{}'", req.credit)))?;

    let balance = state.processor.top_up(&req.user_id, credit, req.amount).await?;
    Ok(HttpResponse::Ok().json(CreditGrantResponse {
        user_id: req.user_id.clone(),
        credit,
        balance,
    }))
}

/// GET /api/v1/usage/{userId}
async fn usage(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, SwipeError> {
    let user_id = path.into_inner();
    let usage = state.processor.usage(&user_id).await?;
    Ok(HttpResponse::Ok().json(usage))
}

/// Score two profiles
///
/// POST /api/v1/compatibility
///
/// Always answers with a score when both profiles exist; remote scorer
/// failures are absorbed by the local fallback.
async fn compatibility(
    state: web::Data<AppState>,
    req: web::Json<CompatibilityRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    match state.compatibility.score(&req.profile_a, &req.profile_b).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(CompatibilityError::NotFound(id)) => {
            let message = format!("Profile not found: {}", id);
            HttpResponse::NotFound().json(ErrorResponse::new("notFound", message, 404))
        }
        Err(e) => {
            tracing::error!("Failed to load profiles for compatibility: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                "profileSourceUnavailable",
                e.to_string(),
                500,
            ))
        }
    }
}
