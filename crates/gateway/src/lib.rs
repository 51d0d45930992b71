//! PaperDesk API Gateway
//!
//! HTTP surface for participants, conference managers and the payment
//! gateway. The router is built from an explicit [`AppState`] so tests can
//! drive it with in-memory collaborators.

pub mod handlers;
pub mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use paperdesk_common::{
    auth::JwtManager,
    config::AppConfig,
    documents::DocumentStorage,
    errors::{AppError, Result},
    notify::Notifier,
    payments::PaymentGateway,
    store::SharedStore,
    workflow::{PaymentService, ReviewService, SubmissionService},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Headroom above the PDF limit for the other multipart fields
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedStore,
    pub jwt: Arc<JwtManager>,
    pub review: ReviewService,
    pub submissions: SubmissionService,
    pub payments: PaymentService,
}

impl AppState {
    /// Wire the workflow services around a store and a payment gateway
    pub fn new(config: AppConfig, store: SharedStore, gateway: Arc<dyn PaymentGateway>) -> Result<Self> {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

        let notifier = Notifier::new(store.clone(), config.server.public_url.clone());
        let review = ReviewService::new(store.clone(), notifier.clone());
        let submissions = SubmissionService::new(
            store.clone(),
            notifier.clone(),
            DocumentStorage::new(&config.storage.upload_dir),
            config.max_upload_bytes(),
        );
        let payments = PaymentService::new(
            store.clone(),
            notifier,
            gateway,
            &config.payment,
            &config.server.public_url,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            jwt,
            review,
            submissions,
            payments,
        })
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes() + MULTIPART_OVERHEAD);

    // API routes
    let api_routes = Router::new()
        // Accounts
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me))

        // Papers
        .route(
            "/papers",
            post(handlers::papers::submit_paper)
                .layer(upload_limit)
                .get(handlers::papers::list_papers),
        )
        .route("/papers/{id}", get(handlers::papers::get_paper))
        .route("/papers/{id}/document", get(handlers::papers::download_document))

        // Review
        .route("/papers/{id}/status", put(handlers::review::update_status))

        // Payments and passes
        .route("/papers/{id}/payment", post(handlers::payments::initiate_payment))
        .route("/papers/{id}/payment/verify", post(handlers::payments::verify_payment))
        .route(
            "/papers/{id}/pass",
            get(handlers::payments::get_pass).post(handlers::payments::regenerate_pass),
        )

        // Administration
        .route("/admin/stats", get(handlers::admin::stats))
        .route(
            "/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        );

    // Throttle the public API per client; health checks and callbacks stay open
    let api_routes = if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit_middleware))
    } else {
        api_routes
    };

    let app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Gateway callbacks (signed, no JWT)
        .route("/webhooks/chip", post(handlers::webhook::chip_webhook))

        .nest("/v1", api_routes);

    // Compose the app
    let timeout = TimeoutLayer::new(state.config.request_timeout());

    app.route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}
