use crate::{
    error::ServerError,
    render,
    session::{CookieCredentials, require_session},
    state::AppState,
};
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::NaiveDate;
use p2p_data::{
    Candle, Continuity, DashboardOptions, DashboardView, Interval, Observation, Series,
    view::{self, Alert, MAX_WINDOW_DAYS, Summary},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Query parameters shared by the dashboard page and the JSON endpoints.
///
/// Blank values are treated as absent so the HTML form can submit them as-is.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub interval: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub window_days: Option<String>,
    pub continuity: Option<String>,
}

impl ViewQuery {
    pub fn options(&self, state: &AppState) -> Result<DashboardOptions, ServerError> {
        let interval = match non_blank(&self.interval) {
            Some(raw) => raw.parse::<Interval>().map_err(ServerError::BadRequest)?,
            None => Interval::default(),
        };
        let continuity = match non_blank(&self.continuity) {
            Some(raw) => raw.parse::<Continuity>().map_err(ServerError::BadRequest)?,
            None => Continuity::default(),
        };
        let window_days = non_blank(&self.window_days)
            .map(|raw| {
                raw.parse::<u32>()
                    .ok()
                    .filter(|days| *days <= MAX_WINDOW_DAYS)
                    .ok_or_else(|| {
                        ServerError::BadRequest(format!("invalid window_days: {raw} (0 to {MAX_WINDOW_DAYS})"))
                    })
            })
            .transpose()?;

        Ok(DashboardOptions {
            window_days: state.window_days(window_days),
            from: parse_date("from", &self.from)?,
            to: parse_date("to", &self.to)?,
            interval,
            continuity,
            buy_alert_pct: state.config.buy_alert_pct,
        })
    }
}

fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|raw| !raw.is_empty())
}

fn parse_date(name: &str, raw: &Option<String>) -> Result<Option<NaiveDate>, ServerError> {
    non_blank(raw)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ServerError::BadRequest(format!("invalid {name} date: {raw}")))
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub available: (NaiveDate, NaiveDate),
    pub selected: (NaiveDate, NaiveDate),
    pub summary: Summary,
    pub buy_alert: Option<Alert>,
    pub weekly_alert: Option<Alert>,
}

impl From<DashboardView> for SummaryResponse {
    fn from(view: DashboardView) -> Self {
        Self {
            available: view.available,
            selected: view.selected,
            summary: view.summary,
            buy_alert: view.buy_alert,
            weekly_alert: view.weekly_alert,
        }
    }
}

/// Build the dashboard router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(dashboard))
        .route("/api/series", get(api_series))
        .route("/api/candles", get(api_candles))
        .route("/api/summary", get(api_summary))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_session));

    Router::new()
        .merge(protected)
        .route("/login", get(login_page).post(login))
        .route("/logout", axum::routing::post(logout))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load, filter and assemble everything one request needs.
async fn load_view(
    state: &AppState,
    query: &ViewQuery,
) -> Result<(DashboardOptions, Series, DashboardView), ServerError> {
    let options = query.options(state)?;
    let series = state.series(options.window_days).await?;
    let selected = view::select(&series, &options);
    let view = view::build_from_source(&state.config.source, &series, &options).await?;
    Ok((options, selected, view))
}

async fn dashboard(State(state): State<Arc<AppState>>, Query(query): Query<ViewQuery>) -> Response {
    let logout = state.gate.is_enabled();

    match load_view(&state, &query).await {
        Ok((options, selected, view)) => Html(render::dashboard_page(&view, &selected, &options, logout)).into_response(),
        Err(error) => {
            error!(%error, "failed to build dashboard");
            (error.status(), Html(render::error_page(&error.to_string(), logout))).into_response()
        }
    }
}

async fn api_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Vec<Observation>>, ServerError> {
    let options = query.options(&state)?;
    let series = state.series(options.window_days).await?;
    Ok(Json(view::select(&series, &options).observations().to_vec()))
}

async fn api_candles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Vec<Candle>>, ServerError> {
    let (_, _, view) = load_view(&state, &query).await?;
    Ok(Json(view.candles))
}

async fn api_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<SummaryResponse>, ServerError> {
    let (_, _, view) = load_view(&state, &query).await?;
    Ok(Json(SummaryResponse::from(view)))
}

async fn login_page(State(state): State<Arc<AppState>>) -> Response {
    if !state.gate.is_enabled() {
        return Redirect::to("/").into_response();
    }
    Html(render::login_page(false)).into_response()
}

async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap, Form(form): Form<LoginForm>) -> Response {
    let mut credentials = CookieCredentials::from_headers(&headers);

    if state.gate.login(&mut credentials, &form.password) {
        credentials.apply(Redirect::to("/").into_response())
    } else {
        (StatusCode::UNAUTHORIZED, Html(render::login_page(true))).into_response()
    }
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut credentials = CookieCredentials::from_headers(&headers);
    state.gate.logout(&mut credentials);
    credentials.apply(Redirect::to("/login").into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
