use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::auth::Caller;
use crate::handlers::extract::ValidQuery;
use crate::models::{BookingWindow, Money};
use crate::services::conflicts::{self, ConflictReport};
use crate::services::pricing;
use crate::services::spaces::require_space;
use crate::state::AppState;

// GET /api/spaces/:id/conflicts
#[derive(Deserialize)]
pub struct ConflictQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub exclude: Option<String>,
}

pub async fn check_conflicts(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(space_id): Path<String>,
    ValidQuery(query): ValidQuery<ConflictQuery>,
) -> Result<Json<ConflictReport>, AppError> {
    let window = BookingWindow {
        start_date: query.start_date,
        end_date: query.end_date,
        start_time: query.start_time,
        end_time: query.end_time,
    };

    let db = state.db()?;
    let space = require_space(&*db, &space_id)?;
    let report = conflicts::check_conflicts(&db, &principal, &space, &window, query.exclude.as_deref())?;
    Ok(Json(report))
}

// GET /api/spaces/:id/quote
#[derive(Deserialize)]
pub struct QuoteQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    space_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    days: i64,
    total_price: Money,
    display_price: String,
}

pub async fn quote(
    State(state): State<Arc<AppState>>,
    Caller(_principal): Caller,
    Path(space_id): Path<String>,
    ValidQuery(query): ValidQuery<QuoteQuery>,
) -> Result<Json<QuoteResponse>, AppError> {
    let db = state.db()?;
    let total = pricing::quote(&*db, &space_id, query.start_date, query.end_date)?;
    let window = BookingWindow {
        start_date: query.start_date,
        end_date: query.end_date,
        start_time: None,
        end_time: None,
    };

    Ok(Json(QuoteResponse {
        space_id,
        start_date: query.start_date,
        end_date: query.end_date,
        days: window.days(),
        display_price: total.to_string(),
        total_price: total,
    }))
}
