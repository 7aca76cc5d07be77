use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::handlers::auth::Caller;
use crate::services::booking;
use crate::services::calendar::generate_ics;
use crate::services::spaces::require_space;
use crate::state::AppState;

// GET /calendar/:booking_id
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let booking_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let (booking, space) = {
        let db = state.db()?;
        let booking = booking::get_booking(&db, &principal, booking_id)?;
        let space = require_space(&*db, &booking.space_id)?;
        (booking, space)
    };

    let ics = generate_ics(&booking, &space);
    let filename = format!("booking-{booking_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
