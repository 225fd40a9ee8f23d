use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, warn};

use crate::api::state::AppState;

/// GET /api/signals/stream: every new signal as an SSE `signal` event
pub async fn signal_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.signal_tx.subscribe()).filter_map(|item| match item {
        Ok(signal) => match Event::default().event("signal").json_data(&signal) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                error!("Failed to encode signal event: {}", e);
                None
            }
        },
        Err(e) => {
            // Lagged subscriber: skip what was missed
            warn!("SSE subscriber lagging: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
