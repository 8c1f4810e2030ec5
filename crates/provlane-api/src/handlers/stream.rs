//! Live event stream (server-sent events)
//!
//! A client first receives the retained backlog in order, then live frames
//! from its own bounded queue. The stream ends when the session closes,
//! when the client falls too far behind, or after an idle interval.

use crate::error::ApiResult;
use crate::hub::Frame;
use crate::types::*;
use axum::{
    extract::{Path, State},
    response::{sse::Event, sse::KeepAlive, Sse},
};
use futures::stream::Stream;
use provlane_types::EventError;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, info};

pub async fn stream_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut subscription = state.registry.subscribe(&session_id).await?;
    let idle_timeout = state.config.client_idle_timeout;
    let client_id = subscription.client_id;
    info!(session_id = %session_id, client_id = %client_id, "Dashboard client connected");

    let stream = async_stream::stream! {
        if let Some(EventError::BacklogTruncated { dropped }) = &subscription.truncated {
            let first_seq = subscription.backlog.first().map(|frame| frame.seq);
            yield Ok(Event::default()
                .event("backlog_truncated")
                .data(json!({"dropped": dropped, "first_seq": first_seq}).to_string()));
        }

        for frame in std::mem::take(&mut subscription.backlog) {
            yield Ok(frame_event(&frame));
        }

        loop {
            match tokio::time::timeout(idle_timeout, subscription.receiver.recv()).await {
                Ok(Some(frame)) => yield Ok(frame_event(&frame)),
                Ok(None) => {
                    if subscription.is_overloaded() {
                        yield Ok(Event::default()
                            .event("client_overloaded")
                            .data(json!({"client_id": client_id}).to_string()));
                    }
                    break;
                }
                Err(_) => {
                    debug!(session_id = %session_id, client_id = %client_id, "Closing idle stream");
                    break;
                }
            }
        }
        debug!(session_id = %session_id, client_id = %client_id, "Stream finished");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn frame_event(frame: &Frame) -> Event {
    Event::default()
        .id(frame.seq.to_string())
        .event(frame.event_type.as_str())
        .data(frame.data.to_string())
}
