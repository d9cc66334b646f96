use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde_json::json;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{state::AppState, types::EmployeeFilterQuery};

/// Live feed of leave events as Server-Sent Events, optionally for one employee.
///
/// Lagging subscribers silently skip the events they missed.
pub async fn events(
    State(state): State<AppState>,
    Query(q): Query<EmployeeFilterQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let only = q.employee_id;

    let stream = BroadcastStream::new(rx)
        .filter_map(|res| res.ok())
        .filter(move |ev| only.map_or(true, |id| ev.employee_id() == id))
        .map(|ev| {
            let data = serde_json::to_string(&ev)
                .unwrap_or_else(|_| json!({"type":"warning","message":"serialization error"}).to_string());
            Ok::<Event, Infallible>(Event::default().data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
