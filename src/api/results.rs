use rocket::{
    futures::StreamExt,
    response::stream::{Event, EventStream},
    serde::json::Json,
    tokio::select,
    Route, Shutdown, State,
};

use crate::config::Config;
use crate::error::Result;
use crate::logging::{RequestId, StreamGuard};
use crate::results::{current_results, watch_results, ResultsView};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![results, results_stream]
}

#[get("/results")]
async fn results(store: &State<Store>) -> Result<Json<ResultsView>> {
    Ok(Json(current_results(&***store).await?))
}

#[get("/results/stream")]
async fn results_stream(
    store: &State<Store>,
    config: &State<Config>,
    id: &RequestId,
    mut shutdown: Shutdown,
) -> Result<EventStream![]> {
    let mut views = watch_results(store.inner().clone()).await?;
    let id = *id;

    Ok(EventStream! {
        let _stream = StreamGuard::open(id, "results");
        loop {
            let view = select! {
                biased;
                view = views.next() => match view {
                    Some(view) => view,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            yield Event::json(&view).event("results");
        }
    }
    .heartbeat(config.sse_heartbeat()))
}
