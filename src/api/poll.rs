use log::warn;
use mongodb::bson::Document;
use rocket::{
    futures::{
        future,
        stream::{self, BoxStream},
        StreamExt,
    },
    http::Status,
    response::stream::{Event, EventStream},
    serde::json::Json,
    tokio::select,
    Route, Shutdown, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{RequestId, StreamGuard};
use crate::model::{
    response_id, ActivePointer, ClientId, Question, QuestionId, QuestionView, Rating, Response,
};
use crate::store::{
    self, decode, DocumentSnapshots, DocumentStore, Store, StoredDocument, WriteMode,
};

pub fn routes() -> Vec<Route> {
    routes![active, active_stream, submit_response]
}

/// The live question as seen by one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveView {
    pub question: Option<QuestionView>,
    /// Whether the requesting client has already responded.
    pub answered: bool,
}

/// A participant's complete set of ratings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSubmission {
    pub question_id: QuestionId,
    pub client_id: ClientId,
    pub ratings: Vec<u8>,
}

async fn active_view(
    store: &dyn DocumentStore,
    pointer: &ActivePointer,
    client_id: Option<&ClientId>,
) -> Result<ActiveView> {
    let question = match pointer.resolve(store).await? {
        Some(question) => question,
        None => return Ok(ActiveView::default()),
    };
    let answered = match client_id {
        Some(client_id) => store
            .get(Response::COLLECTION, &response_id(&question.id, client_id))
            .await?
            .is_some(),
        None => false,
    };
    Ok(ActiveView {
        question: Some(question.into()),
        answered,
    })
}

enum Change {
    Pointer(Result<Option<Document>>),
    Answer(Result<Option<Document>>),
}

/// Follows the pointer and, for a known client, that client's response to the
/// live question, so a submission shows up as `answered`.
struct ActiveFollower {
    store: Store,
    client_id: Option<ClientId>,
    pointers: DocumentSnapshots,
    answer: Option<DocumentSnapshots>,
    last: Option<ActiveView>,
}

/// The next snapshot of the response subscription, if there is one.
async fn next_answer(answer: &mut Option<DocumentSnapshots>) -> Result<Option<Document>> {
    match answer {
        Some(answer) => match answer.next().await {
            Some(snapshot) => snapshot,
            None => future::pending().await,
        },
        None => future::pending().await,
    }
}

impl ActiveFollower {
    fn new(store: Store, client_id: Option<ClientId>, pointers: DocumentSnapshots) -> Self {
        Self {
            store,
            client_id,
            pointers,
            answer: None,
            last: None,
        }
    }

    /// Wait for the view to change. Returns `None` once the pointer
    /// subscription ends.
    async fn next_view(&mut self) -> Option<ActiveView> {
        loop {
            let change = select! {
                biased;
                snapshot = self.pointers.next() => Change::Pointer(snapshot?),
                snapshot = next_answer(&mut self.answer) => Change::Answer(snapshot),
            };
            let view = match change {
                Change::Pointer(snapshot) => match self.pointer_changed(snapshot).await {
                    Ok(view) => view,
                    Err(e) => {
                        // Keep reporting the last view rather than a closed poll.
                        warn!("Failed to follow the active question: {e}");
                        continue;
                    }
                },
                Change::Answer(Ok(response)) => match &self.last {
                    Some(last) => ActiveView {
                        answered: response.is_some(),
                        ..last.clone()
                    },
                    None => continue,
                },
                Change::Answer(Err(e)) => {
                    warn!("Failed to read the client's response: {e}");
                    continue;
                }
            };
            if self.last.as_ref() != Some(&view) {
                self.last = Some(view.clone());
                return Some(view);
            }
        }
    }

    async fn pointer_changed(&mut self, snapshot: Result<Option<Document>>) -> Result<ActiveView> {
        let pointer: ActivePointer = snapshot?.map(decode).transpose()?.unwrap_or_default();
        let view = active_view(&*self.store, &pointer, self.client_id.as_ref()).await?;
        let question_id = |view: Option<&ActiveView>| {
            view.and_then(|view| view.question.as_ref())
                .map(|question| question.id.clone())
        };
        if question_id(Some(&view)) != question_id(self.last.as_ref()) {
            self.answer = match (question_id(Some(&view)), &self.client_id) {
                (Some(question_id), Some(client_id)) => {
                    let id = response_id(&question_id, client_id);
                    Some(self.store.watch_document(Response::COLLECTION, &id).await?)
                }
                _ => None,
            };
        }
        Ok(view)
    }
}

/// Follow the live question as one client sees it.
///
/// Yields the current view straight away, then again whenever the pointer
/// moves or the client's response to the live question appears or goes away.
/// Store failures are logged and skipped.
async fn watch_active(
    store: Store,
    client_id: Option<ClientId>,
) -> Result<BoxStream<'static, ActiveView>> {
    let pointers = store
        .watch_document(ActivePointer::COLLECTION, ActivePointer::ID)
        .await?;
    Ok(follow(ActiveFollower::new(store, client_id, pointers)))
}

fn follow(follower: ActiveFollower) -> BoxStream<'static, ActiveView> {
    stream::unfold(follower, |mut follower| async move {
        let view = follower.next_view().await?;
        Some((view, follower))
    })
    .boxed()
}

#[get("/active?<client_id>")]
async fn active(client_id: Option<String>, store: &State<Store>) -> Result<Json<ActiveView>> {
    let client_id = client_id.map(ClientId::from);
    let pointer = ActivePointer::load(&***store).await?;
    let view = active_view(&***store, &pointer, client_id.as_ref()).await?;
    Ok(Json(view))
}

#[get("/active/stream?<client_id>")]
async fn active_stream(
    client_id: Option<String>,
    store: &State<Store>,
    config: &State<Config>,
    id: &RequestId,
    mut shutdown: Shutdown,
) -> Result<EventStream![]> {
    let client_id = client_id.map(ClientId::from);
    let mut views = watch_active(store.inner().clone(), client_id).await?;
    let id = *id;

    Ok(EventStream! {
        let _stream = StreamGuard::open(id, "active question");
        loop {
            let view = select! {
                biased;
                view = views.next() => match view {
                    Some(view) => view,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            yield Event::json(&view).event("active");
        }
    }
    .heartbeat(config.sse_heartbeat()))
}

#[post("/responses", data = "<submission>", format = "json")]
async fn submit_response(
    submission: Json<ResponseSubmission>,
    store: &State<Store>,
) -> Result<()> {
    let ResponseSubmission {
        question_id,
        client_id,
        ratings,
    } = submission.0;

    // Only the live question accepts responses.
    let question: Question = store::fetch(&***store, &question_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {question_id}")))?;
    let pointer = ActivePointer::load(&***store).await?;
    if pointer.question_id.as_deref() != Some(question.id.as_str()) {
        return Err(Error::Status(
            Status::Conflict,
            format!("Question {question_id} is not accepting responses"),
        ));
    }

    if ratings.len() != question.options.len() {
        return Err(Error::bad_request(format!(
            "Expected {} ratings, got {}",
            question.options.len(),
            ratings.len()
        )));
    }
    let ratings = ratings
        .into_iter()
        .map(Rating::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::bad_request(e.to_string()))?;

    let response = Response::new(question_id, client_id, ratings);
    store::save(&***store, &response.id(), &response, WriteMode::Replace).await
}
