//! Live results for the active question.

use log::warn;
use rocket::futures::{
    future,
    stream::{self, BoxStream},
    StreamExt,
};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, Summary};
use crate::error::Result;
use crate::model::{ActivePointer, QuestionView, StoredResponse};
use crate::store::{self, decode, DocumentStore, Store, StoredDocument};

/// What the results view shows: the active question and its summary, or
/// nothing if no question is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub question: Option<QuestionView>,
    pub summary: Option<Summary>,
}

/// Aggregate the responses to the active question as they stand.
pub async fn current_results(store: &dyn DocumentStore) -> Result<ResultsView> {
    results_for(store, None).await
}

/// Build the view from the given responses, or from a fresh read of them.
async fn results_for(
    store: &dyn DocumentStore,
    responses: Option<Vec<StoredResponse>>,
) -> Result<ResultsView> {
    let question = match ActivePointer::load(store).await?.resolve(store).await? {
        Some(question) => question,
        None => return Ok(ResultsView::default()),
    };
    let responses = match responses {
        Some(responses) => responses,
        None => store::fetch_all(store, None).await?,
    };
    let summary = aggregate(&question, &responses);
    Ok(ResultsView {
        question: Some(question.into()),
        summary: Some(summary),
    })
}

enum Change {
    Pointer,
    Responses(Vec<StoredResponse>),
}

/// Follow the results as the pointer and responses change.
///
/// Yields the current results straight away, then again whenever a change to
/// either alters them. Each update aggregates every response from scratch.
pub async fn watch_results(store: Store) -> Result<BoxStream<'static, ResultsView>> {
    let pointers = store
        .watch_document(ActivePointer::COLLECTION, ActivePointer::ID)
        .await?
        .map(|_| Change::Pointer);
    let responses = store
        .watch_collection(StoredResponse::COLLECTION)
        .await?
        .filter_map(|snapshot| async move {
            match snapshot {
                Ok(docs) => Some(Change::Responses(
                    docs.into_iter().filter_map(|doc| decode(doc).ok()).collect(),
                )),
                Err(e) => {
                    warn!("Failed to read responses: {e}");
                    None
                }
            }
        });

    let views = stream::select(pointers, responses)
        .scan(None, move |latest, change| {
            if let Change::Responses(responses) = change {
                *latest = Some(responses);
            }
            let responses = latest.clone();
            let store = store.clone();
            async move { Some(results_for(&*store, responses).await) }
        })
        .filter_map(|view| async move {
            match view {
                Ok(view) => Some(view),
                Err(e) => {
                    warn!("Failed to compute results: {e}");
                    None
                }
            }
        })
        // Both subscriptions open with a snapshot, and a pointer rewrite may not
        // change anything, so drop repeats.
        .scan(None, |last: &mut Option<ResultsView>, view| {
            let changed = last.as_ref() != Some(&view);
            *last = Some(view.clone());
            future::ready(Some(changed.then_some(view)))
        })
        .filter_map(future::ready);
    Ok(views.boxed())
}
