use log::{debug, info, warn};
use rocket::futures::StreamExt;

use crate::error::Error;
use crate::model::{response_id, ActivePointer, ClientId, Question, Rating, Response};
use crate::session::{LoadRequest, Loaded, PollSession, SessionState, SubmitError};
use crate::store::{self, decode, DocumentSnapshots, Store, StoredDocument, WriteMode};

/// Drives a [`PollSession`] for one client against a store.
///
/// Pointer notifications are handled one at a time: each one triggers a single
/// read of the question it names, whose result is then handed back to the
/// session.
pub struct Participant {
    store: Store,
    client_id: ClientId,
    session: PollSession,
}

impl Participant {
    pub fn new(store: Store, client_id: ClientId) -> Self {
        Self {
            store,
            client_id,
            session: PollSession::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    /// Subscribe to the active-question pointer.
    pub async fn watch(&self) -> Result<DocumentSnapshots, Error> {
        self.store
            .watch_document(ActivePointer::COLLECTION, ActivePointer::ID)
            .await
    }

    /// Handle a new pointer value, loading the question it names.
    pub async fn on_pointer(&mut self, pointer: &ActivePointer) {
        match self.session.pointer_changed(pointer) {
            Some(request) => match self.load(request.clone()).await {
                Ok(loaded) => {
                    self.session.question_loaded(loaded);
                }
                Err(e) => {
                    self.session.load_failed(&request, &e);
                }
            },
            None => debug!("No active question"),
        }
    }

    /// Read the requested question and check for an earlier response to it.
    async fn load(&self, request: LoadRequest) -> Result<Loaded, Error> {
        let question = store::fetch::<Question>(&*self.store, &request.question_id).await?;
        let already_answered = match &question {
            Some(question) => {
                let id = response_id(&question.id, &self.client_id);
                self.store.get(Response::COLLECTION, &id).await?.is_some()
            }
            None => false,
        };
        Ok(Loaded {
            request,
            question,
            already_answered,
        })
    }

    pub fn set_rating(&mut self, option: usize, rating: Rating) -> Result<(), SubmitError> {
        self.session.set_rating(option, rating)
    }

    /// Submit the current ratings.
    ///
    /// The response is written in full under its deterministic ID, so
    /// submitting again overwrites rather than duplicates.
    pub async fn submit(&mut self) -> Result<(), SubmitError> {
        let submission = self.session.begin_submit()?;
        let question_id = submission.question_id.clone();
        let response = submission.into_response(self.client_id.clone());
        match store::save(&*self.store, &response.id(), &response, WriteMode::Replace).await {
            Ok(()) => {
                info!("Submitted response {}", response.id());
                self.session.submit_succeeded(&question_id);
                Ok(())
            }
            Err(e) => {
                self.session.submit_failed(&question_id, &e);
                Err(e.into())
            }
        }
    }

    /// Handle the next snapshot of a pointer subscription. Returns `false` once
    /// the subscription has ended.
    pub async fn next(&mut self, pointers: &mut DocumentSnapshots) -> bool {
        let snapshot = match pointers.next().await {
            Some(snapshot) => snapshot,
            None => return false,
        };
        match snapshot.and_then(|doc| doc.map(decode::<ActivePointer>).transpose()) {
            Ok(pointer) => self.on_pointer(&pointer.unwrap_or_default()).await,
            // The session carries on as it was until a readable pointer arrives.
            Err(e) => warn!("Unreadable active-question pointer: {e}"),
        }
        true
    }

    /// Follow a pointer subscription until it ends.
    pub async fn run(&mut self, mut pointers: DocumentSnapshots) {
        while self.next(&mut pointers).await {}
        debug!("Pointer subscription closed");
    }
}
