//! The participant's view of the live poll.
//!
//! [`PollSession`] is a pure state machine: it never touches the store itself.
//! Instead it hands out [`LoadRequest`]s and [`Submission`]s for a driver to
//! carry out, and is told the outcome afterwards. Every load is stamped with a
//! ticket, and only the outcome of the most recent one is applied, so a slow
//! read can never overwrite the result of a newer pointer change.

use std::collections::BTreeSet;
use std::mem;

use log::{debug, warn};
use thiserror::Error;

use crate::error::Error;
use crate::model::{ActivePointer, ClientId, Question, QuestionId, Rating, Response};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Some options have not been rated yet; holds their indices.
    #[error("Please rate every option before submitting (unrated: {0:?})")]
    Unrated(Vec<usize>),
    #[error("No question is accepting responses")]
    NotAccepting,
    #[error("There is no option {0}")]
    NoSuchOption(usize),
    #[error(transparent)]
    Store(#[from] Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No poll is live, or the live question is still being loaded.
    NoActiveQuestion,
    Unanswered {
        question: Question,
        /// One slot per option, in option order.
        ratings: Vec<Option<Rating>>,
        /// Options flagged as unrated by the last rejected submission.
        missing: BTreeSet<usize>,
    },
    Answered {
        question: Question,
    },
}

impl SessionState {
    pub fn question(&self) -> Option<&Question> {
        match self {
            Self::NoActiveQuestion => None,
            Self::Unanswered { question, .. } | Self::Answered { question } => Some(question),
        }
    }
}

/// A question the driver must read, along with whether this client has already
/// answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub question_id: QuestionId,
    pub ticket: u64,
}

/// The outcome of a [`LoadRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub request: LoadRequest,
    /// `None` if the question does not exist.
    pub question: Option<Question>,
    /// Whether a response by this client already exists.
    pub already_answered: bool,
}

/// A complete set of ratings, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub question_id: QuestionId,
    pub ratings: Vec<Rating>,
}

impl Submission {
    pub fn into_response(self, client_id: ClientId) -> Response {
        Response::new(self.question_id, client_id, self.ratings)
    }
}

#[derive(Debug)]
pub struct PollSession {
    state: SessionState,
    /// The outstanding load, if any. Cleared by a null pointer.
    latest: Option<LoadRequest>,
    /// The state before the outstanding load, restored if the load fails.
    before_load: SessionState,
    tickets: u64,
}

impl Default for PollSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::NoActiveQuestion,
            latest: None,
            before_load: SessionState::NoActiveQuestion,
            tickets: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Is a load outstanding?
    pub fn is_loading(&self) -> bool {
        self.latest.is_some()
    }

    /// React to a new pointer value.
    ///
    /// Any partial ratings are discarded. Returns the load the driver should
    /// perform, if the pointer names a question.
    pub fn pointer_changed(&mut self, pointer: &ActivePointer) -> Option<LoadRequest> {
        let previous = mem::replace(&mut self.state, SessionState::NoActiveQuestion);
        self.latest = match &pointer.question_id {
            Some(question_id) => {
                if self.latest.is_none() {
                    self.before_load = previous;
                }
                self.tickets += 1;
                Some(LoadRequest {
                    question_id: question_id.clone(),
                    ticket: self.tickets,
                })
            }
            None => {
                self.before_load = SessionState::NoActiveQuestion;
                None
            }
        };
        self.latest.clone()
    }

    /// Apply the outcome of a load. Returns `false` if the load was superseded
    /// and has been ignored.
    pub fn question_loaded(&mut self, loaded: Loaded) -> bool {
        if self.latest.as_ref() != Some(&loaded.request) {
            debug!(
                "Discarding stale load of question {} (ticket {})",
                loaded.request.question_id, loaded.request.ticket
            );
            return false;
        }
        self.latest = None;
        self.before_load = SessionState::NoActiveQuestion;
        self.state = match loaded.question {
            // Only trust a question that is the one asked for.
            Some(question) if question.id == loaded.request.question_id => {
                if loaded.already_answered {
                    SessionState::Answered { question }
                } else {
                    let ratings = vec![None; question.options.len()];
                    SessionState::Unanswered {
                        question,
                        ratings,
                        missing: BTreeSet::new(),
                    }
                }
            }
            _ => SessionState::NoActiveQuestion,
        };
        true
    }

    /// The read for `request` failed. The session returns to the state it was
    /// in before the pointer changed, partial ratings included. Returns `false`
    /// if the load was superseded and has been ignored.
    pub fn load_failed(&mut self, request: &LoadRequest, error: &Error) -> bool {
        if self.latest.as_ref() != Some(request) {
            debug!(
                "Ignoring failed stale load of question {} (ticket {})",
                request.question_id, request.ticket
            );
            return false;
        }
        warn!("Failed to load question {}: {error}", request.question_id);
        self.latest = None;
        self.state = mem::replace(&mut self.before_load, SessionState::NoActiveQuestion);
        true
    }

    /// Rate a single option, leaving the others untouched.
    pub fn set_rating(&mut self, option: usize, rating: Rating) -> Result<(), SubmitError> {
        match &mut self.state {
            SessionState::Unanswered {
                ratings, missing, ..
            } => {
                let slot = ratings
                    .get_mut(option)
                    .ok_or(SubmitError::NoSuchOption(option))?;
                *slot = Some(rating);
                missing.remove(&option);
                Ok(())
            }
            _ => Err(SubmitError::NotAccepting),
        }
    }

    /// Start a submission.
    ///
    /// If any option is unrated the submission is refused and the unrated
    /// options are flagged. Otherwise the session stays `Unanswered` until the
    /// driver reports the outcome of the write.
    pub fn begin_submit(&mut self) -> Result<Submission, SubmitError> {
        match &mut self.state {
            SessionState::Unanswered {
                question,
                ratings,
                missing,
            } => {
                *missing = ratings
                    .iter()
                    .enumerate()
                    .filter(|(_, rating)| rating.is_none())
                    .map(|(index, _)| index)
                    .collect();
                if !missing.is_empty() {
                    return Err(SubmitError::Unrated(missing.iter().copied().collect()));
                }
                Ok(Submission {
                    question_id: question.id.clone(),
                    ratings: ratings.iter().flatten().copied().collect(),
                })
            }
            _ => Err(SubmitError::NotAccepting),
        }
    }

    /// The write for a submission to `question_id` succeeded.
    pub fn submit_succeeded(&mut self, question_id: &str) {
        if let SessionState::Unanswered { question, .. } = &self.state {
            if question.id == question_id {
                let question = question.clone();
                self.state = SessionState::Answered { question };
                return;
            }
        }
        debug!("Ignoring submission acknowledgement for question {question_id}");
    }

    /// The write for a submission to `question_id` failed. The ratings are kept
    /// so the participant can retry.
    pub fn submit_failed(&mut self, question_id: &str, error: &Error) {
        warn!("Failed to submit response to question {question_id}: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(value: u8) -> Rating {
        Rating::try_from(value).unwrap()
    }

    fn loaded(request: LoadRequest, question: &Question, already_answered: bool) -> Loaded {
        Loaded {
            request,
            question: Some(question.clone()),
            already_answered,
        }
    }

    fn activate(session: &mut PollSession, question: &Question, already_answered: bool) {
        let request = session
            .pointer_changed(&ActivePointer::new(question.id.clone()))
            .unwrap();
        assert!(session.question_loaded(loaded(request, question, already_answered)));
    }

    #[test]
    fn starts_inactive() {
        let mut session = PollSession::new();
        assert_eq!(session.state(), &SessionState::NoActiveQuestion);
        assert!(session.pointer_changed(&ActivePointer::default()).is_none());
        assert!(matches!(session.begin_submit(), Err(SubmitError::NotAccepting)));
    }

    #[test]
    fn loading_a_question() {
        let question = Question::example2();
        let mut session = PollSession::new();
        let request = session
            .pointer_changed(&ActivePointer::new(question.id.clone()))
            .unwrap();
        assert_eq!(request.question_id, question.id);

        // Nothing can be submitted while the load is outstanding.
        assert!(session.is_loading());
        assert_eq!(session.state(), &SessionState::NoActiveQuestion);
        assert!(matches!(session.begin_submit(), Err(SubmitError::NotAccepting)));

        assert!(session.question_loaded(loaded(request, &question, false)));
        assert!(!session.is_loading());
        match session.state() {
            SessionState::Unanswered { ratings, missing, .. } => {
                assert_eq!(ratings, &vec![None; 3]);
                assert!(missing.is_empty());
            }
            state => panic!("Unexpected state {state:?}"),
        }
    }

    #[test]
    fn missing_question_is_inactive() {
        let mut session = PollSession::new();
        let request = session
            .pointer_changed(&ActivePointer::new("gone".to_string()))
            .unwrap();
        assert!(session.question_loaded(Loaded {
            request,
            question: None,
            already_answered: false,
        }));
        assert_eq!(session.state(), &SessionState::NoActiveQuestion);
    }

    #[test]
    fn existing_response_means_answered() {
        let question = Question::example1();
        let mut session = PollSession::new();
        activate(&mut session, &question, true);
        assert_eq!(
            session.state(),
            &SessionState::Answered {
                question: question.clone()
            }
        );
        assert!(matches!(
            session.set_rating(0, rating(3)),
            Err(SubmitError::NotAccepting)
        ));
    }

    #[test]
    fn incomplete_submission_flags_unrated_options() {
        let question = Question::example2();
        let mut session = PollSession::new();
        activate(&mut session, &question, false);

        session.set_rating(1, rating(4)).unwrap();
        match session.begin_submit() {
            Err(SubmitError::Unrated(missing)) => assert_eq!(missing, vec![0, 2]),
            other => panic!("Unexpected result {other:?}"),
        }

        // Rating an option clears its flag without touching the others.
        session.set_rating(0, rating(2)).unwrap();
        match session.state() {
            SessionState::Unanswered { ratings, missing, .. } => {
                assert_eq!(ratings, &vec![Some(rating(2)), Some(rating(4)), None]);
                assert_eq!(missing, &BTreeSet::from([2]));
            }
            state => panic!("Unexpected state {state:?}"),
        }

        assert!(matches!(
            session.set_rating(3, rating(1)),
            Err(SubmitError::NoSuchOption(3))
        ));

        session.set_rating(2, rating(5)).unwrap();
        let submission = session.begin_submit().unwrap();
        assert_eq!(submission.question_id, question.id);
        assert_eq!(submission.ratings, vec![rating(2), rating(4), rating(5)]);
        assert!(matches!(session.state(), SessionState::Unanswered { .. }));

        session.submit_succeeded(&question.id);
        assert!(matches!(session.state(), SessionState::Answered { .. }));
    }

    #[test]
    fn failed_write_allows_retry() {
        let question = Question::example1();
        let mut session = PollSession::new();
        activate(&mut session, &question, false);
        session.set_rating(0, rating(5)).unwrap();
        session.set_rating(1, rating(1)).unwrap();
        let submission = session.begin_submit().unwrap();

        let error = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "offline"));
        session.submit_failed(&submission.question_id, &error);
        assert!(matches!(session.state(), SessionState::Unanswered { .. }));
        assert_eq!(session.begin_submit().unwrap(), submission);
    }

    #[test]
    fn failed_load_keeps_partial_ratings() {
        let first = Question::example1();
        let second = Question::example2();
        let mut session = PollSession::new();
        activate(&mut session, &first, false);
        session.set_rating(0, rating(4)).unwrap();
        let before = session.state().clone();

        let error = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "offline"));
        let request = session
            .pointer_changed(&ActivePointer::new(second.id.clone()))
            .unwrap();
        let retry = session
            .pointer_changed(&ActivePointer::new(second.id.clone()))
            .unwrap();
        assert!(!session.load_failed(&request, &error));
        assert!(session.is_loading());
        assert!(session.load_failed(&retry, &error));
        assert!(!session.is_loading());
        assert_eq!(session.state(), &before);

        // A later successful load starts afresh.
        activate(&mut session, &second, false);
        let request = session
            .pointer_changed(&ActivePointer::new(first.id.clone()))
            .unwrap();
        assert!(session.load_failed(&request, &error));
        match session.state() {
            SessionState::Unanswered { question, ratings, .. } => {
                assert_eq!(question, &second);
                assert!(ratings.iter().all(Option::is_none));
            }
            state => panic!("Unexpected state {state:?}"),
        }
    }

    #[test]
    fn stale_loads_are_discarded() {
        let first = Question::example1();
        let second = Question::example2();
        let mut session = PollSession::new();

        let stale = session
            .pointer_changed(&ActivePointer::new(first.id.clone()))
            .unwrap();
        let fresh = session
            .pointer_changed(&ActivePointer::new(second.id.clone()))
            .unwrap();
        assert!(fresh.ticket > stale.ticket);

        // The newer load completes first; the older one must not clobber it.
        assert!(session.question_loaded(loaded(fresh, &second, false)));
        assert!(!session.question_loaded(loaded(stale, &first, false)));
        assert_eq!(session.state().question(), Some(&second));
    }

    #[test]
    fn null_pointer_cancels_pending_load() {
        let question = Question::example1();
        let mut session = PollSession::new();
        let request = session
            .pointer_changed(&ActivePointer::new(question.id.clone()))
            .unwrap();
        assert!(session.pointer_changed(&ActivePointer::default()).is_none());
        assert!(!session.question_loaded(loaded(request, &question, false)));
        assert_eq!(session.state(), &SessionState::NoActiveQuestion);
    }

    #[test]
    fn switching_questions_discards_answered_status() {
        let first = Question::example1();
        let second = Question::example2();
        let mut session = PollSession::new();
        activate(&mut session, &first, false);
        session.set_rating(0, rating(5)).unwrap();
        session.set_rating(1, rating(5)).unwrap();
        session.begin_submit().unwrap();
        session.submit_succeeded(&first.id);
        assert!(matches!(session.state(), SessionState::Answered { .. }));

        assert!(session.pointer_changed(&ActivePointer::default()).is_none());
        assert_eq!(session.state(), &SessionState::NoActiveQuestion);

        activate(&mut session, &second, false);
        match session.state() {
            SessionState::Unanswered { question, ratings, .. } => {
                assert_eq!(question, &second);
                assert_eq!(ratings.len(), 3);
            }
            state => panic!("Unexpected state {state:?}"),
        }

        // A late acknowledgement for the old question changes nothing.
        session.submit_succeeded(&first.id);
        assert!(matches!(session.state(), SessionState::Unanswered { .. }));
    }
}
