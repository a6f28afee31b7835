//! Per-browser session state.
//!
//! A session holds the user-entered key, the current upload, and the last
//! state of each flow. At most one flow runs per session; uploading a new
//! image (or a rejected upload attempt) discards the previous image, its
//! answer, and any answer still in flight for it.

use crate::flow::FlowState;
use crate::image::UploadedImage;
use crate::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Itinerary,
    ImageAnswer,
}

/// Identifies a running flow when its result is recorded.
#[derive(Debug, Clone)]
struct FlowTicket {
    kind: FlowKind,
    cancel: CancellationToken,
    id: Uuid,
    image_generation: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: Uuid,
    kind: FlowKind,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub entered_key: Option<String>,
    pub itinerary: FlowState,
    pub image: Option<UploadedImage>,
    pub image_answer: FlowState,
    image_generation: u64,
    in_flight: Option<InFlight>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: now,
            entered_key: None,
            itinerary: FlowState::Idle,
            image: None,
            image_answer: FlowState::Idle,
            image_generation: 0,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn state_mut(&mut self, kind: FlowKind) -> &mut FlowState {
        match kind {
            FlowKind::Itinerary => &mut self.itinerary,
            FlowKind::ImageAnswer => &mut self.image_answer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    idle_ttl: ChronoDuration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(ChronoDuration::hours(2))
    }
}

impl SessionStore {
    pub fn new(idle_ttl: ChronoDuration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Invariant("Session store lock poisoned".to_string()))
    }

    fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut sessions = self.lock()?;
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.last_active = Utc::now();
        Ok(f(session))
    }

    /// Create a fresh session, dropping idle ones that have nothing in flight.
    pub fn create(&self) -> Result<Session> {
        let mut sessions = self.lock()?;
        let cutoff = Utc::now() - self.idle_ttl;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active >= cutoff || s.is_busy());
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} idle session(s)", pruned);
        }

        let session = Session::new();
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Result<Session> {
        self.with_session(id, |s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_entered_key(&self, id: Uuid, key: String) -> Result<()> {
        self.with_session(id, |s| {
            s.entered_key = Some(key).filter(|k| !k.is_empty());
        })
    }

    /// Replace the session's image and reset everything derived from the old one.
    pub fn store_image(&self, id: Uuid, image: UploadedImage) -> Result<()> {
        self.replace_image(id, Some(image))
    }

    /// Drop the session's image and answer, e.g. after a rejected upload.
    pub fn clear_image(&self, id: Uuid) -> Result<()> {
        self.replace_image(id, None)
    }

    fn replace_image(&self, id: Uuid, image: Option<UploadedImage>) -> Result<()> {
        self.with_session(id, |s| {
            if let Some(flight) = s.in_flight.take_if(|f| f.kind == FlowKind::ImageAnswer) {
                tracing::info!("Image replaced; cancelling pending answer");
                flight.cancel.cancel();
            }
            s.image = image;
            s.image_answer = FlowState::Idle;
            s.image_generation += 1;
        })
    }

    /// Mark a flow as pending and snapshot the session under the same lock.
    ///
    /// Fails with [`Error::Busy`] when a flow is already running, and with a
    /// validation error when an image answer is requested without an image.
    pub fn begin_flow(&self, id: Uuid, kind: FlowKind) -> Result<ActiveFlow> {
        let (ticket, snapshot) = self.with_session(id, |s| {
            if s.is_busy() {
                return Err(Error::Busy);
            }
            if kind == FlowKind::ImageAnswer && s.image.is_none() {
                return Err(Error::Validation(
                    "Upload an image before asking about it".to_string(),
                ));
            }
            let flight = InFlight {
                id: Uuid::new_v4(),
                kind,
                cancel: CancellationToken::new(),
            };
            let ticket = FlowTicket {
                kind,
                cancel: flight.cancel.clone(),
                id: flight.id,
                image_generation: s.image_generation,
            };
            s.in_flight = Some(flight);
            *s.state_mut(kind) = FlowState::pending();
            Ok((ticket, s.clone()))
        })??;

        Ok(ActiveFlow {
            store: self.clone(),
            session_id: id,
            ticket,
            snapshot,
            finished: false,
        })
    }

    fn finish_flow(&self, id: Uuid, ticket: &FlowTicket, state: FlowState) -> Result<bool> {
        self.with_session(id, |s| {
            if s.in_flight.as_ref().is_some_and(|f| f.id == ticket.id) {
                s.in_flight = None;
            }
            let stale = ticket.kind == FlowKind::ImageAnswer
                && ticket.image_generation != s.image_generation;
            if stale {
                return false;
            }
            *s.state_mut(ticket.kind) = state;
            true
        })
    }

    /// Cancel the running flow, if any.
    pub fn cancel(&self, id: Uuid) -> Result<bool> {
        self.with_session(id, |s| match &s.in_flight {
            Some(flight) => {
                flight.cancel.cancel();
                true
            }
            None => false,
        })
    }
}

/// A pending flow. Dropping it without calling [`ActiveFlow::finish`]
/// cancels the call and records the flow as cancelled, so the session
/// never stays busy.
#[derive(Debug)]
pub struct ActiveFlow {
    store: SessionStore,
    session_id: Uuid,
    ticket: FlowTicket,
    snapshot: Session,
    finished: bool,
}

impl ActiveFlow {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.ticket.cancel
    }

    /// The session as it was when the flow started.
    pub fn session(&self) -> &Session {
        &self.snapshot
    }

    /// Record the flow's result. Returns `false` when the result was
    /// discarded because the image it answered has since been replaced.
    pub fn finish(mut self, state: FlowState) -> Result<bool> {
        self.finished = true;
        self.store.finish_flow(self.session_id, &self.ticket, state)
    }
}

impl Drop for ActiveFlow {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!(
            "Flow for session {} abandoned before completion",
            self.session_id
        );
        self.ticket.cancel.cancel();
        let state = FlowState::failed(&Error::Cancelled);
        if let Err(e) = self.store.finish_flow(self.session_id, &self.ticket, state) {
            tracing::warn!("Could not record abandoned flow: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{FlowOutput, ImageAnswer};

    fn image(name: &str) -> UploadedImage {
        UploadedImage {
            file_name: Some(name.to_string()),
            mime_type: "image/png",
            bytes: vec![1, 2, 3],
            width: 1,
            height: 1,
            resized: false,
        }
    }

    fn answer(text: &str) -> FlowState {
        FlowState::from_result(Ok(FlowOutput::ImageAnswer(ImageAnswer {
            question: None,
            answer: text.to_string(),
        })))
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let store = SessionStore::default();
        let err = store.get(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_begin_and_finish_flow() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;

        let flow = store.begin_flow(id, FlowKind::Itinerary).unwrap();
        assert!(store.get(id).unwrap().itinerary.is_pending());

        assert!(flow.finish(FlowState::Idle).unwrap());
        let session = store.get(id).unwrap();
        assert!(!session.is_busy());
        assert_eq!(session.itinerary, FlowState::Idle);
    }

    #[test]
    fn test_second_flow_while_busy_is_rejected() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.store_image(id, image("photo.png")).unwrap();

        let _flow = store.begin_flow(id, FlowKind::Itinerary).unwrap();
        let err = store.begin_flow(id, FlowKind::ImageAnswer).unwrap_err();
        assert!(matches!(err, Error::Busy));
    }

    #[test]
    fn test_dropped_flow_is_recorded_as_cancelled() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;

        let flow = store.begin_flow(id, FlowKind::Itinerary).unwrap();
        let token = flow.cancel_token().clone();
        drop(flow);

        assert!(token.is_cancelled());
        let session = store.get(id).unwrap();
        assert!(!session.is_busy());
        match session.itinerary {
            FlowState::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Cancelled),
            other => panic!("expected cancelled itinerary, got {:?}", other),
        }
        assert!(store.begin_flow(id, FlowKind::Itinerary).is_ok());
    }

    #[test]
    fn test_image_answer_requires_an_image() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;

        let err = store.begin_flow(id, FlowKind::ImageAnswer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let session = store.get(id).unwrap();
        assert!(!session.is_busy());
        assert_eq!(session.image_answer, FlowState::Idle);
    }

    #[test]
    fn test_flow_snapshot_carries_current_image() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.store_image(id, image("first.png")).unwrap();
        store.store_image(id, image("second.png")).unwrap();

        let flow = store.begin_flow(id, FlowKind::ImageAnswer).unwrap();
        let snapshot = flow.session().image.as_ref().unwrap();
        assert_eq!(snapshot.file_name.as_deref(), Some("second.png"));
    }

    #[test]
    fn test_new_upload_clears_previous_answer() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.store_image(id, image("first.png")).unwrap();

        let flow = store.begin_flow(id, FlowKind::ImageAnswer).unwrap();
        flow.finish(answer("first answer")).unwrap();
        assert!(matches!(
            store.get(id).unwrap().image_answer,
            FlowState::Succeeded { .. }
        ));

        store.store_image(id, image("second.png")).unwrap();
        let session = store.get(id).unwrap();
        assert_eq!(session.image_answer, FlowState::Idle);
        assert_eq!(
            session.image.unwrap().file_name.as_deref(),
            Some("second.png")
        );
    }

    #[test]
    fn test_clear_image_drops_image_and_answer() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.store_image(id, image("first.png")).unwrap();
        let flow = store.begin_flow(id, FlowKind::ImageAnswer).unwrap();
        flow.finish(answer("first answer")).unwrap();

        store.clear_image(id).unwrap();
        let session = store.get(id).unwrap();
        assert!(session.image.is_none());
        assert_eq!(session.image_answer, FlowState::Idle);
        assert!(store.begin_flow(id, FlowKind::ImageAnswer).is_err());
    }

    #[test]
    fn test_answer_for_replaced_image_is_discarded() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.store_image(id, image("first.png")).unwrap();

        let flow = store.begin_flow(id, FlowKind::ImageAnswer).unwrap();
        store.store_image(id, image("second.png")).unwrap();
        assert!(flow.cancel_token().is_cancelled());

        let recorded = flow.finish(answer("stale")).unwrap();
        assert!(!recorded);
        let session = store.get(id).unwrap();
        assert_eq!(session.image_answer, FlowState::Idle);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_cancel_signals_running_flow() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;

        assert!(!store.cancel(id).unwrap());
        let flow = store.begin_flow(id, FlowKind::Itinerary).unwrap();
        assert!(store.cancel(id).unwrap());
        assert!(flow.cancel_token().is_cancelled());
    }

    #[test]
    fn test_idle_sessions_are_pruned_on_create() {
        let store = SessionStore::new(ChronoDuration::zero());
        let first = store.create().unwrap().id;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.create().unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get(first).is_err());
    }

    #[test]
    fn test_blank_entered_key_is_cleared() {
        let store = SessionStore::default();
        let id = store.create().unwrap().id;
        store.set_entered_key(id, "AIzaKey".to_string()).unwrap();
        assert_eq!(store.get(id).unwrap().entered_key.as_deref(), Some("AIzaKey"));

        store.set_entered_key(id, String::new()).unwrap();
        assert!(store.get(id).unwrap().entered_key.is_none());
    }
}
