//! End-to-end dialogue scenarios
//!
//! Exercises the orchestrator against an in-memory database and session
//! store with a canned classifier, covering the full booking flows.

use super::Orchestrator;
use crate::db::Database;
use crate::llm::{LlmError, SpecialtyClassifier};
use crate::session::{
    DialogueState, MemorySessionStore, SessionBackend, SessionRecord, Sessions, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Classifier returning a fixed label.
struct CannedClassifier(&'static str);

#[async_trait]
impl SpecialtyClassifier for CannedClassifier {
    async fn classify(&self, _symptoms: &str) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

/// Classifier that fails every call with the given error, counting calls.
struct FailingClassifier {
    calls: Arc<AtomicU32>,
    error: fn() -> LlmError,
}

#[async_trait]
impl SpecialtyClassifier for FailingClassifier {
    async fn classify(&self, _symptoms: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

/// Session backend whose reads always fail; writes land in a real map.
struct BrokenLoadStore {
    inner: MemorySessionStore,
}

#[async_trait]
impl SessionBackend for BrokenLoadStore {
    async fn load(&self, _id: &str) -> StoreResult<Option<SessionRecord>> {
        Err(StoreError::Serde(
            serde_json::from_str::<SessionRecord>("{").unwrap_err(),
        ))
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        self.inner.save(id, record).await
    }

    async fn clear(&self, id: &str) -> StoreResult<()> {
        self.inner.clear(id).await
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        self.inner.list_ids().await
    }
}

struct Harness {
    orchestrator: Orchestrator,
    sessions: Sessions,
    db: Database,
}

impl Harness {
    fn new(classifier: Arc<dyn SpecialtyClassifier>) -> Self {
        let db = Database::open_in_memory().unwrap();
        let sessions = Sessions::new(Arc::new(MemorySessionStore::new()));
        let orchestrator = Orchestrator::new(sessions.clone(), classifier, db.clone());
        Self {
            orchestrator,
            sessions,
            db,
        }
    }

    /// Orthopedics: Dr X with three slots, Dr Y with one.
    fn with_ortho_clinic() -> Self {
        let harness = Self::new(Arc::new(CannedClassifier("Orthopedics")));
        let dr_x = harness.db.insert_doctor("Dr X", "Orthopedics").unwrap();
        let dr_y = harness.db.insert_doctor("Dr Y", "Orthopedics").unwrap();
        harness.db.insert_slot(dr_x, "2026-09-01", "09:00", "09:30").unwrap();
        harness.db.insert_slot(dr_x, "2026-09-01", "10:00", "10:30").unwrap();
        harness.db.insert_slot(dr_x, "2026-09-02", "09:00", "09:30").unwrap();
        harness.db.insert_slot(dr_y, "2026-09-01", "11:00", "11:30").unwrap();
        harness
    }

    async fn say(&self, input: &str) -> String {
        self.orchestrator.handle("sess-1", input).await
    }

    async fn state(&self) -> DialogueState {
        self.sessions.load("sess-1").await.state
    }
}

#[tokio::test]
async fn happy_path_books_and_clears_session() {
    let h = Harness::with_ortho_clinic();

    let reply = h.say("hi").await;
    assert!(reply.contains("health issue"), "greeting was: {reply}");

    let reply = h.say("knee pain").await;
    assert!(reply.contains("doctor"), "doctor prompt was: {reply}");
    assert!(reply.contains("Dr X") && reply.contains("Dr Y"));

    let reply = h.say("Dr X").await;
    assert!(reply.contains("available"), "slot offer was: {reply}");
    assert!(reply.contains("2026-09-01") && reply.contains("09:00"));

    let reply = h.say("yes").await;
    assert!(reply.contains("name"), "details prompt was: {reply}");

    let reply = h.say("John Doe 1234567890").await;
    assert!(reply.contains("confirmed"), "confirmation was: {reply}");

    // Session is gone: the next turn starts a brand-new conversation.
    assert_eq!(h.state().await, DialogueState::Init);
    let reply = h.say("hello again").await;
    assert!(reply.contains("health issue"));

    // The booked slot was consumed.
    let dr_x = &h.db.doctors_by_speciality("Orthopedics").unwrap()[0];
    assert!(!h
        .db
        .available_slots(dr_x.id)
        .unwrap()
        .iter()
        .any(|s| s.date == "2026-09-01" && s.start_time == "09:00"));
}

#[tokio::test]
async fn unknown_doctor_reprompts_without_changing_state() {
    let h = Harness::with_ortho_clinic();
    h.say("hi").await;
    h.say("knee pain").await;

    let reply = h.say("Dr Nobody").await;
    assert!(reply.contains("couldn't find"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::SelectingDoctor);

    // Matching is case-sensitive and exact.
    let reply = h.say("dr x").await;
    assert!(reply.contains("couldn't find"));

    let reply = h.say("Dr X").await;
    assert!(reply.contains("available"));
}

#[tokio::test]
async fn classifier_failure_falls_back_to_general_medicine() {
    let calls = Arc::new(AtomicU32::new(0));
    let h = Harness::new(Arc::new(FailingClassifier {
        calls: calls.clone(),
        error: || LlmError::network("connection refused"),
    }));
    let dr = h.db.insert_doctor("Dr Wong", "General Medicine").unwrap();
    h.db.insert_slot(dr, "2026-09-01", "09:00", "09:30").unwrap();

    h.say("hi").await;
    let reply = h.say("something vague").await;
    assert!(reply.contains("Dr Wong"), "reply was: {reply}");
    assert_eq!(
        h.sessions.load("sess-1").await.speciality.as_deref(),
        Some("General Medicine")
    );
    // A transient failure is worth the full retry budget.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn auth_failures_default_without_retrying() {
    let calls = Arc::new(AtomicU32::new(0));
    let h = Harness::new(Arc::new(FailingClassifier {
        calls: calls.clone(),
        error: || LlmError::auth("no API key configured"),
    }));
    let dr = h.db.insert_doctor("Dr Wong", "General Medicine").unwrap();
    h.db.insert_slot(dr, "2026-09-01", "09:00", "09:30").unwrap();

    h.say("hi").await;
    let reply = h.say("knee pain").await;
    assert!(reply.contains("Dr Wong"), "reply was: {reply}");
    // A missing key cannot heal; one attempt, no backoff sleeps.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_label_is_sanitized_to_default() {
    let h = Harness::new(Arc::new(CannedClassifier("Orthopedics!!! call 911")));
    let dr = h.db.insert_doctor("Dr Wong", "General Medicine").unwrap();
    h.db.insert_slot(dr, "2026-09-01", "09:00", "09:30").unwrap();

    h.say("hi").await;
    let reply = h.say("knee pain").await;
    assert!(reply.contains("Dr Wong"), "reply was: {reply}");
}

#[tokio::test]
async fn empty_speciality_apologizes_and_clears() {
    let h = Harness::new(Arc::new(CannedClassifier("Cardiology")));
    h.say("hi").await;

    let reply = h.say("chest pain").await;
    assert!(reply.contains("Sorry"), "reply was: {reply}");

    // Next load for the id is a fresh INIT record.
    assert_eq!(h.state().await, DialogueState::Init);
    let reply = h.say("hello").await;
    assert!(reply.contains("health issue"));
}

#[tokio::test]
async fn speciality_with_no_open_slots_clears_too() {
    let h = Harness::new(Arc::new(CannedClassifier("Dermatology")));
    // A doctor exists but has nothing open.
    h.db.insert_doctor("Dr Jones", "Dermatology").unwrap();

    h.say("hi").await;
    let reply = h.say("skin rash").await;
    assert!(reply.contains("Sorry"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::Init);
}

#[tokio::test]
async fn declined_slots_cycle_without_repeats_until_exhausted() {
    let h = Harness::with_ortho_clinic();
    h.say("hi").await;
    h.say("knee pain").await;

    let mut offered = Vec::new();
    let first = h.say("Dr X").await;
    offered.push(first);

    // Dr X has three slots; decline them all.
    for _ in 0..2 {
        let reply = h.say("no").await;
        assert!(reply.contains("Is that fine?"), "expected another offer: {reply}");
        offered.push(reply);
    }

    // Each offer names a distinct (date, time) pair.
    let distinct: std::collections::HashSet<&String> = offered.iter().collect();
    assert_eq!(distinct.len(), 3, "offers repeated: {offered:?}");

    // Declining the last slot terminates the conversation.
    let reply = h.say("no").await;
    assert!(reply.contains("no other open slots"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::Init);
}

#[tokio::test]
async fn fully_booked_doctor_offers_single_alternative() {
    let h = Harness::new(Arc::new(CannedClassifier("Orthopedics")));
    h.db.insert_doctor("Dr X", "Orthopedics").unwrap();
    let dr_y = h.db.insert_doctor("Dr Y", "Orthopedics").unwrap();
    h.db.insert_slot(dr_y, "2026-09-01", "11:00", "11:30").unwrap();

    h.say("hi").await;
    h.say("knee pain").await;

    let reply = h.say("Dr X").await;
    assert!(reply.contains("Dr Y"), "alternative offer was: {reply}");
    assert_eq!(h.state().await, DialogueState::OfferingAlternativeDoctor);

    // One alternative: an affirmative auto-selects it and offers its slot.
    let reply = h.say("yes").await;
    assert!(reply.contains("Dr Y") && reply.contains("available"), "reply was: {reply}");
    let session = h.sessions.load("sess-1").await;
    assert_eq!(session.doctor_name.as_deref(), Some("Dr Y"));
    assert_eq!(session.state, DialogueState::CheckingAvailability);
}

#[tokio::test]
async fn multiple_alternatives_reprompt_for_a_name() {
    let h = Harness::new(Arc::new(CannedClassifier("Orthopedics")));
    h.db.insert_doctor("Dr X", "Orthopedics").unwrap();
    let dr_y = h.db.insert_doctor("Dr Y", "Orthopedics").unwrap();
    let dr_z = h.db.insert_doctor("Dr Z", "Orthopedics").unwrap();
    h.db.insert_slot(dr_y, "2026-09-01", "11:00", "11:30").unwrap();
    h.db.insert_slot(dr_z, "2026-09-02", "09:00", "09:30").unwrap();

    h.say("hi").await;
    h.say("knee pain").await;
    h.say("Dr X").await;

    let reply = h.say("yes").await;
    assert!(reply.contains("Which doctor"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::SelectingDoctor);

    let reply = h.say("Dr Z").await;
    assert!(reply.contains("available") && reply.contains("2026-09-02"));
}

#[tokio::test]
async fn declining_alternatives_ends_the_conversation() {
    let h = Harness::new(Arc::new(CannedClassifier("Orthopedics")));
    h.db.insert_doctor("Dr X", "Orthopedics").unwrap();
    let dr_y = h.db.insert_doctor("Dr Y", "Orthopedics").unwrap();
    h.db.insert_slot(dr_y, "2026-09-01", "11:00", "11:30").unwrap();

    h.say("hi").await;
    h.say("knee pain").await;
    h.say("Dr X").await;

    let reply = h.say("no").await;
    assert!(reply.contains("new conversation"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::Init);
}

#[tokio::test]
async fn booking_conflict_keeps_the_session() {
    let h = Harness::with_ortho_clinic();
    h.say("hi").await;
    h.say("knee pain").await;
    h.say("Dr X").await;
    h.say("yes").await;

    // Another flow takes the slot underneath this session.
    let dr_x = h.db.doctors_by_speciality("Orthopedics").unwrap()[0].id;
    h.db.book_appointment(dr_x, "Jane Roe", "0987654321", "2026-09-01", "09:00")
        .unwrap();

    let reply = h.say("John Doe 1234567890").await;
    assert!(reply.contains("taken"), "reply was: {reply}");

    // Not cleared: the user can retry from the same state.
    assert_eq!(h.state().await, DialogueState::CollectingPatientDetails);
}

#[tokio::test]
async fn single_token_details_book_with_empty_phone() {
    let h = Harness::with_ortho_clinic();
    h.say("hi").await;
    h.say("knee pain").await;
    h.say("Dr X").await;
    h.say("ok").await;

    let reply = h.say("Madonna").await;
    assert!(reply.contains("confirmed"), "reply was: {reply}");
}

#[tokio::test]
async fn stale_state_resets_to_init() {
    let h = Harness::with_ortho_clinic();

    let mut session = h.sessions.load("sess-1").await;
    session.state = DialogueState::Booked;
    h.sessions.save("sess-1", &session).await.unwrap();

    let reply = h.say("anything").await;
    assert!(reply.contains("start over"), "reply was: {reply}");
    assert_eq!(h.state().await, DialogueState::Init);
}

#[tokio::test]
async fn broken_session_reads_never_surface_to_the_user() {
    let db = Database::open_in_memory().unwrap();
    let sessions = Sessions::new(Arc::new(BrokenLoadStore {
        inner: MemorySessionStore::new(),
    }));
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        Arc::new(CannedClassifier("Orthopedics")),
        db,
    );

    // Every load errors underneath; the turn still reads as a fresh start.
    let reply = orchestrator.handle("sess-1", "hi").await;
    assert!(reply.contains("health issue"), "reply was: {reply}");
}

#[tokio::test]
async fn each_turn_refreshes_the_session_clock() {
    let h = Harness::with_ortho_clinic();

    h.say("hi").await;
    let first = h.sessions.load("sess-1").await.last_touched;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    h.say("knee pain").await;
    let second = h.sessions.load("sess-1").await.last_touched;

    assert!(second > first, "turn did not refresh last_touched");
}
