//! Dialogue orchestrator
//!
//! Stateless between calls: each `handle` loads the session, applies one
//! transition, talks to collaborators as needed, persists or clears the
//! session, and returns a reply. Callers must serialize calls per session
//! id; concurrent calls for the same id race on load-modify-save.

#[cfg(test)]
mod scenarios;

use crate::db::{Database, DbError, Doctor, Slot};
use crate::llm::{LlmError, SpecialtyClassifier, DEFAULT_SPECIALITY};
use crate::retry::with_fixed_backoff;
use crate::session::{DialogueState, DoctorRef, SessionRecord, Sessions, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CLASSIFIER_MAX_ATTEMPTS: u32 = 3;
const CLASSIFIER_BACKOFF: Duration = Duration::from_millis(500);

const GENERIC_APOLOGY: &str =
    "Sorry, something went wrong while processing your request. Could you please try again later?";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Drives one conversation turn at a time.
pub struct Orchestrator {
    sessions: Sessions,
    classifier: Arc<dyn SpecialtyClassifier>,
    db: Database,
}

impl Orchestrator {
    pub fn new(sessions: Sessions, classifier: Arc<dyn SpecialtyClassifier>, db: Database) -> Self {
        Self {
            sessions,
            classifier,
            db,
        }
    }

    /// Process one user turn. Never fails: internal errors are logged and
    /// converted to a generic apology, leaving whatever was last saved
    /// intact for the next call.
    pub async fn handle(&self, session_id: &str, user_input: &str) -> String {
        match self.step(session_id, user_input).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "turn failed");
                GENERIC_APOLOGY.to_string()
            }
        }
    }

    async fn step(&self, session_id: &str, user_input: &str) -> Result<String, OrchestratorError> {
        let session = self.sessions.load(session_id).await;
        tracing::debug!(session_id = %session_id, state = ?session.state, "handling turn");

        match session.state {
            DialogueState::Init => self.greet(session_id, session).await,
            DialogueState::CollectingSymptoms => {
                self.collect_symptoms(session_id, session, user_input).await
            }
            DialogueState::SelectingDoctor => {
                self.select_doctor(session_id, session, user_input).await
            }
            DialogueState::OfferingAlternativeDoctor => {
                self.offer_alternative(session_id, session, user_input).await
            }
            DialogueState::CheckingAvailability => {
                self.check_availability(session_id, session, user_input).await
            }
            DialogueState::CollectingPatientDetails => {
                self.collect_patient_details(session_id, session, user_input)
                    .await
            }
            // Terminal or stale states restart the conversation.
            DialogueState::Booked => self.reset(session_id).await,
        }
    }

    async fn greet(
        &self,
        session_id: &str,
        mut session: SessionRecord,
    ) -> Result<String, OrchestratorError> {
        session.state = DialogueState::CollectingSymptoms;
        self.persist(session_id, &mut session).await?;
        Ok("Hello! Please describe your health issue.".to_string())
    }

    async fn collect_symptoms(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        user_input: &str,
    ) -> Result<String, OrchestratorError> {
        session.symptoms = Some(user_input.to_string());

        // Auth and bad-request failures will not heal on retry; only
        // transient kinds earn further attempts.
        let speciality = match with_fixed_backoff(
            CLASSIFIER_MAX_ATTEMPTS,
            CLASSIFIER_BACKOFF,
            |err: &LlmError| err.kind.is_retryable(),
            || self.classifier.classify(user_input),
        )
        .await
        {
            Ok(label) => sanitize_speciality(&label),
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "classifier unavailable, defaulting speciality"
                );
                DEFAULT_SPECIALITY.to_string()
            }
        };
        tracing::info!(session_id = %session_id, speciality = %speciality, "inferred speciality");
        session.speciality = Some(speciality.clone());

        let doctors = self.db.doctors_by_speciality(&speciality)?;
        if !self.any_doctor_has_slots(&doctors)? {
            self.sessions.clear(session_id).await?;
            return Ok(format!(
                "Sorry, we don't have any {speciality} specialists available at the moment. \
                 Please start a new conversation to try again later."
            ));
        }

        let names = doctors
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ");
        session.state = DialogueState::SelectingDoctor;
        self.persist(session_id, &mut session).await?;
        Ok(format!(
            "Thank you. Which doctor would you like to meet? ({names})"
        ))
    }

    async fn select_doctor(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        user_input: &str,
    ) -> Result<String, OrchestratorError> {
        let speciality = session.speciality.clone().unwrap_or_default();
        let doctors = self.db.doctors_by_speciality(&speciality)?;

        // Exact, case-sensitive match against the directory.
        let Some(doctor) = doctors.iter().find(|d| d.name == user_input) else {
            return Ok(format!(
                "Sorry, I couldn't find {user_input}. Please select a valid doctor."
            ));
        };

        let slots = self.db.available_slots(doctor.id)?;
        if let Some(first) = slots.first() {
            session.select_doctor(doctor.id, &doctor.name);
            return self
                .offer_slot(session_id, session, first.clone(), &doctor.name)
                .await;
        }

        // Chosen doctor is fully booked. Offer siblings that still have
        // open slots, or give up.
        let siblings: Vec<DoctorRef> = doctors
            .iter()
            .filter(|d| d.id != doctor.id)
            .filter_map(|d| match self.db.has_open_slots(d.id) {
                Ok(true) => Some(Ok(DoctorRef {
                    id: d.id,
                    name: d.name.clone(),
                })),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_, _>>()?;

        if siblings.is_empty() {
            self.sessions.clear(session_id).await?;
            return Ok(format!(
                "Sorry, {} has no available slots at the moment, and no other {speciality} \
                 doctors are free either. Please try again later.",
                doctor.name
            ));
        }

        let names = siblings
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ");
        let reply = format!(
            "Sorry, {} has no available slots at the moment. Would you like to see {names} instead? (yes/no)",
            doctor.name
        );
        session.alternative_doctors = siblings;
        session.state = DialogueState::OfferingAlternativeDoctor;
        self.persist(session_id, &mut session).await?;
        Ok(reply)
    }

    async fn offer_alternative(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        user_input: &str,
    ) -> Result<String, OrchestratorError> {
        if !is_affirmative(user_input) {
            self.sessions.clear(session_id).await?;
            return Ok(
                "No problem. Feel free to start a new conversation whenever you'd like to book."
                    .to_string(),
            );
        }

        let alternatives = std::mem::take(&mut session.alternative_doctors);
        match alternatives.as_slice() {
            [] => self.reset(session_id).await,
            [only] => {
                let slots = self.db.available_slots(only.id)?;
                let Some(first) = slots.first().cloned() else {
                    // The slot disappeared between the offer and the answer.
                    self.sessions.clear(session_id).await?;
                    return Ok(format!(
                        "Sorry, {} no longer has available slots. Please try again later.",
                        only.name
                    ));
                };
                let name = only.name.clone();
                session.select_doctor(only.id, &only.name);
                self.offer_slot(session_id, session, first, &name).await
            }
            several => {
                let names = several
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" / ");
                session.state = DialogueState::SelectingDoctor;
                self.persist(session_id, &mut session).await?;
                Ok(format!(
                    "Great! Which doctor would you like to meet? ({names})"
                ))
            }
        }
    }

    async fn check_availability(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        user_input: &str,
    ) -> Result<String, OrchestratorError> {
        if is_affirmative(user_input) {
            session.state = DialogueState::CollectingPatientDetails;
            self.persist(session_id, &mut session).await?;
            return Ok("Great! May I have your name and contact number?".to_string());
        }

        let (Some(doctor_id), Some(date), Some(time)) = (
            session.doctor_id,
            session.date.clone(),
            session.time.clone(),
        ) else {
            return self.reset(session_id).await;
        };

        // Declined: remember the pair so it is never offered again for
        // this doctor, then cycle to the next open slot.
        session.rejected_slots.insert((date, time));

        let next = self
            .db
            .available_slots(doctor_id)?
            .into_iter()
            .find(|s| {
                !session
                    .rejected_slots
                    .contains(&(s.date.clone(), s.start_time.clone()))
            });

        let doctor_name = session
            .doctor_name
            .clone()
            .unwrap_or_else(|| "the doctor".to_string());
        match next {
            Some(slot) => self.offer_slot(session_id, session, slot, &doctor_name).await,
            None => {
                self.sessions.clear(session_id).await?;
                Ok(format!(
                    "Sorry, {doctor_name} has no other open slots at the moment. \
                     Please start a new conversation to try a different doctor."
                ))
            }
        }
    }

    async fn collect_patient_details(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        user_input: &str,
    ) -> Result<String, OrchestratorError> {
        let (name, phone) = split_patient_details(user_input);
        session.patient_name = Some(name.clone());
        session.phone = Some(phone.clone());

        let (Some(doctor_id), Some(date), Some(time)) = (
            session.doctor_id,
            session.date.clone(),
            session.time.clone(),
        ) else {
            return self.reset(session_id).await;
        };

        match self.db.book_appointment(doctor_id, &name, &phone, &date, &time) {
            Ok(()) => {
                let doctor_name = session
                    .doctor_name
                    .clone()
                    .unwrap_or_else(|| "the doctor".to_string());
                let speciality = session.speciality.clone().unwrap_or_default();
                self.sessions.clear(session_id).await?;
                Ok(format!(
                    "Perfect! Your appointment with {doctor_name} ({speciality}) is confirmed \
                     for {date} at {time}. You'll receive a confirmation shortly. Thank you for \
                     choosing Super Clinic!\n\nYour session has been closed. Start a new \
                     conversation to book another appointment."
                ))
            }
            Err(DbError::SlotTaken { .. }) => {
                tracing::warn!(session_id = %session_id, doctor_id, %date, %time, "booking conflict");
                // Session kept so the user can retry or restart.
                Ok(
                    "Sorry, that slot has just been taken by someone else. Please send your \
                     details again to retry, or start a new conversation."
                        .to_string(),
                )
            }
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "booking failed");
                Ok(format!(
                    "Sorry, there was an error booking your appointment: {err}"
                ))
            }
        }
    }

    /// Offer a slot for the (already selected) doctor and move to
    /// availability confirmation.
    async fn offer_slot(
        &self,
        session_id: &str,
        mut session: SessionRecord,
        slot: Slot,
        doctor_name: &str,
    ) -> Result<String, OrchestratorError> {
        session.date = Some(slot.date.clone());
        session.time = Some(slot.start_time.clone());
        session.state = DialogueState::CheckingAvailability;
        self.persist(session_id, &mut session).await?;
        Ok(format!(
            "{doctor_name} is available on {} at {}. Is that fine?",
            slot.date, slot.start_time
        ))
    }

    async fn reset(&self, session_id: &str) -> Result<String, OrchestratorError> {
        let mut session = SessionRecord::default();
        self.persist(session_id, &mut session).await?;
        Ok("Let's start over. Please describe your health issue.".to_string())
    }

    /// Stamp the record and write it through the store.
    async fn persist(
        &self,
        session_id: &str,
        session: &mut SessionRecord,
    ) -> Result<(), OrchestratorError> {
        session.touch();
        self.sessions.save(session_id, session).await?;
        Ok(())
    }

    fn any_doctor_has_slots(&self, doctors: &[Doctor]) -> Result<bool, OrchestratorError> {
        for doctor in doctors {
            if self.db.has_open_slots(doctor.id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

const MAX_SPECIALITY_CHARS: usize = 50;

/// Validate a classifier label; malformed output falls back to the default
/// speciality rather than surfacing an error.
fn sanitize_speciality(label: &str) -> String {
    let trimmed = label.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_SPECIALITY_CHARS
        && trimmed.chars().all(|c| c.is_alphabetic() || c == ' ');
    if valid {
        trimmed.to_string()
    } else {
        tracing::warn!(label = %label, "invalid classifier output, using default speciality");
        DEFAULT_SPECIALITY.to_string()
    }
}

/// Affirmative tokens for binary-decision states. Anything else is a no.
fn is_affirmative(input: &str) -> bool {
    matches!(
        input.trim().to_lowercase().as_str(),
        "yes" | "y" | "ok" | "fine" | "sure"
    )
}

/// Split "<name> <phone>" on whitespace: the last token is the phone, the
/// rest is the name. A single token is treated entirely as the name.
fn split_patient_details(input: &str) -> (String, String) {
    let parts: Vec<&str> = input.split_whitespace().collect();
    match parts.as_slice() {
        [] => (String::new(), String::new()),
        [name] => ((*name).to_string(), String::new()),
        [name_parts @ .., phone] => (name_parts.join(" "), (*phone).to_string()),
    }
}
