use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LeadCaptureConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::keyed_lock::KeyedLocks;
use crate::models::{Lead, LeadInput};
use crate::rate_limiter::{SaveThrottle, ThrottleConfig, ThrottleDecision};
use crate::repositories::LeadRepository;

#[derive(Debug, Clone)]
pub struct LeadCaptureSettings {
    pub throttle: ThrottleConfig,
    pub debounce: Duration,
    pub dedup_window: chrono::Duration,
    pub min_phone_length: usize,
    pub default_currency: String,
    /// Sessions untouched for this long are dropped by [`LeadCaptureService::prune_idle`]
    pub session_idle: chrono::Duration,
}

impl Default for LeadCaptureSettings {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            debounce: Duration::from_millis(2500),
            dedup_window: chrono::Duration::hours(24),
            min_phone_length: 5,
            default_currency: "BDT".to_string(),
            session_idle: chrono::Duration::hours(1),
        }
    }
}

impl LeadCaptureSettings {
    pub fn from_config(config: &LeadCaptureConfig, default_currency: &str) -> Self {
        Self {
            throttle: ThrottleConfig {
                max_per_window: config.max_saves_per_window,
                window: Duration::from_secs(config.window_secs),
                min_interval: Duration::from_millis(config.min_interval_ms),
            },
            debounce: Duration::from_millis(config.debounce_ms),
            dedup_window: chrono::Duration::hours(config.dedup_window_hours),
            min_phone_length: config.min_phone_length,
            default_currency: default_currency.to_string(),
            session_idle: chrono::Duration::from_std(Duration::from_secs(
                config.session_idle_secs,
            ))
            .unwrap_or_else(|_| chrono::Duration::days(30)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooSoon,
    WindowExhausted,
    NothingPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingPhone,
    PhoneTooShort,
}

/// Result of one lead save attempt.
///
/// Never an error: the checkout flow may ignore it entirely.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum LeadSaveOutcome {
    Created { lead_id: Uuid },
    Updated { lead_id: Uuid },
    Skipped(SkipReason),
    Rejected(RejectReason),
    Failed { message: String },
}

impl LeadSaveOutcome {
    pub fn lead_id(&self) -> Option<Uuid> {
        match self {
            LeadSaveOutcome::Created { lead_id } | LeadSaveOutcome::Updated { lead_id } => {
                Some(*lead_id)
            }
            _ => None,
        }
    }
}

/// Correlation state of one checkout session.
#[derive(Debug, Default)]
struct LeadSession {
    /// Id and token of the lead this session writes to
    lead: Option<(Uuid, String)>,
}

#[derive(Debug)]
struct SessionSlot {
    state: Arc<Mutex<LeadSession>>,
    last_touched: DateTime<Utc>,
}

impl SessionSlot {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LeadSession::default())),
            last_touched: now,
        }
    }
}

#[derive(Debug)]
struct PendingSave {
    generation: u64,
    input: LeadInput,
    handle: Option<JoinHandle<()>>,
}

/// Best-effort capture of in-progress checkouts.
#[derive(Clone)]
pub struct LeadCaptureService {
    repository: Arc<dyn LeadRepository>,
    throttle: Arc<SaveThrottle>,
    sessions: Arc<DashMap<String, SessionSlot>>,
    /// Serializes the dedup lookup and create for one phone number
    phone_locks: Arc<KeyedLocks<String>>,
    pending: Arc<DashMap<String, PendingSave>>,
    generation: Arc<AtomicU64>,
    settings: Arc<LeadCaptureSettings>,
    clock: Arc<dyn Clock>,
    event_sender: EventSender,
}

impl LeadCaptureService {
    pub fn new(
        repository: Arc<dyn LeadRepository>,
        settings: LeadCaptureSettings,
        clock: Arc<dyn Clock>,
        event_sender: EventSender,
    ) -> Self {
        let throttle = SaveThrottle::new(settings.throttle.clone(), clock.clone());
        Self {
            repository,
            throttle: Arc::new(throttle),
            sessions: Arc::new(DashMap::new()),
            phone_locks: Arc::new(KeyedLocks::new()),
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            settings: Arc::new(settings),
            clock,
            event_sender,
        }
    }

    /// Starts a checkout session and returns its correlation token.
    pub fn open_session(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions
            .insert(token.clone(), SessionSlot::new(self.clock.now()));
        debug!(token = %token, "lead session opened");
        token
    }

    /// Lead currently bound to the session, if any.
    pub async fn session_lead(&self, token: &str) -> Option<Uuid> {
        let session = self.sessions.get(token).map(|s| s.state.clone())?;
        let state = session.lock().await;
        state.lead.as_ref().map(|(id, _)| *id)
    }

    /// Session state for `token`, created on first use; marks the session active.
    fn session(&self, token: &str) -> Arc<Mutex<LeadSession>> {
        let now = self.clock.now();
        let mut slot = self
            .sessions
            .entry(token.to_string())
            .or_insert_with(|| SessionSlot::new(now));
        slot.last_touched = now;
        slot.state.clone()
    }

    fn check_phone(&self, input: &LeadInput) -> Option<RejectReason> {
        match input.normalized_phone() {
            None => Some(RejectReason::MissingPhone),
            Some(phone) if phone.chars().count() < self.settings.min_phone_length => {
                Some(RejectReason::PhoneTooShort)
            }
            Some(_) => None,
        }
    }

    /// Saves the checkout snapshot for `token`. `force` bypasses the throttle.
    #[instrument(skip(self, input))]
    pub async fn save(&self, token: &str, input: LeadInput, force: bool) -> LeadSaveOutcome {
        if let Some(reason) = self.check_phone(&input) {
            debug!(?reason, "lead save rejected");
            counter!("leads.saves.rejected", 1);
            return LeadSaveOutcome::Rejected(reason);
        }

        if !force {
            match self.throttle.check(token) {
                ThrottleDecision::Allowed { .. } => {}
                ThrottleDecision::TooSoon { retry_after } => {
                    debug!(?retry_after, "lead save skipped: too soon");
                    counter!("leads.saves.skipped", 1);
                    return LeadSaveOutcome::Skipped(SkipReason::TooSoon);
                }
                ThrottleDecision::WindowExhausted { retry_after } => {
                    debug!(?retry_after, "lead save skipped: window exhausted");
                    counter!("leads.saves.skipped", 1);
                    return LeadSaveOutcome::Skipped(SkipReason::WindowExhausted);
                }
            }
        }

        let session = self.session(token);
        let mut state = session.lock().await;
        match self.persist(&mut state, token, &input).await {
            Ok(outcome) => {
                match &outcome {
                    LeadSaveOutcome::Created { lead_id } => {
                        counter!("leads.saves.created", 1);
                        info!(lead_id = %lead_id, "lead captured");
                        self.event_sender.publish(Event::LeadCaptured {
                            lead_id: *lead_id,
                            created: true,
                        });
                    }
                    LeadSaveOutcome::Updated { lead_id } => {
                        counter!("leads.saves.updated", 1);
                        debug!(lead_id = %lead_id, "lead updated");
                        self.event_sender.publish(Event::LeadCaptured {
                            lead_id: *lead_id,
                            created: false,
                        });
                    }
                    _ => {}
                }
                outcome
            }
            Err(e) => {
                counter!("leads.saves.failed", 1);
                warn!(error = %e, "lead save failed");
                LeadSaveOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn persist(
        &self,
        state: &mut LeadSession,
        token: &str,
        input: &LeadInput,
    ) -> Result<LeadSaveOutcome, ServiceError> {
        let now = self.clock.now();
        let currency = self.settings.default_currency.as_str();

        if let Some((lead_id, _)) = state.lead.clone() {
            match self.repository.find_by_id(lead_id).await? {
                Some(mut lead) if !lead.is_converted() => {
                    lead.apply(input, currency, now);
                    self.repository.update(lead).await?;
                    return Ok(LeadSaveOutcome::Updated { lead_id });
                }
                // Gone or already converted elsewhere: start over
                _ => state.lead = None,
            }
        }

        let phone = input.normalized_phone().unwrap_or_default();
        let _phone_guard = self.phone_locks.lock(&phone.to_string()).await;
        let since = now - self.settings.dedup_window;
        if let Some(mut existing) = self.repository.find_open_by_phone(phone, since).await? {
            let lead_id = existing.id;
            debug!(lead_id = %lead_id, "reusing recent lead with same phone");
            state.lead = Some((lead_id, existing.token.clone()));
            existing.apply(input, currency, now);
            self.repository.update(existing).await?;
            return Ok(LeadSaveOutcome::Updated { lead_id });
        }

        let lead = Lead::from_input(Uuid::new_v4(), token.to_string(), input, currency, now);
        let lead = self.repository.insert(lead).await?;
        state.lead = Some((lead.id, lead.token.clone()));
        Ok(LeadSaveOutcome::Created { lead_id: lead.id })
    }

    /// Schedules a save after the quiet period, replacing any save still pending
    /// for the session.
    pub fn debounced_save(&self, token: &str, input: LeadInput) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.pending.insert(
            token.to_string(),
            PendingSave {
                generation,
                input,
                handle: None,
            },
        );
        if let Some(handle) = previous.and_then(|p| p.handle) {
            handle.abort();
        }

        let service = self.clone();
        let key = token.to_string();
        let delay = self.settings.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let due = service
                .pending
                .remove_if(&key, |_, p| p.generation == generation);
            if let Some((_, pending)) = due {
                service.save(&key, pending.input, false).await;
            }
        });

        match self.pending.get_mut(token) {
            Some(mut entry) if entry.generation == generation => entry.handle = Some(handle),
            Some(_) => handle.abort(),
            None => {}
        }
    }

    fn take_pending(&self, token: &str) -> Option<LeadInput> {
        let (_, pending) = self.pending.remove(token)?;
        if let Some(handle) = pending.handle {
            handle.abort();
        }
        Some(pending.input)
    }

    /// Saves the pending debounced snapshot right away, bypassing the throttle.
    pub async fn flush(&self, token: &str) -> LeadSaveOutcome {
        match self.take_pending(token) {
            Some(input) => self.save(token, input, true).await,
            None => LeadSaveOutcome::Skipped(SkipReason::NothingPending),
        }
    }

    /// Marks the session's lead converted by `order_id` and clears the session.
    ///
    /// Returns `false` when the session holds no lead or the stored token no longer
    /// matches.
    #[instrument(skip(self))]
    pub async fn convert(&self, token: &str, order_id: Uuid) -> Result<bool, ServiceError> {
        self.take_pending(token);
        let Some((_, slot)) = self.sessions.remove(token) else {
            return Ok(false);
        };
        let lead = slot.state.lock().await.lead.take();
        let Some((lead_id, lead_token)) = lead else {
            return Ok(false);
        };

        let converted = self
            .repository
            .mark_converted(lead_id, &lead_token, order_id, self.clock.now())
            .await?;
        if converted {
            counter!("leads.converted", 1);
            info!(lead_id = %lead_id, "lead converted");
            self.event_sender
                .publish(Event::LeadConverted { lead_id, order_id });
        } else {
            warn!(lead_id = %lead_id, "lead was not converted; token mismatch or already converted");
        }
        self.throttle.reset(token);
        Ok(converted)
    }

    /// Forgets sessions idle for longer than the configured timeout, unless a
    /// debounced save is still pending for them, and drops lapsed throttle entries.
    ///
    /// Returns the number of sessions removed.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let idle = self.settings.session_idle;
        let before = self.sessions.len();
        self.sessions.retain(|token, slot| {
            now - slot.last_touched < idle || self.pending.contains_key(token)
        });
        self.throttle.cleanup_expired();
        let removed = before.saturating_sub(self.sessions.len());
        debug!(
            removed,
            throttled = self.throttle.tracked_keys(),
            "idle lead sessions pruned"
        );
        removed
    }

    /// Number of sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops session state and any pending debounced save.
    pub fn close_session(&self, token: &str) -> bool {
        let had_pending = self.take_pending(token).is_some();
        self.throttle.reset(token);
        self.sessions.remove(token).is_some() || had_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repositories::InMemoryLeadRepository;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn service() -> (LeadCaptureService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (events, _rx) = EventSender::channel(16);
        let service = LeadCaptureService::new(
            Arc::new(InMemoryLeadRepository::new()),
            LeadCaptureSettings::default(),
            clock.clone(),
            events,
        );
        (service, clock)
    }

    fn input(phone: &str) -> LeadInput {
        LeadInput {
            phone: Some(phone.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn short_or_missing_phone_is_rejected() {
        let (service, _) = service();
        let token = service.open_session();
        assert_eq!(
            service.save(&token, LeadInput::default(), false).await,
            LeadSaveOutcome::Rejected(RejectReason::MissingPhone)
        );
        assert_eq!(
            service.save(&token, input(" 1234 "), false).await,
            LeadSaveOutcome::Rejected(RejectReason::PhoneTooShort)
        );
    }

    #[tokio::test]
    async fn forced_save_ignores_minimum_interval() {
        let (service, _) = service();
        let token = service.open_session();
        let first = service.save(&token, input("12345"), false).await;
        assert_matches!(first, LeadSaveOutcome::Created { .. });
        assert_eq!(
            service.save(&token, input("12345"), false).await,
            LeadSaveOutcome::Skipped(SkipReason::TooSoon)
        );
        assert_eq!(
            service.save(&token, input("12345"), true).await,
            LeadSaveOutcome::Updated {
                lead_id: first.lead_id().unwrap()
            }
        );
    }

    #[tokio::test]
    async fn flush_without_pending_snapshot_is_skipped() {
        let (service, _) = service();
        let token = service.open_session();
        assert_eq!(
            service.flush(&token).await,
            LeadSaveOutcome::Skipped(SkipReason::NothingPending)
        );
    }

    #[tokio::test]
    async fn idle_sessions_are_pruned() {
        let (service, clock) = service();
        let stale = service.open_session();
        service.save(&stale, input("01711000000"), false).await;
        // Saving under a token that was never opened still creates a session
        service.save("made-up-token", input("01811000000"), false).await;

        clock.advance(chrono::Duration::minutes(50));
        let fresh = service.open_session();
        let fresh_lead = service.save(&fresh, input("01911000000"), false).await;
        assert_eq!(service.session_count(), 3);

        clock.advance(chrono::Duration::minutes(20));
        assert_eq!(service.prune_idle(), 2);
        assert_eq!(service.session_count(), 1);
        assert_eq!(service.session_lead(&stale).await, None);
        assert_eq!(service.session_lead(&fresh).await, fresh_lead.lead_id());
    }

    #[tokio::test]
    async fn saving_refreshes_session_activity() {
        let (service, clock) = service();
        let token = service.open_session();
        clock.advance(chrono::Duration::minutes(50));
        service.save(&token, input("01711000000"), false).await;

        clock.advance(chrono::Duration::minutes(50));
        assert_eq!(service.prune_idle(), 0);
        assert!(service.session_lead(&token).await.is_some());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(LeadSaveOutcome::Skipped(SkipReason::TooSoon)).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["detail"], "too_soon");
    }
}
