//! The broadcast broker.
//!
//! Every `broadcast_*` call builds exactly one message and runs admission
//! synchronously:
//!
//! 1. reject if disabled, below `min_display_priority`, or on a channel not
//!    in the allow-list (the built message is still returned);
//! 2. push onto the pending queue (priority-sorted, stable);
//! 3. pop the head, make it current, append it to history, fan out to
//!    listeners;
//! 4. schedule TTL auto-dismiss / auto-acknowledge.
//!
//! One admission drains one queue element, so the queue reorders only when
//! several messages are pushed before a dispatch. That matches the
//! original delivery order under bursty input and is kept deliberately.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::BroadcastHistory;
use super::listeners::{notify_all, Listener, ListenerRegistry, Subscription};
use super::queue::PendingQueue;
use super::scheduler::{spawn_after, Timers};
use crate::config::defaults::{
    DJ_ANNOUNCEMENT_TTL_MS, SYSTEM_TTL_MS, WEATHER_DANGER_KP, WEATHER_DANGER_SPEED,
    WEATHER_UPDATE_TTL_MS, WEATHER_WARNING_KP, WEATHER_WARNING_SPEED,
};
use crate::config::{BroadcastConfig, BroadcastConfigUpdate};
use crate::severity::{calculate_ttl, severity_to_priority, severity_to_tone};
use crate::types::{
    finite, BroadcastHistoryEntry, BroadcastMessage, BroadcastPriority, BroadcastTone,
    BroadcastType, EventSeverity, EventType, Snapshot, SpaceWeatherEvent, UserAction,
};

/// Headline and icon for each event type.
const fn event_presentation(kind: EventType) -> (&'static str, &'static str) {
    match kind {
        EventType::MajorFlare => ("Major Solar Flare", "☀️"),
        EventType::GeomagneticStorm => ("Geomagnetic Storm", "🌐"),
        EventType::SevereStorm => ("Severe Geomagnetic Storm", "⚡"),
        EventType::HighSolarWind => ("High-Speed Solar Wind", "💨"),
        EventType::ExtremeSolarWind => ("Extreme Solar Wind", "🌪️"),
        EventType::CompoundEvent => ("Multiple Hazards Active", "🚨"),
    }
}

/// Counters and gauges reported by `get_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStats {
    pub total_broadcasts: u64,
    pub rejected: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub history_size: usize,
    pub queue_length: usize,
    pub subscribers: usize,
    pub current_broadcast_id: Option<String>,
    pub last_broadcast_at: Option<DateTime<Utc>>,
    pub uptime_ms: u64,
}

#[derive(Debug)]
struct CurrentBroadcast {
    message: BroadcastMessage,
    since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    rejected: u64,
    by_type: BTreeMap<String, u64>,
    by_priority: BTreeMap<String, u64>,
    last_broadcast_at: Option<DateTime<Utc>>,
}

struct ServiceState {
    config: BroadcastConfig,
    queue: PendingQueue,
    history: BroadcastHistory,
    current: Option<CurrentBroadcast>,
    timers: Timers,
    counters: Counters,
}

impl ServiceState {
    fn rejection(&self, message: &BroadcastMessage) -> Option<&'static str> {
        if !self.config.enabled {
            Some("service disabled")
        } else if message.priority < self.config.min_display_priority {
            Some("below minimum display priority")
        } else if !self.config.allows(message.broadcast_type) {
            Some("channel not allowed")
        } else {
            None
        }
    }

    /// Close the current broadcast's history entry. `None` means superseded.
    fn close_current(&mut self, action: Option<UserAction>, now: DateTime<Utc>) {
        let Some(current) = self.current.take() else {
            return;
        };
        let shown_ms = now
            .signed_duration_since(current.since)
            .num_milliseconds()
            .max(0) as u64;
        if let Some(entry) = self.history.find_mut(&current.message.id) {
            entry.displayed_for = shown_ms;
            if action == Some(UserAction::Acknowledged) {
                entry.broadcast.acknowledged = true;
            }
            if entry.user_action.is_none() {
                entry.user_action = action;
            }
        }
    }
}

struct Inner {
    state: Mutex<ServiceState>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    started: Instant,
}

/// Cheap-to-clone handle to one broker instance.
#[derive(Clone)]
pub struct BroadcastService {
    inner: Arc<Inner>,
}

impl Default for BroadcastService {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

impl std::fmt::Debug for BroadcastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastService")
            .field("subscribers", &self.subscriber_count())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl BroadcastService {
    pub fn new(config: BroadcastConfig) -> Self {
        let history = BroadcastHistory::new(config.max_history_size);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ServiceState {
                    config,
                    queue: PendingQueue::new(),
                    history,
                    current: None,
                    timers: Timers::default(),
                    counters: Counters::default(),
                }),
                listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
                started: Instant::now(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.inner.state.lock().unwrap_or_else(|e| {
            warn!("Mutex poisoned on broadcast state, recovering");
            e.into_inner()
        })
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.inner.listeners.lock().unwrap_or_else(|e| {
            warn!("Mutex poisoned on listener registry, recovering");
            e.into_inner()
        })
    }

    // ========================================================================
    // Factories
    // ========================================================================

    /// Announce a detected event.
    pub fn broadcast_event(&self, event: &SpaceWeatherEvent) -> BroadcastMessage {
        let (headline, icon) = event_presentation(event.event_type);
        let priority = severity_to_priority(event.severity);
        let mut message = Self::build(
            BroadcastType::Event,
            priority,
            severity_to_tone(event.severity),
            headline,
            event.description.clone(),
            calculate_ttl(priority),
            icon,
        );
        message.tags = vec![
            event.event_type.to_string().to_lowercase(),
            event.severity.to_string().to_lowercase(),
        ];
        message.event = Some(event.clone());
        self.admit(message)
    }

    /// Periodic conditions summary.
    pub fn broadcast_weather_update(&self, snapshot: &Snapshot) -> BroadcastMessage {
        let kp = snapshot.kp_index();
        let speed = snapshot.wind_speed();
        let exceeds = |kp_limit: f64, speed_limit: f64| {
            kp.is_some_and(|k| k >= kp_limit) || speed.is_some_and(|s| s >= speed_limit)
        };
        let tone = if exceeds(WEATHER_DANGER_KP, WEATHER_DANGER_SPEED) {
            BroadcastTone::Danger
        } else if exceeds(WEATHER_WARNING_KP, WEATHER_WARNING_SPEED) {
            BroadcastTone::Warning
        } else {
            BroadcastTone::Neutral
        };

        let wind_line = match (speed, finite(snapshot.solar_wind.density)) {
            (Some(s), Some(d)) => format!("Solar wind: {s:.0} km/s, density {d:.1} p/cm³"),
            (Some(s), None) => format!("Solar wind: {s:.0} km/s"),
            (None, _) => "Solar wind: no data".to_string(),
        };
        let kp_line = match kp {
            Some(k) => format!("Kp index: {k:.1}"),
            None => "Kp index: no data".to_string(),
        };
        let content = format!(
            "{wind_line}\n{kp_line}\nRecent flares: {}",
            snapshot.flares.len()
        );

        let mut message = Self::build(
            BroadcastType::WeatherUpdate,
            BroadcastPriority::Normal,
            tone,
            "Space Weather Update",
            content,
            WEATHER_UPDATE_TTL_MS,
            "🛰️",
        );
        message.snapshot = Some(snapshot.clone());
        message.tags = vec!["weather".to_string()];
        self.admit(message)
    }

    /// Narrated announcement for the audio collaborator.
    pub fn broadcast_dj_announcement(
        &self,
        text: impl Into<String>,
        event: Option<&SpaceWeatherEvent>,
    ) -> BroadcastMessage {
        let priority = event
            .map(|e| severity_to_priority(e.severity))
            .unwrap_or(BroadcastPriority::Normal);
        let mut message = Self::build(
            BroadcastType::DjAnnouncement,
            priority,
            BroadcastTone::Cinematic,
            "DJ Announcement",
            text.into(),
            DJ_ANNOUNCEMENT_TTL_MS,
            "🎙️",
        );
        message.has_audio = true;
        message.event = event.cloned();
        message.tags = vec!["dj".to_string()];
        self.admit(message)
    }

    /// Operator / system notice. Priority defaults to LOW.
    pub fn broadcast_system(
        &self,
        headline: impl Into<String>,
        content: impl Into<String>,
        priority: Option<BroadcastPriority>,
    ) -> BroadcastMessage {
        let mut message = Self::build(
            BroadcastType::System,
            priority.unwrap_or(BroadcastPriority::Low),
            BroadcastTone::Neutral,
            headline.into(),
            content.into(),
            SYSTEM_TTL_MS,
            "ℹ️",
        );
        message.tags = vec!["system".to_string()];
        self.admit(message)
    }

    /// Urgent alert with audio. Severity defaults to SEVERE; the TTL is
    /// twice the ladder value for the resulting priority.
    pub fn broadcast_alert(
        &self,
        headline: impl Into<String>,
        content: impl Into<String>,
        severity: Option<EventSeverity>,
    ) -> BroadcastMessage {
        let severity = severity.unwrap_or(EventSeverity::Severe);
        let priority = severity_to_priority(severity);
        let mut message = Self::build(
            BroadcastType::Alert,
            priority,
            BroadcastTone::Danger,
            headline.into(),
            content.into(),
            calculate_ttl(priority) * 2,
            "⚠️",
        );
        message.has_audio = true;
        message.tags = vec!["alert".to_string(), severity.to_string().to_lowercase()];
        self.admit(message)
    }

    fn build(
        broadcast_type: BroadcastType,
        priority: BroadcastPriority,
        tone: BroadcastTone,
        headline: impl Into<String>,
        content: String,
        ttl: u64,
        icon: &str,
    ) -> BroadcastMessage {
        BroadcastMessage {
            id: Uuid::new_v4().to_string(),
            broadcast_type,
            priority,
            tone,
            headline: headline.into(),
            content,
            timestamp: Utc::now(),
            ttl: ttl.max(1),
            event: None,
            snapshot: None,
            icon: icon.to_string(),
            acknowledged: false,
            has_audio: false,
            tags: Vec::new(),
        }
    }

    // ========================================================================
    // Admission / dispatch
    // ========================================================================

    fn admit(&self, message: BroadcastMessage) -> BroadcastMessage {
        let dispatched = {
            let mut state = self.lock_state();
            if let Some(reason) = state.rejection(&message) {
                state.counters.rejected += 1;
                debug!(
                    broadcast_id = %message.id,
                    kind = %message.broadcast_type,
                    priority = %message.priority,
                    reason,
                    "Broadcast rejected"
                );
                return message;
            }
            state.queue.push(message.clone());
            self.dispatch_next(&mut state, Utc::now())
        };
        if let Some(next) = dispatched {
            self.notify(&next);
        }
        message
    }

    /// Pop the queue head and make it current. The caller notifies listeners
    /// with the returned message after releasing the lock.
    fn dispatch_next(&self, state: &mut ServiceState, now: DateTime<Utc>) -> Option<BroadcastMessage> {
        let message = state.queue.pop()?;

        if state.current.is_some() {
            state.timers.cancel_dismiss();
            state.close_current(None, now);
        }

        state.history.push(message.clone(), now);
        state.current = Some(CurrentBroadcast {
            message: message.clone(),
            since: now,
        });

        let counters = &mut state.counters;
        counters.total += 1;
        *counters.by_type.entry(message.broadcast_type.to_string()).or_insert(0) += 1;
        *counters.by_priority.entry(message.priority.to_string()).or_insert(0) += 1;
        counters.last_broadcast_at = Some(now);

        self.schedule_timers(state, &message);

        info!(
            broadcast_id = %message.id,
            kind = %message.broadcast_type,
            priority = %message.priority,
            tone = %message.tone,
            headline = %message.headline,
            "Broadcast dispatched"
        );
        Some(message)
    }

    fn schedule_timers(&self, state: &mut ServiceState, message: &BroadcastMessage) {
        if state.config.auto_dismiss {
            let weak = Arc::downgrade(&self.inner);
            let id = message.id.clone();
            if let Some(handle) = spawn_after(Duration::from_millis(message.ttl), move || {
                if let Some(service) = Self::upgrade(&weak) {
                    service.expire(&id);
                }
            }) {
                state.timers.set_dismiss(message.id.clone(), handle);
            }
        }

        let delay = state.config.auto_acknowledge_delay_ms;
        if delay > 0 {
            let weak = Arc::downgrade(&self.inner);
            let id = message.id.clone();
            if let Some(handle) = spawn_after(Duration::from_millis(delay), move || {
                if let Some(service) = Self::upgrade(&weak) {
                    service.acknowledge_broadcast(&id);
                }
            }) {
                state.timers.set_ack(message.id.clone(), handle);
            }
        }
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn notify(&self, message: &BroadcastMessage) {
        let listeners = self.lock_listeners().snapshot();
        notify_all(&listeners, message);
    }

    /// TTL elapsed for `id`. No-op unless it is still current.
    fn expire(&self, id: &str) {
        let next = {
            let mut state = self.lock_state();
            if !state.current.as_ref().is_some_and(|c| c.message.id == id) {
                return;
            }
            state.timers.take_dismiss(id);
            let now = Utc::now();
            state.close_current(Some(UserAction::Expired), now);
            debug!(broadcast_id = %id, "Broadcast expired");
            self.dispatch_next(&mut state, now)
        };
        if let Some(next) = next {
            self.notify(&next);
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Register a listener for every dispatched message.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BroadcastMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.lock_listeners().add(listener);
        Subscription::new(id, Arc::downgrade(&self.inner.listeners))
    }

    /// Most-recent-first history, at most `limit` entries.
    pub fn get_history(&self, limit: Option<usize>) -> Vec<BroadcastHistoryEntry> {
        self.lock_state().history.recent(limit)
    }

    pub fn get_recent_by_type(&self, kind: BroadcastType, limit: usize) -> Vec<BroadcastMessage> {
        self.lock_state().history.recent_by_type(kind, limit)
    }

    pub fn get_current_broadcast(&self) -> Option<BroadcastMessage> {
        self.lock_state().current.as_ref().map(|c| c.message.clone())
    }

    pub fn get_stats(&self) -> BroadcastStats {
        let subscribers = self.subscriber_count();
        let state = self.lock_state();
        BroadcastStats {
            total_broadcasts: state.counters.total,
            rejected: state.counters.rejected,
            by_type: state.counters.by_type.clone(),
            by_priority: state.counters.by_priority.clone(),
            history_size: state.history.len(),
            queue_length: state.queue.len(),
            subscribers,
            current_broadcast_id: state.current.as_ref().map(|c| c.message.id.clone()),
            last_broadcast_at: state.counters.last_broadcast_at,
            uptime_ms: self.inner.started.elapsed().as_millis() as u64,
        }
    }

    /// Mark a message acknowledged. If it is the current broadcast, clear it
    /// and dispatch the next queued message. Returns `false` for unknown ids.
    pub fn acknowledge_broadcast(&self, id: &str) -> bool {
        let next = {
            let mut state = self.lock_state();
            state.timers.cancel_ack(id);
            let now = Utc::now();
            if state.current.as_ref().is_some_and(|c| c.message.id == id) {
                state.timers.cancel_dismiss();
                state.close_current(Some(UserAction::Acknowledged), now);
                self.dispatch_next(&mut state, now)
            } else {
                let Some(entry) = state.history.find_mut(id) else {
                    return false;
                };
                entry.broadcast.acknowledged = true;
                entry.user_action.get_or_insert(UserAction::Acknowledged);
                None
            }
        };
        info!(broadcast_id = %id, "Broadcast acknowledged");
        if let Some(next) = next {
            self.notify(&next);
        }
        true
    }

    /// Clear the current broadcast without acknowledging it.
    /// Returns `false` if `id` is not current.
    pub fn dismiss_broadcast(&self, id: &str) -> bool {
        let next = {
            let mut state = self.lock_state();
            if !state.current.as_ref().is_some_and(|c| c.message.id == id) {
                return false;
            }
            state.timers.cancel_dismiss();
            state.timers.cancel_ack(id);
            let now = Utc::now();
            state.close_current(Some(UserAction::Dismissed), now);
            self.dispatch_next(&mut state, now)
        };
        debug!(broadcast_id = %id, "Broadcast dismissed");
        if let Some(next) = next {
            self.notify(&next);
        }
        true
    }

    pub fn clear_history(&self) {
        self.lock_state().history.clear();
        info!("Broadcast history cleared");
    }

    /// Overlay a partial config. A smaller `max_history_size` evicts at once.
    pub fn update_config(&self, update: BroadcastConfigUpdate) {
        let mut state = self.lock_state();
        state.config.apply(update);
        let capacity = state.config.max_history_size;
        state.history.set_capacity(capacity);
        info!(
            enabled = state.config.enabled,
            min_priority = %state.config.min_display_priority,
            max_history = state.history.capacity(),
            "Broadcast config updated"
        );
    }

    pub fn config(&self) -> BroadcastConfig {
        self.lock_state().config.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_listeners().len()
    }

    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }
}
