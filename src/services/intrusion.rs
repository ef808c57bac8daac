//! Per-(track, zone) dwell-time confirmation
//!
//! `NONE -> PENDING -> CONFIRMED -> ended`. Each `(track, zone)` pair runs
//! its own machine, so a track inside two zones confirms and ends them
//! independently. Entries only end when an update no longer lists the zone:
//! callers must [`IntrusionStateMachine::flush`] each track after its last
//! frame.

use crate::domain::event::{Event, EventKind};
use crate::domain::types::{TrackKey, ZoneSet};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// State of one `(track, zone)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrusionState {
    None,
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    start_time: f64,
    confirmed: bool,
}

/// One frame of one track, as seen by the state machine
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub key: &'a TrackKey,
    pub frame_id: u64,
    /// Camera-local time
    pub t: f64,
    /// Synchronized time; dwell is measured on this clock
    pub t_sync: f64,
    pub class_name: Option<&'a str>,
}

/// Dwell-time state machine over all tracks of a batch
#[derive(Debug, Clone, Default)]
pub struct IntrusionStateMachine {
    min_duration: f64,
    active: FxHashMap<TrackKey, BTreeMap<String, Entry>>,
}

impl IntrusionStateMachine {
    /// `min_duration` in seconds; `<= 0` confirms on first contact
    pub fn new(min_duration: f64) -> Self {
        Self { min_duration, active: FxHashMap::default() }
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    /// Advance every machine of `obs.key` given the zones the track
    /// currently occupies. Returns confirmations first, then endings, each
    /// in zone order.
    pub fn update(&mut self, obs: &Observation<'_>, zones: &ZoneSet) -> Vec<Event> {
        let mut events = Vec::new();
        let now = obs.t_sync;
        let min_duration = self.min_duration;
        let entries = self.active.entry(obs.key.clone()).or_default();

        for zone_id in zones {
            match entries.get_mut(zone_id) {
                None => {
                    let confirmed = min_duration <= 0.0;
                    entries.insert(zone_id.clone(), Entry { start_time: now, confirmed });
                    if confirmed {
                        events.push(make_event(EventKind::IntrusionConfirmed, obs, zone_id, 0.0));
                    } else {
                        debug!(track = %obs.key, zone_id = %zone_id, "intrusion_pending");
                    }
                }
                Some(entry) => {
                    let duration = now - entry.start_time;
                    if !entry.confirmed && duration >= min_duration {
                        entry.confirmed = true;
                        events.push(make_event(
                            EventKind::IntrusionConfirmed,
                            obs,
                            zone_id,
                            duration,
                        ));
                    }
                }
            }
        }

        let left: Vec<String> = entries.keys().filter(|z| !zones.contains(*z)).cloned().collect();
        for zone_id in left {
            let Some(entry) = entries.remove(&zone_id) else {
                continue;
            };
            let duration = now - entry.start_time;
            if entry.confirmed {
                events.push(make_event(EventKind::IntrusionEnded, obs, &zone_id, duration));
            } else {
                debug!(
                    track = %obs.key,
                    zone_id = %zone_id,
                    duration = %format!("{duration:.2}"),
                    "intrusion_discarded"
                );
            }
        }

        if entries.is_empty() {
            self.active.remove(obs.key);
        }

        for event in &events {
            info!(
                event = %event.event_type.as_str(),
                track = %obs.key,
                zone_id = %event.zone_id,
                duration = %format!("{:.2}", event.duration),
                t_sync = %format!("{:.3}", now),
                "intrusion_event"
            );
        }
        events
    }

    /// End every open entry of the track (end of track)
    pub fn flush(&mut self, obs: &Observation<'_>) -> Vec<Event> {
        self.update(obs, &ZoneSet::new())
    }

    pub fn state(&self, key: &TrackKey, zone_id: &str) -> IntrusionState {
        match self.active.get(key).and_then(|e| e.get(zone_id)) {
            None => IntrusionState::None,
            Some(entry) if entry.confirmed => IntrusionState::Confirmed,
            Some(_) => IntrusionState::Pending,
        }
    }

    /// Zones where the track has already dwelt at least `min_duration`,
    /// with the dwell so far
    pub fn active_alerts(&self, key: &TrackKey, now: f64) -> Vec<(String, f64)> {
        self.active
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|(zone_id, entry)| {
                let duration = now - entry.start_time;
                (duration >= self.min_duration).then(|| (zone_id.clone(), duration))
            })
            .collect()
    }

    /// Number of open `(track, zone)` entries
    pub fn open_entries(&self) -> usize {
        self.active.values().map(BTreeMap::len).sum()
    }
}

fn make_event(kind: EventKind, obs: &Observation<'_>, zone_id: &str, duration: f64) -> Event {
    Event::new(kind, obs.key, zone_id, obs.frame_id)
        .with_times(obs.t, obs.t_sync)
        .with_duration(duration)
        .with_class(obs.class_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(ids: &[&str]) -> ZoneSet {
        ids.iter().map(|z| z.to_string()).collect()
    }

    fn obs(key: &TrackKey, frame_id: u64, t: f64) -> Observation<'_> {
        Observation { key, frame_id, t, t_sync: t + 100.0, class_name: Some("person") }
    }

    #[test]
    fn test_zero_duration_confirms_immediately() {
        let key = TrackKey::new("HALL", "1");
        let mut sm = IntrusionStateMachine::new(0.0);
        let events = sm.update(&obs(&key, 1, 0.0), &zones(&["Z1"]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventKind::IntrusionConfirmed);
        assert_eq!(events[0].duration, 0.0);
        assert_eq!(events[0].t_sync, Some(100.0));
        assert_eq!(events[0].class_name.as_deref(), Some("person"));
        assert_eq!(sm.state(&key, "Z1"), IntrusionState::Confirmed);

        // No second confirmation
        assert!(sm.update(&obs(&key, 2, 1.0), &zones(&["Z1"])).is_empty());
    }

    #[test]
    fn test_short_stay_never_confirms() {
        let key = TrackKey::new("HALL", "1");
        let mut sm = IntrusionStateMachine::new(2.0);
        assert!(sm.update(&obs(&key, 1, 0.0), &zones(&["Z1"])).is_empty());
        assert_eq!(sm.state(&key, "Z1"), IntrusionState::Pending);
        assert!(sm.update(&obs(&key, 2, 1.9), &zones(&["Z1"])).is_empty());
        // Leaves: pending entry is discarded without any event
        assert!(sm.update(&obs(&key, 3, 2.5), &zones(&[])).is_empty());
        assert_eq!(sm.state(&key, "Z1"), IntrusionState::None);
        assert_eq!(sm.open_entries(), 0);
    }

    #[test]
    fn test_confirm_then_end() {
        let key = TrackKey::new("HALL", "7");
        let mut sm = IntrusionStateMachine::new(2.0);
        sm.update(&obs(&key, 1, 0.0), &zones(&["Z1"]));
        let confirmed = sm.update(&obs(&key, 2, 2.0), &zones(&["Z1"]));
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].duration, 2.0);
        assert_eq!(confirmed[0].frame_id, 2);

        let ended = sm.update(&obs(&key, 3, 5.0), &zones(&[]));
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].event_type, EventKind::IntrusionEnded);
        assert_eq!(ended[0].duration, 5.0);
    }

    #[test]
    fn test_independent_zones() {
        let key = TrackKey::new("HALL", "1");
        let mut sm = IntrusionStateMachine::new(1.0);
        sm.update(&obs(&key, 1, 0.0), &zones(&["Z1"]));
        sm.update(&obs(&key, 2, 0.5), &zones(&["Z1", "Z2"]));
        let events = sm.update(&obs(&key, 3, 1.0), &zones(&["Z1", "Z2"]));
        // Only Z1 has dwelt 1 s
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].zone_id, "Z1");

        let events = sm.update(&obs(&key, 4, 1.5), &zones(&["Z2"]));
        let kinds: Vec<(EventKind, &str)> =
            events.iter().map(|e| (e.event_type, e.zone_id.as_str())).collect();
        assert_eq!(
            kinds,
            vec![(EventKind::IntrusionConfirmed, "Z2"), (EventKind::IntrusionEnded, "Z1")]
        );
    }

    #[test]
    fn test_tracks_are_independent() {
        let a = TrackKey::new("HALL", "1");
        let b = TrackKey::new("CORRIDOR", "1");
        let mut sm = IntrusionStateMachine::new(0.0);
        sm.update(&obs(&a, 1, 0.0), &zones(&["Z1"]));
        sm.update(&obs(&b, 1, 0.0), &zones(&["Z1"]));
        assert_eq!(sm.open_entries(), 2);
        let ended = sm.flush(&obs(&a, 2, 1.0));
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].video_id, "HALL");
        assert_eq!(sm.state(&b, "Z1"), IntrusionState::Confirmed);
    }

    #[test]
    fn test_flush_ends_confirmed_intrusions() {
        let key = TrackKey::new("HALL", "1");
        let mut sm = IntrusionStateMachine::new(0.0);
        sm.update(&obs(&key, 1, 0.0), &zones(&["Z1", "Z2"]));
        let ended = sm.flush(&obs(&key, 9, 4.0));
        assert_eq!(ended.len(), 2);
        assert!(ended.iter().all(|e| e.event_type == EventKind::IntrusionEnded));
        assert!(ended.iter().all(|e| e.frame_id == 9));
        assert_eq!(sm.open_entries(), 0);
    }

    #[test]
    fn test_active_alerts() {
        let key = TrackKey::new("HALL", "1");
        let mut sm = IntrusionStateMachine::new(2.0);
        sm.update(&obs(&key, 1, 0.0), &zones(&["Z1"]));
        sm.update(&obs(&key, 2, 1.5), &zones(&["Z1", "Z2"]));
        // now is synchronized time
        assert!(sm.active_alerts(&key, 101.0).is_empty());
        let alerts = sm.active_alerts(&key, 103.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "Z1");
        assert!((alerts[0].1 - 3.0).abs() < 1e-9);
        assert!(sm.active_alerts(&TrackKey::new("X", "9"), 200.0).is_empty());
    }
}
