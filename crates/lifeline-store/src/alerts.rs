//! In-memory implementation of `AlertRepository`.
//!
//! `InMemoryAlertStore` keeps every alert in a `HashMap` behind one `Mutex`.
//! The lock is held only for the duration of a single read or a single
//! compare-and-swap, which is what makes `update` the arbiter of races: two
//! callers holding the same `expected_version` are serialized here and the
//! second one sees a bumped version.
//!
//! Every check runs against a copy of the stored alert and the copy replaces
//! the original only when all of them pass, so a rejected update never
//! leaves a half-applied record behind.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};

use lifeline_contracts::{
    alert::{
        queue_order, truncate_chars, AlertFilter, AlertId, AlertPage, AlertPatch, AlertStatus,
        PageRequest, SafetyAlert, MAX_ACTIONS_PER_UPDATE, MAX_CONTEXT_CHARS, MAX_INDICATORS,
        MAX_NOTES_CHARS,
    },
    error::{LifelineError, LifelineResult},
    identity::{Actor, Role},
};
use lifeline_core::traits::AlertRepository;

/// Upper bound applied to `PageRequest::limit` unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

pub struct InMemoryAlertStore {
    alerts: Mutex<HashMap<AlertId, SafetyAlert>>,
    max_page_size: u32,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::with_max_page_size(DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_max_page_size(max_page_size: u32) -> Self {
        Self {
            alerts: Mutex::new(HashMap::new()),
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> LifelineResult<std::sync::MutexGuard<'_, HashMap<AlertId, SafetyAlert>>> {
        self.alerts
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("alert store", e))
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `patch` to a copy of `current`, enforcing the state table and the
/// record invariants.
fn apply_patch(current: &SafetyAlert, patch: &AlertPatch) -> LifelineResult<SafetyAlert> {
    if patch.is_empty() {
        return Err(LifelineError::validation("update carries no changes"));
    }

    let mut next = current.clone();

    if let Some(to) = patch.status {
        if !current.status.can_transition_to(to) {
            return Err(LifelineError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }
        next.status = to;
    }

    if let Some(handler) = &patch.handled_by {
        if handler.as_str().trim().is_empty() {
            return Err(LifelineError::validation("handled_by must not be blank"));
        }
        next.handled_by = Some(handler.clone());
    }

    if let Some(notes) = &patch.notes {
        if notes.chars().count() > MAX_NOTES_CHARS {
            return Err(LifelineError::validation(format!(
                "notes exceed {} characters",
                MAX_NOTES_CHARS
            )));
        }
        next.notes = Some(notes.clone());
    }

    if let Some(severity) = patch.severity {
        next.severity = severity;
    }

    if patch.append_actions.len() > MAX_ACTIONS_PER_UPDATE {
        return Err(LifelineError::validation(format!(
            "at most {} actions may be appended per update",
            MAX_ACTIONS_PER_UPDATE
        )));
    }
    if patch.append_actions.iter().any(|a| a.trim().is_empty()) {
        return Err(LifelineError::validation("action tags must not be blank"));
    }
    next.actions.extend(patch.append_actions.iter().cloned());

    // handled_by is set iff the alert has left `new`.
    match (next.status, &next.handled_by) {
        (AlertStatus::New, Some(_)) => {
            return Err(LifelineError::validation(
                "an alert in status 'new' cannot have a handler",
            ))
        }
        (status, None) if status != AlertStatus::New => {
            return Err(LifelineError::validation(format!(
                "an alert in status '{}' must name its handler",
                status
            )))
        }
        _ => {}
    }

    let now = Utc::now();
    if next.status.is_terminal() && next.handled_at.is_none() {
        next.handled_at = Some(now);
    }
    next.updated_at = now;
    next.version = current.version + 1;
    Ok(next)
}

impl AlertRepository for InMemoryAlertStore {
    fn create(&self, alert: SafetyAlert) -> LifelineResult<SafetyAlert> {
        if alert.subject_user_id.as_str().trim().is_empty() {
            return Err(LifelineError::validation("subject_user_id is required"));
        }
        if alert.context.trim().is_empty() {
            return Err(LifelineError::validation("context is required"));
        }
        if alert.indicators.is_empty() {
            return Err(LifelineError::validation("at least one indicator is required"));
        }

        let now = Utc::now();
        let mut stored = alert;
        stored.context = truncate_chars(&stored.context, MAX_CONTEXT_CHARS);
        stored.indicators.truncate(MAX_INDICATORS);
        stored.status = AlertStatus::New;
        stored.handled_by = None;
        stored.handled_at = None;
        stored.updated_at = now;
        stored.version = 1;

        let mut alerts = self.lock()?;
        if alerts.contains_key(&stored.id) {
            return Err(LifelineError::Conflict {
                resource: "alert".to_string(),
                id: stored.id.to_string(),
                reason: "an alert with this id already exists".to_string(),
                holder: None,
            });
        }
        alerts.insert(stored.id, stored.clone());
        debug!(alert_id = %stored.id, severity = %stored.severity, "alert stored");
        Ok(stored)
    }

    fn get(&self, id: AlertId) -> LifelineResult<SafetyAlert> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or_else(|| LifelineError::alert_not_found(id))
    }

    fn list(&self, filter: &AlertFilter, page: PageRequest) -> LifelineResult<AlertPage> {
        if page.page == 0 {
            return Err(LifelineError::validation("page numbers start at 1"));
        }
        if page.limit == 0 {
            return Err(LifelineError::validation("limit must be at least 1"));
        }
        let limit = page.limit.min(self.max_page_size);

        let mut matching: Vec<SafetyAlert> = self
            .lock()?
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(queue_order);

        let total = matching.len() as u64;
        let total_pages = total.div_ceil(u64::from(limit));
        let skip = (page.page as usize - 1).saturating_mul(limit as usize);
        let items = matching.into_iter().skip(skip).take(limit as usize).collect();

        Ok(AlertPage {
            items,
            page: page.page,
            limit,
            total,
            total_pages,
        })
    }

    fn update(
        &self,
        id: AlertId,
        patch: &AlertPatch,
        expected_version: u64,
    ) -> LifelineResult<SafetyAlert> {
        let mut alerts = self.lock()?;
        let current = alerts
            .get_mut(&id)
            .ok_or_else(|| LifelineError::alert_not_found(id))?;

        if current.version != expected_version {
            debug!(
                alert_id = %id,
                expected = expected_version,
                actual = current.version,
                "stale alert version"
            );
            return Err(LifelineError::Conflict {
                resource: "alert".to_string(),
                id: id.to_string(),
                reason: format!(
                    "expected version {} but found {}",
                    expected_version, current.version
                ),
                holder: current.handled_by.as_ref().map(|h| h.to_string()),
            });
        }

        let next = apply_patch(current, patch)?;
        *current = next.clone();
        Ok(next)
    }

    fn delete(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
        if actor.role != Role::Admin {
            return Err(LifelineError::forbidden(format!(
                "only admins may purge alerts; '{}' has role '{}'",
                actor.user_id, actor.role
            )));
        }
        let removed = self
            .lock()?
            .remove(&id)
            .ok_or_else(|| LifelineError::alert_not_found(id))?;
        info!(alert_id = %id, actor = %actor.user_id, "alert removed from store");
        Ok(removed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{Duration, Utc};

    use lifeline_contracts::{
        alert::{
            AlertFilter, AlertId, AlertPatch, AlertStatus, AlertType, PageRequest, SafetyAlert,
            Severity,
        },
        error::LifelineError,
        identity::{Actor, Role, UserId},
    };
    use lifeline_core::traits::AlertRepository;

    use super::InMemoryAlertStore;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn alert(severity: Severity) -> SafetyAlert {
        SafetyAlert::new(
            AlertType::CrisisContent,
            severity,
            UserId::from("member-1"),
            "I can't go on",
            vec!["cant_go_on".to_string()],
        )
    }

    fn claim(by: &str) -> AlertPatch {
        AlertPatch {
            status: Some(AlertStatus::InProgress),
            handled_by: Some(UserId::from(by)),
            append_actions: vec!["accepted".to_string()],
            ..Default::default()
        }
    }

    fn new_only() -> AlertFilter {
        AlertFilter {
            statuses: vec![AlertStatus::New],
            ..Default::default()
        }
    }

    // ── create / get ──────────────────────────────────────────────────────────

    #[test]
    fn test_create_normalises_status_and_version() {
        let store = InMemoryAlertStore::new();
        let mut a = alert(Severity::High);
        a.status = AlertStatus::Resolved;
        a.handled_by = Some(UserId::from("someone"));

        let stored = store.create(a).unwrap();
        assert_eq!(stored.status, AlertStatus::New);
        assert_eq!(stored.version, 1);
        assert!(stored.handled_by.is_none());
        assert_eq!(store.get(stored.id).unwrap(), stored);
    }

    #[test]
    fn test_create_rejects_missing_fields() {
        let store = InMemoryAlertStore::new();

        let mut no_indicators = alert(Severity::High);
        no_indicators.indicators.clear();
        assert!(matches!(
            store.create(no_indicators),
            Err(LifelineError::Validation { .. })
        ));

        let mut no_context = alert(Severity::High);
        no_context.context = "   ".to_string();
        assert!(matches!(
            store.create(no_context),
            Err(LifelineError::Validation { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = InMemoryAlertStore::new();
        assert!(matches!(
            store.get(AlertId::new()),
            Err(LifelineError::NotFound { .. })
        ));
    }

    // ── list ──────────────────────────────────────────────────────────────────

    /// A freshly created alert appears exactly once in a `new` listing and
    /// sorts ahead of acknowledged alerts of the same severity.
    #[test]
    fn test_list_new_alert_once_before_acknowledged() {
        let store = InMemoryAlertStore::new();
        let acked = store.create(alert(Severity::High)).unwrap();
        store
            .update(
                acked.id,
                &AlertPatch {
                    status: Some(AlertStatus::Acknowledged),
                    handled_by: Some(UserId::from("counselor-a")),
                    ..Default::default()
                },
                acked.version,
            )
            .unwrap();
        let fresh = store.create(alert(Severity::High)).unwrap();

        let page = store.list(&new_only(), PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, fresh.id);

        let all = store
            .list(&AlertFilter::default(), PageRequest::default())
            .unwrap();
        assert_eq!(all.items[0].id, fresh.id);
        assert_eq!(all.items[1].id, acked.id);
    }

    #[test]
    fn test_list_orders_by_severity_then_recency() {
        let store = InMemoryAlertStore::new();
        let mut old_critical = alert(Severity::Critical);
        old_critical.detected_at = Utc::now() - Duration::hours(2);
        let old_critical = store.create(old_critical).unwrap();
        let medium = store.create(alert(Severity::Medium)).unwrap();
        let new_critical = store.create(alert(Severity::Critical)).unwrap();

        let page = store.list(&new_only(), PageRequest::default()).unwrap();
        let ids: Vec<_> = page.items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![new_critical.id, old_critical.id, medium.id]);
    }

    #[test]
    fn test_list_paginates() {
        let store = InMemoryAlertStore::with_max_page_size(2);
        for _ in 0..5 {
            store.create(alert(Severity::High)).unwrap();
        }

        let page = store
            .list(&AlertFilter::default(), PageRequest { page: 3, limit: 50 })
            .unwrap();
        assert_eq!(page.limit, 2, "limit is clamped to the configured maximum");
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 1);

        assert!(matches!(
            store.list(&AlertFilter::default(), PageRequest { page: 0, limit: 10 }),
            Err(LifelineError::Validation { .. })
        ));
    }

    // ── update ────────────────────────────────────────────────────────────────

    #[test]
    fn test_update_bumps_version_and_appends_actions() {
        let store = InMemoryAlertStore::new();
        let a = store.create(alert(Severity::High)).unwrap();

        let updated = store.update(a.id, &claim("counselor-a"), a.version).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, AlertStatus::InProgress);
        assert_eq!(updated.actions, vec!["accepted".to_string()]);
        assert!(updated.handled_at.is_none());

        let resolved = store
            .update(
                a.id,
                &AlertPatch {
                    status: Some(AlertStatus::Resolved),
                    append_actions: vec!["resolved".to_string()],
                    ..Default::default()
                },
                updated.version,
            )
            .unwrap();
        assert!(resolved.handled_at.is_some());
        assert_eq!(resolved.actions.len(), 2);
    }

    #[test]
    fn test_stale_version_conflicts_and_names_holder() {
        let store = InMemoryAlertStore::new();
        let a = store.create(alert(Severity::High)).unwrap();
        store.update(a.id, &claim("counselor-a"), a.version).unwrap();

        match store.update(a.id, &claim("counselor-b"), a.version) {
            Err(LifelineError::Conflict { holder, .. }) => {
                assert_eq!(holder.as_deref(), Some("counselor-a"));
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    /// A transition outside the state table fails and leaves the stored
    /// record byte-for-byte unchanged.
    #[test]
    fn test_invalid_transition_leaves_record_unchanged() {
        let store = InMemoryAlertStore::new();
        let a = store.create(alert(Severity::High)).unwrap();
        let before = store.get(a.id).unwrap();

        let err = store
            .update(
                a.id,
                &AlertPatch {
                    status: Some(AlertStatus::Resolved),
                    handled_by: Some(UserId::from("counselor-a")),
                    ..Default::default()
                },
                a.version,
            )
            .unwrap_err();
        assert!(matches!(err, LifelineError::InvalidTransition { .. }));
        assert_eq!(store.get(a.id).unwrap(), before);
    }

    #[test]
    fn test_update_enforces_handler_invariant() {
        let store = InMemoryAlertStore::new();
        let a = store.create(alert(Severity::High)).unwrap();

        let err = store
            .update(
                a.id,
                &AlertPatch {
                    status: Some(AlertStatus::InProgress),
                    ..Default::default()
                },
                a.version,
            )
            .unwrap_err();
        assert!(matches!(err, LifelineError::Validation { .. }));

        let err = store
            .update(
                a.id,
                &AlertPatch {
                    notes: Some("x".repeat(2001)),
                    ..Default::default()
                },
                a.version,
            )
            .unwrap_err();
        assert!(matches!(err, LifelineError::Validation { .. }));
        assert_eq!(store.get(a.id).unwrap().version, 1);
    }

    /// Two threads race to claim the same alert from the same read: exactly
    /// one wins and the other observes a conflict.
    #[test]
    fn test_concurrent_claims_exactly_one_wins() {
        let store = Arc::new(InMemoryAlertStore::new());
        let a = store.create(alert(Severity::Critical)).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["counselor-a", "counselor-b"]
            .into_iter()
            .map(|who| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.update(a.id, &claim(who), a.version)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(LifelineError::Conflict { .. })))
            .count();
        assert_eq!((wins, conflicts), (1, 1));
        assert_eq!(store.get(a.id).unwrap().version, 2);
    }

    // ── delete ────────────────────────────────────────────────────────────────

    #[test]
    fn test_delete_is_admin_only() {
        let store = InMemoryAlertStore::new();
        let a = store.create(alert(Severity::High)).unwrap();

        let err = store
            .delete(&Actor::new("supervisor-1", Role::Supervisor), a.id)
            .unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden { .. }));

        let removed = store.delete(&Actor::new("admin-1", Role::Admin), a.id).unwrap();
        assert_eq!(removed.id, a.id);
        assert!(store.is_empty());
    }
}
