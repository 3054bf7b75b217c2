//! The alert workflow controller.
//!
//! Every inbound content event and every counselor action passes through
//! here. The controller enforces the pipeline ordering:
//!
//!   content:  RateLimiter → Moderator → [AlertRepository::create → Audit → Publish] → Trust
//!   action:   Role check → State table → Ownership → AlertRepository::update (CAS) → Audit → Publish → Trust
//!
//! There is no global lock. The repository's compare-and-swap `update` is
//! the only arbiter of who wins a race; the controller turns a lost race into
//! `LifelineError::Conflict` and tells the loser who holds the alert.
//!
//! Audit and publish failures never fail the primary operation: the record
//! in the alert store is what matters, the audit logger escalates its own
//! failures, and clients reconcile missed events through `list_alerts`.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use lifeline_contracts::{
    alert::{
        AlertFilter, AlertId, AlertPage, AlertPatch, AlertStatus, AlertType, PageRequest,
        RedactedAlertSummary, SafetyAlert, Severity,
    },
    audit::{AuditEventType, AuditOutcome, AuditRequest, AuditSeverity},
    error::{LifelineError, LifelineResult},
    identity::{Actor, UserId},
    moderation::{Classification, ModerationReport, RiskLevel},
    realtime::AlertEvent,
    trust::TrustAction,
};

use crate::traits::{
    AlertPublisher, AlertRepository, AuditLogger, ContentModerator, RateLimiter, TrustLedger,
};

/// How many times a lost acknowledge race is retried against a fresh read.
///
/// Several counselors may acknowledge the same alert, so losing the version
/// race on acknowledge is not a user-facing conflict.
const ACKNOWLEDGE_RETRIES: u32 = 3;

/// How many times an accept that lost the version race to an update that
/// left the alert claimable (an acknowledge, a note) is retried.
const CLAIM_RETRIES: u32 = 3;

/// The collaborators a controller is built from.
#[derive(Clone)]
pub struct WorkflowComponents {
    pub moderator: Arc<dyn ContentModerator>,
    pub limiter: Arc<dyn RateLimiter>,
    pub alerts: Arc<dyn AlertRepository>,
    pub audit: Arc<dyn AuditLogger>,
    pub publisher: Arc<dyn AlertPublisher>,
    pub trust: Arc<dyn TrustLedger>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    /// Classified content creates an alert only at or above this severity.
    pub alert_severity_threshold: Severity,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            alert_severity_threshold: Severity::High,
        }
    }
}

/// What happened to one submitted post or chat message.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// False when the rate limiter rejected the submission.
    pub admitted: bool,
    /// True when the content goes to the feed immediately.
    pub published: bool,
    /// Admitted but parked until a moderator reviews it.
    pub held_for_review: bool,
    pub moderation: ModerationReport,
    /// The alert raised for this content, if any.
    pub alert: Option<SafetyAlert>,
}

/// A manually reported alert (the CreateAlert command).
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub subject_user_id: UserId,
    pub context: String,
    pub indicators: Vec<String>,
}

/// Optional extras carried by a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub notes: Option<String>,
    pub actions: Vec<String>,
    /// Explicit handler assignment. Only supervisors may assign someone else.
    pub assign_to: Option<UserId>,
}

/// The generic UpdateAlert command.
#[derive(Debug, Clone, Default)]
pub struct AlertUpdate {
    pub status: Option<AlertStatus>,
    pub handled_by: Option<UserId>,
    pub notes: Option<String>,
    pub actions: Vec<String>,
}

/// Orchestrates classifier → store → audit → dispatcher → trust ledger.
pub struct WorkflowController {
    moderator: Arc<dyn ContentModerator>,
    limiter: Arc<dyn RateLimiter>,
    alerts: Arc<dyn AlertRepository>,
    audit: Arc<dyn AuditLogger>,
    publisher: Arc<dyn AlertPublisher>,
    trust: Arc<dyn TrustLedger>,
    settings: WorkflowSettings,
}

impl WorkflowController {
    pub fn new(components: WorkflowComponents, settings: WorkflowSettings) -> Self {
        Self {
            moderator: components.moderator,
            limiter: components.limiter,
            alerts: components.alerts,
            audit: components.audit,
            publisher: components.publisher,
            trust: components.trust,
            settings,
        }
    }

    // ── Inbound content ──────────────────────────────────────────────────────

    /// Run one post or chat message through the pipeline.
    ///
    /// The rate limiter gates only the publish-to-feed path. Classification
    /// always runs, so crisis content from a throttled user still raises an
    /// alert.
    pub fn submit_content(&self, author: &Actor, text: &str) -> LifelineResult<SubmissionOutcome> {
        let user = &author.user_id;
        let admitted = self.limiter.admit(user);
        let trust_score = self.trust.score(user);
        let report = self.moderator.moderate(text, trust_score);

        debug!(
            user_id = %user,
            admitted,
            level = ?report.crisis.level,
            spam = report.spam.detected,
            inappropriate = report.inappropriate.detected,
            requires_review = report.requires_review,
            "content moderated"
        );

        let alert = match self.alert_severity_for(&report.crisis) {
            Some(severity) => Some(self.raise_alert(user, text, &report.crisis, severity)?),
            None => None,
        };

        self.record(
            AuditRequest::new(
                AuditEventType::ContentModerated,
                Some(user.clone()),
                user.to_string(),
                "moderate_content",
            )
            .severity(moderation_audit_severity(&report))
            .details(json!({
                "admitted": admitted,
                "level": report.crisis.level,
                "keywords": report.crisis.keywords,
                "spam": report.spam.reasons,
                "inappropriate": report.inappropriate.categories,
                "requires_review": report.requires_review,
                "alert_id": alert.as_ref().map(|a| a.id.to_string()),
            })),
        );

        if admitted {
            self.apply_content_feedback(user, &report);
        } else {
            warn!(user_id = %user, "submission rate limited; withheld from feed");
        }

        Ok(SubmissionOutcome {
            admitted,
            published: admitted && !report.requires_review,
            held_for_review: admitted && report.requires_review,
            moderation: report,
            alert,
        })
    }

    /// Raise an alert reported by staff rather than by the classifier.
    pub fn create_alert(&self, actor: &Actor, new_alert: NewAlert) -> LifelineResult<SafetyAlert> {
        require_privileged(actor, "create alerts")?;

        let mut alert = SafetyAlert::new(
            new_alert.alert_type,
            new_alert.severity,
            new_alert.subject_user_id,
            &new_alert.context,
            new_alert.indicators,
        );
        alert.actions.push("manually_reported".to_string());

        let alert = self.alerts.create(alert)?;
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            reported_by = %actor.user_id,
            "alert reported manually"
        );
        self.record(alert_created_request(&alert, Some(actor.user_id.clone())));
        self.broadcast(AlertEvent::Created {
            alert: alert.clone(),
        });
        Ok(alert)
    }

    // ── Counselor actions ────────────────────────────────────────────────────

    /// Mark an alert as seen. Sets the handler only if none is set yet.
    pub fn acknowledge(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
        self.acknowledge_with(actor, id, TransitionOptions::default())
    }

    /// Claim an alert. Succeeds exactly once per alert.
    pub fn accept(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
        self.transition(actor, id, AlertStatus::InProgress, TransitionOptions::default())
    }

    pub fn resolve(
        &self,
        actor: &Actor,
        id: AlertId,
        notes: Option<String>,
    ) -> LifelineResult<SafetyAlert> {
        let opts = TransitionOptions {
            notes,
            ..Default::default()
        };
        self.transition(actor, id, AlertStatus::Resolved, opts)
    }

    pub fn escalate(
        &self,
        actor: &Actor,
        id: AlertId,
        notes: Option<String>,
    ) -> LifelineResult<SafetyAlert> {
        let opts = TransitionOptions {
            notes,
            ..Default::default()
        };
        self.transition(actor, id, AlertStatus::Escalated, opts)
    }

    pub fn mark_false_positive(
        &self,
        actor: &Actor,
        id: AlertId,
        notes: Option<String>,
    ) -> LifelineResult<SafetyAlert> {
        let opts = TransitionOptions {
            notes,
            ..Default::default()
        };
        self.transition(actor, id, AlertStatus::FalsePositive, opts)
    }

    /// Re-grade an open alert and publish `severity_changed`.
    pub fn change_severity(
        &self,
        actor: &Actor,
        id: AlertId,
        severity: Severity,
    ) -> LifelineResult<SafetyAlert> {
        require_privileged(actor, "change alert severity")?;
        let current = self.alerts.get(id)?;

        if current.status.is_terminal() {
            return Err(LifelineError::validation(format!(
                "alert '{}' is {} and can no longer be re-graded",
                id, current.status
            )));
        }
        if current.severity == severity {
            return Ok(current);
        }
        authorize_handler(actor, &current, "change the severity of")?;

        let patch = AlertPatch {
            severity: Some(severity),
            append_actions: vec!["severity_changed".to_string()],
            ..Default::default()
        };
        let updated = match self.alerts.update(id, &patch, current.version) {
            Ok(updated) => updated,
            Err(LifelineError::Conflict { .. }) => {
                let latest = self.alerts.get(id)?;
                return Err(conflict(&latest, "alert changed while re-grading; reload and retry"));
            }
            Err(e) => return Err(e),
        };

        info!(
            alert_id = %id,
            from = %current.severity,
            to = %updated.severity,
            actor = %actor.user_id,
            "alert severity changed"
        );
        self.record(
            AuditRequest::new(
                AuditEventType::AlertUpdated,
                Some(actor.user_id.clone()),
                id.to_string(),
                "change_severity",
            )
            .severity(AuditSeverity::Medium)
            .details(json!({ "from": current.severity, "to": updated.severity })),
        );
        self.broadcast(AlertEvent::SeverityChanged {
            alert: updated.clone(),
            previous_severity: current.severity,
        });
        Ok(updated)
    }

    /// The generic UpdateAlert entry point.
    ///
    /// A requested status is routed to the matching transition so the same
    /// ownership rules apply as for the dedicated actions. Without a status
    /// the update only amends notes, actions or the assignment.
    pub fn update_alert(
        &self,
        actor: &Actor,
        id: AlertId,
        update: AlertUpdate,
    ) -> LifelineResult<SafetyAlert> {
        require_privileged(actor, "update alerts")?;
        if let Some(handler) = &update.handled_by {
            if handler != &actor.user_id && !actor.role.is_supervisory() {
                return Err(LifelineError::forbidden(
                    "only supervisors may assign an alert to another counselor",
                ));
            }
        }

        let opts = TransitionOptions {
            notes: update.notes,
            actions: update.actions,
            assign_to: update.handled_by,
        };
        match update.status {
            Some(AlertStatus::Acknowledged) => self.acknowledge_with(actor, id, opts),
            Some(target) => self.transition(actor, id, target, opts),
            None => self.amend(actor, id, opts),
        }
    }

    /// Purge an alert. Admin only; always audited with a redacted summary.
    pub fn delete_alert(&self, actor: &Actor, id: AlertId) -> LifelineResult<RedactedAlertSummary> {
        match self.alerts.delete(actor, id) {
            Ok(removed) => {
                let summary = removed.redacted_summary();
                warn!(alert_id = %id, actor = %actor.user_id, "alert purged");
                self.record(
                    AuditRequest::new(
                        AuditEventType::AlertDeleted,
                        Some(actor.user_id.clone()),
                        id.to_string(),
                        "purge_alert",
                    )
                    .severity(AuditSeverity::Critical)
                    .details(json!(summary)),
                );
                Ok(summary)
            }
            Err(e @ LifelineError::Forbidden { .. }) => {
                warn!(alert_id = %id, actor = %actor.user_id, role = %actor.role, "purge denied");
                self.record(
                    AuditRequest::new(
                        AuditEventType::AlertDeleted,
                        Some(actor.user_id.clone()),
                        id.to_string(),
                        "purge_alert",
                    )
                    .severity(AuditSeverity::High)
                    .outcome(AuditOutcome::Failure)
                    .details(json!({ "reason": e.to_string() })),
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn list_alerts(
        &self,
        actor: &Actor,
        filter: &AlertFilter,
        page: PageRequest,
    ) -> LifelineResult<AlertPage> {
        require_privileged(actor, "list alerts")?;
        let result = self.alerts.list(filter, page)?;
        self.record(
            AuditRequest::new(
                AuditEventType::AlertViewed,
                Some(actor.user_id.clone()),
                "alerts",
                "list_alerts",
            )
            .details(json!({
                "page": result.page,
                "returned": result.items.len(),
                "total": result.total,
            })),
        );
        Ok(result)
    }

    pub fn get_alert(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
        require_privileged(actor, "view alerts")?;
        let alert = self.alerts.get(id)?;
        self.record(AuditRequest::new(
            AuditEventType::AlertViewed,
            Some(actor.user_id.clone()),
            id.to_string(),
            "view_alert",
        ));
        Ok(alert)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn alert_severity_for(&self, crisis: &Classification) -> Option<Severity> {
        if !crisis.detected || crisis.level == RiskLevel::None {
            return None;
        }
        crisis
            .level
            .alert_severity()
            .filter(|severity| *severity >= self.settings.alert_severity_threshold)
    }

    fn raise_alert(
        &self,
        subject: &UserId,
        text: &str,
        crisis: &Classification,
        severity: Severity,
    ) -> LifelineResult<SafetyAlert> {
        let mut alert = SafetyAlert::new(
            crisis.alert_type.unwrap_or(AlertType::CrisisContent),
            severity,
            subject.clone(),
            text,
            crisis.keywords.clone(),
        );
        alert.actions = automatic_actions(crisis);

        let alert = self.alerts.create(alert)?;
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            alert_type = ?alert.alert_type,
            subject = %subject,
            "safety alert raised"
        );
        self.record(alert_created_request(&alert, None));
        self.broadcast(AlertEvent::Created {
            alert: alert.clone(),
        });
        Ok(alert)
    }

    fn acknowledge_with(
        &self,
        actor: &Actor,
        id: AlertId,
        opts: TransitionOptions,
    ) -> LifelineResult<SafetyAlert> {
        let mut attempt = 0;
        loop {
            match self.transition(actor, id, AlertStatus::Acknowledged, opts.clone()) {
                Err(LifelineError::Conflict { .. }) if attempt < ACKNOWLEDGE_RETRIES => {
                    attempt += 1;
                    debug!(alert_id = %id, attempt, "acknowledge raced another update; retrying");
                }
                other => return other,
            }
        }
    }

    fn transition(
        &self,
        actor: &Actor,
        id: AlertId,
        target: AlertStatus,
        opts: TransitionOptions,
    ) -> LifelineResult<SafetyAlert> {
        require_privileged(actor, "act on alerts")?;
        let mut attempt = 0;
        loop {
            if let Some(updated) = self.try_transition(actor, id, target, opts.clone())? {
                return Ok(updated);
            }
            if attempt >= CLAIM_RETRIES {
                let latest = self.alerts.get(id)?;
                return Err(conflict(
                    &latest,
                    "alert kept changing while claiming; reload and retry",
                ));
            }
            attempt += 1;
            debug!(alert_id = %id, attempt, "claim raced a non-claiming update; retrying");
        }
    }

    /// One read-check-write pass. `Ok(None)` means an accept lost the version
    /// race but the alert is still claimable.
    fn try_transition(
        &self,
        actor: &Actor,
        id: AlertId,
        target: AlertStatus,
        opts: TransitionOptions,
    ) -> LifelineResult<Option<SafetyAlert>> {
        let current = self.alerts.get(id)?;

        if target == AlertStatus::InProgress && current.status == AlertStatus::InProgress {
            return Err(self.lost_claim(actor, &current, current.status));
        }

        if !current.status.can_transition_to(target) {
            warn!(
                alert_id = %id,
                from = %current.status,
                to = %target,
                actor = %actor.user_id,
                "transition rejected by state table"
            );
            self.record(
                transition_request(actor, id, target)
                    .outcome(AuditOutcome::Failure)
                    .details(json!({ "from": current.status, "to": target })),
            );
            return Err(LifelineError::InvalidTransition {
                from: current.status.to_string(),
                to: target.to_string(),
            });
        }

        authorize_transition(actor, &current, target)?;

        let patch = transition_patch(actor, &current, target, opts);
        let updated = match self.alerts.update(id, &patch, current.version) {
            Ok(updated) => updated,
            Err(LifelineError::Conflict { .. }) => {
                let latest = self.alerts.get(id)?;
                if target != AlertStatus::InProgress {
                    return Err(conflict(&latest, "alert changed concurrently; reload and retry"));
                }
                if latest.status == AlertStatus::InProgress {
                    return Err(self.lost_claim(actor, &latest, current.status));
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!(
            alert_id = %id,
            from = %current.status,
            to = %updated.status,
            actor = %actor.user_id,
            "alert transitioned"
        );
        self.record(
            transition_request(actor, id, target)
                .severity(if target == AlertStatus::Escalated {
                    AuditSeverity::High
                } else {
                    AuditSeverity::Medium
                })
                .details(json!({
                    "from": current.status,
                    "to": updated.status,
                    "handled_by": updated.handled_by,
                    "notes": updated.notes,
                })),
        );
        self.broadcast(AlertEvent::Updated {
            alert: updated.clone(),
            previous_status: current.status,
        });

        match target {
            AlertStatus::Resolved => {
                self.adjust_trust(&updated.subject_user_id, TrustAction::ResolvedWithoutIncident)
            }
            AlertStatus::FalsePositive => {
                self.adjust_trust(&updated.subject_user_id, TrustAction::ConfirmedFalseAlarm)
            }
            _ => {}
        }

        Ok(Some(updated))
    }

    /// Notes, actions or assignment without a status change.
    fn amend(
        &self,
        actor: &Actor,
        id: AlertId,
        opts: TransitionOptions,
    ) -> LifelineResult<SafetyAlert> {
        let current = self.alerts.get(id)?;
        let patch = AlertPatch {
            handled_by: opts.assign_to,
            notes: opts.notes,
            append_actions: opts.actions,
            ..Default::default()
        };
        if patch.is_empty() {
            return Err(LifelineError::validation("update carries no changes"));
        }
        authorize_handler(actor, &current, "update")?;

        let updated = match self.alerts.update(id, &patch, current.version) {
            Ok(updated) => updated,
            Err(LifelineError::Conflict { .. }) => {
                let latest = self.alerts.get(id)?;
                return Err(conflict(&latest, "alert changed concurrently; reload and retry"));
            }
            Err(e) => return Err(e),
        };

        self.record(
            AuditRequest::new(
                AuditEventType::AlertUpdated,
                Some(actor.user_id.clone()),
                id.to_string(),
                "amend_alert",
            )
            .details(json!({
                "handled_by": updated.handled_by,
                "notes": updated.notes,
                "appended_actions": patch.append_actions,
            })),
        );
        self.broadcast(AlertEvent::Updated {
            alert: updated.clone(),
            previous_status: current.status,
        });
        Ok(updated)
    }

    /// Build the conflict for a counselor who tried to claim an alert that
    /// someone else holds, audit it, and tell them through the dispatcher.
    fn lost_claim(&self, actor: &Actor, latest: &SafetyAlert, seen: AlertStatus) -> LifelineError {
        let holder = latest.handled_by.as_ref().map(|h| h.to_string());
        info!(
            alert_id = %latest.id,
            actor = %actor.user_id,
            holder = ?holder,
            "accept lost: alert already claimed"
        );
        self.record(
            transition_request(actor, latest.id, AlertStatus::InProgress)
                .outcome(AuditOutcome::Failure)
                .details(json!({ "reason": "already_claimed", "holder": holder })),
        );
        if let Err(e) = self.publisher.notify_user(
            &actor.user_id,
            AlertEvent::Updated {
                alert: latest.clone(),
                previous_status: seen,
            },
        ) {
            warn!(error = %e, actor = %actor.user_id, "could not notify counselor of lost claim");
        }
        conflict(latest, "already claimed by another counselor")
    }

    fn apply_content_feedback(&self, user: &UserId, report: &ModerationReport) {
        if report.spam.detected {
            self.adjust_trust(user, TrustAction::SpamDetected);
        }
        if report.inappropriate.detected {
            self.adjust_trust(user, TrustAction::InappropriateContent);
        }
        if report.is_safe() && !report.crisis.detected {
            self.adjust_trust(user, TrustAction::CleanContent);
        }
    }

    fn adjust_trust(&self, user: &UserId, action: TrustAction) {
        match self.trust.adjust(user, action, 1.0) {
            Ok(metric) => {
                debug!(user_id = %user, action = action.as_str(), score = metric.score, "trust adjusted");
                self.record(
                    AuditRequest::new(
                        AuditEventType::TrustAdjusted,
                        None,
                        user.to_string(),
                        action.as_str(),
                    )
                    .details(json!({ "score": metric.score, "level": metric.level })),
                );
            }
            Err(e) => warn!(user_id = %user, error = %e, "trust adjustment failed"),
        }
    }

    fn record(&self, request: AuditRequest) {
        if let Err(e) = self.audit.log(request) {
            error!(error = %e, "audit log call failed; primary operation continues");
        }
    }

    fn broadcast(&self, event: AlertEvent) {
        let alert_id = event.alert().id;
        if let Err(e) = self.publisher.publish(event) {
            warn!(alert_id = %alert_id, error = %e, "real-time publish failed; clients reconcile via list");
        }
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────────

fn require_privileged(actor: &Actor, what: &str) -> LifelineResult<()> {
    if actor.role.is_privileged() {
        Ok(())
    } else {
        Err(LifelineError::forbidden(format!(
            "role '{}' may not {}",
            actor.role, what
        )))
    }
}

/// Closing or re-grading an alert requires being its handler or a supervisor.
/// An unclaimed alert may be touched by any privileged role.
fn authorize_handler(actor: &Actor, alert: &SafetyAlert, what: &str) -> LifelineResult<()> {
    match &alert.handled_by {
        None => Ok(()),
        Some(handler) if handler == &actor.user_id => Ok(()),
        Some(_) if actor.role.is_supervisory() => Ok(()),
        Some(handler) => Err(LifelineError::forbidden(format!(
            "only {} or a supervisor may {} alert '{}'",
            handler, what, alert.id
        ))),
    }
}

fn authorize_transition(actor: &Actor, current: &SafetyAlert, target: AlertStatus) -> LifelineResult<()> {
    match target {
        AlertStatus::Escalated if current.status == AlertStatus::New => {
            if actor.role.is_supervisory() {
                Ok(())
            } else {
                Err(LifelineError::forbidden(
                    "escalating an unclaimed alert is a supervisor override",
                ))
            }
        }
        AlertStatus::Resolved | AlertStatus::Escalated | AlertStatus::FalsePositive => {
            authorize_handler(actor, current, "close")
        }
        AlertStatus::New | AlertStatus::Acknowledged | AlertStatus::InProgress => Ok(()),
    }
}

fn transition_patch(
    actor: &Actor,
    current: &SafetyAlert,
    target: AlertStatus,
    opts: TransitionOptions,
) -> AlertPatch {
    let handled_by = match (opts.assign_to, target) {
        (Some(assignee), _) => Some(assignee),
        (None, AlertStatus::InProgress) => Some(actor.user_id.clone()),
        (None, _) if current.handled_by.is_none() => Some(actor.user_id.clone()),
        (None, _) => None,
    };
    let mut append_actions = vec![action_tag(target).to_string()];
    append_actions.extend(opts.actions);

    AlertPatch {
        status: Some(target),
        handled_by,
        notes: opts.notes,
        severity: None,
        append_actions,
    }
}

fn action_tag(target: AlertStatus) -> &'static str {
    match target {
        AlertStatus::New => "reopened",
        AlertStatus::Acknowledged => "acknowledged",
        AlertStatus::InProgress => "accepted",
        AlertStatus::Resolved => "resolved",
        AlertStatus::Escalated => "escalated",
        AlertStatus::FalsePositive => "marked_false_positive",
    }
}

fn automatic_actions(crisis: &Classification) -> Vec<String> {
    let mut actions = vec!["counselors_notified".to_string()];
    if !crisis.suggested_interventions.is_empty() {
        actions.push("auto_resources_sent".to_string());
    }
    if crisis.trigger_safety_plan {
        actions.push("safety_plan_triggered".to_string());
    }
    actions
}

fn conflict(latest: &SafetyAlert, reason: &str) -> LifelineError {
    LifelineError::Conflict {
        resource: "alert".to_string(),
        id: latest.id.to_string(),
        reason: reason.to_string(),
        holder: latest.handled_by.as_ref().map(|h| h.to_string()),
    }
}

fn transition_request(actor: &Actor, id: AlertId, target: AlertStatus) -> AuditRequest {
    AuditRequest::new(
        AuditEventType::AlertUpdated,
        Some(actor.user_id.clone()),
        id.to_string(),
        format!("transition:{}", target),
    )
}

fn alert_created_request(alert: &SafetyAlert, actor: Option<UserId>) -> AuditRequest {
    AuditRequest::new(
        AuditEventType::AlertCreated,
        actor,
        alert.id.to_string(),
        "create_alert",
    )
    .severity(match alert.severity {
        Severity::Critical => AuditSeverity::Critical,
        Severity::High => AuditSeverity::High,
        Severity::Medium => AuditSeverity::Medium,
        Severity::Low => AuditSeverity::Low,
    })
    .details(json!({
        "subject_user_id": alert.subject_user_id,
        "type": alert.alert_type,
        "severity": alert.severity,
        "context": alert.context,
        "indicators": alert.indicators,
    }))
}

fn moderation_audit_severity(report: &ModerationReport) -> AuditSeverity {
    match report.crisis.level {
        RiskLevel::High => AuditSeverity::High,
        RiskLevel::Medium => AuditSeverity::Medium,
        _ if report.requires_review => AuditSeverity::Medium,
        _ => AuditSeverity::Low,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;

    use lifeline_contracts::{
        alert::{
            queue_order, AlertFilter, AlertId, AlertPage, AlertPatch, AlertStatus, PageRequest,
            SafetyAlert, Severity,
        },
        audit::{AuditEventType, AuditRequest, AuditSeverity},
        error::{LifelineError, LifelineResult},
        identity::{Actor, Role, UserId},
        moderation::{
            Classification, InappropriateFinding, ModerationReport, RiskLevel, SpamFinding,
        },
        realtime::AlertEvent,
        trust::{TrustAction, TrustMetric},
    };

    use crate::traits::{
        AlertPublisher, AlertRepository, AuditLogger, ContentModerator, RateLimiter, TrustLedger,
    };

    use super::{AlertUpdate, WorkflowComponents, WorkflowController, WorkflowSettings};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// Flags "kill myself" as high risk, "hopeless" as medium, "spam" as spam.
    struct KeywordModerator;

    impl ContentModerator for KeywordModerator {
        fn classify(&self, text: &str) -> Classification {
            let lower = text.to_lowercase();
            let (level, keyword) = if lower.contains("kill myself") {
                (RiskLevel::High, "kill myself")
            } else if lower.contains("hopeless") {
                (RiskLevel::Medium, "hopeless")
            } else if lower.contains("need help") {
                (RiskLevel::Low, "need help")
            } else {
                return Classification::none();
            };
            Classification {
                detected: true,
                level,
                keywords: vec![keyword.to_string()],
                suggested_interventions: vec!["share crisis line".to_string()],
                notify_counselors: level >= RiskLevel::Medium,
                trigger_safety_plan: level == RiskLevel::High,
                alert_type: None,
            }
        }

        fn moderate(&self, text: &str, trust_score: f64) -> ModerationReport {
            let crisis = self.classify(text);
            let spam = SpamFinding {
                detected: text.contains("spam"),
                ..Default::default()
            };
            let requires_review =
                crisis.level == RiskLevel::High || spam.detected || trust_score < 0.3;
            ModerationReport {
                crisis,
                spam,
                inappropriate: InappropriateFinding::default(),
                requires_review,
                review_reasons: vec![],
            }
        }
    }

    struct FixedLimiter {
        allow: bool,
    }

    impl RateLimiter for FixedLimiter {
        fn admit(&self, _user_id: &UserId) -> bool {
            self.allow
        }

        fn retry_after(&self, _user_id: &UserId) -> Duration {
            Duration::from_secs(60)
        }
    }

    /// Versioned in-memory store honouring the state table.
    #[derive(Default)]
    struct MockAlerts {
        inner: Mutex<HashMap<AlertId, SafetyAlert>>,
    }

    impl AlertRepository for MockAlerts {
        fn create(&self, mut alert: SafetyAlert) -> LifelineResult<SafetyAlert> {
            alert.status = AlertStatus::New;
            alert.version = 1;
            self.inner.lock().unwrap().insert(alert.id, alert.clone());
            Ok(alert)
        }

        fn get(&self, id: AlertId) -> LifelineResult<SafetyAlert> {
            self.inner
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| LifelineError::alert_not_found(id))
        }

        fn list(&self, filter: &AlertFilter, page: PageRequest) -> LifelineResult<AlertPage> {
            let mut items: Vec<_> = self
                .inner
                .lock()
                .unwrap()
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect();
            items.sort_by(queue_order);
            let total = items.len() as u64;
            Ok(AlertPage {
                items,
                page: page.page,
                limit: page.limit,
                total,
                total_pages: 1,
            })
        }

        fn update(
            &self,
            id: AlertId,
            patch: &AlertPatch,
            expected_version: u64,
        ) -> LifelineResult<SafetyAlert> {
            let mut inner = self.inner.lock().unwrap();
            let alert = inner
                .get_mut(&id)
                .ok_or_else(|| LifelineError::alert_not_found(id))?;
            if alert.version != expected_version {
                return Err(LifelineError::Conflict {
                    resource: "alert".to_string(),
                    id: id.to_string(),
                    reason: "stale version".to_string(),
                    holder: None,
                });
            }
            if let Some(status) = patch.status {
                if !alert.status.can_transition_to(status) {
                    return Err(LifelineError::InvalidTransition {
                        from: alert.status.to_string(),
                        to: status.to_string(),
                    });
                }
                alert.status = status;
                if status.is_terminal() {
                    alert.handled_at = Some(Utc::now());
                }
            }
            if let Some(handler) = &patch.handled_by {
                alert.handled_by = Some(handler.clone());
            }
            if let Some(notes) = &patch.notes {
                alert.notes = Some(notes.clone());
            }
            if let Some(severity) = patch.severity {
                alert.severity = severity;
            }
            alert.actions.extend(patch.append_actions.iter().cloned());
            alert.version += 1;
            Ok(alert.clone())
        }

        fn delete(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
            if actor.role != Role::Admin {
                return Err(LifelineError::forbidden("admin only"));
            }
            self.inner
                .lock()
                .unwrap()
                .remove(&id)
                .ok_or_else(|| LifelineError::alert_not_found(id))
        }
    }

    /// Lands one acknowledge by `rival` between the caller's read and its
    /// first write, so that write fails the version check.
    struct AcknowledgeRace {
        inner: MockAlerts,
        rival: UserId,
        fired: Mutex<bool>,
    }

    impl AcknowledgeRace {
        fn new(rival: &str) -> Self {
            Self {
                inner: MockAlerts::default(),
                rival: UserId::from(rival),
                fired: Mutex::new(false),
            }
        }
    }

    impl AlertRepository for AcknowledgeRace {
        fn create(&self, alert: SafetyAlert) -> LifelineResult<SafetyAlert> {
            self.inner.create(alert)
        }

        fn get(&self, id: AlertId) -> LifelineResult<SafetyAlert> {
            self.inner.get(id)
        }

        fn list(&self, filter: &AlertFilter, page: PageRequest) -> LifelineResult<AlertPage> {
            self.inner.list(filter, page)
        }

        fn update(
            &self,
            id: AlertId,
            patch: &AlertPatch,
            expected_version: u64,
        ) -> LifelineResult<SafetyAlert> {
            let fire = {
                let mut fired = self.fired.lock().unwrap();
                !std::mem::replace(&mut *fired, true)
            };
            if fire {
                let current = self.inner.get(id)?;
                let ack = AlertPatch {
                    status: Some(AlertStatus::Acknowledged),
                    handled_by: Some(self.rival.clone()),
                    ..Default::default()
                };
                self.inner.update(id, &ack, current.version)?;
            }
            self.inner.update(id, patch, expected_version)
        }

        fn delete(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
            self.inner.delete(actor, id)
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        requests: Mutex<Vec<AuditRequest>>,
    }

    impl AuditLogger for RecordingAudit {
        fn log(&self, request: AuditRequest) -> LifelineResult<String> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            Ok(format!("audit-{}", requests.len()))
        }

        fn flush(&self) -> LifelineResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<AlertEvent>>,
        direct: Mutex<Vec<(UserId, AlertEvent)>>,
    }

    impl AlertPublisher for RecordingPublisher {
        fn publish(&self, event: AlertEvent) -> LifelineResult<()> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        fn notify_user(&self, user_id: &UserId, event: AlertEvent) -> LifelineResult<()> {
            self.direct.lock().unwrap().push((user_id.clone(), event));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockTrust {
        metrics: Mutex<HashMap<UserId, TrustMetric>>,
    }

    impl TrustLedger for MockTrust {
        fn score(&self, user_id: &UserId) -> f64 {
            self.metric(user_id).score
        }

        fn metric(&self, user_id: &UserId) -> TrustMetric {
            self.metrics
                .lock()
                .unwrap()
                .get(user_id)
                .cloned()
                .unwrap_or_else(|| TrustMetric::neutral(user_id.clone()))
        }

        fn adjust(
            &self,
            user_id: &UserId,
            action: TrustAction,
            weight: f64,
        ) -> LifelineResult<TrustMetric> {
            let mut metrics = self.metrics.lock().unwrap();
            let metric = metrics
                .entry(user_id.clone())
                .or_insert_with(|| TrustMetric::neutral(user_id.clone()));
            metric.apply(action, action.base_delta() * weight, Utc::now());
            Ok(metric.clone())
        }
    }

    struct Harness {
        controller: WorkflowController,
        alerts: Arc<MockAlerts>,
        audit: Arc<RecordingAudit>,
        publisher: Arc<RecordingPublisher>,
        trust: Arc<MockTrust>,
    }

    fn harness(allow: bool) -> Harness {
        let alerts = Arc::new(MockAlerts::default());
        let audit = Arc::new(RecordingAudit::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let trust = Arc::new(MockTrust::default());
        let controller = WorkflowController::new(
            WorkflowComponents {
                moderator: Arc::new(KeywordModerator),
                limiter: Arc::new(FixedLimiter { allow }),
                alerts: alerts.clone(),
                audit: audit.clone(),
                publisher: publisher.clone(),
                trust: trust.clone(),
            },
            WorkflowSettings::default(),
        );
        Harness {
            controller,
            alerts,
            audit,
            publisher,
            trust,
        }
    }

    fn member() -> Actor {
        Actor::new("member-1", Role::User)
    }

    fn counselor(name: &str) -> Actor {
        Actor::new(name, Role::CrisisCounselor)
    }

    fn supervisor() -> Actor {
        Actor::new("supervisor-1", Role::Supervisor)
    }

    /// Raise a critical alert through the content path and return its id.
    fn raise(h: &Harness) -> AlertId {
        h.controller
            .submit_content(&member(), "I want to kill myself")
            .unwrap()
            .alert
            .expect("crisis content must raise an alert")
            .id
    }

    // ── Content path ─────────────────────────────────────────────────────────

    #[test]
    fn benign_content_raises_nothing() {
        let h = harness(true);
        let outcome = h
            .controller
            .submit_content(&member(), "Had a great day at work today")
            .unwrap();

        assert!(!outcome.moderation.crisis.detected);
        assert!(outcome.alert.is_none());
        assert!(outcome.published);
        assert!(h.publisher.published.lock().unwrap().is_empty());
        assert!(h.trust.score(&member().user_id) > 0.5, "clean content earns trust");
    }

    #[test]
    fn crisis_content_raises_critical_alert_and_publishes() {
        let h = harness(true);
        let outcome = h
            .controller
            .submit_content(&member(), "I can't go on, I want to kill myself")
            .unwrap();

        let alert = outcome.alert.expect("alert expected");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.status, AlertStatus::New);
        assert!(alert.actions.contains(&"safety_plan_triggered".to_string()));
        assert!(outcome.held_for_review);

        let published = h.publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(matches!(published[0], AlertEvent::Created { .. }));

        let audit = h.audit.requests.lock().unwrap();
        let created = audit
            .iter()
            .find(|r| r.event_type == AuditEventType::AlertCreated)
            .expect("alert creation must be audited");
        assert_eq!(created.severity, AuditSeverity::Critical);
    }

    #[test]
    fn rate_limited_crisis_content_still_raises_alert() {
        let h = harness(false);
        let outcome = h
            .controller
            .submit_content(&member(), "I want to kill myself")
            .unwrap();

        assert!(!outcome.admitted);
        assert!(!outcome.published);
        assert!(outcome.alert.is_some(), "throttling must never drop a crisis");
    }

    #[test]
    fn low_risk_content_stays_below_threshold() {
        let h = harness(true);
        let outcome = h
            .controller
            .submit_content(&member(), "I think I need help with stress")
            .unwrap();

        assert_eq!(outcome.moderation.crisis.level, RiskLevel::Low);
        assert!(outcome.alert.is_none());
    }

    #[test]
    fn spam_lowers_trust() {
        let h = harness(true);
        h.controller.submit_content(&member(), "buy spam now").unwrap();
        assert!(h.trust.score(&member().user_id) < 0.5);
    }

    // ── Counselor actions ────────────────────────────────────────────────────

    #[test]
    fn second_accept_conflicts_and_loser_is_notified() {
        let h = harness(true);
        let id = raise(&h);

        let won = h.controller.accept(&counselor("counselor-a"), id).unwrap();
        assert_eq!(won.status, AlertStatus::InProgress);
        assert_eq!(won.handled_by, Some(UserId::from("counselor-a")));

        match h.controller.accept(&counselor("counselor-b"), id) {
            Err(LifelineError::Conflict { holder, reason, .. }) => {
                assert_eq!(holder.as_deref(), Some("counselor-a"));
                assert!(reason.contains("already claimed"));
            }
            other => panic!("expected Conflict, got {:?}", other),
        }

        let direct = h.publisher.direct.lock().unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].0, UserId::from("counselor-b"));
    }

    /// An acknowledge landing between an accept's read and write leaves the
    /// alert claimable, so the accept must still win.
    #[test]
    fn accept_survives_racing_acknowledge() {
        let alerts = Arc::new(AcknowledgeRace::new("counselor-b"));
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = WorkflowController::new(
            WorkflowComponents {
                moderator: Arc::new(KeywordModerator),
                limiter: Arc::new(FixedLimiter { allow: true }),
                alerts: alerts.clone(),
                audit: Arc::new(RecordingAudit::default()),
                publisher: publisher.clone(),
                trust: Arc::new(MockTrust::default()),
            },
            WorkflowSettings::default(),
        );
        let id = controller
            .submit_content(&member(), "I want to kill myself")
            .unwrap()
            .alert
            .expect("crisis content must raise an alert")
            .id;

        let won = controller.accept(&counselor("counselor-a"), id).unwrap();
        assert_eq!(won.status, AlertStatus::InProgress);
        assert_eq!(won.handled_by, Some(UserId::from("counselor-a")));
        assert_eq!(alerts.get(id).unwrap().version, 3);
        assert!(
            publisher.direct.lock().unwrap().is_empty(),
            "nobody lost a claim"
        );
    }

    #[test]
    fn several_counselors_may_acknowledge() {
        let h = harness(true);
        let id = raise(&h);

        let first = h.controller.acknowledge(&counselor("counselor-a"), id).unwrap();
        let second = h.controller.acknowledge(&counselor("counselor-b"), id).unwrap();

        assert_eq!(second.status, AlertStatus::Acknowledged);
        assert_eq!(
            second.handled_by, first.handled_by,
            "acknowledge keeps the first handler"
        );

        let accepted = h.controller.accept(&counselor("counselor-b"), id).unwrap();
        assert_eq!(accepted.handled_by, Some(UserId::from("counselor-b")));
    }

    #[test]
    fn only_handler_or_supervisor_may_resolve() {
        let h = harness(true);
        let id = raise(&h);
        h.controller.accept(&counselor("counselor-a"), id).unwrap();

        let err = h
            .controller
            .resolve(&counselor("counselor-b"), id, None)
            .unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden { .. }));

        let resolved = h
            .controller
            .resolve(&supervisor(), id, Some("safe with family".to_string()))
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.handled_at.is_some());
        assert_eq!(resolved.handled_by, Some(UserId::from("counselor-a")));
    }

    #[test]
    fn escalating_unclaimed_alert_needs_supervisor() {
        let h = harness(true);
        let id = raise(&h);

        let err = h
            .controller
            .escalate(&counselor("counselor-a"), id, None)
            .unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden { .. }));

        let escalated = h.controller.escalate(&supervisor(), id, None).unwrap();
        assert_eq!(escalated.status, AlertStatus::Escalated);
        assert_eq!(escalated.handled_by, Some(UserId::from("supervisor-1")));
    }

    #[test]
    fn invalid_transition_leaves_alert_unchanged() {
        let h = harness(true);
        let id = raise(&h);
        let c = counselor("counselor-a");
        h.controller.accept(&c, id).unwrap();
        let resolved = h.controller.resolve(&c, id, None).unwrap();

        let err = h
            .controller
            .update_alert(
                &c,
                id,
                AlertUpdate {
                    status: Some(AlertStatus::New),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LifelineError::InvalidTransition { .. }));
        assert_eq!(h.alerts.get(id).unwrap(), resolved);
    }

    #[test]
    fn false_positive_costs_the_subject_trust() {
        let h = harness(true);
        let id = raise(&h);
        let before = h.trust.score(&member().user_id);

        h.controller
            .mark_false_positive(&counselor("counselor-a"), id, None)
            .unwrap();

        assert!(h.trust.score(&member().user_id) < before);
    }

    #[test]
    fn members_cannot_act_on_alerts() {
        let h = harness(true);
        let id = raise(&h);
        let err = h.controller.accept(&member(), id).unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden { .. }));
    }

    #[test]
    fn severity_change_publishes_event() {
        let h = harness(true);
        let id = raise(&h);
        let updated = h
            .controller
            .change_severity(&supervisor(), id, Severity::High)
            .unwrap();
        assert_eq!(updated.severity, Severity::High);

        let published = h.publisher.published.lock().unwrap();
        assert!(matches!(
            published.last(),
            Some(AlertEvent::SeverityChanged {
                previous_severity: Severity::Critical,
                ..
            })
        ));
    }

    #[test]
    fn purge_requires_admin_and_is_audited() {
        let h = harness(true);
        let id = raise(&h);

        let err = h.controller.delete_alert(&supervisor(), id).unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden { .. }));

        let summary = h
            .controller
            .delete_alert(&Actor::new("admin-1", Role::Admin), id)
            .unwrap();
        assert_eq!(summary.id, id);

        let audit = h.audit.requests.lock().unwrap();
        let purge = audit
            .iter()
            .filter(|r| r.event_type == AuditEventType::AlertDeleted)
            .collect::<Vec<_>>();
        assert_eq!(purge.len(), 2, "denied and successful purges are both audited");
        assert_eq!(purge[1].severity, AuditSeverity::Critical);
        assert!(!purge[1].details.to_string().contains("kill myself"));
    }
}
