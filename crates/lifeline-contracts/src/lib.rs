//! # lifeline-contracts
//!
//! Shared types, errors, and configuration for the LIFELINE crisis alert
//! pipeline.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate beyond the alert state table and small invariant-keeping
//! helpers on the data types themselves.

pub mod alert;
pub mod audit;
pub mod config;
pub mod error;
pub mod identity;
pub mod moderation;
pub mod notify;
pub mod realtime;
pub mod trust;
pub mod validation;

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use alert::{
        queue_order, truncate_chars, AlertFilter, AlertStatus, AlertType, SafetyAlert, Severity,
        MAX_CONTEXT_CHARS, MAX_INDICATORS,
    };
    use audit::{AuditEventType, AuditQuery, AuditRequest};
    use config::LifelineConfig;
    use error::LifelineError;
    use identity::{Role, UserId};
    use realtime::{AlertEvent, MessageKind};
    use trust::{TrustAction, TrustLevel, TrustMetric};

    fn alert(severity: Severity, status: AlertStatus) -> SafetyAlert {
        let mut a = SafetyAlert::new(
            AlertType::CrisisContent,
            severity,
            UserId::from("member-1"),
            "context",
            vec!["kw".to_string()],
        );
        a.status = status;
        a
    }

    // ── State table ──────────────────────────────────────────────────────────

    #[test]
    fn state_table_allows_documented_paths() {
        use AlertStatus::*;
        assert!(New.can_transition_to(Acknowledged));
        assert!(New.can_transition_to(InProgress));
        assert!(New.can_transition_to(Escalated));
        assert!(New.can_transition_to(FalsePositive));
        assert!(Acknowledged.can_transition_to(Acknowledged));
        assert!(Acknowledged.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(InProgress.can_transition_to(Escalated));
        assert!(InProgress.can_transition_to(FalsePositive));
    }

    #[test]
    fn state_table_rejects_everything_else() {
        use AlertStatus::*;
        assert!(!Resolved.can_transition_to(New));
        assert!(!New.can_transition_to(Resolved));
        assert!(!InProgress.can_transition_to(New));
        assert!(!Acknowledged.can_transition_to(Resolved));
        for terminal in [Resolved, Escalated, FalsePositive] {
            assert!(terminal.is_terminal());
            assert!(terminal.allowed_targets().is_empty());
        }
    }

    // ── SafetyAlert ──────────────────────────────────────────────────────────

    #[test]
    fn new_alert_truncates_context_and_caps_indicators() {
        let long = "x".repeat(MAX_CONTEXT_CHARS + 50);
        let indicators = (0..30).map(|i| format!("kw{i}")).collect();
        let a = SafetyAlert::new(
            AlertType::SelfHarm,
            Severity::High,
            UserId::from("member-1"),
            &long,
            indicators,
        );
        assert_eq!(a.context.chars().count(), MAX_CONTEXT_CHARS);
        assert_eq!(a.indicators.len(), MAX_INDICATORS);
        assert_eq!(a.status, AlertStatus::New);
        assert!(a.handled_by.is_none());
        assert!(a.handled_at.is_none());
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[test]
    fn redacted_summary_omits_content() {
        let a = alert(Severity::Critical, AlertStatus::New);
        let json = serde_json::to_string(&a.redacted_summary()).unwrap();
        assert!(!json.contains("context"));
        assert!(json.contains("\"indicator_count\":1"));
    }

    #[test]
    fn severity_scale_maps_one_to_five() {
        assert_eq!(Severity::from_scale(1), Some(Severity::Low));
        assert_eq!(Severity::from_scale(3), Some(Severity::High));
        assert_eq!(Severity::from_scale(5), Some(Severity::Critical));
        assert_eq!(Severity::from_scale(0), None);
        assert_eq!(Severity::from_scale(6), None);
    }

    // ── Ordering & filters ───────────────────────────────────────────────────

    #[test]
    fn queue_order_puts_unhandled_then_severity_then_recency() {
        let mut older_new = alert(Severity::High, AlertStatus::New);
        older_new.detected_at = Utc::now() - Duration::minutes(5);
        let newer_new = alert(Severity::High, AlertStatus::New);
        let ack = alert(Severity::High, AlertStatus::Acknowledged);
        let resolved_critical = alert(Severity::Critical, AlertStatus::Resolved);
        let low_new = alert(Severity::Low, AlertStatus::New);

        let mut items = vec![
            resolved_critical.clone(),
            ack.clone(),
            low_new.clone(),
            older_new.clone(),
            newer_new.clone(),
        ];
        items.sort_by(queue_order);

        let ids: Vec<_> = items.iter().map(|a| a.id).collect();
        assert_eq!(
            ids,
            vec![newer_new.id, older_new.id, ack.id, low_new.id, resolved_critical.id]
        );
    }

    #[test]
    fn acknowledged_critical_outranks_new_low() {
        let critical = alert(Severity::Critical, AlertStatus::Acknowledged);
        let low = alert(Severity::Low, AlertStatus::New);

        let mut items = vec![low.clone(), critical.clone()];
        items.sort_by(queue_order);

        assert_eq!(items[0].id, critical.id);
        assert_eq!(items[1].id, low.id);
    }

    #[test]
    fn filter_matches_each_field() {
        let mut a = alert(Severity::High, AlertStatus::Resolved);
        a.handled_by = Some(UserId::from("counselor-a"));
        a.handled_at = Some(Utc::now());

        assert!(AlertFilter::default().matches(&a));
        assert!(AlertFilter {
            statuses: vec![AlertStatus::Resolved],
            handled: Some(true),
            handled_by: Some(UserId::from("counselor-a")),
            ..Default::default()
        }
        .matches(&a));
        assert!(!AlertFilter {
            severities: vec![Severity::Low],
            ..Default::default()
        }
        .matches(&a));
        assert!(!AlertFilter {
            date_from: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        }
        .matches(&a));
    }

    // ── Trust ────────────────────────────────────────────────────────────────

    #[test]
    fn trust_metric_clamps_and_records_effective_delta() {
        let mut m = TrustMetric::neutral(UserId::from("u"));
        assert_eq!(m.level, TrustLevel::Neutral);

        let applied = m.apply(TrustAction::SpamDetected, -2.0, Utc::now());
        assert_eq!(m.score, 0.0);
        assert!((applied + 0.5).abs() < f64::EPSILON);
        assert_eq!(m.level, TrustLevel::Restricted);

        m.apply(TrustAction::CleanContent, 5.0, Utc::now());
        assert_eq!(m.score, 1.0);
        assert_eq!(m.history.len(), 2);
    }

    // ── Audit request ────────────────────────────────────────────────────────

    #[test]
    fn phi_event_types_require_sealing() {
        let req = AuditRequest::new(AuditEventType::AlertCreated, None, "a-1", "create")
            .details(serde_json::json!({"context": "text"}));
        assert!(req.needs_sealing());

        let req = AuditRequest::new(AuditEventType::AlertDeleted, None, "a-1", "delete")
            .details(serde_json::json!({"id": "a-1"}));
        assert!(!req.needs_sealing());
        assert!(req.clone().sensitive().needs_sealing());

        let empty = AuditRequest::new(AuditEventType::AlertCreated, None, "a-1", "create");
        assert!(!empty.needs_sealing(), "null details have nothing to seal");
    }

    #[test]
    fn partial_audit_query_fills_defaults() {
        let empty: AuditQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.limit, 100);
        assert_eq!(empty.offset, 0);
        assert!(empty.event_type.is_none());

        let query: AuditQuery =
            serde_json::from_str(r#"{"event_type":"break_glass_access","offset":20}"#).unwrap();
        assert_eq!(query.event_type, Some(AuditEventType::BreakGlassAccess));
        assert_eq!(query.offset, 20);
        assert_eq!(query.limit, 100);
        assert!(query.user_id.is_none());
    }

    // ── Events ───────────────────────────────────────────────────────────────

    #[test]
    fn updated_event_payload_carries_status_and_handler() {
        let mut a = alert(Severity::High, AlertStatus::InProgress);
        a.handled_by = Some(UserId::from("counselor-a"));
        let event = AlertEvent::Updated {
            alert: a,
            previous_status: AlertStatus::New,
        };
        let msg = event.to_message();
        assert_eq!(msg.kind, MessageKind::AlertUpdated);
        assert_eq!(msg.payload["status"], "in_progress");
        assert_eq!(msg.payload["handled_by"], "counselor-a");

        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["type"], "alert_updated");
    }

    // ── Roles ────────────────────────────────────────────────────────────────

    #[test]
    fn privileged_roles() {
        assert!(Role::CrisisCounselor.is_privileged());
        assert!(Role::Supervisor.is_privileged());
        assert!(Role::Admin.is_privileged());
        assert!(!Role::User.is_privileged());
        assert!(!Role::Moderator.is_privileged());
        assert!(!Role::CrisisCounselor.is_supervisory());
    }

    // ── Config ───────────────────────────────────────────────────────────────

    #[test]
    fn default_config_is_valid() {
        assert!(LifelineConfig::default().validate().is_ok());
    }

    #[test]
    fn config_accepts_camel_case_aliases() {
        let cfg: LifelineConfig =
            serde_json::from_str(r#"{"rateLimitPerMinute": 3, "trustReviewFloor": 0.25}"#)
                .unwrap();
        assert_eq!(cfg.rate_limit_per_minute, 3);
        assert_eq!(cfg.trust_review_floor, 0.25);
        assert_eq!(cfg.audit_buffer_size, 100);
    }

    #[test]
    fn config_rejects_out_of_range_floor() {
        let cfg = LifelineConfig {
            trust_review_floor: 1.5,
            ..Default::default()
        };
        match cfg.validate() {
            Err(LifelineError::Config { reason }) => assert!(reason.contains("trust_review_floor")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    // ── Error display messages ───────────────────────────────────────────────

    #[test]
    fn error_conflict_display() {
        let err = LifelineError::Conflict {
            resource: "alert".to_string(),
            id: "a-1".to_string(),
            reason: "already claimed by another counselor".to_string(),
            holder: Some("counselor-a".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("a-1"));
        assert!(msg.contains("already claimed"));
    }

    #[test]
    fn error_invalid_transition_display() {
        let err = LifelineError::InvalidTransition {
            from: "resolved".to_string(),
            to: "new".to_string(),
        };
        assert_eq!(err.to_string(), "invalid transition from 'resolved' to 'new'");
    }
}
