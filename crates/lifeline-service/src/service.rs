//! The LIFELINE command surface.
//!
//! `AlertService` wires the in-process components together and exposes the
//! commands a counselor dashboard or the content pipeline calls. Payloads
//! are validated against the command schemas before they reach the
//! workflow controller; everything after that is the controller's job.
//!
//! The service spawns the dispatcher task and the audit flush timer, so it
//! must be started from within a tokio runtime.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use lifeline_audit::{
    open_details, AuditLoggerSettings, BufferedAuditLogger, ChaChaFieldCipher, InMemoryAuditStore,
};
use lifeline_classifier::RiskClassifier;
use lifeline_contracts::{
    alert::{
        AlertFilter, AlertId, AlertPage, AlertStatus, AlertType, PageRequest,
        RedactedAlertSummary, SafetyAlert, Severity,
    },
    audit::{
        AuditEventType, AuditLogEntry, AuditOutcome, AuditQuery, AuditRequest, AuditSeverity,
        VerifiedAuditEntry,
    },
    config::LifelineConfig,
    error::{LifelineError, LifelineResult},
    identity::{Actor, Role, UserId},
    validation::CommandSchema,
};
use lifeline_core::{
    traits::{AuditLogger, CommandValidator, NotificationSender, RateLimiter, UserDirectory},
    workflow::{AlertUpdate, NewAlert, SubmissionOutcome, WorkflowComponents, WorkflowSettings},
    WorkflowController,
};
use lifeline_realtime::{Connection, Dispatcher, DispatcherSettings, PubSubBus};
use lifeline_store::{FixedWindowRateLimiter, InMemoryAlertStore, InMemoryTrustLedger};
use lifeline_verify::{schemas, SchemaValidator};

use crate::config::ServiceConfig;

// ── Command payloads ──────────────────────────────────────────────────────────

/// ListAlerts filters and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListAlertsQuery {
    pub severity: Vec<Severity>,
    pub status: Vec<AlertStatus>,
    pub subject_user_id: Option<String>,
    pub handled_by: Option<String>,
    pub handled: Option<bool>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListAlertsQuery {
    fn default() -> Self {
        Self {
            severity: Vec::new(),
            status: Vec::new(),
            subject_user_id: None,
            handled_by: None,
            handled: None,
            date_from: None,
            date_to: None,
            page: 1,
            limit: 20,
        }
    }
}

impl ListAlertsQuery {
    fn filter(&self) -> AlertFilter {
        AlertFilter {
            severities: self.severity.clone(),
            statuses: self.status.clone(),
            subject_user_id: self.subject_user_id.as_deref().map(UserId::from),
            handled_by: self.handled_by.as_deref().map(UserId::from),
            handled: self.handled,
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }
}

/// CreateAlert. `severity` uses the external 1..=5 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertRequest {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: u8,
    pub subject_user_id: String,
    pub context: String,
    pub indicators: Vec<String>,
}

/// UpdateAlert. At least one field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAlertRequest {
    pub status: Option<AlertStatus>,
    pub handled_by: Option<String>,
    pub notes: Option<String>,
    pub actions: Option<Vec<String>>,
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct AlertService {
    config: LifelineConfig,
    workflow: WorkflowController,
    validator: SchemaValidator,
    directory: Arc<dyn UserDirectory>,
    alerts: Arc<InMemoryAlertStore>,
    trust: Arc<InMemoryTrustLedger>,
    limiter: Arc<FixedWindowRateLimiter>,
    audit: Arc<BufferedAuditLogger>,
    audit_store: Arc<InMemoryAuditStore>,
    cipher: Arc<ChaChaFieldCipher>,
    dispatcher: Dispatcher,
    tasks: Vec<JoinHandle<()>>,
}

impl AlertService {
    /// Build every component from `config` and start the background tasks.
    pub fn start(
        config: &ServiceConfig,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationSender>,
        bus: Option<Arc<dyn PubSubBus>>,
    ) -> LifelineResult<Self> {
        config.validate()?;
        let pipeline = config.pipeline.clone();

        let classifier = match &config.classifier.patterns_file {
            Some(path) => RiskClassifier::from_file(path)?,
            None => RiskClassifier::with_defaults()?,
        }
        .with_review_floor(pipeline.trust_review_floor);

        let cipher = Arc::new(match &config.audit.key_hex {
            Some(hex_key) => ChaChaFieldCipher::from_hex(config.audit.key_id.clone(), hex_key)?,
            None => {
                warn!("no audit key configured; sealing with an ephemeral key");
                ChaChaFieldCipher::generate(config.audit.key_id.clone())
            }
        });

        let alerts = Arc::new(InMemoryAlertStore::with_max_page_size(
            pipeline.alert_list_max_page_size,
        ));
        let trust = Arc::new(InMemoryTrustLedger::new());
        let limiter = Arc::new(FixedWindowRateLimiter::per_minute(
            pipeline.rate_limit_per_minute,
        ));
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let audit = Arc::new(
            BufferedAuditLogger::new(
                audit_store.clone(),
                notifier,
                AuditLoggerSettings::from(&pipeline),
            )
            .with_cipher(cipher.clone()),
        );

        let (dispatcher, dispatcher_task) = Dispatcher::spawn_audited(
            DispatcherSettings::from(&pipeline),
            alerts.clone(),
            bus,
            audit.clone(),
        );
        let flush_task = BufferedAuditLogger::spawn_flush_timer(audit.clone());

        let workflow = WorkflowController::new(
            WorkflowComponents {
                moderator: Arc::new(classifier),
                limiter: limiter.clone(),
                alerts: alerts.clone(),
                audit: audit.clone(),
                publisher: Arc::new(dispatcher.clone()),
                trust: trust.clone(),
            },
            WorkflowSettings {
                alert_severity_threshold: pipeline.alert_severity_threshold,
            },
        );

        info!(
            instance_id = %pipeline.instance_id,
            rate_limit = pipeline.rate_limit_per_minute,
            threshold = %pipeline.alert_severity_threshold,
            "alert service started"
        );

        Ok(Self {
            config: pipeline,
            workflow,
            validator: SchemaValidator::default(),
            directory,
            alerts,
            trust,
            limiter,
            audit,
            audit_store,
            cipher,
            dispatcher,
            tasks: vec![dispatcher_task, flush_task],
        })
    }

    pub fn config(&self) -> &LifelineConfig {
        &self.config
    }

    /// The controller, for the dedicated counselor actions (acknowledge,
    /// accept, resolve, escalate, mark false positive, change severity).
    pub fn workflow(&self) -> &WorkflowController {
        &self.workflow
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn alert_store(&self) -> &InMemoryAlertStore {
        &self.alerts
    }

    pub fn audit_store(&self) -> &InMemoryAuditStore {
        &self.audit_store
    }

    pub fn trust_ledger(&self) -> &InMemoryTrustLedger {
        &self.trust
    }

    // ── Content ──────────────────────────────────────────────────────────────

    /// Classify and gate one post or chat message.
    ///
    /// Returns `RateLimited` when the post was throttled and raised no alert.
    /// A throttled post that did raise an alert returns the outcome, with
    /// `admitted == false`, so the alert is never lost to the limiter.
    pub fn submit_content(&self, author: &Actor, text: &str) -> LifelineResult<SubmissionOutcome> {
        let outcome = self.workflow.submit_content(author, text)?;
        if !outcome.admitted && outcome.alert.is_none() {
            let retry_after = self.limiter.retry_after(&author.user_id);
            return Err(LifelineError::RateLimited {
                user_id: author.user_id.to_string(),
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }
        Ok(outcome)
    }

    // ── Alerts ───────────────────────────────────────────────────────────────

    pub fn list_alerts(&self, actor: &Actor, query: &ListAlertsQuery) -> LifelineResult<AlertPage> {
        self.check(
            query,
            &schemas::list_alerts(self.config.alert_list_max_page_size),
        )?;
        if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
            if from > to {
                return Err(LifelineError::validation("date_from is after date_to"));
            }
        }
        self.workflow.list_alerts(
            actor,
            &query.filter(),
            PageRequest {
                page: query.page,
                limit: query.limit,
            },
        )
    }

    pub fn get_alert(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert> {
        self.workflow.get_alert(actor, id)
    }

    pub fn create_alert(
        &self,
        actor: &Actor,
        request: &CreateAlertRequest,
    ) -> LifelineResult<SafetyAlert> {
        self.check(request, &schemas::create_alert())?;
        let severity = Severity::from_scale(request.severity).ok_or_else(|| {
            LifelineError::validation(format!("severity {} is outside 1..=5", request.severity))
        })?;
        let subject = UserId::new(request.subject_user_id.clone());
        if !self.directory.exists(&subject) {
            return Err(LifelineError::NotFound {
                resource: "user".to_string(),
                id: subject.to_string(),
            });
        }

        self.workflow.create_alert(
            actor,
            NewAlert {
                alert_type: request.alert_type,
                severity,
                subject_user_id: subject,
                context: request.context.clone(),
                indicators: request.indicators.clone(),
            },
        )
    }

    pub fn update_alert(
        &self,
        actor: &Actor,
        id: AlertId,
        request: &UpdateAlertRequest,
    ) -> LifelineResult<SafetyAlert> {
        self.check(request, &schemas::update_alert())?;
        self.workflow.update_alert(
            actor,
            id,
            AlertUpdate {
                status: request.status,
                handled_by: request.handled_by.as_deref().map(UserId::from),
                notes: request.notes.clone(),
                actions: request.actions.clone().unwrap_or_default(),
            },
        )
    }

    /// Admin only.
    pub fn delete_alert(&self, actor: &Actor, id: AlertId) -> LifelineResult<RedactedAlertSummary> {
        self.workflow.delete_alert(actor, id)
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    /// Query the audit trail. Admins and supervisors only.
    ///
    /// Buffered entries are flushed first so the result includes them. Each
    /// returned entry carries the outcome of re-verifying its hash.
    pub fn query_audit_log(
        &self,
        actor: &Actor,
        query: &AuditQuery,
    ) -> LifelineResult<Vec<VerifiedAuditEntry>> {
        if !actor.role.is_supervisory() {
            self.record(
                AuditRequest::new(
                    AuditEventType::AuditQueried,
                    Some(actor.user_id.clone()),
                    "audit_log",
                    "query_audit_log",
                )
                .severity(AuditSeverity::High)
                .outcome(AuditOutcome::Failure),
            );
            return Err(LifelineError::forbidden(format!(
                "role '{}' may not read the audit log",
                actor.role
            )));
        }

        if let Err(e) = self.audit.flush() {
            warn!(error = %e, "audit query served without pending entries");
        }
        let entries = self.audit_store.query(query)?;
        let tampered = entries.iter().filter(|e| !e.intact).count();

        self.record(
            AuditRequest::new(
                AuditEventType::AuditQueried,
                Some(actor.user_id.clone()),
                "audit_log",
                "query_audit_log",
            )
            .severity(if tampered > 0 {
                AuditSeverity::Critical
            } else {
                AuditSeverity::Medium
            })
            .details(json!({
                "returned": entries.len(),
                "tampered": tampered,
                "limit": query.limit,
                "offset": query.offset,
            })),
        );
        Ok(entries)
    }

    /// Decrypt an entry's sealed details. Admin only, and the access itself
    /// is a critical audit event.
    pub fn reveal_audit_details(
        &self,
        actor: &Actor,
        entry: &AuditLogEntry,
    ) -> LifelineResult<Option<serde_json::Value>> {
        let allowed = actor.role == Role::Admin;
        self.record(
            AuditRequest::new(
                AuditEventType::BreakGlassAccess,
                Some(actor.user_id.clone()),
                entry.record.id.clone(),
                "reveal_audit_details",
            )
            .severity(AuditSeverity::Critical)
            .outcome(if allowed {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            }),
        );
        if !allowed {
            return Err(LifelineError::forbidden(
                "only admins may open sealed audit details",
            ));
        }
        open_details(self.cipher.as_ref(), &entry.record)
    }

    /// Flush, then verify the whole stored chain from genesis.
    pub fn verify_audit_chain(&self) -> LifelineResult<bool> {
        self.audit.flush()?;
        Ok(self.audit_store.verify_integrity())
    }

    // ── Real-time ────────────────────────────────────────────────────────────

    /// Open a real-time connection. Privileged roles only.
    pub fn connect(&self, actor: &Actor) -> LifelineResult<Connection> {
        let result = self.dispatcher.connect(actor);
        let outcome = if result.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.record(
            AuditRequest::new(
                AuditEventType::PresenceConnected,
                Some(actor.user_id.clone()),
                actor.role.as_str(),
                "connect",
            )
            .outcome(outcome),
        );
        result
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Flush the audit buffer and stop the background tasks.
    pub fn shutdown(self) -> LifelineResult<()> {
        let flushed = self.audit.flush();
        self.dispatcher.shutdown();
        for task in &self.tasks {
            task.abort();
        }
        info!("alert service stopped");
        flushed
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn check<T: Serialize>(&self, payload: &T, schema: &CommandSchema) -> LifelineResult<()> {
        let value = serde_json::to_value(payload).map_err(|e| {
            LifelineError::validation(format!("payload could not be serialized: {}", e))
        })?;
        let report = self.validator.validate(&value, schema)?;
        if report.passed {
            Ok(())
        } else {
            Err(LifelineError::validation(report.reason()))
        }
    }

    fn record(&self, request: AuditRequest) {
        if let Err(e) = self.audit.log(request) {
            error!(error = %e, "audit log call failed");
        }
    }
}
