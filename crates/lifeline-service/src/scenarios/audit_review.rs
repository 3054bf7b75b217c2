//! Scenario: reviewing and tampering with the audit trail.
//!
//!   1. A counselor reports an alert manually and an admin purges it
//!   2. A counselor tries to read the audit log → Forbidden
//!   3. A supervisor queries the log; every entry verifies
//!   4. An admin opens the sealed details of the creation entry
//!   5. A row is edited behind the logger's back → the next query flags it
//!      and the chain reports where it breaks

use lifeline_contracts::{
    alert::AlertType,
    audit::{AuditEventType, AuditQuery},
    error::{LifelineError, LifelineResult},
};

use crate::{
    config::ServiceConfig,
    mock_data::{admin, counselor, supervisor, COUNSELOR_A, MEMBER_SUPPORT},
    scenarios::start_service,
    service::CreateAlertRequest,
};

#[derive(Debug)]
pub struct AuditReviewReport {
    pub counselor_denied: bool,
    pub entries_before: usize,
    pub all_intact_before: bool,
    pub revealed_context: Option<String>,
    pub flagged_after_tamper: Vec<u64>,
    pub first_break: Option<u64>,
}

pub async fn run_scenario() -> LifelineResult<AuditReviewReport> {
    println!("=== Scenario: Audit Review ===");
    println!();

    let service = start_service(&ServiceConfig::default())?;
    let sam = counselor(COUNSELOR_A);

    let alert = service.create_alert(
        &sam,
        &CreateAlertRequest {
            alert_type: AlertType::CrisisContent,
            severity: 3,
            subject_user_id: MEMBER_SUPPORT.to_string(),
            context: "Reported by phone: member said they feel unsafe at home".to_string(),
            indicators: vec!["phone_report".to_string()],
        },
    )?;
    let summary = service.delete_alert(&admin(), alert.id)?;
    println!(
        "  [1] Alert {} reported by {} and purged (audited summary: {} indicators)",
        summary.id, COUNSELOR_A, summary.indicator_count
    );

    let counselor_denied = matches!(
        service.query_audit_log(&sam, &AuditQuery::default()),
        Err(LifelineError::Forbidden { .. })
    );
    println!("  [2] Counselor audit query denied: {}", counselor_denied);

    let entries = service.query_audit_log(&supervisor(), &AuditQuery::default())?;
    let all_intact_before = entries.iter().all(|e| e.intact);
    println!(
        "  [3] Supervisor sees {} entries; all intact: {}",
        entries.len(),
        all_intact_before
    );
    for e in &entries {
        println!(
            "      #{:<3} {:?} {:?} by {} sealed={}",
            e.entry.sequence,
            e.entry.record.event_type,
            e.entry.record.outcome,
            e.entry
                .record
                .actor_id
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "system".to_string()),
            e.entry.record.details_encrypted.is_some()
        );
    }

    let created = entries
        .iter()
        .find(|e| e.entry.record.event_type == AuditEventType::AlertCreated)
        .ok_or_else(|| LifelineError::validation("no AlertCreated entry in the log"))?;
    let revealed = service.reveal_audit_details(&admin(), &created.entry)?;
    let revealed_context = revealed
        .as_ref()
        .and_then(|d| d["context"].as_str())
        .map(str::to_string);
    println!("  [4] Admin opened sealed details: context={:?}", revealed_context);

    let target = created.entry.sequence;
    service.audit_store().with_raw_entries(|rows| {
        if let Some(row) = rows.iter_mut().find(|r| r.sequence == target) {
            row.record.action = "nothing_to_see_here".to_string();
        }
    })?;
    let after = service.query_audit_log(&supervisor(), &AuditQuery::default())?;
    let flagged_after_tamper: Vec<u64> = after
        .iter()
        .filter(|e| !e.intact)
        .map(|e| e.entry.sequence)
        .collect();
    let first_break = service.audit_store().first_break()?;
    println!(
        "  [5] After editing entry #{}: flagged={:?}, chain breaks at {:?}",
        target, flagged_after_tamper, first_break
    );
    println!();

    let report = AuditReviewReport {
        counselor_denied,
        entries_before: entries.len(),
        all_intact_before,
        revealed_context,
        flagged_after_tamper,
        first_break,
    };
    service.shutdown()?;
    Ok(report)
}
