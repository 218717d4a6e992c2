use crate::infra::{build_services, ENGINEERING};
use chrono::NaiveDate;
use clap::Args;
use hr_approvals::config::AppConfig;
use hr_approvals::error::AppError;
use hr_approvals::workflows::approval::{
    ApprovalTracking, DepartmentId, EmployeeId, LevelId, PositionId,
};
use hr_approvals::workflows::offer::{
    CandidateId, InMemoryEventChannel, OfferDraft, OfferPatch, RequestStatus, RoundHistory,
};
use std::sync::Arc;

const RECRUITER: &str = "emp-4001";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Department the offer belongs to
    #[arg(long, default_value = ENGINEERING)]
    pub(crate) department: String,
    /// Job level used to pick the workflow template
    #[arg(long, default_value = "senior")]
    pub(crate) level: String,
    /// Offered annual salary in minor units
    #[arg(long, default_value_t = 12_000_000)]
    pub(crate) salary: u64,
    #[arg(long, default_value = "EUR")]
    pub(crate) currency: String,
    /// Proposed start date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Return the offer for edit at this step once, lowering the salary by 5%
    #[arg(long)]
    pub(crate) return_at_step: Option<u32>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        department,
        level,
        salary,
        currency,
        start_date,
        return_at_step,
    } = args;

    let config = AppConfig::load()?;
    let channel = Arc::new(InMemoryEventChannel::default());
    let services = build_services(&config, channel.clone())?;
    let offers = &services.offers;

    println!("Offer approval walkthrough");
    let offer = offers.create(OfferDraft {
        candidate_id: CandidateId("cand-demo".to_string()),
        position_id: PositionId("software-engineer".to_string()),
        department_id: DepartmentId(department),
        level_id: LevelId(level),
        salary,
        currency,
        start_date,
        requester_id: EmployeeId(RECRUITER.to_string()),
        owner_id: None,
        workflow_template_id: None,
    })?;
    println!(
        "- drafted offer {} for {} ({} {}, level {})",
        offer.id, offer.candidate_id.0, offer.salary, offer.currency, offer.level_id
    );

    let requester = EmployeeId(RECRUITER.to_string());
    let mut receipt = offers.submit(offer.id, &requester)?;
    println!(
        "- submitted round {} with template {}",
        receipt.offer.submission_round,
        receipt
            .offer
            .workflow_template_id
            .map(|id| id.to_string())
            .unwrap_or_default()
    );

    let mut returned_once = false;
    while let Some(step) = receipt.current_step.clone() {
        print_step(&step);

        if return_at_step == Some(step.step_order) && !returned_once {
            returned_once = true;
            offers.return_for_edit(
                offer.id,
                step.id,
                &step.assigned_approver_id,
                Some("please revisit the salary band".to_string()),
            )?;
            let lowered = receipt.offer.salary - receipt.offer.salary / 20;
            offers.update_draft(
                offer.id,
                OfferPatch {
                    salary: Some(lowered),
                    ..Default::default()
                },
            )?;
            println!("  returned for edit; salary lowered to {lowered}");
            receipt = offers.submit(offer.id, &requester)?;
            println!("- resubmitted as round {}", receipt.offer.submission_round);
            continue;
        }

        receipt = offers.approve_step(offer.id, step.id, &step.assigned_approver_id, None)?;
        println!("  approved by {}", step.assigned_approver_id);
    }

    let status = receipt.offer.status;
    println!("- final status: {status}");
    if status == RequestStatus::Approved {
        println!("  the candidate can now receive the offer letter");
    }

    println!("\nAudit trail");
    for round in offers.history(offer.id)? {
        print_round(&round);
    }

    println!("\nLifecycle events");
    for event in channel.events() {
        println!(
            "- {} -> {} by {} at {}",
            event.event_type.label(),
            event.resulting_status,
            event.actor_id,
            event.timestamp.format("%H:%M:%S%.3f")
        );
    }

    Ok(())
}

fn print_step(step: &ApprovalTracking) {
    println!(
        "- step {} '{}' waiting on {}",
        step.step_order, step.step_name, step.assigned_approver_id
    );
}

fn print_round(round: &RoundHistory) {
    println!("round {} ({}): {:?}", round.round, round.request_id, round.progress);
    for row in &round.steps {
        println!(
            "  step {} {:<28} {:<9} assigned={} acted={} notes={}",
            row.step_order,
            row.step_name,
            row.status.label(),
            row.assigned_approver_id,
            row.acting_approver_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            row.notes.as_deref().unwrap_or("-")
        );
    }
}
