use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;

use crate::infra::{default_routing_config, stub_registry, InMemoryCheckpointStore};
use lending_ai::error::AppError;
use lending_ai::workflows::underwriting::{
    EngineSettings, LoanContext, LoanSubmission, OrchestrationEngine, ResumeReport, RoutingTable,
    UploadedDocument,
};

const DEFAULT_RESUME_LOOKBACK_SECS: i64 = 60;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Applicant name for the synthetic submission.
    #[arg(long, default_value = "Kaveri Agro Traders")]
    pub(crate) applicant: String,
    /// Requested loan amount in rupees.
    #[arg(long, default_value_t = 2_500_000)]
    pub(crate) loan_amount: u64,
    /// Omit bank statements so the banking stage is bypassed.
    #[arg(long)]
    pub(crate) without_bank_statements: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ResumeArgs {
    /// How far back to look for stalled checkpoints, in seconds.
    #[arg(long, default_value_t = DEFAULT_RESUME_LOOKBACK_SECS)]
    pub(crate) lookback_secs: i64,
}

fn build_engine(
    store: Arc<InMemoryCheckpointStore>,
) -> OrchestrationEngine<InMemoryCheckpointStore> {
    OrchestrationEngine::new(
        store,
        stub_registry(),
        RoutingTable::new(default_routing_config()),
        EngineSettings::default(),
    )
}

fn demo_document(file_name: &str) -> UploadedDocument {
    UploadedDocument {
        file_name: file_name.to_string(),
        content_type: "application/pdf".to_string(),
        storage_key: format!("local/demo/{file_name}"),
    }
}

fn demo_submission(args: &DemoArgs) -> LoanSubmission {
    let mut documents = vec![
        demo_document("pan_card.pdf"),
        demo_document("gst_certificate.pdf"),
        demo_document("partnership_deed.pdf"),
    ];
    if !args.without_bank_statements {
        documents.push(demo_document("bank_statement_h1.pdf"));
        documents.push(demo_document("bank_statement_h2.pdf"));
    }

    LoanSubmission {
        applicant_name: args.applicant.clone(),
        loan_context: LoanContext {
            loan_type: "working_capital".to_string(),
            loan_amount: args.loan_amount,
            tenure_months: Some(36),
            purpose: Some("inventory purchase".to_string()),
        },
        documents,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let engine = Arc::new(build_engine(Arc::new(InMemoryCheckpointStore::default())));

    println!("MSME underwriting demo");
    let submission = demo_submission(&args);
    println!(
        "  applicant: {} (amount {}, {} documents)",
        submission.applicant_name,
        submission.loan_context.loan_amount,
        submission.documents.len()
    );

    let created = engine.create(submission).await?;
    println!("  thread: {}", created.thread_id);

    let finished = engine.run_to_completion(&created.thread_id).await?;

    println!("\nStage timeline");
    for record in &finished.stage_history {
        println!(
            "  {:<28} {:?}  {}",
            record.stage.label(),
            record.disposition,
            record.routing_reason.as_deref().unwrap_or("-")
        );
    }

    let view = finished.status_view();
    println!("\nOutcome: {} (version {})", view.status, view.version);
    println!("  rationale: {}", view.decision_rationale);
    if let Some(missing) = &view.missing {
        println!("  awaiting:");
        for item in missing {
            println!("    {} ({})", item.name, item.reason);
        }
    }

    Ok(())
}

async fn resume_sweep(
    engine: &OrchestrationEngine<InMemoryCheckpointStore>,
    lookback_secs: i64,
) -> Result<ResumeReport, AppError> {
    let cutoff = Utc::now() - Duration::seconds(lookback_secs);
    Ok(engine.resume_all(cutoff).await?)
}

pub(crate) async fn run_resume(args: ResumeArgs) -> Result<(), AppError> {
    let engine = build_engine(Arc::new(InMemoryCheckpointStore::default()));
    let report = resume_sweep(&engine, args.lookback_secs).await?;

    println!("Resume sweep (lookback {}s)", args.lookback_secs);
    println!("  resumed: {}", report.resumed.len());
    for thread_id in &report.resumed {
        println!("    {thread_id}");
    }
    println!("  skipped: {}", report.skipped.len());
    for thread_id in &report.skipped {
        println!("    {thread_id}");
    }

    Ok(())
}
