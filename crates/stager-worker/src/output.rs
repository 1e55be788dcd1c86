//! Rendering of job results and records
//!
//! Human output goes to stdout with status marks; `--json` prints one JSON
//! document per command using the payload's field names.

use stager_core::domain::JobId;
use stager_core::ports::JobRecord;
use stager_worker::JobOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

pub trait OutputFormatter {
    fn outcome(&self, id: &JobId, outcome: &JobOutcome);
    fn record(&self, job: &JobRecord);
    fn records(&self, jobs: &[JobRecord]);
    fn error(&self, message: &str);
}

pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn outcome(&self, id: &JobId, outcome: &JobOutcome) {
        let p = outcome.result.progress;
        match &outcome.error {
            None => println!("\u{2713} Job {id} succeeded: {}/{} files", p.processed, p.total),
            Some(e) => {
                eprintln!("\u{2717} Job {id} {}: {e}", outcome.status);
                println!("  {} of {} files processed, {} failed", p.processed, p.total, p.failed);
            }
        }
    }

    fn record(&self, job: &JobRecord) {
        let p = job.progress;
        println!("Job {}: {}", job.id, job.status);
        println!("  Source:      {}", job.payload.src_url);
        println!("  Destination: {}", job.payload.dst_url);
        println!("  Stager user: {}", job.payload.stager_user);
        println!("  Attempt:     {}", job.attempt);
        println!(
            "  Progress:    {}/{} ({} failed, {}%)",
            p.processed,
            p.total,
            p.failed,
            p.percent()
        );
        if let Some(reason) = &job.reason {
            println!("  Reason:      {reason}");
        }
        println!("  Updated:     {}", job.updated_at.to_rfc3339());
    }

    fn records(&self, jobs: &[JobRecord]) {
        if jobs.is_empty() {
            println!("No jobs recorded yet");
        }
        for job in jobs {
            println!(
                "{:<36}  {:<9}  {:>3}%  {}",
                job.id.as_str(),
                job.status.as_str(),
                job.progress.percent(),
                job.payload.title
            );
        }
    }

    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn print(value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

impl OutputFormatter for JsonFormatter {
    fn outcome(&self, id: &JobId, outcome: &JobOutcome) {
        Self::print(&serde_json::json!({
            "id": id.as_str(),
            "status": outcome.status.as_str(),
            "attempt": outcome.attempt,
            "result": outcome.result,
            "error": outcome.error.as_ref().map(ToString::to_string),
        }));
    }

    fn record(&self, job: &JobRecord) {
        Self::print(&record_json(job));
    }

    fn records(&self, jobs: &[JobRecord]) {
        Self::print(&serde_json::json!({
            "jobs": jobs.iter().map(record_json).collect::<Vec<_>>(),
        }));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({ "success": false, "error": message }));
    }
}

fn record_json(job: &JobRecord) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.as_str(),
        "title": job.payload.title,
        "status": job.status.as_str(),
        "attempt": job.attempt,
        "result": job.result(),
        "reason": job.reason,
        "srcURL": job.payload.src_url,
        "dstURL": job.payload.dst_url,
        "stagerUser": job.payload.stager_user,
        "createdAt": job.created_at.to_rfc3339(),
        "updatedAt": job.updated_at.to_rfc3339(),
    })
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}
