use anyhow::{Context, Result};
use log::{error, info, warn};

use super::common::{ClassificationResult, NormalizedMessage, RunReport};
use super::extractor::extract;
use crate::classifier::{Classifier, TextGenerator};
use crate::database::{Database, SummaryRecord};
use crate::imap_client::Mailbox;
use crate::watermark::Watermark;

/// UIDs downloaded per FETCH command
pub const FETCH_BATCH_SIZE: usize = 50;

/// One incremental pass over the mailbox: new messages are fetched,
/// classified and the important ones stored, then the watermark moves past
/// everything that was looked at.
pub struct IngestionPipeline<G: TextGenerator> {
    classifier: Classifier<G>,
    database: Option<Database>,
    watermark: Watermark,
}

impl<G: TextGenerator> IngestionPipeline<G> {
    pub fn new(classifier: Classifier<G>, database: Database, watermark: Watermark) -> Self {
        info!("Initializing ingestion pipeline");
        Self {
            classifier,
            database: Some(database),
            watermark,
        }
    }

    /// Pipeline that never writes: no store, no watermark update.
    pub fn new_dry_run(classifier: Classifier<G>, watermark: Watermark) -> Self {
        info!("🧪 Initializing ingestion pipeline in dry-run mode (no store, no watermark update)");
        Self {
            classifier,
            database: None,
            watermark,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.database.is_none()
    }

    pub fn classifier(&self) -> &Classifier<G> {
        &self.classifier
    }

    pub async fn run<M>(&self, mailbox: &mut M) -> Result<RunReport>
    where
        M: Mailbox + ?Sized,
    {
        let dry_run = self.is_dry_run();
        let previous = self
            .watermark
            .read()
            .with_context(|| format!("Unable to read watermark {}", self.watermark.path().display()))?;
        let mut report = RunReport::new(previous);

        info!("📬 Starting ingestion run (watermark: {:?})", previous);

        if previous.is_none() && !dry_run {
            if let Some(latest) = mailbox.latest_id().await.context("Unable to read latest UID")? {
                self.watermark
                    .advance(latest)
                    .context("Unable to initialize watermark")?;
                info!("🆕 First run: watermark initialized to {}, existing mail is not processed", latest);
                report.initialized = true;
                report.watermark_after = Some(latest);
                return Ok(report);
            }
            info!("Mailbox is empty, nothing to initialize from");
        }

        let ids = mailbox
            .list_ids(previous)
            .await
            .context("Error listing new messages")?;
        report.emails_listed = ids.len();

        if ids.is_empty() {
            info!("No new messages");
            return Ok(report);
        }

        if dry_run {
            println!("\n{}", "=".repeat(80));
            println!("🧪 MODE DRY-RUN - {} message(s) to analyze", ids.len());
            println!("{}", "=".repeat(80));
        }

        for batch in ids.chunks(FETCH_BATCH_SIZE) {
            let mut raw_messages = mailbox
                .fetch_raw(batch)
                .await
                .with_context(|| format!("Error fetching {} message(s)", batch.len()))?;

            for uid in batch {
                let Some(raw) = raw_messages.remove(uid) else {
                    error!("UID {}: missing from fetch response, skipped", uid);
                    report.failure();
                    continue;
                };

                let message = extract(&raw);
                let result = self.classifier.classify(&message).await;

                if !result.is_important {
                    info!(
                        "⏭️  UID {} skipped: '{}' from {}{}",
                        uid,
                        message.subject,
                        message.from_name,
                        result.reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default()
                    );
                    if dry_run {
                        print_decision(&message, &result);
                    }
                    report.skipped();
                    continue;
                }

                match &self.database {
                    Some(db) => {
                        db.upsert(&SummaryRecord::from_message(&message, &result.summary))
                            .await
                            .with_context(|| format!("Unable to store summary for UID {}", uid))?;
                        info!("✅ UID {} stored: '{}' from {}", uid, message.subject, message.from_name);
                        report.stored();
                    }
                    None => {
                        print_decision(&message, &result);
                        report.previewed();
                    }
                }
            }
        }

        // Everything listed has been considered, stored or not
        let highest = ids.iter().copied().max();
        let target = match (previous, highest) {
            (Some(prev), Some(high)) => Some(prev.max(high)),
            (prev, high) => high.or(prev),
        };

        if dry_run {
            info!("Dry-run: watermark left at {:?} (would be {:?})", previous, target);
        } else if target != previous {
            if let Some(target) = target {
                let written = self.watermark.advance(target).context("Unable to advance watermark")?;
                report.watermark_after = Some(written);
            }
        }

        if report.emails_failed > 0 {
            warn!("{} message(s) could not be processed", report.emails_failed);
        }
        let kept = if dry_run {
            format!("{} important (dry-run, not stored)", report.emails_previewed)
        } else {
            format!("{} stored", report.emails_stored)
        };
        info!(
            "🏁 Run completed: {} listed, {}, {} skipped, {} failed, watermark {:?} → {:?}",
            report.emails_listed,
            kept,
            report.emails_skipped,
            report.emails_failed,
            report.watermark_before,
            report.watermark_after
        );

        Ok(report)
    }
}

fn print_decision(message: &NormalizedMessage, result: &ClassificationResult) {
    println!("📧 UID {} | {} | {}", message.uid, message.from_name, message.subject);
    if result.is_important {
        println!("   ⭐ IMPORTANT: {}", result.summary);
    } else {
        println!(
            "   ⏭️  not important{}",
            result.reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default()
        );
    }
    println!("{}", "-".repeat(60));
}
