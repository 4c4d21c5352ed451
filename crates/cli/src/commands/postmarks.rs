//! Postmark resolution for a sheet.
//!
//! Each receiver file fills one label slot, in sheet order. Missing postmarks
//! are bought after the operator confirms the quote on the terminal.
//!
//! # Environment Variables
//!
//! See `stampdesk_postage::config` for the Internetmarke account settings.
//! They are only read when something has to be bought; a sheet whose
//! postmarks are all cached needs just `STAMPDESK_MARKS_DIR`.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use stampdesk_core::{LabelSlot, Product, ProductCode, PurchaseRequest, parse_address};
use stampdesk_postage::{
    AutoConfirm, CacheError, ConfigError, InternetmarkeClient, JobStatus, PostageConfig, PostmarkCache, PostmarkJobs,
    PurchaseConfirmation, PurchaseOrchestrator, PurchaseQuote, ResolveError, SlotPostmarks,
};
use tracing::info;

use super::read_label;
use crate::error::CliError;

/// Options shared by all slots.
pub struct Options {
    pub product: Option<ProductCode>,
    pub date: NaiveDate,
    pub yes: bool,
    pub out: PathBuf,
}

/// Asks on the terminal before paying.
struct TerminalConfirmation;

#[async_trait]
impl PurchaseConfirmation for TerminalConfirmation {
    #[allow(clippy::print_stdout)]
    async fn confirm(&self, quote: &PurchaseQuote) -> bool {
        println!("{}", quote.summary());
        println!("Buy these postmarks? [y/N]");

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        matches!(answer, Ok(Ok(line)) if is_yes(&line))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "j" | "ja")
}

/// Build the purchase request for one slot.
fn request_for(
    slot: LabelSlot,
    receiver_text: String,
    options: &Options,
) -> Result<PurchaseRequest, CliError> {
    let product = match options.product {
        Some(code) => Product::find(code)?,
        None => {
            let country = stampdesk_core::resolve_country(&parse_address(&receiver_text).country);
            Product::default_for(&country).ok_or(CliError::NoDefaultProduct(country))?
        }
    };
    Ok(PurchaseRequest::for_product(
        slot,
        receiver_text,
        &product,
        options.date,
    ))
}

/// Resolve postmarks for the given receiver files and write `slot-<n>.png`.
pub async fn resolve(files: &[PathBuf], options: &Options) -> Result<(), CliError> {
    let mut requests = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let slot = LabelSlot::from_index(index)?;
        requests.push(request_for(slot, read_label(file).await?, options)?);
    }

    let cache = PostmarkCache::new(PostageConfig::marks_dir_from_env());
    resolve_requests(requests, cache, options, PostageConfig::from_env).await
}

/// Serve a sheet from `cache` if possible, otherwise buy through the account
/// that `load_config` describes.
async fn resolve_requests(
    requests: Vec<PurchaseRequest>,
    cache: PostmarkCache,
    options: &Options,
    load_config: impl FnOnce() -> Result<PostageConfig, ConfigError>,
) -> Result<(), CliError> {
    if let Some(cached) = read_all_cached(&cache, &requests)? {
        info!(count = cached.len(), "All postmarks cached");
        let slots = cached.iter().map(|(slot, bytes)| (*slot, bytes.as_slice()));
        return write_slots(slots, &options.out).await;
    }

    let config = load_config()?;
    let client = InternetmarkeClient::new(config.internetmarke.clone(), &config.sender);
    let orchestrator = PurchaseOrchestrator::new(Arc::new(client), cache);
    let confirmation: Arc<dyn PurchaseConfirmation> = if options.yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalConfirmation)
    };

    let (jobs, mut updates) = PostmarkJobs::new(Arc::new(orchestrator), confirmation);
    let job_id = jobs.submit(requests);
    // Drop our sender handle so the channel closes when the job ends
    drop(jobs);

    while let Some(update) = updates.recv().await {
        if update.job_id != job_id {
            continue;
        }
        match update.status {
            JobStatus::Running => info!(job_id = %job_id, "Resolving postmarks"),
            JobStatus::Completed(postmarks) => return write_postmarks(&postmarks, &options.out).await,
            JobStatus::Failed { error, .. } => {
                if let ResolveError::CacheWrite { postmarks, .. } = &error {
                    write_postmarks(postmarks, &options.out).await?;
                }
                return Err(error.into());
            }
        }
    }
    Err(CliError::JobLost)
}

/// Every request's postmark from the cache, or `None` if any is missing.
fn read_all_cached(
    cache: &PostmarkCache,
    requests: &[PurchaseRequest],
) -> Result<Option<Vec<(LabelSlot, Vec<u8>)>>, CliError> {
    let mut cached = Vec::with_capacity(requests.len());
    for request in requests {
        match cache.read(&request.key()) {
            Ok(bytes) => cached.push((request.slot, bytes)),
            Err(CacheError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(ResolveError::Cache(e).into()),
        }
    }
    Ok(Some(cached))
}

/// Write every resolved slot to `<out>/slot-<n>.png` (n starting at 1).
async fn write_postmarks(postmarks: &SlotPostmarks, out: &Path) -> Result<(), CliError> {
    let slots = postmarks
        .iter()
        .filter_map(|(slot, postmark)| postmark.bytes().map(|bytes| (slot, bytes)));
    write_slots(slots, out).await
}

async fn write_slots<'a>(
    slots: impl Iterator<Item = (LabelSlot, &'a [u8])>,
    out: &Path,
) -> Result<(), CliError> {
    tokio::fs::create_dir_all(out)
        .await
        .map_err(|e| CliError::file(out, e))?;

    for (slot, bytes) in slots {
        let path = out.join(format!("slot-{}.png", slot.index() + 1));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CliError::file(&path, e))?;
        info!(slot = %slot, path = %path.display(), "Postmark written");
    }
    Ok(())
}
