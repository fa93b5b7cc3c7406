//! Command handlers for store operations

use std::fs;
use std::io::stderr;
use std::path::Path;
use std::result::Result as StdResult;

use magpie_core::{Error, IngestDocument, MagpieConfig, Result};
use magpie_knowledge::{EmbeddingProvider, RetrievalService};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};
use walkdir::WalkDir;

use crate::cli::Cli;

/// File extensions picked up when ingesting a directory.
const INGESTIBLE_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Characters of chunk text shown per search hit.
const PREVIEW_CHARS: usize = 100;

/// Install the stderr tracing subscriber.
///
/// `RUST_LOG` overrides the default filter, which keeps the magpie crates
/// at info level.
pub fn init_logging() {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "magpie_core=info,magpie_knowledge=info,magpie_cli=info".into()
        }))
        .with(fmt::layer().with_writer(stderr).with_target(false))
        .init();
}

/// Load configuration, applying the CLI's overrides.
///
/// # Errors
/// Returns an error if the config file cannot be read or parsed.
pub fn resolve_config(cli: &Cli) -> Result<MagpieConfig> {
    let mut config = cli.config.as_ref().map_or_else(
        MagpieConfig::load_or_create,
        |path| MagpieConfig::load_from_file(path),
    )?;
    if let Some(store) = &cli.store {
        config.store_dir.clone_from(store);
    }
    Ok(config)
}

/// Ingest a file or directory into the store.
///
/// A directory contributes every `.txt`/`.md` file under it, each as its
/// own document with the file stem as source. A single file uses
/// `source` when given and its file name otherwise.
///
/// # Errors
/// Returns an error if the path does not exist or no ingestible files
/// are found; unreadable files inside a directory are logged and
/// skipped, not fatal.
pub async fn handle_ingest<E: EmbeddingProvider>(
    service: &RetrievalService<E>,
    path: &Path,
    source: Option<String>,
    category: &str,
    internal: bool,
) -> Result<()> {
    let documents = collect_documents(path, source, category, internal)?;
    if documents.is_empty() {
        return Err(Error::MalformedDocument(format!(
            "no ingestible files under {}",
            path.display()
        )));
    }

    let report = service.ingest_batch(documents).await;
    info!(
        "Ingested {} of {} documents ({} chunks written, {} skipped, {} failed)",
        report.ingested,
        report.documents(),
        report.chunks,
        report.skipped,
        report.failed
    );
    Ok(())
}

/// Search the store and log the ranked hits.
///
/// # Errors
/// Returns an error if the query cannot be embedded.
pub async fn handle_search<E: EmbeddingProvider>(
    service: &RetrievalService<E>,
    query: &str,
    limit: usize,
    include_internal: bool,
) -> Result<()> {
    let hits = service.search(query, limit, !include_internal).await?;
    if hits.is_empty() {
        info!("No results for '{query}'");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        info!(
            "{}. [{:.3}] {} ({}): {}",
            rank + 1,
            hit.similarity,
            hit.id,
            hit.metadata.category,
            preview(&hit.text)
        );
    }
    Ok(())
}

/// Log aggregate store statistics.
pub async fn handle_stats<E: EmbeddingProvider>(service: &RetrievalService<E>) {
    let stats = service.stats().await;
    info!(
        "{} chunks across {} sources (last updated {})",
        stats.total_chunks,
        stats.sources.len(),
        stats.last_updated
    );
    for (source, count) in &stats.sources {
        info!("  {source}: {count} chunks");
    }
}

/// Gather ingest documents from a file or directory.
fn collect_documents(
    path: &Path,
    source: Option<String>,
    category: &str,
    internal: bool,
) -> Result<Vec<IngestDocument>> {
    if path.is_file() {
        let text = fs::read_to_string(path)?;
        let source = source.unwrap_or_else(|| file_label(path));
        return Ok(vec![
            IngestDocument::text(text, source, category.to_owned()).with_visibility(!internal),
        ]);
    }
    if !path.is_dir() {
        return Err(Error::MalformedDocument(format!(
            "{} is neither a file nor a directory",
            path.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(path)
        .into_iter()
        .filter_map(StdResult::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let file_path = entry.path();
        let ingestible = file_path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| INGESTIBLE_EXTENSIONS.contains(&extension));
        if !ingestible {
            continue;
        }

        match fs::read_to_string(file_path) {
            Ok(text) => {
                documents.push(
                    IngestDocument::text(text, file_label(file_path), category.to_owned())
                        .with_visibility(!internal),
                );
            }
            Err(error) => warn!("Skipping unreadable file {}: {error}", file_path.display()),
        }
    }
    Ok(documents)
}

/// Source label for a file: the stem for directory walks keeps labels
/// stable when files are renamed between extensions.
fn file_label(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map_or_else(|| path.display().to_string(), |name| {
            name.to_string_lossy().into_owned()
        })
}

/// One-line preview of chunk text for log output.
fn preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    if flattened.chars().count() <= PREVIEW_CHARS {
        flattened
    } else {
        let mut shortened: String = flattened.chars().take(PREVIEW_CHARS).collect();
        shortened.push('…');
        shortened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_documents_from_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("faq.txt"), "Question and answer.").unwrap();
        fs::write(temp.path().join("notes.md"), "# Notes").unwrap();
        fs::write(temp.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let documents = collect_documents(temp.path(), None, "docs", false).unwrap();
        let mut sources: Vec<&str> = documents
            .iter()
            .map(|document| document.source())
            .collect();
        sources.sort_unstable();
        assert_eq!(
            sources,
            vec!["faq", "notes"],
            "Only text-like files are picked up, labeled by stem"
        );
    }

    #[test]
    fn test_collect_single_file_with_override() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("dump.txt");
        fs::write(&file, "Body.").unwrap();

        let documents =
            collect_documents(&file, Some("handbook".to_owned()), "policy", true).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].source(), "handbook");
        assert!(
            !documents[0].visible_to_client(),
            "The internal flag hides the document from clients"
        );
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = collect_documents(&temp.path().join("absent"), None, "docs", false);
        assert!(result.is_err(), "A missing path cannot be ingested");
    }

    #[test]
    fn test_preview_truncates_and_flattens() {
        let long = "word ".repeat(50);
        let shortened = preview(&long);
        assert!(shortened.chars().count() <= PREVIEW_CHARS + 1);
        assert!(shortened.ends_with('…'), "Truncation is marked");
        assert_eq!(preview("line one\nline two"), "line one line two");
    }
}
