//! Command-line entry point.
//!
//! Usage: `cardsmith <owner-id> [file] [--deck <deck-id>]`. Reads the source
//! document from the given file (binary formats go through the external
//! parsing service when one is configured) or from stdin, runs the pipeline
//! against the given deck or a fresh one, and prints the result as JSON.

use anyhow::{bail, Context, Result};
use cardsmith::core::llm::openai::OpenAiResponsesClient;
use cardsmith::{AppConfig, Database, DocfileClient, Pipeline};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cardsmith <owner-id> [file] [--deck <deck-id>]";

struct CliArgs {
    owner_id: String,
    file: Option<PathBuf>,
    deck_id: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut positional: Vec<String> = Vec::new();
    let mut deck_id = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--deck" {
            let value = args.next().with_context(|| format!("--deck needs a value\n{USAGE}"))?;
            deck_id = Some(value);
        } else {
            positional.push(arg);
        }
    }

    if positional.is_empty() || positional.len() > 2 {
        bail!(USAGE);
    }

    let mut positional = positional.into_iter();
    Ok(CliArgs {
        owner_id: positional.next().unwrap_or_default(),
        file: positional.next().map(PathBuf::from),
        deck_id,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config = AppConfig::load().context("loading configuration")?;
    if config.openai.api_key.is_empty() {
        bail!("no API key configured (set CARDSMITH_OPENAI__API_KEY)");
    }

    let input_text = match &args.file {
        Some(path) => read_document(path, &config).await?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let db = Database::new(&config.database.data_dir)
        .await
        .context("opening database")?;
    tracing::info!(path = %db.path().display(), "database ready");

    let backend = Arc::new(OpenAiResponsesClient::new(
        config.openai.api_key.clone(),
        config.openai.model.clone(),
        config.openai.base_url.clone(),
    ));

    let pipeline = Pipeline::new(backend, Arc::new(db.clone()), db);
    let result = pipeline
        .run(&input_text, &args.owner_id, args.deck_id.as_deref())
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Load a document as text. Plain text and markdown are read directly;
/// anything else needs the external parsing service.
async fn read_document(path: &Path, config: &AppConfig) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if matches!(extension.as_str(), "" | "txt" | "md" | "markdown") {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()));
    }

    let Some(endpoint) = &config.docfile.endpoint else {
        bail!(
            "'{}' is not plain text and no parsing service is configured \
             (set CARDSMITH_DOCFILE__ENDPOINT)",
            path.display()
        );
    };

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let client = DocfileClient::new(endpoint, config.docfile.allow_remote_artifacts);
    client
        .extract_file(&file_name, &bytes)
        .await
        .context("extracting document text")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(parts: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        parts.iter().map(|s| s.to_string())
    }

    #[test]
    fn test_parse_owner_only() {
        let parsed = parse_args(args(&["user-1"])).expect("parses");
        assert_eq!(parsed.owner_id, "user-1");
        assert!(parsed.file.is_none());
        assert!(parsed.deck_id.is_none());
    }

    #[test]
    fn test_parse_file_and_deck_flag() {
        let parsed =
            parse_args(args(&["user-1", "notes.md", "--deck", "deck-7"])).expect("parses");
        assert_eq!(parsed.owner_id, "user-1");
        assert_eq!(parsed.file, Some(PathBuf::from("notes.md")));
        assert_eq!(parsed.deck_id.as_deref(), Some("deck-7"));
    }

    #[test]
    fn test_parse_deck_flag_before_positionals() {
        let parsed = parse_args(args(&["--deck", "deck-7", "user-1"])).expect("parses");
        assert_eq!(parsed.owner_id, "user-1");
        assert_eq!(parsed.deck_id.as_deref(), Some("deck-7"));
    }

    #[test]
    fn test_parse_rejects_bad_invocations() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a", "b", "c"])).is_err());
        assert!(parse_args(args(&["user-1", "--deck"])).is_err());
    }
}
