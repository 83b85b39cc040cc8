use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use isaac_assistant::{
    AssistantConfig, CaseInput, CollectionTarget, Orchestrator, ResponseLength, SessionView,
};
use isaac_core::{estimate_tokens, ChunkConfig, SourceFormat, TokenizerKind};
use isaac_rag::{
    index_sources, CollectionSummary, EmbeddingClient, EngineFactory, RagEngineFactory, RagStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "isaac", version = VERSION, about = "ISAAC-Sepsis-3-RAG operator CLI")]
struct Cli {
    /// Configuration file; falls back to `ISAAC_CONFIG`, then `isaac.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the configured vector stores and their collections.
    Init,
    /// List collections in the configured stores (or one explicit store).
    Collections {
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Chunk, embed and store guideline text files.
    Index {
        /// Workflow step (management, antibiotics, guidelines) or collection name.
        collection: String,
        /// Files, directories or glob patterns.
        inputs: Vec<PathBuf>,
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, default_value_t = ChunkConfig::default().max_tokens)]
        max_tokens: usize,
        #[arg(long, default_value_t = ChunkConfig::default().overlap_tokens)]
        overlap_tokens: usize,
    },
    /// Ask one question against one collection.
    Ask {
        collection: String,
        question: String,
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, default_value = "cl100k")]
        tokenizer: String,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Run a whole case through the three workflow steps.
    Assess {
        #[arg(long = "case")]
        case: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        short: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

/// Case file accepted by `assess`: the six fields plus an optional length.
#[derive(Debug, Deserialize)]
struct CaseFile {
    #[serde(flatten)]
    case: CaseInput,
    #[serde(default)]
    response_length: Option<ResponseLength>,
}

#[derive(Debug, Serialize)]
struct StoreListing {
    store: PathBuf,
    collections: Vec<CollectionSummary>,
}

#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    collection: &'a str,
    answer: &'a str,
    answer_tokens: usize,
    sources: &'a [isaac_rag::SourcePassage],
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AssistantConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            for (step, target) in config.collections.iter() {
                let store = RagStore::open(&target.path)?;
                store.ensure_collection(&target.collection)?;
                println!(
                    "{step}: {} -> {}",
                    target.collection,
                    store.path().display()
                );
            }
        }
        Commands::Collections { store, json } => {
            let paths: Vec<PathBuf> = match store {
                Some(path) => vec![path],
                None => config
                    .collections
                    .iter()
                    .map(|(_, target)| target.path.clone())
                    .collect(),
            };
            let mut listings = Vec::new();
            for path in dedup_paths(paths) {
                if !path.exists() {
                    warn!(store = %path.display(), "store not initialised; run `isaac init`");
                    continue;
                }
                let store = RagStore::open(&path)?;
                listings.push(StoreListing {
                    store: path,
                    collections: store.list_collections()?,
                });
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else {
                for listing in &listings {
                    println!("{}", listing.store.display());
                    for summary in &listing.collections {
                        println!(
                            "  {:<40} docs={:<5} passages={:<6} embedding={}",
                            summary.name,
                            summary.documents,
                            summary.passages,
                            summary.embedding_model.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }
        Commands::Index {
            collection,
            inputs,
            store,
            max_tokens,
            overlap_tokens,
        } => {
            let target = resolve_target(&config, &collection, store)?;
            let files = gather_input_files(&inputs)?;
            if files.is_empty() {
                bail!("no .txt or .md files matched for indexing");
            }
            if overlap_tokens >= max_tokens {
                bail!("--overlap-tokens must be smaller than --max-tokens");
            }
            let store = RagStore::open(&target.path)?;
            let embeddings = EmbeddingClient::new(&config.embedding)?;
            let report = index_sources(
                &store,
                &embeddings,
                &target.collection,
                &files,
                ChunkConfig {
                    max_tokens,
                    overlap_tokens,
                },
            )
            .await?;
            info!(
                collection = %report.collection,
                documents = report.documents_indexed,
                skipped = report.documents_skipped,
                passages = report.passages_indexed,
                "index complete"
            );
            println!(
                "Indexed {} document(s) ({} skipped), {} passage(s) into {}",
                report.documents_indexed,
                report.documents_skipped,
                report.passages_indexed,
                report.collection
            );
        }
        Commands::Ask {
            collection,
            question,
            store,
            tokenizer,
            json,
        } => {
            let target = resolve_target(&config, &collection, store)?;
            let tokenizer: TokenizerKind = tokenizer.parse()?;
            let factory = RagEngineFactory::new(config.engine_settings());
            let engine = factory.create_query_engine(&target.path, &target.collection)?;
            let response = tokio::time::timeout(config.query_timeout(), engine.query(&question))
                .await
                .map_err(|_| anyhow!("query timed out after {:?}", config.query_timeout()))??;
            let answer_tokens = estimate_tokens(&response.content, &tokenizer)?;
            if json {
                let output = AskOutput {
                    collection: engine.collection(),
                    answer: &response.content,
                    answer_tokens,
                    sources: &response.sources,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{response}");
                println!();
                for (idx, source) in response.sources.iter().enumerate() {
                    println!(
                        "[{}] {} (passage {}, score {:.3})",
                        idx + 1,
                        source.document_source,
                        source.chunk_index,
                        source.score
                    );
                }
                println!("~{answer_tokens} {} tokens", tokenizer.as_str());
            }
        }
        Commands::Assess { case, short, json } => {
            let case_file = load_case_file(&case)?;
            let length = if short {
                ResponseLength::Short
            } else {
                case_file.response_length.unwrap_or_default()
            };
            let view = assess_case(&config, case_file.case, length).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print!("{}", view.render_text());
            }
        }
    }
    Ok(())
}

/// Runs every step in order; failures stay visible in the returned view.
async fn assess_case(
    config: &AssistantConfig,
    case: CaseInput,
    length: ResponseLength,
) -> SessionView {
    let orchestrator = Orchestrator::from_config(config);
    orchestrator.set_inputs(case);
    orchestrator.set_response_length(length);
    orchestrator.submit().await;
    if let Err(err) = orchestrator.verify().await {
        warn!(error = %err, "could not format case for display");
    }
    if let Err(err) = orchestrator.recommend_management().await {
        warn!(error = %err, "management recommendation failed");
    }
    if let Err(err) = orchestrator.recommend_antibiotics().await {
        warn!(error = %err, "antibiotic recommendation failed");
    }
    if let Err(err) = orchestrator.assess_compliance().await {
        warn!(error = %err, "compliance check failed");
    }
    orchestrator.view()
}

fn load_case_file(path: &Path) -> Result<CaseFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read case file {}", path.display()))?;
    let case: CaseFile =
        toml::from_str(&raw).with_context(|| format!("invalid case file {}", path.display()))?;
    if case.case.is_blank() {
        warn!(path = %path.display(), "case file has no clinical content");
    }
    Ok(case)
}

/// Maps a step name or collection name onto a configured target. `--store`
/// overrides the path, and is required for collections outside the
/// configuration.
fn resolve_target(
    config: &AssistantConfig,
    name: &str,
    store: Option<PathBuf>,
) -> Result<CollectionTarget> {
    let configured = config
        .collections
        .iter()
        .find(|(step, target)| *step == name || target.collection == name)
        .map(|(_, target)| target.clone());
    match (configured, store) {
        (Some(target), Some(path)) => Ok(CollectionTarget::new(path, target.collection)),
        (Some(target), None) => Ok(target),
        (None, Some(path)) => Ok(CollectionTarget::new(path, name)),
        (None, None) => Err(anyhow!(
            "collection {name} is not configured; pass --store to name its vector store"
        )),
    }
}

fn gather_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let input_str = input.to_string_lossy();
        if input_str.contains('*') || input_str.contains('?') || input_str.contains('[') {
            for entry in glob(&input_str)? {
                let path = entry?;
                if path.is_file() {
                    files.push(path);
                }
            }
            continue;
        }
        let meta = fs::metadata(input)
            .with_context(|| format!("failed to inspect {}", input.display()))?;
        if meta.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                files.push(entry.path().to_path_buf());
            }
        } else if meta.is_file() {
            files.push(input.clone());
        }
    }
    files.retain(|path| {
        let supported = SourceFormat::detect(path).is_some();
        if !supported {
            warn!(path = %path.display(), "skipping unsupported file");
        }
        supported
    });
    Ok(files)
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = Vec::new();
    for path in paths {
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_supported_files_from_directories_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();
        fs::write(dir.path().join("a.txt"), "A").unwrap();
        fs::write(dir.path().join("scan.pdf"), "%PDF").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.markdown"), "C").unwrap();

        let files = gather_input_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt", "b.md", "c.markdown"]);

        let pattern = dir.path().join("*.md");
        let files = gather_input_files(&[pattern]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(gather_input_files(&[dir.path().join("missing.txt")]).is_err());
    }

    #[test]
    fn resolves_steps_collections_and_explicit_stores() {
        let config = AssistantConfig::default();
        let target = resolve_target(&config, "antibiotics", None).unwrap();
        assert_eq!(target.collection, "sepsis_antibiotic_recommendations");
        let target = resolve_target(&config, "sepsis_management_guidelines", None).unwrap();
        assert_eq!(target.path, PathBuf::from("data/sepsis_guidelines_chroma_db"));
        let target =
            resolve_target(&config, "management", Some(PathBuf::from("/tmp/mgmt"))).unwrap();
        assert_eq!(target.path, PathBuf::from("/tmp/mgmt"));
        assert_eq!(target.collection, "sepsis_management");
        assert!(resolve_target(&config, "pediatric_sepsis", None).is_err());
        let target =
            resolve_target(&config, "pediatric_sepsis", Some(PathBuf::from("/tmp/peds"))).unwrap();
        assert_eq!(target.collection, "pediatric_sepsis");
    }

    #[test]
    fn case_file_reads_fields_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.toml");
        fs::write(
            &path,
            "diagnosis = \"septic shock\"\nspecial_comments = \"CAP\"\nresponse_length = \"Short response\"\n",
        )
        .unwrap();
        let case = load_case_file(&path).unwrap();
        assert_eq!(case.case.diagnosis, "septic shock");
        assert_eq!(case.case.vital_signs, "");
        assert_eq!(case.response_length, Some(ResponseLength::Short));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let paths = vec![
            PathBuf::from("data/a"),
            PathBuf::from("data/b"),
            PathBuf::from("data/a"),
        ];
        assert_eq!(
            dedup_paths(paths),
            [PathBuf::from("data/a"), PathBuf::from("data/b")]
        );
    }

    #[test]
    fn cli_parses_assess_flags() {
        let cli = Cli::try_parse_from(["isaac", "assess", "--case", "case.toml", "--short"]).unwrap();
        match cli.command {
            Commands::Assess { case, short, json } => {
                assert_eq!(case, PathBuf::from("case.toml"));
                assert!(short);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
