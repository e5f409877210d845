use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nexwave_core::{
    load_corpus_file, CorpusStore, DetectedFace, EmbeddingOracle, EventIndexer, EventPhoto,
    JsonCorpusStore, MatchOptions, MatchPolicy, MatchResult, MemoryCorpusStore, OracleError,
    SearchError, SelfieSearch,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "nexwave", about = "Find your event photos from a selfie")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match selfie descriptors against a corpus file
    Match {
        /// Corpus JSON file (array of photos with face descriptors)
        #[arg(short, long)]
        corpus: PathBuf,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Search an event's stored descriptors
    Search {
        /// Event identifier
        #[arg(short, long)]
        event: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Store face descriptors for an event's photos
    Index {
        /// Event identifier
        #[arg(short, long)]
        event: String,
        /// Detector output for one photo (JSON array of detected faces); the
        /// file stem is the photo id. Repeat for each photo.
        #[arg(short, long = "photo", required = true)]
        photos: Vec<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the active matching policy
    Policy,
}

#[derive(Args)]
struct QueryArgs {
    /// Selfie descriptor JSON file (array of detected faces); repeat for multiple angles
    #[arg(short, long = "selfie", required = true)]
    selfies: Vec<PathBuf>,
    /// Override the base distance threshold
    #[arg(short, long)]
    threshold: Option<f32>,
    /// Show at most this many results
    #[arg(short, long)]
    limit: Option<usize>,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

/// Reads detector output files: each "image" is the JSON list of faces an
/// external detector produced for one picture.
struct DescriptorFileOracle {
    descriptor_dim: usize,
}

impl EmbeddingOracle for DescriptorFileOracle {
    fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError> {
        let faces: Vec<DetectedFace> =
            serde_json::from_slice(image).map_err(|e| OracleError(e.to_string()))?;
        for (i, face) in faces.iter().enumerate() {
            if face.descriptor.dim() != self.descriptor_dim {
                return Err(OracleError(format!(
                    "face {i} has a {}-dimensional descriptor, expected {}",
                    face.descriptor.dim(),
                    self.descriptor_dim
                )));
            }
        }
        Ok(faces)
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, &config) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) if is_user_facing(&err) => {
            eprintln!("{err}");
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err),
    }
}

fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Match { corpus, query } => {
            let store = corpus_file_store(&corpus)?;
            run_search(config, &store, &corpus_event_id(&corpus), &query)
        }
        Commands::Search { event, query } => {
            let store = JsonCorpusStore::new(&config.store_dir);
            tracing::debug!(store = %store.root().display(), event = %event, "using descriptor store");
            run_search(config, &store, &event, &query)
        }
        Commands::Index {
            event,
            photos,
            json,
        } => run_index(config, &event, &photos, json),
        Commands::Policy => {
            let policy = config.policy()?;
            print_policy(&policy)
        }
    }
}

/// Search outcomes the attendee can act on; reported without an error chain.
fn is_user_facing(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::NoFaceInSelfies | SearchError::EventNotProcessed(_))
    )
}

fn corpus_event_id(path: &Path) -> String {
    path.display().to_string()
}

/// Wrap an explicit corpus file as a single-event store.
fn corpus_file_store(path: &Path) -> Result<MemoryCorpusStore> {
    let photos = load_corpus_file(path)?;
    if photos.is_empty() {
        bail!("corpus file {} contains no photos", path.display());
    }
    let mut store = MemoryCorpusStore::new();
    store.insert(corpus_event_id(path), photos);
    Ok(store)
}

fn run_search<S: CorpusStore>(
    config: &Config,
    store: &S,
    event_id: &str,
    args: &QueryArgs,
) -> Result<()> {
    let matcher = config.matcher()?;
    let policy = matcher.policy().clone();

    let oracle = DescriptorFileOracle {
        descriptor_dim: config.descriptor_dim,
    };
    let selfies = args
        .selfies
        .iter()
        .map(|path| load_selfie(&oracle, path))
        .collect::<Result<Vec<_>>>()?;

    let options = MatchOptions {
        threshold: args.threshold,
    };
    let search = SelfieSearch::new(&matcher, store);
    let matches = search.find_matching_photos(&selfies, event_id, &options)?;

    let shown = &matches[..args.limit.unwrap_or(matches.len()).min(matches.len())];
    if args.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
    } else {
        print_matches(shown, matches.len(), &policy);
    }
    Ok(())
}

/// Read one selfie's detected faces and check every descriptor's width.
fn load_selfie(oracle: &DescriptorFileOracle, path: &Path) -> Result<Vec<DetectedFace>> {
    let raw = std::fs::read(path).with_context(|| format!("reading selfie {}", path.display()))?;
    oracle
        .extract(&raw)
        .with_context(|| format!("parsing selfie {}", path.display()))
}

fn run_index(config: &Config, event_id: &str, paths: &[PathBuf], json: bool) -> Result<()> {
    let photos = paths
        .iter()
        .map(|path| -> Result<EventPhoto> {
            let photo_id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .with_context(|| format!("no photo id in {}", path.display()))?;
            let raw = std::fs::read(path)
                .with_context(|| format!("reading photo descriptors {}", path.display()))?;
            Ok(EventPhoto::new(photo_id, raw))
        })
        .collect::<Result<Vec<_>>>()?;

    let oracle = DescriptorFileOracle {
        descriptor_dim: config.descriptor_dim,
    };
    let mut store = JsonCorpusStore::new(&config.store_dir);
    let summary = EventIndexer::new(&oracle, &mut store).index_event(event_id, &photos, |p| {
        if !json {
            println!(
                "  [{}/{}] {}: {} face(s)",
                p.current, p.total, p.photo_id, p.faces_found
            );
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.total == 0 {
        println!("Event {event_id}: all photos already indexed.");
    } else {
        println!(
            "Event {event_id}: indexed {} of {} photo(s), {} face(s) found, {} unreadable",
            summary.processed, summary.total, summary.faces, summary.failed
        );
    }
    Ok(())
}

fn print_matches(matches: &[MatchResult], total: usize, policy: &MatchPolicy) {
    if matches.is_empty() {
        println!("No matching photos found.");
        println!("Tips: use good lighting, keep your whole face visible, and try a second selfie from another angle.");
        return;
    }

    println!("{total} matching photo(s)");
    for (rank, m) in matches.iter().enumerate() {
        let tier = if m.is_high_confidence(policy) { " *" } else { "" };
        let location = m
            .face_box
            .map(|b| format!(" at ({:.0}, {:.0}) {:.0}x{:.0}", b.x, b.y, b.width, b.height))
            .unwrap_or_default();
        println!(
            "{:>3}. {}  {:>3}%{tier}  distance {:.3}  similarity {:.1}%  selfies {}{location}",
            rank + 1,
            m.photo_id,
            m.confidence,
            m.distance,
            m.cosine_similarity * 100.0,
            m.selfie_match_count,
        );
    }
}

fn print_policy(policy: &MatchPolicy) -> Result<()> {
    let report = serde_json::json!({
        "summary": policy.summary(),
        "policy": policy,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
