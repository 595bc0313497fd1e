use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use vigil_core::{
    best_detection, to_similarity_score, DecisionPolicy, Descriptor, DescriptorSource,
    DistanceMatcher, EnrollmentRecord, Gallery, IdentityId, MatchResult, Matcher,
};
use vigil_store::Store;

mod detections;

use detections::JsonDetectionSource;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Vigil identity verification CLI")]
struct Cli {
    /// Enrollment store (default: $XDG_DATA_HOME/vigil/gallery.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML decision policy overriding the defaults
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the best detection of a capture into an identity's record
    Enroll {
        /// Identity to enroll (e.g., a visitor ID)
        #[arg(short, long)]
        identity: String,
        /// JSON file of detections from the extraction model
        #[arg(short, long)]
        detections: PathBuf,
    },
    /// Verify a capture against one claimed identity (1:1)
    Verify {
        #[arg(short, long)]
        identity: String,
        #[arg(short, long)]
        detections: PathBuf,
    },
    /// Find which enrolled identity a capture belongs to (1:N)
    Identify {
        #[arg(short, long)]
        detections: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity and all its samples
    Remove {
        identity: String,
    },
    /// Show the similarity and tier a distance maps to under the policy
    Score {
        distance: f32,
    },
    /// Show daemon status
    Status,
}

// D-Bus proxy for the daemon; only the blocking variant is used here.
#[zbus::proxy(
    interface = "io.vigil.Vigil1",
    default_service = "io.vigil.Vigil1",
    default_path = "/io/vigil/Vigil1"
)]
trait Vigil {
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Serialize)]
struct ScoreReport {
    distance: f32,
    similarity: f32,
    tier: vigil_core::ConfidenceTier,
    accepted: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let policy = match cli.policy.as_deref() {
        Some(path) => DecisionPolicy::from_toml_file(path)?,
        None => DecisionPolicy::default(),
    };
    let db_path = cli.db.clone().unwrap_or_else(vigil_store::default_db_path);

    match cli.command {
        Commands::Enroll {
            identity,
            detections,
        } => {
            let identity = IdentityId::new(identity);
            let mut store = Store::open(&db_path)?;
            let captured = capture(&detections)?;
            let Some(best) = best_detection(&captured) else {
                bail!("no face in {}", detections.display());
            };

            let mut gallery = Gallery::new();
            if let Some(record) = store.load_record(&identity, &policy)? {
                gallery.insert_record(record);
            }
            let accepted =
                gallery.enroll(identity.clone(), best.descriptor.clone(), best.quality(), &policy)?;
            if accepted {
                if let Some(record) = gallery.get(&identity) {
                    store.save_record(record)?;
                }
            }

            let samples = gallery.get(&identity).map_or(0, EnrollmentRecord::len);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "identity": identity,
                        "accepted": accepted,
                        "quality": best.quality(),
                        "samples": samples,
                    })
                );
            } else if accepted {
                println!("Enrolled {identity} (quality {:.2}, {samples} sample(s))", best.quality());
            } else {
                println!(
                    "Not enrolled: {identity} already holds {samples} stronger sample(s) than quality {:.2}",
                    best.quality()
                );
            }
        }
        Commands::Verify {
            identity,
            detections,
        } => {
            let identity = IdentityId::new(identity);
            let store = Store::open(&db_path)?;
            let probes = probes(&detections)?;
            let matcher = DistanceMatcher::new(policy)?;
            let record = store
                .load_record(&identity, matcher.policy())?
                .unwrap_or_else(|| EnrollmentRecord::new(identity.clone(), matcher.policy().sample_capacity));

            let result = matcher.verify_any(&probes, &record)?;
            print_result(&result, cli.json)?;
        }
        Commands::Identify { detections } => {
            let store = Store::open(&db_path)?;
            let probes = probes(&detections)?;
            let matcher = DistanceMatcher::new(policy)?;
            let gallery = store.load_gallery(matcher.policy())?;

            let result = matcher.identify_any(&probes, &gallery)?;
            print_result(&result, cli.json)?;
        }
        Commands::List => {
            let store = Store::open(&db_path)?;
            let list = store.list_identities()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No identities enrolled");
            } else {
                for entry in list {
                    println!(
                        "{}\t{} sample(s)\tbest quality {:.2}\t{}",
                        entry.identity, entry.samples, entry.best_quality, entry.stored_at
                    );
                }
            }
        }
        Commands::Remove { identity } => {
            let store = Store::open(&db_path)?;
            let identity = IdentityId::new(identity);
            if store.remove_identity(&identity)? {
                println!("Removed {identity}");
            } else {
                println!("{identity} is not enrolled");
            }
        }
        Commands::Score { distance } => {
            if distance.is_nan() || distance < 0.0 {
                bail!("distance must be non-negative, got {distance}");
            }
            let similarity = to_similarity_score(distance, &policy);
            let report = ScoreReport {
                distance,
                similarity,
                tier: policy.tier(similarity),
                accepted: policy.accepts(similarity),
            };
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "distance {:.4} -> similarity {:.4} ({}, {})",
                    report.distance,
                    report.similarity,
                    report.tier,
                    if report.accepted { "accepted" } else { "rejected" }
                );
            }
        }
        Commands::Status => {
            let connection = zbus::blocking::Connection::system()
                .or_else(|_| zbus::blocking::Connection::session())
                .context("connecting to D-Bus")?;
            let proxy = VigilProxyBlocking::new(&connection)?;
            match proxy.status() {
                Ok(status) => println!("{status}"),
                Err(e) => println!("vigild: not connected ({e})"),
            }
        }
    }

    Ok(())
}

fn capture(path: &Path) -> Result<Vec<vigil_core::Detection>> {
    Ok(JsonDetectionSource::new(path).capture()?)
}

/// Every detection in the file is treated as one probe frame.
fn probes(path: &Path) -> Result<Vec<Descriptor>> {
    let probes: Vec<Descriptor> = capture(path)?.into_iter().map(|d| d.descriptor).collect();
    if probes.is_empty() {
        bail!("no face in {}", path.display());
    }
    Ok(probes)
}

fn print_result(result: &MatchResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    match &result.identity {
        Some(identity) => println!(
            "Match: {identity} (similarity {:.4}, {} confidence)",
            result.similarity, result.tier
        ),
        None => println!("No match (best similarity {:.4})", result.similarity),
    }
    Ok(())
}
