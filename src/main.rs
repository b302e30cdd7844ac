use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use biogate::capture::FileCaptureSource;
use biogate::storage::FileTemplateStore;
use biogate::{codec, config, identity, BiometricEngine, Modality, VerificationStatus};
use biogate_engine::{CaptureDevice, JsonFeatureDecoder};
use clap::{Parser, Subcommand};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "biogate")]
#[command(
    version,
    about = "Face and fingerprint enrollment and verification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a modality from several capture sessions
    Enroll {
        /// Person to enroll (defaults to current user)
        #[arg(short, long)]
        user: Option<String>,
        /// face or fingerprint
        #[arg(short, long)]
        modality: Modality,
        /// Number of sessions to fuse (defaults to config)
        #[arg(short, long)]
        samples: Option<usize>,
        /// Feature buffers, one per capture session
        #[arg(short, long, required = true, num_args = 1..)]
        capture: Vec<PathBuf>,
    },
    /// Verify a person against their enrolled templates
    Verify {
        /// Person to verify (defaults to current user)
        #[arg(short, long)]
        user: Option<String>,
        /// Face feature buffer to verify with
        #[arg(long)]
        face: Option<PathBuf>,
        /// Fingerprint feature buffer to verify with
        #[arg(long)]
        fingerprint: Option<PathBuf>,
    },
    /// Capture one sample and report its quality without matching
    Capture {
        #[arg(short, long)]
        modality: Modality,
        /// Feature buffer to assess
        file: PathBuf,
    },
    /// Score two encoded templates against each other
    Compare {
        #[arg(short, long)]
        modality: Modality,
        /// File holding the stored (reference) template
        stored: PathBuf,
        /// File holding the probe template
        probe: PathBuf,
    },
    /// Remove all enrolled templates and outcomes for a person
    Purge {
        /// Person to purge (defaults to current user)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    let person = |user: Option<String>| match user {
        Some(user) => Ok(user),
        None => identity::default_person_id(),
    };

    match cli.command {
        Commands::Enroll {
            user,
            modality,
            samples,
            capture,
        } => enroll(&cfg, &person(user)?, modality, samples, capture),
        Commands::Verify {
            user,
            face,
            fingerprint,
        } => verify(&cfg, &person(user)?, face, fingerprint),
        Commands::Capture { modality, file } => capture(&cfg, modality, file),
        Commands::Compare {
            modality,
            stored,
            probe,
        } => compare(&cfg, modality, &stored, &probe),
        Commands::Purge { user } => purge(&cfg, &person(user)?),
        Commands::Config => open_config(),
    }
}

fn build_engine(
    cfg: &config::Config,
    face: Vec<PathBuf>,
    fingerprint: Vec<PathBuf>,
) -> Result<BiometricEngine> {
    let timeout = cfg.engine.capture_timeout();
    let store = Arc::new(FileTemplateStore::new(&cfg.store_dir));
    let mut builder = BiometricEngine::builder(cfg.engine.clone()).store(store);

    if !face.is_empty() {
        let source = FileCaptureSource::new(&cfg.camera, face);
        let device = CaptureDevice::new(&cfg.camera, source, timeout)
            .context("Failed to start camera")?;
        builder = builder.face(device, JsonFeatureDecoder);
    }
    if !fingerprint.is_empty() {
        let source = FileCaptureSource::new(&cfg.scanner, fingerprint);
        let device = CaptureDevice::new(&cfg.scanner, source, timeout)
            .context("Failed to start scanner")?;
        builder = builder.fingerprint(device, JsonFeatureDecoder);
    }
    Ok(builder.build())
}

fn enroll(
    cfg: &config::Config,
    person: &str,
    modality: Modality,
    samples: Option<usize>,
    capture: Vec<PathBuf>,
) -> Result<()> {
    let samples = samples.unwrap_or(cfg.engine.enroll_samples);
    if capture.len() < samples {
        warn!(
            "{} capture file(s) for {} sample(s); enrollment will fail when they run out",
            capture.len(),
            samples
        );
    }

    let (face, fingerprint) = match modality {
        Modality::Face => (capture, vec![]),
        Modality::Fingerprint => (vec![], capture),
    };
    let engine = build_engine(cfg, face, fingerprint)?;

    let template = engine
        .enroll(person, modality, samples)
        .with_context(|| format!("Failed to enroll {modality} for {person}"))?;
    engine.shutdown();

    match &template {
        biogate::StoredTemplate::Face(encoding) => {
            info!("Stored face encoding with {} values", encoding.len())
        }
        biogate::StoredTemplate::Fingerprint(template) => info!(
            "Stored fingerprint template: {} minutiae, quality {:.3}",
            template.points.len(),
            template.quality_score
        ),
    }
    Ok(())
}

fn verify(
    cfg: &config::Config,
    person: &str,
    face: Option<PathBuf>,
    fingerprint: Option<PathBuf>,
) -> Result<()> {
    info!("Verifying {}", person);
    let engine = build_engine(
        cfg,
        face.into_iter().collect(),
        fingerprint.into_iter().collect(),
    )?;

    let outcome = engine
        .verify_enrolled(person)
        .context("Failed to load enrolled templates")?;
    engine.shutdown();

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    match outcome.status {
        VerificationStatus::Approved => {
            info!("✓ {}", outcome.message());
            Ok(())
        }
        VerificationStatus::Partial => {
            warn!("{}", outcome.message());
            Ok(())
        }
        _ => anyhow::bail!("Verification rejected: {}", outcome.message()),
    }
}

fn capture(cfg: &config::Config, modality: Modality, file: PathBuf) -> Result<()> {
    let (face, fingerprint) = match modality {
        Modality::Face => (vec![file], vec![]),
        Modality::Fingerprint => (vec![], vec![file]),
    };
    let engine = build_engine(cfg, face, fingerprint)?;
    let report = engine
        .assess_capture(modality)
        .with_context(|| format!("Failed to capture {modality}"))?;
    engine.shutdown();

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.accepted {
        info!("✓ {modality} capture usable (quality {:.3})", report.score);
    } else {
        for tip in &report.recommendations {
            warn!("{tip}");
        }
    }
    Ok(())
}

fn compare(
    cfg: &config::Config,
    modality: Modality,
    stored: &Path,
    probe: &Path,
) -> Result<()> {
    let read = |path: &Path| -> Result<_> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        codec::decode_template(modality, &text)
            .with_context(|| format!("decoding {}", path.display()))
    };
    let stored = read(stored)?;
    let probe = read(probe)?;

    let score = cfg.engine.scorer().compare(&stored, &probe)?;
    println!("{}", serde_json::to_string_pretty(&score)?);
    Ok(())
}

fn purge(cfg: &config::Config, person: &str) -> Result<()> {
    info!("Purging enrolled templates for {}", person);

    FileTemplateStore::new(&cfg.store_dir)
        .purge(person)
        .context("Failed to purge templates")?;

    info!("✓ All templates purged for {}", person);
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
