use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{Args, Parser, Subcommand};
use eegp_lib::{
    features::FeatureKind,
    io::UploadPayload,
    plot::topomap::Extrapolate,
    preprocessing::{IcaMethod, Transform},
    Experiment,
};
use eegp_store::{
    config::CONFIG_FILE, IngestRequest, PlotRequest, RecordId, RecordService, StoreConfig,
};
use env_logger::Env;
use log::info;
use serde::Serialize;
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};

type Service = RecordService<eegp_store::MemoryRepository, eegp_store::DiskFileStore>;

#[derive(Parser)]
#[command(
    name = "eegp",
    version,
    about = "EEGP: EEG experiment record pipeline"
)]
struct Cli {
    /// Workspace directory holding eegp.toml, the snapshot and record files
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default eegp.toml and create the record directory
    Init,
    /// Register an experiment described in a TOML or JSON file
    ExperimentAdd {
        #[arg(long)]
        file: PathBuf,
    },
    /// Register a subject
    SubjectAdd {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
    },
    /// Create a record from one or more upload payloads (JSON)
    Ingest {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subject: u64,
        #[arg(long)]
        experiment: u64,
        #[arg(long = "payload", required = true)]
        payloads: Vec<PathBuf>,
        /// Seconds added to every sample timestamp
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        time_correction: f64,
    },
    /// List records, optionally of one experiment
    List {
        #[arg(long)]
        experiment: Option<u64>,
    },
    /// Print one record with its preprocessing steps and feature markers
    Show {
        #[arg(long)]
        record: RecordId,
    },
    /// Duplicate a record under a new name
    Copy {
        #[arg(long)]
        record: RecordId,
        #[arg(long)]
        name: String,
    },
    Rename {
        #[arg(long)]
        record: RecordId,
        #[arg(long)]
        name: String,
    },
    /// Delete a record, its file and any training it leaves empty
    Delete {
        #[arg(long)]
        record: RecordId,
    },
    /// Group records into a training set
    TrainingAdd {
        #[arg(long)]
        name: String,
        #[arg(long, value_delimiter = ',', required = true)]
        records: Vec<RecordId>,
    },
    /// Apply the transforms listed in a JSON file to every record
    Preprocess {
        #[arg(long, value_delimiter = ',', required = true)]
        records: Vec<RecordId>,
        #[arg(long)]
        steps: PathBuf,
    },
    /// Replace records by a per-epoch feature table
    Features {
        #[arg(long, value_delimiter = ',', required = true)]
        records: Vec<RecordId>,
        /// mean, variance, deviation or psd
        #[arg(long)]
        feature: FeatureKind,
    },
    /// Remove ICA components from a record
    IcaExclude {
        #[arg(long)]
        record: RecordId,
        #[arg(long, value_delimiter = ',')]
        components: Vec<usize>,
        /// fastica or infomax (extended)
        #[arg(long, default_value = "fastica")]
        method: IcaMethod,
    },
    /// Records carrying the same feature markers
    SameFeatures {
        #[arg(long)]
        record: RecordId,
    },
    /// Raw values of a time window
    Preview {
        #[arg(long)]
        record: RecordId,
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        #[arg(long, default_value_t = 5.0)]
        duration: f64,
    },
    /// Render a figure to PNG
    Plot {
        #[command(subcommand)]
        kind: PlotKind,
    },
}

#[derive(Args)]
struct PlotTarget {
    #[arg(long)]
    record: RecordId,
    /// PNG destination; base64 JSON is printed when absent
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum PlotKind {
    /// Stacked channel traces of the first epochs
    Epochs {
        #[command(flatten)]
        target: PlotTarget,
        #[arg(long, default_value_t = 5)]
        n_events: usize,
    },
    /// Averaged response of one channel for a label
    Average {
        #[command(flatten)]
        target: PlotTarget,
        #[arg(long)]
        label: String,
        #[arg(long)]
        channel: String,
    },
    /// Global field power of a label's average
    Compare {
        #[command(flatten)]
        target: PlotTarget,
        #[arg(long)]
        label: String,
    },
    /// Scalp maps of a label's average at given times (seconds)
    Topomap {
        #[command(flatten)]
        target: PlotTarget,
        #[arg(long)]
        label: String,
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        times: Vec<f64>,
        /// local, head or box
        #[arg(long, default_value = "local")]
        extrapolate: Extrapolate,
    },
    /// Scalp maps of every ICA component
    IcaComponents {
        #[command(flatten)]
        target: PlotTarget,
        /// fastica or infomax (extended)
        #[arg(long, default_value = "fastica")]
        method: IcaMethod,
    },
    /// One image per ICA component; `--out a.png` writes a_0.png, a_1.png, ...
    IcaProperties {
        #[command(flatten)]
        target: PlotTarget,
        /// fastica or infomax (extended)
        #[arg(long, default_value = "fastica")]
        method: IcaMethod,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    let root = cli.root;
    match cli.command {
        Commands::Init => cmd_init(&root)?,
        Commands::ExperimentAdd { file } => {
            let service = open(&root)?;
            let experiment = read_experiment(&file)?;
            print_json(&service.add_experiment(experiment)?)?;
        }
        Commands::SubjectAdd { name, surname } => {
            print_json(&open(&root)?.add_subject(&name, &surname)?)?;
        }
        Commands::Ingest {
            name,
            subject,
            experiment,
            payloads,
            time_correction,
        } => {
            let payloads = payloads
                .iter()
                .map(|path| read_payload(path))
                .collect::<Result<Vec<_>>>()?;
            let record = open(&root)?.ingest(IngestRequest {
                name,
                subject_id: subject,
                experiment_id: experiment,
                payloads,
                time_correction,
            })?;
            print_json(&record)?;
        }
        Commands::List { experiment } => {
            let service = open(&root)?;
            let records = match experiment {
                Some(id) => service.records_for_experiment(id)?,
                None => service.records(),
            };
            print_json(&records)?;
        }
        Commands::Show { record } => print_json(&open(&root)?.record(record)?)?,
        Commands::Copy { record, name } => print_json(&open(&root)?.copy(record, &name)?)?,
        Commands::Rename { record, name } => print_json(&open(&root)?.rename(record, &name)?)?,
        Commands::Delete { record } => {
            open(&root)?.delete(record)?;
            print_json(&json!({ "deleted": record }))?;
        }
        Commands::TrainingAdd { name, records } => {
            print_json(&open(&root)?.add_training(&name, &records)?)?;
        }
        Commands::Preprocess { records, steps } => {
            let transforms = read_steps(&steps)?;
            print_json(&open(&root)?.apply_preprocessing(&records, &transforms)?)?;
        }
        Commands::Features { records, feature } => {
            print_json(&open(&root)?.apply_feature(&records, feature)?)?;
        }
        Commands::IcaExclude {
            record,
            components,
            method,
        } => {
            print_json(&open(&root)?.ica_exclude(record, method, &components)?)?;
        }
        Commands::SameFeatures { record } => print_json(&open(&root)?.same_features(record)?)?,
        Commands::Preview {
            record,
            start,
            duration,
        } => print_json(&open(&root)?.preview(record, start, duration)?)?,
        Commands::Plot { kind } => cmd_plot(&open(&root)?, kind)?,
    }
    Ok(())
}

fn open(root: &Path) -> Result<Service> {
    RecordService::open(root)
        .with_context(|| format!("failed to open workspace {}", root.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(root: &Path) -> Result<()> {
    let path = root.join(CONFIG_FILE);
    let config = if path.exists() {
        info!("keeping existing {}", path.display());
        StoreConfig::load(&path)?
    } else {
        let config = StoreConfig::default();
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        fs::write(&path, config.to_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        config
    };
    let csv_dir = root.join(&config.csv_dir);
    fs::create_dir_all(&csv_dir)
        .with_context(|| format!("failed to create {}", csv_dir.display()))?;
    print_json(&json!({ "config": path, "csv_dir": csv_dir }))
}

fn read_experiment(path: &Path) -> Result<Experiment> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read experiment {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid experiment JSON in {}", path.display()))
    } else {
        toml::from_str(&contents)
            .with_context(|| format!("invalid experiment TOML in {}", path.display()))
    }
}

fn read_payload(path: &Path) -> Result<UploadPayload> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read payload {}", path.display()))?;
    UploadPayload::from_json(&bytes)
        .with_context(|| format!("invalid upload payload in {}", path.display()))
}

fn read_steps(path: &Path) -> Result<Vec<Transform>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read steps {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid preprocessing steps in {}", path.display()))
}

fn write_png(out: &Path, encoded: &str) -> Result<()> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .context("renderer returned invalid base64")?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
    info!("wrote {}", out.display());
    Ok(())
}

/// `dir/name.png` → `dir/name_<idx>.png`
fn indexed_path(out: &Path, idx: usize) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plot");
    let ext = out.extension().and_then(|s| s.to_str()).unwrap_or("png");
    out.with_file_name(format!("{}_{}.{}", stem, idx, ext))
}

fn emit(target: &PlotTarget, encoded: String) -> Result<()> {
    match &target.out {
        Some(out) => {
            write_png(out, &encoded)?;
            print_json(&json!({ "record": target.record, "out": out }))
        }
        None => print_json(&json!({ "record": target.record, "img": encoded })),
    }
}

fn cmd_plot(service: &Service, kind: PlotKind) -> Result<()> {
    let (target, request) = match kind {
        PlotKind::Epochs { target, n_events } => (target, PlotRequest::Epochs { n_events }),
        PlotKind::Average {
            target,
            label,
            channel,
        } => (target, PlotRequest::Average { label, channel }),
        PlotKind::Compare { target, label } => (target, PlotRequest::Compare { label }),
        PlotKind::Topomap {
            target,
            label,
            times,
            extrapolate,
        } => (
            target,
            PlotRequest::Topomap {
                label,
                times,
                extrapolate,
            },
        ),
        PlotKind::IcaComponents { target, method } => {
            let components = service.ica_components(target.record, method)?;
            if let Some(out) = &target.out {
                write_png(out, &components.img)?;
                return print_json(&json!({
                    "record": target.record,
                    "out": out,
                    "components": components.components,
                }));
            }
            return print_json(&components);
        }
        PlotKind::IcaProperties { target, method } => {
            let images = service.ica_properties(target.record, method)?;
            let Some(out) = &target.out else {
                return print_json(&images);
            };
            if images.is_empty() {
                bail!("record {} has no ICA components", target.record);
            }
            let mut written = Vec::with_capacity(images.len());
            for (idx, img) in images.iter().enumerate() {
                let path = indexed_path(out, idx);
                write_png(&path, img)?;
                written.push(path);
            }
            return print_json(&json!({ "record": target.record, "out": written }));
        }
    };
    let encoded = service.plot(target.record, &request)?;
    emit(&target, encoded)
}
