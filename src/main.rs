use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use powerops_artifact::FsStore;
use powerops_compare::compare_yaml;
use powerops_config::{AuxFile, FileKind, Settings, ShopCase, ShopRunRequest};
use powerops_runs::{ObjectiveFunction, PenaltyBreakdown, ProcessEventKind, ShopRun, ShopRunsApi};
use powerops_store::SqliteStore;
use powerops_transform::{Pipeline, series_from_yaml, series_to_yaml};
use powerops_trigger::TriggerClient;

/// PowerOps - create, trigger and follow SHOP optimisation runs
#[derive(Parser)]
#[command(name = "powerops")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.powerops)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Settings file (JSON or YAML). POWEROPS_* variables override it.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Work with SHOP runs
  Run {
    #[command(subcommand)]
    action: RunAction,
  },

  /// Compare two YAML result files and print a markdown report
  Compare {
    a: PathBuf,
    b: PathBuf,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
  },

  /// Apply a transformation pipeline to a time series
  Transform {
    /// YAML or JSON list of `{transformation, kwargs}`
    pipeline: PathBuf,

    /// YAML mapping of timestamps to values
    series: PathBuf,
  },
}

#[derive(Subcommand)]
enum RunAction {
  /// Upload a case and create a run
  Create {
    #[command(flatten)]
    case: CaseArgs,

    /// Trigger the run right away
    #[arg(long)]
    trigger: bool,
  },

  /// Create and trigger one run per case file
  TriggerMany {
    case_files: Vec<PathBuf>,

    #[arg(long)]
    watercourse: String,
  },

  /// Trigger an existing run
  Trigger { run: String },

  /// Print the current status of a run
  Status { run: String },

  /// Wait until a run succeeds or fails
  Wait {
    run: String,

    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: u64,
  },

  /// List recent runs
  List {
    #[arg(long)]
    watercourse: Option<String>,

    #[arg(long, default_value_t = 20)]
    limit: usize,
  },

  /// Record a process event for a run
  Report { run: String, kind: ProcessKindArg },

  /// Attach result files to a run
  Attach {
    run: String,

    /// Log files (cplex / shop_messages)
    #[arg(long = "log")]
    logs: Vec<PathBuf>,

    /// YAML result file
    #[arg(long)]
    yaml: Option<PathBuf>,

    /// YAML objective function: `{data: {name: value}, penalty_breakdown: {...}}`
    #[arg(long)]
    objective: Option<PathBuf>,
  },

  /// Print the results of a completed run
  Results {
    run: String,

    /// Write the downloaded files into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
  },

  /// Download the case file of a run
  DownloadCase {
    run: String,

    #[arg(long, short)]
    output: Option<PathBuf>,
  },
}

#[derive(clap::Args)]
struct CaseArgs {
  /// Path to the case YAML file
  case_file: PathBuf,

  #[arg(long)]
  watercourse: String,

  #[arg(long = "cut")]
  cut_files: Vec<PathBuf>,

  #[arg(long = "mapping")]
  mapping_files: Vec<PathBuf>,

  #[arg(long = "extra")]
  extra_files: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProcessKindArg {
  Started,
  Finished,
  Failed,
}

impl From<ProcessKindArg> for ProcessEventKind {
  fn from(kind: ProcessKindArg) -> Self {
    match kind {
      ProcessKindArg::Started => ProcessEventKind::Started,
      ProcessKindArg::Finished => ProcessEventKind::Finished,
      ProcessKindArg::Failed => ProcessEventKind::Failed,
    }
  }
}

#[derive(Deserialize)]
struct ObjectiveFile {
  data: BTreeMap<String, f64>,
  #[serde(default)]
  penalty_breakdown: PenaltyBreakdown,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let Cli {
    data_dir,
    config,
    command,
  } = Cli::parse();
  let Some(command) = command else {
    println!("powerops - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async move {
    match command {
      Commands::Run { action } => {
        let settings = load_settings(config.as_deref())?;
        let data_dir = resolve_data_dir(data_dir, &settings)?;
        let api = open_api(&settings, &data_dir).await?;
        run_action(&api, action).await
      }
      Commands::Compare { a, b, output } => compare(&a, &b, output.as_deref()).await,
      Commands::Transform { pipeline, series } => transform(&pipeline, &series).await,
    }
  })
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
  let settings = match config {
    Some(path) => Settings::from_file(path).with_context(|| format!("failed to load settings: {}", path.display()))?,
    None => Settings::new("local", "http://localhost:8000"),
  };
  settings.with_env().context("invalid POWEROPS_* environment")
}

fn resolve_data_dir(flag: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
  if let Some(dir) = flag.or_else(|| settings.data_dir.clone()) {
    return Ok(dir);
  }
  let home = dirs::home_dir().context("could not determine home directory")?;
  Ok(home.join(".powerops"))
}

async fn open_api(settings: &Settings, data_dir: &Path) -> Result<ShopRunsApi> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_url = format!("sqlite://{}", data_dir.join("records.db").display());
  let records = SqliteStore::connect(&db_url)
    .await
    .with_context(|| format!("failed to open {db_url}"))?;
  let files = FsStore::new(data_dir.join("files"));
  let dispatcher = TriggerClient::from_settings(settings).context("invalid trigger settings")?;

  Ok(
    ShopRunsApi::new(Arc::new(records), Arc::new(files), Arc::new(dispatcher))
      .with_poll_interval(settings.poll_interval()),
  )
}

async fn run_action(api: &ShopRunsApi, action: RunAction) -> Result<()> {
  match action {
    RunAction::Create { case, trigger } => {
      let request = build_request(&case)?;
      let run = if trigger {
        api.trigger_case(&request).await?
      } else {
        api.create(&request).await?
      };
      info!(run = %run.external_id(), triggered = trigger, "created run");
      println!("{}", run.external_id());
    }
    RunAction::TriggerMany {
      case_files,
      watercourse,
    } => {
      let requests = case_files
        .iter()
        .map(|path| -> Result<ShopRunRequest> {
          let case = ShopCase::from_file(path).with_context(|| format!("failed to read case: {}", path.display()))?;
          Ok(ShopRunRequest::new(&watercourse, case)?)
        })
        .collect::<Result<Vec<_>>>()?;

      let runs = api.trigger_cases(&requests, shutdown_token()).await?;
      info!(runs = runs.len(), "triggered runs");
      for run in runs {
        println!("{}", run.external_id());
      }
    }
    RunAction::Trigger { run } => {
      let run = api.retrieve(&run).await?;
      let response = api.trigger(&run).await?;
      eprintln!("Triggered {} ({})", response.run, response.status);
      println!("{}", serde_json::to_string_pretty(&response.body)?);
    }
    RunAction::Status { run } => {
      let run = api.retrieve(&run).await?;
      println!("{}", run.status().await?);
    }
    RunAction::Wait { run, timeout_secs } => {
      let run = api.retrieve(&run).await?;
      let status = run
        .wait_until_complete(Duration::from_secs(timeout_secs), &shutdown_token())
        .await?;
      println!("{status}");
    }
    RunAction::List { watercourse, limit } => {
      for run in api.list(watercourse.as_deref(), limit).await? {
        println!("{}", describe(&run).await?);
      }
    }
    RunAction::Report { run, kind } => {
      let run = api.retrieve(&run).await?;
      let event = api.report_process_event(&run, kind.into()).await?;
      println!("{}", event.external_id);
    }
    RunAction::Attach {
      run,
      logs,
      yaml,
      objective,
    } => {
      let run = api.retrieve(&run).await?;
      let mut files = logs
        .iter()
        .map(|path| AuxFile::from_path(FileKind::Log, path))
        .collect::<Result<Vec<_>, _>>()?;
      if let Some(path) = &yaml {
        files.push(AuxFile::from_path(FileKind::YamlResult, path)?);
      }
      let objective = match &objective {
        Some(path) => Some(read_objective(&run, path).await?),
        None => None,
      };
      api.results().attach_results(&run, &files, objective.as_ref()).await?;
      eprintln!("Attached {} files to {}", files.len(), run.external_id());
    }
    RunAction::Results { run, output_dir } => {
      let run = api.retrieve(&run).await?;
      let result = api.results().retrieve(&run).await?;

      println!("run: {}", result.run);
      println!("status: {}", run.status().await?);
      for (key, value) in &result.objective_function.data {
        println!("objective.{key}: {value}");
      }
      if !result.objective_function.penalty_breakdown.is_empty() {
        println!(
          "penalty_breakdown: {}",
          serde_json::to_string(&result.objective_function.penalty_breakdown)?
        );
      }

      let logs = [&result.cplex_log, &result.messages_log];
      for log in logs.into_iter().flatten() {
        println!("log: {} ({} bytes)", log.name, log.content.len());
        if let Some(dir) = &output_dir {
          write_output(dir, &log.name, log.content.as_bytes()).await?;
        }
      }
      if let Some(yaml) = &result.yaml {
        println!("yaml: {}", yaml.name);
        if let Some(dir) = &output_dir {
          write_output(dir, &yaml.name, serde_yaml::to_string(&yaml.data)?.as_bytes()).await?;
        }
      }
    }
    RunAction::DownloadCase { run, output } => {
      let run = api.retrieve(&run).await?;
      let content = api.download_case(&run).await?;
      match output {
        Some(path) => tokio::fs::write(&path, &content)
          .await
          .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", String::from_utf8_lossy(&content)),
      }
    }
  }
  Ok(())
}

fn build_request(args: &CaseArgs) -> Result<ShopRunRequest> {
  let case = ShopCase::from_file(&args.case_file)
    .with_context(|| format!("failed to read case: {}", args.case_file.display()))?;
  let mut request = ShopRunRequest::new(&args.watercourse, case)?;

  let aux = [
    (FileKind::Cut, &args.cut_files),
    (FileKind::Mapping, &args.mapping_files),
    (FileKind::Extra, &args.extra_files),
  ];
  for (kind, paths) in aux {
    for path in paths {
      request = request.with_file(AuxFile::from_path(kind, path)?);
    }
  }
  Ok(request)
}

async fn read_objective(run: &ShopRun, path: &Path) -> Result<ObjectiveFunction> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read objective: {}", path.display()))?;
  let file: ObjectiveFile =
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse objective: {}", path.display()))?;

  Ok(
    ObjectiveFunction::new(format!("{}_objective_function", run.external_id()), file.data)
      .with_watercourse(run.watercourse())
      .with_penalty_breakdown(file.penalty_breakdown),
  )
}

async fn describe(run: &ShopRun) -> Result<String> {
  Ok(format!(
    "{}\t{}\t{}\t{}\t{}",
    run.external_id(),
    run.watercourse(),
    run.starttime().format("%Y-%m-%d %H:%M"),
    run.endtime().format("%Y-%m-%d %H:%M"),
    run.status().await?
  ))
}

/// Where a downloaded file lands; only the final component of `name` is used.
fn output_path(dir: &Path, name: &str) -> Result<PathBuf> {
  let file_name = Path::new(name)
    .file_name()
    .with_context(|| format!("invalid file name: {name}"))?;
  Ok(dir.join(file_name))
}

async fn write_output(dir: &Path, name: &str, content: &[u8]) -> Result<()> {
  tokio::fs::create_dir_all(dir).await?;
  let path = output_path(dir, name)?;
  tokio::fs::write(&path, content)
    .await
    .with_context(|| format!("failed to write {}", path.display()))
}

/// A token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });
  cancel
}

async fn compare(a: &Path, b: &Path, output: Option<&Path>) -> Result<()> {
  let left = tokio::fs::read_to_string(a)
    .await
    .with_context(|| format!("failed to read {}", a.display()))?;
  let right = tokio::fs::read_to_string(b)
    .await
    .with_context(|| format!("failed to read {}", b.display()))?;

  let name_a = a.display().to_string();
  let name_b = b.display().to_string();
  let comparison = compare_yaml(&left, &right, &name_a, &name_b)?;
  eprintln!("{} differences", comparison.diff.len());

  match output {
    Some(path) => tokio::fs::write(path, &comparison.report)
      .await
      .with_context(|| format!("failed to write {}", path.display()))?,
    None => print!("{}", comparison.report),
  }
  Ok(())
}

async fn transform(pipeline: &Path, series: &Path) -> Result<()> {
  let pipeline_content = tokio::fs::read_to_string(pipeline)
    .await
    .with_context(|| format!("failed to read {}", pipeline.display()))?;
  let series_content = tokio::fs::read_to_string(series)
    .await
    .with_context(|| format!("failed to read {}", series.display()))?;

  let pipeline = Pipeline::from_yaml(&pipeline_content)?;
  let input = series_from_yaml(&series_content)?;
  if input.is_empty() {
    bail!("time series {} is empty", series.display());
  }

  let output = pipeline.apply(&input)?;
  print!("{}", series_to_yaml(&output)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_output_path_stays_in_dir() {
    let dir = Path::new("/tmp/results");
    assert_eq!(output_path(dir, "cplex.log").unwrap(), dir.join("cplex.log"));
    assert_eq!(output_path(dir, "../x.log").unwrap(), dir.join("x.log"));
    assert_eq!(output_path(dir, "/etc/passwd").unwrap(), dir.join("passwd"));
    assert!(output_path(dir, "..").is_err());
  }
}
