use abench_core::config::{load_config, load_plan, save_config, write_sample_plan};
use abench_core::engine::Executor;
use abench_core::model::ExperimentStatus;
use abench_core::providers::chat::SpaceChatClient;
use abench_core::providers::golden::OpenAiGoldenClient;
use abench_core::report::summary::RenderModel;
use abench_core::storage::{list_experiments, ExperimentDir, Store};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "abench",
    version,
    about = "Benchmark AI assistants against question sets with golden-answer comparison"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a sample plan and config file
    Init(InitArgs),
    /// Create and run an experiment from a plan
    Run(RunArgs),
    /// Show live progress of an experiment
    Progress(LookupArgs),
    /// Show aggregate stats of an experiment
    Stats(LookupArgs),
    /// List experiment directories, newest first
    List(ListArgs),
    /// Render the HTML report for a finished experiment
    Report(ReportArgs),
    /// Show or change harness configuration
    Config(ConfigArgs),
    Version,
}

#[derive(Parser)]
struct InitArgs {
    #[arg(long, default_value = "experiment.yaml")]
    plan: PathBuf,
    #[arg(long, default_value = ".abench/config.yaml")]
    config: PathBuf,
}

#[derive(Parser)]
struct RunArgs {
    #[arg(long, default_value = "experiment.yaml")]
    plan: PathBuf,
    #[arg(long, default_value = ".abench/config.yaml")]
    config: PathBuf,
    #[arg(long, default_value = ".abench/bench.db")]
    db: PathBuf,
    #[arg(long, default_value = "experiments")]
    experiments_root: PathBuf,

    /// model used to generate golden answers (overrides plan and config)
    #[arg(long)]
    golden_model: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// write the HTML report here after the run
    #[arg(long)]
    report: Option<PathBuf>,

    /// strict mode: any failed test -> exit 1
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
struct LookupArgs {
    experiment_id: String,
    #[arg(long, default_value = ".abench/bench.db")]
    db: PathBuf,
}

#[derive(Parser)]
struct ListArgs {
    #[arg(long, default_value = "experiments")]
    experiments_root: PathBuf,
}

#[derive(Parser)]
struct ReportArgs {
    experiment_id: String,
    #[arg(long, default_value = "experiments")]
    experiments_root: PathBuf,
    #[arg(long, default_value = "report.html")]
    out: PathBuf,
}

#[derive(Parser)]
struct ConfigArgs {
    #[command(subcommand)]
    cmd: ConfigSub,
    #[arg(long, default_value = ".abench/config.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum ConfigSub {
    Show,
    Set { key: String, value: String },
}

mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Run(args) => cmd_run(args).await,
        Command::Progress(args) => cmd_progress(args),
        Command::Stats(args) => cmd_stats(args),
        Command::List(args) => cmd_list(args),
        Command::Report(args) => cmd_report(args),
        Command::Config(args) => cmd_config(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if !args.plan.exists() {
        write_sample_plan(&args.plan).map_err(|e| anyhow::anyhow!(e))?;
        eprintln!("created {}", args.plan.display());
    } else {
        eprintln!("note: {} already exists", args.plan.display());
    }

    if !args.config.exists() {
        let cfg = abench_core::config::BenchConfig::default();
        save_config(&args.config, &cfg).map_err(|e| anyhow::anyhow!(e))?;
        eprintln!(
            "created {} (fill in user_id, company_id, app_id, api_key)",
            args.config.display()
        );
    } else {
        eprintln!("note: {} already exists", args.config.display());
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config).map_err(|e| anyhow::anyhow!(e))?;
    let plan = load_plan(&args.plan).map_err(|e| anyhow::anyhow!(e))?;

    let store = open_store(&args.db)?;
    let chat = Arc::new(SpaceChatClient::new(&cfg));
    let golden = Arc::new(OpenAiGoldenClient::new(
        args.openai_api_key.clone().unwrap_or_default(),
        None,
    ));
    let executor = Executor::new(store, chat, golden, cfg, args.experiments_root.clone());

    let experiment_id = executor.create_experiment(&plan)?;
    eprintln!("experiment: {experiment_id}");

    let cancel = executor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested, finishing current call...");
            cancel.cancel();
        }
    });

    let golden_model = args
        .golden_model
        .clone()
        .or_else(|| plan.golden_model.clone());
    let run = tokio::spawn({
        let executor = executor.clone();
        let experiment_id = experiment_id.clone();
        async move {
            executor
                .run_experiment(&experiment_id, golden_model.as_deref())
                .await
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    while !run.is_finished() {
        ticker.tick().await;
        if let Some(rec) = executor.progress(&experiment_id)? {
            if rec.status == ExperimentStatus::Running {
                eprintln!(
                    "[{:>5.1}%] {}/{} {}",
                    rec.progress_percentage,
                    rec.completed_tasks,
                    rec.total_tasks,
                    rec.current_step.as_deref().unwrap_or("")
                );
            }
        }
    }

    let Some(summary) = run.await?? else {
        eprintln!("experiment cancelled; partial results kept in the store");
        return Ok(exit_codes::TEST_FAILED);
    };

    let model = RenderModel::from_summary(&summary);
    abench_core::report::console::print_summary(&model);
    if let Some(out) = &args.report {
        abench_core::report::write_html(&model, out)?;
        eprintln!("report written to {}", out.display());
    }

    if args.strict && summary.failed_tests > 0 {
        Ok(exit_codes::TEST_FAILED)
    } else {
        Ok(exit_codes::OK)
    }
}

fn cmd_progress(args: LookupArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    match store.get_experiment(&args.experiment_id)? {
        Some(rec) => {
            println!(
                "{} {} {:.1}% ({}/{} tasks)",
                rec.experiment_id,
                rec.status.as_str(),
                rec.progress_percentage,
                rec.completed_tasks,
                rec.total_tasks
            );
            if let Some(step) = &rec.current_step {
                println!("current step: {step}");
            }
            if let Some(eta) = rec.estimated_completion {
                println!("estimated completion: {}", eta.to_rfc3339());
            }
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!("unknown experiment: {}", args.experiment_id);
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn cmd_stats(args: LookupArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    match store.experiment_stats(&args.experiment_id)? {
        Some(stats) => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!("unknown experiment: {}", args.experiment_id);
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn cmd_list(args: ListArgs) -> anyhow::Result<i32> {
    for name in list_experiments(&args.experiments_root)? {
        let summary = ExperimentDir::open(&args.experiments_root, &name)
            .and_then(|dir| dir.load_summary().ok());
        match summary {
            Some(s) => println!(
                "{name}  tests={} success={} failed={} rate={:.1}%",
                s.total_tests, s.completed_tests, s.failed_tests, s.success_rate
            ),
            None => println!("{name}  (no summary)"),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_report(args: ReportArgs) -> anyhow::Result<i32> {
    let Some(dir) = ExperimentDir::open(&args.experiments_root, &args.experiment_id) else {
        eprintln!("unknown experiment: {}", args.experiment_id);
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let summary = dir.load_summary()?;
    let model = RenderModel::from_summary(&summary);
    abench_core::report::write_html(&model, &args.out)?;
    abench_core::report::console::print_summary(&model);
    eprintln!("report written to {}", args.out.display());
    Ok(exit_codes::OK)
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<i32> {
    let mut cfg = load_config(&args.config).map_err(|e| anyhow::anyhow!(e))?;
    match args.cmd {
        ConfigSub::Show => {
            // Never print the credential itself.
            println!("user_id: {}", cfg.user_id);
            println!("company_id: {}", cfg.company_id);
            println!("app_id: {}", cfg.app_id);
            println!(
                "api_key: {}",
                if cfg.api_key.is_empty() { "(unset)" } else { "(set)" }
            );
            println!("base_url: {}", cfg.base_url);
            println!("timeout_seconds: {}", cfg.timeout_seconds);
            println!("default_golden_model: {}", cfg.default_golden_model);
            if !cfg.is_configured() {
                println!("missing: {}", cfg.missing_fields().join(", "));
            }
            Ok(exit_codes::OK)
        }
        ConfigSub::Set { key, value } => {
            match key.as_str() {
                "user_id" => cfg.user_id = value,
                "company_id" => cfg.company_id = value,
                "app_id" => cfg.app_id = value,
                "api_key" => cfg.api_key = value,
                "base_url" => cfg.base_url = value,
                "timeout_seconds" => cfg.timeout_seconds = value.parse()?,
                "default_golden_model" => cfg.default_golden_model = value,
                other => {
                    eprintln!("unknown config key: {other}");
                    return Ok(exit_codes::CONFIG_ERROR);
                }
            }
            save_config(&args.config, &cfg).map_err(|e| anyhow::anyhow!(e))?;
            eprintln!("updated {}", args.config.display());
            Ok(exit_codes::OK)
        }
    }
}

fn open_store(db: &Path) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(db)?;
    store.init_schema()?;
    Ok(store)
}
