use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use iconforge_core::observability::{init_logging, LogFormat};
use iconforge_core::{Bundle, ManifestVersion, PipelineConfig};
use iconforge_deploy::{
    encoding::variants, DistributionEngine, EdgeCache, FsStore, HealthMonitor, HealthStatus,
    HttpProbe, HttpPurgeClient, LogAlertSink, MemoryStore, NoopEdgeCache, ObjectStore, Pipeline,
    PipelineError, RollbackManager, RollbackOutcome,
};
use iconforge_runtime::{
    DynamicTagResolver, HttpAssetSource, LoadedSections, Resolution, RuntimeIconResolver,
};

fn cli() -> Command {
    let store = Arg::new("store")
        .long("store")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .help("Filesystem bucket root");

    Command::new("iconforge")
        .version(iconforge_deploy::VERSION)
        .about("Build, publish and resolve content-addressed icon sprites")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration (TOML)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(["pretty", "json"])
                .help("Log output format"),
        )
        .subcommand(Command::new("validate").about("Validate the icon source tree"))
        .subcommand(
            Command::new("build")
                .about("Validate and compile sprites without publishing")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory receiving the sprites and their compressed variants"),
                ),
        )
        .subcommand(
            Command::new("deploy")
                .about("Publish changed sprites and commit a new manifest")
                .arg(store.clone().help("Filesystem bucket root; omit for a dry run in memory")),
        )
        .subcommand(
            Command::new("rollback")
                .about("Republish an archived manifest")
                .arg(store.clone().required(true))
                .arg(
                    Arg::new("to")
                        .long("to")
                        .required(true)
                        .value_name("VERSION")
                        .help("Manifest version, e.g. 20261016T090000.000Z"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("List archived manifest versions")
                .arg(store.required(true)),
        )
        .subcommand(
            Command::new("health")
                .about("Probe the published manifest and sprites")
                .arg(
                    Arg::new("once")
                        .long("once")
                        .action(ArgAction::SetTrue)
                        .help("Run a single pass and exit with its status"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve an icon against the live manifest")
                .arg(Arg::new("section").required(true))
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("tag")
                .about("Resolve content tags against the live tag manifest")
                .arg(Arg::new("category").required(true))
                .arg(Arg::new("tags").required(true).num_args(1..)),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let format = matches
        .get_one::<String>("log-format")
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    init_logging(format);

    match run(&matches).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!("{error:#}");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<ExitCode> {
    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("validate", _)) => validate(config),
        Some(("build", args)) => {
            let out = required::<PathBuf>(args, "out")?;
            build(config, out).await
        }
        Some(("deploy", args)) => deploy(config, args.get_one::<PathBuf>("store")).await,
        Some(("rollback", args)) => {
            let store = required::<PathBuf>(args, "store")?;
            let to = required::<String>(args, "to")?;
            let target: ManifestVersion = to
                .parse()
                .with_context(|| format!("invalid manifest version `{to}`"))?;
            rollback(&config, store, target).await
        }
        Some(("history", args)) => history(&config, required::<PathBuf>(args, "store")?).await,
        Some(("health", args)) => health(&config, args.get_flag("once")).await,
        Some(("resolve", args)) => {
            resolve(
                &config,
                required::<String>(args, "section")?,
                required::<String>(args, "name")?,
            )
            .await
        }
        Some(("tag", args)) => {
            let category = required::<String>(args, "category")?;
            let tags: Vec<&String> = args.get_many::<String>("tags").into_iter().flatten().collect();
            tag(&config, category, &tags).await
        }
        _ => bail!("no command given"),
    }
}

fn required<'a, T>(args: &'a ArgMatches, id: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(id)
        .with_context(|| format!("missing --{id}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn report_warnings(warnings: &[iconforge_build::BuildWarning]) {
    for warning in warnings {
        tracing::warn!(%warning, "build warning");
    }
}

fn validate(config: PipelineConfig) -> Result<ExitCode> {
    let pipeline = Pipeline::new(config);
    match pipeline.build() {
        Ok(output) => {
            report_warnings(&output.warnings);
            println!(
                "ok: {} icon(s) in {} section(s), {} warning(s)",
                output.report.icons,
                output.report.sections,
                output.warnings.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Validation(failure)) => {
            for violation in &failure.violations {
                eprintln!("  {violation}");
            }
            report_warnings(&failure.warnings);
            Err(failure.into())
        }
        Err(error) => Err(error.into()),
    }
}

/// Write every bundle and its encoded variants under `out`
async fn write_sprites(bundles: &[Bundle], out: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    let mut written = 0;
    for bundle in bundles {
        let encoded = variants(bundle)
            .with_context(|| format!("encoding {}", bundle.file_name()))?;
        for variant in encoded {
            let path = out.join(&variant.key);
            tokio::fs::write(&path, &variant.body)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            written += 1;
        }
    }
    Ok(written)
}

async fn build(config: PipelineConfig, out: &Path) -> Result<ExitCode> {
    let output = Pipeline::new(config).build()?;
    report_warnings(&output.warnings);

    let written = write_sprites(&output.bundles, out).await?;
    for bundle in &output.bundles {
        println!("{}  {} bytes", bundle.file_name(), bundle.byte_size());
    }
    tracing::info!(files = written, out = %out.display(), "sprites written");
    Ok(ExitCode::SUCCESS)
}

fn edge_cache(config: &PipelineConfig) -> Result<Arc<dyn EdgeCache>> {
    Ok(match &config.cdn.purge_endpoint {
        Some(endpoint) => Arc::new(
            HttpPurgeClient::new(endpoint.clone(), config.cdn.purge_timeout())
                .context("building purge client")?,
        ),
        None => Arc::new(NoopEdgeCache),
    })
}

fn engine(config: &PipelineConfig, store: Arc<dyn ObjectStore>) -> Result<Arc<DistributionEngine>> {
    Ok(Arc::new(DistributionEngine::new(store, edge_cache(config)?, config)))
}

async fn deploy(config: PipelineConfig, store: Option<&PathBuf>) -> Result<ExitCode> {
    let store: Arc<dyn ObjectStore> = match store {
        Some(root) => Arc::new(FsStore::new(root)),
        None => {
            tracing::info!("no --store given, deploying into memory");
            Arc::new(MemoryStore::new())
        }
    };
    let engine = engine(&config, store)?;

    let record = Pipeline::new(config).deploy(&engine).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

async fn rollback(config: &PipelineConfig, store: &Path, target: ManifestVersion) -> Result<ExitCode> {
    let engine = engine(config, Arc::new(FsStore::new(store)))?;
    let outcome = RollbackManager::new(engine)
        .rollback(target)
        .await
        .with_context(|| format!("rolling back to {target}"))?;

    match outcome {
        RollbackOutcome::AlreadyCurrent(version) => println!("{version} is already current"),
        RollbackOutcome::RolledBack(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn history(config: &PipelineConfig, store: &Path) -> Result<ExitCode> {
    let engine = engine(config, Arc::new(FsStore::new(store)))?;
    let current = engine.current_manifest().await?.map(|m| m.version);

    let versions = engine.history().versions().await?;
    if versions.is_empty() {
        println!("no published manifests");
    }
    for version in versions {
        let marker = if Some(version) == current { "*" } else { " " };
        println!("{marker} {version}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(config: &PipelineConfig, once: bool) -> Result<ExitCode> {
    let probe = HttpProbe::new();
    let monitor = HealthMonitor::new(Arc::new(probe), Arc::new(LogAlertSink), config);

    if once {
        let report = monitor.check_once().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(match report.overall() {
            HealthStatus::Critical => ExitCode::FAILURE,
            HealthStatus::Ok | HealthStatus::Warning => ExitCode::SUCCESS,
        });
    }

    monitor
        .run(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "failed to listen for ctrl-c");
            }
        })
        .await;
    Ok(ExitCode::SUCCESS)
}

async fn resolve(config: &PipelineConfig, section: &str, name: &str) -> Result<ExitCode> {
    let source = Arc::new(HttpAssetSource::from_config(config).context("building HTTP client")?);
    let resolver = RuntimeIconResolver::new(
        source,
        config.critical_icons.clone(),
        config.cdn.clone(),
        Arc::new(LoadedSections::new()),
    )
    .with_fetch_timeout(config.runtime.fetch_timeout())
    .with_prefetch(false);

    match resolver.resolve(section, name).await? {
        Resolution::Sprite(sprite) => {
            println!("{}", sprite.href());
            Ok(ExitCode::SUCCESS)
        }
        Resolution::NotFound => {
            println!("{section}/{name}: not found");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn tag(config: &PipelineConfig, category: &str, tags: &[&String]) -> Result<ExitCode> {
    let source = Arc::new(HttpAssetSource::from_config(config).context("building HTTP client")?);
    let resolver = DynamicTagResolver::from_config(source, &config.runtime);

    match resolver.resolve(category, tags).await {
        Some(url) => {
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("{category}: no match, render placeholder");
            Ok(ExitCode::FAILURE)
        }
    }
}
