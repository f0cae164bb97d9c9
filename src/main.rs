use anyhow::{Context as _, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use cloudrec::cache::{ClearScope, DiskCache};
use cloudrec::config::Config;
use cloudrec::context::{Context, Region};
use cloudrec::provider::auth::TokenSource;
use cloudrec::provider::{regions, Gateway, GatewayConfig, ResourceFilter};
use cloudrec::provision::{ProvisionOptions, Provisioner};
use cloudrec::reconcile::Reconcile;
use cloudrec::resource::{
    get_all_kinds, get_kind, CloudResource, DbSubnetGroup, EnumerateOptions, Enumerator, FanOut,
    ReceiptRuleSet, SecurityGroup, Strictness, Table,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Regional cloud resource enumeration, caching and reconciliation
#[derive(Parser, Debug)]
#[command(name = "cloudrec", version, about, long_about = None)]
struct Args {
    /// Region to work in
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Cache directory (overrides CLOUDREC_CACHE_DIR and the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Provider gateway base URL
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Static gateway bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List resources of one kind
    List(ListArgs),
    /// Create or converge the resource described in a YAML/JSON file
    Provision(FileArgs),
    /// Delete the resource described in a YAML/JSON file
    Dispose(FileArgs),
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// List regions known to the gateway
    Regions,
    /// List supported resource kinds
    Kinds,
    /// Make a region the default and save it to the config file
    Use {
        #[arg(value_name = "REGION")]
        mark: String,
    },
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// Kind name or alias (see `cloudrec kinds`)
    kind: String,

    /// Every managed region instead of the current one
    #[arg(long)]
    all_regions: bool,

    /// Bypass the cache and refetch
    #[arg(long)]
    refresh: bool,

    /// Filter as `param=v1,v2` (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Cache filtered listings under a digest of the filters
    #[arg(long)]
    cache_filters: bool,

    /// Query regions concurrently
    #[arg(long)]
    parallel: bool,

    /// Keep unknown response keys instead of failing
    #[arg(long)]
    lenient: bool,

    /// Drop objects whose identity repeats
    #[arg(long)]
    dedupe: bool,
}

#[derive(ClapArgs, Debug)]
struct FileArgs {
    /// Desired-state file with a top-level `kind`
    #[arg(short, long)]
    file: PathBuf,

    /// Trust the cache when looking up the current state
    #[arg(long)]
    cached: bool,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Remove cached listings
    Clear {
        /// Only this kind
        #[arg(long)]
        kind: Option<String>,
        /// Only this region
        #[arg(long = "in")]
        in_region: Option<String>,
    },
    /// Print the cache directory
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudrec started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = Config::config_dir() {
        return config_dir.join("cloudrec.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudrec").join("cloudrec.log");
    }
    PathBuf::from("cloudrec.log")
}

/// Everything a command needs, resolved from args and config
struct Session {
    config: Config,
    enumerator: Enumerator,
    gateway_url: Option<String>,
    token: Option<String>,
}

impl Session {
    fn new(args: &Args) -> Result<Self> {
        let config = Config::load();
        let account = config.account().context("Invalid account configuration")?;

        let mark = config
            .effective_region(args.region.as_deref())
            .context("No region configured. Use --region or set `region` in the config file")?;
        let region = Region::get(&mark)?;

        let cache = DiskCache::new(config.effective_cache_dir(args.cache_dir.as_deref()));
        tracing::info!("Using region: {}, cache: {}", region, cache.root().display());

        let ctx = Context::new(Arc::new(account), region);
        let gateway_url = args.gateway.clone();
        let token = args.token.clone().or_else(|| config.gateway_token.clone());

        Ok(Self {
            config,
            enumerator: Enumerator::new(ctx, cache),
            gateway_url,
            token,
        })
    }

    async fn gateway(&self) -> Result<Gateway> {
        let gateway_config = match (&self.config.gateway, &self.gateway_url) {
            (Some(config), Some(url)) => GatewayConfig {
                base_url: url.clone(),
                ..config.clone()
            },
            (Some(config), None) => config.clone(),
            (None, Some(url)) => GatewayConfig::new(url.as_str()),
            (None, None) => anyhow::bail!("No gateway configured. Use --gateway or set `gateway` in the config file"),
        };

        let tokens = TokenSource::resolve(self.token.as_deref(), self.config.use_adc, &self.config.adc_scopes).await?;
        Gateway::new(gateway_config, tokens)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    if let Command::Kinds = args.command {
        for kind in get_all_kinds() {
            if let Some(def) = get_kind(kind) {
                println!("{:<20} {:<10} {}", def.kind, def.client, def.display_name);
            }
        }
        return Ok(());
    }

    if let Command::Use { mark } = &args.command {
        let mut config = Config::load();
        config.set_region(mark)?;
        config.save()?;
        println!("Default region: {}", mark);
        return Ok(());
    }

    let session = Session::new(&args)?;

    match &args.command {
        Command::List(list) => {
            let items = list_command(&session, list).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Provision(file) => {
            let report = provision_command(&session, file).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Dispose(file) => {
            let removed = dispose_command(&session, file).await?;
            println!("{}", if removed { "disposed" } else { "not found" });
        }
        Command::Cache { command } => cache_command(&session, command)?,
        Command::Regions => {
            let gateway = session.gateway().await?;
            for region in regions::list_regions(&gateway).await? {
                let meta = region.metadata();
                println!(
                    "{:<20} {:<24} {}",
                    region.mark(),
                    meta.display_name.as_deref().unwrap_or("-"),
                    meta.opt_in_status.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Kinds | Command::Use { .. } => {}
    }

    Ok(())
}

async fn list_command(session: &Session, args: &ListArgs) -> Result<Vec<Value>> {
    let def = get_kind(&args.kind)
        .with_context(|| format!("Unknown kind '{}'. Known: {}", args.kind, get_all_kinds().join(", ")))?;

    match def.kind {
        "security_group" => list_kind::<SecurityGroup>(session, args).await,
        "receipt_rule_set" => list_kind::<ReceiptRuleSet>(session, args).await,
        "db_subnet_group" => list_kind::<DbSubnetGroup>(session, args).await,
        "table" => list_kind::<Table>(session, args).await,
        other => anyhow::bail!("Listing {} is not wired up", other),
    }
}

fn listing_error(err: cloudrec::Error) -> anyhow::Error {
    if err.is_mapping() {
        anyhow::Error::new(err).context("Provider returned fields cloudrec does not map; rerun with --lenient to keep them")
    } else {
        err.into()
    }
}

async fn list_kind<R: CloudResource>(session: &Session, args: &ListArgs) -> Result<Vec<Value>> {
    let filters = args
        .filters
        .iter()
        .map(|spec| {
            ResourceFilter::parse(spec).with_context(|| format!("Invalid filter '{}', expected param=v1,v2", spec))
        })
        .collect::<Result<Vec<_>>>()?;

    let ctx = session.enumerator.context();
    let mut opts = EnumerateOptions::<R> {
        dedupe: args.dedupe,
        fan_out: if args.parallel {
            FanOut::Parallel
        } else {
            FanOut::Sequential
        },
        strictness: if args.lenient {
            Strictness::Lenient
        } else {
            Strictness::Strict
        },
        ..EnumerateOptions::default()
    }
    .update_info(args.refresh);
    if !args.all_regions {
        opts = opts.region(ctx.region.clone());
    }
    if !filters.is_empty() {
        opts = opts.filters(filters, args.cache_filters);
    }

    let gateway = session.gateway().await?;
    let objects = session
        .enumerator
        .enumerate::<R>(&gateway, opts)
        .await
        .map_err(listing_error)?;
    tracing::info!("Listed {} {} objects", objects.len(), R::KIND);

    Ok(objects
        .iter()
        .map(R::to_cache)
        .collect::<cloudrec::Result<Vec<_>>>()?)
}

/// Read a desired-state document; returns its kind and the remaining fields
fn read_desired(path: &Path) -> Result<(String, Value)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut document: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).context("Failed to parse JSON")?,
        _ => serde_yaml::from_str(&content).context("Failed to parse YAML")?,
    };

    let kind = document
        .as_object_mut()
        .and_then(|map| map.remove("kind"))
        .and_then(|kind| kind.as_str().map(str::to_string))
        .context("Desired-state file needs a top-level `kind`")?;

    Ok((kind, document))
}

fn provisioner_options(args: &FileArgs) -> ProvisionOptions {
    ProvisionOptions {
        update_info: !args.cached,
        ..ProvisionOptions::default()
    }
}

async fn provision_command(session: &Session, args: &FileArgs) -> Result<Value> {
    let (kind, document) = read_desired(&args.file)?;
    let def = get_kind(&kind).with_context(|| format!("Unknown kind '{}'", kind))?;

    match def.kind {
        "security_group" => provision_kind::<SecurityGroup>(session, args, &document).await,
        "receipt_rule_set" => provision_kind::<ReceiptRuleSet>(session, args, &document).await,
        "db_subnet_group" => provision_kind::<DbSubnetGroup>(session, args, &document).await,
        "table" => provision_kind::<Table>(session, args, &document).await,
        other => anyhow::bail!("Provisioning {} is not wired up", other),
    }
}

async fn provision_kind<R: Reconcile>(session: &Session, args: &FileArgs, document: &Value) -> Result<Value> {
    let mut desired = R::from_cache(document).context("Desired state does not match the kind's fields")?;

    let gateway = session.gateway().await?;
    let provisioner =
        Provisioner::new(&session.enumerator, &gateway, &gateway).with_options(provisioner_options(args));
    let report = provisioner.provision(&mut desired).await?;

    Ok(serde_json::json!({
        "action": report.action,
        "requests": report.requests,
        "resource": desired.to_cache()?,
    }))
}

async fn dispose_command(session: &Session, args: &FileArgs) -> Result<bool> {
    let (kind, document) = read_desired(&args.file)?;
    let def = get_kind(&kind).with_context(|| format!("Unknown kind '{}'", kind))?;

    match def.kind {
        "security_group" => dispose_kind::<SecurityGroup>(session, args, &document).await,
        "receipt_rule_set" => dispose_kind::<ReceiptRuleSet>(session, args, &document).await,
        "db_subnet_group" => dispose_kind::<DbSubnetGroup>(session, args, &document).await,
        "table" => dispose_kind::<Table>(session, args, &document).await,
        other => anyhow::bail!("Disposing {} is not wired up", other),
    }
}

async fn dispose_kind<R: CloudResource>(session: &Session, args: &FileArgs, document: &Value) -> Result<bool> {
    let desired = R::from_cache(document).context("Desired state does not match the kind's fields")?;

    let gateway = session.gateway().await?;
    let provisioner =
        Provisioner::new(&session.enumerator, &gateway, &gateway).with_options(provisioner_options(args));
    Ok(provisioner.dispose(&desired).await?)
}

fn cache_command(session: &Session, command: &CacheCommand) -> Result<()> {
    let cache = session.enumerator.cache();

    match command {
        CacheCommand::Path => println!("{}", cache.root().display()),
        CacheCommand::Clear { kind, in_region } => {
            let region = in_region.as_deref().map(Region::get).transpose()?;
            let scope = match (kind, region) {
                (Some(kind), region) => {
                    let def = get_kind(kind).with_context(|| format!("Unknown kind '{}'", kind))?;
                    ClearScope::Kind {
                        client: def.client,
                        kind: def.kind,
                        region,
                    }
                }
                (None, Some(region)) => ClearScope::Region(region),
                (None, None) => ClearScope::All,
            };

            let account = &session.enumerator.context().account;
            let removed = cache.clear(&account.name, &scope)?;
            println!("Removed {} cache file(s)", removed);
        }
    }
    Ok(())
}
