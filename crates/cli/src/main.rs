use std::path::{Path as FsPath, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bindery_binding::{assemble, BindingRule, Definition, DefinitionBuilder, Entry, ResourceDocument, Value};
use bindery_kubehub::KubeFetcher;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "binderyctl", version, about = "Extract binding values from Kubernetes resources")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace used for dereferencing (default: metadata.namespace of the document)
    #[arg(long = "ns", env = "BINDERY_NAMESPACE", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply rules to a YAML/JSON resource document and print the merged value
    Extract {
        /// Resource document (YAML or JSON)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        /// Rule, e.g. "path={.status.secret},objectType=Secret,sourceKey=password"
        #[arg(short = 'r', long = "rule", required = true)]
        rules: Vec<String>,
        /// Do not contact the cluster; dereferencing rules fail
        #[arg(long = "offline", action = ArgAction::SetTrue)]
        offline: bool,
    },
    /// Show which definition each rule compiles to and its grouping path
    Rules {
        #[arg(short = 'r', long = "rule", required = true)]
        rules: Vec<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("BINDERY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("BINDERY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid BINDERY_METRICS_ADDR; expected host:port");
        }
    }
}

fn max_doc_bytes() -> usize {
    std::env::var("BINDERY_MAX_DOC_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn load_document(path: &FsPath, ns_override: Option<&str>) -> Result<ResourceDocument> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.len() > max_doc_bytes() {
        return Err(anyhow!("document too large (>{} bytes)", max_doc_bytes()));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(&text).context("parsing YAML")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    if !json.is_object() {
        return Err(anyhow!("document must be a mapping at the top level"));
    }
    let doc = ResourceDocument::from_json(json);
    Ok(match ns_override {
        Some(ns) => doc.with_namespace(ns),
        None => doc,
    })
}

fn parse_rules(raw: &[String]) -> Result<Vec<BindingRule>> {
    raw.iter()
        .map(|r| r.parse::<BindingRule>().with_context(|| format!("parsing rule {:?}", r)))
        .collect()
}

fn build_all(rules: Vec<BindingRule>) -> Result<Vec<Definition>> {
    rules
        .into_iter()
        .map(|r| r.build().with_context(|| format!("building rule for path {:?}", r.path)))
        .collect()
}

fn print_human(v: &Value) {
    for (key, entry) in v.iter() {
        let key = if key.is_empty() { "<unnamed>" } else { key };
        match entry {
            Entry::Scalar(s) => println!("{}={}", key, s),
            Entry::Map(m) => {
                for (k, s) in m.iter() {
                    match s {
                        Some(s) => println!("{}.{}={}", key, k, s),
                        None => println!("{}.{} (unset)", key, k),
                    }
                }
            }
            Entry::List(items) => println!("{}=[{}]", key, items.join(", ")),
            Entry::Raw(raw) => println!("{}={}", key, raw),
            Entry::Bytes(bytes) => println!("{} ({} bytes, not UTF-8; use -o json for base64)", key, bytes.len()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { file, rules, offline } => {
            let doc = load_document(&file, cli.namespace.as_deref())?;
            info!(file = %file.display(), ns = ?doc.namespace(), rules = rules.len(), "extract invoked");
            let mut rules = parse_rules(&rules)?;
            let needs_cluster = rules.iter().any(|r| r.object_type.resource_kind().is_some());
            if needs_cluster && !offline {
                let fetcher = Arc::new(KubeFetcher::try_default().await?);
                rules = rules.into_iter().map(|r| r.with_fetcher(fetcher.clone())).collect();
            } else if needs_cluster {
                debug!("offline: dereferencing rules have no fetch client");
            }
            let defs = build_all(rules)?;
            let value = assemble(&defs, &doc).await?;
            match cli.output {
                Output::Human => print_human(&value),
                Output::Json => println!("{}", serde_json::to_string_pretty(&value)?),
            }
        }
        Commands::Rules { rules } => {
            let defs = build_all(parse_rules(&rules)?)?;
            match cli.output {
                Output::Human => {
                    for d in defs.iter() {
                        let group = d.get_path().iter().map(|s| format!(".{}", s)).collect::<String>();
                        let deref = if d.dereferences() { " • dereferences" } else { "" };
                        println!("{} • {} • group {}{}", d.path(), d.variant(), if group.is_empty() { "." } else { group.as_str() }, deref);
                    }
                }
                Output::Json => {
                    let rows: Vec<serde_json::Value> = defs
                        .iter()
                        .map(|d| serde_json::json!({
                            "path": d.path().to_string(),
                            "variant": d.variant(),
                            "group": d.get_path(),
                            "dereferences": d.dereferences(),
                        }))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
    }
    Ok(())
}
