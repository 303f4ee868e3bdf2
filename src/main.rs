mod compose;
mod config;
mod extractor;
mod normalize;
mod pipeline;
mod protocol;
mod resolver;
mod runtime;
mod session;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use config::Config;
use extractor::{LinkCandidate, SourceKind};
use resolver::{HttpLinkResolver, LinkResolver, Resolution};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Bilibili link bridge for NapCat group chats")]
struct Cli {
    /// Path to TOML config file.
    #[arg(
        long,
        global = true,
        env = "BILI_BRIDGE_CONFIG",
        default_value = "bili-bridge.toml"
    )]
    config: PathBuf,

    /// Override gateway websocket URL.
    #[arg(long, global = true, env = "BILI_BRIDGE_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Override gateway access token.
    #[arg(long, global = true, env = "BILI_BRIDGE_GATEWAY_TOKEN")]
    gateway_token: Option<String>,

    /// Log level filter, e.g. info,debug,trace.
    #[arg(long, global = true, env = "BILI_BRIDGE_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommand {
    /// Connect to the gateway and answer Bilibili shares.
    Run,
    /// Run non-interactive configuration diagnostics.
    Doctor(DoctorArgs),
    /// Resolve one short link and print the reply that would be sent.
    Resolve(ResolveArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct DoctorArgs {
    /// Emit doctor output as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Args)]
struct ResolveArgs {
    /// Short link or card URL, e.g. https://b23.tv/abc123.
    url: String,
    /// Treat the link as share text instead of an app card.
    #[arg(long)]
    share_text: bool,
    /// Emit output as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorReport {
    ok: bool,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorCheck {
    id: String,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ResolveReport {
    source: &'static str,
    normalized_url: String,
    resolution: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bv: Option<String>,
    reply: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    let command = cli.command.clone().unwrap_or(CliCommand::Run);
    match command {
        CliCommand::Run => run_bridge(cli).await,
        CliCommand::Doctor(args) => run_doctor(&cli, args),
        CliCommand::Resolve(args) => run_resolve(&cli, args).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = Config::load(&cli.config)?;
    cfg.apply_cli_overrides(cli.gateway_url.as_deref(), cli.gateway_token.as_deref());
    cfg.validate()?;
    Ok(cfg)
}

async fn run_bridge(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;
    runtime::BridgeRuntime::new(cfg).run().await
}

fn run_doctor(cli: &Cli, args: DoctorArgs) -> Result<()> {
    let config_result = load_config(cli).map_err(|err| format!("{err:#}"));
    let report = build_doctor_report(config_result, &cli.config);
    print_doctor_report(&report, args.json);
    if report.ok {
        Ok(())
    } else {
        Err(anyhow!("doctor found blocking issues"))
    }
}

async fn run_resolve(cli: &Cli, args: ResolveArgs) -> Result<()> {
    let cfg = load_config(cli)?;
    let candidate = LinkCandidate {
        raw_url: args.url.trim().to_owned(),
        source_kind: if args.share_text {
            SourceKind::ShareText
        } else {
            SourceKind::AppCard
        },
        needs_normalization: !args.share_text,
    };
    let normalized_url = if candidate.needs_normalization {
        normalize::normalize(&candidate.raw_url)
    } else {
        candidate.raw_url.clone()
    };
    let resolution = if cfg.bilibili.enable_bv_mode {
        let resolver = HttpLinkResolver::new(&cfg.bridge).map_err(|err| anyhow!(err))?;
        resolver.resolve(&normalized_url).await
    } else {
        Resolution::Unresolved
    };
    let reply = compose::compose(&candidate, &resolution, &normalized_url, &cfg.bilibili);
    let report = ResolveReport {
        source: candidate.source_kind.as_str(),
        normalized_url,
        resolution: resolution.label(),
        bv: match &resolution {
            Resolution::VideoId(bv) => Some(bv.clone()),
            Resolution::LongFormMedia | Resolution::Unresolved => None,
        },
        reply,
    };
    print_resolve_report(&report, args.json);
    Ok(())
}

fn build_doctor_report(
    config_result: std::result::Result<Config, String>,
    config_path: &Path,
) -> DoctorReport {
    let mut checks = Vec::new();
    let mut config = None;

    match config_result {
        Ok(cfg) => {
            checks.push(DoctorCheck {
                id: "config.load".to_owned(),
                status: "pass".to_owned(),
                message: if config_path.exists() {
                    format!("loaded {}", config_path.display())
                } else {
                    format!("{} not found, using defaults", config_path.display())
                },
                detail: None,
            });
            config = Some(cfg);
        }
        Err(err) => {
            checks.push(DoctorCheck {
                id: "config.load".to_owned(),
                status: "fail".to_owned(),
                message: format!("failed to load {}", config_path.display()),
                detail: Some(err),
            });
        }
    }

    if let Some(cfg) = config.as_ref() {
        checks.push(DoctorCheck {
            id: "gateway.url".to_owned(),
            status: "pass".to_owned(),
            message: cfg.gateway.url.clone(),
            detail: Some(
                if cfg.gateway.bearer_token().is_some() {
                    "bearer token configured"
                } else {
                    "no access token"
                }
                .to_owned(),
            ),
        });

        let groups = cfg.enabled_groups();
        checks.push(DoctorCheck {
            id: "groups.enabled".to_owned(),
            status: if groups.is_empty() { "warn" } else { "pass" }.to_owned(),
            message: format!("{} group(s) enabled", groups.len()),
            detail: groups
                .is_empty()
                .then(|| "every message will be ignored".to_owned()),
        });

        let has_placeholder = cfg
            .bilibili
            .bv_append_format
            .contains(compose::BV_PLACEHOLDER);
        checks.push(DoctorCheck {
            id: "bilibili.bv_append_format".to_owned(),
            status: if has_placeholder || !cfg.bilibili.enable_bv_mode {
                "pass"
            } else {
                "warn"
            }
            .to_owned(),
            message: format!("{:?}", cfg.bilibili.bv_append_format),
            detail: (!has_placeholder).then(|| {
                format!(
                    "missing {} placeholder, replies will not carry the BV id",
                    compose::BV_PLACEHOLDER
                )
            }),
        });

        checks.push(DoctorCheck {
            id: "bridge.timing".to_owned(),
            status: "pass".to_owned(),
            message: format!(
                "reconnect={}ms reply_delay=[{}, {})ms resolve_timeout={}ms",
                cfg.bridge.reconnect_delay_ms,
                cfg.bridge.reply_delay_min_ms,
                cfg.bridge.reply_delay_max_ms,
                cfg.bridge.resolve_timeout_ms
            ),
            detail: None,
        });
    }

    let ok = checks.iter().all(|check| check.status != "fail");
    DoctorReport { ok, checks }
}

fn print_doctor_report(report: &DoctorReport, json_output: bool) {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(report)
                .unwrap_or_else(|_| "{\"ok\":false,\"checks\":[]}".to_owned())
        );
        return;
    }

    println!("doctor: {}", if report.ok { "ok" } else { "issues" });
    for check in &report.checks {
        let detail = check
            .detail
            .as_deref()
            .map(|value| format!(" ({value})"))
            .unwrap_or_default();
        println!(
            "[{}] {}: {}{}",
            check.status.to_uppercase(),
            check.id,
            check.message,
            detail
        );
    }
}

fn print_resolve_report(report: &ResolveReport, json_output: bool) {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_owned())
        );
        return;
    }
    println!("source:     {}", report.source);
    println!("normalized: {}", report.normalized_url);
    println!(
        "resolution: {}{}",
        report.resolution,
        report
            .bv
            .as_deref()
            .map(|bv| format!(" ({bv})"))
            .unwrap_or_default()
    );
    match report.reply.as_deref() {
        Some(reply) => println!("reply:\n{reply}"),
        None => println!("reply: <suppressed>"),
    }
}

fn init_logging(filter: &str) -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env)
        .with_target(false)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_run_without_subcommand() {
        let cli = Cli::parse_from(["bili-link-bridge"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "info");
    }

    #[test]
    fn cli_parses_doctor_command_and_flags() {
        let cli = Cli::parse_from(["bili-link-bridge", "doctor", "--json"]);
        match cli.command {
            Some(CliCommand::Doctor(args)) => assert!(args.json),
            _ => panic!("expected doctor command"),
        }
    }

    #[test]
    fn cli_parses_resolve_command_with_overrides() {
        let cli = Cli::parse_from([
            "bili-link-bridge",
            "--gateway-url",
            "ws://127.0.0.1:3001",
            "resolve",
            "https://b23.tv/abc123",
            "--share-text",
        ]);
        assert_eq!(cli.gateway_url.as_deref(), Some("ws://127.0.0.1:3001"));
        match cli.command {
            Some(CliCommand::Resolve(args)) => {
                assert_eq!(args.url, "https://b23.tv/abc123");
                assert!(args.share_text);
                assert!(!args.json);
            }
            _ => panic!("expected resolve command"),
        }
    }

    #[test]
    fn doctor_report_marks_config_load_failure_as_blocking() {
        let report = build_doctor_report(
            Err("bad toml".to_owned()),
            Path::new("/nonexistent/bili-bridge.toml"),
        );
        assert!(!report.ok);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].status, "fail");
    }

    #[test]
    fn doctor_report_warns_on_empty_groups_and_missing_placeholder() {
        let mut cfg = Config::default();
        cfg.bilibili.bv_append_format = " BV".to_owned();
        let report = build_doctor_report(Ok(cfg), Path::new("/nonexistent/bili-bridge.toml"));
        assert!(report.ok);
        let status_of = |id: &str| {
            report
                .checks
                .iter()
                .find(|check| check.id == id)
                .map(|check| check.status.clone())
        };
        assert_eq!(status_of("groups.enabled").as_deref(), Some("warn"));
        assert_eq!(
            status_of("bilibili.bv_append_format").as_deref(),
            Some("warn")
        );
        assert_eq!(status_of("config.load").as_deref(), Some("pass"));
    }
}
