//! `warden` command line

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use warden_core::{
    plan_targets, Assessment, CheckRegistry, DrushTargetFactory, Orchestrator, Policy, PolicyLibrary,
    Profile, ProfileSelection, ReportingPeriod, RunConfig, Severity, EXIT_INVALID_TARGET,
};

const LOG_ENV: &str = "WARDEN_LOG";

fn cli() -> Command {
    Command::new("warden")
        .version(warden_core::VERSION)
        .about("Audit sites against declarative policy profiles")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("profile-run")
                .about("Run a policy profile against a target")
                .arg(Arg::new("profile").required(true).help("Profile YAML file"))
                .arg(Arg::new("target").required(true).help("Target alias, e.g. @site.prod"))
                .arg(
                    Arg::new("uri")
                        .short('l')
                        .long("uri")
                        .action(ArgAction::Append)
                        .help("Site URI to assess; repeat for several sites"),
                )
                .arg(
                    Arg::new("domain-file")
                        .long("domain-file")
                        .value_parser(value_parser!(PathBuf))
                        .help("File listing one site URI per line"),
                )
                .arg(
                    Arg::new("exit-on-severity")
                        .short('x')
                        .long("exit-on-severity")
                        .value_parser(value_parser!(Severity))
                        .help("Exit non-zero when a failure reaches this severity"),
                )
                .arg(
                    Arg::new("include-policy")
                        .short('p')
                        .long("include-policy")
                        .action(ArgAction::Append)
                        .help("Add a policy to the profile"),
                )
                .arg(
                    Arg::new("exclude-policy")
                        .short('e')
                        .long("exclude-policy")
                        .action(ArgAction::Append)
                        .help("Remove a policy from the profile"),
                )
                .arg(
                    Arg::new("policy-dir")
                        .long("policy-dir")
                        .default_value("policies")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of policy YAML files"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Run configuration TOML file"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_parser(value_parser!(usize))
                        .help("Maximum sites assessed at once"),
                )
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .help("Override the profile title"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the JSON report here instead of stdout"),
                ),
        )
        .subcommand(Command::new("check-list").about("List available check classes"))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("profile-run", args)) => {
            let code = profile_run(args).await?;
            std::process::exit(code);
        }
        Some(("check-list", _)) => {
            check_list();
            Ok(())
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn check_list() {
    let registry = CheckRegistry::with_builtins();
    for name in registry.names() {
        if let Some(metadata) = registry.metadata(name) {
            let marker = if metadata.deprecated { " (deprecated)" } else { "" };
            println!("{name}{marker}\n  {}", metadata.description);
            for parameter in &metadata.parameters {
                println!("  - {}: {}", parameter.name, parameter.description);
            }
        }
    }
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Site URIs from a domain file, skipping blanks and `#` comments
fn read_domain_file(path: &Path) -> Result<Vec<String>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading domain file {}", path.display()))?;
    Ok(parse_domains(&source))
}

fn parse_domains(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

fn load_config(args: &ArgMatches) -> Result<RunConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading run configuration {}", path.display()))?,
        None => RunConfig::new(),
    };
    if let Some(severity) = args.get_one::<Severity>("exit-on-severity") {
        config = config.with_exit_on_severity(Some(*severity));
    }
    if let Some(max) = args.get_one::<usize>("concurrency") {
        config = config.with_max_concurrency(*max);
    }
    config.validate()?;
    Ok(config)
}

fn build_policies(
    args: &ArgMatches,
    profile: &Profile,
    selection: &ProfileSelection,
    registry: &CheckRegistry,
) -> Result<Vec<Arc<Policy>>> {
    let library = match args.get_one::<PathBuf>("policy-dir") {
        Some(dir) => PolicyLibrary::load_dir(dir)
            .with_context(|| format!("loading policies from {}", dir.display()))?,
        None => PolicyLibrary::new(),
    };
    Ok(profile.build_policies(selection, &library, registry)?)
}

async fn profile_run(args: &ArgMatches) -> Result<i32> {
    let config = load_config(args)?;
    let registry = Arc::new(CheckRegistry::with_builtins());

    let (Some(profile_path), Some(alias)) = (
        args.get_one::<String>("profile"),
        args.get_one::<String>("target"),
    ) else {
        anyhow::bail!("profile and target are required");
    };

    let mut profile = Profile::from_file(profile_path)
        .with_context(|| format!("loading profile {profile_path}"))?;
    if let Some(title) = args.get_one::<String>("title") {
        profile = profile.with_title(title.clone());
    }

    let selection = ProfileSelection {
        include: strings(args, "include-policy"),
        exclude: strings(args, "exclude-policy"),
    };
    let policies = match build_policies(args, &profile, &selection, &registry) {
        Ok(policies) => policies,
        Err(e) => {
            tracing::error!("could not build policies for {}: {e:#}", profile.name);
            return Ok(EXIT_INVALID_TARGET);
        }
    };

    let domains = match args.get_one::<PathBuf>("domain-file") {
        Some(path) => match read_domain_file(path) {
            Ok(domains) => domains,
            Err(e) => {
                tracing::error!("could not build target list: {e:#}");
                return Ok(EXIT_INVALID_TARGET);
            }
        },
        None => Vec::new(),
    };
    let targets = plan_targets(alias, &strings(args, "uri"), &domains);

    let factory = Arc::new(DrushTargetFactory::new(
        config.transport.clone(),
        config.command_timeout(),
    ));
    let period = ReportingPeriod::ending_now(config.reporting_period_hours)?;
    let orchestrator = Orchestrator::new(config, registry, factory);

    let signal = orchestrator.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            signal.cancel();
        }
    });

    tracing::info!(
        profile = %profile.name,
        title = %profile.title,
        policies = policies.len(),
        targets = targets.len(),
        "running profile"
    );
    let outcome = orchestrator
        .run(policies, targets, period, |assessment: &Assessment| {
            eprintln!(
                "{}: {} policies evaluated, severity {}",
                assessment.uri(),
                assessment.responses().len(),
                assessment.severity_code()
            );
        })
        .await;

    for (target, error) in &outcome.failures {
        eprintln!("{target}: not assessed ({error})");
    }

    let report = serde_json::to_string_pretty(&outcome.assessments)?;
    match args.get_one::<PathBuf>("output") {
        Some(path) => std::fs::write(path, report)
            .with_context(|| format!("writing report {}", path.display()))?,
        None => println!("{report}"),
    }

    Ok(outcome.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn profile_run_arguments_parse() {
        let matches = cli()
            .try_get_matches_from([
                "warden",
                "profile-run",
                "site_audit.yml",
                "@site.prod",
                "-l",
                "a.example.com",
                "--uri",
                "b.example.com",
                "-x",
                "high",
                "-e",
                "Legacy",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "profile-run");
        assert_eq!(strings(args, "uri"), vec!["a.example.com", "b.example.com"]);
        assert_eq!(strings(args, "exclude-policy"), vec!["Legacy"]);
        assert_eq!(args.get_one::<Severity>("exit-on-severity"), Some(&Severity::High));
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let result = cli().try_get_matches_from([
            "warden",
            "profile-run",
            "p.yml",
            "@site",
            "--exit-on-severity",
            "catastrophic",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn domain_file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# fleet\na.example.com\n\n  b.example.com  ").unwrap();
        let domains = read_domain_file(file.path()).unwrap();
        assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency = 8\nexit_on_severity = \"low\"").unwrap();
        let path = file.path().display().to_string();
        let matches = cli()
            .try_get_matches_from([
                "warden",
                "profile-run",
                "p.yml",
                "@site",
                "--config",
                path.as_str(),
                "-x",
                "critical",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let config = load_config(args).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.exit_on_severity, Some(Severity::Critical));
    }
}
