use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use portcullis::{
    AccessStrategyEnforcer, Service, ServiceRegistry,
    attributes::Attributes,
    config::PortcullisConfig,
    observability,
    ticket::{Authentication, Principal, SessionTicket, TicketState},
};

const EXIT_ALLOWED: i32 = 0;
const EXIT_DENIED: i32 = 1;
const EXIT_ERROR: i32 = 2;

/// CLI arguments for Portcullis
#[derive(Parser, Debug)]
#[command(version, about = "Registered-service access-control diagnostics", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse and validate a configuration file
    Validate {
        /// Path to the config file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Evaluate every policy for one request and print the decision
    ///
    /// Exits with 0 when access is allowed, 1 when denied and 2 on errors.
    Check {
        /// Path to the config file
        #[arg(short, long)]
        config: PathBuf,
        /// Service URL presented by the request
        #[arg(short, long)]
        service: String,
        /// Authenticated principal id
        #[arg(short, long)]
        principal: String,
        /// Principal attribute as name=value; repeat for more values
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Times the SSO session has already been used; omit for no session
        #[arg(long)]
        ticket_uses: Option<u32>,
        /// The request carries fresh credentials
        #[arg(long)]
        credentials: bool,
    },
}

fn parse_attribute(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, v)) if !name.trim().is_empty() => Ok((name.trim().to_string(), v.to_string())),
        _ => Err(format!("expected name=value, got '{value}'")),
    }
}

fn load_config(path: &Path) -> PortcullisConfig {
    match PortcullisConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// Inputs of the `check` command.
#[derive(Debug, Clone)]
struct CheckOptions {
    service: String,
    principal: String,
    attributes: Vec<(String, String)>,
    ticket_uses: Option<u32>,
    credentials: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Validate { config } => run_validate(&config),
        Command::Check {
            config,
            service,
            principal,
            attributes,
            ticket_uses,
            credentials,
        } => {
            let options = CheckOptions {
                service,
                principal,
                attributes,
                ticket_uses,
                credentials,
            };
            run_check(&config, options).await
        }
    }
}

fn run_validate(config_path: &Path) {
    let config = load_config(config_path);
    println!(
        "{}: {} registered service(s)",
        config_path.display(),
        config.services.len()
    );
    for line in describe_services(&config) {
        println!("{line}");
    }
    std::process::exit(EXIT_ALLOWED);
}

/// One line per registered service, in evaluation order.
fn describe_services(config: &PortcullisConfig) -> Vec<String> {
    config
        .service_registry()
        .all()
        .iter()
        .map(|service| {
            format!(
                "  [{}] {} ({}) order={}",
                service.id, service.name, service.service_id, service.evaluation_order
            )
        })
        .collect()
}

async fn run_check(config_path: &Path, options: CheckOptions) {
    let config = load_config(config_path);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(EXIT_ERROR);
    }

    let (code, lines) = check(&config, &options).await;
    for line in lines {
        println!("{line}");
    }
    std::process::exit(code);
}

/// Run the enforcer for one request; returns the exit code and the report.
async fn check(config: &PortcullisConfig, options: &CheckOptions) -> (i32, Vec<String>) {
    let mut attributes = Attributes::new();
    for (name, value) in &options.attributes {
        attributes.entry(name.clone()).or_default().push(value.clone());
    }

    let authentication =
        Authentication::new(Principal::new(&options.principal).with_attributes(attributes));
    let ticket = options.ticket_uses.map(|uses| {
        SessionTicket::new("TGT-diagnostic", authentication.clone()).with_count_of_uses(uses)
    });
    let request = Service::new(&options.service);

    let enforcer = AccessStrategyEnforcer::new(Arc::new(config.service_registry()));
    let decision = enforcer
        .enforce(
            &request,
            &authentication,
            ticket.as_ref().map(|t| t as &dyn TicketState),
            options.credentials,
        )
        .await;

    match decision {
        Ok(registered_service) => {
            let mut lines = vec![format!(
                "ALLOWED: {} matched registered service [{}] {}",
                options.service, registered_service.id, registered_service.name
            )];
            lines.push(
                match registered_service.username_provider.resolve_username(
                    &authentication.principal,
                    &request,
                    &registered_service,
                    None,
                ) {
                    Ok(username) => format!("  username released: {username}"),
                    Err(e) => format!("  username not resolved: {e}"),
                },
            );
            (EXIT_ALLOWED, lines)
        }
        Err(e) => (
            EXIT_DENIED,
            vec![format!("DENIED: {e}"), format!("  code: {}", e.code())],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute() {
        assert_eq!(
            parse_attribute("memberOf=admins").unwrap(),
            ("memberOf".to_string(), "admins".to_string())
        );
        assert_eq!(
            parse_attribute("mail=a=b@example.org").unwrap(),
            ("mail".to_string(), "a=b@example.org".to_string())
        );
        assert!(parse_attribute("no-separator").is_err());
        assert!(parse_attribute("=value").is_err());
    }

    const CONFIG: &str = r#"
        [[services]]
        id = 7
        service_id = "https://app\\.example\\.org/.*"
        name = "App"
        evaluation_order = 5

        [services.access_strategy]
        type = "default"
        sso_enabled = false

        [services.access_strategy.required_attributes]
        memberOf = ["admins"]

        [[services]]
        id = 8
        service_id = "https://.*"
        name = "Everything"
        evaluation_order = 100
    "#;

    fn config() -> PortcullisConfig {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, CONFIG.as_bytes()).unwrap();
        PortcullisConfig::from_file(file.path()).unwrap()
    }

    fn options(service: &str, attributes: &[(&str, &str)]) -> CheckOptions {
        CheckOptions {
            service: service.to_string(),
            principal: "casuser".to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ticket_uses: None,
            credentials: false,
        }
    }

    #[test]
    fn test_describe_services_in_evaluation_order() {
        let lines = describe_services(&config());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[7] App"));
        assert!(lines[0].contains("order=5"));
        assert!(lines[1].contains("[8] Everything"));
    }

    #[tokio::test]
    async fn test_check_allowed() {
        let (code, lines) = check(
            &config(),
            &options("https://app.example.org/login", &[("memberOf", "admins")]),
        )
        .await;
        assert_eq!(code, EXIT_ALLOWED);
        assert!(lines[0].starts_with("ALLOWED"));
        assert!(lines[0].contains("[7] App"));
        assert_eq!(lines[1], "  username released: casuser");
    }

    #[tokio::test]
    async fn test_check_denied_codes() {
        let config = config();

        let (code, lines) = check(&config, &options("https://app.example.org/login", &[])).await;
        assert_eq!(code, EXIT_DENIED);
        assert_eq!(lines[1], "  code: service.not.authorized.for.principal");

        let (code, lines) = check(&config, &options("ftp://files.example.org", &[])).await;
        assert_eq!(code, EXIT_DENIED);
        assert_eq!(lines[1], "  code: screen.service.error.message");

        let mut reused = options("https://app.example.org/login", &[("memberOf", "admins")]);
        reused.ticket_uses = Some(2);
        let (code, lines) = check(&config, &reused).await;
        assert_eq!(code, EXIT_DENIED);
        assert_eq!(lines[1], "  code: screen.service.sso.error.message");

        reused.credentials = true;
        let (code, _) = check(&config, &reused).await;
        assert_eq!(code, EXIT_ALLOWED);
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "portcullis",
            "check",
            "--config",
            "portcullis.toml",
            "--service",
            "https://app.example.org",
            "--principal",
            "casuser",
            "--attr",
            "memberOf=admins",
            "--attr",
            "memberOf=staff",
            "--ticket-uses",
            "2",
        ])
        .unwrap();
        match args.command {
            Command::Check {
                attributes,
                ticket_uses,
                credentials,
                ..
            } => {
                assert_eq!(attributes.len(), 2);
                assert_eq!(ticket_uses, Some(2));
                assert!(!credentials);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
