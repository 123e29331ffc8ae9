//! OralVis CLI - a terminal front end for the OralVis scan intake system.
//!
//! Technicians upload scans, dentists list and delete them. Every command
//! restores the saved session first and checks the route for its role
//! before touching the network.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oralvis_core::api::{AuthError, ProgressFn};
use oralvis_core::auth::guard::{self, Decision};
use oralvis_core::auth::{FileTokenStore, KeyringTokenStore, TokenStore};
use oralvis_core::config::TokenStoreKind;
use oralvis_core::models::{ScanImage, ScanUpload};
use oralvis_core::{AuthState, Config, HttpClient, Role, SessionManager};

const USAGE: &str = "\
Usage: oralvis <command> [args]

Commands:
  login <email>                 Sign in (prompts for password)
  signup <email> <role>         Create an account (role: Technician or Dentist)
  logout                        Forget the saved session
  whoami                        Show the current session
  route <path>                  Show where navigating to <path> would lead
  scans                         List scans (dentist)
  delete <id>                   Delete a scan (dentist)
  upload [options] <files...>   Upload scan images (technician)
      --patient-name <name>
      --patient-id <id>
      --scan-type <type>
      --region <region>

Environment:
  ORALVIS_API_URL               Backend base URL (required)
  ORALVIS_TOKEN_STORE           file (default) or keyring
  RUST_LOG                      Log filter, e.g. debug";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines on drop.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    Ok(match config.token_store {
        TokenStoreKind::File => Arc::new(FileTokenStore::new(&config.data_dir)),
        TokenStoreKind::Keyring => {
            Arc::new(KeyringTokenStore::new().context("Failed to open OS keychain")?)
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if command == "-h" || command == "--help" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::from_env().context("Invalid configuration")?;
    let store = open_store(&config)?;
    let session = Arc::new(SessionManager::new(store));
    session.initialize();

    let client = HttpClient::new(config, session).context("Failed to build HTTP client")?;
    let mut redirects = client.subscribe_redirects();

    let result = run(&client, command, rest).await;

    // A 401 anywhere means the saved session is gone
    if let Ok(redirect) = redirects.try_recv() {
        eprintln!("Session is no longer valid. Go to {} and sign in again.", redirect.to);
    }
    result
}

async fn run(client: &HttpClient, command: &str, args: &[String]) -> Result<()> {
    match (command, args) {
        ("login", [email]) => login(client, email).await,
        ("signup", [email, role]) => signup(client, email, role).await,
        ("logout", []) => {
            client.session().logout();
            println!("Signed out.");
            Ok(())
        }
        ("whoami", []) => whoami(client),
        ("route", [path]) => {
            print_decision(path, &guard::evaluate_path(&client.session().current(), path));
            Ok(())
        }
        ("scans", []) => list_scans(client).await,
        ("delete", [id]) => delete_scan(client, id).await,
        ("upload", args) if !args.is_empty() => upload(client, args).await,
        _ => bail!("Unrecognized command or arguments\n\n{}", USAGE),
    }
}

/// Refuse to continue unless the session may visit `path`.
fn require_route(client: &HttpClient, path: &str) -> Result<()> {
    match guard::evaluate_path(&client.session().check_expiry(), path) {
        Decision::Allow => Ok(()),
        Decision::RedirectTo(to) => bail!("Not allowed here; go to {} instead", to),
        Decision::Pending => bail!("Session is still loading"),
    }
}

fn print_decision(path: &str, decision: &Decision) {
    match decision {
        Decision::Allow => println!("{} -> allowed", path),
        Decision::RedirectTo(to) => println!("{} -> redirect to {}", path, to),
        Decision::Pending => println!("{} -> loading", path),
    }
}

async fn login(client: &HttpClient, email: &str) -> Result<()> {
    require_route(client, guard::LOGIN_PATH)?;

    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    match client.login(email, &password).await {
        Ok(state) => {
            let home = state.role().map(|r| r.home_path()).unwrap_or(guard::ROOT_PATH);
            println!("Signed in. Home: {}", home);
            Ok(())
        }
        Err(AuthError::Http(e)) => bail!("{}", e),
        Err(AuthError::Session(e)) => bail!("{}", e),
    }
}

async fn signup(client: &HttpClient, email: &str, role: &str) -> Result<()> {
    require_route(client, guard::SIGNUP_PATH)?;

    let role: Role = role.parse().context("Role must be Technician or Dentist")?;
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ")
        .context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match.");
    }

    let id = client.signup(email, &password, role).await?;
    println!("Signup successful! User ID: {}", id);
    Ok(())
}

fn whoami(client: &HttpClient) -> Result<()> {
    let state = client.session().check_expiry();
    match &state {
        AuthState::Authenticated { expires_at, .. } => {
            let expires = expiry_timestamp(*expires_at).unwrap_or_else(|| expires_at.to_string());
            let mut json = serde_json::to_value(&state)?;
            json["expires"] = serde_json::Value::String(expires);
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

/// RFC 3339 rendering of an `exp` claim, if it fits chrono's range.
fn expiry_timestamp(expires_at: u64) -> Option<String> {
    i64::try_from(expires_at)
        .ok()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
}

async fn list_scans(client: &HttpClient) -> Result<()> {
    require_route(client, Role::Dentist.home_path())?;

    let scans = client.list_scans().await?;
    if scans.is_empty() {
        println!("No scans.");
        return Ok(());
    }
    for scan in &scans {
        let date = scan
            .uploaded_at()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .or_else(|| scan.upload_date.clone())
            .unwrap_or_default();
        println!(
            "{:>6}  {:<24} {:<10} {:<10} {:<10} {}",
            scan.id,
            scan.patient_name.as_deref().unwrap_or("-"),
            scan.patient_id.as_deref().unwrap_or("-"),
            scan.scan_type.as_deref().unwrap_or("-"),
            scan.region.as_deref().unwrap_or("-"),
            date,
        );
    }
    info!(count = scans.len(), "Listed scans");
    Ok(())
}

async fn delete_scan(client: &HttpClient, id: &str) -> Result<()> {
    require_route(client, Role::Dentist.home_path())?;

    client.delete_scan(id).await?;
    println!("Deleted scan {}.", id);
    Ok(())
}

fn parse_upload_args(args: &[String]) -> Result<(ScanUpload, Vec<String>)> {
    let mut scan = ScanUpload::default();
    let mut files = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let field = match arg.as_str() {
            "--patient-name" => &mut scan.patient_name,
            "--patient-id" => &mut scan.patient_id,
            "--scan-type" => &mut scan.scan_type,
            "--region" => &mut scan.region,
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            file => {
                files.push(file.to_string());
                continue;
            }
        };
        *field = iter
            .next()
            .with_context(|| format!("{} needs a value", arg))?
            .clone();
    }

    if files.is_empty() {
        bail!("Please select at least one image file.");
    }
    Ok((scan, files))
}

async fn upload(client: &HttpClient, args: &[String]) -> Result<()> {
    require_route(client, Role::Technician.home_path())?;
    let (scan, files) = parse_upload_args(args)?;

    let mut images = Vec::with_capacity(files.len());
    for file in &files {
        let path = Path::new(file);
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", file))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone());
        images.push(ScanImage::new(name, bytes));
    }

    for image in images {
        let total = image.bytes.len() as u64;
        let label = image.file_name.clone();
        let progress: ProgressFn = Arc::new(move |sent| {
            let percent = if total == 0 { 100 } else { sent * 100 / total };
            eprint!("\r{}: {:>3}%", label, percent);
            let _ = io::stderr().flush();
        });
        client.upload_scan(&scan, image, Some(progress)).await?;
        eprintln!();
    }

    println!("All scans uploaded successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_upload_args() {
        let (scan, files) = parse_upload_args(&args(&[
            "--patient-name",
            "Jane Doe",
            "a.png",
            "--region",
            "Upper",
            "b.jpg",
        ]))
        .unwrap();
        assert_eq!(scan.patient_name, "Jane Doe");
        assert_eq!(scan.region, "Upper");
        assert_eq!(files, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn test_expiry_timestamp() {
        assert_eq!(
            expiry_timestamp(4_102_444_800).as_deref(),
            Some("2100-01-01T00:00:00+00:00")
        );
        assert_eq!(expiry_timestamp(u64::MAX), None);
        assert_eq!(expiry_timestamp(i64::MAX as u64 + 1), None);
    }

    #[test]
    fn test_parse_upload_args_requires_files() {
        assert!(parse_upload_args(&args(&["--patient-id", "P1"])).is_err());
    }

    #[test]
    fn test_parse_upload_args_rejects_bad_flags() {
        assert!(parse_upload_args(&args(&["--nope", "x", "a.png"])).is_err());
        assert!(parse_upload_args(&args(&["a.png", "--region"])).is_err());
    }
}
