mod analyze;
mod capture;
mod config;
mod error;
mod parse;
mod relay;
mod scan_db;
mod store;

use capture::{CaptureSource, FileCapture};
use config::{Backend, Config};
use error::ScanError;
use scan_db::{ScanStore, StoredScan};
use time::OffsetDateTime;
use tracing::info;

const CONFIG_PATH_ENV: &str = "MEDSCAN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = ".config/medscan.toml";

fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["scan", image_path] => {
            // One attempt, no internal retry: failures are reported once
            // and the user re-invokes capture.
            if let Err(e) = run_scan(image_path).await {
                tracing::error!(error = %e, "Scan failed");
                match e {
                    ScanError::Capture(_) => {
                        eprintln!("Não foi possível tirar a foto. Tente novamente.")
                    }
                    _ => eprintln!("Erro de análise. Tente novamente."),
                }
                std::process::exit(1);
            }
        }
        ["prompt"] => show_prompt()?,
        ["prompt", "set", text] => {
            Config::update_prompt(config_path(), text)?;
            println!("Prompt salvo com sucesso.");
        }
        ["prompt", "reset"] => {
            Config::reset_prompt(config_path())?;
            println!("Prompt padrão restaurado.");
        }
        ["relay"] => {
            let cfg = Config::load(config_path())?;
            relay::serve(&cfg, relay::DEFAULT_RELAY_ADDR).await?;
        }
        ["relay", addr] => {
            let cfg = Config::load(config_path())?;
            relay::serve(&cfg, addr).await?;
        }
        ["history"] => show_history()?,
        _ => print_usage(),
    }

    Ok(())
}

/// Drive one end-to-end analysis attempt: capture, record, analyze via the
/// configured backend, persist and print the result.
async fn run_scan(image_path: &str) -> Result<(), ScanError> {
    let cfg = Config::load(config_path())?;

    if let Some(parent) = std::path::Path::new(&cfg.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = ScanStore::new(&cfg.db_path)?;

    let image = FileCapture::new(image_path).capture().await?;

    let captured_at = OffsetDateTime::now_utc().unix_timestamp();
    let file_name = store::ObjectStore::generate_object_name();
    let uid = ScanStore::generate_uid(&file_name, captured_at);

    db.upsert_scan(&StoredScan {
        uid: uid.clone(),
        file_name: file_name.clone(),
        image: image.clone(),
        captured_at,
        is_analyzed: false,
    })?;

    let prompt = cfg.prompt_text();

    let record = match cfg.vision.backend {
        Backend::Direct => {
            let client = analyze::VisionClient::new(&cfg.vision)?;
            client.analyze(prompt, &image).await?
        }
        Backend::Relay => {
            let storage = cfg.storage.as_ref().ok_or_else(|| {
                ScanError::Config(
                    "[storage] section is required for the relay backend".to_string(),
                )
            })?;
            let store = store::ObjectStore::new(storage)?;
            store.upload(&file_name, image.clone()).await?;
            relay::RelayClient::new(&cfg.vision.relay_url)
                .analyze(&file_name, prompt)
                .await?
        }
    };

    db.set_result(&uid, &record)?;

    let (filled, total) = record.coverage();
    info!(uid = %uid, filled, total, "Scan complete");

    println!("{}", serde_json::to_string_pretty(&record)?);
    println!("Tarja: {}", record.stripe_label());
    Ok(())
}

fn show_prompt() -> Result<(), ScanError> {
    let cfg = Config::load(config_path())?;
    let origin = if cfg.has_saved_prompt() {
        "salvo"
    } else {
        "padrão"
    };
    println!("--- Prompt de análise ({origin}) ---");
    println!("{}", cfg.prompt_text());
    Ok(())
}

fn show_history() -> Result<(), ScanError> {
    let cfg = Config::load(config_path())?;
    let db = ScanStore::new(&cfg.db_path)?;

    let (total, analyzed) = db.get_counts()?;
    info!(
        scans_total = total,
        scans_analyzed = analyzed,
        "Scan store statistics"
    );

    for scan in db.list_scans(20)? {
        let status = if scan.is_analyzed {
            "analisado"
        } else {
            "pendente"
        };
        println!(
            "{}  {}  {}  {}",
            &scan.uid[..12],
            scan.file_name,
            scan.captured_at,
            status
        );
    }
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: medscan <command>

  scan <image-path>    capture a box photo and analyze it
  prompt               show the current analysis instruction
  prompt set <text>    save a custom instruction
  prompt reset         restore the built-in instruction
  relay [addr]         run the credential-holding relay server
  history              list stored scans"
    );
}
