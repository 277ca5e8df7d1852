use std::env;
use std::io;
use std::process;

use aad_core::cleaner::handler::Cleaner;
use aad_core::graph::client::GraphClient;
use aad_core::helpers::config::CleanerConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use dotenvy::dotenv;
use getopts::Options;

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [OPTIONS]", program);
    print!("{}", opts.usage(&brief));
    println!("\nEnvironment variables:");
    println!("  TENANT_ID         Directory (tenant) ID (required)");
    println!("  CLIENT_ID         Service principal client ID (required)");
    println!("  CLIENT_SECRET     Service principal client secret (required)");
    println!("  REPORT_ONLY       Set to \"false\" to delete stale applications (default: report only)");
    println!("  APP_FILTER        OData filter selecting the applications to evaluate");
    println!("  GRAPH_BASE_URL    Microsoft Graph endpoint (default: https://graph.microsoft.com/beta)");
    println!("  AUTHORITY_HOST    Identity platform host (default: https://login.microsoftonline.com)");
    println!("  RUST_LOG          Log filter (default: info)");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let program = args
        .first()
        .cloned()
        .unwrap_or_else(|| "aad-cleaner".to_string());

    let mut opts = Options::new();
    opts.optflag(
        "r",
        "report-only",
        "Print verdicts without deleting anything, whatever REPORT_ONLY says",
    );
    opts.optflag("h", "help", "Show this help message");

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("Error parsing arguments: {}", f);
            print_usage(&program, opts);
            process::exit(1);
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, opts);
        return Ok(());
    }

    let mut config = CleanerConfig::from_env().context("Error loading configuration")?;
    if matches.opt_present("r") {
        config = config.with_report_only(true);
    }
    log::debug!("Loaded configuration: {:?}", config);

    let client = GraphClient::new(&config).context("Error creating Graph client")?;
    let cleaner = Cleaner::new(client, config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = cleaner
        .run(Utc::now(), &mut out)
        .await
        .context("Cleanup run aborted")?;

    if summary.delete_failures > 0 {
        log::warn!(
            "{} application(s) could not be deleted, see errors above",
            summary.delete_failures
        );
    }

    Ok(())
}
