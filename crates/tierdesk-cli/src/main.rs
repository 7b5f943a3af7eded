// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result};
use config::{BackendTarget, Config, SheetSettings};
use runtime::{BackendHandle, DemoSheet, TierRuntime};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tierdesk_app::AppState;
use tierdesk_db::{RestBackend, SessionStore, Store};
use tierdesk_sheets::{RowMirror, SPREADSHEETS_SCOPE, ServiceAccount, SheetsClient, TokenSource};
use tracing::info;

const DEMO_REGION_ROWS: usize = 500;
const DEMO_CRM_ROWS: usize = 120;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tierdesk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let target = if options.demo {
        BackendTarget::Local(PathBuf::from(":memory:"))
    } else {
        config.backend_target()?
    };
    if options.print_db_path {
        match &target {
            BackendTarget::Local(path) => println!("{}", path.display()),
            BackendTarget::Remote { url, .. } => println!("{url}"),
        }
        return Ok(());
    }

    let _log_guard = logging::init(&logging::log_dir()?)?;
    info!(config = %options.config_path.display(), demo = options.demo, "starting");

    let (backend, mirror, passphrase) = if options.demo {
        let (store, sheet) = demo_backend()?;
        (BackendHandle::Local(store), Some(sheet), None)
    } else {
        let backend = open_backend(&target)?;
        let mirror = match config.sheets()? {
            Some(settings) => Some(open_mirror(&settings).with_context(|| {
                format!(
                    "invalid [sheets] config in {}; fix spreadsheet_id/credentials_path",
                    options.config_path.display()
                )
            })?),
            None => None,
        };
        (
            backend,
            mirror,
            config.passphrase_sha256().map(str::to_owned),
        )
    };
    if options.check_only {
        return Ok(());
    }

    let session = SessionStore::in_dir(&tierdesk_db::data_dir()?);
    let mut runtime = TierRuntime::new(backend, mirror, session, passphrase);
    let mut state = AppState::new(runtime.starts_authenticated(), config.debounce()?);
    tierdesk_tui::run_app(&mut state, &mut runtime)
}

fn open_backend(target: &BackendTarget) -> Result<BackendHandle> {
    match target {
        BackendTarget::Local(path) => {
            let store = Store::open(path).with_context(|| {
                format!(
                    "open database {} -- if this path is wrong, set [backend].db_path or TIERDESK_DB_PATH",
                    path.display()
                )
            })?;
            store.bootstrap()?;
            info!(path = %path.display(), "opened local database");
            Ok(BackendHandle::Local(store))
        }
        BackendTarget::Remote {
            url,
            api_key,
            timeout,
        } => {
            let rest = RestBackend::new(url, api_key, *timeout)?;
            info!(url = %url, "using hosted backend");
            Ok(BackendHandle::Remote(rest))
        }
    }
}

fn open_mirror(settings: &SheetSettings) -> Result<Arc<dyn RowMirror>> {
    let account = ServiceAccount::from_file(&settings.credentials_path)?;
    let tokens = TokenSource::new(account, SPREADSHEETS_SCOPE, settings.timeout)?;
    let client = SheetsClient::new(
        &settings.api_url,
        &settings.spreadsheet_id,
        settings.sheet_name.as_deref(),
        tokens,
        settings.timeout,
    )?;
    info!(spreadsheet = %settings.spreadsheet_id, "sheet mirror enabled");
    Ok(Arc::new(client))
}

/// An in-memory database and sheet that start with the same CRM rows.
fn demo_backend() -> Result<(Store, Arc<dyn RowMirror>)> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let crm = store.seed_demo_data(DEMO_REGION_ROWS, DEMO_CRM_ROWS)?;
    let sheet: Arc<dyn RowMirror> = Arc::new(DemoSheet::new(crm));
    Ok((store, sheet))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("tierdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path or backend URL");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with seeded demo data (in-memory)");
    println!("  --check                  Validate config, backend, and sheet settings");
    println!("  --help                   Show this help");
}
