// src/lib.rs

pub mod cli;
pub mod config;
pub mod convoy;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod guards;
pub mod launch;
pub mod logging;
pub mod output;
pub mod routing;
pub mod staging;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{load_or_default, ConfigFile};
use crate::engine::{ConvoyManager, StoreAcquirer, StoreMap};
use crate::errors::ConvoyError;
use crate::exec::CommandDispatcher;
use crate::fs::{FileSystem, RealFileSystem};
use crate::staging::StageInput;
use crate::store::{BackingStore, FileStore, StoreSet};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the file-backed stores behind a routed `StoreSet`
/// - the subprocess dispatcher
/// - the requested subcommand (or the feeder daemon with Ctrl-C handling)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref())?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let dispatcher = Arc::new(CommandDispatcher::new(
        cfg.templates.clone(),
        cfg.dispatch_timeout,
    ));

    let stores = StoreSet::new(open_stores(&cfg, fs.clone()), cfg.routing());
    let routes = stores.routes().clone();
    let cancel = CancellationToken::new();

    match args.command {
        Command::Stage {
            roots,
            launch: launch_now,
            title,
            json,
        } => {
            let input = StageInput::resolve(&stores, &roots).await?;
            let options = cfg.stage_options(title);
            if launch_now {
                let result = launch::stage_and_launch(
                    &stores,
                    &routes,
                    dispatcher.as_ref(),
                    &input,
                    &options,
                    &cancel,
                )
                .await;
                let (staged, launched) = report_rejection(result, json)?;
                if json {
                    println!("{}", output::stage_and_launch_json(&staged, &launched)?);
                } else {
                    print!("{}", output::stage_report(&staged));
                    print!("{}", output::launch_report(&launched));
                }
            } else {
                let staged = report_rejection(staging::stage(&stores, &routes, &input, &options).await, json)?;
                if json {
                    println!("{}", output::to_json(&staged)?);
                } else {
                    print!("{}", output::stage_report(&staged));
                }
            }
        }
        Command::Launch { roots, json } => {
            let input = StageInput::resolve(&stores, &roots).await?;
            let launched = match &input {
                StageInput::Convoy(id) => {
                    launch::launch(&stores, &routes, dispatcher.as_ref(), id, &cancel).await
                }
                _ => launch::stage_and_launch(
                    &stores,
                    &routes,
                    dispatcher.as_ref(),
                    &input,
                    &cfg.stage_options(None),
                    &cancel,
                )
                .await
                .map(|(_, launched)| launched),
            };
            let launched = report_rejection(launched, json)?;
            if json {
                println!("{}", output::to_json(&launched)?);
            } else {
                print!("{}", output::launch_report(&launched));
            }
        }
        Command::Create { title, items } => {
            let created = convoy::create_convoy(&stores, &title, &items).await?;
            print!("{}", output::convoy_created(&created));
        }
        Command::Group { items } => {
            let created = convoy::group_items(&stores, &items).await?;
            print!("{}", output::convoy_created(&created));
        }
        Command::Add { convoy: id, items } => {
            let outcome = convoy::add_items(&stores, &id, &items).await?;
            print!("{}", output::add_outcome(&outcome));
        }
        Command::Check { convoy: id } => {
            let outcomes = match id {
                Some(id) => vec![convoy::check_convoy(&stores, &id).await?],
                None => convoy::check_all(&stores).await?,
            };
            print!("{}", output::check_outcomes(&outcomes));
        }
        Command::Close { convoy: id, reason } => {
            let previous = convoy::close_convoy(&stores, &id, reason.as_deref()).await?;
            println!("Closed {id} (was {previous})");
        }
        Command::List { all, json } => {
            let convoys = convoy::list_convoys(&stores, all).await?;
            if json {
                println!("{}", output::to_json(&convoys)?);
            } else {
                print!("{}", output::convoy_list(&convoys));
            }
        }
        Command::Status { convoy: id, json } => {
            let detail = convoy::convoy_detail(&stores, &id).await?;
            if json {
                println!("{}", output::to_json(&detail)?);
            } else {
                print!("{}", output::convoy_detail(&detail));
            }
        }
        Command::Stranded { json } => {
            let stranded = convoy::find_stranded(&stores, cfg.manager.store_timeout).await?;
            if json {
                println!("{}", output::to_json(&stranded)?);
            } else {
                print!("{}", output::stranded(&stranded));
            }
        }
        Command::Daemon => run_daemon(&cfg, fs, dispatcher).await?,
    }

    Ok(())
}

/// In JSON mode a rejected staging run still prints its findings on stdout.
fn report_rejection<T>(result: errors::Result<T>, json: bool) -> Result<T> {
    match result {
        Err(ConvoyError::StagingRejected { errors }) => {
            if json {
                println!("{}", output::rejection_json(&errors)?);
            }
            Err(ConvoyError::StagingRejected { errors }.into())
        }
        other => Ok(other?),
    }
}

fn open_stores(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> StoreMap {
    cfg.stores
        .iter()
        .map(|(name, section)| {
            let store: Arc<dyn BackingStore> = Arc::new(FileStore::open(
                section.path.clone(),
                section.prefix.clone(),
                fs.clone(),
            ));
            (name.clone(), store)
        })
        .collect()
}

/// Stores whose files exist right now. Missing ones are retried next tick.
fn lazy_acquirer(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> StoreAcquirer {
    let sections = cfg.stores.clone();
    Arc::new(move || {
        let mut acquired = StoreMap::new();
        for (name, section) in &sections {
            match FileStore::open_existing(section.path.clone(), section.prefix.clone(), fs.clone()) {
                Ok(store) => {
                    acquired.insert(name.clone(), Arc::new(store) as Arc<dyn BackingStore>);
                }
                Err(e) => debug!(store = %name, error = %e, "store not available yet"),
            }
        }
        Ok(acquired)
    })
}

async fn run_daemon(cfg: &ConfigFile, fs: Arc<dyn FileSystem>, dispatcher: Arc<CommandDispatcher>) -> Result<()> {
    let manager = ConvoyManager::new(
        lazy_acquirer(cfg, fs),
        cfg.routing(),
        dispatcher,
        cfg.manager,
    );
    manager.start();
    info!("convoy daemon running; Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; stopping");
    }
    manager.stop().await;
    Ok(())
}
