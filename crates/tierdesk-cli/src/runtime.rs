// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use tierdesk_app::{CrmValues, FetchRequest, FetchResult, RowUpdate, ScreenKind};
use tierdesk_db::{Backend, RestBackend, SessionStore, Store};
use tierdesk_sheets::{RowMirror, row_index_for};
use tierdesk_tui::InternalEvent;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// The local store runs on the UI thread; the hosted backend runs on workers.
pub enum BackendHandle {
    Local(Store),
    Remote(RestBackend),
}

impl BackendHandle {
    fn as_backend(&self) -> &dyn Backend {
        match self {
            Self::Local(store) => store as &dyn Backend,
            Self::Remote(rest) => rest as &dyn Backend,
        }
    }
}

pub struct TierRuntime {
    backend: BackendHandle,
    mirror: Option<Arc<dyn RowMirror>>,
    session: SessionStore,
    passphrase_sha256: Option<String>,
}

impl TierRuntime {
    pub fn new(
        backend: BackendHandle,
        mirror: Option<Arc<dyn RowMirror>>,
        session: SessionStore,
        passphrase_sha256: Option<String>,
    ) -> Self {
        Self {
            backend,
            mirror,
            session,
            passphrase_sha256,
        }
    }

    /// Without a configured passphrase there is nothing to sign in to.
    pub fn starts_authenticated(&self) -> bool {
        self.passphrase_sha256.is_none() || self.session.is_authenticated()
    }

    fn remote(&self) -> Option<RestBackend> {
        match &self.backend {
            BackendHandle::Local(_) => None,
            BackendHandle::Remote(rest) => Some(rest.clone()),
        }
    }
}

fn run_fetch(backend: &dyn Backend, request: &FetchRequest) -> Result<FetchResult> {
    match tierdesk_db::fetch_page(backend, request) {
        Ok(result) => {
            debug!(
                screen = request.screen.noun(),
                seq = request.seq,
                offset = request.range.offset,
                total = result.total_rows,
                "page loaded"
            );
            Ok(result)
        }
        Err(error) => {
            warn!(
                screen = request.screen.noun(),
                seq = request.seq,
                error = %format!("{error:#}"),
                "page load failed"
            );
            Err(error)
        }
    }
}

/// Writes the backend first; a CRM edit is then mirrored to the sheet row
/// with the same position.
fn save_update(
    backend: &dyn Backend,
    mirror: Option<&dyn RowMirror>,
    screen: ScreenKind,
    update: &RowUpdate,
) -> Result<()> {
    match (screen, update) {
        (ScreenKind::Region, RowUpdate::Region { id, tier }) => {
            backend.update_region_tier(*id, *tier)?;
            info!(
                row = id.get(),
                tier = tier.map(|tier| tier.as_str()),
                "region tier saved"
            );
        }
        (ScreenKind::Crm, RowUpdate::Crm { id, values }) => {
            let now = OffsetDateTime::now_utc();
            backend.update_crm_row(*id, values, now)?;
            info!(row = id.get(), "CRM row saved");
            if let Some(mirror) = mirror {
                let index = row_index_for(*id)?;
                mirror.write_row(index, values, now).with_context(|| {
                    format!(
                        "backend row {} was already updated, but the sheet write failed",
                        id.get()
                    )
                })?;
                debug!(
                    row = id.get(),
                    sheet_row = tierdesk_sheets::sheet_row_number(index),
                    "CRM row mirrored"
                );
            }
        }
        (screen, _) => bail!("edit does not belong to the {} screen", screen.noun()),
    }
    Ok(())
}

fn sync_crm(backend: &dyn Backend, mirror: Option<&dyn RowMirror>) -> Result<usize> {
    let mirror =
        mirror.ok_or_else(|| anyhow!("sheet sync is not configured; set [sheets] in the config"))?;
    let rows = mirror.read_rows().context("read CRM rows from sheet")?;
    if rows.is_empty() {
        warn!("sheet has no data rows; CRM table will be emptied");
    }
    let replaced = backend
        .replace_crm_rows(&rows)
        .context("replace CRM rows from sheet")?;
    info!(rows = replaced, "synced CRM rows from sheet");
    Ok(replaced)
}

fn worker(name: &str, job: impl FnOnce() + Send + 'static) -> Result<()> {
    thread::Builder::new()
        .name(format!("tierdesk-{name}"))
        .spawn(job)
        .with_context(|| format!("spawn {name} worker"))?;
    Ok(())
}

impl tierdesk_tui::AppRuntime for TierRuntime {
    fn fetch_page(&mut self, request: &FetchRequest) -> Result<FetchResult> {
        run_fetch(self.backend.as_backend(), request)
    }

    fn save_row(&mut self, screen: ScreenKind, update: &RowUpdate) -> Result<()> {
        save_update(
            self.backend.as_backend(),
            self.mirror.as_deref(),
            screen,
            update,
        )
    }

    fn sync_from_sheet(&mut self) -> Result<usize> {
        sync_crm(self.backend.as_backend(), self.mirror.as_deref())
    }

    fn verify_login(&mut self, passphrase: &str) -> Result<bool> {
        let accepted = match &self.passphrase_sha256 {
            None => true,
            Some(expected) => SessionStore::verify_passphrase(expected, passphrase),
        };
        if accepted {
            self.session.mark_authenticated()?;
        } else {
            warn!("rejected sign-in attempt");
        }
        Ok(accepted)
    }

    fn logout(&mut self) -> Result<()> {
        self.session.clear()
    }

    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let Some(rest) = self.remote() else {
            let result = self
                .fetch_page(&request)
                .map_err(|error| format!("{error:#}"));
            return tx
                .send(InternalEvent::FetchFinished {
                    screen: request.screen,
                    seq: request.seq,
                    result,
                })
                .map_err(|_| anyhow!("fetch event channel closed"));
        };

        worker("fetch", move || {
            let result = run_fetch(&rest, &request).map_err(|error| format!("{error:#}"));
            let _ = tx.send(InternalEvent::FetchFinished {
                screen: request.screen,
                seq: request.seq,
                result,
            });
        })
    }

    fn spawn_save(
        &mut self,
        screen: ScreenKind,
        update: RowUpdate,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let Some(rest) = self.remote() else {
            let result = self
                .save_row(screen, &update)
                .map_err(|error| format!("{error:#}"));
            return tx
                .send(InternalEvent::SaveFinished {
                    screen,
                    row_id: update.row_id(),
                    result,
                })
                .map_err(|_| anyhow!("save event channel closed"));
        };

        let mirror = self.mirror.clone();
        worker("save", move || {
            let result = save_update(&rest, mirror.as_deref(), screen, &update)
                .map_err(|error| format!("{error:#}"));
            let _ = tx.send(InternalEvent::SaveFinished {
                screen,
                row_id: update.row_id(),
                result,
            });
        })
    }

    fn spawn_sync(&mut self, tx: Sender<InternalEvent>) -> Result<()> {
        let Some(rest) = self.remote() else {
            let result = self.sync_from_sheet().map_err(|error| format!("{error:#}"));
            return tx
                .send(InternalEvent::SyncFinished(result))
                .map_err(|_| anyhow!("sync event channel closed"));
        };

        let mirror = self.mirror.clone();
        worker("sync", move || {
            let result =
                sync_crm(&rest, mirror.as_deref()).map_err(|error| format!("{error:#}"));
            let _ = tx.send(InternalEvent::SyncFinished(result));
        })
    }
}

/// An in-memory stand-in for the spreadsheet, used by `--demo`.
#[derive(Debug, Default)]
pub struct DemoSheet {
    rows: Mutex<Vec<CrmValues>>,
}

impl DemoSheet {
    pub fn new(rows: Vec<CrmValues>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<CrmValues>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<CrmValues>>> {
        self.rows
            .lock()
            .map_err(|_| anyhow!("demo sheet lock poisoned"))
    }
}

impl RowMirror for DemoSheet {
    fn read_rows(&self) -> Result<Vec<CrmValues>> {
        self.snapshot()
    }

    fn write_row(&self, index: usize, values: &CrmValues, _updated_at: OffsetDateTime) -> Result<()> {
        let mut rows = self.lock()?;
        let len = rows.len();
        let slot = rows
            .get_mut(index)
            .ok_or_else(|| anyhow!("sheet row {index} is past the last row ({len})"))?;
        *slot = values.clone();
        Ok(())
    }

    fn append_row(&self, values: &CrmValues, _updated_at: OffsetDateTime) -> Result<()> {
        self.lock()?.push(values.clone());
        Ok(())
    }
}
