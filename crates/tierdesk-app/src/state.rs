// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::{
    DEBOUNCE_DELAY, EditField, FilterField, FilterState, PageRange, PageRows, PageState, Query,
    RowEditor, RowUpdate, ScreenKind, build_query,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Login,
    Nav,
    Filter(FilterField),
    Edit,
}

/// One count-then-page round trip for a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub screen: ScreenKind,
    pub seq: u64,
    pub query: Query,
    pub range: PageRange,
    pub initial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub total_rows: usize,
    pub rows: PageRows,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenState {
    pub kind: ScreenKind,
    pub filters: FilterState,
    pub page: PageState,
    pub editor: RowEditor,
    pub rows: PageRows,
    pub selected_row: usize,
    pub filters_visible: bool,
    pub loading: bool,
    pub loaded_once: bool,
    pub syncing: bool,
    latest_seq: u64,
}

impl ScreenState {
    pub fn new(kind: ScreenKind, debounce: Duration) -> Self {
        Self {
            kind,
            filters: FilterState::with_delay(debounce),
            page: PageState::default(),
            editor: RowEditor::default(),
            rows: PageRows::empty(kind),
            selected_row: 0,
            filters_visible: false,
            loading: false,
            loaded_once: false,
            syncing: false,
            latest_seq: 0,
        }
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn selected_row_id(&self) -> Option<i64> {
        self.rows.row_id(self.selected_row)
    }

    fn request_fetch(&mut self) -> AppEvent {
        self.latest_seq += 1;
        self.loading = true;
        AppEvent::FetchRequested(FetchRequest {
            screen: self.kind,
            seq: self.latest_seq,
            query: build_query(self.kind.schema(), self.filters.applied()),
            range: self.page.row_range(),
            initial: !self.loaded_once,
        })
    }

    fn clamp_selection(&mut self) {
        self.selected_row = self.selected_row.min(self.rows.len().saturating_sub(1));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_screen: ScreenKind,
    pub region: ScreenState,
    pub crm: ScreenState,
    pub authenticated: bool,
    pub status_line: Option<String>,
    debounce: Duration,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(true, DEBOUNCE_DELAY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Start,
    LoginSucceeded,
    LoginFailed(String),
    Logout,
    SwitchScreen(ScreenKind),
    NextScreen,
    ToggleFilters,
    FocusFilter(FilterField),
    ExitToNav,
    SetFilter {
        field: FilterField,
        value: String,
        now: Instant,
    },
    ClearFilters {
        now: Instant,
    },
    Tick(Instant),
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    GoToPage(usize),
    Refresh,
    MoveRow(isize),
    BeginEdit,
    SetEditField {
        field: EditField,
        text: String,
    },
    CycleTier(isize),
    SaveEdit,
    CancelEdit,
    SaveCompleted {
        screen: ScreenKind,
        row_id: i64,
        result: Result<(), String>,
    },
    FetchCompleted {
        screen: ScreenKind,
        seq: u64,
        result: Result<FetchResult, String>,
    },
    RequestSync,
    SyncCompleted(Result<usize, String>),
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    ScreenChanged(ScreenKind),
    FiltersVisibilityChanged(bool),
    FetchRequested(FetchRequest),
    StaleFetchDropped { screen: ScreenKind, seq: u64 },
    RowsLoaded { screen: ScreenKind, total_rows: usize },
    PageChanged { screen: ScreenKind, page: usize },
    EditStarted { screen: ScreenKind, row_id: i64 },
    EditCancelled { screen: ScreenKind, row_id: i64 },
    SaveRequested { screen: ScreenKind, update: RowUpdate },
    SyncRequested,
    LogoutRequested,
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn new(authenticated: bool, debounce: Duration) -> Self {
        Self {
            mode: if authenticated {
                AppMode::Nav
            } else {
                AppMode::Login
            },
            active_screen: ScreenKind::Region,
            region: ScreenState::new(ScreenKind::Region, debounce),
            crm: ScreenState::new(ScreenKind::Crm, debounce),
            authenticated,
            status_line: None,
            debounce,
        }
    }

    pub fn screen(&self, kind: ScreenKind) -> &ScreenState {
        match kind {
            ScreenKind::Region => &self.region,
            ScreenKind::Crm => &self.crm,
        }
    }

    pub fn screen_mut(&mut self, kind: ScreenKind) -> &mut ScreenState {
        match kind {
            ScreenKind::Region => &mut self.region,
            ScreenKind::Crm => &mut self.crm,
        }
    }

    pub fn active(&self) -> &ScreenState {
        self.screen(self.active_screen)
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::Start => {
                if !self.authenticated {
                    return vec![AppEvent::ModeChanged(self.mode)];
                }
                self.load_if_needed(self.active_screen)
            }
            AppCommand::LoginSucceeded => {
                self.authenticated = true;
                self.mode = AppMode::Nav;
                let mut events = vec![
                    AppEvent::ModeChanged(self.mode),
                    self.set_status("signed in"),
                ];
                events.extend(self.load_if_needed(self.active_screen));
                events
            }
            AppCommand::LoginFailed(message) => vec![self.set_status(&message)],
            AppCommand::Logout => self.logout(),
            AppCommand::SwitchScreen(kind) => self.switch_screen(kind),
            AppCommand::NextScreen => {
                let screens = ScreenKind::ALL;
                let current = screens
                    .iter()
                    .position(|screen| *screen == self.active_screen)
                    .unwrap_or(0);
                self.switch_screen(screens[(current + 1) % screens.len()])
            }
            AppCommand::ToggleFilters => {
                let screen = self.screen_mut(self.active_screen);
                screen.filters_visible = !screen.filters_visible;
                let visible = screen.filters_visible;
                let mut events = vec![AppEvent::FiltersVisibilityChanged(visible)];
                if !visible && matches!(self.mode, AppMode::Filter(_)) {
                    self.mode = AppMode::Nav;
                    events.push(AppEvent::ModeChanged(self.mode));
                }
                events
            }
            AppCommand::FocusFilter(field) => {
                if !FilterField::for_screen(self.active_screen).contains(&field) {
                    return Vec::new();
                }
                self.screen_mut(self.active_screen).filters_visible = true;
                self.mode = AppMode::Filter(field);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::SetFilter { field, value, now } => {
                let kind = self.active_screen;
                if !FilterField::for_screen(kind).contains(&field) {
                    return Vec::new();
                }
                if self.screen_mut(kind).filters.update(field, &value, now) {
                    return self.filters_applied(kind);
                }
                Vec::new()
            }
            AppCommand::ClearFilters { now } => {
                self.screen_mut(self.active_screen).filters.clear(now);
                vec![self.set_status("filters cleared")]
            }
            AppCommand::Tick(now) => {
                // A screen left mid-debounce still applies its pending filters.
                let mut events = Vec::new();
                for kind in ScreenKind::ALL {
                    if self.screen_mut(kind).filters.poll(now) {
                        events.extend(self.filters_applied(kind));
                    }
                }
                events
            }
            AppCommand::NextPage => self.change_page(PageState::next),
            AppCommand::PrevPage => self.change_page(PageState::prev),
            AppCommand::FirstPage => self.change_page(|page| page.go_to(1)),
            AppCommand::LastPage => self.change_page(PageState::last),
            AppCommand::GoToPage(target) => self.change_page(|page| page.go_to(target)),
            AppCommand::Refresh => vec![self.screen_mut(self.active_screen).request_fetch()],
            AppCommand::MoveRow(delta) => {
                let screen = self.screen_mut(self.active_screen);
                let len = screen.rows.len();
                if len > 0 {
                    let next = (screen.selected_row as isize + delta).clamp(0, len as isize - 1);
                    screen.selected_row = next as usize;
                }
                Vec::new()
            }
            AppCommand::BeginEdit => self.begin_edit(),
            AppCommand::SetEditField { field, text } => {
                self.screen_mut(self.active_screen)
                    .editor
                    .set_field(field, &text);
                Vec::new()
            }
            AppCommand::CycleTier(delta) => {
                self.screen_mut(self.active_screen).editor.cycle_tier(delta);
                Vec::new()
            }
            AppCommand::SaveEdit => {
                let kind = self.active_screen;
                match self.screen_mut(kind).editor.commit() {
                    Some(update) => {
                        let message = format!("saving row {}", update.row_id());
                        vec![
                            AppEvent::SaveRequested {
                                screen: kind,
                                update,
                            },
                            self.set_status(&message),
                        ]
                    }
                    None => Vec::new(),
                }
            }
            AppCommand::CancelEdit => {
                let kind = self.active_screen;
                let mut events = self.cancel_edit(kind);
                if self.mode == AppMode::Edit {
                    self.mode = AppMode::Nav;
                    events.push(AppEvent::ModeChanged(self.mode));
                }
                events
            }
            AppCommand::SaveCompleted {
                screen,
                row_id,
                result,
            } => self.save_completed(screen, row_id, result),
            AppCommand::FetchCompleted {
                screen,
                seq,
                result,
            } => self.fetch_completed(screen, seq, result),
            AppCommand::RequestSync => {
                let kind = self.active_screen;
                if !kind.supports_sync() {
                    return vec![self.set_status("sync is only available for CRM data")];
                }
                if self.crm.syncing {
                    return vec![self.set_status("sync already running")];
                }
                let mut events = self.cancel_edit(kind);
                self.crm.syncing = true;
                events.push(AppEvent::SyncRequested);
                events.push(self.set_status("syncing CRM data from sheet"));
                events
            }
            AppCommand::SyncCompleted(result) => {
                self.crm.syncing = false;
                match result {
                    Ok(count) => {
                        let message = format!("synced {count} rows from sheet");
                        vec![self.set_status(&message), self.crm.request_fetch()]
                    }
                    Err(error) => vec![self.set_status(&format!("sync failed: {error}"))],
                }
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn logout(&mut self) -> Vec<AppEvent> {
        self.authenticated = false;
        self.mode = AppMode::Login;
        self.region = ScreenState::new(ScreenKind::Region, self.debounce);
        self.crm = ScreenState::new(ScreenKind::Crm, self.debounce);
        self.active_screen = ScreenKind::Region;
        vec![
            AppEvent::LogoutRequested,
            AppEvent::ModeChanged(self.mode),
            self.set_status("signed out"),
        ]
    }

    fn switch_screen(&mut self, kind: ScreenKind) -> Vec<AppEvent> {
        if kind == self.active_screen {
            return Vec::new();
        }
        let previous = self.active_screen;
        let mut events = self.cancel_edit(previous);
        self.active_screen = kind;
        if !matches!(self.mode, AppMode::Login | AppMode::Nav) {
            self.mode = AppMode::Nav;
            events.push(AppEvent::ModeChanged(self.mode));
        }
        events.push(AppEvent::ScreenChanged(kind));
        events.extend(self.load_if_needed(kind));
        events
    }

    fn load_if_needed(&mut self, kind: ScreenKind) -> Vec<AppEvent> {
        let screen = self.screen_mut(kind);
        if screen.loaded_once || screen.loading {
            return Vec::new();
        }
        vec![screen.request_fetch()]
    }

    fn filters_applied(&mut self, kind: ScreenKind) -> Vec<AppEvent> {
        let mut events = self.cancel_edit(kind);
        let screen = self.screen_mut(kind);
        screen.page.reset();
        screen.selected_row = 0;
        events.push(screen.request_fetch());
        events
    }

    fn change_page(&mut self, step: impl FnOnce(&mut PageState) -> bool) -> Vec<AppEvent> {
        let kind = self.active_screen;
        if !step(&mut self.screen_mut(kind).page) {
            return Vec::new();
        }
        let mut events = self.cancel_edit(kind);
        let screen = self.screen_mut(kind);
        screen.selected_row = 0;
        events.push(AppEvent::PageChanged {
            screen: kind,
            page: screen.page.current_page(),
        });
        events.push(screen.request_fetch());
        events
    }

    fn cancel_edit(&mut self, kind: ScreenKind) -> Vec<AppEvent> {
        let screen = self.screen_mut(kind);
        let Some(row_id) = screen.editor.editing_row() else {
            return Vec::new();
        };
        screen.editor.cancel();
        let mut events = vec![AppEvent::EditCancelled { screen: kind, row_id }];
        if kind == self.active_screen && self.mode == AppMode::Edit {
            self.mode = AppMode::Nav;
            events.push(AppEvent::ModeChanged(self.mode));
        }
        events
    }

    fn begin_edit(&mut self) -> Vec<AppEvent> {
        let kind = self.active_screen;
        let screen = self.screen_mut(kind);
        let index = screen.selected_row;
        let row_id = match &screen.rows {
            PageRows::Region(rows) => rows.get(index).map(|row| {
                screen.editor.begin_region(row);
                row.id.get()
            }),
            PageRows::Crm(rows) => rows.get(index).map(|row| {
                screen.editor.begin_crm(row);
                row.id.get()
            }),
        };
        let Some(row_id) = row_id else {
            return vec![self.set_status("no row selected")];
        };
        self.mode = AppMode::Edit;
        vec![
            AppEvent::EditStarted {
                screen: kind,
                row_id,
            },
            AppEvent::ModeChanged(self.mode),
        ]
    }

    fn save_completed(
        &mut self,
        kind: ScreenKind,
        row_id: i64,
        result: Result<(), String>,
    ) -> Vec<AppEvent> {
        let still_editing = self.screen(kind).editor.editing_row() == Some(row_id);
        match result {
            Ok(()) => {
                let mut events = Vec::new();
                if still_editing {
                    self.screen_mut(kind).editor.finish();
                    if kind == self.active_screen && self.mode == AppMode::Edit {
                        self.mode = AppMode::Nav;
                        events.push(AppEvent::ModeChanged(self.mode));
                    }
                }
                events.push(self.set_status(&format!("row {row_id} updated")));
                events.push(self.screen_mut(kind).request_fetch());
                events
            }
            Err(error) => {
                if still_editing {
                    self.screen_mut(kind).editor.fail(error.clone());
                }
                vec![self.set_status(&format!("save failed: {error}"))]
            }
        }
    }

    fn fetch_completed(
        &mut self,
        kind: ScreenKind,
        seq: u64,
        result: Result<FetchResult, String>,
    ) -> Vec<AppEvent> {
        let screen = self.screen_mut(kind);
        if seq != screen.latest_seq {
            return vec![AppEvent::StaleFetchDropped { screen: kind, seq }];
        }
        screen.loading = false;
        match result {
            Ok(FetchResult { total_rows, rows }) if rows.screen() == kind => {
                screen.page.set_total(total_rows);
                screen.rows = rows;
                screen.loaded_once = true;
                screen.clamp_selection();
                vec![AppEvent::RowsLoaded {
                    screen: kind,
                    total_rows,
                }]
            }
            Ok(_) => {
                let message = format!("failed to load {}: mismatched rows", kind.noun());
                vec![self.set_status(&message)]
            }
            Err(error) => {
                if !screen.loaded_once {
                    screen.rows = PageRows::empty(kind);
                    screen.page.set_total(0);
                    screen.selected_row = 0;
                }
                let message = format!("failed to load {}: {error}", kind.noun());
                vec![self.set_status(&message)]
            }
        }
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{AppCommand, AppEvent, AppMode, AppState, FetchRequest, FetchResult};
    use crate::{
        CrmRow, CrmRowId, CrmValues, EditField, FilterField, PageRows, Predicate, RegionRow,
        RegionRowId, RowUpdate, ScreenKind, Tier,
    };

    fn region_rows(start: i64, count: i64) -> PageRows {
        PageRows::Region(
            (start..start + count)
                .map(|id| RegionRow {
                    id: RegionRowId::new(id),
                    state_code: Some(29),
                    district_code: Some(572),
                    sub_district_code: Some(5_500),
                    village_code: Some(600_000 + id),
                    pincode: Some(560_000 + id),
                    state_name: "Karnataka".to_owned(),
                    district_name: "Bengaluru Urban".to_owned(),
                    sub_district_name: "Anekal".to_owned(),
                    village_name: format!("Village {id}"),
                    tier: None,
                    price: Some(1_000.0),
                })
                .collect(),
        )
    }

    fn crm_rows(ids: &[i64]) -> PageRows {
        PageRows::Crm(
            ids.iter()
                .map(|id| CrmRow {
                    id: CrmRowId::new(*id),
                    values: CrmValues {
                        state: "Kerala".to_owned(),
                        district: "Ernakulam".to_owned(),
                        pincode: "682001".to_owned(),
                        metrics: [1.0; 10],
                    },
                    last_updated: None,
                })
                .collect(),
        )
    }

    fn fetch_requests(events: &[AppEvent]) -> Vec<FetchRequest> {
        events
            .iter()
            .filter_map(|event| match event {
                AppEvent::FetchRequested(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn complete(state: &mut AppState, request: &FetchRequest, total: usize, rows: PageRows) {
        state.dispatch(AppCommand::FetchCompleted {
            screen: request.screen,
            seq: request.seq,
            result: Ok(FetchResult {
                total_rows: total,
                rows,
            }),
        });
    }

    fn loaded_region(total: usize) -> AppState {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::Start);
        let request = fetch_requests(&events).remove(0);
        complete(&mut state, &request, total, region_rows(1, 50.min(total as i64)));
        state
    }

    #[test]
    fn start_requests_initial_region_fetch() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::Start);
        let requests = fetch_requests(&events);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].screen, ScreenKind::Region);
        assert_eq!(requests[0].seq, 1);
        assert!(requests[0].initial);
        assert!(requests[0].query.is_unfiltered());
        assert_eq!(requests[0].range.offset, 0);
        assert!(state.region.loading);
    }

    #[test]
    fn start_without_session_stays_on_login() {
        let mut state = AppState::new(false, Duration::from_millis(500));
        let events = state.dispatch(AppCommand::Start);
        assert_eq!(state.mode, AppMode::Login);
        assert!(fetch_requests(&events).is_empty());

        let events = state.dispatch(AppCommand::LoginSucceeded);
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(fetch_requests(&events).len(), 1);
    }

    #[test]
    fn stale_fetch_results_are_dropped() {
        let mut state = AppState::default();
        let first = fetch_requests(&state.dispatch(AppCommand::Start)).remove(0);
        let second = fetch_requests(&state.dispatch(AppCommand::Refresh)).remove(0);
        assert!(second.seq > first.seq);

        complete(&mut state, &second, 3, region_rows(1, 3));
        let events = state.dispatch(AppCommand::FetchCompleted {
            screen: ScreenKind::Region,
            seq: first.seq,
            result: Ok(FetchResult {
                total_rows: 99,
                rows: region_rows(1, 50),
            }),
        });
        assert_eq!(
            events,
            vec![AppEvent::StaleFetchDropped {
                screen: ScreenKind::Region,
                seq: first.seq,
            }]
        );
        assert_eq!(state.region.page.total_rows(), 3);
        assert_eq!(state.region.rows.len(), 3);
    }

    #[test]
    fn initial_failure_empties_table_later_failure_keeps_rows() {
        let mut state = AppState::default();
        let request = fetch_requests(&state.dispatch(AppCommand::Start)).remove(0);
        state.dispatch(AppCommand::FetchCompleted {
            screen: ScreenKind::Region,
            seq: request.seq,
            result: Err("connection refused".to_owned()),
        });
        assert!(state.region.rows.is_empty());
        assert!(
            state
                .status_line
                .as_deref()
                .is_some_and(|line| line.contains("connection refused"))
        );

        let mut state = loaded_region(10);
        let request = fetch_requests(&state.dispatch(AppCommand::Refresh)).remove(0);
        assert!(!request.initial);
        state.dispatch(AppCommand::FetchCompleted {
            screen: ScreenKind::Region,
            seq: request.seq,
            result: Err("timeout".to_owned()),
        });
        assert_eq!(state.region.rows.len(), 10);
        assert!(!state.region.loading);
    }

    #[test]
    fn tier_filter_applies_immediately_and_resets_page() {
        let mut state = loaded_region(500);
        state.dispatch(AppCommand::NextPage);
        assert_eq!(state.region.page.current_page(), 2);

        let events = state.dispatch(AppCommand::SetFilter {
            field: FilterField::Tier,
            value: "empty".to_owned(),
            now: Instant::now(),
        });
        let request = fetch_requests(&events).remove(0);
        assert_eq!(state.region.page.current_page(), 1);
        assert_eq!(request.range.offset, 0);
        assert_eq!(
            request.query.predicates,
            vec![Predicate::IsNull { column: "Tier" }]
        );
    }

    #[test]
    fn text_filter_waits_for_tick() {
        let mut state = loaded_region(20);
        let start = Instant::now();
        let events = state.dispatch(AppCommand::SetFilter {
            field: FilterField::District,
            value: "Mys".to_owned(),
            now: start,
        });
        assert!(fetch_requests(&events).is_empty());
        assert!(
            fetch_requests(&state.dispatch(AppCommand::Tick(start + Duration::from_millis(10))))
                .is_empty()
        );
        let events = state.dispatch(AppCommand::Tick(start + Duration::from_millis(500)));
        assert_eq!(fetch_requests(&events).len(), 1);
    }

    #[test]
    fn crm_screen_ignores_tier_filter() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::SwitchScreen(ScreenKind::Crm));
        let events = state.dispatch(AppCommand::SetFilter {
            field: FilterField::Tier,
            value: "Tier 1".to_owned(),
            now: Instant::now(),
        });
        assert!(events.is_empty());
    }

    #[test]
    fn page_change_cancels_edit() {
        let mut state = loaded_region(120);
        state.dispatch(AppCommand::BeginEdit);
        assert_eq!(state.mode, AppMode::Edit);

        let events = state.dispatch(AppCommand::NextPage);
        assert!(events.contains(&AppEvent::EditCancelled {
            screen: ScreenKind::Region,
            row_id: 1,
        }));
        assert!(!state.region.editor.is_editing());
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(fetch_requests(&events)[0].range.offset, 50);
    }

    #[test]
    fn tier_filter_change_cancels_edit() {
        let mut state = loaded_region(120);
        state.dispatch(AppCommand::MoveRow(3));
        state.dispatch(AppCommand::BeginEdit);
        assert_eq!(state.mode, AppMode::Edit);

        let events = state.dispatch(AppCommand::SetFilter {
            field: FilterField::Tier,
            value: "Tier 3".to_owned(),
            now: Instant::now(),
        });
        assert!(events.contains(&AppEvent::EditCancelled {
            screen: ScreenKind::Region,
            row_id: 4,
        }));
        assert!(!state.region.editor.is_editing());
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(fetch_requests(&events).len(), 1);
    }

    #[test]
    fn debounced_text_filter_cancels_edit_begun_before_it_fires() {
        let mut state = loaded_region(120);
        let start = Instant::now();
        state.dispatch(AppCommand::SetFilter {
            field: FilterField::State,
            value: "Karna".to_owned(),
            now: start,
        });
        state.dispatch(AppCommand::BeginEdit);
        assert!(state.region.editor.is_editing());

        let events = state.dispatch(AppCommand::Tick(start + Duration::from_millis(500)));
        assert!(events.contains(&AppEvent::EditCancelled {
            screen: ScreenKind::Region,
            row_id: 1,
        }));
        assert!(!state.region.editor.is_editing());
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(fetch_requests(&events).len(), 1);
    }

    #[test]
    fn pending_filter_survives_screen_switch() {
        let mut state = loaded_region(20);
        let start = Instant::now();
        state.dispatch(AppCommand::SetFilter {
            field: FilterField::District,
            value: "Pune".to_owned(),
            now: start,
        });
        let crm = fetch_requests(&state.dispatch(AppCommand::SwitchScreen(ScreenKind::Crm)))
            .remove(0);
        complete(&mut state, &crm, 1, crm_rows(&[1]));
        state.dispatch(AppCommand::SwitchScreen(ScreenKind::Region));
        assert!(state.region.filters.is_pending());

        let events = state.dispatch(AppCommand::Tick(start + Duration::from_secs(5)));
        assert_eq!(
            state.region.filters.applied().get(FilterField::District),
            Some("Pune")
        );
        assert!(!state.region.filters.is_pending());
        let requests = fetch_requests(&events);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].screen, ScreenKind::Region);
    }

    #[test]
    fn pending_filter_applies_while_screen_is_in_background() {
        let mut state = loaded_region(20);
        let start = Instant::now();
        state.dispatch(AppCommand::SetFilter {
            field: FilterField::District,
            value: "Pune".to_owned(),
            now: start,
        });
        state.dispatch(AppCommand::SwitchScreen(ScreenKind::Crm));

        let events = state.dispatch(AppCommand::Tick(start + Duration::from_millis(600)));
        assert_eq!(
            state.region.filters.applied().get(FilterField::District),
            Some("Pune")
        );
        assert_eq!(state.active_screen, ScreenKind::Crm);
        assert!(
            fetch_requests(&events)
                .iter()
                .any(|request| request.screen == ScreenKind::Region)
        );
    }

    #[test]
    fn out_of_range_page_is_noop_and_keeps_edit() {
        let mut state = loaded_region(40);
        state.dispatch(AppCommand::BeginEdit);
        assert!(state.dispatch(AppCommand::NextPage).is_empty());
        assert!(state.dispatch(AppCommand::GoToPage(0)).is_empty());
        assert!(state.region.editor.is_editing());
    }

    #[test]
    fn save_success_returns_to_idle_and_refetches() {
        let mut state = loaded_region(5);
        state.dispatch(AppCommand::MoveRow(2));
        state.dispatch(AppCommand::BeginEdit);
        state.dispatch(AppCommand::SetEditField {
            field: EditField::Tier,
            text: "Tier 2".to_owned(),
        });
        let events = state.dispatch(AppCommand::SaveEdit);
        assert!(events.contains(&AppEvent::SaveRequested {
            screen: ScreenKind::Region,
            update: RowUpdate::Region {
                id: RegionRowId::new(3),
                tier: Some(Tier::Two),
            },
        }));

        let events = state.dispatch(AppCommand::SaveCompleted {
            screen: ScreenKind::Region,
            row_id: 3,
            result: Ok(()),
        });
        assert_eq!(fetch_requests(&events).len(), 1);
        assert!(!state.region.editor.is_editing());
        assert_eq!(state.mode, AppMode::Nav);
    }

    #[test]
    fn save_failure_keeps_row_in_edit_with_error() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::SwitchScreen(ScreenKind::Crm));
        let request = state.crm.latest_seq();
        state.dispatch(AppCommand::FetchCompleted {
            screen: ScreenKind::Crm,
            seq: request,
            result: Ok(FetchResult {
                total_rows: 2,
                rows: crm_rows(&[4, 5]),
            }),
        });
        state.dispatch(AppCommand::BeginEdit);
        state.dispatch(AppCommand::SaveEdit);
        let message = "spreadsheet update failed after the backend row was already updated";
        let events = state.dispatch(AppCommand::SaveCompleted {
            screen: ScreenKind::Crm,
            row_id: 4,
            result: Err(message.to_owned()),
        });
        assert!(fetch_requests(&events).is_empty());
        assert_eq!(state.crm.editor.editing_row(), Some(4));
        assert_eq!(state.crm.editor.error(), Some(message));
        assert!(
            state
                .status_line
                .as_deref()
                .is_some_and(|line| line.contains("already updated"))
        );
    }

    #[test]
    fn switching_screens_cancels_edit_and_loads_once() {
        let mut state = loaded_region(5);
        state.dispatch(AppCommand::BeginEdit);
        let events = state.dispatch(AppCommand::NextScreen);
        assert_eq!(state.active_screen, ScreenKind::Crm);
        assert!(!state.region.editor.is_editing());
        let request = fetch_requests(&events).remove(0);
        assert_eq!(request.screen, ScreenKind::Crm);

        complete(&mut state, &request, 1, crm_rows(&[1]));
        state.dispatch(AppCommand::NextScreen);
        let events = state.dispatch(AppCommand::NextScreen);
        assert!(fetch_requests(&events).is_empty());
    }

    #[test]
    fn sync_only_on_crm_and_refetches_after() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::RequestSync);
        assert!(!events.contains(&AppEvent::SyncRequested));

        state.dispatch(AppCommand::SwitchScreen(ScreenKind::Crm));
        let events = state.dispatch(AppCommand::RequestSync);
        assert!(events.contains(&AppEvent::SyncRequested));
        assert!(state.crm.syncing);

        let events = state.dispatch(AppCommand::SyncCompleted(Ok(12)));
        assert!(!state.crm.syncing);
        assert_eq!(state.status_line.as_deref(), Some("synced 12 rows from sheet"));
        assert_eq!(fetch_requests(&events)[0].screen, ScreenKind::Crm);
    }

    #[test]
    fn logout_returns_to_login_and_drops_rows() {
        let mut state = loaded_region(5);
        let events = state.dispatch(AppCommand::Logout);
        assert!(events.contains(&AppEvent::LogoutRequested));
        assert_eq!(state.mode, AppMode::Login);
        assert!(!state.authenticated);
        assert!(state.region.rows.is_empty());
    }

    #[test]
    fn move_row_clamps_to_visible_rows() {
        let mut state = loaded_region(3);
        state.dispatch(AppCommand::MoveRow(10));
        assert_eq!(state.region.selected_row, 2);
        state.dispatch(AppCommand::MoveRow(-10));
        assert_eq!(state.region.selected_row, 0);
        assert_eq!(state.active().selected_row_id(), Some(1));
    }
}
