// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tierdesk_app::{
    AppCommand, AppEvent, AppMode, AppState, CrmMetric, EditBuffer, EditField, FetchRequest,
    FetchResult, FilterField, INDIAN_STATES, PageLink, PageRows, RowUpdate, ScreenKind,
    ScreenState, TIER_EMPTY_SENTINEL, Tier, length_hint,
};
use time::{OffsetDateTime, UtcOffset};

const POLL_INTERVAL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const HALF_PAGE_ROWS: isize = 10;
const FOCUS_MARK: &str = "▸";
const PENDING_MARK: &str = "…";
const TIER_OPTIONS: [&str; 6] = [
    "",
    Tier::One.as_str(),
    Tier::Two.as_str(),
    Tier::Three.as_str(),
    Tier::Four.as_str(),
    TIER_EMPTY_SENTINEL,
];

/// Collaborators the terminal loop talks to.
///
/// The `spawn_*` defaults run the work inline and report through the channel,
/// which is what tests and the local SQLite backend want. Runtimes that talk
/// to the network override them to run on worker threads.
pub trait AppRuntime {
    fn fetch_page(&mut self, request: &FetchRequest) -> Result<FetchResult>;
    fn save_row(&mut self, screen: ScreenKind, update: &RowUpdate) -> Result<()>;
    fn sync_from_sheet(&mut self) -> Result<usize>;
    fn verify_login(&mut self, passphrase: &str) -> Result<bool>;
    fn logout(&mut self) -> Result<()>;

    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self
            .fetch_page(&request)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::FetchFinished {
            screen: request.screen,
            seq: request.seq,
            result,
        })
        .map_err(|_| anyhow!("fetch event channel closed"))?;
        Ok(())
    }

    fn spawn_save(
        &mut self,
        screen: ScreenKind,
        update: RowUpdate,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self
            .save_row(screen, &update)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::SaveFinished {
            screen,
            row_id: update.row_id(),
            result,
        })
        .map_err(|_| anyhow!("save event channel closed"))?;
        Ok(())
    }

    fn spawn_sync(&mut self, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.sync_from_sheet().map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::SyncFinished(result))
            .map_err(|_| anyhow!("sync event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    FetchFinished {
        screen: ScreenKind,
        seq: u64,
        result: Result<FetchResult, String>,
    },
    SaveFinished {
        screen: ScreenKind,
        row_id: i64,
        result: Result<(), String>,
    },
    SyncFinished(Result<usize, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    status_token: u64,
    login_input: String,
    edit_cursor: usize,
    page_prompt: Option<String>,
    help_visible: bool,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    dispatch(
        state,
        runtime,
        &mut view_data,
        &internal_tx,
        AppCommand::Start,
    );

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);
        dispatch(
            state,
            runtime,
            &mut view_data,
            &internal_tx,
            AppCommand::Tick(Instant::now()),
        );

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(POLL_INTERVAL).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if !has_event {
            continue;
        }
        match event::read().context("read event") {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                if handle_key_event(
                    state,
                    runtime,
                    &mut view_data,
                    &internal_tx,
                    key,
                    Instant::now(),
                ) {
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// Feeds a command through the state machine and executes the side effects
/// it asks for until nothing is left to do.
fn dispatch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let mut queue = VecDeque::from([command]);
    while let Some(command) = queue.pop_front() {
        let events = state.dispatch(command);
        queue.extend(apply_events(runtime, view_data, tx, events));
    }
}

fn apply_events<R: AppRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<AppEvent>,
) -> Vec<AppCommand> {
    let mut follow_ups = Vec::new();
    for event in events {
        match event {
            AppEvent::FetchRequested(request) => {
                let (screen, seq) = (request.screen, request.seq);
                if let Err(error) = runtime.spawn_fetch(request, tx.clone()) {
                    follow_ups.push(AppCommand::FetchCompleted {
                        screen,
                        seq,
                        result: Err(format!("{error:#}")),
                    });
                }
            }
            AppEvent::SaveRequested { screen, update } => {
                let row_id = update.row_id();
                if let Err(error) = runtime.spawn_save(screen, update, tx.clone()) {
                    follow_ups.push(AppCommand::SaveCompleted {
                        screen,
                        row_id,
                        result: Err(format!("{error:#}")),
                    });
                }
            }
            AppEvent::SyncRequested => {
                if let Err(error) = runtime.spawn_sync(tx.clone()) {
                    follow_ups.push(AppCommand::SyncCompleted(Err(format!("{error:#}"))));
                }
            }
            AppEvent::LogoutRequested => {
                view_data.login_input.clear();
                view_data.page_prompt = None;
                if let Err(error) = runtime.logout() {
                    follow_ups.push(AppCommand::SetStatus(format!("logout failed: {error:#}")));
                }
            }
            AppEvent::EditStarted { .. } => view_data.edit_cursor = 0,
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(tx, view_data.status_token);
            }
            _ => {}
        }
    }
    follow_ups
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        let command = match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                AppCommand::ClearStatus
            }
            InternalEvent::ClearStatus { .. } => continue,
            InternalEvent::FetchFinished {
                screen,
                seq,
                result,
            } => AppCommand::FetchCompleted {
                screen,
                seq,
                result,
            },
            InternalEvent::SaveFinished {
                screen,
                row_id,
                result,
            } => AppCommand::SaveCompleted {
                screen,
                row_id,
                result,
            },
            InternalEvent::SyncFinished(result) => AppCommand::SyncCompleted(result),
        };
        dispatch(state, runtime, view_data, tx, command);
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c')) {
        return true;
    }

    if view_data.help_visible {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')
        ) {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.page_prompt.is_some() {
        handle_page_prompt_key(state, runtime, view_data, tx, key);
        return false;
    }

    match state.mode {
        AppMode::Login => handle_login_key(state, runtime, view_data, tx, key),
        AppMode::Nav => return handle_nav_key(state, runtime, view_data, tx, key, now),
        AppMode::Filter(field) => handle_filter_key(state, runtime, view_data, tx, field, key, now),
        AppMode::Edit => handle_edit_key(state, runtime, view_data, tx, key),
    }
    false
}

fn handle_login_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Enter => {
            let passphrase = std::mem::take(&mut view_data.login_input);
            let command = if passphrase.is_empty() {
                AppCommand::LoginFailed("enter the passphrase".to_owned())
            } else {
                match runtime.verify_login(&passphrase) {
                    Ok(true) => AppCommand::LoginSucceeded,
                    Ok(false) => AppCommand::LoginFailed("incorrect passphrase".to_owned()),
                    Err(error) => AppCommand::LoginFailed(format!("login failed: {error:#}")),
                }
            };
            dispatch(state, runtime, view_data, tx, command);
        }
        KeyCode::Esc => view_data.login_input.clear(),
        KeyCode::Backspace => {
            view_data.login_input.pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            view_data.login_input.push(ch);
        }
        _ => {}
    }
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) -> bool {
    let command = match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab | KeyCode::BackTab => AppCommand::NextScreen,
        KeyCode::Char('1') => AppCommand::SwitchScreen(ScreenKind::Region),
        KeyCode::Char('2') => AppCommand::SwitchScreen(ScreenKind::Crm),
        KeyCode::Char('j') | KeyCode::Down => AppCommand::MoveRow(1),
        KeyCode::Char('k') | KeyCode::Up => AppCommand::MoveRow(-1),
        KeyCode::PageDown => AppCommand::MoveRow(HALF_PAGE_ROWS),
        KeyCode::PageUp => AppCommand::MoveRow(-HALF_PAGE_ROWS),
        KeyCode::Char('n') | KeyCode::Char(']') | KeyCode::Right => AppCommand::NextPage,
        KeyCode::Char('p') | KeyCode::Char('[') | KeyCode::Left => AppCommand::PrevPage,
        KeyCode::Char('g') | KeyCode::Home => AppCommand::FirstPage,
        KeyCode::Char('G') | KeyCode::End => AppCommand::LastPage,
        KeyCode::Char(':') => {
            view_data.page_prompt = Some(String::new());
            return false;
        }
        KeyCode::Char('f') | KeyCode::Char('/') => AppCommand::FocusFilter(FilterField::GlobalSearch),
        KeyCode::Char('F') => AppCommand::ToggleFilters,
        KeyCode::Char('c') => AppCommand::ClearFilters { now },
        KeyCode::Char('e') | KeyCode::Enter => AppCommand::BeginEdit,
        KeyCode::Char('r') => AppCommand::Refresh,
        KeyCode::Char('S') => AppCommand::RequestSync,
        KeyCode::Char('L') => AppCommand::Logout,
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return false;
        }
        _ => return false,
    };
    dispatch(state, runtime, view_data, tx, command);
    false
}

fn handle_page_prompt_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => view_data.page_prompt = None,
        KeyCode::Backspace => {
            if let Some(buffer) = view_data.page_prompt.as_mut() {
                buffer.pop();
            }
        }
        KeyCode::Char(ch) if ch.is_ascii_digit() => {
            if let Some(buffer) = view_data.page_prompt.as_mut() {
                buffer.push(ch);
            }
        }
        KeyCode::Enter => {
            let raw = view_data.page_prompt.take().unwrap_or_default();
            if raw.is_empty() {
                return;
            }
            let total = state.active().page.total_pages();
            let command = match raw.parse::<usize>() {
                Ok(page) if (1..=total).contains(&page) => AppCommand::GoToPage(page),
                _ => AppCommand::SetStatus(format!("no page {raw} (1-{})", total.max(1))),
            };
            dispatch(state, runtime, view_data, tx, command);
        }
        _ => {}
    }
}

fn handle_filter_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    field: FilterField,
    key: KeyEvent,
    now: Instant,
) {
    let fields = FilterField::for_screen(state.active_screen);
    let position = fields
        .iter()
        .position(|candidate| *candidate == field)
        .unwrap_or(0);
    let current = state.active().filters.raw().get(field).to_owned();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let set = |value: String| AppCommand::SetFilter { field, value, now };

    let command = match key.code {
        KeyCode::Esc | KeyCode::Enter => AppCommand::ExitToNav,
        KeyCode::Tab | KeyCode::Down => AppCommand::FocusFilter(fields[(position + 1) % fields.len()]),
        KeyCode::BackTab | KeyCode::Up => {
            AppCommand::FocusFilter(fields[(position + fields.len() - 1) % fields.len()])
        }
        _ if field.is_dropdown() => match key.code {
            KeyCode::Left => set(cycle_tier_option(&current, -1).to_owned()),
            KeyCode::Right | KeyCode::Char(' ') => set(cycle_tier_option(&current, 1).to_owned()),
            KeyCode::Backspace | KeyCode::Delete => set(String::new()),
            _ => return,
        },
        KeyCode::Right if field == FilterField::State => match complete_state(&current) {
            Some(state_name) => set(state_name.to_owned()),
            None => return,
        },
        KeyCode::Backspace => {
            let mut value = current;
            value.pop();
            set(value)
        }
        KeyCode::Char('u') if ctrl => set(String::new()),
        KeyCode::Char(ch) if !ctrl => {
            let mut value = current;
            value.push(ch);
            set(value)
        }
        _ => return,
    };
    dispatch(state, runtime, view_data, tx, command);
}

fn handle_edit_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let editor = &state.active().editor;
    if editor.is_saving() {
        return;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    let command = match key.code {
        KeyCode::Esc => AppCommand::CancelEdit,
        KeyCode::Enter => AppCommand::SaveEdit,
        _ => match editor.buffer() {
            Some(EditBuffer::Region(_)) => match key.code {
                KeyCode::Left | KeyCode::Char('h') => AppCommand::CycleTier(-1),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => {
                    AppCommand::CycleTier(1)
                }
                KeyCode::Char(digit @ '1'..='4') => AppCommand::SetEditField {
                    field: EditField::Tier,
                    text: format!("Tier {digit}"),
                },
                KeyCode::Backspace | KeyCode::Delete => AppCommand::SetEditField {
                    field: EditField::Tier,
                    text: String::new(),
                },
                _ => return,
            },
            Some(EditBuffer::Crm(buffer)) => {
                let count = EditField::CRM.len();
                let cursor = view_data.edit_cursor.min(count - 1);
                let field = EditField::CRM[cursor];
                match key.code {
                    KeyCode::Tab | KeyCode::Down => {
                        view_data.edit_cursor = (cursor + 1) % count;
                        return;
                    }
                    KeyCode::BackTab | KeyCode::Up => {
                        view_data.edit_cursor = (cursor + count - 1) % count;
                        return;
                    }
                    KeyCode::Backspace => {
                        let mut text = buffer.field(field).to_owned();
                        text.pop();
                        AppCommand::SetEditField { field, text }
                    }
                    KeyCode::Char('u') if ctrl => AppCommand::SetEditField {
                        field,
                        text: String::new(),
                    },
                    KeyCode::Char(ch) if !ctrl => {
                        let mut text = buffer.field(field).to_owned();
                        text.push(ch);
                        AppCommand::SetEditField { field, text }
                    }
                    _ => return,
                }
            }
            None => return,
        },
    };
    dispatch(state, runtime, view_data, tx, command);
}

fn cycle_tier_option(current: &str, delta: isize) -> &'static str {
    let len = TIER_OPTIONS.len() as isize;
    let position = TIER_OPTIONS
        .iter()
        .position(|option| *option == current)
        .unwrap_or(0) as isize;
    TIER_OPTIONS[(position + delta).rem_euclid(len) as usize]
}

/// First state whose name extends the typed prefix, ignoring case.
fn complete_state(prefix: &str) -> Option<&'static str> {
    let needle = prefix.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    INDIAN_STATES.iter().copied().find(|candidate| {
        let lowered = candidate.to_lowercase();
        lowered.starts_with(&needle) && lowered != needle
    })
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    if state.mode == AppMode::Login {
        render_login(frame, state, view_data);
        return;
    }

    let screen = state.active();
    let editing = screen.editor.is_editing();
    let mut constraints = vec![Constraint::Length(3)];
    if screen.filters_visible {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Min(5));
    constraints.push(Constraint::Length(1));
    if editing {
        constraints.push(Constraint::Length(4));
    }
    constraints.push(Constraint::Length(3));
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());
    let mut slot = 0;
    let mut next_area = || {
        let area = layout[slot];
        slot += 1;
        area
    };

    let selected = ScreenKind::ALL
        .iter()
        .position(|kind| *kind == state.active_screen)
        .unwrap_or(0);
    let titles = ScreenKind::ALL
        .iter()
        .map(|kind| tab_title(state.screen(*kind)))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("tierdesk").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, next_area());

    if screen.filters_visible {
        let filters = Paragraph::new(filter_bar_text(screen, state.mode))
            .block(Block::default().title("filters").borders(Borders::ALL));
        frame.render_widget(filters, next_area());
    }

    render_table(frame, next_area(), screen, view_data.edit_cursor);

    let pager = Paragraph::new(pager_text(screen)).style(Style::default().fg(Color::Gray));
    frame.render_widget(pager, next_area());

    if editing {
        let panel = Paragraph::new(edit_panel_text(screen, view_data.edit_cursor))
            .block(Block::default().title("edit").borders(Borders::ALL));
        frame.render_widget(panel, next_area());
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, next_area());

    if let Some(prompt) = &view_data.page_prompt {
        let area = centered_rect(30, 20, frame.area());
        frame.render_widget(Clear, area);
        let body = Paragraph::new(format!("page: {prompt}_"))
            .block(Block::default().title("go to page").borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_login(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let area = centered_rect(50, 30, frame.area());
    let body = Paragraph::new(login_text(state, view_data)).block(
        Block::default()
            .title("tierdesk sign in")
            .borders(Borders::ALL)
            .style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(body, area);
}

fn login_text(state: &AppState, view_data: &ViewData) -> String {
    let masked = "*".repeat(view_data.login_input.chars().count());
    let mut lines = vec![
        format!("passphrase: {masked}_"),
        String::new(),
        "enter sign in | esc clear | ctrl+q quit".to_owned(),
    ];
    if let Some(status) = &state.status_line {
        lines.push(String::new());
        lines.push(status.clone());
    }
    lines.join("\n")
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, screen: &ScreenState, cursor: usize) {
    let headers = table_headers(screen.kind);
    let widths = table_widths(screen.kind);
    let header = Row::new(headers.iter().map(|label| {
        Cell::from(*label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let lines = table_lines(screen, cursor);
    let rows = lines.iter().map(|line| {
        let cells = line
            .cells
            .iter()
            .enumerate()
            .map(|(column, text)| {
                let mut style = Style::default();
                if line.selected {
                    style = style.bg(Color::DarkGray);
                }
                if line.editing {
                    style = style.fg(Color::Yellow);
                }
                if line.focused_column == Some(column) {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(text.clone()).style(style)
            })
            .collect::<Vec<_>>();
        Row::new(cells)
    });

    let title = if screen.loading {
        format!("{} {PENDING_MARK}", screen.kind.label())
    } else {
        screen.kind.label().to_owned()
    };
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    let mut table_state = TableState::default().with_selected(
        (!lines.is_empty()).then_some(screen.selected_row.min(lines.len().saturating_sub(1))),
    );
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn tab_title(screen: &ScreenState) -> String {
    let mut title = screen.kind.label().to_owned();
    if screen.syncing {
        title.push_str(" (syncing)");
    } else if screen.loading {
        title.push(' ');
        title.push_str(PENDING_MARK);
    }
    title
}

fn filter_bar_text(screen: &ScreenState, mode: AppMode) -> String {
    let raw = screen.filters.raw();
    let focused = match mode {
        AppMode::Filter(field) => Some(field),
        _ => None,
    };
    let mut parts = FilterField::for_screen(screen.kind)
        .iter()
        .map(|field| {
            let value = raw.get(*field);
            let shown = match (*field, value) {
                (FilterField::Tier, "") => "any".to_owned(),
                (FilterField::Tier, TIER_EMPTY_SENTINEL) => "(empty)".to_owned(),
                _ => value.to_owned(),
            };
            let mark = if focused == Some(*field) {
                FOCUS_MARK
            } else {
                " "
            };
            format!("{mark}{}: {shown}", field.label())
        })
        .collect::<Vec<String>>();

    if let Some(field) = focused
        && let Some(hint) = length_hint(field, raw.get(field))
    {
        parts.push(format!("({hint})"));
    }
    if screen.filters.is_pending() {
        parts.push(PENDING_MARK.to_owned());
    }
    parts.join("  ")
}

fn table_headers(kind: ScreenKind) -> Vec<&'static str> {
    match kind {
        ScreenKind::Region => vec![
            "S.No.",
            "State Code",
            "District Code",
            "SubDistrict Code",
            "Village Code",
            "Pincode",
            "State",
            "District",
            "SubDistrict",
            "Village",
            "Tier",
            "Price",
        ],
        ScreenKind::Crm => {
            let mut headers = vec!["Serial No.", "State", "District", "Pincode"];
            headers.extend(CrmMetric::ALL.iter().map(|metric| metric.label()));
            headers
        }
    }
}

fn table_widths(kind: ScreenKind) -> Vec<Constraint> {
    match kind {
        ScreenKind::Region => vec![
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(12),
        ],
        ScreenKind::Crm => {
            let mut widths = vec![
                Constraint::Length(6),
                Constraint::Min(10),
                Constraint::Min(10),
                Constraint::Length(7),
            ];
            widths.extend(std::iter::repeat_n(Constraint::Min(9), CrmMetric::ALL.len()));
            widths
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TableLine {
    cells: Vec<String>,
    selected: bool,
    editing: bool,
    focused_column: Option<usize>,
}

/// Display text for the visible page, with edit buffer values swapped in
/// for the row being edited.
fn table_lines(screen: &ScreenState, cursor: usize) -> Vec<TableLine> {
    let editing_row = screen.editor.editing_row();
    let buffer = screen.editor.buffer();
    match &screen.rows {
        PageRows::Region(rows) => rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let editing = editing_row == Some(row.id.get());
                let tier = match (editing, buffer) {
                    (true, Some(EditBuffer::Region(edit))) => edit.tier,
                    _ => row.tier,
                };
                TableLine {
                    cells: vec![
                        row.id.get().to_string(),
                        optional_number(row.state_code),
                        optional_number(row.district_code),
                        optional_number(row.sub_district_code),
                        optional_number(row.village_code),
                        optional_number(row.pincode),
                        row.state_name.clone(),
                        row.district_name.clone(),
                        row.sub_district_name.clone(),
                        row.village_name.clone(),
                        tier.map(Tier::as_str).unwrap_or_default().to_owned(),
                        row.price.map(format_money).unwrap_or_default(),
                    ],
                    selected: index == screen.selected_row,
                    editing,
                    focused_column: editing.then_some(10),
                }
            })
            .collect(),
        PageRows::Crm(rows) => rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let editing = editing_row == Some(row.id.get());
                let mut cells = vec![screen.page.serial_number(index).to_string()];
                match (editing, buffer) {
                    (true, Some(EditBuffer::Crm(edit))) => {
                        cells.extend(EditField::CRM.iter().map(|field| edit.field(*field).to_owned()));
                    }
                    _ => {
                        cells.push(row.values.state.clone());
                        cells.push(row.values.district.clone());
                        cells.push(row.values.pincode.clone());
                        cells.extend(row.values.metrics.iter().map(|value| format_money(*value)));
                    }
                }
                let cursor = cursor.min(EditField::CRM.len() - 1);
                TableLine {
                    cells,
                    selected: index == screen.selected_row,
                    editing,
                    focused_column: editing.then_some(cursor + 1),
                }
            })
            .collect(),
    }
}

fn pager_text(screen: &ScreenState) -> String {
    let page = &screen.page;
    let mut text = page.summary();
    if !screen.filters.applied().is_empty() {
        text.push_str(" (filtered)");
    }
    let links = page
        .window()
        .into_iter()
        .map(|link| match link {
            PageLink::Page(number) if number == page.current_page() => format!("[{number}]"),
            PageLink::Page(number) => number.to_string(),
            PageLink::Ellipsis => "…".to_owned(),
        })
        .collect::<Vec<String>>();
    if !links.is_empty() {
        text.push_str("   « ");
        text.push_str(&links.join(" "));
        text.push_str(" »");
    }
    text
}

fn edit_panel_text(screen: &ScreenState, cursor: usize) -> String {
    let Some(row_id) = screen.editor.editing_row() else {
        return String::new();
    };
    let mut first = match screen.editor.buffer() {
        Some(EditBuffer::Region(edit)) => format!(
            "row {row_id} | Tier: {} | ←/→ cycle, 1-4 set, backspace clear",
            edit.tier.map(Tier::as_str).unwrap_or("(empty)")
        ),
        Some(EditBuffer::Crm(_)) => {
            let field = EditField::CRM[cursor.min(EditField::CRM.len() - 1)];
            let updated = match &screen.rows {
                PageRows::Crm(rows) => rows
                    .iter()
                    .find(|row| row.id.get() == row_id)
                    .and_then(|row| row.last_updated),
                PageRows::Region(_) => None,
            };
            format!(
                "row {row_id} | editing {} | last updated {} | tab/shift+tab move",
                field.label(),
                format_timestamp(updated)
            )
        }
        None => format!("row {row_id}"),
    };
    if screen.editor.is_saving() {
        first.push_str(" | saving…");
    }
    match screen.editor.error() {
        Some(error) => format!("{first}\nerror: {error}"),
        None => format!("{first}\nenter save | esc cancel"),
    }
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }
    let hints = match state.mode {
        AppMode::Login => "enter sign in | ctrl+q quit",
        AppMode::Nav => "1/2 tab j/k n/p g/G : | f filter F panel c clear | e edit r S sync | L ? q",
        AppMode::Filter(_) => "type to filter | tab next | esc done",
        AppMode::Edit => "enter save | esc cancel",
    };
    let mode = mode_label(state.mode);
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn mode_label(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Login => "LOGIN",
        AppMode::Nav => "NAV",
        AppMode::Filter(_) => "FILTER",
        AppMode::Edit => "EDIT",
    }
}

fn help_overlay_text() -> &'static str {
    "Global\n\
     ctrl+q, ctrl+c  quit\n\
     ?               toggle help\n\
     \n\
     Navigation\n\
     1 / 2, tab      switch screen\n\
     j/k, up/down    move row\n\
     pgup/pgdn       move ten rows\n\
     n/p, ]/[        next/previous page\n\
     g / G           first/last page\n\
     :               go to page\n\
     r               refresh\n\
     \n\
     Filters\n\
     f or /          focus search\n\
     F               show/hide filter panel\n\
     c               clear filters\n\
     tab/shift+tab   next/previous field\n\
     right           complete state name, cycle tier\n\
     \n\
     Editing\n\
     e or enter      edit selected row\n\
     enter / esc     save / cancel\n\
     \n\
     Session\n\
     S               sync CRM data from sheet\n\
     L               sign out"
}

fn optional_number(value: Option<i64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn format_money(value: f64) -> String {
    format!("₹{value:.2}")
}

fn format_timestamp(value: Option<OffsetDateTime>) -> String {
    let Some(stamp) = value else {
        return "never".to_owned();
    };
    let stamp = stamp.to_offset(UtcOffset::UTC);
    format!(
        "{}-{:02}-{:02} {:02}:{:02} UTC",
        stamp.year(),
        u8::from(stamp.month()),
        stamp.day(),
        stamp.hour(),
        stamp.minute()
    )
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
