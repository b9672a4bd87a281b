//! Headless terminal front end for the setup wizard.
//!
//! Acts as a small browser over the router: every screen is a GET of a step
//! route, every confirmation a POST whose redirect decides the next screen.
//!
//! - Centered "installer window" titled "Platform Setup"
//! - Left banner panel, main content panel, bottom button row
//! - Cancel confirmation modal
//!
//! Logging is file-only in this mode so the terminal is not corrupted.

use crate::api::routes::Router;
use crate::api::{Request, Response};
use crate::models::responses::{FormField, Page, StepView};
use crate::models::settings::{FieldMap, ValidationErrors};
use crate::wizard::{resolve_transport_id, Step};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{info, warn};
use ratatui::backend::{Backend, CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

const BANNER: &str = r#"
  ____  _       _    __
 |  _ \| | __ _| |_ / _| ___  _ __ _ __ ___
 | |_) | |/ _` | __| |_ / _ \| '__| '_ ` _ \
 |  __/| | (_| | |_|  _| (_) | |  | | | | | |
 |_|   |_|\__,_|\__|_|  \___/|_|  |_| |_| |_|

            S E T U P
"#;

const STATUS_POLL: Duration = Duration::from_millis(500);
const LOG_TAIL: usize = 14;

#[derive(Debug, Clone)]
struct TextInput {
    value: String,
    /// Byte offset, always on a char boundary
    cursor: usize,
    masked: bool,
}

impl TextInput {
    fn new(value: impl Into<String>, masked: bool) -> Self {
        let v = value.into();
        Self {
            cursor: v.len(),
            value: v,
            masked,
        }
    }

    fn display(&self) -> String {
        if self.masked {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }

    fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.len();
    }

    fn prev_boundary(&self) -> usize {
        self.value[..self.cursor]
            .char_indices()
            .next_back()
            .map_or(0, |(i, _)| i)
    }

    fn next_boundary(&self) -> usize {
        self.value[self.cursor..]
            .chars()
            .next()
            .map_or(self.cursor, |c| self.cursor + c.len_utf8())
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                self.value.insert(self.cursor, c);
                self.cursor += c.len_utf8();
                true
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let idx = self.prev_boundary();
                    self.value.remove(idx);
                    self.cursor = idx;
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.value.len() {
                    self.value.remove(self.cursor);
                }
                true
            }
            KeyCode::Left => {
                self.cursor = self.prev_boundary();
                true
            }
            KeyCode::Right => {
                self.cursor = self.next_boundary();
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.value.len();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    input: TextInput,
    /// Non-empty for fields cycled with Left/Right
    choices: Vec<String>,
}

impl Field {
    fn from_form(field: &FormField) -> Self {
        Self {
            name: field.name.clone(),
            input: TextInput::new(field.value.clone(), field.secret),
            choices: field.choices.clone(),
        }
    }

    fn choice(name: &str, value: &str, choices: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            input: TextInput::new(value, false),
            choices,
        }
    }

    fn cycle(&mut self, forward: bool) {
        if self.choices.is_empty() {
            return;
        }
        let len = self.choices.len();
        let pos = self.choices.iter().position(|c| *c == self.input.value);
        let next = match (pos, forward) {
            (None, _) => 0,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.input.set(self.choices[next].clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Skip,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    Cancel { yes_focused: bool },
    Message { title: String, body: String },
}

enum UiMsg {
    InstallFinished(Response),
}

struct WizardState {
    route: String,
    page: Option<Page>,
    fields: Vec<Field>,
    errors: ValidationErrors,
    global_error: Option<String>,
    focus: FocusTarget,
    modal: Option<Modal>,
    installing: bool,
    install_log: String,
    last_poll: Instant,
    done_url: Option<String>,
    quit: bool,
}

impl WizardState {
    fn new() -> Self {
        Self {
            route: Step::Language.path().to_string(),
            page: None,
            fields: Vec::new(),
            errors: ValidationErrors::new(),
            global_error: None,
            focus: FocusTarget::Button(ButtonFocus::Next),
            modal: None,
            installing: false,
            install_log: String::new(),
            last_poll: Instant::now(),
            done_url: None,
            quit: false,
        }
    }

    fn view(&self) -> Option<&StepView> {
        self.page.as_ref().map(|p| &p.view)
    }

    fn load_page(&mut self, route: &str, page: Page) {
        let (fields, errors, global_error) = fields_for(&page.view);
        // Keep focus on the field being corrected when the same step re-renders.
        let same_step = self.route == route;
        self.route = route.to_string();
        self.focus = match self.focus {
            FocusTarget::Field(i) if same_step && i < fields.len() => FocusTarget::Field(i),
            _ if !fields.is_empty() => FocusTarget::Field(0),
            _ => FocusTarget::Button(ButtonFocus::Next),
        };
        self.fields = fields;
        self.errors = errors;
        self.global_error = global_error;
        self.page = Some(page);
    }

    fn form(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.input.value.clone()))
            .collect()
    }

    fn is_terminal(&self) -> bool {
        self.done_url.is_some() || matches!(self.view(), Some(StepView::Failed(_)))
    }

    fn buttons(&self) -> Vec<ButtonFocus> {
        let mut buttons = Vec::new();
        if can_go_back(self) {
            buttons.push(ButtonFocus::Back);
        }
        if !self.installing {
            buttons.push(ButtonFocus::Next);
        }
        if matches!(self.view(), Some(StepView::Mailing(_))) && !self.installing {
            buttons.push(ButtonFocus::Skip);
        }
        if !self.installing && !self.is_terminal() {
            buttons.push(ButtonFocus::Cancel);
        }
        buttons
    }
}

/// Editable fields, field errors and global error of a view.
fn fields_for(view: &StepView) -> (Vec<Field>, ValidationErrors, Option<String>) {
    match view {
        StepView::Language(p) => (
            vec![
                Field::choice(
                    "install_language",
                    &p.install_language,
                    p.languages.iter().map(|c| c.value.clone()).collect(),
                ),
                Field::choice(
                    "country",
                    &p.country,
                    p.countries.iter().map(|c| c.value.clone()).collect(),
                ),
            ],
            ValidationErrors::new(),
            None,
        ),
        StepView::Database(form) | StepView::Platform(form) | StepView::Admin(form) => (
            form.fields.iter().map(Field::from_form).collect(),
            form.errors.clone(),
            form.global_error.clone(),
        ),
        StepView::Mailing(m) => {
            let current = m
                .transport_labels
                .iter()
                .find(|l| resolve_transport_id(l) == m.transport)
                .cloned()
                .unwrap_or_else(|| m.transport.clone());
            let mut fields = vec![Field::choice(
                "transport",
                &current,
                m.transport_labels.clone(),
            )];
            fields.extend(m.form.fields.iter().map(Field::from_form));
            (fields, m.form.errors.clone(), m.form.global_error.clone())
        }
        _ => (Vec::new(), ValidationErrors::new(), None),
    }
}

fn prev_route(route: &str) -> Option<&'static str> {
    let step = Step::from_path(route)?;
    let pos = Step::ALL.iter().position(|s| *s == step)?;
    pos.checked_sub(1).map(|i| Step::ALL[i].path())
}

fn can_go_back(state: &WizardState) -> bool {
    !state.installing && !state.is_terminal() && prev_route(&state.route).is_some()
}

fn next_label(state: &WizardState) -> &'static str {
    if state.is_terminal() {
        return "Finish";
    }
    match state.view() {
        Some(StepView::Install) => "Install",
        _ => "Next",
    }
}

/// Router access from the UI thread.
struct Client {
    router: Arc<Router>,
    rt: Handle,
    tx: mpsc::Sender<UiMsg>,
}

impl Client {
    fn send(&self, request: Request) -> Response {
        self.rt.block_on(self.router.handle(request))
    }

    fn navigate(&self, state: &mut WizardState, route: &str) {
        let response = self.send(Request::get(self.router.url(route)));
        match response {
            Response::Page(page) => state.load_page(route, page),
            other => self.follow(state, other),
        }
    }

    fn follow(&self, state: &mut WizardState, response: Response) {
        match response {
            Response::Page(page) => {
                let route = state.route.clone();
                state.load_page(&route, page);
            }
            Response::Redirect(url) => {
                let wizard_route = self
                    .router
                    .route_of(&url)
                    .filter(|r| r.starts_with("/error/") || Step::from_path(r).is_some())
                    .map(str::to_string);
                if let Some(route) = wizard_route {
                    self.navigate(state, &route);
                } else {
                    info!(
                        "[PHASE: tui] [STEP: done] Wizard finished, continuing at {}",
                        url
                    );
                    state.page = None;
                    state.fields.clear();
                    state.done_url = Some(url);
                    state.focus = FocusTarget::Button(ButtonFocus::Next);
                }
            }
            Response::Json { status, body } => {
                state.modal = Some(Modal::Message {
                    title: format!("Unexpected response ({})", status),
                    body: body.to_string(),
                });
            }
            Response::NotFound => {
                state.modal = Some(Modal::Message {
                    title: "Not found".to_string(),
                    body: format!("No page at {}", state.route),
                });
            }
        }
    }

    fn submit(&self, state: &mut WizardState) {
        let url = self.router.url(&state.route);
        let response = self.send(Request::post(url, state.form()));
        self.follow(state, response);
    }

    fn skip_mailing(&self, state: &mut WizardState) {
        let response = self.send(Request::post(self.router.url("/mailing/skip"), FieldMap::new()));
        self.follow(state, response);
    }

    /// Run the install on a worker thread; the UI keeps polling the status route.
    fn start_install(&self, state: &mut WizardState) {
        info!("[PHASE: tui] [STEP: install] Starting install worker");
        state.installing = true;
        state.install_log.clear();
        state.focus = FocusTarget::Button(ButtonFocus::Next);

        let router = self.router.clone();
        let rt = self.rt.clone();
        let tx = self.tx.clone();
        let url = router.url(Step::Install.path());
        thread::spawn(move || {
            let response = rt.block_on(router.handle(Request::post(url, FieldMap::new())));
            if tx.send(UiMsg::InstallFinished(response)).is_err() {
                warn!("[PHASE: tui] [STEP: install] UI gone before the install finished");
            }
        });
    }

    fn poll_status(&self, state: &mut WizardState) {
        state.last_poll = Instant::now();
        let response = self.send(Request::get(self.router.url("/install/status")));
        if let Response::Json { status: 200, body } = response {
            if let Some(content) = body.get("content").and_then(|c| c.as_str()) {
                state.install_log = content.to_string();
            }
        }
    }
}

pub fn run(router: Arc<Router>, rt: Handle) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting TUI wizard");

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, router, rt);
    restore_terminal(&mut terminal)?;

    result
}

/// Non-interactive smoke mode: render a single frame of `route` and exit.
pub fn smoke(router: Arc<Router>, rt: Handle, route: &str) -> Result<()> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke route={}",
        route
    );

    let route = normalize_route(route);
    let (tx, _rx) = mpsc::channel::<UiMsg>();
    let client = Client { router, rt, tx };
    let mut state = WizardState::new();
    client.navigate(&mut state, &route);

    // In-memory backend: no raw mode, no alternate screen.
    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state))?;

    Ok(())
}

fn normalize_route(route: &str) -> String {
    let r = route.trim().trim_matches('/').to_ascii_lowercase();
    match r.as_str() {
        "" | "welcome" | "language" => "/".to_string(),
        _ => format!("/{}", r),
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B: Backend>(terminal: &mut Terminal<B>, router: Arc<Router>, rt: Handle) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let (tx, rx) = mpsc::channel::<UiMsg>();
    let client = Client { router, rt, tx };
    let mut state = WizardState::new();
    client.navigate(&mut state, Step::Language.path());

    while !state.quit {
        drain_messages(&client, &mut state, &rx);
        if state.installing && state.last_poll.elapsed() >= STATUS_POLL {
            client.poll_status(&mut state);
        }
        terminal.draw(|f| draw(f.size(), f, &state))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                handle_key(&client, &mut state, key.code);
            }
        }
    }

    Ok(())
}

fn drain_messages(client: &Client, state: &mut WizardState, rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.try_recv() {
        match msg {
            UiMsg::InstallFinished(response) => {
                state.installing = false;
                client.poll_status(state);
                client.follow(state, response);
            }
        }
    }
}

fn move_focus(state: &mut WizardState, forward: bool) {
    let mut targets: Vec<FocusTarget> = (0..state.fields.len()).map(FocusTarget::Field).collect();
    targets.extend(state.buttons().into_iter().map(FocusTarget::Button));
    if targets.is_empty() {
        return;
    }
    let len = targets.len();
    let pos = targets.iter().position(|t| *t == state.focus).unwrap_or(0);
    let next = if forward {
        (pos + 1) % len
    } else {
        (pos + len - 1) % len
    };
    state.focus = targets[next];
}

fn move_button(state: &mut WizardState, forward: bool) {
    let buttons = state.buttons();
    let FocusTarget::Button(current) = state.focus else {
        return;
    };
    let Some(pos) = buttons.iter().position(|b| *b == current) else {
        return;
    };
    let next = if forward {
        (pos + 1).min(buttons.len() - 1)
    } else {
        pos.saturating_sub(1)
    };
    state.focus = FocusTarget::Button(buttons[next]);
}

fn activate(client: &Client, state: &mut WizardState, button: ButtonFocus) {
    match button {
        ButtonFocus::Back => {
            if let Some(route) = prev_route(&state.route).filter(|_| can_go_back(state)) {
                client.navigate(state, route);
            }
        }
        ButtonFocus::Next => {
            if state.is_terminal() {
                state.quit = true;
                return;
            }
            let (proceed, install) = match state.view() {
                Some(StepView::Requirements(_)) => (true, false),
                Some(StepView::Install) => (false, true),
                _ => (false, false),
            };
            if proceed {
                client.navigate(state, Step::Database.path());
            } else if install {
                client.start_install(state);
            } else if state.page.is_some() {
                client.submit(state);
            }
        }
        ButtonFocus::Skip => client.skip_mailing(state),
        ButtonFocus::Cancel => state.modal = Some(Modal::Cancel { yes_focused: false }),
    }
}

fn handle_key(client: &Client, state: &mut WizardState, code: KeyCode) {
    if let Some(modal) = state.modal.clone() {
        match modal {
            Modal::Cancel { yes_focused } => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                    state.modal = Some(Modal::Cancel {
                        yes_focused: !yes_focused,
                    });
                }
                KeyCode::Enter if yes_focused => {
                    info!("[PHASE: tui] [STEP: cancel] Operator cancelled setup");
                    state.quit = true;
                }
                KeyCode::Enter | KeyCode::Esc => state.modal = None,
                _ => {}
            },
            Modal::Message { .. } => {
                if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                    state.modal = None;
                }
            }
        }
        return;
    }

    if state.installing {
        return;
    }

    match code {
        KeyCode::Tab | KeyCode::Down => move_focus(state, true),
        KeyCode::BackTab | KeyCode::Up => move_focus(state, false),
        KeyCode::Esc => {
            if !state.is_terminal() {
                state.modal = Some(Modal::Cancel { yes_focused: false });
            }
        }
        _ => match state.focus {
            FocusTarget::Field(i) => {
                if code == KeyCode::Enter {
                    activate(client, state, ButtonFocus::Next);
                    return;
                }
                let Some(field) = state.fields.get_mut(i) else {
                    return;
                };
                if field.choices.is_empty() {
                    field.input.handle_key(code);
                } else {
                    match code {
                        KeyCode::Left => field.cycle(false),
                        KeyCode::Right | KeyCode::Char(' ') => field.cycle(true),
                        _ => {}
                    }
                }
            }
            FocusTarget::Button(button) => match code {
                KeyCode::Left => move_button(state, false),
                KeyCode::Right => move_button(state, true),
                KeyCode::Enter => activate(client, state, button),
                _ => {}
            },
        },
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 100, 30);

    f.render_widget(
        Block::default().borders(Borders::ALL).title("Platform Setup"),
        window_area,
    );

    let inner = window_area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(0)].as_ref())
        .split(rows[0]);

    let banner = Paragraph::new(BANNER)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Left);
    f.render_widget(banner, cols[0]);

    let title = match (&state.page, &state.done_url) {
        (_, Some(_)) => "Installation complete".to_string(),
        (Some(page), None) => page.title.clone(),
        (None, None) => String::new(),
    };
    let content = Paragraph::new(content_text(state))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(content, cols[1]);

    draw_buttons(f, rows[1], state);

    match &state.modal {
        Some(Modal::Cancel { yes_focused }) => draw_cancel_modal(f, window_area, *yes_focused),
        Some(Modal::Message { title, body }) => draw_message_modal(f, window_area, title, body),
        None => {}
    }
}

fn content_text(state: &WizardState) -> Text<'static> {
    let error_style = Style::default().fg(Color::Red);
    let mut lines: Vec<Line<'static>> = Vec::new();

    if let Some(url) = &state.done_url {
        lines.push(Line::from("The platform has been installed."));
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Continue at: {}", url)));
        return Text::from(lines);
    }

    if let Some(error) = &state.global_error {
        lines.push(Line::from(Span::styled(error.clone(), error_style)));
        lines.push(Line::from(""));
    }

    match state.view() {
        Some(StepView::Requirements(req)) => {
            for category in &req.categories {
                lines.push(Line::from(Span::styled(
                    category.name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                for item in &category.items {
                    let mark = if item.passed { "[ok]" } else { "[!!]" };
                    let style = if item.passed {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default().fg(Color::Yellow)
                    };
                    lines.push(Line::from(vec![
                        Span::styled(format!("  {} ", mark), style),
                        Span::raw(format!("{} ({:?})", item.description, item.level)),
                    ]));
                }
            }
            lines.push(Line::from(""));
            if req.has_failed_requirement {
                lines.push(Line::from(Span::styled(
                    "Some required checks failed; the installation is likely to fail.",
                    error_style,
                )));
            } else if req.has_failed_recommendation {
                lines.push(Line::from("Some recommended checks failed."));
            }
        }
        Some(StepView::Install) => {
            if state.installing || !state.install_log.is_empty() {
                lines.push(Line::from("Installing..."));
                lines.push(Line::from(""));
                lines.extend(tail(&state.install_log, LOG_TAIL));
            } else {
                lines.push(Line::from(
                    "All settings are collected. Select Install to write the configuration",
                ));
                lines.push(Line::from("and run the installation."));
            }
        }
        Some(StepView::Failed(failed)) => match &failed.log {
            Some(log) => {
                lines.push(Line::from(format!("Log: {}", failed.log_filename)));
                lines.push(Line::from(""));
                lines.extend(tail(log, LOG_TAIL + 4));
            }
            None => lines.push(Line::from(format!(
                "The installation log {} could not be found.",
                failed.log_filename
            ))),
        },
        Some(_) => {
            for (i, field) in state.fields.iter().enumerate() {
                let focused = state.focus == FocusTarget::Field(i);
                let marker = if focused { ">" } else { " " };
                let value = if field.choices.is_empty() {
                    field.input.display()
                } else {
                    format!("< {} >", field.input.value)
                };
                let style = if focused {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                lines.push(Line::from(vec![
                    Span::raw(format!("{} {:<22} ", marker, field.name)),
                    Span::styled(value, style),
                ]));
                if let Some(error) = state.errors.get(&field.name) {
                    lines.push(Line::from(Span::styled(
                        format!("    {}", error),
                        error_style,
                    )));
                }
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Tab/Up/Down move, Left/Right change choices, Enter submits."));
        }
        None => {}
    }

    Text::from(lines)
}

fn tail(text: &str, n: usize) -> Vec<Line<'static>> {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(n);
    all[start..]
        .iter()
        .map(|l| Line::from(l.to_string()))
        .collect()
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60).min(area.width);
    let h = height.min(area.height.saturating_sub(2)).max(20).min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let mut spans = Vec::new();
    for button in state.buttons() {
        let label = match button {
            ButtonFocus::Back => "Back",
            ButtonFocus::Next => next_label(state),
            ButtonFocus::Skip => "Skip",
            ButtonFocus::Cancel => "Cancel",
        };
        if !spans.is_empty() {
            spans.push(Span::raw(" "));
        }
        spans.push(button_text(label, state.focus == FocusTarget::Button(button)));
    }
    let p = Paragraph::new(Text::from(Line::from(spans))).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn button_text(label: &str, focused: bool) -> Span<'static> {
    let style = if focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    Span::styled(format!("[ {} ]", label), style)
}

fn modal_area(window_area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(window_area.width.saturating_sub(4)).max(40);
    let x = window_area.x + (window_area.width.saturating_sub(w)) / 2;
    let y = window_area.y + (window_area.height.saturating_sub(height)) / 2;
    Rect {
        x,
        y,
        width: w,
        height,
    }
}

fn draw_cancel_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, yes_focused: bool) {
    let area = modal_area(window_area, 56, 7);
    f.render_widget(Clear, area);

    let body = Paragraph::new(Text::from(vec![
        Line::from("If you cancel now, nothing will be installed."),
        Line::from("Entered settings are kept for the next run."),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Cancel Setup?"))
    .wrap(Wrap { trim: false });
    f.render_widget(body, area);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width - 2,
        height: 1,
    };
    let line = Line::from(vec![
        button_text("Yes, cancel", yes_focused),
        Span::raw(" "),
        button_text("No", !yes_focused),
    ]);
    f.render_widget(
        Paragraph::new(Text::from(line)).alignment(Alignment::Right),
        buttons_area,
    );
}

fn draw_message_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, title: &str, body: &str) {
    let area = modal_area(window_area, 64, 9);
    f.render_widget(Clear, area);
    let p = Paragraph::new(Text::from(vec![
        Line::from(body.to_string()),
        Line::from(""),
        Line::from("Press Enter to continue."),
    ]))
    .block(Block::default().borders(Borders::ALL).title(title.to_string()))
    .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::responses::{Choice, FailedPage, FormPage, LanguagePage, MailingPage};

    fn render(state: &WizardState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|f| draw(f.size(), f, state))
            .expect("draw");
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn text_input_edits_multibyte_values() {
        let mut input = TextInput::new("caf", false);
        input.handle_key(KeyCode::Char('é'));
        input.handle_key(KeyCode::Left);
        input.handle_key(KeyCode::Char('x'));
        assert_eq!(input.value, "cafxé");
        input.handle_key(KeyCode::End);
        input.handle_key(KeyCode::Backspace);
        assert_eq!(input.value, "cafx");
    }

    #[test]
    fn secret_inputs_render_masked() {
        let input = TextInput::new("hunter22", true);
        assert_eq!(input.display(), "********");
    }

    #[test]
    fn mailing_view_exposes_transport_label_as_choice() {
        let view = StepView::Mailing(MailingPage {
            transport_labels: vec!["SMTP".into(), "Gmail".into(), "Sendmail / Postfix".into()],
            transport: "sendmail".into(),
            form: FormPage {
                fields: Vec::new(),
                errors: ValidationErrors::new(),
                global_error: Some("refused".into()),
            },
        });
        let (fields, _, global) = fields_for(&view);
        assert_eq!(fields[0].name, "transport");
        assert_eq!(fields[0].input.value, "Sendmail / Postfix");
        assert_eq!(global.as_deref(), Some("refused"));

        let mut transport = fields[0].clone();
        transport.cycle(true);
        assert_eq!(transport.input.value, "SMTP");
        transport.cycle(false);
        assert_eq!(transport.input.value, "Sendmail / Postfix");
    }

    #[test]
    fn back_follows_the_step_order() {
        assert_eq!(prev_route("/database"), Some("/requirements"));
        assert_eq!(prev_route("/"), None);
        assert_eq!(prev_route("/error/install-1.log"), None);
        assert_eq!(normalize_route("welcome"), "/");
        assert_eq!(normalize_route("Database/"), "/database");
    }

    #[test]
    fn language_page_renders_with_buttons() {
        let mut state = WizardState::new();
        state.load_page(
            "/",
            Page {
                title: "Welcome".into(),
                view: StepView::Language(LanguagePage {
                    languages: vec![Choice::new("en", "English")],
                    countries: vec![Choice::new("US", "United States")],
                    install_language: "en".into(),
                    country: "US".into(),
                }),
            },
        );
        assert_eq!(state.focus, FocusTarget::Field(0));
        assert_eq!(
            state.form().get("install_language").map(String::as_str),
            Some("en")
        );

        let screen = render(&state);
        assert!(screen.contains("Platform Setup"));
        assert!(screen.contains("Welcome"));
        assert!(screen.contains("[ Next ]"));
        assert!(!screen.contains("[ Back ]"));
    }

    #[test]
    fn failed_page_shows_log_tail_and_finish() {
        let mut state = WizardState::new();
        state.load_page(
            "/error/install-5.log",
            Page {
                title: "Installation failed".into(),
                view: StepView::Failed(FailedPage {
                    log_filename: "install-5.log".into(),
                    log: Some("ERROR: database unreachable\nINSTALL FAILED\n".into()),
                }),
            },
        );
        let screen = render(&state);
        assert!(screen.contains("INSTALL FAILED"));
        assert!(screen.contains("[ Finish ]"));
        assert!(!screen.contains("[ Cancel ]"));
    }
}
