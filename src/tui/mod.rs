mod export;
mod help;
mod state;

use crate::caption::{CaptionSource, ImageSource};
use crate::cli::{self, Cli};
use crate::model::{InfoEvent, SessionEvent};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use state::{MenuItem, PathAction, UiState};
use std::path::PathBuf;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const TITLE: &str = "CLIP-BLIP Image2Text Prompt Tool";

pub async fn run(args: Cli) -> Result<()> {
    let session = cli::build_session(&args)?;
    // Model load happens before the terminal is taken over so failures print normally.
    let captioner = cli::load_captioner(&args).await?;
    let model_label = format!(
        "{} on {}",
        captioner.config().clip_model_name,
        captioner.config().device.as_str()
    );
    let captioner: Arc<dyn CaptionSource> = Arc::new(captioner);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let _ = event_tx.send(SessionEvent::Info(InfoEvent::ModelReady {
        model: model_label.clone(),
    }));

    let state = UiState {
        session,
        model_label,
        last_list_path: args.list.as_ref().map(|p| p.display().to_string()),
        ..Default::default()
    };

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(state, event_rx, cmd_tx));

    let res = orchestrator::run_controller(captioner, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread. The session lives here and only here.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
            dirty = true;
        }

        if dirty || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        if event::poll(Duration::from_millis(20)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                dirty = true;
                if handle_key(&mut state, k, &cmd_tx) == Flow::Exit {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    if let Some(notice) = exit_notice(&state) {
        eprintln!("{notice}");
    }
    res
}

/// Shown on the restored terminal when quitting has to wait for the controller.
fn exit_notice(state: &UiState) -> Option<&'static str> {
    state
        .busy
        .then_some("Waiting for the running caption to finish before exiting…")
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

fn apply_event(state: &mut UiState, ev: SessionEvent) {
    match ev {
        SessionEvent::CaptionStarted { source, mode } => {
            state.busy = true;
            state.info = format!("Interrogating {source} ({} mode)…", mode.as_str());
        }
        SessionEvent::CaptionCompleted { prompt } => {
            state.busy = false;
            state.session.append(prompt);
            state.cursor = state.session.prompts().len().saturating_sub(1);
            state.info = format!("Added prompt {}", state.session.prompts().len());
        }
        SessionEvent::CaptionFailed { no_image, message } => {
            state.busy = false;
            state.info = if no_image {
                "No image".into()
            } else {
                "Caption failed".into()
            };
            state.show_error(message);
        }
        SessionEvent::Info(info) => {
            state.info = info.to_message();
        }
    }
}

fn handle_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) -> Flow {
    if k.modifiers == KeyModifiers::CONTROL && k.code == KeyCode::Char('c') {
        return Flow::Exit;
    }

    // Modal layers first: error dialog, path prompt, help, menu.
    if state.error.is_some() {
        if matches!(k.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            state.error = None;
        }
        return Flow::Continue;
    }

    if let Some(input) = state.input.as_mut() {
        match k.code {
            KeyCode::Esc => state.input = None,
            KeyCode::Backspace => {
                input.buffer.pop();
            }
            KeyCode::Char(c) => input.buffer.push(c),
            KeyCode::Enter => {
                if let Some(input) = state.input.take() {
                    submit_path(state, input.action, input.buffer.trim(), cmd_tx);
                }
            }
            _ => {}
        }
        return Flow::Continue;
    }

    if state.show_help {
        state.show_help = false;
        return Flow::Continue;
    }

    if state.menu_open {
        match k.code {
            KeyCode::Esc | KeyCode::F(10) | KeyCode::Char('f') => state.menu_open = false,
            KeyCode::Up | KeyCode::Char('k') => {
                state.menu_cursor = state.menu_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.menu_cursor = (state.menu_cursor + 1).min(MenuItem::ALL.len() - 1);
            }
            KeyCode::Enter => {
                state.menu_open = false;
                let item = MenuItem::ALL[state.menu_cursor];
                return run_menu_item(state, item, cmd_tx);
            }
            KeyCode::Char(c) => {
                if let Some(item) = MenuItem::from_hotkey(c) {
                    state.menu_open = false;
                    return run_menu_item(state, item, cmd_tx);
                }
            }
            _ => {}
        }
        return Flow::Continue;
    }

    match k.code {
        KeyCode::Char('f') | KeyCode::F(10) => {
            state.menu_open = true;
            state.menu_cursor = 0;
        }
        KeyCode::Char('?') => state.show_help = true,
        KeyCode::Char('t') => {
            let fast = state.session.toggle_fast_mode();
            state.info = format!("Fast mode {}", if fast { "on" } else { "off" });
        }
        KeyCode::Up | KeyCode::Char('k') => state.move_cursor(-1),
        KeyCode::Down | KeyCode::Char('j') => state.move_cursor(1),
        KeyCode::Char(' ') => state.toggle_selected(),
        KeyCode::Char('a') => state.toggle_select_all(),
        KeyCode::Enter => {
            if let Err(e) = state.session.show(state.cursor) {
                state.info = e.to_string();
            }
        }
        KeyCode::Char('m') => merge_selected(state),
        KeyCode::Char('c') => {
            state.session.clear();
            state.reset_list_view();
            state.info = "List cleared".into();
        }
        KeyCode::Char(c) => {
            if let Some(item) = MenuItem::from_hotkey(c) {
                return run_menu_item(state, item, cmd_tx);
            }
        }
        _ => {}
    }
    Flow::Continue
}

fn run_menu_item(state: &mut UiState, item: MenuItem, cmd_tx: &UnboundedSender<UiCommand>) -> Flow {
    match item {
        MenuItem::OpenImage => state.open_input(PathAction::OpenImage, ""),
        MenuItem::ClipboardCaption => request_caption(state, ImageSource::Clipboard, cmd_tx),
        MenuItem::CopyResult => export::copy_result(state),
        MenuItem::ExportList => {
            let initial = state
                .last_list_path
                .clone()
                .unwrap_or_else(|| "prompts.txt".into());
            state.open_input(PathAction::ExportList, &initial);
        }
        MenuItem::ImportList => {
            let initial = state.last_list_path.clone().unwrap_or_default();
            state.open_input(PathAction::ImportList, &initial);
        }
        MenuItem::Exit => return Flow::Exit,
    }
    Flow::Continue
}

fn submit_path(
    state: &mut UiState,
    action: PathAction,
    path: &str,
    cmd_tx: &UnboundedSender<UiCommand>,
) {
    // An empty path is a cancelled dialog.
    if path.is_empty() {
        return;
    }
    let path = PathBuf::from(path);
    match action {
        PathAction::OpenImage => request_caption(state, ImageSource::File(path), cmd_tx),
        PathAction::ExportList => export::export_list(state, &path),
        PathAction::ImportList => export::import_list(state, &path),
    }
}

fn request_caption(state: &mut UiState, source: ImageSource, cmd_tx: &UnboundedSender<UiCommand>) {
    if state.busy {
        state.info = "A caption is already running".into();
        return;
    }
    let mode = state.session.caption_mode();
    if cmd_tx.send(UiCommand::Caption { source, mode }).is_err() {
        state.show_error("Caption worker is not running");
    }
}

fn merge_selected(state: &mut UiState) {
    let selected = state.selected_indices();
    match state.session.merge_selected(&selected, &mut rand::thread_rng()) {
        Ok(_) => state.info = format!("Merged {} prompts", selected.len()),
        Err(e) => state.show_error(e.to_string()),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(3),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    draw_header(chunks[0], f, state);
    if state.show_help {
        help::draw_help(chunks[1], f);
    } else {
        draw_body(chunks[1], f, state);
    }
    draw_buttons(chunks[2], f);
    draw_status(chunks[3], f, state);

    if state.menu_open {
        draw_menu(area, f, state);
    }
    if let Some(input) = state.input.as_ref() {
        let popup = centered_rect(area, 70, 3);
        f.render_widget(Clear, popup);
        let p = Paragraph::new(Line::from(vec![
            Span::raw(input.buffer.clone()),
            Span::styled("█", Style::default().fg(Color::Gray)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} (Enter to confirm, Esc to cancel)", input.action.title())),
        );
        f.render_widget(p, popup);
    }
    if let Some(message) = state.error.as_deref() {
        let popup = centered_rect(area, 60, 7);
        f.render_widget(Clear, popup);
        let p = Paragraph::new(vec![
            Line::from(message.to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to dismiss",
                Style::default().fg(Color::Gray),
            )),
        ])
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title("Error"),
        );
        f.render_widget(p, popup);
    }
}

fn draw_header(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let checkbox = if state.session.fast_mode() { "[x]" } else { "[ ]" };
    let line = Line::from(vec![
        Span::styled("f", Style::default().fg(Color::Magenta)),
        Span::raw(" File   "),
        Span::styled(checkbox, Style::default().fg(Color::Yellow)),
        Span::raw(" Use Fast Mode ("),
        Span::styled("t", Style::default().fg(Color::Magenta)),
        Span::raw(")   "),
        Span::styled(state.model_label.clone(), Style::default().fg(Color::Gray)),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(TITLE));
    f.render_widget(p, area);
}

fn draw_body(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);

    let items: Vec<ListItem> = state
        .session
        .prompts()
        .iter()
        .enumerate()
        .map(|(i, prompt)| {
            let marker = if state.selected.contains(&i) { "[x] " } else { "[ ] " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::styled(format!("{:>2} ", i + 1), Style::default().fg(Color::Gray)),
                Span::raw(prompt.clone()),
            ]))
        })
        .collect();

    let title = format!(
        "Prompt List ({} selected / {})",
        state.selected.len(),
        state.session.prompts().len()
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut list_state = ListState::default();
    if !state.session.prompts().is_empty() {
        list_state.select(Some(state.cursor));
    }
    f.render_stateful_widget(list, cols[0], &mut list_state);

    let words = crate::prompt::count_words(state.session.active());
    let output = Paragraph::new(state.session.active().to_string())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Prompt Output ({words} words)")),
        );
    f.render_widget(output, cols[1]);
}

fn draw_buttons(area: Rect, f: &mut ratatui::Frame) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);

    let button = |key: &'static str, label: &'static str| {
        Paragraph::new(Line::from(vec![
            Span::styled(key, Style::default().fg(Color::Magenta)),
            Span::raw(" "),
            Span::raw(label),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
    };
    f.render_widget(button("c", "Clear List"), cols[0]);
    f.render_widget(button("m", "Merge Selected Prompts"), cols[1]);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    if state.busy {
        spans.push(Span::styled("● ", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw(state.info.clone()));
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Status (? for help)"));
    f.render_widget(p, area);
}

fn draw_menu(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut items = Vec::new();
    let mut cursor_row = 0;
    for (i, item) in MenuItem::ALL.iter().enumerate() {
        if i == state.menu_cursor {
            cursor_row = items.len();
        }
        items.push(ListItem::new(Line::from(vec![
            Span::styled(item.hotkey().to_string(), Style::default().fg(Color::Magenta)),
            Span::raw("  "),
            Span::raw(item.label()),
        ])));
        if item.ends_group() {
            items.push(ListItem::new(Line::from(Span::styled(
                "──────────────────────────────",
                Style::default().fg(Color::DarkGray),
            ))));
        }
    }

    let height = items.len() as u16 + 2;
    let popup = Rect {
        x: area.x + 1,
        y: area.y + 2,
        width: 36.min(area.width.saturating_sub(2)),
        height: height.min(area.height.saturating_sub(2)),
    };
    f.render_widget(Clear, popup);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("File"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    list_state.select(Some(cursor_row));
    f.render_stateful_widget(list, popup, &mut list_state);
}

fn centered_rect(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = area.width * percent_x / 100;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::CaptionMode;
    use ratatui::backend::TestBackend;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn state_with(prompts: &[&str]) -> UiState {
        let mut state = UiState::default();
        for p in prompts {
            state.session.append(p.to_string());
        }
        state
    }

    #[test]
    fn test_merge_with_one_selected_shows_error() {
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let mut state = state_with(&["red car, fast", "blue car, slow"]);
        handle_key(&mut state, key(KeyCode::Char(' ')), &cmd_tx);
        handle_key(&mut state, key(KeyCode::Char('m')), &cmd_tx);

        assert!(state.error.as_deref().unwrap().contains("at least 2"));
        assert_eq!(state.session.prompts().len(), 2);

        // Any dismiss key closes the dialog before anything else is handled.
        handle_key(&mut state, key(KeyCode::Enter), &cmd_tx);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_merge_two_selected_updates_output_only() {
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let mut state = state_with(&["red car, fast, shiny", "blue car, slow, rusty"]);
        handle_key(&mut state, key(KeyCode::Char('a')), &cmd_tx);
        handle_key(&mut state, key(KeyCode::Char('m')), &cmd_tx);

        assert!(state.error.is_none());
        let active = state.session.active();
        assert!(active.starts_with("red car, ") || active.starts_with("blue car, "));
        assert_eq!(state.session.prompts().len(), 2);
    }

    #[test]
    fn test_enter_loads_entry_and_clear_empties_everything() {
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let mut state = state_with(&["first, a", "second, b"]);
        state.cursor = 0;
        handle_key(&mut state, key(KeyCode::Enter), &cmd_tx);
        assert_eq!(state.session.active(), "first, a");

        handle_key(&mut state, key(KeyCode::Char('c')), &cmd_tx);
        assert!(state.session.prompts().is_empty());
        assert_eq!(state.session.active(), "");
    }

    #[test]
    fn test_open_image_prompt_sends_caption_command() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('t')), &cmd_tx);
        handle_key(&mut state, key(KeyCode::Char('o')), &cmd_tx);
        for c in "cat.png".chars() {
            handle_key(&mut state, key(KeyCode::Char(c)), &cmd_tx);
        }
        handle_key(&mut state, key(KeyCode::Enter), &cmd_tx);

        match cmd_rx.try_recv().unwrap() {
            UiCommand::Caption { source, mode } => {
                assert_eq!(source, ImageSource::File(PathBuf::from("cat.png")));
                assert_eq!(mode, CaptionMode::Best);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_prompt_sends_nothing() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('o')), &cmd_tx);
        handle_key(&mut state, key(KeyCode::Char('x')), &cmd_tx);
        handle_key(&mut state, key(KeyCode::Esc), &cmd_tx);
        assert!(state.input.is_none());
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_menu_navigation_and_exit() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::F(10)), &cmd_tx);
        assert!(state.menu_open);
        handle_key(&mut state, key(KeyCode::Down), &cmd_tx);
        assert_eq!(handle_key(&mut state, key(KeyCode::Enter), &cmd_tx), Flow::Continue);
        assert!(matches!(
            cmd_rx.try_recv().unwrap(),
            UiCommand::Caption { source: ImageSource::Clipboard, .. }
        ));

        handle_key(&mut state, key(KeyCode::Char('f')), &cmd_tx);
        assert_eq!(handle_key(&mut state, key(KeyCode::Char('q')), &cmd_tx), Flow::Exit);
    }

    #[test]
    fn test_caption_events_update_state() {
        let mut state = UiState::default();
        apply_event(
            &mut state,
            SessionEvent::CaptionStarted {
                source: ImageSource::Clipboard,
                mode: CaptionMode::Fast,
            },
        );
        assert!(state.busy);

        apply_event(
            &mut state,
            SessionEvent::CaptionCompleted {
                prompt: "a lighthouse, stormy sea".into(),
            },
        );
        assert!(!state.busy);
        assert_eq!(state.session.prompts(), ["a lighthouse, stormy sea"]);
        assert_eq!(state.session.active(), "a lighthouse, stormy sea");

        apply_event(
            &mut state,
            SessionEvent::CaptionFailed {
                no_image: true,
                message: "No image in clipboard.".into(),
            },
        );
        assert_eq!(state.error.as_deref(), Some("No image in clipboard."));
        assert_eq!(state.session.prompts().len(), 1);
    }

    #[test]
    fn test_quit_while_captioning_explains_the_wait() {
        let mut state = UiState::default();
        assert_eq!(exit_notice(&state), None);

        apply_event(
            &mut state,
            SessionEvent::CaptionStarted {
                source: ImageSource::Clipboard,
                mode: CaptionMode::Best,
            },
        );
        assert!(exit_notice(&state).unwrap().contains("Waiting"));

        apply_event(&mut state, SessionEvent::CaptionCompleted { prompt: "a cat".into() });
        assert_eq!(exit_notice(&state), None);
    }

    fn render(state: &UiState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| draw(f.area(), f, state)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_draw_renders_title_and_prompts() {
        let state = state_with(&["a cat, sitting"]);
        let text = render(&state);
        assert!(text.contains(TITLE));
        assert!(text.contains("[x] Use Fast Mode"));
        assert!(text.contains("a cat, sitting"));
    }

    #[test]
    fn test_draw_file_menu() {
        let mut state = UiState::default();
        state.menu_open = true;
        let text = render(&state);
        for item in MenuItem::ALL {
            assert!(text.contains(item.label()), "missing {}", item.label());
        }
    }
}
