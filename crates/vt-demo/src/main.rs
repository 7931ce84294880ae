//! Thin proof-of-concept binary wiring a synthetic data source to the
//! viewport engine and a minimal `crossterm` raw-mode loop (§10.6). No
//! colour, no column layout, no keybinding tables — those stay out of scope
//! per §1; this exists only to prove the engine end-to-end the way
//! `ox-bin` exists over the teacher's editor crates.

mod sources;

use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::event::{Event as CEvent, EventStream, KeyCode, KeyEventKind};
use crossterm::{cursor, execute, terminal};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{error, info};

use sources::{RowSource, TreeSource};
use vtcore_config::ConfigContext;
use vtcore_events::{Intent, VisibleEntry};
use vtcore_source::{ChunkCompletion, DataSource};
use vtcore_tree::TreeRow;
use vtcore_viewport::{DispatchOutcome, Engine, TreeEngine};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Flat,
    Tree,
}

#[derive(Parser, Debug)]
#[command(name = "vt-demo", version, about = "Virtualized viewport engine demo")]
struct Args {
    #[arg(long, value_enum, default_value = "flat")]
    mode: Mode,
    #[arg(long, default_value_t = 1_000_000)]
    total_items: usize,
    #[arg(long)]
    config: Option<PathBuf>,
}

/// RAII guard restoring the terminal even on panic or early return, same
/// shape as the teacher's `TerminalGuard`.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

fn configure_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "vt-demo.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
        .ok()
        .map(|()| guard)
}

fn key_to_intent(code: KeyCode) -> Option<Intent> {
    match code {
        KeyCode::Char('j') | KeyCode::Down => Some(Intent::CursorDown),
        KeyCode::Char('k') | KeyCode::Up => Some(Intent::CursorUp),
        KeyCode::PageDown => Some(Intent::PageDown),
        KeyCode::PageUp => Some(Intent::PageUp),
        KeyCode::Home => Some(Intent::JumpToStart),
        KeyCode::End => Some(Intent::JumpToEnd),
        KeyCode::Char('r') => Some(Intent::Refresh),
        KeyCode::Char(' ') => Some(Intent::ToggleSelectionCurrent),
        KeyCode::Char('a') => Some(Intent::SelectAll),
        KeyCode::Char('c') => Some(Intent::ClearSelection),
        KeyCode::Tab => Some(Intent::ToggleNodeAtCursor),
        _ => None,
    }
}

fn render_header(height: usize, placeholder_count: usize, total_items: usize) -> Vec<String> {
    vec![format!(
        "vt-demo — total={total_items} height={height} placeholders={placeholder_count}  (j/k move, space toggle, r refresh, tab expand, q quit)"
    )]
}

async fn run_flat(args: &Args, cfg: vtcore_config::Config) -> Result<()> {
    let source = Arc::new(RowSource::new(args.total_items));
    let (_w, h) = terminal::size().unwrap_or((80, 24));
    let viewport_cfg = cfg.viewport_config(ConfigContext::new(h))?;
    let (mut engine, outcome) = Engine::new(source.clone(), viewport_cfg).await;

    let (load_tx, mut load_rx) = mpsc::channel::<ChunkCompletion<String>>(256);
    dispatch_loads(&source, outcome.requests, &load_tx);
    let mut visible = outcome.visible;

    let _guard = TerminalGuard::enter()?;
    let mut events = EventStream::new();

    loop {
        if let Some(slice) = &visible {
            let lines = render_header(slice.viewport.cursor_within_viewport + 1, slice.placeholder_count, source.total_items().await)
                .into_iter()
                .chain(slice.items.iter().enumerate().map(|(row, entry)| {
                    let marker = if slice.viewport.cursor_within_viewport == row { ">" } else { " " };
                    match entry {
                        VisibleEntry::Real(item) => {
                            let sel = if item.selected { "[x]" } else { "[ ]" };
                            format!("{marker} {sel} {}", item.value)
                        }
                        VisibleEntry::LoadingPlaceholder { logical_index } => {
                            format!("{marker}     Loading item {logical_index}…")
                        }
                        VisibleEntry::MissingPlaceholder { logical_index } => {
                            format!("{marker}     Missing item {logical_index}")
                        }
                    }
                }))
                .collect::<Vec<_>>();
            draw_frame(&lines)?;
        }

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(CEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                            break;
                        }
                        if let Some(intent) = key_to_intent(key.code) {
                            let outcome = match intent {
                                Intent::ToggleSelectionCurrent => {
                                    let ack = engine.toggle_selection_current().await;
                                    info!(target: "vt_demo::selection", ?ack, "selection ack");
                                    engine.dispatch(Intent::Refresh)
                                }
                                Intent::SelectAll => {
                                    let _ = engine.select_all().await;
                                    engine.dispatch(Intent::Refresh)
                                }
                                Intent::ClearSelection => {
                                    let _ = engine.clear_selection().await;
                                    engine.dispatch(Intent::Refresh)
                                }
                                other => engine.dispatch(other),
                            };
                            handle_outcome(&source, outcome, &load_tx, &mut engine, &mut visible).await;
                        }
                    }
                    Some(Err(err)) => {
                        error!(target: "vt_demo::input", %err, "input stream error");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            Some(completion) = load_rx.recv() => {
                let outcome = engine.apply_completion(completion);
                handle_outcome(&source, outcome, &load_tx, &mut engine, &mut visible).await;
            }
        }
    }

    Ok(())
}

async fn handle_outcome(
    source: &Arc<RowSource>,
    outcome: DispatchOutcome<String>,
    load_tx: &mpsc::Sender<ChunkCompletion<String>>,
    engine: &mut Engine<String, RowSource>,
    visible: &mut Option<vtcore_viewport::VisibleSlice<String>>,
) {
    if outcome.refresh_total_items_requested {
        let total = source.total_items().await;
        let refreshed = engine.apply_total_items(total);
        dispatch_loads(source, refreshed.requests, load_tx);
        if refreshed.visible.is_some() {
            *visible = refreshed.visible;
        }
        return;
    }
    dispatch_loads(source, outcome.requests, load_tx);
    if outcome.visible.is_some() {
        *visible = outcome.visible;
    }
}

fn dispatch_loads(
    source: &Arc<RowSource>,
    requests: Vec<vtcore_source::LoadRequest>,
    tx: &mpsc::Sender<ChunkCompletion<String>>,
) {
    for request in requests {
        let source = source.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let completion = source.load_chunk(request).await;
            let _ = tx.send(completion).await;
        });
    }
}

async fn run_tree(args: &Args, cfg: vtcore_config::Config) -> Result<()> {
    let depth = ((args.total_items as f64).log(6.0).ceil() as usize).max(2);
    let tree_source = Arc::new(TreeSource::new(depth, 6));
    let (_w, h) = terminal::size().unwrap_or((80, 24));
    let viewport_cfg = cfg.viewport_config(ConfigContext::new(h))?;
    let (mut engine, outcome) = TreeEngine::new(tree_source.clone(), viewport_cfg).await;
    engine.set_cascading(cfg.cascading_selection());

    let (load_tx, mut load_rx) = mpsc::channel::<ChunkCompletion<TreeRow<String>>>(256);
    dispatch_tree_loads(engine.flattened_source().clone(), outcome.requests, &load_tx);
    let mut visible = outcome.visible;

    let _guard = TerminalGuard::enter()?;
    let mut events = EventStream::new();

    loop {
        if let Some(slice) = &visible {
            let lines = render_header(slice.viewport.cursor_within_viewport + 1, slice.placeholder_count, engine.total_items())
                .into_iter()
                .chain(slice.items.iter().enumerate().map(|(row, entry)| {
                    let marker = if slice.viewport.cursor_within_viewport == row { ">" } else { " " };
                    match entry {
                        VisibleEntry::Real(item) => {
                            let indent = "  ".repeat(item.value.depth);
                            let expander = if item.value.has_children { "+" } else { " " };
                            format!("{marker} {expander}{indent}{}", item.value.value)
                        }
                        VisibleEntry::LoadingPlaceholder { logical_index } => {
                            format!("{marker}     Loading item {logical_index}…")
                        }
                        VisibleEntry::MissingPlaceholder { logical_index } => {
                            format!("{marker}     Missing item {logical_index}")
                        }
                    }
                }))
                .collect::<Vec<_>>();
            draw_frame(&lines)?;
        }

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(CEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                            break;
                        }
                        if matches!(key.code, KeyCode::Tab) {
                            let outcome = engine.toggle_node_at_cursor().await;
                            dispatch_tree_loads(engine.flattened_source().clone(), outcome.requests, &load_tx);
                            if outcome.visible.is_some() {
                                visible = outcome.visible;
                            }
                            continue;
                        }
                        if matches!(key.code, KeyCode::Char(' ')) {
                            let ack = engine.toggle_selection_current().await;
                            info!(target: "vt_demo::selection", ?ack, "tree selection ack");
                            let outcome = engine.dispatch(Intent::Refresh);
                            dispatch_tree_loads(engine.flattened_source().clone(), outcome.requests, &load_tx);
                            if outcome.visible.is_some() {
                                visible = outcome.visible;
                            }
                            continue;
                        }
                        if let Some(intent) = key_to_intent(key.code) {
                            let outcome = engine.dispatch(intent);
                            dispatch_tree_loads(engine.flattened_source().clone(), outcome.requests, &load_tx);
                            if outcome.visible.is_some() {
                                visible = outcome.visible;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        error!(target: "vt_demo::input", %err, "input stream error");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            Some(completion) = load_rx.recv() => {
                let outcome = engine.apply_completion(completion);
                dispatch_tree_loads(engine.flattened_source().clone(), outcome.requests, &load_tx);
                if outcome.visible.is_some() {
                    visible = outcome.visible;
                }
            }
        }
    }

    Ok(())
}

fn dispatch_tree_loads(
    source: Arc<vtcore_tree::FlattenedTreeSource<String, TreeSource>>,
    requests: Vec<vtcore_source::LoadRequest>,
    tx: &mpsc::Sender<ChunkCompletion<TreeRow<String>>>,
) {
    for request in requests {
        let source = source.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let completion = source.load_chunk(request).await;
            let _ = tx.send(completion).await;
        });
    }
}

fn draw_frame(lines: &[String]) -> Result<()> {
    let mut out = stdout();
    execute!(out, cursor::MoveTo(0, 0), terminal::Clear(terminal::ClearType::All))?;
    for line in lines {
        write!(out, "{line}\r\n")?;
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging();
    let args = Args::parse();
    let cfg = vtcore_config::load_from(args.config.clone())
        .context("loading vtcore.toml")?;

    let result = match args.mode {
        Mode::Flat => run_flat(&args, cfg).await,
        Mode::Tree => run_tree(&args, cfg).await,
    };

    if let Err(err) = &result {
        error!(target: "vt_demo::runtime", %err, "demo exited with error");
    }
    result
}
