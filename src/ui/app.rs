use crate::config::Config;
use crate::events::{AppEvent, UiIntent};
use crate::exchange::{ExchangeController, ExchangeOutcome};
use crate::reply::ReplyGenerator;
use crate::ui::conversation::ChatView;
use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

pub type Backend = CrosstermBackend<Stdout>;

/// Redraw at least this often so the pending indicator stays current
const TICK: Duration = Duration::from_millis(250);

/// How long the input thread waits for a terminal event before checking for shutdown
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Terminal chat application: owns the view and dispatches intents to the controller
pub struct ChatApp {
    controller: ExchangeController<dyn ReplyGenerator>,
    view: ChatView,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    should_quit: bool,
}

impl ChatApp {
    pub fn new(controller: ExchangeController<dyn ReplyGenerator>, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            view: ChatView::new(config.ui.clone()),
            events_tx,
            events_rx,
            should_quit: false,
        }
    }

    /// Take over the terminal and run until the user quits
    pub async fn run(mut self) -> Result<()> {
        let (mut terminal, enhanced_keys) = init_terminal()?;
        let stop = Arc::new(AtomicBool::new(false));
        let input = spawn_input_thread(self.events_tx.clone(), stop.clone());

        let result = self.event_loop(&mut terminal).await;

        stop.store(true, Ordering::Relaxed);
        restore_terminal(&mut terminal, enhanced_keys)?;
        if input.join().is_err() {
            tracing::warn!("Input thread panicked");
        }
        result
    }

    async fn event_loop(&mut self, terminal: &mut Terminal<Backend>) -> Result<()> {
        let mut tick = tokio::time::interval(TICK);

        while !self.should_quit {
            let snapshot = self.controller.snapshot().await;
            terminal
                .draw(|frame| {
                    let area = frame.size();
                    self.view.render(&snapshot, area, frame.buffer_mut());
                })
                .context("Failed to draw frame")?;

            let event = tokio::select! {
                Some(event) = self.events_rx.recv() => Some(event),
                _ = tick.tick() => None,
            };
            if let Some(event) = event {
                self.handle_event(event).await;
            }
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => {
                let snapshot = self.controller.snapshot().await;
                if let Some(intent) = self.view.handle_key(key, &snapshot) {
                    self.apply(intent).await;
                }
            }
            AppEvent::Paste(text) => self.view.handle_paste(&text),
            AppEvent::Resize(width, height) => {
                tracing::trace!(width, height, "Terminal resized");
            }
            AppEvent::Exchange(outcome) => match outcome {
                ExchangeOutcome::Completed { conversation_id, title } => {
                    tracing::debug!(conversation = %conversation_id, ?title, "Exchange finished");
                }
                ExchangeOutcome::Failed { conversation_id, error } => {
                    tracing::debug!(conversation = %conversation_id, %error, "Exchange failed");
                }
                ExchangeOutcome::Ignored => {}
            },
        }
    }

    /// Apply a user intent to the session
    pub async fn apply(&mut self, intent: UiIntent) {
        match intent {
            UiIntent::Submit(text) => {
                // Resolve the target now; keys handled before the task runs may switch conversations
                let conversation_id = self.controller.active_id().await;
                let controller = self.controller.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = controller.submit_to(conversation_id, &text).await;
                    let _ = events.send(AppEvent::Exchange(outcome));
                });
            }
            UiIntent::Retry => {
                let controller = self.controller.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    if let Some(outcome) = controller.retry().await {
                        let _ = events.send(AppEvent::Exchange(outcome));
                    }
                });
            }
            UiIntent::Select(id) => {
                if let Err(error) = self.controller.select_conversation(id).await {
                    tracing::warn!(%error, "Selection ignored");
                }
                self.view.reset_scroll();
            }
            UiIntent::NewConversation => {
                self.controller.create_conversation().await;
                self.view.reset_scroll();
            }
            UiIntent::NextConversation => {
                self.controller.select_next().await;
                self.view.reset_scroll();
            }
            UiIntent::PreviousConversation => {
                self.controller.select_previous().await;
                self.view.reset_scroll();
            }
            UiIntent::DismissError => {
                self.controller.dismiss_failure().await;
            }
            UiIntent::ToggleSidebar => self.view.toggle_sidebar(),
            UiIntent::Help => self.view.show_help(),
            UiIntent::Quit => {
                tracing::info!("Quit requested");
                self.should_quit = true;
            }
        }
    }
}

/// Initialize the terminal for TUI mode.
///
/// Also returns whether keyboard enhancement was pushed; without it terminals
/// report Shift+Enter as a plain Enter.
fn init_terminal() -> Result<(Terminal<Backend>, bool)> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("Failed to enter alternate screen")?;

    let enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("Failed to enable keyboard enhancement")?;
    }
    tracing::debug!(enhanced_keys, "Terminal initialized");

    let terminal = Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")?;
    Ok((terminal, enhanced_keys))
}

/// Restore the terminal to normal mode
fn restore_terminal(terminal: &mut Terminal<Backend>, enhanced_keys: bool) -> Result<()> {
    if enhanced_keys {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("Failed to disable keyboard enhancement")?;
    }
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Forward terminal events to the app loop until `stop` is set
fn spawn_input_thread(
    events: mpsc::UnboundedSender<AppEvent>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(error) => {
                    tracing::error!(%error, "Failed to poll terminal events");
                    break;
                }
            }

            let app_event = match event::read() {
                Ok(Event::Key(key)) => AppEvent::Key(key),
                Ok(Event::Paste(text)) => AppEvent::Paste(text),
                Ok(Event::Resize(width, height)) => AppEvent::Resize(width, height),
                Ok(_) => continue,
                Err(error) => {
                    tracing::error!(%error, "Failed to read terminal event");
                    break;
                }
            };

            if events.send(app_event).is_err() {
                break;
            }
        }
    })
}
