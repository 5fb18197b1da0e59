//! Single-threaded event loop around a [`Session`].
//!
//! Commands, training progress and fetched quotes all arrive on one channel,
//! and only the loop thread touches the session. Training and fetching run on
//! worker threads that post their results back. The TTL countdown and panel
//! polls are deadlines the loop waits on with `recv_timeout`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

use crate::classifier::{Classifier, ClassifierError, EpochReport};
use crate::date_codec;
use crate::live_data::{LiveDataFetcher, LiveQuote};
use crate::session::{
    PredictionInput, Session, SessionState, StatusTone, TickOutcome, TrainingOutcome,
};

const HELP: &str = "\
commands:
  fetch              load live price and volume into the form
  train              train the model on the loaded dataset
  predict            classify the current form values
  date <YYYY-MM-DD>  set the form date
  price <usd>        set the form price
  volume <usd>       set the form 24h volume
  status             show session state and form
  help               show this list
  quit               exit";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch,
    Train,
    Predict,
    SetDate(String),
    SetPrice(String),
    SetVolume(String),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?} (try \"help\")")]
    Unknown(String),
    #[error("{0} needs a value")]
    MissingArgument(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let with_value = |field: &'static str| {
            if rest.is_empty() {
                Err(CommandError::MissingArgument(field))
            } else {
                Ok(rest.to_string())
            }
        };
        match word.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::Empty),
            "fetch" => Ok(Self::Fetch),
            "train" => Ok(Self::Train),
            "predict" => Ok(Self::Predict),
            "date" => with_value("date").map(Self::SetDate),
            "price" => with_value("price").map(Self::SetPrice),
            "volume" => with_value("volume").map(Self::SetVolume),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}

/// Everything the loop reacts to besides its own deadlines.
pub enum AppEvent {
    Command(Command),
    /// A line that did not parse.
    Invalid(CommandError),
    Epoch(EpochReport),
    TrainingFinished(TrainingOutcome),
    Fetched(LiveQuote),
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns the [`Session`] and serialises every mutation of it.
pub struct App<C, W> {
    session: Session<C>,
    fetcher: Arc<LiveDataFetcher>,
    form: PredictionInput,
    last_update: Option<String>,
    fetch_in_flight: bool,
    input_closed: bool,
    panel_deadline: Option<Instant>,
    /// Next countdown decrement; armed only while `Trained`.
    ttl_deadline: Option<Instant>,
    tick_interval: Duration,
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
    out: W,
}

impl<C, W> App<C, W>
where
    C: Classifier + 'static,
    W: Write,
{
    pub fn new(session: Session<C>, fetcher: LiveDataFetcher, out: W) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            session,
            fetcher: Arc::new(fetcher),
            form: PredictionInput {
                date: today(),
                ..PredictionInput::default()
            },
            last_update: None,
            fetch_in_flight: false,
            input_closed: false,
            panel_deadline: None,
            ttl_deadline: None,
            tick_interval: Duration::from_secs(1),
            tx,
            rx,
            out,
        }
    }

    /// Length of one countdown time-unit.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn form(&self) -> &PredictionInput {
        &self.form
    }

    pub fn last_update(&self) -> Option<&str> {
        self.last_update.as_deref()
    }

    pub fn into_parts(self) -> (Session<C>, W) {
        (self.session, self.out)
    }

    /// Forward parsed lines from `input`, then `InputClosed`.
    pub fn spawn_input<R>(&self, input: R) -> io::Result<()>
    where
        R: BufRead + Send + 'static,
    {
        let tx = self.sender();
        thread::Builder::new()
            .name("fearcast-input".into())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = match Command::parse(&line) {
                        Ok(command) => AppEvent::Command(command),
                        Err(err) => AppEvent::Invalid(err),
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                let _ = tx.send(AppEvent::InputClosed);
            })
            .map(|_| ())
    }

    /// Process events until `quit`, or until input has closed and no worker is busy.
    pub fn run(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", self.session.status())?;
        loop {
            let event = match self.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(wait) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };
            let flow = match event {
                Some(event) => self.handle(event)?,
                None => Flow::Continue,
            };
            let flow = match flow {
                Flow::Continue => self.fire_due(Instant::now())?,
                Flow::Quit => Flow::Quit,
            };
            if flow == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, event: AppEvent) -> io::Result<Flow> {
        match event {
            AppEvent::Command(command) => return self.handle_command(command),
            AppEvent::Invalid(err) => {
                tracing::warn!("Ignoring input: {err}");
                writeln!(self.out, "[warning] {err}")?;
            }
            AppEvent::Epoch(report) => self.session.on_epoch(report),
            AppEvent::TrainingFinished(outcome) => {
                match self.session.finish_training(outcome) {
                    Ok(Some(delay)) => self.panel_deadline = Some(Instant::now() + delay),
                    Ok(None) => {}
                    Err(_) => return Ok(self.idle_flow()),
                }
                self.arm_ttl(Instant::now());
                writeln!(self.out, "{}", self.session.status())?;
            }
            AppEvent::Fetched(quote) => {
                self.fetch_in_flight = false;
                self.apply_quote(&quote);
                writeln!(self.out, "{}", self.session.status())?;
                if let Some(line) = &self.last_update {
                    writeln!(self.out, "{line}")?;
                }
            }
            AppEvent::InputClosed => self.input_closed = true,
        }
        Ok(self.idle_flow())
    }

    fn handle_command(&mut self, command: Command) -> io::Result<Flow> {
        match command {
            Command::Fetch => self.start_fetch(),
            Command::Train => self.start_training(),
            Command::Predict => {
                if let Ok(outcome) = self.session.predict(&self.form) {
                    writeln!(self.out, "{outcome}")?;
                }
            }
            Command::SetDate(value) => self.form.date = value,
            Command::SetPrice(value) => self.form.price = value,
            Command::SetVolume(value) => self.form.volume = value,
            Command::Status => return self.print_status().map(|()| Flow::Continue),
            Command::Help => {
                writeln!(self.out, "{HELP}")?;
                return Ok(Flow::Continue);
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        writeln!(self.out, "{}", self.session.status())?;
        Ok(Flow::Continue)
    }

    fn start_training(&mut self) {
        let Ok(run) = self.session.begin_training() else {
            return;
        };
        self.ttl_deadline = None;
        let run_id = run.run_id();
        let tx = self.sender();
        let spawned = thread::Builder::new()
            .name("fearcast-train".into())
            .spawn(move || {
                let progress = tx.clone();
                let outcome = run.execute(&mut |report| {
                    let _ = progress.send(AppEvent::Epoch(report));
                });
                let _ = tx.send(AppEvent::TrainingFinished(outcome));
            });
        if let Err(err) = spawned {
            tracing::error!("Failed to start training thread: {err}");
            let outcome = TrainingOutcome {
                run: run_id,
                result: Err(ClassifierError::Train(format!("could not start worker: {err}"))),
            };
            if let Ok(Some(delay)) = self.session.finish_training(outcome) {
                self.panel_deadline = Some(Instant::now() + delay);
            }
        }
    }

    fn start_fetch(&mut self) {
        if self.fetch_in_flight {
            tracing::warn!("Live data fetch already running");
            self.session
                .set_status("Live data fetch already running.", StatusTone::Warning);
            return;
        }
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.sender();
        let spawned = thread::Builder::new()
            .name("fearcast-fetch".into())
            .spawn(move || {
                let _ = tx.send(AppEvent::Fetched(fetcher.fetch()));
            });
        match spawned {
            Ok(_) => {
                self.fetch_in_flight = true;
                self.session.set_status("Fetching live data…", StatusTone::Info);
            }
            Err(err) => {
                tracing::warn!("Failed to start fetch thread: {err}");
                self.session
                    .set_status(format!("Live data fetch failed: {err}"), StatusTone::Warning);
            }
        }
    }

    fn apply_quote(&mut self, quote: &LiveQuote) {
        let (price, volume) = quote.form_values();
        self.form.price = price;
        self.form.volume = volume;
        self.last_update = Some(format!(
            "Last update: {} ({})",
            local_timestamp(quote.fetched_at),
            quote.source_name
        ));
        if quote.degraded {
            self.session.set_status(
                "Live data unavailable; using sample data.",
                StatusTone::Warning,
            );
        } else {
            self.session.set_status(
                format!("Live data loaded from {}.", quote.source_name),
                StatusTone::Success,
            );
        }
    }

    fn print_status(&mut self) -> io::Result<()> {
        let ttl = match self.session.ttl_remaining() {
            Some(remaining) => remaining.to_string(),
            None => "-".to_string(),
        };
        let backend = match self.session.backend() {
            Some(backend) => backend.to_string(),
            None => "-".to_string(),
        };
        writeln!(self.out, "{}", self.session.status())?;
        writeln!(
            self.out,
            "state={} ttl={ttl} backend={backend}",
            self.session.state()
        )?;
        writeln!(
            self.out,
            "form: date={} price={} volume={}",
            self.form.date, self.form.price, self.form.volume
        )?;
        if let Some(line) = &self.last_update {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.ttl_deadline, self.panel_deadline) {
            (Some(ttl), Some(panel)) => Some(ttl.min(panel)),
            (ttl, panel) => ttl.or(panel),
        }
    }

    /// Start the countdown clock if the session just entered `Trained`.
    fn arm_ttl(&mut self, now: Instant) {
        self.ttl_deadline = match self.session.state() {
            SessionState::Trained => Some(now + self.tick_interval),
            _ => None,
        };
    }

    /// Run every deadline that is due at `now`.
    fn fire_due(&mut self, now: Instant) -> io::Result<Flow> {
        if let Some(deadline) = self.ttl_deadline.filter(|deadline| *deadline <= now) {
            match self.session.tick() {
                TickOutcome::Counting { .. } => {
                    self.ttl_deadline = Some(deadline + self.tick_interval);
                }
                TickOutcome::Expired => {
                    self.ttl_deadline = None;
                    writeln!(self.out, "{}", self.session.status())?;
                }
                TickOutcome::Idle => self.ttl_deadline = None,
            }
        }
        if self.panel_deadline.is_some_and(|deadline| deadline <= now) {
            self.poll_panel();
        }
        Ok(self.idle_flow())
    }

    fn poll_panel(&mut self) {
        self.panel_deadline = self
            .session
            .poll_panel()
            .map(|delay| Instant::now() + delay);
    }

    fn idle_flow(&self) -> Flow {
        let busy = self.fetch_in_flight || self.session.state() == SessionState::Training;
        if self.input_closed && !busy && self.panel_deadline.is_none() {
            Flow::Quit
        } else {
            Flow::Continue
        }
    }
}

fn today() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    date_codec::format_date(now.date())
}

fn local_timestamp(at: OffsetDateTime) -> String {
    const FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    at.to_offset(offset)
        .format(FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
