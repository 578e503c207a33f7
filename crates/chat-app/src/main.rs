use std::io::Write as _;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;
use tutor::chat::{InputRejection, MessageInput, MessageList};
use tutor::notification::{EMPTY_QUESTION_MESSAGE, ERROR_TITLE};
use tutor::settings::{Settings, SettingsStore};
use tutor::terminal::{
    Command, format_age_group_menu, format_sources, parse_age_group_choice, render_frame,
    status_line,
};
use tutor::{AgeGroup, Notification, SessionError, TurnProgress, TutorSession};
use tutor_llm::{ChatEventStream, HttpBackend, StreamEventMapped};

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();
    let backend = match HttpBackend::new(settings.to_backend_config()) {
        Ok(backend) => Arc::new(backend),
        Err(error) => {
            tracing::error!(error = %error, "failed to initialize tutoring backend");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(base_url = %settings.endpoints.base_url, "tutoring backend ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let Some(age_group) = prompt_age_group(&mut lines, settings.age_group).await else {
        return ExitCode::SUCCESS;
    };
    remember_age_group(&settings_store, &settings, age_group);

    let mut session = TutorSession::new(backend, age_group);
    let list = Arc::new(Mutex::new(MessageList::new(
        settings.viewport_rows,
        settings.viewport_columns,
    )));
    let sink = list.clone();
    session.transcript_mut().subscribe(move |snapshot| {
        with_list(&sink, |list| list.set_messages(snapshot.clone()));
    });

    let Some(mut active) = start_topic(&mut session, &mut lines, &list).await else {
        return ExitCode::SUCCESS;
    };
    with_list(&list, |list| list.reset_scroll_tracking());
    redraw(&session, &list);

    let mut input = MessageInput::new();
    loop {
        input.set_disabled(session.is_loading());

        tokio::select! {
            event = next_event(&mut active) => {
                let progress = match event {
                    Some(event) => session.handle_stream_event(event),
                    None => match active.take() {
                        Some(stream) => session.handle_stream_closed(stream.target()),
                        None => TurnProgress::Ignored,
                    },
                };
                if matches!(progress, TurnProgress::Completed(_) | TurnProgress::Failed { .. }) {
                    active = None;
                }
                with_list(&list, |list| list.set_loading(session.is_loading()));
                redraw(&session, &list);
                flush_notifications(&mut session);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::error!(error = %error, "failed to read from stdin");
                        return ExitCode::FAILURE;
                    }
                };

                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::Sources => println!("{}", format_sources(session.sources())),
                    Command::ScrollUp(step) => {
                        with_list(&list, |list| list.scroll_up(step));
                        redraw(&session, &list);
                    }
                    Command::ScrollDown(step) => {
                        with_list(&list, |list| list.scroll_down(step));
                        redraw(&session, &list);
                    }
                    Command::Message(text) => {
                        input.set_draft(text);
                        match input.submit() {
                            Ok(question) => match session.send_follow_up(&question) {
                                Ok(stream) => {
                                    active = Some(stream);
                                    with_list(&list, |list| list.set_loading(true));
                                    redraw(&session, &list);
                                }
                                Err(error) => tracing::debug!(error = %error, "follow-up rejected"),
                            },
                            Err(InputRejection::Disabled) => {
                                eprintln!("{}", Notification::info("Busy", "wait for the current answer to finish"));
                            }
                            Err(InputRejection::Blank) => {
                                eprintln!("{}", Notification::error(ERROR_TITLE, EMPTY_QUESTION_MESSAGE));
                            }
                        }
                        flush_notifications(&mut session);
                    }
                }
            }
        }
    }

    ExitCode::SUCCESS
}

async fn prompt_age_group(lines: &mut InputLines, current: AgeGroup) -> Option<AgeGroup> {
    println!("{}", format_age_group_menu());
    loop {
        print!("Age group [{current}]: ");
        flush_stdout();
        let line = read_line(lines).await?;
        match parse_age_group_choice(&line, current) {
            Some(age_group) => return Some(age_group),
            None => eprintln!("unknown age group '{}'", line.trim()),
        }
    }
}

fn remember_age_group(store: &SettingsStore, settings: &Settings, age_group: AgeGroup) {
    if settings.age_group == age_group {
        return;
    }

    let mut next = settings.clone();
    next.age_group = age_group;
    if let Err(error) = store.update(next) {
        tracing::warn!(path = ?store.config_path(), error = %error, "failed to save age group");
    }
}

/// Asks for a topic until one starts a chat turn. `None` means stdin closed.
async fn start_topic(
    session: &mut TutorSession,
    lines: &mut InputLines,
    list: &Mutex<MessageList>,
) -> Option<Option<ChatEventStream>> {
    loop {
        print!("What would you like to learn about? ");
        flush_stdout();
        let line = read_line(lines).await?;

        with_list(list, |list| list.set_loading(true));
        let result = session.start_topic(&line).await;
        with_list(list, |list| list.set_loading(session.is_loading()));
        flush_notifications(session);

        match result {
            Ok(stream) => return Some(Some(stream)),
            Err(SessionError::Validation { .. }) => continue,
            Err(error) => {
                tracing::debug!(error = %error, "topic started without an answer");
                return Some(None);
            }
        }
    }
}

async fn read_line(lines: &mut InputLines) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(error) => {
            tracing::error!(error = %error, "failed to read from stdin");
            None
        }
    }
}

/// Next event of the active turn; `None` once its channel closes. Pends forever when idle.
async fn next_event(active: &mut Option<ChatEventStream>) -> Option<StreamEventMapped> {
    match active {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

fn with_list<R>(list: &Mutex<MessageList>, f: impl FnOnce(&mut MessageList) -> R) -> R {
    let mut guard = list.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

fn redraw(session: &TutorSession, list: &Mutex<MessageList>) {
    let mut frame = String::new();
    let rendered = with_list(list, |list| {
        let status = status_line(session.is_loading(), list.is_following_bottom());
        render_frame(&mut frame, session.topic(), session.age_group(), list, &status)
    });
    if rendered.is_ok() {
        print!("{frame}");
        flush_stdout();
    }
}

fn flush_notifications(session: &mut TutorSession) {
    for notification in session.notifications_mut().drain() {
        eprintln!("{notification}");
    }
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}
