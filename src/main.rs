use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tickler::config::AppConfig;
use tickler::domain::reminder::ReminderType;
use tickler::domain::timestamp;
use tickler::domain::todo::TodoUpdate;
use tickler::repository::Repository;
use tickler::repository::session_store::SessionStore;
use tickler::services::command_executor::SystemCommandExecutor;
use tickler::services::error_handling::UserErrorFormatter;
use tickler::services::notifier::{DesktopNotifier, LogNotifier, Notifier, NotifierProgram};
use tickler::services::{
    AuthService, EmailService, PollerSettings, ReminderPoller, ReminderService, TodoService,
};

/// Todo client with email and desktop reminders.
#[derive(Parser)]
#[command(name = "tickler", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session.
    Login {
        username_or_email: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a new account and log in with it.
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the saved session.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// Manage todos.
    #[command(subcommand)]
    Todos(TodoCommand),
    /// Manage reminders of a todo.
    #[command(subcommand)]
    Reminders(ReminderCommand),
    /// Send emails through the backend.
    #[command(subcommand)]
    Email(EmailCommand),
    /// Watch for due reminders until interrupted.
    Watch {
        /// Log notifications instead of showing them on the desktop.
        #[arg(long)]
        no_desktop: bool,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
enum TodoCommand {
    List,
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// `YYYY-MM-DD HH:MM` (local), RFC 3339, or relative like `+2h`.
        #[arg(long)]
        due: Option<String>,
    },
    /// Toggle the completed flag.
    Done { id: i64 },
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ReminderCommand {
    List {
        todo_id: i64,
    },
    Add {
        todo_id: i64,
        /// `YYYY-MM-DD HH:MM` (local), RFC 3339, or relative like `+15m`.
        at: String,
        /// email, desktop or both
        #[arg(short = 't', long = "type", default_value = "email")]
        reminder_type: ReminderType,
    },
    /// Move a reminder to a new time or channel.
    Update {
        todo_id: i64,
        id: i64,
        at: String,
        /// email or desktop
        #[arg(short = 't', long = "type", default_value = "email")]
        reminder_type: ReminderType,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum EmailCommand {
    Send {
        to: String,
        subject: String,
        message: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tickler=info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("{}", UserErrorFormatter::format_for_ui(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };

    let session = Arc::new(SessionStore::open(config.session_file()?));
    let repository = Arc::new(Repository::from_config(&config, session.clone())?);

    match cli.command {
        Command::Login {
            username_or_email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let session = AuthService::new(repository)
                .login(&username_or_email, &password)
                .await?;
            println!("Logged in as {} <{}>", session.username, session.email);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let session = AuthService::new(repository)
                .register_and_login(&username, &email, &password)
                .await?;
            println!(
                "Registered and logged in as {} <{}>",
                session.username, session.email
            );
        }
        Command::Logout => {
            AuthService::new(repository).logout()?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = AuthService::new(repository).current_user().await?;
            println!("{} <{}> (id {})", user.username, user.email, user.id);
        }
        Command::Todos(command) => run_todos(TodoService::new(repository), command).await?,
        Command::Reminders(command) => {
            run_reminders(ReminderService::new(repository), command).await?
        }
        Command::Email(EmailCommand::Send {
            to,
            subject,
            message,
        }) => {
            EmailService::new(repository)
                .send(&to, &subject, &message)
                .await?;
            println!("Email sent to {}", to);
        }
        Command::Watch { no_desktop } => watch(&config, repository, no_desktop).await?,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            println!("# session file: {:?}", config.session_file()?);
        }
    }

    Ok(())
}

async fn run_todos(service: TodoService, command: TodoCommand) -> Result<()> {
    match command {
        TodoCommand::List => {
            let todos = service.list().await?;
            if todos.is_empty() {
                println!("No todos yet");
            }
            let now = Utc::now();
            for todo in todos {
                let mark = if todo.completed { "x" } else { " " };
                let due = todo
                    .due_date
                    .map(|d| format!("  due {}", d.with_timezone(&Local).format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default();
                let overdue = if todo.is_overdue(now) { "  (overdue)" } else { "" };
                println!("[{}] #{} {}{}{}", mark, todo.id, todo.title, due, overdue);
            }
        }
        TodoCommand::Add {
            title,
            description,
            due,
        } => {
            let due = due.map(|raw| parse_when(&raw, Utc::now())).transpose()?;
            let todo = service.create(&title, description, due).await?;
            println!("Created todo #{}", todo.id);
        }
        TodoCommand::Done { id } => {
            let todo = service.toggle_completed(id).await?;
            let state = if todo.completed { "done" } else { "open" };
            println!("Todo #{} is now {}", todo.id, state);
        }
        TodoCommand::Update {
            id,
            title,
            description,
            due,
        } => {
            let update = TodoUpdate {
                title,
                description,
                due_date: due.map(|raw| parse_when(&raw, Utc::now())).transpose()?,
                completed: None,
            };
            let todo = service.update(id, update).await?;
            println!("Updated todo #{}", todo.id);
        }
        TodoCommand::Delete { id } => {
            service.delete(id).await?;
            println!("Deleted todo #{}", id);
        }
    }
    Ok(())
}

async fn run_reminders(service: ReminderService, command: ReminderCommand) -> Result<()> {
    match command {
        ReminderCommand::List { todo_id } => {
            for reminder in service.list(todo_id).await? {
                let state = if reminder.triggered { "sent" } else { "pending" };
                println!(
                    "#{} {} via {} ({})",
                    reminder.id,
                    reminder.remind_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    reminder.reminder_type,
                    state
                );
            }
        }
        ReminderCommand::Add {
            todo_id,
            at,
            reminder_type,
        } => {
            let now = Utc::now();
            let remind_at = parse_when(&at, now)?;
            let created = service
                .create(todo_id, remind_at, reminder_type, now)
                .await?;
            for reminder in created {
                println!(
                    "Scheduled {} reminder #{} for {}",
                    reminder.reminder_type,
                    reminder.id,
                    timestamp::format(&reminder.remind_at)
                );
            }
        }
        ReminderCommand::Update {
            todo_id,
            id,
            at,
            reminder_type,
        } => {
            let now = Utc::now();
            let remind_at = parse_when(&at, now)?;
            let reminder = service
                .update(todo_id, id, remind_at, reminder_type, now)
                .await?;
            println!(
                "Reminder #{} now fires via {} at {}",
                reminder.id,
                reminder.reminder_type,
                timestamp::format(&reminder.remind_at)
            );
        }
        ReminderCommand::Delete { id } => {
            service.delete(id).await?;
            println!("Deleted reminder #{}", id);
        }
    }
    Ok(())
}

async fn watch(config: &AppConfig, repository: Arc<Repository>, no_desktop: bool) -> Result<()> {
    let notifier: Arc<dyn Notifier> = if no_desktop {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier::new(
            Arc::new(SystemCommandExecutor),
            NotifierProgram::for_current_platform(),
        ))
    };

    let session = repository.session().clone();
    if session.current().and_then(|s| s.identity()).is_none() {
        println!("Not logged in yet; waiting for a session (run `tickler login`).");
    }

    let poller = Arc::new(ReminderPoller::new(
        repository,
        notifier,
        PollerSettings::from(config),
    ));
    info!(
        interval_secs = poller.settings().interval.as_secs(),
        "Watching for due reminders, press Ctrl+C to stop"
    );
    let handle = poller.start(session.subscribe());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down...");
    handle.shutdown().await;
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("TICKLER_PASSWORD") {
        return Ok(password);
    }

    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;
    enable_raw_mode().context("Failed to read password from terminal")?;
    let password = read_hidden();
    disable_raw_mode()?;
    eprintln!();
    password
}

enum PasswordInput {
    Pending,
    Done,
    Cancelled,
}

/// Reads key presses until Enter without echoing them. Raw mode must be on.
fn read_hidden() -> Result<String> {
    let mut password = String::new();
    loop {
        if let Event::Key(key) = event::read()? {
            match apply_password_key(&mut password, key) {
                PasswordInput::Pending => {}
                PasswordInput::Done => return Ok(password),
                PasswordInput::Cancelled => anyhow::bail!("Password entry cancelled"),
            }
        }
    }
}

fn apply_password_key(password: &mut String, key: KeyEvent) -> PasswordInput {
    if key.kind == KeyEventKind::Release {
        return PasswordInput::Pending;
    }
    match key.code {
        KeyCode::Enter => PasswordInput::Done,
        KeyCode::Esc => PasswordInput::Cancelled,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            PasswordInput::Cancelled
        }
        KeyCode::Backspace => {
            password.pop();
            PasswordInput::Pending
        }
        KeyCode::Char(c) => {
            password.push(c);
            PasswordInput::Pending
        }
        _ => PasswordInput::Pending,
    }
}

/// Accepts `+15m` / `+2h` / `+1d`, RFC 3339, or a local `YYYY-MM-DD HH:MM`.
fn parse_when(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(relative) = raw.strip_prefix('+') {
        let Some((split, _)) = relative.char_indices().last() else {
            anyhow::bail!("Invalid relative time '{}'", raw);
        };
        let (amount, unit) = relative.split_at(split);
        let amount: i64 = amount
            .parse()
            .with_context(|| format!("Invalid relative time '{}'", raw))?;
        let offset = match unit {
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            _ => anyhow::bail!("Invalid relative time '{}' (use m, h or d)", raw),
        };
        return offset
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(|| anyhow::anyhow!("Relative time '{}' is out of range", raw));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD HH:MM)", raw))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| anyhow::anyhow!("Ambiguous local time '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_times() {
        let now = Utc::now();
        assert_eq!(parse_when("+15m", now).unwrap(), now + Duration::minutes(15));
        assert_eq!(parse_when("+2h", now).unwrap(), now + Duration::hours(2));
        assert_eq!(parse_when("+1d", now).unwrap(), now + Duration::days(1));
        assert!(parse_when("+5y", now).is_err());
        assert!(parse_when("+m", now).is_err());
    }

    #[test]
    fn test_parse_relative_out_of_range_is_an_error() {
        let now = Utc::now();
        let err = parse_when("+99999999999999d", now).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(parse_when("+9223372036854775807m", now).is_err());
        // Representable offset, but past the last representable date
        assert!(parse_when("+100000000d", now).is_err());
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_password_keys_edit_buffer() {
        let mut password = String::new();
        for c in "hunter3".chars() {
            assert!(matches!(
                apply_password_key(&mut password, key(KeyCode::Char(c))),
                PasswordInput::Pending
            ));
        }
        apply_password_key(&mut password, key(KeyCode::Backspace));
        apply_password_key(&mut password, key(KeyCode::Char('2')));

        assert!(matches!(
            apply_password_key(&mut password, key(KeyCode::Enter)),
            PasswordInput::Done
        ));
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn test_password_entry_can_be_cancelled() {
        let mut password = String::from("abc");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(
            apply_password_key(&mut password, ctrl_c),
            PasswordInput::Cancelled
        ));
        assert!(matches!(
            apply_password_key(&mut password, key(KeyCode::Esc)),
            PasswordInput::Cancelled
        ));
        assert_eq!(password, "abc");
    }

    #[test]
    fn test_parse_absolute_times() {
        let now = Utc::now();
        let rfc = parse_when("2030-01-02T03:04:05Z", now).unwrap();
        assert_eq!(timestamp::format(&rfc), "2030-01-02T03:04:05.000Z");
        assert!(parse_when("2030-01-02 03:04", now).is_ok());
        assert!(parse_when("next tuesday", now).is_err());
    }
}
