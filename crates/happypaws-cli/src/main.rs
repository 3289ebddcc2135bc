//! Happy Paws CLI - a command-line client for the Happy Paws pet-care service.
//!
//! Every command restores the saved session first, so a login survives
//! between invocations.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use happypaws_core::api::PasswordReset;
use happypaws_core::{ApiClient, ApiError, AuthError, Config, SessionStatus, SessionStore};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for an optional rolling log file
const LOG_DIR_ENV: &str = "HAPPYPAWS_LOG_DIR";

const USAGE: &str = "\
Usage: happypaws <command> [args]

Commands:
  login [email]                  Sign in (prompts for the password)
  logout                         Forget the saved session
  whoami                         Show the signed-in user
  register <name> <email>        Create an account (prompts for the password)
  forgot-password <email>        Email a verification code
  reset-password <email> <code>  Set a new password with the emailed code
  pets                           List your pets
  pet-details <pet-id>           Health records for one pet
  reminders                      Upcoming reminders
  diseases [--mine]              Shared disease articles
  chat <message...>              Ask the pet-care assistant
  profile                        Profile with pet and article counts";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "happypaws.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let session = Arc::new(SessionStore::new(config.open_storage()?));
    let status = session.restore();
    debug!(?status, "Session restored");

    let api = ApiClient::new(&config, session.clone())?;

    let result = run(command, &args[1..], &api, &mut config).await;

    if let Err(e) = &result {
        if needs_login(e) && session.status() == SessionStatus::Anonymous {
            eprintln!("Your session has expired. Run `happypaws login` to sign in again.");
        }
    }
    result
}

fn needs_login(err: &anyhow::Error) -> bool {
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return api.requires_login();
    }
    matches!(err.downcast_ref::<AuthError>(), Some(AuthError::Api(api)) if api.requires_login())
}

async fn run(command: &str, args: &[String], api: &ApiClient, config: &mut Config) -> Result<()> {
    match command {
        "login" => login(api, config, args.first().cloned()).await,
        "logout" => {
            api.session().logout();
            println!("Signed out.");
            Ok(())
        }
        "whoami" => {
            match api.session().user() {
                Some(user) => {
                    println!("{} <{}>", user.display_name(), user.email);
                    if !user.roles.is_empty() {
                        println!("Roles: {}", user.roles.join(", "));
                    }
                }
                None => println!("Not signed in."),
            }
            Ok(())
        }
        "register" => {
            let (name, email) = match args {
                [name, email, ..] => (name, email),
                _ => anyhow::bail!("Usage: happypaws register <name> <email>"),
            };
            let password = rpassword::prompt_password("Password: ")?;
            api.register(name, email, &password).await?;
            println!("Account created. Run `happypaws login {}` to sign in.", email);
            Ok(())
        }
        "forgot-password" => {
            let email = args
                .first()
                .context("Usage: happypaws forgot-password <email>")?;
            api.forgot_password(email).await?;
            println!("A verification code was sent to {}.", email);
            Ok(())
        }
        "reset-password" => {
            let (email, code) = match args {
                [email, code, ..] => (email.clone(), code.clone()),
                _ => anyhow::bail!("Usage: happypaws reset-password <email> <code>"),
            };
            let new_password = rpassword::prompt_password("New password: ")?;
            api.reset_password(&PasswordReset {
                email,
                code,
                new_password,
            })
            .await?;
            println!("Password updated.");
            Ok(())
        }
        "pets" => {
            let pets = api.fetch_my_pets().await?;
            if pets.is_empty() {
                println!("No pets yet.");
            }
            for pet in pets {
                println!("{}  {}", pet.id, pet.summary());
            }
            Ok(())
        }
        "pet-details" => {
            let pet_id = args.first().context("Usage: happypaws pet-details <pet-id>")?;
            let details = api.fetch_pet_details(pet_id).await?;
            if details.is_empty() {
                println!("No records for this pet.");
            }
            for detail in details {
                println!(
                    "{}  {:<12} {}  {}",
                    detail.id,
                    detail.kind.label(),
                    format_date(detail.date),
                    detail.description
                );
                if let Some(notes) = detail.notes.filter(|n| !n.is_empty()) {
                    println!("    {}", notes);
                }
            }
            Ok(())
        }
        "reminders" => {
            let now = Utc::now();
            let mut reminders: Vec<_> = api
                .fetch_reminders()
                .await?
                .into_iter()
                .filter(|r| r.is_upcoming(now))
                .collect();
            reminders.sort_by_key(|r| r.date);
            if reminders.is_empty() {
                println!("No upcoming reminders.");
            }
            for reminder in reminders {
                println!(
                    "{}  {:<12} {}",
                    format_date(reminder.date),
                    reminder.kind.label(),
                    reminder.description
                );
            }
            Ok(())
        }
        "diseases" => {
            let mine = args.iter().any(|a| a == "--mine");
            let diseases = if mine {
                api.fetch_my_diseases().await?
            } else {
                api.fetch_all_diseases().await?
            };
            for disease in diseases {
                println!(
                    "{}  {} [{}] by {}",
                    disease.id,
                    disease.title,
                    disease.species.as_deref().unwrap_or("All Pets"),
                    disease.author()
                );
                if !disease.symptoms.is_empty() {
                    println!("    Symptoms: {}", disease.symptoms.join(", "));
                }
            }
            Ok(())
        }
        "chat" => {
            let message = args.join(" ");
            let reply = api.send_chat_message(&message).await?;
            println!("{}", reply);
            Ok(())
        }
        "profile" => {
            let (profile, pets, diseases) = futures::try_join!(
                api.fetch_profile(),
                api.fetch_my_pets(),
                api.fetch_my_diseases()
            )?;
            println!("{} <{}>", profile.display_name(), profile.email);
            if let Some(image) = &profile.profile_image_url {
                println!("Avatar: {}", image);
            }
            println!("Pets: {}", pets.len());
            println!("Articles: {}", diseases.len());
            for disease in diseases.iter().take(5) {
                println!("  - {}", disease.title);
            }
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

async fn login(api: &ApiClient, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let user = api.session().login(api, &email, &password).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    info!(user_id = %user.id, "Signed in");
    println!("Signed in as {}.", user.display_name());
    Ok(())
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
