use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vibe_check::aggregate::{self, DashboardQuery};
use vibe_check::api::BackendClient;
use vibe_check::cancel::CancelToken;
use vibe_check::code_store::CodeStore;
use vibe_check::config::Config;
use vibe_check::error::ApiError;
use vibe_check::forms::{
    EmojiForm, FormError, RedeemForm, RegistrationForm, ReleaseForm, Resident,
};
use vibe_check::guard::{self, GuardState, Route};
use vibe_check::models::{Emotion, Granularity, Kind, User};
use vibe_check::session::SessionContext;
use vibe_check::{import, report, schema};

#[derive(Parser)]
#[command(name = "vibe-check")]
#[command(about = "Classroom check-in codes and mood dashboards for Vibe Check", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sign-in address
    Login,
    /// End the current session
    Logout,
    /// Show who is signed in
    Whoami,
    /// List the emotion codes used by the survey
    Emotions,
    /// List classes known to the backend
    Classes,
    /// Open a check-in or check-out window and print its code
    Release {
        #[arg(long, value_parser = parse_kind)]
        kind: Kind,
        #[arg(long = "class")]
        class_name: String,
    },
    /// Verify the code shared by the teacher
    Redeem {
        #[arg(long)]
        code: String,
    },
    /// Record how you feel for the redeemed code
    Vibe {
        /// Code 1-9 or emotion name
        #[arg(long)]
        emotion: Option<String>,
    },
    /// Validate the student profile questionnaire
    Profile {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        sex: String,
        #[arg(long, value_enum)]
        resident: Option<ResidentArg>,
        #[arg(long, default_value = "")]
        self_regulation: String,
        #[arg(long, default_value = "")]
        likes: String,
        #[arg(long, default_value = "")]
        dislikes: String,
    },
    /// Chart emotions over time
    Dashboard {
        #[arg(long = "class", default_value = "all")]
        class_name: String,
        #[arg(long, default_value = "all")]
        kind: String,
        #[arg(long, default_value = "all", value_parser = parse_granularity)]
        granularity: Granularity,
        /// Aggregate a saved JSON or CSV export instead of the backend
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ResidentArg {
    Yes,
    No,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Txt,
    Csv,
    Markdown,
}

fn parse_kind(raw: &str) -> Result<Kind, String> {
    raw.parse()
}

fn parse_granularity(raw: &str) -> Result<Granularity, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let session = Arc::new(SessionContext::new());
    let client = BackendClient::new(&config, session).context("failed to set up the HTTP client")?;
    let store = CodeStore::new(&config.state_dir);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; cancelling in-flight requests");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Login => {
            let url = config.login_url().context("invalid login url")?;
            println!("Sign in with your Google account at {url}");
        }
        Commands::Logout => {
            let result = client.logout(&cancel).await;
            store.clear()?;
            result.map_err(with_retry_hint)?;
            println!("Session ended.");
        }
        Commands::Whoami => match client.session().current(&client, &cancel).await? {
            Some(user) => println!("{} <{}> ({})", user.name, user.email, user.role.as_str()),
            None => println!("Not signed in."),
        },
        Commands::Emotions => {
            for emotion in Emotion::ALL {
                println!("{} {} ({})", emotion.code(), emotion.label(), emotion.english());
            }
        }
        Commands::Classes => {
            require(Route::CheckIn, &client, &config, &cancel).await?;
            let classes = client.list_classes(&cancel).await.map_err(with_retry_hint)?;
            if classes.is_empty() {
                println!("No classes available.");
            }
            for class_name in classes {
                println!("- {class_name}");
            }
        }
        Commands::Release { kind, class_name } => {
            let route = match kind {
                Kind::CheckIn => Route::CheckIn,
                Kind::CheckOut => Route::CheckOut,
            };
            require(route, &client, &config, &cancel).await?;
            let form = ReleaseForm { kind, class_name };
            let code = form.submit(&client, &cancel).await.map_err(form_error)?;
            println!("{kind} released. Share this code with the class: {code}");
        }
        Commands::Redeem { code } => {
            require(Route::StudentCheck, &client, &config, &cancel).await?;
            RedeemForm { code }
                .submit(&client, &store, &cancel)
                .await
                .map_err(form_error)?;
            println!("Code accepted. Run `vibe-check vibe --emotion <1-9>` within 30 minutes.");
        }
        Commands::Vibe { emotion } => {
            require(Route::Emoji, &client, &config, &cancel).await?;
            let confirmation = EmojiForm { selection: emotion }
                .submit(&client, &store, &cancel)
                .await
                .map_err(form_error)?;
            println!("{} ({})", confirmation.message, confirmation.emotion.label());
        }
        Commands::Profile {
            date,
            sex,
            resident,
            self_regulation,
            likes,
            dislikes,
        } => {
            require(Route::Registration, &client, &config, &cancel).await?;
            let form = RegistrationForm {
                meeting_date: date,
                sex,
                ifpe_resident: resident.map(|r| match r {
                    ResidentArg::Yes => Resident::Yes,
                    ResidentArg::No => Resident::No,
                }),
                self_regulation,
                liked_genres: likes,
                disliked_genres: dislikes,
            };
            let payload = form
                .validate(Utc::now().date_naive())
                .map_err(|errors| form_error(errors.into()))?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Dashboard {
            class_name,
            kind,
            granularity,
            input,
            format,
            out,
        } => {
            let query = DashboardQuery {
                class: all_or(&class_name),
                kind: match kind.trim() {
                    "" => None,
                    raw if raw.eq_ignore_ascii_case("all") => None,
                    raw => Some(raw.parse::<Kind>().map_err(anyhow::Error::msg)?),
                },
                granularity,
            };

            let validated = match input {
                Some(path) => import::load_records(&path)?,
                None => {
                    require(Route::Dashboard, &client, &config, &cancel).await?;
                    let raw = client
                        .dashboard_records(&cancel)
                        .await
                        .map_err(with_retry_hint)?;
                    schema::validate_records(raw)
                }
            };

            let aggregation = aggregate::aggregate_checked(&validated.records, &query, &cancel)?;
            let rendered = match format {
                OutputFormat::Table => report::render_table(&aggregation.points),
                OutputFormat::Json => serde_json::to_string_pretty(&aggregation.points)?,
                OutputFormat::Txt => report::render_txt(&aggregation.points)?,
                OutputFormat::Csv => report::render_csv(&aggregation.points)?,
                OutputFormat::Markdown => {
                    report::build_report(&query, &aggregation, validated.rejected.len())
                }
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Dashboard written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }

            let dropped = validated.rejected.len() + aggregation.skipped.total();
            if dropped > 0 && format != OutputFormat::Markdown {
                let total = validated.records.len() + validated.rejected.len();
                eprintln!(
                    "note: {dropped} of {total} records were left out \
                     (unreadable rows, dates or emotion codes)"
                );
            }
        }
    }

    Ok(())
}

/// `all` (exactly, lowercase) or an empty value means no filter, so a class
/// literally named `All` can still be picked.
fn all_or(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "all" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn require(
    route: Route,
    client: &BackendClient,
    config: &Config,
    cancel: &CancelToken,
) -> anyhow::Result<User> {
    match guard::check(route, client, cancel).await? {
        GuardState::Authorized(Some(user)) => Ok(user),
        GuardState::Authorized(None) | GuardState::Checking => {
            bail!("{} needs a signed-in user", route.path())
        }
        GuardState::Unauthorized { .. } => {
            let role = route
                .required_role()
                .map(|role| role.as_str().to_string())
                .unwrap_or_default();
            let login = config
                .login_url()
                .map(|url| url.to_string())
                .unwrap_or_default();
            bail!("this command needs a {role} session; sign in at {login}")
        }
    }
}

fn with_retry_hint(err: ApiError) -> anyhow::Error {
    if err.is_cancelled() {
        return err.into();
    }
    anyhow::Error::new(err)
        .context("could not reach the Vibe Check backend; run the command again to retry")
}

fn form_error(err: FormError) -> anyhow::Error {
    match err {
        FormError::Invalid(errors) => {
            for (field, message) in errors.iter() {
                eprintln!("{field}: {message}");
            }
            anyhow::anyhow!("please fix the fields above")
        }
        FormError::Api(err) => with_retry_hint(err),
        FormError::Store(err) => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_or_empty_means_no_filter() {
        assert_eq!(all_or("all"), None);
        assert_eq!(all_or("  all "), None);
        assert_eq!(all_or(""), None);
    }

    #[test]
    fn all_or_keeps_class_names() {
        assert_eq!(all_or("INFO3"), Some("INFO3".to_string()));
        assert_eq!(all_or(" Turma A "), Some("Turma A".to_string()));
        assert_eq!(all_or("All"), Some("All".to_string()));
        assert_eq!(all_or("ALL"), Some("ALL".to_string()));
    }
}
