//! Administrative commands: schema migration and superuser creation.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smartnotify_common::config::AppConfig;
use smartnotify_common::db;
use smartnotify_engine::accounts::AccountService;

#[derive(Parser)]
#[command(name = "smartnotify-admin", about = "SmartNotify administrative commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Create a staff superuser
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Mobile number (`98` followed by eight digits)
        #[arg(long)]
        mobile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_filter(&["smartnotify_engine", "smartnotify_common"]))
        }))
        .init();

    let pool = db::create_pool(&config.database_url, 1).await?;

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&pool).await?;
        }
        Command::CreateSuperuser {
            email,
            password,
            mobile,
        } => {
            let user =
                AccountService::create_superuser(&pool, &email, &password, mobile.as_deref())
                    .await
                    .map_err(|e| anyhow::anyhow!("Could not create superuser: {}", e))?;
            println!("Superuser created successfully (id {}).", user.id);
        }
    }

    Ok(())
}
