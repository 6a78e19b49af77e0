//! EtnoApp field client
//!
//! Drives the offline flow from a terminal: sign in, choose a project and
//! role, write notes and contacts without connectivity, push them later.

use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use thiserror::Error;

use etnoapp_backend::client::auth::BaasAuth;
use etnoapp_backend::client::{flow, ClientError, SyncClient};
use etnoapp_backend::config::ClientConfig;
use etnoapp_backend::local::guard::{check_access, GuardOutcome};
use etnoapp_backend::local::{LocalStore, StoreError};
use etnoapp_backend::logging;

#[derive(Parser)]
#[command(name = "etno-field")]
#[command(about = "Offline field client for EtnoApp")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Sync proxy base URL
    #[arg(long, global = true, env = "ETNO_PROXY_URL")]
    proxy_url: Option<String>,

    /// Supabase project URL, used for sign-in
    #[arg(long, global = true, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase anon key, used for sign-in
    #[arg(long, global = true, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    /// Local database file
    #[arg(long, global = true, env = "ETNO_DB_PATH")]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password, then download catalogs
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show where the app would land
    Guard,
    /// List cached projects
    Proyectos,
    /// List cached user types
    TiposUsuario,
    /// Select project and role
    Context {
        #[arg(long)]
        proyecto: i64,
        #[arg(long)]
        tipo_usuario: i64,
    },
    /// Notes stored on this device
    Nota {
        #[command(subcommand)]
        command: NotaCommands,
    },
    /// Contacts linked on this device
    Contacto {
        #[command(subcommand)]
        command: ContactoCommands,
    },
    /// Upload every pending record
    Push,
    /// Forget the selected context and session
    Logout,
}

#[derive(Subcommand)]
enum NotaCommands {
    Add {
        #[arg(short, long)]
        titulo: String,
        #[arg(short, long)]
        cuerpo: String,
        /// Local id of a linked contact
        #[arg(long)]
        contacto: Option<i64>,
    },
    List,
}

#[derive(Subcommand)]
enum ContactoCommands {
    Add {
        #[arg(long)]
        id_contacto: String,
        #[arg(long, default_value = "2")]
        tipo_archivo: i64,
    },
    List,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0} is not set")]
    MissingSetting(&'static str),
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(url) = &self.proxy_url {
            config.proxy_url = url.clone();
        }
        if self.supabase_url.is_some() {
            config.supabase_url = self.supabase_url.clone();
        }
        if self.anon_key.is_some() {
            config.anon_key = self.anon_key.clone();
        }
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init_console();

    let cli = Cli::parse();
    let config = cli.config();

    match execute(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, config: &ClientConfig) -> Result<(), CliError> {
    let store = LocalStore::open(&config.db_path);
    store.initialize().await?;

    match command {
        Commands::Login { email, password } => {
            let supabase_url = config
                .supabase_url
                .as_deref()
                .ok_or(CliError::MissingSetting("SUPABASE_URL"))?;
            let anon_key = config
                .anon_key
                .as_deref()
                .ok_or(CliError::MissingSetting("SUPABASE_ANON_KEY"))?;

            let session = BaasAuth::new(supabase_url, anon_key)?
                .sign_in_with_password(&email, &password)
                .await?;
            let client = SyncClient::new(&config.proxy_url)?;
            let sync = flow::login(&store, &client, &session).await?;

            println!("Signed in as {}", session.user_id);
            println!("  proyectos visibles: {}", sync.proyectos_visibles.len());
            println!("  tipos de usuario  : {}", sync.tipo_usuario.len());
            println!("  tipos de archivo  : {}", sync.tipo_archivo.len());
        }
        Commands::Guard => match check_access(&store, Utc::now()).await? {
            GuardOutcome::RedirectLogin => println!("login"),
            GuardOutcome::RedirectSelectProyecto => println!("select-proyecto"),
            GuardOutcome::Allow(context) => println!(
                "home (proyecto {}, tipo usuario {})",
                context.id_proyecto, context.id_tipo_usuario
            ),
        },
        Commands::Proyectos => {
            for p in store.get_proyectos().await? {
                println!("{:>6}  {}", p.id_proyecto, p.nombre_proyecto);
            }
        }
        Commands::TiposUsuario => {
            for t in store.get_tipos_usuario().await? {
                println!("{:>6}  {}", t.id_tipo_usuario, t.nombre_tipo);
            }
        }
        Commands::Context {
            proyecto,
            tipo_usuario,
        } => {
            let context = flow::select_context(&store, proyecto, tipo_usuario).await?;
            println!(
                "Context set: proyecto {}, tipo usuario {}",
                context.id_proyecto, context.id_tipo_usuario
            );
        }
        Commands::Nota { command } => match command {
            NotaCommands::Add {
                titulo,
                cuerpo,
                contacto,
            } => {
                let id = flow::save_nota(&store, &titulo, &cuerpo, contacto).await?;
                println!("Nota guardada offline ({})", id);
            }
            NotaCommands::List => {
                for n in store.get_notas_locales().await? {
                    println!(
                        "{:>6}  {}  [{}]  {}",
                        n.id_archivo_local, n.fecha_creacion, n.estado_carga, n.titulo
                    );
                }
            }
        },
        Commands::Contacto { command } => match command {
            ContactoCommands::Add {
                id_contacto,
                tipo_archivo,
            } => {
                let id = flow::save_contacto(&store, &id_contacto, tipo_archivo).await?;
                println!("Contacto guardado offline ({})", id);
            }
            ContactoCommands::List => {
                for c in store.get_contactos_locales().await? {
                    println!(
                        "{:>6}  {}  [{}]  {}",
                        c.id_archivo_local, c.fecha_creacion, c.estado_carga, c.id_contacto
                    );
                }
            }
        },
        Commands::Push => {
            let client = SyncClient::new(&config.proxy_url)?;
            let report = flow::push_pending(&store, &client).await?;
            for r in &report.uploaded {
                println!("{:>6}  -> {}  {}", r.id_archivo_local, r.id_archivo_cloud, r.path);
            }
            for f in &report.failed {
                match f.id_archivo_cloud {
                    Some(cloud) => println!(
                        "{:>6}  uploaded as {} but still pending locally: {}",
                        f.id_archivo_local, cloud, f.error
                    ),
                    None => println!("{:>6}  failed: {}", f.id_archivo_local, f.error),
                }
            }
            println!(
                "{} uploaded, {} failed",
                report.uploaded.len(),
                report.failed.len()
            );
        }
        Commands::Logout => {
            flow::logout(&store).await?;
            println!("Signed out");
        }
    }
    Ok(())
}
