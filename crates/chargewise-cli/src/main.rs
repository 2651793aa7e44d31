mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chargewise_core::{
    ArtifactPaths, IdentityResolver, Prefill, Region, Role, Sex, Smoker, UserDirectory, UserId,
    Viewer,
};
use chargewise_model::{FileArtifactStore, PredictionEngine};
use chargewise_service::{PredictionRequest, RequestContext, RequestError, RequestOrchestrator};
use chargewise_store::{DuckStore, NewUser};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chargewise", version)]
#[command(about = "Annual insurance charge estimates from a trained regression model")]
struct Cli {
    /// Directory holding insurance_model.json and rmse.json
    #[arg(long, global = true, env = "CHARGEWISE_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,

    /// Persistent DuckDB file (in-memory when absent)
    #[arg(long, global = true, env = "CHARGEWISE_DB")]
    db: Option<PathBuf>,

    /// Act as this user account (anonymous when absent)
    #[arg(long, global = true)]
    as_user: Option<UserId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a user account
    AddUser {
        email: String,

        /// client or advisor
        #[arg(long, default_value = "client")]
        role: Role,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// List the clients an advisor may select
    Clients,

    /// Show the form values pre-filled for the acting user
    Prefill {
        /// Client to act for (advisors only)
        #[arg(long)]
        subject: Option<UserId>,
    },

    /// Estimate a charge and record it
    Predict {
        /// Client to act for (advisors only)
        #[arg(long)]
        subject: Option<UserId>,

        #[command(flatten)]
        form: FormArgs,

        /// Do not record the request
        #[arg(long)]
        no_save: bool,
    },

    /// Show the predictions recorded for a contact email
    History { email: String },
}

/// Stored profile attributes for a new account.
#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    age: Option<u32>,
    #[arg(long)]
    gender: Option<Sex>,
    /// Kilograms
    #[arg(long)]
    weight: Option<f64>,
    /// Metres
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    children: Option<u32>,
    #[arg(long)]
    region: Option<Region>,
    #[arg(long)]
    smoker: Option<Smoker>,
}

/// Form fields. Anything left out is taken from the resolved subject's profile.
#[derive(Args)]
struct FormArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    age: Option<i64>,
    #[arg(long)]
    gender: Option<String>,
    /// Kilograms
    #[arg(long)]
    weight: Option<f64>,
    /// Metres
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    children: Option<i64>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    smoker: Option<String>,
}

impl FormArgs {
    fn into_request(self, prefill: &Prefill) -> anyhow::Result<PredictionRequest> {
        fn pick<T>(arg: Option<T>, prefilled: Option<T>, flag: &str) -> anyhow::Result<T> {
            arg.or(prefilled)
                .with_context(|| format!("missing --{flag} and no profile value to pre-fill"))
        }

        Ok(PredictionRequest {
            first_name: pick(self.first_name, prefill.first_name.clone(), "first-name")?,
            last_name: pick(self.last_name, prefill.last_name.clone(), "last-name")?,
            email: pick(self.email, prefill.email.clone(), "email")?,
            age: pick(self.age, prefill.age.map(i64::from), "age")?,
            gender: pick(self.gender, prefill.sex.map(|v| v.to_string()), "gender")?,
            smoker: pick(self.smoker, prefill.smoker.map(|v| v.to_string()), "smoker")?,
            weight: pick(self.weight, prefill.weight_kg, "weight")?,
            height: pick(self.height, prefill.height_m, "height")?,
            children: pick(self.children, prefill.children.map(i64::from), "children")?,
            region: pick(self.region, prefill.region.map(|v| v.to_string()), "region")?,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!("chargewise v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(cli.db.as_deref())?;
    let viewer = viewer_for(&store, cli.as_user)?;
    let resolver = IdentityResolver::new(&store);

    match cli.command {
        Command::AddUser {
            email,
            role,
            profile,
        } => {
            let user = NewUser {
                first_name: profile.first_name,
                last_name: profile.last_name,
                age: profile.age,
                sex: profile.gender,
                weight_kg: profile.weight,
                height_m: profile.height,
                smoker: profile.smoker,
                children: profile.children,
                region: profile.region,
                ..NewUser::new(email, role)
            };
            let id = store.insert_user(&user).context("creating user")?;
            println!("Created {role} {id}: {}", user.email);
        }

        Command::Clients => {
            if !resolver.is_privileged(&viewer) {
                bail!("only advisors can list clients; pass --as-user with an advisor id");
            }
            let clients = resolver.selectable_subjects(&viewer)?;
            display::print_clients(&clients);
        }

        Command::Prefill { subject } => {
            let resolution = resolver.resolve(&viewer, subject)?;
            display::print_prefill(&resolution);
        }

        Command::Predict {
            subject,
            form,
            no_save,
        } => {
            let resolution = resolver.resolve(&viewer, subject)?;
            let request = form.into_request(&resolution.prefill)?;

            let artifacts = FileArtifactStore::new(ArtifactPaths::in_dir(&cli.model_dir));
            let recorder = (!no_save).then_some(&store);
            let orchestrator = RequestOrchestrator::new(PredictionEngine::new(artifacts), recorder);
            let ctx = RequestContext::from_resolution(viewer, &resolution);

            match orchestrator.submit(&request, &ctx) {
                Ok(outcome) => display::print_outcome(&request, &outcome),
                Err(RequestError::Field(errors)) => {
                    display::print_field_errors(&errors);
                    bail!("request rejected: {} invalid field(s)", errors.len());
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("using model directory {}", cli.model_dir.display())
                    });
                }
            }
        }

        Command::History { email } => {
            let batches = store.predictions_for_email(&email)?;
            let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
            if rows == 0 {
                println!("No predictions recorded for {email}");
            } else {
                arrow::util::pretty::print_batches(&batches)?;
                println!("{rows} prediction(s)");
            }
        }
    }

    Ok(())
}

const IN_MEMORY_NOTICE: &str =
    "no --db given; users and predictions are kept in memory and discarded on exit";

fn open_store(db: Option<&Path>) -> anyhow::Result<DuckStore> {
    match db {
        Some(path) => DuckStore::open_persistent(path)
            .with_context(|| format!("opening database {}", path.display())),
        None => {
            tracing::info!("{IN_MEMORY_NOTICE}");
            DuckStore::open().context("opening in-memory database")
        }
    }
}

/// Anonymous without `--as-user`; otherwise the account's role decides.
fn viewer_for(store: &DuckStore, as_user: Option<UserId>) -> anyhow::Result<Viewer> {
    let Some(id) = as_user else {
        return Ok(Viewer::Anonymous);
    };
    let profile = store
        .profile(id)?
        .with_context(|| format!("no user with id {id}"))?;
    Ok(Viewer::authenticated(id, profile.role))
}
