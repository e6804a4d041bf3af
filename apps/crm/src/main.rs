mod config;
mod render;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    clamp_page, fetch_customer, fetch_summary, loaders::require_data, ClientError,
    CredentialProvider, CustomerApi, CustomerClient, CustomerForm, HttpTransport,
    ImportOrchestrator, ImportUpload, QueryController, QueryState, StaticToken, TokenStore,
};
use serde::Serialize;
use shared::{
    domain::{CustomerId, ImportId},
    error::{ApiError, ErrorKind},
    protocol::{FilterKey, FilterSet, ImportHandle, ImportOptions},
};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crm", about = "Customer dashboard client")]
struct Args {
    /// Server base url; `/api` is appended.
    #[arg(long)]
    api_url: Option<String>,
    /// Bearer token for this invocation only.
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    token_file: Option<PathBuf>,
    /// Print raw JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List(ListArgs),
    Get {
        id: String,
    },
    Create(CustomerFields),
    Update {
        id: String,
        #[command(flatten)]
        fields: CustomerFields,
    },
    Delete {
        id: String,
    },
    Summary,
    #[command(subcommand)]
    Import(ImportCommand),
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    size: Option<u32>,
    #[arg(long, default_value = "")]
    search: String,
    /// `key=value`, e.g. `gender=female` or `minAge=30`. Repeatable.
    #[arg(long = "filter")]
    filters: Vec<String>,
}

#[derive(ClapArgs, Debug, Default)]
struct CustomerFields {
    #[arg(long)]
    number: Option<String>,
    #[arg(long)]
    location_name: Option<String>,
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    login_hour: Option<String>,
    #[arg(long)]
    user_name: Option<String>,
    #[arg(long)]
    birth_year: Option<String>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone_number: Option<String>,
    #[arg(long)]
    device_brand: Option<String>,
    #[arg(long)]
    digital_interest: Option<String>,
    #[arg(long)]
    location_type: Option<String>,
}

impl From<CustomerFields> for CustomerForm {
    fn from(fields: CustomerFields) -> Self {
        CustomerForm {
            number: fields.number,
            location_name: fields.location_name,
            date: fields.date,
            login_hour: fields.login_hour,
            user_name: fields.user_name,
            birth_year: fields.birth_year,
            gender: fields.gender,
            email: fields.email,
            phone_number: fields.phone_number,
            device_brand: fields.device_brand,
            digital_interest: fields.digital_interest,
            location_type: fields.location_type,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ImportCommand {
    Submit {
        file: PathBuf,
        #[arg(long)]
        skip_validation: bool,
        #[arg(long)]
        continue_on_error: Option<bool>,
        #[arg(long)]
        batch_size: Option<u32>,
        /// Keep polling until the job finishes.
        #[arg(long)]
        watch: bool,
    },
    Status {
        id: String,
    },
    Cancel {
        id: String,
    },
    Active,
    Watch {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    Set { token: String },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let json = args.json;

    match run(args).await {
        Err(err) if json => {
            eprintln!("{}", serde_json::to_string_pretty(&error_report(&err))?);
            std::process::exit(1);
        }
        result => result,
    }
}

/// Machine-readable form of a failure for `--json` output.
fn error_report(err: &anyhow::Error) -> ApiError {
    match err.downcast_ref::<ClientError>() {
        Some(client) => ApiError::from(client),
        None => ApiError::new(ErrorKind::Client, format!("{err:#}")),
    }
}

async fn run(args: Args) -> Result<()> {
    let mut settings = config::load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    if let Some(token_file) = args.token_file {
        settings.token_file = token_file;
    }
    debug!(
        api_url = %settings.api_url,
        token_file = %settings.token_file.display(),
        "settings loaded"
    );

    let store = TokenStore::new(settings.token_file.clone());
    if let Command::Token(command) = args.command {
        return match command {
            TokenCommand::Set { token } => {
                store.save(&token)?;
                println!("Token saved to {}", store.path().display());
                Ok(())
            }
            TokenCommand::Clear => {
                store.clear()?;
                println!("Token cleared");
                Ok(())
            }
        };
    }

    let credentials: Arc<dyn CredentialProvider> = match args.token {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => Arc::new(store),
    };
    let transport = HttpTransport::new(settings.transport_config(), credentials)?;
    let api = Arc::new(CustomerClient::new(transport));
    let json = args.json;

    match args.command {
        Command::List(list) => run_list(api, list, settings.page_size, json).await,
        Command::Get { id } => {
            let customer = fetch_customer(api.as_ref(), &CustomerId::new(id))
                .await?
                .ok_or_else(|| anyhow!("customer id is required"))?;
            if json {
                print_json(&customer)
            } else {
                println!("{}", render::customer_detail(&customer));
                Ok(())
            }
        }
        Command::Create(fields) => {
            let request = CustomerForm::from(fields).into_create_request()?;
            let envelope = api.create(&request).await?;
            let message = envelope.message.clone();
            let customer = require_data(envelope, "Failed to create customer")?;
            if json {
                print_json(&customer)
            } else {
                println!("{message}");
                println!("{}", render::customer_detail(&customer));
                Ok(())
            }
        }
        Command::Update { id, fields } => {
            let request = CustomerForm::from(fields).into_update_request()?;
            if request.is_empty() {
                bail!("nothing to update; pass at least one field");
            }
            let envelope = api.update(&CustomerId::new(id), &request).await?;
            let customer = require_data(envelope, "Failed to update customer")?;
            if json {
                print_json(&customer)
            } else {
                println!("{}", render::customer_detail(&customer));
                Ok(())
            }
        }
        Command::Delete { id } => {
            let id = CustomerId::new(id);
            let envelope = api.delete(&id).await.inspect_err(|err| {
                error!(customer_id = %id, error = %err, "delete failed");
            })?;
            if !envelope.success {
                bail!(non_blank_or(&envelope.message, "Failed to delete customer"));
            }
            println!("{}", non_blank_or(&envelope.message, "Customer deleted"));
            Ok(())
        }
        Command::Summary => {
            let summary = fetch_summary(api.as_ref()).await?;
            if json {
                print_json(&summary)
            } else {
                print!("{}", render::summary(&summary));
                Ok(())
            }
        }
        Command::Import(command) => run_import(api, command, &settings, json).await,
        Command::Token(_) => Ok(()),
    }
}

async fn run_list(
    api: Arc<CustomerClient>,
    list: ListArgs,
    default_size: u32,
    json: bool,
) -> Result<()> {
    let filters = parse_filters(&list.filters)?;
    let controller = QueryController::with_state(
        api,
        QueryState {
            page: list.page.max(1),
            size: list.size.unwrap_or(default_size),
            search: list.search,
            filters,
        },
    );
    controller.refetch().await;

    let mut view = controller.view().await;
    let page = controller.state().await.page;
    if view.error.is_none() && view.total_pages > 0 && page > view.total_pages {
        controller.set_page(clamp_page(page, view.total_pages)).await;
        view = controller.view().await;
    }

    let state = controller.state().await;
    let status = controller.status_message().await;
    if let Some(error) = &view.error {
        bail!(error.clone());
    }

    if json {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ListOutput<'a> {
            page: u32,
            size: u32,
            total_pages: u32,
            total_customers: u64,
            items: &'a [shared::protocol::CustomerRecord],
            summary: Option<&'a shared::protocol::CustomerSummary>,
        }
        return print_json(&ListOutput {
            page: state.page,
            size: state.size,
            total_pages: view.total_pages,
            total_customers: view.total_customers,
            items: &view.customers,
            summary: view.summary.as_ref(),
        });
    }

    if !view.customers.is_empty() {
        print!("{}", render::customer_table(&view));
    }
    println!("{status}");
    if let Some(pager) = render::pager(state.page, view.total_pages) {
        println!("{pager}");
    }
    Ok(())
}

fn parse_filters(raw: &[String]) -> Result<FilterSet> {
    let mut filters = FilterSet::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("filter '{entry}' must look like key=value"))?;
        let key: FilterKey = key.trim().parse()?;
        filters.set(key, value.trim());
    }
    Ok(filters)
}

async fn run_import(
    api: Arc<CustomerClient>,
    command: ImportCommand,
    settings: &config::Settings,
    json: bool,
) -> Result<()> {
    let imports = ImportOrchestrator::new(api);
    let report = |job: &shared::protocol::ImportJobSnapshot| {
        if json {
            if let Ok(line) = serde_json::to_string(job) {
                println!("{line}");
            }
        } else {
            println!("{}", render::import_job(job));
        }
    };

    match command {
        ImportCommand::Submit {
            file,
            skip_validation,
            continue_on_error,
            batch_size,
            watch,
        } => {
            let upload = ImportUpload::from_path(&file).await?;
            let options = ImportOptions {
                skip_validation,
                continue_on_error,
                batch_size,
            };
            let handle = imports
                .submit(upload, &options)
                .await
                .with_context(|| format!("import of '{}' failed", file.display()))?;
            let id = match handle {
                ImportHandle::Finished(outcome) => {
                    if json {
                        print_json(&outcome)?;
                    } else {
                        println!("{}", render::import_outcome(&outcome));
                    }
                    return Ok(());
                }
                ImportHandle::Id(id) => {
                    if let Some(tracked) = imports.tracked(&id).await {
                        report(&tracked.snapshot);
                    }
                    id
                }
                ImportHandle::Job(job) => {
                    report(&job);
                    if job.status.is_terminal() {
                        return Ok(());
                    }
                    job.import_id
                }
            };
            if watch {
                imports.watch(&id, settings.poll_interval(), report).await?;
            }
        }
        ImportCommand::Status { id } => {
            let job = imports.poll(&ImportId::new(id)).await?;
            report(&job);
        }
        ImportCommand::Cancel { id } => {
            let message = imports.cancel(&ImportId::new(id)).await?;
            println!("{}", non_blank_or(&message, "Cancellation requested"));
        }
        ImportCommand::Active => {
            let jobs = imports.list_active().await?;
            if jobs.is_empty() && !json {
                println!("No active imports");
            }
            jobs.iter().for_each(report);
        }
        ImportCommand::Watch { id } => {
            imports
                .watch(&ImportId::new(id), settings.poll_interval(), report)
                .await?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn non_blank_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}
