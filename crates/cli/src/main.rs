use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;

use kasse_core::{
    now_ms, Amount, Fine, FineReason, Id, ListItem, PayedState, Person, ReasonTemplate,
    Transaction,
};
use kasse_remote::{MemoryStore, RemoteStore};
use kasse_sync::{get_club_id, ClubScope, ConnectionState, Level, ListChange, SyncOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "kassectl", version, about = "Kasse CLI: a club tree over the sync engine")]
struct Cli {
    /// Club tree JSON file the in-memory store is seeded from
    #[arg(long = "file", global = true, env = "KASSE_FILE", default_value = "kasse.json")]
    file: PathBuf,

    /// Club id (everything except `resolve` needs it)
    #[arg(long = "club", global = true)]
    club: Option<String>,

    /// Private key sent with every remote operation
    #[arg(long = "key", global = true, default_value = "demo")]
    key: String,

    /// Club level the paths and operations address
    #[arg(long = "level", value_enum, global = true, default_value_t = LevelArg::Regular)]
    level: LevelArg,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LevelArg {
    Regular,
    Debug,
    Testing,
}

impl From<LevelArg> for Level {
    fn from(level: LevelArg) -> Level {
        match level {
            LevelArg::Regular => Level::Regular,
            LevelArg::Debug => Level::Debug,
            LevelArg::Testing => Level::Testing,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ListKind {
    Persons,
    Fines,
    Reasons,
    Transactions,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a club id from its public identifier
    Resolve {
        /// Club identifier, e.g. "sgk"
        identifier: String,
    },
    /// Print one list of the club
    Ls {
        list: ListKind,
    },
    /// Per-person totals of open and payed fines
    Summary,
    /// Mark a fine as payed
    Pay {
        fine_id: String,
        /// Record the payment as made in-app
        #[arg(long = "in-app", action = ArgAction::SetTrue)]
        in_app: bool,
    },
    /// Delete an item from a list
    Rm {
        list: ListKind,
        item_id: String,
    },
    /// Remove a person's registration data
    SignOut {
        person_id: String,
    },
}

fn init_tracing() {
    let env = std::env::var("KASSE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn load_store(file: &Path) -> Result<Arc<MemoryStore>> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let tree = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    Ok(Arc::new(MemoryStore::with_tree(tree)))
}

/// Write the store's full tree back to the seed file.
async fn persist(store: &MemoryStore, file: &Path) -> Result<()> {
    let tree = store.fetch("").await?.unwrap_or_else(|| json!({}));
    std::fs::write(file, serde_json::to_string_pretty(&tree)?)
        .with_context(|| format!("writing {}", file.display()))?;
    Ok(())
}

async fn open_engine(cli: &Cli, store: Arc<MemoryStore>) -> Result<SyncOrchestrator> {
    let club = cli.club.as_deref().context("--club is required for this command")?;
    let scope = ClubScope::new(Id::new(club), cli.key.clone()).with_level(cli.level.into());
    let engine = SyncOrchestrator::new(store, scope);
    if engine.bootstrap().await != ConnectionState::Ready {
        bail!("bootstrap failed; check the club id and the tree file");
    }
    Ok(engine)
}

fn render_date(ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => "-".to_string(),
    }
}

/// Wire payload plus the id, for JSON output.
fn row<T: ListItem>(item: &T) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(item.to_wire())?;
    if let Some(object) = value.as_object_mut() {
        object.insert("id".into(), json!(item.id()));
    }
    Ok(value)
}

fn rows<T: ListItem>(items: &[T]) -> Result<String> {
    let rows = items.iter().map(row).collect::<Result<Vec<_>>>()?;
    Ok(serde_json::to_string_pretty(&rows)?)
}

fn fine_amount(fine: &Fine, reasons: &[ReasonTemplate]) -> Amount {
    let unit = match &fine.reason {
        FineReason::Custom { amount, .. } => *amount,
        FineReason::Template(template_id) => reasons
            .iter()
            .find(|template| template.id == *template_id)
            .map(|template| template.amount)
            .unwrap_or(Amount::ZERO),
    };
    unit * fine.number
}

fn fine_reason_text<'a>(fine: &'a Fine, reasons: &'a [ReasonTemplate]) -> &'a str {
    match &fine.reason {
        FineReason::Custom { reason, .. } => reason,
        FineReason::Template(template_id) => reasons
            .iter()
            .find(|template| template.id == *template_id)
            .map(|template| template.reason.as_str())
            .unwrap_or("(unknown template)"),
    }
}

fn person_name(persons: &[Person], id: &Id<Person>) -> String {
    persons
        .iter()
        .find(|person| person.id == *id)
        .map(|person| person.name.to_string())
        .unwrap_or_else(|| id.to_string())
}

fn print_persons(persons: &[Person]) {
    println!("{:<14} {:<24} {:<10} CASHIER", "ID", "NAME", "SIGNED-IN");
    for person in persons {
        let (signed_in, cashier) = match &person.sign_in_data {
            Some(data) => ("yes", if data.is_cashier { "yes" } else { "no" }),
            None => ("no", "-"),
        };
        println!("{:<14} {:<24} {:<10} {}", person.id, person.name, signed_in, cashier);
    }
}

fn print_fines(fines: &[Fine], persons: &[Person], reasons: &[ReasonTemplate]) {
    println!("{:<14} {:<20} {:>3} {:<20} {:>8} {:<10} DATE", "ID", "PERSON", "N", "REASON", "AMOUNT", "STATE");
    for fine in fines {
        println!(
            "{:<14} {:<20} {:>3} {:<20} {:>8} {:<10} {}",
            fine.id,
            person_name(persons, &fine.person_id),
            fine.number,
            fine_reason_text(fine, reasons),
            fine_amount(fine, reasons).to_string(),
            fine.payed.state_str(),
            render_date(fine.date),
        );
    }
}

fn print_reasons(reasons: &[ReasonTemplate]) {
    println!("{:<14} {:<28} {:<10} AMOUNT", "ID", "REASON", "IMPORTANCE");
    for template in reasons {
        println!(
            "{:<14} {:<28} {:<10} {}",
            template.id,
            template.reason,
            format!("{:?}", template.importance).to_lowercase(),
            template.amount,
        );
    }
}

fn print_transactions(transactions: &[Transaction], persons: &[Person]) {
    println!("{:<14} {:<20} {:>5} {:<9} PAY-DATE", "ID", "PERSON", "FINES", "APPROVED");
    for transaction in transactions {
        println!(
            "{:<14} {:<20} {:>5} {:<9} {}",
            transaction.id,
            person_name(persons, &transaction.person_id),
            transaction.fine_ids.len(),
            if transaction.approved { "yes" } else { "no" },
            render_date(transaction.pay_date),
        );
    }
}

async fn run_ls(cli: &Cli, list: ListKind) -> Result<()> {
    let store = load_store(&cli.file)?;
    let engine = open_engine(cli, store).await?;
    let caches = engine.caches();
    let persons = caches.persons.read();
    let persons = persons.items().unwrap_or_default();
    let reasons = caches.reasons.read();
    let reasons = reasons.items().unwrap_or_default();

    match (list, cli.output) {
        (ListKind::Persons, Output::Human) => print_persons(persons),
        (ListKind::Persons, Output::Json) => println!("{}", rows(persons)?),
        (ListKind::Fines, output) => {
            let fines = caches.fines.read();
            let fines = fines.items().unwrap_or_default();
            match output {
                Output::Human => print_fines(fines, persons, reasons),
                Output::Json => println!("{}", rows(fines)?),
            }
        }
        (ListKind::Reasons, Output::Human) => print_reasons(reasons),
        (ListKind::Reasons, Output::Json) => println!("{}", rows(reasons)?),
        (ListKind::Transactions, output) => {
            let transactions = caches.transactions.read();
            let transactions = transactions.items().unwrap_or_default();
            match output {
                Output::Human => print_transactions(transactions, persons),
                Output::Json => println!("{}", rows(transactions)?),
            }
        }
    }
    Ok(())
}

async fn run_summary(cli: &Cli) -> Result<()> {
    let store = load_store(&cli.file)?;
    let engine = open_engine(cli, store).await?;
    let caches = engine.caches();
    let persons = caches.persons.read();
    let persons = persons.items().unwrap_or_default();
    let fines = caches.fines.read();
    let fines = fines.items().unwrap_or_default();
    let reasons = caches.reasons.read();
    let reasons = reasons.items().unwrap_or_default();

    let totals: Vec<(&Person, Amount, Amount)> = persons
        .iter()
        .map(|person| {
            let of_person = fines.iter().filter(|fine| fine.person_id == person.id);
            let (mut open, mut payed) = (Amount::ZERO, Amount::ZERO);
            for fine in of_person {
                let amount = fine_amount(fine, reasons);
                match fine.payed {
                    PayedState::Unpayed => open = open + amount,
                    PayedState::Payed { .. } => payed = payed + amount,
                    PayedState::Settled => {}
                }
            }
            (person, open, payed)
        })
        .collect();

    match cli.output {
        Output::Human => {
            println!("{:<24} {:>8} {:>8}", "NAME", "OPEN", "PAYED");
            for (person, open, payed) in &totals {
                println!("{:<24} {:>8} {:>8}", person.name.to_string(), open.to_string(), payed.to_string());
            }
        }
        Output::Json => {
            let rows: Vec<_> = totals
                .iter()
                .map(|(person, open, payed)| {
                    json!({
                        "personId": person.id,
                        "name": person.name.to_string(),
                        "open": open,
                        "payed": payed,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

async fn run_rm(cli: &Cli, list: ListKind, item_id: &str) -> Result<()> {
    let store = load_store(&cli.file)?;
    let engine = open_engine(cli, Arc::clone(&store)).await?;
    let changer = engine.changer();
    let caches = engine.caches();
    match list {
        ListKind::Persons => {
            changer.change(&caches.persons, ListChange::<Person>::Delete(Id::new(item_id))).await?
        }
        ListKind::Fines => {
            changer.change(&caches.fines, ListChange::<Fine>::Delete(Id::new(item_id))).await?
        }
        ListKind::Reasons => {
            changer
                .change(&caches.reasons, ListChange::<ReasonTemplate>::Delete(Id::new(item_id)))
                .await?
        }
        ListKind::Transactions => {
            changer
                .change(&caches.transactions, ListChange::<Transaction>::Delete(Id::new(item_id)))
                .await?
        }
    }
    persist(&store, &cli.file).await?;
    info!(item = %item_id.to_ascii_uppercase(), "deleted");
    Ok(())
}

async fn run_pay(cli: &Cli, fine_id: &str, in_app: bool) -> Result<()> {
    let store = load_store(&cli.file)?;
    let engine = open_engine(cli, Arc::clone(&store)).await?;
    let fine_id = Id::new(fine_id);
    engine
        .changer()
        .change_fine_payed(
            &engine.caches().fines,
            &fine_id,
            PayedState::Payed { pay_date: now_ms(), in_app },
        )
        .await?;
    persist(&store, &cli.file).await?;
    println!("fine {fine_id} payed");
    Ok(())
}

async fn run_sign_out(cli: &Cli, person_id: &str) -> Result<()> {
    let store = load_store(&cli.file)?;
    let engine = open_engine(cli, Arc::clone(&store)).await?;
    let person_id = Id::new(person_id);
    engine.changer().force_sign_out(&person_id).await?;
    persist(&store, &cli.file).await?;
    println!("person {person_id} signed out");
    Ok(())
}

async fn run_resolve(cli: &Cli, identifier: &str) -> Result<()> {
    let store = load_store(&cli.file)?;
    let club_id =
        get_club_id(store.as_ref(), cli.level.into(), &cli.key, identifier).await?;
    match cli.output {
        Output::Human => println!("{club_id}"),
        Output::Json => println!("{}", json!({ "clubId": club_id })),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Resolve { identifier } => run_resolve(&cli, identifier).await,
        Commands::Ls { list } => run_ls(&cli, *list).await,
        Commands::Summary => run_summary(&cli).await,
        Commands::Pay { fine_id, in_app } => run_pay(&cli, fine_id, *in_app).await,
        Commands::Rm { list, item_id } => run_rm(&cli, *list, item_id).await,
        Commands::SignOut { person_id } => run_sign_out(&cli, person_id).await,
    }
}
