use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand, ValueEnum};
use escrow_core::{JobContract, JobState, Milestone, Party, PublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod flows;
mod ledger;
mod signing;

use config::{Config, CONFIG_ENV};
use errors::{CliError, Result};
use flows::{AgreementTerms, FlowAction, JobFlows};
use ledger::{JobLedger, JournalEntry};
use signing::{generate_signing_key, parse_signing_key, public_key, SignedTransition};

#[derive(Parser)]
#[command(name = "escrow", version, about = "Milestone escrow: propose, sign, verify and replay job transitions")]
struct Cli {
    /// TOML file with a `[policy]` table.
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an ed25519 keypair as sk.hex / pk.hex.
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Propose a new job, signed by the developer.
    Agree {
        #[arg(long)]
        developer_sk: String,
        #[arg(long)]
        developer_name: String,
        #[arg(long)]
        contractor_pk: String,
        #[arg(long)]
        contractor_name: String,
        /// JSON array of `{description, amount: {quantity, currency}}`.
        #[arg(long)]
        milestones: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Propose a milestone transition, signed by the initiator.
    Propose {
        #[arg(value_enum)]
        action: ActionKind,
        /// A job state, or a transition file producing one.
        #[arg(long)]
        job: PathBuf,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        sk_hex: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Add a signature to a transition file in place.
    Sign {
        tx: PathBuf,
        #[arg(long)]
        sk_hex: String,
    },
    /// Check signatures and run the validator on a transition file.
    Verify { tx: PathBuf },
    /// Replay a JSON-lines journal into a fresh ledger and print its snapshot.
    Replay { journal: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionKind {
    Start,
    Finish,
    Accept,
    Reject,
    Pay,
}

impl ActionKind {
    fn at(self, index: usize) -> FlowAction {
        match self {
            ActionKind::Start => FlowAction::Start { index },
            ActionKind::Finish => FlowAction::Finish { index },
            ActionKind::Accept => FlowAction::Accept { index },
            ActionKind::Reject => FlowAction::Reject { index },
            ActionKind::Pay => FlowAction::Pay { index },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobSource {
    State(JobState),
    Signed(SignedTransition),
}

//==================== file helpers ====================//

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_file(path, &encoded)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, bytes).map_err(write_err)
}

fn read_job(path: &Path) -> Result<JobState> {
    match read_json::<JobSource>(path)? {
        JobSource::State(job) => Ok(job),
        JobSource::Signed(mut signed) if signed.tx.outputs.len() == 1 => {
            Ok(signed.tx.outputs.remove(0))
        }
        JobSource::Signed(_) => Err(CliError::NotAJob {
            path: path.to_path_buf(),
        }),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//==================== commands ====================//

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    let sk = generate_signing_key();
    let pk = public_key(&sk);
    write_file(&out_dir.join("sk.hex"), hex::encode(sk.to_bytes()).as_bytes())?;
    write_file(&out_dir.join("pk.hex"), pk.to_hex().as_bytes())?;
    info!(%pk, "keypair written");
    println!("keypair written → {}", out_dir.display());
    Ok(())
}

struct AgreeArgs<'a> {
    developer_sk: &'a str,
    developer_name: &'a str,
    contractor_pk: &'a str,
    contractor_name: &'a str,
    milestones: &'a Path,
    out: &'a Path,
}

fn agree_cmd(contract: &JobContract, args: AgreeArgs<'_>) -> Result<()> {
    let sk = parse_signing_key(args.developer_sk)?;
    let developer = public_key(&sk);
    let contractor: PublicKey = args.contractor_pk.trim().parse()?;
    let milestones: Vec<Milestone> = read_json(args.milestones)?;

    let terms = AgreementTerms {
        developer: Party::new(args.developer_name, developer),
        contractor: Party::new(args.contractor_name, contractor),
        milestones,
    };
    let tx = JobFlows::new(contract).agree(&developer, terms)?;
    let linear_id = tx.outputs[0].linear_id;
    let mut signed = SignedTransition::new(tx);
    signed.sign(&sk)?;
    write_json(args.out, &signed)?;
    println!("job {linear_id} proposed → {}", args.out.display());
    Ok(())
}

fn propose_cmd(
    contract: &JobContract,
    action: FlowAction,
    job: &Path,
    sk_hex: &str,
    out: &Path,
) -> Result<()> {
    let sk = parse_signing_key(sk_hex)?;
    let current = read_job(job)?;
    let tx = JobFlows::new(contract).propose(&public_key(&sk), &current, action)?;
    let command = tx.command.value;
    let mut signed = SignedTransition::new(tx);
    signed.sign(&sk)?;
    write_json(out, &signed)?;
    println!("{command} proposed → {}", out.display());
    Ok(())
}

fn sign_cmd(tx: &Path, sk_hex: &str) -> Result<()> {
    let sk = parse_signing_key(sk_hex)?;
    let mut signed: SignedTransition = read_json(tx)?;
    let key = signed.sign(&sk)?;
    write_json(tx, &signed)?;
    info!(%key, path = %tx.display(), "transition signed");
    println!("signed by {key}");
    Ok(())
}

fn verify_cmd(contract: &JobContract, tx: &Path) -> Result<()> {
    let signed: SignedTransition = read_json(tx)?;
    signed.verify_signatures()?;
    contract.verify(&signed.tx)?;
    println!("OK");
    Ok(())
}

fn replay_cmd(contract: JobContract, journal: &Path) -> Result<()> {
    let raw = fs::read_to_string(journal).map_err(|source| CliError::Read {
        path: journal.to_path_buf(),
        source,
    })?;
    let mut ledger = JobLedger::new(contract);
    let timestamp = unix_now();
    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = n + 1;
        let entry: JournalEntry = serde_json::from_str(line)
            .map_err(|source| CliError::JournalEntry { line: line_no, source })?;
        ledger
            .apply_entry(&entry, timestamp)
            .map_err(|source| CliError::Journal { line: line_no, source })?;
    }

    let snapshot = ledger.snapshot();
    let encoded = serde_json::to_string_pretty(&snapshot).map_err(|source| CliError::Json {
        path: journal.to_path_buf(),
        source,
    })?;
    println!("{encoded}");
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let contract = JobContract::new(config.policy);

    match cli.command {
        Commands::Keygen { out_dir } => keygen_cmd(&out_dir),
        Commands::Agree {
            developer_sk,
            developer_name,
            contractor_pk,
            contractor_name,
            milestones,
            out,
        } => agree_cmd(
            &contract,
            AgreeArgs {
                developer_sk: &developer_sk,
                developer_name: &developer_name,
                contractor_pk: &contractor_pk,
                contractor_name: &contractor_name,
                milestones: &milestones,
                out: &out,
            },
        ),
        Commands::Propose {
            action,
            job,
            index,
            sk_hex,
            out,
        } => propose_cmd(&contract, action.at(index), &job, &sk_hex, &out),
        Commands::Sign { tx, sk_hex } => sign_cmd(&tx, &sk_hex),
        Commands::Verify { tx } => verify_cmd(&contract, &tx),
        Commands::Replay { journal } => replay_cmd(contract, &journal),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;
    use escrow_core::{Amount, Currency, MilestoneStatus};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "escrow-cli-{name}-{}",
            escrow_core::LinearId::random()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn propose_parses_action_and_index() {
        let cli = Cli::try_parse_from([
            "escrow", "propose", "finish", "--job", "job.json", "--index", "2", "--sk-hex", "00",
            "--out", "tx.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Propose { action, index, .. } => {
                assert_eq!(action.at(index), FlowAction::Finish { index: 2 });
            }
            _ => panic!("expected propose"),
        }
    }

    #[test]
    fn agree_sign_and_verify_through_files() {
        let dir = scratch_dir("agree");
        let developer = generate_signing_key();
        let contractor = generate_signing_key();
        let milestones = vec![Milestone::new(
            "Fit windows",
            Amount::new(10_000, Currency::new("USD").unwrap()),
        )];
        write_json(&dir.join("milestones.json"), &milestones).unwrap();

        let contract = JobContract::default();
        let tx_path = dir.join("agree.json");
        agree_cmd(
            &contract,
            AgreeArgs {
                developer_sk: &hex::encode(developer.to_bytes()),
                developer_name: "John Doe",
                contractor_pk: &public_key(&contractor).to_hex(),
                contractor_name: "Richard Roe",
                milestones: &dir.join("milestones.json"),
                out: &tx_path,
            },
        )
        .unwrap();

        let err = verify_cmd(&contract, &tx_path).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        sign_cmd(&tx_path, &hex::encode(contractor.to_bytes())).unwrap();
        verify_cmd(&contract, &tx_path).unwrap();

        let start_path = dir.join("start.json");
        propose_cmd(
            &contract,
            FlowAction::Start { index: 0 },
            &tx_path,
            &hex::encode(contractor.to_bytes()),
            &start_path,
        )
        .unwrap();
        let started = read_job(&start_path).unwrap();
        assert_eq!(started.milestones[0].status, MilestoneStatus::Started);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn replay_rejects_a_bad_journal_line() {
        let dir = scratch_dir("replay");
        let journal = dir.join("journal.jsonl");
        fs::write(&journal, "\n{\"type\":\"unknown\"}\n").unwrap();
        let err = replay_cmd(JobContract::default(), &journal).unwrap_err();
        assert!(matches!(err, CliError::JournalEntry { line: 2, .. }));
        fs::remove_dir_all(dir).ok();
    }
}
