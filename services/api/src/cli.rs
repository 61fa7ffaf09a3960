use crate::infra::{build_services, parse_date};
use crate::server;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use hoa_desk::config::AppConfig;
use hoa_desk::domain::InvoiceStatus;
use hoa_desk::error::AppError;
use hoa_desk::export::{write_invoices_csv, InvoiceExportFilter};
use hoa_desk::services::{AdminBootstrap, Services};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hoa-desk",
    about = "Run the HOA Desk API and its billing commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Manage user accounts
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Run billing jobs
    Billing {
        #[command(subcommand)]
        command: BillingCommand,
    },
    /// Lease housekeeping
    Leases {
        #[command(subcommand)]
        command: LeasesCommand,
    },
    /// Write CSV exports
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    /// Create the first administrator unless an active one already exists
    CreateAdmin(CreateAdminArgs),
}

#[derive(Subcommand, Debug)]
enum BillingCommand {
    /// Invoice every active recurring fee for the current period
    ProcessFees(RunDateArgs),
    /// Add late penalties to overdue invoices
    ApplyPenalties(RunDateArgs),
}

#[derive(Subcommand, Debug)]
enum LeasesCommand {
    /// Mark active leases past their end date as expired
    Expire(RunDateArgs),
}

#[derive(Subcommand, Debug)]
enum ExportCommand {
    /// Export invoices with their balances as CSV
    Invoices(ExportInvoicesArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
struct CreateAdminArgs {
    #[arg(long, default_value = "Administrator")]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args, Debug, Default)]
struct RunDateArgs {
    /// Business date for the run (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct ExportInvoicesArgs {
    /// Destination file; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only invoices with this status (unpaid, partially_paid, paid, overdue, cancelled)
    #[arg(long, value_parser = parse_status)]
    status: Option<InvoiceStatus>,
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unknown invoice status '{raw}'"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        command => run_job(command),
    }
}

fn run_job(command: Command) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let services = build_services(&config)?;
    match command {
        Command::Serve(_) => Ok(()),
        Command::Users {
            command: UsersCommand::CreateAdmin(args),
        } => create_admin(&services, args),
        Command::Billing {
            command: BillingCommand::ProcessFees(args),
        } => process_fees(&services, args),
        Command::Billing {
            command: BillingCommand::ApplyPenalties(args),
        } => apply_penalties(&services, args),
        Command::Leases {
            command: LeasesCommand::Expire(args),
        } => expire_leases(&services, args),
        Command::Export {
            command: ExportCommand::Invoices(args),
        } => export_invoices(&services, args),
    }
}

fn run_date(services: &Services, args: &RunDateArgs) -> NaiveDate {
    args.today.unwrap_or_else(|| services.context().today())
}

fn create_admin(services: &Services, args: CreateAdminArgs) -> Result<(), AppError> {
    match services
        .users
        .ensure_admin(&args.name, &args.email, &args.password)?
    {
        AdminBootstrap::Created(user) => {
            println!("Created administrator {} <{}>", user.name, user.email)
        }
        AdminBootstrap::Existing(user) => println!(
            "An active administrator already exists: {} <{}>",
            user.name, user.email
        ),
    }
    Ok(())
}

fn process_fees(services: &Services, args: RunDateArgs) -> Result<(), AppError> {
    let today = run_date(services, &args);
    let runs = services.fees.process_recurring(today)?;
    println!("Recurring fees processed for {today}");
    if runs.is_empty() {
        println!("  no fees due");
    }
    for run in &runs {
        if run.already_billed {
            println!("  {} ({}): already billed", run.fee_name, run.period);
        } else {
            println!(
                "  {} ({}): {} invoice(s), {} unit(s) skipped",
                run.fee_name, run.period, run.invoices_created, run.units_skipped
            );
        }
    }
    Ok(())
}

fn apply_penalties(services: &Services, args: RunDateArgs) -> Result<(), AppError> {
    let today = run_date(services, &args);
    let applied = services.invoices.apply_late_penalties(today)?;
    println!("Late penalties applied for {today}: {}", applied.len());
    for penalty in &applied {
        println!("  {} +{}", penalty.invoice_number, penalty.amount);
    }
    Ok(())
}

fn expire_leases(services: &Services, args: RunDateArgs) -> Result<(), AppError> {
    let today = run_date(services, &args);
    let expired = services.leases.expire_due(today)?;
    println!("Leases expired as of {today}: {}", expired.len());
    for lease in &expired {
        println!("  lease #{} ended {}", lease.meta.id, lease.end_date);
    }
    Ok(())
}

fn export_invoices(services: &Services, args: ExportInvoicesArgs) -> Result<(), AppError> {
    let context = services.context();
    let filter = InvoiceExportFilter {
        status: args.status,
        ..InvoiceExportFilter::default()
    };

    let rows = match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            let rows = write_invoices_csv(context.store(), context.today(), &filter, None, &mut writer)?;
            writer.flush()?;
            rows
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_invoices_csv(context.store(), context.today(), &filter, None, &mut handle)?
        }
    };

    if let Some(path) = &args.output {
        println!("Exported {rows} invoice(s) to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoice_statuses() {
        assert_eq!(parse_status("overdue"), Ok(InvoiceStatus::Overdue));
        assert_eq!(parse_status(" Partially_Paid "), Ok(InvoiceStatus::PartiallyPaid));
        assert!(parse_status("lost").is_err());
    }

    #[test]
    fn parses_billing_subcommands() {
        let cli = Cli::try_parse_from(["hoa-desk", "billing", "process-fees", "--today", "2026-04-01"])
            .expect("valid command line");
        match cli.command {
            Some(Command::Billing {
                command: BillingCommand::ProcessFees(args),
            }) => assert_eq!(args.today, NaiveDate::from_ymd_opt(2026, 4, 1)),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["hoa-desk", "leases", "expire", "--today", "April"]).is_err());
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["hoa-desk"]).expect("valid command line");
        assert!(cli.command.is_none());
    }
}
