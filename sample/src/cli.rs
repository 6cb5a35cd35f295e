use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "consent-sample",
    version,
    about = "Record, inspect and revoke consent through the consent service"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "appsettings.toml")]
    pub config: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save, review and revoke consent for the configured key
    Walkthrough,
    /// Inspect consent groups owned by the subscription
    Groups {
        #[command(subcommand)]
        command: GroupsCommand,
    },
    /// Work with consent in the configured group
    Consent {
        #[command(subcommand)]
        command: ConsentCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupsCommand {
    /// List groups owned by the subscription
    List,
    /// Show a group's members and scopes
    Show {
        /// Consent group id
        id: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConsentCommand {
    /// Show the full consent record (requires read and write roles)
    Review {
        key: String,
        /// Act as this member instead of the configured one
        #[arg(long)]
        member: Option<String>,
    },
    /// Show the consent visible to a member
    Get {
        key: String,
        /// Only report consent granted for one of these scopes
        #[arg(long = "scope")]
        scopes: Vec<String>,
        #[arg(long)]
        member: Option<String>,
    },
    /// Create or overwrite consent
    Save {
        key: String,
        /// Scopes granted; defaults to all of the group's scopes
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// Members allowed to read the consent; defaults to every member
        #[arg(long = "authorized-member")]
        authorized_members: Vec<String>,
        #[arg(long)]
        member: Option<String>,
    },
    /// Revoke consent
    Revoke {
        key: String,
        #[arg(long)]
        member: Option<String>,
    },
}
