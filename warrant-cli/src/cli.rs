//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Manage and query Warrant authorization data", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Auth scope to operate on
    #[arg(long, value_name = "NAME", global = true, default_value = "main")]
    pub scope: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a grant or check applies
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    /// Context: `global`, `Type` or `Type:id`
    #[arg(long, value_name = "CONTEXT", default_value = "global")]
    pub context: String,

    /// Only consider the exact context (overrides the scope default)
    #[arg(long, value_name = "BOOL")]
    pub force_context: Option<bool>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the authorization tables for every configured scope
    InitSchema,

    /// Create a role
    CreateRole {
        /// Role slug
        slug: String,

        /// Role level; higher levels satisfy "or higher" checks for lower ones
        #[arg(long, default_value_t = 0)]
        level: i32,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Bind the role to a context (`Type` or `Type:id`)
        #[arg(long, value_name = "CONTEXT")]
        bound_to: Option<String>,
    },

    /// Create a permission
    CreatePermission {
        /// Permission slug
        slug: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Bind the permission to a context (`Type` or `Type:id`)
        #[arg(long, value_name = "CONTEXT")]
        bound_to: Option<String>,
    },

    /// Assign a role to a subject
    AssignRole {
        /// Subject id
        subject: i32,
        /// Role slug
        role: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Remove a role assignment made in exactly this context
    UnassignRole {
        subject: i32,
        role: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Check whether a subject holds a role
    HasRole {
        subject: i32,
        role: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Check whether a subject holds a role or one of at least its level
    HasRoleOrHigher {
        subject: i32,
        role: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// List the roles a subject holds
    Roles {
        subject: i32,
        #[command(flatten)]
        context: ContextArgs,

        /// Output format: text, json
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: String,
    },

    /// Show the highest-level role a subject holds
    HighestRole {
        subject: i32,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Grant a permission to a role
    Grant {
        /// Role slug
        role: String,
        /// Permission slug
        permission: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Grant a permission directly to a subject
    AssignPermission {
        subject: i32,
        permission: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Check whether a subject holds a permission
    HasPermission {
        subject: i32,
        permission: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// List the permissions a subject holds
    Permissions {
        subject: i32,
        #[command(flatten)]
        context: ContextArgs,

        /// Output format: text, json
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: String,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}
