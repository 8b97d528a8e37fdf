//! CLI argument definitions for SmartTodo.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SmartTodo - a shared task list with staged, all-or-nothing batches.
///
/// Every mutating command is staged, validated and committed as one unit.
/// `todo batch` runs a whole JSON array of intents the same way.
#[derive(Parser, Debug)]
#[command(name = "todo")]
#[command(author, version, about = "A shared task list with atomic multi-step commands", long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("TODO_GIT_COMMIT"),
    ", built ",
    env!("TODO_BUILD_TIMESTAMP"),
    ")"
))]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Database file (overrides TODO_DB and config.kdl)
    #[arg(long = "db", global = true)]
    pub database: Option<PathBuf>,

    /// Act as this user (ID or name; overrides TODO_USER)
    #[arg(long = "as", id = "acting_user", global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if it does not exist
    Init,

    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Group management commands
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Dependency management commands
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Run a JSON array of intents as one atomic batch
    Batch {
        /// File holding the intents (reads stdin when omitted or "-")
        file: Option<PathBuf>,

        /// Stage and validate only; print the staged operations and discard
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Unique user name
        name: String,

        /// Credential hash issued by the authentication layer
        #[arg(long, default_value = "")]
        credential_hash: String,
    },

    /// List all users
    List,
}

/// Group subcommands
#[derive(Subcommand, Debug)]
pub enum GroupCommands {
    /// List all groups
    List,

    /// Show a group with its members and subgroups
    Show {
        /// Group ID or name
        group: String,
    },

    /// Create a group owned by the acting user
    Create {
        /// Unique group name
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Enclosing group (ID or name)
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Rename a group or change its description
    Update {
        /// Group ID or name
        group: String,

        #[arg(long)]
        name: Option<String>,

        /// New description (empty to clear)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a group; its subgroups become top-level
    Delete {
        /// Group ID or name
        group: String,
    },

    /// Add a user to a group, or nest another group under it
    AddMember {
        /// Group ID or name
        group: String,

        /// User to add (ID or name)
        #[arg(long, conflicts_with = "member_group", required_unless_present = "member_group")]
        user: Option<String>,

        /// Group to nest (ID or name)
        #[arg(long = "group")]
        member_group: Option<String>,
    },

    /// Remove a user from a group, or detach a nested group
    RemoveMember {
        /// Group ID or name
        group: String,

        /// User to remove (ID or name)
        #[arg(long, conflicts_with = "member_group", required_unless_present = "member_group")]
        user: Option<String>,

        /// Nested group to detach (ID or name)
        #[arg(long = "group")]
        member_group: Option<String>,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task owned by the acting user
    Create {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// low, normal, high or critical
        #[arg(short, long)]
        urgency: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// none, daily, weekly, monthly or yearly
        #[arg(short, long)]
        recurrence: Option<String>,

        /// Assign a user (ID or name, repeatable)
        #[arg(long = "assign-user")]
        assign_users: Vec<String>,

        /// Assign a group (ID or name, repeatable)
        #[arg(long = "assign-group")]
        assign_groups: Vec<String>,

        /// Prerequisite task ID (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },

    /// List tasks visible to the acting user
    List {
        /// Filter by status (todo, in_progress, completed)
        #[arg(short, long)]
        status: Option<String>,

        /// Only tasks whose prerequisites are all completed
        #[arg(long)]
        ready: bool,
    },

    /// Show a task
    Show { id: String },

    /// Update a task
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        urgency: Option<String>,

        #[arg(long)]
        due: Option<String>,

        #[arg(short, long)]
        recurrence: Option<String>,

        /// New status; "completed" runs the completion checks
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long = "add-user")]
        add_users: Vec<String>,

        #[arg(long = "remove-user")]
        remove_users: Vec<String>,

        #[arg(long = "add-group")]
        add_groups: Vec<String>,

        #[arg(long = "remove-group")]
        remove_groups: Vec<String>,
    },

    /// Complete a task (spawns the next occurrence if it recurs)
    Complete { id: String },

    /// Delete a task and every dependency edge pointing at it
    Delete { id: String },
}

/// Dependency subcommands
#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Make TASK depend on PREREQUISITE
    Add { task: String, prerequisite: String },

    /// Drop the dependency of TASK on PREREQUISITE
    Remove { task: String, prerequisite: String },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["todo", "task", "list", "--as", "alice", "-H"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(cli.human_readable);
        assert!(matches!(
            cli.command,
            Commands::Task {
                command: TaskCommands::List { ready: false, .. }
            }
        ));
    }

    #[test]
    fn test_add_member_needs_exactly_one_kind() {
        assert!(Cli::try_parse_from(["todo", "group", "add-member", "ops"]).is_err());
        assert!(
            Cli::try_parse_from([
                "todo", "group", "add-member", "ops", "--user", "bob", "--group", "sre"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["todo", "group", "add-member", "ops", "--group", "sre"]).is_ok());
    }

    #[test]
    fn test_remove_member_and_dep_remove_parse() {
        let cli =
            Cli::try_parse_from(["todo", "group", "remove-member", "ops", "--user", "bob"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Group {
                command: GroupCommands::RemoveMember { ref user, member_group: None, .. }
            } if user.as_deref() == Some("bob")
        ));
        assert!(Cli::try_parse_from(["todo", "group", "remove-member", "ops"]).is_err());

        let cli = Cli::try_parse_from(["todo", "dep", "remove", "tk-a", "tk-b"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Dep {
                command: DepCommands::Remove { .. }
            }
        ));
    }

    #[test]
    fn test_repeatable_assignees() {
        let cli = Cli::try_parse_from([
            "todo",
            "task",
            "create",
            "Ship",
            "--assign-user",
            "bob",
            "--assign-user",
            "carol",
        ])
        .unwrap();
        match cli.command {
            Commands::Task {
                command: TaskCommands::Create { assign_users, .. },
            } => assert_eq!(assign_users, vec!["bob", "carol"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
