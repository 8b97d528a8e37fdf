//! SmartTodo CLI - a shared task list with staged, all-or-nothing batches.

use clap::Parser;
use smarttodo::action_log::ActionLogger;
use smarttodo::cli::{
    Cli, Commands, ConfigCommands, DepCommands, GroupCommands, TaskCommands, UserCommands,
};
use smarttodo::commands::{self, Output, TaskFields, TaskUpdate, Workspace};
use smarttodo::config::{
    ConfigOverrides, LOG_ENV, OutputFormat, ResolvedConfig, config_file_path, load_config_file,
    resolve_config,
};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let mut overrides = ConfigOverrides::new();
    if let Some(ref db) = cli.database {
        overrides = overrides.with_database(db);
    }
    if let Some(ref user) = cli.user {
        overrides = overrides.with_user(user);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let config_file = config_file_path();
    let file_config = match config_file.as_deref().map(load_config_file).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(e) => exit_with(&e, cli.human_readable),
    };
    let config = resolve_config(&file_config, &overrides);
    init_tracing(&config.log_level.value);

    let human = config.output_format() == OutputFormat::Human;
    let logger = ActionLogger::from_config(&config);
    let (cmd_name, args_json) = serialize_command(&cli.command);

    let start = Instant::now();
    let result = run_command(cli.command, config, config_file.as_deref(), human);
    let duration = start.elapsed().as_millis() as u64;

    let logged = match &result {
        Ok(None) => Ok(()),
        Ok(Some(reason)) => Err(reason.clone()),
        Err(e) => Err(e.to_string()),
    };
    logger.record(&cmd_name, &args_json, logged, duration);

    match result {
        Ok(None) => {}
        Ok(Some(_)) => process::exit(1),
        Err(e) => exit_with(&e, human),
    }
}

/// Diagnostics go to stderr; `TODO_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn exit_with(error: &smarttodo::Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", error);
    } else {
        eprintln!(
            "{}",
            serde_json::json!({ "error": error.to_string(), "code": error.code() })
        );
    }
    process::exit(1);
}

/// Print output in JSON or human-readable format.
fn output(result: &dyn Output, human: bool) -> Option<String> {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
    result.failure()
}

/// Run one command. `Ok(Some(reason))` means output was printed but the
/// command did not succeed (an aborted batch).
fn run_command(
    command: Commands,
    config: ResolvedConfig,
    config_file: Option<&std::path::Path>,
    human: bool,
) -> Result<Option<String>, smarttodo::Error> {
    match command {
        Commands::Init => Ok(output(&commands::init(&config)?, human)),

        Commands::Config { command } => match command {
            ConfigCommands::Show => Ok(output(&commands::config_show(&config, config_file), human)),
        },

        Commands::User { command } => {
            let mut ws = Workspace::open(config)?;
            match command {
                UserCommands::Add {
                    name,
                    credential_hash,
                } => Ok(output(&commands::user_add(&mut ws, &name, &credential_hash)?, human)),
                UserCommands::List => Ok(output(&commands::user_list(&ws)?, human)),
            }
        }

        Commands::Group { command } => {
            let mut ws = Workspace::open(config)?;
            match command {
                GroupCommands::List => Ok(output(&commands::group_list(&ws)?, human)),
                GroupCommands::Show { group } => {
                    Ok(output(&commands::group_show(&ws, &group)?, human))
                }
                GroupCommands::Create {
                    name,
                    description,
                    parent,
                } => {
                    let result =
                        commands::group_create(&mut ws, &name, description, parent.as_deref())?;
                    Ok(output(&result, human))
                }
                GroupCommands::Update {
                    group,
                    name,
                    description,
                } => {
                    let result = commands::group_update(&mut ws, &group, name, description)?;
                    Ok(output(&result, human))
                }
                GroupCommands::Delete { group } => {
                    Ok(output(&commands::group_delete(&mut ws, &group)?, human))
                }
                GroupCommands::AddMember {
                    group,
                    user,
                    member_group,
                } => {
                    let result = commands::group_add_member(
                        &mut ws,
                        &group,
                        user.as_deref(),
                        member_group.as_deref(),
                    )?;
                    Ok(output(&result, human))
                }
                GroupCommands::RemoveMember {
                    group,
                    user,
                    member_group,
                } => {
                    let result = commands::group_remove_member(
                        &mut ws,
                        &group,
                        user.as_deref(),
                        member_group.as_deref(),
                    )?;
                    Ok(output(&result, human))
                }
            }
        }

        Commands::Task { command } => {
            let mut ws = Workspace::open(config)?;
            match command {
                TaskCommands::Create {
                    title,
                    description,
                    urgency,
                    due,
                    recurrence,
                    assign_users,
                    assign_groups,
                    depends_on,
                } => {
                    let fields = TaskFields {
                        description,
                        urgency,
                        due,
                        recurrence,
                    };
                    let result = commands::task_create(
                        &mut ws,
                        &title,
                        fields,
                        &assign_users,
                        &assign_groups,
                        &depends_on,
                    )?;
                    Ok(output(&result, human))
                }
                TaskCommands::List { status, ready } => Ok(output(
                    &commands::task_list(&ws, status.as_deref(), ready)?,
                    human,
                )),
                TaskCommands::Show { id } => Ok(output(&commands::task_show(&ws, &id)?, human)),
                TaskCommands::Update {
                    id,
                    title,
                    description,
                    urgency,
                    due,
                    recurrence,
                    status,
                    add_users,
                    remove_users,
                    add_groups,
                    remove_groups,
                } => {
                    let fields = TaskFields {
                        description,
                        urgency,
                        due,
                        recurrence,
                    };
                    let update = TaskUpdate {
                        title,
                        status,
                        add_users,
                        remove_users,
                        add_groups,
                        remove_groups,
                    };
                    Ok(output(&commands::task_update(&mut ws, &id, fields, update)?, human))
                }
                TaskCommands::Complete { id } => {
                    Ok(output(&commands::task_complete(&mut ws, &id)?, human))
                }
                TaskCommands::Delete { id } => {
                    Ok(output(&commands::task_delete(&mut ws, &id)?, human))
                }
            }
        }

        Commands::Dep { command } => {
            let mut ws = Workspace::open(config)?;
            match command {
                DepCommands::Add { task, prerequisite } => {
                    Ok(output(&commands::dep_add(&mut ws, &task, &prerequisite)?, human))
                }
                DepCommands::Remove { task, prerequisite } => Ok(output(
                    &commands::dep_remove(&mut ws, &task, &prerequisite)?,
                    human,
                )),
            }
        }

        Commands::Batch { file, dry_run } => {
            let intents = commands::read_batch(file.as_deref())?;
            let mut ws = Workspace::open(config)?;
            let result = commands::batch(&mut ws, intents, dry_run)?;
            Ok(output(result.as_ref(), human))
        }
    }
}

/// Command name and arguments for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    use serde_json::json;

    match command {
        Commands::Init => ("init".to_string(), json!({})),

        Commands::Config { command } => match command {
            ConfigCommands::Show => ("config show".to_string(), json!({})),
        },

        Commands::User { command } => match command {
            UserCommands::Add {
                name,
                credential_hash,
            } => (
                "user add".to_string(),
                json!({ "name": name, "credential_hash": credential_hash }),
            ),
            UserCommands::List => ("user list".to_string(), json!({})),
        },

        Commands::Group { command } => match command {
            GroupCommands::List => ("group list".to_string(), json!({})),
            GroupCommands::Show { group } => ("group show".to_string(), json!({ "group": group })),
            GroupCommands::Create {
                name,
                description,
                parent,
            } => (
                "group create".to_string(),
                json!({ "name": name, "description": description, "parent": parent }),
            ),
            GroupCommands::Update {
                group,
                name,
                description,
            } => (
                "group update".to_string(),
                json!({ "group": group, "name": name, "description": description }),
            ),
            GroupCommands::Delete { group } => {
                ("group delete".to_string(), json!({ "group": group }))
            }
            GroupCommands::AddMember {
                group,
                user,
                member_group,
            } => (
                "group add-member".to_string(),
                json!({ "group": group, "user": user, "member_group": member_group }),
            ),
            GroupCommands::RemoveMember {
                group,
                user,
                member_group,
            } => (
                "group remove-member".to_string(),
                json!({ "group": group, "user": user, "member_group": member_group }),
            ),
        },

        Commands::Task { command } => match command {
            TaskCommands::Create {
                title,
                description,
                urgency,
                due,
                recurrence,
                assign_users,
                assign_groups,
                depends_on,
            } => (
                "task create".to_string(),
                json!({
                    "title": title,
                    "description": description,
                    "urgency": urgency,
                    "due": due,
                    "recurrence": recurrence,
                    "assign_users": assign_users,
                    "assign_groups": assign_groups,
                    "depends_on": depends_on,
                }),
            ),
            TaskCommands::List { status, ready } => (
                "task list".to_string(),
                json!({ "status": status, "ready": ready }),
            ),
            TaskCommands::Show { id } => ("task show".to_string(), json!({ "id": id })),
            TaskCommands::Update {
                id,
                title,
                description,
                urgency,
                due,
                recurrence,
                status,
                add_users,
                remove_users,
                add_groups,
                remove_groups,
            } => (
                "task update".to_string(),
                json!({
                    "id": id,
                    "title": title,
                    "description": description,
                    "urgency": urgency,
                    "due": due,
                    "recurrence": recurrence,
                    "status": status,
                    "add_users": add_users,
                    "remove_users": remove_users,
                    "add_groups": add_groups,
                    "remove_groups": remove_groups,
                }),
            ),
            TaskCommands::Complete { id } => ("task complete".to_string(), json!({ "id": id })),
            TaskCommands::Delete { id } => ("task delete".to_string(), json!({ "id": id })),
        },

        Commands::Dep { command } => match command {
            DepCommands::Add { task, prerequisite } => (
                "dep add".to_string(),
                json!({ "task": task, "prerequisite": prerequisite }),
            ),
            DepCommands::Remove { task, prerequisite } => (
                "dep remove".to_string(),
                json!({ "task": task, "prerequisite": prerequisite }),
            ),
        },

        Commands::Batch { file, dry_run } => (
            "batch".to_string(),
            json!({ "file": file, "dry_run": dry_run }),
        ),
    }
}
