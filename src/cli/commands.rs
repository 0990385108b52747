//! CLI command definitions for stack-metastore.
//!
//! Every command opens the store, applies pending migrations and prints
//! its result as pretty JSON on stdout.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{
    ComponentConfiguration, ComponentCreate, PermissionType, ProjectCreate, RoleAssignmentCreate,
    RoleCreate, StackComponentType, StackCreate, UserCreate,
};
use crate::registry::FlavorRegistry;
use crate::storage::{ComponentFilter, Database, RoleAssignmentFilter, StackFilter};

/// Metadata store for ML stacks, components and pipelines.
#[derive(Parser)]
#[command(name = "stack-metastore")]
#[command(about = "Manage the metadata of ML stacks, components, users and pipelines")]
#[command(version)]
#[command(
    long_about = "stack-metastore keeps projects, users, roles, stack components, stacks and pipeline runs in a SQLite database.\n\nExample usage:\n  stack-metastore init\n  stack-metastore project create p1\n  stack-metastore component register orch --type orchestrator --flavor local --project p1"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Database URL (e.g. sqlite://metastore.db).
    #[arg(long, env = "METASTORE_DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create the database and apply the schema.
    Init,

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage users.
    #[command(subcommand)]
    User(UserCommand),

    /// Manage stack components.
    #[command(subcommand)]
    Component(ComponentCommand),

    /// Manage stacks.
    #[command(subcommand)]
    Stack(StackCommand),

    /// Manage roles and role assignments.
    #[command(subcommand)]
    Role(RoleCommand),

    /// Inspect available flavors.
    #[command(subcommand)]
    Flavor(FlavorCommand),
}

#[derive(clap::Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project.
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List all projects.
    List,
    /// Show a project with its stacks and components.
    Describe { name: String },
    /// Delete a project and everything scoped to it.
    Delete { name: String },
}

#[derive(clap::Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user.
    Create {
        name: String,
        #[arg(long, default_value = "")]
        full_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// List all users.
    List,
    /// Delete a user. Entities the user created are kept.
    Delete { name: String },
}

#[derive(clap::Subcommand, Debug)]
pub enum ComponentCommand {
    /// Register a stack component.
    Register {
        name: String,
        /// Component type (e.g. orchestrator, artifact_store).
        #[arg(short = 't', long = "type")]
        component_type: String,
        /// Flavor name; must be known for the component type.
        #[arg(short, long)]
        flavor: String,
        /// Owning project name.
        #[arg(short, long)]
        project: String,
        /// Creating user name.
        #[arg(short, long)]
        user: Option<String>,
        /// Configuration as a JSON object.
        #[arg(short, long)]
        config: Option<String>,
        #[arg(long)]
        shared: bool,
    },
    /// List the components of a project.
    List {
        #[arg(short, long)]
        project: String,
        #[arg(short = 't', long = "type")]
        component_type: Option<String>,
    },
    /// Delete a component and remove it from all stacks.
    Delete { id: Uuid },
}

#[derive(clap::Subcommand, Debug)]
pub enum StackCommand {
    /// Create a stack from existing components.
    Create {
        name: String,
        #[arg(short, long)]
        project: String,
        /// Component id; repeat for each component.
        #[arg(short, long = "component")]
        components: Vec<Uuid>,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(long)]
        shared: bool,
    },
    /// Show a stack with its components.
    Describe { id: Uuid },
    /// List the stacks of a project.
    List {
        #[arg(short, long)]
        project: String,
    },
    /// Delete a stack.
    Delete { id: Uuid },
}

#[derive(clap::Subcommand, Debug)]
pub enum RoleCommand {
    /// Create a role.
    Create {
        name: String,
        /// Permission (read, write, me); repeat for each permission.
        #[arg(short, long = "permission")]
        permissions: Vec<String>,
    },
    /// Assign a role to a user or team.
    Assign {
        role: String,
        #[arg(short, long, conflicts_with = "team", required_unless_present = "team")]
        user: Option<String>,
        #[arg(short, long)]
        team: Option<String>,
        /// Restrict the assignment to a project.
        #[arg(short, long)]
        project: Option<String>,
    },
    /// List roles and their assignments.
    List,
}

#[derive(clap::Subcommand, Debug)]
pub enum FlavorCommand {
    /// List known flavors.
    List {
        #[arg(short = 't', long = "type")]
        component_type: Option<String>,
        /// Include custom flavors stored in this project.
        #[arg(short, long)]
        project: Option<String>,
    },
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = parse_cli();
    run_with_cli(cli).await
}

/// Run the CLI with pre-parsed arguments.
///
/// Store errors are reported with their stable code, e.g.
/// `error[NOT_FOUND]: No project found for 'p1'`.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = StoreConfig::from_env()?;
    if let Some(url) = &cli.database_url {
        config = config.with_database_url(url.clone());
    }
    config.validate()?;

    let db = Database::connect_with(&config).await.map_err(report)?;
    db.run_migrations().await.map_err(report)?;

    let result = dispatch(&db, cli.command).await;
    db.close().await;

    result.map_err(|err| match err.downcast::<StoreError>() {
        Ok(store_err) => report(store_err),
        Err(other) => other,
    })
}

fn report(err: StoreError) -> anyhow::Error {
    anyhow!("error[{}]: {}", err.code(), err)
}

async fn dispatch(db: &Database, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            let tables = crate::storage::MigrationRunner::new(db.pool().clone())
                .existing_tables()
                .await?;
            info!(tables = tables.len(), "Store initialized");
            print_json(&json!({ "tables": tables }))
        }
        Commands::Project(cmd) => run_project(db, cmd).await,
        Commands::User(cmd) => run_user(db, cmd).await,
        Commands::Component(cmd) => run_component(db, cmd).await,
        Commands::Stack(cmd) => run_stack(db, cmd).await,
        Commands::Role(cmd) => run_role(db, cmd).await,
        Commands::Flavor(cmd) => run_flavor(db, cmd).await,
    }
}

async fn run_project(db: &Database, cmd: ProjectCommand) -> anyhow::Result<()> {
    match cmd {
        ProjectCommand::Create { name, description } => {
            let project = db
                .create_project(&ProjectCreate::new(name).with_description(description))
                .await?;
            print_json(&project)
        }
        ProjectCommand::List => print_json(&db.list_projects().await?),
        ProjectCommand::Describe { name } => {
            let project = db.get_project_by_name(&name).await?;
            let stacks = db.list_project_stacks(project.id).await?;
            let components = db.list_project_components(project.id).await?;
            print_json(&json!({
                "project": project,
                "stacks": stacks,
                "components": components,
            }))
        }
        ProjectCommand::Delete { name } => {
            let project = db.get_project_by_name(&name).await?;
            db.delete_project(project.id).await?;
            print_json(&json!({ "deleted": project.id }))
        }
    }
}

async fn run_user(db: &Database, cmd: UserCommand) -> anyhow::Result<()> {
    match cmd {
        UserCommand::Create {
            name,
            full_name,
            email,
            password,
        } => {
            let mut create = UserCreate::new(name).with_full_name(full_name);
            create.email = email;
            create.password = password;
            print_json(&db.create_user(&create).await?)
        }
        UserCommand::List => print_json(&db.list_users().await?),
        UserCommand::Delete { name } => {
            let user = db.get_user_by_name(&name).await?;
            db.delete_user(user.id).await?;
            print_json(&json!({ "deleted": user.id }))
        }
    }
}

async fn run_component(db: &Database, cmd: ComponentCommand) -> anyhow::Result<()> {
    match cmd {
        ComponentCommand::Register {
            name,
            component_type,
            flavor,
            project,
            user,
            config,
            shared,
        } => {
            let project = db.get_project_by_name(&project).await?;
            let mut create =
                ComponentCreate::new(name, component_type.parse()?, flavor, project.id);
            if let Some(user) = user {
                create.user = Some(db.get_user_by_name(&user).await?.id);
            }
            if let Some(config) = config {
                create.configuration = parse_configuration(&config)?;
            }
            create.is_shared = shared;

            let mut registry = FlavorRegistry::with_builtins();
            registry.load_from_store(db, project.id).await?;
            registry.validate_component(&create)?;

            print_json(&db.create_component(&create).await?)
        }
        ComponentCommand::List {
            project,
            component_type,
        } => {
            let project = db.get_project_by_name(&project).await?;
            let mut filter = ComponentFilter::new().with_project(project.id);
            if let Some(component_type) = component_type {
                filter = filter.with_type(component_type.parse()?);
            }
            print_json(&db.list_components(&filter).await?)
        }
        ComponentCommand::Delete { id } => {
            db.delete_component(id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

async fn run_stack(db: &Database, cmd: StackCommand) -> anyhow::Result<()> {
    match cmd {
        StackCommand::Create {
            name,
            project,
            components,
            user,
            shared,
        } => {
            let project = db.get_project_by_name(&project).await?;
            let mut create = StackCreate::new(name, project.id);
            create.components = components;
            create.is_shared = shared;
            if let Some(user) = user {
                create.user = Some(db.get_user_by_name(&user).await?.id);
            }
            print_json(&db.create_stack(&create).await?)
        }
        StackCommand::Describe { id } => print_json(&db.get_stack(id).await?),
        StackCommand::List { project } => {
            let project = db.get_project_by_name(&project).await?;
            print_json(
                &db.list_stacks(&StackFilter::new().with_project(project.id))
                    .await?,
            )
        }
        StackCommand::Delete { id } => {
            db.delete_stack(id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

async fn run_role(db: &Database, cmd: RoleCommand) -> anyhow::Result<()> {
    match cmd {
        RoleCommand::Create { name, permissions } => {
            let mut create = RoleCreate::new(name);
            for permission in &permissions {
                create = create.with_permission(permission.parse::<PermissionType>()?);
            }
            print_json(&db.create_role(&create).await?)
        }
        RoleCommand::Assign {
            role,
            user,
            team,
            project,
        } => {
            let role = db.get_role_by_name(&role).await?;
            let mut assignment = match (user, team) {
                (Some(user), _) => {
                    RoleAssignmentCreate::for_user(role.id, db.get_user_by_name(&user).await?.id)
                }
                (None, Some(team)) => {
                    RoleAssignmentCreate::for_team(role.id, db.get_team_by_name(&team).await?.id)
                }
                (None, None) => bail!("either --user or --team is required"),
            };
            if let Some(project) = project {
                assignment = assignment.in_project(db.get_project_by_name(&project).await?.id);
            }
            print_json(&db.assign_role(&assignment).await?)
        }
        RoleCommand::List => {
            let mut listing = Vec::new();
            for role in db.list_roles().await? {
                let assignments = db
                    .list_role_assignments(&RoleAssignmentFilter::new().with_role(role.id))
                    .await?;
                listing.push(json!({ "role": role, "assignments": assignments }));
            }
            print_json(&listing)
        }
    }
}

async fn run_flavor(db: &Database, cmd: FlavorCommand) -> anyhow::Result<()> {
    match cmd {
        FlavorCommand::List {
            component_type,
            project,
        } => {
            let mut registry = FlavorRegistry::with_builtins();
            if let Some(project) = project {
                let project = db.get_project_by_name(&project).await?;
                registry.load_from_store(db, project.id).await?;
            }

            let flavors = match component_type {
                Some(t) => registry.flavors_for(t.parse::<StackComponentType>()?),
                None => registry.all(),
            };
            print_json(&flavors)
        }
    }
}

/// Parses a component configuration given on the command line.
fn parse_configuration(raw: &str) -> anyhow::Result<ComponentConfiguration> {
    let value: Value = serde_json::from_str(raw).context("configuration is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("configuration must be a JSON object, got {}", other),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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
    fn test_parse_component_register() {
        let cli = Cli::try_parse_from([
            "stack-metastore",
            "--database-url",
            "sqlite::memory:",
            "component",
            "register",
            "orch",
            "--type",
            "orchestrator",
            "--flavor",
            "local",
            "--project",
            "p1",
            "--config",
            r#"{"synchronous": true}"#,
        ])
        .unwrap();

        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        match cli.command {
            Commands::Component(ComponentCommand::Register {
                name,
                component_type,
                config,
                shared,
                ..
            }) => {
                assert_eq!(name, "orch");
                assert_eq!(component_type, "orchestrator");
                assert!(config.is_some());
                assert!(!shared);
            }
            _ => panic!("expected component register"),
        }
    }

    #[test]
    fn test_parse_stack_create_with_components() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "stack-metastore",
            "stack",
            "create",
            "s1",
            "--project",
            "p1",
            "--component",
            &a.to_string(),
            "--component",
            &b.to_string(),
        ])
        .unwrap();

        match cli.command {
            Commands::Stack(StackCommand::Create { components, .. }) => {
                assert_eq!(components, vec![a, b]);
            }
            _ => panic!("expected stack create"),
        }
    }

    #[test]
    fn test_role_assign_requires_assignee() {
        let result = Cli::try_parse_from(["stack-metastore", "role", "assign", "admin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_configuration() {
        let config = parse_configuration(r#"{"a": {"b": [1, 2]}}"#).unwrap();
        assert_eq!(config["a"]["b"][1], 2);

        assert!(parse_configuration("[1, 2]").is_err());
        assert!(parse_configuration("{not json").is_err());
    }

    #[test]
    fn test_store_errors_keep_their_code() {
        let err = report(StoreError::not_found("project", "p1"));
        assert_eq!(err.to_string(), "error[NOT_FOUND]: No project found for 'p1'");
    }
}
