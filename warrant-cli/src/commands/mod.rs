//! Command handlers
//!
//! Each authorization command renders its result to a string so the
//! handlers can be exercised against an in-memory registry.

pub mod config;

use anyhow::{Context as _, Result};
use tracing::info;
use warrant_config::WarrantConfig;
use warrant_rbac::{
    AuthScope, Context, JoinRecord, NewPermission, NewRole, Permission, PermissionCapable,
    Registry, Role, RoleCapable, ScopeSettings,
};
use warrant_storage::DatabaseConnection;

use crate::cli::{Commands, ContextArgs};

/// Connect to the configured database and run one authorization command
pub async fn run(command: &Commands, config: &WarrantConfig, scope: &str) -> Result<()> {
    if let Commands::InitSchema = command {
        return init_schema(config).await;
    }

    let registry = Registry::connect(config)
        .await
        .context("Failed to open auth scopes")?;
    let output = execute(command, registry.scope(scope)?).await?;
    println!("{}", output);
    Ok(())
}

async fn init_schema(config: &WarrantConfig) -> Result<()> {
    let connection = DatabaseConnection::new(config.database.clone())
        .await
        .context("Failed to connect to database")?;

    for (name, scope_config) in &config.scopes {
        let settings = ScopeSettings::from_config(name.clone(), scope_config)?;
        connection.create_schema(&settings.tables).await?;
        info!("Created tables for scope '{}'", name);
        println!("{}: {}", name, settings.tables.roles);
    }
    Ok(())
}

fn parse_context(args: &ContextArgs) -> Result<Context> {
    Context::parse(args.context.as_str())
        .with_context(|| format!("Invalid context '{}'", args.context))
}

fn parse_binding(bound_to: Option<&String>) -> Result<Option<Context>> {
    bound_to
        .map(|raw| {
            Context::parse(raw.as_str()).with_context(|| format!("Invalid context '{}'", raw))
        })
        .transpose()
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn describe_role(role: &Role) -> String {
    format!("{}\t{}\tlevel={}\t{}", role.id, role.slug, role.level, role.context())
}

fn describe_permission(permission: &Permission) -> String {
    format!("{}\t{}\t{}", permission.id, permission.slug, permission.context())
}

fn render_list<T, F>(items: &[T], format: &str, describe: F) -> Result<String>
where
    T: serde::Serialize,
    F: Fn(&T) -> String,
{
    match format.to_lowercase().as_str() {
        "json" => serde_json::to_string_pretty(items).context("Failed to serialize to JSON"),
        "text" => Ok(items.iter().map(describe).collect::<Vec<_>>().join("\n")),
        other => Err(anyhow::anyhow!(
            "Unsupported format: {}. Use 'text' or 'json'",
            other
        )),
    }
}

/// Run an authorization command against one scope
pub async fn execute(command: &Commands, scope: &AuthScope) -> Result<String> {
    match command {
        Commands::CreateRole {
            slug,
            level,
            name,
            bound_to,
        } => {
            let mut role = NewRole::new(slug.as_str(), *level);
            if let Some(name) = name {
                role = role.named(name.as_str());
            }
            if let Some(context) = parse_binding(bound_to.as_ref())? {
                role = role.in_context(context);
            }
            let role = scope.create_role(role).await?;
            Ok(describe_role(&role))
        }
        Commands::CreatePermission {
            slug,
            name,
            bound_to,
        } => {
            let mut permission = NewPermission::new(slug.as_str());
            if let Some(name) = name {
                permission = permission.named(name.as_str());
            }
            if let Some(context) = parse_binding(bound_to.as_ref())? {
                permission = permission.in_context(context);
            }
            let permission = scope.create_permission(permission).await?;
            Ok(describe_permission(&permission))
        }
        Commands::AssignRole {
            subject,
            role,
            context,
        } => {
            let assignment = scope
                .subject(*subject)
                .assign_role(role.as_str().into(), &parse_context(context)?, context.force_context)
                .await?;
            Ok(match assignment {
                Some(join) => format!("assigned {} to {} in {}", role, subject, join.context()),
                None => format!("role '{}' not found for {}", role, context.context),
            })
        }
        Commands::UnassignRole {
            subject,
            role,
            context,
        } => {
            let removed = scope
                .subject(*subject)
                .unassign_role(role.as_str().into(), &parse_context(context)?, context.force_context)
                .await?;
            Ok(flag(removed))
        }
        Commands::HasRole {
            subject,
            role,
            context,
        } => {
            let held = scope
                .subject(*subject)
                .has_role(role.as_str().into(), &parse_context(context)?, context.force_context)
                .await?;
            Ok(flag(held))
        }
        Commands::HasRoleOrHigher {
            subject,
            role,
            context,
        } => {
            let held = scope
                .subject(*subject)
                .has_role_or_higher(role.as_str().into(), &parse_context(context)?, context.force_context)
                .await?;
            Ok(flag(held))
        }
        Commands::Roles {
            subject,
            context,
            format,
        } => {
            let roles = scope
                .subject(*subject)
                .roles_for(&parse_context(context)?, context.force_context)
                .await?;
            render_list(&roles, format, describe_role)
        }
        Commands::HighestRole { subject, context } => {
            let role = scope
                .subject(*subject)
                .highest_role(&parse_context(context)?, context.force_context)
                .await?;
            Ok(role.as_ref().map(describe_role).unwrap_or_else(|| "none".to_string()))
        }
        Commands::Grant {
            role,
            permission,
            context,
        } => {
            let grant = scope
                .permissions()?
                .grant_to_role(
                    role.as_str(),
                    permission.as_str(),
                    &parse_context(context)?,
                    context.force_context,
                )
                .await?;
            Ok(match grant {
                Some(join) => format!("granted {} to {} in {}", permission, role, join.context()),
                None => format!("role or permission not found for {}", context.context),
            })
        }
        Commands::AssignPermission {
            subject,
            permission,
            context,
        } => {
            let assignment = scope
                .subject(*subject)
                .assign_permission(
                    permission.as_str().into(),
                    &parse_context(context)?,
                    context.force_context,
                )
                .await?;
            Ok(match assignment {
                Some(join) => format!("assigned {} to {} in {}", permission, subject, join.context()),
                None => format!("permission '{}' not found for {}", permission, context.context),
            })
        }
        Commands::HasPermission {
            subject,
            permission,
            context,
        } => {
            let held = scope
                .subject(*subject)
                .has_permission(
                    permission.as_str().into(),
                    &parse_context(context)?,
                    context.force_context,
                )
                .await?;
            Ok(flag(held))
        }
        Commands::Permissions {
            subject,
            context,
            format,
        } => {
            let permissions = scope
                .subject(*subject)
                .permissions_for(&parse_context(context)?, context.force_context)
                .await?;
            render_list(&permissions, format, describe_permission)
        }
        Commands::InitSchema | Commands::Config { .. } => Err(anyhow::anyhow!(
            "Command is not scoped to an auth scope"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    async fn run_line(scope: &AuthScope, line: &[&str]) -> Result<String> {
        let args = std::iter::once("warrant").chain(line.iter().copied());
        let cli = Cli::try_parse_from(args)?;
        let command = cli.command.ok_or_else(|| anyhow::anyhow!("no command"))?;
        execute(&command, scope).await
    }

    fn scope() -> AuthScope {
        let registry = Registry::in_memory(&WarrantConfig::default()).unwrap();
        registry.default_scope().unwrap().clone()
    }

    #[tokio::test]
    async fn test_role_commands() {
        let scope = scope();
        run_line(&scope, &["create-role", "admin", "--level", "10"]).await.unwrap();
        run_line(&scope, &["create-role", "editor", "--level", "5", "--name", "Editor"])
            .await
            .unwrap();

        let out = run_line(&scope, &["assign-role", "1", "editor", "--context", "Post:42"])
            .await
            .unwrap();
        assert_eq!(out, "assigned editor to 1 in Post:42");

        let out = run_line(&scope, &["has-role", "1", "editor", "--context", "Post:42"])
            .await
            .unwrap();
        assert_eq!(out, "true");
        let out = run_line(&scope, &["has-role", "1", "editor", "--context", "Post:7"])
            .await
            .unwrap();
        assert_eq!(out, "false");

        let out = run_line(&scope, &["has-role-or-higher", "1", "admin", "--context", "Post:42"])
            .await
            .unwrap();
        assert_eq!(out, "false");

        let out = run_line(&scope, &["highest-role", "1", "--context", "Post:42"])
            .await
            .unwrap();
        assert!(out.contains("editor"));
        assert!(out.contains("level=5"));

        let out = run_line(&scope, &["unassign-role", "1", "editor", "--context", "Post:42"])
            .await
            .unwrap();
        assert_eq!(out, "true");
        let out = run_line(&scope, &["highest-role", "1", "--context", "Post:42"])
            .await
            .unwrap();
        assert_eq!(out, "none");
    }

    #[tokio::test]
    async fn test_permission_commands() {
        let scope = scope();
        run_line(&scope, &["create-role", "editor", "--level", "5"]).await.unwrap();
        run_line(&scope, &["create-permission", "publish"]).await.unwrap();
        run_line(&scope, &["create-permission", "comment"]).await.unwrap();

        let out = run_line(&scope, &["grant", "editor", "publish"]).await.unwrap();
        assert_eq!(out, "granted publish to editor in global");

        run_line(&scope, &["assign-role", "3", "editor", "--context", "Post"])
            .await
            .unwrap();
        run_line(&scope, &["assign-permission", "3", "comment", "--context", "Post:1"])
            .await
            .unwrap();

        let out = run_line(&scope, &["has-permission", "3", "publish", "--context", "Post:9"])
            .await
            .unwrap();
        assert_eq!(out, "true");

        let out = run_line(&scope, &["permissions", "3", "--context", "Post:1", "--format", "json"])
            .await
            .unwrap();
        let listed: Vec<Permission> = serde_json::from_str(&out).unwrap();
        let slugs: Vec<&str> = listed.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["publish", "comment"]);

        let out = run_line(&scope, &["roles", "3", "--context", "Post:1"]).await.unwrap();
        // Text rows show the role's own binding, not where it was assigned
        assert!(out.contains("editor"));
        assert!(out.ends_with("global"));
    }

    #[tokio::test]
    async fn test_missing_targets_and_bad_input() {
        let scope = scope();
        let out = run_line(&scope, &["assign-role", "1", "ghost"]).await.unwrap();
        assert_eq!(out, "role 'ghost' not found for global");

        assert!(run_line(&scope, &["has-role", "1", "ghost", "--context", ":4"])
            .await
            .is_err());
        assert!(run_line(&scope, &["roles", "1", "--format", "csv"]).await.is_err());
    }
}
