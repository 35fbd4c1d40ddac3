mod config;
mod entitlements;
mod gate;
mod identity;
mod paths;
mod presets;
mod registry;
mod store;
mod theme;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::ToolpassConfig;
use entitlements::HttpEntitlementClient;
use gate::{fail_closed, AccessGate, AccessReason, UpgradePrompt, FREE_USE_LIMIT};
use identity::{HeaderAuthControl, HttpIdentityClient, IdentityClient};
use presets::{ImportOutcome, PresetManager};
use registry::{ToolBinding, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use store::{FilePrefStore, PrefStore};
use theme::{EnvSystemScheme, ThemeController};

#[derive(Parser)]
#[command(name = "toolpass")]
#[command(about = "Freemium access gate, presets, and theme preference for the tool suite")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a tool may be used right now
    Check {
        /// Tool name, e.g. word-counter
        tool: String,
    },
    /// Record one granted free use (call after the tool produced output)
    RecordUse { tool: String },
    /// Manage saved presets for a tool
    Preset {
        #[command(subcommand)]
        command: PresetCommands,
    },
    /// Show or change the theme preference
    Theme {
        #[command(subcommand)]
        command: ThemeCommands,
    },
    /// Inspect or end the current session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// List a tool's presets in saved order
    List { tool: String },
    /// Save a preset from the tool's current configuration (or --data)
    Save {
        tool: String,
        name: String,
        /// Inline JSON to save instead of capturing the current configuration
        #[arg(long)]
        data: Option<String>,
    },
    /// Print a preset's data (or apply it with --apply)
    Load {
        tool: String,
        name: String,
        /// Apply the preset to the tool's current configuration
        #[arg(long)]
        apply: bool,
    },
    /// Delete a preset (succeeds even if absent)
    Delete { tool: String, name: String },
    /// Rename a preset
    Rename {
        tool: String,
        old_name: String,
        new_name: String,
    },
    /// Write the tool's presets to a backup file
    Export {
        tool: String,
        /// Destination directory (defaults to ~/.toolpass/exports/)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Replace the tool's presets with the contents of a backup file
    Import { tool: String, file: PathBuf },
}

#[derive(Subcommand)]
enum ThemeCommands {
    /// Print the effective theme preference
    Show,
    /// Persist an explicit theme choice
    Set { theme: String },
    /// Flip between light and dark
    Toggle,
    /// Feed an OS scheme change into the controller
    Sync { scheme: String },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Show whether a session is present
    Status,
    /// Clear the session and notify the identity service
    SignOut,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ToolpassConfig::load()?;
    let store: Arc<dyn PrefStore> = Arc::new(FilePrefStore::open_default()?);

    match cli.command {
        Commands::Check { tool } => cmd_check(&config, store, &tool).await,
        Commands::RecordUse { tool } => cmd_record_use(&config, store, &tool),
        Commands::Preset { command } => cmd_preset(store, command),
        Commands::Theme { command } => cmd_theme(store, command),
        Commands::Auth { command } => cmd_auth(&config, command).await,
    }
}

async fn cmd_check(config: &ToolpassConfig, store: Arc<dyn PrefStore>, tool: &str) -> Result<()> {
    let identity = Arc::new(HttpIdentityClient::new(config.clone())?);
    let entitlements = Arc::new(HttpEntitlementClient::new(config.clone()));
    let gate = AccessGate::new(identity, entitlements, store);

    let decision = fail_closed(gate.check_access(tool).await);

    match decision.reason {
        AccessReason::Paid => println!("{}: access granted (paid)", tool),
        AccessReason::FreeTrial => println!(
            "{}: access granted (free trial, {} of {} uses remaining)",
            tool,
            decision.uses_remaining.unwrap_or(0),
            FREE_USE_LIMIT
        ),
        AccessReason::LimitReached => println!("{}: access denied (free uses exhausted)", tool),
        AccessReason::Error => println!("{}: access denied (check failed)", tool),
    }

    if let Some(prompt) = UpgradePrompt::for_decision(&decision, config) {
        println!("  purchase: {}", prompt.purchase_url);
        println!("  plans:    {}", prompt.plans_url);
        if prompt.dismissible {
            println!("  (dismissible: free uses remain)");
        }
    }

    Ok(())
}

fn cmd_record_use(config: &ToolpassConfig, store: Arc<dyn PrefStore>, tool: &str) -> Result<()> {
    let identity = Arc::new(HttpIdentityClient::new(config.clone())?);
    let entitlements = Arc::new(HttpEntitlementClient::new(config.clone()));
    let gate = AccessGate::new(identity, entitlements, store);

    let count = gate.increment_free_uses(tool);
    let remaining = FREE_USE_LIMIT.saturating_sub(count);
    println!("{}: recorded use {} ({} free uses remaining)", tool, count, remaining);
    Ok(())
}

/// Binds a tool to its live configuration file under `~/.toolpass/current/`.
fn file_binding(tool: &str) -> Result<ToolBinding> {
    let capture_path = paths::current_config_path(tool)?;
    let apply_path = capture_path.clone();
    let tool_name = tool.to_string();

    Ok(ToolBinding::new(
        move || {
            if !capture_path.exists() {
                bail!("No current configuration for tool '{}'", tool_name);
            }
            let content = std::fs::read_to_string(&capture_path).with_context(|| {
                format!("Failed to read current configuration: {}", capture_path.display())
            })?;
            serde_json::from_str(&content).context("Current configuration is not valid JSON")
        },
        move |data| {
            let content =
                serde_json::to_string_pretty(data).context("Failed to serialize configuration")?;
            std::fs::write(&apply_path, content).with_context(|| {
                format!("Failed to write current configuration: {}", apply_path.display())
            })
        },
    ))
}

fn cmd_preset(store: Arc<dyn PrefStore>, command: PresetCommands) -> Result<()> {
    let manager = PresetManager::new(Arc::clone(&store));

    match command {
        PresetCommands::List { tool } => {
            let presets = manager.list(&tool);
            if presets.is_empty() {
                println!("No presets saved for {}", tool);
                return Ok(());
            }
            for preset in presets {
                println!("{}  (updated {})", preset.name, preset.updated);
            }
        }
        PresetCommands::Save { tool, name, data } => {
            match data {
                Some(raw) => {
                    let value =
                        serde_json::from_str(&raw).context("--data is not valid JSON")?;
                    manager.save(&tool, &name, value)?;
                }
                None => {
                    let mut registry = ToolRegistry::new(manager);
                    registry.register(tool.clone(), file_binding(&tool)?);
                    registry.save_current(&tool, &name)?;
                }
            }
            println!("Saved preset '{}' for {}", name, tool);
        }
        PresetCommands::Load { tool, name, apply } => {
            if apply {
                let mut registry = ToolRegistry::new(manager);
                registry.register(tool.clone(), file_binding(&tool)?);
                registry.load_into(&tool, &name)?;
                println!("Applied preset '{}' to {}", name, tool);
            } else {
                match manager.load(&tool, &name) {
                    Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                    None => bail!("No preset named '{}' for tool '{}'", name, tool),
                }
            }
        }
        PresetCommands::Delete { tool, name } => {
            manager.delete(&tool, &name);
            println!("Deleted preset '{}' for {}", name, tool);
        }
        PresetCommands::Rename { tool, old_name, new_name } => {
            if !manager.rename(&tool, &old_name, &new_name) {
                bail!("No preset named '{}' for tool '{}'", old_name, tool);
            }
            println!("Renamed '{}' to '{}'", old_name, new_name);
        }
        PresetCommands::Export { tool, dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => paths::exports_dir()?,
            };
            let path = manager.export_to(&tool, &dir)?;
            println!("Exported presets to {}", path.display());
        }
        PresetCommands::Import { tool, file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read import file: {}", file.display()))?;
            match manager.import(&tool, &contents) {
                ImportOutcome::Replaced { count } => {
                    println!("Imported {} presets for {}", count, tool);
                }
                ImportOutcome::Rejected { message } => bail!(message),
            }
        }
    }

    Ok(())
}

fn cmd_theme(store: Arc<dyn PrefStore>, command: ThemeCommands) -> Result<()> {
    let controller = ThemeController::new(store, Arc::new(EnvSystemScheme));

    match command {
        ThemeCommands::Show => println!("{}", controller.preference()),
        ThemeCommands::Set { theme } => {
            let theme = theme.parse().map_err(anyhow::Error::msg)?;
            controller.apply(theme);
            println!("Theme set to {}", theme);
        }
        ThemeCommands::Toggle => {
            let theme = controller.toggle();
            println!("Theme set to {}", theme);
        }
        ThemeCommands::Sync { scheme } => {
            let scheme = scheme.parse().map_err(anyhow::Error::msg)?;
            controller.system_scheme_changed(scheme);
            println!("Theme now {}", controller.active());
        }
    }

    Ok(())
}

async fn cmd_auth(config: &ToolpassConfig, command: AuthCommands) -> Result<()> {
    let client = HttpIdentityClient::new(config.clone())?;

    match command {
        AuthCommands::Status => {
            let session = client.get_session().await?;
            let control = HeaderAuthControl::for_session(session.as_ref());
            println!("signed_in: {}", control.signed_in);
            if let Some(session) = session {
                match &session.email {
                    Some(email) => println!("account: {}", email),
                    None => println!("account: {}", session.user_id),
                }
            }
        }
        AuthCommands::SignOut => {
            client.sign_out().await?;
            println!("Signed out");
        }
    }

    Ok(())
}
