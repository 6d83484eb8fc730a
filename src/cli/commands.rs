//! Command dispatch: turns parsed arguments into includer runs

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::{Includer, IoResultExt};
use crate::cli::args::{Cli, Commands, ConfigCommands, ResolveArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;
use crate::util::path::PathExt;

/// What every command needs: where the project is and how it is configured.
#[derive(Debug)]
pub struct Context {
    pub project_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub settings: Settings,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let project_dir = match &cli.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| InfraError::io("determine working directory", e))?,
        };
        let project_dir = std::fs::canonicalize(&project_dir)
            .map_err(|source| InfraError::ProjectDir {
                path: project_dir.clone(),
                source,
            })?;
        let settings = Settings::load(Some(&project_dir), cli.config.as_deref())?;
        debug!("context: project_dir={}", project_dir.display());

        Ok(Self {
            project_dir,
            config_file: cli.config.clone(),
            settings,
        })
    }
}

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Some(command) => {
            let ctx = Context::from_cli(cli)?;
            execute_with_context(&ctx, command)
        }
        None => Err(CliError::Usage(
            "no command given, see `sniff --help`".to_string(),
        )),
    }
}

pub fn execute_with_context(ctx: &Context, command: &Commands) -> CliResult<()> {
    match command {
        Commands::Build {
            resolve,
            output,
            copy_dest,
            no_trim,
            keep_pragma,
        } => {
            let mut settings = ctx.settings.clone();
            if let Some(dest) = copy_dest {
                settings.copy_destination_dir = dest.to_string_lossy_owned();
            }
            if *no_trim {
                settings.trim_output = false;
            }
            if *keep_pragma {
                settings.remove_leading_pragma = false;
            }
            let text = build(ctx, settings, resolve)?;
            emit(&text, output.as_deref())
        }
        Commands::Tree { resolve, resume } => {
            let includer = resolve_roots(ctx, ctx.settings.clone(), resolve)?.0;
            let map = includer.dependency_map();
            output::info(&map.to_termtree());
            if *resume {
                output::header("Summary");
                for line in map.to_resume().lines() {
                    output::detail(&line);
                }
            }
            Ok(())
        }
        Commands::Files {
            resolve,
            url,
            dir,
            output,
        } => {
            let includer = resolve_roots(ctx, ctx.settings.clone(), resolve)?.0;
            let list = includer.dependency_map().to_dependency_list(dir, *url);
            emit(list.trim_end(), output.as_deref())
        }
        Commands::Scripts { resolve, dir } => {
            let includer = resolve_roots(ctx, ctx.settings.clone(), resolve)?.0;
            output::info(includer.dependency_map().to_html(dir).trim_end());
            Ok(())
        }
        Commands::Config { command } => config(ctx, command),
        Commands::Completion { .. } => Ok(()),
    }
}

/// Resolve every root and join their outputs.
#[instrument(level = "debug", skip(ctx, settings))]
pub fn build(ctx: &Context, settings: Settings, resolve: &ResolveArgs) -> CliResult<String> {
    let (_, outputs) = resolve_roots(ctx, settings, resolve)?;
    Ok(outputs.iter().filter(|o| !o.is_empty()).join("\n"))
}

/// One includer session over all roots, so files shared by several roots
/// are emitted once.
fn resolve_roots(
    ctx: &Context,
    mut settings: Settings,
    resolve: &ResolveArgs,
) -> CliResult<(Includer, Vec<String>)> {
    if let Some(source_dir) = &resolve.source_dir {
        settings.source_dir = source_dir.clone();
    }
    let container = ServiceContainer::new(settings, &ctx.project_dir);
    let mut includer = container.includer()?;

    let mut outputs = Vec::with_capacity(resolve.roots.len());
    for root in &resolve.roots {
        debug!("resolve_roots: root={}", root.display());
        outputs.push(includer.resolve(root, None)?);
    }
    Ok((includer, outputs))
}

fn emit(text: &str, target: Option<&Path>) -> CliResult<()> {
    match target {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_path_context("create directory", parent)?;
            }
            std::fs::write(path, text).with_path_context("write output", path)?;
            output::action("Written", &path.display());
            Ok(())
        }
        None => {
            output::info(text);
            Ok(())
        }
    }
}

fn config(ctx: &Context, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&ctx.settings.to_toml()?);
        }
        ConfigCommands::Template => {
            output::info(&Settings::template());
        }
        ConfigCommands::Path => {
            let local = ctx
                .config_file
                .clone()
                .unwrap_or_else(|| local_config_path(&ctx.project_dir));
            let describe = |path: &Path| {
                if path.exists() {
                    format!("{} (exists)", path.display())
                } else {
                    format!("{} (not found)", path.display())
                }
            };
            match global_config_path() {
                Some(global) => output::detail(&format!("global: {}", describe(&global))),
                None => output::warning("no config directory on this platform"),
            }
            output::detail(&format!("local:  {}", describe(&local)));
        }
    }
    Ok(())
}
