//! Autodeploy CLI
//!
//! Command-line driver for the deployment engine.

use std::path::PathBuf;

use autodeploy::{
    is_truthy, AddParams, AddRequest, AddResponse, DeployConfig, Deployer, Error, RefSpec,
    RefSpecError,
};

const USAGE: &str = "\
Usage: autodeploy <command>

Commands:
  add <origin> [--tag T | --branch B | --commit C] [--dirname D] [--update V] [--no-launch]
  list
  setup <project-dir>
  launch <project-dir>
  stop <project-dir> [--wait]

Environment variables:
  AUTODEPLOY_ROOT    Project root (default: parent of the current directory)
  AUTODEPLOY_CONFIG  Engine configuration file (TOML)
  RUST_LOG           Log filter (default: info)";

/// Exit code for requests rejected before any work was done.
const EXIT_USAGE: i32 = 2;

enum Command {
    Add {
        request: AddRequest,
        no_launch: bool,
    },
    List,
    Setup(PathBuf),
    Launch(PathBuf),
    Stop {
        project_dir: PathBuf,
        wait: bool,
    },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let (command, rest) = args.split_first().ok_or("missing command")?;

    match command.as_str() {
        "add" => {
            let mut request = AddRequest::default();
            let mut no_launch = false;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                let mut value = |flag: &str| {
                    iter.next()
                        .cloned()
                        .ok_or_else(|| format!("{} requires a value", flag))
                };
                match arg.as_str() {
                    "--tag" => request.tag = Some(value(arg)?),
                    "--branch" => request.branch = Some(value(arg)?),
                    "--commit" => request.commit = Some(value(arg)?),
                    "--dirname" => request.dirname = Some(value(arg)?),
                    "--update" => request.update = Some(serde_json::Value::String(value(arg)?)),
                    "--no-launch" => no_launch = true,
                    flag if flag.starts_with("--") => return Err(format!("unknown flag {}", flag)),
                    origin if request.origin.is_none() => request.origin = Some(origin.to_string()),
                    extra => return Err(format!("unexpected argument {}", extra)),
                }
            }
            Ok(Command::Add { request, no_launch })
        }
        "list" => Ok(Command::List),
        "setup" => Ok(Command::Setup(project_dir(rest)?)),
        "launch" => Ok(Command::Launch(project_dir(rest)?)),
        "stop" => Ok(Command::Stop {
            project_dir: project_dir(rest)?,
            wait: rest.iter().any(|a| a == "--wait"),
        }),
        other => Err(format!("unknown command {}", other)),
    }
}

fn project_dir(rest: &[String]) -> Result<PathBuf, String> {
    rest.iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| "missing project directory".to_string())
}

/// Request parameters, falling back to the default branch when no ref is selected.
fn add_params(request: &AddRequest) -> autodeploy::Result<AddParams> {
    match request.validate() {
        Err(Error::InvalidRefSpec(RefSpecError::Missing)) => Ok(AddParams {
            origin: request.origin.clone().unwrap_or_default(),
            ref_spec: RefSpec::Default,
            dirname: request.dirname.clone().filter(|d| !d.is_empty()),
            do_update: request.update.as_ref().is_some_and(is_truthy),
        }),
        other => other,
    }
}

fn project_root() -> std::io::Result<PathBuf> {
    if let Some(root) = std::env::var_os("AUTODEPLOY_ROOT") {
        return Ok(PathBuf::from(root));
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.parent().map(PathBuf::from).unwrap_or(cwd))
}

fn run(command: Command, root: PathBuf, mut config: DeployConfig) -> autodeploy::Result<String> {
    match command {
        Command::Add { request, no_launch } => {
            let params = add_params(&request)?;
            if no_launch {
                config.launch_after_setup = false;
            }
            let outcome = Deployer::new(root, config).add(&params)?;
            tracing::info!(slot = %outcome.slot.display(), "deployment slot ready");
            Ok(serde_json::to_string(&AddResponse::from(&outcome))?)
        }
        Command::List => {
            let projects = Deployer::new(root, config).list()?;
            Ok(serde_json::to_string_pretty(&projects)?)
        }
        Command::Setup(dir) => {
            let success = Deployer::new(root, config).setup(&dir)?;
            Ok(serde_json::to_string(&AddResponse { success })?)
        }
        Command::Launch(dir) => {
            Deployer::new(root, config).launch(&dir)?;
            Ok(format!("launched {}", dir.display()))
        }
        Command::Stop { project_dir, wait } => {
            Deployer::new(root, config).stop(&project_dir, wait)?;
            Ok(format!("stopped {}", project_dir.display()))
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse args (basic hand parsing, as the command surface is small)
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("{}\n\n{}", msg, USAGE);
            std::process::exit(EXIT_USAGE);
        }
    };

    let root = match project_root() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Cannot determine project root: {}", e);
            std::process::exit(1);
        }
    };
    let config = match DeployConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Engine calls block for as long as fetches and installs take.
    let result = tokio::task::spawn_blocking(move || run(command, root, config)).await;

    match result {
        Ok(Ok(output)) => println!("{}", output),
        Ok(Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(if e.is_client_error() { EXIT_USAGE } else { 1 });
        }
        Err(e) => {
            eprintln!("engine task failed: {}", e);
            std::process::exit(1);
        }
    }
}
