use acibuild::archive;
use acibuild::config::{resolve_home, Config};
use acibuild::constants::{LABEL_VERSION, VERSION};
use acibuild::logging;
use acibuild::manifest::appc::ImageManifest;
use acibuild::{Aci, BuildOptions, Services};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "acibuild", version)]
#[command(about = "Build, test and publish ACI images inside an isolated builder")]
struct Cli {
    /// Directory holding aci-manifest.yml
    #[arg(short = 'W', long, global = true, default_value = ".")]
    work_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, global = true, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_log: bool,

    /// Home directory holding config.yml
    #[arg(short = 'H', long, global = true, env = "ACIBUILD_HOME")]
    home: Option<PathBuf>,

    /// Clean the target before running the command
    #[arg(short = 'c', long, global = true)]
    clean: bool,

    /// Extra environment for the builder (NAME=value)
    #[arg(short = 'e', long = "set-env", global = true)]
    set_env: Vec<String>,

    /// Check dependencies one after the other
    #[arg(long, global = true)]
    serial: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Run(Operation),

    /// Clean build, optionally followed by another command
    Clean {
        #[command(subcommand)]
        then: Option<Operation>,
    },

    /// Generate dependency graph
    Graph,

    /// Display version of an aci
    AciVersion { file: PathBuf },

    /// Version of acibuild
    Version,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Build the aci
    Build(BuildFlags),
    /// Install the aci to the local rkt store
    Install(TestFlags),
    /// Push the aci
    Push(TestFlags),
    /// Test the aci
    Test(TesterFlags),
    /// Try the templater (experimental)
    Try,
    /// Sign the aci
    Sign,
}

#[derive(Args, Debug)]
struct BuildFlags {
    /// Keep builder container after exit
    #[arg(short = 'k', long)]
    keep_builder: bool,
    /// Trap to shell on build failed
    #[arg(short = 't', long)]
    trap_on_error: bool,
    /// Trap on all steps
    #[arg(short = 'T', long)]
    trap_on_step: bool,
}

#[derive(Args, Debug)]
struct TestFlags {
    /// Fail if no tests found
    #[arg(short = 'T', long)]
    no_test_fail: bool,
    /// Run tests first
    #[arg(short = 't', long)]
    test: bool,
}

#[derive(Args, Debug)]
struct TesterFlags {
    /// Fail if no tests found
    #[arg(short = 'T', long)]
    no_test_fail: bool,
    /// Keep aci & test builder container after exit
    #[arg(short = 'k', long)]
    keep_builder: bool,
}

impl Operation {
    fn apply(&self, options: &mut BuildOptions) {
        match self {
            Self::Build(f) => {
                options.keep_builder = f.keep_builder;
                options.catch_on_error = f.trap_on_error;
                options.catch_on_step = f.trap_on_step;
            }
            Self::Install(f) | Self::Push(f) => {
                options.no_test_fail = f.no_test_fail;
                options.test = f.test;
            }
            Self::Test(f) => {
                options.no_test_fail = f.no_test_fail;
                options.keep_builder = f.keep_builder;
            }
            Self::Try | Self::Sign => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.json_log)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match &cli.command {
        Command::Version => {
            println!("acibuild version {}", VERSION);
            return Ok(());
        }
        Command::AciVersion { file } => return print_aci_version(file),
        _ => {}
    }

    let config = Config::load(&resolve_home(cli.home.clone()))?;
    let services = Arc::new(Services::from_config(config)?);
    let mut options = BuildOptions {
        parallel_build: services.config.parallel_build && !cli.serial,
        set_env: cli.set_env.clone(),
        ..Default::default()
    };

    let result = match &cli.command {
        Command::Run(op) => {
            op.apply(&mut options);
            let aci = Aci::from_path(&cli.work_path, options, services)?;
            if cli.clean {
                aci.clean().await;
            }
            run(&aci, op).await
        }
        Command::Clean { then } => {
            if let Some(op) = then {
                op.apply(&mut options);
            }
            let aci = Aci::from_path(&cli.work_path, options, services)?;
            aci.clean().await;
            match then {
                Some(op) => run(&aci, op).await,
                None => Ok(()),
            }
        }
        Command::Graph => {
            let aci = Aci::from_path(&cli.work_path, options, services)?;
            aci.graph().await.map(|_| ())
        }
        Command::Version | Command::AciVersion { .. } => Ok(()),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result.map_err(Into::into)
}

async fn run(aci: &Aci, op: &Operation) -> acibuild::Result<()> {
    match op {
        Operation::Build(_) => aci.clean_and_build().await.map(|_| ()),
        Operation::Install(_) => {
            for hash in aci.install().await? {
                println!("{}", hash);
            }
            Ok(())
        }
        Operation::Push(_) => aci.push().await,
        Operation::Test(_) => aci.test().await,
        Operation::Try => aci.clean_and_try().await,
        Operation::Sign => aci.sign().await.map(|_| ()),
    }
}

fn print_aci_version(file: &Path) -> Result<()> {
    let content = archive::extract_manifest(file)?;
    let manifest = ImageManifest::from_json(&content).context("Invalid image manifest")?;
    println!("{}", manifest.label(LABEL_VERSION).unwrap_or_default());
    Ok(())
}
