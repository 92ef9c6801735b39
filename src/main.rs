/// Kubernetes continuous integration deployments
use clap::{Parser, ValueEnum};
use kcid::cluster::KubeCluster;
use kcid::config::Store;
use kcid::deployer::Deployer;
use kcid::tag::Tag;
use kcid::template::Directory;
use kcid::Error;
use log::{debug, error, info};
use std::path::PathBuf;

/// Deploy a set of components, pinned to repository revisions, into their own namespace.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// What to do with the deployment described by `--repos`.
    action: Option<Action>,

    /// Repository and the revision to deploy from it. Repeatable.
    #[arg(long = "repos", value_name = "REPOSITORY=REVISION")]
    repos: Vec<String>,

    /// Save which components belong to a repository, then exit. Repeatable.
    #[arg(long = "config", value_name = "REPOSITORY=COMPONENT,...")]
    config: Vec<String>,

    /// Path to the kubeconfig file. Defaults to the standard kubeconfig discovery.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Directory holding the per-component resource templates.
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Delete everything again if `create` fails part way.
    #[arg(long)]
    rollback_on_failure: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    /// Create the namespace and all resources.
    Create,
    /// Delete all resources and the namespace.
    Delete,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err.to_string());
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    let args = Cli::parse();
    let store = Store::from_home()?;

    if !args.config.is_empty() {
        let mut repositories = store.load_repositories_or_default()?;
        for assignment in &args.config {
            repositories.assign(assignment)?;
        }
        store.save_repositories(&repositories)?;
        info!("Configuration file saved to {}", store.repositories_path().display());
        return Ok(());
    }

    let action = args
        .action
        .ok_or_else(|| Error::Usage("expected 'create' or 'delete'".to_string()))?;

    let tags = args
        .repos
        .iter()
        .map(|raw| raw.parse::<Tag>())
        .collect::<Result<Vec<_>, _>>()?;

    let settings = store.load_settings()?;
    let repositories = store.load_repositories()?;
    let templates_dir = args.templates.unwrap_or(settings.templates_dir);
    debug!("Reading templates from {}", templates_dir.display());

    let mut deployer = Deployer::new(&tags, &repositories, &Directory::new(templates_dir))?
        .rollback_on_failure(args.rollback_on_failure || settings.rollback_on_failure);

    let kubeconfig = args.kubeconfig.or(settings.kubeconfig);
    let cluster = KubeCluster::connect(kubeconfig.as_deref())
        .await
        .map_err(Error::Cluster)?;

    match action {
        Action::Create => {
            let endpoints = deployer.create(&cluster).await?;
            println!("\nExposed services");
            for endpoint in endpoints {
                println!("{endpoint}");
            }
            Ok(())
        }
        Action::Delete => deployer.delete(&cluster).await,
    }
}
