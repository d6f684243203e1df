use crate::{CleanArgs, build::base_path_from_config, config::Config};

pub async fn run(args: &CleanArgs) -> Result<(), anyhow::Error> {
    let config_path = Config::path_from_arg(args.config_file.as_deref())?;
    let config = Config::load(&config_path)?;

    // Get the base path for resolving relative paths
    let base_path = base_path_from_config(&config_path);
    let paths = config.paths.resolve(&base_path);

    // Never delete a tree that holds sources
    if paths.content.starts_with(&paths.output) || paths.templates.starts_with(&paths.output) {
        return Err(anyhow::anyhow!(
            "Refusing to delete {}: it contains the content or template directory",
            paths.output.display()
        ));
    }

    let site_path = paths.output.canonicalize().unwrap_or(paths.output);
    if site_path.exists() {
        if args.dry_run {
            println!("Would delete {}", site_path.display());
        } else {
            tokio::fs::remove_dir_all(&site_path).await?;
            println!("Deleted {}", site_path.display());
        }
    } else {
        println!("Nothing to clean at {}", site_path.display());
    }

    Ok(())
}
