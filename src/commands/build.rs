use crate::{
    BuildArgs,
    build::{Builder, base_path_from_config},
    config::Config,
};

pub async fn run(args: &BuildArgs) -> Result<(), anyhow::Error> {
    let config_path = Config::path_from_arg(args.config_file.as_deref())?;
    let config = Config::load(&config_path)?;

    // Relative paths in the config resolve against the config file's directory
    let base_path = base_path_from_config(&config_path);

    let mut builder = Builder::new(config, base_path);
    let result = builder.build().await?;

    println!(
        "Built site to {} ({} pages, {} static files)",
        result.output_dir.display(),
        result.pages,
        result.assets
    );

    if !result.is_success() {
        for failure in &result.failures {
            eprintln!("  {}: {}", failure.path.display(), failure.error);
        }
        return Err(anyhow::anyhow!(
            "{} file(s) failed to build",
            result.failures.len()
        ));
    }

    Ok(())
}
