use std::path::Path;

use crate::{
    InitArgs,
    config::{Config, DEFAULT_CONFIG_FILE, SiteConfig},
};

const STARTER_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="{{{ lang=en }}}">
<head>
  <meta charset="utf-8">
  <title>{{ title | safe }}</title>
  <meta name="keywords" content="{{ keywords | safe }}">
  <meta name="description" content="{{ description | safe }}">
  <link rel="canonical" href="{{ url | safe }}">
</head>
<body>
  {{ partials/header.html }}
  <main>{{{ doc }}}</main>
  {{ pageJs | safe }}
</body>
</html>
"#;

const STARTER_HEADER: &str = r#"<header><a href="/">{{{ siteName=My Site }}}</a></header>
"#;

const STARTER_PAGE: &str = r#"<h1>Welcome</h1>
<p>Edit origin/index.html and run <code>rbuild build</code>.</p>
"#;

const STARTER_METADATA: &str = "title: Home\ndescription: The home page\n";

pub async fn run(args: &InitArgs) -> Result<(), anyhow::Error> {
    let path = if args.path.is_relative() {
        std::env::current_dir()?.join(&args.path)
    } else {
        args.path.clone()
    };

    if !path.exists() {
        if args.create {
            tokio::fs::create_dir_all(&path).await?;
            println!("Created directory {path}", path = path.display());
        } else {
            return Err(anyhow::anyhow!(
                "Directory does not exist: {path}",
                path = path.display()
            ));
        }
    }

    let config_file = path.join(DEFAULT_CONFIG_FILE);
    if config_file.exists() {
        return Err(anyhow::anyhow!(
            "Config file already exists: {config_file}",
            config_file = config_file.display()
        ));
    }

    let mut default_config = Config {
        site: SiteConfig {
            url: Some("https://example.com".into()),
            default_script: None,
        },
        ..Config::default()
    };
    default_config
        .page
        .insert("siteName".into(), "My Site".into());

    println!("Initializing project in {}", path.display());

    let config_text = serde_yaml::to_string(&default_config)?;
    tokio::fs::write(&config_file, config_text).await?;
    println!(
        "Created config file {config_file}",
        config_file = config_file.display()
    );

    let templates = path.join(&default_config.paths.templates);
    let content = path.join(&default_config.paths.content);
    write_starter(&templates.join(&default_config.layout), STARTER_LAYOUT).await?;
    write_starter(&templates.join("partials/header.html"), STARTER_HEADER).await?;
    write_starter(&content.join("index.html"), STARTER_PAGE).await?;
    write_starter(&content.join(&default_config.metadata_file), STARTER_METADATA).await?;

    Ok(())
}

/// Write a starter file unless something is already there.
async fn write_starter(path: &Path, contents: &str) -> Result<(), anyhow::Error> {
    if path.exists() {
        println!("Keeping existing {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    println!("Created {}", path.display());
    Ok(())
}
