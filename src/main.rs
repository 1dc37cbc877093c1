mod cli;

use mediagate::stores::{FileStyleStore, LocalContentStore};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use mg_av::ToolRegistry;
use mg_core::config::Config;
use mg_pipeline::{ActionToken, RequestActionParser};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick levels from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediagate=trace,mg_pipeline=trace,mg_av=debug,mg_core=debug".to_string()
        } else {
            "mediagate=info,mg_pipeline=info,mg_av=info,mg_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            request,
            root,
            styles,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(process(
                &request,
                &root,
                styles.as_deref(),
                output.as_deref(),
                cli.config.as_deref(),
            ))
        }
        Commands::Parse { request } => parse_request(&request, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediagate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn process(
    request: &str,
    root: &Path,
    styles_path: Option<&Path>,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    if !root.is_dir() {
        anyhow::bail!("Content root is not a directory: {:?}", root);
    }

    let styles = match styles_path {
        Some(p) => FileStyleStore::load(p).with_context(|| format!("loading styles from {p:?}"))?,
        None => FileStyleStore::empty(),
    };
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let dispatcher = mediagate::build_dispatcher(
        &config,
        tools,
        Arc::new(LocalContentStore::new(root)),
        Arc::new(styles),
    );

    let parsed = RequestActionParser::from_config(&config.parser).parse_url(request)?;
    tracing::info!(uri = %parsed.uri, tokens = ?parsed.tokens, "Processing request");

    let outcome = match dispatcher.dispatch(&parsed).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(failure) = e.tool_failure() {
                tracing::error!(command = %failure.command_line, "Tool failure: {failure}");
            }
            anyhow::bail!("Request failed ({}): {e}", e.http_status());
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &outcome.payload)
                .await
                .with_context(|| format!("writing {path:?}"))?;
            println!("Wrote {} bytes to {:?}", outcome.payload.len(), path);
        }
        None => {
            println!("Content-Type: {}", outcome.content_type);
            println!("Size: {} bytes", outcome.payload.len());
        }
    }
    for (name, value) in &outcome.headers {
        println!("  {name}: {value}");
    }

    Ok(())
}

fn parse_request(request: &str, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let parsed = RequestActionParser::from_config(&config.parser).parse_url(request)?;

    println!("Resource: {}", parsed.uri);
    match parsed.processor() {
        None => println!("No actions (passthrough)"),
        Some(processor) => {
            println!("Processor: {processor}");
            for (i, raw) in parsed.tokens.iter().enumerate().skip(1) {
                let token = ActionToken::parse(raw)?;
                println!("  {}. {} {:?}", i, token.name, token.params);
            }
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let (Some(path), Some(origin)) = (&tool.path, tool.origin) {
            print!(" - {} [{origin}]", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Video actions need ffmpeg; fallback conversion needs magick.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p).with_context(|| format!("reading {p:?}"))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration parses");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Max pixels: {}", config.limits.max_pixels);
    println!("  Max frames: {}", config.limits.max_frames);
    println!("  Max input bytes: {}", config.limits.max_input_bytes);
    println!("  Decode timeout: {} ms", config.imaging.decode_timeout_ms);
    println!("  Query key: {}", config.parser.query_key);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ No warnings");
    } else {
        for warning in &warnings {
            println!("⚠ {warning}");
        }
    }

    Ok(())
}
