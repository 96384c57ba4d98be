//! k8s-secret-manager - Kubernetes Secret data organized by environment
//!
//! Usage:
//!   k8s-secret-manager envs                      List environments
//!   k8s-secret-manager create <ENV>              Create an empty environment
//!   k8s-secret-manager drop <ENV>                Delete an environment
//!   k8s-secret-manager set <ENV> <KEY> [VALUE]   Add or update a secret
//!   k8s-secret-manager get <ENV> <KEY>           Print a decoded secret
//!   k8s-secret-manager list <ENV>                Show all secrets, decoded
//!   k8s-secret-manager rm <ENV> <KEY>            Delete a secret
//!   k8s-secret-manager update <ENV> K=V...       Update several secrets
//!   k8s-secret-manager export <ENV>              Print a kubectl data block
//!   k8s-secret-manager import <ENV> [FILE]       Review and import a data block
//!   k8s-secret-manager search <TERM>             Find environments defining a key

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use k8s_secrets::codec;
use k8s_secrets::{CreateOutcome, DeleteOutcome, EnvName, EnvStore, PastedImport, UpsertOutcome};
use secrets_core::{format, Config, Paths, StorageRoot, ENV_DIR_VAR};

#[derive(Parser)]
#[command(name = "k8s-secret-manager")]
#[command(about = "Organize Kubernetes Secret data into named environments")]
#[command(version)]
#[command(after_help = r#"STORAGE:
    Each environment is one CSV table (key,value) holding base64 values.
    The tables live in the first of:
      --dir <PATH>
      $K8S_SECRETS_DIR
      "envs_dir" in ~/.config/k8s-secrets/config.json
      ~/.local/share/k8s-secrets/envs

EXAMPLES:
    k8s-secret-manager create staging
    k8s-secret-manager set staging DB_URL postgres://db:5432/app
    k8s-secret-manager list staging
    k8s-secret-manager export staging --save          # staging_secrets.yaml
    kubectl get secret app -o yaml | k8s-secret-manager import staging --yes
    k8s-secret-manager search db_ --exclude staging

LOGGING:
    Warnings go to stderr. Set RUST_LOG=debug for more detail."#)]
struct Cli {
    /// Directory holding the environment tables
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Config file (default: ~/.config/k8s-secrets/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List environments
    #[command(alias = "ls")]
    Envs {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Create an empty environment
    #[command(alias = "new")]
    Create {
        /// Environment name (letters, digits, '-' and '_'; lowercased)
        env: EnvName,
    },

    /// Delete an environment and all of its secrets
    Drop {
        env: EnvName,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Add or update a secret (prompts with hidden input if VALUE is omitted)
    Set {
        env: EnvName,
        key: String,
        value: Option<String>,
    },

    /// Print the decoded value of a secret
    Get {
        /// Don't print trailing newline (useful for piping)
        #[arg(short = 'n')]
        no_newline: bool,
        env: EnvName,
        key: String,
    },

    /// Show every secret in an environment
    #[command(alias = "show")]
    List {
        env: EnvName,

        /// Show the stored base64 text instead of decoded values
        #[arg(long)]
        encoded: bool,

        /// Show values even when the config hides them
        #[arg(long)]
        show: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Delete a secret
    #[command(alias = "delete")]
    Rm { env: EnvName, key: String },

    /// Update several secrets at once
    Update {
        env: EnvName,

        /// KEY=VALUE pairs, applied in order
        #[arg(required = true, value_parser = parse_pair, value_name = "KEY=VALUE")]
        pairs: Vec<(String, String)>,
    },

    /// Print the environment as a kubectl `data:` block
    Export {
        env: EnvName,

        /// Write to this file instead of stdout
        #[arg(long, short, conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Write to <ENV>_secrets.yaml in the current directory
        #[arg(long)]
        save: bool,
    },

    /// Review a kubectl `data:` block and import it
    Import {
        env: EnvName,

        /// YAML file to read (default: stdin)
        file: Option<PathBuf>,

        /// Import without asking for confirmation
        #[arg(long, short)]
        yes: bool,

        /// Only show the review
        #[arg(long)]
        dry_run: bool,
    },

    /// Find other environments with a key containing TERM
    Search {
        term: String,

        /// Environment to leave out (usually the current one)
        #[arg(long)]
        exclude: Option<EnvName>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show where environments are stored
    Root {
        /// Save PATH as the storage root in the config file
        #[arg(long, value_name = "PATH")]
        set: Option<PathBuf>,
    },
}

// ANSI color codes
const RED: &str = "\x1b[0;31m";
const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[0;33m";
const CYAN: &str = "\x1b[0;36m";
const BOLD: &str = "\x1b[1m";
const NC: &str = "\x1b[0m";

/// Check if stdout is a TTY and colors should be used
fn use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Conditionally apply color
fn color(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{}{}{}", code, text, NC)
    } else {
        text.to_string()
    }
}

fn ok(msg: &str) {
    println!("{} {}", color(GREEN, "[ok]"), msg);
}

fn info(msg: &str) {
    println!("{} {}", color(CYAN, "[info]"), msg);
}

fn warn(msg: &str) {
    println!("{} {}", color(YELLOW, "[warn]"), msg);
}

/// Parse a KEY=VALUE argument
fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn main() -> Result<()> {
    // Initialize logging to stderr (stdout carries exports)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = Paths::new();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = Config::load(&config_path)?;

    let root = StorageRoot::resolve(cli.dir.clone(), &config, &paths);
    debug!("Storage root {} (from {})", root.path.display(), root.source);

    let store = EnvStore::new(&root.path)
        .with_context(|| format!("Failed to open storage root {}", root.path.display()))?;

    match cli.command {
        Some(Commands::Envs { json }) => cmd_envs(&store, json),
        Some(Commands::Create { env }) => cmd_create(&store, &env),
        Some(Commands::Drop { env, force }) => cmd_drop(&store, &env, force),
        Some(Commands::Set { env, key, value }) => cmd_set(&store, &env, &key, value),
        Some(Commands::Get {
            no_newline,
            env,
            key,
        }) => cmd_get(&store, &env, &key, no_newline),
        Some(Commands::List {
            env,
            encoded,
            show,
            json,
        }) => cmd_list(&store, &env, encoded, show || config.show_values, json),
        Some(Commands::Rm { env, key }) => cmd_rm(&store, &env, &key),
        Some(Commands::Update { env, pairs }) => cmd_update(&store, &env, pairs),
        Some(Commands::Export { env, output, save }) => cmd_export(&store, &env, output, save),
        Some(Commands::Import {
            env,
            file,
            yes,
            dry_run,
        }) => cmd_import(&store, &env, file, yes, dry_run),
        Some(Commands::Search {
            term,
            exclude,
            json,
        }) => cmd_search(&store, &term, exclude.as_ref(), json),
        Some(Commands::Root { set: Some(dir) }) => cmd_root_set(config, &config_path, &dir),
        Some(Commands::Root { set: None }) => cmd_root(&store, &root),
        None => cmd_envs(&store, false),
    }
}

/// List environments
fn cmd_envs(store: &EnvStore, json: bool) -> Result<()> {
    let envs = store.list_environments();

    if json {
        println!("{}", serde_json::to_string_pretty(&envs)?);
        return Ok(());
    }

    if envs.is_empty() {
        println!("No environments yet. Create one with: k8s-secret-manager create <ENV>");
        return Ok(());
    }

    println!("{}Environments{}", BOLD, NC);
    println!();
    for env in &envs {
        let count = store.list_secrets(env).len();
        println!("  {:<24} {}", env, format::count(count, "secret"));
    }

    Ok(())
}

/// Create an environment
fn cmd_create(store: &EnvStore, env: &EnvName) -> Result<()> {
    match store.create_environment(env)? {
        CreateOutcome::Created => ok(&format!("Environment '{}' created", env)),
        CreateOutcome::AlreadyExists => info(&format!("Environment '{}' already exists", env)),
    }
    Ok(())
}

/// Delete an environment
fn cmd_drop(store: &EnvStore, env: &EnvName, force: bool) -> Result<()> {
    if !store.environment_exists(env) {
        warn(&format!("Environment '{}' not found", env));
        return Ok(());
    }

    if !force {
        if !std::io::stdin().is_terminal() {
            bail!("Use --force to delete without confirmation");
        }

        let count = store.list_secrets(env).len();
        print!(
            "Delete environment '{}' and its {}? [y/N] ",
            env,
            format::count(count, "secret")
        );
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") && !input.trim().eq_ignore_ascii_case("yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    match store.delete_environment(env)? {
        DeleteOutcome::Deleted => ok(&format!("Environment '{}' deleted", env)),
        DeleteOutcome::NotFound => warn(&format!("Environment '{}' not found", env)),
    }
    Ok(())
}

/// Add or update a secret
fn cmd_set(store: &EnvStore, env: &EnvName, key: &str, value: Option<String>) -> Result<()> {
    let key = key.trim();

    let plaintext = match value {
        Some(v) => v,
        None => rpassword::prompt_password(format!("Value for {}: ", key))
            .context("Failed to read secret value")?,
    };

    let outcome = store.upsert_secret(env, key, &codec::encode(&plaintext))?;
    match outcome {
        UpsertOutcome::Inserted => ok(&format!("Secret '{}' added to '{}'", key, env)),
        UpsertOutcome::Updated => ok(&format!("Secret '{}' updated in '{}'", key, env)),
    }
    Ok(())
}

/// Print a decoded secret
fn cmd_get(store: &EnvStore, env: &EnvName, key: &str, no_newline: bool) -> Result<()> {
    let record = match store.get_secret(env, key) {
        Some(r) => r,
        None => bail!("Secret '{}' not found in '{}'", key, env),
    };

    let value = record.display_value();
    if no_newline {
        print!("{}", value);
    } else {
        println!("{}", value);
    }

    Ok(())
}

#[derive(Serialize)]
struct ListedSecret<'a> {
    key: &'a str,
    value: String,
}

/// Show all secrets of an environment
fn cmd_list(store: &EnvStore, env: &EnvName, encoded: bool, show: bool, json: bool) -> Result<()> {
    let records = store.list_secrets(env);

    let value_of = |record: &k8s_secrets::Record| {
        if encoded {
            record.value.clone()
        } else {
            record.display_value()
        }
    };

    if json {
        let listed: Vec<ListedSecret> = records
            .iter()
            .map(|r| ListedSecret {
                key: &r.key,
                value: if show { value_of(r) } else { format::MASK.to_string() },
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if records.is_empty() {
        if store.environment_exists(env) {
            println!("No secrets in '{}'. Add one with: k8s-secret-manager set {} <KEY>", env, env);
        } else {
            warn(&format!("Environment '{}' not found", env));
        }
        return Ok(());
    }

    println!("{}Secrets in {}{}", BOLD, env, NC);
    println!();

    let width = records.iter().map(|r| r.key.chars().count()).max().unwrap_or(0);
    for record in &records {
        println!(
            "  {}  {}",
            color(CYAN, &format!("{:<width$}", record.key, width = width)),
            format::display_value(&value_of(record), show)
        );
    }

    Ok(())
}

/// Delete a secret
fn cmd_rm(store: &EnvStore, env: &EnvName, key: &str) -> Result<()> {
    match store.delete_secret(env, key)? {
        0 => warn(&format!("Secret '{}' not found in '{}'", key, env)),
        _ => ok(&format!("Secret '{}' deleted from '{}'", key, env)),
    }
    Ok(())
}

/// Update several secrets
fn cmd_update(store: &EnvStore, env: &EnvName, pairs: Vec<(String, String)>) -> Result<()> {
    let encoded = pairs
        .into_iter()
        .map(|(key, value)| (key, codec::encode(&value)));

    let report = store.replace_all(env, encoded);

    for (key, e) in &report.failed {
        println!("{} Failed to update '{}': {}", color(RED, "[error]"), key, e);
    }
    if report.applied > 0 {
        ok(&format!(
            "Updated {} in '{}'",
            format::count(report.applied, "secret"),
            env
        ));
    }
    if !report.is_complete() {
        bail!("{} could not be updated", format::count(report.failed.len(), "secret"));
    }

    Ok(())
}

/// Export an environment as a data block
fn cmd_export(store: &EnvStore, env: &EnvName, output: Option<PathBuf>, save: bool) -> Result<()> {
    if !store.environment_exists(env) {
        eprintln!("{} Environment '{}' not found", color(YELLOW, "[warn]"), env);
    }

    let text = codec::export_yaml_block(&store.list_secrets(env))?;

    let target = match (output, save) {
        (Some(path), _) => Some(path),
        (None, true) => Some(PathBuf::from(codec::suggested_export_filename(env.as_str()))),
        (None, false) => None,
    };

    match target {
        Some(path) => {
            std::fs::write(&path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ok(&format!("Exported '{}' to {}", env, path.display()));
        }
        None => print!("{}", text),
    }

    Ok(())
}

/// Review and import a data block
fn cmd_import(
    store: &EnvStore,
    env: &EnvName,
    file: Option<PathBuf>,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let from_stdin = file.is_none();
    let text = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            if std::io::stdin().is_terminal() {
                eprintln!("Paste the data block, then press Ctrl-D:");
            }
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    let parsed = match PastedImport::new(text).parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            println!("{} {}", color(RED, "[error]"), e);
            bail!("Nothing was imported into '{}'", env);
        }
    };

    let reviewed = parsed.review();

    if reviewed.rows().is_empty() {
        info("The data block is empty, nothing to import");
        return Ok(());
    }

    println!("{}Review import into {}{}", BOLD, env, NC);
    println!();
    let width = reviewed.rows().iter().map(|r| r.key.chars().count()).max().unwrap_or(0);
    for row in reviewed.rows() {
        let existing = store.get_secret(env, &row.key).is_some();
        let marker = match (row.importable, existing) {
            (false, _) => color(YELLOW, "skip"),
            (true, true) => color(CYAN, "update"),
            (true, false) => color(GREEN, "new"),
        };
        println!(
            "  {:<width$}  {}  {}",
            row.key,
            format::truncate(&format::one_line(&row.display), 60),
            marker,
            width = width
        );
    }
    println!();

    if dry_run {
        info(&format!(
            "Dry run: {} would be imported",
            format::count(reviewed.importable_count(), "secret")
        ));
        return Ok(());
    }

    if !yes {
        if from_stdin || !std::io::stdin().is_terminal() {
            bail!("Use --yes to import without confirmation");
        }

        print!(
            "Import {} into '{}'? [y/N] ",
            format::count(reviewed.importable_count(), "secret"),
            env
        );
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") && !input.trim().eq_ignore_ascii_case("yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = reviewed.commit(store, env);

    for skipped in &report.skipped {
        warn(&format!("Skipped key '{}': {}", skipped.key, skipped.reason));
    }
    if report.imported > 0 {
        ok(&format!(
            "Imported {} into '{}'",
            format::count(report.imported, "secret"),
            env
        ));
    }
    if !report.skipped.is_empty() {
        warn(&format!(
            "Skipped {} due to errors or non-string values",
            format::count(report.skipped.len(), "key")
        ));
    }

    Ok(())
}

/// Find environments defining a key
fn cmd_search(store: &EnvStore, term: &str, exclude: Option<&EnvName>, json: bool) -> Result<()> {
    let found = store.search_key(term, exclude);

    if json {
        println!("{}", serde_json::to_string(&found)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No other environment has a key matching '{}'", term.trim());
        return Ok(());
    }

    for env in &found {
        println!("{}", env);
    }
    Ok(())
}

/// Show the storage root
fn cmd_root(store: &EnvStore, root: &StorageRoot) -> Result<()> {
    println!("  {}  {}", color(CYAN, "Root:"), store.root().display());
    println!("  {}   {}", color(CYAN, "From:"), root.source);
    println!(
        "  {}   {}",
        color(CYAN, "Envs:"),
        store.list_environments().len()
    );
    println!();
    println!("Override with --dir or {}, or save one with: root --set <PATH>", ENV_DIR_VAR);
    Ok(())
}

/// Save a storage root in the config file
fn cmd_root_set(mut config: Config, config_path: &Path, dir: &Path) -> Result<()> {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    config.envs_dir = Some(dir.clone());
    config.save(config_path)?;
    ok(&format!(
        "Storage root set to {} in {}",
        dir.display(),
        config_path.display()
    ));

    if std::env::var_os(ENV_DIR_VAR).is_some_and(|v| !v.is_empty()) {
        warn(&format!("{} is set and still takes precedence", ENV_DIR_VAR));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let args = ["k8s-secret-manager", "set", "Staging", "DB_URL", "x"];
        let cli = Cli::try_parse_from(args).unwrap();
        if let Some(Commands::Set { env, key, value }) = cli.command {
            assert_eq!(env.as_str(), "staging");
            assert_eq!(key, "DB_URL");
            assert_eq!(value, Some("x".to_string()));
        } else {
            panic!("Expected Set command");
        }

        let cli = Cli::try_parse_from(["k8s-secret-manager", "get", "-n", "dev", "KEY"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Get { no_newline: true, .. })));

        let cli = Cli::try_parse_from(["k8s-secret-manager"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_rejects_bad_env_name() {
        assert!(Cli::try_parse_from(["k8s-secret-manager", "create", "../etc"]).is_err());
        assert!(Cli::try_parse_from(["k8s-secret-manager", "create", "my env"]).is_err());
    }

    #[test]
    fn test_cli_global_dir() {
        let args = ["k8s-secret-manager", "envs", "--dir", "/tmp/envs"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/envs")));
    }

    #[test]
    fn test_cli_update_pairs() {
        let cli = Cli::try_parse_from([
            "k8s-secret-manager",
            "update",
            "dev",
            "A=1",
            "B=x=y",
            "C=",
        ])
        .unwrap();
        if let Some(Commands::Update { pairs, .. }) = cli.command {
            assert_eq!(
                pairs,
                vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "x=y".to_string()),
                    ("C".to_string(), String::new()),
                ]
            );
        } else {
            panic!("Expected Update command");
        }

        assert!(Cli::try_parse_from(["k8s-secret-manager", "update", "dev", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["k8s-secret-manager", "update", "dev"]).is_err());
    }

    #[test]
    fn test_cli_export_conflicts() {
        let args = ["k8s-secret-manager", "export", "dev", "-o", "a.yaml", "--save"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("URL=a=b"), Ok(("URL".to_string(), "a=b".to_string())));
        assert_eq!(parse_pair("URL"), Err("expected KEY=VALUE, got 'URL'".to_string()));
    }

    #[test]
    fn test_cli_root_set() {
        let args = ["k8s-secret-manager", "root", "--set", "/srv/envs"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Root { set: Some(ref p) }) if p.as_path() == Path::new("/srv/envs")
        ));

        let cli = Cli::try_parse_from(["k8s-secret-manager", "root"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Root { set: None })));
    }

    #[test]
    fn test_root_set_persists_config() -> Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let config_path = tmp.path().join("config").join("config.json");
        let envs = tmp.path().join("envs");

        let config = Config {
            envs_dir: None,
            show_values: false,
        };
        cmd_root_set(config, &config_path, &envs)?;

        let saved = Config::load(&config_path)?;
        assert_eq!(saved.envs_dir, Some(envs));
        assert!(!saved.show_values);
        Ok(())
    }
}
