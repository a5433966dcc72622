//! eventbuilder - Generate reactive event wrappers from .NET assemblies
//!
//! This tool reads the metadata of platform or user assemblies, collects
//! their public events and delegates, and renders observable wrappers for
//! them through a template.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use eventbuilder_core::platform::{DEFAULT_REFERENCE_ASSEMBLIES, DEFAULT_WINDOWS_KITS};
use eventbuilder_core::{
    loader::MODULE_EXTENSIONS, Generator, GeneratorConfig, Platform, PlatformRoots, Substitutions,
    TemplateSource,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Generate reactive event wrappers from .NET assembly metadata
#[derive(Parser, Debug)]
#[command(name = "eventbuilder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Assemblies to extract from (only with `--platform none`)
    assemblies: Vec<PathBuf>,

    /// Target platform: none, android, ios, mac, tvos, wpf, winforms, uwp,
    /// xamforms, tizen, essentials
    #[arg(short, long, default_value = "none", value_parser = parse_platform)]
    platform: Platform,

    /// Root of the .NET reference assemblies
    #[arg(short, long, env = "EVENTBUILDER_REFERENCE_ASSEMBLIES", default_value = DEFAULT_REFERENCE_ASSEMBLIES)]
    reference_assemblies: PathBuf,

    /// NuGet packages folder (default: ~/.nuget/packages)
    #[arg(long, env = "NUGET_PACKAGES")]
    packages: Option<PathBuf>,

    /// Root of the Windows 10 SDK
    #[arg(long, default_value = DEFAULT_WINDOWS_KITS)]
    windows_kits: PathBuf,

    /// Additional directory to resolve dependencies from (repeatable)
    #[arg(short, long = "search-dir")]
    search_dirs: Vec<PathBuf>,

    /// Collect assemblies recursively from a directory
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Template file replacing the platform's built-in template
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Highest generic arity marker stripped from the output
    #[arg(long, default_value = "3")]
    max_arity: usize,

    /// Extra output substitution FROM=TO (repeatable)
    #[arg(long = "substitute", value_parser = parse_substitution)]
    substitutions: Vec<(String, String)>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Rendered template
    Text,
    /// Template model as JSON
    Json,
}

fn parse_platform(s: &str) -> std::result::Result<Platform, String> {
    s.parse::<Platform>().map_err(|_| {
        let names: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
        format!("expected one of: {}", names.join(", "))
    })
}

fn parse_substitution(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, _)) if from.is_empty() => Err("FROM must not be empty".to_string()),
        Some((from, to)) => Ok((from.to_string(), to.to_string())),
        None => Err(format!("expected FROM=TO, got '{}'", s)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let mut assemblies = cli.assemblies.clone();
    if let Some(ref directory) = cli.directory {
        assemblies.extend(collect_assemblies(directory)?);
    }
    if cli.platform != Platform::None && !assemblies.is_empty() {
        bail!(
            "Assemblies can only be given with --platform none (platform {} selects its own)",
            cli.platform
        );
    }

    let mut roots = PlatformRoots::new()
        .reference_assemblies(&cli.reference_assemblies)
        .windows_kits(&cli.windows_kits);
    if let Some(ref packages) = cli.packages {
        roots = roots.packages(packages);
    }

    let descriptor = cli
        .platform
        .descriptor(&roots, &assemblies)
        .with_context(|| format!("Failed to set up platform {}", cli.platform))?
        .with_search_dirs(cli.search_dirs.iter().cloned());
    debug!(
        "Platform {}: {} assembl(ies), search dirs {:?}",
        descriptor.platform,
        descriptor.assemblies.len(),
        descriptor.search_dirs
    );

    let substitutions = cli
        .substitutions
        .iter()
        .fold(Substitutions::new().with_arity_markers(cli.max_arity), |table, (from, to)| {
            table.with(from.as_str(), to.as_str())
        });
    let mut config = GeneratorConfig::for_platform(&descriptor).substitutions(substitutions);
    if let Some(ref template) = cli.template {
        config = config.template(TemplateSource::file(template));
    }

    let generated = Generator::new(config)
        .generate(&descriptor.assemblies, &descriptor.search_dirs)
        .with_context(|| format!("Failed to generate bindings for platform {}", descriptor.platform))?;

    for diagnostic in &generated.diagnostics {
        debug!("{}", diagnostic);
    }
    info!(
        "Generated {} member(s), skipped {}",
        generated.model.member_count(),
        generated.diagnostics.len()
    );

    let text = match cli.format {
        OutputFormat::Text => generated.text,
        OutputFormat::Json => serde_json::to_string_pretty(&generated.model)
            .context("Failed to serialize template model")?,
    };

    match cli.output {
        Some(ref path) => {
            if write_output(path, &text)? {
                info!("Wrote {}", path.display());
            } else {
                info!("{} is up to date", path.display());
            }
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Module files under `directory`, sorted by path
fn collect_assemblies(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }
    info!("Scanning directory: {}", directory.display());

    let mut found = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_module = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| MODULE_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !is_module {
            trace!("Skipping {}", path.display());
            continue;
        }
        found.push(path.to_path_buf());
    }
    found.sort();

    if found.is_empty() {
        warn!("No assemblies found in {}", directory.display());
    }
    Ok(found)
}

/// Compute the blake3 digest of the content
fn content_hash(content: &[u8]) -> blake3::Hash {
    blake3::hash(content)
}

/// Writes `content` unless the file already holds it; returns whether it wrote
fn write_output(path: &Path, content: &str) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if content_hash(&existing) == content_hash(content.as_bytes()) {
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", path.display()))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_substitution() {
        assert_eq!(
            parse_substitution("System.Int32=int").unwrap(),
            ("System.Int32".to_string(), "int".to_string())
        );
        assert_eq!(
            parse_substitution("`4=").unwrap(),
            ("`4".to_string(), String::new())
        );
        assert!(parse_substitution("=int").is_err());
        assert!(parse_substitution("no-separator").is_err());
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "eventbuilder",
            "-p",
            "essentials",
            "--substitute",
            "System.Int32=int",
            "-s",
            "/ref/a",
            "-s",
            "/ref/b",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.platform, Platform::Essentials);
        assert_eq!(cli.search_dirs.len(), 2);
        assert_eq!(cli.substitutions.len(), 1);
        assert!(matches!(cli.format, OutputFormat::Json));

        assert!(Cli::try_parse_from(["eventbuilder", "-p", "symbian"]).is_err());
    }

    #[test]
    fn test_write_output_skips_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("Events.cs");

        assert!(write_output(&path, "namespace Acme {}").unwrap());
        assert!(!write_output(&path, "namespace Acme {}").unwrap());
        assert!(write_output(&path, "namespace Acme.UI {}").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "namespace Acme.UI {}");
    }

    #[test]
    fn test_collect_assemblies() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("Acme.dll"), b"x").unwrap();
        fs::write(temp_dir.path().join("README.md"), b"x").unwrap();
        fs::write(nested.join("Windows.WINMD"), b"x").unwrap();

        let found = collect_assemblies(temp_dir.path()).unwrap();
        assert_eq!(
            found,
            vec![temp_dir.path().join("Acme.dll"), nested.join("Windows.WINMD")]
        );
        assert!(collect_assemblies(&temp_dir.path().join("Acme.dll")).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
