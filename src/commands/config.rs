//! `config` subcommand and `--show-config` output.

use herakles_jvm_gc_exporter::config::default_config_yaml;
use herakles_jvm_gc_exporter::Config;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;

/// Default file name used when no output path is given.
const DEFAULT_OUTPUT: &str = "herakles-jvm-gc-exporter.yaml";

/// Generates a configuration file with default values.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let content = match format {
        ConfigFormat::Yaml => default_config_yaml(commented)?,
        other => render(&Config::default(), other)?,
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Prints the effective configuration.
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

fn render(config: &Config, format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_jvm_gc_exporter::config::load_config_file;

    #[test]
    fn test_generated_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        for (name, format) in [
            ("c.yaml", ConfigFormat::Yaml),
            ("c.json", ConfigFormat::Json),
            ("c.toml", ConfigFormat::Toml),
        ] {
            let path = dir.path().join(name);
            command_config(Some(path.clone()), format, true).unwrap();
            assert_eq!(load_config_file(&path).unwrap(), Config::default(), "{name}");
        }
    }
}
