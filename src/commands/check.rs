//! `check` subcommand: validates configuration and system requirements.

use herakles_jvm_gc_exporter::{ActiveConfig, PgrepInventory, ProcessInventory};
use std::env;
use std::path::{Path, PathBuf};

/// Resolves `program` the way the sampler will spawn it: paths with a
/// separator are taken as is, bare names are looked up in `$PATH`.
pub fn locate_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Runs the selected checks and exits with status 1 if any failed.
pub async fn command_check(
    jstat: bool,
    discovery: bool,
    all: bool,
    active: &ActiveConfig,
) -> anyhow::Result<()> {
    println!("🔍 Herakles JVM GC Exporter - System Check");
    println!("==========================================");

    let config = &active.config;
    let mut all_ok = true;

    if jstat || all {
        println!("\n☕ Checking jstat binary...");
        match locate_program(&config.jstat_path) {
            Some(path) => println!("   ✅ jstat found at {}", path.display()),
            None => {
                println!("   ❌ jstat not found: {}", config.jstat_path);
                println!("      Install a JDK or set jstat_path in the configuration");
                all_ok = false;
            }
        }
    }

    if discovery || all {
        println!("\n📁 Checking JVM discovery...");
        let inventory = PgrepInventory::new();
        match inventory.list_candidate_pids(&config.pid_filter).await {
            Ok(pids) if pids.is_empty() => {
                println!("   ⚠️  pgrep works but no JVM is currently running");
            }
            Ok(pids) => {
                println!("   ✅ Discovered {} JVM process(es)", pids.len());
                if pids.len() > config.max_monitored_processes {
                    println!(
                        "   ⚠️  More JVMs than max_monitored_processes ({}), only the lowest pids are monitored",
                        config.max_monitored_processes
                    );
                }
            }
            Err(e) => {
                println!("   ❌ Discovery failed: {}", e);
                all_ok = false;
            }
        }
    }

    // Reaching this point means the configuration already validated.
    println!("\n⚙️  Checking configuration...");
    println!("   ✅ Configuration is valid");
    println!(
        "   ✅ {} app name marker(s): {}",
        config.app_name_labels.len(),
        config.app_name_labels.join(", ")
    );

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_program_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("jstat");
        std::fs::write(&bin, "").unwrap();
        assert_eq!(locate_program(bin.to_str().unwrap()), Some(bin));
    }

    #[test]
    fn test_locate_program_missing() {
        assert!(locate_program("/definitely/not/here/jstat").is_none());
        assert!(locate_program("herakles-no-such-binary-xyz").is_none());
    }
}
