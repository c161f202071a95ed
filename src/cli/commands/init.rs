//! Implementation of the `equiwatch init` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tokio::fs;

use crate::adapters::sqlite::{database_url, initialize_database};
use crate::cli::display::{action_success, output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::CONFIG_DIR;

const SAMPLE_WATCHLIST: &str = r"# Companies and sectors worth investigating.
sectors:
  - name: Capital Goods
    keywords: [order, order book, capacity, revenue]
  - name: Banks
    keywords: [npa, provisioning, deposit growth]
companies:
  - symbol: INOXWIND
    name: Inox Wind Limited
    sector: Capital Goods
    aliases: [Inox Wind]
global_keywords: [guidance, acquisition, fund raising]
";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite existing config and watchlist files
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub files_written: Vec<String>,
    pub database_path: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        if !self.success {
            return self.message.clone();
        }
        let mut lines = vec![action_success(&self.message)];
        for file in &self.files_written {
            lines.push(format!("  - {file}"));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir().context("Failed to get current directory")?.join(&args.path)
    };
    let project_dir = target.join(CONFIG_DIR);
    let config_path = project_dir.join("config.yaml");

    if config_path.exists() && !args.force {
        let out = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to overwrite config files.".to_string(),
            initialized_path: target,
            files_written: vec![],
            database_path: String::new(),
        };
        output(&out, json_mode);
        return Ok(());
    }

    fs::create_dir_all(project_dir.join("logs"))
        .await
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let config = Config::default();
    let config_yaml = serde_yaml::to_string(&config).context("Failed to render default config")?;

    let mut files_written = Vec::new();
    write_file(&config_path, &config_yaml, &target, &mut files_written).await?;
    write_file(&project_dir.join("watchlist.yaml"), SAMPLE_WATCHLIST, &target, &mut files_written).await?;

    let db_path = target.join(&config.database.path);
    let db_path = db_path.display().to_string();
    initialize_database(&database_url(&db_path), None).await.context("Failed to initialize database")?;

    let out = InitOutput {
        success: true,
        message: if args.force { "Project reinitialized." } else { "Project initialized." }.to_string(),
        initialized_path: target,
        files_written,
        database_path: db_path,
    };
    output(&out, json_mode);
    Ok(())
}

async fn write_file(path: &Path, contents: &str, root: &Path, written: &mut Vec<String>) -> Result<()> {
    fs::write(path, contents).await.with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path.strip_prefix(root).unwrap_or(path).display().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ConfigLoader;
    use tempfile::TempDir;

    #[test]
    fn test_sample_watchlist_is_valid() {
        let watchlist = ConfigLoader::parse_watchlist(SAMPLE_WATCHLIST).unwrap();
        assert_eq!(watchlist.companies[0].symbol, "INOXWIND");
    }

    #[tokio::test]
    async fn test_init_writes_loadable_project() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs { force: false, path: dir.path().to_path_buf() };
        execute(args, true).await.unwrap();

        let project = dir.path().join(CONFIG_DIR);
        assert!(project.join("config.yaml").exists());
        assert!(project.join("equiwatch.db").exists());
        let config = ConfigLoader::load_from_file(project.join("config.yaml")).unwrap();
        assert_eq!(config.pipeline.max_concurrent_triggers, 4);
        ConfigLoader::load_watchlist(project.join("watchlist.yaml")).unwrap();
    }
}
