//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::core::cli::{self, CliConfig, ClusterCommands, Commands};
use crate::core::config::{AppConfig, PostgresConfig, WarehouseTarget};
use crate::core::constants::{APP_CRATE_TARGET, DUCKDB_DB_FILENAME, ENV_LOG, SQLITE_DB_FILENAME};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::{AppStorage, DataSubdir};
use crate::data::TransactionalService;
use crate::data::cluster::AwsClusterProvider;
use crate::data::source::{self, SourceReader};
use crate::data::sql::LoadMode;
use crate::data::warehouse::{CopySettings, DuckdbWarehouse, RedshiftWarehouse, Warehouse};
use crate::domain::provision::{self, ClusterHandle, Provisioner};
use crate::domain::{DagOptions, LakePipeline, LoadPipeline, WarehouseDag, quality};
use crate::utils::location::Location;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: AppStorage,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config).await?;
        app.shutdown.install_signal_handlers();

        match command {
            Commands::Load { no_truncate } => app.load(!no_truncate).await,
            Commands::Check => app.check().await,
            Commands::Lake { .. } => app.lake().await,
            Commands::Warehouse {
                execution_date,
                provision,
                ..
            } => app.warehouse(execution_date, provision).await,
            Commands::Cluster { command } => app.cluster(command).await,
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init().await?;

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            storage,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_CRATE_TARGET);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn open_source(&self) -> Arc<dyn SourceReader> {
        let source = &self.config.source;
        source::open(
            &source.root,
            source.region.as_deref(),
            source.endpoint.as_deref(),
        )
        .await
    }

    async fn open_database(&self) -> Result<TransactionalService> {
        let database = &self.config.database;
        let sqlite_path = database
            .sqlite_path
            .clone()
            .unwrap_or_else(|| self.storage.subdir_path(DataSubdir::Sqlite, SQLITE_DB_FILENAME));

        TransactionalService::init(database.backend, &sqlite_path, database.postgres.as_ref())
            .await
            .with_context(|| format!("Failed to open the {} database", database.backend))
    }

    async fn load(&self, truncate: bool) -> Result<()> {
        let database = self.open_database().await?;
        let repository = database.repository();
        let source = self.open_source().await;

        let result = LoadPipeline::new(
            repository.as_ref(),
            source,
            &self.config.source.song_prefix,
            &self.config.source.log_prefix,
            self.shutdown.clone(),
        )
        .run(truncate)
        .await;

        database.close().await;
        result?;
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let database = self.open_database().await?;
        let catalog = database.catalog();
        let result = quality::enforce(catalog.as_ref()).await;
        database.close().await;
        result?;
        Ok(())
    }

    async fn lake(&self) -> Result<()> {
        let source = self.open_source().await;
        let config = &self.config;

        LakePipeline::new(
            source,
            &config.source.song_prefix,
            &config.source.log_prefix,
            config.lake.output.clone(),
            config.lake.compression,
            self.shutdown.clone(),
        )
        .with_s3(config.source.region.clone(), config.source.endpoint.clone())
        .run()
        .await?;
        Ok(())
    }

    async fn warehouse(&self, execution_date: Option<NaiveDate>, provision: bool) -> Result<()> {
        let config = &self.config.warehouse;
        let options = DagOptions {
            mode: LoadMode::from_append(config.append),
            execution_date,
            start_date: config.start_date,
            retries: config.retries,
            retry_delay_ms: config.retry_delay_ms,
        };

        match config.target {
            WarehouseTarget::Duckdb => {
                if provision {
                    anyhow::bail!("--provision requires the redshift warehouse target");
                }
                let path = config
                    .duckdb_path
                    .clone()
                    .unwrap_or_else(|| self.storage.subdir_path(DataSubdir::Duckdb, DUCKDB_DB_FILENAME));
                let source = self.open_source().await;
                let warehouse = DuckdbWarehouse::open(
                    &path,
                    source,
                    &self.config.source.song_prefix,
                    &self.config.source.log_prefix,
                )
                .await
                .with_context(|| format!("Failed to open DuckDB warehouse {}", path.display()))?;
                self.run_dag(&warehouse, options).await
            }
            WarehouseTarget::Redshift if provision => self.warehouse_on_new_cluster(options).await,
            WarehouseTarget::Redshift => {
                let postgres = config.redshift.clone().context(
                    "warehouse.redshift.url is required for the redshift target (or pass --provision)",
                )?;
                let iam_role = config
                    .iam_role
                    .clone()
                    .context("warehouse.iam_role is required for the redshift target")?;
                let warehouse = RedshiftWarehouse::connect(&postgres, self.copy_settings(iam_role)?)
                    .await
                    .context("Failed to connect to Redshift")?;
                self.run_dag(&warehouse, options).await
            }
        }
    }

    /// Create a cluster, run the graph on it and tear it down again, also
    /// when the run failed
    async fn warehouse_on_new_cluster(&self, options: DagOptions) -> Result<()> {
        let spec = provision::cluster_spec(&self.config.cluster)?;
        let provider = AwsClusterProvider::new(Some(&self.config.cluster.region)).await;
        let mut provisioner = Provisioner::new(&provider, spec, self.config.cluster.wait_timeout_secs);

        let handle = provisioner.up().await.context("Failed to provision the cluster")?;
        provisioner.mark_in_use();
        let result = self.warehouse_on_cluster(&handle, options).await;

        if let Err(e) = provisioner.down().await {
            tracing::error!(cluster = %handle.identifier, error = %e, "Cluster teardown incomplete");
            if result.is_ok() {
                return Err(anyhow::Error::from(e).context("Failed to tear down the cluster"));
            }
        }
        result
    }

    async fn warehouse_on_cluster(&self, handle: &ClusterHandle, options: DagOptions) -> Result<()> {
        let postgres = match &self.config.warehouse.redshift {
            Some(pool) => PostgresConfig {
                url: handle.url.clone(),
                ..pool.clone()
            },
            None => PostgresConfig::from_url(handle.url.clone()),
        };
        let iam_role = self
            .config
            .warehouse
            .iam_role
            .clone()
            .unwrap_or_else(|| handle.role_arn.clone());

        let warehouse = RedshiftWarehouse::connect(&postgres, self.copy_settings(iam_role)?)
            .await
            .context("Failed to connect to the provisioned cluster")?;
        self.run_dag(&warehouse, options).await
    }

    fn copy_settings(&self, iam_role: String) -> Result<CopySettings> {
        let source = &self.config.source;
        let Location::S3 { bucket, prefix } = &source.root else {
            anyhow::bail!("source.root must be an s3:// location for the redshift target");
        };
        let Some(log_jsonpath) = source.log_jsonpath.clone() else {
            anyhow::bail!("source.log_jsonpath is required for the redshift target");
        };
        Ok(CopySettings {
            bucket: bucket.clone(),
            prefix: prefix.clone(),
            song_prefix: source.song_prefix.clone(),
            log_prefix: source.log_prefix.clone(),
            log_jsonpath,
            iam_role,
            region: self.config.aws_region().to_string(),
        })
    }

    async fn run_dag(&self, warehouse: &dyn Warehouse, options: DagOptions) -> Result<()> {
        let result = WarehouseDag::new(warehouse, options, self.shutdown.clone())
            .run()
            .await;
        if let Err(e) = warehouse.close().await {
            tracing::warn!(warehouse = warehouse.target(), error = %e, "Warehouse close failed");
        }
        result?;
        Ok(())
    }

    async fn cluster(&self, command: ClusterCommands) -> Result<()> {
        let config = &self.config.cluster;
        let spec = match command {
            ClusterCommands::Up => provision::cluster_spec(config)?,
            ClusterCommands::Down | ClusterCommands::Status => provision::lookup_spec(config),
        };
        let provider = AwsClusterProvider::new(Some(&config.region)).await;
        let mut provisioner = Provisioner::new(&provider, spec, config.wait_timeout_secs);

        match command {
            ClusterCommands::Up => {
                let handle = provisioner.up().await?;
                println!("Cluster {} is available", handle.identifier);
                println!("  endpoint: {}:{}", handle.endpoint, handle.port);
                println!("  iam role: {}", handle.role_arn);
            }
            ClusterCommands::Down => {
                provisioner.down().await?;
                println!("Cluster {} deleted", config.identifier);
            }
            ClusterCommands::Status => match provisioner.status().await? {
                Some(info) => {
                    println!("Cluster {}: {}", info.identifier, info.status);
                    if let Some(endpoint) = info.endpoint {
                        println!("  endpoint: {}:{}", endpoint, info.port.unwrap_or(config.port));
                    }
                }
                None => println!("Cluster {} does not exist", config.identifier),
            },
        }
        Ok(())
    }
}
