//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, ItemErrors, OutputFormat, PaginationStyle};
use crate::config::AppConfig;
use crate::decode::JsonDecoder;
use crate::error::{Error, Result, ResultExt};
use crate::jobs::{self, ImageSteps};
use crate::pagination::{
    CursorPaginator, FetchRequest, NextUrlPaginator, NoPaginator, OffsetPaginator,
    PaginatedFetcher, StopCondition,
};
use crate::types::{ItemErrorPolicy, ObjectType, OptionStringExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Page length for `--pagination offset` without `--page-size`
const DEFAULT_OFFSET_PAGE_SIZE: u32 = 100;

/// How `fetch` walks the listing
#[derive(Debug, Clone, Copy)]
struct FetchPaging {
    style: PaginationStyle,
    page_size: Option<u32>,
    stop_on_empty: bool,
}

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let started = Instant::now();
        let config = self.load_config()?;

        match &self.cli.command {
            Commands::Touchpoints {
                page_size,
                limit,
                output,
            } => {
                let mut settings = config.touchpoints.clone();
                if let Some(page_size) = page_size {
                    settings.page_size = *page_size;
                }
                if limit.is_some() {
                    settings.contact_limit = *limit;
                }
                if let Some(output) = output {
                    settings.output.clone_from(output);
                }

                let client = config.client()?;
                let report = jobs::export_touchpoints(&client, &settings).await?;
                self.output_report(&report)?;
            }
            Commands::BackfillDatetimes {
                object_type,
                fields,
            } => {
                let mut settings = config.backfill.clone();
                if let Some(object_type) = object_type {
                    let object_type: ObjectType = object_type.parse()?;
                    if fields.is_empty() {
                        settings.date_fields.retain(|t, _| *t == object_type);
                    } else {
                        settings.date_fields = BTreeMap::from([(object_type, fields.clone())]);
                    }
                }
                if settings.date_fields.is_empty() {
                    return Err(Error::config(
                        "No date fields configured (set backfill.date_fields or --object-type/--fields)",
                    ));
                }

                let client = config.client()?;
                let report = jobs::backfill_datetimes(&client, &settings, config.item_errors).await?;
                self.output_report(&report)?;
            }
            Commands::Engagements {
                deal_id,
                deal_create_date,
                concurrency,
            } => {
                let mut settings = config.engagements.clone();
                if let Some(concurrency) = concurrency {
                    settings.concurrency = (*concurrency).max(1);
                }

                let client = config.client()?;
                let report = jobs::engagements_before_deal(
                    &client,
                    &settings,
                    config.item_errors,
                    deal_id,
                    *deal_create_date,
                )
                .await?;
                self.output_report(&report)?;
            }
            Commands::ReshapeHistory {
                input,
                output,
                padded,
                start_col,
            } => {
                let report = jobs::reshape_file(input, output, padded.as_deref(), *start_col)?;
                self.output_report(&report)?;
            }
            Commands::ServicePeriod {
                start,
                end,
                projected_end,
            } => {
                let period = jobs::service_period(*start, *end, *projected_end)?;
                self.output_report(&period.output_fields())?;
            }
            Commands::CompressImages {
                min_size,
                quality,
                output_dir,
                skip_replace,
                replace_only,
            } => {
                let mut settings = config.images.clone();
                if let Some(min_size) = min_size {
                    settings.min_size_bytes = *min_size;
                }
                if let Some(quality) = quality {
                    settings.jpeg_quality = (*quality).clamp(1, 100);
                }
                if let Some(output_dir) = output_dir {
                    settings.output_dir.clone_from(output_dir);
                }
                let steps = if *replace_only {
                    ImageSteps::ReplaceOnly
                } else if *skip_replace {
                    ImageSteps::CompressOnly
                } else {
                    ImageSteps::All
                };

                let client = config.client()?;
                let downloader = config.download_client()?;
                let report = jobs::compress_and_replace(
                    &client,
                    &downloader,
                    &settings,
                    config.item_errors,
                    steps,
                )
                .await?;
                self.output_report(&report)?;
            }
            Commands::Workflows {
                properties,
                concurrency,
                matched_dir,
            } => {
                let mut settings = config.workflows.clone();
                if !properties.is_empty() {
                    settings.properties.clone_from(properties);
                }
                if let Some(concurrency) = concurrency {
                    settings.concurrency = (*concurrency).max(1);
                }
                if let Some(matched_dir) = matched_dir {
                    settings.matched_dir.clone_from(matched_dir);
                }
                if settings.properties.is_empty() {
                    return Err(Error::config(
                        "No properties configured (set workflows.properties or --properties)",
                    ));
                }

                let client = config.client()?;
                let report = jobs::export_workflows(&client, &settings, config.item_errors).await?;
                self.output_report(&report)?;
            }
            Commands::Fetch {
                path,
                params,
                pagination,
                page_size,
                stop_on_empty,
                records_path,
                max_records,
                output,
            } => {
                let paginator = FetchPaging {
                    style: *pagination,
                    page_size: *page_size,
                    stop_on_empty: *stop_on_empty,
                };
                let fetcher = Self::build_fetcher(&config, paginator, records_path)?;
                let mut request = FetchRequest::get(path).params(&params.iter().cloned().collect());
                // offset paging sends its own limit
                if let Some(size) = page_size.filter(|_| *pagination != PaginationStyle::Offset) {
                    request = request.param("limit", size);
                }
                let request = request.with_limit(*max_records);

                let written = match output {
                    Some(output) => {
                        let mut out = BufWriter::new(Self::create_output(output)?);
                        jobs::dump_records(&fetcher, request, &mut out).await?
                    }
                    None => {
                        let mut out = io::stdout().lock();
                        jobs::dump_records(&fetcher, request, &mut out).await?
                    }
                };
                debug!("fetch wrote {written} records");
            }
        }

        info!("Done in {:.1}s", started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Load configuration and apply global flag overrides
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.cli.config.as_deref())?
            .with_token(self.cli.token.clone());

        if let Some(base_url) = self.cli.base_url.clone().none_if_empty() {
            config.hubspot.base_url = base_url;
        }
        if let Some(policy) = self.cli.item_errors {
            config.item_errors = match policy {
                ItemErrors::Skip => ItemErrorPolicy::Skip,
                ItemErrors::Abort => ItemErrorPolicy::Abort,
            };
        }

        debug!(
            "Using {} with {} attempts per request",
            config.hubspot.base_url, config.retry.max_attempts
        );
        Ok(config)
    }

    fn build_fetcher(
        config: &AppConfig,
        paging: FetchPaging,
        records_path: &str,
    ) -> Result<PaginatedFetcher> {
        let fetcher = PaginatedFetcher::new(config.client()?)
            .with_decoder(JsonDecoder::with_path(records_path));
        let stop = if paging.stop_on_empty {
            StopCondition::EmptyPage
        } else {
            StopCondition::Never
        };

        Ok(match paging.style {
            PaginationStyle::Cursor => {
                fetcher.with_paginator(CursorPaginator::default().with_stop_condition(stop))
            }
            PaginationStyle::NextLink => fetcher.with_paginator(NextUrlPaginator::default()),
            PaginationStyle::Offset => fetcher.with_paginator(OffsetPaginator::new(
                "offset",
                "limit",
                paging.page_size.unwrap_or(DEFAULT_OFFSET_PAGE_SIZE),
            )),
            PaginationStyle::None => fetcher.with_paginator(NoPaginator),
        })
    }

    fn create_output(path: &Path) -> Result<File> {
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))
    }

    /// Print a job report to stdout
    fn output_report<T: Serialize>(&self, report: &T) -> Result<()> {
        let text = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(report)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(report)?,
        };
        println!("{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner(args: &[&str]) -> Runner {
        let mut argv = vec!["hubspot-batch"];
        argv.extend_from_slice(args);
        Runner::new(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_load_config_overrides() {
        let runner = runner(&[
            "--token",
            "pat-x",
            "--base-url",
            "http://localhost:1",
            "--item-errors",
            "abort",
            "service-period",
        ]);
        let config = runner.load_config().unwrap();

        assert_eq!(config.hubspot.access_token.as_deref(), Some("pat-x"));
        assert_eq!(config.hubspot.base_url, "http://localhost:1");
        assert_eq!(config.item_errors, ItemErrorPolicy::Abort);
    }

    #[test]
    fn test_load_config_missing_file() {
        let runner = runner(&["--config", "/nonexistent/hubspot.yaml", "service-period"]);
        assert!(matches!(
            runner.load_config(),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_service_period_needs_no_token() {
        let runner = runner(&[
            "--token",
            "",
            "service-period",
            "--start",
            "1704067200000",
            "--end",
            "1711929600000",
        ]);
        runner.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fetch_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/deals"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "1"}, {"id": "2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deals.jsonl");
        let uri = server.uri();
        let out_arg = out.to_string_lossy().to_string();
        let runner = runner(&[
            "--token",
            "pat-x",
            "--base-url",
            &uri,
            "fetch",
            "/crm/v3/objects/deals",
            "-p",
            "limit=2",
            "--output",
            &out_arg,
        ]);
        runner.run().await.unwrap();

        let lines: Vec<Value> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![json!({"id": "1"}), json!({"id": "2"})]);
    }

    #[tokio::test]
    async fn test_run_fetch_offset_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/filemanager/api/v2/files"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [{"id": 1}, {"id": 2}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/filemanager/api/v2/files"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [{"id": 3}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("files.jsonl");
        let uri = server.uri();
        let out_arg = out.to_string_lossy().to_string();
        let runner = runner(&[
            "--token",
            "pat-x",
            "--base-url",
            &uri,
            "fetch",
            "/filemanager/api/v2/files",
            "--pagination",
            "offset",
            "--page-size",
            "2",
            "--records-path",
            "objects",
            "--output",
            &out_arg,
        ]);
        runner.run().await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_run_fetch_stop_on_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/deals"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "paging": {"next": {"after": "dangling"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deals.jsonl");
        let uri = server.uri();
        let out_arg = out.to_string_lossy().to_string();
        let runner = runner(&[
            "--token",
            "pat-x",
            "--base-url",
            &uri,
            "fetch",
            "/crm/v3/objects/deals",
            "--page-size",
            "5",
            "--stop-on-empty",
            "--output",
            &out_arg,
        ]);
        runner.run().await.unwrap();

        assert!(std::fs::read_to_string(&out).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_workflows_without_properties() {
        let runner = runner(&["--token", "pat-x", "workflows"]);
        assert!(matches!(runner.run().await, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_network_command_without_token() {
        let runner = runner(&[
            "--token",
            "",
            "engagements",
            "--deal-id",
            "1",
            "--deal-create-date",
            "0",
        ]);
        assert!(matches!(
            runner.run().await,
            Err(Error::MissingConfigField { .. })
        ));
    }
}
