//! CLI commands and argument parsing

use crate::config::TOKEN_ENV_VAR;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batch jobs against the HubSpot CRM API
#[derive(Parser, Debug)]
#[command(name = "hubspot-batch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Private app access token
    #[arg(long, global = true, env = TOKEN_ENV_VAR, hide_env_values = true)]
    pub token: Option<String>,

    /// Override the API host
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// What to do when a single item fails
    #[arg(long, global = true)]
    pub item_errors: Option<ItemErrors>,

    /// Report format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export contact source history touchpoints to CSV
    Touchpoints {
        /// Contacts per page
        #[arg(long)]
        page_size: Option<u32>,

        /// Stop after this many contacts
        #[arg(long)]
        limit: Option<usize>,

        /// CSV file to append to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create and fill `<field>_datetime` properties from custom dates
    BackfillDatetimes {
        /// Only backfill this object type (contacts, companies, deals)
        #[arg(long)]
        object_type: Option<String>,

        /// Date fields for --object-type (comma-separated)
        #[arg(long, requires = "object_type", value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Count engagements that happened before a deal was created
    Engagements {
        /// Deal id
        #[arg(long)]
        deal_id: String,

        /// Deal create date, epoch seconds or milliseconds
        #[arg(long)]
        deal_create_date: i64,

        /// Contacts processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Reshape a stage history export into one column per stage
    ReshapeHistory {
        /// Input CSV
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Also write the padded input here
        #[arg(long)]
        padded: Option<PathBuf>,

        /// Zero-based column where the (stage, date) pairs start
        #[arg(long, default_value = "1")]
        start_col: usize,
    },

    /// List the months of an invoicing period
    ServicePeriod {
        /// Period start, epoch milliseconds
        #[arg(long)]
        start: Option<i64>,

        /// Period end, epoch milliseconds
        #[arg(long)]
        end: Option<i64>,

        /// Projected period end, epoch milliseconds
        #[arg(long)]
        projected_end: Option<i64>,
    },

    /// Recompress large File Manager images and replace the originals
    CompressImages {
        /// Only images larger than this many bytes
        #[arg(long)]
        min_size: Option<u64>,

        /// JPEG quality, 1-100
        #[arg(long)]
        quality: Option<u8>,

        /// Directory for the recompressed files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// List and recompress only, keep the originals
        #[arg(long, conflicts_with = "replace_only")]
        skip_replace: bool,

        /// Upload the files named in an existing compression log
        #[arg(long)]
        replace_only: bool,
    },

    /// Save enabled workflows, and those that use the given properties
    Workflows {
        /// Property names to look for (comma-separated)
        #[arg(long, value_delimiter = ',')]
        properties: Vec<String>,

        /// Flow details fetched concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Directory for matched workflows
        #[arg(long)]
        matched_dir: Option<PathBuf>,
    },

    /// Dump every record of a paginated listing as JSON lines
    Fetch {
        /// Endpoint path, e.g. /crm/v3/objects/companies
        path: String,

        /// Query parameter (key=value, repeatable)
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Pagination style of the endpoint
        #[arg(long, default_value = "cursor")]
        pagination: PaginationStyle,

        /// Records per page (`limit` for cursor, page length for offset)
        #[arg(long)]
        page_size: Option<u32>,

        /// End on an empty page even if it carries a cursor
        #[arg(long)]
        stop_on_empty: bool,

        /// Dotted path to the records array
        #[arg(long, default_value = "results")]
        records_path: String,

        /// Maximum records to write
        #[arg(long)]
        max_records: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON document
    Json,
    /// Human-readable JSON
    Pretty,
}

/// Item error policy flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ItemErrors {
    /// Log and continue
    Skip,
    /// Stop on the first failure
    Abort,
}

/// How `fetch` follows pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PaginationStyle {
    /// `after` query parameter from `paging.next.after`
    Cursor,
    /// Absolute URL from `paging.next.link`
    NextLink,
    /// `offset`/`limit` query parameters, ends on a short page
    Offset,
    /// Single request
    None,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "hubspot-batch",
            "--token",
            "pat-1",
            "fetch",
            "/crm/v3/objects/deals",
            "-p",
            "limit=100",
            "--param",
            "properties=dealname,amount",
            "--max-records",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.token.as_deref(), Some("pat-1"));
        match cli.command {
            Commands::Fetch {
                path,
                params,
                pagination,
                max_records,
                ..
            } => {
                assert_eq!(path, "/crm/v3/objects/deals");
                assert_eq!(
                    params,
                    vec![
                        ("limit".to_string(), "100".to_string()),
                        ("properties".to_string(), "dealname,amount".to_string()),
                    ]
                );
                assert_eq!(pagination, PaginationStyle::Cursor);
                assert_eq!(max_records, Some(10));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch_offset() {
        let cli = Cli::try_parse_from([
            "hubspot-batch",
            "fetch",
            "/filemanager/api/v2/files",
            "--pagination",
            "offset",
            "--page-size",
            "250",
            "--records-path",
            "objects",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch {
                pagination,
                page_size,
                stop_on_empty,
                records_path,
                ..
            } => {
                assert_eq!(pagination, PaginationStyle::Offset);
                assert_eq!(page_size, Some(250));
                assert!(!stop_on_empty);
                assert_eq!(records_path, "objects");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_backfill_fields() {
        let cli = Cli::try_parse_from([
            "hubspot-batch",
            "backfill-datetimes",
            "--object-type",
            "deals",
            "--fields",
            "close_date,renewal_date",
        ])
        .unwrap();

        match cli.command {
            Commands::BackfillDatetimes {
                object_type,
                fields,
            } => {
                assert_eq!(object_type.as_deref(), Some("deals"));
                assert_eq!(fields, vec!["close_date", "renewal_date"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_compress_images_conflicts() {
        let cli = Cli::try_parse_from([
            "hubspot-batch",
            "compress-images",
            "--min-size",
            "500000",
            "--skip-replace",
        ])
        .unwrap();
        match cli.command {
            Commands::CompressImages {
                min_size,
                skip_replace,
                replace_only,
                ..
            } => {
                assert_eq!(min_size, Some(500_000));
                assert!(skip_replace);
                assert!(!replace_only);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let both = Cli::try_parse_from([
            "hubspot-batch",
            "compress-images",
            "--skip-replace",
            "--replace-only",
        ]);
        assert!(both.is_err());
    }

    #[test]
    fn test_parse_workflow_properties() {
        let cli = Cli::try_parse_from([
            "hubspot-batch",
            "workflows",
            "--properties",
            "dealstage,pipeline",
        ])
        .unwrap();
        match cli.command {
            Commands::Workflows { properties, .. } => {
                assert_eq!(properties, vec!["dealstage", "pipeline"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
